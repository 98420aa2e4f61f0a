//! Error handling.
use thiserror::Error;

/// Why a PDU failed to decode. Mirrors the two outcomes §7 of the design
/// distinguishes: a malformed byte sequence versus a valid but unsupported
/// variant. Both are distinct from a plain I/O or store error further up the
/// stack, since the Splitter and Processor branch on which one happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The byte sequence is malformed: length overrun, bad semi-octet, bad
    /// surrogate, out-of-range timestamp, and so on.
    #[error("invalid PDU: {0}")]
    Failed(&'static str),

    /// The byte sequence is well-formed but describes a variant this codec
    /// doesn't implement (status reports, enhanced VP, unsupported DCS...).
    #[error("unsupported PDU: {0}")]
    NotImplemented(&'static str),
}

/// Error raised while walking a User Data Header IE chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UdhError {
    #[error("bad user data header length")]
    BadLength,
}

/// Crate-wide error for the orchestration layer (Processor, Store, Notifier).
///
/// Exhaustive matching is not required here the way it would be for
/// `DecodeError`: callers only ever need to log-and-continue past these.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("user data header: {0}")]
    Udh(#[from] UdhError),

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("notify error: {0}")]
    Notify(#[from] crate::notifier::NotifyError),

    #[error("config error: {0}")]
    Config(String),
}

/// Bog-standard result type alias.
pub type CoreResult<T> = Result<T, CoreError>;
