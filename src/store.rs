//! The persistence port. This crate depends only on the trait below; a
//! concrete relational driver is an external collaborator.
use async_trait::async_trait;

use crate::pdu::Direction;

/// One raw PDU row as persisted in the `pdu` table.
#[derive(Debug, Clone)]
pub struct PduRow {
    pub id: i64,
    pub device: i64,
    pub timestamp: i64,
    pub uploaded: i64,
    pub direction: Direction,
    pub bytes: Vec<u8>,
}

/// The atomic archive transaction payload built by `Processor` from a
/// `splitter::CompletedGroup`.
#[derive(Debug, Clone)]
pub struct ArchiveTransaction {
    pub device: i64,
    pub direction: Direction,
    pub sent: i64,
    pub received: i64,
    pub peer: String,
    pub subject: String,
    pub body: String,
    pub contributing_pdu_ids: Vec<i64>,
    pub duplicate_pdu_ids: Vec<i64>,
}

/// The only persistence contract the core relies on. Implementations are
/// free to back this with any relational engine; unique-constraint errors
/// on the insert operations must be collapsed to the `Ok(0)` return rather
/// than surfaced as `Err`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a raw PDU row. Returns the assigned id, or `0` if
    /// `(device, direction, bytes)` already exists.
    async fn insert_pdu(
        &self,
        device: i64,
        timestamp_ns: i64,
        uploaded_ns: i64,
        direction: Direction,
        bytes: &[u8],
    ) -> Result<i64, StoreError>;

    /// Insert a logical SMS row. Returns the assigned id, or `0` on a
    /// unique-constraint hit.
    #[allow(clippy::too_many_arguments)]
    async fn insert_sms(
        &self,
        device: i64,
        direction: Direction,
        sent_ns: i64,
        received_ns: i64,
        peer: &str,
        subject: &str,
        body: &str,
    ) -> Result<i64, StoreError>;

    /// Insert a call record. Returns the assigned id, or `0` on a
    /// unique-constraint hit.
    #[allow(clippy::too_many_arguments)]
    async fn insert_call(
        &self,
        device: i64,
        timestamp_ns: i64,
        uploaded_ns: i64,
        peer: &str,
        duration_ns: i64,
        call_type: &str,
        raw: Option<&str>,
    ) -> Result<i64, StoreError>;

    /// Every live `pdu` row, for restart recovery.
    async fn select_all_pdu(&self) -> Result<Vec<PduRow>, StoreError>;

    /// The five-step atomic move: insert the sms row, delete each
    /// contributing and duplicate `pdu` row, and insert an `archive` row
    /// per retired part, all tagged with the new sms id.
    async fn archive_transaction(&self, txn: ArchiveTransaction) -> Result<i64, StoreError>;
}

/// Errors the `Store` port can raise. `Transient` is the only one the
/// core retries on its own (at the next cleanup tick); everything else is
/// surfaced to the caller.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Transient(String),

    #[error("store backend error: {0}")]
    Backend(String),
}
