//! 3GPP TS 23.040 SMS PDU codec and multipart reassembly/dedup engine.
//!
//! This crate is the core of a field-modem ingestion pipeline: it decodes
//! raw PDU byte sequences, reassembles concatenated short messages across
//! time and process restarts, and orchestrates the archive transaction
//! that commits an assembled message alongside the retirement of its
//! parts. The serial-line modem handshake, HTTP ingress transport, SMTP
//! delivery, and daemon supervision are external collaborators; this
//! crate defines only the ports (`Store`, `Notifier`) they must satisfy.

pub mod config;
pub mod errors;
pub mod gsm_encoding;
pub mod ingress;
pub mod notifier;
pub mod pdu;
pub mod processor;
pub mod splitter;
pub mod store;

pub use config::Config;
pub use errors::{CoreError, CoreResult};
pub use notifier::Notifier;
pub use processor::{Processor, Record};
pub use store::Store;
