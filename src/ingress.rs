//! Wire-format types for inbound uploads. Parsing JSON into these structs
//! is the ingress's job; this module only defines the shape and the
//! legacy-unit normalization the core's storage layer requires.
use serde::Deserialize;

use crate::pdu::Direction;

/// One upload: a bearer token plus any combination of the three record
/// arrays. All fields are optional except `token` -- an empty upload is
/// valid and a no-op.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub token: String,
    #[serde(default)]
    pub call: Vec<CallRecord>,
    #[serde(default)]
    pub pdu: Vec<PduRecord>,
    #[serde(default)]
    pub sms: Vec<SmsRecord>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WireDirection {
    Incoming,
    Outgoing,
}

impl From<WireDirection> for Direction {
    fn from(d: WireDirection) -> Direction {
        match d {
            WireDirection::Incoming => Direction::Incoming,
            WireDirection::Outgoing => Direction::Outgoing,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PduRecord {
    /// Arrival wall-clock, nanoseconds.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub direction: WireDirection,
    /// Hex-encoded PDU octets.
    pub pdu: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallRecord {
    /// Nanoseconds, new form. The legacy `from`/ms form is handled by
    /// `CallRecord::peer`/`CallRecord::timestamp_ns` below.
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub duration: i64,
    #[serde(rename = "type")]
    pub call_type: String,
    /// May be empty when the operator withheld caller identity.
    #[serde(default)]
    pub peer: String,
    /// Legacy alias for `peer`.
    #[serde(default)]
    pub from: Option<String>,
    /// Legacy form gives this in milliseconds; absent here means use
    /// `timestamp`.
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub raw: Option<String>,
}

impl CallRecord {
    /// Resolve the caller-identity field, preferring the modern `peer`.
    pub fn resolved_peer(&self) -> &str {
        if !self.peer.is_empty() {
            return &self.peer;
        }
        self.from.as_deref().unwrap_or("")
    }

    /// Resolve the event timestamp to nanoseconds, converting the legacy
    /// millisecond field when that's what was sent.
    pub fn resolved_timestamp_ns(&self) -> Option<i64> {
        self.timestamp.or_else(|| self.timestamp_ms.map(|ms| ms * 1_000_000))
    }
}

/// The legacy pre-decoded textual SMS form. `sent`/`received` arrive in
/// milliseconds on the wire; the core's storage unit is nanoseconds
/// everywhere, so this adapter multiplies by 1e6 before the record ever
/// reaches `Store`.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsRecord {
    pub sent: i64,
    pub received: i64,
    pub from: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
}

impl SmsRecord {
    pub fn sent_ns(&self) -> i64 {
        self.sent * 1_000_000
    }

    pub fn received_ns(&self) -> i64 {
        self.received * 1_000_000
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn envelope_with_only_token_is_valid() {
        let e: Envelope = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(e.token, "abc");
        assert!(e.call.is_empty() && e.pdu.is_empty() && e.sms.is_empty());
    }

    #[test]
    fn pdu_record_parses_direction_and_hex() {
        let e: Envelope = serde_json::from_str(
            r#"{"token":"abc","pdu":[{"timestamp":1,"type":"Incoming","pdu":"0011"}]}"#,
        )
        .unwrap();
        assert_eq!(e.pdu.len(), 1);
        assert!(matches!(e.pdu[0].direction, WireDirection::Incoming));
    }

    #[test]
    fn legacy_call_from_and_ms_timestamp_resolve() {
        let rec: CallRecord = serde_json::from_str(
            r#"{"duration":1000,"type":"missed","from":"+15551234567","timestamp_ms":5000}"#,
        )
        .unwrap();
        assert_eq!(rec.resolved_peer(), "+15551234567");
        assert_eq!(rec.resolved_timestamp_ns(), Some(5_000_000_000));
    }

    #[test]
    fn modern_call_peer_and_ns_timestamp_take_priority() {
        let rec: CallRecord = serde_json::from_str(
            r#"{"duration":1000,"type":"missed","peer":"+1555","from":"+1999","timestamp":42}"#,
        )
        .unwrap();
        assert_eq!(rec.resolved_peer(), "+1555");
        assert_eq!(rec.resolved_timestamp_ns(), Some(42));
    }

    #[test]
    fn legacy_sms_timestamps_convert_ms_to_ns() {
        let rec: SmsRecord = serde_json::from_str(
            r#"{"sent":1000,"received":2000,"from":"+1555","body":"hi"}"#,
        )
        .unwrap();
        assert_eq!(rec.sent_ns(), 1_000_000_000);
        assert_eq!(rec.received_ns(), 2_000_000_000);
    }
}
