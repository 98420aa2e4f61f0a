//! Reassembly state machine. Owns no I/O: it groups, orders, and
//! de-duplicates decoded PDU parts into logical SMS messages.
use std::collections::HashMap;

use crate::gsm_encoding::udh::ConcatenatedShortMessages;
use crate::pdu::{Deliver, Direction, Pdu, Submit};

/// Five minutes: the maximum TP-SCTS spread within one candidate group.
pub const SENDING_WINDOW: i64 = 300;
/// Twenty-four hours, in nanoseconds: the maximum arrival-time spread for
/// two equal-sequence, equal-text parts to be considered the same
/// retransmission rather than two distinct, ambiguous parts.
pub const RECEPTION_WINDOW_NS: i64 = 24 * 3600 * 1_000_000_000;

/// One decoded PDU offered to the Splitter, reduced to the fields the
/// reassembly algorithm actually needs.
#[derive(Debug, Clone)]
pub struct Part {
    pub pdu_id: i64,
    pub device: i64,
    pub direction: Direction,
    /// Server-side arrival wall clock, nanoseconds.
    pub arrival: i64,
    pub peer: String,
    /// TP-SCTS, Unix seconds UTC. `None` for Submit parts (no SCTS).
    pub sent: Option<i64>,
    pub text: String,
    pub concat: Option<ConcatenatedShortMessages>,
}

impl Part {
    /// Build a `Part` from a decoded `Pdu`, or `None` if the part is
    /// port-addressed (MMS) and the Splitter should skip it entirely.
    pub fn from_pdu(pdu_id: i64, device: i64, direction: Direction, arrival: i64, pdu: &Pdu) -> Option<Part> {
        match pdu {
            Pdu::Deliver(d) => Part::from_deliver(pdu_id, device, arrival, d),
            Pdu::Submit(s) => Part::from_submit(pdu_id, device, arrival, s),
        }
    }

    fn from_deliver(pdu_id: i64, device: i64, arrival: i64, d: &Deliver) -> Option<Part> {
        if d.user_data_header.is_port_addressed() {
            return None;
        }
        Some(Part {
            pdu_id,
            device,
            direction: Direction::Incoming,
            arrival,
            peer: d.originating_address.clone(),
            sent: Some(d.service_centre_timestamp),
            text: d.user_data.clone(),
            concat: d.user_data_header.concatenation(),
        })
    }

    fn from_submit(pdu_id: i64, device: i64, arrival: i64, s: &Submit) -> Option<Part> {
        if s.user_data_header.is_port_addressed() {
            return None;
        }
        Some(Part {
            pdu_id,
            device,
            direction: Direction::Outgoing,
            arrival,
            peer: s.destination_address.clone(),
            sent: None,
            text: s.user_data.clone(),
            concat: s.user_data_header.concatenation(),
        })
    }
}

/// Outcome of offering one part to the Splitter.
pub enum Classified {
    /// Not concatenated: already a complete logical message.
    Single(CompletedGroup),
    /// Concatenated, held pending its peers.
    Buffered,
    /// Port-addressed (MMS/WAP) payload: deliberately skipped.
    Mms,
    /// The part couldn't be decoded upstream; nothing for the Splitter to do.
    DecodeFailed,
}

/// A fully assembled logical SMS, ready for the archive transaction.
#[derive(Debug, Clone)]
pub struct CompletedGroup {
    pub device: i64,
    pub direction: Direction,
    pub peer: String,
    pub body: String,
    /// min(TP-SCTS) across contributing parts, nanoseconds since the Unix
    /// epoch -- `Part::sent` is seconds, so this is scaled by 1e9.
    pub sent: i64,
    pub received: i64,
    pub contributing_pdu_ids: Vec<i64>,
    pub duplicate_pdu_ids: Vec<i64>,
}

type BucketKey = (i64, Direction, u16);

/// Reassembly state: buckets of buffered parts, keyed by device, direction,
/// and concatenation reference number.
#[derive(Default)]
pub struct Splitter {
    buckets: HashMap<BucketKey, Vec<(Part, ConcatenatedShortMessages)>>,
}

impl Splitter {
    pub fn new() -> Splitter {
        Splitter::default()
    }

    /// Offer one decode attempt. `decoded` is `None` when decoding the raw
    /// PDU failed upstream -- there is nothing for the Splitter to do with
    /// it beyond reporting `DecodeFailed`. A port-addressed (MMS) payload
    /// decodes fine but carries no reassemblable text, so it is classified
    /// `Mms` rather than being buffered.
    pub fn add(
        &mut self,
        pdu_id: i64,
        device: i64,
        direction: Direction,
        arrival: i64,
        decoded: Option<&Pdu>,
    ) -> Classified {
        let pdu = match decoded {
            Some(p) => p,
            None => return Classified::DecodeFailed,
        };
        let part = match Part::from_pdu(pdu_id, device, direction, arrival, pdu) {
            Some(p) => p,
            None => return Classified::Mms,
        };
        self.add_part(part)
    }

    /// The grouping/buffering core, taking an already-resolved `Part`
    /// directly. Split out from `add` so tests can exercise the reassembly
    /// algorithm without constructing full `Pdu` values.
    fn add_part(&mut self, part: Part) -> Classified {
        let concat = match part.concat {
            Some(c) => c,
            None => {
                return Classified::Single(CompletedGroup {
                    device: part.device,
                    direction: part.direction,
                    peer: part.peer.clone(),
                    sent: part.sent.unwrap_or(0) * 1_000_000_000,
                    received: part.arrival,
                    body: part.text,
                    contributing_pdu_ids: vec![part.pdu_id],
                    duplicate_pdu_ids: vec![],
                })
            }
        };

        let key = (part.device, part.direction, concat.reference_number);
        self.buckets.entry(key).or_default().push((part, concat));
        Classified::Buffered
    }

    /// Group, order, de-duplicate, and emit every bucket that is now
    /// provably complete. Incomplete groups remain buffered.
    pub fn drain(&mut self) -> Vec<CompletedGroup> {
        let mut completed = Vec::new();

        for entries in self.buckets.values_mut() {
            let taken = std::mem::take(entries);
            let (done, remaining) = split_groups(taken);
            *entries = remaining;
            completed.extend(done);
        }

        self.buckets.retain(|_, v| !v.is_empty());
        completed
    }
}

/// First-fit grouping by peer address + sending-time window, then per-group
/// ordering, de-duplication, and completeness check. Returns (completed
/// groups, parts that stay buffered).
fn split_groups(
    parts: Vec<(Part, ConcatenatedShortMessages)>,
) -> (Vec<CompletedGroup>, Vec<(Part, ConcatenatedShortMessages)>) {
    let mut groups: Vec<Vec<(Part, ConcatenatedShortMessages)>> = Vec::new();

    'parts: for entry in parts {
        for group in groups.iter_mut() {
            let (ref head, _) = group[0];
            if head.peer != entry.0.peer {
                continue;
            }
            let within_window = match (head.sent, entry.0.sent) {
                (Some(a), Some(b)) => (a - b).abs() <= SENDING_WINDOW,
                _ => true,
            };
            if within_window {
                group.push(entry);
                continue 'parts;
            }
        }
        groups.push(vec![entry]);
    }

    let mut done = Vec::new();
    let mut remaining = Vec::new();

    for mut group in groups {
        group.sort_by(|a, b| {
            a.1.sequence
                .cmp(&b.1.sequence)
                .then(a.0.arrival.cmp(&b.0.arrival))
        });

        let mut duplicates = Vec::new();
        let mut deduped: Vec<(Part, ConcatenatedShortMessages)> = Vec::new();
        for entry in group {
            let collapse = deduped.last().is_some_and(|(last, last_c): &(Part, ConcatenatedShortMessages)| {
                last_c.sequence == entry.1.sequence
                    && last.text == entry.0.text
                    && (last.arrival - entry.0.arrival).abs() <= RECEPTION_WINDOW_NS
            });
            if collapse {
                duplicates.push(entry);
            } else {
                deduped.push(entry);
            }
        }

        let maximum = deduped[0].1.maximum;
        let complete = deduped.len() as u8 == maximum
            && deduped
                .iter()
                .enumerate()
                .all(|(i, (_, c))| c.sequence as usize == i + 1);

        if !complete {
            remaining.extend(deduped);
            remaining.extend(duplicates);
            continue;
        }

        let first = &deduped[0].0;
        let mut body = String::new();
        let mut received = first.arrival;
        let mut sent = first.sent;
        let mut contributing = Vec::with_capacity(deduped.len());

        for (part, _) in &deduped {
            body.push_str(&part.text);
            received = received.max(part.arrival);
            sent = match (sent, part.sent) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, _) => a,
            };
            contributing.push(part.pdu_id);
        }

        done.push(CompletedGroup {
            device: first.device,
            direction: first.direction,
            peer: first.peer.clone(),
            body,
            sent: sent.unwrap_or(0) * 1_000_000_000,
            received,
            contributing_pdu_ids: contributing,
            duplicate_pdu_ids: duplicates.iter().map(|(p, _)| p.pdu_id).collect(),
        });
    }

    (done, remaining)
}

#[cfg(test)]
mod test {
    use super::*;

    fn concat(reference_number: u16, maximum: u8, sequence: u8) -> ConcatenatedShortMessages {
        ConcatenatedShortMessages { reference_number, maximum, sequence }
    }

    fn part(pdu_id: i64, peer: &str, sent: i64, arrival: i64, text: &str) -> Part {
        Part {
            pdu_id,
            device: 1,
            direction: Direction::Incoming,
            arrival,
            peer: peer.to_string(),
            sent: Some(sent),
            text: text.to_string(),
            concat: None,
        }
    }

    #[test]
    fn unconcatenated_part_is_single() {
        let mut splitter = Splitter::new();
        let p = part(1, "+1555", 1000, 1_000_000_000, "hi");
        match splitter.add_part(p) {
            Classified::Single(g) => {
                assert_eq!(g.body, "hi");
                assert_eq!(g.contributing_pdu_ids, vec![1]);
            }
            _ => panic!("expected Single"),
        }
    }

    #[test]
    fn two_part_message_completes_in_order() {
        let mut splitter = Splitter::new();
        let mut p1 = part(1, "+1555", 1000, 1_000_000_000, "Hello, ");
        p1.concat = Some(concat(0x42, 2, 1));
        let mut p2 = part(2, "+1555", 1010, 2_000_000_000, "world!");
        p2.concat = Some(concat(0x42, 2, 2));

        assert!(matches!(splitter.add_part(p1), Classified::Buffered));
        assert!(matches!(splitter.add_part(p2), Classified::Buffered));

        let groups = splitter.drain();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].body, "Hello, world!");
        assert_eq!(groups[0].sent, 1000 * 1_000_000_000);
        assert_eq!(groups[0].received, 2_000_000_000);
    }

    #[test]
    fn out_of_order_arrival_still_orders_by_sequence() {
        let mut splitter = Splitter::new();
        let mut p2 = part(2, "+1555", 1010, 2_000_000_000, "world!");
        p2.concat = Some(concat(0x42, 2, 2));
        let mut p1 = part(1, "+1555", 1000, 1_000_000_000, "Hello, ");
        p1.concat = Some(concat(0x42, 2, 1));

        splitter.add_part(p2);
        assert!(splitter.drain().is_empty());
        splitter.add_part(p1);

        let groups = splitter.drain();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].body, "Hello, world!");
    }

    #[test]
    fn duplicate_retransmission_is_collapsed() {
        let mut splitter = Splitter::new();
        let mut p1 = part(1, "+1555", 1000, 1_000_000_000, "Hello, ");
        p1.concat = Some(concat(0x42, 2, 1));
        let mut p2a = part(2, "+1555", 1010, 2_000_000_000, "world!");
        p2a.concat = Some(concat(0x42, 2, 2));
        let mut p2b = part(3, "+1555", 1010, 2_000_000_003, "world!");
        p2b.concat = Some(concat(0x42, 2, 2));

        splitter.add_part(p1);
        splitter.add_part(p2a);
        splitter.add_part(p2b);

        let groups = splitter.drain();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].contributing_pdu_ids.len(), 2);
        assert_eq!(groups[0].duplicate_pdu_ids, vec![3]);
    }

    #[test]
    fn decode_failure_upstream_is_reported_and_not_buffered() {
        let mut splitter = Splitter::new();
        assert!(matches!(splitter.add(1, 1, Direction::Incoming, 0, None), Classified::DecodeFailed));
    }

    #[test]
    fn port_addressed_deliver_is_mms_not_buffered() {
        use crate::gsm_encoding::udh::{InformationElement, UserDataHeader};

        let deliver = Deliver {
            udhi: true,
            reply_path: false,
            more_messages: false,
            status_report_indication: false,
            protocol_id: 0,
            dcs: 0,
            originating_address: "+1555".to_string(),
            service_centre_timestamp: 0,
            user_data_header: UserDataHeader {
                elements: vec![InformationElement { id: 5, data: vec![0x0B, 0x84, 0x0B, 0x84] }],
            },
            user_data: String::new(),
            smsc: None,
        };
        let pdu = Pdu::Deliver(deliver);

        let mut splitter = Splitter::new();
        assert!(matches!(splitter.add(1, 1, Direction::Incoming, 0, Some(&pdu)), Classified::Mms));
        assert!(splitter.drain().is_empty());
    }

    #[test]
    fn window_isolation_splits_two_distinct_groups() {
        let mut splitter = Splitter::new();
        let mut p1 = part(1, "+1555", 1000, 1_000_000_000, "a");
        p1.concat = Some(concat(0x10, 2, 1));
        let mut p2 = part(2, "+1555", 1000 + SENDING_WINDOW + 1, 2_000_000_000, "b");
        p2.concat = Some(concat(0x10, 2, 1));

        splitter.add_part(p1);
        splitter.add_part(p2);

        assert!(splitter.drain().is_empty());
    }
}
