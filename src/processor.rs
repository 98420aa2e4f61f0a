//! The orchestrator: front door for the ingress, owner of the deferred task
//! queue, and the only component that drives the Splitter and the archive
//! transaction.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::CoreResult;
use crate::ingress::{CallRecord, Envelope, SmsRecord, WireDirection};
use crate::notifier::{render_digest, DigestEntry, Notifier};
use crate::pdu::{self, Direction};
use crate::splitter::{Classified, Splitter};
use crate::store::{ArchiveTransaction, Store};

/// Soft flush deadline for a device's notification buffer, once its first
/// entry lands.
const NOTIFY_DEADLINE_NS: i64 = 5_000_000_000;
/// Maximum calls/messages per rendered digest chunk.
const NOTIFY_CHUNK: usize = 50;

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_nanos() as i64
}

/// One inbound record as accepted by `Processor::receive`.
pub enum Record {
    Pdu { hex: String, direction: Direction, timestamp_ns: i64, strip_smsc: bool },
    Call { timestamp_ns: i64, peer: String, duration_ns: i64, call_type: String, raw: Option<String> },
    Sms { sent_ns: i64, received_ns: i64, peer: String, subject: String, body: String },
}

/// A deferred unit of work, enqueued by `receive` and drained by `cleanup`.
enum Task {
    Pdu { pdu_id: i64, device: i64, direction: Direction, arrival_ns: i64, bytes: Vec<u8>, strip_smsc: bool },
    Call { device: i64, timestamp_ns: i64, peer: String, duration_ns: i64, call_type: String },
    Sms { device: i64, sent_ns: i64, received_ns: i64, peer: String, body: String },
}

struct BufferedCall {
    timestamp_ns: i64,
    peer: String,
    call_type: String,
    duration_ns: i64,
}

struct BufferedSms {
    sent_ns: i64,
    received_ns: i64,
    peer: String,
    body: String,
}

#[derive(Default)]
struct DeviceBuffer {
    deadline_ns: Option<i64>,
    calls: Vec<BufferedCall>,
    sms: Vec<BufferedSms>,
}

impl DeviceBuffer {
    fn touch(&mut self, now: i64) {
        self.deadline_ns.get_or_insert(now + NOTIFY_DEADLINE_NS);
    }

    fn due(&self, now: i64) -> bool {
        matches!(self.deadline_ns, Some(d) if now >= d)
    }

    fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.sms.is_empty()
    }
}

/// Wires together the raw pdu table, the Splitter, and the per-device
/// notification buffers. Holds no knowledge of how the ingress or the
/// notifier actually move bytes.
pub struct Processor<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    config: Config,
    queue: Mutex<VecDeque<Task>>,
    splitter: Mutex<Splitter>,
    buffers: Mutex<HashMap<i64, DeviceBuffer>>,
}

impl<S: Store, N: Notifier> Processor<S, N> {
    pub fn new(store: Arc<S>, notifier: Arc<N>, config: Config) -> Self {
        Processor {
            store,
            notifier,
            config,
            queue: Mutex::new(VecDeque::new()),
            splitter: Mutex::new(Splitter::new()),
            buffers: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an ingress token, then persist and enqueue every record in
    /// the envelope. Returns the assigned ids, one per `pdu`/`call`/`sms`
    /// entry in input order.
    pub async fn receive_envelope(&self, envelope: Envelope) -> CoreResult<Vec<i64>> {
        let (device, smsc_prefix) = {
            let (id, cfg) = self
                .config
                .device_for_token(&envelope.token)
                .ok_or_else(|| crate::errors::CoreError::Config("unknown ingress token".to_string()))?;
            (id, cfg.smsc_prefix)
        };

        let mut ids = Vec::with_capacity(envelope.pdu.len() + envelope.call.len() + envelope.sms.len());
        for rec in &envelope.pdu {
            let direction = match rec.direction {
                WireDirection::Incoming => Direction::Incoming,
                WireDirection::Outgoing => Direction::Outgoing,
            };
            ids.push(
                self.receive(
                    device,
                    Record::Pdu { hex: rec.pdu.clone(), direction, timestamp_ns: rec.timestamp, strip_smsc: smsc_prefix },
                )
                .await?,
            );
        }
        for rec in &envelope.call {
            ids.push(self.receive(device, call_record(rec)).await?);
        }
        for rec in &envelope.sms {
            ids.push(self.receive(device, sms_record(rec)).await?);
        }
        Ok(ids)
    }

    /// Persist one record synchronously, enqueue its deferred task, and
    /// return the assigned store id (`0` on a unique-constraint hit, in
    /// which case no task is enqueued -- the original arrival already
    /// owns one).
    pub async fn receive(&self, device: i64, record: Record) -> CoreResult<i64> {
        let uploaded_ns = now_ns();
        match record {
            Record::Pdu { hex, direction, timestamp_ns, strip_smsc } => {
                let bytes = pdu::decode_hex(&hex)?;
                let id = self.store.insert_pdu(device, timestamp_ns, uploaded_ns, direction, &bytes).await?;
                if id != 0 {
                    self.queue.lock().await.push_back(Task::Pdu {
                        pdu_id: id,
                        device,
                        direction,
                        arrival_ns: timestamp_ns,
                        bytes,
                        strip_smsc,
                    });
                }
                Ok(id)
            }
            Record::Call { timestamp_ns, peer, duration_ns, call_type, raw } => {
                let id = self
                    .store
                    .insert_call(device, timestamp_ns, uploaded_ns, &peer, duration_ns, &call_type, raw.as_deref())
                    .await?;
                if id != 0 {
                    self.queue.lock().await.push_back(Task::Call {
                        device,
                        timestamp_ns,
                        peer,
                        duration_ns,
                        call_type,
                    });
                }
                Ok(id)
            }
            Record::Sms { sent_ns, received_ns, peer, subject, body } => {
                let id = self
                    .store
                    .insert_sms(device, Direction::Incoming, sent_ns, received_ns, &peer, &subject, &body)
                    .await?;
                if id != 0 {
                    self.queue.lock().await.push_back(Task::Sms {
                        device,
                        sent_ns,
                        received_ns,
                        peer,
                        body,
                    });
                }
                Ok(id)
            }
        }
    }

    /// Feed every existing `pdu` row into the Splitter before accepting
    /// ingress, so a prior run's partial groups are recovered. Archives
    /// anything that is now provably complete.
    pub async fn initialize(&self) -> CoreResult<()> {
        let rows = self.store.select_all_pdu().await?;
        info!(count = rows.len(), "restart recovery: replaying stored PDU rows");
        let mut splitter = self.splitter.lock().await;
        for row in rows {
            let strip_smsc = self.config.device(row.device).map(|c| c.smsc_prefix).unwrap_or(false);
            feed_row(&mut splitter, row.id, row.device, row.direction, row.timestamp, &row.bytes, strip_smsc);
        }
        let completed = splitter.drain();
        drop(splitter);
        for group in completed {
            self.archive(group).await;
        }
        Ok(())
    }

    /// Drain the task queue, route each task, drive the Splitter, archive
    /// completed groups, and flush any device buffer past its deadline (or
    /// every buffer, if `force` is set on shutdown).
    pub async fn cleanup(&self, now_ns_value: i64, force: bool) -> CoreResult<()> {
        let tasks: Vec<Task> = {
            let mut q = self.queue.lock().await;
            q.drain(..).collect()
        };

        let mut splitter = self.splitter.lock().await;
        let mut buffers = self.buffers.lock().await;

        for task in tasks {
            match task {
                Task::Pdu { pdu_id, device, direction, arrival_ns, bytes, strip_smsc } => {
                    feed_row(&mut splitter, pdu_id, device, direction, arrival_ns, &bytes, strip_smsc);
                }
                Task::Call { device, timestamp_ns, peer, duration_ns, call_type } => {
                    let buf = buffers.entry(device).or_default();
                    buf.touch(now_ns_value);
                    buf.calls.push(BufferedCall { timestamp_ns, peer, call_type, duration_ns });
                }
                Task::Sms { device, sent_ns, received_ns, peer, body } => {
                    let buf = buffers.entry(device).or_default();
                    buf.touch(now_ns_value);
                    buf.sms.push(BufferedSms { sent_ns, received_ns, peer, body });
                }
            }
        }

        let completed = splitter.drain();
        drop(splitter);

        for group in completed {
            let buf = buffers.entry(group.device).or_default();
            buf.touch(now_ns_value);
            buf.sms.push(BufferedSms {
                sent_ns: group.sent,
                received_ns: group.received,
                peer: group.peer.clone(),
                body: group.body.clone(),
            });
            self.archive(group).await;
        }

        let due_devices: Vec<i64> = buffers
            .iter()
            .filter(|(_, b)| !b.is_empty() && (force || b.due(now_ns_value)))
            .map(|(d, _)| *d)
            .collect();

        for device in due_devices {
            if let Some(buf) = buffers.remove(&device) {
                self.flush_buffer(device, buf).await;
            }
        }

        Ok(())
    }

    async fn archive(&self, group: crate::splitter::CompletedGroup) {
        let txn = ArchiveTransaction {
            device: group.device,
            direction: group.direction,
            sent: group.sent,
            received: group.received,
            peer: group.peer,
            subject: String::new(),
            body: group.body,
            contributing_pdu_ids: group.contributing_pdu_ids,
            duplicate_pdu_ids: group.duplicate_pdu_ids,
        };
        if let Err(e) = self.store.archive_transaction(txn).await {
            warn!(error = %e, "archive transaction failed, group stays buffered for retry");
        }
    }

    async fn flush_buffer(&self, device: i64, buf: DeviceBuffer) {
        let (cfg_receiver, cfg_forward_to) = match self.device_contacts(device) {
            Some(c) => c,
            None => {
                warn!(device, "flushing notification buffer for device with no config entry");
                return;
            }
        };

        for calls in buf.calls.chunks(NOTIFY_CHUNK) {
            let entries: Vec<DigestEntry> = calls
                .iter()
                .map(|c| DigestEntry::Call {
                    timestamp_ns: c.timestamp_ns,
                    peer: &c.peer,
                    call_type: &c.call_type,
                    duration_ns: c.duration_ns,
                })
                .collect();
            self.send_digest(&cfg_forward_to, &cfg_receiver, &entries).await;
        }

        for sms in buf.sms.chunks(NOTIFY_CHUNK) {
            let entries: Vec<DigestEntry> = sms
                .iter()
                .map(|s| DigestEntry::Sms {
                    sent_ns: s.sent_ns,
                    received_ns: s.received_ns,
                    peer: &s.peer,
                    body: &s.body,
                })
                .collect();
            self.send_digest(&cfg_forward_to, &cfg_receiver, &entries).await;
        }
    }

    async fn send_digest(&self, from: &str, to: &str, entries: &[DigestEntry<'_>]) {
        if entries.is_empty() {
            return;
        }
        let html = render_digest(entries);
        if let Err(e) = self.notifier.notify(from, to, &html).await {
            warn!(error = %e, "notification dropped, data already durable");
        } else {
            debug!(to, count = entries.len(), "notification sent");
        }
    }

    fn device_contacts(&self, device: i64) -> Option<(String, String)> {
        self.config.device(device).map(|cfg| (cfg.forward_to.clone(), cfg.receiver.clone()))
    }
}

fn feed_row(
    splitter: &mut Splitter,
    pdu_id: i64,
    device: i64,
    direction: Direction,
    arrival_ns: i64,
    bytes: &[u8],
    strip_smsc: bool,
) {
    match pdu::decode(bytes, direction, strip_smsc) {
        Ok(decoded) => {
            match splitter.add(pdu_id, device, direction, arrival_ns, Some(&decoded)) {
                Classified::Single(_) | Classified::Buffered => {}
                Classified::Mms => debug!(pdu_id, "port-addressed payload skipped"),
                Classified::DecodeFailed => {}
            }
        }
        Err(crate::errors::DecodeError::NotImplemented(reason)) => {
            debug!(pdu_id, reason, "PDU variant not implemented, row retained");
        }
        Err(e) => {
            warn!(pdu_id, error = %e, "PDU decode failed, row retained for operator inspection");
        }
    }
}

fn call_record(rec: &CallRecord) -> Record {
    Record::Call {
        timestamp_ns: rec.resolved_timestamp_ns().unwrap_or(0),
        peer: rec.resolved_peer().to_string(),
        duration_ns: rec.duration,
        call_type: rec.call_type.clone(),
        raw: rec.raw.clone(),
    }
}

fn sms_record(rec: &SmsRecord) -> Record {
    Record::Sms {
        sent_ns: rec.sent_ns(),
        received_ns: rec.received_ns(),
        peer: rec.from.clone(),
        subject: rec.subject.clone(),
        body: rec.body.clone(),
    }
}
