//! Session window merging (`4.4.2`).

use crate::aggregate::AggregateOperation;
use crate::context::Context;
use crate::inbox::Inbox;
use crate::item::{Edge, Watermark, WindowResult};
use crate::outbox::Outbox;
use crate::processor::Processor;
use crate::snapshot;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use weir_error::ProcessorError;

struct Session<A> {
    start: i64,
    end: i64,
    acc: A,
}

/// Snapshot key schema for this operator (`4.5`, "Sessions: key = (partitionKey,
/// sessionStart)").
#[derive(Serialize, Deserialize)]
struct SessionKey<K> {
    key: K,
    start: i64,
}

#[derive(Serialize, Deserialize)]
struct SessionValue<A> {
    end: i64,
    acc: A,
}

/// Session window aggregation: sessions close `timeout` after the last event that
/// extended them and are emitted once a watermark passes their end.
pub struct SessionWindow<K, I, A, R> {
    timeout: i64,
    key_fn: Arc<dyn Fn(&I) -> K + Send + Sync>,
    ts_fn: Arc<dyn Fn(&I) -> i64 + Send + Sync>,
    op: AggregateOperation<A, I, R>,
    // Kept sorted by `start`; disjoint by construction.
    sessions: BTreeMap<K, Vec<Session<A>>>,
    pending: VecDeque<WindowResult<K, R>>,
    pending_watermark: Option<Watermark>,
    snapshot_cursor: Option<VecDeque<(Vec<u8>, Vec<u8>)>>,
}

impl<K, I, A, R> SessionWindow<K, I, A, R>
where
    K: Ord + Clone + Send + 'static,
    I: Send + 'static,
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        timeout: i64,
        key_fn: impl Fn(&I) -> K + Send + Sync + 'static,
        ts_fn: impl Fn(&I) -> i64 + Send + Sync + 'static,
        op: AggregateOperation<A, I, R>,
    ) -> Self {
        assert!(timeout > 0, "session timeout must be positive");
        SessionWindow {
            timeout,
            key_fn: Arc::new(key_fn),
            ts_fn: Arc::new(ts_fn),
            op,
            sessions: BTreeMap::new(),
            pending: VecDeque::new(),
            pending_watermark: None,
            snapshot_cursor: None,
        }
    }

    fn accumulate(&mut self, item: I) {
        let key = (self.key_fn)(&item);
        let t = (self.ts_fn)(&item);
        let new_end = t + self.timeout;
        let list = self.sessions.entry(key).or_default();

        let mut start = t;
        let mut end = new_end;
        let mut merged: Option<A> = None;
        let mut i = 0;
        while i < list.len() {
            let overlaps = list[i].start <= new_end && list[i].end >= t;
            if overlaps {
                let removed = list.remove(i);
                start = start.min(removed.start);
                end = end.max(removed.end);
                merged = Some(match merged {
                    None => removed.acc,
                    Some(acc) => self.op.combine(&acc, &removed.acc),
                });
            } else {
                i += 1;
            }
        }

        let mut acc = merged.unwrap_or_else(|| self.op.create());
        self.op.accumulate(&mut acc, &item);

        let insert_at = list.partition_point(|s| s.start < start);
        list.insert(insert_at, Session { start, end, acc });
    }

    fn schedule_through(&mut self, wm: i64) {
        let mut due: Vec<WindowResult<K, R>> = Vec::new();
        self.sessions.retain(|key, list| {
            let mut remaining = Vec::with_capacity(list.len());
            for session in list.drain(..) {
                if session.end <= wm {
                    due.push(WindowResult::new(
                        session.start,
                        session.end,
                        key.clone(),
                        self.op.finish(&session.acc),
                    ));
                } else {
                    remaining.push(session);
                }
            }
            *list = remaining;
            !list.is_empty()
        });
        due.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
        self.pending.extend(due);
    }

    fn drain_pending(&mut self, outbox: &mut Outbox<WindowResult<K, R>>) -> Result<bool, ProcessorError>
    where
        WindowResult<K, R>: Clone,
    {
        while let Some(entry) = self.pending.front() {
            if outbox.offer(0, Edge::Data(entry.clone()))? {
                self.pending.pop_front();
            } else {
                return Ok(false);
            }
        }
        if let Some(wm) = self.pending_watermark {
            if !outbox.offer(0, Edge::Watermark(wm))? {
                return Ok(false);
            }
            self.pending_watermark = None;
        }
        Ok(true)
    }
}

impl<K, I, A, R> Processor for SessionWindow<K, I, A, R>
where
    K: Ord + Clone + Send + Serialize + DeserializeOwned + 'static,
    I: Send + 'static,
    A: Send + Serialize + DeserializeOwned + 'static,
    R: Send + Clone + 'static,
{
    type In = I;
    type Out = WindowResult<K, R>;

    fn is_cooperative(&self) -> bool {
        true
    }

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Self::In>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<(), ProcessorError> {
        if !self.drain_pending(outbox)? {
            return Ok(());
        }
        while let Some(item) = inbox.peek() {
            match item {
                Edge::Watermark(wm) => {
                    let wm = *wm;
                    self.schedule_through(wm.timestamp());
                    self.pending_watermark = Some(wm);
                    inbox.poll();
                    if !self.drain_pending(outbox)? {
                        return Ok(());
                    }
                }
                Edge::Data(_) => {
                    let Edge::Data(data) = inbox.poll().unwrap() else {
                        unreachable!()
                    };
                    self.accumulate(data);
                }
            }
        }
        Ok(())
    }

    fn complete_edge(
        &mut self,
        _ordinal: usize,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<bool, ProcessorError> {
        if self.pending.is_empty() && self.pending_watermark.is_none() {
            self.schedule_through(i64::MAX);
        }
        self.drain_pending(outbox)
    }

    fn save_snapshot(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool, ProcessorError> {
        if self.snapshot_cursor.is_none() {
            let mut queue = VecDeque::new();
            for (key, list) in &self.sessions {
                for session in list {
                    queue.push_back((
                        snapshot::encode(&SessionKey {
                            key: key.clone(),
                            start: session.start,
                        })?,
                        snapshot::encode(&SessionValue {
                            end: session.end,
                            acc: &session.acc,
                        })?,
                    ));
                }
            }
            self.snapshot_cursor = Some(queue);
        }
        let queue = self.snapshot_cursor.as_mut().unwrap();
        while let Some((key, value)) = queue.front() {
            if outbox.offer_to_snapshot(key.clone(), value.clone())? {
                queue.pop_front();
            } else {
                return Ok(false);
            }
        }
        self.snapshot_cursor = None;
        Ok(true)
    }

    fn restore_snapshot(&mut self, entries: &mut Inbox<(Vec<u8>, Vec<u8>)>) -> Result<(), ProcessorError> {
        while let Some(edge) = entries.poll() {
            let Edge::Data((key_bytes, value_bytes)) = edge else {
                continue;
            };
            let key: SessionKey<K> = snapshot::decode(&key_bytes)?;
            let value: SessionValue<A> = snapshot::decode(&value_bytes)?;
            let list = self.sessions.entry(key.key).or_default();
            let insert_at = list.partition_point(|s| s.start < key.start);
            list.insert(
                insert_at,
                Session {
                    start: key.start,
                    end: value.end,
                    acc: value.acc,
                },
            );
        }
        Ok(())
    }
}
