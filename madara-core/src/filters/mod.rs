//! Ordered filter chains applied around dissemination (spec §4.4).
//!
//! Three independent chains — send, receive, rebroadcast — each holding
//! record/aggregate/buffer filters in registration order. QoS (`qos.rs`)
//! governs whether a send is attempted at all before any filter runs.

pub mod args;
pub mod qos;

use crate::record::Record;
use args::FilterArgs;
use qos::QosSettings;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub trait RecordFilter: Send + Sync {
    fn apply(&self, record: &mut Record, args: &FilterArgs) -> Record;
}

pub trait AggregateFilter: Send + Sync {
    fn apply(&self, records: &mut BTreeMap<String, Record>, args: &FilterArgs);
}

pub trait BufferFilter: Send + Sync {
    fn apply(&self, buffer: &mut Vec<u8>, used: &mut usize, max_size: usize);
}

#[derive(Default)]
struct Chain {
    record_filters: Vec<Arc<dyn RecordFilter>>,
    aggregate_filters: Vec<Arc<dyn AggregateFilter>>,
    buffer_filters: Vec<Arc<dyn BufferFilter>>,
}

impl Chain {
    fn run_records(&self, records: &mut BTreeMap<String, Record>, args: &FilterArgs) {
        for filter in &self.record_filters {
            for record in records.values_mut() {
                *record = filter.apply(record, args);
            }
        }
        for filter in &self.aggregate_filters {
            filter.apply(records, args);
        }
    }

    fn run_buffer(&self, buffer: &mut Vec<u8>, max_size: usize) {
        let mut used = buffer.len();
        for filter in &self.buffer_filters {
            filter.apply(buffer, &mut used, max_size);
        }
        buffer.truncate(used);
    }
}

/// Counts sends for the deterministic drop-rate simulation below; avoids
/// pulling in a randomness dependency the rest of the stack doesn't need.
#[derive(Default)]
struct DropCounter(AtomicU64);

impl DropCounter {
    fn should_drop(&self, qos: &QosSettings) -> bool {
        if qos.drop_rate.rate <= 0.0 {
            return false;
        }
        let n = self.0.fetch_add(1, Ordering::Relaxed);
        let period = (1.0 / qos.drop_rate.rate).round().max(1.0) as u64;
        match qos.drop_rate.kind {
            qos::DropKind::Probabilistic => n % period == 0,
            qos::DropKind::Bursty => {
                let cycle = n % period;
                cycle < qos.drop_rate.burst_amount as u64
            }
        }
    }
}

#[derive(Default)]
pub struct FilterChain {
    send: Chain,
    receive: Chain,
    rebroadcast: Chain,
    drop_counter: DropCounter,
    pub qos: QosSettings,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_send_record_filter(&mut self, filter: Arc<dyn RecordFilter>) {
        self.send.record_filters.push(filter);
    }

    pub fn add_receive_record_filter(&mut self, filter: Arc<dyn RecordFilter>) {
        self.receive.record_filters.push(filter);
    }

    pub fn add_rebroadcast_record_filter(&mut self, filter: Arc<dyn RecordFilter>) {
        self.rebroadcast.record_filters.push(filter);
    }

    pub fn add_send_aggregate_filter(&mut self, filter: Arc<dyn AggregateFilter>) {
        self.send.aggregate_filters.push(filter);
    }

    pub fn add_send_buffer_filter(&mut self, filter: Arc<dyn BufferFilter>) {
        self.send.buffer_filters.push(filter);
    }

    pub fn add_receive_buffer_filter(&mut self, filter: Arc<dyn BufferFilter>) {
        self.receive.buffer_filters.push(filter);
    }

    /// Applies QoS gating then the send chain. Returns `None` if QoS
    /// dropped the whole send (peer banned, bandwidth exhausted, or the
    /// simulated drop rate fired).
    pub fn apply_send(
        &self,
        mut records: BTreeMap<String, Record>,
        args: &FilterArgs,
    ) -> Option<BTreeMap<String, Record>> {
        if self.qos.is_banned(args.originator) {
            return None;
        }
        if let Some(limit) = self.qos.send_bandwidth_limit {
            if args.send_bandwidth_used > limit {
                return None;
            }
        }
        if self.drop_counter.should_drop(&self.qos) {
            return None;
        }
        self.send.run_records(&mut records, args);
        Some(records)
    }

    pub fn apply_receive(&self, mut records: BTreeMap<String, Record>, args: &FilterArgs) -> BTreeMap<String, Record> {
        self.receive.run_records(&mut records, args);
        records
    }

    pub fn apply_rebroadcast(
        &self,
        mut records: BTreeMap<String, Record>,
        args: &FilterArgs,
    ) -> Option<BTreeMap<String, Record>> {
        if args.ttl == 0 {
            return None;
        }
        self.rebroadcast.run_records(&mut records, args);
        Some(records)
    }

    pub fn apply_send_buffer(&self, buffer: &mut Vec<u8>, max_size: usize) {
        self.send.run_buffer(buffer, max_size);
    }

    pub fn apply_receive_buffer(&self, buffer: &mut Vec<u8>, max_size: usize) {
        self.receive.run_buffer(buffer, max_size);
    }
}

pub use args::FilterArgs as Args;
pub use args::OperationCode as Op;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::filters::args::OperationCode;
    use crate::record::Record;

    struct UppercaseTag;
    impl RecordFilter for UppercaseTag {
        fn apply(&self, record: &mut Record, _args: &FilterArgs) -> Record {
            Record::string(record.to_string().to_uppercase())
        }
    }

    #[test]
    fn send_chain_runs_record_filters() {
        let ctx = Context::new("agent-a");
        let mut chain = FilterChain::new();
        chain.add_send_record_filter(Arc::new(UppercaseTag));
        let mut records = BTreeMap::new();
        records.insert("k".to_string(), Record::string("hi"));
        let args = FilterArgs {
            originator: "agent-a",
            operation: OperationCode::Send,
            send_bandwidth_used: 0,
            ttl: 8,
            now: 0,
            context: &ctx,
        };
        let result = chain.apply_send(records, &args).unwrap();
        assert_eq!(result["k"].to_string(), "HI");
    }

    #[test]
    fn banned_peer_drops_entire_send() {
        let ctx = Context::new("agent-a");
        let mut chain = FilterChain::new();
        chain.qos.banned_peers.insert("agent-a".to_string());
        let args = FilterArgs {
            originator: "agent-a",
            operation: OperationCode::Send,
            send_bandwidth_used: 0,
            ttl: 8,
            now: 0,
            context: &ctx,
        };
        assert!(chain.apply_send(BTreeMap::new(), &args).is_none());
    }

    #[test]
    fn rebroadcast_stops_at_zero_ttl() {
        let ctx = Context::new("agent-a");
        let chain = FilterChain::new();
        let args = FilterArgs {
            originator: "agent-a",
            operation: OperationCode::Rebroadcast,
            send_bandwidth_used: 0,
            ttl: 0,
            now: 0,
            context: &ctx,
        };
        assert!(chain.apply_rebroadcast(BTreeMap::new(), &args).is_none());
    }

    #[test]
    fn probabilistic_drop_rate_fires_periodically() {
        let qos = QosSettings {
            drop_rate: qos::DropRate {
                rate: 0.5,
                kind: qos::DropKind::Probabilistic,
                burst_amount: 1,
            },
            ..Default::default()
        };
        let counter = DropCounter::default();
        let drops = (0..4).filter(|_| counter.should_drop(&qos)).count();
        assert_eq!(drops, 2);
    }
}
