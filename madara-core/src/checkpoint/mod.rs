//! Checkpoint I/O: save/load a `Context`'s knowledge through the bit-exact
//! binary format in `codec`, plus human-readable KaRL/JSON exporters
//! (spec §4.5/§6).

pub mod codec;
pub mod json_format;
pub mod karl_format;

use crate::context::settings::KnowledgeUpdateSettings;
use crate::context::{simtime, Context};
use crate::filters::args::{FilterArgs, OperationCode};
use crate::filters::FilterChain;
use crate::record::Record;
use std::collections::HashMap;

pub use codec::{read_checkpoint, write_checkpoint, Header};

#[derive(Debug, Clone, Default)]
pub struct CheckpointSettings {
    pub prefixes: Vec<String>,
    pub clear_knowledge: bool,
    pub ignore_header_check: bool,
    pub override_lamport: Option<u64>,
    pub override_timestamp: Option<u64>,
    pub playback_simtime: bool,
    pub states: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct State {
    pub records: Vec<(String, Record)>,
}

/// Tracks per-key clocks last written to a checkpoint, so `save_checkpoint`
/// can emit only what changed since the previous call.
#[derive(Default)]
pub struct CheckpointWriter {
    watermark: HashMap<String, u64>,
}

impl CheckpointWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching_names(ctx: &Context, prefixes: &[String]) -> Vec<String> {
        let mut names = ctx.global_names();
        if !prefixes.is_empty() {
            names.retain(|n| prefixes.iter().any(|p| n.starts_with(p.as_str())));
        }
        names
    }

    /// A full snapshot of every name matching `prefixes` (all names if empty).
    pub fn save_context(&mut self, ctx: &Context, prefixes: &[String]) -> State {
        let names = Self::matching_names(ctx, prefixes);
        let records: Vec<(String, Record)> = names
            .into_iter()
            .map(|n| {
                let r = ctx.get(&n);
                self.watermark.insert(n.clone(), r.clock);
                (n, r)
            })
            .collect();
        State { records }
    }

    /// Only the records whose clock has advanced since the last call,
    /// advancing the watermark.
    pub fn save_checkpoint(&mut self, ctx: &Context, prefixes: &[String]) -> State {
        let names = Self::matching_names(ctx, prefixes);
        let mut records = Vec::new();
        for name in names {
            let r = ctx.get(&name);
            let changed = self.watermark.get(&name).map(|&c| r.clock > c).unwrap_or(true);
            if changed {
                self.watermark.insert(name.clone(), r.clock);
                records.push((name, r));
            }
        }
        State { records }
    }
}

/// Replays `states` into `ctx`, running each record through the receive
/// filter chain and then the reconciliation protocol (spec §4.5).
pub fn load_context(
    ctx: &Context,
    states: &[State],
    settings: &CheckpointSettings,
    filters: &FilterChain,
) -> usize {
    if settings.clear_knowledge {
        for name in ctx.all_names() {
            ctx.erase(&name);
        }
    }
    let mut applied = 0;
    let update_settings = KnowledgeUpdateSettings::default();
    let range = settings.states.unwrap_or((0, states.len()));
    for state in states.iter().take(range.1).skip(range.0) {
        for (name, mut record) in state.records.clone() {
            if !settings.prefixes.is_empty() && !settings.prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                continue;
            }
            if let Some(clock) = settings.override_lamport {
                record.clock = clock;
            }
            if let Some(toi) = settings.override_timestamp {
                record.toi = toi;
            }
            if settings.playback_simtime {
                simtime::advance_to(record.toi);
            }
            let args = FilterArgs {
                originator: ctx.originator(),
                operation: OperationCode::Receive,
                send_bandwidth_used: 0,
                ttl: 0,
                now: record.toi,
                context: ctx,
            };
            let mut batch = std::collections::BTreeMap::new();
            batch.insert(name.clone(), record);
            let filtered = filters.apply_receive(batch, &args);
            if let Some(record) = filtered.into_iter().next().map(|(_, r)| r) {
                if ctx.reconcile(&name, record, &update_settings) {
                    applied += 1;
                }
            }
        }
    }
    applied
}
