//! `FilterArgs`: the context a filter receives alongside the record(s) it
//! is invoked on (spec §4.4).

use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCode {
    Send,
    Receive,
    Rebroadcast,
}

pub struct FilterArgs<'a> {
    pub originator: &'a str,
    pub operation: OperationCode,
    pub send_bandwidth_used: u64,
    pub ttl: u32,
    pub now: u64,
    pub context: &'a Context,
}
