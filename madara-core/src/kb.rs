//! `Kb`: the composed façade over `Record` + `Context` + KaRL + filters +
//! checkpoints, grounded on the teacher's `commands::api::Commands`
//! struct-plus-builder shape.

use crate::checkpoint::{self, CheckpointSettings, CheckpointWriter};
use crate::config::CoreConfig;
use crate::context::settings::{EvalSettings, KnowledgeUpdateSettings, WaitSettings};
use crate::context::Context;
use crate::error::{CheckpointError, MadaraError};
use crate::filters::FilterChain;
use crate::karl::Interpreter;
use crate::record::Record;
use anyhow::Result;
use parking_lot::Mutex;
use std::fs;
use std::path::Path;

/// A single knowledge base instance: one `Context`, one compiled-expression
/// cache, one filter chain, and the checkpoint watermark tracking what has
/// already been saved.
pub struct Kb {
    context: Context,
    interpreter: Interpreter,
    filters: Mutex<FilterChain>,
    checkpoints: Mutex<CheckpointWriter>,
    config: CoreConfig,
}

pub struct KbBuilder {
    originator: String,
    config: CoreConfig,
    filters: FilterChain,
}

impl KbBuilder {
    pub fn new(originator: impl Into<String>) -> Self {
        Self {
            originator: originator.into(),
            config: CoreConfig::default(),
            filters: FilterChain::new(),
        }
    }

    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    pub fn build(self) -> Kb {
        Kb {
            context: Context::new(self.originator),
            interpreter: Interpreter::new(),
            filters: Mutex::new(self.filters),
            checkpoints: Mutex::new(CheckpointWriter::new()),
            config: self.config,
        }
    }
}

impl Kb {
    pub fn new(originator: impl Into<String>) -> Self {
        KbBuilder::new(originator).build()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn default_update_settings(&self) -> KnowledgeUpdateSettings {
        KnowledgeUpdateSettings {
            clock_increment: self.config.context.default_clock_increment,
            ..KnowledgeUpdateSettings::default()
        }
    }

    pub fn get(&self, name: &str) -> Record {
        self.context.get(name)
    }

    /// Sets `name` to `value` using the configured default clock
    /// increment and the instance's default write quality.
    pub fn set(&self, name: &str, value: impl Into<Record>) -> i32 {
        let mut record = value.into();
        if record.quality == 0 {
            record.quality = self.config.context.default_quality;
            record.write_quality = self.config.context.default_quality;
        }
        self.context.set(name, record, &self.default_update_settings())
    }

    pub fn erase(&self, name: &str) {
        self.context.erase(name);
    }

    /// Compiles (cached) and evaluates `source` against this KB's context.
    pub fn eval(&self, source: &str) -> Result<Record> {
        let settings = EvalSettings {
            base: self.default_update_settings(),
            ..EvalSettings::default()
        };
        self.interpreter
            .eval(source, &self.context, &settings)
            .map_err(MadaraError::Compile)
            .map_err(Into::into)
    }

    pub fn eval_with(&self, source: &str, settings: &EvalSettings) -> Result<Record> {
        self.interpreter
            .eval(source, &self.context, settings)
            .map_err(MadaraError::Compile)
            .map_err(Into::into)
    }

    /// Blocks re-evaluating `source` until truthy or `settings.max_wait_time`.
    pub fn wait(&self, source: &str, settings: &WaitSettings) -> Result<Record> {
        self.interpreter
            .wait(source, &self.context, settings)
            .map_err(MadaraError::Compile)
            .map_err(Into::into)
    }

    pub fn define_function(&self, name: &str, body_source: &str) -> Result<()> {
        self.interpreter
            .define_function(&self.context, name, body_source)
            .map_err(MadaraError::Compile)
            .map_err(Into::into)
    }

    pub fn expand(&self, s: &str) -> Result<String> {
        crate::karl::expand(&self.context, s).map_err(|e| MadaraError::Compile(vec![e]).into())
    }

    pub fn filters(&self) -> parking_lot::MutexGuard<'_, FilterChain> {
        self.filters.lock()
    }

    /// A full snapshot of every name matching `prefixes` (all names if empty).
    pub fn save_context_bytes(&self, prefixes: &[String]) -> Vec<u8> {
        let mut writer = self.checkpoints.lock();
        let state = writer.save_context(&self.context, prefixes);
        checkpoint::write_checkpoint(self.context.originator(), "", std::slice::from_ref(&state))
    }

    /// Only records changed since the last `save_checkpoint*` call.
    pub fn save_checkpoint_bytes(&self, prefixes: &[String]) -> Vec<u8> {
        let mut writer = self.checkpoints.lock();
        let state = writer.save_checkpoint(&self.context, prefixes);
        checkpoint::write_checkpoint(self.context.originator(), "", std::slice::from_ref(&state))
    }

    pub fn save_context_file(&self, path: &Path, prefixes: &[String]) -> Result<()> {
        fs::write(path, self.save_context_bytes(prefixes)).map_err(CheckpointError::from)?;
        Ok(())
    }

    pub fn save_checkpoint_file(&self, path: &Path, prefixes: &[String]) -> Result<()> {
        fs::write(path, self.save_checkpoint_bytes(prefixes)).map_err(CheckpointError::from)?;
        Ok(())
    }

    pub fn save_as_karl(&self, prefixes: &[String]) -> String {
        let state = CheckpointWriter::new().save_context(&self.context, prefixes);
        checkpoint::karl_format::save_as_karl(&state.records)
    }

    pub fn save_as_json(&self, prefixes: &[String]) -> String {
        let state = CheckpointWriter::new().save_context(&self.context, prefixes);
        checkpoint::json_format::save_as_json(&state.records)
    }

    /// Loads a checkpoint file, replaying every record through the
    /// receive filter chain then reconciliation.
    pub fn load_context_file(&self, path: &Path, settings: &CheckpointSettings) -> Result<usize> {
        let bytes = fs::read(path).map_err(CheckpointError::from)?;
        let (_, states) = checkpoint::read_checkpoint(&bytes)?;
        let filters = self.filters.lock();
        Ok(checkpoint::load_context(&self.context, &states, settings, &filters))
    }

    /// Content digest of a saved checkpoint blob, for audit/display.
    pub fn checksum(bytes: &[u8]) -> String {
        blake3::hash(bytes).to_hex().to_string()
    }
}

impl From<i64> for Record {
    fn from(v: i64) -> Self {
        Record::integer(v)
    }
}

impl From<f64> for Record {
    fn from(v: f64) -> Self {
        Record::double(v)
    }
}

impl From<&str> for Record {
    fn from(v: &str) -> Self {
        Record::string(v)
    }
}

impl From<String> for Record {
    fn from(v: String) -> Self {
        Record::string(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip_through_kb() {
        let kb = Kb::new("agent-a");
        kb.set("x", 42i64);
        assert_eq!(kb.get("x").to_integer(), 42);
    }

    #[test]
    fn eval_reads_back_through_context() {
        let kb = Kb::new("agent-a");
        kb.eval(".x = 10").unwrap();
        assert_eq!(kb.get(".x").to_integer(), 10);
    }

    #[test]
    fn checkpoint_round_trips_through_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.kcp");

        let kb = Kb::new("agent-a");
        kb.set("x", 7i64);
        kb.save_context_file(&path, &[]).unwrap();

        let loaded = Kb::new("agent-b");
        let applied = loaded.load_context_file(&path, &CheckpointSettings::default()).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(loaded.get("x").to_integer(), 7);
    }

    #[test]
    fn save_as_karl_and_json_are_non_empty_for_set_values() {
        let kb = Kb::new("agent-a");
        kb.set("x", 1i64);
        assert!(kb.save_as_karl(&[]).contains("x = 1;"));
        assert!(kb.save_as_json(&[]).contains("\"x\""));
    }

    #[test]
    fn eval_surfaces_compile_errors_through_anyhow() {
        let kb = Kb::new("agent-a");
        let err = kb.eval("1 / 0").unwrap_err();
        assert!(err.to_string().contains("compile error"));
    }

    #[test]
    fn checksum_is_stable_for_identical_bytes_and_differs_for_different_bytes() {
        let kb = Kb::new("agent-a");
        kb.set("x", 1i64);
        let bytes = kb.save_context_bytes(&[]);
        assert_eq!(Kb::checksum(&bytes), Kb::checksum(&bytes));

        let kb2 = Kb::new("agent-a");
        kb2.set("x", 2i64);
        let bytes2 = kb2.save_context_bytes(&[]);
        assert_ne!(Kb::checksum(&bytes), Kb::checksum(&bytes2));
    }
}
