//! Closed option sets for read/write/eval/wait operations (spec §6).

use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeReferenceSettings {
    pub expand_variables: bool,
    pub never_exit: bool,
}

#[derive(Debug, Clone)]
pub struct KnowledgeUpdateSettings {
    pub expand_variables: bool,
    pub never_exit: bool,
    pub treat_globals_as_locals: bool,
    pub signal_changes: bool,
    pub always_overwrite: bool,
    pub track_local_changes: bool,
    pub clock_increment: i64,
    pub treat_locals_as_globals: bool,
    pub stream_changes: bool,
}

impl Default for KnowledgeUpdateSettings {
    fn default() -> Self {
        Self {
            expand_variables: false,
            never_exit: false,
            treat_globals_as_locals: false,
            signal_changes: true,
            always_overwrite: false,
            track_local_changes: false,
            clock_increment: 1,
            treat_locals_as_globals: false,
            stream_changes: false,
        }
    }
}

impl From<KnowledgeReferenceSettings> for KnowledgeUpdateSettings {
    fn from(r: KnowledgeReferenceSettings) -> Self {
        Self {
            expand_variables: r.expand_variables,
            never_exit: r.never_exit,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvalSettings {
    pub base: KnowledgeUpdateSettings,
    pub delay_sending_modifieds: bool,
    pub pre_print_statement: Option<String>,
    pub post_print_statement: Option<String>,
    pub send_list: BTreeSet<String>,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            base: KnowledgeUpdateSettings::default(),
            delay_sending_modifieds: false,
            pre_print_statement: None,
            post_print_statement: None,
            send_list: BTreeSet::new(),
        }
    }
}

impl std::ops::Deref for EvalSettings {
    type Target = KnowledgeUpdateSettings;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl std::ops::DerefMut for EvalSettings {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

#[derive(Debug, Clone)]
pub struct WaitSettings {
    pub base: EvalSettings,
    pub poll_frequency: Duration,
    /// `None` means wait indefinitely.
    pub max_wait_time: Option<Duration>,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            base: EvalSettings::default(),
            poll_frequency: Duration::from_millis(100),
            max_wait_time: None,
        }
    }
}

impl std::ops::Deref for WaitSettings {
    type Target = EvalSettings;
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
