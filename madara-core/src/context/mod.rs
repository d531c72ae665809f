//! The Thread-Safe Context (TSC): the concurrent variable store.
//!
//! A single recursive lock protects the records arena, both modification
//! sets, the clock, and the function table, per spec §4.2/§5. The
//! reentrant primitive is `parking_lot::ReentrantMutex`, grounded on
//! `rowanfr-gluon-salsa`'s use of `parking_lot`'s recursive raw lock for
//! its own re-entered database lock (see `DESIGN.md`).

pub mod reconcile;
pub mod settings;
pub mod simtime;
pub mod varref;

use crate::karl::ast::CompiledExpression;
use crate::record::Record;
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use settings::KnowledgeUpdateSettings;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use varref::{RecordId, VariableReference};

/// A user-defined function body: a compiled expression tree bound to
/// positional arguments `.0 .. .N`, a native Rust callback, or an opaque
/// foreign-VM callable (out of scope for this crate; modeled only as a
/// placeholder variant so the enum stays exhaustive for callers that
/// bridge to one).
pub enum FunctionBody {
    Compiled(Arc<CompiledExpression>),
    Native(Arc<dyn Fn(&[Record], &Context) -> Record + Send + Sync>),
    Foreign(Arc<dyn std::any::Any + Send + Sync>),
}

impl std::fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionBody::Compiled(_) => write!(f, "FunctionBody::Compiled"),
            FunctionBody::Native(_) => write!(f, "FunctionBody::Native"),
            FunctionBody::Foreign(_) => write!(f, "FunctionBody::Foreign"),
        }
    }
}

struct Slot {
    name: String,
    record: Record,
}

struct Inner {
    names: BTreeMap<String, RecordId>,
    slots: Vec<Option<Slot>>,
    modifications: BTreeSet<String>,
    local_modifications: BTreeSet<String>,
    clock: u64,
    functions: HashMap<String, FunctionBody>,
}

impl Inner {
    fn new() -> Self {
        Self {
            names: BTreeMap::new(),
            slots: Vec::new(),
            modifications: BTreeSet::new(),
            local_modifications: BTreeSet::new(),
            clock: 0,
            functions: HashMap::new(),
        }
    }

    fn resolve_or_create(&mut self, name: &str) -> RecordId {
        if let Some(&id) = self.names.get(name) {
            return id;
        }
        let id = self.slots.len() as RecordId;
        self.slots.push(Some(Slot {
            name: name.to_string(),
            record: Record::new(),
        }));
        self.names.insert(name.to_string(), id);
        id
    }

    fn slot(&self, id: RecordId) -> Option<&Slot> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: RecordId) -> Option<&mut Slot> {
        self.slots.get_mut(id as usize).and_then(|s| s.as_mut())
    }
}

/// The concurrent shared-variable store. Cheaply `Clone`-able via `Arc`
/// wrapping at the `Kb` façade layer; `Context` itself owns its state.
pub struct Context {
    inner: ReentrantMutex<RefCell<Inner>>,
    /// Bumped on every accepted mutation that signals waiters; paired with
    /// a plain (non-reentrant) mutex/condvar since a reentrant mutex can't
    /// be used directly with a condition variable.
    generation: AtomicU64,
    wait_gate: Mutex<()>,
    change_cv: Condvar,
    shutdown: AtomicBool,
    originator: String,
}

fn now_nanos() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl Context {
    pub fn new(originator: impl Into<String>) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner::new())),
            generation: AtomicU64::new(0),
            wait_gate: Mutex::new(()),
            change_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            originator: originator.into(),
        }
    }

    pub fn originator(&self) -> &str {
        &self.originator
    }

    fn is_global(name: &str) -> bool {
        !name.starts_with('.')
    }

    // -----------------------------------------------------------------
    // acquire/release: expose the recursive lock for multi-step atomic
    // sequences. Idiomatic Rust favors RAII, so `acquire()` returns a
    // guard whose `Drop` performs the release; `ContextGuard::release`
    // is available for callers that want the paired-call shape from the
    // original API.
    // -----------------------------------------------------------------

    pub fn acquire(&self) -> ContextGuard<'_> {
        ContextGuard {
            guard: self.inner.lock(),
        }
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    pub fn get(&self, name: &str) -> Record {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = inner.resolve_or_create(name);
        inner.slot(id).unwrap().record.clone()
    }

    pub fn get_ref(&self, name: &str) -> VariableReference {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = inner.resolve_or_create(name);
        VariableReference {
            name: name.to_string(),
            id,
        }
    }

    pub fn get_by_ref(&self, reference: &VariableReference) -> Record {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        match inner.slot(reference.id) {
            Some(slot) if slot.name == reference.name => slot.record.clone(),
            _ => Record::new(),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        let guard = self.inner.lock();
        let exists = guard.borrow().names.contains_key(name);
        exists
    }

    // -----------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------

    /// Local write. Returns `0` on success, `-1` for an empty key, `-2`
    /// when the write's quality is below the existing record's quality
    /// and `settings.always_overwrite` is not set.
    pub fn set(&self, name: &str, mut value: Record, settings: &KnowledgeUpdateSettings) -> i32 {
        if name.is_empty() {
            return -1;
        }
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = inner.resolve_or_create(name);

        let existing_quality = inner.slot(id).unwrap().record.quality;
        if !settings.always_overwrite && value.write_quality < existing_quality {
            return -2;
        }

        let new_clock = inner.clock.saturating_add_signed(settings.clock_increment);
        inner.clock = new_clock;

        value.clock = new_clock;
        value.toi = now_nanos();
        value.quality = value.write_quality;
        value.originator = self.originator.clone();
        value.status = crate::record::Status::Modified;

        inner.slot_mut(id).unwrap().record = value;
        self.track_modification(&mut inner, name, settings);
        drop(inner);
        drop(guard);
        self.maybe_signal(settings.signal_changes);
        0
    }

    pub fn set_by_ref(
        &self,
        reference: &VariableReference,
        value: Record,
        settings: &KnowledgeUpdateSettings,
    ) -> i32 {
        self.set(&reference.name, value, settings)
    }

    pub fn set_index(
        &self,
        name: &str,
        index: usize,
        value: i64,
        settings: &KnowledgeUpdateSettings,
    ) -> i32 {
        if name.is_empty() {
            return -1;
        }
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = inner.resolve_or_create(name);
        let new_clock = inner.clock.saturating_add_signed(settings.clock_increment);
        inner.clock = new_clock;
        let slot = inner.slot_mut(id).unwrap();
        slot.record.set_index(index, value);
        slot.record.clock = new_clock;
        slot.record.toi = now_nanos();
        slot.record.originator = self.originator.clone();
        self.track_modification(&mut inner, name, settings);
        drop(inner);
        drop(guard);
        self.maybe_signal(settings.signal_changes);
        0
    }

    /// Incoming-update reconciliation path (spec §4.2). `update` carries
    /// its own clock/quality/toi/originator as received from a peer or a
    /// checkpoint replay. Returns `true` if accepted.
    pub fn reconcile(
        &self,
        name: &str,
        update: Record,
        settings: &KnowledgeUpdateSettings,
    ) -> bool {
        if name.is_empty() {
            return false;
        }
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = inner.resolve_or_create(name);
        let local = inner.slot(id).unwrap().record.clone();

        if !reconcile::should_accept(&local, &update, settings.always_overwrite) {
            tracing::trace!(name, "reconciliation rejected incoming update");
            return false;
        }

        inner.clock = inner.clock.max(update.clock) + 1;
        inner.slot_mut(id).unwrap().record = update;

        let track_as_global =
            settings.treat_locals_as_globals || Self::is_global(name);
        if track_as_global {
            inner.modifications.insert(name.to_string());
        }
        drop(inner);
        drop(guard);
        self.maybe_signal(settings.signal_changes);
        true
    }

    fn track_modification(&self, inner: &mut Inner, name: &str, settings: &KnowledgeUpdateSettings) {
        let is_global = Self::is_global(name);
        let track_as_global = (is_global && !settings.treat_globals_as_locals)
            || (!is_global && settings.treat_locals_as_globals);
        if track_as_global {
            inner.modifications.insert(name.to_string());
        }
        if settings.track_local_changes && !is_global {
            inner.local_modifications.insert(name.to_string());
        }
    }

    fn maybe_signal(&self, signal_changes: bool) {
        if !signal_changes {
            return;
        }
        let _gate = self.wait_gate.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.change_cv.notify_all();
    }

    /// Forces `reference` into the modification set without changing its
    /// value.
    pub fn mark_modified(&self, reference: &VariableReference) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.modifications.insert(reference.name.clone());
        drop(inner);
        drop(guard);
        self.maybe_signal(true);
    }

    pub fn apply_modified(&self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let names: Vec<String> = inner
            .names
            .keys()
            .filter(|n| Self::is_global(n))
            .cloned()
            .collect();
        inner.modifications.extend(names);
        drop(inner);
        drop(guard);
        self.maybe_signal(true);
    }

    pub fn clear_modifieds(&self) {
        let guard = self.inner.lock();
        guard.borrow_mut().modifications.clear();
    }

    /// Captures and clears the current modification set, so a failed send
    /// can restore it for retry via `add_modifieds`.
    pub fn save_modifieds(&self) -> Vec<VariableReference> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let names: Vec<String> = inner.modifications.iter().cloned().collect();
        inner.modifications.clear();
        names
            .into_iter()
            .map(|name| {
                let id = inner.resolve_or_create(&name);
                VariableReference { name, id }
            })
            .collect()
    }

    pub fn add_modifieds(&self, refs: Vec<VariableReference>) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        for r in refs {
            inner.modifications.insert(r.name);
        }
    }

    pub fn modifications_len(&self) -> usize {
        self.inner.lock().borrow().modifications.len()
    }

    pub fn local_modifications(&self) -> Vec<String> {
        self.inner
            .lock()
            .borrow()
            .local_modifications
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_local_modifieds(&self) {
        self.inner.lock().borrow_mut().local_modifications.clear();
    }

    pub fn clock(&self) -> u64 {
        self.inner.lock().borrow().clock
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    pub fn clear(&self, name: &str) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if let Some(&id) = inner.names.get(name) {
            if let Some(slot) = inner.slot_mut(id) {
                slot.record.clear();
            }
        }
        inner.modifications.remove(name);
        inner.local_modifications.remove(name);
    }

    pub fn erase(&self, name: &str) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if let Some(id) = inner.names.remove(name) {
            if let Some(slot) = inner.slots.get_mut(id as usize) {
                *slot = None;
            }
        }
        inner.modifications.remove(name);
        inner.local_modifications.remove(name);
    }

    /// All currently-known global variable names, lexicographically
    /// ordered (snapshot stability per spec §3.2).
    pub fn global_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .borrow()
            .names
            .keys()
            .filter(|n| Self::is_global(n))
            .cloned()
            .collect()
    }

    pub fn all_names(&self) -> Vec<String> {
        self.inner.lock().borrow().names.keys().cloned().collect()
    }

    // -----------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------

    pub fn define_function(&self, name: &str, body: FunctionBody) {
        self.inner
            .lock()
            .borrow_mut()
            .functions
            .insert(name.to_string(), body);
    }

    pub fn with_function<R>(&self, name: &str, f: impl FnOnce(Option<&FunctionBody>) -> R) -> R {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        f(inner.functions.get(name))
    }

    /// Resolves each `{inner}` segment of `s` by recursively evaluating
    /// `inner` as a KaRL expression against this context and substituting
    /// its `to_string()` result. Segments may nest; unbalanced braces are
    /// a compile error.
    pub fn expand_statement(&self, s: &str) -> Result<String, crate::error::CompileError> {
        crate::karl::expand(self, s)
    }

    // -----------------------------------------------------------------
    // Wait / notify
    // -----------------------------------------------------------------

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _gate = self.wait_gate.lock();
        self.change_cv.notify_all();
    }

    /// Blocks until the modification set grows (a mutation signaled) or
    /// the context is shut down.
    pub fn wait_for_change(&self) {
        let start_generation = self.generation.load(Ordering::SeqCst);
        let mut gate = self.wait_gate.lock();
        while self.generation.load(Ordering::SeqCst) == start_generation
            && !self.shutdown.load(Ordering::SeqCst)
        {
            self.change_cv.wait(&mut gate);
        }
    }

    /// Same as `wait_for_change` but bounded by `timeout`. Returns `true`
    /// if a change was observed before the deadline.
    pub fn wait_for_change_timeout(&self, timeout: Duration) -> bool {
        let start_generation = self.generation.load(Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        let mut gate = self.wait_gate.lock();
        loop {
            if self.generation.load(Ordering::SeqCst) != start_generation {
                return true;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let remaining = deadline - now;
            let result = self.change_cv.wait_for(&mut gate, remaining);
            if result.timed_out() {
                return self.generation.load(Ordering::SeqCst) != start_generation;
            }
        }
    }
}

/// RAII guard for `Context::acquire`. Holding this across multiple
/// operations lets a caller perform a multi-step atomic sequence; as with
/// any reentrant lock, deadlock avoidance across distinct Contexts is the
/// caller's responsibility.
pub struct ContextGuard<'a> {
    guard: parking_lot::ReentrantMutexGuard<'a, RefCell<Inner>>,
}

impl ContextGuard<'_> {
    /// Explicit release, for callers that prefer the paired acquire/release
    /// call shape over relying on scope-exit `Drop`.
    pub fn release(self) {
        drop(self);
    }
}
