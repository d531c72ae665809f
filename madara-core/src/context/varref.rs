//! `VariableReference`: a stable, non-owning handle to a stored record.
//!
//! Backed by a slot index into the Context's arena rather than the name
//! string, so repeated access skips the name hash/lookup on hot paths.
//! Ids are never reused within a Context's lifetime, so a reference
//! becomes permanently "dangling" (resolves to nothing) only after an
//! explicit `erase` of that name — exactly the invalidation rule in
//! spec §3.2.

pub(crate) type RecordId = u32;

#[derive(Debug, Clone)]
pub struct VariableReference {
    pub(crate) name: String,
    pub(crate) id: RecordId,
}

impl VariableReference {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A leading `.` marks a local (never disseminated) variable.
    pub fn is_local(&self) -> bool {
        self.name.starts_with('.')
    }
}

impl PartialEq for VariableReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VariableReference {}
