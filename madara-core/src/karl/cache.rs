//! Expression cache keyed by literal source string (spec §4.3 "Expression
//! cache"). The source's cache is not internally synchronized; per the
//! §9 design note we choose option (b): guard it behind its own lock so
//! one `Interpreter` can be shared freely across threads.

use super::ast::CompiledExpression;
use crate::error::CompileError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Cache {
    entries: RwLock<HashMap<String, Arc<CompiledExpression>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        source: &str,
    ) -> Result<Arc<CompiledExpression>, Vec<CompileError>> {
        if let Some(hit) = self.entries.read().get(source) {
            return Ok(hit.clone());
        }
        let compiled = Arc::new(super::compile(source)?);
        self.entries
            .write()
            .insert(source.to_string(), compiled.clone());
        Ok(compiled)
    }

    pub fn delete_expression(&self, source: &str) -> bool {
        self.entries.write().remove(source).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_once_and_reuses_entry() {
        let cache = Cache::new();
        let a = cache.get_or_compile("1 + 2").unwrap();
        let b = cache.get_or_compile("1 + 2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn delete_expression_evicts() {
        let cache = Cache::new();
        cache.get_or_compile("1 + 2").unwrap();
        assert!(cache.delete_expression("1 + 2"));
        assert!(cache.is_empty());
        assert!(!cache.delete_expression("1 + 2"));
    }

    #[test]
    fn concurrent_compiles_of_the_same_source_are_safe() {
        use std::thread;
        let cache = Arc::new(Cache::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(thread::spawn(move || {
                cache.get_or_compile("var1 = 10; var2 = 5; var1 / var2 + var2 % 3").unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }
}
