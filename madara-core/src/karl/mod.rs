//! KaRL: the embedded expression language (spec §4.3). Lexes, parses
//! into a `NodeId` arena, constant-folds via `prune`, and evaluates tree
//! nodes against a `Context`.

pub mod ast;
pub mod cache;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod prune;
pub mod syscall;
pub mod token;

use crate::context::settings::{EvalSettings, WaitSettings};
use crate::context::Context;
use crate::error::CompileError;
use crate::record::Record;
use ast::CompiledExpression;
use std::time::Instant;

/// Lexes, parses, and prunes `source`, returning the compiled tree or
/// every fatal `CompileError` found.
pub fn compile(source: &str) -> Result<CompiledExpression, Vec<CompileError>> {
    let tokens = lexer::tokenize(source).map_err(|e| vec![e])?;
    let mut compiled = parser::parse(source, tokens).map_err(|e| vec![e])?;
    let mut errors = Vec::new();
    if let Some(root) = compiled.root {
        let (new_root, _) = prune::prune(root, &mut compiled.arena, &mut errors);
        compiled.root = Some(new_root);
    }
    if errors.is_empty() {
        Ok(compiled)
    } else {
        Err(errors)
    }
}

/// Resolves every `{inner}` segment of `s` (spec §4.2 "Expansion"):
/// recursively expands nested segments first, then compiles and
/// evaluates the resulting source against `ctx`, substituting its
/// `to_string()`.
pub fn expand(ctx: &Context, s: &str) -> Result<String, CompileError> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '{' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let mut depth = 1;
        let mut j = i + 1;
        while j < chars.len() && depth > 0 {
            match chars[j] {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if depth != 0 {
            return Err(CompileError::UnbalancedBraces);
        }
        let inner: String = chars[i + 1..j].iter().collect();
        let inner_expanded = expand(ctx, &inner)?;
        let compiled = compile(&inner_expanded).map_err(|mut errs| errs.remove(0))?;
        let value = eval::evaluate(&compiled, ctx, &EvalSettings::default());
        out.push_str(&value.to_string());
        i = j + 1;
    }
    Ok(out)
}

/// Compiles `source` (cached) and evaluates it once against `ctx`.
pub struct Interpreter {
    cache: cache::Cache,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            cache: cache::Cache::new(),
        }
    }

    pub fn eval(
        &self,
        source: &str,
        ctx: &Context,
        settings: &EvalSettings,
    ) -> Result<Record, Vec<CompileError>> {
        let compiled = self.cache.get_or_compile(source)?;
        Ok(eval::evaluate(&compiled, ctx, settings))
    }

    /// Re-evaluates `source` on each `Context` signal (and at latest every
    /// `poll_frequency`) until it is truthy or `max_wait_time` elapses,
    /// per spec §7's suspension-point contract. Returns the last
    /// evaluated result either way.
    pub fn wait(&self, source: &str, ctx: &Context, settings: &WaitSettings) -> Result<Record, Vec<CompileError>> {
        let compiled = self.cache.get_or_compile(source)?;
        let deadline = settings.max_wait_time.map(|d| Instant::now() + d);
        loop {
            let result = eval::evaluate(&compiled, ctx, &settings.base);
            if !result.is_false() {
                return Ok(result);
            }
            let poll = match deadline {
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return Ok(result);
                    }
                    settings.poll_frequency.min(dl - now)
                }
                None => settings.poll_frequency,
            };
            ctx.wait_for_change_timeout(poll);
        }
    }

    pub fn delete_expression(&self, source: &str) -> bool {
        self.cache.delete_expression(source)
    }

    pub fn define_function(&self, ctx: &Context, name: &str, body_source: &str) -> Result<(), Vec<CompileError>> {
        let compiled = compile(body_source)?;
        ctx.define_function(name, crate::context::FunctionBody::Compiled(std::sync::Arc::new(compiled)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::settings::KnowledgeUpdateSettings;

    #[test]
    fn interpreter_caches_compiled_trees() {
        let ctx = Context::new("agent-a");
        let interp = Interpreter::new();
        let settings = EvalSettings::default();
        assert_eq!(interp.eval("1 + 1", &ctx, &settings).unwrap().to_integer(), 2);
        assert_eq!(interp.eval("1 + 1", &ctx, &settings).unwrap().to_integer(), 2);
    }

    #[test]
    fn nested_expansion_segments() {
        let ctx = Context::new("agent-a");
        ctx.set(".a", Record::integer(1), &KnowledgeUpdateSettings::default());
        ctx.set(".b", Record::integer(2), &KnowledgeUpdateSettings::default());
        let out = expand(&ctx, "sum={.a + {.b}}").unwrap();
        assert_eq!(out, "sum=3");
    }

    #[test]
    fn unbalanced_braces_is_an_error() {
        let ctx = Context::new("agent-a");
        assert_eq!(expand(&ctx, "{oops").unwrap_err(), CompileError::UnbalancedBraces);
    }

    #[test]
    fn wait_returns_once_another_thread_sets_the_flag() {
        use crate::context::settings::WaitSettings;
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let ctx = Arc::new(Context::new("agent-a"));
        ctx.set(".ready", Record::integer(0), &KnowledgeUpdateSettings::default());
        let interp = Interpreter::new();

        let writer_ctx = Arc::clone(&ctx);
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer_ctx.set(".ready", Record::integer(1), &KnowledgeUpdateSettings::default());
        });

        let mut settings = WaitSettings::default();
        settings.poll_frequency = Duration::from_millis(5);
        settings.max_wait_time = Some(Duration::from_secs(2));
        let result = interp.wait(".ready", &ctx, &settings).unwrap();
        assert_eq!(result.to_integer(), 1);
        writer.join().unwrap();
    }

    #[test]
    fn wait_times_out_and_returns_last_result() {
        use crate::context::settings::WaitSettings;
        use std::time::Duration;

        let ctx = Context::new("agent-a");
        let interp = Interpreter::new();
        let mut settings = WaitSettings::default();
        settings.poll_frequency = Duration::from_millis(5);
        settings.max_wait_time = Some(Duration::from_millis(30));
        let result = interp.wait(".never", &ctx, &settings).unwrap();
        assert!(result.is_false());
    }

    #[test]
    fn compile_does_not_abort_on_a_system_call_arity_mismatch() {
        assert!(compile("#print(1, 2, 3)").is_ok());
    }

    #[test]
    fn user_defined_function_via_interpreter() {
        let ctx = Context::new("agent-a");
        let interp = Interpreter::new();
        interp.define_function(&ctx, "double", ".0 * 2").unwrap();
        let result = interp.eval("double(21)", &ctx, &EvalSettings::default()).unwrap();
        assert_eq!(result.to_integer(), 42);
    }
}
