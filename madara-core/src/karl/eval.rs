//! Tree-walking evaluator (spec §4.3 "Evaluate").
//!
//! `evaluate` takes the Context's recursive lock once for the whole
//! expression, so a compound assignment's read-modify-write (and any
//! multi-variable statement) is atomic with respect to other threads —
//! nested `Context::get`/`set` calls simply re-enter the same lock.

use super::ast::{AssignOp, Arena, BinaryOp, CompiledExpression, Node, NodeId};
use super::syscall;
use crate::context::settings::{EvalSettings, KnowledgeUpdateSettings};
use crate::context::{Context, FunctionBody};
use crate::record::Record;

pub fn evaluate(tree: &CompiledExpression, ctx: &Context, settings: &EvalSettings) -> Record {
    let _guard = ctx.acquire();
    match tree.root {
        Some(root) => eval_node(root, &tree.arena, ctx, &settings.base),
        None => Record::new(),
    }
}

fn eval_node(id: NodeId, arena: &Arena, ctx: &Context, settings: &KnowledgeUpdateSettings) -> Record {
    match arena.get(id) {
        Node::Leaf(r) => r.clone(),
        Node::Variable(name) => ctx.get(name),

        Node::ArrayRef(name, idx) => {
            let index = eval_node(*idx, arena, ctx, settings).to_integer().max(0) as usize;
            array_element(&ctx.get(name), index)
        }

        Node::UnaryNot(inner) => {
            let v = eval_node(*inner, arena, ctx, settings);
            Record::integer(if v.is_false() { 1 } else { 0 })
        }

        Node::UnaryNegate(inner) => eval_node(*inner, arena, ctx, settings).negate(),

        Node::PreIncrement(name) => {
            let next = ctx.get(name).add(&Record::integer(1));
            ctx.set(name, next.clone(), settings);
            next
        }
        Node::PreDecrement(name) => {
            let next = ctx.get(name).sub(&Record::integer(1));
            ctx.set(name, next.clone(), settings);
            next
        }
        Node::PostIncrement(name) => {
            let prev = ctx.get(name);
            ctx.set(name, prev.add(&Record::integer(1)), settings);
            prev
        }
        Node::PostDecrement(name) => {
            let prev = ctx.get(name);
            ctx.set(name, prev.sub(&Record::integer(1)), settings);
            prev
        }

        Node::Binary(BinaryOp::Div, l, r) => {
            let lv = eval_node(*l, arena, ctx, settings);
            if lv.is_false() {
                // Short-circuit: 0/x is treated as 0 (Empty) without
                // evaluating `r`, so `r`'s side effects never run.
                return Record::new();
            }
            let rv = eval_node(*r, arena, ctx, settings);
            lv.div(&rv)
        }
        Node::Binary(BinaryOp::And, l, r) => {
            let lv = eval_node(*l, arena, ctx, settings);
            if lv.is_false() {
                return Record::integer(0);
            }
            let rv = eval_node(*r, arena, ctx, settings);
            Record::integer(rv.is_true() as i64)
        }
        Node::Binary(BinaryOp::Or, l, r) => {
            let lv = eval_node(*l, arena, ctx, settings);
            if lv.is_true() {
                return Record::integer(1);
            }
            let rv = eval_node(*r, arena, ctx, settings);
            Record::integer(rv.is_true() as i64)
        }
        Node::Binary(op, l, r) => {
            let lv = eval_node(*l, arena, ctx, settings);
            let rv = eval_node(*r, arena, ctx, settings);
            eval_binary(*op, &lv, &rv)
        }

        Node::Assign(op, name, rhs) => {
            let rv = eval_node(*rhs, arena, ctx, settings);
            let new_value = match op {
                AssignOp::Assign => rv,
                AssignOp::AddAssign => ctx.get(name).add(&rv),
                AssignOp::SubAssign => ctx.get(name).sub(&rv),
                AssignOp::MulAssign => ctx.get(name).mul(&rv),
                AssignOp::DivAssign => ctx.get(name).div(&rv),
            };
            ctx.set(name, new_value.clone(), settings);
            new_value
        }

        Node::ArrayAssign(op, name, idx, rhs) => {
            let index = eval_node(*idx, arena, ctx, settings).to_integer().max(0) as usize;
            let rv = eval_node(*rhs, arena, ctx, settings);
            let current = array_element(&ctx.get(name), index);
            let combined = match op {
                AssignOp::Assign => rv,
                AssignOp::AddAssign => current.add(&rv),
                AssignOp::SubAssign => current.sub(&rv),
                AssignOp::MulAssign => current.mul(&rv),
                AssignOp::DivAssign => current.div(&rv),
            };
            ctx.set_index(name, index, combined.to_integer(), settings);
            combined
        }

        Node::Sequence(children) => {
            let mut last = Record::new();
            for c in children {
                last = eval_node(*c, arena, ctx, settings);
            }
            last
        }

        Node::Implies(l, r) => {
            let lv = eval_node(*l, arena, ctx, settings);
            if lv.is_false() {
                Record::new()
            } else {
                eval_node(*r, arena, ctx, settings)
            }
        }

        Node::ForLoop { var, init, cond, step, body } => {
            eval_node(*init, arena, ctx, settings);
            let mut last = Record::new();
            while eval_node(*cond, arena, ctx, settings).is_true() {
                last = eval_node(*body, arena, ctx, settings);
                eval_node(*step, arena, ctx, settings);
            }
            let _ = var;
            last
        }

        Node::Function(name, args) => {
            let evaluated: Vec<Record> = args.iter().map(|a| eval_node(*a, arena, ctx, settings)).collect();
            call_function(name, &evaluated, ctx, settings)
        }

        Node::SystemCall(name, args) => {
            let evaluated: Vec<Record> = args.iter().map(|a| eval_node(*a, arena, ctx, settings)).collect();
            syscall::call(name, &evaluated, ctx)
        }
    }
}

fn call_function(name: &str, args: &[Record], ctx: &Context, settings: &KnowledgeUpdateSettings) -> Record {
    enum Dispatch {
        Compiled(std::sync::Arc<CompiledExpression>),
        Native(std::sync::Arc<dyn Fn(&[Record], &Context) -> Record + Send + Sync>),
        Foreign,
        Missing,
    }
    let dispatch = ctx.with_function(name, |f| match f {
        Some(FunctionBody::Compiled(tree)) => Dispatch::Compiled(tree.clone()),
        Some(FunctionBody::Native(f)) => Dispatch::Native(f.clone()),
        Some(FunctionBody::Foreign(_)) => Dispatch::Foreign,
        None => Dispatch::Missing,
    });
    match dispatch {
        Dispatch::Compiled(tree) => {
            for (i, arg) in args.iter().enumerate() {
                ctx.set(&format!(".{}", i), arg.clone(), settings);
            }
            match tree.root {
                Some(root) => eval_node(root, &tree.arena, ctx, settings),
                None => Record::new(),
            }
        }
        Dispatch::Native(f) => f(args, ctx),
        Dispatch::Foreign => {
            tracing::warn!(function = name, "foreign-VM functions are not callable from this host");
            Record::new()
        }
        Dispatch::Missing => {
            tracing::warn!(function = name, "call to undefined function at runtime");
            Record::new()
        }
    }
}

fn array_element(record: &Record, index: usize) -> Record {
    match record.variant() {
        crate::record::Variant::IntegerArray(a) => Record::integer(a.get(index).copied().unwrap_or(0)),
        crate::record::Variant::DoubleArray(a) => Record::double(a.get(index).copied().unwrap_or(0.0)),
        crate::record::Variant::String(s) => s
            .chars()
            .nth(index)
            .map(|c| Record::string(c.to_string()))
            .unwrap_or_else(|| Record::string("")),
        _ => Record::new(),
    }
}

fn eval_binary(op: BinaryOp, l: &Record, r: &Record) -> Record {
    match op {
        BinaryOp::Add => l.add(r),
        BinaryOp::Sub => l.sub(r),
        BinaryOp::Mul => l.mul(r),
        BinaryOp::Div => l.div(r),
        BinaryOp::Mod => l.rem(r),
        BinaryOp::Less => Record::integer((l.compare(r) == std::cmp::Ordering::Less) as i64),
        BinaryOp::Leq => Record::integer((l.compare(r) != std::cmp::Ordering::Greater) as i64),
        BinaryOp::Greater => Record::integer((l.compare(r) == std::cmp::Ordering::Greater) as i64),
        BinaryOp::Geq => Record::integer((l.compare(r) != std::cmp::Ordering::Less) as i64),
        BinaryOp::Equal => Record::integer((l.compare(r) == std::cmp::Ordering::Equal) as i64),
        BinaryOp::Neq => Record::integer((l.compare(r) != std::cmp::Ordering::Equal) as i64),
        BinaryOp::And => Record::integer((l.is_true() && r.is_true()) as i64),
        BinaryOp::Or => Record::integer((l.is_true() || r.is_true()) as i64),
    }
}
