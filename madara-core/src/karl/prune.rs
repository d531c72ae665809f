//! Compile-time constant folding (spec §4.3 "Prune").
//!
//! `prune` recurses into every child first; whenever a child reports
//! `can_change = false`, its slot already holds (or has just been
//! replaced with) a `Leaf`, so the parent can read its value directly.
//! `can_change` is true for any node that is itself a `Variable`,
//! `Function`, `SystemCall`, increment/decrement, or an assignment —
//! these always depend on Context state, even when their operands don't.

use super::ast::{Arena, BinaryOp, Node, NodeId};
use super::syscall;
use crate::error::CompileError;
use crate::record::Record;

pub fn prune(id: NodeId, arena: &mut Arena, errors: &mut Vec<CompileError>) -> (NodeId, bool) {
    let node = arena.get(id).clone();
    match node {
        Node::Leaf(_) => (id, false),
        Node::Variable(_) => (id, true),

        Node::ArrayRef(name, idx) => {
            let (idx, _) = prune(idx, arena, errors);
            arena.set(id, Node::ArrayRef(name, idx));
            (id, true)
        }

        Node::UnaryNot(inner) => {
            let (inner, can_change) = prune(inner, arena, errors);
            if can_change {
                arena.set(id, Node::UnaryNot(inner));
                (id, true)
            } else {
                let v = const_value(inner, arena);
                let folded = Record::integer(if v.is_false() { 1 } else { 0 });
                (arena.push(Node::Leaf(folded)), false)
            }
        }

        Node::UnaryNegate(inner) => {
            let (inner, can_change) = prune(inner, arena, errors);
            if can_change {
                arena.set(id, Node::UnaryNegate(inner));
                (id, true)
            } else {
                let v = const_value(inner, arena).negate();
                (arena.push(Node::Leaf(v)), false)
            }
        }

        Node::PreIncrement(_)
        | Node::PreDecrement(_)
        | Node::PostIncrement(_)
        | Node::PostDecrement(_) => (id, true),

        Node::Binary(op, l, r) => {
            let (l, cl) = prune(l, arena, errors);
            let (r, cr) = prune(r, arena, errors);
            if cl || cr {
                arena.set(id, Node::Binary(op, l, r));
                return (id, true);
            }
            let lv = const_value(l, arena);
            let rv = const_value(r, arena);
            match op {
                BinaryOp::Div if rv.to_double() == 0.0 => {
                    errors.push(CompileError::ConstantDivideByZero);
                    arena.set(id, Node::Binary(op, l, r));
                    (id, true)
                }
                BinaryOp::Mod if rv.to_double() == 0.0 => {
                    errors.push(CompileError::ConstantModuloByZero);
                    arena.set(id, Node::Binary(op, l, r));
                    (id, true)
                }
                _ => {
                    let folded = eval_binary(op, &lv, &rv);
                    (arena.push(Node::Leaf(folded)), false)
                }
            }
        }

        Node::Assign(op, name, rhs) => {
            let (rhs, _) = prune(rhs, arena, errors);
            arena.set(id, Node::Assign(op, name, rhs));
            (id, true)
        }

        Node::ArrayAssign(op, name, idx, rhs) => {
            let (idx, _) = prune(idx, arena, errors);
            let (rhs, _) = prune(rhs, arena, errors);
            arena.set(id, Node::ArrayAssign(op, name, idx, rhs));
            (id, true)
        }

        Node::Sequence(children) => {
            let mut new_children = Vec::with_capacity(children.len());
            let mut any_change = false;
            for c in children {
                let (nc, cc) = prune(c, arena, errors);
                any_change |= cc;
                new_children.push(nc);
            }
            if any_change {
                arena.set(id, Node::Sequence(new_children));
                (id, true)
            } else {
                let last = *new_children.last().expect("sequence has at least one child");
                let value = const_value(last, arena);
                (arena.push(Node::Leaf(value)), false)
            }
        }

        Node::Implies(l, r) => {
            let (l, cl) = prune(l, arena, errors);
            let (r, cr) = prune(r, arena, errors);
            if cl || cr {
                arena.set(id, Node::Implies(l, r));
                (id, true)
            } else {
                let lv = const_value(l, arena);
                let value = if lv.is_false() {
                    Record::new()
                } else {
                    const_value(r, arena)
                };
                (arena.push(Node::Leaf(value)), false)
            }
        }

        Node::ForLoop {
            var,
            init,
            cond,
            step,
            body,
        } => {
            let (init, _) = prune(init, arena, errors);
            let (cond, _) = prune(cond, arena, errors);
            let (step, _) = prune(step, arena, errors);
            let (body, _) = prune(body, arena, errors);
            arena.set(
                id,
                Node::ForLoop {
                    var,
                    init,
                    cond,
                    step,
                    body,
                },
            );
            (id, true)
        }

        Node::Function(name, args) => {
            let new_args = args
                .into_iter()
                .map(|a| prune(a, arena, errors).0)
                .collect();
            arena.set(id, Node::Function(name, new_args));
            (id, true)
        }

        Node::SystemCall(name, args) => {
            let new_args: Vec<NodeId> = args
                .into_iter()
                .map(|a| prune(a, arena, errors).0)
                .collect();
            match syscall::lookup(&name) {
                None => errors.push(CompileError::UnknownSystemCall { name: name.clone() }),
                Some(spec) => {
                    // Arity mismatch at compile time is logged, not fatal: a
                    // caller may dynamically inject arguments before the
                    // tree is ever evaluated, and the runtime dispatcher in
                    // `syscall::call` re-checks arity on every call anyway.
                    if !spec.arities.contains(&new_args.len()) {
                        let err = CompileError::SystemCallArity {
                            name: name.clone(),
                            expected: spec.arity_description,
                            got: new_args.len(),
                        };
                        tracing::warn!(syscall = name.as_str(), "{err}");
                    }
                }
            }
            arena.set(id, Node::SystemCall(name, new_args));
            (id, true)
        }
    }
}

fn const_value(id: NodeId, arena: &Arena) -> Record {
    match arena.get(id) {
        Node::Leaf(r) => r.clone(),
        other => unreachable!("const_value called on non-leaf node {:?}", other),
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
