//! Lowers a semantically checked [`Program`] to the [`ClassFile`] the core
//! consumes: local variables become slot indices, `if`/`while`/short-circuit
//! `&&`/`||` become explicit branches with resolved absolute target PCs, and
//! arithmetic/comparison expressions become postfix bytecode sequences.
//!
//! This is the only place label-to-PC resolution happens on the front-end
//! side; everything downstream of here (the tuple decoder) sees already-
//! resolved absolute branch targets.

use crate::classfile::{ClassFile, MethodRecord, Op};
use crate::common::{Descriptor, Id, Map, MethodKey, Type};
use crate::diagnostics::CompileError;
use crate::front::ast::{BOp, Expr, Method, Program, Stmt, UOp};

pub fn emit(program: &Program) -> Result<ClassFile, CompileError> {
    let signatures = signature_table(program);
    let methods = program
        .methods
        .iter()
        .map(|m| emit_method(m, &signatures))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ClassFile { methods })
}

/// Every callable name in scope, builtins included, by descriptor. Built the
/// same way `front::sema` builds its own table; kept separate so the
/// emitter stays decoupled from the checker (it trusts that `sema::check`
/// already ran and rejected anything that would make a lookup here fail).
fn signature_table(program: &Program) -> Map<Id, Descriptor> {
    let mut m = Map::new();
    m.insert(
        internment::Intern::new("read".to_string()),
        Descriptor {
            params: vec![],
            ret: Type::Int,
        },
    );
    m.insert(
        internment::Intern::new("write".to_string()),
        Descriptor {
            params: vec![Type::Int],
            ret: Type::Void,
        },
    );
    for method in &program.methods {
        m.insert(
            method.name,
            Descriptor {
                params: method.params.iter().map(|(_, t)| *t).collect(),
                ret: method.ret,
            },
        );
    }
    m
}

/// A branch target not yet resolved to an absolute PC.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct Label(usize);

/// Bytecode-shaped instruction carrying symbolic labels instead of resolved
/// PCs; converted to [`Op`] once every instruction's PC is known.
enum Raw {
    Op(Op),
    Goto(Label),
    Ifeq(Label),
    Ifne(Label),
    IfIcmpeq(Label),
    IfIcmpne(Label),
    IfIcmplt(Label),
    IfIcmpge(Label),
    IfIcmpgt(Label),
    IfIcmple(Label),
    /// Zero-width marker recording where a label points.
    Mark(Label),
}

impl Raw {
    fn width(&self) -> u32 {
        match self {
            Raw::Op(op) => op.width(),
            Raw::Mark(_) => 0,
            _ => 3,
        }
    }
}

struct MethodEmitter<'sig> {
    raw: Vec<Raw>,
    next_label: usize,
    locals: Map<Id, (u16, Type)>,
    next_slot: u16,
    signatures: &'sig Map<Id, Descriptor>,
}

impl<'sig> MethodEmitter<'sig> {
    fn new(signatures: &'sig Map<Id, Descriptor>) -> Self {
        MethodEmitter {
            raw: Vec::new(),
            next_label: 0,
            locals: Map::new(),
            next_slot: 0,
            signatures,
        }
    }

    fn fresh_label(&mut self) -> Label {
        let l = Label(self.next_label);
        self.next_label += 1;
        l
    }

    fn mark(&mut self, label: Label) {
        self.raw.push(Raw::Mark(label));
    }

    fn push(&mut self, op: Op) {
        self.raw.push(Raw::Op(op));
    }

    fn goto(&mut self, target: Label) {
        self.raw.push(Raw::Goto(target));
    }

    fn declare_local(&mut self, id: Id, ty: Type) -> u16 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.locals.insert(id, (slot, ty));
        slot
    }

    fn slot_of(&self, id: Id) -> u16 {
        // Checked by sema::check already; a miss here is an internal error.
        self.locals
            .get(&id)
            .unwrap_or_else(|| panic!("unresolved local {id} reached the bytecode emitter"))
            .0
    }

    /// Resolve labels to absolute PCs and produce the final linear code.
    fn finish(self) -> Vec<Op> {
        let mut pc = 0u32;
        let mut label_pc: Map<usize, u32> = Map::new();
        for r in &self.raw {
            if let Raw::Mark(Label(id)) = r {
                label_pc.insert(*id, pc);
            }
            pc += r.width();
        }

        let resolve = |l: &Label| *label_pc.get(&l.0).expect("label marked before resolution");

        self.raw
            .into_iter()
            .filter_map(|r| match r {
                Raw::Op(op) => Some(op),
                Raw::Mark(_) => None,
                Raw::Goto(l) => Some(Op::Goto(resolve(&l))),
                Raw::Ifeq(l) => Some(Op::Ifeq(resolve(&l))),
                Raw::Ifne(l) => Some(Op::Ifne(resolve(&l))),
                Raw::IfIcmpeq(l) => Some(Op::IfIcmpeq(resolve(&l))),
                Raw::IfIcmpne(l) => Some(Op::IfIcmpne(resolve(&l))),
                Raw::IfIcmplt(l) => Some(Op::IfIcmplt(resolve(&l))),
                Raw::IfIcmpge(l) => Some(Op::IfIcmpge(resolve(&l))),
                Raw::IfIcmpgt(l) => Some(Op::IfIcmpgt(resolve(&l))),
                Raw::IfIcmple(l) => Some(Op::IfIcmple(resolve(&l))),
            })
            .collect()
    }
}

fn emit_method(
    method: &Method,
    signatures: &Map<Id, Descriptor>,
) -> Result<MethodRecord, CompileError> {
    let mut em = MethodEmitter::new(signatures);
    for (id, ty) in &method.params {
        em.declare_local(*id, *ty);
    }
    emit_block(&mut em, &method.body)?;
    // Any label marked at the very end of the body (the join point of a
    // trailing `if`/`else`, `!`, or `&&`/`||`) must resolve to a real PC, not
    // one past the last tuple. A method whose last statement already returns
    // on every path leaves this trailing return dead; the control-flow
    // builder prunes it exactly like any other unreachable tail.
    em.push(Op::Return);

    let max_locals = em.next_slot;
    let code = em.finish();
    Ok(MethodRecord {
        name: method.name,
        descriptor: Descriptor {
            params: method.params.iter().map(|(_, t)| *t).collect(),
            ret: method.ret,
        },
        max_locals,
        code,
    })
}

fn emit_block(em: &mut MethodEmitter<'_>, stmts: &[Stmt]) -> Result<(), CompileError> {
    for stmt in stmts {
        emit_stmt(em, stmt)?;
    }
    Ok(())
}

fn emit_stmt(em: &mut MethodEmitter<'_>, stmt: &Stmt) -> Result<(), CompileError> {
    match stmt {
        Stmt::VarDecl(id, ty, value) => {
            emit_expr(em, value)?;
            let slot = em.declare_local(*id, *ty);
            em.push(Op::Istore(slot));
        }
        Stmt::Assign(id, value) => {
            emit_expr(em, value)?;
            em.push(Op::Istore(em.slot_of(*id)));
        }
        Stmt::ExprStmt(e) => {
            let is_void_call = matches!(e, Expr::Call(name, _) if name.as_str() == "write");
            emit_expr(em, e)?;
            if !is_void_call {
                em.push(Op::Pop);
            }
        }
        Stmt::If { cond, tt, ff } => {
            let else_label = em.fresh_label();
            let end_label = em.fresh_label();
            emit_branch_if_false(em, cond, else_label)?;
            emit_block(em, tt)?;
            em.goto(end_label);
            em.mark(else_label);
            emit_block(em, ff)?;
            em.mark(end_label);
        }
        Stmt::While { cond, body } => {
            let head = em.fresh_label();
            let end_label = em.fresh_label();
            em.mark(head);
            emit_branch_if_false(em, cond, end_label)?;
            emit_block(em, body)?;
            em.goto(head);
            em.mark(end_label);
        }
        Stmt::Return(value) => {
            match value {
                Some(e) => {
                    emit_expr(em, e)?;
                    em.push(Op::Ireturn);
                }
                None => em.push(Op::Return),
            }
        }
    }
    Ok(())
}

/// Emit `cond`'s evaluation, branching to `target` when it is false.
/// Comparison expressions lower directly to `IF_ICMP**`; anything else
/// (a boolean variable, `&&`, `||`, a call) is compared against `false`.
fn emit_branch_if_false(
    em: &mut MethodEmitter<'_>,
    cond: &Expr,
    target: Label,
) -> Result<(), CompileError> {
    match cond {
        Expr::Binary(op @ (BOp::Lt | BOp::Le | BOp::Gt | BOp::Ge | BOp::Eq | BOp::Ne), lhs, rhs) => {
            emit_expr(em, lhs)?;
            emit_expr(em, rhs)?;
            // Branch on the *inverse* condition straight to `target`.
            let inverse = |op: BOp| -> fn(Label) -> Raw {
                match op {
                    BOp::Lt => |l| Raw::IfIcmpge(l),
                    BOp::Le => |l| Raw::IfIcmpgt(l),
                    BOp::Gt => |l| Raw::IfIcmple(l),
                    BOp::Ge => |l| Raw::IfIcmplt(l),
                    BOp::Eq => |l| Raw::IfIcmpne(l),
                    BOp::Ne => |l| Raw::IfIcmpeq(l),
                    _ => unreachable!(),
                }
            };
            em.raw.push(inverse(*op)(target));
            Ok(())
        }
        Expr::Binary(BOp::And, lhs, rhs) => {
            // short-circuit: if lhs is false, skip rhs and jump to target.
            emit_branch_if_false(em, lhs, target)?;
            emit_branch_if_false(em, rhs, target)
        }
        Expr::Binary(BOp::Or, lhs, rhs) => {
            // if lhs is true, fall through to the body; only both-false branches away.
            let continue_label = em.fresh_label();
            emit_branch_if_true(em, lhs, continue_label)?;
            emit_branch_if_false(em, rhs, target)?;
            em.mark(continue_label);
            Ok(())
        }
        Expr::Unary(UOp::Not, inner) => emit_branch_if_true(em, inner, target),
        _ => {
            emit_expr(em, cond)?;
            em.raw.push(Raw::Ifeq(target));
            Ok(())
        }
    }
}

/// Emit `cond`'s evaluation, branching to `target` when it is true.
fn emit_branch_if_true(
    em: &mut MethodEmitter<'_>,
    cond: &Expr,
    target: Label,
) -> Result<(), CompileError> {
    match cond {
        Expr::Binary(op @ (BOp::Lt | BOp::Le | BOp::Gt | BOp::Ge | BOp::Eq | BOp::Ne), lhs, rhs) => {
            emit_expr(em, lhs)?;
            emit_expr(em, rhs)?;
            let direct = |op: BOp| -> fn(Label) -> Raw {
                match op {
                    BOp::Lt => |l| Raw::IfIcmplt(l),
                    BOp::Le => |l| Raw::IfIcmple(l),
                    BOp::Gt => |l| Raw::IfIcmpgt(l),
                    BOp::Ge => |l| Raw::IfIcmpge(l),
                    BOp::Eq => |l| Raw::IfIcmpeq(l),
                    BOp::Ne => |l| Raw::IfIcmpne(l),
                    _ => unreachable!(),
                }
            };
            em.raw.push(direct(*op)(target));
            Ok(())
        }
        Expr::Binary(BOp::Or, lhs, rhs) => {
            emit_branch_if_true(em, lhs, target)?;
            emit_branch_if_true(em, rhs, target)
        }
        Expr::Binary(BOp::And, lhs, rhs) => {
            let continue_label = em.fresh_label();
            emit_branch_if_false(em, lhs, continue_label)?;
            emit_branch_if_true(em, rhs, target)?;
            em.mark(continue_label);
            Ok(())
        }
        Expr::Unary(UOp::Not, inner) => emit_branch_if_false(em, inner, target),
        _ => {
            emit_expr(em, cond)?;
            em.raw.push(Raw::Ifne(target));
            Ok(())
        }
    }
}

fn emit_expr(em: &mut MethodEmitter<'_>, expr: &Expr) -> Result<(), CompileError> {
    match expr {
        Expr::IntLit(0) => em.push(Op::Iconst0),
        Expr::IntLit(1) => em.push(Op::Iconst1),
        Expr::IntLit(v) => em.push(Op::Ldc(*v)),
        Expr::BoolLit(false) => em.push(Op::Iconst0),
        Expr::BoolLit(true) => em.push(Op::Iconst1),
        Expr::Var(id) => em.push(Op::Iload(em.slot_of(*id))),
        Expr::Unary(UOp::Neg, inner) => {
            emit_expr(em, inner)?;
            em.push(Op::Ineg);
        }
        Expr::Unary(UOp::Not, inner) => {
            // `!b` has no standalone opcode; lower through the branch form.
            let else_label = em.fresh_label();
            let end_label = em.fresh_label();
            emit_branch_if_false(em, inner, else_label)?;
            em.push(Op::Iconst0);
            em.goto(end_label);
            em.mark(else_label);
            em.push(Op::Iconst1);
            em.mark(end_label);
        }
        Expr::Binary(BOp::And | BOp::Or, ..) => {
            // Materialize a short-circuit boolean expression used as a value
            // (not as a branch condition) via the same branch helpers.
            let else_label = em.fresh_label();
            let end_label = em.fresh_label();
            emit_branch_if_false(em, expr, else_label)?;
            em.push(Op::Iconst1);
            em.goto(end_label);
            em.mark(else_label);
            em.push(Op::Iconst0);
            em.mark(end_label);
        }
        Expr::Binary(op @ (BOp::Lt | BOp::Le | BOp::Gt | BOp::Ge | BOp::Eq | BOp::Ne), ..) => {
            let else_label = em.fresh_label();
            let end_label = em.fresh_label();
            let _ = op;
            emit_branch_if_false(em, expr, else_label)?;
            em.push(Op::Iconst1);
            em.goto(end_label);
            em.mark(else_label);
            em.push(Op::Iconst0);
            em.mark(end_label);
        }
        Expr::Binary(op, lhs, rhs) => {
            emit_expr(em, lhs)?;
            emit_expr(em, rhs)?;
            em.push(match op {
                BOp::Add => Op::Iadd,
                BOp::Sub => Op::Isub,
                BOp::Mul => Op::Imul,
                BOp::Div => Op::Idiv,
                BOp::Mod => Op::Irem,
                _ => unreachable!("handled above"),
            });
        }
        Expr::Call(name, args) => {
            for a in args {
                emit_expr(em, a)?;
            }
            // sema::check already verified this call resolves and its
            // arity/types match, so the lookup here cannot fail.
            let descriptor = em
                .signatures
                .get(name)
                .unwrap_or_else(|| panic!("unresolved call to {name} reached the bytecode emitter"))
                .clone();
            em.push(Op::Invokestatic(MethodKey {
                name: *name,
                descriptor,
            }));
        }
    }
    Ok(())
}
