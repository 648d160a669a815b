//! Semantic analysis: type checking and call-target resolution.
//!
//! This pass is intentionally thin: the front end is an external
//! collaborator to the core pipeline, and only rejects programs the core
//! cannot possibly compile — mismatched types, unknown identifiers, and
//! calls with the wrong arity or argument types. It performs no optimization
//! and does not duplicate any analysis the core performs later (liveness,
//! CFG shape, …).

use crate::common::{Descriptor, Id, Map, Type};
use crate::diagnostics::CompileError;
use crate::front::ast::{BOp, Expr, Method, Program, Stmt, UOp};

fn builtin_signatures() -> Map<Id, Descriptor> {
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
    m
}

pub fn check(program: &Program) -> Result<(), CompileError> {
    let mut signatures = builtin_signatures();
    for m in &program.methods {
        let descriptor = Descriptor {
            params: m.params.iter().map(|(_, t)| *t).collect(),
            ret: m.ret,
        };
        if signatures.insert(m.name, descriptor).is_some() {
            return Err(CompileError::Semantic(format!(
                "duplicate method or shadowed builtin: {}",
                m.name
            )));
        }
    }

    for m in &program.methods {
        check_method(m, &signatures)?;
    }
    Ok(())
}

fn check_method(method: &Method, signatures: &Map<Id, Descriptor>) -> Result<(), CompileError> {
    let mut env: Map<Id, Type> = Map::new();
    for (id, ty) in &method.params {
        if env.insert(*id, *ty).is_some() {
            return Err(CompileError::Semantic(format!(
                "duplicate parameter {id} in {}",
                method.name
            )));
        }
    }
    check_block(&method.body, &mut env, signatures, method)?;
    Ok(())
}

fn check_block(
    stmts: &[Stmt],
    env: &mut Map<Id, Type>,
    signatures: &Map<Id, Descriptor>,
    method: &Method,
) -> Result<(), CompileError> {
    for stmt in stmts {
        check_stmt(stmt, env, signatures, method)?;
    }
    Ok(())
}

fn check_stmt(
    stmt: &Stmt,
    env: &mut Map<Id, Type>,
    signatures: &Map<Id, Descriptor>,
    method: &Method,
) -> Result<(), CompileError> {
    match stmt {
        Stmt::VarDecl(id, ty, value) => {
            let vt = type_of(value, env, signatures)?;
            expect_type(vt, *ty, "variable initializer")?;
            if env.insert(*id, *ty).is_some() {
                return Err(CompileError::Semantic(format!(
                    "redeclaration of local {id} in {}",
                    method.name
                )));
            }
            Ok(())
        }
        Stmt::Assign(id, value) => {
            let declared = *env.get(id).ok_or_else(|| {
                CompileError::Semantic(format!("assignment to undeclared local {id}"))
            })?;
            let vt = type_of(value, env, signatures)?;
            expect_type(vt, declared, "assignment")
        }
        Stmt::ExprStmt(e) => {
            type_of(e, env, signatures)?;
            Ok(())
        }
        Stmt::If { cond, tt, ff } => {
            let ct = type_of(cond, env, signatures)?;
            expect_type(ct, Type::Bool, "if condition")?;
            check_block(tt, env, signatures, method)?;
            check_block(ff, env, signatures, method)
        }
        Stmt::While { cond, body } => {
            let ct = type_of(cond, env, signatures)?;
            expect_type(ct, Type::Bool, "while condition")?;
            check_block(body, env, signatures, method)
        }
        Stmt::Return(value) => match (value, method.ret) {
            (None, Type::Void) => Ok(()),
            (Some(e), ret) if ret != Type::Void => {
                let vt = type_of(e, env, signatures)?;
                expect_type(vt, ret, "return value")
            }
            _ => Err(CompileError::Semantic(format!(
                "return type mismatch in {}",
                method.name
            ))),
        },
    }
}

fn expect_type(actual: Type, expected: Type, what: &str) -> Result<(), CompileError> {
    if actual == expected {
        Ok(())
    } else {
        Err(CompileError::Semantic(format!(
            "type mismatch in {what}: expected {expected:?}, found {actual:?}"
        )))
    }
}

fn type_of(
    expr: &Expr,
    env: &Map<Id, Type>,
    signatures: &Map<Id, Descriptor>,
) -> Result<Type, CompileError> {
    match expr {
        Expr::IntLit(_) => Ok(Type::Int),
        Expr::BoolLit(_) => Ok(Type::Bool),
        Expr::Var(id) => env
            .get(id)
            .copied()
            .ok_or_else(|| CompileError::Semantic(format!("use of undeclared local {id}"))),
        Expr::Unary(op, inner) => {
            let it = type_of(inner, env, signatures)?;
            match op {
                UOp::Neg => expect_type(it, Type::Int, "unary -").map(|_| Type::Int),
                UOp::Not => expect_type(it, Type::Bool, "unary !").map(|_| Type::Bool),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let lt = type_of(lhs, env, signatures)?;
            let rt = type_of(rhs, env, signatures)?;
            match op {
                BOp::Add | BOp::Sub | BOp::Mul | BOp::Div | BOp::Mod => {
                    expect_type(lt, Type::Int, "arithmetic operand")?;
                    expect_type(rt, Type::Int, "arithmetic operand")?;
                    Ok(Type::Int)
                }
                BOp::Lt | BOp::Le | BOp::Gt | BOp::Ge => {
                    expect_type(lt, Type::Int, "comparison operand")?;
                    expect_type(rt, Type::Int, "comparison operand")?;
                    Ok(Type::Bool)
                }
                BOp::Eq | BOp::Ne => {
                    expect_type(rt, lt, "equality operands")?;
                    Ok(Type::Bool)
                }
                BOp::And | BOp::Or => {
                    expect_type(lt, Type::Bool, "boolean operand")?;
                    expect_type(rt, Type::Bool, "boolean operand")?;
                    Ok(Type::Bool)
                }
            }
        }
        Expr::Call(name, args) => {
            let sig = signatures
                .get(name)
                .ok_or_else(|| CompileError::Semantic(format!("call to undeclared method {name}")))?;
            if sig.params.len() != args.len() {
                return Err(CompileError::Semantic(format!(
                    "{name} expects {} argument(s), found {}",
                    sig.params.len(),
                    args.len()
                )));
            }
            for (arg, expected) in args.iter().zip(sig.params.iter()) {
                let at = type_of(arg, env, signatures)?;
                expect_type(at, *expected, "call argument")?;
            }
            Ok(sig.ret)
        }
    }
}
