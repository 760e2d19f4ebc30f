//! Single-pass code generator: lowers EmberScript's abstract syntax
//! directly to `ember_bytecode::Prototype`, with no separate optimization
//! pass (spec §4, "Single-pass code generator").
//!
//! `ast` is the boundary type a parser would hand to [`compile`] — this
//! crate owns code generation only, not lexing/parsing.

pub mod ast;
mod codegen;
pub mod error;
mod expdesc;
mod fold;
mod funcstate;
mod jumps;

pub use error::{CompileError, CompileResult};

use ember_bytecode::prototype::Prototype;

/// Compiles a parsed chunk into its root `Prototype`, ready for
/// `ember_bytecode::dump` or direct execution.
pub fn compile(chunk: &ast::Block, source_name: Option<String>) -> CompileResult<Prototype> {
    let mut gen = codegen::Codegen::new();
    gen.compile_chunk(chunk, source_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    #[test]
    fn compiles_empty_chunk() {
        let proto = compile(&vec![], Some("test".into())).unwrap();
        assert!(proto.is_vararg);
        assert_eq!(proto.num_params, 0);
        assert!(!proto.code.is_empty());
    }

    #[test]
    fn compiles_local_assignment_and_return() {
        let chunk = vec![
            Stat::Local(vec!["x".into()], vec![Expr::Number(41.0)]),
            Stat::Assign(
                vec![Expr::Ident("x".into())],
                vec![Expr::Binary(
                    BinOp::Add,
                    Box::new(Expr::Ident("x".into())),
                    Box::new(Expr::Number(1.0)),
                )],
            ),
            Stat::Return(vec![Expr::Ident("x".into())]),
        ];
        let proto = compile(&chunk, None).unwrap();
        assert!(proto.constants.iter().any(|c| matches!(c, ember_bytecode::constant::Constant::Number(n) if *n == 41.0)));
        assert!(matches!(proto.code.last().unwrap().opcode(), ember_bytecode::opcode::OpCode::Return));
    }

    #[test]
    fn compiles_nested_function_with_upvalue() {
        let inner = FunctionBody {
            params: vec![],
            is_vararg: false,
            body: vec![Stat::Return(vec![Expr::Ident("x".into())])],
            line: 2,
        };
        let chunk = vec![
            Stat::Local(vec!["x".into()], vec![Expr::Number(10.0)]),
            Stat::Local(
                vec!["f".into()],
                vec![Expr::Function(Box::new(inner))],
            ),
            Stat::Return(vec![Expr::Call(Box::new(Expr::Ident("f".into())), vec![])]),
        ];
        let proto = compile(&chunk, None).unwrap();
        assert_eq!(proto.prototypes.len(), 1);
        let child = &proto.prototypes[0];
        assert_eq!(child.upvalues.len(), 1);
        assert!(matches!(
            child.upvalues[0].source,
            ember_bytecode::prototype::UpvalSource::Local(_)
        ));
    }

    #[test]
    fn rejects_break_outside_loop() {
        let chunk = vec![Stat::Break];
        let err = compile(&chunk, None).unwrap_err();
        assert_eq!(err, CompileError::BreakOutsideLoop);
    }

    #[test]
    fn compiles_while_loop_with_break() {
        let chunk = vec![Stat::While(
            Expr::True,
            vec![Stat::Break],
        )];
        let proto = compile(&chunk, None).unwrap();
        assert!(proto.code.iter().any(|i| i.opcode() == ember_bytecode::opcode::OpCode::Jmp));
    }

    #[test]
    fn folds_constant_arithmetic() {
        let chunk = vec![Stat::Return(vec![Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Number(2.0)),
            Box::new(Expr::Number(3.0)),
        )])];
        let proto = compile(&chunk, None).unwrap();
        assert!(!proto.code.iter().any(|i| i.opcode() == ember_bytecode::opcode::OpCode::Add));
        assert!(proto.constants.iter().any(|c| matches!(c, ember_bytecode::constant::Constant::Number(n) if *n == 5.0)));
    }
}
