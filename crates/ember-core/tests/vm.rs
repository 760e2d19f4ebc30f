//! End-to-end interpreter tests driven directly through `ember_compiler`'s
//! AST, the same "no front end needed" boundary its own doc comment
//! describes. Covers spec §8's testable properties that need a running
//! VM rather than just a compiled `Prototype` (arithmetic/comparison,
//! table array+hash behavior, upvalue sharing, protected calls, and
//! coroutine round trips).

use ember_compiler::ast::*;
use ember_compiler::compile;
use ember_core::object::{GcObject, NativeFunction, Table};
use ember_core::runtime::{coroutine, pcall};
use ember_core::value::Value;
use ember_core::vm::Vm;
use std::sync::Arc;

fn run_chunk(chunk: &Block, vm: &mut Vm) -> Vec<Value> {
    let proto = compile(chunk, Some("test".into())).expect("compile failed");
    let closure = vm.wrap_prototype(Arc::new(proto));
    vm.call_main(closure, vec![]).expect("run failed")
}

fn num(v: &Value) -> f64 {
    v.as_number().expect("expected a number")
}

#[test]
fn arithmetic_and_comparison() {
    let mut vm = Vm::new();
    let chunk = vec![Stat::Return(vec![
        Expr::Binary(
            BinOp::Add,
            Box::new(Expr::Number(2.0)),
            Box::new(Expr::Binary(BinOp::Mul, Box::new(Expr::Number(3.0)), Box::new(Expr::Number(4.0)))),
        ),
        Expr::Binary(BinOp::Lt, Box::new(Expr::Number(1.0)), Box::new(Expr::Number(2.0))),
    ])];
    let results = run_chunk(&chunk, &mut vm);
    assert_eq!(num(&results[0]), 14.0);
    assert_eq!(results[1].as_bool(), Some(true));
}

#[test]
fn table_used_as_array_and_record() {
    let mut vm = Vm::new();
    let chunk = vec![
        Stat::Local(
            vec!["t".into()],
            vec![Expr::Table(vec![
                TableField::Positional(Expr::Number(10.0)),
                TableField::Positional(Expr::Number(20.0)),
                TableField::Named("label".into(), Expr::Str("widget".into())),
            ])],
        ),
        Stat::Return(vec![
            Expr::Index(Box::new(Expr::Ident("t".into())), Box::new(Expr::Number(1.0))),
            Expr::Field(Box::new(Expr::Ident("t".into())), "label".into()),
            Expr::Unary(UnOp::Len, Box::new(Expr::Ident("t".into()))),
        ]),
    ];
    let results = run_chunk(&chunk, &mut vm);
    assert_eq!(num(&results[0]), 10.0);
    let label = results[1].as_gc().unwrap();
    assert_eq!(label.object().as_str().unwrap().as_str_lossy().as_ref(), "widget");
    assert_eq!(num(&results[2]), 2.0);
}

#[test]
fn closures_share_an_upvalue() {
    let mut vm = Vm::new();
    let get = FunctionBody {
        params: vec![],
        is_vararg: false,
        body: vec![Stat::Return(vec![Expr::Ident("counter".into())])],
        line: 1,
    };
    let inc = FunctionBody {
        params: vec![],
        is_vararg: false,
        body: vec![Stat::Assign(
            vec![Expr::Ident("counter".into())],
            vec![Expr::Binary(BinOp::Add, Box::new(Expr::Ident("counter".into())), Box::new(Expr::Number(1.0)))],
        )],
        line: 1,
    };
    let chunk = vec![
        Stat::Local(vec!["counter".into()], vec![Expr::Number(0.0)]),
        Stat::Local(vec!["get".into()], vec![Expr::Function(Box::new(get))]),
        Stat::Local(vec!["inc".into()], vec![Expr::Function(Box::new(inc))]),
        Stat::ExprStat(Expr::Call(Box::new(Expr::Ident("inc".into())), vec![])),
        Stat::ExprStat(Expr::Call(Box::new(Expr::Ident("inc".into())), vec![])),
        Stat::Return(vec![Expr::Call(Box::new(Expr::Ident("get".into())), vec![])]),
    ];
    let results = run_chunk(&chunk, &mut vm);
    assert_eq!(num(&results[0]), 2.0);
}

#[test]
fn pcall_catches_a_runtime_error_and_keeps_the_vm_usable() {
    let mut vm = Vm::new();
    let proto = compile(&vec![Stat::Return(vec![Expr::Call(Box::new(Expr::Nil), vec![])])], None).unwrap();
    let closure = Value::gc(vm.wrap_prototype(Arc::new(proto)));

    let (ok, results) = pcall::protected_call(&mut vm, closure, vec![]).unwrap();
    assert!(!ok);
    assert!(results[0].as_bool() == Some(false));
    assert!(results[1].as_gc().is_some());

    // the VM is still usable after a caught error
    let after = run_chunk(&vec![Stat::Return(vec![Expr::Number(1.0)])], &mut vm);
    assert_eq!(num(&after[0]), 1.0);
}

#[test]
fn coroutine_yields_values_back_to_the_resumer() {
    let mut vm = Vm::new();
    let yield_native = {
        let marker = vm.yield_value();
        marker.as_gc().unwrap()
    };
    vm.globals
        .object_mut()
        .as_table_mut()
        .unwrap()
        .set(vm.intern_str(b"yield"), Value::gc(yield_native));

    let body = vec![
        Stat::ExprStat(Expr::Call(Box::new(Expr::Ident("yield".into())), vec![Expr::Number(1.0)])),
        Stat::Return(vec![Expr::Number(2.0)]),
    ];
    let proto = compile(&body, None).unwrap();
    let closure = vm.wrap_prototype(Arc::new(proto));
    let co = coroutine::create(&mut vm, closure);

    let (ok1, first) = coroutine::resume(&mut vm, co, vec![]).unwrap();
    assert!(ok1);
    assert_eq!(num(&first[0]), 1.0);
    assert_eq!(coroutine::status(co), ember_core::object::ThreadStatus::Suspended);

    let (ok2, second) = coroutine::resume(&mut vm, co, vec![]).unwrap();
    assert!(ok2);
    assert_eq!(num(&second[0]), 2.0);
    assert_eq!(coroutine::status(co), ember_core::object::ThreadStatus::Dead);
}

#[test]
fn native_function_can_be_called_from_script() {
    fn double(_vm: &mut Vm, args: &[Value]) -> ember_core::EmberResult<Vec<Value>> {
        Ok(vec![Value::number(args[0].as_number().unwrap() * 2.0)])
    }
    let mut vm = Vm::new();
    let native = vm.register_native("double", double);
    let key = vm.intern_str(b"double");
    vm.globals.object_mut().as_table_mut().unwrap().set(key, native);

    let chunk = vec![Stat::Return(vec![Expr::Call(
        Box::new(Expr::Ident("double".into())),
        vec![Expr::Number(21.0)],
    )])];
    let results = run_chunk(&chunk, &mut vm);
    assert_eq!(num(&results[0]), 42.0);
}

#[test]
fn table_identity_is_by_reference_not_value() {
    let mut vm = Vm::new();
    let t1 = vm.gc.allocate(GcObject::Table(Table::new()));
    let t2 = vm.gc.allocate(GcObject::Table(Table::new()));
    assert!(!Value::gc(t1).raw_equals(&Value::gc(t2)));
    assert!(Value::gc(t1).raw_equals(&Value::gc(t1)));
}

#[test]
fn native_function_object_reports_its_name() {
    let mut vm = Vm::new();
    fn noop(_vm: &mut Vm, _args: &[Value]) -> ember_core::EmberResult<Vec<Value>> {
        Ok(vec![])
    }
    let v = vm.register_native("noop", noop);
    let g = v.as_gc().unwrap();
    assert!(matches!(g.object(), GcObject::Native(nf) if nf.name == "noop"));
    assert_eq!(NativeFunction::yield_marker().name, "yield");
}
