//! Exercises the host-facing `Stack` API (spec §6.2) directly against a
//! fresh `Vm`/`Thread`, the way a native function's own call into `Stack`
//! would see things: `base = 0` at the top level, since nothing has pushed
//! a register window yet.

use ember_core::{Thread, Value, Vm};
use ember_sdk::Stack;

#[test]
fn push_and_read_back_primitives() {
    let mut vm = Vm::new();
    let mut thread = Thread::new();
    let mut s = Stack::new(&mut vm, &mut thread, 0);

    s.push_nil();
    s.push_bool(true);
    s.push_number(3.5);
    s.push_string("hi");

    assert_eq!(s.top(), 4);
    assert!(s.is_nil(1));
    assert!(s.is_bool(2));
    assert_eq!(s.to_bool(2).unwrap(), true);
    assert_eq!(s.to_number(3).unwrap(), 3.5);
    assert_eq!(s.to_str(4).unwrap(), "hi");
}

#[test]
fn negative_indices_count_from_the_top() {
    let mut vm = Vm::new();
    let mut thread = Thread::new();
    let mut s = Stack::new(&mut vm, &mut thread, 0);

    s.push_number(1.0);
    s.push_number(2.0);
    s.push_number(3.0);

    assert_eq!(s.to_number(-1).unwrap(), 3.0);
    assert_eq!(s.to_number(-3).unwrap(), 1.0);
}

#[test]
fn out_of_range_index_is_an_error_not_a_panic() {
    let mut vm = Vm::new();
    let mut thread = Thread::new();
    let s = Stack::new(&mut vm, &mut thread, 0);
    assert!(s.to_number(1).is_err());
    assert!(s.to_number(-1).is_err());
}

#[test]
fn pop_insert_remove_replace() {
    let mut vm = Vm::new();
    let mut thread = Thread::new();
    let mut s = Stack::new(&mut vm, &mut thread, 0);

    s.push_number(1.0);
    s.push_number(2.0);
    s.push_number(3.0);
    s.pop(1);
    assert_eq!(s.top(), 2);

    s.push_number(99.0);
    s.insert(1).unwrap();
    assert_eq!(s.to_number(1).unwrap(), 99.0);
    assert_eq!(s.top(), 3);

    let removed = s.remove(1).unwrap();
    assert_eq!(removed.as_number(), Some(99.0));
    assert_eq!(s.top(), 2);

    s.push_number(7.0);
    s.replace(1).unwrap();
    assert_eq!(s.to_number(1).unwrap(), 7.0);
    assert_eq!(s.top(), 2);
}

#[test]
fn raw_table_get_and_set_bypass_metamethods() {
    let mut vm = Vm::new();
    let mut thread = Thread::new();
    let table = Value::gc(vm.gc.allocate(ember_core::GcObject::Table(ember_core::Table::new())));
    let mut s = Stack::new(&mut vm, &mut thread, 0);
    s.push_value(table);
    assert!(s.is_table(1));

    let key = Value::number(1.0);
    s.raw_set(1, key, Value::number(42.0)).unwrap();
    let v = s.raw_get(1, key).unwrap();
    assert_eq!(v.as_number(), Some(42.0));
}

#[test]
fn pcall_reports_failure_without_a_leading_status_value() {
    let mut vm = Vm::new();
    let mut thread = Thread::new();
    let mut s = Stack::new(&mut vm, &mut thread, 0);

    // calling `nil` is a runtime error that pcall must catch
    s.push_value(Value::nil());
    let ok = s.pcall(1, 0).unwrap();
    assert!(!ok);
    // the error value was pushed in place of a leading status flag
    assert_eq!(s.top(), 1);
}

#[test]
fn collect_garbage_frees_unreferenced_objects_but_keeps_stack_values() {
    let mut vm = Vm::new();
    let mut thread = Thread::new();
    {
        let mut s = Stack::new(&mut vm, &mut thread, 0);
        s.push_string("kept");
    }
    // an object never pushed or rooted anywhere
    vm.gc.allocate(ember_core::GcObject::Str(ember_core::string_interner::EmberStr::from_bytes(b"garbage".to_vec())));

    let mut s = Stack::new(&mut vm, &mut thread, 0);
    s.collect_garbage();
    assert_eq!(s.top(), 1);
    assert_eq!(s.to_str(1).unwrap(), "kept");
}
