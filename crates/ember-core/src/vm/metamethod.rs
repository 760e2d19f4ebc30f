//! Metamethod names and lookup (spec §4.5, "Arithmetic/comparison
//! metamethod dispatch", "Table access").
//!
//! Each name is interned exactly once, at VM construction, into a small
//! fixed table (`MetamethodNames`) so dispatch never has to allocate a
//! string just to check whether `__index` exists. Grounded in the same
//! spirit as raya-core's `builtin.rs`, which precomputes fixed lookup
//! tables rather than constructing keys on every call.

use crate::gc::collector::GarbageCollector;
use crate::object::GcObject;
use crate::string_interner::EmberStr;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metamethod {
    Index,
    NewIndex,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Concat,
    Len,
    Eq,
    Lt,
    Le,
    Call,
}

impl Metamethod {
    pub fn name(self) -> &'static str {
        match self {
            Metamethod::Index => "__index",
            Metamethod::NewIndex => "__newindex",
            Metamethod::Add => "__add",
            Metamethod::Sub => "__sub",
            Metamethod::Mul => "__mul",
            Metamethod::Div => "__div",
            Metamethod::Mod => "__mod",
            Metamethod::Pow => "__pow",
            Metamethod::Unm => "__unm",
            Metamethod::Concat => "__concat",
            Metamethod::Len => "__len",
            Metamethod::Eq => "__eq",
            Metamethod::Lt => "__lt",
            Metamethod::Le => "__le",
            Metamethod::Call => "__call",
        }
    }

    pub const ALL: [Metamethod; 15] = [
        Metamethod::Index,
        Metamethod::NewIndex,
        Metamethod::Add,
        Metamethod::Sub,
        Metamethod::Mul,
        Metamethod::Div,
        Metamethod::Mod,
        Metamethod::Pow,
        Metamethod::Unm,
        Metamethod::Concat,
        Metamethod::Len,
        Metamethod::Eq,
        Metamethod::Lt,
        Metamethod::Le,
        Metamethod::Call,
    ];
}

pub struct MetamethodNames {
    names: [Value; 15],
}

impl MetamethodNames {
    pub fn new(gc: &mut GarbageCollector) -> Self {
        let mut names = [Value::nil(); 15];
        for (i, mm) in Metamethod::ALL.iter().enumerate() {
            let r = gc.allocate(GcObject::Str(EmberStr::from_bytes(mm.name().as_bytes().to_vec())));
            names[i] = Value::gc(r);
        }
        MetamethodNames { names }
    }

    #[inline]
    pub fn key(&self, mm: Metamethod) -> Value {
        self.names[mm as usize]
    }
}

/// Maximum `__index`/`__newindex` chain depth before a table access is
/// treated as a runaway metatable loop and raised as a runtime error
/// (spec §9, Open Questions — resolved to match the classical Lua
/// constant, `MAXTAGLOOP`, recorded in `DESIGN.md`).
pub const MAX_METATABLE_CHAIN: u32 = 200;

fn metatable_of(v: &Value) -> Option<crate::gc::ptr::GcRef> {
    let g = v.as_gc()?;
    match g.object() {
        GcObject::Table(t) => t.metatable,
        GcObject::UserData(u) => u.metatable,
        _ => None,
    }
}

/// Looks up `mm` on `v`'s metatable, if it has one and the metatable
/// defines it.
pub fn get_metamethod(v: &Value, mm: Metamethod, names: &MetamethodNames) -> Option<Value> {
    let mt = metatable_of(v)?;
    let table = mt.object().as_table()?;
    let result = table.get(&names.key(mm));
    if result.is_nil() {
        None
    } else {
        Some(result)
    }
}
