//! Host-provided functions callable from EmberScript (spec §6.2, host
//! stack API), plus the one built-in the interpreter itself recognizes:
//! `coroutine.yield` (spec §4.6, "Coroutine resume/yield").

pub type NativeFn = fn(&mut crate::vm::interpreter::Vm, &[crate::value::Value]) -> crate::runtime::error::EmberResult<Vec<crate::value::Value>>;

pub struct NativeFunction {
    pub name: &'static str,
    /// `None` only for the yield marker, which the interpreter's `CALL`
    /// handler special-cases before ever reaching a dispatch through
    /// this field.
    pub func: Option<NativeFn>,
    pub is_yield: bool,
}

impl NativeFunction {
    pub fn new(name: &'static str, func: NativeFn) -> Self {
        NativeFunction {
            name,
            func: Some(func),
            is_yield: false,
        }
    }

    pub fn yield_marker() -> Self {
        NativeFunction {
            name: "yield",
            func: None,
            is_yield: true,
        }
    }
}
