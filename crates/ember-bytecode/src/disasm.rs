//! Human-readable disassembly of a compiled [`Prototype`] tree.
//!
//! Grounded on `Instruction`'s own `Debug` impl (opcode name plus raw
//! `A`/`B`/`C` fields), extended with RK-operand and line-number
//! annotations the way a reader would want when `emberc disasm`/`emberc
//! run --dump` prints a listing (spec §6.3, "list bytecode (repeat for
//! verbose)").

use crate::instruction::{index_k, is_k};
use crate::opcode::OpArgKind;
use crate::prototype::Prototype;

/// Writes one prototype and, recursively, all of its nested prototypes.
pub fn disassemble(root: &Prototype) -> String {
    let mut out = String::new();
    write_prototype(&mut out, root, 0);
    out
}

fn write_prototype(out: &mut String, proto: &Prototype, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = proto.source_name.as_deref().unwrap_or("?");
    out.push_str(&format!(
        "{indent}function <{name}:{}-{}> ({} params, {}vararg, {} slots)\n",
        proto.line_defined,
        proto.last_line_defined,
        proto.num_params,
        if proto.is_vararg { "" } else { "no " },
        proto.max_stack_size,
    ));

    for (pc, inst) in proto.code.iter().enumerate() {
        let line = proto
            .line_for_pc(pc)
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        let info = inst.opcode().info();
        let operands = match info.mode {
            crate::opcode::OpMode::ABC => format!(
                "{} {}",
                operand(inst.b(), info.b_kind, proto),
                operand(inst.c(), info.c_kind, proto),
            )
            .trim()
            .to_string(),
            crate::opcode::OpMode::ABx => operand_bx(inst.bx(), inst.opcode(), proto),
            crate::opcode::OpMode::AsBx => format!("{}", inst.sbx()),
        };
        out.push_str(&format!(
            "{indent}  [{pc:>4}] line {line:>4}  {:<10} {:>3}  {}\n",
            info.name,
            inst.a(),
            operands,
        ));
    }

    if !proto.constants.is_empty() {
        out.push_str(&format!("{indent}  constants:\n"));
        for (i, k) in proto.constants.iter().enumerate() {
            out.push_str(&format!("{indent}    K({i}) = {}\n", describe_constant(k)));
        }
    }

    for child in &proto.prototypes {
        write_prototype(out, child, depth + 1);
    }
}

fn operand(value: u32, kind: OpArgKind, proto: &Prototype) -> String {
    match kind {
        OpArgKind::Unused => String::new(),
        OpArgKind::Raw => value.to_string(),
        OpArgKind::Register => format!("R{value}"),
        OpArgKind::RegisterOrConstant => {
            if is_k(value) {
                let idx = index_k(value) as usize;
                match proto.constants.get(idx) {
                    Some(k) => format!("K{idx}({})", describe_constant(k)),
                    None => format!("K{idx}"),
                }
            } else {
                format!("R{value}")
            }
        }
    }
}

fn operand_bx(bx: u32, op: crate::opcode::OpCode, proto: &Prototype) -> String {
    use crate::opcode::OpCode::*;
    match op {
        LoadK => match proto.constants.get(bx as usize) {
            Some(k) => format!("K{bx}({})", describe_constant(k)),
            None => format!("K{bx}"),
        },
        GetGlobal | SetGlobal => match proto.constants.get(bx as usize) {
            Some(k) => format!("K{bx}({})", describe_constant(k)),
            None => format!("K{bx}"),
        },
        Closure => format!("P{bx}"),
        _ => bx.to_string(),
    }
}

fn describe_constant(k: &crate::constant::Constant) -> String {
    match k {
        crate::constant::Constant::Nil => "nil".to_string(),
        crate::constant::Constant::Bool(b) => b.to_string(),
        crate::constant::Constant::Number(n) => n.to_string(),
        crate::constant::Constant::Str(bytes) => format!("{:?}", String::from_utf8_lossy(bytes)),
    }
}
