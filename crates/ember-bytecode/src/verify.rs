//! Structural verification of a loaded prototype, run before execution of
//! any module that did not just come out of this process's own code
//! generator (i.e. anything loaded via `undump`).

use crate::error::{BytecodeError, BytecodeResult};
use crate::instruction::{index_k, is_k};
use crate::opcode::{OpArgKind, OpCode, OpMode};
use crate::prototype::Prototype;

pub fn verify(proto: &Prototype) -> BytecodeResult<()> {
    verify_one(proto)?;
    for p in &proto.prototypes {
        verify(p)?;
    }
    Ok(())
}

fn fail(msg: impl Into<String>) -> BytecodeError {
    BytecodeError::Verification(msg.into())
}

fn verify_one(proto: &Prototype) -> BytecodeResult<()> {
    let max_reg = proto.max_stack_size as u32;
    let n_const = proto.constants.len() as u32;
    let n_code = proto.code.len() as u32;

    if n_code == 0 {
        return Err(fail("empty instruction stream"));
    }

    let check_reg = |r: u32| -> BytecodeResult<()> {
        if r >= max_reg {
            Err(fail(format!(
                "register {r} out of range (max_stack_size={max_reg})"
            )))
        } else {
            Ok(())
        }
    };
    let check_rk = |rk: u32| -> BytecodeResult<()> {
        if is_k(rk) {
            if index_k(rk) >= n_const {
                Err(fail(format!("constant index {} out of range", index_k(rk))))
            } else {
                Ok(())
            }
        } else {
            check_reg(rk)
        }
    };

    for (pc, inst) in proto.code.iter().enumerate() {
        let info = inst.opcode().info();
        match info.mode {
            OpMode::ABC => {
                if info.sets_a || matches!(inst.opcode(), OpCode::SelfOp) {
                    check_reg(inst.a())?;
                }
                check_operand(info.b_kind, inst.b(), &check_reg, &check_rk)?;
                check_operand(info.c_kind, inst.c(), &check_reg, &check_rk)?;
            }
            OpMode::ABx => {
                if matches!(inst.opcode(), OpCode::LoadK | OpCode::GetGlobal | OpCode::SetGlobal) {
                    if inst.bx() >= n_const {
                        return Err(fail(format!(
                            "constant index {} out of range at pc {pc}",
                            inst.bx()
                        )));
                    }
                } else if matches!(inst.opcode(), OpCode::Closure)
                    && inst.bx() as usize >= proto.prototypes.len()
                {
                    return Err(fail(format!("nested prototype index {} out of range", inst.bx())));
                }
            }
            OpMode::AsBx => {
                let target = pc as i64 + 1 + inst.sbx() as i64;
                if target < 0 || target > n_code as i64 {
                    return Err(fail(format!("jump target {target} out of range at pc {pc}")));
                }
            }
        }

        if matches!(inst.opcode(), OpCode::Jmp) {
            let target = pc as i64 + 1 + inst.sbx() as i64;
            if target < 0 || target > n_code as i64 {
                return Err(fail(format!("jump target {target} out of range at pc {pc}")));
            }
        }

        if info.is_test && pc + 1 >= proto.code.len() {
            return Err(fail(format!(
                "test instruction at pc {pc} must be followed by a JMP"
            )));
        }
    }

    Ok(())
}

fn check_operand(
    kind: OpArgKind,
    value: u32,
    check_reg: &impl Fn(u32) -> BytecodeResult<()>,
    check_rk: &impl Fn(u32) -> BytecodeResult<()>,
) -> BytecodeResult<()> {
    match kind {
        OpArgKind::Unused | OpArgKind::Raw => Ok(()),
        OpArgKind::Register => check_reg(value),
        OpArgKind::RegisterOrConstant => check_rk(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;

    fn trivial(code: Vec<Instruction>, max_stack: u8) -> Prototype {
        Prototype {
            source_name: None,
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: false,
            max_stack_size: max_stack,
            code,
            constants: vec![],
            prototypes: vec![],
            upvalues: vec![],
            debug: None,
        }
    }

    #[test]
    fn accepts_well_formed_prototype() {
        let p = trivial(vec![Instruction::abc(OpCode::Return, 0, 1, 0)], 1);
        assert!(verify(&p).is_ok());
    }

    #[test]
    fn rejects_register_out_of_range() {
        let p = trivial(
            vec![
                Instruction::abc(OpCode::Move, 5, 0, 0),
                Instruction::abc(OpCode::Return, 0, 1, 0),
            ],
            2,
        );
        assert!(verify(&p).is_err());
    }

    #[test]
    fn rejects_out_of_range_jump() {
        let p = trivial(
            vec![
                crate::instruction::Instruction::asbx(OpCode::Jmp, 0, 100),
                Instruction::abc(OpCode::Return, 0, 1, 0),
            ],
            1,
        );
        assert!(verify(&p).is_err());
    }
}
