//! Jump-list manipulation: lists of not-yet-patched forward jumps threaded
//! through the `sBx` field of the `JMP` instructions themselves (spec
//! §4.2, §9 "Jump lists threaded through instructions").

use crate::expdesc::NO_JUMP;
use crate::funcstate::FuncState;
use ember_bytecode::instruction::Instruction;
use ember_bytecode::opcode::OpCode;

impl FuncState {
    /// Reads the next link in a jump list starting at `pc` (the jump list
    /// node currently stored as a not-yet-patched offset relative to `pc`).
    fn next_in_list(&self, pc: i32) -> i32 {
        let offset = self.code[pc as usize].sbx();
        if offset == NO_JUMP {
            NO_JUMP
        } else {
            pc + 1 + offset
        }
    }

    fn set_next_in_list(&mut self, pc: i32, next: i32) {
        let offset = if next == NO_JUMP { NO_JUMP } else { next - (pc + 1) };
        self.code[pc as usize].set_sbx(offset);
    }

    /// Emits an unconditional jump and returns its pc, already linked to
    /// any pending "jumps to here".
    pub fn jump(&mut self, line: u32) -> i32 {
        let jpc = self.jpc;
        self.jpc = NO_JUMP;
        let mut list = self.emit(Instruction::asbx(OpCode::Jmp, 0, NO_JUMP), line);
        self.concat(&mut list, jpc);
        list
    }

    /// Appends jump list `l2` onto `l1` (by value; `l1` is both input and
    /// output since a jump list is just "the pc of its head").
    pub fn concat(&mut self, l1: &mut i32, l2: i32) {
        if l2 == NO_JUMP {
            return;
        }
        if *l1 == NO_JUMP {
            *l1 = l2;
            return;
        }
        let mut list = *l1;
        loop {
            let next = self.next_in_list(list);
            if next == NO_JUMP {
                break;
            }
            list = next;
        }
        self.set_next_in_list(list, l2);
    }

    /// Patches every jump in `list` to branch to `target`.
    pub fn patch_list(&mut self, list: i32, target: i32) {
        let mut pc = list;
        while pc != NO_JUMP {
            let next = self.next_in_list(pc);
            let offset = target - (pc + 1);
            self.code[pc as usize].set_sbx(offset);
            pc = next;
        }
    }

    /// Concatenates `list` into the set of jumps pending patch to "here"
    /// (the pc of whatever instruction is emitted next).
    pub fn patch_to_here(&mut self, list: i32) {
        let pc = self.pc();
        self.last_target = pc;
        let mut jpc = self.jpc;
        self.concat(&mut jpc, list);
        self.jpc = jpc;
    }

    /// Finalizes `self.jpc` against the current pc; call once the next
    /// instruction is about to be emitted or at function end.
    pub fn patch_pending_to_here(&mut self) {
        let pc = self.pc();
        let jpc = self.jpc;
        self.jpc = NO_JUMP;
        self.patch_list(jpc, pc);
    }

    /// `true` if the jump at `pc` is controlled by a preceding `TESTSET`
    /// (meaning a concrete destination register still needs to be
    /// chosen/rewritten) rather than a plain `TEST`.
    pub(crate) fn controlled_by_testset(&self, pc: i32) -> bool {
        pc > 0
            && self
                .code
                .get(pc as usize - 1)
                .map(|i| i.opcode() == OpCode::TestSet)
                .unwrap_or(false)
    }

    /// `true` if some jump in `list` is a plain jump (not `TESTSET`-guarded)
    /// and therefore needs an actual boolean materialized at its target.
    pub(crate) fn need_value(&self, mut list: i32) -> bool {
        while list != NO_JUMP {
            if !self.controlled_by_testset(list) {
                return true;
            }
            list = self.next_in_list(list);
        }
        false
    }

    /// Patches a jump list where some entries may be controlled by a
    /// `TESTSET`: those are rewritten to target `reg` (or demoted to a
    /// value-free `TEST` when `reg < 0`) and branch to `target_for_value`;
    /// plain jumps branch to `target`.
    pub fn patch_list_aux(&mut self, mut list: i32, target_for_value: i32, reg: i32, target: i32) {
        while list != NO_JUMP {
            let next = self.next_in_list(list);
            if self.controlled_by_testset(list) {
                let prev_inst = self.code[list as usize - 1];
                if reg >= 0 && reg as u32 != prev_inst.b() {
                    self.code[list as usize - 1] =
                        Instruction::abc(OpCode::TestSet, reg as u32, prev_inst.b(), prev_inst.c());
                } else {
                    self.code[list as usize - 1] =
                        Instruction::abc(OpCode::Test, prev_inst.b(), 0, prev_inst.c());
                }
                let offset = target_for_value - (list + 1);
                self.code[list as usize].set_sbx(offset);
            } else {
                let offset = target - (list + 1);
                self.code[list as usize].set_sbx(offset);
            }
            list = next;
        }
    }
}
