//! Builder for the flat instruction stream.
//!
//! Collects opcode and operand words, records which instruction each source
//! line produced, and holds jump operands as *line indexes* until every line
//! has been emitted; [`CodeBuilder::finish`] then rewrites them to absolute
//! instruction indexes.

use super::op::{Opcode, JUMP_LOCATION};

/// Emits the `i32` instruction stream.
#[derive(Debug, Default)]
pub(crate) struct CodeBuilder {
    code: Vec<i32>,
    /// (instruction index of the jump opcode, target line index)
    fixups: Vec<(usize, usize)>,
}

impl CodeBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Index the next emitted instruction will have.
    #[must_use]
    pub(crate) fn next_instruction(&self) -> usize {
        self.code.len()
    }

    /// Emits an opcode followed by its operand words.
    pub(crate) fn emit(&mut self, op: Opcode, operands: &[i32]) {
        self.code.push(op as i32);
        self.code.extend_from_slice(operands);
    }

    /// Emits a jump whose operand is a line index, to be relocated later.
    pub(crate) fn emit_jump(&mut self, op: Opcode, target_line: usize) {
        let at = self.code.len();
        self.code.push(op as i32);
        self.code.push(0);
        self.fixups.push((at, target_line));
    }

    /// Relocates jump targets and returns the finished stream.
    ///
    /// `line_instruction` maps each line index to the instruction index it
    /// produced.
    #[must_use]
    pub(crate) fn finish(mut self, line_instruction: &[u32]) -> Vec<i32> {
        for (at, target_line) in self.fixups {
            self.code[at + JUMP_LOCATION] = line_instruction[target_line] as i32;
        }
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{JUMP_ARGS, MOVE_ARGS};

    #[test]
    fn emit_appends_opcode_and_operands() {
        let mut b = CodeBuilder::new();
        b.emit(Opcode::Ret, &[]);
        b.emit(Opcode::Move, &[1, 2, 3, 4, 5, 6]);
        let code = b.finish(&[]);
        assert_eq!(code.len(), 1 + 1 + MOVE_ARGS);
        assert_eq!(code[0], Opcode::Ret as i32);
        assert_eq!(code[1], Opcode::Move as i32);
        assert_eq!(&code[2..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn jumps_relocate_to_instruction_indexes() {
        // line 0: cmp (7 words), line 1: jumpl -> line 0, line 2: ret
        let mut b = CodeBuilder::new();
        let line_instruction = [0u32, 7, 9];
        b.emit(Opcode::Cmp, &[0; MOVE_ARGS]);
        b.emit_jump(Opcode::Jumpl, 0);
        b.emit(Opcode::Ret, &[]);
        let code = b.finish(&line_instruction);
        assert_eq!(code.len(), 7 + 1 + JUMP_ARGS + 1);
        assert_eq!(code[7], Opcode::Jumpl as i32);
        assert_eq!(code[8], 0);
        assert_eq!(code[9], Opcode::Ret as i32);
    }

    #[test]
    fn forward_jumps_resolve() {
        let mut b = CodeBuilder::new();
        b.emit_jump(Opcode::Jump, 1);
        b.emit(Opcode::Ret, &[]);
        let code = b.finish(&[0, 2]);
        assert_eq!(code, vec![Opcode::Jump as i32, 2, Opcode::Ret as i32]);
    }
}
