//! Opcode numbering and operand descriptor encoding.
//!
//! Instructions live in a flat `i32` stream: an opcode word followed by a
//! fixed or variable number of operand words. Move-style instructions carry
//! two `{flags, val, index}` descriptor triples; jumps carry one absolute
//! instruction index; `call` carries the callee procedure index followed by
//! one descriptor triple per argument; `ret` carries nothing.

/// Instruction opcodes with their stream encoding values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[repr(i32)]
pub(crate) enum Opcode {
    Move = 0,
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
    Mod = 5,
    And = 6,
    Or = 7,
    Xor = 8,
    Shr = 9,
    Shl = 10,
    Cmp = 11,
    Jump = 12,
    Jumpn = 13,
    Jumpz = 14,
    Jumpl = 15,
    Jumpg = 16,
    Call = 17,
    Ret = 18,
}

impl Opcode {
    /// Decodes an opcode word from the instruction stream.
    pub(crate) fn from_word(word: i32) -> Option<Self> {
        Some(match word {
            0 => Opcode::Move,
            1 => Opcode::Add,
            2 => Opcode::Sub,
            3 => Opcode::Mul,
            4 => Opcode::Div,
            5 => Opcode::Mod,
            6 => Opcode::And,
            7 => Opcode::Or,
            8 => Opcode::Xor,
            9 => Opcode::Shr,
            10 => Opcode::Shl,
            11 => Opcode::Cmp,
            12 => Opcode::Jump,
            13 => Opcode::Jumpn,
            14 => Opcode::Jumpz,
            15 => Opcode::Jumpl,
            16 => Opcode::Jumpg,
            17 => Opcode::Call,
            18 => Opcode::Ret,
            _ => return None,
        })
    }

    /// True for the conditional and unconditional jumps.
    pub(crate) fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::Jumpn | Opcode::Jumpz | Opcode::Jumpl | Opcode::Jumpg
        )
    }

    /// True for the two-descriptor instructions (`move`, arithmetic,
    /// bitwise, shifts and `cmp`).
    pub(crate) fn is_move_style(self) -> bool {
        matches!(
            self,
            Opcode::Move
                | Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shr
                | Opcode::Shl
                | Opcode::Cmp
        )
    }
}

/// Operand kind bits (low two bits of a descriptor's flags word).
pub(crate) const FLAG_TYPE_MASK: i32 = 3;
pub(crate) const FLAG_IMMEDIATE: i32 = 0;
pub(crate) const FLAG_VAR: i32 = 1;
pub(crate) const FLAG_LENGTH: i32 = 2;

/// Index kind bit (bit 2 of a descriptor's flags word).
pub(crate) const FLAG_INDEX_TYPE_MASK: i32 = 1 << 2;
pub(crate) const FLAG_INDEX_IMMEDIATE: i32 = 0;
pub(crate) const FLAG_INDEX_VAR: i32 = 1 << 2;

/// Word offsets of move-style operands relative to the opcode word.
pub(crate) const MOVE_DEST_FLAGS: usize = 1;
pub(crate) const MOVE_DEST_VAL: usize = 2;
pub(crate) const MOVE_DEST_INDEX: usize = 3;
pub(crate) const MOVE_SRC_FLAGS: usize = 4;
pub(crate) const MOVE_SRC_VAL: usize = 5;
pub(crate) const MOVE_SRC_INDEX: usize = 6;
/// Operand word count of a move-style instruction.
pub(crate) const MOVE_ARGS: usize = 6;

/// Word offset of a jump's destination, and its operand count.
pub(crate) const JUMP_LOCATION: usize = 1;
pub(crate) const JUMP_ARGS: usize = 1;

/// Word offsets of `call` operands.
pub(crate) const CALL_PROCEDURE: usize = 1;
pub(crate) const CALL_START_ARGS: usize = 2;
pub(crate) const CALL_ARG_FLAGS: usize = 0;
pub(crate) const CALL_ARG_VAL: usize = 1;
pub(crate) const CALL_ARG_INDEX: usize = 2;
/// Words per `call` argument descriptor.
pub(crate) const CALL_ARG_SIZE: usize = 3;
