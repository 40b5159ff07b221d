//! The step interpreter.
//!
//! Executes one instruction at a time over the flat code stream. The central
//! algorithm is operand resolution: every `{flags, val, index}` descriptor is
//! collapsed, at execution time, to either an immediate or a concrete
//! `(variable, element index, base pointer)` triple. Arguments are packed
//! by-reference descriptors on the data stack, so resolution follows at most
//! one level of indirection; code generation guarantees one level is enough.
//!
//! Faults never panic: they set the matching [`Status`] and stop the VM in an
//! inspectable state. `reset` returns it to `Ready`.

use crate::bytecode::op::{
    Opcode, CALL_PROCEDURE, CALL_START_ARGS, FLAG_IMMEDIATE, FLAG_INDEX_TYPE_MASK, FLAG_INDEX_VAR, FLAG_LENGTH,
    FLAG_TYPE_MASK, FLAG_VAR, JUMP_ARGS, JUMP_LOCATION, MOVE_ARGS, MOVE_DEST_FLAGS, MOVE_DEST_INDEX,
    MOVE_DEST_VAL, MOVE_SRC_FLAGS, MOVE_SRC_INDEX, MOVE_SRC_VAL,
};
use crate::bytecode::program::Program;
use crate::callback::{Callback, CallbackValue, ValType, WriteArg};
use crate::symbols::STACK_ARG_SIZE;

/// Execution status of a VM.
///
/// `Display` yields the human-readable status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize, serde::Deserialize)]
pub enum Status {
    #[strum(serialize = "Ready")]
    Ready,
    #[strum(serialize = "Active")]
    Active,
    #[strum(serialize = "Internal error/VM bug")]
    InternalError,
    #[strum(serialize = "Array access out of range")]
    OutOfRange,
    #[strum(serialize = "Invalid instruction")]
    InvalidInstruction,
    #[strum(serialize = "Stack overflow")]
    StackOverflow,
    #[strum(serialize = "Callback returned failure")]
    CallbackFailed,
    #[strum(serialize = "Float used as index")]
    FloatIndex,
    #[strum(serialize = "Invalid status code")]
    Invalid,
}

/// One call-stack entry.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct Frame {
    pub(crate) return_ip: usize,
    pub(crate) proc: usize,
}

/// A packed argument descriptor as stored on the data stack.
///
/// Layout: `{flags: u32, val: i32, index: i32, ptr: u32}`, little-endian,
/// [`STACK_ARG_SIZE`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StackArg {
    pub(crate) flags: i32,
    pub(crate) val: i32,
    pub(crate) index: i32,
    pub(crate) ptr: u32,
}

/// A descriptor resolved to its storage: `flags` is `FLAG_IMMEDIATE` or
/// `FLAG_VAR` only.
#[derive(Debug, Clone, Copy)]
struct Resolved {
    flags: i32,
    val: i32,
    index: i32,
    ptr: usize,
}

/// A fetched operand value.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i32),
    Float(f64),
}

impl Num {
    fn as_int(self) -> i32 {
        match self {
            Num::Int(v) => v,
            Num::Float(v) => v as i32,
        }
    }
}

/// Runtime state plus the compiled program. Callbacks are owned by the
/// embedding wrapper and passed into each entry point, keeping host closures
/// out of the serializable state.
#[derive(Debug)]
pub(crate) struct Machine {
    pub(crate) program: Program,
    pub(crate) stack: Vec<u8>,
    pub(crate) cstack: Vec<Frame>,
    pub(crate) callstack_limit: usize,
    pub(crate) sp: usize,
    pub(crate) ip: usize,
    pub(crate) int_result: i32,
    pub(crate) float_result: f64,
    pub(crate) result_type: ValType,
    pub(crate) status: Status,
}

impl Machine {
    pub(crate) fn new(program: Program, callstack_limit: usize) -> Self {
        let stack = vec![0u8; program.stack_size as usize];
        let mut machine = Self {
            program,
            stack,
            cstack: Vec::new(),
            callstack_limit,
            sp: 0,
            ip: 0,
            int_result: 0,
            float_result: 0.0,
            result_type: ValType::Int,
            status: Status::Ready,
        };
        machine.reset();
        machine
    }

    /// Restores the initial globals image and zeroes everything else.
    /// Idempotent; usable at any time.
    pub(crate) fn reset(&mut self) {
        self.stack.fill(0);
        let globals = self.program.globals_image.len();
        self.stack[..globals].copy_from_slice(&self.program.globals_image);
        self.int_result = 0;
        self.float_result = 0.0;
        self.result_type = ValType::Int;
        self.status = Status::Ready;
    }

    /// Pushes the synthetic outermost frame for `proc_index` and activates
    /// execution. The caller has already checked the procedure takes no
    /// arguments.
    pub(crate) fn begin(&mut self, cbs: &mut [Callback], proc_index: usize) -> Result<(), Status> {
        self.ip = 0;
        self.sp = self.program.globals_bytes() as usize;
        self.cstack.clear();
        self.int_result = 0;
        self.float_result = 0.0;
        self.result_type = ValType::Int;
        if let Err(status) = self.call(cbs, proc_index, 0) {
            self.status = status;
            return Err(status);
        }
        self.status = Status::Active;
        Ok(())
    }

    /// Executes one instruction. No-op unless the status is `Active`.
    pub(crate) fn step(&mut self, cbs: &mut [Callback]) -> Status {
        if self.status != Status::Active {
            return self.status;
        }
        if let Err(status) = self.dispatch(cbs) {
            self.status = status;
        }
        self.status
    }

    // ------------------------------------------------------------------
    // Raw stack access. Everything is bounds-checked: a bad address is a
    // VM bug surfaced as InternalError, never a panic.
    // ------------------------------------------------------------------

    fn read_u8(&self, addr: usize) -> Result<u8, Status> {
        self.stack.get(addr).copied().ok_or(Status::InternalError)
    }

    fn write_u8(&mut self, addr: usize, value: u8) -> Result<(), Status> {
        *self.stack.get_mut(addr).ok_or(Status::InternalError)? = value;
        Ok(())
    }

    fn read_i32(&self, addr: usize) -> Result<i32, Status> {
        let bytes = self.stack.get(addr..addr + 4).ok_or(Status::InternalError)?;
        Ok(i32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    fn write_i32(&mut self, addr: usize, value: i32) -> Result<(), Status> {
        let slot = self.stack.get_mut(addr..addr + 4).ok_or(Status::InternalError)?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn read_f64(&self, addr: usize) -> Result<f64, Status> {
        let bytes = self.stack.get(addr..addr + 8).ok_or(Status::InternalError)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    fn write_f64(&mut self, addr: usize, value: f64) -> Result<(), Status> {
        let slot = self.stack.get_mut(addr..addr + 8).ok_or(Status::InternalError)?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn code_word(&self, at: usize) -> Result<i32, Status> {
        self.program.code.get(at).copied().ok_or(Status::InternalError)
    }

    /// Reads argument descriptor `ordinal` (1-based) below `frame_top`.
    pub(crate) fn stack_arg(&self, frame_top: usize, ordinal: u32) -> Result<StackArg, Status> {
        let base = frame_top
            .checked_sub(STACK_ARG_SIZE as usize * ordinal as usize)
            .ok_or(Status::InternalError)?;
        Ok(StackArg {
            flags: self.read_i32(base)?,
            val: self.read_i32(base + 4)?,
            index: self.read_i32(base + 8)?,
            ptr: self.read_i32(base + 12)? as u32,
        })
    }

    fn write_stack_arg(&mut self, frame_top: usize, ordinal: u32, arg: StackArg) -> Result<(), Status> {
        let base = frame_top
            .checked_sub(STACK_ARG_SIZE as usize * ordinal as usize)
            .ok_or(Status::InternalError)?;
        self.write_i32(base, arg.flags)?;
        self.write_i32(base + 4, arg.val)?;
        self.write_i32(base + 8, arg.index)?;
        self.write_i32(base + 12, arg.ptr as i32)
    }

    /// Base pointer of a direct (non-argument) variable in the current frame.
    fn var_ptr(&self, var: usize) -> usize {
        let v = &self.program.vars[var];
        if v.is_global() {
            v.offset as usize
        } else {
            self.sp - v.offset as usize
        }
    }

    // ------------------------------------------------------------------
    // Read/write primitives
    // ------------------------------------------------------------------

    /// Loads one element of a variable, dispatching to its read callback if
    /// it has one. The callback result is coerced to the declared type.
    fn read_var(&mut self, cbs: &mut [Callback], var: usize, ptr: usize, index: i32) -> Result<Num, Status> {
        let v = self.program.vars[var];
        let index = index as usize;
        if let Some(cb) = v.callback {
            let read = cbs
                .get_mut(cb.index as usize)
                .and_then(|c| c.read.as_mut())
                .ok_or(Status::InternalError)?;
            let value = read(index).map_err(|_| Status::CallbackFailed)?;
            return Ok(match (v.ty, value) {
                (ValType::Float, CallbackValue::Int(n)) => Num::Float(f64::from(n)),
                (ValType::Float, CallbackValue::Float(f)) => Num::Float(f),
                (ValType::Char, CallbackValue::Int(n)) => Num::Int(n & 0xff),
                (ValType::Char, CallbackValue::Float(f)) => Num::Int((f as i32) & 0xff),
                (_, CallbackValue::Int(n)) => Num::Int(n),
                (_, CallbackValue::Float(f)) => Num::Int(f as i32),
            });
        }
        match v.ty {
            ValType::Char => Ok(Num::Int(i32::from(self.read_u8(ptr + index)?))),
            ValType::Float => Ok(Num::Float(self.read_f64(ptr + index * 8)?)),
            ValType::Int | ValType::None => Ok(Num::Int(self.read_i32(ptr + index * 4)?)),
        }
    }

    /// Stores the result registers into a variable's element. CHAR keeps the
    /// low byte; `None` (an immediate-bound argument's value word) stores as
    /// an integer.
    fn store_result(&mut self, var: usize, ptr: usize, index: i32) -> Result<(), Status> {
        let v = self.program.vars[var];
        let index = index as usize;
        match v.ty {
            ValType::Char => self.write_u8(ptr + index, self.int_result as u8),
            ValType::Float => self.write_f64(ptr + index * 8, self.float_result),
            ValType::Int | ValType::None => self.write_i32(ptr + index * 4, self.int_result),
        }
    }

    fn fetch(&mut self, cbs: &mut [Callback], r: Resolved) -> Result<Num, Status> {
        if r.flags & FLAG_TYPE_MASK == FLAG_VAR {
            self.read_var(cbs, r.val as usize, r.ptr, r.index)
        } else {
            Ok(Num::Int(r.val))
        }
    }

    // ------------------------------------------------------------------
    // Operand resolution
    // ------------------------------------------------------------------

    /// Resolves a descriptor's element index to a concrete integer, chasing
    /// an argument-bound index variable through one level of indirection.
    fn resolve_index(&mut self, cbs: &mut [Callback], flags: i32, index: i32) -> Result<i32, Status> {
        if flags & FLAG_INDEX_TYPE_MASK != FLAG_INDEX_VAR {
            return Ok(index);
        }
        let iv = self.program.vars[index as usize];
        if iv.is_argument() {
            let arg = self.stack_arg(self.sp, iv.offset)?;
            if arg.flags & FLAG_TYPE_MASK == FLAG_VAR {
                if self.program.vars[arg.val as usize].ty == ValType::Float {
                    return Err(Status::FloatIndex);
                }
                let value = self.read_var(cbs, arg.val as usize, arg.ptr as usize, arg.index)?;
                Ok(value.as_int())
            } else {
                Ok(arg.val)
            }
        } else {
            if iv.ty == ValType::Float {
                return Err(Status::FloatIndex);
            }
            let ptr = self.var_ptr(index as usize);
            let value = self.read_var(cbs, index as usize, ptr, 0)?;
            Ok(value.as_int())
        }
    }

    /// Resolves a readable operand. The result is an immediate or a bound
    /// variable reference with its index checked against the resolved length.
    fn resolve_src(&mut self, cbs: &mut [Callback], flags: i32, val: i32, index: i32) -> Result<Resolved, Status> {
        match flags & FLAG_TYPE_MASK {
            FLAG_VAR => {
                let var = self.program.vars[val as usize];
                if var.is_argument() {
                    let arg = self.stack_arg(self.sp, var.offset)?;
                    if arg.flags & FLAG_TYPE_MASK == FLAG_VAR {
                        let mut idx = self.resolve_index(cbs, flags, index)?;
                        if idx < 0 {
                            return Err(Status::OutOfRange);
                        }
                        // The argument may be bound to a sub-slice; indexes
                        // are relative to its binding point.
                        idx += arg.index;
                        let target = self.program.vars[arg.val as usize];
                        if idx > target.length as i32 - 1 {
                            return Err(Status::OutOfRange);
                        }
                        Ok(Resolved {
                            flags: FLAG_VAR,
                            val: arg.val,
                            index: idx,
                            ptr: arg.ptr as usize,
                        })
                    } else {
                        let idx = self.resolve_index(cbs, flags, index)?;
                        if idx != 0 {
                            return Err(Status::OutOfRange);
                        }
                        Ok(Resolved {
                            flags: FLAG_IMMEDIATE,
                            val: arg.val,
                            index: 0,
                            ptr: self.sp,
                        })
                    }
                } else {
                    let idx = self.resolve_index(cbs, flags, index)?;
                    if idx < 0 || idx > var.length as i32 - 1 {
                        return Err(Status::OutOfRange);
                    }
                    Ok(Resolved {
                        flags: FLAG_VAR,
                        val,
                        index: idx,
                        ptr: self.var_ptr(val as usize),
                    })
                }
            }
            FLAG_LENGTH => {
                let var = self.program.vars[val as usize];
                if var.is_argument() {
                    let arg = self.stack_arg(self.sp, var.offset)?;
                    if arg.flags & FLAG_TYPE_MASK == FLAG_VAR {
                        // Length of a sub-slice binding.
                        let target = self.program.vars[arg.val as usize];
                        Ok(Resolved {
                            flags: FLAG_IMMEDIATE,
                            val: target.length as i32 - arg.index,
                            index: arg.index,
                            ptr: self.sp,
                        })
                    } else {
                        Ok(Resolved {
                            flags: FLAG_IMMEDIATE,
                            val: 1,
                            index: 0,
                            ptr: self.sp,
                        })
                    }
                } else {
                    Ok(Resolved {
                        flags: FLAG_IMMEDIATE,
                        val: var.length as i32,
                        index: 0,
                        ptr: self.sp,
                    })
                }
            }
            FLAG_IMMEDIATE => Ok(Resolved {
                flags: FLAG_IMMEDIATE,
                val,
                index,
                ptr: self.sp,
            }),
            _ => Err(Status::InternalError),
        }
    }

    /// Resolves a writable operand. Always lands on a variable reference; a
    /// write through an immediate-bound argument is rerouted to the
    /// descriptor's value word so integer out-parameters work.
    fn resolve_dst(&mut self, cbs: &mut [Callback], flags: i32, val: i32, index: i32) -> Result<Resolved, Status> {
        if flags & FLAG_TYPE_MASK != FLAG_VAR {
            return Err(Status::InternalError);
        }
        let var = self.program.vars[val as usize];
        if var.is_argument() {
            let arg = self.stack_arg(self.sp, var.offset)?;
            if arg.flags & FLAG_TYPE_MASK == FLAG_VAR {
                let mut idx = self.resolve_index(cbs, flags, index)?;
                if idx < 0 {
                    return Err(Status::OutOfRange);
                }
                idx += arg.index;
                let target = self.program.vars[arg.val as usize];
                if idx > target.length as i32 - 1 {
                    return Err(Status::OutOfRange);
                }
                Ok(Resolved {
                    flags: FLAG_VAR,
                    val: arg.val,
                    index: idx,
                    ptr: arg.ptr as usize,
                })
            } else {
                let idx = self.resolve_index(cbs, flags, index)?;
                if idx != 0 {
                    return Err(Status::OutOfRange);
                }
                let ptr = self.sp - var.offset as usize * STACK_ARG_SIZE as usize + 4;
                Ok(Resolved {
                    flags: FLAG_VAR,
                    val,
                    index: 0,
                    ptr,
                })
            }
        } else {
            let idx = self.resolve_index(cbs, flags, index)?;
            if idx < 0 || idx > var.length as i32 - 1 {
                return Err(Status::OutOfRange);
            }
            Ok(Resolved {
                flags: FLAG_VAR,
                val,
                index: idx,
                ptr: self.var_ptr(val as usize),
            })
        }
    }

    fn load_move_operands(&self) -> Result<([i32; 3], [i32; 3]), Status> {
        Ok((
            [
                self.code_word(self.ip + MOVE_DEST_FLAGS)?,
                self.code_word(self.ip + MOVE_DEST_VAL)?,
                self.code_word(self.ip + MOVE_DEST_INDEX)?,
            ],
            [
                self.code_word(self.ip + MOVE_SRC_FLAGS)?,
                self.code_word(self.ip + MOVE_SRC_VAL)?,
                self.code_word(self.ip + MOVE_SRC_INDEX)?,
            ],
        ))
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch(&mut self, cbs: &mut [Callback]) -> Result<(), Status> {
        let op = Opcode::from_word(self.code_word(self.ip)?).ok_or(Status::InvalidInstruction)?;
        match op {
            Opcode::Move => self.exec_move(cbs),
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => self.exec_arith(cbs, op),
            Opcode::And | Opcode::Or | Opcode::Xor => self.exec_bitwise(cbs, op),
            Opcode::Shr | Opcode::Shl => self.exec_shift(cbs, op),
            Opcode::Cmp => self.exec_cmp(cbs),
            Opcode::Jump => {
                let target = self.code_word(self.ip + JUMP_LOCATION)? as usize;
                if target == self.ip {
                    // Jump to self: nothing further can happen, end cleanly.
                    self.status = Status::Ready;
                } else {
                    self.ip = target;
                }
                Ok(())
            }
            Opcode::Jumpn => self.exec_cond_jump(|i| i != 0, |f| f != 0.0),
            Opcode::Jumpz => self.exec_cond_jump(|i| i == 0, |f| f == 0.0),
            Opcode::Jumpl => self.exec_cond_jump(|i| i < 0, |f| f < 0.0),
            Opcode::Jumpg => self.exec_cond_jump(|i| i > 0, |f| f > 0.0),
            Opcode::Call => {
                let callee = self.code_word(self.ip + CALL_PROCEDURE)?;
                if callee < 0 || callee as usize >= self.program.procs.len() {
                    return Err(Status::InternalError);
                }
                self.call(cbs, callee as usize, self.ip + CALL_START_ARGS)
            }
            Opcode::Ret => {
                if self.cstack.len() == 1 {
                    // Returning from the synthetic outermost frame.
                    self.status = Status::Ready;
                    return Ok(());
                }
                let frame = self.cstack.pop().ok_or(Status::InternalError)?;
                self.ip = frame.return_ip;
                self.sp = self
                    .sp
                    .checked_sub(self.program.procs[frame.proc].frame_size as usize)
                    .ok_or(Status::InternalError)?;
                Ok(())
            }
        }
    }

    fn exec_cond_jump(&mut self, int_taken: fn(i32) -> bool, float_taken: fn(f64) -> bool) -> Result<(), Status> {
        let taken = match self.result_type {
            ValType::Float => float_taken(self.float_result),
            _ => int_taken(self.int_result),
        };
        if taken {
            self.ip = self.code_word(self.ip + JUMP_LOCATION)? as usize;
        } else {
            self.ip += JUMP_ARGS + 1;
        }
        Ok(())
    }

    /// `move`: the only instruction that can target a write callback, so a
    /// math result can never be fed to one; memory-backed sources hand the
    /// callback the whole remainder of the array from the resolved index.
    fn exec_move(&mut self, cbs: &mut [Callback]) -> Result<(), Status> {
        let (d, s) = self.load_move_operands()?;
        let dest = self.resolve_dst(cbs, d[0], d[1], d[2])?;
        let src = self.resolve_src(cbs, s[0], s[1], s[2])?;

        let dest_var = self.program.vars[dest.val as usize];
        let dest_cb = dest_var.callback.filter(|cb| cb.writable);

        if let Some(cb) = dest_cb {
            if src.flags & FLAG_TYPE_MASK == FLAG_VAR {
                let src_var = self.program.vars[src.val as usize];
                if src_var.is_callback() {
                    // Callback to callback: one element through the registers.
                    let value = self.read_var(cbs, src.val as usize, src.ptr, src.index)?;
                    let write = cbs
                        .get_mut(cb.index as usize)
                        .and_then(|c| c.write.as_mut())
                        .ok_or(Status::InternalError)?;
                    let status = match value {
                        Num::Int(n) => {
                            self.int_result = n;
                            self.result_type = ValType::Int;
                            write(WriteArg::Ints(&[n]), dest.index as usize)
                        }
                        Num::Float(f) => {
                            self.float_result = f;
                            self.result_type = ValType::Float;
                            write(WriteArg::Floats(&[f]), dest.index as usize)
                        }
                    };
                    status.map_err(|_| Status::CallbackFailed)?;
                } else {
                    let count = (src_var.length as i32 - src.index) as usize;
                    let write = cbs
                        .get_mut(cb.index as usize)
                        .and_then(|c| c.write.as_mut())
                        .ok_or(Status::InternalError)?;
                    match src_var.ty {
                        ValType::Char => {
                            let start = src.ptr + src.index as usize;
                            let data = self.stack.get(start..start + count).ok_or(Status::InternalError)?;
                            self.int_result = i32::from(data[0]);
                            self.result_type = ValType::Int;
                            write(WriteArg::Chars(data), dest.index as usize).map_err(|_| Status::CallbackFailed)?;
                        }
                        ValType::Float => {
                            let start = src.ptr + src.index as usize * 8;
                            let bytes = self.stack.get(start..start + count * 8).ok_or(Status::InternalError)?;
                            let data: Vec<f64> = bytes
                                .chunks_exact(8)
                                .map(|c| f64::from_le_bytes(c.try_into().expect("8-byte chunk")))
                                .collect();
                            self.float_result = data[0];
                            self.result_type = ValType::Float;
                            write(WriteArg::Floats(&data), dest.index as usize).map_err(|_| Status::CallbackFailed)?;
                        }
                        ValType::Int | ValType::None => {
                            let start = src.ptr + src.index as usize * 4;
                            let bytes = self.stack.get(start..start + count * 4).ok_or(Status::InternalError)?;
                            let data: Vec<i32> = bytes
                                .chunks_exact(4)
                                .map(|c| i32::from_le_bytes(c.try_into().expect("4-byte chunk")))
                                .collect();
                            self.int_result = data[0];
                            self.result_type = ValType::Int;
                            write(WriteArg::Ints(&data), dest.index as usize).map_err(|_| Status::CallbackFailed)?;
                        }
                    }
                }
            } else {
                // Immediate source: a single integer element.
                let write = cbs
                    .get_mut(cb.index as usize)
                    .and_then(|c| c.write.as_mut())
                    .ok_or(Status::InternalError)?;
                write(WriteArg::Ints(&[src.val]), dest.index as usize).map_err(|_| Status::CallbackFailed)?;
            }
        } else {
            let value = self.fetch(cbs, src)?;
            match (value, dest_var.ty == ValType::Float) {
                (Num::Int(n), false) => {
                    self.int_result = n;
                    self.result_type = ValType::Int;
                }
                (Num::Int(n), true) => {
                    self.float_result = f64::from(n);
                    self.result_type = ValType::Float;
                }
                (Num::Float(f), false) => {
                    self.int_result = f as i32;
                    self.result_type = ValType::Int;
                }
                (Num::Float(f), true) => {
                    self.float_result = f;
                    self.result_type = ValType::Float;
                }
            }
            self.store_result(dest.val as usize, dest.ptr, dest.index)?;
        }

        self.ip += MOVE_ARGS + 1;
        Ok(())
    }

    /// Two-operand type rule: mixed INT/FLOAT computes in double and stores
    /// with the destination's natural type.
    fn exec_arith(&mut self, cbs: &mut [Callback], op: Opcode) -> Result<(), Status> {
        let (d, s) = self.load_move_operands()?;
        let dest = self.resolve_dst(cbs, d[0], d[1], d[2])?;
        let src = self.resolve_src(cbs, s[0], s[1], s[2])?;
        if self.program.vars[dest.val as usize].is_writable_callback() {
            return Err(Status::InvalidInstruction);
        }

        let b = self.fetch(cbs, src)?;
        let a = self.fetch(cbs, dest)?;

        let int_op = |a: i32, b: i32| -> i32 {
            match op {
                Opcode::Add => a.wrapping_add(b),
                Opcode::Sub => a.wrapping_sub(b),
                Opcode::Mul => a.wrapping_mul(b),
                // Division and modulo by zero produce 0; wrap on overflow.
                Opcode::Div => a.checked_div(b).unwrap_or(0),
                _ => a.checked_rem(b).unwrap_or(0),
            }
        };
        let float_op = |a: f64, b: f64| -> f64 {
            match op {
                Opcode::Add => a + b,
                Opcode::Sub => a - b,
                Opcode::Mul => a * b,
                Opcode::Div => a / b,
                _ => a % b,
            }
        };

        match (a, b) {
            (Num::Int(a), Num::Int(b)) => {
                self.int_result = int_op(a, b);
                self.result_type = ValType::Int;
            }
            (Num::Float(a), Num::Float(b)) => {
                self.float_result = float_op(a, b);
                self.result_type = ValType::Float;
            }
            (Num::Float(a), Num::Int(b)) => {
                self.float_result = float_op(a, f64::from(b));
                self.result_type = ValType::Float;
            }
            (Num::Int(a), Num::Float(b)) => {
                self.int_result = float_op(f64::from(a), b) as i32;
                self.result_type = ValType::Int;
            }
        }

        self.store_result(dest.val as usize, dest.ptr, dest.index)?;
        self.ip += MOVE_ARGS + 1;
        Ok(())
    }

    fn exec_bitwise(&mut self, cbs: &mut [Callback], op: Opcode) -> Result<(), Status> {
        let (d, s) = self.load_move_operands()?;
        let dest = self.resolve_dst(cbs, d[0], d[1], d[2])?;
        let src = self.resolve_src(cbs, s[0], s[1], s[2])?;
        if self.program.vars[dest.val as usize].is_writable_callback() {
            return Err(Status::InvalidInstruction);
        }

        let b = self.fetch(cbs, src)?;
        let a = self.fetch(cbs, dest)?;
        let (Num::Int(a), Num::Int(b)) = (a, b) else {
            return Err(Status::InvalidInstruction);
        };

        self.int_result = match op {
            Opcode::And => a & b,
            Opcode::Or => a | b,
            _ => a ^ b,
        };
        self.result_type = ValType::Int;
        self.store_result(dest.val as usize, dest.ptr, dest.index)?;
        self.ip += MOVE_ARGS + 1;
        Ok(())
    }

    fn exec_shift(&mut self, cbs: &mut [Callback], op: Opcode) -> Result<(), Status> {
        let (d, s) = self.load_move_operands()?;
        let dest = self.resolve_dst(cbs, d[0], d[1], d[2])?;
        let src = self.resolve_src(cbs, s[0], s[1], s[2])?;
        if self.program.vars[dest.val as usize].is_writable_callback() {
            return Err(Status::InvalidInstruction);
        }

        let b = self.fetch(cbs, src)?;
        let a = self.fetch(cbs, dest)?;
        let Num::Int(a) = a else {
            return Err(Status::InvalidInstruction);
        };
        // A FLOAT shift count is truncated to an integer; counts are taken
        // modulo the integer width.
        let b = b.as_int();

        self.int_result = match op {
            Opcode::Shr => a.wrapping_shr(b as u32),
            _ => a.wrapping_shl(b as u32),
        };
        self.result_type = ValType::Int;
        self.store_result(dest.val as usize, dest.ptr, dest.index)?;
        self.ip += MOVE_ARGS + 1;
        Ok(())
    }

    /// `cmp` stores no memory; both operands resolve as sources and the
    /// difference lands in the result registers for the conditional jumps.
    fn exec_cmp(&mut self, cbs: &mut [Callback]) -> Result<(), Status> {
        let (d, s) = self.load_move_operands()?;
        let dest = self.resolve_src(cbs, d[0], d[1], d[2])?;
        let src = self.resolve_src(cbs, s[0], s[1], s[2])?;

        let b = self.fetch(cbs, src)?;
        let a = self.fetch(cbs, dest)?;

        match (a, b) {
            (Num::Int(a), Num::Int(b)) => {
                self.int_result = a.wrapping_sub(b);
                self.result_type = ValType::Int;
            }
            (a, b) => {
                let af = match a {
                    Num::Int(n) => f64::from(n),
                    Num::Float(f) => f,
                };
                let bf = match b {
                    Num::Int(n) => f64::from(n),
                    Num::Float(f) => f,
                };
                self.float_result = af - bf;
                self.result_type = ValType::Float;
            }
        }

        self.ip += MOVE_ARGS + 1;
        Ok(())
    }

    /// Builds the callee frame: bounds checks, initializer copy, one
    /// resolved argument descriptor per declared argument, call-stack push.
    fn call(&mut self, cbs: &mut [Callback], proc_index: usize, args_ip: usize) -> Result<(), Status> {
        if self.cstack.len() >= self.callstack_limit {
            return Err(Status::StackOverflow);
        }
        let frame_size = self.program.procs[proc_index].frame_size as usize;
        let args = self.program.procs[proc_index].args as usize;
        let entry = self.program.procs[proc_index].entry as usize;

        let new_sp = self.sp + frame_size;
        if new_sp > self.stack.len() {
            return Err(Status::StackOverflow);
        }
        self.stack[self.sp..new_sp].copy_from_slice(&self.program.procs[proc_index].initializer);

        // Arguments resolve in the caller's frame; sp moves only afterwards.
        for i in 0..args {
            let base = args_ip + i * 3;
            let flags = self.code_word(base)?;
            let val = self.code_word(base + 1)?;
            let index = self.code_word(base + 2)?;
            let r = self.resolve_src(cbs, flags, val, index)?;
            self.write_stack_arg(
                new_sp,
                (i + 1) as u32,
                StackArg {
                    flags: r.flags,
                    val: r.val,
                    index: r.index,
                    ptr: r.ptr as u32,
                },
            )?;
        }

        self.cstack.push(Frame {
            return_ip: args_ip + args * 3,
            proc: proc_index,
        });
        self.sp = new_sp;
        self.ip = entry;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_arg_round_trips() {
        let program = Program {
            arena: crate::intern::TokenArena::new(),
            lines: Vec::new(),
            vars: Vec::new(),
            procs: Vec::new(),
            code: Vec::new(),
            globals_image: Vec::new(),
            stack_size: 64,
        };
        let mut m = Machine::new(program, 4);
        let arg = StackArg {
            flags: FLAG_VAR | FLAG_INDEX_VAR,
            val: 3,
            index: -2,
            ptr: 40,
        };
        m.write_stack_arg(64, 2, arg).unwrap();
        assert_eq!(m.stack_arg(64, 2).unwrap(), arg);
        // Slot 2 sits 32 bytes below the frame top.
        assert_eq!(m.read_i32(64 - 32).unwrap(), arg.flags);
        assert_eq!(m.read_i32(64 - 32 + 4).unwrap(), 3);
    }

    #[test]
    fn out_of_range_stack_access_is_an_internal_error() {
        let program = Program {
            arena: crate::intern::TokenArena::new(),
            lines: Vec::new(),
            vars: Vec::new(),
            procs: Vec::new(),
            code: Vec::new(),
            globals_image: Vec::new(),
            stack_size: 8,
        };
        let m = Machine::new(program, 4);
        assert_eq!(m.read_i32(6).unwrap_err(), Status::InternalError);
        assert_eq!(m.stack_arg(8, 1).unwrap_err(), Status::InternalError);
    }
}
