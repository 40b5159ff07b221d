//! Code generation: scanned lines to the flat instruction stream.
//!
//! Operands are parsed from their source form (`LITERAL`, `NAME`, `NAME:`,
//! `NAME:K`, `NAME:VAR`, split at the last `:`) into `{flags, val, index}`
//! descriptors. Jump targets are emitted as line indexes and relocated to
//! instruction indexes once every line has been emitted. `call` resolves its
//! callee by name and checks arity here; deeper operand checking is left to
//! the verifier.

use std::str::FromStr;

use super::builder::CodeBuilder;
use super::op::{
    Opcode, FLAG_IMMEDIATE, FLAG_INDEX_VAR, FLAG_LENGTH, FLAG_VAR,
};
use crate::error::{CompileError, CompileResult};
use crate::expr;
use crate::intern::TokenArena;
use crate::symbols::{find_variable, Procedure, ScanOutput, Variable};
use crate::tokenize::Line;

const STAGE: &str = "code generation";

/// Parses one operand into a `{flags, val, index}` descriptor.
///
/// `readable`/`writable` describe how the instruction will use the operand
/// and gate callback capabilities, immediates and lengths accordingly.
fn parse_operand(
    arena: &TokenArena,
    vars: &[Variable],
    proc: &Procedure,
    text: &[u8],
    readable: bool,
    writable: bool,
) -> Result<[i32; 3], String> {
    if let Some(n) = expr::parse_int_token(text) {
        if writable {
            return Err("immediate values aren't writable".to_owned());
        }
        return Ok([FLAG_IMMEDIATE, n, 0]);
    }

    let (name, index_part) = match text.iter().rposition(|&c| c == b':') {
        Some(colon) => (&text[..colon], Some(&text[colon + 1..])),
        None => (text, None),
    };

    let var = find_variable(arena, vars, Some(proc), name)
        .ok_or_else(|| format!("variable {} not found", String::from_utf8_lossy(name)))?;
    let v = &vars[var];
    if writable && !v.is_writable() {
        return Err(format!("{} isn't a writable callback", String::from_utf8_lossy(name)));
    }
    if readable && !v.is_readable() {
        return Err(format!("{} isn't a readable callback", String::from_utf8_lossy(name)));
    }

    match index_part {
        None => Ok([FLAG_VAR, var as i32, 0]),
        Some([]) => {
            // `NAME:` is length-of.
            if writable {
                return Err("array length isn't writable".to_owned());
            }
            Ok([FLAG_LENGTH, var as i32, 0])
        }
        Some(index_text) => {
            if let Some(index) = expr::parse_int_token(index_text) {
                // Arguments have unknown length until runtime; everything
                // else is checked now.
                if index < 0 || (v.length > 0 && index > v.length as i32 - 1) {
                    return Err(format!("immediate index {index} out of array size"));
                }
                Ok([FLAG_VAR, var as i32, index])
            } else {
                let ivar = find_variable(arena, vars, Some(proc), index_text).ok_or_else(|| {
                    format!(
                        "array index variable {} not found",
                        String::from_utf8_lossy(index_text)
                    )
                })?;
                if !vars[ivar].is_readable() {
                    return Err(format!(
                        "{} isn't a readable callback",
                        String::from_utf8_lossy(index_text)
                    ));
                }
                Ok([FLAG_VAR | FLAG_INDEX_VAR, var as i32, ivar as i32])
            }
        }
    }
}

fn find_label(proc: &Procedure, arena: &TokenArena, name: &[u8]) -> Option<u32> {
    proc.labels
        .iter()
        .find(|l| arena.bytes(l.name) == name)
        .map(|l| l.line)
}

/// Emits the instruction stream, filling each line's instruction index and
/// each procedure's entry point.
pub(crate) fn codegen(arena: &TokenArena, scan: &mut ScanOutput) -> CompileResult<Vec<i32>> {
    let mut builder = CodeBuilder::new();
    let mut cur_proc: Option<usize> = None;
    let mut procnum = 0usize;

    for li in 0..scan.lines.len() {
        let line = &scan.lines[li];
        let err = |arena: &TokenArena, line: &Line, msg: String| {
            CompileError::at(STAGE, arena.display(line.module).into_owned(), line.line, msg)
        };

        if cur_proc.is_none() {
            if procnum < scan.procs.len() && li as u32 == scan.procs[procnum].start {
                cur_proc = Some(procnum);
                scan.procs[procnum].entry = builder.next_instruction() as u32;
            } else {
                return Err(err(arena, line, "code line not in a procedure".to_owned()));
            }
        }
        let proc = &scan.procs[cur_proc.expect("current procedure")];

        scan.lines[li].instruction = builder.next_instruction() as u32;
        let line = &scan.lines[li];

        let mnemonic = arena.as_str(line.tokens[0]).unwrap_or("");
        let Ok(op) = Opcode::from_str(mnemonic) else {
            return Err(err(
                arena,
                line,
                format!("invalid instruction mnemonic: {}", arena.display(line.tokens[0])),
            ));
        };

        match op {
            Opcode::Move => {
                if line.tokens.len() != 3 {
                    return Err(err(arena, line, "move takes a destination and source".to_owned()));
                }
                // A write-only callback is a valid move destination, so the
                // destination is not required to be readable here.
                let dest = parse_operand(arena, &scan.vars, proc, arena.bytes(line.tokens[1]), false, true)
                    .map_err(|msg| err(arena, line, msg))?;
                let src = parse_operand(arena, &scan.vars, proc, arena.bytes(line.tokens[2]), true, false)
                    .map_err(|msg| err(arena, line, msg))?;
                builder.emit(op, &[dest[0], dest[1], dest[2], src[0], src[1], src[2]]);
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shr
            | Opcode::Shl => {
                if line.tokens.len() != 3 {
                    return Err(err(arena, line, format!("{mnemonic} takes two operands")));
                }
                let dest = parse_operand(arena, &scan.vars, proc, arena.bytes(line.tokens[1]), true, true)
                    .map_err(|msg| err(arena, line, msg))?;
                let src = parse_operand(arena, &scan.vars, proc, arena.bytes(line.tokens[2]), true, false)
                    .map_err(|msg| err(arena, line, msg))?;
                builder.emit(op, &[dest[0], dest[1], dest[2], src[0], src[1], src[2]]);
            }
            Opcode::Cmp => {
                if line.tokens.len() < 2 || line.tokens.len() > 3 {
                    return Err(err(arena, line, "cmp takes one or two operands".to_owned()));
                }
                // cmp writes no memory, so immediates are fine on both sides.
                let dest = parse_operand(arena, &scan.vars, proc, arena.bytes(line.tokens[1]), true, false)
                    .map_err(|msg| err(arena, line, msg))?;
                let src = if line.tokens.len() == 3 {
                    parse_operand(arena, &scan.vars, proc, arena.bytes(line.tokens[2]), true, false)
                        .map_err(|msg| err(arena, line, msg))?
                } else {
                    // One operand compares against 0.
                    [FLAG_IMMEDIATE, 0, 0]
                };
                builder.emit(op, &[dest[0], dest[1], dest[2], src[0], src[1], src[2]]);
            }
            Opcode::Jump | Opcode::Jumpn | Opcode::Jumpz | Opcode::Jumpl | Opcode::Jumpg => {
                if line.tokens.len() != 2 {
                    return Err(err(arena, line, format!("{mnemonic} takes a label")));
                }
                let Some(target) = find_label(proc, arena, arena.bytes(line.tokens[1])) else {
                    return Err(err(
                        arena,
                        line,
                        format!("couldn't find label {}", arena.display(line.tokens[1])),
                    ));
                };
                builder.emit_jump(op, target as usize);
            }
            Opcode::Call => {
                if line.tokens.len() < 2 {
                    return Err(err(arena, line, "call takes a procedure and possible arguments".to_owned()));
                }
                let callee_name = arena.bytes(line.tokens[1]);
                let Some(callee) = scan
                    .procs
                    .iter()
                    .position(|p| arena.bytes(p.name) == callee_name)
                else {
                    return Err(err(
                        arena,
                        line,
                        format!("couldn't find procedure {}", arena.display(line.tokens[1])),
                    ));
                };
                let args = line.tokens.len() - 2;
                if args as u32 != scan.procs[callee].args {
                    return Err(err(
                        arena,
                        line,
                        format!(
                            "procedure {} takes {} args, {} given",
                            arena.display(line.tokens[1]),
                            scan.procs[callee].args,
                            args
                        ),
                    ));
                }
                let mut operands = Vec::with_capacity(1 + args * 3);
                operands.push(callee as i32);
                for &tok in &line.tokens[2..] {
                    let desc = parse_operand(arena, &scan.vars, proc, arena.bytes(tok), false, false)
                        .map_err(|msg| err(arena, line, msg))?;
                    operands.extend_from_slice(&desc);
                }
                builder.emit(op, &operands);
            }
            Opcode::Ret => {
                if line.tokens.len() != 1 {
                    return Err(err(arena, line, "ret takes no arguments".to_owned()));
                }
                builder.emit(op, &[]);
                procnum += 1;
                cur_proc = None;
            }
        }
    }

    let line_instruction: Vec<u32> = scan.lines.iter().map(|l| l.instruction).collect();
    Ok(builder.finish(&line_instruction))
}
