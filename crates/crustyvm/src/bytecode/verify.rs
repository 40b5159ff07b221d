//! Code verifier.
//!
//! Walks the emitted instruction stream once, in procedure order, and rejects
//! anything the interpreter would otherwise have to defend against on every
//! step: unknown opcodes, truncated instructions, out-of-range variable and
//! index references, callback-capability violations, immediate indexes
//! outside a known array length, jumps that do not land on an instruction
//! boundary inside their own procedure, and call arity errors.

use super::op::{
    Opcode, CALL_ARG_FLAGS, CALL_ARG_INDEX, CALL_ARG_SIZE, CALL_ARG_VAL, CALL_PROCEDURE, CALL_START_ARGS,
    FLAG_IMMEDIATE, FLAG_INDEX_TYPE_MASK, FLAG_INDEX_VAR, FLAG_LENGTH, FLAG_TYPE_MASK, FLAG_VAR, JUMP_ARGS,
    JUMP_LOCATION, MOVE_ARGS, MOVE_DEST_FLAGS, MOVE_DEST_INDEX, MOVE_DEST_VAL, MOVE_SRC_FLAGS, MOVE_SRC_INDEX,
    MOVE_SRC_VAL,
};
use crate::error::{CompileError, CompileResult};
use crate::intern::TokenArena;
use crate::symbols::{ScanOutput, Variable};

const STAGE: &str = "code verification";

fn check_operand(vars: &[Variable], writable_dest: bool, flags: i32, val: i32, index: i32) -> Result<(), String> {
    match flags & FLAG_TYPE_MASK {
        FLAG_IMMEDIATE => {
            if writable_dest {
                return Err("destination flagged as immediate".to_owned());
            }
        }
        FLAG_LENGTH => {
            if writable_dest {
                return Err("destination flagged as array length".to_owned());
            }
            if val < 0 || val as usize >= vars.len() {
                return Err(format!("var out of range ({val})"));
            }
        }
        FLAG_VAR => {
            if val < 0 || val as usize >= vars.len() {
                return Err(format!("var out of range ({val})"));
            }
            if index < 0 {
                return Err(format!("negative index {index}"));
            }
            let var = &vars[val as usize];
            if writable_dest && !var.is_writable() {
                return Err("read only callback variable as destination".to_owned());
            }
            if !writable_dest && !var.is_readable() {
                return Err("write only callback variable as source".to_owned());
            }
            if flags & FLAG_INDEX_TYPE_MASK == FLAG_INDEX_VAR {
                if index as usize >= vars.len() {
                    return Err(format!("index var out of range ({index})"));
                }
                if !vars[index as usize].is_readable() {
                    return Err("write only callback variable as index".to_owned());
                }
            } else if var.length > 0 && index > var.length as i32 - 1 {
                return Err(format!("index out of range {index}"));
            }
        }
        _ => return Err("invalid variable type".to_owned()),
    }
    Ok(())
}

/// Verifies the whole instruction stream against the symbol tables.
pub(crate) fn code_verify(arena: &TokenArena, scan: &ScanOutput, code: &[i32]) -> CompileResult<()> {
    let mut i = 0usize;
    let mut line_idx = 0usize;
    let mut procnum = 0usize;
    let mut cur_proc: Option<usize> = None;

    while i < code.len() {
        let err = |msg: String| match scan.lines.get(line_idx) {
            Some(line) => CompileError::at(STAGE, arena.display(line.module).into_owned(), line.line, msg),
            None => CompileError::new(STAGE, msg),
        };

        if cur_proc.is_none() {
            if procnum < scan.procs.len() && line_idx as u32 == scan.procs[procnum].start {
                cur_proc = Some(procnum);
                procnum += 1;
            } else {
                return Err(err("code line not in a procedure".to_owned()));
            }
        }

        let Some(op) = Opcode::from_word(code[i]) else {
            return Err(err(format!("invalid instruction {}", code[i])));
        };

        if op.is_move_style() {
            if i + MOVE_ARGS >= code.len() {
                return Err(err(format!("instruction memory ends before end of {op} instruction")));
            }
            // cmp never writes its first operand.
            let writable_dest = op != Opcode::Cmp;
            check_operand(
                &scan.vars,
                writable_dest,
                code[i + MOVE_DEST_FLAGS],
                code[i + MOVE_DEST_VAL],
                code[i + MOVE_DEST_INDEX],
            )
            .map_err(err)?;
            check_operand(
                &scan.vars,
                false,
                code[i + MOVE_SRC_FLAGS],
                code[i + MOVE_SRC_VAL],
                code[i + MOVE_SRC_INDEX],
            )
            .map_err(err)?;
            i += MOVE_ARGS + 1;
        } else if op.is_jump() {
            if i + JUMP_ARGS >= code.len() {
                return Err(err(format!("instruction memory ends before end of {op} instruction")));
            }
            let target = code[i + JUMP_LOCATION];
            if target < 0 {
                return Err(err("negative jump pointer".to_owned()));
            }
            let Some(target_line) = scan
                .lines
                .iter()
                .position(|l| l.instruction == target as u32)
            else {
                return Err(err("jump argument doesn't land on an instruction".to_owned()));
            };
            let proc = &scan.procs[cur_proc.expect("current procedure")];
            let (start, end) = (proc.start as usize, proc.start as usize + proc.line_count as usize);
            if target_line < start || target_line >= end {
                return Err(err("jump outside of procedure".to_owned()));
            }
            i += JUMP_ARGS + 1;
        } else if op == Opcode::Call {
            if i + CALL_PROCEDURE >= code.len() {
                return Err(err("instruction memory ends before end of call instruction".to_owned()));
            }
            let callee = code[i + CALL_PROCEDURE];
            if callee < 0 || callee as usize >= scan.procs.len() {
                return Err(err("call to procedure out of range".to_owned()));
            }
            let args = scan.procs[callee as usize].args as usize;
            if i + CALL_START_ARGS + args * CALL_ARG_SIZE > code.len() {
                return Err(err("instruction memory ends before end of call instruction".to_owned()));
            }
            for a in 0..args {
                let base = i + CALL_START_ARGS + a * CALL_ARG_SIZE;
                check_operand(
                    &scan.vars,
                    false,
                    code[base + CALL_ARG_FLAGS],
                    code[base + CALL_ARG_VAL],
                    code[base + CALL_ARG_INDEX],
                )
                .map_err(err)?;
            }
            i += CALL_START_ARGS + args * CALL_ARG_SIZE;
        } else {
            // ret
            cur_proc = None;
            i += 1;
        }

        line_idx += 1;
    }

    if cur_proc.is_some() {
        return Err(CompileError::new(STAGE, "procedure without ret".to_owned()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compiler::codegen;
    use crate::io::NoLog;
    use crate::preprocess;
    use crate::safepath::SafePath;
    use crate::symbols;
    use crate::tokenize::tokenize;

    fn build(source: &str) -> (TokenArena, ScanOutput, Vec<i32>) {
        let mut arena = TokenArena::new();
        let mut files = SafePath::new();
        let lines = tokenize(&mut arena, "test", source.as_bytes(), &mut files).unwrap();
        let pass = preprocess::preprocess(&mut arena, &lines, &[], false).unwrap();
        let mut scan = symbols::scan(&arena, pass.lines, &[], &mut files, &[], &mut NoLog).unwrap();
        let code = codegen(&arena, &mut scan).unwrap();
        (arena, scan, code)
    }

    const TWO_PROCS: &str = "\
static i 0
proc first
label top
add i 1
jump top
ret
proc second
label other
add i 2
jump other
ret
";

    #[test]
    fn well_formed_code_passes() {
        let (arena, scan, code) = build(TWO_PROCS);
        code_verify(&arena, &scan, &code).unwrap();
    }

    #[test]
    fn jump_into_another_procedure_is_rejected() {
        let (arena, scan, mut code) = build(TWO_PROCS);
        // Redirect first's jump to second's loop head.
        let second_top = scan.lines[3].instruction as i32;
        let first_jump = scan.lines[1].instruction as usize;
        assert_eq!(Opcode::from_word(code[first_jump]), Some(Opcode::Jump));
        code[first_jump + JUMP_LOCATION] = second_top;
        let err = code_verify(&arena, &scan, &code).unwrap_err();
        assert!(err.message().contains("outside of procedure"), "{err}");
    }

    #[test]
    fn jump_between_instruction_boundaries_is_rejected() {
        let (arena, scan, mut code) = build(TWO_PROCS);
        let first_jump = scan.lines[1].instruction as usize;
        code[first_jump + JUMP_LOCATION] = 2; // middle of the add
        let err = code_verify(&arena, &scan, &code).unwrap_err();
        assert!(err.message().contains("doesn't land on an instruction"), "{err}");
    }

    #[test]
    fn corrupted_streams_are_rejected() {
        let (arena, scan, code) = build(TWO_PROCS);

        let mut bad = code.clone();
        bad[0] = 99;
        let err = code_verify(&arena, &scan, &bad).unwrap_err();
        assert!(err.message().contains("invalid instruction"), "{err}");

        let mut bad = code.clone();
        bad[1] = FLAG_IMMEDIATE; // add with an immediate destination
        bad[2] = 3;
        let err = code_verify(&arena, &scan, &bad).unwrap_err();
        assert!(err.message().contains("destination flagged as immediate"), "{err}");

        let mut bad = code.clone();
        bad[2] = 1000; // dest var index out of range
        let err = code_verify(&arena, &scan, &bad).unwrap_err();
        assert!(err.message().contains("var out of range"), "{err}");

        let truncated = &code[..code.len() - 1];
        // Drop the trailing ret of `second`, truncating its final jump.
        let err = code_verify(&arena, &scan, &truncated[..truncated.len() - 1]).unwrap_err();
        assert!(err.message().contains("ends before end"), "{err}");
    }
}
