//! Public interface for compiling and running CrustyVM programs.

use std::fmt;

use crate::bytecode::compiler::codegen;
use crate::bytecode::op::{FLAG_IMMEDIATE, FLAG_TYPE_MASK, FLAG_VAR};
use crate::bytecode::program::Program;
use crate::bytecode::verify::code_verify;
use crate::bytecode::vm::{Machine, Status};
use crate::callback::{Callback, ValType};
use crate::error::CompileError;
use crate::intern::{TokenArena, TokenId};
use crate::io::{LogWriter, StdLog};
use crate::preprocess::{self, MAX_PASSES};
use crate::safepath::SafePath;
use crate::symbols;
use crate::tokenize::{tokenize, Line};

/// Call stack depth used when the configured size is 0.
const DEFAULT_CALLSTACK_SIZE: usize = 256;

/// Maximum array elements printed per variable by `debug_trace(full)`.
const DEBUG_MAX_PRINT: u32 = 256;

/// Build- and run-time configuration for a VM.
#[derive(Debug, Default, Clone)]
pub struct VmConfig {
    /// Call stack depth (procedure nesting, not bytes); 0 means 256.
    pub callstack_size: usize,
    /// Name/value pairs replaced textually inside tokens, and visible to
    /// `if` as defined names.
    pub defines: Vec<(String, String)>,
    /// Loader for `include`/`binclude`. Pin it to the program's directory
    /// when the program itself came from a file.
    pub safe_path: SafePath,
    /// Dump the line array after tokenizing and after each preprocessor
    /// pass, through the log sink. Diagnostic only.
    pub output_passes: bool,
    /// Log every instruction before it executes. Diagnostic only.
    pub trace: bool,
    /// Tolerate an `endmacro` whose name matches neither the definition
    /// being recorded nor the expansion in progress, leaving the line in
    /// place instead of failing the compile.
    pub lenient_endmacro: bool,
}

/// Error from `begin`/`run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The VM is not in the `Ready` state; call `reset` first.
    NotReady,
    UnknownProcedure(String),
    /// Entry points must take no arguments.
    EntryPointArguments(String),
    /// Execution stopped with a fault status.
    Stopped(Status),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::NotReady => write!(f, "cannot start running, status is not ready"),
            RunError::UnknownProcedure(name) => write!(f, "couldn't find procedure: {name}"),
            RunError::EntryPointArguments(name) => {
                write!(f, "can't enter from procedure with arguments: {name}")
            }
            RunError::Stopped(status) => write!(f, "execution stopped with error: {status}"),
        }
    }
}

impl std::error::Error for RunError {}

/// A compiled, runnable VM instance.
///
/// Construction runs the whole pipeline: tokenize (with includes) →
/// preprocess to fixed point → register callbacks → symbol scan → symbols
/// verify → code generation → code verify → allocate and reset. No partial
/// VM is ever returned.
///
/// One instance executes serially on the caller's thread; callbacks invoked
/// during a step must not reenter the same instance.
pub struct CrustyVm<L: LogWriter = StdLog> {
    machine: Machine,
    callbacks: Vec<Callback>,
    log: L,
    trace: bool,
}

impl<L: LogWriter> CrustyVm<L> {
    /// Compiles `source` and prepares a VM.
    ///
    /// `name` is the module name used in diagnostics. Callback descriptors
    /// become global variables the program can read and write.
    ///
    /// # Errors
    ///
    /// Returns the first compile error with its stage and source location.
    pub fn new(
        name: &str,
        source: &[u8],
        callbacks: Vec<Callback>,
        config: VmConfig,
        mut log: L,
    ) -> Result<Self, CompileError> {
        for cb in &callbacks {
            if cb.read.is_none() && cb.write.is_none() {
                return Err(CompileError::new(
                    "adding callbacks",
                    format!("callback {} must have a read and/or write function", cb.name),
                ));
            }
            if cb.length == 0 {
                return Err(CompileError::new(
                    "adding callbacks",
                    format!("callback {} must have a length of at least 1", cb.name),
                ));
            }
        }

        let mut files = config.safe_path.clone();
        let mut arena = TokenArena::new();
        let mut lines = tokenize(&mut arena, name, source, &mut files)?;
        if lines.is_empty() {
            return Err(CompileError::new("tokenize", "no lines remain after pass"));
        }
        if config.output_passes {
            dump_lines(&mut log, &arena, &lines, "tokenize");
        }

        let defines: Vec<(TokenId, TokenId)> = config
            .defines
            .iter()
            .map(|(name, value)| (arena.intern_str(name), arena.intern_str(value)))
            .collect();

        let mut finished = false;
        for pass_num in 1..=MAX_PASSES {
            let pass = preprocess::preprocess(&mut arena, &lines, &defines, config.lenient_endmacro)?;
            lines = pass.lines;
            if lines.is_empty() {
                return Err(CompileError::new("preprocess", "no lines remain after pass"));
            }
            if config.output_passes {
                dump_lines(&mut log, &arena, &lines, &format!("preprocess {pass_num}"));
            }
            if !pass.found_macro {
                finished = true;
                break;
            }
        }
        if !finished {
            return Err(CompileError::new("preprocess", "preprocess passes exceeded"));
        }

        let callback_names: Vec<TokenId> = callbacks.iter().map(|cb| arena.intern_str(&cb.name)).collect();
        let mut scan = symbols::scan(&arena, lines, &callbacks, &mut files, &callback_names, &mut log)?;
        if scan.lines.is_empty() {
            return Err(CompileError::new("symbols scan", "no lines remain after pass"));
        }
        symbols::verify(&arena, &scan)?;

        let code = codegen(&arena, &mut scan)?;
        code_verify(&arena, &scan, &code)?;

        let program = Program {
            arena,
            lines: scan.lines,
            vars: scan.vars,
            procs: scan.procs,
            code,
            globals_image: scan.globals_image,
            stack_size: scan.stack_size,
        };
        let callstack_limit = if config.callstack_size == 0 {
            DEFAULT_CALLSTACK_SIZE
        } else {
            config.callstack_size
        };

        Ok(Self {
            machine: Machine::new(program, callstack_limit),
            callbacks,
            log,
            trace: config.trace,
        })
    }

    /// Reinitializes all program state. Idempotent; returns the VM to
    /// `Ready` from any status.
    pub fn reset(&mut self) {
        self.machine.reset();
    }

    /// Current execution status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.machine.status
    }

    /// True when `name` names a procedure that takes no arguments.
    #[must_use]
    pub fn has_entrypoint(&self, name: &str) -> bool {
        self.machine
            .program
            .find_proc(name)
            .is_some_and(|p| self.machine.program.procs[p].args == 0)
    }

    /// Bytes of token memory retained for diagnostics.
    #[must_use]
    pub fn token_memory(&self) -> usize {
        self.machine.program.arena.memory_used()
    }

    /// Bytes of data-stack memory.
    #[must_use]
    pub fn stack_memory(&self) -> usize {
        self.machine.stack.len()
    }

    /// Pushes a synthetic call frame for `procname` and activates execution.
    ///
    /// # Errors
    ///
    /// Fails when the VM is not `Ready`, the procedure does not exist or
    /// takes arguments, or frame setup faults (stack overflow).
    pub fn begin(&mut self, procname: &str) -> Result<(), RunError> {
        if self.machine.status != Status::Ready {
            return Err(RunError::NotReady);
        }
        let Some(proc_index) = self.machine.program.find_proc(procname) else {
            return Err(RunError::UnknownProcedure(procname.to_owned()));
        };
        if self.machine.program.procs[proc_index].args > 0 {
            return Err(RunError::EntryPointArguments(procname.to_owned()));
        }
        self.machine
            .begin(&mut self.callbacks, proc_index)
            .map_err(RunError::Stopped)
    }

    /// Executes one instruction and returns the new status. A no-op unless
    /// the status is `Active`.
    pub fn step(&mut self) -> Status {
        if self.trace && self.machine.status == Status::Active {
            let message = {
                let program = &self.machine.program;
                program.line_for_instruction(self.machine.ip).map(|line| {
                    let tokens: Vec<String> = line
                        .tokens
                        .iter()
                        .map(|&t| program.arena.display(t).into_owned())
                        .collect();
                    format!(
                        "trace:{}:{}: {}",
                        program.arena.display(line.module),
                        line.line,
                        tokens.join(" ")
                    )
                })
            };
            if let Some(message) = message {
                self.log.log(&message);
            }
        }
        self.machine.step(&mut self.callbacks)
    }

    /// Runs `procname` to completion.
    ///
    /// # Errors
    ///
    /// Propagates `begin` errors; a run that stops on any status other than
    /// `Ready` reports `RunError::Stopped`. The VM stays inspectable.
    pub fn run(&mut self, procname: &str) -> Result<(), RunError> {
        self.begin(procname)?;
        while self.step() == Status::Active {}
        match self.machine.status {
            Status::Ready => Ok(()),
            status => Err(RunError::Stopped(status)),
        }
    }

    /// Logs the call stack, argument bindings, locals and globals through
    /// the log sink. With `full`, array contents are printed up to 256
    /// elements per variable.
    pub fn debug_trace(&mut self, full: bool) {
        let mut out: Vec<String> = Vec::new();
        self.render_trace(full, &mut out);
        for line in &out {
            self.log.log(line);
        }
    }

    fn render_trace(&self, full: bool, out: &mut Vec<String>) {
        let m = &self.machine;
        let p = &m.program;

        let mut csp = m.cstack.len();
        let start_csp = csp;
        let mut sp = m.sp;
        let mut ip = m.ip;

        while csp > 0 {
            let frame = m.cstack[csp - 1];
            let proc = &p.procs[frame.proc];
            // Frames below the top hold the next instruction, not the
            // current one.
            let loc = match p.line_for_instruction(ip) {
                Some(line) => format!(
                    "{}:{}",
                    p.arena.display(line.module),
                    if csp == start_csp { line.line } else { line.line.saturating_sub(1) }
                ),
                None => "invalid".to_owned(),
            };
            let mut head = format!("{csp}: {}@{loc}", p.proc_name(frame.proc));
            for &vi in proc.vars.iter().take(proc.args as usize) {
                head.push(' ');
                head.push_str(&p.var_name(vi as usize));
            }
            out.push(head);

            for i in 0..proc.args {
                let slot = &p.vars[proc.vars[i as usize] as usize];
                let slot_name = p.arena.display(slot.name);
                match m.stack_arg(sp, i + 1) {
                    Ok(arg) if arg.flags & FLAG_TYPE_MASK == FLAG_VAR => {
                        let target = &p.vars[arg.val as usize];
                        let owner = match target.owner {
                            Some(o) => p.proc_name(o as usize),
                            None => "Global".to_owned(),
                        };
                        out.push(format!(
                            " {i}: {slot_name} -> {owner}.{}@{}[{}]:{}",
                            p.arena.display(target.name),
                            arg.ptr,
                            target.length,
                            arg.index
                        ));
                    }
                    Ok(arg) if arg.flags & FLAG_TYPE_MASK == FLAG_IMMEDIATE => {
                        out.push(format!(" {i}: {slot_name} = {}", arg.val));
                    }
                    Ok(arg) => out.push(format!(" {i}: invalid flags {:X}", arg.flags)),
                    Err(_) => out.push(format!(" {i}: invalid descriptor")),
                }
            }

            for &vi in proc.vars.iter().skip(proc.args as usize) {
                let var = &p.vars[vi as usize];
                let addr = sp.saturating_sub(var.offset as usize);
                let mut line = format!(" {}: {}@{addr}[{}]", vi, p.var_name(vi as usize), var.length);
                if full {
                    line.push_str(&self.render_values(var.ty, addr, var.length));
                }
                out.push(line);
            }

            sp = sp.saturating_sub(proc.frame_size as usize);
            ip = frame.return_ip;
            csp -= 1;
        }

        out.push("Global:".to_owned());
        for (i, var) in p.vars.iter().enumerate() {
            if !var.is_global() {
                continue;
            }
            if var.is_callback() {
                out.push(format!(" {i}: {}[{}] CB", p.var_name(i), var.length));
            } else {
                let mut line = format!(" {i}: {}@{}[{}]", p.var_name(i), var.offset, var.length);
                if full {
                    line.push_str(&self.render_values(var.ty, var.offset as usize, var.length));
                }
                out.push(line);
            }
        }
    }

    fn render_values(&self, ty: ValType, addr: usize, length: u32) -> String {
        let m = &self.machine;
        let count = length.min(DEBUG_MAX_PRINT);
        let mut out = String::new();
        match ty {
            ValType::Char => {
                out.push_str(" \"");
                for j in 0..count {
                    let byte = m.stack.get(addr + j as usize).copied().unwrap_or(0);
                    out.push(char::from(byte));
                }
                out.push('"');
            }
            ValType::Float => {
                for j in 0..count {
                    let bytes = m
                        .stack
                        .get(addr + j as usize * 8..addr + j as usize * 8 + 8)
                        .and_then(|b| <[u8; 8]>::try_from(b).ok());
                    match bytes {
                        Some(b) => out.push_str(&format!(" {}", f64::from_le_bytes(b))),
                        None => out.push_str(" ?"),
                    }
                }
            }
            ValType::Int | ValType::None => {
                for j in 0..count {
                    let bytes = m
                        .stack
                        .get(addr + j as usize * 4..addr + j as usize * 4 + 4)
                        .and_then(|b| <[u8; 4]>::try_from(b).ok());
                    match bytes {
                        Some(b) => out.push_str(&format!(" {}", i32::from_le_bytes(b))),
                        None => out.push_str(" ?"),
                    }
                }
            }
        }
        out
    }
}

impl<L: LogWriter> fmt::Debug for CrustyVm<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrustyVm")
            .field("status", &self.machine.status)
            .field("procs", &self.machine.program.procs.len())
            .field("vars", &self.machine.program.vars.len())
            .field("code_words", &self.machine.program.code.len())
            .finish_non_exhaustive()
    }
}

/// Dumps a line array through the log sink. Diagnostic only; the format is
/// not part of the contract.
fn dump_lines(log: &mut impl LogWriter, arena: &TokenArena, lines: &[Line], stage: &str) {
    for line in lines {
        let tokens: Vec<String> = line.tokens.iter().map(|&t| arena.display(t).into_owned()).collect();
        log.log(&format!(
            "{stage}:{}:{}: {}",
            arena.display(line.module),
            line.line,
            tokens.join(" ")
        ));
    }
}
