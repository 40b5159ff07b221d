//! Symbol scan and symbols verification.
//!
//! A single forward pass over the preprocessed lines consumes the declarative
//! directives (`stack`, `static`, `local`, `proc`, `label`, `binclude`,
//! argument lists) and produces the variable and procedure tables, the
//! initial-stack image for globals and the per-procedure initializer images.
//! Instruction lines are copied through for code generation.
//!
//! Stack layout:
//! - Globals occupy `[0, globals_bytes)`; a global's `offset` is absolute.
//! - A frame occupies `frame_size` bytes above the caller's stack pointer.
//!   Argument descriptors sit at the top, indexed downward: argument *i*
//!   (1-based) lives at `sp - i * STACK_ARG_SIZE` and its `offset` is *i*.
//! - Other locals grow the frame toward higher addresses; their `offset` is
//!   the distance from the frame top down to the end of the local, so
//!   `sp - offset` is the local's start. CHAR allocations pad the frame back
//!   up to integer alignment.

use ahash::AHashMap;

use crate::callback::{Callback, ValType};
use crate::error::{CompileError, CompileResult};
use crate::expr;
use crate::intern::{TokenArena, TokenId};
use crate::io::LogWriter;
use crate::safepath::SafePath;
use crate::tokenize::Line;

/// Size of one packed argument descriptor on the data stack.
pub(crate) const STACK_ARG_SIZE: u32 = 16;

/// Stack allocation alignment in bytes.
pub(crate) const ALIGNMENT: u32 = 4;

const STAGE: &str = "symbols scan";
const VERIFY_STAGE: &str = "symbols verification";

/// Host-capability summary of a callback variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub(crate) struct CallbackRef {
    pub(crate) index: u32,
    pub(crate) readable: bool,
    pub(crate) writable: bool,
}

/// A named storage location (or callback binding).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct Variable {
    pub(crate) name: TokenId,
    pub(crate) ty: ValType,
    /// Owning procedure index; `None` for globals.
    pub(crate) owner: Option<u32>,
    /// 0 = procedure argument, 1 = scalar, >1 = array.
    pub(crate) length: u32,
    /// See the stack layout notes in the module docs.
    pub(crate) offset: u32,
    pub(crate) callback: Option<CallbackRef>,
}

impl Variable {
    pub(crate) fn is_global(&self) -> bool {
        self.owner.is_none()
    }

    pub(crate) fn is_argument(&self) -> bool {
        self.length == 0
    }

    pub(crate) fn is_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Bytes of stack storage this variable occupies.
    pub(crate) fn size_bytes(&self) -> u32 {
        self.length * self.ty.elem_size() as u32
    }

    /// A write-only callback cannot be read (everything else can).
    pub(crate) fn is_readable(&self) -> bool {
        self.callback.map_or(true, |cb| cb.readable)
    }

    /// A read-only callback cannot be written; immediates and lengths are
    /// handled by the operand parser, not here.
    pub(crate) fn is_writable(&self) -> bool {
        self.callback.map_or(true, |cb| cb.writable)
    }

    /// True when writes route to a host callback rather than memory.
    pub(crate) fn is_writable_callback(&self) -> bool {
        self.callback.is_some_and(|cb| cb.writable)
    }
}

/// A label bound to the next emitted line of its procedure.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct Label {
    pub(crate) name: TokenId,
    pub(crate) line: u32,
}

/// A scanned procedure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Procedure {
    pub(crate) name: TokenId,
    /// First line index of the procedure body in the scanned line list.
    pub(crate) start: u32,
    /// Number of body lines, the closing `ret` included.
    pub(crate) line_count: u32,
    pub(crate) args: u32,
    /// Variable indexes owned by this procedure, arguments first.
    pub(crate) vars: Vec<u32>,
    /// Frame bytes reserved on entry.
    pub(crate) frame_size: u32,
    /// Byte image copied onto the frame on entry; `frame_size` long.
    pub(crate) initializer: Vec<u8>,
    pub(crate) labels: Vec<Label>,
    /// Entry instruction index, set by code generation.
    pub(crate) entry: u32,
}

/// Everything the symbol scan produces.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct ScanOutput {
    pub(crate) lines: Vec<Line>,
    pub(crate) vars: Vec<Variable>,
    pub(crate) procs: Vec<Procedure>,
    pub(crate) globals_image: Vec<u8>,
    pub(crate) stack_size: u32,
}

impl ScanOutput {
    pub(crate) fn globals_bytes(&self) -> u32 {
        self.globals_image.len() as u32
    }
}

/// Looks a name up, locals of `proc` first so they shadow globals.
pub(crate) fn find_variable(
    arena: &TokenArena,
    vars: &[Variable],
    proc: Option<&Procedure>,
    name: &[u8],
) -> Option<usize> {
    if let Some(proc) = proc {
        for &vi in &proc.vars {
            if arena.bytes(vars[vi as usize].name) == name {
                return Some(vi as usize);
            }
        }
    }
    vars.iter()
        .position(|v| v.is_global() && arena.bytes(v.name) == name)
}

/// The parsed form of a `static`/`local` initializer.
enum Declaration {
    Int(Vec<i32>),
    Float(Vec<f64>),
    Chars(Vec<u8>),
}

impl Declaration {
    fn ty(&self) -> ValType {
        match self {
            Declaration::Int(_) => ValType::Int,
            Declaration::Float(_) => ValType::Float,
            Declaration::Chars(_) => ValType::Char,
        }
    }

    fn length(&self) -> u32 {
        match self {
            Declaration::Int(v) => v.len() as u32,
            Declaration::Float(v) => v.len() as u32,
            Declaration::Chars(v) => v.len() as u32,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Declaration::Int(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
            Declaration::Float(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
            Declaration::Chars(v) => v.clone(),
        }
    }
}

fn parse_float_token(bytes: &[u8]) -> Option<f64> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

fn number_list_ints(bytes: &[u8]) -> Option<Vec<i32>> {
    let words: Vec<_> = bytes
        .split(|&c| c == b' ' || c == b'\t')
        .filter(|w| !w.is_empty())
        .collect();
    words.iter().map(|w| expr::parse_int_token(w)).collect()
}

fn number_list_floats(bytes: &[u8]) -> Option<Vec<f64>> {
    let words: Vec<_> = bytes
        .split(|&c| c == b' ' || c == b'\t')
        .filter(|w| !w.is_empty())
        .collect();
    words.iter().map(|w| parse_float_token(w)).collect()
}

/// Parses the initializer part of a `static`/`local` line (tokens from
/// index 2 onward).
fn parse_declaration(arena: &TokenArena, line: &Line) -> Result<Declaration, String> {
    match line.tokens.len() {
        // No initializer: a single integer, zero.
        2 => Ok(Declaration::Int(vec![0])),
        3 => match expr::parse_int_token(arena.bytes(line.tokens[2])) {
            Some(n) => Ok(Declaration::Int(vec![n])),
            None => Err("initializer wasn't a number".to_owned()),
        },
        4 => {
            let form = line.tokens[2];
            let body = arena.bytes(line.tokens[3]);
            if arena.eq_str(form, "ints") {
                let list = number_list_ints(body)
                    .filter(|l| !l.is_empty())
                    .ok_or("initializer must be a space separated list of numbers")?;
                if list.len() == 1 {
                    // A single value is an array size, zero-filled.
                    let size = list[0];
                    if size <= 0 {
                        return Err("array size must be positive and non zero".to_owned());
                    }
                    Ok(Declaration::Int(vec![0; size as usize]))
                } else {
                    Ok(Declaration::Int(list))
                }
            } else if arena.eq_str(form, "floats") {
                // A lone integer is a size; anything else is a value list.
                if let Some(size) = expr::parse_int_token(body) {
                    if size <= 0 {
                        return Err("array size must be positive and non zero".to_owned());
                    }
                    Ok(Declaration::Float(vec![0.0; size as usize]))
                } else {
                    let list = number_list_floats(body)
                        .filter(|l| !l.is_empty())
                        .ok_or("initializer must be a space separated list of numbers")?;
                    Ok(Declaration::Float(list))
                }
            } else if arena.eq_str(form, "string") {
                if body.is_empty() {
                    return Err("string initializer must not be empty".to_owned());
                }
                Ok(Declaration::Chars(body.to_vec()))
            } else {
                Err("variable declaration can be array or string".to_owned())
            }
        }
        _ => Err("declaration takes a name and optionally an initializer, array or string".to_owned()),
    }
}

/// Scanner state for one pass.
struct Scanner<'a> {
    arena: &'a TokenArena,
    vars: Vec<Variable>,
    procs: Vec<Procedure>,
    globals_image: Vec<u8>,
    global_names: AHashMap<Vec<u8>, u32>,
    local_names: AHashMap<Vec<u8>, u32>,
    /// Deferred (offset, bytes) pairs for the open procedure's initializer.
    local_inits: Vec<(u32, Vec<u8>)>,
    cur_proc: Option<usize>,
    stack_size: u32,
}

impl<'a> Scanner<'a> {
    fn declare_global(&mut self, name: TokenId, ty: ValType, length: u32, init: &[u8]) -> Result<u32, String> {
        let key = self.arena.bytes(name).to_vec();
        if let Some(&prev) = self.global_names.get(&key) {
            let kind = if self.vars[prev as usize].is_callback() {
                "callback"
            } else {
                "static"
            };
            return Err(format!("redeclaration of {kind} variable: {}", self.arena.display(name)));
        }

        let offset = self.globals_image.len() as u32;
        self.globals_image.extend_from_slice(init);
        // CHAR data is padded at the high address up to integer alignment.
        while self.globals_image.len() % ALIGNMENT as usize != 0 {
            self.globals_image.push(0);
        }

        let index = self.vars.len() as u32;
        self.vars.push(Variable {
            name,
            ty,
            owner: None,
            length,
            offset,
            callback: None,
        });
        self.global_names.insert(key, index);
        Ok(index)
    }

    fn declare_local(&mut self, name: TokenId, ty: ValType, length: u32, init: &[u8]) -> Result<u32, String> {
        let pi = self.cur_proc.expect("local outside procedure");
        let key = self.arena.bytes(name).to_vec();
        if self.local_names.contains_key(&key) {
            return Err(format!("redeclaration of local variable: {}", self.arena.display(name)));
        }

        let proc = &mut self.procs[pi];
        let offset = if length == 0 {
            // Argument slot: a packed descriptor at the top of the frame,
            // filled at call time. Its offset is the 1-based ordinal.
            proc.args += 1;
            proc.frame_size += STACK_ARG_SIZE;
            proc.args
        } else {
            let size = length * ty.elem_size() as u32;
            proc.frame_size += size;
            if ty == ValType::Char {
                proc.frame_size = align_up(proc.frame_size);
            }
            self.local_inits.push((proc.frame_size, init.to_vec()));
            proc.frame_size
        };

        let index = self.vars.len() as u32;
        self.vars.push(Variable {
            name,
            ty,
            owner: Some(pi as u32),
            length,
            offset,
            callback: None,
        });
        self.procs[pi].vars.push(index);
        self.local_names.insert(key, index);
        Ok(index)
    }

    /// Assembles the open procedure's initializer image from the deferred
    /// pieces. Padding and argument slots stay zero.
    fn close_proc(&mut self) {
        let pi = self.cur_proc.take().expect("no open procedure");
        let proc = &mut self.procs[pi];
        let frame = proc.frame_size as usize;
        let mut image = vec![0u8; frame];
        for (offset, bytes) in self.local_inits.drain(..) {
            let start = frame - offset as usize;
            image[start..start + bytes.len()].copy_from_slice(&bytes);
        }
        proc.initializer = image;
        self.stack_size += proc.frame_size;
        self.local_names.clear();
    }
}

fn align_up(value: u32) -> u32 {
    value.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// Runs the symbol scan.
///
/// `callbacks` become global callback variables before any line is examined,
/// so programs can reference them like any other global. `log` receives
/// warnings (currently only for rejected `binclude` ranges).
pub(crate) fn scan(
    arena: &TokenArena,
    input: Vec<Line>,
    callbacks: &[Callback],
    files: &mut SafePath,
    callback_names: &[TokenId],
    log: &mut impl LogWriter,
) -> CompileResult<ScanOutput> {
    let mut scanner = Scanner {
        arena,
        vars: Vec::new(),
        procs: Vec::new(),
        globals_image: Vec::new(),
        global_names: AHashMap::new(),
        local_names: AHashMap::new(),
        local_inits: Vec::new(),
        cur_proc: None,
        stack_size: 0,
    };

    for (i, cb) in callbacks.iter().enumerate() {
        let name = callback_names[i];
        let key = arena.bytes(name).to_vec();
        if scanner.global_names.contains_key(&key) {
            return Err(CompileError::new(
                STAGE,
                format!("redeclaration of callback variable: {}", cb.name),
            ));
        }
        let index = scanner.vars.len() as u32;
        scanner.vars.push(Variable {
            name,
            ty: cb.read_type,
            owner: None,
            length: cb.length,
            offset: 0,
            callback: Some(CallbackRef {
                index: i as u32,
                readable: cb.read.is_some(),
                writable: cb.write.is_some(),
            }),
        });
        scanner.global_names.insert(key, index);
    }

    let mut output: Vec<Line> = Vec::with_capacity(input.len());

    for line in &input {
        let err = |arena: &TokenArena, msg: String| {
            CompileError::at(STAGE, arena.display(line.module).into_owned(), line.line, msg)
        };
        let first = line.tokens[0];

        if arena.eq_str(first, "proc") {
            if line.tokens.len() < 2 {
                return Err(err(arena, "proc takes a name as argument".to_owned()));
            }
            if scanner.cur_proc.is_some() {
                return Err(err(arena, "proc within proc".to_owned()));
            }
            let name = line.tokens[1];
            if scanner
                .procs
                .iter()
                .any(|p| arena.eq_tokens(p.name, name))
            {
                return Err(err(
                    arena,
                    format!("redeclaration of procedure: {}", arena.display(name)),
                ));
            }
            scanner.procs.push(Procedure {
                name,
                start: output.len() as u32,
                line_count: 0,
                args: 0,
                vars: Vec::new(),
                frame_size: 0,
                initializer: Vec::new(),
                labels: Vec::new(),
                entry: 0,
            });
            scanner.cur_proc = Some(scanner.procs.len() - 1);
            for &arg in &line.tokens[2..] {
                scanner
                    .declare_local(arg, ValType::None, 0, &[])
                    .map_err(|msg| err(arena, msg))?;
            }
            continue;
        } else if arena.eq_str(first, "ret") {
            match scanner.cur_proc {
                Some(pi) => {
                    scanner.procs[pi].line_count += 1;
                    scanner.close_proc();
                }
                None => return Err(err(arena, "ret without proc".to_owned())),
            }
            // `ret` is a real instruction; it stays in the stream.
            output.push(line.clone());
            continue;
        } else if arena.eq_str(first, "static") {
            if line.tokens.len() < 2 {
                return Err(err(arena, "static takes a name as argument".to_owned()));
            }
            let decl = parse_declaration(arena, line).map_err(|msg| err(arena, msg))?;
            scanner
                .declare_global(line.tokens[1], decl.ty(), decl.length(), &decl.bytes())
                .map_err(|msg| err(arena, msg))?;
            continue;
        } else if arena.eq_str(first, "local") {
            if line.tokens.len() < 2 {
                return Err(err(arena, "local takes a name as argument".to_owned()));
            }
            if scanner.cur_proc.is_none() {
                return Err(err(arena, "local declared outside of procedure".to_owned()));
            }
            let decl = parse_declaration(arena, line).map_err(|msg| err(arena, msg))?;
            scanner
                .declare_local(line.tokens[1], decl.ty(), decl.length(), &decl.bytes())
                .map_err(|msg| err(arena, msg))?;
            continue;
        } else if arena.eq_str(first, "stack") {
            if line.tokens.len() != 2 {
                return Err(err(arena, "stack takes a number as argument".to_owned()));
            }
            match expr::parse_int_token(arena.bytes(line.tokens[1])) {
                Some(n) if n >= 0 => scanner.stack_size += n as u32,
                _ => return Err(err(arena, "stack takes a non-negative number as argument".to_owned())),
            }
            continue;
        } else if arena.eq_str(first, "label") {
            if line.tokens.len() != 2 {
                return Err(err(arena, "label takes a name as argument".to_owned()));
            }
            let Some(pi) = scanner.cur_proc else {
                return Err(err(arena, "label not in a procedure".to_owned()));
            };
            let name = line.tokens[1];
            if scanner.procs[pi].labels.iter().any(|l| arena.eq_tokens(l.name, name)) {
                return Err(err(arena, format!("duplicate label: {}", arena.display(name))));
            }
            scanner.procs[pi].labels.push(Label {
                name,
                line: output.len() as u32,
            });
            continue;
        } else if arena.eq_str(first, "binclude") {
            binclude(arena, line, &mut scanner, files, &mut *log).map_err(|msg| err(arena, msg))?;
            continue;
        }

        if let Some(pi) = scanner.cur_proc {
            scanner.procs[pi].line_count += 1;
        }
        output.push(line.clone());
    }

    if let Some(pi) = scanner.cur_proc {
        let name = arena.display(scanner.procs[pi].name).into_owned();
        return Err(CompileError::new(STAGE, format!("procedure without ret: {name}")));
    }

    scanner.stack_size += scanner.globals_image.len() as u32;

    Ok(ScanOutput {
        lines: output,
        vars: scanner.vars,
        procs: scanner.procs,
        globals_image: scanner.globals_image,
        stack_size: scanner.stack_size,
    })
}

/// Handles one `binclude NAME chars|ints|floats FILE [start [length]]` line.
///
/// A requested range past the end of the file is rejected, with a warning
/// through the log sink ahead of the error.
fn binclude(
    arena: &TokenArena,
    line: &Line,
    scanner: &mut Scanner<'_>,
    files: &mut SafePath,
    log: &mut impl LogWriter,
) -> Result<(), String> {
    if line.tokens.len() < 4 || line.tokens.len() > 6 {
        return Err(
            "binclude takes a symbol name, type and filename and optionally a start and length".to_owned(),
        );
    }

    let ty = if arena.eq_str(line.tokens[2], "chars") {
        ValType::Char
    } else if arena.eq_str(line.tokens[2], "ints") {
        ValType::Int
    } else if arena.eq_str(line.tokens[2], "floats") {
        ValType::Float
    } else {
        return Err("type must be chars, ints or floats".to_owned());
    };

    let mut start = 0usize;
    let mut explicit_length = None;
    if line.tokens.len() >= 5 {
        start = expr::parse_int_token(arena.bytes(line.tokens[4]))
            .filter(|&n| n >= 0)
            .ok_or("binclude start field must be a number")? as usize;
    }
    if line.tokens.len() == 6 {
        let len = expr::parse_int_token(arena.bytes(line.tokens[5]))
            .filter(|&n| n >= 0)
            .ok_or("binclude length field must be a number")? as usize;
        explicit_length = Some(len);
    }

    let filename = arena
        .as_str(line.tokens[3])
        .ok_or("binclude filename is not valid UTF-8")?
        .to_owned();
    let data = files.load(&filename)?;

    let range_warning = |log: &mut dyn LogWriter, msg: &str| {
        log.log(&format!(
            "warning:{STAGE}:{}:{}: {msg}",
            arena.display(line.module),
            line.line
        ));
    };

    if start > data.len() {
        let msg = format!(
            "binclude start {start} is past the end of {filename} ({} bytes)",
            data.len()
        );
        range_warning(log, &msg);
        return Err(msg);
    }
    let take = match explicit_length {
        Some(len) => {
            if start + len > data.len() {
                let msg = format!(
                    "binclude range {start}+{len} extends past the end of {filename} ({} bytes)",
                    data.len()
                );
                range_warning(log, &msg);
                return Err(msg);
            }
            len
        }
        None => data.len() - start,
    };

    // Truncate down to a whole number of elements.
    let elem = ty.elem_size();
    let take = take / elem * elem;
    if take == 0 {
        return Err("selected size not large enough for type".to_owned());
    }

    let bytes = &data[start..start + take];
    let length = (take / elem) as u32;
    if scanner.cur_proc.is_some() {
        scanner.declare_local(line.tokens[1], ty, length, bytes)?;
    } else {
        scanner.declare_global(line.tokens[1], ty, length, bytes)?;
    }
    Ok(())
}

/// Checks bounds, ownership and non-overlap for every variable.
pub(crate) fn verify(arena: &TokenArena, out: &ScanOutput) -> CompileResult<()> {
    let name = |id: TokenId| arena.display(id).into_owned();
    let fail = |msg: String| Err(CompileError::new(VERIFY_STAGE, msg));
    let globals_bytes = out.globals_bytes();

    // Byte range helpers; callbacks have no storage and are skipped.
    let global_range = |v: &Variable| (v.offset, v.offset + v.size_bytes());

    for (i, var) in out.vars.iter().enumerate() {
        if var.is_global() {
            if var.is_callback() {
                continue;
            }
            if var.length == 0 {
                return fail(format!("global variable {} has 0 length", name(var.name)));
            }
            if var.ty == ValType::None {
                return fail(format!("non-callback variable {} with invalid type", name(var.name)));
            }
            let (start, end) = global_range(var);
            if end > globals_bytes {
                return fail(format!(
                    "global variable {} exceeds initial stack: {start}..{end} > {globals_bytes}",
                    name(var.name)
                ));
            }
            for other in out.vars.iter().skip(i + 1) {
                if !other.is_global() || other.is_callback() {
                    continue;
                }
                let (ostart, oend) = global_range(other);
                if start < oend && ostart < end {
                    return fail(format!(
                        "global variables {} and {} overlap: ({start} -> {end}) ({ostart} -> {oend})",
                        name(var.name),
                        name(other.name)
                    ));
                }
            }
        } else {
            if var.is_callback() {
                return fail(format!("local variable {} with callback", name(var.name)));
            }
        }
    }

    for (pi, proc) in out.procs.iter().enumerate() {
        // Frame byte range of a variable, measured from the frame base.
        let frame_range = |v: &Variable| -> Option<(u32, u32)> {
            if v.is_argument() {
                let end = proc.frame_size.checked_sub((v.offset - 1) * STACK_ARG_SIZE)?;
                Some((end.checked_sub(STACK_ARG_SIZE)?, end))
            } else {
                let start = proc.frame_size.checked_sub(v.offset)?;
                Some((start, start + v.size_bytes()))
            }
        };

        for (j, &vi) in proc.vars.iter().enumerate() {
            let var = &out.vars[vi as usize];
            if var.owner != Some(pi as u32) {
                return fail(format!(
                    "variable {} listed by procedure {} but owned elsewhere",
                    name(var.name),
                    name(proc.name)
                ));
            }
            if var.is_argument() {
                if j as u32 >= proc.args {
                    return fail(format!(
                        "variable {} in proc {} has 0 length but sits after the arguments",
                        name(var.name),
                        name(proc.name)
                    ));
                }
                if var.offset == 0 || var.offset > proc.args {
                    return fail(format!(
                        "argument {} in proc {} has ordinal {} outside 1..={}",
                        name(var.name),
                        name(proc.name),
                        var.offset,
                        proc.args
                    ));
                }
            }
            let Some((start, end)) = frame_range(var) else {
                return fail(format!(
                    "variable {} from procedure {} exceeds needed stack",
                    name(var.name),
                    name(proc.name)
                ));
            };
            if end > proc.frame_size {
                return fail(format!(
                    "variable {} from procedure {} exceeds needed stack: {end} > {}",
                    name(var.name),
                    name(proc.name),
                    proc.frame_size
                ));
            }
            for &vk in proc.vars.iter().skip(j + 1) {
                let other = &out.vars[vk as usize];
                let Some((ostart, oend)) = frame_range(other) else {
                    continue;
                };
                if start < oend && ostart < end {
                    return fail(format!(
                        "variables {} and {} from procedure {} overlap: ({start} -> {end}) ({ostart} -> {oend})",
                        name(var.name),
                        name(other.name),
                        name(proc.name)
                    ));
                }
            }
        }
    }

    Ok(())
}
