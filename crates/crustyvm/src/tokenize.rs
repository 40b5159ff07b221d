//! Tokenizer and includer.
//!
//! Turns source bytes into a list of [`Line`]s, each holding the arena ids of
//! its tokens plus its module/line origin for diagnostics. `include` lines are
//! resolved here: the named file is loaded through the safe-path loader and
//! its lines are spliced in place of the `include` line. Quoted strings may
//! span lines; `;` starts a comment; blank lines are dropped.

use std::borrow::Cow;

use crate::error::{CompileError, CompileResult};
use crate::intern::{TokenArena, TokenId};
use crate::safepath::SafePath;

/// Maximum depth of nested `include`s, counting the root module.
pub(crate) const MAX_INCLUDE_DEPTH: usize = 16;

const STAGE: &str = "tokenize";

/// One significant source line.
///
/// `instruction` is filled during code generation and is used for jump
/// relocation and the debug trace; it is meaningless before that pass.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Line {
    pub(crate) module: TokenId,
    pub(crate) line: u32,
    pub(crate) tokens: Vec<TokenId>,
    pub(crate) instruction: u32,
}

impl Line {
    pub(crate) fn new(module: TokenId, line: u32, tokens: Vec<TokenId>) -> Self {
        Self {
            module,
            line,
            tokens,
            instruction: 0,
        }
    }
}

/// Whitespace and separators that end a token.
fn is_junk(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | b';')
}

struct Frame<'a> {
    data: Cow<'a, [u8]>,
    module: TokenId,
    line: u32,
    pos: usize,
}

/// Tokenizes `source`, resolving `include`s through `files`.
pub(crate) fn tokenize(
    arena: &mut TokenArena,
    module_name: &str,
    source: &[u8],
    files: &mut SafePath,
) -> CompileResult<Vec<Line>> {
    let root_module = arena.intern_str(module_name);
    let mut frames: Vec<Frame<'_>> = vec![Frame {
        data: Cow::Borrowed(source),
        module: root_module,
        line: 0,
        pos: 0,
    }];
    let mut lines = Vec::new();

    while let Some(top) = frames.last() {
        if top.pos >= top.data.len() {
            frames.pop();
            continue;
        }

        let fi = frames.len() - 1;
        let module = frames[fi].module;
        frames[fi].line += 1;
        let mut cur_line = frames[fi].line;
        let line_no = cur_line;
        let pos = frames[fi].pos;

        let err_here = |arena: &TokenArena, line: u32, msg: String| {
            CompileError::at(STAGE, arena.display(module).into_owned(), line, msg)
        };

        // Find the extent of the line: `consumed` is everything up to and
        // including the newline, `significant` stops at the first comment.
        let (consumed, significant) = {
            let data = &frames[fi].data[..];
            let len = data.len();
            let mut i = 0;
            let mut significant: Option<usize> = None;
            let consumed = loop {
                if pos + i >= len {
                    break i;
                }
                match data[pos + i] {
                    c @ (b'\r' | b'\n') => {
                        significant.get_or_insert(i);
                        let other = if c == b'\r' { b'\n' } else { b'\r' };
                        let mut adv = 1;
                        if pos + i + 1 < len && data[pos + i + 1] == other {
                            adv += 1;
                        }
                        break i + adv;
                    }
                    b'"' if significant.is_none() => {
                        // Quoted strings may span lines; skip to the next
                        // unescaped quote.
                        let mut j = i + 1;
                        loop {
                            if pos + j >= len {
                                return Err(err_here(
                                    arena,
                                    cur_line,
                                    "quoted string reached end of file".to_owned(),
                                ));
                            }
                            if data[pos + j] == b'"' && data[pos + j - 1] != b'\\' {
                                break;
                            }
                            j += 1;
                        }
                        i = j + 1;
                    }
                    b';' => {
                        significant.get_or_insert(i);
                        i += 1;
                    }
                    _ => i += 1,
                }
            };
            (consumed, significant.unwrap_or(consumed))
        };

        // Split the significant region into tokens.
        let mut tokens = Vec::new();
        {
            let data = &frames[fi].data[..];
            let mut cursor = 0;
            while cursor < significant {
                let c = data[pos + cursor];
                if is_junk(c) {
                    cursor += 1;
                } else if c == b'"' {
                    let start = cursor + 1;
                    let mut j = start;
                    while !(data[pos + j] == b'"' && data[pos + j - 1] != b'\\') {
                        j += 1;
                    }
                    let id = arena
                        .intern_quoted(&data[pos + start..pos + j], &mut cur_line)
                        .map_err(|msg| err_here(arena, line_no, msg))?;
                    tokens.push(id);
                    cursor = j + 1;
                } else {
                    let start = cursor;
                    while cursor < significant && !is_junk(data[pos + cursor]) {
                        cursor += 1;
                    }
                    tokens.push(arena.intern(&data[pos + start..pos + cursor]));
                }
            }
        }
        frames[fi].line = cur_line;

        if !tokens.is_empty() && arena.eq_str(tokens[0], "include") {
            if tokens.len() != 2 {
                return Err(err_here(arena, line_no, "include takes a single filename".to_owned()));
            }
            if frames.len() >= MAX_INCLUDE_DEPTH {
                return Err(err_here(arena, line_no, "includes too deep".to_owned()));
            }
            for frame in &frames {
                if arena.eq_tokens(tokens[1], frame.module) {
                    return Err(err_here(
                        arena,
                        line_no,
                        format!("circular include of {}", arena.display(tokens[1])),
                    ));
                }
            }
            let filename = arena
                .as_str(tokens[1])
                .ok_or_else(|| err_here(arena, line_no, "include filename is not valid UTF-8".to_owned()))?
                .to_owned();
            let data = files
                .load(&filename)
                .map_err(|msg| err_here(arena, line_no, format!("failed to open include file: {msg}")))?;

            // Scanning resumes after the include line once the included
            // module is exhausted.
            frames[fi].pos += consumed;
            frames.push(Frame {
                data: Cow::Owned(data),
                module: tokens[1],
                line: 0,
                pos: 0,
            });
            continue;
        }

        frames[fi].pos += consumed;
        if !tokens.is_empty() {
            lines.push(Line::new(module, line_no, tokens));
        }
    }

    Ok(lines)
}
