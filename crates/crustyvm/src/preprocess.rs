//! Preprocessor: command-line defines, `macro`/`endmacro`, `if` and `expr`.
//!
//! One call to [`preprocess`] performs a single pass over the line list.
//! Macro calls encountered outside a definition are expanded inline by
//! driving the line cursor into the recorded body and back; definitions
//! nested inside a body are absorbed textually and reported through the
//! returned flag so the caller runs another pass. The caller iterates until
//! no such work remains, up to [`MAX_PASSES`].
//!
//! Textual replacement operates on occurrences *inside* tokens, in order:
//! command-line defines, then the active macro's formal parameters, then
//! `expr`-defined names.

use ahash::AHashMap;

use crate::error::{CompileError, CompileResult};
use crate::expr;
use crate::intern::{TokenArena, TokenId};
use crate::tokenize::Line;

/// Maximum number of preprocessor passes before the compile is rejected.
pub(crate) const MAX_PASSES: usize = 16;

/// Maximum depth of nested macro expansions.
pub(crate) const MACRO_STACK_SIZE: usize = 32;

const STAGE: &str = "preprocess";

/// Words that can never be macro names: directives consumed later plus the
/// instruction mnemonics.
const RESERVED: &[&str] = &[
    "stack", "proc", "ret", "label", "static", "local", "binclude", "move", "add", "sub", "mul", "div", "mod",
    "and", "or", "xor", "shl", "shr", "cmp", "jump", "jumpn", "jumpz", "jumpl", "jumpg", "call",
];

#[derive(Debug)]
struct Macro {
    name: TokenId,
    params: Vec<TokenId>,
    /// Index of the first body line in the input line list.
    start: usize,
    def_module: TokenId,
    def_line: u32,
}

#[derive(Debug)]
struct Expansion {
    mac: usize,
    args: Vec<TokenId>,
    /// Input index of the calling line; execution resumes after it.
    return_line: usize,
}

/// Outcome of one preprocessor pass.
#[derive(Debug)]
pub(crate) struct PassOutput {
    pub(crate) lines: Vec<Line>,
    /// True when a macro, `expr` or macro call was seen inside a recorded
    /// body, meaning another pass is required.
    pub(crate) found_macro: bool,
}

fn is_reserved(arena: &TokenArena, token: TokenId) -> bool {
    RESERVED.iter().any(|word| arena.eq_str(token, word))
}

/// Replaces every occurrence of `name`'s text inside `token` with `value`'s
/// text, interning the result. Returns `token` unchanged when there is
/// nothing to replace.
fn string_replace(arena: &mut TokenArena, token: TokenId, name: TokenId, value: TokenId) -> TokenId {
    fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
        if needle.is_empty() || hay.len() < needle.len() {
            return None;
        }
        hay.windows(needle.len()).position(|w| w == needle)
    }

    let out = {
        let hay = arena.bytes(token);
        let needle = arena.bytes(name);
        if find(hay, needle).is_none() {
            return token;
        }
        let hay = hay.to_vec();
        let needle = arena.bytes(name).to_vec();
        let repl = arena.bytes(value);

        let mut out = Vec::with_capacity(hay.len());
        let mut pos = 0;
        while let Some(p) = find(&hay[pos..], &needle) {
            out.extend_from_slice(&hay[pos..pos + p]);
            out.extend_from_slice(repl);
            pos += p + needle.len();
        }
        out.extend_from_slice(&hay[pos..]);
        out
    };
    arena.intern(&out)
}

/// Runs one preprocessor pass over `input`.
pub(crate) fn preprocess(
    arena: &mut TokenArena,
    input: &[Line],
    defines: &[(TokenId, TokenId)],
    lenient_endmacro: bool,
) -> CompileResult<PassOutput> {
    let mut output: Vec<Line> = Vec::with_capacity(input.len());
    let mut macros: Vec<Macro> = Vec::new();
    let mut macro_names: AHashMap<Vec<u8>, usize> = AHashMap::new();
    let mut recording: Option<usize> = None;
    let mut stack: Vec<Expansion> = Vec::new();
    let mut exprs: Vec<(TokenId, TokenId)> = Vec::new();
    let mut found_macro = false;

    let mut logline = 0usize;
    // A true `if` re-processes the remainder of its line as a fresh line
    // without advancing the cursor.
    let mut pending: Option<Line> = None;

    loop {
        let mut work = match pending.take() {
            Some(line) => line,
            None => {
                if logline >= input.len() {
                    break;
                }
                input[logline].clone()
            }
        };
        let err = |arena: &TokenArena, work: &Line, msg: String| {
            CompileError::at(STAGE, arena.display(work.module).into_owned(), work.line, msg)
        };

        // Rewrite tokens, unless this line ends the macro currently being
        // expanded (its name must survive verbatim to match the stack top).
        let ends_current_expansion = work.tokens.len() == 2
            && arena.eq_str(work.tokens[0], "endmacro")
            && stack
                .last()
                .is_some_and(|e| arena.eq_tokens(work.tokens[1], macros[e.mac].name));
        if !ends_current_expansion {
            let is_if = arena.eq_str(work.tokens[0], "if");
            for i in 0..work.tokens.len() {
                for &(name, value) in defines {
                    // Keep the name intact in the condition slot so `if` can
                    // still test whether it was defined at all.
                    if is_if && i == 1 && arena.eq_tokens(work.tokens[1], name) {
                        continue;
                    }
                    work.tokens[i] = string_replace(arena, work.tokens[i], name, value);
                }
                if let Some(top) = stack.last() {
                    for (pi, &actual) in top.args.iter().enumerate() {
                        let param = macros[top.mac].params[pi];
                        work.tokens[i] = string_replace(arena, work.tokens[i], param, actual);
                    }
                }
                for &(name, value) in &exprs {
                    work.tokens[i] = string_replace(arena, work.tokens[i], name, value);
                }
            }
        }

        let first = work.tokens[0];

        if arena.eq_str(first, "macro") {
            if recording.is_none() {
                if work.tokens.len() < 2 {
                    return Err(err(arena, &work, "macros must at least be defined with a name".to_owned()));
                }
                let name = work.tokens[1];
                let entry = Macro {
                    name,
                    params: work.tokens[2..].to_vec(),
                    start: logline + 1,
                    def_module: work.module,
                    def_line: work.line,
                };
                match macro_names.get(arena.bytes(name)) {
                    // Redefinition overrides the previous body.
                    Some(&idx) => macros[idx] = entry,
                    None => {
                        macro_names.insert(arena.bytes(name).to_vec(), macros.len());
                        macros.push(entry);
                    }
                }
                recording = Some(macros.len() - 1);
                logline += 1;
                continue;
            }
            // A definition nested inside a recorded body: absorbed textually,
            // handled on the next pass.
            found_macro = true;
        } else if arena.eq_str(first, "endmacro") {
            if work.tokens.len() != 2 {
                return Err(err(arena, &work, "endmacro takes a name".to_owned()));
            }
            if let Some(rec) = recording {
                if arena.eq_tokens(work.tokens[1], macros[rec].name) {
                    recording = None;
                    logline += 1;
                    continue;
                }
                // Ends some inner definition; stays in the body text.
                found_macro = true;
            } else if let Some(top) = stack.last() {
                if arena.eq_tokens(work.tokens[1], macros[top.mac].name) {
                    logline = stack.pop().expect("expansion stack").return_line + 1;
                    continue;
                }
                if !lenient_endmacro {
                    return Err(err(
                        arena,
                        &work,
                        format!(
                            "endmacro {} does not match expansion of macro {}",
                            arena.display(work.tokens[1]),
                            arena.display(macros[top.mac].name)
                        ),
                    ));
                }
                // Lenient mode leaves the line in place; the next pass
                // drops it as a stray.
                output.push(work);
                logline += 1;
                continue;
            } else {
                // Stray endmacro with nothing open: benign, dropped.
                logline += 1;
                continue;
            }
        } else if arena.eq_str(first, "if") {
            if recording.is_none() {
                if work.tokens.len() < 3 {
                    return Err(err(
                        arena,
                        &work,
                        "if takes a variable and at least 1 more argument".to_owned(),
                    ));
                }
                let defined = defines.iter().any(|&(name, _)| arena.eq_tokens(work.tokens[1], name));
                let truthy = defined
                    || expr::parse_int_token(arena.bytes(work.tokens[1])).is_some_and(|n| n != 0);
                if truthy {
                    pending = Some(Line::new(work.module, work.line, work.tokens[2..].to_vec()));
                    continue;
                }
                logline += 1;
                continue;
            }
        } else if arena.eq_str(first, "expr") {
            if recording.is_none() {
                if work.tokens.len() != 3 {
                    return Err(err(
                        arena,
                        &work,
                        "expr takes a variable name and an expression".to_owned(),
                    ));
                }
                let value = expr::evaluate(arena.bytes(work.tokens[2]))
                    .map_err(|msg| err(arena, &work, format!("expression evaluation failed: {msg}")))?;
                let value_id = arena.intern_str(&value.to_string());
                exprs.push((work.tokens[1], value_id));
                logline += 1;
                continue;
            }
            found_macro = true;
        } else if !is_reserved(arena, first) {
            if recording.is_none() {
                if stack.len() == MACRO_STACK_SIZE {
                    return Err(err(arena, &work, "macro stack filled".to_owned()));
                }
                let Some(&mac) = macro_names.get(arena.bytes(first)) else {
                    return Err(err(
                        arena,
                        &work,
                        format!("invalid keyword or macro not found: {}", arena.display(first)),
                    ));
                };
                if stack.iter().any(|e| e.mac == mac) {
                    return Err(err(
                        arena,
                        &work,
                        format!("macro called recursively: {}", arena.display(first)),
                    ));
                }
                if work.tokens.len() - 1 != macros[mac].params.len() {
                    return Err(err(
                        arena,
                        &work,
                        format!(
                            "wrong number of arguments to macro: got {}, expected {}",
                            work.tokens.len() - 1,
                            macros[mac].params.len()
                        ),
                    ));
                }
                stack.push(Expansion {
                    mac,
                    args: work.tokens[1..].to_vec(),
                    return_line: logline,
                });
                logline = macros[mac].start;
                continue;
            }
            found_macro = true;
        }

        if recording.is_none() {
            output.push(work);
        }
        logline += 1;
    }

    if let Some(rec) = recording {
        let mac = &macros[rec];
        return Err(CompileError::at(
            STAGE,
            arena.display(mac.def_module).into_owned(),
            mac.def_line,
            format!("macro without endmacro: {}", arena.display(mac.name)),
        ));
    }

    Ok(PassOutput {
        lines: output,
        found_macro,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::safepath::SafePath;
    use crate::tokenize::tokenize;

    fn prep(source: &str) -> (TokenArena, Vec<Line>) {
        prep_with(source, &[], false)
    }

    fn prep_with(source: &str, defines: &[(&str, &str)], lenient: bool) -> (TokenArena, Vec<Line>) {
        let mut arena = TokenArena::new();
        let mut files = SafePath::new();
        let mut lines = tokenize(&mut arena, "test", source.as_bytes(), &mut files).unwrap();
        let defines: Vec<(TokenId, TokenId)> = defines
            .iter()
            .map(|(name, value)| (arena.intern_str(name), arena.intern_str(value)))
            .collect();
        for _ in 0..MAX_PASSES {
            let pass = preprocess(&mut arena, &lines, &defines, lenient).unwrap();
            lines = pass.lines;
            if !pass.found_macro {
                break;
            }
        }
        (arena, lines)
    }

    fn render(arena: &TokenArena, lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| {
                l.tokens
                    .iter()
                    .map(|&t| arena.display(t).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    #[test]
    fn macro_expansion_with_parameters() {
        let (arena, lines) = prep("macro inc v\nadd v 1\nendmacro inc\nproc init\ninc x\ninc y\nret\n");
        assert_eq!(render(&arena, &lines), ["proc init", "add x 1", "add y 1", "ret"]);
    }

    #[test]
    fn nested_macro_calls_expand() {
        let source = "\
macro two v
add v 2
endmacro two
macro four v
two v
two v
endmacro four
proc init
four x
ret
";
        let (arena, lines) = prep(source);
        assert_eq!(render(&arena, &lines), ["proc init", "add x 2", "add x 2", "ret"]);
    }

    #[test]
    fn expr_defines_substitute_textually() {
        let (arena, lines) = prep("expr N 2+3\nstatic a ints N\nmove a:0 N\n");
        assert_eq!(render(&arena, &lines), ["static a ints 5", "move a:0 5"]);
    }

    #[test]
    fn if_keeps_or_drops_remainder() {
        let (arena, lines) = prep("if 1 move a b\nif 0 move c d\n");
        assert_eq!(render(&arena, &lines), ["move a b"]);
    }

    #[test]
    fn if_sees_command_line_defines_even_when_zero() {
        let (arena, lines) = prep_with("if DEBUG move a b\nif OTHER move c d\n", &[("DEBUG", "0")], false);
        // DEBUG is defined, so the line stays even though its value is 0.
        assert_eq!(render(&arena, &lines), ["move a b"]);
    }

    #[test]
    fn defines_replace_inside_tokens() {
        let (arena, lines) = prep_with("move arr:WIDTH x\n", &[("WIDTH", "32")], false);
        assert_eq!(render(&arena, &lines), ["move arr:32 x"]);
    }

    #[test]
    fn if_inside_macro_body_is_stable_across_expansions() {
        let source = "\
macro maybe v
if 1 add v 1
endmacro maybe
proc init
maybe x
maybe y
ret
";
        let (arena, lines) = prep(source);
        assert_eq!(render(&arena, &lines), ["proc init", "add x 1", "add y 1", "ret"]);
    }

    #[test]
    fn recursive_macro_fails() {
        let mut arena = TokenArena::new();
        let mut files = SafePath::new();
        let lines = tokenize(
            &mut arena,
            "test",
            b"macro loop\nloop\nendmacro loop\nloop\n",
            &mut files,
        )
        .unwrap();
        let err = preprocess(&mut arena, &lines, &[], false).unwrap_err();
        assert!(err.message().contains("recursively"), "{err}");
    }

    #[test]
    fn missing_endmacro_fails() {
        let mut arena = TokenArena::new();
        let mut files = SafePath::new();
        let lines = tokenize(&mut arena, "test", b"macro broken\nadd a 1\n", &mut files).unwrap();
        let err = preprocess(&mut arena, &lines, &[], false).unwrap_err();
        assert!(err.message().contains("macro without endmacro"), "{err}");
    }

    #[test]
    fn stray_endmacro_is_dropped() {
        let (arena, lines) = prep("endmacro nothing\nmove a b\n");
        assert_eq!(render(&arena, &lines), ["move a b"]);
    }

    #[test]
    fn mismatched_endmacro_strict_vs_lenient() {
        let source = "macro one\nadd a 1\nendmacro two\nendmacro one\nproc init\none\nret\n";
        let mut arena = TokenArena::new();
        let mut files = SafePath::new();
        let lines = tokenize(&mut arena, "test", source.as_bytes(), &mut files).unwrap();
        let err = preprocess(&mut arena, &lines, &[], false).unwrap_err();
        assert!(err.message().contains("does not match"), "{err}");

        // Lenient mode keeps the bogus line in the expansion output; the
        // following pass then drops it as a stray endmacro.
        let (arena, lines) = prep_with(source, &[], true);
        assert_eq!(render(&arena, &lines), ["proc init", "add a 1", "ret"]);

        let mut arena2 = TokenArena::new();
        let mut files = SafePath::new();
        let input = tokenize(&mut arena2, "test", source.as_bytes(), &mut files).unwrap();
        let one_pass = preprocess(&mut arena2, &input, &[], true).unwrap();
        assert_eq!(
            render(&arena2, &one_pass.lines),
            ["proc init", "add a 1", "endmacro two", "ret"]
        );
    }

    #[test]
    fn fixed_point_reached() {
        let (mut arena, lines) = prep("macro inc v\nadd v 1\nendmacro inc\nproc init\ninc x\nret\n");
        let again = preprocess(&mut arena, &lines, &[], false).unwrap();
        assert!(!again.found_macro);
        assert_eq!(render(&arena, &again.lines), render(&arena, &lines));
    }
}
