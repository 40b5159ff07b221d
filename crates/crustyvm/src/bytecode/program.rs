//! Compiled program container.

use crate::intern::TokenArena;
use crate::symbols::{Procedure, Variable};
use crate::tokenize::Line;

/// Everything the interpreter needs, produced by the compile pipeline and
/// immutable afterwards.
///
/// The token arena is kept for names in trace and diagnostic output; the line
/// list maps instruction indexes back to their module/line origin.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Program {
    pub(crate) arena: TokenArena,
    pub(crate) lines: Vec<Line>,
    pub(crate) vars: Vec<Variable>,
    pub(crate) procs: Vec<Procedure>,
    pub(crate) code: Vec<i32>,
    pub(crate) globals_image: Vec<u8>,
    pub(crate) stack_size: u32,
}

impl Program {
    /// Size of the global region at the bottom of the data stack.
    pub(crate) fn globals_bytes(&self) -> u32 {
        self.globals_image.len() as u32
    }

    /// Finds a procedure by name.
    pub(crate) fn find_proc(&self, name: &str) -> Option<usize> {
        self.procs.iter().position(|p| self.arena.eq_str(p.name, name))
    }

    /// Maps an instruction index back to its source line, for diagnostics.
    pub(crate) fn line_for_instruction(&self, ip: usize) -> Option<&Line> {
        self.lines.iter().find(|l| l.instruction as usize == ip)
    }

    /// Name of a variable, for diagnostics.
    pub(crate) fn var_name(&self, index: usize) -> String {
        self.arena.display(self.vars[index].name).into_owned()
    }

    /// Name of a procedure, for diagnostics.
    pub(crate) fn proc_name(&self, index: usize) -> String {
        self.arena.display(self.procs[index].name).into_owned()
    }
}
