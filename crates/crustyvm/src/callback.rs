//! Host callback descriptors.
//!
//! A callback is a named symbol backed by host functions rather than by
//! stack-resident storage. Programs read and write it like any other global
//! variable; the VM routes the accesses to the registered closures. The
//! capture of each closure replaces the `priv` pointer a C host would pass.

use std::fmt;

/// Element type of a variable or callback.
///
/// `None` is reserved for argument slots and write-only callbacks, which
/// carry no storage of their own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ValType {
    #[default]
    None,
    Char,
    Int,
    Float,
}

impl ValType {
    /// Size in bytes of one element of this type on the data stack.
    #[must_use]
    pub fn elem_size(self) -> usize {
        match self {
            ValType::Float => 8,
            ValType::Char => 1,
            // Argument slots are rewritten before any sizing matters.
            ValType::Int | ValType::None => 4,
        }
    }
}

/// Value produced by a read callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallbackValue {
    Int(i32),
    Float(f64),
}

/// Error returned by a callback to abort the current instruction.
///
/// Execution stops with [`Status::CallbackFailed`](crate::Status::CallbackFailed);
/// the instruction is treated as not having completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallbackError;

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback returned failure")
    }
}

impl std::error::Error for CallbackError {}

/// Source slice presented to a write callback.
///
/// `move` with a memory-backed source passes the whole remainder of the
/// source array from the resolved index onward, so hosts can accept
/// variable-length buffers (strings, sample data) in one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteArg<'a> {
    Chars(&'a [u8]),
    Ints(&'a [i32]),
    Floats(&'a [f64]),
}

impl WriteArg<'_> {
    /// Number of elements in the slice.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            WriteArg::Chars(s) => s.len(),
            WriteArg::Ints(s) => s.len(),
            WriteArg::Floats(s) => s.len(),
        }
    }

    /// Returns true if the slice is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read function: `(index) -> value`.
pub type ReadFn = Box<dyn FnMut(usize) -> Result<CallbackValue, CallbackError>>;

/// Write function: `(data, index) -> ()`.
pub type WriteFn = Box<dyn FnMut(WriteArg<'_>, usize) -> Result<(), CallbackError>>;

/// A host callback registration.
///
/// At least one of `read` and `write` must be present; a descriptor with
/// neither is rejected at VM construction.
pub struct Callback {
    /// Variable name the program refers to this callback by.
    pub name: String,
    /// Number of addressable elements (the maximum index plus one).
    pub length: u32,
    /// Type produced by `read`, also used for coercion of read results.
    pub read_type: ValType,
    pub read: Option<ReadFn>,
    pub write: Option<WriteFn>,
}

impl Callback {
    /// Creates a read-only callback.
    #[must_use]
    pub fn reader(name: impl Into<String>, length: u32, read_type: ValType, read: ReadFn) -> Self {
        Self {
            name: name.into(),
            length,
            read_type,
            read: Some(read),
            write: None,
        }
    }

    /// Creates a write-only callback.
    #[must_use]
    pub fn writer(name: impl Into<String>, length: u32, write: WriteFn) -> Self {
        Self {
            name: name.into(),
            length,
            read_type: ValType::None,
            read: None,
            write: Some(write),
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("length", &self.length)
            .field("read_type", &self.read_type)
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}
