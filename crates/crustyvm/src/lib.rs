#![doc = include_str!("../../../README.md")]
mod bytecode;
mod callback;
mod error;
mod expr;
mod intern;
mod io;
mod preprocess;
mod run;
mod safepath;
mod symbols;
mod tokenize;

pub use crate::{
    bytecode::vm::Status,
    callback::{Callback, CallbackError, CallbackValue, ReadFn, ValType, WriteArg, WriteFn},
    error::CompileError,
    io::{CollectStringLog, LogWriter, NoLog, StdLog},
    run::{CrustyVm, RunError, VmConfig},
    safepath::SafePath,
};
