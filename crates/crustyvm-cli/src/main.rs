use std::env;
use std::process::ExitCode;

use crustyvm::{Callback, CrustyVm, SafePath, StdLog, VmConfig, WriteArg};

/// Numeric/char echo callback: prints the first element of whatever the
/// program hands over.
fn echo(stderr: bool) -> Callback {
    Callback::writer(
        if stderr { "err" } else { "out" },
        1,
        Box::new(move |data: WriteArg<'_>, _index| {
            let text = match data {
                WriteArg::Chars(s) => s.first().map(|&b| char::from(b).to_string()),
                WriteArg::Ints(s) => s.first().map(i32::to_string),
                WriteArg::Floats(s) => s.first().map(f64::to_string),
            };
            if let Some(text) = text {
                if stderr {
                    eprint!("{text}");
                } else {
                    print!("{text}");
                }
            }
            Ok(())
        }),
    )
}

/// String echo callback: accepts char slices only and writes them verbatim.
fn echo_string(stderr: bool) -> Callback {
    Callback::writer(
        if stderr { "string_err" } else { "string_out" },
        1,
        Box::new(move |data: WriteArg<'_>, _index| {
            let WriteArg::Chars(bytes) = data else {
                return Err(crustyvm::CallbackError);
            };
            let text = String::from_utf8_lossy(bytes);
            if stderr {
                eprint!("{text}");
            } else {
                print!("{text}");
            }
            Ok(())
        }),
    )
}

fn usage(program: &str) -> ExitCode {
    eprintln!("USAGE: {program} [(<filename>|-D<var>=<value>) ...] [-- <filename>]");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let mut filename: Option<String> = None;
    let mut defines: Vec<(String, String)> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if arg == "--" {
            if filename.is_some() || i + 1 >= args.len() {
                return usage(&args[0]);
            }
            filename = Some(args[i + 1].clone());
            break;
        } else if let Some(def) = arg.strip_prefix("-D") {
            let Some((name, value)) = def.split_once('=') else {
                return usage(&args[0]);
            };
            if name.is_empty() {
                return usage(&args[0]);
            }
            defines.push((name.to_owned(), value.to_owned()));
        } else if arg.starts_with('-') {
            return usage(&args[0]);
        } else {
            if filename.is_some() {
                return usage(&args[0]);
            }
            filename = Some(arg.clone());
        }
        i += 1;
    }
    let Some(filename) = filename else {
        return usage(&args[0]);
    };

    // Loading the program pins the safe path to its directory; includes may
    // only come from under it.
    let mut safe_path = SafePath::new();
    let source = match safe_path.load(&filename) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = VmConfig {
        defines,
        safe_path,
        ..VmConfig::default()
    };
    let callbacks = vec![echo(false), echo(true), echo_string(false), echo_string(true)];

    let mut vm = match CrustyVm::new(&filename, &source, callbacks, config, StdLog) {
        Ok(vm) => vm,
        Err(err) => {
            eprintln!("failed to load program:\n{err}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("Program loaded.");
    eprintln!("Token memory size: {}", vm.token_memory());
    eprintln!("Stack size: {}", vm.stack_memory());

    if let Err(err) = vm.run("init") {
        eprintln!("program reached an exception while running: {err}");
        vm.debug_trace(true);
        return ExitCode::FAILURE;
    }

    eprintln!("Program completed successfully.");
    ExitCode::SUCCESS
}
