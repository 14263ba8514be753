//! CLI driver (SPEC_FULL.md §6). No args starts a REPL over stdin; one arg
//! interprets a file; anything else is a usage error. Exit codes match
//! spec.md §6 exactly: 0 success, 64 usage, 65 compile error, 70 runtime
//! error, 74 I/O error.

use clap::Parser as ClapParser;
use dynac::vm::{InterpretResult, VM};
use std::io::{self, Write};
use std::process::ExitCode;

#[derive(ClapParser)]
#[command(name = "dynac", about = "A bytecode compiler and VM for dynac scripts")]
struct Cli {
    /// Script to run. Omit to start a REPL; more than one is a usage error.
    paths: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut vm = VM::new();

    match cli.paths.as_slice() {
        [] => repl(&mut vm),
        [path] => run_file(&mut vm, path),
        _ => {
            eprintln!("Usage: dynac [path]");
            ExitCode::from(64)
        }
    }
}

fn repl(vm: &mut VM) -> ExitCode {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            return ExitCode::from(74);
        }
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => return ExitCode::SUCCESS,
            Ok(_) => {
                vm.interpret(&line);
            }
            Err(error) => {
                eprintln!("Error reading from stdin: {}", error);
                return ExitCode::from(74);
            }
        }
    }
}

fn run_file(vm: &mut VM, path: &str) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read file \"{}\": {}", path, error);
            return ExitCode::from(74);
        }
    };

    match vm.interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}
