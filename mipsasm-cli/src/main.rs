//! Entrypoint for CLI
use std::{env, process};

use log::error;
use mipsasm::prelude::*;

static USAGE: &str = r#"
usage: mipsasm [OPTIONS] FILE...

options:
    -d, --delayed-branching    Assume delay slots are executed; emit no padding
        --big-endian           Lay multi-byte data out big endian
    -w, --warnings-are-errors  Fail assembly when warnings are reported
        --max-errors N         Stop after N errors (default 200)

examples:
    mipsasm fibonacci.asm
    mipsasm -d boot.asm util.asm
"#;

struct Options {
    config: AssemblerConfig,
    files: Vec<String>,
}

fn main() {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    let options = match parse_args() {
        Some(options) if !options.files.is_empty() => options,
        _ => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            process::exit(64)
        }
    };

    let mut assembler = Assembler::new(options.config);
    match assembler.assemble_files(&options.files) {
        Ok(assembly) => {
            for message in assembler.log().messages() {
                eprintln!("{}", message);
            }
            print!("{}", assembly.listing());
        }
        Err(err) => {
            error!("assembly error\n{err}");
            process::exit(1)
        }
    }
}

fn parse_args() -> Option<Options> {
    let mut config = AssemblerConfig::default();
    let mut files = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-d" | "--delayed-branching" => config.delayed_branching = true,
            "--big-endian" => config.big_endian = true,
            "-w" | "--warnings-are-errors" => config.warnings_are_errors = true,
            "--max-errors" => {
                let count = args.next()?;
                config.max_error_count = Some(count.parse().ok()?);
            }
            _ if arg.starts_with('-') => return None,
            _ => files.push(arg),
        }
    }

    Some(Options { config, files })
}

fn print_usage() {
    println!("mipsasm v{}", env!("CARGO_PKG_VERSION"));
    println!("{USAGE}");
}
