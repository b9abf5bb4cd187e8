//! `mjc`: the command-line driver. Ties the front end and the four core
//! stages together — read source file, lex/parse, build the symbol table,
//! type check, lower to TAC, emit C — and is otherwise a thin shell around
//! [`minijavac::compile`]. See SPEC_FULL.md §4.8, §6.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

/// MiniJava to C compiler.
#[derive(Parser, Debug)]
#[command(name = "mjc", version, about = "Compile a MiniJava source file to C")]
struct Args {
    /// MiniJava source file to compile.
    input: PathBuf,

    /// Write the generated C to this path instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Raise the log level (stackable: `-v`, `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).format_timestamp(None).init();

    let source = match std::fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("mjc: cannot read {}: {e}", args.input.display());
            return ExitCode::FAILURE;
        }
    };
    let file_name = args.input.to_string_lossy().into_owned();

    let c = match minijavac::compile(&source, &file_name) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e.render(&source));
            // Internal invariant failures are a compiler bug, not a user
            // error, but both still exit nonzero (spec §6).
            return ExitCode::FAILURE;
        }
    };

    match args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, c) {
                eprintln!("mjc: cannot write {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
        None => {
            let stdout = std::io::stdout();
            if let Err(e) = stdout.lock().write_all(c.as_bytes()) {
                eprintln!("mjc: failed writing to stdout: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
