//! chordc command line driver.
//!
//! `chordc <input> <output>` compiles `input`, writes the assembly next to
//! `output` and links it with the system C compiler driver. The process exits
//! with 3 on bad arguments, 42 on lexical or syntax errors, 7 on semantic
//! errors, 1 when a file cannot be read or written and otherwise with the
//! linker's status. The intermediate `<output>.s` is removed after a
//! successful link.

use chordc::driver::{CompileOptions, Compiler};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

/// Exit status for a malformed command line.
const EXIT_USAGE: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "chordc", version, about = "Compile a C0-like program to x86-64")]
struct Cli {
    /// Source file to compile.
    input: PathBuf,

    /// Executable to produce.
    output: PathBuf,

    /// Write the assembly to OUTPUT and stop.
    #[arg(long)]
    emit_asm: bool,

    /// Use at most N allocatable registers.
    #[arg(long, value_name = "N")]
    registers: Option<usize>,

    /// Print the SSA form to stderr.
    #[arg(long)]
    dump_ir: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn exit_code(status: i32) -> ExitCode {
    ExitCode::from(u8::try_from(status & 0xff).unwrap_or(1))
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(EXIT_USAGE),
            };
        }
    };

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let source = match std::fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("chordc: cannot read {}: {err}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let options = CompileOptions {
        register_limit: cli.registers,
        source_name: cli
            .input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        dump_ir: cli.dump_ir,
    };
    let unit = match Compiler::new(options).compile_source(&source) {
        Ok(unit) => unit,
        Err(err) => {
            eprintln!("chordc: {err}");
            return exit_code(err.exit_code());
        }
    };
    if let Some(dump) = &unit.ir_dump {
        eprint!("{dump}");
    }

    if cli.emit_asm {
        return match std::fs::write(&cli.output, &unit.assembly) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("chordc: cannot write {}: {err}", cli.output.display());
                ExitCode::FAILURE
            }
        };
    }

    let asm_path = assembly_path(&cli.output);
    if let Err(err) = std::fs::write(&asm_path, &unit.assembly) {
        eprintln!("chordc: cannot write {}: {err}", asm_path.display());
        return ExitCode::FAILURE;
    }
    link(&asm_path, &cli.output)
}

/// `<output>.s` next to the requested executable.
fn assembly_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".s");
    PathBuf::from(name)
}

/// Assemble and link with `cc`, falling back to `gcc`; `asm` is removed once linked.
fn link(asm: &Path, output: &Path) -> ExitCode {
    for driver in ["cc", "gcc"] {
        let status = Command::new(driver)
            .arg("-o")
            .arg(output)
            .arg(asm)
            .status();
        match status {
            Ok(status) => {
                log::debug!("{driver} exited with {status}");
                if status.success() {
                    if let Err(err) = std::fs::remove_file(asm) {
                        log::warn!("cannot remove {}: {err}", asm.display());
                    }
                }
                return exit_code(status.code().unwrap_or(1));
            }
            Err(err) => log::debug!("cannot run {driver}: {err}"),
        }
    }
    eprintln!("chordc: no C compiler driver found to assemble the output");
    ExitCode::FAILURE
}
