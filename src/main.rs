use anyhow::anyhow;
use clap::{ArgGroup, Parser};
use env_logger::Env;
use line_numbers::LinePositions;
use log::{debug, info};
use mcc::{Error, StopAfter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(group(
    ArgGroup::new("stop-after")
        .args(&["lex", "parse", "validate", "tacky", "codegen", "compile"])
        .multiple(false)
))]
struct Cli {
    #[arg(long = "trace", action)]
    trace: bool,

    #[arg(short = 'd', long = "debug", action)]
    debug: bool,

    #[arg(short = 'v', long = "verbose", action)]
    verbose: bool,

    #[arg(short = 'q', long = "quiet", action)]
    quiet: bool,

    /// Path to the source file to compile
    #[arg(value_name = "FILE", required = true)]
    input: PathBuf,

    /// Stop after lexing and print the tokens
    #[arg(long)]
    lex: bool,

    /// Stop after parsing and print the AST
    #[arg(long)]
    parse: bool,

    /// Stop after semantic analysis (validation) and print the resolved AST
    #[arg(long)]
    validate: bool,

    /// Stop after lowering and print the TACKY IR
    #[arg(long)]
    tacky: bool,

    /// Stop after codegen and print the assembly IR
    #[arg(long)]
    codegen: bool,

    /// Compile and link (the default)
    #[arg(long)]
    compile: bool,
}

impl Cli {
    pub fn stop_after(&self) -> StopAfter {
        if self.lex {
            StopAfter::Lexing
        } else if self.parse {
            StopAfter::Parsing
        } else if self.validate {
            StopAfter::Semantics
        } else if self.tacky {
            StopAfter::Tacky
        } else if self.codegen {
            StopAfter::Codegen
        } else {
            StopAfter::NoStop
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match (cli.trace, cli.debug, cli.verbose, cli.quiet) {
        // --quiet always wins
        (_, _, _, true) => "error",
        (true, _, _, _) => "trace",
        (_, true, _, _) => "debug",
        (_, _, true, _) => "info",
        (_, _, _, _) => "warn",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let stop_after = cli.stop_after();

    let input = mcc::read_input(&cli.input)?;

    // The assembly always lands in the current directory; the executable
    // is named after the source file.
    let assembly_filename = Path::new("out.s");

    mcc::compile(&input, assembly_filename, stop_after)
        .map_err(|e| diagnose(e, &input))?;

    if !stop_after.will_stop() {
        let exec_name = executable_name(&cli.input);
        assemble_and_link(assembly_filename, &exec_name)?;
        info!("Compilation succeeded. Executable is '{exec_name}'");
    }

    Ok(())
}

/// Attach line and column information to errors that carry a byte offset.
fn diagnose(error: Error, input: &str) -> anyhow::Error {
    match error {
        Error::Lexer(e) => {
            let line_positions = LinePositions::from(input);
            let span = line_positions.from_region(e.offset, e.offset)[0];
            let (line_num, column) = (span.line, span.start_col);
            anyhow!(
                "Lexer error at line {line_num}, column {column}: {e}",
                line_num = line_num.display(),
                column = column + 1
            )
        }
        Error::Parser(e) => {
            let line_positions = LinePositions::from(input);
            let span = line_positions.from_region(e.offset, e.offset)[0];
            let (line_num, column) = (span.line, span.start_col);
            anyhow!(
                "Parser error at line {line_num}, column {column}: {e}",
                line_num = line_num.display(),
                column = column + 1
            )
        }
        e => {
            anyhow!("{e}")
        }
    }
}

/// Strip the directory and extension from the input path to name the
/// executable.
fn executable_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "a.out".to_string())
}

fn assemble_and_link(assembly_file: &Path, exec_name: &str) -> Result<(), Error> {
    let mut command = std::process::Command::new("clang");
    // -arch only exists on Apple's driver
    if cfg!(target_os = "macos") {
        command.args(["-arch", "x86_64"]);
    }
    command.arg("-o").arg(exec_name).arg(assembly_file);

    debug!("Executing command: {command:?}");

    let status = command
        .status()
        .map_err(|_| Error::Command(format!("{command:?}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Command(format!("{command:?}")))
    }
}
