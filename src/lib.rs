mod ast_asm;
mod ast_c;
mod codegen;
mod emitter;
mod id_gen;
mod lexer;
mod parser;
mod semantics;
mod tacky;

use crate::lexer::Token;
use log::trace;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O: {source} while reading {}", path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("Command error: {0}")]
    Command(String),

    #[error(transparent)]
    Lexer(#[from] lexer::LexerError),

    #[error(transparent)]
    Parser(#[from] parser::ParserError),

    #[error(transparent)]
    Semantics(#[from] semantics::Error),

    #[error(transparent)]
    Emitter(#[from] emitter::EmitterError),
}

/// Read the source file into memory, normalising line endings so that
/// offsets and line counts are unambiguous on mixed-newline files.
pub fn read_input(input_filename: &Path) -> Result<String, Error> {
    log::info!("Reading input file: {}", input_filename.display());
    let input = fs::read_to_string(input_filename).map_err(|e| Error::Io {
        source: e,
        path: input_filename.into(),
    })?;
    Ok(input.replace('\r', ""))
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum StopAfter {
    Lexing,
    Parsing,
    Semantics,
    Tacky,
    Codegen,
    NoStop,
}

impl StopAfter {
    pub fn will_stop(self) -> bool {
        self != StopAfter::NoStop
    }
}

/// Run the pipeline up to `stop_after`. Intermediate stops print a dump of
/// their target IR to stdout; a full run writes the assembly to
/// `output_filename`.
pub fn compile(
    input: &str,
    output_filename: &Path,
    stop_after: StopAfter,
) -> Result<(), Error> {
    let outputs = compile_assembly(input, stop_after)?;

    trace!("{outputs:#?}");

    match stop_after {
        StopAfter::Lexing => {
            println!("{:#?}", outputs.lexed.expect("tokens are present after lexing"));
        }
        StopAfter::Parsing => {
            println!("{:#?}", outputs.ast.expect("AST is present after parsing"));
        }
        StopAfter::Semantics => {
            println!(
                "{:#?}",
                outputs.ast.expect("resolved AST is present after validation")
            );
        }
        StopAfter::Tacky => {
            println!("{:#?}", outputs.tacky.expect("TACKY is present after lowering"));
        }
        StopAfter::Codegen => {
            println!(
                "{:#?}",
                outputs.assembly.expect("assembly is present after codegen")
            );
        }
        StopAfter::NoStop => {
            let assembly = outputs.assembly.expect("assembly is present after codegen");
            emitter::emit(assembly, output_filename)?;
        }
    }

    Ok(())
}

#[allow(dead_code)]
#[derive(Debug)]
struct CompileOutputs {
    lexed: Option<Vec<Token>>,
    ast: Option<ast_c::Program>,
    tacky: Option<tacky::Program>,
    assembly: Option<ast_asm::Program>,
}

fn compile_assembly(input: &str, stop_after: StopAfter) -> Result<CompileOutputs, Error> {
    log::info!("Lexing");
    let lexed = lexer::lex(input)?;

    if stop_after == StopAfter::Lexing {
        return Ok(CompileOutputs {
            lexed: Some(lexed),
            ast: None,
            tacky: None,
            assembly: None,
        });
    }

    log::info!("Parsing");
    let mut ast = parser::parse(&lexed)?;

    if stop_after == StopAfter::Parsing {
        return Ok(CompileOutputs {
            lexed: Some(lexed),
            ast: Some(ast),
            tacky: None,
            assembly: None,
        });
    }

    log::info!("Semantic analysis");
    semantics::analyse(&mut ast)?;

    if stop_after == StopAfter::Semantics {
        return Ok(CompileOutputs {
            lexed: Some(lexed),
            ast: Some(ast),
            tacky: None,
            assembly: None,
        });
    }

    log::info!("Lowering to TACKY");
    let tacky = tacky::emit_program(&ast);

    if stop_after == StopAfter::Tacky {
        return Ok(CompileOutputs {
            lexed: Some(lexed),
            ast: Some(ast),
            tacky: Some(tacky),
            assembly: None,
        });
    }

    log::info!("Generating assembly");
    let assembly = codegen::generate(&tacky);

    Ok(CompileOutputs {
        lexed: Some(lexed),
        ast: Some(ast),
        tacky: Some(tacky),
        assembly: Some(assembly),
    })
}
