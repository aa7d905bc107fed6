use crate::ast_asm;
use crate::ast_asm::Instruction;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Platform-specific symbol decoration. Mach-O wants `_`-prefixed globals
/// and bare `L` local labels; ELF wants undecorated globals, `.L` labels
/// and an executable-stack note.
pub(crate) mod abi {
    #[cfg(target_os = "macos")]
    pub(crate) const LABEL_PREFIX: &str = "L";
    #[cfg(not(target_os = "macos"))]
    pub(crate) const LABEL_PREFIX: &str = ".L";

    #[cfg(target_os = "macos")]
    pub(crate) const PUBLIC_PREFIX: &str = "_";
    #[cfg(not(target_os = "macos"))]
    pub(crate) const PUBLIC_PREFIX: &str = "";
}

#[derive(Debug, PartialEq, Error)]
#[error("{message}")]
pub struct EmitterError {
    pub message: String,
}

const INDENT: &str = "  ";

pub(crate) fn emit(assembly: ast_asm::Program, output_filename: &Path) -> Result<(), EmitterError> {
    log::info!("Emitting output file: {}", output_filename.display());

    let file = File::create(output_filename).map_err(|e| EmitterError {
        message: format!("{e} while writing to {}", output_filename.display()),
    })?;
    let mut writer = BufWriter::new(file);

    write_out(assembly, &mut writer).map_err(|e| EmitterError {
        message: format!("{e} while writing to {}", output_filename.display()),
    })?;

    Ok(())
}

pub(crate) fn write_out<W: Write>(
    assembly: ast_asm::Program,
    writer: &mut BufWriter<W>,
) -> std::io::Result<()> {
    write_out_function(assembly.function_definition, writer)?;

    if cfg!(target_os = "linux") {
        writeln!(writer, "{INDENT}.section .note.GNU-stack,\"\",@progbits")?;
    }

    writer.flush()?;

    Ok(())
}

fn write_out_function<W: Write>(
    function: ast_asm::Function,
    writer: &mut BufWriter<W>,
) -> std::io::Result<()> {
    let symbol = format!("{}{}", abi::PUBLIC_PREFIX, function.name.0);

    writeln!(writer, "{INDENT}.globl {symbol}")?;
    writeln!(writer, "{symbol}:")?;

    // Prologue: save the caller's frame and establish our own
    writeln!(writer, "{INDENT}pushq %rbp")?;
    writeln!(writer, "{INDENT}movq %rsp, %rbp")?;

    let ends_in_ret = function.instructions.last() == Some(&Instruction::Ret);

    for instruction in function.instructions {
        if instruction == Instruction::Ret {
            write_epilogue(writer)?;
        }
        if !matches!(instruction, Instruction::Label(_)) {
            write!(writer, "{INDENT}")?;
        }
        writeln!(writer, "{}", instruction.emit())?;
    }

    // Falling off the end of the function returns 0
    if !ends_in_ret {
        writeln!(writer, "{INDENT}movl $0, %eax")?;
        write_epilogue(writer)?;
        writeln!(writer, "{INDENT}ret")?;
    }

    Ok(())
}

fn write_epilogue<W: Write>(writer: &mut BufWriter<W>) -> std::io::Result<()> {
    writeln!(writer, "{INDENT}movq %rbp, %rsp")?;
    writeln!(writer, "{INDENT}popq %rbp")?;
    Ok(())
}
