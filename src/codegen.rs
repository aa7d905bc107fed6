use crate::ast_asm as asm;
use crate::tacky;
use std::collections::HashMap;

/// Lower TACKY to assembly in three passes:
///
/// 1. translate each TACKY instruction to assembly, with variables as
///    pseudo registers;
/// 2. replace each pseudo register with a stack slot and prepend the
///    frame allocation;
/// 3. rewrite instructions that violate x86 operand constraints.
///
/// All three passes are total.
pub(crate) fn generate(tacky: &tacky::Program) -> asm::Program {
    let program = translate(tacky);

    let program = replace_pseudos(program);

    fix_instructions(program)
}

impl From<&tacky::Val> for asm::Operand {
    fn from(val: &tacky::Val) -> Self {
        match val {
            tacky::Val::Constant(c) => asm::Operand::Imm(*c),
            tacky::Val::Var(identifier) => {
                asm::Operand::Pseudo(asm::Identifier(identifier.0.clone()))
            }
        }
    }
}

fn asm_label(identifier: &tacky::Identifier) -> asm::Identifier {
    asm::Identifier(identifier.0.clone())
}

fn condition_code(op: &tacky::BinaryOperator) -> asm::ConditionCode {
    match op {
        tacky::BinaryOperator::Equal => asm::ConditionCode::Equal,
        tacky::BinaryOperator::NotEqual => asm::ConditionCode::NotEqual,
        tacky::BinaryOperator::LessThan => asm::ConditionCode::LessThan,
        tacky::BinaryOperator::LessOrEqual => asm::ConditionCode::LessOrEqual,
        tacky::BinaryOperator::GreaterThan => asm::ConditionCode::GreaterThan,
        tacky::BinaryOperator::GreaterOrEqual => asm::ConditionCode::GreaterOrEqual,
        _ => panic!("Not a relational operator: {op:?}"),
    }
}

fn translate(program: &tacky::Program) -> asm::Program {
    asm::Program {
        function_definition: translate_function(&program.function_definition),
    }
}

fn translate_function(function: &tacky::FunctionDefinition) -> asm::Function {
    let mut instructions = vec![];

    for instruction in &function.body {
        translate_instruction(instruction, &mut instructions);
    }

    asm::Function {
        name: asm_label(&function.name),
        instructions,
        stack_size: None,
    }
}

fn translate_instruction(instruction: &tacky::Instruction, out: &mut Vec<asm::Instruction>) {
    match instruction {
        tacky::Instruction::Return(val) => {
            out.push(asm::Instruction::Mov {
                src: val.into(),
                dst: asm::Operand::Reg(asm::Reg::AX),
            });
            out.push(asm::Instruction::Ret);
        }

        tacky::Instruction::Copy { src, dst } => {
            out.push(asm::Instruction::Mov {
                src: src.into(),
                dst: dst.into(),
            });
        }

        tacky::Instruction::Jump { target } => {
            out.push(asm::Instruction::Jmp {
                target: asm_label(target),
            });
        }

        tacky::Instruction::JumpIfZero { condition, target } => {
            out.push(asm::Instruction::Cmp {
                src1: asm::Operand::Imm(0),
                src2: condition.into(),
            });
            out.push(asm::Instruction::JmpCC {
                cc: asm::ConditionCode::Equal,
                target: asm_label(target),
            });
        }

        tacky::Instruction::JumpIfNotZero { condition, target } => {
            out.push(asm::Instruction::Cmp {
                src1: asm::Operand::Imm(0),
                src2: condition.into(),
            });
            out.push(asm::Instruction::JmpCC {
                cc: asm::ConditionCode::NotEqual,
                target: asm_label(target),
            });
        }

        tacky::Instruction::Label(label) => {
            out.push(asm::Instruction::Label(asm_label(label)));
        }

        // `!x` is a comparison with zero, not a bit operation
        tacky::Instruction::Unary {
            op: tacky::UnaryOperator::Not,
            src,
            dst,
        } => {
            out.push(asm::Instruction::Cmp {
                src1: asm::Operand::Imm(0),
                src2: src.into(),
            });
            out.push(asm::Instruction::Mov {
                src: asm::Operand::Imm(0),
                dst: dst.into(),
            });
            out.push(asm::Instruction::SetCC {
                cc: asm::ConditionCode::Equal,
                dst: dst.into(),
            });
        }

        tacky::Instruction::Unary { op, src, dst } => {
            let op = match op {
                tacky::UnaryOperator::Complement => asm::UnaryOperator::Not,
                tacky::UnaryOperator::Negate => asm::UnaryOperator::Neg,
                tacky::UnaryOperator::Not => unreachable!("handled above"),
            };
            out.push(asm::Instruction::Mov {
                src: src.into(),
                dst: dst.into(),
            });
            out.push(asm::Instruction::Unary {
                op,
                dst: dst.into(),
            });
        }

        tacky::Instruction::Binary {
            op: op @ (tacky::BinaryOperator::Divide | tacky::BinaryOperator::Remainder),
            src1,
            src2,
            dst,
        } => {
            // idiv computes both: quotient in AX, remainder in DX
            let result = match op {
                tacky::BinaryOperator::Divide => asm::Reg::AX,
                tacky::BinaryOperator::Remainder => asm::Reg::DX,
                _ => unreachable!(),
            };
            out.push(asm::Instruction::Mov {
                src: src1.into(),
                dst: asm::Operand::Reg(asm::Reg::AX),
            });
            out.push(asm::Instruction::Cdq);
            out.push(asm::Instruction::Idiv(src2.into()));
            out.push(asm::Instruction::Mov {
                src: asm::Operand::Reg(result),
                dst: dst.into(),
            });
        }

        tacky::Instruction::Binary {
            op:
                op @ (tacky::BinaryOperator::Add
                | tacky::BinaryOperator::Subtract
                | tacky::BinaryOperator::Multiply),
            src1,
            src2,
            dst,
        } => {
            let op = match op {
                tacky::BinaryOperator::Add => asm::BinaryOperator::Add,
                tacky::BinaryOperator::Subtract => asm::BinaryOperator::Sub,
                tacky::BinaryOperator::Multiply => asm::BinaryOperator::Mult,
                _ => unreachable!(),
            };
            out.push(asm::Instruction::Mov {
                src: src1.into(),
                dst: dst.into(),
            });
            out.push(asm::Instruction::Binary {
                op,
                src: src2.into(),
                dst: dst.into(),
            });
        }

        tacky::Instruction::Binary {
            op,
            src1,
            src2,
            dst,
        } => {
            // relational operators materialise the flags into 0/1
            out.push(asm::Instruction::Cmp {
                src1: src2.into(),
                src2: src1.into(),
            });
            out.push(asm::Instruction::Mov {
                src: asm::Operand::Imm(0),
                dst: dst.into(),
            });
            out.push(asm::Instruction::SetCC {
                cc: condition_code(op),
                dst: dst.into(),
            });
        }
    }
}

/// Assign every pseudo register a stack slot, record the frame size and
/// prepend the `AllocateStack`. Slots grow downwards from -4 in 4-byte
/// steps; the frame is rounded up to the ABI stack alignment.
fn replace_pseudos(program: asm::Program) -> asm::Program {
    let mut function = program.function_definition;
    let mut slots: HashMap<asm::Identifier, asm::Offset> = HashMap::new();

    let mut replace = |operand: &mut asm::Operand| {
        if let asm::Operand::Pseudo(name) = operand {
            let next = asm::Offset(-(((slots.len() + 1) * asm::STACK_SLOT_SIZE) as isize));
            let offset = *slots.entry(name.clone()).or_insert(next);
            *operand = asm::Operand::Stack(offset);
        }
    };

    for instruction in &mut function.instructions {
        match instruction {
            asm::Instruction::Mov { src, dst } => {
                replace(src);
                replace(dst);
            }
            asm::Instruction::Unary { dst, .. } => replace(dst),
            asm::Instruction::Binary { src, dst, .. } => {
                replace(src);
                replace(dst);
            }
            asm::Instruction::Cmp { src1, src2 } => {
                replace(src1);
                replace(src2);
            }
            asm::Instruction::Idiv(src) => replace(src),
            asm::Instruction::SetCC { dst, .. } => replace(dst),
            asm::Instruction::Cdq
            | asm::Instruction::Jmp { .. }
            | asm::Instruction::JmpCC { .. }
            | asm::Instruction::Label(_)
            | asm::Instruction::AllocateStack(_)
            | asm::Instruction::Ret => {}
        }
    }

    let stack_size =
        (slots.len() * asm::STACK_SLOT_SIZE).next_multiple_of(asm::ABI_STACK_ALIGNMENT);
    function
        .instructions
        .insert(0, asm::Instruction::AllocateStack(stack_size));
    function.stack_size = Some(stack_size);

    asm::Program {
        function_definition: function,
    }
}

/// Rewrite instructions whose operand combinations x86 does not accept,
/// using R10 for sources and R11 for destinations.
fn fix_instructions(program: asm::Program) -> asm::Program {
    let asm::Function {
        name,
        instructions: unfixed,
        stack_size,
    } = program.function_definition;
    let mut instructions = Vec::with_capacity(unfixed.len());

    for instruction in unfixed {
        match instruction {
            // mov cannot move memory to memory
            asm::Instruction::Mov {
                src: src @ asm::Operand::Stack(_),
                dst: dst @ asm::Operand::Stack(_),
            } => {
                instructions.push(asm::Instruction::Mov {
                    src,
                    dst: asm::Operand::Reg(asm::Reg::R10),
                });
                instructions.push(asm::Instruction::Mov {
                    src: asm::Operand::Reg(asm::Reg::R10),
                    dst,
                });
            }

            // idiv cannot take an immediate divisor
            asm::Instruction::Idiv(src @ asm::Operand::Imm(_)) => {
                instructions.push(asm::Instruction::Mov {
                    src,
                    dst: asm::Operand::Reg(asm::Reg::R10),
                });
                instructions.push(asm::Instruction::Idiv(asm::Operand::Reg(asm::Reg::R10)));
            }

            // add/sub cannot combine two memory operands
            asm::Instruction::Binary {
                op: op @ (asm::BinaryOperator::Add | asm::BinaryOperator::Sub),
                src: src @ asm::Operand::Stack(_),
                dst: dst @ asm::Operand::Stack(_),
            } => {
                instructions.push(asm::Instruction::Mov {
                    src,
                    dst: asm::Operand::Reg(asm::Reg::R10),
                });
                instructions.push(asm::Instruction::Binary {
                    op,
                    src: asm::Operand::Reg(asm::Reg::R10),
                    dst,
                });
            }

            // imul cannot write to memory
            asm::Instruction::Binary {
                op: asm::BinaryOperator::Mult,
                src,
                dst: dst @ asm::Operand::Stack(_),
            } => {
                instructions.push(asm::Instruction::Mov {
                    src: dst.clone(),
                    dst: asm::Operand::Reg(asm::Reg::R11),
                });
                let src = if let asm::Operand::Stack(_) = src {
                    instructions.push(asm::Instruction::Mov {
                        src,
                        dst: asm::Operand::Reg(asm::Reg::R10),
                    });
                    asm::Operand::Reg(asm::Reg::R10)
                } else {
                    src
                };
                instructions.push(asm::Instruction::Binary {
                    op: asm::BinaryOperator::Mult,
                    src,
                    dst: asm::Operand::Reg(asm::Reg::R11),
                });
                instructions.push(asm::Instruction::Mov {
                    src: asm::Operand::Reg(asm::Reg::R11),
                    dst,
                });
            }

            // cmp cannot combine two memory operands
            asm::Instruction::Cmp {
                src1: src1 @ asm::Operand::Stack(_),
                src2: src2 @ asm::Operand::Stack(_),
            } => {
                instructions.push(asm::Instruction::Mov {
                    src: src1,
                    dst: asm::Operand::Reg(asm::Reg::R10),
                });
                instructions.push(asm::Instruction::Cmp {
                    src1: asm::Operand::Reg(asm::Reg::R10),
                    src2,
                });
            }

            // cmp cannot take an immediate second operand
            asm::Instruction::Cmp {
                src1: src1 @ asm::Operand::Imm(_),
                src2: src2 @ asm::Operand::Imm(_),
            } => {
                instructions.push(asm::Instruction::Mov {
                    src: src1,
                    dst: asm::Operand::Reg(asm::Reg::R10),
                });
                instructions.push(asm::Instruction::Mov {
                    src: src2,
                    dst: asm::Operand::Reg(asm::Reg::R11),
                });
                instructions.push(asm::Instruction::Cmp {
                    src1: asm::Operand::Reg(asm::Reg::R10),
                    src2: asm::Operand::Reg(asm::Reg::R11),
                });
            }

            asm::Instruction::Cmp {
                src1,
                src2: src2 @ asm::Operand::Imm(_),
            } => {
                instructions.push(asm::Instruction::Mov {
                    src: src2,
                    dst: asm::Operand::Reg(asm::Reg::R11),
                });
                instructions.push(asm::Instruction::Cmp {
                    src1,
                    src2: asm::Operand::Reg(asm::Reg::R11),
                });
            }

            asm::Instruction::Cmp {
                src1: src1 @ asm::Operand::Imm(_),
                src2,
            } => {
                instructions.push(asm::Instruction::Mov {
                    src: src1,
                    dst: asm::Operand::Reg(asm::Reg::R11),
                });
                instructions.push(asm::Instruction::Cmp {
                    src1: asm::Operand::Reg(asm::Reg::R11),
                    src2,
                });
            }

            other => instructions.push(other),
        }
    }

    asm::Program {
        function_definition: asm::Function {
            name,
            instructions,
            stack_size,
        },
    }
}
