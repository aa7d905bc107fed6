//! TACKY, the three-address IR
//!
//! ASDL:
//!   program = Program(function_definition)
//!   function_definition = Function(identifier name, instruction* body)
//!   instruction = Return(val)
//!               | Unary(unary_operator, val src, val dst)
//!               | Binary(binary_operator, val src1, val src2, val dst)
//!               | Copy(val src, val dst)
//!               | Jump(identifier target)
//!               | JumpIfZero(val condition, identifier target)
//!               | JumpIfNotZero(val condition, identifier target)
//!               | Label(identifier)
//!   val = Constant(int) | Var(identifier)
//!   unary_operator = Complement | Negate | Not
//!   binary_operator = Add | Subtract | Multiply | Divide | Remainder
//!                   | Equal | NotEqual | LessThan | LessOrEqual
//!                   | GreaterThan | GreaterOrEqual
//!
//! `&&` and `||` do not survive lowering; they become jumps. Lowering is
//! total: it cannot fail on a resolved AST.

use crate::ast_c;
use crate::id_gen::IdGenerator;
use crate::lexer::Constant;

#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub(crate) struct Identifier(pub(crate) String);

impl<T> From<T> for Identifier
where
    T: Into<String>,
{
    fn from(value: T) -> Self {
        Identifier(value.into())
    }
}

#[derive(Debug, PartialEq)]
pub(crate) struct Program {
    pub(crate) function_definition: FunctionDefinition,
}

#[derive(Debug, PartialEq)]
pub(crate) struct FunctionDefinition {
    pub(crate) name: Identifier,
    pub(crate) body: Vec<Instruction>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Instruction {
    Return(Val),
    Unary {
        op: UnaryOperator,
        src: Val,
        dst: Val,
    },
    Binary {
        op: BinaryOperator,
        src1: Val,
        src2: Val,
        dst: Val,
    },
    Copy {
        src: Val,
        dst: Val,
    },
    Jump {
        target: Identifier,
    },
    JumpIfZero {
        condition: Val,
        target: Identifier,
    },
    JumpIfNotZero {
        condition: Val,
        target: Identifier,
    },
    Label(Identifier),
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum Val {
    Constant(Constant),
    Var(Identifier),
}

#[derive(Debug, PartialEq)]
pub(crate) enum UnaryOperator {
    Complement,
    Negate,
    Not,
}

#[derive(Debug, PartialEq)]
pub(crate) enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
}

pub(crate) fn emit_program(program: &ast_c::Program) -> Program {
    Program {
        function_definition: emit_function_definition(&program.function),
    }
}

fn emit_function_definition(function: &ast_c::Function) -> FunctionDefinition {
    let mut instructions = vec![];
    let mut id_gen = IdGenerator::new();

    emit_block(&function.body, &mut instructions, &mut id_gen);

    FunctionDefinition {
        name: (&function.name).into(),
        body: instructions,
    }
}

fn next_var(id_gen: &mut IdGenerator) -> Identifier {
    id_gen.fresh("tmp").into()
}

fn emit_expression(
    exp: &ast_c::Expression,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) -> Val {
    match exp {
        ast_c::Expression::Constant(c) => Val::Constant(*c),

        ast_c::Expression::Var(identifier) => Val::Var(identifier.into()),

        ast_c::Expression::Unary(op, inner) => {
            let src = emit_expression(inner, instructions, id_gen);
            let dst = Val::Var(next_var(id_gen));
            let tacky_op = convert_unop(op);
            instructions.push(Instruction::Unary {
                op: tacky_op,
                src,
                dst: dst.clone(),
            });
            dst
        }

        // Short-circuit evaluation for And / Or
        ast_c::Expression::Binary(ast_c::BinaryOperator::And, e1, e2) => {
            let id = id_gen.next();
            let label_false: Identifier = format!("and_false.{id}").into();
            let label_end: Identifier = format!("and_end.{id}").into();

            let v1 = emit_expression(e1, instructions, id_gen);
            instructions.push(Instruction::JumpIfZero {
                condition: v1,
                target: label_false.clone(),
            });
            let v2 = emit_expression(e2, instructions, id_gen);
            instructions.push(Instruction::JumpIfZero {
                condition: v2,
                target: label_false.clone(),
            });
            let dst = Val::Var(next_var(id_gen));
            instructions.push(Instruction::Copy {
                src: Val::Constant(1),
                dst: dst.clone(),
            });
            instructions.push(Instruction::Jump {
                target: label_end.clone(),
            });
            instructions.push(Instruction::Label(label_false));
            instructions.push(Instruction::Copy {
                src: Val::Constant(0),
                dst: dst.clone(),
            });
            instructions.push(Instruction::Label(label_end));
            dst
        }

        ast_c::Expression::Binary(ast_c::BinaryOperator::Or, e1, e2) => {
            let id = id_gen.next();
            let label_true: Identifier = format!("or_true.{id}").into();
            let label_end: Identifier = format!("or_end.{id}").into();

            let v1 = emit_expression(e1, instructions, id_gen);
            instructions.push(Instruction::JumpIfNotZero {
                condition: v1,
                target: label_true.clone(),
            });
            let v2 = emit_expression(e2, instructions, id_gen);
            instructions.push(Instruction::JumpIfNotZero {
                condition: v2,
                target: label_true.clone(),
            });
            let dst = Val::Var(next_var(id_gen));
            instructions.push(Instruction::Copy {
                src: Val::Constant(0),
                dst: dst.clone(),
            });
            instructions.push(Instruction::Jump {
                target: label_end.clone(),
            });
            instructions.push(Instruction::Label(label_true));
            instructions.push(Instruction::Copy {
                src: Val::Constant(1),
                dst: dst.clone(),
            });
            instructions.push(Instruction::Label(label_end));
            dst
        }

        ast_c::Expression::Binary(op, e1, e2) => {
            // Unsequenced - indeterminate order of evaluation
            let src1 = emit_expression(e1, instructions, id_gen);
            let src2 = emit_expression(e2, instructions, id_gen);
            let dst = Val::Var(next_var(id_gen));
            let tacky_op = convert_binop(op);
            instructions.push(Instruction::Binary {
                op: tacky_op,
                src1,
                src2,
                dst: dst.clone(),
            });
            dst
        }

        ast_c::Expression::Assignment(lhs, rhs) => {
            if let ast_c::Expression::Var(v) = &**lhs {
                let result = emit_expression(rhs, instructions, id_gen);
                instructions.push(Instruction::Copy {
                    src: result,
                    dst: Val::Var(v.into()),
                });
                Val::Var(v.into())
            } else {
                unreachable!("lhs is a variable after semantic analysis");
            }
        }

        ast_c::Expression::Conditional(cond, e1, e2) => {
            emit_exp_conditional(cond, e1, e2, instructions, id_gen)
        }
    }
}

fn convert_unop(op: &ast_c::UnaryOperator) -> UnaryOperator {
    match op {
        ast_c::UnaryOperator::Complement => UnaryOperator::Complement,
        ast_c::UnaryOperator::Negate => UnaryOperator::Negate,
        ast_c::UnaryOperator::Not => UnaryOperator::Not,
    }
}

fn convert_binop(op: &ast_c::BinaryOperator) -> BinaryOperator {
    match op {
        ast_c::BinaryOperator::Add => BinaryOperator::Add,
        ast_c::BinaryOperator::Subtract => BinaryOperator::Subtract,
        ast_c::BinaryOperator::Multiply => BinaryOperator::Multiply,
        ast_c::BinaryOperator::Divide => BinaryOperator::Divide,
        ast_c::BinaryOperator::Remainder => BinaryOperator::Remainder,
        ast_c::BinaryOperator::Equal => BinaryOperator::Equal,
        ast_c::BinaryOperator::NotEqual => BinaryOperator::NotEqual,
        ast_c::BinaryOperator::LessThan => BinaryOperator::LessThan,
        ast_c::BinaryOperator::GreaterThan => BinaryOperator::GreaterThan,
        ast_c::BinaryOperator::LessOrEqual => BinaryOperator::LessOrEqual,
        ast_c::BinaryOperator::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
        ast_c::BinaryOperator::And | ast_c::BinaryOperator::Or => {
            unreachable!("short-circuit operators are lowered to jumps");
        }
    }
}

fn emit_block(
    block: &ast_c::Block,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) {
    for item in &block.items {
        match item {
            ast_c::BlockItem::S(statement) => emit_statement(statement, instructions, id_gen),
            ast_c::BlockItem::D(declaration) => {
                emit_variable_declaration(declaration, instructions, id_gen);
            }
        }
    }
}

fn emit_variable_declaration(
    ast_c::Declaration { name, init }: &ast_c::Declaration,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) {
    if let Some(init) = init {
        let result = emit_expression(init, instructions, id_gen);
        instructions.push(Instruction::Copy {
            src: result,
            dst: Val::Var(name.into()),
        });
    }
}

fn emit_statement(
    statement: &ast_c::Statement,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) {
    match statement {
        ast_c::Statement::Return(exp) => {
            let val = emit_expression(exp, instructions, id_gen);
            instructions.push(Instruction::Return(val));
        }
        ast_c::Statement::Expression(exp) => {
            // evaluated for its side effects only
            let _ = emit_expression(exp, instructions, id_gen);
        }
        ast_c::Statement::If {
            condition,
            then,
            else_,
        } => emit_statement_if(condition, then, else_, instructions, id_gen),
        ast_c::Statement::Compound(block) => emit_block(block, instructions, id_gen),
        ast_c::Statement::Break(label) => {
            let label = label.as_ref().expect("loops are labeled after semantic analysis");
            instructions.push(Instruction::Jump {
                target: break_label(label),
            });
        }
        ast_c::Statement::Continue(label) => {
            let label = label.as_ref().expect("loops are labeled after semantic analysis");
            instructions.push(Instruction::Jump {
                target: continue_label(label),
            });
        }
        ast_c::Statement::While {
            condition,
            body,
            loop_label,
        } => emit_while(condition, body, loop_label, instructions, id_gen),
        ast_c::Statement::DoWhile {
            body,
            condition,
            loop_label,
        } => emit_do_while(body, condition, loop_label, instructions, id_gen),
        ast_c::Statement::For {
            init,
            condition,
            post,
            body,
            loop_label,
        } => emit_for(
            init,
            condition,
            post,
            body,
            loop_label,
            instructions,
            id_gen,
        ),
        ast_c::Statement::Null => {}
    }
}

fn emit_statement_if(
    condition: &ast_c::Expression,
    then: &ast_c::Statement,
    else_: &Option<Box<ast_c::Statement>>,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) {
    // if (condition) { then }:
    //   <instructions for condition>
    //   JumpIfZero(c, end)
    //   <instructions for then-statement>
    //   Label(end)
    //
    // if (condition) { then } else { else_ }:
    //   <instructions for condition>
    //   JumpIfZero(c, else_label)
    //   <instructions for then-statement>
    //   Jump(end)
    //   Label(else_label)
    //   <instructions for else-statement>
    //   Label(end)

    let label_else: Identifier = format!("if_else.{}", id_gen.next()).into();
    let label_end: Identifier = format!("if_end.{}", id_gen.next()).into();

    let cond_val = emit_expression(condition, instructions, id_gen);

    instructions.push(Instruction::JumpIfZero {
        condition: cond_val,
        target: if else_.is_none() {
            label_end.clone()
        } else {
            label_else.clone()
        },
    });

    emit_statement(then, instructions, id_gen);

    if let Some(else_stmt) = else_ {
        instructions.push(Instruction::Jump {
            target: label_end.clone(),
        });
        instructions.push(Instruction::Label(label_else));
        emit_statement(else_stmt, instructions, id_gen);
    }

    instructions.push(Instruction::Label(label_end));
}

fn emit_exp_conditional(
    condition: &ast_c::Expression,
    e1: &ast_c::Expression,
    e2: &ast_c::Expression,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) -> Val {
    // <instructions for condition>
    // JumpIfZero(c, e2_label)
    // <instructions to calculate e1>
    // result = v1
    // Jump(end)
    // Label(e2_label)
    // <instructions to calculate e2>
    // result = v2
    // Label(end)

    let id = id_gen.next();
    let label_e2: Identifier = format!("cond_e2.{id}").into();
    let label_end: Identifier = format!("cond_end.{id}").into();
    let result = Val::Var(next_var(id_gen));

    let cond_val = emit_expression(condition, instructions, id_gen);
    instructions.push(Instruction::JumpIfZero {
        condition: cond_val,
        target: label_e2.clone(),
    });

    let v1 = emit_expression(e1, instructions, id_gen);
    instructions.push(Instruction::Copy {
        src: v1,
        dst: result.clone(),
    });
    instructions.push(Instruction::Jump {
        target: label_end.clone(),
    });

    instructions.push(Instruction::Label(label_e2));
    let v2 = emit_expression(e2, instructions, id_gen);
    instructions.push(Instruction::Copy {
        src: v2,
        dst: result.clone(),
    });

    instructions.push(Instruction::Label(label_end));

    result
}

fn start_label<T: AsRef<str>>(label: T) -> Identifier {
    format!("start_{}", label.as_ref()).into()
}

fn break_label<T: AsRef<str>>(label: T) -> Identifier {
    format!("break_{}", label.as_ref()).into()
}

fn continue_label<T: AsRef<str>>(label: T) -> Identifier {
    format!("continue_{}", label.as_ref()).into()
}

fn emit_while(
    condition: &ast_c::Expression,
    body: &ast_c::Statement,
    loop_label: &Option<crate::lexer::Identifier>,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) {
    // The continue label doubles as the loop start: each iteration
    // re-evaluates the condition.
    let loop_label = loop_label
        .as_ref()
        .expect("loops are labeled after semantic analysis");
    let continue_label = continue_label(loop_label);
    let break_label = break_label(loop_label);

    instructions.push(Instruction::Label(continue_label.clone()));

    let v = emit_expression(condition, instructions, id_gen);
    instructions.push(Instruction::JumpIfZero {
        condition: v,
        target: break_label.clone(),
    });

    emit_statement(body, instructions, id_gen);

    instructions.push(Instruction::Jump {
        target: continue_label,
    });

    instructions.push(Instruction::Label(break_label));
}

fn emit_do_while(
    body: &ast_c::Statement,
    condition: &ast_c::Expression,
    loop_label: &Option<crate::lexer::Identifier>,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) {
    let loop_label = loop_label
        .as_ref()
        .expect("loops are labeled after semantic analysis");
    let start_label = start_label(loop_label);

    instructions.push(Instruction::Label(start_label.clone()));

    emit_statement(body, instructions, id_gen);

    instructions.push(Instruction::Label(continue_label(loop_label)));

    let v = emit_expression(condition, instructions, id_gen);
    instructions.push(Instruction::JumpIfNotZero {
        condition: v,
        target: start_label,
    });

    instructions.push(Instruction::Label(break_label(loop_label)));
}

fn emit_for(
    init: &ast_c::ForInit,
    condition: &Option<ast_c::Expression>,
    post: &Option<ast_c::Expression>,
    body: &ast_c::Statement,
    loop_label: &Option<crate::lexer::Identifier>,
    instructions: &mut Vec<Instruction>,
    id_gen: &mut IdGenerator,
) {
    let loop_label = loop_label
        .as_ref()
        .expect("loops are labeled after semantic analysis");
    let start_label = start_label(loop_label);
    let continue_label = continue_label(loop_label);
    let break_label = break_label(loop_label);

    match init {
        ast_c::ForInit::InitDecl(decl) => {
            emit_variable_declaration(decl, instructions, id_gen);
        }
        ast_c::ForInit::InitExp(Some(exp)) => {
            let _ = emit_expression(exp, instructions, id_gen);
        }
        ast_c::ForInit::InitExp(None) => {}
    }

    instructions.push(Instruction::Label(start_label.clone()));

    // A missing condition never exits the loop
    if let Some(cond) = condition {
        let v = emit_expression(cond, instructions, id_gen);
        instructions.push(Instruction::JumpIfZero {
            condition: v,
            target: break_label.clone(),
        });
    }

    emit_statement(body, instructions, id_gen);

    instructions.push(Instruction::Label(continue_label));

    if let Some(post_exp) = post {
        let _ = emit_expression(post_exp, instructions, id_gen);
    }

    instructions.push(Instruction::Jump {
        target: start_label,
    });

    instructions.push(Instruction::Label(break_label));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::semantics;
    use std::collections::HashMap;

    pub(crate) fn lower(input: &str) -> Program {
        let tokens = lex(input).expect("lexing should succeed");
        let mut ast = parse(&tokens).expect("parsing should succeed");
        semantics::analyse(&mut ast).expect("semantic analysis should succeed");
        emit_program(&ast)
    }

    fn do_emit_expression(exp: &ast_c::Expression) -> (Val, Vec<Instruction>) {
        let mut instructions = vec![];
        let mut id_gen = IdGenerator::new();
        let val = emit_expression(exp, &mut instructions, &mut id_gen);
        (val, instructions)
    }

    /// Reference evaluator for the lowered IR, used to pin down the
    /// observable behaviour of compiled programs without running them.
    pub(crate) fn interpret(program: &Program) -> Constant {
        let body = &program.function_definition.body;

        let labels: HashMap<&Identifier, usize> = body
            .iter()
            .enumerate()
            .filter_map(|(i, instruction)| match instruction {
                Instruction::Label(l) => Some((l, i)),
                _ => None,
            })
            .collect();

        let mut env: HashMap<Identifier, Constant> = HashMap::new();
        let value = |env: &HashMap<Identifier, Constant>, val: &Val| match val {
            Val::Constant(c) => *c,
            Val::Var(v) => env[v],
        };

        let mut pc = 0;
        while pc < body.len() {
            match &body[pc] {
                Instruction::Return(val) => return value(&env, val),
                Instruction::Unary { op, src, dst } => {
                    let src = value(&env, src);
                    let result = match op {
                        UnaryOperator::Complement => !src,
                        UnaryOperator::Negate => -src,
                        UnaryOperator::Not => (src == 0).into(),
                    };
                    let Val::Var(dst) = dst else { panic!("dst must be a var") };
                    env.insert(dst.clone(), result);
                }
                Instruction::Binary {
                    op,
                    src1,
                    src2,
                    dst,
                } => {
                    let a = value(&env, src1);
                    let b = value(&env, src2);
                    let result = match op {
                        BinaryOperator::Add => a.wrapping_add(b),
                        BinaryOperator::Subtract => a.wrapping_sub(b),
                        BinaryOperator::Multiply => a.wrapping_mul(b),
                        BinaryOperator::Divide => a / b,
                        BinaryOperator::Remainder => a % b,
                        BinaryOperator::Equal => (a == b).into(),
                        BinaryOperator::NotEqual => (a != b).into(),
                        BinaryOperator::LessThan => (a < b).into(),
                        BinaryOperator::GreaterThan => (a > b).into(),
                        BinaryOperator::LessOrEqual => (a <= b).into(),
                        BinaryOperator::GreaterOrEqual => (a >= b).into(),
                    };
                    let Val::Var(dst) = dst else { panic!("dst must be a var") };
                    env.insert(dst.clone(), result);
                }
                Instruction::Copy { src, dst } => {
                    let src = value(&env, src);
                    let Val::Var(dst) = dst else { panic!("dst must be a var") };
                    env.insert(dst.clone(), src);
                }
                Instruction::Jump { target } => {
                    pc = labels[target];
                    continue;
                }
                Instruction::JumpIfZero { condition, target } => {
                    if value(&env, condition) == 0 {
                        pc = labels[target];
                        continue;
                    }
                }
                Instruction::JumpIfNotZero { condition, target } => {
                    if value(&env, condition) != 0 {
                        pc = labels[target];
                        continue;
                    }
                }
                Instruction::Label(_) => {}
            }
            pc += 1;
        }

        // falling off the end of main returns 0
        0
    }

    #[test]
    fn test_emit_constant_expression() {
        let (val, instructions) = do_emit_expression(&ast_c::Expression::Constant(2));
        assert_eq!(val, Val::Constant(2));
        assert!(instructions.is_empty());
    }

    #[test]
    fn test_emit_nested_unary_expression() {
        let exp = ast_c::Expression::Unary(
            ast_c::UnaryOperator::Negate,
            Box::new(ast_c::Expression::Unary(
                ast_c::UnaryOperator::Complement,
                Box::new(ast_c::Expression::Constant(8)),
            )),
        );
        let (val, instructions) = do_emit_expression(&exp);

        assert_eq!(val, Val::Var("tmp.1".into()));
        assert_eq!(
            instructions,
            vec![
                Instruction::Unary {
                    op: UnaryOperator::Complement,
                    src: Val::Constant(8),
                    dst: Val::Var("tmp.0".into()),
                },
                Instruction::Unary {
                    op: UnaryOperator::Negate,
                    src: Val::Var("tmp.0".into()),
                    dst: Val::Var("tmp.1".into()),
                },
            ]
        );
    }

    #[test]
    fn test_emit_binary_and_is_short_circuit() {
        // "e1 && e2" generates:
        //   <instructions for e1>
        //   JumpIfZero(v1, false_label)
        //   <instructions for e2>
        //   JumpIfZero(v2, false_label)
        //   Copy(1, result)
        //   Jump(end)
        //   Label(false_label)
        //   Copy(0, result)
        //   Label(end)
        let (val, instructions) = do_emit_expression(&ast_c::Expression::Binary(
            ast_c::BinaryOperator::And,
            Box::new(ast_c::Expression::Binary(
                ast_c::BinaryOperator::Add,
                Box::new(ast_c::Expression::Constant(1)),
                Box::new(ast_c::Expression::Constant(2)),
            )),
            Box::new(ast_c::Expression::Constant(3)),
        ));

        assert_eq!(val, Val::Var("tmp.2".into()));
        assert_eq!(
            instructions,
            vec![
                Instruction::Binary {
                    op: BinaryOperator::Add,
                    src1: Val::Constant(1),
                    src2: Val::Constant(2),
                    dst: Val::Var("tmp.1".into()),
                },
                Instruction::JumpIfZero {
                    condition: Val::Var("tmp.1".into()),
                    target: "and_false.0".into(),
                },
                Instruction::JumpIfZero {
                    condition: Val::Constant(3),
                    target: "and_false.0".into(),
                },
                Instruction::Copy {
                    src: Val::Constant(1),
                    dst: Val::Var("tmp.2".into()),
                },
                Instruction::Jump {
                    target: "and_end.0".into(),
                },
                Instruction::Label("and_false.0".into()),
                Instruction::Copy {
                    src: Val::Constant(0),
                    dst: Val::Var("tmp.2".into()),
                },
                Instruction::Label("and_end.0".into()),
            ]
        );
    }

    #[test]
    fn test_emit_binary_or_is_short_circuit() {
        let (val, instructions) = do_emit_expression(&ast_c::Expression::Binary(
            ast_c::BinaryOperator::Or,
            Box::new(ast_c::Expression::Constant(1)),
            Box::new(ast_c::Expression::Constant(2)),
        ));

        assert_eq!(val, Val::Var("tmp.1".into()));
        assert_eq!(
            instructions,
            vec![
                Instruction::JumpIfNotZero {
                    condition: Val::Constant(1),
                    target: "or_true.0".into(),
                },
                Instruction::JumpIfNotZero {
                    condition: Val::Constant(2),
                    target: "or_true.0".into(),
                },
                Instruction::Copy {
                    src: Val::Constant(0),
                    dst: Val::Var("tmp.1".into()),
                },
                Instruction::Jump {
                    target: "or_end.0".into(),
                },
                Instruction::Label("or_true.0".into()),
                Instruction::Copy {
                    src: Val::Constant(1),
                    dst: Val::Var("tmp.1".into()),
                },
                Instruction::Label("or_end.0".into()),
            ]
        );
    }

    #[test]
    fn test_emit_conditional_expression() {
        // 1 ? 2 : 3
        let (val, instructions) = do_emit_expression(&ast_c::Expression::Conditional(
            Box::new(ast_c::Expression::Constant(1)),
            Box::new(ast_c::Expression::Constant(2)),
            Box::new(ast_c::Expression::Constant(3)),
        ));

        assert_eq!(val, Val::Var("tmp.1".into()));
        assert_eq!(
            instructions,
            vec![
                Instruction::JumpIfZero {
                    condition: Val::Constant(1),
                    target: "cond_e2.0".into(),
                },
                Instruction::Copy {
                    src: Val::Constant(2),
                    dst: Val::Var("tmp.1".into()),
                },
                Instruction::Jump {
                    target: "cond_end.0".into(),
                },
                Instruction::Label("cond_e2.0".into()),
                Instruction::Copy {
                    src: Val::Constant(3),
                    dst: Val::Var("tmp.1".into()),
                },
                Instruction::Label("cond_end.0".into()),
            ]
        );
    }

    #[test]
    fn test_lower_local_variables() {
        // int main(void) {
        //     int b;
        //     int a = 10 + 1;
        //     b = a * 2;
        //     return b;
        // }
        let program = lower(
            r#"
            int main(void) {
                int b;
                int a = 10 + 1;
                b = a * 2;
                return b;
            }
            "#,
        );

        assert_eq!(
            program,
            Program {
                function_definition: FunctionDefinition {
                    name: "main".into(),
                    body: vec![
                        // int b;  -- no instructions
                        // int a = 10 + 1;
                        Instruction::Binary {
                            op: BinaryOperator::Add,
                            src1: Val::Constant(10),
                            src2: Val::Constant(1),
                            dst: Val::Var("tmp.0".into()),
                        },
                        Instruction::Copy {
                            src: Val::Var("tmp.0".into()),
                            dst: Val::Var("a.1".into()),
                        },
                        // b = a * 2;
                        Instruction::Binary {
                            op: BinaryOperator::Multiply,
                            src1: Val::Var("a.1".into()),
                            src2: Val::Constant(2),
                            dst: Val::Var("tmp.1".into()),
                        },
                        Instruction::Copy {
                            src: Val::Var("tmp.1".into()),
                            dst: Val::Var("b.0".into()),
                        },
                        // return b;
                        Instruction::Return(Val::Var("b.0".into())),
                    ],
                }
            }
        );
    }

    #[test]
    fn test_lower_while_loop_shape() {
        let program = lower(
            r#"
            int main(void) {
                int i = 0;
                while (i < 5)
                    i = i + 1;
                return i;
            }
            "#,
        );
        let body = &program.function_definition.body;

        // Label(continue) ... JumpIfZero(break) ... Jump(continue) Label(break)
        assert_eq!(body[1], Instruction::Label("continue_while.0".into()));
        assert!(matches!(
            body[3],
            Instruction::JumpIfZero { ref target, .. } if *target == "break_while.0".into()
        ));
        let jump_back = body
            .iter()
            .position(|i| matches!(i, Instruction::Jump { target } if *target == "continue_while.0".into()))
            .expect("loop jumps back to its condition");
        assert_eq!(body[jump_back + 1], Instruction::Label("break_while.0".into()));
    }

    #[test]
    fn test_lower_do_while_shape() {
        let program = lower(
            r#"
            int main(void) {
                int i = 0;
                do i = i + 1; while (i < 5);
                return i;
            }
            "#,
        );
        let body = &program.function_definition.body;

        assert_eq!(body[1], Instruction::Label("start_do_while.0".into()));
        let continue_pos = body
            .iter()
            .position(|i| *i == Instruction::Label("continue_do_while.0".into()))
            .expect("continue label before the condition");
        assert!(matches!(
            body[continue_pos + 2],
            Instruction::JumpIfNotZero { ref target, .. } if *target == "start_do_while.0".into()
        ));
    }

    #[test]
    fn test_every_jump_target_is_defined_exactly_once() {
        let program = lower(
            r#"
            int main(void) {
                int s = 0;
                for (int j = 1; j <= 4; j = j + 1) {
                    if (j == 2 || j == 3)
                        s = s + j;
                    else
                        s = s + 1;
                    if (s > 100) break;
                }
                while (s < 10) {
                    s = s + (s < 5 ? 2 : 1) && 1;
                    continue;
                }
                return s;
            }
            "#,
        );
        let body = &program.function_definition.body;

        let mut definitions: HashMap<&Identifier, usize> = HashMap::new();
        for instruction in body {
            if let Instruction::Label(l) = instruction {
                *definitions.entry(l).or_default() += 1;
            }
        }
        for count in definitions.values() {
            assert_eq!(*count, 1);
        }

        for instruction in body {
            let target = match instruction {
                Instruction::Jump { target } => target,
                Instruction::JumpIfZero { target, .. } => target,
                Instruction::JumpIfNotZero { target, .. } => target,
                _ => continue,
            };
            assert!(definitions.contains_key(target), "undefined target {target:?}");
        }
    }

    #[test]
    fn test_interpret_sample_programs() {
        // expected exit codes for the reference programs
        let cases: &[(&str, Constant)] = &[
            ("int main(void){ return 42; }", 42),
            ("int main(void){ return -(~5 + 1); }", 5),
            ("int main(void){ return (2+3)*4 - 6/2; }", 17),
            ("int main(void){ return !(5+3<10) && (2==2 || 0); }", 0),
            ("int main(void){ int a=10; int b=20; return a+b; }", 30),
            ("int main(void){ int i=0; while(i<5){ i=i+1; } return i; }", 5),
            (
                "int main(void){ int s=0; for(int j=1;j<=4;j=j+1) s=s+j; return s; }",
                10,
            ),
            ("int main(void){ int x=5; return (x>3)?1:0; }", 1),
        ];

        for (source, expected) in cases {
            let program = lower(source);
            assert_eq!(interpret(&program), *expected, "program: {source}");
        }
    }

    #[test]
    fn test_interpret_control_flow() {
        let cases: &[(&str, Constant)] = &[
            // do-while runs at least once
            ("int main(void){ int i=10; do i=i+1; while(i<5); return i; }", 11),
            // break and continue attach to the innermost loop
            (
                r#"
                int main(void) {
                    int s = 0;
                    for (int i = 0; i < 10; i = i + 1) {
                        if (i % 2 == 0)
                            continue;
                        if (i > 6)
                            break;
                        s = s + i;
                    }
                    return s;
                }
                "#,
                9,
            ),
            // short-circuit evaluation skips the side effect
            (
                "int main(void){ int a = 1; int b = 0; b = 0 && (a = 2); return a; }",
                1,
            ),
            (
                "int main(void){ int a = 1; int b = 0; b = 1 || (a = 2); return a; }",
                1,
            ),
            // nested ternary picks the middle branch
            ("int main(void){ int x=2; return x==1 ? 10 : x==2 ? 20 : 30; }", 20),
            // no return executed means exit code 0
            ("int main(void){ int a = 5; a = a + 1; }", 0),
            // if without else
            ("int main(void){ int a=1; if (a) a = 7; return a; }", 7),
            ("int main(void){ int a=0; if (a) a = 7; else a = 3; return a; }", 3),
        ];

        for (source, expected) in cases {
            let program = lower(source);
            assert_eq!(interpret(&program), *expected, "program: {source}");
        }
    }
}
