use crate::ast_c::{
    Block, BlockItem, Declaration, Expression, ForInit, Program, Statement,
};
use crate::id_gen::IdGenerator;
use crate::lexer::Identifier;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum Error {
    #[error("Undeclared variable: {0}")]
    UndeclaredVariable(Identifier),

    #[error("Duplicate declaration: {0}")]
    DuplicateVariableDeclaration(Identifier),

    #[error("Invalid lvalue")]
    InvalidLValue,

    #[error("Break statement outside of loop")]
    BreakOutsideLoop,

    #[error("Continue statement outside of loop")]
    ContinueOutsideLoop,
}

/// Semantic analysis: rename every variable to a unique name, check
/// declarations and lvalues, then attach loop labels to loops and to the
/// `break`/`continue` statements they enclose.
pub(crate) fn analyse(program: &mut Program) -> Result<(), Error> {
    variable_resolution(program)?;

    loop_labeling(program)?;

    Ok(())
}

#[derive(Debug, Clone)]
struct VariableMapEntry {
    unique_name: Identifier,
    from_current_scope: bool,
}

type VariableMap = HashMap<Identifier, VariableMapEntry>;

fn variable_resolution(program: &mut Program) -> Result<(), Error> {
    let mut variable_map = VariableMap::new();
    let mut id_gen = IdGenerator::new();

    program.function.body = resolve_block(&program.function.body, &mut variable_map, &mut id_gen)?;

    Ok(())
}

fn resolve_block(
    block: &Block,
    variable_map: &mut VariableMap,
    id_gen: &mut IdGenerator,
) -> Result<Block, Error> {
    let mut items = Vec::new();
    for item in &block.items {
        match item {
            BlockItem::S(statement) => {
                items.push(BlockItem::S(resolve_statement(
                    statement,
                    variable_map,
                    id_gen,
                )?));
            }
            BlockItem::D(declaration) => {
                items.push(BlockItem::D(resolve_declaration(
                    declaration,
                    variable_map,
                    id_gen,
                )?));
            }
        }
    }
    Ok(Block { items })
}

fn resolve_declaration(
    Declaration { name, init }: &Declaration,
    variable_map: &mut VariableMap,
    id_gen: &mut IdGenerator,
) -> Result<Declaration, Error> {
    if variable_map.contains_key(name) && variable_map[name].from_current_scope {
        return Err(Error::DuplicateVariableDeclaration(name.clone()));
    }

    let unique_name = id_gen.fresh(name);
    variable_map.insert(
        name.clone(),
        VariableMapEntry {
            unique_name: unique_name.clone(),
            from_current_scope: true,
        },
    );

    let init = if let Some(init) = init {
        Some(resolve_exp(init, variable_map)?)
    } else {
        None
    };

    Ok(Declaration {
        name: unique_name,
        init,
    })
}

fn resolve_statement(
    statement: &Statement,
    variable_map: &mut VariableMap,
    id_gen: &mut IdGenerator,
) -> Result<Statement, Error> {
    match statement {
        Statement::Return(exp) => Ok(Statement::Return(resolve_exp(exp, variable_map)?)),
        Statement::Expression(exp) => Ok(Statement::Expression(resolve_exp(exp, variable_map)?)),
        Statement::If {
            condition,
            then,
            else_,
        } => {
            let else_ = if let Some(else_stmt) = else_ {
                Some(Box::new(resolve_statement(else_stmt, variable_map, id_gen)?))
            } else {
                None
            };
            Ok(Statement::If {
                condition: resolve_exp(condition, variable_map)?,
                then: Box::new(resolve_statement(then, variable_map, id_gen)?),
                else_,
            })
        }
        Statement::Compound(block) => {
            let mut new_variable_map = copy_variable_map(variable_map);
            Ok(Statement::Compound(resolve_block(
                block,
                &mut new_variable_map,
                id_gen,
            )?))
        }
        Statement::Break(_) => Ok(statement.clone()),
        Statement::Continue(_) => Ok(statement.clone()),
        Statement::While {
            condition,
            body,
            loop_label,
        } => Ok(Statement::While {
            condition: resolve_exp(condition, variable_map)?,
            body: Box::new(resolve_statement(body, variable_map, id_gen)?),
            loop_label: loop_label.clone(),
        }),
        Statement::DoWhile {
            body,
            condition,
            loop_label,
        } => Ok(Statement::DoWhile {
            body: Box::new(resolve_statement(body, variable_map, id_gen)?),
            condition: resolve_exp(condition, variable_map)?,
            loop_label: loop_label.clone(),
        }),
        Statement::For {
            init,
            condition,
            post,
            body,
            loop_label,
        } => {
            // The loop header opens its own scope: a declaration in the
            // init is visible to the condition, post and body, but not
            // after the loop.
            let mut new_variable_map = copy_variable_map(variable_map);
            let init = resolve_for_init(init, &mut new_variable_map, id_gen)?;
            let condition = resolve_optional_exp(condition, &mut new_variable_map)?;
            let post = resolve_optional_exp(post, &mut new_variable_map)?;
            let body = resolve_statement(body, &mut new_variable_map, id_gen)?;
            Ok(Statement::For {
                init,
                condition,
                post,
                body: Box::new(body),
                loop_label: loop_label.clone(),
            })
        }
        Statement::Null => Ok(Statement::Null),
    }
}

fn copy_variable_map(variable_map: &VariableMap) -> VariableMap {
    // clone the hashmap but reset the `from_current_scope` flag
    variable_map
        .iter()
        .map(|(k, v)| {
            (
                k.clone(),
                VariableMapEntry {
                    unique_name: v.unique_name.clone(),
                    from_current_scope: false,
                },
            )
        })
        .collect()
}

fn resolve_exp(exp: &Expression, variable_map: &mut VariableMap) -> Result<Expression, Error> {
    match exp {
        Expression::Constant(_) => Ok(exp.clone()),
        Expression::Var(v) => variable_map
            .get(v)
            .map(|var| Expression::Var(var.unique_name.clone()))
            .ok_or_else(|| Error::UndeclaredVariable(v.clone())),
        Expression::Unary(op, exp) => Ok(Expression::Unary(
            op.clone(),
            resolve_exp(exp, variable_map)?.into(),
        )),
        Expression::Binary(op, left, right) => Ok(Expression::Binary(
            op.clone(),
            resolve_exp(left, variable_map)?.into(),
            resolve_exp(right, variable_map)?.into(),
        )),
        Expression::Assignment(left, right) => {
            if !matches!(**left, Expression::Var(_)) {
                return Err(Error::InvalidLValue);
            }
            Ok(Expression::Assignment(
                resolve_exp(left, variable_map)?.into(),
                resolve_exp(right, variable_map)?.into(),
            ))
        }
        Expression::Conditional(cond, then, else_) => Ok(Expression::Conditional(
            resolve_exp(cond, variable_map)?.into(),
            resolve_exp(then, variable_map)?.into(),
            resolve_exp(else_, variable_map)?.into(),
        )),
    }
}

fn resolve_for_init(
    init: &ForInit,
    variable_map: &mut VariableMap,
    id_gen: &mut IdGenerator,
) -> Result<ForInit, Error> {
    match init {
        ForInit::InitDecl(decl) => Ok(ForInit::InitDecl(resolve_declaration(
            decl,
            variable_map,
            id_gen,
        )?)),
        ForInit::InitExp(exp) => Ok(ForInit::InitExp(resolve_optional_exp(exp, variable_map)?)),
    }
}

fn resolve_optional_exp(
    exp: &Option<Expression>,
    variable_map: &mut VariableMap,
) -> Result<Option<Expression>, Error> {
    if let Some(exp) = exp {
        Ok(Some(resolve_exp(exp, variable_map)?))
    } else {
        Ok(None)
    }
}

fn loop_labeling(program: &mut Program) -> Result<(), Error> {
    let mut id_gen = IdGenerator::new();

    program.function.body = loop_label_block(&program.function.body, None, &mut id_gen)?;

    Ok(())
}

fn loop_label_block(
    block: &Block,
    current_label: Option<&Identifier>,
    id_gen: &mut IdGenerator,
) -> Result<Block, Error> {
    let mut items = Vec::new();
    for item in &block.items {
        match item {
            BlockItem::S(statement) => {
                items.push(BlockItem::S(loop_label_statement(
                    statement,
                    current_label,
                    id_gen,
                )?));
            }
            BlockItem::D(_) => {
                items.push(item.clone()); // declarations do not contain loops
            }
        }
    }
    Ok(Block { items })
}

fn loop_label_statement(
    statement: &Statement,
    current_label: Option<&Identifier>,
    id_gen: &mut IdGenerator,
) -> Result<Statement, Error> {
    match statement {
        Statement::If {
            condition,
            then,
            else_,
        } => Ok(Statement::If {
            condition: condition.clone(),
            then: Box::new(loop_label_statement(then, current_label, id_gen)?),
            else_: if let Some(else_stmt) = else_ {
                Some(Box::new(loop_label_statement(
                    else_stmt,
                    current_label,
                    id_gen,
                )?))
            } else {
                None
            },
        }),
        Statement::Compound(block) => Ok(Statement::Compound(loop_label_block(
            block,
            current_label,
            id_gen,
        )?)),
        Statement::Break(_) => {
            if let Some(label) = current_label {
                Ok(Statement::Break(Some(label.clone())))
            } else {
                Err(Error::BreakOutsideLoop)
            }
        }
        Statement::Continue(_) => {
            if let Some(label) = current_label {
                Ok(Statement::Continue(Some(label.clone())))
            } else {
                Err(Error::ContinueOutsideLoop)
            }
        }
        Statement::While {
            condition,
            body,
            loop_label: _,
        } => {
            let loop_label = id_gen.fresh("while");
            let body = loop_label_statement(body, Some(&loop_label), id_gen)?;
            Ok(Statement::While {
                condition: condition.clone(),
                body: Box::new(body),
                loop_label: Some(loop_label),
            })
        }
        Statement::DoWhile {
            body,
            condition,
            loop_label: _,
        } => {
            let loop_label = id_gen.fresh("do_while");
            let body = loop_label_statement(body, Some(&loop_label), id_gen)?;
            Ok(Statement::DoWhile {
                body: Box::new(body),
                condition: condition.clone(),
                loop_label: Some(loop_label),
            })
        }
        Statement::For {
            init,
            condition,
            post,
            body,
            loop_label: _,
        } => {
            let loop_label = id_gen.fresh("for");
            let body = loop_label_statement(body, Some(&loop_label), id_gen)?;
            Ok(Statement::For {
                init: init.clone(),
                condition: condition.clone(),
                post: post.clone(),
                body: Box::new(body),
                loop_label: Some(loop_label),
            })
        }
        Statement::Return(_) | Statement::Expression(_) | Statement::Null => Ok(statement.clone()),
    }
}
