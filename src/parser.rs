use crate::ast_c::{
    BinaryOperator, Block, BlockItem, Declaration, Expression, ForInit, Function, Program,
    Statement, UnaryOperator,
};
use crate::lexer::{Identifier, Keyword, Token, TokenKind};
use thiserror::Error;
use winnow::combinator::{alt, cut_err, opt, peek, preceded, repeat};
use winnow::error::{ContextError, ErrMode, ParseError, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::TokenSlice;
use winnow::token::any;

#[derive(Debug, PartialEq, Error)]
#[error("{message}")]
pub struct ParserError {
    pub message: String,
    pub expected: String,
    pub found: String,
    /// Byte offset of the offending token in the source text.
    pub offset: usize,
}

impl ParserError {
    // Avoiding `From` so winnow types don't become part of our public API
    fn from_parse(error: ParseError<TokenSlice<'_, Token>, ContextError>) -> Self {
        let context = error.inner().context();
        let expected = context
            .filter_map(|c| match c {
                StrContext::Expected(e) => Some(e.to_string()),
                _ => None,
            })
            .collect::<Vec<_>>();

        let expected = expected.first().cloned().unwrap_or("unknown".to_string());

        // The winnow offset counts tokens; errors report the byte span of
        // the offending token, or the end of the last token at EOF.
        let (found, offset) = match error.input().get(error.offset()) {
            Some(token) => (format!("{:?}", token.kind), token.span.start),
            None => (
                "EOF".to_string(),
                error.input().last().map_or(0, |t| t.span.end),
            ),
        };

        ParserError {
            message: format!("Expected {expected}, found {found}"),
            expected,
            found,
            offset,
        }
    }
}

type Tokens<'i> = TokenSlice<'i, Token>;

pub(crate) fn parse(input: &[Token]) -> Result<Program, ParserError> {
    let tokens = Tokens::new(input);
    let program = program.parse(tokens).map_err(ParserError::from_parse)?;
    Ok(program)
}

fn token<'i>(kind: TokenKind) -> impl Parser<Tokens<'i>, &'i Token, ErrMode<ContextError>> {
    any.verify(move |t: &&Token| t.kind == kind)
}

fn keyword<'i>(keyword: Keyword) -> impl Parser<Tokens<'i>, &'i Token, ErrMode<ContextError>> {
    token(TokenKind::Keyword(keyword))
}

fn program(i: &mut Tokens<'_>) -> winnow::ModalResult<Program> {
    let function = function
        .context(StrContext::Label("program"))
        .context(StrContext::Expected(StrContextValue::Description(
            "function",
        )))
        .parse_next(i)?;
    Ok(Program { function })
}

fn function(i: &mut Tokens<'_>) -> winnow::ModalResult<Function> {
    keyword(Keyword::Int)
        .context(StrContext::Label("function"))
        .context(StrContext::Expected(StrContextValue::Description(
            "keyword",
        )))
        .parse_next(i)?;
    let name = cut_err(identifier)
        .context(StrContext::Label("function"))
        .context(StrContext::Expected(StrContextValue::Description(
            "identifier",
        )))
        .parse_next(i)?;
    cut_err(token(TokenKind::OpenParen))
        .context(StrContext::Label("function"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("(")))
        .parse_next(i)?;
    cut_err(keyword(Keyword::Void))
        .context(StrContext::Label("function"))
        .context(StrContext::Expected(StrContextValue::Description(
            "keyword",
        )))
        .parse_next(i)?;
    cut_err(token(TokenKind::CloseParen))
        .context(StrContext::Label("function"))
        .context(StrContext::Expected(StrContextValue::StringLiteral(")")))
        .parse_next(i)?;
    let body = cut_err(block)
        .context(StrContext::Label("function"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("{")))
        .parse_next(i)?;
    Ok(Function { name, body })
}

fn block(i: &mut Tokens<'_>) -> winnow::ModalResult<Block> {
    token(TokenKind::OpenBrace)
        .context(StrContext::Label("block"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("{")))
        .parse_next(i)?;
    let items = repeat(0.., block_item).parse_next(i)?;
    cut_err(token(TokenKind::CloseBrace))
        .context(StrContext::Label("block"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("}")))
        .parse_next(i)?;
    Ok(Block { items })
}

fn block_item(i: &mut Tokens<'_>) -> winnow::ModalResult<BlockItem> {
    alt((declaration.map(BlockItem::D), statement.map(BlockItem::S))).parse_next(i)
}

fn declaration(i: &mut Tokens<'_>) -> winnow::ModalResult<Declaration> {
    keyword(Keyword::Int).parse_next(i)?;
    let name = cut_err(identifier)
        .context(StrContext::Label("declaration"))
        .context(StrContext::Expected(StrContextValue::Description(
            "identifier",
        )))
        .parse_next(i)?;
    let init = opt(preceded(
        token(TokenKind::Assign),
        cut_err(expression)
            .context(StrContext::Label("declaration"))
            .context(StrContext::Expected(StrContextValue::Description(
                "expression",
            ))),
    ))
    .parse_next(i)?;
    cut_err(token(TokenKind::Semicolon))
        .context(StrContext::Label("declaration"))
        .context(StrContext::Expected(StrContextValue::Description(
            "semicolon",
        )))
        .parse_next(i)?;
    Ok(Declaration { name, init })
}

fn statement(i: &mut Tokens<'_>) -> winnow::ModalResult<Statement> {
    // One token of lookahead selects the statement form.
    let next = peek(any)
        .context(StrContext::Label("statement"))
        .context(StrContext::Expected(StrContextValue::Description(
            "statement",
        )))
        .parse_next(i)?;
    match &next.kind {
        TokenKind::Keyword(Keyword::Return) => return_statement(i),
        TokenKind::Keyword(Keyword::If) => if_statement(i),
        TokenKind::Keyword(Keyword::While) => while_statement(i),
        TokenKind::Keyword(Keyword::Do) => do_while_statement(i),
        TokenKind::Keyword(Keyword::For) => for_statement(i),
        TokenKind::Keyword(Keyword::Break) => {
            any.parse_next(i)?;
            expect_semicolon(i)?;
            Ok(Statement::Break(None))
        }
        TokenKind::Keyword(Keyword::Continue) => {
            any.parse_next(i)?;
            expect_semicolon(i)?;
            Ok(Statement::Continue(None))
        }
        TokenKind::OpenBrace => block.map(Statement::Compound).parse_next(i),
        TokenKind::Semicolon => {
            any.parse_next(i)?;
            Ok(Statement::Null)
        }
        _ => {
            let exp = expression.parse_next(i)?;
            expect_semicolon(i)?;
            Ok(Statement::Expression(exp))
        }
    }
}

fn expect_semicolon<'i>(i: &mut Tokens<'i>) -> winnow::ModalResult<&'i Token> {
    cut_err(token(TokenKind::Semicolon))
        .context(StrContext::Label("statement"))
        .context(StrContext::Expected(StrContextValue::Description(
            "semicolon",
        )))
        .parse_next(i)
}

fn return_statement(i: &mut Tokens<'_>) -> winnow::ModalResult<Statement> {
    keyword(Keyword::Return).parse_next(i)?;
    let exp = cut_err(expression)
        .context(StrContext::Label("statement"))
        .context(StrContext::Expected(StrContextValue::Description(
            "expression",
        )))
        .parse_next(i)?;
    expect_semicolon(i)?;
    Ok(Statement::Return(exp))
}

fn if_statement(i: &mut Tokens<'_>) -> winnow::ModalResult<Statement> {
    keyword(Keyword::If).parse_next(i)?;
    let condition = paren_expression(i)?;
    let then = cut_err(statement)
        .context(StrContext::Label("if"))
        .context(StrContext::Expected(StrContextValue::Description(
            "statement",
        )))
        .parse_next(i)?;
    let else_ = opt(preceded(
        keyword(Keyword::Else),
        cut_err(statement)
            .context(StrContext::Label("else"))
            .context(StrContext::Expected(StrContextValue::Description(
                "statement",
            ))),
    ))
    .parse_next(i)?;
    Ok(Statement::If {
        condition,
        then: Box::new(then),
        else_: else_.map(Box::new),
    })
}

fn while_statement(i: &mut Tokens<'_>) -> winnow::ModalResult<Statement> {
    keyword(Keyword::While).parse_next(i)?;
    let condition = paren_expression(i)?;
    let body = cut_err(statement)
        .context(StrContext::Label("while"))
        .context(StrContext::Expected(StrContextValue::Description(
            "statement",
        )))
        .parse_next(i)?;
    Ok(Statement::While {
        condition,
        body: Box::new(body),
        loop_label: None,
    })
}

fn do_while_statement(i: &mut Tokens<'_>) -> winnow::ModalResult<Statement> {
    keyword(Keyword::Do).parse_next(i)?;
    let body = cut_err(statement)
        .context(StrContext::Label("do-while"))
        .context(StrContext::Expected(StrContextValue::Description(
            "statement",
        )))
        .parse_next(i)?;
    cut_err(keyword(Keyword::While))
        .context(StrContext::Label("do-while"))
        .context(StrContext::Expected(StrContextValue::Description(
            "keyword",
        )))
        .parse_next(i)?;
    let condition = paren_expression(i)?;
    expect_semicolon(i)?;
    Ok(Statement::DoWhile {
        body: Box::new(body),
        condition,
        loop_label: None,
    })
}

fn for_statement(i: &mut Tokens<'_>) -> winnow::ModalResult<Statement> {
    keyword(Keyword::For).parse_next(i)?;
    cut_err(token(TokenKind::OpenParen))
        .context(StrContext::Label("for"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("(")))
        .parse_next(i)?;
    let init = for_init(i)?;
    let condition = opt(expression).parse_next(i)?;
    expect_semicolon(i)?;
    let post = opt(expression).parse_next(i)?;
    cut_err(token(TokenKind::CloseParen))
        .context(StrContext::Label("for"))
        .context(StrContext::Expected(StrContextValue::StringLiteral(")")))
        .parse_next(i)?;
    let body = cut_err(statement)
        .context(StrContext::Label("for"))
        .context(StrContext::Expected(StrContextValue::Description(
            "statement",
        )))
        .parse_next(i)?;
    Ok(Statement::For {
        init,
        condition,
        post,
        body: Box::new(body),
        loop_label: None,
    })
}

/// `for_init` consumes its own `;`, either as part of the declaration or
/// after the optional initial expression.
fn for_init(i: &mut Tokens<'_>) -> winnow::ModalResult<ForInit> {
    if peek(opt(keyword(Keyword::Int))).parse_next(i)?.is_some() {
        declaration.map(ForInit::InitDecl).parse_next(i)
    } else {
        let init = opt(expression).parse_next(i)?;
        expect_semicolon(i)?;
        Ok(ForInit::InitExp(init))
    }
}

fn paren_expression(i: &mut Tokens<'_>) -> winnow::ModalResult<Expression> {
    cut_err(token(TokenKind::OpenParen))
        .context(StrContext::Label("condition"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("(")))
        .parse_next(i)?;
    let exp = cut_err(expression)
        .context(StrContext::Label("condition"))
        .context(StrContext::Expected(StrContextValue::Description(
            "expression",
        )))
        .parse_next(i)?;
    cut_err(token(TokenKind::CloseParen))
        .context(StrContext::Label("condition"))
        .context(StrContext::Expected(StrContextValue::StringLiteral(")")))
        .parse_next(i)?;
    Ok(exp)
}

const MIN_PRECEDENCE: usize = 0;

/// Precedence of the conditional and assignment operators; the branches of
/// `?:` and the right-hand side of `=` are parsed at assignment precedence,
/// which makes both right-associative.
const ASSIGNMENT_PRECEDENCE: usize = 1;

fn expression(i: &mut Tokens<'_>) -> winnow::ModalResult<Expression> {
    expression_with_precedence(i, MIN_PRECEDENCE)
}

/// Classical precedence climbing: fold in operators at or above `min_prec`,
/// recursing with a higher floor for left-associative operators.
fn expression_with_precedence(
    i: &mut Tokens<'_>,
    min_prec: usize,
) -> winnow::ModalResult<Expression> {
    let mut left = factor(i)?;

    loop {
        let Some(next) = peek(opt(any)).parse_next(i)? else {
            break;
        };
        let kind = next.kind.clone();
        if !kind.is_binary_operator() || kind.precedence() < min_prec {
            break;
        }
        any.parse_next(i)?;

        left = match kind {
            TokenKind::Assign => {
                let right = operand(i, ASSIGNMENT_PRECEDENCE)?;
                Expression::Assignment(Box::new(left), Box::new(right))
            }
            TokenKind::Question => {
                let then = operand(i, ASSIGNMENT_PRECEDENCE)?;
                cut_err(token(TokenKind::Colon))
                    .context(StrContext::Label("conditional"))
                    .context(StrContext::Expected(StrContextValue::StringLiteral(":")))
                    .parse_next(i)?;
                let else_ = operand(i, ASSIGNMENT_PRECEDENCE)?;
                Expression::Conditional(Box::new(left), Box::new(then), Box::new(else_))
            }
            _ => {
                let right = operand(i, kind.precedence() + 1)?;
                Expression::Binary(binary_operator(&kind), Box::new(left), Box::new(right))
            }
        };
    }

    Ok(left)
}

/// The right-hand side of an operator that has already been consumed; a
/// missing operand is a hard error.
fn operand(i: &mut Tokens<'_>, min_prec: usize) -> winnow::ModalResult<Expression> {
    cut_err(|i: &mut Tokens<'_>| expression_with_precedence(i, min_prec))
        .context(StrContext::Label("expression"))
        .context(StrContext::Expected(StrContextValue::Description(
            "expression",
        )))
        .parse_next(i)
}

fn binary_operator(kind: &TokenKind) -> BinaryOperator {
    match kind {
        TokenKind::Add => BinaryOperator::Add,
        TokenKind::Negation => BinaryOperator::Subtract,
        TokenKind::Multiply => BinaryOperator::Multiply,
        TokenKind::Divide => BinaryOperator::Divide,
        TokenKind::Remainder => BinaryOperator::Remainder,
        TokenKind::LogicalAnd => BinaryOperator::And,
        TokenKind::LogicalOr => BinaryOperator::Or,
        TokenKind::Equal => BinaryOperator::Equal,
        TokenKind::NotEqual => BinaryOperator::NotEqual,
        TokenKind::LessThan => BinaryOperator::LessThan,
        TokenKind::GreaterThan => BinaryOperator::GreaterThan,
        TokenKind::LessThanOrEqual => BinaryOperator::LessOrEqual,
        TokenKind::GreaterThanOrEqual => BinaryOperator::GreaterOrEqual,
        _ => panic!("Not a binary operator: {kind:?}"),
    }
}

fn factor(i: &mut Tokens<'_>) -> winnow::ModalResult<Expression> {
    let next = peek(any)
        .context(StrContext::Label("factor"))
        .context(StrContext::Expected(StrContextValue::Description(
            "expression",
        )))
        .parse_next(i)?;
    match &next.kind {
        TokenKind::Constant(c) => {
            any.parse_next(i)?;
            Ok(Expression::Constant(*c))
        }
        TokenKind::Identifier(id) => {
            let id = id.clone();
            any.parse_next(i)?;
            Ok(Expression::Var(id))
        }
        TokenKind::BitwiseComplement => unary(i, UnaryOperator::Complement),
        TokenKind::Negation => unary(i, UnaryOperator::Negate),
        TokenKind::LogicalNot => unary(i, UnaryOperator::Not),
        TokenKind::OpenParen => {
            any.parse_next(i)?;
            let exp = cut_err(expression)
                .context(StrContext::Label("factor"))
                .context(StrContext::Expected(StrContextValue::Description(
                    "expression",
                )))
                .parse_next(i)?;
            cut_err(token(TokenKind::CloseParen))
                .context(StrContext::Label("factor"))
                .context(StrContext::Expected(StrContextValue::StringLiteral(")")))
                .parse_next(i)?;
            Ok(exp)
        }
        _ => winnow::combinator::fail
            .context(StrContext::Label("factor"))
            .context(StrContext::Expected(StrContextValue::Description(
                "expression",
            )))
            .parse_next(i),
    }
}

/// A unary operator applies to a factor, so `-a * b` parses as `(-a) * b`.
fn unary(i: &mut Tokens<'_>, op: UnaryOperator) -> winnow::ModalResult<Expression> {
    any.parse_next(i)?;
    let inner = cut_err(factor)
        .context(StrContext::Label("unary"))
        .context(StrContext::Expected(StrContextValue::Description(
            "expression",
        )))
        .parse_next(i)?;
    Ok(Expression::Unary(op, Box::new(inner)))
}

fn identifier(i: &mut Tokens<'_>) -> winnow::ModalResult<Identifier> {
    any.verify_map(|t: &Token| match &t.kind {
        TokenKind::Identifier(id) => Some(id.clone()),
        _ => None,
    })
    .parse_next(i)
}
