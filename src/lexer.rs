use thiserror::Error;
use winnow::LocatingSlice;
use winnow::ascii::{digit1, multispace1, till_line_ending};
use winnow::combinator::{alt, cut_err, not, preceded, repeat, terminated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::AsChar;
use winnow::token::{one_of, take_until, take_while};

pub(crate) type Constant = i32;
pub(crate) type Identifier = String;

#[derive(Debug, PartialEq, Error)]
#[error("{message}")]
pub struct LexerError {
    pub message: String,
    /// Byte offset of the first character that could not be tokenised.
    pub offset: usize,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) span: std::ops::Range<usize>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum TokenKind {
    Keyword(Keyword),
    Identifier(Identifier),
    Constant(Constant),
    OpenParen,          // (
    CloseParen,         // )
    OpenBrace,          // {
    CloseBrace,         // }
    Semicolon,          // ;
    BitwiseComplement,  // ~
    Negation,           // -
    Decrement,          // --
    Add,                // +
    Multiply,           // *
    Divide,             // /
    Remainder,          // %
    LogicalNot,         // !
    LogicalAnd,         // &&
    LogicalOr,          // ||
    Equal,              // ==
    NotEqual,           // !=
    LessThan,           // <
    GreaterThan,        // >
    LessThanOrEqual,    // <=
    GreaterThanOrEqual, // >=
    Assign,             // =
    Question,           // ?
    Colon,              // :
}

impl TokenKind {
    /// True for every token the precedence climber may fold, including the
    /// assignment and conditional operators.
    pub(crate) fn is_binary_operator(&self) -> bool {
        matches!(
            self,
            TokenKind::Add
                | TokenKind::Negation
                | TokenKind::Multiply
                | TokenKind::Divide
                | TokenKind::Remainder
                | TokenKind::LogicalAnd
                | TokenKind::LogicalOr
                | TokenKind::Equal
                | TokenKind::NotEqual
                | TokenKind::LessThan
                | TokenKind::GreaterThan
                | TokenKind::LessThanOrEqual
                | TokenKind::GreaterThanOrEqual
                | TokenKind::Assign
                | TokenKind::Question
        )
    }

    pub(crate) fn precedence(&self) -> usize {
        match self {
            TokenKind::Multiply => 50,
            TokenKind::Divide => 50,
            TokenKind::Remainder => 50,
            TokenKind::Add => 45,
            TokenKind::Negation => 45,
            TokenKind::LessThan => 35,
            TokenKind::GreaterThan => 35,
            TokenKind::LessThanOrEqual => 35,
            TokenKind::GreaterThanOrEqual => 35,
            TokenKind::Equal => 30,
            TokenKind::NotEqual => 30,
            TokenKind::LogicalAnd => 10,
            TokenKind::LogicalOr => 5,
            TokenKind::Question => 3,
            TokenKind::Assign => 1,

            _ => panic!("Not a binary operator: {self:?}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) enum Keyword {
    Int,
    Void,
    Return,
    If,
    Else,
    Do,
    While,
    For,
    Break,
    Continue,
}

pub(crate) fn lex(input: &str) -> Result<Vec<Token>, LexerError> {
    let input = LocatingInput::new(input);
    tokens.parse(input).map_err(|e| LexerError {
        offset: e.offset(),
        message: e.to_string(),
    })
}

type LocatingInput<'a> = LocatingSlice<&'a str>;

fn tokens(input: &mut LocatingInput<'_>) -> winnow::ModalResult<Vec<Token>> {
    let tokens = repeat(0.., token).parse_next(input)?;
    trivia0.parse_next(input)?;
    Ok(tokens)
}

fn token(input: &mut LocatingInput<'_>) -> winnow::ModalResult<Token> {
    preceded(trivia0, alt((identifier, constant, operator))).parse_next(input)
}

/// Whitespace, comments and `#`-prefixed preprocessor leftovers are all
/// skipped between tokens. `/*` without a closing `*/` is a hard error.
fn trivia0(input: &mut LocatingInput<'_>) -> winnow::ModalResult<()> {
    repeat(
        0..,
        alt((
            multispace1.void(),
            line_comment,
            block_comment,
            hash_line,
        )),
    )
    .parse_next(input)
}

fn line_comment(input: &mut LocatingInput<'_>) -> winnow::ModalResult<()> {
    ("//", till_line_ending).void().parse_next(input)
}

fn block_comment(input: &mut LocatingInput<'_>) -> winnow::ModalResult<()> {
    preceded(
        "/*",
        cut_err(terminated(take_until(0.., "*/"), "*/"))
            .context(StrContext::Label("comment"))
            .context(StrContext::Expected(StrContextValue::StringLiteral("*/"))),
    )
    .void()
    .parse_next(input)
}

fn hash_line(input: &mut LocatingInput<'_>) -> winnow::ModalResult<()> {
    ('#', till_line_ending).void().parse_next(input)
}

/// A run of digits not followed by an identifier character. `123abc` matches
/// no token at all and surfaces as a lexical error at the digit.
fn constant(input: &mut LocatingInput<'_>) -> winnow::ModalResult<Token> {
    terminated(
        digit1,
        not(one_of(|c: char| c.is_alphanum() || c == '_')), // \b
    )
    .parse_to::<Constant>()
    .with_span()
    .map(|(value, span)| Token {
        kind: TokenKind::Constant(value),
        span,
    })
    .parse_next(input)
}

fn identifier(input: &mut LocatingInput<'_>) -> winnow::ModalResult<Token> {
    let (lexeme, span) = (
        take_while(1, |c: char| c.is_alpha() || c == '_'),
        take_while(0.., |c: char| c.is_alphanum() || c == '_'),
    )
        .take()
        .with_span()
        .parse_next(input)?;

    let kind = match lexeme {
        "int" => TokenKind::Keyword(Keyword::Int),
        "void" => TokenKind::Keyword(Keyword::Void),
        "return" => TokenKind::Keyword(Keyword::Return),
        "if" => TokenKind::Keyword(Keyword::If),
        "else" => TokenKind::Keyword(Keyword::Else),
        "do" => TokenKind::Keyword(Keyword::Do),
        "while" => TokenKind::Keyword(Keyword::While),
        "for" => TokenKind::Keyword(Keyword::For),
        "break" => TokenKind::Keyword(Keyword::Break),
        "continue" => TokenKind::Keyword(Keyword::Continue),
        _ => TokenKind::Identifier(lexeme.to_string()),
    };

    Ok(Token { kind, span })
}

fn operator(input: &mut LocatingInput<'_>) -> winnow::ModalResult<Token> {
    alt((
        // multi-character operators before their single-character prefixes
        alt((
            "--".value(TokenKind::Decrement),
            "&&".value(TokenKind::LogicalAnd),
            "||".value(TokenKind::LogicalOr),
            "==".value(TokenKind::Equal),
            "!=".value(TokenKind::NotEqual),
            "<=".value(TokenKind::LessThanOrEqual),
            ">=".value(TokenKind::GreaterThanOrEqual),
        )),
        alt((
            '('.value(TokenKind::OpenParen),
            ')'.value(TokenKind::CloseParen),
            '{'.value(TokenKind::OpenBrace),
            '}'.value(TokenKind::CloseBrace),
            ';'.value(TokenKind::Semicolon),
            '~'.value(TokenKind::BitwiseComplement),
            '-'.value(TokenKind::Negation),
            '+'.value(TokenKind::Add),
            '*'.value(TokenKind::Multiply),
            '/'.value(TokenKind::Divide),
            '%'.value(TokenKind::Remainder),
            '!'.value(TokenKind::LogicalNot),
            '<'.value(TokenKind::LessThan),
            '>'.value(TokenKind::GreaterThan),
            '='.value(TokenKind::Assign),
            '?'.value(TokenKind::Question),
            ':'.value(TokenKind::Colon),
        )),
    ))
    .with_span()
    .map(|(kind, span)| Token { kind, span })
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_lex() {
        assert_eq!(
            lex("123"),
            Ok(vec![Token {
                kind: TokenKind::Constant(123),
                span: 0..3
            }])
        );
        assert_eq!(
            lex("  123 \n  456 "),
            Ok(vec![
                Token {
                    kind: TokenKind::Constant(123),
                    span: 2..5
                },
                Token {
                    kind: TokenKind::Constant(456),
                    span: 9..12
                }
            ])
        );
        assert_eq!(
            lex("(123)"),
            Ok(vec![
                Token {
                    kind: TokenKind::OpenParen,
                    span: 0..1
                },
                Token {
                    kind: TokenKind::Constant(123),
                    span: 1..4
                },
                Token {
                    kind: TokenKind::CloseParen,
                    span: 4..5
                }
            ])
        );
        assert_eq!(
            lex("main(void)"),
            Ok(vec![
                Token {
                    kind: TokenKind::Identifier("main".to_string()),
                    span: 0..4
                },
                Token {
                    kind: TokenKind::OpenParen,
                    span: 4..5
                },
                Token {
                    kind: TokenKind::Keyword(Keyword::Void),
                    span: 5..9
                },
                Token {
                    kind: TokenKind::CloseParen,
                    span: 9..10
                },
            ])
        );
    }

    #[test]
    fn test_lex_keywords() {
        assert_eq!(
            kinds("int void return if else do while for break continue"),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Keyword(Keyword::Void),
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Keyword(Keyword::If),
                TokenKind::Keyword(Keyword::Else),
                TokenKind::Keyword(Keyword::Do),
                TokenKind::Keyword(Keyword::While),
                TokenKind::Keyword(Keyword::For),
                TokenKind::Keyword(Keyword::Break),
                TokenKind::Keyword(Keyword::Continue),
            ]
        );
    }

    #[test]
    fn test_lex_identifier() {
        assert_eq!(
            kinds("a _ a1 _1 a_ whiles"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Identifier("_".into()),
                TokenKind::Identifier("a1".into()),
                TokenKind::Identifier("_1".into()),
                TokenKind::Identifier("a_".into()),
                // keyword prefix does not make a keyword
                TokenKind::Identifier("whiles".into()),
            ]
        );
    }

    #[test]
    fn test_lex_operators() {
        assert_eq!(
            kinds("~ - -- + * / % ! = ? :"),
            vec![
                TokenKind::BitwiseComplement,
                TokenKind::Negation,
                TokenKind::Decrement,
                TokenKind::Add,
                TokenKind::Multiply,
                TokenKind::Divide,
                TokenKind::Remainder,
                TokenKind::LogicalNot,
                TokenKind::Assign,
                TokenKind::Question,
                TokenKind::Colon,
            ]
        );
        assert_eq!(
            kinds("&& || == != < <= > >="),
            vec![
                TokenKind::LogicalAnd,
                TokenKind::LogicalOr,
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessThan,
                TokenKind::LessThanOrEqual,
                TokenKind::GreaterThan,
                TokenKind::GreaterThanOrEqual,
            ]
        );
    }

    #[test]
    fn test_lex_longest_match() {
        // `--` must not lex as two negations, `<=` not as `<` `=`
        assert_eq!(
            kinds("a--b<=c==d"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Decrement,
                TokenKind::Identifier("b".into()),
                TokenKind::LessThanOrEqual,
                TokenKind::Identifier("c".into()),
                TokenKind::Equal,
                TokenKind::Identifier("d".into()),
            ]
        );
    }

    #[test]
    fn test_lex_comments() {
        let input = "1 // a line comment\n2 /* a\nblock\ncomment */ 3";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Constant(1),
                TokenKind::Constant(2),
                TokenKind::Constant(3),
            ]
        );
    }

    #[test]
    fn test_lex_hash_lines_skipped() {
        let input = "#include <stdio.h>\n# 1 \"main.c\"\nint";
        assert_eq!(kinds(input), vec![TokenKind::Keyword(Keyword::Int)]);
    }

    #[test]
    fn test_lex_unterminated_comment() {
        let err = lex("1 /* no close").unwrap_err();
        // reported at the start of the unterminated comment body
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn test_lex_word_boundary_error() {
        // A constant must end at a word boundary: `123;` and `123(` are
        // fine, `123abc` and `123_bc` are lexical errors at the digits.
        assert!(lex("123;abc").is_ok());
        assert!(lex("123(").is_ok());

        assert_eq!(lex("123abc").unwrap_err().offset, 0);
        assert_eq!(lex("return 123_bc;").unwrap_err().offset, 7);
    }

    #[test]
    fn test_lex_unrecognised_character() {
        let err = lex("int main(void) { return 1 @ 2; }").unwrap_err();
        assert_eq!(err.offset, 26);
    }

    #[test]
    fn test_basic_program() {
        let input = "\nint main(void) {\n    return 0;\n}\n";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Identifier("main".to_string()),
                TokenKind::OpenParen,
                TokenKind::Keyword(Keyword::Void),
                TokenKind::CloseParen,
                TokenKind::OpenBrace,
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Constant(0),
                TokenKind::Semicolon,
                TokenKind::CloseBrace,
            ]
        );
    }
}
