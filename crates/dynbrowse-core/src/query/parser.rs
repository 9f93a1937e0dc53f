//! Lexer and recursive-descent parser for query expressions.
//!
//! Keywords are matched case-insensitively. Precedence, lowest first:
//! `or`, `and`, `not`, comparisons and `is`, `+`/`-`, unary `-`, primaries
//! (literals, name paths, calls, parenthesized groups).

use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use bigdecimal::BigDecimal;

use super::ast::{
    ArithOp, BinaryOp, CompareOp, Expr, Literal, LogicalOp, NamePath, PathElement, UnaryOp,
};
use crate::error::QueryError;

// ---------------------------------------------------------------------------
// Token type
// ---------------------------------------------------------------------------

/// Lexer token.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// An identifier (attribute or function name).
    Identifier(String),
    /// A double-quoted string, unescaped.
    Str(String),
    /// A numeric literal as written.
    Number(String),
    /// `=`
    Eq,
    /// `<>` or `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `^=`
    BeginsWith,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    // Keywords
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `is`
    Is,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// End of input.
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => write!(f, "identifier '{s}'"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Number(n) => write!(f, "number {n}"),
            Self::Eq => write!(f, "'='"),
            Self::Ne => write!(f, "'<>'"),
            Self::Lt => write!(f, "'<'"),
            Self::Le => write!(f, "'<='"),
            Self::Gt => write!(f, "'>'"),
            Self::Ge => write!(f, "'>='"),
            Self::BeginsWith => write!(f, "'^='"),
            Self::Plus => write!(f, "'+'"),
            Self::Minus => write!(f, "'-'"),
            Self::Dot => write!(f, "'.'"),
            Self::Comma => write!(f, "','"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::LBracket => write!(f, "'['"),
            Self::RBracket => write!(f, "']'"),
            Self::And => write!(f, "'and'"),
            Self::Or => write!(f, "'or'"),
            Self::Not => write!(f, "'not'"),
            Self::Is => write!(f, "'is'"),
            Self::True => write!(f, "'true'"),
            Self::False => write!(f, "'false'"),
            Self::Null => write!(f, "'null'"),
            Self::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with the character offset it starts at.
#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    pos: usize,
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

/// Tokenizer for expression strings.
struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            pos: 0,
        }
    }

    /// Tokenize the entire input into a vector of tokens.
    fn tokenize(&mut self) -> Result<Vec<Spanned>, QueryError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let pos = self.pos;
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(Spanned { token, pos });
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    fn unexpected(&self, found: impl Into<String>, expected: &str) -> QueryError {
        QueryError::Syntax {
            position: self.pos,
            found: found.into(),
            expected: expected.to_owned(),
        }
    }

    fn next_token(&mut self) -> Result<Token, QueryError> {
        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        let single = match ch {
            '=' => Some(Token::Eq),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            _ => None,
        };
        if let Some(token) = single {
            self.bump();
            return Ok(token);
        }

        match ch {
            '<' => {
                self.bump();
                Ok(if self.bump_if('=') {
                    Token::Le
                } else if self.bump_if('>') {
                    Token::Ne
                } else {
                    Token::Lt
                })
            }
            '>' => {
                self.bump();
                Ok(if self.bump_if('=') { Token::Ge } else { Token::Gt })
            }
            '!' | '^' => {
                self.bump();
                if self.bump_if('=') {
                    Ok(if ch == '!' { Token::Ne } else { Token::BeginsWith })
                } else {
                    Err(self.unexpected(format!("'{ch}'"), "'='"))
                }
            }
            '"' => self.read_string(),
            c if c.is_ascii_digit() => Ok(self.read_number()),
            c if is_ident_start(c) => Ok(self.read_identifier_or_keyword()),
            _ => Err(self.unexpected(format!("'{ch}'"), "valid token")),
        }
    }

    fn read_string(&mut self) -> Result<Token, QueryError> {
        self.bump(); // consume opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.unexpected("end of input", "closing '\"'")),
                Some('"') => return Ok(Token::Str(s)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c @ ('"' | '\\')) => s.push(c),
                    Some(c) => return Err(self.unexpected(format!("'\\{c}'"), "escape sequence")),
                    None => return Err(self.unexpected("end of input", "escape sequence")),
                },
                Some(c) => s.push(c),
            }
        }
    }

    fn read_digits(&mut self, s: &mut String) {
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let mut s = String::new();
        self.read_digits(&mut s);

        // A '.' is only part of the number when digits follow it, so that
        // `a[0].b` still lexes the dot as a path separator.
        if self.chars.peek() == Some(&'.') {
            let mut ahead = self.chars.clone();
            ahead.next();
            if ahead.peek().is_some_and(char::is_ascii_digit) {
                self.bump();
                s.push('.');
                self.read_digits(&mut s);
            }
        }

        if matches!(self.chars.peek(), Some('e' | 'E')) {
            let mut ahead = self.chars.clone();
            ahead.next();
            let signed = matches!(ahead.peek(), Some('+' | '-'));
            if signed {
                ahead.next();
            }
            if ahead.peek().is_some_and(char::is_ascii_digit) {
                s.push('E');
                self.bump();
                if signed {
                    if let Some(sign) = self.bump() {
                        s.push(sign);
                    }
                }
                self.read_digits(&mut s);
            }
        }

        Token::Number(s)
    }

    fn read_identifier_or_keyword(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_ident_continue(c) {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match ident.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "is" => Token::Is,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Identifier(ident),
        }
    }
}

/// Returns `true` if `c` can start an identifier.
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Returns `true` if `c` can continue an identifier.
fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Recursive-descent parser over a token vector ending in `Eof`.
struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map_or(&Token::Eof, |s| &s.token)
    }

    fn current_pos(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |s| s.pos)
    }

    fn advance(&mut self) -> Token {
        let tok = self
            .tokens
            .get(self.pos)
            .map_or(Token::Eof, |s| s.token.clone());
        self.pos += 1;
        tok
    }

    fn error(&self, expected: &str) -> QueryError {
        QueryError::Syntax {
            position: self.current_pos(),
            found: self.peek().to_string(),
            expected: expected.to_owned(),
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Token, QueryError> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(expected) {
            Ok(self.advance())
        } else {
            Err(self.error(&expected.to_string()))
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }
}

impl Parser {
    /// Parse a full expression (`or` is lowest precedence).
    fn parse_or_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_and_expr()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = binary(BinaryOp::Logical(LogicalOp::Or), left, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_not_expr()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            let right = self.parse_not_expr()?;
            left = binary(BinaryOp::Logical(LogicalOp::And), left, right);
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr, QueryError> {
        if matches!(self.peek(), Token::Not) {
            self.advance();
            let operand = self.parse_not_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_compare_expr()
    }

    /// Comparisons and `is` do not chain: `a = b = c` is a syntax error.
    fn parse_compare_expr(&mut self) -> Result<Expr, QueryError> {
        let left = self.parse_additive_expr()?;

        if matches!(self.peek(), Token::Is) {
            self.advance();
            let negated = matches!(self.peek(), Token::Not);
            if negated {
                self.advance();
            }
            let type_name = self.parse_additive_expr()?;
            return Ok(Expr::Is {
                operand: Box::new(left),
                negated,
                type_name: Box::new(type_name),
            });
        }

        let op = match self.peek() {
            Token::Eq => CompareOp::Eq,
            Token::Ne => CompareOp::Ne,
            Token::Lt => CompareOp::Lt,
            Token::Le => CompareOp::Le,
            Token::Gt => CompareOp::Gt,
            Token::Ge => CompareOp::Ge,
            Token::BeginsWith => CompareOp::BeginsWith,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive_expr()?;
        Ok(binary(BinaryOp::Compare(op), left, right))
    }

    fn parse_additive_expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary_expr()?;
            left = binary(BinaryOp::Arith(op), left, right);
        }
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, QueryError> {
        if matches!(self.peek(), Token::Minus) {
            self.advance();
            let operand = self.parse_unary_expr()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, QueryError> {
        let pos = self.current_pos();
        match self.peek().clone() {
            Token::LParen => {
                self.advance();
                let expr = self.parse_or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s)))
            }
            Token::Number(n) => {
                self.advance();
                parse_number_literal(&n, pos).map(Expr::Literal)
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            Token::Identifier(name) => {
                if matches!(self.peek_at(1), Token::LParen) {
                    self.parse_call(name)
                } else {
                    self.parse_name_path().map(Expr::Name)
                }
            }
            _ => Err(self.error("expression")),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, QueryError> {
        self.advance(); // name
        self.advance(); // '('
        let mut args = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            args.push(self.parse_or_expr()?);
            while matches!(self.peek(), Token::Comma) {
                self.advance();
                args.push(self.parse_or_expr()?);
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Expr::Call { name, args })
    }

    /// Parse `name`, `name.field`, `name[0]`, `name["key"]` and chains of them.
    fn parse_name_path(&mut self) -> Result<NamePath, QueryError> {
        let Token::Identifier(root) = self.advance() else {
            return Err(self.error("attribute name"));
        };
        let mut elements = vec![PathElement::Attribute(root)];

        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    match self.peek().clone() {
                        Token::Identifier(field) => {
                            self.advance();
                            elements.push(PathElement::Attribute(field));
                        }
                        _ => return Err(self.error("attribute name after '.'")),
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let element = match self.peek().clone() {
                        Token::Number(n) => {
                            let idx = n.parse::<usize>().map_err(|_| self.error("list index"))?;
                            PathElement::Index(idx)
                        }
                        Token::Str(key) => PathElement::Attribute(key),
                        _ => return Err(self.error("list index or quoted key")),
                    };
                    self.advance();
                    self.expect(&Token::RBracket)?;
                    elements.push(element);
                }
                _ => return Ok(NamePath { elements }),
            }
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn parse_number_literal(text: &str, position: usize) -> Result<Literal, QueryError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Literal::Int(n));
    }
    BigDecimal::from_str(text)
        .map(Literal::Decimal)
        .map_err(|_| QueryError::Syntax {
            position,
            found: format!("number {text}"),
            expected: "valid number".to_owned(),
        })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse expression text into an AST.
///
/// # Errors
///
/// Returns [`QueryError::Syntax`] with the position and offending token when
/// the text is not a single well-formed expression.
pub fn parse(input: &str) -> Result<Expr, QueryError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_or_expr()?;
    if !parser.at_end() {
        return Err(parser.error("end of input"));
    }
    Ok(expr)
}
