//! AST types for query expressions.
//!
//! The AST is produced by the parser and consumed by IR lowering. Every node
//! renders back to expression text through [`fmt::Display`], inserting only
//! the parentheses precedence requires, so render-then-parse reproduces the
//! same tree.

use std::fmt;

use bigdecimal::BigDecimal;

/// Expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Literal),
    /// A reference to an attribute of the row.
    Name(NamePath),
    /// A prefix operator: `not x` or `-x`.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// An infix operator: logical, comparison or additive.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left-hand side.
        left: Box<Expr>,
        /// Right-hand side.
        right: Box<Expr>,
    },
    /// Type test: `x is "S"` / `x is not "ANY"`.
    Is {
        /// The tested operand.
        operand: Box<Expr>,
        /// `true` for `is not`.
        negated: bool,
        /// The type name expression.
        type_name: Box<Expr>,
    },
    /// Function call: `name(args...)`.
    Call {
        /// Function name as written.
        name: String,
        /// Arguments in order.
        args: Vec<Expr>,
    },
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// A double-quoted string.
    String(String),
    /// An integer that fits in `i64`.
    Int(i64),
    /// Any other number.
    Decimal(BigDecimal),
    /// `true` / `false`.
    Bool(bool),
    /// `null`.
    Null,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Numeric negation.
    Neg,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equal (`=`).
    Eq,
    /// Not equal (`<>`).
    Ne,
    /// Less than (`<`).
    Lt,
    /// Less than or equal (`<=`).
    Le,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal (`>=`).
    Ge,
    /// Begins with (`^=`).
    BeginsWith,
}

impl CompareOp {
    /// The operator to use when the operands are swapped, if one exists.
    ///
    /// `a < b` is `b > a`; `^=` has no mirror.
    #[must_use]
    pub fn reversed(self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::Eq),
            Self::Ne => Some(Self::Ne),
            Self::Lt => Some(Self::Gt),
            Self::Le => Some(Self::Ge),
            Self::Gt => Some(Self::Lt),
            Self::Ge => Some(Self::Le),
            Self::BeginsWith => None,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "<>"),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::BeginsWith => write!(f, "^="),
        }
    }
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

/// Additive operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "+"),
            Self::Sub => write!(f, "-"),
        }
    }
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `and` / `or`
    Logical(LogicalOp),
    /// `=`, `<>`, `<`, `<=`, `>`, `>=`, `^=`
    Compare(CompareOp),
    /// `+` / `-`
    Arith(ArithOp),
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical(op) => write!(f, "{op}"),
            Self::Compare(op) => write!(f, "{op}"),
            Self::Arith(op) => write!(f, "{op}"),
        }
    }
}

/// A path into the row: a root attribute followed by map keys and list
/// indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePath {
    /// The path elements in order. The first is always an attribute.
    pub elements: Vec<PathElement>,
}

impl NamePath {
    /// A single-attribute path.
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            elements: vec![PathElement::Attribute(name.into())],
        }
    }

    /// The root attribute name.
    #[must_use]
    pub fn root(&self) -> &str {
        match self.elements.first() {
            Some(PathElement::Attribute(name)) => name,
            _ => "",
        }
    }

    /// Returns the attribute name if the path has no map keys or indexes.
    #[must_use]
    pub fn as_single_attribute(&self) -> Option<&str> {
        match self.elements.as_slice() {
            [PathElement::Attribute(name)] => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, elem) in self.elements.iter().enumerate() {
            match elem {
                PathElement::Attribute(name) if is_plain_identifier(name) => {
                    if i > 0 {
                        write!(f, ".{name}")?;
                    } else {
                        write!(f, "{name}")?;
                    }
                }
                PathElement::Attribute(name) => write!(f, "[{}]", quote(name))?,
                PathElement::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// A single element of a [`NamePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// A root attribute or map key.
    Attribute(String),
    /// A list index.
    Index(usize),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(&quote(s)),
            Self::Int(n) => write!(f, "{n}"),
            Self::Decimal(d) => write_decimal(f, d),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
        }
    }
}

/// Writes a decimal so that it lexes back as a decimal: text that would read
/// as an `i64` (`2e3` prints as `2000`) is written as digits and exponent.
fn write_decimal(f: &mut fmt::Formatter<'_>, d: &BigDecimal) -> fmt::Result {
    let text = d.to_string();
    if text.contains(['.', 'e', 'E']) || text.parse::<i64>().is_err() {
        return f.write_str(&text);
    }
    let (digits, scale) = d.as_bigint_and_exponent();
    write!(f, "{digits}E{}", -i128::from(scale))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_NOT: u8 = 3;
const PREC_COMPARE: u8 = 4;
const PREC_ADDITIVE: u8 = 5;
const PREC_NEG: u8 = 6;
const PREC_PRIMARY: u8 = 7;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Self::Binary {
                op: BinaryOp::Logical(LogicalOp::Or),
                ..
            } => PREC_OR,
            Self::Binary {
                op: BinaryOp::Logical(LogicalOp::And),
                ..
            } => PREC_AND,
            Self::Unary {
                op: UnaryOp::Not, ..
            } => PREC_NOT,
            Self::Binary {
                op: BinaryOp::Compare(_),
                ..
            }
            | Self::Is { .. } => PREC_COMPARE,
            Self::Binary {
                op: BinaryOp::Arith(_),
                ..
            } => PREC_ADDITIVE,
            Self::Unary {
                op: UnaryOp::Neg, ..
            } => PREC_NEG,
            Self::Literal(_) | Self::Name(_) | Self::Call { .. } => PREC_PRIMARY,
        }
    }

    /// Writes `self`, parenthesized when its precedence is below `min`.
    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Name(path) => write!(f, "{path}"),
            Self::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    f.write_str("not ")?;
                    operand.fmt_operand(f, PREC_NOT)
                }
                UnaryOp::Neg => {
                    f.write_str("-")?;
                    operand.fmt_operand(f, PREC_NEG)
                }
            },
            Self::Binary { op, left, right } => {
                let prec = self.precedence();
                // Comparisons do not chain, so a comparison operand on the
                // left needs parentheses too.
                let left_min = if prec == PREC_COMPARE { prec + 1 } else { prec };
                left.fmt_operand(f, left_min)?;
                write!(f, " {op} ")?;
                right.fmt_operand(f, prec + 1)
            }
            Self::Is {
                operand,
                negated,
                type_name,
            } => {
                operand.fmt_operand(f, PREC_ADDITIVE)?;
                f.write_str(if *negated { " is not " } else { " is " })?;
                type_name.fmt_operand(f, PREC_ADDITIVE)
            }
        }
    }
}

/// Keywords that cannot be written as bare attribute names.
pub(crate) const KEYWORDS: &[&str] = &["and", "or", "not", "is", "true", "false", "null"];

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&name.to_ascii_lowercase().as_str())
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
