//! Intermediate representation and AST lowering.
//!
//! Lowering validates what the grammar cannot (the shape of `is` tests,
//! function names), folds negations that have a direct form, puts key
//! comparisons in `name op literal` orientation and tags the comparisons the
//! planner may turn into key conditions.

use std::fmt;

use dynbrowse_model::TableSchema;

use super::ast::{ArithOp, BinaryOp, CompareOp, Expr, Literal, LogicalOp, NamePath, UnaryOp};
use super::builtins::{self, BuiltinFn};
use super::value::{self, ExprValue};
use crate::error::QueryError;

/// A lowered expression node.
#[derive(Debug, Clone)]
pub enum Ir {
    /// A constant.
    Value(ExprValue),
    /// A reference into the row.
    Name(NamePath),
    /// A comparison.
    Compare(CompareAtom),
    /// Conjunction, evaluated left to right with short-circuit.
    And(Box<Ir>, Box<Ir>),
    /// Disjunction, evaluated left to right with short-circuit.
    Or(Box<Ir>, Box<Ir>),
    /// Negation.
    Not(Box<Ir>),
    /// A type or existence test.
    Is(IsAtom),
    /// Addition or subtraction.
    Arith {
        /// The operator.
        op: ArithOp,
        /// Left operand.
        left: Box<Ir>,
        /// Right operand.
        right: Box<Ir>,
    },
    /// Numeric negation of a non-constant.
    Neg(Box<Ir>),
    /// A built-in call.
    Call(CallAtom),
}

/// `left op right`.
#[derive(Debug, Clone)]
pub struct CompareAtom {
    /// The operator.
    pub op: CompareOp,
    /// Left operand; the attribute side for key candidates.
    pub left: Box<Ir>,
    /// Right operand; the literal side for key candidates.
    pub right: Box<Ir>,
    /// `true` when the left side names a key attribute of some index and the
    /// right side is a literal.
    pub key_candidate: bool,
}

impl CompareAtom {
    /// The key attribute and literal of a key candidate.
    #[must_use]
    pub fn key_term(&self) -> Option<(&str, &ExprValue)> {
        if !self.key_candidate {
            return None;
        }
        match (self.left.as_ref(), self.right.as_ref()) {
            (Ir::Name(path), Ir::Value(v)) => path.as_single_attribute().map(|name| (name, v)),
            _ => None,
        }
    }
}

/// The type named on the right of `is`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsType {
    /// `"ANY"`: the attribute exists.
    Any,
    /// A store type descriptor.
    Type(&'static str),
}

const IS_TYPE_NAMES: &[&str] = &["B", "BOOL", "S", "N", "NULL", "L", "M", "BS", "NS", "SS"];

impl IsType {
    /// Resolves a type name case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        if upper == "ANY" {
            return Some(Self::Any);
        }
        IS_TYPE_NAMES
            .iter()
            .find(|t| **t == upper)
            .map(|t| Self::Type(t))
    }
}

impl fmt::Display for IsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ANY"),
            Self::Type(t) => f.write_str(t),
        }
    }
}

/// `path is [not] TYPE`.
///
/// Only the `ANY` test carries its own negation; negated type tests are
/// lowered to `Not(Is(..))`.
#[derive(Debug, Clone)]
pub struct IsAtom {
    /// The tested attribute.
    pub path: NamePath,
    /// The expected type.
    pub type_name: IsType,
    /// `true` for `is not "ANY"`.
    pub negated: bool,
}

/// A resolved built-in call.
#[derive(Debug, Clone)]
pub struct CallAtom {
    /// The function name.
    pub name: String,
    /// The function.
    pub func: BuiltinFn,
    /// Lowered arguments.
    pub args: Vec<Ir>,
}

impl Ir {
    /// Returns `true` if evaluation does not read the row.
    #[must_use]
    pub fn is_row_independent(&self) -> bool {
        match self {
            Self::Value(_) => true,
            Self::Name(_) | Self::Is(_) => false,
            Self::Compare(atom) => atom.left.is_row_independent() && atom.right.is_row_independent(),
            Self::And(l, r) | Self::Or(l, r) => l.is_row_independent() && r.is_row_independent(),
            Self::Arith { left, right, .. } => {
                left.is_row_independent() && right.is_row_independent()
            }
            Self::Not(inner) | Self::Neg(inner) => inner.is_row_independent(),
            Self::Call(call) => call.args.iter().all(Self::is_row_independent),
        }
    }

    /// Splits a tree of `and` nodes into its conjuncts, left to right.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<&Ir> {
        match self {
            Self::And(l, r) => {
                let mut terms = l.conjuncts();
                terms.extend(r.conjuncts());
                terms
            }
            other => vec![other],
        }
    }

    /// Joins terms with `and`, left-nested. `None` when there are no terms.
    #[must_use]
    pub fn conjunction(terms: Vec<Ir>) -> Option<Ir> {
        terms
            .into_iter()
            .reduce(|acc, term| Self::And(Box::new(acc), Box::new(term)))
    }
}

// ---------------------------------------------------------------------------
// Lowering
// ---------------------------------------------------------------------------

/// Lowers an AST against a table schema.
///
/// # Errors
///
/// Fails on malformed `is` tests and unknown function names.
pub fn lower(expr: &Expr, schema: &TableSchema) -> Result<Ir, QueryError> {
    match expr {
        Expr::Literal(lit) => Ok(Ir::Value(literal_value(lit))),
        Expr::Name(path) => Ok(Ir::Name(path.clone())),
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => Ok(match lower(operand, schema)? {
            Ir::Is(
                mut atom @ IsAtom {
                    type_name: IsType::Any,
                    ..
                },
            ) => {
                atom.negated = !atom.negated;
                Ir::Is(atom)
            }
            other => Ir::Not(Box::new(other)),
        }),
        Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => Ok(match lower(operand, schema)? {
            Ir::Value(v) if v.as_number_like().is_some() => Ir::Value(value::negate(&v)?),
            other => Ir::Neg(Box::new(other)),
        }),
        Expr::Binary { op, left, right } => {
            let left = lower(left, schema)?;
            let right = lower(right, schema)?;
            Ok(match op {
                BinaryOp::Logical(LogicalOp::And) => Ir::And(Box::new(left), Box::new(right)),
                BinaryOp::Logical(LogicalOp::Or) => Ir::Or(Box::new(left), Box::new(right)),
                BinaryOp::Compare(op) => lower_compare(*op, left, right, schema),
                BinaryOp::Arith(op) => Ir::Arith {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            })
        }
        Expr::Is {
            operand,
            negated,
            type_name,
        } => lower_is(operand, *negated, type_name, schema),
        Expr::Call { name, args } => {
            let func = builtins::lookup(name)
                .ok_or_else(|| QueryError::UnknownFunction(name.clone()))?;
            let args = args
                .iter()
                .map(|arg| lower(arg, schema))
                .collect::<Result<_, _>>()?;
            Ok(Ir::Call(CallAtom {
                name: name.clone(),
                func,
                args,
            }))
        }
    }
}

fn literal_value(lit: &Literal) -> ExprValue {
    match lit {
        Literal::String(s) => ExprValue::String(s.clone()),
        Literal::Int(n) => ExprValue::Int(*n),
        Literal::Decimal(d) => ExprValue::Decimal(d.clone()),
        Literal::Bool(b) => ExprValue::Bool(*b),
        Literal::Null => ExprValue::Null,
    }
}

fn lower_compare(op: CompareOp, left: Ir, right: Ir, schema: &TableSchema) -> Ir {
    // Literal-first comparisons are flipped so the attribute is on the left.
    let (op, left, right) = match (&left, &right, op.reversed()) {
        (Ir::Value(_), Ir::Name(_), Some(reversed)) => (reversed, right, left),
        _ => (op, left, right),
    };

    let key_candidate = match (&left, &right) {
        (Ir::Name(path), Ir::Value(_)) => path
            .as_single_attribute()
            .is_some_and(|name| schema.is_key_attribute(name)),
        _ => false,
    };

    Ir::Compare(CompareAtom {
        op,
        left: Box::new(left),
        right: Box::new(right),
        key_candidate,
    })
}

fn lower_is(
    operand: &Expr,
    negated: bool,
    type_name: &Expr,
    schema: &TableSchema,
) -> Result<Ir, QueryError> {
    let Ir::Name(path) = lower(operand, schema)? else {
        return Err(QueryError::OperandNotAName(operand.to_string()));
    };
    let Ir::Value(type_value) = lower(type_name, schema)? else {
        return Err(QueryError::ValueMustBeLiteral(type_name.to_string()));
    };
    let Some(type_str) = type_value.as_string_like() else {
        return Err(QueryError::ValueMustBeString(type_name.to_string()));
    };
    let resolved =
        IsType::parse(type_str.as_str()).ok_or_else(|| QueryError::InvalidTypeForIs {
            type_name: type_str.as_str().to_owned(),
        })?;

    let atom = IsAtom {
        path,
        type_name: resolved,
        negated: negated && resolved == IsType::Any,
    };
    if negated && resolved != IsType::Any {
        Ok(Ir::Not(Box::new(Ir::Is(atom))))
    } else {
        Ok(Ir::Is(atom))
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Renders the IR in expression syntax, parenthesizing every operand that is
/// not a leaf.
impl fmt::Display for Ir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => fmt_value(v, f),
            Self::Name(path) => write!(f, "{path}"),
            Self::Compare(atom) => {
                write_operand(f, &atom.left)?;
                write!(f, " {} ", atom.op)?;
                write_operand(f, &atom.right)
            }
            Self::And(l, r) | Self::Or(l, r) => {
                write_operand(f, l)?;
                f.write_str(if matches!(self, Self::And(..)) { " and " } else { " or " })?;
                write_operand(f, r)
            }
            Self::Not(inner) => {
                f.write_str("not ")?;
                write_operand(f, inner)
            }
            Self::Is(atom) => {
                let not = if atom.negated { "not " } else { "" };
                write!(f, "{} is {not}\"{}\"", atom.path, atom.type_name)
            }
            Self::Arith { op, left, right } => {
                write_operand(f, left)?;
                write!(f, " {op} ")?;
                write_operand(f, right)
            }
            Self::Neg(inner) => {
                f.write_str("-")?;
                write_operand(f, inner)
            }
            Self::Call(call) => {
                write!(f, "{}(", call.name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, ir: &Ir) -> fmt::Result {
    match ir {
        Ir::Value(_) | Ir::Name(_) | Ir::Call(_) => write!(f, "{ir}"),
        _ => write!(f, "({ir})"),
    }
}

fn fmt_value(value: &ExprValue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        ExprValue::String(s) => write!(f, "{}", Literal::String(s.clone())),
        other => write!(f, "{other}"),
    }
}
