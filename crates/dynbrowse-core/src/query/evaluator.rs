//! IR evaluation against a single item.
//!
//! Comparisons, `^=` and `is` tests tolerate absent attributes: a missing
//! name or a key applied to a non-map makes the test false instead of failing
//! the whole expression. Every other operator propagates the error.

use dynbrowse_model::Item;

use super::ast::{ArithOp, NamePath};
use super::context::ExecContext;
use super::ir::{CompareAtom, Ir, IsAtom, IsType};
use super::value::{self, ExprValue};
use crate::error::QueryError;
use crate::item::get_path;

/// Evaluation context for one item.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// The row being evaluated.
    pub item: &'a Item,
    /// Capabilities available to built-ins.
    pub exec: ExecContext<'a>,
}

impl<'a> EvalContext<'a> {
    /// Creates a context for `item`.
    #[must_use]
    pub fn new(item: &'a Item, exec: ExecContext<'a>) -> Self {
        Self { item, exec }
    }

    /// Evaluates a node to a value.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a path, operator or built-in that is
    /// not absorbed by absence tolerance.
    pub fn evaluate(&self, ir: &Ir) -> Result<ExprValue, QueryError> {
        match ir {
            Ir::Value(v) => Ok(v.clone()),
            Ir::Name(path) => self.resolve(path),
            Ir::Compare(atom) => self.eval_compare(atom).map(ExprValue::Bool),
            Ir::And(left, right) => {
                Ok(ExprValue::Bool(self.matches(left)? && self.matches(right)?))
            }
            Ir::Or(left, right) => {
                Ok(ExprValue::Bool(self.matches(left)? || self.matches(right)?))
            }
            Ir::Not(inner) => Ok(ExprValue::Bool(!self.matches(inner)?)),
            Ir::Is(atom) => self.eval_is(atom).map(ExprValue::Bool),
            Ir::Arith { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                match op {
                    ArithOp::Add => value::add(&left, &right),
                    ArithOp::Sub => value::subtract(&left, &right),
                }
            }
            Ir::Neg(inner) => value::negate(&self.evaluate(inner)?),
            Ir::Call(call) => {
                let args = call
                    .args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                (call.func)(&self.exec, &args)
            }
        }
    }

    /// Evaluates a node that must produce a boolean.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::UnsupportedOperation`] when the result is not
    /// a boolean, or with any evaluation error.
    pub fn matches(&self, ir: &Ir) -> Result<bool, QueryError> {
        match self.evaluate(ir)? {
            ExprValue::Bool(b) => Ok(b),
            other => Err(QueryError::UnsupportedOperation(format!(
                "expression '{ir}' evaluated to '{other}', not a boolean"
            ))),
        }
    }

    fn resolve(&self, path: &NamePath) -> Result<ExprValue, QueryError> {
        ExprValue::try_from(get_path(self.item, path)?)
    }

    fn eval_compare(&self, atom: &CompareAtom) -> Result<bool, QueryError> {
        let Some(left) = tolerate_absent(self.evaluate(&atom.left))? else {
            return Ok(false);
        };
        let Some(right) = tolerate_absent(self.evaluate(&atom.right))? else {
            return Ok(false);
        };
        value::compare(atom.op, &left, &right)
    }

    fn eval_is(&self, atom: &IsAtom) -> Result<bool, QueryError> {
        let found = tolerate_absent(self.resolve(&atom.path))?;
        Ok(match (atom.type_name, found) {
            (IsType::Any, found) => found.is_some() != atom.negated,
            (IsType::Type(expected), Some(v)) => v.type_descriptor() == expected,
            (IsType::Type(_), None) => false,
        })
    }
}

/// Maps "the attribute is not there" outcomes to `None`.
fn tolerate_absent(result: Result<ExprValue, QueryError>) -> Result<Option<ExprValue>, QueryError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(QueryError::NameNotFound(_) | QueryError::ValueNotAMap(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
