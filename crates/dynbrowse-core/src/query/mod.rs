//! The query expression engine.
//!
//! The pipeline is:
//!
//! 1. **Parsing**: expression text to an [`Expr`] tree by recursive descent.
//! 2. **Lowering**: the AST to an [`Ir`] tree bound to a table schema.
//! 3. **Planning**: the IR to a [`Plan`]: an indexed key condition plus a
//!    residual filter, or a scan filter, rendered in the store's syntax.
//! 4. **Evaluation**: the IR against one item, for client-side filtering and
//!    local operations such as marking rows.

pub mod ast;
pub mod builtins;
pub mod context;
pub mod evaluator;
pub mod ir;
pub mod parser;
pub mod planner;
pub mod render;
pub mod value;

use dynbrowse_model::Item;

pub use ast::{CompareOp, Expr, NamePath, PathElement};
pub use context::{Clipboard, ExecContext, ResultContext, SystemClock, TimeSource};
pub use evaluator::EvalContext;
pub use ir::{Ir, lower};
pub use parser::parse;
pub use planner::{KeyCondition, Plan, SortKeyCondition, compile, compile_with_context};
pub use render::NativeExpression;
pub use value::ExprValue;

use crate::error::QueryError;

/// Evaluates `ir` against `item`.
///
/// # Errors
///
/// Returns any evaluation error not absorbed by absence tolerance.
pub fn evaluate(ir: &Ir, item: &Item, exec: ExecContext<'_>) -> Result<ExprValue, QueryError> {
    EvalContext::new(item, exec).evaluate(ir)
}
