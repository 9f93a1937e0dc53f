//! Query planning: indexed key condition plus residual filter, or a scan.
//!
//! The planner splits the top-level conjunction into terms and walks the
//! table's key schemas in order (primary key first, then secondary indexes in
//! declaration order). The first schema whose partition key has an equality
//! term against a literal of the declared type is selected. The first
//! usable term on that schema's sort key joins the key condition. Every
//! other term stays in the residual filter in its original order, so a row
//! matches the plan exactly when it matches the whole expression.

use std::cmp::Ordering;

use dynbrowse_model::{AttributeValue, Item, KeySchema, ScalarAttributeType, TableSchema};
use serde::Serialize;
use tracing::{debug, trace};

use super::ast::CompareOp;
use super::context::ExecContext;
use super::evaluator::EvalContext;
use super::ir::{Ir, lower};
use super::parser::parse;
use super::render::{NativeBuilder, NativeExpression};
use crate::error::QueryError;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Condition on the sort key of the selected index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SortKeyCondition {
    /// Sort key equals the given value.
    Eq(AttributeValue),
    /// Sort key is less than the given value.
    Lt(AttributeValue),
    /// Sort key is less than or equal to the given value.
    Le(AttributeValue),
    /// Sort key is greater than the given value.
    Gt(AttributeValue),
    /// Sort key is greater than or equal to the given value.
    Ge(AttributeValue),
    /// Sort key begins with the given string prefix.
    BeginsWith(String),
}

impl SortKeyCondition {
    fn from_term(op: CompareOp, value: AttributeValue) -> Option<Self> {
        Some(match op {
            CompareOp::Eq => Self::Eq(value),
            CompareOp::Lt => Self::Lt(value),
            CompareOp::Le => Self::Le(value),
            CompareOp::Gt => Self::Gt(value),
            CompareOp::Ge => Self::Ge(value),
            CompareOp::BeginsWith => match value {
                AttributeValue::S(prefix) => Self::BeginsWith(prefix),
                _ => return None,
            },
            CompareOp::Ne => return None,
        })
    }

    /// Tests a sort key value the way the store's indexed fetch does.
    #[must_use]
    pub fn matches(&self, value: &AttributeValue) -> bool {
        let cmp = |bound: &AttributeValue| value.compare_scalar(bound);
        match self {
            Self::Eq(v) => cmp(v) == Some(Ordering::Equal),
            Self::Lt(v) => cmp(v) == Some(Ordering::Less),
            Self::Le(v) => cmp(v).is_some_and(Ordering::is_le),
            Self::Gt(v) => cmp(v) == Some(Ordering::Greater),
            Self::Ge(v) => cmp(v).is_some_and(Ordering::is_ge),
            Self::BeginsWith(prefix) => value.as_s().is_some_and(|s| s.starts_with(prefix.as_str())),
        }
    }

    fn render(&self, builder: &mut NativeBuilder<'_>, name: &str) -> String {
        let path = builder.name(name);
        let (op, value) = match self {
            Self::Eq(v) => ("=", v),
            Self::Lt(v) => ("<", v),
            Self::Le(v) => ("<=", v),
            Self::Gt(v) => (">", v),
            Self::Ge(v) => (">=", v),
            Self::BeginsWith(prefix) => {
                let value = builder.value(AttributeValue::S(prefix.clone()));
                return format!("begins_with({path}, {value})");
            }
        };
        let value = builder.value(value.clone());
        format!("{path} {op} {value}")
    }
}

/// The key condition of a query plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCondition {
    /// The secondary index queried; `None` for the table's primary key.
    pub index_name: Option<String>,
    /// Partition key attribute name.
    pub partition_key: String,
    /// Required partition key value.
    pub partition_value: AttributeValue,
    /// Sort key attribute name, when the index has one.
    pub sort_key: Option<String>,
    /// Optional sort key condition.
    pub sort: Option<SortKeyCondition>,
}

impl KeyCondition {
    /// Returns `true` if the row would be returned by the indexed fetch.
    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        let partition_ok = item
            .get(&self.partition_key)
            .and_then(|v| v.compare_scalar(&self.partition_value))
            == Some(Ordering::Equal);
        if !partition_ok {
            return false;
        }
        match (&self.sort_key, &self.sort) {
            (Some(name), Some(cond)) => item.get(name).is_some_and(|v| cond.matches(v)),
            _ => true,
        }
    }

    fn render(&self, builder: &mut NativeBuilder<'_>) -> String {
        let path = builder.name(&self.partition_key);
        let value = builder.value(self.partition_value.clone());
        let mut out = format!("{path} = {value}");
        if let (Some(name), Some(cond)) = (&self.sort_key, &self.sort) {
            out.push_str(" AND ");
            out.push_str(&cond.render(builder, name));
        }
        out
    }
}

/// The outcome of planning one expression.
#[derive(Debug, Clone)]
pub struct Plan {
    /// `true` when the expression can run as an indexed query.
    pub can_query: bool,
    /// The secondary index queried, if any.
    pub index_name: Option<String>,
    /// The key condition, present when `can_query` is set.
    pub key_condition: Option<KeyCondition>,
    /// Client-side filter: the residual after a query, or the whole
    /// expression for a scan. `None` when the key condition is sufficient.
    pub filter: Option<Ir>,
    /// The plan in the store's native expression syntax.
    pub expression: NativeExpression,
}

impl Plan {
    /// Returns `true` if the row is selected by the plan: it passes the key
    /// condition (when querying) and the filter.
    ///
    /// # Errors
    ///
    /// Propagates filter evaluation errors.
    pub fn matches(&self, item: &Item, exec: ExecContext<'_>) -> Result<bool, QueryError> {
        if let Some(key) = &self.key_condition {
            if !key.matches(item) {
                return Ok(false);
            }
        }
        match &self.filter {
            Some(filter) => EvalContext::new(item, exec).matches(filter),
            None => Ok(true),
        }
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Parses, lowers and plans `text` with an empty execution context.
///
/// # Errors
///
/// Returns syntax, lowering and rendering errors.
pub fn compile(text: &str, schema: &TableSchema) -> Result<Plan, QueryError> {
    compile_with_context(text, schema, ExecContext::empty())
}

/// Parses, lowers and plans `text`. `exec` is used to fold row-independent
/// sub-expressions such as `marked("id")` into values.
///
/// # Errors
///
/// Returns syntax, lowering and rendering errors.
pub fn compile_with_context(
    text: &str,
    schema: &TableSchema,
    exec: ExecContext<'_>,
) -> Result<Plan, QueryError> {
    let ast = parse(text)?;
    trace!(%ast, "parsed expression");
    let ir = lower(&ast, schema)?;
    trace!(%ir, "lowered expression");
    plan(ir, schema, exec)
}

struct KeySelection {
    index_name: Option<String>,
    condition: KeyCondition,
    used: Vec<usize>,
}

/// Plans a lowered expression against the schema.
///
/// # Errors
///
/// Fails when part of the expression cannot be rendered natively or a
/// constant sub-expression fails to evaluate.
pub fn plan(ir: Ir, schema: &TableSchema, exec: ExecContext<'_>) -> Result<Plan, QueryError> {
    let terms = ir.conjuncts();

    let selection = schema
        .key_schemas()
        .find_map(|(index_name, keys)| select_keys(&terms, index_name, keys));

    let mut builder = NativeBuilder::new(exec);
    let Some(selection) = selection else {
        debug!(table = %schema.table_name, "no partition key equality, falling back to scan");
        let filter = builder.condition(&ir)?;
        return Ok(Plan {
            can_query: false,
            index_name: None,
            key_condition: None,
            expression: builder.finish(None, Some(filter)),
            filter: Some(ir),
        });
    };

    debug!(
        table = %schema.table_name,
        index = selection.index_name.as_deref().unwrap_or("<primary>"),
        partition_key = %selection.condition.partition_key,
        sort = selection.condition.sort.is_some(),
        "selected index"
    );

    let residual = Ir::conjunction(
        terms
            .iter()
            .enumerate()
            .filter(|(i, _)| !selection.used.contains(i))
            .map(|(_, term)| (*term).clone())
            .collect(),
    );

    let key_text = selection.condition.render(&mut builder);
    let filter_text = residual
        .as_ref()
        .map(|filter| builder.condition(filter))
        .transpose()?;

    Ok(Plan {
        can_query: true,
        index_name: selection.index_name,
        key_condition: Some(selection.condition),
        filter: residual,
        expression: builder.finish(Some(key_text), filter_text),
    })
}

/// A key-eligible term: `name op literal` with the literal's store form.
fn key_term<'t>(term: &'t Ir) -> Option<(&'t str, CompareOp, AttributeValue)> {
    let Ir::Compare(atom) = term else {
        return None;
    };
    atom.key_term()
        .map(|(name, value)| (name, atom.op, value.to_attribute_value()))
}

fn select_keys(terms: &[&Ir], index_name: Option<&str>, keys: &KeySchema) -> Option<KeySelection> {
    let partition = &keys.partition_key;
    let (pk_idx, partition_value) = terms.iter().enumerate().find_map(|(i, term)| {
        let (name, op, value) = key_term(term)?;
        (name == partition.name && op == CompareOp::Eq && partition.attr_type.matches(&value))
            .then_some((i, value))
    })?;

    let mut used = vec![pk_idx];
    let sort = keys.sort_key.as_ref().and_then(|sort_key| {
        terms.iter().enumerate().find_map(|(i, term)| {
            if i == pk_idx {
                return None;
            }
            let (name, op, value) = key_term(term)?;
            if name != sort_key.name || !sort_key.attr_type.matches(&value) {
                return None;
            }
            if op == CompareOp::BeginsWith && sort_key.attr_type != ScalarAttributeType::S {
                return None;
            }
            SortKeyCondition::from_term(op, value).map(|cond| (i, cond))
        })
    });
    if let Some((sk_idx, _)) = &sort {
        used.push(*sk_idx);
    }

    Some(KeySelection {
        index_name: index_name.map(str::to_owned),
        condition: KeyCondition {
            index_name: index_name.map(str::to_owned),
            partition_key: partition.name.clone(),
            partition_value,
            sort_key: keys.sort_key.as_ref().map(|k| k.name.clone()),
            sort: sort.map(|(_, cond)| cond),
        },
        used,
    })
}
