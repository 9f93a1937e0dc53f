//! Rendering of IR as native store condition expressions.
//!
//! Attribute names always go through `#nK` placeholders and constants through
//! `:vK` placeholders, so reserved words and odd characters never reach the
//! expression text. One [`NativeBuilder`] is shared between the key condition
//! and the filter of a plan so both strings use the same placeholder maps.

use std::collections::{BTreeMap, HashMap};

use dynbrowse_model::{AttributeValue, Item};
use serde::Serialize;

use super::ast::{CompareOp, NamePath, PathElement};
use super::context::ExecContext;
use super::evaluator::EvalContext;
use super::ir::{Ir, IsAtom, IsType};
use crate::error::QueryError;

/// A condition in the store's native expression syntax with its placeholder
/// maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NativeExpression {
    /// `KeyConditionExpression`, present for query plans.
    #[serde(rename = "KeyConditionExpression", skip_serializing_if = "Option::is_none")]
    pub key_condition: Option<String>,
    /// `FilterExpression`, present when rows must be filtered after the fetch.
    #[serde(rename = "FilterExpression", skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// `ExpressionAttributeNames`.
    #[serde(rename = "ExpressionAttributeNames", skip_serializing_if = "BTreeMap::is_empty")]
    pub names: BTreeMap<String, String>,
    /// `ExpressionAttributeValues`.
    #[serde(rename = "ExpressionAttributeValues", skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, AttributeValue>,
}

/// Accumulates placeholders while rendering.
#[derive(Debug)]
pub struct NativeBuilder<'a> {
    exec: ExecContext<'a>,
    names: BTreeMap<String, String>,
    placeholders: HashMap<String, String>,
    values: BTreeMap<String, AttributeValue>,
}

impl<'a> NativeBuilder<'a> {
    /// Creates a builder. `exec` is used to fold row-independent
    /// sub-expressions into values.
    #[must_use]
    pub fn new(exec: ExecContext<'a>) -> Self {
        Self {
            exec,
            names: BTreeMap::new(),
            placeholders: HashMap::new(),
            values: BTreeMap::new(),
        }
    }

    /// Placeholder for an attribute name, reusing an earlier one if the name
    /// was seen before.
    pub fn name(&mut self, name: &str) -> String {
        if let Some(existing) = self.placeholders.get(name) {
            return existing.clone();
        }
        let placeholder = format!("#n{}", self.placeholders.len());
        self.placeholders
            .insert(name.to_owned(), placeholder.clone());
        self.names.insert(placeholder.clone(), name.to_owned());
        placeholder
    }

    /// Placeholder for a value.
    pub fn value(&mut self, value: AttributeValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Placeholder form of a path: `#n0.#n1[2]`.
    pub fn path(&mut self, path: &NamePath) -> String {
        let mut out = String::new();
        for element in &path.elements {
            match element {
                PathElement::Attribute(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(&self.name(name));
                }
                PathElement::Index(idx) => {
                    out.push('[');
                    out.push_str(&idx.to_string());
                    out.push(']');
                }
            }
        }
        out
    }

    /// Renders a boolean condition.
    ///
    /// # Errors
    ///
    /// Fails with [`QueryError::UnsupportedOperation`] for constructs that
    /// read the row but have no native form, and with any error raised while
    /// folding constants.
    pub fn condition(&mut self, ir: &Ir) -> Result<String, QueryError> {
        match ir {
            Ir::Compare(atom) => {
                let left = self.operand(&atom.left)?;
                let right = self.operand(&atom.right)?;
                Ok(match atom.op {
                    CompareOp::BeginsWith => format!("begins_with({left}, {right})"),
                    op => format!("{left} {op} {right}"),
                })
            }
            Ir::And(l, r) => Ok(format!("({}) AND ({})", self.condition(l)?, self.condition(r)?)),
            Ir::Or(l, r) => Ok(format!("({}) OR ({})", self.condition(l)?, self.condition(r)?)),
            Ir::Not(inner) => Ok(format!("NOT ({})", self.condition(inner)?)),
            Ir::Is(atom) => Ok(self.is_test(atom)),
            other => Err(QueryError::UnsupportedOperation(format!(
                "'{other}' cannot be used as a store condition"
            ))),
        }
    }

    fn is_test(&mut self, atom: &IsAtom) -> String {
        let path = self.path(&atom.path);
        match atom.type_name {
            IsType::Any if atom.negated => format!("attribute_not_exists({path})"),
            IsType::Any => format!("attribute_exists({path})"),
            IsType::Type(type_name) => {
                let value = self.value(AttributeValue::S(type_name.to_owned()));
                format!("attribute_type({path}, {value})")
            }
        }
    }

    fn operand(&mut self, ir: &Ir) -> Result<String, QueryError> {
        if ir.is_row_independent() {
            let empty = Item::new();
            let value = EvalContext::new(&empty, self.exec).evaluate(ir)?;
            return Ok(self.value(value.to_attribute_value()));
        }
        match ir {
            Ir::Name(path) => Ok(self.path(path)),
            Ir::Call(call) if call.name == "size" => match call.args.as_slice() {
                [Ir::Name(path)] => Ok(format!("size({})", self.path(path))),
                _ => Err(QueryError::UnsupportedOperation(format!(
                    "'{ir}' has no store equivalent"
                ))),
            },
            other => Err(QueryError::UnsupportedOperation(format!(
                "'{other}' has no store equivalent"
            ))),
        }
    }

    /// Consumes the builder into a native expression.
    #[must_use]
    pub fn finish(self, key_condition: Option<String>, filter: Option<String>) -> NativeExpression {
        NativeExpression {
            key_condition,
            filter,
            names: self.names,
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use dynbrowse_model::{KeyAttribute, KeySchema, ScalarAttributeType, TableSchema};

    use super::*;
    use crate::query::ir::lower;
    use crate::query::parser::parse;

    fn render(text: &str) -> Result<NativeExpression, QueryError> {
        let schema = TableSchema::new(
            "t",
            KeySchema {
                partition_key: KeyAttribute::new("pk", ScalarAttributeType::S),
                sort_key: None,
            },
        );
        let ir = lower(&parse(text).unwrap(), &schema).unwrap();
        let mut builder = NativeBuilder::new(ExecContext::empty());
        let filter = builder.condition(&ir)?;
        Ok(builder.finish(None, Some(filter)))
    }

    #[test]
    fn test_should_render_comparisons_with_placeholders() {
        let native = render(r#"a.b[1] = "x" and a.c ^= "p""#).unwrap();
        assert_eq!(
            native.filter.as_deref(),
            Some("(#n0.#n1[1] = :v0) AND (begins_with(#n0.#n2, :v1))")
        );
        assert_eq!(native.names.get("#n0").map(String::as_str), Some("a"));
        assert_eq!(native.names.len(), 3);
        assert_eq!(native.values.get(":v1"), Some(&AttributeValue::S("p".to_owned())));
    }

    #[test]
    fn test_should_render_is_tests() {
        let native = render(r#"a is not "ANY" or not (b is "ANY") or c is "N""#).unwrap();
        assert_eq!(
            native.filter.as_deref(),
            Some(
                "((attribute_not_exists(#n0)) OR (attribute_not_exists(#n1))) OR \
                 (attribute_type(#n2, :v0))"
            )
        );
        assert_eq!(native.values.get(":v0"), Some(&AttributeValue::S("N".to_owned())));
    }

    #[test]
    fn test_should_fold_constant_operands() {
        let native = render("size(tags) >= 1 + 2").unwrap();
        assert_eq!(native.filter.as_deref(), Some("size(#n0) >= :v0"));
        assert_eq!(native.values.get(":v0"), Some(&AttributeValue::N("3".to_owned())));
    }

    #[test]
    fn test_should_reject_row_dependent_arithmetic() {
        assert!(matches!(
            render("a + 1 = 2"),
            Err(QueryError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            render("mapstr(a, \"{}\") = b"),
            Err(QueryError::UnsupportedOperation(_))
        ));
        assert!(matches!(render("a"), Err(QueryError::UnsupportedOperation(_))));
    }
}
