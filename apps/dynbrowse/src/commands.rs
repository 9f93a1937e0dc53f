//! Subcommand implementations. Each returns the JSON document to print.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use dynbrowse_core::query::{ExecContext, SystemClock, lower, parse};
use dynbrowse_core::{Plan, compile_with_context, evaluate};
use dynbrowse_model::{
    AttributeValue, DescribeTableOutput, Item, KeyAttribute, KeySchema, ScalarAttributeType,
    TableSchema,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

/// Items as stored in a file: a bare array or `scan` output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemsFile {
    Scan {
        #[serde(rename = "Items")]
        items: Vec<Item>,
    },
    List(Vec<Item>),
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_schema(path: &Path) -> Result<TableSchema> {
    let output: DescribeTableOutput = serde_json::from_str(&read(path)?)
        .with_context(|| format!("{} is not describe-table output", path.display()))?;
    TableSchema::try_from(output.table).context("invalid table key schema")
}

fn load_items(path: &Path) -> Result<Vec<Item>> {
    let file: ItemsFile = serde_json::from_str(&read(path)?)
        .with_context(|| format!("{} does not hold items", path.display()))?;
    Ok(match file {
        ItemsFile::Scan { items } | ItemsFile::List(items) => items,
    })
}

/// A schema whose only key attribute cannot be named by an expression, for
/// evaluating without a table.
fn detached_schema() -> TableSchema {
    TableSchema::new(
        "",
        KeySchema {
            partition_key: KeyAttribute::new("", ScalarAttributeType::S),
            sort_key: None,
        },
    )
}

fn plan_json(plan: &Plan) -> Result<Value> {
    Ok(json!({
        "CanQuery": plan.can_query,
        "IndexName": plan.index_name,
        "KeyCondition": serde_json::to_value(&plan.key_condition)?,
        "Filter": plan.filter.as_ref().map(ToString::to_string),
        "Native": serde_json::to_value(&plan.expression)?,
    }))
}

/// `dynbrowse plan`.
pub fn plan(schema_path: &Path, expression: &str) -> Result<Value> {
    let schema = load_schema(schema_path)?;
    let clock = SystemClock;
    let exec = ExecContext::empty().with_time_source(&clock);
    let plan = compile_with_context(expression, &schema, exec)
        .with_context(|| format!("failed to compile '{expression}'"))?;
    plan_json(&plan)
}

/// `dynbrowse filter`: key condition and filter applied locally, as the
/// store would apply them.
pub fn filter(
    schema_path: &Path,
    items_path: &Path,
    limit: usize,
    expression: &str,
) -> Result<Value> {
    let schema = load_schema(schema_path)?;
    let items = load_items(items_path)?;
    let clock = SystemClock;
    let exec = ExecContext::empty().with_time_source(&clock);
    let plan = compile_with_context(expression, &schema, exec)
        .with_context(|| format!("failed to compile '{expression}'"))?;

    let mut matched = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if matched.len() >= limit {
            break;
        }
        if plan
            .matches(item, exec)
            .with_context(|| format!("failed to evaluate item {index}"))?
        {
            matched.push(item);
        }
    }
    info!(
        scanned = items.len(),
        matched = matched.len(),
        can_query = plan.can_query,
        "filtered items"
    );

    Ok(json!({
        "Count": matched.len(),
        "ScannedCount": items.len(),
        "Items": serde_json::to_value(&matched)?,
    }))
}

/// `dynbrowse eval`: the value of an expression, optionally against an item.
pub fn eval(schema_path: Option<&Path>, item_path: Option<&Path>, expression: &str) -> Result<Value> {
    let schema = schema_path.map_or_else(|| Ok(detached_schema()), load_schema)?;
    let item: Item = match item_path {
        Some(path) => serde_json::from_str(&read(path)?)
            .with_context(|| format!("{} is not an item", path.display()))?,
        None => Item::new(),
    };

    let ast = parse(expression).with_context(|| format!("failed to parse '{expression}'"))?;
    let ir = lower(&ast, &schema).context("failed to lower expression")?;
    let clock = SystemClock;
    let value = evaluate(&ir, &item, ExecContext::empty().with_time_source(&clock))
        .context("evaluation failed")?;
    Ok(serde_json::to_value(AttributeValue::from(value))?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SCHEMA: &str = r#"{"Table": {
        "TableName": "orders",
        "KeySchema": [{"AttributeName": "pk", "KeyType": "HASH"}],
        "AttributeDefinitions": [{"AttributeName": "pk", "AttributeType": "S"}]
    }}"#;

    fn fixture(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_should_print_plan() {
        let schema = fixture(SCHEMA);
        let out = plan(schema.path(), r#"pk = "a" and n > 1"#).unwrap();
        assert_eq!(out["CanQuery"], json!(true));
        assert_eq!(out["Filter"], json!("n > 1"));
        assert_eq!(out["Native"]["KeyConditionExpression"], json!("#n0 = :v0"));
    }

    #[test]
    fn test_should_filter_items_with_limit() {
        let schema = fixture(SCHEMA);
        let items = fixture(
            r#"{"Items": [
                {"pk": {"S": "a"}, "n": {"N": "1"}},
                {"pk": {"S": "a"}, "n": {"N": "2"}},
                {"pk": {"S": "a"}, "n": {"N": "3"}},
                {"pk": {"S": "b"}, "n": {"N": "4"}}
            ]}"#,
        );
        let out = filter(schema.path(), items.path(), 1, r#"pk = "a" and n > 1"#).unwrap();
        assert_eq!(out["Count"], json!(1));
        assert_eq!(out["Items"][0]["n"], json!({"N": "2"}));
    }

    #[test]
    fn test_should_evaluate_against_item() {
        let item = fixture(r#"{"tags": {"SS": ["x", "y"]}}"#);
        let out = eval(None, Some(item.path()), "size(tags) + 1").unwrap();
        assert_eq!(out, json!({"N": "3"}));
        assert_eq!(eval(None, None, "range(1, 2)").unwrap(), json!({"L": [{"N": "1"}, {"N": "2"}]}));
    }

    #[test]
    fn test_should_report_bad_expression() {
        let err = eval(None, None, "1 +").unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
