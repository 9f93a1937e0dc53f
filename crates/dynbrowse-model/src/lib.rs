//! Store-native data model for dynbrowse.
//!
//! This crate holds the types shared by the query engine and its front ends:
//! attribute values in the DynamoDB JSON wire format, items, and the key
//! schema of a table and its secondary indexes.

pub mod attribute_value;
pub mod schema;

use std::collections::BTreeMap;

pub use attribute_value::AttributeValue;
pub use schema::{
    DescribeTableOutput, IndexSchema, KeyAttribute, KeySchema, ScalarAttributeType, SchemaError,
    TableDescription, TableSchema,
};

/// A row: attribute names mapped to store-native values, ordered by name.
pub type Item = BTreeMap<String, AttributeValue>;
