//! Table schema: the primary key and secondary indexes of one table.
//!
//! The wire types ([`TableDescription`], [`KeySchemaElement`],
//! [`AttributeDefinition`], [`SecondaryIndexDescription`]) mirror the shapes
//! returned by `DescribeTable`, so the JSON printed by
//! `aws dynamodb describe-table` can be loaded directly. They are then
//! resolved into the planner-facing [`TableSchema`].

use serde::{Deserialize, Serialize};

use crate::AttributeValue;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while resolving a table description into a [`TableSchema`].
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A key schema has no `HASH` element.
    #[error("{index}: key schema has no partition key")]
    MissingPartitionKey {
        /// The table or index name.
        index: String,
    },
    /// A key attribute has no attribute definition.
    #[error("{attr}: key attribute has no attribute definition")]
    UndefinedKeyAttribute {
        /// The attribute name.
        attr: String,
    },
    /// A key attribute is declared with a type other than S, N or B.
    #[error("{attr}: invalid key attribute type '{attr_type}'")]
    InvalidKeyType {
        /// The attribute name.
        attr: String,
        /// The declared type.
        attr_type: String,
    },
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The role of a key attribute in a key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Partition key.
    #[serde(rename = "HASH")]
    Hash,
    /// Sort key.
    #[serde(rename = "RANGE")]
    Range,
}

/// Scalar attribute types allowed for key attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarAttributeType {
    /// String type.
    S,
    /// Number type.
    N,
    /// Binary type.
    B,
    /// A type name the store does not allow for keys.
    Unknown(String),
}

impl ScalarAttributeType {
    /// Returns the wire-format string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::S => "S",
            Self::N => "N",
            Self::B => "B",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Returns `true` if the given value has this scalar type.
    #[must_use]
    pub fn matches(&self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (Self::S, AttributeValue::S(_))
                | (Self::N, AttributeValue::N(_))
                | (Self::B, AttributeValue::B(_))
        )
    }
}

impl Serialize for ScalarAttributeType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ScalarAttributeType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "S" => Ok(Self::S),
            "N" => Ok(Self::N),
            "B" => Ok(Self::B),
            _ => Ok(Self::Unknown(s)),
        }
    }
}

impl std::fmt::Display for ScalarAttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a key schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    /// The name of the key attribute.
    pub attribute_name: String,
    /// `HASH` or `RANGE`.
    pub key_type: KeyType,
}

/// An attribute name with its declared scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    /// The name of the attribute.
    pub attribute_name: String,
    /// The declared scalar type.
    pub attribute_type: ScalarAttributeType,
}

/// A global or local secondary index as described by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecondaryIndexDescription {
    /// The index name.
    pub index_name: String,
    /// The key schema of the index.
    pub key_schema: Vec<KeySchemaElement>,
}

/// The subset of a `DescribeTable` response needed for planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableDescription {
    /// The table name.
    pub table_name: String,
    /// The primary key schema.
    pub key_schema: Vec<KeySchemaElement>,
    /// Types of every attribute used in a key schema.
    #[serde(default)]
    pub attribute_definitions: Vec<AttributeDefinition>,
    /// Global secondary indexes.
    #[serde(default)]
    pub global_secondary_indexes: Vec<SecondaryIndexDescription>,
    /// Local secondary indexes.
    #[serde(default)]
    pub local_secondary_indexes: Vec<SecondaryIndexDescription>,
}

/// Envelope printed by `describe-table`: `{"Table": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeTableOutput {
    /// The described table.
    pub table: TableDescription,
}

// ---------------------------------------------------------------------------
// Resolved schema
// ---------------------------------------------------------------------------

/// A key attribute with its name and scalar type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// The attribute name.
    pub name: String,
    /// The scalar type (S, N or B).
    pub attr_type: ScalarAttributeType,
}

impl KeyAttribute {
    /// Creates a key attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, attr_type: ScalarAttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

/// Partition key and optional sort key of the table or of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition (HASH) key.
    pub partition_key: KeyAttribute,
    /// Optional sort (RANGE) key.
    pub sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    /// Returns `true` if `name` is the partition or sort key of this schema.
    #[must_use]
    pub fn has_key(&self, name: &str) -> bool {
        self.partition_key.name == name
            || self.sort_key.as_ref().is_some_and(|k| k.name == name)
    }
}

/// A named secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// The index name.
    pub name: String,
    /// The key schema of the index.
    pub keys: KeySchema,
}

/// The key layout of one table: primary key plus secondary indexes, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// The table name.
    pub table_name: String,
    /// The primary key.
    pub primary: KeySchema,
    /// Secondary indexes in declaration order (global before local).
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// Creates a schema with only a primary key.
    #[must_use]
    pub fn new(table_name: impl Into<String>, primary: KeySchema) -> Self {
        Self {
            table_name: table_name.into(),
            primary,
            indexes: Vec::new(),
        }
    }

    /// Adds a secondary index after the ones already declared.
    #[must_use]
    pub fn with_index(mut self, name: impl Into<String>, keys: KeySchema) -> Self {
        self.indexes.push(IndexSchema {
            name: name.into(),
            keys,
        });
        self
    }

    /// Iterates the primary key (index name `None`) then every secondary
    /// index, in the order the planner tries them.
    pub fn key_schemas(&self) -> impl Iterator<Item = (Option<&str>, &KeySchema)> {
        std::iter::once((None, &self.primary)).chain(
            self.indexes
                .iter()
                .map(|index| (Some(index.name.as_str()), &index.keys)),
        )
    }

    /// Returns `true` if `name` is a key attribute of the table or any index.
    #[must_use]
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.key_schemas().any(|(_, keys)| keys.has_key(name))
    }
}

impl TryFrom<TableDescription> for TableSchema {
    type Error = SchemaError;

    fn try_from(desc: TableDescription) -> Result<Self, Self::Error> {
        let primary = resolve_key_schema(
            &desc.table_name,
            &desc.key_schema,
            &desc.attribute_definitions,
        )?;
        let indexes = desc
            .global_secondary_indexes
            .iter()
            .chain(&desc.local_secondary_indexes)
            .map(|index| {
                let keys = resolve_key_schema(
                    &index.index_name,
                    &index.key_schema,
                    &desc.attribute_definitions,
                )?;
                Ok(IndexSchema {
                    name: index.index_name.clone(),
                    keys,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        Ok(Self {
            table_name: desc.table_name,
            primary,
            indexes,
        })
    }
}

fn resolve_key_schema(
    owner: &str,
    elements: &[KeySchemaElement],
    definitions: &[AttributeDefinition],
) -> Result<KeySchema, SchemaError> {
    let resolve = |element: &KeySchemaElement| -> Result<KeyAttribute, SchemaError> {
        let def = definitions
            .iter()
            .find(|d| d.attribute_name == element.attribute_name)
            .ok_or_else(|| SchemaError::UndefinedKeyAttribute {
                attr: element.attribute_name.clone(),
            })?;
        if let ScalarAttributeType::Unknown(t) = &def.attribute_type {
            return Err(SchemaError::InvalidKeyType {
                attr: element.attribute_name.clone(),
                attr_type: t.clone(),
            });
        }
        Ok(KeyAttribute::new(
            element.attribute_name.clone(),
            def.attribute_type.clone(),
        ))
    };

    let partition = elements
        .iter()
        .find(|e| e.key_type == KeyType::Hash)
        .ok_or_else(|| SchemaError::MissingPartitionKey {
            index: owner.to_owned(),
        })?;
    let sort = elements.iter().find(|e| e.key_type == KeyType::Range);

    Ok(KeySchema {
        partition_key: resolve(partition)?,
        sort_key: sort.map(resolve).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE_JSON: &str = r#"{
        "Table": {
            "TableName": "orders",
            "KeySchema": [
                {"AttributeName": "sk", "KeyType": "RANGE"},
                {"AttributeName": "pk", "KeyType": "HASH"}
            ],
            "AttributeDefinitions": [
                {"AttributeName": "pk", "AttributeType": "S"},
                {"AttributeName": "sk", "AttributeType": "N"},
                {"AttributeName": "email", "AttributeType": "S"}
            ],
            "GlobalSecondaryIndexes": [
                {"IndexName": "by-email", "KeySchema": [{"AttributeName": "email", "KeyType": "HASH"}]}
            ],
            "ItemCount": 12
        }
    }"#;

    #[test]
    fn test_should_resolve_describe_table_output() {
        let out: DescribeTableOutput = serde_json::from_str(DESCRIBE_JSON).unwrap();
        let schema = TableSchema::try_from(out.table).unwrap();

        assert_eq!(schema.table_name, "orders");
        assert_eq!(
            schema.primary.partition_key,
            KeyAttribute::new("pk", ScalarAttributeType::S)
        );
        assert_eq!(
            schema.primary.sort_key,
            Some(KeyAttribute::new("sk", ScalarAttributeType::N))
        );
        assert_eq!(schema.indexes.len(), 1);
        assert_eq!(schema.indexes[0].name, "by-email");
        assert!(schema.indexes[0].keys.sort_key.is_none());
    }

    #[test]
    fn test_should_iterate_primary_before_indexes() {
        let schema = TableSchema::new(
            "t",
            KeySchema {
                partition_key: KeyAttribute::new("pk", ScalarAttributeType::S),
                sort_key: None,
            },
        )
        .with_index(
            "gsi",
            KeySchema {
                partition_key: KeyAttribute::new("other", ScalarAttributeType::S),
                sort_key: None,
            },
        );

        let names: Vec<_> = schema.key_schemas().map(|(name, _)| name).collect();
        assert_eq!(names, vec![None, Some("gsi")]);
        assert!(schema.is_key_attribute("other"));
        assert!(!schema.is_key_attribute("email"));
    }

    #[test]
    fn test_should_reject_undefined_key_attribute() {
        let desc = TableDescription {
            table_name: "t".to_owned(),
            key_schema: vec![KeySchemaElement {
                attribute_name: "pk".to_owned(),
                key_type: KeyType::Hash,
            }],
            attribute_definitions: Vec::new(),
            global_secondary_indexes: Vec::new(),
            local_secondary_indexes: Vec::new(),
        };

        let err = TableSchema::try_from(desc).unwrap_err();
        assert!(matches!(err, SchemaError::UndefinedKeyAttribute { ref attr } if attr == "pk"));
    }

    #[test]
    fn test_should_match_scalar_types() {
        assert!(ScalarAttributeType::S.matches(&AttributeValue::S("a".to_owned())));
        assert!(!ScalarAttributeType::N.matches(&AttributeValue::S("1".to_owned())));
    }
}
