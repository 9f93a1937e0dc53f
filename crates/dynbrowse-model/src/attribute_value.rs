//! Store-native `AttributeValue` with the DynamoDB JSON wire format.
//!
//! `AttributeValue` is a tagged union where exactly one variant is present.
//! The JSON form uses single-key objects like `{"S": "hello"}`, so item dumps
//! produced by the AWS CLI can be loaded directly.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::Engine;
use bigdecimal::BigDecimal;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single attribute value as stored in a table.
///
/// Numbers are string-encoded to keep arbitrary precision; they are parsed on
/// demand when a numeric comparison is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    /// String value.
    S(String),
    /// Number value (string-encoded).
    N(String),
    /// Binary value (base64-encoded in JSON).
    B(bytes::Bytes),
    /// String set.
    Ss(Vec<String>),
    /// Number set (string-encoded).
    Ns(Vec<String>),
    /// Binary set (base64-encoded in JSON).
    Bs(Vec<bytes::Bytes>),
    /// Boolean value.
    Bool(bool),
    /// Null value. Only `Null(true)` is a valid stored value.
    Null(bool),
    /// List of attribute values.
    L(Vec<AttributeValue>),
    /// Map of attribute values, ordered by key.
    M(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Returns `true` for `SS`, `NS` and `BS`.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Ss(_) | Self::Ns(_) | Self::Bs(_))
    }

    /// The text of an `S` value.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        if let Self::S(text) = self { Some(text) } else { None }
    }

    /// The digits of an `N` value, unparsed.
    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        if let Self::N(digits) = self { Some(digits) } else { None }
    }

    /// The wire tag of the value, also the name `is` tests against.
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    /// Parses an `N` value as an arbitrary-precision decimal.
    ///
    /// Returns `None` for non-number variants and malformed number strings.
    #[must_use]
    pub fn to_decimal(&self) -> Option<BigDecimal> {
        self.as_n().and_then(|n| BigDecimal::from_str(n).ok())
    }

    /// Compares two key-eligible scalars using store ordering.
    ///
    /// Strings and binaries compare byte-wise, numbers by value. Returns `None`
    /// when the variants differ or are not scalar key types.
    #[must_use]
    pub fn compare_scalar(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::S(a), Self::S(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Self::N(_), Self::N(_)) => Some(self.to_decimal()?.cmp(&other.to_decimal()?)),
            (Self::B(a), Self::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
            _ => None,
        }
    }
}

/// Renders the value the way the browser shows it in a table cell.
impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => f.write_str(s),
            Self::N(n) => f.write_str(n),
            Self::B(b) => write!(f, "({} bytes)", b.len()),
            Self::Ss(v) | Self::Ns(v) => write!(f, "({} items)", v.len()),
            Self::Bs(v) => write!(f, "({} items)", v.len()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null(_) => f.write_str("null"),
            Self::L(v) => write!(f, "({} items)", v.len()),
            Self::M(m) => write!(f, "({} items)", m.len()),
        }
    }
}

/// Every wire tag, in the order the store documents them.
const TYPE_TAGS: &[&str] = &["S", "N", "B", "SS", "NS", "BS", "BOOL", "NULL", "L", "M"];

const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

fn encode_binary(data: &bytes::Bytes) -> String {
    BASE64.encode(data)
}

fn decode_binary<E: de::Error>(text: &str) -> Result<bytes::Bytes, E> {
    BASE64.decode(text).map(bytes::Bytes::from).map_err(E::custom)
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tag = self.type_descriptor();
        let mut entry = serializer.serialize_map(Some(1))?;
        match self {
            Self::S(text) | Self::N(text) => entry.serialize_entry(tag, text)?,
            Self::Ss(texts) | Self::Ns(texts) => entry.serialize_entry(tag, texts)?,
            Self::B(data) => entry.serialize_entry(tag, &encode_binary(data))?,
            Self::Bs(blobs) => {
                let encoded: Vec<String> = blobs.iter().map(encode_binary).collect();
                entry.serialize_entry(tag, &encoded)?;
            }
            Self::Bool(flag) | Self::Null(flag) => entry.serialize_entry(tag, flag)?,
            Self::L(elements) => entry.serialize_entry(tag, elements)?,
            Self::M(fields) => entry.serialize_entry(tag, fields)?,
        }
        entry.end()
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(WireVisitor)
    }
}

/// Reads the single-key `{"<tag>": <payload>}` object.
struct WireVisitor;

impl<'de> Visitor<'de> for WireVisitor {
    type Value = AttributeValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with exactly one type tag")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AttributeValue, A::Error> {
        let tag: String = access
            .next_key()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;

        let parsed = match tag.as_str() {
            "S" => AttributeValue::S(access.next_value()?),
            "N" => AttributeValue::N(access.next_value()?),
            "SS" => AttributeValue::Ss(access.next_value()?),
            "NS" => AttributeValue::Ns(access.next_value()?),
            "BOOL" => AttributeValue::Bool(access.next_value()?),
            "NULL" => AttributeValue::Null(access.next_value()?),
            "L" => AttributeValue::L(access.next_value()?),
            "M" => AttributeValue::M(access.next_value()?),
            "B" => AttributeValue::B(decode_binary::<A::Error>(&access.next_value::<String>()?)?),
            "BS" => AttributeValue::Bs(
                access
                    .next_value::<Vec<String>>()?
                    .into_iter()
                    .map(|text| decode_binary::<A::Error>(&text))
                    .collect::<Result<_, _>>()?,
            ),
            unknown => return Err(de::Error::unknown_field(unknown, TYPE_TAGS)),
        };

        if access.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(2, &self));
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_write_single_tag_objects() {
        let row = AttributeValue::L(vec![
            AttributeValue::S("kim".to_owned()),
            AttributeValue::N("7".to_owned()),
            AttributeValue::Null(true),
        ]);
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"L":[{"S":"kim"},{"N":"7"},{"NULL":true}]}"#
        );
    }

    #[test]
    fn test_should_encode_binaries_as_base64() {
        let blob = AttributeValue::B(bytes::Bytes::from_static(b"hi"));
        assert_eq!(serde_json::to_string(&blob).unwrap(), r#"{"B":"aGk="}"#);
        let set: AttributeValue = serde_json::from_str(r#"{"BS":["aGk=",""]}"#).unwrap();
        assert_eq!(
            set,
            AttributeValue::Bs(vec![bytes::Bytes::from_static(b"hi"), bytes::Bytes::new()])
        );
        assert!(serde_json::from_str::<AttributeValue>(r#"{"B":"%%"}"#).is_err());
    }

    #[test]
    fn test_should_reject_unknown_or_missing_tag() {
        assert!(serde_json::from_str::<AttributeValue>(r#"{"X":"a"}"#).is_err());
        assert!(serde_json::from_str::<AttributeValue>("{}").is_err());
    }

    #[test]
    fn test_should_reject_value_with_two_type_keys() {
        let result = serde_json::from_str::<AttributeValue>(r#"{"S":"a","N":"1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_deserialize_nested_map() {
        let json = r#"{"M":{"b":{"N":"2"},"a":{"SS":["x","y"]}}}"#;
        let AttributeValue::M(m) = serde_json::from_str(json).unwrap() else {
            panic!("expected a map");
        };
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(m["a"].is_set());
    }

    #[test]
    fn test_should_compare_numbers_by_value() {
        let a = AttributeValue::N("10".to_owned());
        let b = AttributeValue::N("9.5".to_owned());
        assert_eq!(a.compare_scalar(&b), Some(Ordering::Greater));
        assert_eq!(
            AttributeValue::N("1.0".to_owned()).compare_scalar(&AttributeValue::N("1".to_owned())),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_should_not_compare_mixed_scalars() {
        let a = AttributeValue::N("10".to_owned());
        let b = AttributeValue::S("10".to_owned());
        assert_eq!(a.compare_scalar(&b), None);
    }

    #[test]
    fn test_should_display_cell_text() {
        assert_eq!(AttributeValue::S("abc".to_owned()).to_string(), "abc");
        assert_eq!(AttributeValue::Bool(true).to_string(), "true");
        assert_eq!(AttributeValue::Null(true).to_string(), "null");
        assert_eq!(
            AttributeValue::L(vec![AttributeValue::Bool(false)]).to_string(),
            "(1 items)"
        );
    }
}
