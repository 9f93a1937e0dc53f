//! Expression values and their capabilities.
//!
//! Every operand, built-in argument and result is an [`ExprValue`]. Operators
//! and built-ins never switch on the concrete variant directly; they ask for a
//! capability ([`StringLike`], [`NumberLike`], [`ListLike`], [`MapLike`]) and
//! fail with a typed error when the value does not offer it. Coercion between
//! capabilities (a number read as a string, a digit string read as a number)
//! only happens where a caller asks for it explicitly.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use dynbrowse_model::AttributeValue;

use super::ast::CompareOp;
use crate::error::QueryError;

/// A value produced or consumed while evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    /// A string.
    String(String),
    /// A machine integer, produced by literals and counting built-ins.
    Int(i64),
    /// An arbitrary-precision decimal; every stored number reads as this.
    Decimal(BigDecimal),
    /// A boolean.
    Bool(bool),
    /// The null value.
    Null,
    /// An ordered list.
    List(Vec<ExprValue>),
    /// A key-ordered map.
    Map(BTreeMap<String, ExprValue>),
    /// A stored value with no native expression form (binary, sets).
    Attr(AttributeValue),
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A value that is a string.
pub trait StringLike {
    /// The string contents.
    fn as_str(&self) -> &str;
}

/// A value that is a number.
pub trait NumberLike {
    /// The value as an arbitrary-precision decimal.
    fn to_decimal(&self) -> BigDecimal;
}

/// A value with positional elements.
pub trait ListLike {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Returns `true` when there are no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `idx`, if any.
    fn value_at(&self, idx: usize) -> Option<ExprValue>;
}

/// A value with named entries.
pub trait MapLike {
    /// Number of entries.
    fn len(&self) -> usize;

    /// Returns `true` when there are no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry under `key`, if any.
    fn value_of(&self, key: &str) -> Option<ExprValue>;
}

impl StringLike for String {
    fn as_str(&self) -> &str {
        self
    }
}

impl NumberLike for i64 {
    fn to_decimal(&self) -> BigDecimal {
        BigDecimal::from(*self)
    }
}

impl NumberLike for BigDecimal {
    fn to_decimal(&self) -> BigDecimal {
        self.clone()
    }
}

impl ListLike for Vec<ExprValue> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn value_at(&self, idx: usize) -> Option<ExprValue> {
        self.get(idx).cloned()
    }
}

/// Store sets read as lists. Only exposed for set variants.
impl ListLike for AttributeValue {
    fn len(&self) -> usize {
        match self {
            AttributeValue::Ss(v) | AttributeValue::Ns(v) => v.len(),
            AttributeValue::Bs(v) => v.len(),
            _ => 0,
        }
    }

    fn value_at(&self, idx: usize) -> Option<ExprValue> {
        match self {
            AttributeValue::Ss(v) => v.get(idx).cloned().map(ExprValue::String),
            AttributeValue::Ns(v) => v
                .get(idx)
                .and_then(|n| BigDecimal::from_str(n).ok())
                .map(ExprValue::Decimal),
            AttributeValue::Bs(v) => v
                .get(idx)
                .cloned()
                .map(|b| ExprValue::Attr(AttributeValue::B(b))),
            _ => None,
        }
    }
}

impl MapLike for BTreeMap<String, ExprValue> {
    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn value_of(&self, key: &str) -> Option<ExprValue> {
        self.get(key).cloned()
    }
}

impl ExprValue {
    /// The string capability, if this value has it.
    #[must_use]
    pub fn as_string_like(&self) -> Option<&dyn StringLike> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number capability, if this value has it.
    #[must_use]
    pub fn as_number_like(&self) -> Option<&dyn NumberLike> {
        match self {
            Self::Int(n) => Some(n),
            Self::Decimal(d) => Some(d),
            _ => None,
        }
    }

    /// The list capability, if this value has it.
    #[must_use]
    pub fn as_list_like(&self) -> Option<&dyn ListLike> {
        match self {
            Self::List(items) => Some(items),
            Self::Attr(attr) if attr.is_set() => Some(attr),
            _ => None,
        }
    }

    /// The map capability, if this value has it.
    #[must_use]
    pub fn as_map_like(&self) -> Option<&dyn MapLike> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Explicit string coercion: strings, numbers and booleans have a string
    /// form, everything else does not.
    #[must_use]
    pub fn as_stringable(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::String(s) => Some(Cow::Borrowed(s)),
            Self::Int(n) => Some(Cow::Owned(n.to_string())),
            Self::Decimal(d) => Some(Cow::Owned(d.to_string())),
            Self::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Self::Null | Self::List(_) | Self::Map(_) | Self::Attr(_) => None,
        }
    }

    /// Like [`Self::as_stringable`], failing with
    /// [`QueryError::NotConvertibleToString`].
    pub fn to_string_coerced(&self) -> Result<Cow<'_, str>, QueryError> {
        self.as_stringable()
            .ok_or_else(|| QueryError::NotConvertibleToString(self.to_string()))
    }

    /// Explicit number coercion: numbers, and strings holding a number.
    #[must_use]
    pub fn as_numberable(&self) -> Option<BigDecimal> {
        match self {
            Self::String(s) => BigDecimal::from_str(s.trim()).ok(),
            other => other.as_number_like().map(NumberLike::to_decimal),
        }
    }

    /// Type descriptor in the store's vocabulary ("S", "N", "BOOL", ...).
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::String(_) => "S",
            Self::Int(_) | Self::Decimal(_) => "N",
            Self::Bool(_) => "BOOL",
            Self::Null => "NULL",
            Self::List(_) => "L",
            Self::Map(_) => "M",
            Self::Attr(attr) => attr.type_descriptor(),
        }
    }

    /// Character count of a string, entry count of a map, element count of
    /// a list or set.
    pub fn size(&self) -> Result<usize, QueryError> {
        if let Some(s) = self.as_string_like() {
            return Ok(s.as_str().chars().count());
        }
        if let Some(m) = self.as_map_like() {
            return Ok(m.len());
        }
        if let Some(l) = self.as_list_like() {
            return Ok(l.len());
        }
        Err(QueryError::UnsupportedOperation(format!(
            "cannot take size of '{self}'"
        )))
    }

    /// Converts to the store-native form. Every expression value has one.
    #[must_use]
    pub fn to_attribute_value(&self) -> AttributeValue {
        match self {
            Self::String(s) => AttributeValue::S(s.clone()),
            Self::Int(n) => AttributeValue::N(n.to_string()),
            Self::Decimal(d) => AttributeValue::N(d.to_string()),
            Self::Bool(b) => AttributeValue::Bool(*b),
            Self::Null => AttributeValue::Null(true),
            Self::List(items) => {
                AttributeValue::L(items.iter().map(Self::to_attribute_value).collect())
            }
            Self::Map(m) => AttributeValue::M(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_attribute_value()))
                    .collect(),
            ),
            Self::Attr(attr) => attr.clone(),
        }
    }
}

impl TryFrom<&AttributeValue> for ExprValue {
    type Error = QueryError;

    /// Fails closed on values the store would reject: malformed numbers and
    /// `NULL: false`.
    fn try_from(attr: &AttributeValue) -> Result<Self, Self::Error> {
        Ok(match attr {
            AttributeValue::S(s) => Self::String(s.clone()),
            AttributeValue::N(n) => Self::Decimal(BigDecimal::from_str(n).map_err(|_| {
                QueryError::UnsupportedOperation(format!("invalid stored number '{n}'"))
            })?),
            AttributeValue::Bool(b) => Self::Bool(*b),
            AttributeValue::Null(true) => Self::Null,
            AttributeValue::Null(false) => {
                return Err(QueryError::UnsupportedOperation(
                    "stored NULL value must be true".to_owned(),
                ));
            }
            AttributeValue::L(items) => {
                Self::List(items.iter().map(Self::try_from).collect::<Result<_, _>>()?)
            }
            AttributeValue::M(m) => Self::Map(
                m.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::try_from(v)?)))
                    .collect::<Result<_, QueryError>>()?,
            ),
            AttributeValue::B(_)
            | AttributeValue::Ss(_)
            | AttributeValue::Ns(_)
            | AttributeValue::Bs(_) => Self::Attr(attr.clone()),
        })
    }
}

impl From<ExprValue> for AttributeValue {
    fn from(value: ExprValue) -> Self {
        value.to_attribute_value()
    }
}

impl fmt::Display for ExprValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null => f.write_str("null"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Attr(attr) => write!(f, "{attr}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

fn not_comparable(left: &ExprValue, right: &ExprValue) -> QueryError {
    QueryError::NotComparable {
        left: left.to_string(),
        right: right.to_string(),
    }
}

/// Structural equality, with numbers compared by value.
///
/// Values of different kinds are unequal rather than an error.
#[must_use]
pub fn values_equal(left: &ExprValue, right: &ExprValue) -> bool {
    if let (Some(a), Some(b)) = (left.as_number_like(), right.as_number_like()) {
        return a.to_decimal() == b.to_decimal();
    }
    match (left, right) {
        (ExprValue::String(a), ExprValue::String(b)) => a == b,
        (ExprValue::Bool(a), ExprValue::Bool(b)) => a == b,
        (ExprValue::Null, ExprValue::Null) => true,
        (ExprValue::List(a), ExprValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (ExprValue::Map(a), ExprValue::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        (ExprValue::Attr(a), ExprValue::Attr(b)) => a == b,
        _ => false,
    }
}

/// Ordering between two numbers or two strings.
pub fn ordering(left: &ExprValue, right: &ExprValue) -> Result<Ordering, QueryError> {
    if let (Some(a), Some(b)) = (left.as_number_like(), right.as_number_like()) {
        return Ok(a.to_decimal().cmp(&b.to_decimal()));
    }
    if let (Some(a), Some(b)) = (left.as_string_like(), right.as_string_like()) {
        return Ok(a.as_str().as_bytes().cmp(b.as_str().as_bytes()));
    }
    Err(not_comparable(left, right))
}

/// Applies a comparison operator.
///
/// `=` and `<>` are defined for every pair; ordering operators need two
/// numbers or two strings; `^=` needs two strings.
pub fn compare(op: CompareOp, left: &ExprValue, right: &ExprValue) -> Result<bool, QueryError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::BeginsWith => match (left.as_string_like(), right.as_string_like()) {
            (Some(a), Some(b)) => Ok(a.as_str().starts_with(b.as_str())),
            _ => Err(not_comparable(left, right)),
        },
        CompareOp::Lt => Ok(ordering(left, right)?.is_lt()),
        CompareOp::Le => Ok(ordering(left, right)?.is_le()),
        CompareOp::Gt => Ok(ordering(left, right)?.is_gt()),
        CompareOp::Ge => Ok(ordering(left, right)?.is_ge()),
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

/// `left + right`: numeric addition, or concatenation when either side is a
/// string (the other side is coerced to its string form).
pub fn add(left: &ExprValue, right: &ExprValue) -> Result<ExprValue, QueryError> {
    if let (ExprValue::Int(a), ExprValue::Int(b)) = (left, right) {
        if let Some(sum) = a.checked_add(*b) {
            return Ok(ExprValue::Int(sum));
        }
    }
    if let (Some(a), Some(b)) = (left.as_number_like(), right.as_number_like()) {
        return Ok(ExprValue::Decimal(a.to_decimal() + b.to_decimal()));
    }
    if left.as_string_like().is_some() || right.as_string_like().is_some() {
        let mut s = left.to_string_coerced()?.into_owned();
        s.push_str(&right.to_string_coerced()?);
        return Ok(ExprValue::String(s));
    }
    Err(QueryError::UnsupportedOperation(format!(
        "cannot add '{left}' and '{right}'"
    )))
}

/// `left - right` for numbers.
pub fn subtract(left: &ExprValue, right: &ExprValue) -> Result<ExprValue, QueryError> {
    if let (ExprValue::Int(a), ExprValue::Int(b)) = (left, right) {
        if let Some(diff) = a.checked_sub(*b) {
            return Ok(ExprValue::Int(diff));
        }
    }
    match (left.as_number_like(), right.as_number_like()) {
        (Some(a), Some(b)) => Ok(ExprValue::Decimal(a.to_decimal() - b.to_decimal())),
        _ => Err(QueryError::UnsupportedOperation(format!(
            "cannot subtract '{right}' from '{left}'"
        ))),
    }
}

/// Unary minus for numbers.
pub fn negate(value: &ExprValue) -> Result<ExprValue, QueryError> {
    match value {
        ExprValue::Int(n) => Ok(n
            .checked_neg()
            .map_or_else(|| ExprValue::Decimal(-BigDecimal::from(*n)), ExprValue::Int)),
        ExprValue::Decimal(d) => Ok(ExprValue::Decimal(-d.clone())),
        other => Err(QueryError::UnsupportedOperation(format!(
            "cannot negate '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> ExprValue {
        ExprValue::Decimal(BigDecimal::from_str(s).unwrap())
    }

    fn s(v: &str) -> ExprValue {
        ExprValue::String(v.to_owned())
    }

    #[test]
    fn test_should_compare_int_and_decimal_by_value() {
        assert!(compare(CompareOp::Eq, &ExprValue::Int(2), &dec("2.0")).unwrap());
        assert!(compare(CompareOp::Lt, &ExprValue::Int(2), &dec("2.5")).unwrap());
        assert!(compare(CompareOp::Ge, &dec("10"), &ExprValue::Int(9)).unwrap());
    }

    #[test]
    fn test_should_compare_strings_lexically() {
        assert!(compare(CompareOp::Lt, &s("abc"), &s("abd")).unwrap());
        assert!(compare(CompareOp::Gt, &s("b"), &s("abc")).unwrap());
        assert!(compare(CompareOp::BeginsWith, &s("2024-01-05"), &s("2024-")).unwrap());
    }

    #[test]
    fn test_should_fail_ordering_across_capabilities() {
        let err = compare(CompareOp::Lt, &ExprValue::List(vec![]), &ExprValue::Int(1)).unwrap_err();
        assert!(matches!(err, QueryError::NotComparable { .. }));
        assert_eq!(err.to_string(), "values '[]' and '1' are not comparable");

        let err = compare(CompareOp::Gt, &s("10"), &ExprValue::Int(5)).unwrap_err();
        assert!(matches!(err, QueryError::NotComparable { .. }));
    }

    #[test]
    fn test_should_treat_mixed_kinds_as_unequal() {
        assert!(!compare(CompareOp::Eq, &s("1"), &ExprValue::Int(1)).unwrap());
        assert!(compare(CompareOp::Ne, &ExprValue::Null, &ExprValue::Bool(false)).unwrap());
    }

    #[test]
    fn test_should_compare_lists_structurally() {
        let a = ExprValue::List(vec![ExprValue::Int(1), s("x")]);
        let b = ExprValue::List(vec![dec("1.0"), s("x")]);
        assert!(values_equal(&a, &b));
    }

    #[test]
    fn test_should_convert_attribute_values_losslessly() {
        let mut m = BTreeMap::new();
        m.insert("n".to_owned(), AttributeValue::N("1.50".to_owned()));
        m.insert("ss".to_owned(), AttributeValue::Ss(vec!["a".to_owned()]));
        m.insert(
            "l".to_owned(),
            AttributeValue::L(vec![AttributeValue::Bool(true), AttributeValue::Null(true)]),
        );
        let attr = AttributeValue::M(m);

        let value = ExprValue::try_from(&attr).unwrap();
        assert_eq!(value.to_attribute_value(), attr);
    }

    #[test]
    fn test_should_fail_closed_on_invalid_stored_values() {
        assert!(ExprValue::try_from(&AttributeValue::N("abc".to_owned())).is_err());
        assert!(ExprValue::try_from(&AttributeValue::Null(false)).is_err());
    }

    #[test]
    fn test_should_expose_sets_as_lists() {
        let value = ExprValue::Attr(AttributeValue::Ns(vec!["1".to_owned(), "2".to_owned()]));
        let list = value.as_list_like().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.value_at(1), Some(dec("2")));
        assert!(ExprValue::Attr(AttributeValue::B(bytes::Bytes::new()))
            .as_list_like()
            .is_none());
    }

    #[test]
    fn test_should_size_strings_by_characters() {
        assert_eq!(s("héllo").size().unwrap(), 5);
        assert_eq!(ExprValue::List(vec![ExprValue::Null]).size().unwrap(), 1);
        assert!(matches!(
            ExprValue::Int(3).size(),
            Err(QueryError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_should_coerce_only_on_request() {
        assert_eq!(ExprValue::Int(7).as_stringable().unwrap(), "7");
        assert!(ExprValue::Int(7).as_string_like().is_none());
        assert_eq!(s(" 42 ").as_numberable(), Some(BigDecimal::from(42)));
        assert!(s("42").as_number_like().is_none());
        assert!(matches!(
            ExprValue::Null.to_string_coerced(),
            Err(QueryError::NotConvertibleToString(_))
        ));
    }

    #[test]
    fn test_should_add_numbers_and_concatenate_strings() {
        assert_eq!(add(&ExprValue::Int(2), &ExprValue::Int(3)).unwrap(), ExprValue::Int(5));
        assert_eq!(
            add(&ExprValue::Int(i64::MAX), &ExprValue::Int(1)).unwrap(),
            dec("9223372036854775808")
        );
        assert_eq!(add(&s("id-"), &ExprValue::Int(4)).unwrap(), s("id-4"));
        assert!(matches!(
            add(&s("a"), &ExprValue::List(vec![])),
            Err(QueryError::NotConvertibleToString(_))
        ));
        assert!(subtract(&s("a"), &ExprValue::Int(1)).is_err());
        assert_eq!(negate(&ExprValue::Int(4)).unwrap(), ExprValue::Int(-4));
    }
}
