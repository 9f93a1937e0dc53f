//! Reading and editing items through name paths.

use dynbrowse_model::{AttributeValue, Item};

use crate::error::QueryError;
use crate::query::ast::{NamePath, PathElement};

/// Walks `path` through the item.
///
/// # Errors
///
/// - [`QueryError::NameNotFound`] when an attribute, map key or list index is
///   missing, or an index is applied to anything but a list (sets have no
///   positions).
/// - [`QueryError::ValueNotAMap`] when a key is applied to a non-map.
pub fn get_path<'a>(item: &'a Item, path: &NamePath) -> Result<&'a AttributeValue, QueryError> {
    let not_found = || QueryError::NameNotFound(path.to_string());

    let mut current = item.get(path.root()).ok_or_else(not_found)?;
    for element in path.elements.iter().skip(1) {
        current = match (element, current) {
            (PathElement::Attribute(key), AttributeValue::M(map)) => {
                map.get(key).ok_or_else(not_found)?
            }
            (PathElement::Attribute(_), _) => {
                return Err(QueryError::ValueNotAMap(path.to_string()));
            }
            (PathElement::Index(idx), AttributeValue::L(list)) => {
                list.get(*idx).ok_or_else(not_found)?
            }
            (PathElement::Index(_), _) => return Err(not_found()),
        };
    }
    Ok(current)
}

/// Stores `value` at `path`, creating intermediate maps for missing keys.
///
/// List indexes must already exist.
///
/// # Errors
///
/// Fails when the path crosses a value of the wrong shape or an index is out
/// of range.
pub fn set_path(item: &mut Item, path: &NamePath, value: AttributeValue) -> Result<(), QueryError> {
    let root = path.root().to_owned();
    let rest = path.elements.get(1..).unwrap_or_default();
    if rest.is_empty() {
        item.insert(root, value);
        return Ok(());
    }

    let entry = item
        .entry(root)
        .or_insert_with(|| AttributeValue::M(Default::default()));
    set_nested(entry, rest, value, path)
}

fn set_nested(
    current: &mut AttributeValue,
    remaining: &[PathElement],
    value: AttributeValue,
    path: &NamePath,
) -> Result<(), QueryError> {
    let Some((head, tail)) = remaining.split_first() else {
        *current = value;
        return Ok(());
    };

    match (head, current) {
        (PathElement::Attribute(key), AttributeValue::M(map)) => {
            if tail.is_empty() {
                map.insert(key.clone(), value);
                return Ok(());
            }
            let child = map
                .entry(key.clone())
                .or_insert_with(|| AttributeValue::M(Default::default()));
            set_nested(child, tail, value, path)
        }
        (PathElement::Attribute(_), _) => Err(QueryError::ValueNotAMap(path.to_string())),
        (PathElement::Index(idx), AttributeValue::L(list)) => {
            let child = list
                .get_mut(*idx)
                .ok_or_else(|| QueryError::NameNotFound(path.to_string()))?;
            set_nested(child, tail, value, path)
        }
        (PathElement::Index(_), _) => Err(QueryError::UnsupportedOperation(format!(
            "'{path}' indexes a value that is not a list"
        ))),
    }
}

/// Removes the value at `path`, returning it. Removing a list element shifts
/// the elements after it.
///
/// # Errors
///
/// Fails when the path does not resolve.
pub fn remove_path(item: &mut Item, path: &NamePath) -> Result<AttributeValue, QueryError> {
    let not_found = || QueryError::NameNotFound(path.to_string());

    let Some((last, parents)) = path.elements.split_last() else {
        return Err(not_found());
    };
    if parents.is_empty() {
        return item.remove(path.root()).ok_or_else(not_found);
    }

    let parent_path = NamePath {
        elements: parents.to_vec(),
    };
    let mut parent = item.get_mut(parent_path.root()).ok_or_else(not_found)?;
    for element in parents.iter().skip(1) {
        parent = match (element, parent) {
            (PathElement::Attribute(key), AttributeValue::M(map)) => {
                map.get_mut(key).ok_or_else(not_found)?
            }
            (PathElement::Index(idx), AttributeValue::L(list)) => {
                list.get_mut(*idx).ok_or_else(not_found)?
            }
            (PathElement::Attribute(_), _) => {
                return Err(QueryError::ValueNotAMap(parent_path.to_string()));
            }
            (PathElement::Index(_), _) => {
                return Err(QueryError::UnsupportedOperation(format!(
                    "'{parent_path}' indexes a value that is not a list"
                )));
            }
        };
    }

    match (last, parent) {
        (PathElement::Attribute(key), AttributeValue::M(map)) => {
            map.remove(key).ok_or_else(not_found)
        }
        (PathElement::Index(idx), AttributeValue::L(list)) if *idx < list.len() => {
            Ok(list.remove(*idx))
        }
        (PathElement::Index(_), AttributeValue::L(_)) => Err(not_found()),
        (PathElement::Attribute(_), _) => Err(QueryError::ValueNotAMap(path.to_string())),
        (PathElement::Index(_), _) => Err(QueryError::UnsupportedOperation(format!(
            "'{path}' indexes a value that is not a list"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::query::parser::parse;
    use crate::query::ast::Expr;

    fn path(text: &str) -> NamePath {
        match parse(text).unwrap() {
            Expr::Name(path) => path,
            other => panic!("not a path: {other}"),
        }
    }

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_owned())
    }

    fn sample() -> Item {
        let mut info = BTreeMap::new();
        info.insert("city".to_owned(), s("Oslo"));
        let mut item = Item::new();
        item.insert("id".to_owned(), s("a"));
        item.insert("info".to_owned(), AttributeValue::M(info));
        item.insert("tags".to_owned(), AttributeValue::L(vec![s("x"), s("y")]));
        item
    }

    #[test]
    fn test_should_resolve_nested_paths() {
        let item = sample();
        assert_eq!(get_path(&item, &path("info.city")).unwrap(), &s("Oslo"));
        assert_eq!(get_path(&item, &path("tags[1]")).unwrap(), &s("y"));
    }

    #[test]
    fn test_should_classify_path_failures() {
        let item = sample();
        assert!(matches!(
            get_path(&item, &path("missing")),
            Err(QueryError::NameNotFound(ref p)) if p == "missing"
        ));
        assert!(matches!(
            get_path(&item, &path("id.x")),
            Err(QueryError::ValueNotAMap(ref p)) if p == "id.x"
        ));
        assert!(matches!(
            get_path(&item, &path("tags[5]")),
            Err(QueryError::NameNotFound(_))
        ));
        assert!(matches!(
            get_path(&item, &path("info[0]")),
            Err(QueryError::NameNotFound(ref p)) if p == "info[0]"
        ));
        assert!(matches!(
            get_path(&item, &path("id[0]")),
            Err(QueryError::NameNotFound(_))
        ));
    }

    #[test]
    fn test_should_set_values_creating_maps() {
        let mut item = sample();
        set_path(&mut item, &path("info.zip"), s("0150")).unwrap();
        set_path(&mut item, &path("meta.owner.name"), s("kim")).unwrap();
        set_path(&mut item, &path("tags[0]"), s("z")).unwrap();

        assert_eq!(get_path(&item, &path("info.zip")).unwrap(), &s("0150"));
        assert_eq!(get_path(&item, &path("meta.owner.name")).unwrap(), &s("kim"));
        assert_eq!(get_path(&item, &path("tags[0]")).unwrap(), &s("z"));
        assert!(set_path(&mut item, &path("tags[9]"), s("z")).is_err());
        assert!(set_path(&mut item, &path("id.x"), s("z")).is_err());
    }

    #[test]
    fn test_should_remove_values() {
        let mut item = sample();
        assert_eq!(remove_path(&mut item, &path("tags[0]")).unwrap(), s("x"));
        assert_eq!(get_path(&item, &path("tags[0]")).unwrap(), &s("y"));
        assert_eq!(remove_path(&mut item, &path("info.city")).unwrap(), s("Oslo"));
        assert_eq!(remove_path(&mut item, &path("id")).unwrap(), s("a"));
        assert!(matches!(
            remove_path(&mut item, &path("id")),
            Err(QueryError::NameNotFound(_))
        ));
    }
}
