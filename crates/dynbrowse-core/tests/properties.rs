//! Property tests for the planner, rendering, `is` folding, comparison and
//! built-in arity.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use dynbrowse_core::query::ast::{ArithOp, BinaryOp, Literal, LogicalOp, UnaryOp};
use dynbrowse_core::query::builtins;
use dynbrowse_core::query::value::compare;
use dynbrowse_core::query::{
    CompareOp, EvalContext, ExecContext, Expr, ExprValue, NamePath, PathElement, lower, parse,
};
use dynbrowse_core::{QueryError, compile};
use dynbrowse_model::{AttributeValue, Item, KeyAttribute, KeySchema, ScalarAttributeType, TableSchema};
use proptest::prelude::*;
use proptest::strategy::Union;

// ---------------------------------------------------------------------------
// Generators: schemas, rows and conjunctions
// ---------------------------------------------------------------------------

/// Attributes that may be declared as keys. Each has one type per table, so
/// rows stay well typed whichever index declares it.
const KEY_ATTRS: [&str; 5] = ["pk", "sk", "g", "gs", "h"];
const INDEX_PARTITIONS: [&str; 4] = ["g", "h", "sk", "gs"];
const INDEX_SORTS: [&str; 4] = ["gs", "pk", "h", "sk"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    S,
    N,
    B,
}

impl KeyType {
    fn scalar(self) -> ScalarAttributeType {
        match self {
            Self::S => ScalarAttributeType::S,
            Self::N => ScalarAttributeType::N,
            Self::B => ScalarAttributeType::B,
        }
    }
}

type Types = BTreeMap<&'static str, KeyType>;

#[derive(Debug, Clone)]
struct Table {
    schema: TableSchema,
    types: Types,
}

fn arb_key_type() -> impl Strategy<Value = KeyType> {
    prop_oneof![Just(KeyType::S), Just(KeyType::N), Just(KeyType::B)]
}

fn arb_table() -> impl Strategy<Value = Table> {
    (
        prop::collection::vec(arb_key_type(), KEY_ATTRS.len()),
        any::<bool>(),
        prop::collection::vec((0..INDEX_PARTITIONS.len(), prop::option::of(0..INDEX_SORTS.len())), 0..=3),
    )
        .prop_map(|(types, with_sort, indexes)| {
            let types: Types = KEY_ATTRS.into_iter().zip(types).collect();
            let key = |name: &str| KeyAttribute::new(name, types[name].scalar());

            let mut schema = TableSchema::new(
                "t",
                KeySchema {
                    partition_key: key("pk"),
                    sort_key: with_sort.then(|| key("sk")),
                },
            );
            for (i, (partition, sort)) in indexes.into_iter().enumerate() {
                let partition = INDEX_PARTITIONS[partition];
                let sort = sort.map(|idx| INDEX_SORTS[idx]).filter(|name| *name != partition);
                schema = schema.with_index(
                    format!("idx{i}"),
                    KeySchema {
                        partition_key: key(partition),
                        sort_key: sort.map(key),
                    },
                );
            }
            Table { schema, types }
        })
}

fn s(v: &str) -> AttributeValue {
    AttributeValue::S(v.to_owned())
}

fn arb_stored(key_type: KeyType) -> BoxedStrategy<AttributeValue> {
    match key_type {
        KeyType::S => prop_oneof![Just("a"), Just("b"), Just("ab")].prop_map(s).boxed(),
        KeyType::N => (0i64..4).prop_map(|n| AttributeValue::N(n.to_string())).boxed(),
        KeyType::B => prop_oneof![Just(&b"a"[..]), Just(&b"ab"[..])]
            .prop_map(|b| AttributeValue::B(bytes::Bytes::copy_from_slice(b)))
            .boxed(),
    }
}

/// Rows are well typed: key attributes have their declared type whenever they
/// are present, and the primary partition key is always present.
fn arb_row(types: &Types) -> BoxedStrategy<Item> {
    let keyed: Vec<BoxedStrategy<Option<(String, AttributeValue)>>> = KEY_ATTRS
        .iter()
        .map(|&name| {
            let value = arb_stored(types[name]);
            if name == "pk" {
                value.prop_map(move |v| Some((name.to_owned(), v))).boxed()
            } else {
                prop::option::of(value)
                    .prop_map(move |v| v.map(|v| (name.to_owned(), v)))
                    .boxed()
            }
        })
        .collect();

    (keyed, prop::option::of(any::<bool>()), prop::option::of(0i64..5)).prop_map(
        |(keyed, active, n)| {
            let mut item: Item = keyed.into_iter().flatten().collect();
            if let Some(active) = active {
                item.insert("active".to_owned(), AttributeValue::Bool(active));
            }
            if let Some(n) = n {
                item.insert("n".to_owned(), AttributeValue::N(n.to_string()));
            }
            item
        },
    )
    .boxed()
}

fn arb_compare_op() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("="),
        Just("<>"),
        Just("<"),
        Just("<="),
        Just(">"),
        Just(">="),
    ]
}

/// Terms on one attribute that never fail to evaluate on a well-typed row:
/// ordering only against literals of the attribute's own kind, equality
/// against anything.
fn arb_attr_term(name: &'static str, key_type: KeyType) -> BoxedStrategy<String> {
    match key_type {
        KeyType::S => {
            let lit = || prop_oneof![Just("a"), Just("b"), Just("ab"), Just("")];
            prop_oneof![
                (arb_compare_op(), lit()).prop_map(move |(op, v)| format!(r#"{name} {op} "{v}""#)),
                (arb_compare_op(), lit()).prop_map(move |(op, v)| format!(r#""{v}" {op} {name}"#)),
                lit().prop_map(move |v| format!(r#"{name} ^= "{v}""#)),
                (0i64..4).prop_map(move |v| format!("{name} = {v}")),
            ]
            .boxed()
        }
        KeyType::N => {
            let lit = || prop_oneof![(0i64..4).prop_map(|v| v.to_string()), Just("1.5".to_owned())];
            prop_oneof![
                (arb_compare_op(), lit()).prop_map(move |(op, v)| format!("{name} {op} {v}")),
                (arb_compare_op(), lit()).prop_map(move |(op, v)| format!("{v} {op} {name}")),
                (0i64..4).prop_map(move |v| format!(r#"{name} = "{v}""#)),
            ]
            .boxed()
        }
        KeyType::B => prop_oneof![
            Just(format!(r#"{name} = "a""#)),
            Just(format!("{name} <> 1")),
            Just(format!(r#"{name} is "B""#)),
        ]
        .boxed(),
    }
}

fn arb_term(types: &Types) -> BoxedStrategy<String> {
    let mut options: Vec<BoxedStrategy<String>> = KEY_ATTRS
        .iter()
        .map(|&name| arb_attr_term(name, types[name]))
        .collect();
    options.push(
        prop_oneof![
            any::<bool>().prop_map(|v| format!("active = {v}")),
            (arb_compare_op(), 0i64..5).prop_map(|(op, v)| format!("n {op} {v}")),
            Just(r#"not (pk = "a")"#.to_owned()),
            Just("not (pk = 1)".to_owned()),
            Just(r#"n is not "ANY""#.to_owned()),
            Just(r#"gs is not "ANY""#.to_owned()),
            Just(r#"active is "BOOL""#.to_owned()),
            Just(r#"(pk = "b" or n < 2)"#.to_owned()),
        ]
        .boxed(),
    );
    Union::new(options).boxed()
}

fn arb_case() -> impl Strategy<Value = (Table, String, Vec<Item>)> {
    arb_table().prop_flat_map(|table| {
        let text = prop::collection::vec(arb_term(&table.types), 1..5)
            .prop_map(|terms| terms.join(" and "));
        let rows = prop::collection::vec(arb_row(&table.types), 0..12);
        (Just(table), text, rows)
    })
}

// ---------------------------------------------------------------------------
// Generators: expression trees in the shape the parser produces
// ---------------------------------------------------------------------------

const KEYWORDS: [&str; 7] = ["and", "or", "not", "is", "true", "false", "null"];

fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,5}".prop_filter("keywords are not names", |name| {
        !KEYWORDS.contains(&name.as_str())
    })
}

/// Numbers are never negative: the parser reads `-1` as a negation.
fn arb_literal() -> impl Strategy<Value = Literal> {
    prop_oneof![
        "[ -~\n\t]{0,6}".prop_map(Literal::String),
        (0i64..=i64::MAX).prop_map(Literal::Int),
        (any::<u64>(), -30i64..30)
            .prop_map(|(digits, scale)| Literal::Decimal(BigDecimal::new(digits.into(), scale))),
        any::<bool>().prop_map(Literal::Bool),
        Just(Literal::Null),
    ]
}

fn arb_path() -> impl Strategy<Value = NamePath> {
    let element = prop_oneof![
        "[a-z ]{1,4}".prop_map(PathElement::Attribute),
        (0usize..20).prop_map(PathElement::Index),
    ];
    (arb_identifier(), prop::collection::vec(element, 0..3)).prop_map(|(root, rest)| {
        let mut elements = vec![PathElement::Attribute(root)];
        elements.extend(rest);
        NamePath { elements }
    })
}

fn arb_binary_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Logical(LogicalOp::And)),
        Just(BinaryOp::Logical(LogicalOp::Or)),
        Just(BinaryOp::Compare(CompareOp::Eq)),
        Just(BinaryOp::Compare(CompareOp::Ne)),
        Just(BinaryOp::Compare(CompareOp::Lt)),
        Just(BinaryOp::Compare(CompareOp::Ge)),
        Just(BinaryOp::Compare(CompareOp::BeginsWith)),
        Just(BinaryOp::Arith(ArithOp::Add)),
        Just(BinaryOp::Arith(ArithOp::Sub)),
    ]
}

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        arb_literal().prop_map(Expr::Literal),
        arb_path().prop_map(Expr::Name),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (prop_oneof![Just(UnaryOp::Not), Just(UnaryOp::Neg)], inner.clone()).prop_map(
                |(op, operand)| Expr::Unary {
                    op,
                    operand: Box::new(operand),
                }
            ),
            (arb_binary_op(), inner.clone(), inner.clone()).prop_map(|(op, left, right)| {
                Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }),
            (inner.clone(), any::<bool>(), inner.clone()).prop_map(
                |(operand, negated, type_name)| Expr::Is {
                    operand: Box::new(operand),
                    negated,
                    type_name: Box::new(type_name),
                }
            ),
            (arb_identifier(), prop::collection::vec(inner, 0..3))
                .prop_map(|(name, args)| Expr::Call { name, args }),
        ]
    })
}

// ---------------------------------------------------------------------------
// Generators: values
// ---------------------------------------------------------------------------

fn arb_value() -> impl Strategy<Value = ExprValue> {
    let scalar = prop_oneof![
        "[a-z0-9]{0,4}".prop_map(ExprValue::String),
        any::<i64>().prop_map(ExprValue::Int),
        (any::<i32>(), 0i64..4)
            .prop_map(|(m, scale)| ExprValue::Decimal(BigDecimal::new(m.into(), scale))),
        any::<bool>().prop_map(ExprValue::Bool),
        Just(ExprValue::Null),
    ];
    scalar.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(ExprValue::List),
            prop::collection::btree_map("[a-c]", inner, 0..3).prop_map(ExprValue::Map),
        ]
    })
}

fn is_number(v: &ExprValue) -> bool {
    matches!(v, ExprValue::Int(_) | ExprValue::Decimal(_))
}

fn is_string(v: &ExprValue) -> bool {
    matches!(v, ExprValue::String(_))
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn test_should_match_full_evaluation_with_planned_query((table, text, rows) in arb_case()) {
        let plan = compile(&text, &table.schema).unwrap();
        let whole = lower(&parse(&text).unwrap(), &table.schema).unwrap();
        let exec = ExecContext::empty();

        for row in &rows {
            let expected = EvalContext::new(row, exec).matches(&whole).unwrap();
            let planned = plan.matches(row, exec).unwrap();
            prop_assert_eq!(planned, expected, "expression: {}, row: {:?}", text, row);
        }
        prop_assert_eq!(plan.can_query, plan.key_condition.is_some());
        prop_assert_eq!(plan.can_query, plan.expression.key_condition.is_some());
    }

    #[test]
    fn test_should_reparse_rendered_expressions(expr in arb_expr()) {
        let rendered = expr.to_string();
        let reparsed = parse(&rendered);
        prop_assert!(reparsed.is_ok(), "rendered form {:?} failed: {:?}", rendered, reparsed);
        prop_assert_eq!(reparsed.unwrap(), expr, "rendered form: {}", rendered);
    }

    #[test]
    fn test_should_fold_is_not_like_negated_is(
        row in arb_table().prop_flat_map(|table| arb_row(&table.types)),
        name in prop_oneof![Just("n"), Just("active"), Just("missing"), Just("pk"), Just("gs")],
        type_name in prop_oneof![Just("ANY"), Just("S"), Just("N"), Just("B"), Just("BOOL"), Just("any")],
    ) {
        let schema = TableSchema::new(
            "t",
            KeySchema {
                partition_key: KeyAttribute::new("pk", ScalarAttributeType::S),
                sort_key: None,
            },
        );
        let eval = |text: String| {
            let ir = lower(&parse(&text).unwrap(), &schema).unwrap();
            EvalContext::new(&row, ExecContext::empty()).matches(&ir).unwrap()
        };
        let folded = eval(format!(r#"{name} is not "{type_name}""#));
        let wrapped = eval(format!(r#"not ({name} is "{type_name}")"#));
        let plain = eval(format!(r#"{name} is "{type_name}""#));
        prop_assert_eq!(folded, wrapped);
        prop_assert_eq!(folded, !plain);
    }

    #[test]
    fn test_should_fail_ordering_exactly_when_kinds_differ(left in arb_value(), right in arb_value()) {
        let comparable = (is_number(&left) && is_number(&right))
            || (is_string(&left) && is_string(&right));
        for op in [CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge] {
            match compare(op, &left, &right) {
                Ok(_) => prop_assert!(comparable),
                Err(QueryError::NotComparable { .. }) => prop_assert!(!comparable),
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }
        prop_assert!(compare(CompareOp::Eq, &left, &right).is_ok());
        prop_assert_eq!(
            compare(CompareOp::Eq, &left, &right).unwrap(),
            !compare(CompareOp::Ne, &left, &right).unwrap()
        );
    }

    #[test]
    fn test_should_always_report_wrong_arity(count in 0usize..6) {
        let arities: BTreeMap<&str, (usize, usize)> = [
            ("size", (1, 1)),
            ("range", (2, 2)),
            ("csv", (2, 3)),
            ("marked", (1, 1)),
            ("mapstr", (2, 2)),
            ("pasteboard", (0, 0)),
            ("_x_now", (0, 0)),
            ("_x_add", (2, 2)),
            ("_x_concat", (2, 2)),
        ]
        .into_iter()
        .collect();
        prop_assert_eq!(arities.keys().copied().collect::<Vec<_>>(), builtins::names());

        for (name, (min, max)) in &arities {
            if (*min..=*max).contains(&count) {
                continue;
            }
            let func = builtins::lookup(name).unwrap();
            let args = vec![ExprValue::Int(1); count];
            match func(&ExecContext::empty(), &args) {
                Err(QueryError::InvalidArgumentNumber { name: reported, actual, .. }) => {
                    prop_assert_eq!(reported.as_str(), *name);
                    prop_assert_eq!(actual, count);
                }
                other => prop_assert!(false, "{name} with {count} args gave {other:?}"),
            }
        }
    }
}
