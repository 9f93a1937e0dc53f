//! Built-in functions callable from expressions.
//!
//! Built-ins are looked up by name when a call is lowered and invoked with
//! already-evaluated arguments plus the [`ExecContext`]. Each one validates its
//! own arity and argument capabilities.

use std::collections::HashMap;
use std::fs::File;
use std::sync::LazyLock;

use bigdecimal::{BigDecimal, ToPrimitive};

use super::context::ExecContext;
use super::value::{self, ExprValue};
use crate::error::QueryError;

/// Signature shared by every built-in.
pub type BuiltinFn = fn(&ExecContext<'_>, &[ExprValue]) -> Result<ExprValue, QueryError>;

/// Maximum number of data rows `csv()` returns.
pub const CSV_MAX_ROWS: usize = 100;

/// Maximum number of elements `range()` materializes.
pub const RANGE_MAX_LEN: i128 = 100_000;

static BUILTINS: LazyLock<HashMap<&'static str, BuiltinFn>> = LazyLock::new(|| {
    let entries: [(&'static str, BuiltinFn); 9] = [
        ("size", size),
        ("range", range),
        ("csv", csv),
        ("marked", marked),
        ("mapstr", mapstr),
        ("pasteboard", pasteboard),
        ("_x_now", x_now),
        ("_x_add", x_add),
        ("_x_concat", x_concat),
    ];
    entries.into_iter().collect()
});

/// Looks up a built-in by name.
#[must_use]
pub fn lookup(name: &str) -> Option<BuiltinFn> {
    BUILTINS.get(name).copied()
}

/// Names of every registered built-in, sorted.
#[must_use]
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = BUILTINS.keys().copied().collect();
    names.sort_unstable();
    names
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn check_arity(name: &str, args: &[ExprValue], min: usize, max: usize) -> Result<(), QueryError> {
    let actual = args.len();
    if actual < min || actual > max {
        return Err(QueryError::InvalidArgumentNumber {
            name: name.to_owned(),
            expected: if actual < min { min } else { max },
            actual,
        });
    }
    Ok(())
}

fn invalid_type(name: &str, arg_index: usize, expected: &'static str) -> QueryError {
    QueryError::InvalidArgumentType {
        name: name.to_owned(),
        arg_index,
        expected,
    }
}

fn number_arg(name: &str, args: &[ExprValue], idx: usize) -> Result<BigDecimal, QueryError> {
    args[idx]
        .as_number_like()
        .map(|n| n.to_decimal())
        .ok_or_else(|| invalid_type(name, idx, "N"))
}

/// Truncates toward zero.
///
/// Bounds are checked before rescaling: `with_scale` materializes
/// `10^exponent`, which never finishes for literals like `1e2000000000`.
fn truncate_to_i64(name: &str, value: &BigDecimal) -> Result<i64, QueryError> {
    let out_of_range =
        || QueryError::UnsupportedOperation(format!("{name}(): number is out of range"));

    let upper = BigDecimal::from(1_i128 << 63);
    let lower = BigDecimal::from(-(1_i128 << 63) - 1);
    if *value >= upper || *value <= lower {
        return Err(out_of_range());
    }
    if value.abs() < BigDecimal::from(1) {
        return Ok(0);
    }
    value.with_scale(0).to_i64().ok_or_else(out_of_range)
}

fn int_from_len(len: usize) -> ExprValue {
    ExprValue::Int(i64::try_from(len).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// `size(x)`: characters of a string, entries of a map, elements of a list.
fn size(_ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("size", args, 1, 1)?;
    Ok(int_from_len(args[0].size()?))
}

/// `range(lo, hi)`: integers from `lo` to `hi` inclusive, empty when `lo > hi`.
fn range(_ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("range", args, 2, 2)?;
    let lo = truncate_to_i64("range", &number_arg("range", args, 0)?)?;
    let hi = truncate_to_i64("range", &number_arg("range", args, 1)?)?;

    if lo > hi {
        return Ok(ExprValue::List(Vec::new()));
    }
    if i128::from(hi) - i128::from(lo) + 1 > RANGE_MAX_LEN {
        return Err(QueryError::UnsupportedOperation(format!(
            "range(): more than {RANGE_MAX_LEN} elements"
        )));
    }
    Ok(ExprValue::List((lo..=hi).map(ExprValue::Int).collect()))
}

/// `csv(path, field [, start])`: up to [`CSV_MAX_ROWS`] values of one column.
fn csv(_ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("csv", args, 2, 3)?;
    let path = args[0]
        .as_stringable()
        .ok_or_else(|| invalid_type("csv", 0, "S"))?;
    let field = args[1]
        .as_string_like()
        .ok_or_else(|| invalid_type("csv", 1, "S"))?
        .as_str();
    let start = match args.get(2) {
        Some(_) => {
            let n = truncate_to_i64("csv", &number_arg("csv", args, 2)?)?;
            usize::try_from(n.max(0)).unwrap_or(usize::MAX)
        }
        None => 0,
    };

    let file = File::open(&*path)?;
    let mut reader = ::csv::ReaderBuilder::new().from_reader(file);
    let column = reader
        .headers()?
        .iter()
        .position(|h| h == field)
        .ok_or_else(|| QueryError::CsvHeaderNotFound(field.to_owned()))?;

    let mut records = reader.records();
    for skipped in records.by_ref().take(start) {
        skipped?;
    }
    let mut values = Vec::new();
    for record in records.take(CSV_MAX_ROWS) {
        let record = record?;
        values.push(ExprValue::String(
            record.get(column).unwrap_or_default().to_owned(),
        ));
    }
    Ok(ExprValue::List(values))
}

/// `marked(field)`: the field's value from every marked row that has it.
fn marked(ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("marked", args, 1, 1)?;
    let field = args[0]
        .as_stringable()
        .ok_or_else(|| invalid_type("marked", 0, "S"))?;

    let Some(result_set) = ctx.result_set else {
        return Ok(ExprValue::List(Vec::new()));
    };

    let mut values = Vec::new();
    for index in 0..result_set.row_count() {
        if !result_set.is_marked(index) {
            continue;
        }
        let Some(attr) = result_set.row(index).and_then(|row| row.get(field.as_ref())) else {
            continue;
        };
        let value = ExprValue::try_from(attr).map_err(|err| QueryError::MarkedItem {
            index,
            attr: field.clone().into_owned(),
            source: Box::new(err),
        })?;
        values.push(value);
    }
    Ok(ExprValue::List(values))
}

/// `mapstr(list, pattern)`: replaces every `{}` in the pattern with each
/// element's string form. Elements with no string form (lists, maps, null,
/// binaries) pass through as-is. A number-set element that does not parse
/// fails with [`QueryError::NotConvertibleToString`].
fn mapstr(_ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("mapstr", args, 2, 2)?;
    let list = args[0]
        .as_list_like()
        .ok_or_else(|| invalid_type("mapstr", 0, "L"))?;
    let pattern = args[1]
        .as_stringable()
        .ok_or_else(|| invalid_type("mapstr", 1, "S"))?;

    let values = (0..list.len())
        .map(|idx| {
            let item = list.value_at(idx).ok_or_else(|| {
                QueryError::NotConvertibleToString(format!("{}[{idx}]", args[0]))
            })?;
            let mapped = item.as_stringable().map(|s| pattern.replace("{}", &s));
            Ok(mapped.map_or(item, ExprValue::String))
        })
        .collect::<Result<_, QueryError>>()?;
    Ok(ExprValue::List(values))
}

/// `pasteboard()`: clipboard text split into lines.
fn pasteboard(ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("pasteboard", args, 0, 0)?;
    let text = ctx
        .clipboard
        .and_then(|clipboard| clipboard.read_text())
        .unwrap_or_default();
    if text.is_empty() {
        return Ok(ExprValue::List(Vec::new()));
    }
    Ok(ExprValue::List(
        text.split('\n')
            .map(|line| ExprValue::String(line.to_owned()))
            .collect(),
    ))
}

/// `_x_now()`: seconds since the Unix epoch.
fn x_now(ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("_x_now", args, 0, 0)?;
    Ok(ExprValue::Int(ctx.now().timestamp()))
}

/// `_x_add(a, b)`: arbitrary-precision sum.
fn x_add(_ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("_x_add", args, 2, 2)?;
    number_arg("_x_add", args, 0)?;
    number_arg("_x_add", args, 1)?;
    value::add(&args[0], &args[1])
}

/// `_x_concat(a, b)`: concatenated string forms.
fn x_concat(_ctx: &ExecContext<'_>, args: &[ExprValue]) -> Result<ExprValue, QueryError> {
    check_arity("_x_concat", args, 2, 2)?;
    let a = args[0]
        .as_stringable()
        .ok_or_else(|| invalid_type("_x_concat", 0, "S"))?;
    let b = args[1]
        .as_stringable()
        .ok_or_else(|| invalid_type("_x_concat", 1, "S"))?;
    Ok(ExprValue::String(format!("{a}{b}")))
}
