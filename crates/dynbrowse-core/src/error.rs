//! Error types for the query engine.

/// Every failure the engine can report.
///
/// Errors are returned as values; the engine never logs or swallows them.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The expression text could not be parsed.
    #[error("syntax error at position {position}: unexpected {found}, expected {expected}")]
    Syntax {
        /// 0-based character offset of the offending token.
        position: usize,
        /// The offending token as written.
        found: String,
        /// What the parser was looking for.
        expected: String,
    },

    /// A name path did not resolve in the row.
    #[error("{0}: name not found")]
    NameNotFound(String),

    /// A path descended into a value that is not a map.
    #[error("{0}: name is not a map")]
    ValueNotAMap(String),

    /// The operator is not defined for the two operand kinds.
    #[error("values '{left}' and '{right}' are not comparable")]
    NotComparable {
        /// Rendered left operand.
        left: String,
        /// Rendered right operand.
        right: String,
    },

    /// A value has no string form.
    #[error("value '{0}' is not convertible to string")]
    NotConvertibleToString(String),

    /// The left side of `is` is not a name path.
    #[error("{0}: operand is not a name")]
    OperandNotAName(String),

    /// The right side of `is` is not a literal.
    #[error("{0}: value must be a literal")]
    ValueMustBeLiteral(String),

    /// The right side of `is` is a literal but not a string.
    #[error("{0}: value must be a string")]
    ValueMustBeString(String),

    /// The type name on the right side of `is` is unknown.
    #[error("invalid type for 'is': {type_name}")]
    InvalidTypeForIs {
        /// The type name as written.
        type_name: String,
    },

    /// A built-in was called with the wrong number of arguments.
    #[error("function '{name}' expected {expected} args but received {actual}")]
    InvalidArgumentNumber {
        /// Function name.
        name: String,
        /// Expected argument count.
        expected: usize,
        /// Actual argument count.
        actual: usize,
    },

    /// A built-in argument does not have the required capability.
    #[error("function '{name}' expected arg {arg_index} to be of type {expected}")]
    InvalidArgumentType {
        /// Function name.
        name: String,
        /// 0-based argument position.
        arg_index: usize,
        /// Required type descriptor ("S", "N", "L").
        expected: &'static str,
    },

    /// A call names a function that is not registered.
    #[error("{0}: unknown function")]
    UnknownFunction(String),

    /// A `csv()` file has no column with the requested header.
    #[error("{0}: csv header not found")]
    CsvHeaderNotFound(String),

    /// Converting a marked row's attribute failed.
    #[error("marked(): item {index}, attr {attr}: {source}")]
    MarkedItem {
        /// Row index in the result set.
        index: usize,
        /// The attribute name.
        attr: String,
        /// The conversion failure.
        #[source]
        source: Box<QueryError>,
    },

    /// The operation is not defined for the value, or cannot be expressed.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A mutation was attempted on a read-only result set.
    #[error("result set is read-only")]
    ReadOnly,

    /// A row index is outside the result set.
    #[error("row {0} is out of range")]
    RowOutOfRange(usize),

    /// I/O failure while reading a file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed CSV input.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Convenience result type for engine operations.
pub type QueryResult<T> = Result<T, QueryError>;
