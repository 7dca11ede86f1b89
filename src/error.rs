use parse_display::Display;

/// Errors raised by operations on states.
///
/// All of them describe programmer or schema errors; none is transient.
#[non_exhaustive]
#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[display("member `{0}` is already bound to a different state")]
    IllegalRebind(String),
    #[display("`{0}` is a computed member and cannot be bound explicitly")]
    ComputedMember(String),
    #[display("cannot copy values from `{found}` into `{expected}`")]
    TypeMismatch { expected: String, found: String },
    #[display("expected {expected}, found {found}")]
    SchemaMismatch {
        expected: &'static str,
        found: String,
    },
    #[display("unknown member `{0}`")]
    UnknownMember(String),
    #[display("`{0}` cannot be serialized")]
    UnserializableKind(String),
    #[display("non-finite float `{0}` cannot be serialized")]
    NonFiniteFloat(String),
    #[display("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    #[display("state is already attached to a parent")]
    AlreadyAttached,
    #[display("callback not found")]
    CallbackNotFound,
    #[display("element not found")]
    ElementNotFound,
    #[display("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

impl std::error::Error for StateError {}

impl StateError {
    pub(crate) fn schema(expected: &'static str, found: &serde_json::Value) -> Self {
        StateError::SchemaMismatch {
            expected,
            found: value_kind(found).to_string(),
        }
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
