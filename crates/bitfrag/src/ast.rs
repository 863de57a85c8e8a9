//! Uncompiled schema declarations, as produced by [crate::parser] or built by hand.

use crate::value::{Record, Value};

/// Reserved entry name for an embedded, self-delimiting sub-message.
pub const MESSAGE_PLACEHOLDER: &str = "message";

/// Codec family named by a schema codec token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Static,
    Boolean,
    Integer,
    Float,
    Bytes,
    Hexa,
    Symbol,
    Void,
    Sequence,
    Alias,
    Array,
    Xor,
    List,
}

impl CodecKind {
    /// Case-insensitive lookup of a codec token name.
    pub fn from_token(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_uppercase().as_str() {
            "STATIC" => CodecKind::Static,
            "BOOLEAN" => CodecKind::Boolean,
            "INTEGER" | "NUMERIC" => CodecKind::Integer,
            "FLOAT" => CodecKind::Float,
            "BYTES" => CodecKind::Bytes,
            "HEXA" => CodecKind::Hexa,
            "SYMBOL" => CodecKind::Symbol,
            "VOID" => CodecKind::Void,
            "SEQUENCE" => CodecKind::Sequence,
            "ALIAS" => CodecKind::Alias,
            "ARRAY" => CodecKind::Array,
            "XOR" => CodecKind::Xor,
            "LIST" => CodecKind::List,
            _ => return None,
        };

        Some(kind)
    }
}

/// A codec token with its type-converted arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecAst {
    pub kind: CodecKind,
    pub args: Vec<Value>,
}

impl CodecAst {
    pub fn new(kind: CodecKind, args: Vec<Value>) -> Self {
        Self { kind, args }
    }
}

/// One definition before its codec is bound to a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionDecl {
    pub name: String,
    pub binary_key: u64,
    pub codec: CodecAst,
    pub static_fields: Record,
    pub comment: Option<String>,
}

impl DefinitionDecl {
    pub fn new(name: impl Into<String>, binary_key: u64, codec: CodecAst) -> Self {
        Self {
            name: name.into(),
            binary_key,
            codec,
            static_fields: Record::new(),
            comment: None,
        }
    }

    pub fn with_static(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.static_fields.insert(field.into(), value.into());
        self
    }
}

/// Result of parsing a whole schema text.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDecl {
    pub key_bit_size: usize,
    pub definitions: Vec<DefinitionDecl>,
}

/// Converts a raw argument token: booleans, integers, decimals, else text.
pub fn convert_token(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(v) = raw.parse::<u64>() {
            return Value::U64(v);
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Value::I64(v);
        }
    }

    if let Some((int, frac)) = digits.split_once('.') {
        let int_ok = int.bytes().all(|b| b.is_ascii_digit());
        let frac_ok = !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit());
        if int_ok && frac_ok {
            if let Ok(v) = raw.parse::<f64>() {
                return Value::F64(v);
            }
        }
    }

    Value::Str(raw.to_string())
}
