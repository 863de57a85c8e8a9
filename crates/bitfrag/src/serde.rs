//! JSON bridge, behind the `serde` feature.
//!
//! Two things live here:
//! - conversions between [Value] and `serde_json::Value`, so application
//!   records can be built from (and rendered to) JSON documents;
//! - [SchemaDef], a JSON-deserializable description of a schema that
//!   compiles into a [Configuration] like parsed schema text does.

use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq};
use serde_json::{Map, Number};

use crate::{
    ast::{CodecAst, CodecKind, DefinitionDecl},
    configuration::{Configuration, DEFAULT_KEY_BIT_SIZE},
    errors::CompileError,
    value::{Record, Value},
};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Value::U64(v)
                } else if let Some(v) = n.as_i64() {
                    Value::I64(v)
                } else {
                    Value::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Record(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Record>(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::I64(v) => serde_json::Value::Number(v.into()),
            Value::U64(v) => serde_json::Value::Number(v.into()),
            // Non-finite floats have no JSON form.
            Value::F64(v) => Number::from_f64(v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Bytes(bytes) => serde_json::Value::Array(
                bytes
                    .into_iter()
                    .map(|b| serde_json::Value::Number(b.into()))
                    .collect(),
            ),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Record(record) => serde_json::Value::Object(
                record
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Record(record) => {
                let mut map = serializer.serialize_map(Some(record.len()))?;
                for (k, v) in record {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Top-level schema description.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchemaDef {
    /// Width of every binary key; defaults to 8.
    #[serde(default = "default_key_bit_size")]
    pub key_bit_size: usize,
    /// Definitions in registration order.
    pub definitions: Vec<DefinitionDef>,
}

fn default_key_bit_size() -> usize {
    DEFAULT_KEY_BIT_SIZE
}

/// One definition, with the same meaning as a schema text line.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DefinitionDef {
    pub name: String,
    pub binary_key: u64,
    /// Codec token name, e.g. `"INTEGER"` or `"xor"`.
    pub codec: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub static_fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl TryFrom<DefinitionDef> for DefinitionDecl {
    type Error = CompileError;

    fn try_from(def: DefinitionDef) -> Result<Self, Self::Error> {
        let kind = CodecKind::from_token(&def.codec).ok_or_else(|| {
            CompileError::InvalidArgument {
                definition: def.name.clone(),
                reason: format!("unknown codec `{}`", def.codec),
            }
        })?;

        Ok(DefinitionDecl {
            name: def.name,
            binary_key: def.binary_key,
            codec: CodecAst::new(kind, def.args.into_iter().map(Value::from).collect()),
            static_fields: def
                .static_fields
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect(),
            comment: def.comment,
        })
    }
}

impl TryFrom<SchemaDef> for Configuration {
    type Error = CompileError;

    fn try_from(def: SchemaDef) -> Result<Self, Self::Error> {
        let declarations = def
            .definitions
            .into_iter()
            .map(DefinitionDecl::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Configuration::compile(def.key_bit_size, declarations)
    }
}
