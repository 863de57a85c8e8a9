//! A named, keyed definition bound to its compiled codec.

use crate::{
    bits::{BitReader, BitWriter},
    codec::Codec,
    configuration::Configuration,
    errors::{ReadError, WriteError},
    value::{FieldAccess, Record, Value},
};

/// Compiled definition. Built by [Configuration::compile] only.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub(crate) name: String,
    pub(crate) binary_key: u64,
    pub(crate) codec: Codec,
    pub(crate) static_fields: Record,
    pub(crate) comment: Option<String>,
}

impl Definition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key written in front of the fragment inside a message.
    pub fn binary_key(&self) -> u64 {
        self.binary_key
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Constant fields attached to every decoded fragment.
    pub fn static_fields(&self) -> &Record {
        &self.static_fields
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Writes the bare value (no key, no static check).
    pub fn write_value(
        &self,
        writer: &mut BitWriter,
        value: &Value,
        configuration: &Configuration,
        last: bool,
    ) -> Result<(), WriteError> {
        self.codec
            .write(writer, value, configuration, &self.name, last)
    }

    pub fn read_value(
        &self,
        reader: &mut BitReader<'_>,
        configuration: &Configuration,
    ) -> Result<Value, ReadError> {
        self.codec.read(reader, configuration, &self.name)
    }

    /// Writes the value found under this definition's name in `fragment`.
    ///
    /// Static fields present in `fragment` must hold their declared value.
    pub fn encode_fragment<F: FieldAccess + ?Sized>(
        &self,
        writer: &mut BitWriter,
        fragment: &F,
        configuration: &Configuration,
        last: bool,
    ) -> Result<(), WriteError> {
        for (field, expected) in &self.static_fields {
            match fragment.field(field) {
                Some(actual) if !actual.is_null() && actual != expected => {
                    return Err(WriteError::StaticMismatch {
                        field: field.clone(),
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
                _ => {}
            }
        }

        let value = fragment
            .field(&self.name)
            .filter(|value| !value.is_null())
            .ok_or_else(|| WriteError::MissingField(self.name.clone()))?;

        self.write_value(writer, value, configuration, last)
    }

    /// Reads one fragment: `{name: value}` plus the static fields.
    pub fn decode_fragment(
        &self,
        reader: &mut BitReader<'_>,
        configuration: &Configuration,
    ) -> Result<Record, ReadError> {
        let value = self.read_value(reader, configuration)?;

        let mut fragment = self.static_fields.clone();
        fragment.insert(self.name.clone(), value);

        Ok(fragment)
    }
}
