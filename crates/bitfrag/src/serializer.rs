//! Top-level encode/decode entry points.

use tracing::trace;

use crate::{
    bits::{BitReader, BitWriter},
    configuration::Configuration,
    definition::Definition,
    errors::{ReadError, WriteError},
    message,
    value::{Record, Value},
};

/// Packed output of a serialization: bytes plus the number of meaningful bits.
///
/// Bits of the last byte past `bit_len` are zero padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub bit_len: usize,
}

impl Encoded {
    fn from_writer(writer: BitWriter) -> Self {
        let bit_len = writer.len();
        Self {
            bytes: writer.into_bytes(),
            bit_len,
        }
    }
}

/// Encodes single fragments or whole messages against a [Configuration].
#[derive(Debug, Clone, Copy)]
pub struct Serializer<'a> {
    configuration: &'a Configuration,
}

impl<'a> Serializer<'a> {
    pub fn new(configuration: &'a Configuration) -> Self {
        Self { configuration }
    }

    pub fn configuration(&self) -> &'a Configuration {
        self.configuration
    }

    /// Encodes `value` as the fragment of the definition `name`, without key.
    ///
    /// `value` is the payload itself, not a record keyed by `name`.
    pub fn serialize(&self, name: &str, value: &Value) -> Result<Encoded, WriteError> {
        let definition = self
            .configuration
            .definition(name)
            .ok_or_else(|| WriteError::UnknownDefinition(name.to_string()))?;
        if value.as_record().is_some_and(|record| record.contains_key(name)) {
            return Err(WriteError::NestedDefinitionKey(name.to_string()));
        }

        let fragment = Record::from([(name.to_string(), value.clone())]);

        let mut writer = BitWriter::new();
        definition.encode_fragment(&mut writer, &fragment, self.configuration, true)?;

        trace!(definition = name, bits = writer.len(), "serialized fragment");
        Ok(Encoded::from_writer(writer))
    }

    /// Encodes a message: each fragment is detected by name and prefixed with
    /// its binary key.
    pub fn serialize_message(&self, fragments: &[Value]) -> Result<Encoded, WriteError> {
        let mut writer = BitWriter::new();
        message::write_message(&mut writer, fragments, self.configuration, true)?;

        trace!(
            fragments = fragments.len(),
            bits = writer.len(),
            "serialized message"
        );
        Ok(Encoded::from_writer(writer))
    }

    /// Decodes a single fragment of `name`: `{name: value}` plus static fields.
    pub fn deserialize(&self, name: &str, bytes: &[u8]) -> Result<Record, ReadError> {
        let definition: &Definition = self
            .configuration
            .definition(name)
            .ok_or_else(|| ReadError::UnknownDefinition(name.to_string()))?;

        let mut reader = BitReader::new(bytes);
        let fragment = definition.decode_fragment(&mut reader, self.configuration)?;

        trace!(definition = name, bits = reader.position(), "deserialized fragment");
        Ok(fragment)
    }

    /// Decodes a message until the bits run out or a zero key ends it.
    pub fn deserialize_message(&self, bytes: &[u8]) -> Result<Vec<Record>, ReadError> {
        let mut reader = BitReader::new(bytes);
        let fragments = message::read_message(&mut reader, self.configuration)?;

        trace!(
            fragments = fragments.len(),
            bits = reader.position(),
            "deserialized message"
        );
        Ok(fragments)
    }
}
