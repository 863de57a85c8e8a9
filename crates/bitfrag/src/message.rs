//! Message framing: `[binary_key][fragment]` tuples, optionally followed by a
//! zero key when more bits follow.

use tracing::trace;

use crate::{
    bits::{BitReader, BitWriter},
    configuration::Configuration,
    errors::{ReadError, WriteError},
    value::{Record, Value},
};

/// Writes every fragment with its binary key.
///
/// When `last` is false and no definition owns key 0, a zero key terminates
/// the message so a reader can tell where the enclosing structure resumes.
pub fn write_message(
    writer: &mut BitWriter,
    fragments: &[Value],
    configuration: &Configuration,
    last: bool,
) -> Result<(), WriteError> {
    let key_bits = configuration.key_bit_size();

    for (i, fragment) in fragments.iter().enumerate() {
        let definition = configuration.detect_definition(fragment)?;
        let start = writer.len();

        writer.write_bits(definition.binary_key(), key_bits)?;
        definition.encode_fragment(
            writer,
            fragment,
            configuration,
            last && i + 1 == fragments.len(),
        )?;

        trace!(
            definition = definition.name(),
            bits = writer.len() - start,
            "wrote fragment"
        );
    }

    if !last && configuration.definition_by_key(0).is_none() {
        writer.write_bits(0, key_bits)?;
    }

    Ok(())
}

/// Reads fragments until the bits run out or a zero key ends the message.
pub fn read_message(
    reader: &mut BitReader<'_>,
    configuration: &Configuration,
) -> Result<Vec<Record>, ReadError> {
    let key_bits = configuration.key_bit_size();
    let mut fragments = Vec::new();

    while reader.remaining_bits() >= key_bits {
        let start = reader.position();
        let key = reader.read_bits(key_bits)?;

        let definition = match configuration.definition_by_key(key) {
            Some(definition) => definition,
            None if key == 0 => break,
            None => return Err(ReadError::UnknownBinaryKey(key)),
        };

        fragments.push(definition.decode_fragment(reader, configuration)?);

        trace!(
            definition = definition.name(),
            bits = reader.position() - start,
            "read fragment"
        );
    }

    Ok(fragments)
}
