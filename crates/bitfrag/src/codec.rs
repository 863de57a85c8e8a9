//! Compiled codecs: a closed set of leaf and composite encodings.
//!
//! A codec never owns a buffer nor a back-pointer to its configuration.
//! Composite codecs refer to other definitions by name and resolve them
//! through the [Configuration] passed to every `write`/`read` call.
//!
//! The `last` flag threaded through `write` tells whether nothing can follow
//! the value in the stream. Open-ended encodings (message placeholders and
//! lists) only emit their zero terminator when `last` is false.

use crate::{
    ast::{CodecAst, CodecKind, MESSAGE_PLACEHOLDER},
    bits::{BitReader, BitWriter, index_bits, max_value},
    configuration::Configuration,
    errors::{CompileError, ReadError, WriteError},
    message,
    value::{FieldAccess, Record, Value},
};

/// One slot of a composite codec: a named definition or the message placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Definition(String),
    Message,
}

impl Entry {
    /// Field name carrying this entry's value.
    pub fn name(&self) -> &str {
        match self {
            Entry::Definition(name) => name,
            Entry::Message => MESSAGE_PLACEHOLDER,
        }
    }
}

/// Linear quantization of `[min, max]` onto `bits` bits.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatCodec {
    pub bits: usize,
    pub min: f64,
    pub max: f64,
}

impl FloatCodec {
    fn encode(&self, value: f64) -> u64 {
        let max_int = max_value(self.bits) as f64;
        let scaled = ((value - self.min) / (self.max - self.min) * max_int).round();

        (scaled.clamp(0.0, max_int) as u64).min(max_value(self.bits))
    }

    fn decode(&self, raw: u64) -> f64 {
        let max_int = max_value(self.bits) as f64;
        raw as f64 / max_int * (self.max - self.min) + self.min
    }
}

/// Index into a fixed, ordered symbol list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolCodec {
    pub bits: usize,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorOption {
    pub selector: u64,
    pub entry: Entry,
}

/// Tagged union. Positional unions use the option index as selector,
/// keyed unions use the selector declared in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorCodec {
    pub bits: usize,
    pub keyed: bool,
    pub options: Vec<XorOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Codec {
    Static(Value),
    Boolean,
    Integer { bits: usize },
    Float(FloatCodec),
    Bytes { len: usize },
    Hexa { len: usize },
    Symbol(SymbolCodec),
    Void,
    Sequence(Vec<Entry>),
    Alias(String),
    Array { length_bits: usize, elements: Vec<Entry> },
    Xor(XorCodec),
    List(String),
}

/// Name table visible while compiling one definition's codec.
pub struct Scope<'a> {
    /// Definition being compiled.
    pub definition: &'a str,
    /// Every registered definition, in registration order.
    pub names: &'a [String],
}

impl Scope<'_> {
    fn invalid(&self, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidArgument {
            definition: self.definition.to_string(),
            reason: reason.into(),
        }
    }

    fn reference(&self, arg: &Value) -> Result<String, CompileError> {
        let name = arg_text(arg);
        if self.names.iter().any(|n| *n == name) {
            Ok(name)
        } else {
            Err(CompileError::UnknownReference {
                definition: self.definition.to_string(),
                reference: name,
            })
        }
    }

    fn entry(&self, arg: &Value) -> Result<Entry, CompileError> {
        if arg.as_str() == Some(MESSAGE_PLACEHOLDER) {
            Ok(Entry::Message)
        } else {
            self.reference(arg).map(Entry::Definition)
        }
    }

    /// Entries where the placeholder may only appear once, in last position.
    fn trailing_entries(&self, args: &[Value]) -> Result<Vec<Entry>, CompileError> {
        let entries = args
            .iter()
            .map(|arg| self.entry(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let misplaced = entries
            .iter()
            .rev()
            .skip(1)
            .any(|entry| *entry == Entry::Message);
        if misplaced {
            return Err(CompileError::MisplacedMessage(self.definition.to_string()));
        }

        Ok(entries)
    }

    fn bits(&self, arg: Option<&Value>, what: &str, min: usize) -> Result<usize, CompileError> {
        arg.and_then(Value::as_u64)
            .map(|bits| bits as usize)
            .filter(|bits| (min..=64).contains(bits))
            .ok_or_else(|| self.invalid(format!("{what} must be an integer in {min}..=64")))
    }
}

fn arg_text(arg: &Value) -> String {
    match arg {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_selector(raw: &str) -> Option<u64> {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

impl Codec {
    /// Compiles a codec AST against the registered definition names.
    pub fn compile(ast: &CodecAst, scope: &Scope<'_>) -> Result<Self, CompileError> {
        let args = ast.args.as_slice();
        let expect_args = |count: usize| {
            if args.len() == count {
                Ok(())
            } else {
                Err(scope.invalid(format!("expected {count} arguments, got {}", args.len())))
            }
        };

        let codec = match ast.kind {
            CodecKind::Static => {
                if args.len() > 1 {
                    return Err(scope.invalid("STATIC takes at most one value"));
                }
                Codec::Static(args.first().cloned().unwrap_or(Value::Bool(true)))
            }
            CodecKind::Boolean => {
                expect_args(0)?;
                Codec::Boolean
            }
            CodecKind::Void => {
                expect_args(0)?;
                Codec::Void
            }
            CodecKind::Integer => {
                expect_args(1)?;
                Codec::Integer {
                    bits: scope.bits(args.first(), "bit length", 1)?,
                }
            }
            CodecKind::Float => {
                expect_args(3)?;
                let bits = scope.bits(args.first(), "bit length", 1)?;
                let (Some(min), Some(max)) = (args[1].as_f64(), args[2].as_f64()) else {
                    return Err(scope.invalid("FLOAT bounds must be numbers"));
                };
                if !(min.is_finite() && max.is_finite() && max > min) {
                    return Err(scope.invalid("FLOAT max must exceed min"));
                }
                Codec::Float(FloatCodec { bits, min, max })
            }
            CodecKind::Bytes | CodecKind::Hexa => {
                expect_args(1)?;
                let len = args[0]
                    .as_u64()
                    .filter(|len| *len > 0)
                    .ok_or_else(|| scope.invalid("byte length must be a positive integer"))?
                    as usize;
                if ast.kind == CodecKind::Bytes {
                    Codec::Bytes { len }
                } else {
                    Codec::Hexa { len }
                }
            }
            CodecKind::Symbol => Codec::Symbol(compile_symbol(args, scope)?),
            CodecKind::Sequence => {
                if args.is_empty() {
                    return Err(scope.invalid("SEQUENCE needs at least one entry"));
                }
                Codec::Sequence(scope.trailing_entries(args)?)
            }
            CodecKind::Alias => {
                expect_args(1)?;
                if args[0].as_str() == Some(MESSAGE_PLACEHOLDER) {
                    return Err(CompileError::MisplacedMessage(scope.definition.to_string()));
                }
                Codec::Alias(scope.reference(&args[0])?)
            }
            CodecKind::Array => {
                if args.len() < 2 {
                    return Err(scope.invalid("ARRAY needs a length width and an element"));
                }
                Codec::Array {
                    length_bits: scope.bits(args.first(), "length width", 1)?,
                    elements: scope.trailing_entries(&args[1..])?,
                }
            }
            CodecKind::Xor => Codec::Xor(compile_xor(args, scope)?),
            CodecKind::List => {
                expect_args(1)?;
                Codec::List(scope.reference(&args[0])?)
            }
        };

        Ok(codec)
    }

    /// Writes `value` for the definition `name`.
    pub fn write(
        &self,
        writer: &mut BitWriter,
        value: &Value,
        configuration: &Configuration,
        name: &str,
        last: bool,
    ) -> Result<(), WriteError> {
        let invalid = |expected: &'static str| WriteError::InvalidValue {
            definition: name.to_string(),
            expected,
        };
        let out_of_range = || WriteError::OutOfRange {
            definition: name.to_string(),
            value: value.to_string(),
        };

        match self {
            Codec::Static(constant) => {
                if !value.is_null() && value != constant {
                    return Err(WriteError::StaticMismatch {
                        field: name.to_string(),
                        expected: constant.to_string(),
                        actual: value.to_string(),
                    });
                }
            }
            Codec::Boolean => {
                let bit = match value {
                    Value::Bool(b) => *b,
                    other => match other.as_u64() {
                        Some(0) => false,
                        Some(1) => true,
                        _ => return Err(invalid("a boolean or 0/1")),
                    },
                };
                writer.write_bool(bit);
            }
            Codec::Integer { bits } => {
                let raw = value
                    .as_u64()
                    .ok_or_else(|| invalid("a non-negative integer"))?;
                if raw > max_value(*bits) {
                    return Err(out_of_range());
                }
                writer.write_bits(raw, *bits)?;
            }
            Codec::Float(float) => {
                let v = value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| invalid("a finite number"))?;
                if v < float.min || v > float.max {
                    return Err(out_of_range());
                }
                writer.write_bits(float.encode(v), float.bits)?;
            }
            Codec::Bytes { len } => {
                let bytes = payload_bytes(value, false).ok_or_else(|| {
                    invalid("a byte string, a 0x-prefixed hex string or a byte list")
                })?;
                check_len(name, *len, bytes.len())?;
                writer.write_bytes(&bytes);
            }
            Codec::Hexa { len } => {
                let bytes = payload_bytes(value, true)
                    .ok_or_else(|| invalid("a hex string or a byte list"))?;
                check_len(name, *len, bytes.len())?;
                writer.write_bytes(&bytes);
            }
            Codec::Symbol(symbol) => {
                let text = match value {
                    Value::Str(s) => s.clone(),
                    Value::U64(_) | Value::I64(_) | Value::Bool(_) => value.to_string(),
                    _ => return Err(invalid("a symbol")),
                };
                let index = symbol
                    .symbols
                    .iter()
                    .position(|s| *s == text)
                    .ok_or_else(out_of_range)?;
                writer.write_bits(index as u64, symbol.bits)?;
            }
            Codec::Void => {
                if !matches!(value, Value::Null | Value::Bool(true)) {
                    return Err(invalid("nothing or true"));
                }
            }
            Codec::Sequence(entries) => {
                write_entries(writer, entries, value, configuration, name, last)?;
            }
            Codec::Alias(target) => {
                configuration
                    .definition(target)
                    .ok_or_else(|| WriteError::UnknownDefinition(target.clone()))?
                    .write_value(writer, value, configuration, last)?;
            }
            Codec::Array {
                length_bits,
                elements,
            } => {
                let items = value.as_array().ok_or_else(|| invalid("a list"))?;
                let count = items.len() as u64;
                if count > max_value(*length_bits) {
                    return Err(WriteError::OutOfRange {
                        definition: name.to_string(),
                        value: format!("{count} items"),
                    });
                }

                writer.write_bits(count, *length_bits)?;
                for item in items {
                    match elements.as_slice() {
                        [single] => write_entry(writer, single, item, configuration, false)?,
                        _ => write_entries(writer, elements, item, configuration, name, false)?,
                    }
                }
            }
            Codec::Xor(xor) => xor.write(writer, value, configuration, name, last)?,
            Codec::List(target) => {
                let xor = configuration
                    .union(target)
                    .ok_or_else(|| WriteError::UnknownDefinition(target.clone()))?;
                let items = value.as_array().ok_or_else(|| invalid("a list"))?;

                for (i, item) in items.iter().enumerate() {
                    let item_last = last && i + 1 == items.len();
                    xor.write(writer, item, configuration, target, item_last)?;
                }
                if !last {
                    writer.write_bits(0, xor.bits)?;
                }
            }
        }

        Ok(())
    }

    /// Reads a value for the definition `name`.
    pub fn read(
        &self,
        reader: &mut BitReader<'_>,
        configuration: &Configuration,
        name: &str,
    ) -> Result<Value, ReadError> {
        let value = match self {
            Codec::Static(constant) => constant.clone(),
            Codec::Boolean => Value::Bool(reader.read_bool()?),
            Codec::Integer { bits } => Value::U64(reader.read_bits(*bits)?),
            Codec::Float(float) => Value::F64(float.decode(reader.read_bits(float.bits)?)),
            Codec::Bytes { len } => Value::Bytes(reader.read_bytes(*len)?),
            Codec::Hexa { len } => {
                Value::Str(format!("0x{}", hex::encode_upper(reader.read_bytes(*len)?)))
            }
            Codec::Symbol(symbol) => {
                let index = reader.read_bits(symbol.bits)?;
                let text = symbol.symbols.get(index as usize).ok_or_else(|| {
                    ReadError::UnknownSymbol {
                        definition: name.to_string(),
                        index,
                    }
                })?;
                Value::Str(text.clone())
            }
            Codec::Void => Value::Bool(true),
            Codec::Sequence(entries) => {
                Value::Record(read_entries(reader, entries, configuration)?)
            }
            Codec::Alias(target) => configuration
                .definition(target)
                .ok_or_else(|| ReadError::UnknownDefinition(target.clone()))?
                .read_value(reader, configuration)?,
            Codec::Array {
                length_bits,
                elements,
            } => {
                let count = reader.read_bits(*length_bits)?;
                let mut items = Vec::new();
                for _ in 0..count {
                    let item = match elements.as_slice() {
                        [single] => read_entry(reader, single, configuration)?,
                        _ => Value::Record(read_entries(reader, elements, configuration)?),
                    };
                    items.push(item);
                }
                Value::Array(items)
            }
            Codec::Xor(xor) => xor.read(reader, configuration, name)?,
            Codec::List(target) => {
                let xor = configuration
                    .union(target)
                    .ok_or_else(|| ReadError::UnknownDefinition(target.clone()))?;

                let mut items = Vec::new();
                while reader.remaining_bits() >= xor.bits {
                    let selector = reader.read_bits(xor.bits)?;
                    if selector == 0 {
                        break;
                    }
                    items.push(xor.read_option(reader, configuration, target, selector)?);
                }
                Value::Array(items)
            }
        };

        Ok(value)
    }
}

impl XorCodec {
    fn write(
        &self,
        writer: &mut BitWriter,
        value: &Value,
        configuration: &Configuration,
        name: &str,
        last: bool,
    ) -> Result<(), WriteError> {
        let mut active = self
            .options
            .iter()
            .filter(|option| value.has_value(option.entry.name()));

        let (Some(option), None) = (active.next(), active.next()) else {
            let count = self
                .options
                .iter()
                .filter(|option| value.has_value(option.entry.name()))
                .count();
            return Err(WriteError::InvalidOption {
                definition: name.to_string(),
                active: count,
            });
        };

        let payload = value
            .field(option.entry.name())
            .ok_or_else(|| WriteError::MissingField(option.entry.name().to_string()))?;

        writer.write_bits(option.selector, self.bits)?;
        write_entry(writer, &option.entry, payload, configuration, last)
    }

    fn read(
        &self,
        reader: &mut BitReader<'_>,
        configuration: &Configuration,
        name: &str,
    ) -> Result<Value, ReadError> {
        let selector = reader.read_bits(self.bits)?;
        self.read_option(reader, configuration, name, selector)
    }

    fn read_option(
        &self,
        reader: &mut BitReader<'_>,
        configuration: &Configuration,
        name: &str,
        selector: u64,
    ) -> Result<Value, ReadError> {
        let option = self
            .options
            .iter()
            .find(|option| option.selector == selector)
            .ok_or_else(|| ReadError::UnknownSelector {
                definition: name.to_string(),
                selector,
            })?;

        let value = read_entry(reader, &option.entry, configuration)?;
        Ok(Value::Record(Record::from([(
            option.entry.name().to_string(),
            value,
        )])))
    }
}

fn compile_symbol(args: &[Value], scope: &Scope<'_>) -> Result<SymbolCodec, CompileError> {
    let (explicit_bits, symbols) = match args {
        [Value::U64(bits), rest @ ..] if !rest.is_empty() => (Some(*bits as usize), rest),
        _ => (None, args),
    };
    if symbols.is_empty() {
        return Err(scope.invalid("SYMBOL needs at least one symbol"));
    }

    let symbols: Vec<String> = symbols.iter().map(arg_text).collect();
    for (i, symbol) in symbols.iter().enumerate() {
        if symbols[..i].contains(symbol) {
            return Err(scope.invalid(format!("duplicate symbol `{symbol}`")));
        }
    }

    let needed = index_bits(symbols.len());
    let bits = explicit_bits.unwrap_or(needed);
    if bits < needed || bits > 64 {
        return Err(scope.invalid(format!(
            "{bits} bits cannot index {} symbols",
            symbols.len()
        )));
    }

    Ok(SymbolCodec { bits, symbols })
}

fn compile_xor(args: &[Value], scope: &Scope<'_>) -> Result<XorCodec, CompileError> {
    let codec = match args {
        [] => return Err(scope.invalid("XOR needs at least one option")),
        [wildcard] if wildcard.as_str() == Some("*") => {
            let options: Vec<XorOption> = scope
                .names
                .iter()
                .filter(|name| *name != scope.definition)
                .enumerate()
                .map(|(i, name)| XorOption {
                    selector: i as u64,
                    entry: Entry::Definition(name.clone()),
                })
                .collect();
            if options.is_empty() {
                return Err(scope.invalid("XOR(*) has no other definition to select"));
            }

            XorCodec {
                bits: index_bits(options.len()),
                keyed: false,
                options,
            }
        }
        [Value::U64(_), keyed @ ..]
            if !keyed.is_empty() && keyed.iter().all(|arg| arg_text(arg).contains(':')) =>
        {
            let bits = scope.bits(args.first(), "selector width", 0)?;
            let mut options = Vec::with_capacity(keyed.len());
            for arg in keyed {
                let text = arg_text(arg);
                let Some((raw_key, target)) = text.split_once(':') else {
                    return Err(scope.invalid(format!("malformed keyed option `{text}`")));
                };
                let selector = parse_selector(raw_key.trim())
                    .filter(|selector| *selector <= max_value(bits))
                    .ok_or_else(|| {
                        scope.invalid(format!("selector `{raw_key}` does not fit in {bits} bits"))
                    })?;
                if options.iter().any(|o: &XorOption| o.selector == selector) {
                    return Err(scope.invalid(format!("duplicate selector {selector}")));
                }
                let entry = scope.entry(&Value::Str(target.trim().to_string()))?;
                options.push(XorOption { selector, entry });
            }

            XorCodec {
                bits,
                keyed: true,
                options,
            }
        }
        _ => {
            let options = args
                .iter()
                .enumerate()
                .map(|(i, arg)| {
                    Ok(XorOption {
                        selector: i as u64,
                        entry: scope.entry(arg)?,
                    })
                })
                .collect::<Result<Vec<_>, CompileError>>()?;

            XorCodec {
                bits: index_bits(options.len()),
                keyed: false,
                options,
            }
        }
    };

    for (i, option) in codec.options.iter().enumerate() {
        if codec.options[..i].iter().any(|o| o.entry == option.entry) {
            return Err(scope.invalid(format!("duplicate option `{}`", option.entry.name())));
        }
    }

    Ok(codec)
}

fn check_len(name: &str, expected: usize, actual: usize) -> Result<(), WriteError> {
    if expected == actual {
        Ok(())
    } else {
        Err(WriteError::LengthMismatch {
            definition: name.to_string(),
            expected,
            actual,
        })
    }
}

/// Raw bytes of a payload. Strings are hex when `hex_strings` is set or when
/// they carry a `0x` prefix, raw bytes otherwise.
fn payload_bytes(value: &Value, hex_strings: bool) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Some(bytes.clone()),
        Value::Str(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => hex::decode(digits).ok(),
            None if hex_strings => hex::decode(s).ok(),
            None => Some(s.as_bytes().to_vec()),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

fn write_entry(
    writer: &mut BitWriter,
    entry: &Entry,
    value: &Value,
    configuration: &Configuration,
    last: bool,
) -> Result<(), WriteError> {
    match entry {
        Entry::Definition(target) => configuration
            .definition(target)
            .ok_or_else(|| WriteError::UnknownDefinition(target.clone()))?
            .write_value(writer, value, configuration, last),
        Entry::Message => {
            let fragments = value
                .as_array()
                .ok_or_else(|| WriteError::InvalidValue {
                    definition: MESSAGE_PLACEHOLDER.to_string(),
                    expected: "a list of fragments",
                })?;
            message::write_message(writer, fragments, configuration, last)
        }
    }
}

/// Record (by name) or ordered list (by position) over `entries`.
fn write_entries(
    writer: &mut BitWriter,
    entries: &[Entry],
    value: &Value,
    configuration: &Configuration,
    name: &str,
    last: bool,
) -> Result<(), WriteError> {
    match value {
        Value::Array(items) => {
            check_len(name, entries.len(), items.len())?;
            for (i, (entry, item)) in entries.iter().zip(items).enumerate() {
                let entry_last = last && i + 1 == entries.len();
                write_entry(writer, entry, item, configuration, entry_last)?;
            }
        }
        Value::Record(record) => {
            for (i, entry) in entries.iter().enumerate() {
                let item = record
                    .get(entry.name())
                    .ok_or_else(|| WriteError::MissingField(entry.name().to_string()))?;
                let entry_last = last && i + 1 == entries.len();
                write_entry(writer, entry, item, configuration, entry_last)?;
            }
        }
        _ => {
            return Err(WriteError::InvalidValue {
                definition: name.to_string(),
                expected: "a record or a list",
            });
        }
    }

    Ok(())
}

fn read_entry(
    reader: &mut BitReader<'_>,
    entry: &Entry,
    configuration: &Configuration,
) -> Result<Value, ReadError> {
    match entry {
        Entry::Definition(target) => configuration
            .definition(target)
            .ok_or_else(|| ReadError::UnknownDefinition(target.clone()))?
            .read_value(reader, configuration),
        Entry::Message => {
            let fragments = message::read_message(reader, configuration)?;
            Ok(Value::Array(
                fragments.into_iter().map(Value::Record).collect(),
            ))
        }
    }
}

fn read_entries(
    reader: &mut BitReader<'_>,
    entries: &[Entry],
    configuration: &Configuration,
) -> Result<Record, ReadError> {
    let mut record = Record::new();
    for entry in entries {
        let value = read_entry(reader, entry, configuration)?;
        record.insert(entry.name().to_string(), value);
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration(text: &str) -> Configuration {
        Configuration::parse(text).unwrap()
    }

    fn encode(cfg: &Configuration, name: &str, value: &Value) -> (Vec<u8>, usize) {
        let mut writer = BitWriter::new();
        cfg.definition(name)
            .unwrap()
            .write_value(&mut writer, value, cfg, true)
            .unwrap();
        let len = writer.len();
        (writer.into_bytes(), len)
    }

    fn decode(cfg: &Configuration, name: &str, bytes: &[u8]) -> Value {
        let mut reader = BitReader::new(bytes);
        cfg.definition(name)
            .unwrap()
            .read_value(&mut reader, cfg)
            .unwrap()
    }

    fn round_trip(cfg: &Configuration, name: &str, value: Value) -> Value {
        let (bytes, _) = encode(cfg, name, &value);
        decode(cfg, name, &bytes)
    }

    fn write_err(cfg: &Configuration, name: &str, value: Value) -> WriteError {
        let mut writer = BitWriter::new();
        cfg.definition(name)
            .unwrap()
            .write_value(&mut writer, &value, cfg, true)
            .unwrap_err()
    }

    #[test]
    fn test_integer_round_trip_and_upper_bound() {
        let cfg = configuration("0x01 int INTEGER(4)");

        assert_eq!(encode(&cfg, "int", &Value::from(13)), (vec![0b11010000], 4));
        for v in [0u64, 12, 15] {
            assert_eq!(round_trip(&cfg, "int", Value::from(v)), Value::from(v));
        }
        assert!(matches!(
            write_err(&cfg, "int", Value::from(16)),
            WriteError::OutOfRange { .. }
        ));
        assert!(matches!(
            write_err(&cfg, "int", Value::from(-1)),
            WriteError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_boolean_accepts_flags_and_digits() {
        let cfg = configuration("0x01 flag BOOLEAN");

        assert_eq!(encode(&cfg, "flag", &Value::from(true)), (vec![0x80], 1));
        assert_eq!(encode(&cfg, "flag", &Value::from(0)), (vec![0x00], 1));
        assert_eq!(round_trip(&cfg, "flag", Value::from(1)), Value::from(true));
        assert!(matches!(
            write_err(&cfg, "flag", Value::from(2)),
            WriteError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_float_quantization() {
        let cfg = configuration("0x02 battery_level FLOAT(8;1.5;4.0)");

        assert_eq!(encode(&cfg, "battery_level", &Value::from(1.5)).0, vec![0]);
        assert_eq!(encode(&cfg, "battery_level", &Value::from(4.0)).0, vec![255]);
        let (bytes, len) = encode(&cfg, "battery_level", &Value::from(3.3));
        assert_eq!((bytes.clone(), len), (vec![184], 8));
        assert_eq!(
            decode(&cfg, "battery_level", &bytes),
            Value::F64(3.303921568627451)
        );
        let back = round_trip(&cfg, "battery_level", Value::from(2)).as_f64().unwrap();
        assert!((back - 2.0).abs() < 0.01);

        assert!(matches!(
            write_err(&cfg, "battery_level", Value::from(4.01)),
            WriteError::OutOfRange { .. }
        ));
        assert!(matches!(
            write_err(&cfg, "battery_level", Value::from("high")),
            WriteError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_float_bounds_are_validated() {
        assert!(matches!(
            Configuration::parse("0x01 t FLOAT(8;4.0;1.5)"),
            Err(CompileError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Configuration::parse("0x01 t FLOAT(8;1.0)"),
            Err(CompileError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_bytes_accepts_several_shapes() {
        let cfg = configuration("0x12 raw BYTES(3)");
        let expected = Value::Bytes(b"abc".to_vec());

        assert_eq!(round_trip(&cfg, "raw", Value::from("abc")), expected);
        assert_eq!(round_trip(&cfg, "raw", Value::from("0x616263")), expected);
        assert_eq!(
            round_trip(
                &cfg,
                "raw",
                Value::from(vec![Value::from(0x61), Value::from(0x62), Value::from(0x63)])
            ),
            expected
        );
        assert_eq!(
            write_err(&cfg, "raw", Value::from("abcd")),
            WriteError::LengthMismatch {
                definition: "raw".to_string(),
                expected: 3,
                actual: 4
            }
        );
        assert!(matches!(
            write_err(&cfg, "raw", Value::from(vec![Value::from(256), Value::from(0), Value::from(0)])),
            WriteError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_hexa_is_canonical_uppercase() {
        let cfg = configuration("0x06 module_code HEXA(2)");

        assert_eq!(encode(&cfg, "module_code", &Value::from("0x1234")), (vec![0x12, 0x34], 16));
        assert_eq!(round_trip(&cfg, "module_code", Value::from("3f3a")), Value::from("0x3F3A"));
        assert_eq!(
            round_trip(&cfg, "module_code", Value::Bytes(vec![0xAA, 0xBB])),
            Value::from("0xAABB")
        );
        assert!(matches!(
            write_err(&cfg, "module_code", Value::from("0xZZ00")),
            WriteError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_symbol_width_and_lookup() {
        let cfg = configuration(
            "0x01 accel SYMBOL(no_alarm;motion;free_fall;unknown)\n\
             0x02 status SYMBOL(3;ok;charging;low)\n\
             0x03 single SYMBOL(only)",
        );

        assert_eq!(encode(&cfg, "accel", &Value::from("motion")), (vec![0b01000000], 2));
        assert_eq!(encode(&cfg, "accel", &Value::from("unknown")), (vec![0b11000000], 2));
        assert_eq!(encode(&cfg, "status", &Value::from("low")), (vec![0b01000000], 3));
        assert_eq!(encode(&cfg, "single", &Value::from("only")), (vec![], 0));
        assert_eq!(round_trip(&cfg, "single", Value::from("only")), Value::from("only"));
        assert!(matches!(
            write_err(&cfg, "accel", Value::from("sideways")),
            WriteError::OutOfRange { .. }
        ));

        let mut reader = BitReader::new(&[0b11100000]);
        assert_eq!(
            cfg.definition("status").unwrap().read_value(&mut reader, &cfg),
            Err(ReadError::UnknownSymbol {
                definition: "status".to_string(),
                index: 7
            })
        );

        assert!(matches!(
            Configuration::parse("0x01 s SYMBOL(1;a;b;c)"),
            Err(CompileError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_static_and_void() {
        let cfg = configuration("0x11 constant STATIC(true)\n0x0A alert VOID");

        assert_eq!(encode(&cfg, "constant", &Value::from(true)), (vec![], 0));
        assert_eq!(encode(&cfg, "constant", &Value::Null), (vec![], 0));
        assert_eq!(decode(&cfg, "constant", &[]), Value::from(true));
        assert!(matches!(
            write_err(&cfg, "constant", Value::from(false)),
            WriteError::StaticMismatch { .. }
        ));

        assert_eq!(encode(&cfg, "alert", &Value::Null), (vec![], 0));
        assert_eq!(decode(&cfg, "alert", &[]), Value::from(true));
        assert!(matches!(
            write_err(&cfg, "alert", Value::from(false)),
            WriteError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_sequence_layout_follows_declaration_order() {
        let cfg = configuration(
            "0x01 speed INTEGER(5)\n\
             0x02 altitude INTEGER(9)\n\
             0x03 flight SEQUENCE(speed;altitude)\n\
             0x04 flight_swapped SEQUENCE(altitude;speed)",
        );
        let input = Value::record([("speed", 23), ("altitude", 341)]);

        let (bytes, len) = encode(&cfg, "flight", &input);
        assert_eq!(len, 14);
        assert_eq!(bytes, vec![0b10111101, 0b01010100]);
        assert_eq!(decode(&cfg, "flight", &bytes), input);

        let (swapped, swapped_len) = encode(&cfg, "flight_swapped", &input);
        assert_eq!(swapped_len, 14);
        assert_ne!(swapped, bytes);
        assert_eq!(decode(&cfg, "flight_swapped", &swapped), input);

        let positional = Value::from(vec![Value::from(23), Value::from(341)]);
        assert_eq!(encode(&cfg, "flight", &positional).0, bytes);
    }

    #[test]
    fn test_sequence_requires_every_field() {
        let cfg = configuration(
            "0x01 speed INTEGER(7)\n0x02 altitude INTEGER(15)\n0x03 position SEQUENCE(speed;altitude)",
        );

        assert_eq!(
            encode(&cfg, "position", &Value::record([("speed", 13), ("altitude", 18)])).0,
            vec![0b00011010, 0b00000000, 0b01001000]
        );
        assert_eq!(
            write_err(&cfg, "position", Value::record([("speed", 13)])),
            WriteError::MissingField("altitude".to_string())
        );
        assert!(matches!(
            write_err(&cfg, "position", Value::from(vec![Value::from(1)])),
            WriteError::LengthMismatch { .. }
        ));
    }

    #[test]
    fn test_alias_delegates() {
        let cfg = configuration("0x08 device_mac HEXA(6)\n0x09 adding_child ALIAS(device_mac)");
        let mac = Value::from("0xA1B2C3D4E5F6");

        assert_eq!(encode(&cfg, "adding_child", &mac), encode(&cfg, "device_mac", &mac));
        assert_eq!(round_trip(&cfg, "adding_child", mac.clone()), mac);
    }

    #[test]
    fn test_array_homogeneous_and_composite() {
        let cfg = configuration(
            "0x06 module_code HEXA(2)\n\
             0x07 modules ARRAY(3;module_code)\n\
             0x0B log_category SYMBOL(info;warn;error;debug)\n\
             0x0C log_level SYMBOL(low;medium;high)\n\
             0x0D logs ARRAY(2;log_category;log_level)",
        );

        let modules = Value::from(vec![
            Value::from("0x1234"),
            Value::from("0x5678"),
            Value::from("0xAA78"),
        ]);
        let (bytes, len) = encode(&cfg, "modules", &modules);
        assert_eq!(len, 3 + 3 * 16);
        assert_eq!(bytes[0], 0b01100010);
        assert_eq!(decode(&cfg, "modules", &bytes), modules);

        let logs = Value::from(vec![
            Value::record([("log_category", "info"), ("log_level", "high")]),
            Value::record([("log_category", "warn"), ("log_level", "medium")]),
        ]);
        let (bytes, len) = encode(&cfg, "logs", &logs);
        assert_eq!(len, 2 + 2 * 4);
        assert_eq!(decode(&cfg, "logs", &bytes), logs);

        let too_many = Value::from(vec![Value::from("0x0000"); 8]);
        assert!(matches!(
            write_err(&cfg, "modules", too_many),
            WriteError::OutOfRange { .. }
        ));
    }

    #[test]
    fn test_xor_positional_selector() {
        let cfg = configuration(
            "0x0E index_short INTEGER(4)\n\
             0x0F index_long INTEGER(9)\n\
             0x10 device_index XOR(index_short;index_long)",
        );

        let short = Value::record([("index_short", 7)]);
        let (bytes, len) = encode(&cfg, "device_index", &short);
        assert_eq!((bytes.clone(), len), (vec![0b00111000], 5));
        assert_eq!(decode(&cfg, "device_index", &bytes), short);

        let long = Value::record([("index_long", 300)]);
        let (bytes, len) = encode(&cfg, "device_index", &long);
        assert_eq!(len, 10);
        assert_eq!(decode(&cfg, "device_index", &bytes), long);
    }

    #[test]
    fn test_xor_requires_exactly_one_option() {
        let cfg = configuration(
            "0x0E index_short INTEGER(4)\n\
             0x0F index_long INTEGER(9)\n\
             0x10 device_index XOR(index_short;index_long)",
        );

        assert_eq!(
            write_err(&cfg, "device_index", Value::record([("other", 1)])),
            WriteError::InvalidOption {
                definition: "device_index".to_string(),
                active: 0
            }
        );
        assert_eq!(
            write_err(
                &cfg,
                "device_index",
                Value::record([("index_short", 1), ("index_long", 2)])
            ),
            WriteError::InvalidOption {
                definition: "device_index".to_string(),
                active: 2
            }
        );
        let with_null = Value::record([
            ("index_short", Value::from(3)),
            ("index_long", Value::Null),
        ]);
        assert_eq!(encode(&cfg, "device_index", &with_null).1, 5);
    }

    #[test]
    fn test_keyed_xor_writes_declared_selector() {
        let cfg = configuration(
            "0x01 short INTEGER(5)\n\
             0x02 long INTEGER(11)\n\
             0x03 device_index XOR(4;[0x1:short;0x2:long])",
        );

        let short = Value::record([("short", 11)]);
        let (bytes, len) = encode(&cfg, "device_index", &short);
        assert_eq!(len, 4 + 5);
        assert_eq!(bytes, vec![0b00010101, 0b10000000]);
        assert_eq!(decode(&cfg, "device_index", &bytes), short);

        let long = Value::record([("long", 879)]);
        assert_eq!(round_trip(&cfg, "device_index", long.clone()), long);

        let mut reader = BitReader::new(&[0b01110000]);
        assert_eq!(
            cfg.definition("device_index").unwrap().read_value(&mut reader, &cfg),
            Err(ReadError::UnknownSelector {
                definition: "device_index".to_string(),
                selector: 7
            })
        );
    }

    #[test]
    fn test_keyed_xor_matches_reference_bytes() {
        let cfg = configuration(
            "0x01 device_index_short INTEGER(7)\n\
             0x02 device_index_long INTEGER(15)\n\
             0x03 device_index XOR(1;[0x00:device_index_short;0x01:device_index_long])",
        );

        assert_eq!(
            encode(&cfg, "device_index", &Value::record([("device_index_short", 13)])).0,
            vec![0b00001101]
        );
        assert_eq!(
            encode(&cfg, "device_index", &Value::record([("device_index_long", 255)])).0,
            vec![0b10000000, 0b11111111]
        );
    }

    #[test]
    fn test_keyed_xor_rejects_bad_selectors() {
        assert!(matches!(
            Configuration::parse("0x01 a VOID\n0x02 u XOR(2;[0x4:a])"),
            Err(CompileError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Configuration::parse("0x01 a VOID\n0x02 b VOID\n0x03 u XOR(2;[0x1:a;0x1:b])"),
            Err(CompileError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Configuration::parse("0x01 a VOID\n0x02 u XOR(a;a)"),
            Err(CompileError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_list_terminates_only_when_followed() {
        let cfg = configuration(
            "0x01 speed INTEGER(5)\n\
             0x02 temperature INTEGER(6)\n\
             0x03 humidity INTEGER(6)\n\
             0x04 measurement XOR(4;[0x1:temperature;0x2:humidity])\n\
             0x05 measurements LIST(measurement)\n\
             0x06 data SEQUENCE(speed;measurements)\n\
             0x07 data_inverted SEQUENCE(measurements;speed)",
        );
        let items = Value::from(vec![
            Value::record([("temperature", 45)]),
            Value::record([("humidity", 39)]),
        ]);

        let (bytes, len) = encode(&cfg, "measurements", &items);
        assert_eq!(len, (4 + 6) + (4 + 6));
        assert_eq!(decode(&cfg, "measurements", &bytes), items);

        let input = Value::record([("speed", Value::from(17)), ("measurements", items.clone())]);
        let (bytes, len) = encode(&cfg, "data", &input);
        assert_eq!(len, 5 + (4 + 6) + (4 + 6));
        assert_eq!(decode(&cfg, "data", &bytes), input);

        let (bytes, len) = encode(&cfg, "data_inverted", &input);
        assert_eq!(len, (4 + 6) + (4 + 6) + 4 + 5);
        assert_eq!(decode(&cfg, "data_inverted", &bytes), input);
    }

    #[test]
    fn test_list_target_must_be_keyed_without_zero() {
        assert!(matches!(
            Configuration::parse("0x01 a VOID\n0x02 b VOID\n0x03 u XOR(a;b)\n0x04 l LIST(u)"),
            Err(CompileError::InvalidListTarget { .. })
        ));
        assert!(matches!(
            Configuration::parse("0x01 a VOID\n0x02 b VOID\n0x03 u XOR(1;[0:a;1:b])\n0x04 l LIST(u)"),
            Err(CompileError::InvalidListTarget { .. })
        ));
        assert!(matches!(
            Configuration::parse("0x01 a VOID\n0x04 l LIST(a)"),
            Err(CompileError::InvalidListTarget { .. })
        ));
    }

    #[test]
    fn test_message_placeholder_must_be_last() {
        let schema = "0x01 a INTEGER(2)\n";
        assert_eq!(
            Configuration::parse(&format!("{schema}0x02 s SEQUENCE(message;a)")),
            Err(CompileError::MisplacedMessage("s".to_string()))
        );
        assert_eq!(
            Configuration::parse(&format!("{schema}0x02 s SEQUENCE(a;message;message)")),
            Err(CompileError::MisplacedMessage("s".to_string()))
        );
        assert_eq!(
            Configuration::parse(&format!("{schema}0x02 s ARRAY(2;message;a)")),
            Err(CompileError::MisplacedMessage("s".to_string()))
        );
        assert_eq!(
            Configuration::parse(&format!("{schema}0x02 s ALIAS(message)")),
            Err(CompileError::MisplacedMessage("s".to_string()))
        );
        assert!(Configuration::parse(&format!("{schema}0x02 s SEQUENCE(a;message)")).is_ok());
    }

    #[test]
    fn test_unknown_reference_fails_at_compile_time() {
        assert_eq!(
            Configuration::parse("0x01 s SEQUENCE(a;b)\n0x02 a INTEGER(2)"),
            Err(CompileError::UnknownReference {
                definition: "s".to_string(),
                reference: "b".to_string()
            })
        );
    }

    #[test]
    fn test_argument_validation() {
        for schema in [
            "0x01 a INTEGER(0)",
            "0x01 a INTEGER(65)",
            "0x01 a INTEGER",
            "0x01 a INTEGER(4;5)",
            "0x01 a BYTES(0)",
            "0x01 a BOOLEAN(1)",
            "0x01 a STATIC(1;2)",
            "0x01 a ARRAY(3)",
            "0x01 a XOR",
            "0x01 a XOR(*)",
            "0x01 a SYMBOL",
        ] {
            assert!(
                matches!(
                    Configuration::parse(schema),
                    Err(CompileError::InvalidArgument { .. })
                ),
                "{schema}"
            );
        }
    }
}
