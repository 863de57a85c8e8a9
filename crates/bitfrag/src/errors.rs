//! Error types for schema compilation, bit writing and bit reading.

use thiserror::Error;

/// Errors produced while parsing schema text or compiling it into a
/// [crate::configuration::Configuration].
///
/// A configuration that compiles without error is internally consistent:
/// none of these can surface later at encode or decode time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The line is not a global assignment nor a definition.
    #[error("line {line}: malformed definition")]
    MalformedLine { line: usize },
    /// A definition line has a name but no codec token.
    #[error("line {line}: missing codec for `{name}`")]
    MissingCodec { line: usize, name: String },
    /// The codec token is not one of the known codec names.
    #[error("line {line}: unknown codec `{codec}`")]
    UnknownCodec { line: usize, codec: String },
    /// Neither the first nor the second token is a binary key.
    #[error("line {line}: missing binary key for `{name}`")]
    MissingBinaryKey { line: usize, name: String },
    /// A global assignment carries a value that cannot be used.
    #[error("line {line}: invalid value `{value}` for `{key}`")]
    InvalidGlobal {
        line: usize,
        key: String,
        value: String,
    },
    /// Definition names must be identifiers and must not be reserved.
    #[error("invalid definition name `{0}`")]
    InvalidName(String),
    /// Key bit size is 0 or larger than 64.
    #[error("key bit size {0} is outside 1..=64")]
    InvalidKeyBitSize(usize),
    /// Binary key does not fit in the configured key bit size.
    #[error("binary key 0x{key:02X} of `{name}` exceeds {bits} bits")]
    BinaryKeyOverflow { name: String, key: u64, bits: usize },
    /// Two definitions share a name.
    #[error("duplicate definition `{0}`")]
    DuplicateName(String),
    /// Two definitions share a binary key.
    #[error("binary key 0x{key:02X} of `{name}` already used by `{existing}`")]
    DuplicateBinaryKey {
        key: u64,
        name: String,
        existing: String,
    },
    /// A codec references a definition that does not exist.
    #[error("`{definition}` references unknown definition `{reference}`")]
    UnknownReference {
        definition: String,
        reference: String,
    },
    /// Codec arguments have the wrong count, type or range.
    #[error("`{definition}`: {reason}")]
    InvalidArgument { definition: String, reason: String },
    /// The `message` placeholder is used where it is not allowed.
    #[error("`{0}`: message placeholder must be the single last entry")]
    MisplacedMessage(String),
    /// A definition reaches itself again before reading a single bit,
    /// through aliases, leading sequence entries or 0-bit unions.
    #[error("`{0}` refers back to itself without consuming bits")]
    ReferenceCycle(String),
    /// A list does not point at a keyed union free of selector 0.
    #[error("`{definition}`: list target `{target}` must be a keyed XOR without selector 0")]
    InvalidListTarget { definition: String, target: String },
}

/// Errors produced when reading bits (e.g. during
/// [crate::serializer::Serializer::deserialize]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Requested bit range is beyond the end of the data.
    #[error("requested {requested} bits but only {remaining} remain")]
    OutOfBounds { requested: usize, remaining: usize },
    /// More than 64 bits were requested in a single read.
    #[error("cannot read {0} bits at once")]
    TooManyBitsRead(usize),
    /// A binary key does not belong to any definition.
    #[error("unknown binary key 0x{0:X}")]
    UnknownBinaryKey(u64),
    /// A union selector does not match any option.
    #[error("unknown selector {selector} for `{definition}`")]
    UnknownSelector { definition: String, selector: u64 },
    /// A symbol index is past the end of the symbol list.
    #[error("symbol index {index} is out of range for `{definition}`")]
    UnknownSymbol { definition: String, index: u64 },
    /// No definition has the requested name.
    #[error("unknown definition `{0}`")]
    UnknownDefinition(String),
}

/// Errors produced when writing application values into bits.
///
/// The partially written buffer must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The value does not fit in the available bits or range.
    #[error("value {value} is out of range for `{definition}`")]
    OutOfRange { definition: String, value: String },
    /// More than 64 bits were requested in a single write.
    #[error("cannot write {0} bits at once")]
    TooManyBitsWritten(usize),
    /// The value has the wrong shape for the codec.
    #[error("`{definition}` expected {expected}")]
    InvalidValue {
        definition: String,
        expected: &'static str,
    },
    /// A byte payload or positional record has the wrong length.
    #[error("`{definition}` expected {expected} items, got {actual}")]
    LengthMismatch {
        definition: String,
        expected: usize,
        actual: usize,
    },
    /// A required key is absent from the record.
    #[error("missing field `{0}`")]
    MissingField(String),
    /// A static field is present with a different value.
    #[error("static field `{field}` expected {expected}, got {actual}")]
    StaticMismatch {
        field: String,
        expected: String,
        actual: String,
    },
    /// A union value does not select exactly one option.
    #[error("`{definition}` needs exactly one active option, found {active}")]
    InvalidOption { definition: String, active: usize },
    /// No definition name is present in the record.
    #[error("unable to infer definition for fragment")]
    UnknownFragment,
    /// Several definition names are present in the record.
    #[error("fragment matches several definitions: {0:?}")]
    AmbiguousFragment(Vec<String>),
    /// No definition has the requested name.
    #[error("unknown definition `{0}`")]
    UnknownDefinition(String),
    /// A single-fragment value repeats its own definition key.
    #[error("value for `{0}` must not include the definition key")]
    NestedDefinitionKey(String),
}

/// Any error the crate can return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Read(#[from] ReadError),
}
