//! # bitfrag
//!
//! A schema-driven bit-level codec for compact, self-describing messages.
//!
//! A small text schema names data fragments, gives each one a binary key and
//! a codec (integers, quantized floats, symbols, sequences, unions, arrays and
//! embedded sub-messages), and the compiled [Configuration] turns application
//! values into a dense MSB-first bit stream and back.
//!
//! ## Example
//!
//! ```
//! use bitfrag::{Configuration, Serializer, Value};
//!
//! let configuration = Configuration::parse(
//!     "nb_bit_key_binary=4\n\
//!      0x1 speed INTEGER(7)\n\
//!      0x2 altitude INTEGER(15)\n\
//!      0x3 position SEQUENCE(speed;altitude)",
//! )
//! .unwrap();
//! let serializer = Serializer::new(&configuration);
//!
//! let position = Value::record([("speed", 13), ("altitude", 18)]);
//! let encoded = serializer.serialize("position", &position).unwrap();
//! assert_eq!(encoded.bytes, vec![0b00011010, 0b00000000, 0b01001000]);
//! assert_eq!(encoded.bit_len, 22);
//!
//! let decoded = serializer.deserialize("position", &encoded.bytes).unwrap();
//! assert_eq!(decoded.get("position"), Some(&position));
//! ```

pub mod ast;
pub mod bits;
pub mod codec;
pub mod configuration;
pub mod definition;
pub mod errors;
pub mod message;
pub mod parser;
pub mod serializer;
pub mod value;

#[cfg(feature = "serde")]
pub mod serde;

pub use configuration::Configuration;
pub use definition::Definition;
pub use errors::{CompileError, Error, ReadError, WriteError};
pub use serializer::{Encoded, Serializer};
pub use value::{FieldAccess, Record, Value};
