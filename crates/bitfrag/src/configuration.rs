//! Configuration: the compiled set of definitions and the binary key width.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use crate::{
    ast::{DefinitionDecl, MESSAGE_PLACEHOLDER},
    bits::max_value,
    codec::{Codec, Entry, Scope, XorCodec},
    definition::Definition,
    errors::{CompileError, WriteError},
    parser,
    value::FieldAccess,
};

/// Key width used when the schema text does not set one.
pub const DEFAULT_KEY_BIT_SIZE: usize = 8;

/// A compiled schema. Use [Configuration::parse] on schema text, or
/// [Configuration::compile] on declarations built by hand.
///
/// Once built, a configuration is immutable and every cross-reference
/// between its definitions resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    key_bit_size: usize,
    definitions: Vec<Definition>,
    by_name: HashMap<String, usize>,
    by_key: HashMap<u64, usize>,
}

impl Configuration {
    /// Parses and compiles schema text.
    pub fn parse(text: &str) -> Result<Self, CompileError> {
        let schema = parser::parse(text)?;
        Self::compile(schema.key_bit_size, schema.definitions)
    }

    /// Compiles declarations. Names and keys are registered first so codecs
    /// may reference definitions declared later.
    pub fn compile(
        key_bit_size: usize,
        declarations: Vec<DefinitionDecl>,
    ) -> Result<Self, CompileError> {
        if !(1..=64).contains(&key_bit_size) {
            return Err(CompileError::InvalidKeyBitSize(key_bit_size));
        }

        let mut by_name = HashMap::with_capacity(declarations.len());
        let mut by_key = HashMap::with_capacity(declarations.len());
        let mut names: Vec<String> = Vec::with_capacity(declarations.len());

        for (index, decl) in declarations.iter().enumerate() {
            if !is_identifier(&decl.name) || decl.name == MESSAGE_PLACEHOLDER {
                return Err(CompileError::InvalidName(decl.name.clone()));
            }
            if decl.binary_key > max_value(key_bit_size) {
                return Err(CompileError::BinaryKeyOverflow {
                    name: decl.name.clone(),
                    key: decl.binary_key,
                    bits: key_bit_size,
                });
            }
            if by_name.insert(decl.name.clone(), index).is_some() {
                return Err(CompileError::DuplicateName(decl.name.clone()));
            }
            if let Some(existing) = by_key.insert(decl.binary_key, index) {
                return Err(CompileError::DuplicateBinaryKey {
                    key: decl.binary_key,
                    name: decl.name.clone(),
                    existing: names[existing].clone(),
                });
            }
            names.push(decl.name.clone());
        }

        let mut definitions = Vec::with_capacity(declarations.len());
        for decl in declarations {
            let scope = Scope {
                definition: &decl.name,
                names: &names,
            };
            let codec = Codec::compile(&decl.codec, &scope)?;

            definitions.push(Definition {
                name: decl.name,
                binary_key: decl.binary_key,
                codec,
                static_fields: decl.static_fields,
                comment: decl.comment,
            });
        }

        let configuration = Self {
            key_bit_size,
            definitions,
            by_name,
            by_key,
        };
        configuration.validate()?;

        debug!(
            definitions = configuration.definitions.len(),
            key_bit_size, "compiled configuration"
        );

        Ok(configuration)
    }

    /// Checks that need every codec built: reference cycles and list targets.
    fn validate(&self) -> Result<(), CompileError> {
        self.check_cycles()?;

        for definition in &self.definitions {
            if let Codec::List(target) = &definition.codec {
                let valid = self.union(target).is_some_and(|xor| {
                    xor.keyed
                        && xor.bits > 0
                        && xor.options.iter().all(|option| option.selector != 0)
                });
                if !valid {
                    return Err(CompileError::InvalidListTarget {
                        definition: definition.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Rejects any definition that can reach itself again without reading
    /// a bit. Decoding such a definition would never make progress.
    fn check_cycles(&self) -> Result<(), CompileError> {
        let zero_width = self.zero_width();
        let edges: Vec<Vec<usize>> = self
            .definitions
            .iter()
            .map(|definition| {
                self.leading_references(&definition.codec, &zero_width)
                    .into_iter()
                    .filter_map(|name| self.by_name.get(name).copied())
                    .collect()
            })
            .collect();

        for (start, definition) in self.definitions.iter().enumerate() {
            let mut seen = vec![false; edges.len()];
            let mut stack = edges[start].clone();
            while let Some(next) = stack.pop() {
                if next == start {
                    return Err(CompileError::ReferenceCycle(definition.name.clone()));
                }
                if !std::mem::replace(&mut seen[next], true) {
                    stack.extend(&edges[next]);
                }
            }
        }

        Ok(())
    }

    /// For each definition, whether reading it may consume no bit at all.
    /// Least fixpoint: a definition only on a cycle stays `false`.
    fn zero_width(&self) -> Vec<bool> {
        let mut zero_width = vec![false; self.definitions.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for (i, definition) in self.definitions.iter().enumerate() {
                if !zero_width[i] && self.reads_nothing(&definition.codec, &zero_width) {
                    zero_width[i] = true;
                    changed = true;
                }
            }
        }

        zero_width
    }

    fn reads_nothing(&self, codec: &Codec, zero_width: &[bool]) -> bool {
        let entry = |entry: &Entry| match entry {
            Entry::Definition(name) => self.is_zero_width(name, zero_width),
            Entry::Message => false,
        };

        match codec {
            Codec::Static(_) | Codec::Void => true,
            Codec::Symbol(symbol) => symbol.bits == 0,
            Codec::Sequence(entries) => entries.iter().all(entry),
            Codec::Alias(target) => self.is_zero_width(target, zero_width),
            Codec::Xor(xor) => xor.bits == 0 && xor.options.iter().any(|o| entry(&o.entry)),
            _ => false,
        }
    }

    fn is_zero_width(&self, name: &str, zero_width: &[bool]) -> bool {
        self.by_name.get(name).is_some_and(|&i| zero_width[i])
    }

    /// Definitions `codec` may start reading before it has consumed a bit.
    /// Arrays and lists always read a length or a selector first.
    fn leading_references<'c>(&self, codec: &'c Codec, zero_width: &[bool]) -> Vec<&'c str> {
        match codec {
            Codec::Sequence(entries) => {
                let mut names = Vec::new();
                for entry in entries {
                    let Entry::Definition(name) = entry else {
                        break;
                    };
                    names.push(name.as_str());
                    if !self.is_zero_width(name, zero_width) {
                        break;
                    }
                }
                names
            }
            Codec::Alias(target) => vec![target.as_str()],
            Codec::Xor(xor) if xor.bits == 0 => xor
                .options
                .iter()
                .filter_map(|option| match &option.entry {
                    Entry::Definition(name) => Some(name.as_str()),
                    Entry::Message => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Bit width of every binary key in a message.
    pub fn key_bit_size(&self) -> usize {
        self.key_bit_size
    }

    pub fn definition(&self, name: &str) -> Option<&Definition> {
        self.by_name.get(name).map(|&i| &self.definitions[i])
    }

    pub fn definition_by_key(&self, key: u64) -> Option<&Definition> {
        self.by_key.get(&key).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The union codec behind `name`, following aliases.
    pub(crate) fn union(&self, name: &str) -> Option<&XorCodec> {
        let mut definition = self.definition(name)?;
        for _ in 0..self.definitions.len() {
            match &definition.codec {
                Codec::Xor(xor) => return Some(xor),
                Codec::Alias(target) => definition = self.definition(target)?,
                _ => return None,
            }
        }

        None
    }

    /// Finds the definition a fragment belongs to.
    ///
    /// A fragment normally names one definition. Decoded fragments also carry
    /// the static fields of their definition, which may themselves be
    /// definition names; when several names match, the definition whose
    /// static fields explain every other match wins.
    pub fn detect_definition<F: FieldAccess + ?Sized>(
        &self,
        fragment: &F,
    ) -> Result<&Definition, WriteError> {
        let matches: Vec<&Definition> = self
            .definitions
            .iter()
            .filter(|definition| fragment.has_value(&definition.name))
            .collect();

        match matches.as_slice() {
            [] => Err(WriteError::UnknownFragment),
            [definition] => Ok(*definition),
            _ => {
                let mut owners = matches.iter().filter(|candidate| {
                    matches.iter().all(|other| {
                        other.name == candidate.name
                            || candidate.static_fields.get(&other.name)
                                == fragment.field(&other.name)
                    })
                });

                match (owners.next(), owners.next()) {
                    (Some(definition), None) => Ok(*definition),
                    _ => Err(WriteError::AmbiguousFragment(
                        matches.iter().map(|definition| definition.name.clone()).collect(),
                    )),
                }
            }
        }
    }
}

impl FromStr for Configuration {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
