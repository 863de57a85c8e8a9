//! Line-oriented schema text parser.
//!
//! ```text
//! nb_bit_key_binary=6
//! 0x03 resync_kpi INTEGER(4)
//! 0x04 reboot_kpi INTEGER(4) alarm=12      // bare static field
//! adding_child 0x09 ALIAS(device_mac) STATIC(signal)
//! ```
//!
//! Each definition line is `[BINKEY] NAME CODEC[(args)] [STATIC(...)] [// comment]`,
//! with the binary key allowed on either side of the name. The parser only
//! builds declarations; names are resolved later by
//! [crate::configuration::Configuration::compile].

use tracing::warn;

use crate::{
    ast::{CodecAst, CodecKind, DefinitionDecl, SchemaDecl, convert_token},
    configuration::DEFAULT_KEY_BIT_SIZE,
    errors::CompileError,
    value::{Record, Value},
};

const KEY_BIT_SIZE_GLOBALS: [&str; 2] = ["nb_bit_key_binary", "key_binary_size_in_bit"];

/// Parses schema text into declarations.
pub fn parse(text: &str) -> Result<SchemaDecl, CompileError> {
    let mut key_bit_size = None;
    let mut definitions = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = index + 1;
        let (body, comment) = split_comment(raw_line);
        if body.is_empty() {
            continue;
        }

        if let Some((key, value)) = global_assignment(body) {
            if KEY_BIT_SIZE_GLOBALS.contains(&key) {
                let bits = value.parse::<usize>().map_err(|_| CompileError::InvalidGlobal {
                    line,
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
                key_bit_size = Some(bits);
            } else {
                warn!(line, key, "ignoring unknown global assignment");
            }
            continue;
        }

        definitions.push(parse_definition(body, comment, line)?);
    }

    Ok(SchemaDecl {
        key_bit_size: key_bit_size.unwrap_or(DEFAULT_KEY_BIT_SIZE),
        definitions,
    })
}

fn split_comment(line: &str) -> (&str, Option<String>) {
    match line.split_once("//") {
        Some((body, comment)) => {
            let comment = comment.trim();
            (
                body.trim(),
                (!comment.is_empty()).then(|| comment.to_string()),
            )
        }
        None => (line.trim(), None),
    }
}

/// `identifier = value`, with nothing but whitespace between the two.
fn global_assignment(body: &str) -> Option<(&str, &str)> {
    let (key, value) = body.split_once('=')?;
    let trimmed = key.trim_end();
    let is_identifier =
        !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');

    is_identifier.then(|| (trimmed, value.trim()))
}

fn parse_definition(
    body: &str,
    comment: Option<String>,
    line: usize,
) -> Result<DefinitionDecl, CompileError> {
    let mut tokens = tokenize(body).into_iter();
    let first = tokens.next().ok_or(CompileError::MalformedLine { line })?;

    let (binary_key, name) = match parse_binary(first, line)? {
        Some(key) => {
            let name = tokens.next().ok_or(CompileError::MalformedLine { line })?;
            (key, name)
        }
        None => {
            let key = match tokens.next() {
                Some(second) => parse_binary(second, line)?,
                None => None,
            };
            let key = key.ok_or_else(|| CompileError::MissingBinaryKey {
                line,
                name: first.to_string(),
            })?;
            (key, first)
        }
    };

    let codec_token = tokens.next().ok_or_else(|| CompileError::MissingCodec {
        line,
        name: name.to_string(),
    })?;
    let codec = parse_codec(codec_token, line)?;

    let mut static_fields = Record::new();
    for token in tokens {
        let inner = static_body(token).unwrap_or(token);
        parse_static_entries(inner, &mut static_fields);
    }

    Ok(DefinitionDecl {
        name: name.to_string(),
        binary_key,
        codec,
        static_fields,
        comment,
    })
}

/// Splits on whitespace outside parentheses.
fn tokenize(body: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start = None;

    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }

        if c.is_whitespace() && depth == 0 {
            if let Some(s) = start.take() {
                tokens.push(&body[s..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }

    if let Some(s) = start {
        tokens.push(&body[s..]);
    }

    tokens
}

/// `Ok(None)` when the token does not look like a binary key at all.
fn parse_binary(token: &str, line: usize) -> Result<Option<u64>, CompileError> {
    let parsed = if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(None);
        }
        u64::from_str_radix(hex, 16)
    } else {
        if !token.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(None);
        }
        token.parse::<u64>()
    };

    parsed
        .map(Some)
        .map_err(|_| CompileError::MalformedLine { line })
}

fn parse_codec(token: &str, line: usize) -> Result<CodecAst, CompileError> {
    let (name, args) = match token.split_once('(') {
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .ok_or(CompileError::MalformedLine { line })?;
            (name, parse_arguments(inner))
        }
        None => (token, Vec::new()),
    };

    let kind = CodecKind::from_token(name).ok_or_else(|| CompileError::UnknownCodec {
        line,
        codec: name.to_string(),
    })?;

    Ok(CodecAst::new(kind, args))
}

/// `;`/`,` separated tokens; brackets of keyed unions are dropped.
fn parse_arguments(inner: &str) -> Vec<Value> {
    inner
        .split([';', ','])
        .map(|entry| entry.trim().trim_start_matches('[').trim_end_matches(']').trim())
        .filter(|entry| !entry.is_empty())
        .map(convert_token)
        .collect()
}

fn static_body(token: &str) -> Option<&str> {
    let open = token.find('(')?;
    if !token[..open].eq_ignore_ascii_case("STATIC") {
        return None;
    }

    token[open + 1..].strip_suffix(')')
}

fn parse_static_entries(text: &str, static_fields: &mut Record) {
    for entry in text.split([';', ',']) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        match entry.split_once('=') {
            Some((key, value)) => {
                static_fields.insert(key.trim().to_string(), convert_token(value.trim()));
            }
            None => {
                static_fields.insert(entry.to_string(), Value::Bool(true));
            }
        }
    }
}
