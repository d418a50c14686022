//! Ordered JSON rewrite strategies
//!
//! Each strategy is a plain `fn(&str) -> Option<String>` that returns
//! `Some` only when it changed the text. The engine runs them in order and
//! carries every rewrite forward, so later strategies see the output of
//! earlier ones.

use regex::Regex;
use serde_json::{Deserializer, Map, Number, Value};
use std::sync::LazyLock;

/// One named rewrite step
#[derive(Debug, Clone, Copy)]
pub struct RepairStrategy {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<String>,
}

impl RepairStrategy {
    pub const fn new(name: &'static str, apply: fn(&str) -> Option<String>) -> Self {
        Self { name, apply }
    }
}

/// The default strategy list, cheapest and least invasive first
pub fn default_strategies() -> Vec<RepairStrategy> {
    vec![
        RepairStrategy::new("merge_concatenated_objects", merge_concatenated_objects),
        RepairStrategy::new("known_corruptions", fix_known_corruptions),
        RepairStrategy::new("strip_trailing_commas", strip_trailing_commas),
        RepairStrategy::new("insert_missing_commas", insert_missing_commas),
        RepairStrategy::new("fix_literals_and_keys", fix_literals_and_bare_keys),
        RepairStrategy::new("collapse_duplicate_objects", collapse_duplicate_objects),
        RepairStrategy::new("structural_reconstruction", reconstruct_pairs),
    ]
}

fn changed(original: &str, rewritten: String) -> Option<String> {
    (rewritten != original).then_some(rewritten)
}

/// `{"a":1}{"b":2}` becomes `{"a":1,"b":2}`; later keys win
pub fn merge_concatenated_objects(input: &str) -> Option<String> {
    let mut merged = Map::new();
    let mut count = 0;

    for value in Deserializer::from_str(input).into_iter::<Value>() {
        match value {
            Ok(Value::Object(object)) => {
                merged.extend(object);
                count += 1;
            }
            _ => return None,
        }
    }

    if count < 2 {
        return None;
    }
    serde_json::to_string(&Value::Object(merged)).ok()
}

static CORRUPTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // empty container directly followed by the next key
        (r#"(\[\]|\{\})(\s*)""#, r#"${1},${2}""#),
        // missing values
        (r":(\s*),", ": null,"),
        (r":(\s*)\}", ": null}"),
        // doubled commas
        (r",(\s*,)+", ","),
        // smart quotes
        ("[\u{201C}\u{201D}]", "\""),
        // Python literals in value position
        (r"([:\[,]\s*)True\b", "${1}true"),
        (r"([:\[,]\s*)False\b", "${1}false"),
        (r"([:\[,]\s*)None\b", "${1}null"),
        (r"([:\[,]\s*)NaN\b", "${1}null"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("corruption patterns are compile-time constants"),
            replacement,
        )
    })
    .collect()
});

const MASK_OPEN: char = '\u{E000}';
const MASK_CLOSE: char = '\u{E001}';

static MASKED_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""\x{E000}(\d+)\x{E001}""#).expect("mask pattern is a compile-time constant")
});

/// Fixed table of known corruption and its correction.
///
/// String values are masked while the table runs, so text inside them is
/// never rewritten.
pub fn fix_known_corruptions(input: &str) -> Option<String> {
    if input.contains([MASK_OPEN, MASK_CLOSE]) {
        return None;
    }

    let mut strings = Vec::new();
    let mut text = String::with_capacity(input.len());
    for token in lex(input) {
        if token.kind == TokenKind::Str {
            text.push_str(&format!("\"{MASK_OPEN}{}{MASK_CLOSE}\"", strings.len()));
            strings.push(token.text);
        } else {
            text.push_str(token.text);
        }
    }

    for (pattern, replacement) in CORRUPTIONS.iter() {
        if pattern.is_match(&text) {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }
    }

    let restored = MASKED_STRING.replace_all(&text, |caps: &regex::Captures<'_>| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| strings.get(i))
            .map_or_else(|| caps[0].to_string(), |s| (*s).to_string())
    });
    changed(input, restored.into_owned())
}

/// Drop commas that sit directly before `}` or `]`, ignoring string contents
pub fn strip_trailing_commas(input: &str) -> Option<String> {
    let tokens = lex(input);
    let mut out = String::with_capacity(input.len());

    for (i, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::Punct(',')
            && matches!(
                next_significant(&tokens, i),
                Some(TokenKind::Punct('}' | ']'))
            )
        {
            continue;
        }
        out.push_str(token.text);
    }
    changed(input, out)
}

/// Insert a comma when a new value opens right after a string, object or
/// array closed
pub fn insert_missing_commas(input: &str) -> Option<String> {
    let tokens = lex(input);
    let mut out = String::with_capacity(input.len() + 8);

    for (i, token) in tokens.iter().enumerate() {
        if opens_value(token.kind)
            && matches!(
                prev_significant(&tokens, i),
                Some(TokenKind::Str | TokenKind::Punct('}' | ']'))
            )
        {
            out.push(',');
        }
        out.push_str(token.text);
    }
    changed(input, out)
}

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$-]*$").expect("bare key pattern is a compile-time constant")
});

/// Quote bare object keys, then add the comma missing after a number,
/// boolean or null that runs straight into the next value
pub fn fix_literals_and_bare_keys(input: &str) -> Option<String> {
    let mut tokens: Vec<(TokenKind, String)> = lex(input)
        .into_iter()
        .map(|t| (t.kind, t.text.to_string()))
        .collect();

    let kinds: Vec<TokenKind> = tokens.iter().map(|(k, _)| *k).collect();
    for i in 0..tokens.len() {
        let (kind, text) = &tokens[i];
        if *kind == TokenKind::Word
            && !is_literal(text)
            && BARE_KEY.is_match(text)
            && matches!(
                prev_kind(&kinds, i),
                None | Some(TokenKind::Punct('{' | ','))
            )
            && next_kind(&kinds, i) == Some(TokenKind::Punct(':'))
        {
            let quoted = format!("\"{text}\"");
            tokens[i] = (TokenKind::Str, quoted);
        }
    }

    let kinds: Vec<TokenKind> = tokens.iter().map(|(k, _)| *k).collect();
    let mut out = String::with_capacity(input.len() + 8);
    for (i, (kind, text)) in tokens.iter().enumerate() {
        if opens_value(*kind)
            && prev_index(&kinds, i).is_some_and(|p| {
                kinds[p] == TokenKind::Word && is_literal(&tokens[p].1)
            })
        {
            out.push(',');
        }
        out.push_str(text);
    }
    changed(input, out)
}

/// `{"a":1}{"a":1}` or `{"a":1}{"a"` collapses to the first object
pub fn collapse_duplicate_objects(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let mut stream = Deserializer::from_str(trimmed).into_iter::<Value>();
    let Some(Ok(Value::Object(_))) = stream.next() else {
        return None;
    };
    let end = stream.byte_offset();
    let first = &trimmed[..end];
    let rest = trimmed[end..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());

    if rest.is_empty() {
        return None;
    }

    let compact_first: String = first.chars().filter(|c| !c.is_whitespace()).collect();
    let compact_rest: String = rest.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    let copies = compact_rest.len() / compact_first.len().max(1) + 1;
    let compact_first_no_commas: String = compact_first.chars().filter(|c| *c != ',').collect();

    if compact_first_no_commas.repeat(copies).starts_with(&compact_rest) {
        Some(first.to_string())
    } else {
        None
    }
}

static KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)"\s*:\s*"#).expect("key pattern is a compile-time constant")
});

/// Rebuild a flat object from every `"key": value` pair that can be read.
///
/// Values are parsed as JSON where possible and otherwise sniffed as a
/// number, boolean, null or string. Lossy.
pub fn reconstruct_pairs(input: &str) -> Option<String> {
    let mut object = Map::new();
    let mut consumed = 0;

    for captures in KEY.captures_iter(input) {
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if whole.start() < consumed {
            continue;
        }

        let key = unescape_key(key.as_str());
        let start = whole.end();
        let rest = &input[start..];

        let mut stream = Deserializer::from_str(rest).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            consumed = start + stream.byte_offset();
            object.insert(key, value);
            continue;
        }

        if let Some(value) = sniff_value(rest) {
            object.insert(key, value);
        }
    }

    if object.is_empty() {
        return None;
    }
    changed(input, serde_json::to_string(&Value::Object(object)).ok()?)
}

fn unescape_key(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

fn sniff_value(rest: &str) -> Option<Value> {
    if let Some(body) = rest.strip_prefix('"') {
        let end = body.find(['"', '\n']).unwrap_or(body.len());
        return Some(Value::String(body[..end].to_string()));
    }

    let end = rest.find([',', '}', ']', '\n']).unwrap_or(rest.len());
    let raw = rest[..end].trim();
    if raw.is_empty() {
        return None;
    }

    let value = match raw {
        "true" | "True" => Value::Bool(true),
        "false" | "False" => Value::Bool(false),
        "null" | "None" | "NaN" => Value::Null,
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Number(n.into())
            } else if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(n)
            } else {
                Value::String(raw.trim_matches('\'').to_string())
            }
        }
    };
    Some(value)
}

fn is_literal(word: &str) -> bool {
    matches!(word, "true" | "false" | "null") || word.parse::<f64>().is_ok()
}

fn opens_value(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Str | TokenKind::Punct('{' | '['))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Str,
    Punct(char),
    Word,
    Space,
}

#[derive(Debug)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
}

fn is_delimiter(byte: u8) -> bool {
    matches!(byte, b'"' | b'{' | b'}' | b'[' | b']' | b':' | b',') || byte.is_ascii_whitespace()
}

/// Split into strings, punctuation, bare words and whitespace. An
/// unterminated string runs to the end of input.
fn lex(input: &str) -> Vec<Token<'_>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let kind = match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b'"' => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                TokenKind::Str
            }
            b @ (b'{' | b'}' | b'[' | b']' | b':' | b',') => {
                i += 1;
                TokenKind::Punct(b as char)
            }
            b if b.is_ascii_whitespace() => {
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                TokenKind::Space
            }
            _ => {
                while i < bytes.len() && !is_delimiter(bytes[i]) {
                    i += 1;
                }
                TokenKind::Word
            }
        };
        i = i.min(bytes.len());
        tokens.push(Token {
            kind,
            text: &input[start..i],
        });
    }

    tokens
}

fn next_significant(tokens: &[Token<'_>], i: usize) -> Option<TokenKind> {
    tokens[i + 1..]
        .iter()
        .map(|t| t.kind)
        .find(|k| *k != TokenKind::Space)
}

fn prev_significant(tokens: &[Token<'_>], i: usize) -> Option<TokenKind> {
    tokens[..i]
        .iter()
        .rev()
        .map(|t| t.kind)
        .find(|k| *k != TokenKind::Space)
}

fn prev_index(kinds: &[TokenKind], i: usize) -> Option<usize> {
    (0..i).rev().find(|&j| kinds[j] != TokenKind::Space)
}

fn prev_kind(kinds: &[TokenKind], i: usize) -> Option<TokenKind> {
    prev_index(kinds, i).map(|j| kinds[j])
}

fn next_kind(kinds: &[TokenKind], i: usize) -> Option<TokenKind> {
    kinds[i + 1..].iter().copied().find(|k| *k != TokenKind::Space)
}
