//! Compose-style environment variable interpolation.
//!
//! Supported forms, matched left to right in a single pass:
//!
//! - `$$` - a literal `$`
//! - `$NAME`, `${NAME}` - required lookup
//! - `${NAME:-default}` - `default` when unset or empty
//! - `${NAME-default}` - `default` only when unset
//! - `${NAME:?message}` - error when unset or empty
//! - `${NAME?message}` - error only when unset
//!
//! Defaults and messages are taken literally; they are not expanded again.

use std::collections::{BTreeMap, HashMap};

use serde_yaml::Value;

use crate::error::{ConfigError, InterpolationError};

/// Source of variable values (normally the process environment).
pub trait Variables {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl Variables for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl Variables for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

/// Snapshot of the current process environment.
pub fn process_environment() -> HashMap<String, String> {
    std::env::vars().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier<'a> {
    None,
    DefaultIfEmpty(&'a str),
    DefaultIfUnset(&'a str),
    RequiredNonEmpty(&'a str),
    RequiredSet(&'a str),
}

/// Length in bytes of the identifier at the start of `s`, if any.
fn identifier_len(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return None,
    }
    let end = chars
        .find(|&(_, c)| !(c == '_' || c.is_ascii_alphanumeric()))
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    Some(end)
}

/// Parse the body of `${...}` (the text after the opening brace).
///
/// Returns the variable name, its modifier and the number of bytes consumed
/// including the closing brace.
fn parse_braced(s: &str) -> Option<(&str, Modifier<'_>, usize)> {
    let name_len = identifier_len(s)?;
    let name = &s[..name_len];
    let after = &s[name_len..];

    if after.starts_with('}') {
        return Some((name, Modifier::None, name_len + 1));
    }

    let sep = [":-", ":?", "-", "?"]
        .into_iter()
        .find(|sep| after.starts_with(sep))?;

    let tail = &after[sep.len()..];
    let arg_len = tail.find('}')?;
    let arg = &tail[..arg_len];
    let modifier = match sep {
        ":-" => Modifier::DefaultIfEmpty(arg),
        ":?" => Modifier::RequiredNonEmpty(arg),
        "-" => Modifier::DefaultIfUnset(arg),
        _ => Modifier::RequiredSet(arg),
    };
    Some((name, modifier, name_len + sep.len() + arg_len + 1))
}

fn required_message(message: &str, name: &str) -> InterpolationError {
    let message = if message.is_empty() { name } else { message };
    InterpolationError::RequiredVariableUnset(message.to_string())
}

fn expand<V: Variables + ?Sized>(
    name: &str,
    modifier: Modifier<'_>,
    vars: &V,
) -> Result<String, InterpolationError> {
    let value = vars.lookup(name);
    let expanded = match modifier {
        Modifier::None => {
            value.ok_or_else(|| InterpolationError::UndefinedVariable(name.to_string()))?
        }
        Modifier::DefaultIfEmpty(default) => match value {
            Some(v) if !v.is_empty() => v,
            _ => default,
        },
        Modifier::DefaultIfUnset(default) => value.unwrap_or(default),
        Modifier::RequiredNonEmpty(message) => match value {
            Some(v) if !v.is_empty() => v,
            _ => return Err(required_message(message, name)),
        },
        Modifier::RequiredSet(message) => {
            value.ok_or_else(|| required_message(message, name))?
        }
    };
    Ok(expanded.to_string())
}

/// Expand every variable reference in `template`.
pub fn substitute<V: Variables + ?Sized>(
    template: &str,
    vars: &V,
) -> Result<String, InterpolationError> {
    let mut out = String::with_capacity(template.len());
    let mut pos = 0;

    while let Some(rel) = template[pos..].find('$') {
        let at = pos + rel;
        out.push_str(&template[pos..at]);
        let rest = &template[at + 1..];

        if rest.starts_with('$') {
            out.push('$');
            pos = at + 2;
            continue;
        }

        if let Some(len) = identifier_len(rest) {
            out.push_str(&expand(&rest[..len], Modifier::None, vars)?);
            pos = at + 1 + len;
            continue;
        }

        if let Some(body) = rest.strip_prefix('{') {
            if let Some((name, modifier, consumed)) = parse_braced(body) {
                out.push_str(&expand(name, modifier, vars)?);
                pos = at + 2 + consumed;
                continue;
            }
        }

        return Err(InterpolationError::InvalidSyntax {
            template: template.to_string(),
            offset: at,
        });
    }

    out.push_str(&template[pos..]);
    Ok(out)
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => "?".to_string(),
    }
}

fn interpolate_at<V: Variables + ?Sized>(
    value: &Value,
    vars: &V,
    path: &str,
) -> Result<Value, ConfigError> {
    match value {
        Value::String(s) => substitute(s, vars)
            .map(Value::String)
            .map_err(|source| ConfigError::Interpolation {
                path: path.to_string(),
                source,
            }),
        Value::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| interpolate_at(item, vars, &format!("{path}/{idx}")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (key, item) in map {
                let child = format!("{path}/{}", key_label(key));
                out.insert(key.clone(), interpolate_at(item, vars, &child)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Tagged(tagged) => {
            let mut tagged = tagged.as_ref().clone();
            tagged.value = interpolate_at(&tagged.value, vars, path)?;
            Ok(Value::Tagged(Box::new(tagged)))
        }
        scalar => Ok(scalar.clone()),
    }
}

/// Interpolate every string in a configuration tree. Keys are left alone.
///
/// The first failure aborts the whole tree and reports the offending path.
pub fn interpolate<V: Variables + ?Sized>(value: &Value, vars: &V) -> Result<Value, ConfigError> {
    interpolate_at(value, vars, "")
}
