//! Structural merge and removal of configuration fragments.
//!
//! Fragments are plain `toml` tables read from an extension manifest; the
//! destination is the live `toml_edit` document.

use std::path::Path;

use toml::Value;
use toml_edit::{Array, InlineTable, Item, Table};

/// Merges `src` into `dest`, adding only keys and sections `dest` lacks.
///
/// Values already present in `dest` are never replaced, including scalars
/// where `src` carries a section of the same name.
pub fn conditional_merge(dest: &mut Table, src: &toml::Table) {
    for (key, value) in src {
        match (dest.get_mut(key), value) {
            (Some(Item::Table(existing)), Value::Table(incoming)) => {
                conditional_merge(existing, incoming);
            }
            (Some(_), _) => {}
            (None, value) => {
                dest.insert(key.as_str(), to_item(value));
            }
        }
    }
}

/// Removes from `dest` every key named in `src`.
///
/// Keys are matched by name only. A value the user had under the same name
/// before the fragment was merged is removed too. Sections are recursed into
/// and dropped once nothing is left in them.
pub fn remove_and_prune(dest: &mut Table, src: &toml::Table) {
    for (key, value) in src {
        match value {
            Value::Table(fragment) => {
                let now_empty = match dest.get_mut(key) {
                    Some(Item::Table(existing)) => {
                        remove_and_prune(existing, fragment);
                        existing.is_empty()
                    }
                    _ => false,
                };
                if now_empty {
                    dest.remove(key);
                }
            }
            _ => {
                dest.remove(key);
            }
        }
    }
}

/// Prefixes every string value stored under `label`, at any depth, with `prefix`.
pub fn prepend_path(table: &mut toml::Table, label: &str, prefix: &str) {
    for (key, value) in table.iter_mut() {
        match value {
            Value::Table(sub) => prepend_path(sub, label, prefix),
            Value::String(path) if key == label => {
                *path = Path::new(prefix)
                    .join(path.as_str())
                    .to_string_lossy()
                    .into_owned();
            }
            _ => {}
        }
    }
}

/// Converts a fragment value into a document item. Sections get headers of
/// their own.
fn to_item(value: &Value) -> Item {
    match value {
        Value::Table(table) => Item::Table(to_table(table)),
        other => Item::Value(to_value(other)),
    }
}

fn to_table(src: &toml::Table) -> Table {
    let mut table = Table::new();
    for (key, value) in src {
        table.insert(key.as_str(), to_item(value));
    }
    table
}

fn to_value(value: &Value) -> toml_edit::Value {
    match value {
        Value::String(s) => s.as_str().into(),
        Value::Integer(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
        Value::Boolean(b) => (*b).into(),
        Value::Datetime(dt) => {
            let text = dt.to_string();
            match text.parse::<toml_edit::Datetime>() {
                Ok(parsed) => parsed.into(),
                Err(_) => text.into(),
            }
        }
        Value::Array(items) => toml_edit::Value::Array(items.iter().map(to_value).collect::<Array>()),
        Value::Table(table) => {
            let mut inline = InlineTable::new();
            for (key, item) in table {
                inline.insert(key.as_str(), to_value(item));
            }
            toml_edit::Value::InlineTable(inline)
        }
    }
}
