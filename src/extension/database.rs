//! Points an extension's database definitions at the station's own backend.

use std::path::Path;

use toml::{Table, Value};
use toml_edit::Item;

use crate::config::ConfigTree;

/// Driver of file-based databases.
const FILE_DRIVER: &str = "weedb.sqlite";
/// Driver of client/server databases.
const SERVER_DRIVER: &str = "weedb.mysql";

/// Rewrites the `[Databases]` entries of `fragment` to reuse the connection
/// settings of the station's archive databases.
///
/// Best-effort: returns false and leaves `fragment` untouched if anything
/// expected is missing.
pub(crate) fn massage_databases(fragment: &mut Table, config: &ConfigTree) -> bool {
    let mut candidate = fragment.clone();
    if rewrite(&mut candidate, config).is_some() {
        *fragment = candidate;
        true
    } else {
        false
    }
}

fn rewrite(fragment: &mut Table, config: &ConfigTree) -> Option<()> {
    let existing = config.section(&["Databases"])?;
    let sqlite = existing.get("archive_sqlite").and_then(Item::as_table);
    let mysql = existing.get("archive_mysql").and_then(Item::as_table);

    let databases = fragment.get_mut("Databases")?.as_table_mut()?;
    for (_, db) in databases.iter_mut() {
        let db = db.as_table_mut()?;
        let driver = db.get("driver").and_then(Value::as_str).map(str::to_string);

        match (driver.as_deref(), sqlite, mysql) {
            (Some(FILE_DRIVER), Some(sqlite), _) => {
                let existing_name = sqlite.get("database_name")?.as_str()?;
                let name = db.get("database_name")?.as_str()?;
                let parent = Path::new(existing_name).parent().unwrap_or(Path::new(""));
                let joined = parent.join(name).to_string_lossy().into_owned();
                db.insert("database_name".to_string(), Value::String(joined));
                db.insert("root".to_string(), copied(sqlite, "root")?);
            }
            (Some(SERVER_DRIVER), _, Some(mysql)) => {
                for key in ["host", "user", "password"] {
                    db.insert(key.to_string(), copied(mysql, key)?);
                }
            }
            _ => {}
        }
    }

    Some(())
}

/// Copies a string setting out of a station database definition.
fn copied(section: &toml_edit::Table, key: &str) -> Option<Value> {
    section
        .get(key)?
        .as_str()
        .map(|s| Value::String(s.to_string()))
}
