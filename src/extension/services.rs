//! Pipeline-group service lists in `[Engine.Services]`.
//!
//! Lists are edited in place, so an entry added on install and removed on
//! uninstall leaves the line exactly as the user wrote it.

use toml::Value;
use toml_edit::{Array, Item, Table};

use crate::config::ConfigTree;

/// Pipeline groups a station engine runs, in order.
pub const DEFAULT_SERVICE_GROUPS: &[&str] = &[
    "prep_services",
    "data_services",
    "process_services",
    "xtype_services",
    "archive_services",
    "restful_services",
    "report_services",
];

/// Section holding the service lists.
const SERVICES_SECTION: [&str; 2] = ["Engine", "Services"];

/// Names of the pipeline groups extensions may register services into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroups(Vec<String>);

impl ServiceGroups {
    /// Creates a set of group names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Iterates over the group names in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ServiceGroups {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_GROUPS.iter().copied())
    }
}

/// Reads a manifest value that may be a single name or a list of names.
///
/// An empty string is an empty list. Returns `None` for anything else.
#[must_use]
pub fn option_as_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) if s.trim().is_empty() => Some(Vec::new()),
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Same as [`option_as_list`], for an item of the live configuration.
fn item_as_list(item: &Item) -> Option<Vec<String>> {
    match item.as_value()? {
        toml_edit::Value::String(s) if s.value().trim().is_empty() => Some(Vec::new()),
        toml_edit::Value::String(s) => Some(vec![s.value().clone()]),
        toml_edit::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// Returns the registered services of a group, if the group is configured.
#[must_use]
pub fn configured_services(config: &ConfigTree, group: &str) -> Option<Vec<String>> {
    let [engine, services] = SERVICES_SECTION;
    config
        .get(&[engine, services, group])
        .and_then(item_as_list)
}

/// Appends `service` to a group, creating the section and list when needed.
///
/// A single-name value becomes a list. Returns false when `[Engine.Services]`
/// is blocked by a non-section value.
pub fn add_service(config: &mut ConfigTree, group: &str, service: &str) -> bool {
    let Some(section) = config.ensure_section(&SERVICES_SECTION) else {
        return false;
    };

    if let Some(list) = section.get_mut(group).and_then(Item::as_array_mut) {
        list.push(service);
        return true;
    }

    let mut services = section
        .get(group)
        .and_then(item_as_list)
        .unwrap_or_default();
    services.push(service.to_string());
    replace_list(section, group, &services);
    true
}

/// Removes every service named in `declared` from a group, keeping the order
/// of the rest. Returns true if anything was removed.
pub fn remove_services(config: &mut ConfigTree, group: &str, declared: &[String]) -> bool {
    let Some(section) = config.section_mut(&SERVICES_SECTION) else {
        return false;
    };

    if let Some(list) = section.get_mut(group).and_then(Item::as_array_mut) {
        let before = list.len();
        let lead = list.get(0).and_then(|v| v.decor().prefix().cloned());
        list.retain(|v| !v.as_str().is_some_and(|s| declared.iter().any(|d| d == s)));

        // The new first entry takes over the old first entry's spacing.
        if let (Some(first), Some(prefix)) = (list.get_mut(0), lead) {
            first.decor_mut().set_prefix(prefix);
        }
        return list.len() != before;
    }

    let Some(existing) = section.get(group).and_then(item_as_list) else {
        return false;
    };
    let remaining = without_services(&existing, declared);
    if remaining.len() == existing.len() {
        return false;
    }
    replace_list(section, group, &remaining);
    true
}

/// Sets a group to a fresh list, keeping the spacing and trailing comment
/// of the value it replaces.
fn replace_list(section: &mut Table, group: &str, services: &[String]) {
    let list: Array = services.iter().map(String::as_str).collect();

    match section.get_mut(group).and_then(Item::as_value_mut) {
        Some(value) => {
            let decor = value.decor().clone();
            *value = toml_edit::Value::Array(list);
            *value.decor_mut() = decor;
        }
        None => {
            section.insert(group, toml_edit::value(list));
        }
    }
}

/// Returns `existing` without any service named in `declared`, in order.
#[must_use]
pub fn without_services(existing: &[String], declared: &[String]) -> Vec<String> {
    existing
        .iter()
        .filter(|svc| !declared.contains(svc))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    const STATION: &str = r#"[Engine.Services]
process_services = "weewx.engine.StdConvert"   # converts units
report_services = ["weewx.engine.StdPrint", "weewx.engine.StdReport"] # last
"#;

    #[test]
    fn test_option_as_list() {
        assert_eq!(
            option_as_list(&Value::String("user.a.A".to_string())),
            Some(names(&["user.a.A"]))
        );
        assert_eq!(option_as_list(&Value::String(String::new())), Some(vec![]));
        let array = Value::Array(vec![
            Value::String("a".to_string()),
            Value::String("b".to_string()),
        ]);
        assert_eq!(option_as_list(&array), Some(names(&["a", "b"])));
        assert_eq!(option_as_list(&Value::Integer(3)), None);
        assert_eq!(
            option_as_list(&Value::Array(vec![Value::Integer(1)])),
            None
        );
    }

    #[test]
    fn test_default_groups() {
        let service_groups = ServiceGroups::default();
        let groups: Vec<&str> = service_groups.iter().collect();
        assert_eq!(groups.len(), 7);
        assert_eq!(groups[0], "prep_services");
        assert_eq!(groups[6], "report_services");
    }

    #[test]
    fn test_configured_services() {
        let config = ConfigTree::parse(STATION).unwrap();

        assert_eq!(
            configured_services(&config, "process_services"),
            Some(names(&["weewx.engine.StdConvert"]))
        );
        assert_eq!(
            configured_services(&config, "report_services"),
            Some(names(&["weewx.engine.StdPrint", "weewx.engine.StdReport"]))
        );
        assert_eq!(configured_services(&config, "data_services"), None);
    }

    #[test]
    fn test_add_then_remove_restores_text() {
        let mut config = ConfigTree::parse(STATION).unwrap();

        assert!(add_service(&mut config, "report_services", "user.pmon.Pmon"));
        assert_eq!(
            configured_services(&config, "report_services").unwrap().last().unwrap(),
            "user.pmon.Pmon"
        );

        assert!(remove_services(
            &mut config,
            "report_services",
            &names(&["user.pmon.Pmon"])
        ));
        assert_eq!(config.render(), STATION);
    }

    #[test]
    fn test_add_to_single_name_keeps_comment() {
        let mut config = ConfigTree::parse(STATION).unwrap();

        assert!(add_service(&mut config, "process_services", "user.pmon.Pmon"));

        assert_eq!(
            configured_services(&config, "process_services"),
            Some(names(&["weewx.engine.StdConvert", "user.pmon.Pmon"]))
        );
        assert!(config.render().contains("# converts units"));
    }

    #[test]
    fn test_add_creates_missing_group() {
        let mut config = ConfigTree::parse("[Station]\nlocation = \"x\"\n").unwrap();

        assert!(add_service(&mut config, "data_services", "user.x.X"));

        assert_eq!(
            configured_services(&config, "data_services"),
            Some(names(&["user.x.X"]))
        );
        assert!(config.render().contains("[Engine.Services]"));
    }

    #[test]
    fn test_add_blocked() {
        let mut config = ConfigTree::parse("Engine = \"oops\"\n").unwrap();
        assert!(!add_service(&mut config, "data_services", "user.x.X"));
    }

    #[test]
    fn test_remove_first_keeps_spacing() {
        let mut config = ConfigTree::parse(STATION).unwrap();

        assert!(remove_services(
            &mut config,
            "report_services",
            &names(&["weewx.engine.StdPrint"])
        ));

        assert!(
            config
                .render()
                .contains("report_services = [\"weewx.engine.StdReport\"] # last")
        );
    }

    #[test]
    fn test_remove_nothing() {
        let mut config = ConfigTree::parse(STATION).unwrap();
        assert!(!remove_services(&mut config, "report_services", &names(&["user.x.X"])));
        assert!(!remove_services(&mut config, "data_services", &names(&["user.x.X"])));
        assert_eq!(config.render(), STATION);
    }

    #[test]
    fn test_without_services_keeps_order() {
        let existing = names(&["a", "x", "b", "x", "c"]);
        assert_eq!(
            without_services(&existing, &names(&["x"])),
            names(&["a", "b", "c"])
        );
    }
}
