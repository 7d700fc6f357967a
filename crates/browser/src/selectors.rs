use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::surface::{Locator, LocatorKind};

/// Well-known query names the signup flow resolves.
pub const ADDRESS_INPUT: &str = "address_input";
pub const CONTINUE_BUTTON: &str = "continue_button";
pub const LANDING_MARKER: &str = "landing_marker";
pub const ALTERNATE_FLOW_TOGGLE: &str = "alternate_flow_toggle";

/// One ranked way of locating an element. Lower priority is tried first;
/// each strategy gets its own presence-wait budget.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SelectorStrategy {
    pub name: String,
    pub kind: LocatorKind,
    pub expr: String,
    pub priority: u32,
    pub timeout_secs: u64,
}

impl SelectorStrategy {
    pub fn locator(&self) -> Locator {
        Locator::new(self.kind, self.expr.clone())
    }
}

/// An ordered chain of strategies for one logical element. Brittle
/// absolute-path locators are just the lowest-priority entries.
#[derive(Debug, Clone)]
pub struct ElementQuery {
    pub name: String,
    strategies: Vec<SelectorStrategy>,
}

impl ElementQuery {
    pub fn new(name: impl Into<String>, mut strategies: Vec<SelectorStrategy>) -> Self {
        strategies.sort_by_key(|s| s.priority);
        Self {
            name: name.into(),
            strategies,
        }
    }

    /// Strategies in try-order.
    pub fn strategies(&self) -> &[SelectorStrategy] {
        &self.strategies
    }
}

#[derive(Debug, Deserialize)]
struct SelectorFile {
    selectors: HashMap<String, SelectorFileQuery>,
}

#[derive(Debug, Deserialize)]
struct SelectorFileQuery {
    strategies: Vec<SelectorStrategy>,
}

/// All element queries the flow knows about, resolved in layers: an
/// optional external JSON file first, the compiled-in table otherwise.
#[derive(Debug, Clone)]
pub struct SelectorTable {
    queries: HashMap<String, ElementQuery>,
}

impl SelectorTable {
    pub fn from_queries(queries: Vec<ElementQuery>) -> Self {
        Self {
            queries: queries.into_iter().map(|q| (q.name.clone(), q)).collect(),
        }
    }

    /// Load the table, falling back to built-in defaults when no file is
    /// configured or the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "selector file unreadable, using built-in table");
                return Self::builtin();
            }
        };

        match serde_json::from_str::<SelectorFile>(&raw) {
            Ok(file) => {
                info!(path = %path.display(), queries = file.selectors.len(), "loaded selector table");
                Self::from_queries(
                    file.selectors
                        .into_iter()
                        .map(|(name, q)| ElementQuery::new(name, q.strategies))
                        .collect(),
                )
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "selector file invalid, using built-in table");
                Self::builtin()
            }
        }
    }

    pub fn query(&self, name: &str) -> Option<&ElementQuery> {
        self.queries.get(name)
    }

    /// Compiled-in defaults for the signup flow. The absolute-path entries
    /// are last-resort locators for when the semantic ones miss.
    pub fn builtin() -> Self {
        let strategy = |name: &str, kind, expr: &str, priority, timeout_secs| SelectorStrategy {
            name: name.to_string(),
            kind,
            expr: expr.to_string(),
            priority,
            timeout_secs,
        };

        Self::from_queries(vec![
            ElementQuery::new(
                ADDRESS_INPUT,
                vec![
                    strategy(
                        "address input (type=email)",
                        LocatorKind::XPath,
                        "//input[@type='email']",
                        1,
                        15,
                    ),
                    strategy(
                        "address input (placeholder)",
                        LocatorKind::XPath,
                        "//input[contains(@placeholder, 'email') or contains(@placeholder, 'Email')]",
                        2,
                        10,
                    ),
                    strategy(
                        "address input (css)",
                        LocatorKind::Css,
                        "form input[type='email'], form input[placeholder*='email']",
                        3,
                        10,
                    ),
                    strategy(
                        "address input (absolute path)",
                        LocatorKind::XPath,
                        "/html/body/div[2]/div/div[1]/main/div[1]/div/div[2]/div/div[1]/div/form/input",
                        9,
                        5,
                    ),
                ],
            ),
            ElementQuery::new(
                CONTINUE_BUTTON,
                vec![
                    strategy(
                        "continue button (text)",
                        LocatorKind::XPath,
                        "//button[contains(text(), 'Continue') or contains(text(), 'Next')]",
                        1,
                        15,
                    ),
                    strategy(
                        "submit button",
                        LocatorKind::XPath,
                        "//button[@type='submit']",
                        2,
                        10,
                    ),
                    strategy(
                        "continue button (css)",
                        LocatorKind::Css,
                        "button[type='submit'], .btn-primary, .continue-btn",
                        3,
                        10,
                    ),
                    strategy(
                        "continue button (absolute path)",
                        LocatorKind::XPath,
                        "/html/body/div[2]/div/div[1]/main/div[1]/div/div[2]/div/div[1]/div/form/button",
                        9,
                        5,
                    ),
                ],
            ),
            ElementQuery::new(
                LANDING_MARKER,
                vec![
                    strategy(
                        "post-verification marker (text)",
                        LocatorKind::XPath,
                        "//div[contains(text(), 'year')]",
                        1,
                        20,
                    ),
                    strategy(
                        "post-verification marker (absolute path)",
                        LocatorKind::XPath,
                        "/html/body/main/div/div/form/div/label[2]/div/div",
                        9,
                        5,
                    ),
                ],
            ),
            ElementQuery::new(
                ALTERNATE_FLOW_TOGGLE,
                vec![
                    strategy(
                        "alternate-flow checkbox",
                        LocatorKind::XPath,
                        "//input[@type='checkbox' and contains(@name, 'phone')]",
                        1,
                        10,
                    ),
                    strategy(
                        "alternate-flow checkbox (absolute path)",
                        LocatorKind::XPath,
                        "/html/body/main/div/div/form/div[1]/div/div/input",
                        9,
                        5,
                    ),
                ],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_orders_strategies_by_priority() {
        let table = SelectorTable::builtin();
        let query = table.query(ADDRESS_INPUT).unwrap();
        let priorities: Vec<u32> = query.strategies().iter().map(|s| s.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
        assert_eq!(query.strategies()[0].priority, 1);
    }

    #[test]
    fn file_overrides_builtin_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectors.json");
        std::fs::write(
            &path,
            r##"{
                "selectors": {
                    "address_input": {
                        "strategies": [
                            { "name": "custom", "kind": "css", "expr": "#mail", "priority": 5, "timeout_secs": 3 },
                            { "name": "first", "kind": "xpath", "expr": "//input", "priority": 1, "timeout_secs": 3 }
                        ]
                    }
                }
            }"##,
        )
        .unwrap();

        let table = SelectorTable::load(Some(&path));
        let query = table.query(ADDRESS_INPUT).unwrap();
        assert_eq!(query.strategies().len(), 2);
        assert_eq!(query.strategies()[0].name, "first");
        assert!(table.query(CONTINUE_BUTTON).is_none());
    }

    #[test]
    fn unreadable_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let table = SelectorTable::load(Some(&dir.path().join("missing.json")));
        assert!(table.query(CONTINUE_BUTTON).is_some());
    }

    #[test]
    fn invalid_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("selectors.json");
        std::fs::write(&path, "not json").unwrap();
        let table = SelectorTable::load(Some(&path));
        assert!(table.query(ADDRESS_INPUT).is_some());
    }
}
