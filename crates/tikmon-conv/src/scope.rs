//! Variable scope threaded down the command tree
//!
//! A scope is never mutated once handed to a command node. Each response row
//! builds a child scope with its own variables inserted, which is then used
//! for the row's labels, metrics and sub commands.

use std::collections::HashMap;
use std::sync::Arc;

/// Immutable set of named variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableScope {
    vars: Arc<HashMap<String, String>>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            vars: Arc::new(vars),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Copy of this scope with `vars` inserted, overwriting on collision.
    ///
    /// An empty overlay shares the parent's storage.
    pub fn child<I>(&self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut iter = vars.into_iter().peekable();
        if iter.peek().is_none() {
            return self.clone();
        }
        let mut map = (*self.vars).clone();
        map.extend(iter);
        Self::from_map(map)
    }

    /// Variable for a placeholder, exact name first, then ignoring ASCII case
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).or_else(|| {
            self.vars
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    /// Replace `{name}` placeholders with variable values.
    ///
    /// Placeholder names ignore ASCII case. Unknown placeholders and
    /// unbalanced braces are kept as written.
    pub fn substitute(&self, template: &str) -> String {
        if self.vars.is_empty() || !template.contains('{') {
            return template.to_string();
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find(['{', '}']) {
                Some(close) if after.as_bytes()[close] == b'}' => {
                    let name = &after[..close];
                    match self.lookup(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl FromIterator<(String, String)> for VariableScope {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}
