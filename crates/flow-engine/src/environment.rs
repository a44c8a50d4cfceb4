//! Per-workspace environment variables
//!
//! Handed to every `EnvironmentAware` component. The workspace seeds
//! [`FLOW_DIRECTORY_KEY`] with the directory of the last loaded or saved
//! flow file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

pub use crate::constants::FLOW_DIRECTORY_KEY;

/// String-keyed environment map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Insert or replace a variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Expand `${key}` references. Unknown keys and unterminated
    /// references are errors.
    pub fn substitute(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                FlowError::failed(format!("Unterminated variable reference in '{}'", text))
            })?;
            let key = &after[..end];
            let value = self
                .get(key)
                .ok_or_else(|| FlowError::failed(format!("Unknown environment variable '{}'", key)))?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut env = Environment::new();
        env.set("a", "1");
        env.set("a", "2");
        assert_eq!(env.get("a"), Some("2"));
        assert_eq!(env.remove("a"), Some("2".to_string()));
        assert!(env.is_empty());
    }

    #[test]
    fn test_substitute() {
        let env: Environment = [(FLOW_DIRECTORY_KEY, "/data/flows")].into_iter().collect();
        let path = env
            .substitute(&format!("${{{}}}/iris.arff", FLOW_DIRECTORY_KEY))
            .unwrap();
        assert_eq!(path, "/data/flows/iris.arff");
        assert_eq!(env.substitute("no refs").unwrap(), "no refs");
    }

    #[test]
    fn test_substitute_errors() {
        let env = Environment::new();
        assert!(env.substitute("${missing}").is_err());
        assert!(env.substitute("${open").is_err());
    }
}
