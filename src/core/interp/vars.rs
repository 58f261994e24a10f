// src/core/interp/vars.rs

/// Shell variables in first-definition order.
///
/// Every variable is exported to child processes, and the whole table is
/// what the shell persists after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct VarTable {
    entries: Vec<(String, String)>,
}

impl VarTable {
    /// Builds the table from `KEY=VALUE` entries. A repeated key keeps its
    /// first position and its last value.
    pub(crate) fn from_env(env: &[String]) -> Self {
        let mut table = Self::default();
        for (key, value) in env.iter().filter_map(|entry| entry.split_once('=')) {
            table.set(key, value);
        }
        table
    }

    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, slot)) => value.clone_into(slot),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub(crate) fn unset(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(index).1)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn to_env(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

/// A valid variable name: a letter or `_`, then letters, digits or `_`.
pub(crate) fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
