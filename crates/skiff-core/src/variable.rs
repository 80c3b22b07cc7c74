//! Variable table and `{{NAME}}` placeholder substitution.
//!
//! Substitution never fails: unknown names expand to an empty string and an
//! unterminated `{{` is copied through as-is. `$NAME` is left alone so shell
//! expansions reach the remote host untouched.

use std::collections::HashMap;

/// Values defined by `VAR` statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    values: HashMap<String, String>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Replaces every `{{NAME}}` in `input` with its value from `vars`.
///
/// Whitespace inside the braces is ignored, so `{{ NAME }}` works too.
pub fn substitute(input: &str, vars: &VariableTable) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        out.push_str(&rest[..start]);
        let name = after_open[..end].trim();
        out.push_str(vars.get(name).unwrap_or_default());
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// Element-wise [`substitute`].
pub fn substitute_all(inputs: &[String], vars: &VariableTable) -> Vec<String> {
    inputs.iter().map(|s| substitute(s, vars)).collect()
}
