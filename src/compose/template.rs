//! Static script skeletons with named `{{slot}}` placeholders.

use std::collections::BTreeMap;

use crate::error::RescueError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A skeleton text whose `{{name}}` placeholders are filled in one pass.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    name: &'static str,
    text: &'static str,
}

/// Slot values keyed by placeholder name.
pub type Slots<'a> = BTreeMap<&'static str, &'a str>;

impl Template {
    pub const fn new(name: &'static str, text: &'static str) -> Self {
        Self { name, text }
    }

    /// Substitutes every placeholder.
    ///
    /// Values are inserted as-is and never re-scanned, so a value may itself
    /// contain `{{...}}`. Fails if the skeleton names a slot that `slots`
    /// lacks, or if `slots` carries a name the skeleton never uses.
    pub fn render(&self, slots: &Slots<'_>) -> Result<String, RescueError> {
        let mut out = String::with_capacity(self.text.len() + slots.values().map(|v| v.len()).sum::<usize>());
        let mut used = Vec::new();
        let mut rest = self.text;

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            let Some(end) = after.find(CLOSE) else {
                return Err(RescueError::Template(format!(
                    "{}: unterminated placeholder",
                    self.name
                )));
            };

            let key = after[..end].trim();
            let Some(value) = slots.get(key) else {
                return Err(RescueError::Template(format!(
                    "{}: no value for slot '{}'",
                    self.name, key
                )));
            };
            out.push_str(value);
            used.push(key);
            rest = &after[end + CLOSE.len()..];
        }
        out.push_str(rest);

        if let Some(unused) = slots.keys().find(|k| !used.contains(*k)) {
            return Err(RescueError::Template(format!(
                "{}: slot '{}' is not used by the skeleton",
                self.name, unused
            )));
        }

        Ok(out)
    }
}
