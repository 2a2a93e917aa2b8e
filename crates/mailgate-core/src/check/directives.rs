//! Typed access to a check instance's configuration block

use mailgate_common::{Error, Result};
use std::collections::HashSet;

/// Reads directives out of one `[[checks]]` entry.
///
/// Every accessor marks its key as consumed; [`DirectiveMap::finish`] fails on
/// keys nobody asked for, so typos surface at startup instead of being
/// silently ignored.
pub struct DirectiveMap<'a> {
    instance: &'a str,
    block: &'a toml::Table,
    consumed: HashSet<&'a str>,
}

impl<'a> DirectiveMap<'a> {
    pub fn new(instance: &'a str, block: &'a toml::Table) -> Self {
        Self {
            instance,
            block,
            consumed: HashSet::new(),
        }
    }

    /// Boolean directive
    pub fn bool(&mut self, key: &'a str, default: bool) -> Result<bool> {
        self.custom(key, || default, |value| {
            value
                .as_bool()
                .ok_or_else(|| format!("expected boolean, got {}", value.type_str()))
        })
    }

    /// Integer directive
    pub fn int(&mut self, key: &'a str, default: i64) -> Result<i64> {
        self.custom(key, || default, |value| {
            value
                .as_integer()
                .ok_or_else(|| format!("expected integer, got {}", value.type_str()))
        })
    }

    /// Directive with a caller-supplied parser; `default` runs only when the
    /// key is absent.
    pub fn custom<T, D, P>(&mut self, key: &'a str, default: D, parse: P) -> Result<T>
    where
        D: FnOnce() -> T,
        P: FnOnce(&toml::Value) -> std::result::Result<T, String>,
    {
        self.consumed.insert(key);
        match self.block.get(key) {
            Some(value) => parse(value).map_err(|e| Error::directive(self.instance, key, e)),
            None => Ok(default()),
        }
    }

    /// Fail on any directive that was not consumed
    pub fn finish(self) -> Result<()> {
        let mut unknown: Vec<&str> = self
            .block
            .keys()
            .map(String::as_str)
            .filter(|k| !self.consumed.contains(k))
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }

        unknown.sort_unstable();
        Err(Error::Config(format!(
            "{}: unknown directive(s): {}",
            self.instance,
            unknown.join(", ")
        )))
    }
}
