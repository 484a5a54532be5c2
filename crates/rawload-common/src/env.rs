//! Typed access to environment-style configuration
//!
//! Every rawload setting arrives as a string keyed by a variable name. The
//! [`EnvReader`] wraps the lookup so configuration code can be exercised
//! against a fixed map in tests instead of mutating the process environment.

use crate::error::{RawloadError, Result};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads configuration variables through a pluggable lookup function
pub struct EnvReader {
    lookup: Lookup,
}

impl EnvReader {
    /// Reader over the process environment
    pub fn process() -> Self {
        Self::from_fn(|name| std::env::var(name).ok())
    }

    /// Reader over an arbitrary lookup function
    pub fn from_fn(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// Reader over a fixed set of pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_fn(move |name| map.get(name).cloned())
    }

    /// Trimmed value of `name`; blank values count as unset
    pub fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Trimmed value of `name`, keeping a blank value as `Some("")`
    ///
    /// For settings where "set but empty" means something different from
    /// "unset".
    pub fn value(&self, name: &str) -> Option<String> {
        (self.lookup)(name).map(|v| v.trim().to_string())
    }

    /// First variable in `names` that is set
    pub fn first_of(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.string(name))
    }

    pub fn string_or(&self, name: &str, default: &str) -> String {
        self.string(name).unwrap_or_else(|| default.to_string())
    }

    /// Parse `name` into `T`; unset yields `None`, unparsable yields an error
    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.string(name) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| RawloadError::invalid_var(name, raw.clone(), e.to_string())),
        }
    }

    pub fn parse_or<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse(name)?.unwrap_or(default))
    }

    /// Boolean switch accepting true/false, 1/0, yes/no, on/off
    pub fn flag(&self, name: &str, default: bool) -> Result<bool> {
        let Some(raw) = self.string(name) else {
            return Ok(default);
        };
        match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(RawloadError::invalid_var(name, raw, "expected a boolean")),
        }
    }
}

impl std::fmt::Debug for EnvReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvReader").finish_non_exhaustive()
    }
}

/// True for template values such as `<DB_PASSWORD>`
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.len() > 2 && value.starts_with('<') && value.ends_with('>')
}
