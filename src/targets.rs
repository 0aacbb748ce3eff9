//! Target list: the ordered probes evaluated for every sample

use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Ordered, unique, non-empty list of target names shared by all samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TargetList {
    names: Vec<String>,
}

impl TargetList {
    /// Validate and wrap a list of target names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the list is empty, contains a blank
    /// name, or repeats a name.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::InvalidConfig("targets list is empty".to_string()));
        }
        let mut seen = FxHashMap::default();
        for (idx, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "target at position {idx} is blank"
                )));
            }
            if let Some(first) = seen.insert(name.as_str(), idx) {
                return Err(Error::InvalidConfig(format!(
                    "target '{name}' listed twice (positions {first} and {idx})"
                )));
            }
        }
        Ok(Self { names })
    }

    /// Load a JSON array of target names.
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, not a JSON array of strings, or
    /// fails [`TargetList::new`] validation.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("targets file {}: {e}", path.display()))
        })?;
        let names: Vec<String> = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidConfig(format!(
                "targets file {} must be a JSON array of names: {e}",
                path.display()
            ))
        })?;
        Self::new(names)
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false: a target list is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate target names in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Target names as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    /// Map from target name to its position.
    #[must_use]
    pub fn index(&self) -> FxHashMap<&str, usize> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect()
    }
}

impl TryFrom<Vec<String>> for TargetList {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<TargetList> for Vec<String> {
    fn from(list: TargetList) -> Self {
        list.names
    }
}
