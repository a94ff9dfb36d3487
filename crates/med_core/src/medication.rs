use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Ordered list of unique medication names, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicationList(Vec<String>);

impl MedicationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from stored names, dropping repeats after the first.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for name in names {
            let name = name.into();
            if !list.contains(&name) {
                list.0.push(name);
            }
        }
        list
    }

    /// Appends a trimmed name. Matching is exact and case-sensitive.
    pub fn add(&mut self, name: &str) -> Result<&str, ParseError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseError::EmptyName);
        }
        if self.contains(name) {
            return Err(ParseError::DuplicateName(name.to_string()));
        }
        self.0.push(name.to_string());
        Ok(self.0.last().map(String::as_str).unwrap_or_default())
    }

    pub fn remove_at(&mut self, index: usize) -> Option<String> {
        if index < self.0.len() {
            Some(self.0.remove(index))
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|existing| existing == name)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-day "taken" flags keyed by medication name. A missing key means not taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyStatus(BTreeMap<String, bool>);

impl DailyStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.0.get(name).copied().unwrap_or(false)
    }

    pub fn set(&mut self, name: &str, taken: bool) {
        self.0.insert(name.to_string(), taken);
    }

    /// Flips the flag and returns the new value.
    pub fn toggle(&mut self, name: &str) -> bool {
        let taken = !self.is_taken(name);
        self.set(name, taken);
        taken
    }

    pub fn forget(&mut self, name: &str) {
        self.0.remove(name);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn of(medications: &MedicationList, status: &DailyStatus) -> Self {
        let completed = medications
            .iter()
            .filter(|name| status.is_taken(name))
            .count();
        Self {
            completed,
            total: medications.len(),
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}
