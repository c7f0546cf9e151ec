//! Desired and reported property caches
//!
//! Two independent name → value maps. Writes overwrite (last-write-wins), entries
//! never expire, and everything is dropped with the engine.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct PropertyStore {
    desired: HashMap<String, String>,
    reported: HashMap<String, String>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_desired(&mut self, name: &str, value: &str) {
        self.desired.insert(name.to_string(), value.to_string());
    }

    /// Latest desired value, or `""` when the property was never received.
    pub fn get_desired(&self, name: &str) -> String {
        self.desired(name).unwrap_or_default().to_string()
    }

    /// Latest desired value, `None` when absent.
    pub fn desired(&self, name: &str) -> Option<&str> {
        self.desired.get(name).map(String::as_str)
    }

    pub fn set_reported(&mut self, name: &str, value: &str) {
        self.reported.insert(name.to_string(), value.to_string());
    }

    /// Latest reported value, or `""` when never reported.
    pub fn get_reported(&self, name: &str) -> String {
        self.reported(name).unwrap_or_default().to_string()
    }

    /// Latest reported value, `None` when absent.
    pub fn reported(&self, name: &str) -> Option<&str> {
        self.reported.get(name).map(String::as_str)
    }

    pub fn desired_len(&self) -> usize {
        self.desired.len()
    }

    pub fn reported_len(&self) -> usize {
        self.reported.len()
    }
}
