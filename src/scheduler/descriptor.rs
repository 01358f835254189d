//! Metadata descriptor codecs.
//!
//! Two dialects are understood:
//!
//! - **COM**: one `$ KEY :== VALUE` declaration per line, `!` starts a comment
//! - **JSON**: a single object whose values are strings
//!
//! Both drop keys whose value is empty, on parse and on serialize.

use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const KEY_TARGET_FILE: &str = "TARGET_FILE";
pub const KEY_JOB_NAME: &str = "EVAL_FNAME";
pub const KEY_JOB_TYPE: &str = "JOB_TYPE";
pub const KEY_FILE_TYPE: &str = "FEXT";
pub const KEY_CLIENT_USERNAME: &str = "CLIENT_USERNAME";
pub const KEY_CLIENT_HOSTNAME: &str = "CLIENT_HOSTNAME";
pub const KEY_CLIENT_DESTINATION: &str = "CLIENT_DESTINATION";
pub const KEY_DATE_FINISHED: &str = "DATE_FINISHED";

const COM_ASSIGN: &str = ":==";

/// Ordered string map loaded from a descriptor.
///
/// Insertion order is kept so a rewritten descriptor reads like the one the
/// client sent. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a value. Empty values remove the key instead.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if value.is_empty() {
            self.remove(&key);
            return;
        }
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

/// On-disk descriptor dialect, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Com,
    Json,
}

impl Dialect {
    /// Detect the dialect of a descriptor path (case-insensitive extension).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "com" => Some(Dialect::Com),
            "json" => Some(Dialect::Json),
            _ => None,
        }
    }

    pub fn parse(self, text: &str) -> Result<Metadata> {
        match self {
            Dialect::Com => Ok(parse_com(text)),
            Dialect::Json => parse_json(text),
        }
    }

    pub fn serialize(self, metadata: &Metadata) -> Result<String> {
        match self {
            Dialect::Com => Ok(serialize_com(metadata)),
            Dialect::Json => serialize_json(metadata),
        }
    }
}

pub fn is_descriptor(path: &Path) -> bool {
    Dialect::from_path(path).is_some()
}

pub fn parse_com(text: &str) -> Metadata {
    let mut metadata = Metadata::new();
    for raw in text.lines() {
        let line = raw.trim().trim_matches('$').trim();
        let line = line.split('!').next().unwrap_or_default();
        if let Some((key, value)) = line.split_once(COM_ASSIGN) {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                metadata.insert(key, value);
            }
        }
    }
    metadata
}

pub fn serialize_com(metadata: &Metadata) -> String {
    metadata
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("$ {} {} {}\n", k, COM_ASSIGN, v))
        .collect()
}

pub fn parse_json(text: &str) -> Result<Metadata> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
    let mut metadata = Metadata::new();
    for (key, value) in object {
        let value = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => s,
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => {
                return Err(serde_json::Error::custom(format!(
                    "descriptor key {} must hold a scalar value",
                    key
                ))
                .into())
            }
        };
        metadata.insert(key, value.trim());
    }
    Ok(metadata)
}

pub fn serialize_json(metadata: &Metadata) -> Result<String> {
    let object: serde_json::Map<String, serde_json::Value> = metadata
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    Ok(serde_json::to_string_pretty(&object)?)
}
