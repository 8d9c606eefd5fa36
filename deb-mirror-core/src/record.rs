use serde::Serialize;
use std::collections::BTreeMap;

pub const PACKAGE: &str = "Package";
pub const FILENAME: &str = "Filename";
pub const MD5SUM: &str = "MD5sum";
pub const SIZE: &str = "Size";
pub const DIRECTORY: &str = "Directory";
pub const FILES: &str = "Files";

/// The value of one control-file field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A single-line (possibly wrapped) value.
    Scalar(String),
    /// A multi-line list opened by an empty `KEY:` line.
    List(Vec<String>),
}

impl FieldValue {
    /// Non-empty lines of this value, whichever shape it has.
    pub fn entries(&self) -> Vec<&str> {
        match self {
            FieldValue::Scalar(s) => s.lines().filter(|l| !l.trim().is_empty()).collect(),
            FieldValue::List(items) => items
                .iter()
                .map(String::as_str)
                .filter(|l| !l.trim().is_empty())
                .collect(),
        }
    }
}

/// Which identifying fields a complete record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordIdentity {
    /// `Package` + `Filename` + `MD5sum` + `Size`: one artifact.
    SingleFile,
    /// `Directory` + a non-empty `Files` manifest: one artifact per manifest entry.
    Directory,
}

/// One parsed stanza of a Packages or Sources index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FieldValue> {
        self.fields.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    /// The value of a scalar field; `None` for lists and absent keys.
    pub fn scalar(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Scalar(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The items of a list field; `None` for scalars and absent keys.
    pub fn list(&self, key: &str) -> Option<&[String]> {
        match self.fields.get(key) {
            Some(FieldValue::List(items)) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Applies the completeness rule: a record is only emitted if this returns `Some`.
    pub fn identity(&self) -> Option<RecordIdentity> {
        let present = |key: &str| self.scalar(key).is_some_and(|v| !v.trim().is_empty());

        if present(PACKAGE) && present(FILENAME) && present(MD5SUM) && present(SIZE) {
            return Some(RecordIdentity::SingleFile);
        }
        if present(DIRECTORY)
            && self
                .get(FILES)
                .is_some_and(|files| !files.entries().is_empty())
        {
            return Some(RecordIdentity::Directory);
        }
        None
    }

    /// A short label for log lines: the package name, or the first field we have.
    pub fn label(&self) -> String {
        self.scalar(PACKAGE)
            .map(str::to_owned)
            .or_else(|| self.scalar(DIRECTORY).map(str::to_owned))
            .unwrap_or_else(|| format!("<{} fields>", self.len()))
    }
}
