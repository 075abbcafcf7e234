//! Field contracts over schema-less JSON records.
//!
//! Units declare the fields they need through these accessors so that a
//! record of the wrong shape fails with the exact dotted path that is missing,
//! instead of a generic lookup error somewhere later.

use serde_json::{Map, Value};

use crate::errors::UnitError;

/// Structured value stored under one key.
pub type Record = Value;

pub trait RecordExt {
    /// Value at a dotted path (`Login.LastLogin`).
    fn field(&self, path: &str) -> Result<&Value, UnitError>;

    /// String value at a dotted path.
    fn str_field(&self, path: &str) -> Result<&str, UnitError>;

    /// Whether a dotted path resolves.
    fn has_field(&self, path: &str) -> bool;

    /// Remove and return the value at a dotted path.
    fn take_field(&mut self, path: &str) -> Result<Value, UnitError>;

    /// Set a value at a dotted path. Parent objects must already exist.
    fn set_field(&mut self, path: &str, value: Value) -> Result<(), UnitError>;

    /// The record as a JSON object.
    fn as_fields(&self) -> Result<&Map<String, Value>, UnitError>;
}

impl RecordExt for Value {
    fn field(&self, path: &str) -> Result<&Value, UnitError> {
        let mut current = self;
        for (depth, segment) in path.split('.').enumerate() {
            let object = current.as_object().ok_or_else(|| object_expected(path, depth))?;
            current = object.get(segment).ok_or_else(|| missing(path))?;
        }
        Ok(current)
    }

    fn str_field(&self, path: &str) -> Result<&str, UnitError> {
        self.field(path)?.as_str().ok_or_else(|| UnitError::InvalidField {
            field: path.to_string(),
            expected: "a string",
        })
    }

    fn has_field(&self, path: &str) -> bool {
        self.field(path).is_ok()
    }

    fn take_field(&mut self, path: &str) -> Result<Value, UnitError> {
        let (parent, leaf) = parent_mut(self, path)?;
        parent.remove(leaf).ok_or_else(|| missing(path))
    }

    fn set_field(&mut self, path: &str, value: Value) -> Result<(), UnitError> {
        let (parent, leaf) = parent_mut(self, path)?;
        parent.insert(leaf.to_string(), value);
        Ok(())
    }

    fn as_fields(&self) -> Result<&Map<String, Value>, UnitError> {
        self.as_object().ok_or_else(|| UnitError::InvalidField {
            field: "<record>".to_string(),
            expected: "an object",
        })
    }
}

fn parent_mut<'a, 'p>(record: &'a mut Value, path: &'p str) -> Result<(&'a mut Map<String, Value>, &'p str), UnitError> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };

    let mut current = record;
    if let Some(parent_path) = parent_path {
        for (depth, segment) in parent_path.split('.').enumerate() {
            let object = current.as_object_mut().ok_or_else(|| object_expected(path, depth))?;
            current = object.get_mut(segment).ok_or_else(|| missing(path))?;
        }
    }

    let depth = path.split('.').count() - 1;
    let object = current.as_object_mut().ok_or_else(|| object_expected(path, depth))?;
    Ok((object, leaf))
}

fn missing(path: &str) -> UnitError {
    UnitError::MissingField {
        field: path.to_string(),
    }
}

fn object_expected(path: &str, depth: usize) -> UnitError {
    let prefix: Vec<&str> = path.split('.').take(depth).collect();
    let field = if prefix.is_empty() {
        "<record>".to_string()
    } else {
        prefix.join(".")
    };
    UnitError::InvalidField {
        field,
        expected: "an object",
    }
}
