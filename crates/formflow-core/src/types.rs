use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Value object: Step ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

/// Value object: Field ID (a dot-delimited path into the working data)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub String);

/// Value object: Section ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(pub String);

/// Value object: Form session ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

macro_rules! id_conversions {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                /// Borrow the raw identifier
                #[inline]
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl From<&str> for $ty {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<String> for $ty {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

id_conversions!(StepId, FieldId, SectionId, SessionId);

/// Split a dot-delimited path into its segments, rejecting empty segments.
pub fn split_path(path: &str) -> Result<Vec<&str>, CoreError> {
    if path.is_empty() {
        return Err(CoreError::InvalidFieldPath(path.to_string()));
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(CoreError::InvalidFieldPath(path.to_string()));
    }
    Ok(segments)
}

/// Returns true if `path` equals `prefix` or lies underneath it.
pub fn path_is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

/// Null, empty (or whitespace-only) strings, empty arrays and empty objects
/// count as "no value".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// The in-progress form data: a JSON object addressed by dot-delimited paths.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkingData {
    values: Map<String, Value>,
}

impl WorkingData {
    /// Create empty working data
    pub fn new() -> Self {
        Self::default()
    }

    /// Build working data from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            other => Err(CoreError::SerializationError(format!(
                "Working data must be a JSON object, got: {}",
                other
            ))),
        }
    }

    /// Borrow the underlying object
    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Clone into a plain JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Take ownership of the inner JSON object as a value
    #[inline]
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }

    /// True if no top-level key has been set
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by dot-delimited path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.values.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// True if the path holds a non-blank value
    pub fn has_value(&self, path: &str) -> bool {
        self.get(path).map_or(false, |value| !is_blank(value))
    }

    /// Write a value at a dot-delimited path, creating intermediate objects.
    ///
    /// A non-object value sitting on an intermediate segment is replaced by an
    /// object. Returns the previous value at the path, if any.
    pub fn set(&mut self, path: &str, value: Value) -> Result<Option<Value>, CoreError> {
        let segments = split_path(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| CoreError::InvalidFieldPath(path.to_string()))?;

        let mut map = &mut self.values;
        for segment in parents {
            let entry = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(inner) = entry else {
                return Err(CoreError::InvalidFieldPath(path.to_string()));
            };
            map = inner;
        }

        Ok(map.insert(last.to_string(), value))
    }

    /// Remove the value at a path, returning it
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>, CoreError> {
        let segments = split_path(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| CoreError::InvalidFieldPath(path.to_string()))?;

        let mut map = &mut self.values;
        for segment in parents {
            match map.get_mut(*segment) {
                Some(Value::Object(inner)) => map = inner,
                _ => return Ok(None),
            }
        }
        Ok(map.remove(*last))
    }

    /// Deep-merge `overlay` into this data; overlay values win for every key
    /// they define, nested objects are merged key by key.
    pub fn merge_from(&mut self, overlay: &WorkingData) {
        for (key, value) in &overlay.values {
            let target = self.values.entry(key.clone()).or_insert(Value::Null);
            merge_value(target, value);
        }
    }

    /// Copy only the given paths into a new JSON object
    pub fn project<'a, I>(&self, paths: I) -> Value
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut projected = WorkingData::new();
        for path in paths {
            if let Some(value) = self.get(path) {
                // Paths come from a validated definition; a bad one just drops out.
                let _ = projected.set(path, value.clone());
            }
        }
        projected.into_value()
    }
}

/// Deep-merge `overlay` into `target`
pub fn merge_value(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let slot = target_map.entry(key.clone()).or_insert(Value::Null);
                merge_value(slot, value);
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

impl From<Map<String, Value>> for WorkingData {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl TryFrom<Value> for WorkingData {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
