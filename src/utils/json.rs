use serde_json::Value;

/// A field of a partial update: absent, explicitly cleared, or set.
#[derive(Debug, PartialEq, Eq)]
pub enum Patch<T> {
    Omitted,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    /// Shape expected by an `AsChangeset` field of type `Option<Option<T>>`.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            Patch::Omitted => None,
            Patch::Null => Some(None),
            Patch::Value(value) => Some(Some(value)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> Result<U, String>) -> Result<Patch<U>, String> {
        Ok(match self {
            Patch::Omitted => Patch::Omitted,
            Patch::Null => Patch::Null,
            Patch::Value(value) => Patch::Value(f(value)?),
        })
    }
}

pub fn nullable_string(body: &Value, field: &str) -> Result<Patch<String>, String> {
    match body.get(field) {
        None => Ok(Patch::Omitted),
        Some(Value::Null) => Ok(Patch::Null),
        Some(Value::String(s)) => Ok(Patch::Value(s.to_owned())),
        Some(other) => Err(format!("{field}: expected string or null, got {other}")),
    }
}

/// A string field that may be left out but never cleared.
pub fn optional_string(body: &Value, field: &str) -> Result<Option<String>, String> {
    match nullable_string(body, field)? {
        Patch::Omitted => Ok(None),
        Patch::Null => Err(format!("{field} cannot be null")),
        Patch::Value(value) => Ok(Some(value)),
    }
}

pub fn optional_bool(body: &Value, field: &str) -> Result<Option<bool>, String> {
    match body.get(field) {
        None => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(other) => Err(format!("{field}: expected boolean, got {other}")),
    }
}
