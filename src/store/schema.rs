// src/store/schema.rs

//! Declarative schemas for client request documents.
//!
//! Every request document is a JSON object. A [`Schema`] lists the keys it
//! recognises, their types, and which are required; [`Schema::validate`]
//! rejects anything else before the store is touched.

use serde_json::{Map, Value};

use crate::errors::{Result, SwarmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Object,
    StringArray,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Object => value.is_object(),
            FieldKind::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Integer => "an integer",
            FieldKind::Object => "an object",
            FieldKind::StringArray => "an array of strings",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn optional(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
    }
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Request name used in error messages.
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// `file-declare`: the closed on-disk attribute set of a file.
pub const FILE_DECLARE: Schema = Schema {
    name: "file-declare",
    fields: &[
        optional("type", FieldKind::String),
        optional("project", FieldKind::String),
        optional("metadata", FieldKind::Object),
    ],
};

/// `file-commit` / `file-delete`: a reference to one file.
pub const FILE_REF: Schema = Schema {
    name: "file-ref",
    fields: &[required("file-id", FieldKind::String)],
};

pub const TASK_SUBMIT: Schema = Schema {
    name: "task-submit",
    fields: &[
        required("command", FieldKind::String),
        optional("inputs", FieldKind::StringArray),
        optional("outputs", FieldKind::StringArray),
        optional("resources", FieldKind::Object),
        optional("environment", FieldKind::Object),
        optional("project", FieldKind::String),
    ],
};

/// `task-remove` / `task-retire`: a reference to one task.
pub const TASK_REF: Schema = Schema {
    name: "task-ref",
    fields: &[required("task-id", FieldKind::Integer)],
};

impl Schema {
    /// Check `doc` against this schema and return it as an object.
    pub fn validate<'a>(&self, doc: &'a Value) -> Result<&'a Map<String, Value>> {
        let Some(obj) = doc.as_object() else {
            return Err(SwarmError::Validation(format!(
                "{}: request must be an object",
                self.name
            )));
        };

        for key in obj.keys() {
            if !self.fields.iter().any(|f| f.name == key) {
                return Err(SwarmError::Validation(format!(
                    "{}: unrecognized key '{}'",
                    self.name, key
                )));
            }
        }

        for field in self.fields {
            match obj.get(field.name) {
                Some(value) if !field.kind.accepts(value) => {
                    return Err(SwarmError::Validation(format!(
                        "{}: '{}' must be {}",
                        self.name,
                        field.name,
                        field.kind.describe()
                    )));
                }
                None if field.required => {
                    return Err(SwarmError::Validation(format!(
                        "{}: missing required key '{}'",
                        self.name, field.name
                    )));
                }
                _ => {}
            }
        }

        Ok(obj)
    }
}

/// Pull the file id out of a `file-ref` document.
pub fn file_id_from_request(doc: &Value) -> Result<String> {
    let obj = FILE_REF.validate(doc)?;
    Ok(obj
        .get("file-id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// Pull the task id out of a `task-ref` document.
pub fn task_id_from_request(doc: &Value) -> Result<u64> {
    let obj = TASK_REF.validate(doc)?;
    obj.get("task-id")
        .and_then(Value::as_u64)
        .ok_or_else(|| SwarmError::Validation("task-ref: 'task-id' must be non-negative".into()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn recognised_keys_pass() {
        let doc = json!({"type": "file", "project": "p", "metadata": {"k": 1}});
        assert_eq!(FILE_DECLARE.validate(&doc).unwrap().len(), 3);
        assert!(FILE_DECLARE.validate(&json!({})).is_ok());
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = FILE_DECLARE
            .validate(&json!({"type": "file", "foo": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("unrecognized key 'foo'"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        assert!(FILE_DECLARE.validate(&json!({"metadata": "flat"})).is_err());
        assert!(TASK_SUBMIT
            .validate(&json!({"command": "ls", "inputs": ["a", 3]}))
            .is_err());
        assert!(FILE_DECLARE.validate(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn required_key_is_enforced() {
        let err = TASK_SUBMIT.validate(&json!({"inputs": []})).unwrap_err();
        assert!(err.to_string().contains("missing required key 'command'"));
    }

    #[test]
    fn ref_documents() {
        assert_eq!(file_id_from_request(&json!({"file-id": "abc"})).unwrap(), "abc");
        assert_eq!(task_id_from_request(&json!({"task-id": 7})).unwrap(), 7);
        assert!(task_id_from_request(&json!({"task-id": -1})).is_err());
        assert!(file_id_from_request(&json!({"file-id": "a", "x": 1})).is_err());
    }
}
