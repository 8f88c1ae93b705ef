//! Field-scoped mutations applied to a room document.
//!
//! Writers never replace a room wholesale. They send a [`RoomUpdate`]: a list of equality
//! preconditions plus a list of [`Patch`]es. A backend applies the whole update atomically:
//! either every precondition holds and every patch lands, or nothing changes.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dao::storage::{StorageError, StorageResult};

/// Dotted path into the room document, e.g. `players.alice.temperature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    /// Path with a single top-level segment.
    pub fn root(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    /// Extend the path by one segment.
    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Parse a dotted path.
    pub fn parse(path: &str) -> Self {
        Self(path.split('.').map(str::to_owned).collect())
    }

    fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A single mutation primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Overwrite the value at `path`, creating parents as needed.
    Set {
        /// Field to write.
        path: FieldPath,
        /// New value.
        value: Value,
    },
    /// Push `value` onto the array at `path` unless an equal element is present.
    AppendUnique {
        /// Array field.
        path: FieldPath,
        /// Element to add.
        value: Value,
    },
    /// Drop every element equal to `value` from the array at `path`.
    Remove {
        /// Array field.
        path: FieldPath,
        /// Element to drop.
        value: Value,
    },
    /// Add `delta` to the integer at `path` (missing counts as zero).
    Increment {
        /// Integer field.
        path: FieldPath,
        /// Signed amount to add.
        delta: i64,
    },
    /// Delete the field at `path` if present.
    DeleteField {
        /// Field to delete.
        path: FieldPath,
    },
}

/// Equality guard evaluated against the stored document before any patch is applied.
/// A missing field compares equal to `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Precondition {
    /// Field to compare.
    pub path: FieldPath,
    /// Value the field must hold.
    pub expected: Value,
}

/// Atomic batch of preconditions and patches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomUpdate {
    /// Checked before anything is written; one failure rejects the batch.
    pub preconditions: Vec<Precondition>,
    /// Applied in order.
    pub patches: Vec<Patch>,
}

impl RoomUpdate {
    /// Start an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `path` to currently equal `expected`.
    pub fn require(mut self, path: FieldPath, expected: impl Into<Value>) -> Self {
        self.preconditions.push(Precondition {
            path,
            expected: expected.into(),
        });
        self
    }

    /// Overwrite `path`, creating missing parents.
    pub fn set(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.patches.push(Patch::Set {
            path,
            value: value.into(),
        });
        self
    }

    /// Set a serializable value.
    pub fn set_json<T: Serialize>(self, path: FieldPath, value: &T) -> StorageResult<Self> {
        Ok(self.set(path, to_json(value)?))
    }

    /// Add `value` to the array at `path` unless already present.
    pub fn append_unique(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.patches.push(Patch::AppendUnique {
            path,
            value: value.into(),
        });
        self
    }

    /// Remove every occurrence of `value` from the array at `path`.
    pub fn remove(mut self, path: FieldPath, value: impl Into<Value>) -> Self {
        self.patches.push(Patch::Remove {
            path,
            value: value.into(),
        });
        self
    }

    /// Add `delta` to the integer at `path`.
    pub fn increment(mut self, path: FieldPath, delta: i64) -> Self {
        self.patches.push(Patch::Increment { path, delta });
        self
    }

    /// Drop the field at `path`.
    pub fn delete_field(mut self, path: FieldPath) -> Self {
        self.patches.push(Patch::DeleteField { path });
        self
    }
}

/// Serialize a value for use in a patch.
pub fn to_json<T: Serialize>(value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|source| StorageError::Corrupt {
        room_id: String::new(),
        source,
    })
}

/// Reasons an update could not be applied to a document.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    /// A guard did not hold.
    PreconditionFailed {
        /// Guarded field.
        path: String,
        /// Value the guard required.
        expected: Value,
        /// Value found in the document.
        actual: Value,
    },
    /// A path segment traversed something that is not an object.
    NotAnObject {
        /// Offending path.
        path: String,
    },
    /// An array patch hit a non-array value.
    NotAnArray {
        /// Offending path.
        path: String,
    },
    /// An increment hit a non-integer value.
    NotAnInteger {
        /// Offending path.
        path: String,
    },
    /// A path without segments.
    EmptyPath,
}

impl PatchError {
    /// Attach the room identifier and convert into a storage error.
    pub fn into_storage_error(self, room_id: &str) -> StorageError {
        let room_id = room_id.to_owned();
        match self {
            PatchError::PreconditionFailed {
                path,
                expected,
                actual,
            } => StorageError::PreconditionFailed {
                room_id,
                path,
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
            PatchError::NotAnObject { path } => StorageError::InvalidPatch {
                room_id,
                path,
                reason: "not an object".into(),
            },
            PatchError::NotAnArray { path } => StorageError::InvalidPatch {
                room_id,
                path,
                reason: "not an array".into(),
            },
            PatchError::NotAnInteger { path } => StorageError::InvalidPatch {
                room_id,
                path,
                reason: "not an integer".into(),
            },
            PatchError::EmptyPath => StorageError::InvalidPatch {
                room_id,
                path: String::new(),
                reason: "empty path".into(),
            },
        }
    }
}

/// Apply `update` to `document` atomically. On error `document` is left untouched.
pub fn apply_update(document: &mut Value, update: &RoomUpdate) -> Result<(), PatchError> {
    for precondition in &update.preconditions {
        let actual = lookup(document, &precondition.path)
            .cloned()
            .unwrap_or(Value::Null);
        if actual != precondition.expected {
            return Err(PatchError::PreconditionFailed {
                path: precondition.path.to_string(),
                expected: precondition.expected.clone(),
                actual,
            });
        }
    }

    let mut working = document.clone();
    for patch in &update.patches {
        apply_patch(&mut working, patch)?;
    }
    *document = working;
    Ok(())
}

/// Read the value at `path`, if any.
pub fn lookup<'a>(document: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(document, |node, segment| node.as_object()?.get(segment))
}

fn apply_patch(document: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    match patch {
        Patch::Set { path, value } => {
            let (parent, key) = parent_mut(document, path, true)?;
            if let Some(parent) = parent {
                parent.insert(key, value.clone());
            }
        }
        Patch::AppendUnique { path, value } => {
            let (parent, key) = parent_mut(document, path, true)?;
            if let Some(parent) = parent {
                let slot = parent
                    .entry(key)
                    .or_insert_with(|| Value::Array(Vec::new()));
                let array = slot.as_array_mut().ok_or_else(|| PatchError::NotAnArray {
                    path: path.to_string(),
                })?;
                if !array.contains(value) {
                    array.push(value.clone());
                }
            }
        }
        Patch::Remove { path, value } => {
            let (parent, key) = parent_mut(document, path, false)?;
            if let Some(slot) = parent.and_then(|parent| parent.get_mut(&key)) {
                let array = slot.as_array_mut().ok_or_else(|| PatchError::NotAnArray {
                    path: path.to_string(),
                })?;
                array.retain(|element| element != value);
            }
        }
        Patch::Increment { path, delta } => {
            let (parent, key) = parent_mut(document, path, true)?;
            if let Some(parent) = parent {
                let current = match parent.get(&key) {
                    None | Some(Value::Null) => 0,
                    Some(value) => value.as_i64().ok_or_else(|| PatchError::NotAnInteger {
                        path: path.to_string(),
                    })?,
                };
                parent.insert(key, Value::from(current.saturating_add(*delta)));
            }
        }
        Patch::DeleteField { path } => {
            let (parent, key) = parent_mut(document, path, false)?;
            if let Some(parent) = parent {
                parent.shift_remove(&key);
            }
        }
    }
    Ok(())
}

/// Walk to the object holding the last segment of `path`. With `create` set, missing
/// intermediate objects are created; otherwise a missing parent yields `None`.
fn parent_mut<'a>(
    document: &'a mut Value,
    path: &FieldPath,
    create: bool,
) -> Result<(Option<&'a mut Map<String, Value>>, String), PatchError> {
    let (last, parents) = path.segments().split_last().ok_or(PatchError::EmptyPath)?;

    let mut node = document;
    for segment in parents {
        let object = node.as_object_mut().ok_or_else(|| PatchError::NotAnObject {
            path: path.to_string(),
        })?;
        if matches!(object.get(segment), None | Some(Value::Null)) {
            if !create {
                return Ok((None, last.clone()));
            }
            object.insert(segment.clone(), Value::Object(Map::new()));
        }
        node = object.get_mut(segment).ok_or(PatchError::EmptyPath)?;
    }

    let object = node.as_object_mut().ok_or_else(|| PatchError::NotAnObject {
        path: path.to_string(),
    })?;
    Ok((Some(object), last.clone()))
}
