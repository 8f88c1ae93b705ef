use serde::Deserialize;
use serde_json::{Map, Value};

pub const ROOM_PREFIX: &str = "room::";

/// Reserved CouchDB document fields stripped before the body is handed to patches.
const RESERVED_FIELDS: [&str; 3] = ["_id", "_rev", "_deleted"];

pub fn room_doc_id(room_id: &str) -> String {
    format!("{ROOM_PREFIX}{room_id}")
}

/// Reverse of [`room_doc_id`]; `None` for documents that are not rooms.
pub fn room_id_from_doc_id(doc_id: &str) -> Option<&str> {
    doc_id.strip_prefix(ROOM_PREFIX)
}

/// Room document as CouchDB returns it: a revision plus the record body.
#[derive(Debug, Clone)]
pub struct CouchRoomDocument {
    pub rev: Option<String>,
    pub body: Value,
}

impl CouchRoomDocument {
    /// Split a raw CouchDB document into revision and record body.
    pub fn from_raw(mut raw: Value) -> Self {
        let rev = raw
            .get("_rev")
            .and_then(Value::as_str)
            .map(str::to_owned);
        if let Some(object) = raw.as_object_mut() {
            for field in RESERVED_FIELDS {
                object.shift_remove(field);
            }
        }
        Self { rev, body: raw }
    }

    /// Re-attach the CouchDB identity fields for a PUT.
    pub fn into_raw(self, doc_id: &str) -> Value {
        let mut object = match self.body {
            Value::Object(object) => object,
            _ => Map::new(),
        };
        object.insert("_id".into(), Value::String(doc_id.to_owned()));
        if let Some(rev) = self.rev {
            object.insert("_rev".into(), Value::String(rev));
        }
        Value::Object(object)
    }
}

/// Body of an `_all_docs` query restricted to room documents.
#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<ChangeRow>,
    pub last_seq: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<Value>,
    #[serde(default)]
    pub changes: Vec<ChangeRevision>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRevision {
    pub rev: String,
}

impl ChangeRow {
    /// Numeric generation from the leading part of the revision (`"7-abc..."` -> 7).
    pub fn generation(&self) -> u64 {
        self.changes
            .first()
            .and_then(|change| change.rev.split('-').next())
            .and_then(|generation| generation.parse().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_document_round_trips_identity_fields() {
        let raw = json!({ "_id": "room::ABCD", "_rev": "3-abc", "status": "game" });
        let doc = CouchRoomDocument::from_raw(raw);
        assert_eq!(doc.rev.as_deref(), Some("3-abc"));
        assert_eq!(doc.body, json!({ "status": "game" }));

        let raw = doc.into_raw("room::ABCD");
        assert_eq!(raw["_id"], "room::ABCD");
        assert_eq!(raw["_rev"], "3-abc");
    }

    #[test]
    fn all_docs_rows_map_to_room_ids() {
        let response: AllDocsResponse = serde_json::from_value(json!({
            "total_rows": 2,
            "rows": [{ "id": "room::ABCD", "key": "room::ABCD", "value": { "rev": "1-a" } }]
        }))
        .unwrap();
        let ids: Vec<&str> = response
            .rows
            .iter()
            .filter_map(|row| room_id_from_doc_id(&row.id))
            .collect();
        assert_eq!(ids, vec!["ABCD"]);
    }

    #[test]
    fn generation_parses_revision_prefix() {
        let row: ChangeRow = serde_json::from_value(json!({
            "id": "room::ABCD",
            "changes": [{ "rev": "7-deadbeef" }]
        }))
        .unwrap();
        assert_eq!(row.generation(), 7);
        assert_eq!(room_id_from_doc_id(&row.id), Some("ABCD"));
    }
}
