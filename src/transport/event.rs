//! Row-change events and the filters that select them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of row change carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Filter wildcard; never appears on a delivered event.
    #[serde(rename = "*")]
    All,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::All => "*",
        }
    }

    /// Whether a filter of this kind accepts an event of kind `other`.
    pub fn accepts(&self, other: ChangeKind) -> bool {
        *self == ChangeKind::All || *self == other
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row change observed on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    /// Row after the change. `Null` for deletes.
    #[serde(default)]
    pub record: Value,
    /// Row before the change, when the server provides it.
    #[serde(default)]
    pub old_record: Value,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

impl ChangeEvent {
    /// Build an insert event for `table` in the `public` schema.
    pub fn insert(table: impl Into<String>, record: Value) -> Self {
        Self {
            kind: ChangeKind::Insert,
            schema: "public".to_string(),
            table: table.into(),
            record,
            old_record: Value::Null,
            commit_timestamp: None,
        }
    }

    /// Identifier used for duplicate suppression.
    ///
    /// Looks up `field` on the new record first, then on the old record.
    /// Numeric ids are rendered in decimal.
    pub fn message_id(&self, field: &str) -> Option<String> {
        [&self.record, &self.old_record]
            .into_iter()
            .find_map(|row| row.get(field).and_then(id_string))
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Equality filter selecting the rows of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub value: String,
    pub event: ChangeKind,
}

impl EventFilter {
    /// Server-side filter expression, e.g. `session_id=eq.42`.
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    /// Whether `event` satisfies this filter.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.schema != self.schema || event.table != self.table {
            return false;
        }
        if !self.event.accepts(event.kind) {
            return false;
        }
        let row = if event.kind == ChangeKind::Delete {
            &event.old_record
        } else {
            &event.record
        };
        row.get(&self.column)
            .and_then(id_string)
            .is_some_and(|v| v == self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter() -> EventFilter {
        EventFilter {
            schema: "public".into(),
            table: "messages".into(),
            column: "session_id".into(),
            value: "s-1".into(),
            event: ChangeKind::All,
        }
    }

    #[test]
    fn message_id_prefers_new_record() {
        let mut event = ChangeEvent::insert("messages", json!({"id": "abc"}));
        event.old_record = json!({"id": "old"});
        assert_eq!(event.message_id("id").as_deref(), Some("abc"));
    }

    #[test]
    fn message_id_falls_back_to_old_record_and_numbers() {
        let event = ChangeEvent {
            kind: ChangeKind::Delete,
            schema: "public".into(),
            table: "messages".into(),
            record: Value::Null,
            old_record: json!({"id": 17}),
            commit_timestamp: None,
        };
        assert_eq!(event.message_id("id").as_deref(), Some("17"));
        assert_eq!(event.message_id("uuid"), None);
    }

    #[test]
    fn empty_string_id_is_missing() {
        let event = ChangeEvent::insert("messages", json!({"id": ""}));
        assert_eq!(event.message_id("id"), None);
    }

    #[test]
    fn filter_expression_uses_eq_operator() {
        assert_eq!(filter().expression(), "session_id=eq.s-1");
    }

    #[test]
    fn filter_matches_table_kind_and_column() {
        let f = filter();
        assert!(f.matches(&ChangeEvent::insert("messages", json!({"session_id": "s-1"}))));
        assert!(!f.matches(&ChangeEvent::insert("messages", json!({"session_id": "s-2"}))));
        assert!(!f.matches(&ChangeEvent::insert("sessions", json!({"session_id": "s-1"}))));

        let inserts_only = EventFilter {
            event: ChangeKind::Insert,
            ..filter()
        };
        let mut update = ChangeEvent::insert("messages", json!({"session_id": "s-1"}));
        update.kind = ChangeKind::Update;
        assert!(!inserts_only.matches(&update));
    }

    #[test]
    fn change_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ChangeKind::Insert).unwrap(), "\"INSERT\"");
        assert_eq!(serde_json::to_string(&ChangeKind::All).unwrap(), "\"*\"");
        let kind: ChangeKind = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(kind, ChangeKind::Delete);
    }
}
