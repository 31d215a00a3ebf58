use crate::record::{LogEvent, LogLevel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Store-ready representation of one [`LogEvent`].
///
/// Built by the deliver step right before the write and dropped right
/// after it; documents are never kept around between ticks.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundDocument {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message_template: String,
    pub rendered_message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl OutboundDocument {
    pub fn from_event(id: Uuid, event: LogEvent, rendered_message: String) -> Self {
        OutboundDocument {
            id,
            timestamp: event.timestamp,
            level: event.level,
            message_template: event.message_template,
            rendered_message,
            properties: event.properties,
            exception: event.exception,
            target: event.target,
        }
    }

    /// Key under which the document is written.
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}
