use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Event listing entry returned by the vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorEvent {
    pub uuid: String,
    pub start_time: String,
    pub name: String,
}

/// One entry of the vendor viewer export, kept close to the wire format.
/// Fields the analytics don't read are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawViewer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_time_minutes: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An event as persisted in the event store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: String,
    pub start_time: String,
    pub name: String,
    /// Raw vendor KPI payload
    #[serde(default)]
    pub public_info: Value,
    /// Raw vendor viewer export
    #[serde(default)]
    pub viewer_info: Vec<RawViewer>,
}

impl StoredEvent {
    pub fn meta(&self) -> EventMeta {
        EventMeta {
            event_id: self.event_id.clone(),
            start_time: self.start_time.clone(),
            name: self.name.clone(),
            viewer_records: self.viewer_info.len(),
        }
    }
}

/// Listing view of a stored event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub event_id: String,
    pub start_time: String,
    pub name: String,
    pub viewer_records: usize,
}

/// Whole-document layout of the JSON event store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventDocument {
    #[serde(default)]
    pub events: Vec<StoredEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_viewer_keeps_unknown_fields() {
        let value = json!({
            "clientId": "abc",
            "watchTimeMinutes": 7,
            "country": "US",
            "bitrate": 2500
        });

        let viewer: RawViewer = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(viewer.client_id.as_deref(), Some("abc"));
        assert_eq!(viewer.extra.get("country"), Some(&json!("US")));

        let back = serde_json::to_value(&viewer).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_vendor_event_camel_case() {
        let event: VendorEvent = serde_json::from_value(json!({
            "uuid": "e1",
            "startTime": "2024-03-01T18:00:00",
            "name": "Sunday Service",
            "status": "ended"
        }))
        .unwrap();
        assert_eq!(event.start_time, "2024-03-01T18:00:00");
    }
}
