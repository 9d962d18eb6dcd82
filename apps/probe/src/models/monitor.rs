use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::CheckError;

/// Monitor type tag as sent by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MonitorKind {
    Api,
    Url,
    Ip,
    Server,
    IncomingRequest,
    Kubernetes,
    /// Any tag this probe does not know how to check.
    Unknown(String),
}

impl MonitorKind {
    pub fn as_str(&self) -> &str {
        match self {
            MonitorKind::Api => "api",
            MonitorKind::Url => "url",
            MonitorKind::Ip => "ip",
            MonitorKind::Server => "server-monitor",
            MonitorKind::IncomingRequest => "incomingHttpRequest",
            MonitorKind::Kubernetes => "kubernetes",
            MonitorKind::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MonitorKind::Unknown(_))
    }
}

impl From<String> for MonitorKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "api" => MonitorKind::Api,
            "url" => MonitorKind::Url,
            "ip" => MonitorKind::Ip,
            "server-monitor" => MonitorKind::Server,
            "incomingHttpRequest" => MonitorKind::IncomingRequest,
            "kubernetes" => MonitorKind::Kubernetes,
            _ => MonitorKind::Unknown(tag),
        }
    }
}

impl From<MonitorKind> for String {
    fn from(kind: MonitorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitor definition fetched for one cycle.
///
/// Only the fields every checker needs are typed here; the rest of the
/// object stays in `settings` and each checker decodes its own view of it
/// through [`Monitor::settings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawMonitor")]
pub struct Monitor {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MonitorKind,

    pub name: Option<String>,

    pub enabled: bool,

    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

/// Wire shape of a monitor. Document stores send `_id`, others send `id`,
/// some send both.
#[derive(Deserialize)]
struct RawMonitor {
    #[serde(default, rename = "_id", deserialize_with = "deserialize_id")]
    object_id: Option<String>,

    #[serde(default, deserialize_with = "deserialize_id")]
    id: Option<String>,

    #[serde(rename = "type")]
    kind: MonitorKind,

    #[serde(default)]
    name: Option<String>,

    #[serde(default = "default_enabled")]
    enabled: bool,

    #[serde(flatten)]
    settings: Map<String, Value>,
}

impl TryFrom<RawMonitor> for Monitor {
    type Error = &'static str;

    fn try_from(raw: RawMonitor) -> Result<Self, Self::Error> {
        let id = raw.id.or(raw.object_id).ok_or("missing field `id` or `_id`")?;
        Ok(Self {
            id,
            kind: raw.kind,
            name: raw.name,
            enabled: raw.enabled,
            settings: raw.settings,
        })
    }
}

fn default_enabled() -> bool {
    true
}

/// Ids arrive as strings from document stores and as integers elsewhere.
fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|id| match id {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    }))
}

impl Monitor {
    pub fn new(id: impl Into<String>, kind: MonitorKind) -> Self {
        Self { id: id.into(), kind, name: None, enabled: true, settings: Map::new() }
    }

    /// Attach a type-specific setting. Used when building monitors locally.
    pub fn with_setting(mut self, key: &str, value: Value) -> Self {
        self.settings.insert(key.to_string(), value);
        self
    }

    /// Decode the type-specific settings into `T`.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, CheckError> {
        serde_json::from_value(Value::Object(self.settings.clone()))
            .map_err(|e| CheckError::InvalidConfig(format!("monitor {}: {}", self.id, e)))
    }

    /// Human readable label for logs.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Decode a control-plane batch entry by entry.
///
/// Accepts either a bare JSON array or a `{ "data": [...] }` envelope.
/// Entries that fail to decode are logged and dropped so one malformed
/// definition never loses the rest of the batch.
pub fn decode_batch(payload: Value) -> Result<Vec<Monitor>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Envelope {
        Bare(Vec<Value>),
        Wrapped { data: Vec<Value> },
    }

    let entries = match serde_json::from_value::<Envelope>(payload)? {
        Envelope::Bare(entries) | Envelope::Wrapped { data: entries } => entries,
    };

    let mut monitors = Vec::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Monitor>(entry) {
            Ok(monitor) => monitors.push(monitor),
            Err(e) => tracing::warn!("Dropping malformed monitor at position {}: {}", position, e),
        }
    }

    Ok(monitors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monitor_kind_round_trip_tags() {
        for tag in ["api", "url", "ip", "server-monitor", "incomingHttpRequest", "kubernetes"] {
            let kind = MonitorKind::from(tag.to_string());
            assert!(kind.is_known(), "{tag} should be known");
            assert_eq!(kind.as_str(), tag);
        }

        let unknown = MonitorKind::from("script".to_string());
        assert_eq!(unknown, MonitorKind::Unknown("script".to_string()));
        assert!(!unknown.is_known());
    }

    #[test]
    fn test_monitor_accepts_numeric_and_mongo_ids() {
        let numeric: Monitor =
            serde_json::from_value(json!({"id": 1, "type": "api", "url": "http://ok.test"}))
                .unwrap();
        assert_eq!(numeric.id, "1");
        assert_eq!(numeric.kind, MonitorKind::Api);
        assert!(numeric.enabled);
        assert_eq!(numeric.settings.get("url"), Some(&json!("http://ok.test")));

        let mongo: Monitor = serde_json::from_value(
            json!({"_id": "5f1c", "type": "ip", "host": "1.2.3.4", "enabled": false}),
        )
        .unwrap();
        assert_eq!(mongo.id, "5f1c");
        assert!(!mongo.enabled);
    }

    #[test]
    fn test_monitor_with_both_id_keys() {
        let payload = json!([{"_id": "5f1c", "id": "5f1c", "type": "api", "url": "http://a.test"}]);
        let monitors = decode_batch(payload).unwrap();
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].id, "5f1c");
        assert!(!monitors[0].settings.contains_key("_id"));

        let differing: Monitor =
            serde_json::from_value(json!({"_id": "5f1c", "id": 9, "type": "ip"})).unwrap();
        assert_eq!(differing.id, "9");
    }

    #[test]
    fn test_monitor_without_any_id_is_rejected() {
        let err = serde_json::from_value::<Monitor>(json!({"type": "api"})).unwrap_err();
        assert!(err.to_string().contains("`id` or `_id`"));
    }

    #[test]
    fn test_settings_decoding_failure_is_invalid_config() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct NeedsUrl {
            url: String,
        }

        let monitor = Monitor::new("7", MonitorKind::Url);
        let err = monitor.settings::<NeedsUrl>().unwrap_err();
        assert!(matches!(err, CheckError::InvalidConfig(_)));
    }

    #[test]
    fn test_decode_batch_bare_and_wrapped() {
        let bare = json!([{"id": 1, "type": "api"}, {"id": 2, "type": "url"}]);
        assert_eq!(decode_batch(bare).unwrap().len(), 2);

        let wrapped = json!({"data": [{"id": "a", "type": "kubernetes"}]});
        let monitors = decode_batch(wrapped).unwrap();
        assert_eq!(monitors[0].kind, MonitorKind::Kubernetes);
    }

    #[test]
    fn test_decode_batch_drops_malformed_entries() {
        let payload = json!([
            {"id": 1, "type": "api"},
            {"type": "url"},
            {"id": 3, "type": "mystery"}
        ]);

        let monitors = decode_batch(payload).unwrap();
        assert_eq!(monitors.len(), 2);
        assert_eq!(monitors[1].kind, MonitorKind::Unknown("mystery".to_string()));
    }

    #[test]
    fn test_decode_batch_rejects_non_array() {
        assert!(decode_batch(json!({"monitors": 3})).is_err());
    }
}
