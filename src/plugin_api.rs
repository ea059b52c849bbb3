use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names shared with the plugin server
pub mod events {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const GET_HANDSHAKES: &str = "get_handshakes";
    pub const PLUGINS_BUILDER: &str = "plugins_builder";
    pub const APPLET_UPDATE_NAME: &str = "applet_update_name";
    pub const PLUGIN_TEST: &str = "plugin_test";
}

/// Local commands from the user side of the panel, carried in the same
/// envelopes as server events
pub mod commands {
    pub const SELECT_PLUGIN: &str = "select_plugin";
    pub const REFRESH_HANDSHAKES: &str = "refresh_handshakes";
    pub const RENAME_APPLET: &str = "rename_applet";

    pub const ALL: [&str; 3] = [SELECT_PLUGIN, REFRESH_HANDSHAKES, RENAME_APPLET];

    pub fn is_command(event: &str) -> bool {
        ALL.contains(&event)
    }
}

/// A plugin's self-description, broadcast to clients on discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    /// Many handshakes omit this; an empty colour falls back at render time
    #[serde(default)]
    pub colour: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Component kinds the plugin can act as ("inputs", "outputs", ...)
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mode: Vec<String>,
    /// Persistent settings schema, kept raw until a form is built from it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<Value>,
}

impl PluginDescriptor {
    pub fn new(name: &str, version: &str, colour: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            colour: colour.to_string(),
            description: None,
            kinds: Vec::new(),
            mode: Vec::new(),
            settings: Vec::new(),
        }
    }
}

/// One entry of a plugin's settings schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldSchema {
    Text {
        name: String,
        label: String,
        #[serde(default)]
        value: String,
    },
    Radio {
        name: String,
        label: String,
        options: Vec<String>,
    },
    Select {
        name: String,
        label: String,
        options: Vec<String>,
    },
    Checkbox {
        name: String,
        label: String,
        id: String,
        #[serde(default)]
        value: String,
    },
}

impl FieldSchema {
    pub const KNOWN_TYPES: [&'static str; 4] = ["text", "radio", "select", "checkbox"];

    pub fn name(&self) -> &str {
        match self {
            FieldSchema::Text { name, .. }
            | FieldSchema::Radio { name, .. }
            | FieldSchema::Select { name, .. }
            | FieldSchema::Checkbox { name, .. } => name,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FieldSchema::Text { label, .. }
            | FieldSchema::Radio { label, .. }
            | FieldSchema::Select { label, .. }
            | FieldSchema::Checkbox { label, .. } => label,
        }
    }
}

/// A schema entry as received: either one of the known field kinds, or a
/// type tag this client does not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEntry {
    Field(FieldSchema),
    Unrecognized { type_tag: String, name: Option<String> },
}

/// Ordered settings schema for one plugin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSchema {
    pub entries: Vec<FieldEntry>,
}

impl FormSchema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self {
            entries: fields.into_iter().map(FieldEntry::Field).collect(),
        }
    }

    /// Decode a schema from a JSON array. Entries whose `type` tag is not a
    /// known field kind are kept as `FieldEntry::Unrecognized`; entries with a
    /// known tag but a bad shape fail the whole decode.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw: Vec<Value> = serde_json::from_value(value)?;
        let mut entries = Vec::with_capacity(raw.len());

        for item in raw {
            let type_tag = item
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            if FieldSchema::KNOWN_TYPES.contains(&type_tag.as_str()) {
                entries.push(FieldEntry::Field(serde_json::from_value(item)?));
            } else {
                let name = item.get("name").and_then(Value::as_str).map(str::to_string);
                entries.push(FieldEntry::Unrecognized { type_tag, name });
            }
        }

        Ok(Self { entries })
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outbound `plugins_builder` payload (sent JSON-stringified)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderRequest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

/// Payload of a `select_plugin` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSelection {
    pub name: String,
    pub version: String,
}

/// Inbound `plugins_builder` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderResponse {
    pub name: String,
    /// Usually a JSON-encoded string holding the field array; an inline
    /// array is accepted too.
    pub settings_dict: Value,
    #[serde(default)]
    pub request_id: Option<u64>,
}

/// Inbound `plugin_test` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginTestResult {
    pub response: bool,
    #[serde(default)]
    pub logs: String,
}

/// Unwrap a payload that may arrive as a JSON-encoded string.
pub fn decode_embedded(value: Value) -> Result<Value, serde_json::Error> {
    match value {
        Value::String(s) => serde_json::from_str(&s),
        other => Ok(other),
    }
}
