// State-change commands
//
// `POST api/setstate` with
// `{"home": {"id": ..., "modules": [{"id": ..., "bridge": ..., <cap>: <value>}]}}`
// or the same shape with `rooms`. Commands are validated locally before
// anything goes on the wire.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::client::{Endpoint, NetatmoClient};
use crate::error::Error;
use crate::ids::{HomeId, ModuleId, RoomId};

const SET_STATE_PATH: &str = "api/setstate";

/// Keys owned by the payload envelope; not settable as capabilities.
const RESERVED_KEYS: [&str; 2] = ["id", "bridge"];

/// What a command acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A module, optionally reached through a gateway.
    Module {
        id: ModuleId,
        bridge: Option<ModuleId>,
    },
    Room(RoomId),
}

/// A set of capability changes for one module or room.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub home_id: HomeId,
    pub target: Target,
    pub changes: IndexMap<String, Value>,
}

impl Command {
    pub fn module(home_id: HomeId, id: ModuleId) -> Self {
        Self {
            home_id,
            target: Target::Module { id, bridge: None },
            changes: IndexMap::new(),
        }
    }

    pub fn room(home_id: HomeId, id: RoomId) -> Self {
        Self {
            home_id,
            target: Target::Room(id),
            changes: IndexMap::new(),
        }
    }

    /// Route a module command through its gateway. No effect on room targets.
    #[must_use]
    pub fn with_bridge(mut self, bridge: ModuleId) -> Self {
        if let Target::Module { bridge: slot, .. } = &mut self.target {
            *slot = Some(bridge);
        }
        self
    }

    /// Add (or overwrite) one capability change.
    #[must_use]
    pub fn set(mut self, capability: impl Into<String>, value: impl Into<Value>) -> Self {
        self.changes.insert(capability.into(), value.into());
        self
    }

    /// Local checks: at least one change, non-empty non-reserved names,
    /// scalar values only.
    pub fn validate(&self) -> Result<(), Error> {
        let reject = |message: String| Error::RejectedCommand {
            code: None,
            message,
        };

        if self.changes.is_empty() {
            return Err(reject("command has no capability changes".into()));
        }
        for (name, value) in &self.changes {
            if name.trim().is_empty() {
                return Err(reject("empty capability name".into()));
            }
            if RESERVED_KEYS.contains(&name.as_str()) {
                return Err(reject(format!("'{name}' is not a settable capability")));
            }
            if matches!(value, Value::Null | Value::Array(_) | Value::Object(_)) {
                return Err(reject(format!(
                    "capability '{name}' needs a scalar value, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// The `api/setstate` request body.
    pub fn to_payload(&self) -> Value {
        let mut entry = Map::new();
        let list_key = match &self.target {
            Target::Module { id, bridge } => {
                entry.insert("id".into(), json!(id));
                if let Some(bridge) = bridge {
                    entry.insert("bridge".into(), json!(bridge));
                }
                "modules"
            }
            Target::Room(id) => {
                entry.insert("id".into(), json!(id));
                "rooms"
            }
        };
        entry.extend(self.changes.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut home = Map::new();
        home.insert("id".into(), json!(self.home_id));
        home.insert(list_key.into(), Value::Array(vec![Value::Object(entry)]));
        json!({ "home": home })
    }
}

/// Acknowledgement of an accepted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAck {
    /// Vendor server time of the acceptance, when reported.
    pub server_time: Option<DateTime<Utc>>,
}

/// Per-target failures reported inside a 200 `setstate` answer.
#[derive(Debug, Default, Deserialize)]
struct SetStateBody {
    #[serde(default)]
    errors: Vec<SetStateError>,
}

#[derive(Debug, Deserialize)]
struct SetStateError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    id: Option<Value>,
}

impl NetatmoClient {
    /// Apply a command.
    ///
    /// Fails with `Error::RejectedCommand` when local validation fails or
    /// the vendor refuses the change.
    pub async fn send_command(&self, command: Command) -> Result<CommandAck, Error> {
        command.validate()?;
        let payload = command.to_payload();
        debug!(home_id = %command.home_id, target = ?command.target, "sending setstate");

        let resp = self
            .post_api::<SetStateBody>(SET_STATE_PATH, &payload, Endpoint::Command)
            .await?;

        if let Some(first) = resp.body.as_ref().and_then(|b| b.errors.first()) {
            let target = first
                .id
                .as_ref()
                .map_or_else(|| "unknown target".to_owned(), ToString::to_string);
            return Err(Error::RejectedCommand {
                code: first.code,
                message: format!("setstate refused for {target}"),
            });
        }

        info!(home_id = %command.home_id, changes = command.changes.len(), "command accepted");
        Ok(CommandAck {
            server_time: resp
                .time_server
                .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)),
        })
    }
}
