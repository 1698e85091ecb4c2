// Device listing
//
// A `Device` is one module's live status merged with its static topology
// entry. `list_devices` walks every home lazily: `homesdata` is fetched on
// first poll, then `homestatus` once per home as the stream advances.

use std::collections::HashSet;

use futures_util::Stream;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::NetatmoClient;
use crate::error::Error;
use crate::ids::{HomeId, ModuleId, RoomId};
use crate::models::{HomeData, HomeStatus, ModuleData, ModuleStatus};

/// Snapshot of one remote module and its current capability values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: ModuleId,
    pub home_id: HomeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub module_type: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub bridge: Option<ModuleId>,
    /// Capability name → value, in the order the API reported them.
    #[serde(default)]
    pub capabilities: IndexMap<String, Value>,
}

impl Device {
    /// Merge a status entry with the matching topology entry, if known.
    pub fn from_parts(home_id: HomeId, status: ModuleStatus, data: Option<&ModuleData>) -> Self {
        Self {
            module_type: status
                .module_type
                .or_else(|| data.and_then(|d| d.module_type.clone())),
            name: data.and_then(|d| d.name.clone()),
            room_id: data.and_then(|d| d.room_id),
            bridge: data.and_then(|d| d.bridge.clone()),
            capabilities: status.capabilities,
            id: status.id,
            home_id,
        }
    }

    /// A module known from the topology only (no live status reported).
    pub fn from_data(home_id: HomeId, data: &ModuleData) -> Self {
        Self {
            id: data.id.clone(),
            home_id,
            name: data.name.clone(),
            module_type: data.module_type.clone(),
            room_id: data.room_id,
            bridge: data.bridge.clone(),
            capabilities: IndexMap::new(),
        }
    }

    pub fn capability(&self, name: &str) -> Option<&Value> {
        self.capabilities.get(name)
    }

    /// `reachable` capability; modules that don't report it count as unreachable.
    pub fn is_reachable(&self) -> bool {
        self.capability("reachable")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Devices of one home: modules with a live status first, then modules
/// only known from the topology (offline or not yet reported).
pub fn home_devices(home: &HomeData, status: HomeStatus) -> Vec<Device> {
    let mut devices: Vec<Device> = status
        .modules
        .into_iter()
        .map(|m| {
            let data = home.module(&m.id);
            Device::from_parts(home.id, m, data)
        })
        .collect();

    let reported: HashSet<ModuleId> = devices.iter().map(|d| d.id.clone()).collect();
    devices.extend(
        home.modules
            .iter()
            .filter(|m| !reported.contains(&m.id))
            .map(|m| Device::from_data(home.id, m)),
    );
    devices
}

impl NetatmoClient {
    /// Stream every device on the account.
    ///
    /// Lazy and finite. Ids are unique within one listing: a module
    /// reported twice is yielded once.
    pub fn list_devices(&self) -> impl Stream<Item = Result<Device, Error>> + Send + 'static {
        let client = self.clone();

        async_stream::try_stream! {
            let homes = client.homes_data().await?;
            let mut seen: HashSet<ModuleId> = HashSet::new();

            for home in homes.homes {
                let status = client.home_status(&home.id).await?;
                debug!(
                    home_id = %home.id,
                    modules = status.modules.len(),
                    "home status fetched"
                );

                for device in home_devices(&home, status) {
                    if !seen.insert(device.id.clone()) {
                        warn!(id = %device.id, home_id = %home.id, "duplicate device id dropped");
                        continue;
                    }
                    yield device;
                }
            }
        }
    }
}
