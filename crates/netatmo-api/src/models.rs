// Netatmo API response types
//
// Models for `api/homesdata`, `api/homestatus` and the response envelope.
// Fields use `#[serde(default)]` liberally because the vendor omits keys
// that have no value, and undocumented fields land in flattened maps so
// nothing the API sends is silently dropped.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{HomeId, ModuleId, RoomId, ScheduleId};

// ── Response envelope ────────────────────────────────────────────────

/// Standard Netatmo API response envelope.
///
/// ```json
/// { "body": { ... }, "status": "ok", "time_exec": 0.02, "time_server": 1650000000 }
/// ```
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: Option<String>,
    pub body: Option<T>,
    #[serde(default)]
    pub time_server: Option<i64>,
}

/// Error shape of the resource endpoints:
/// `{"error": {"code": 21, "message": "Invalid argument"}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Homes data ───────────────────────────────────────────────────────

/// Body of `api/homesdata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomesData {
    #[serde(default)]
    pub homes: Vec<HomeData>,
    /// Catch-all for undocumented fields (`user`, etc.).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HomesData {
    pub fn home(&self, id: &HomeId) -> Option<&HomeData> {
        self.homes.iter().find(|h| &h.id == id)
    }
}

/// Static topology of one home: rooms, modules and schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeData {
    pub id: HomeId,
    #[serde(default)]
    pub name: Option<String>,
    /// IANA timezone name, e.g. `"Europe/Vienna"`.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub rooms: Vec<RoomData>,
    #[serde(default)]
    pub modules: Vec<ModuleData>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    /// Older accounts expose heating schedules under a separate key.
    #[serde(default)]
    pub therm_schedules: Vec<Schedule>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HomeData {
    pub fn room(&self, id: RoomId) -> Option<&RoomData> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ModuleData> {
        self.modules.iter().find(|m| &m.id == id)
    }

    /// Look a schedule up in both `schedules` and `therm_schedules`.
    pub fn schedule(&self, id: &ScheduleId) -> Option<&Schedule> {
        self.schedules
            .iter()
            .chain(&self.therm_schedules)
            .find(|s| &s.id == id)
    }

    /// The schedule currently flagged as selected, if any.
    pub fn selected_schedule(&self) -> Option<&Schedule> {
        self.schedules
            .iter()
            .chain(&self.therm_schedules)
            .find(|s| s.selected)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomData {
    pub id: RoomId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub room_type: Option<String>,
    #[serde(default)]
    pub module_ids: Vec<ModuleId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleData {
    pub id: ModuleId,
    /// Vendor module type, e.g. `"NATherm1"`, `"BNS"`, `"NLP"`.
    #[serde(default, rename = "type")]
    pub module_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Gateway the module talks through, if any.
    #[serde(default)]
    pub bridge: Option<ModuleId>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Schedules ────────────────────────────────────────────────────────

/// A weekly schedule: a timetable of timepoints pointing into zones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    #[serde(default)]
    pub name: Option<String>,
    /// `"therm"`, `"cooling"`, `"electricity"`, `"event"`, ...
    #[serde(default, rename = "type")]
    pub schedule_type: Option<String>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub timetable: Vec<Timepoint>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Schedule {
    pub fn zone(&self, id: i64) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    /// Therm and cooling timetables describe slots: the first timepoint
    /// continues the last one of the previous week when both share a zone.
    pub fn is_slot_based(&self) -> bool {
        matches!(self.schedule_type.as_deref(), Some("therm" | "cooling"))
    }
}

/// One entry of a schedule timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timepoint {
    pub zone_id: i64,
    /// Minutes since Monday 00:00 in the home's local time.
    pub m_offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub zone_type: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// ── Home status ──────────────────────────────────────────────────────

/// Body of `api/homestatus`.
#[derive(Debug, Deserialize)]
pub(crate) struct HomeStatusBody {
    pub home: HomeStatus,
}

/// Live state of one home. Capabilities are the remaining keys of each
/// room/module object, kept in the order the API sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeStatus {
    pub id: HomeId,
    #[serde(default)]
    pub rooms: Vec<RoomStatus>,
    #[serde(default)]
    pub modules: Vec<ModuleStatus>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HomeStatus {
    /// Status of an installation that is currently offline.
    pub fn empty(id: HomeId) -> Self {
        Self {
            id,
            rooms: Vec::new(),
            modules: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn room(&self, id: RoomId) -> Option<&RoomStatus> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ModuleStatus> {
        self.modules.iter().find(|m| &m.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomStatus {
    pub id: RoomId,
    #[serde(flatten)]
    pub capabilities: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub id: ModuleId,
    #[serde(default, rename = "type")]
    pub module_type: Option<String>,
    #[serde(flatten)]
    pub capabilities: IndexMap<String, Value>,
}
