// netatmo-core: Domain layer between netatmo-api and consumers.

pub mod config;
pub mod error;
pub mod home;
pub mod monitor;
pub mod schedule;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{AuthCredentials, NetatmoConfig, TlsVerification, connect};
pub use error::CoreError;
pub use home::{Home, HomesIndex};
pub use monitor::{DEFAULT_POLL_INTERVAL, Monitor, Snapshot};
pub use schedule::{Occurrence, Period, WeekSchedule};

// Re-export the API surface consumers need alongside the domain types.
pub use netatmo_api::{
    Command, CommandAck, DEFAULT_API_URL, Device, HomeId, ModuleId, NetatmoClient, RoomId,
    ScheduleId, Target,
};
