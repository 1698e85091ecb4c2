// netatmo-api: Async Rust client for the Netatmo / Legrand home-automation API

pub mod auth;
pub mod client;
pub mod command;
pub mod devices;
pub mod error;
pub mod grant;
pub mod homes;
pub mod ids;
pub mod models;
pub mod session;
pub mod transport;

pub use client::{DEFAULT_API_URL, NetatmoClient};
pub use command::{Command, CommandAck, Target};
pub use devices::Device;
pub use error::Error;
pub use grant::{ClientCredentials, Grant, GrantKind};
pub use ids::{HomeId, InvalidId, ModuleId, RoomId, ScheduleId};
pub use session::AuthState;
pub use transport::{TlsMode, TransportConfig};
