// ── Identity types ──
//
// Homes and schedules are addressed by 12-byte object ids (24 hex chars),
// modules by MAC-like hex ids, rooms by numeric ids that the API sends
// either as JSON strings or numbers. All of them serialize back as strings.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error produced when parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id '{value}'")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: String,
}

fn decode_hex(raw: &str) -> Option<Vec<u8>> {
    if raw.len() % 2 != 0 || !raw.is_ascii() {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(raw.get(i..i + 2)?, 16).ok())
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    use fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

// ── Object ids (homes, schedules) ────────────────────────────────────

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 12]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 12]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 12] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_hex(&self.0))
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_hex(s)
                    .and_then(|bytes| <[u8; 12]>::try_from(bytes).ok())
                    .map(Self)
                    .ok_or_else(|| InvalidId {
                        kind: $kind,
                        value: s.to_owned(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

object_id!(
    /// Home identifier.
    HomeId,
    "home"
);

object_id!(
    /// Schedule identifier, unique within a home.
    ScheduleId,
    "schedule"
);

// ── ModuleId ─────────────────────────────────────────────────────────

/// Module identifier, normalized to lowercase colon-separated hex
/// (`70:ee:50:aa:bb:cc`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw id bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        decode_hex(&self.0.replace(':', "")).unwrap_or_default()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModuleId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidId {
            kind: "module",
            value: s.to_owned(),
        };
        let bare = s.replace([':', '-'], "");
        let bytes = decode_hex(&bare).filter(|b| !b.is_empty()).ok_or_else(invalid)?;
        let normalized = bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":");
        Ok(Self(normalized))
    }
}

impl Serialize for ModuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// ── RoomId ───────────────────────────────────────────────────────────

/// Room identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(u64);

impl RoomId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self).map_err(|_| InvalidId {
            kind: "room",
            value: s.to_owned(),
        })
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RoomIdVisitor;

        impl Visitor<'_> for RoomIdVisitor {
            type Value = RoomId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a room id as string or unsigned integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RoomId, E> {
                Ok(RoomId(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RoomId, E> {
                u64::try_from(v)
                    .map(RoomId)
                    .map_err(|_| E::custom(format!("negative room id {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RoomId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(RoomIdVisitor)
    }
}
