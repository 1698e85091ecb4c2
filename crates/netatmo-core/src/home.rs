// ── Homes ──
//
// `Home` binds a `HomeData` listing entry to its parsed timezone so that
// schedules can be evaluated in local time. `HomesIndex` is the
// id → home lookup over a whole `homesdata` answer.

use chrono_tz::Tz;
use indexmap::IndexMap;
use netatmo_api::models::{HomeData, HomesData, ModuleData, RoomData, Schedule};
use netatmo_api::{HomeId, ModuleId, RoomId, ScheduleId};
use tracing::debug;

use crate::error::CoreError;
use crate::schedule::WeekSchedule;

/// One home with its timezone resolved.
#[derive(Debug, Clone)]
pub struct Home {
    data: HomeData,
    tz: Tz,
}

impl Home {
    /// Homes without a `timezone` are evaluated in UTC.
    pub fn new(data: HomeData) -> Result<Self, CoreError> {
        let tz = match data.timezone.as_deref() {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| CoreError::UnknownTimezone { name: name.into() })?,
            None => {
                debug!(home_id = %data.id, "home has no timezone, using UTC");
                Tz::UTC
            }
        };
        Ok(Self { data, tz })
    }

    pub fn id(&self) -> HomeId {
        self.data.id
    }

    pub fn name(&self) -> Option<&str> {
        self.data.name.as_deref()
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// The raw listing entry.
    pub fn data(&self) -> &HomeData {
        &self.data
    }

    pub fn room(&self, id: RoomId) -> Option<&RoomData> {
        self.data.room(id)
    }

    pub fn module(&self, id: &ModuleId) -> Option<&ModuleData> {
        self.data.module(id)
    }

    pub fn schedule(&self, id: &ScheduleId) -> Option<&Schedule> {
        self.data.schedule(id)
    }

    pub fn selected_schedule(&self) -> Option<&Schedule> {
        self.data.selected_schedule()
    }

    /// Modules located in `room`.
    pub fn room_modules(&self, room: RoomId) -> impl Iterator<Item = &ModuleData> {
        self.data
            .modules
            .iter()
            .filter(move |m| m.room_id == Some(room))
    }

    /// A schedule bound to this home's timezone.
    pub fn week_schedule(&self, id: &ScheduleId) -> Result<WeekSchedule, CoreError> {
        let schedule = self
            .schedule(id)
            .ok_or_else(|| CoreError::ScheduleNotFound { id: id.to_string() })?;
        Ok(WeekSchedule::new(schedule.clone(), self.tz))
    }
}

/// Homes of one account, keyed by id in listing order.
#[derive(Debug, Clone, Default)]
pub struct HomesIndex {
    homes: IndexMap<HomeId, Home>,
}

impl HomesIndex {
    pub fn new(data: HomesData) -> Result<Self, CoreError> {
        let homes = data
            .homes
            .into_iter()
            .map(|h| Home::new(h).map(|home| (home.id(), home)))
            .collect::<Result<IndexMap<_, _>, _>>()?;
        Ok(Self { homes })
    }

    pub fn home(&self, id: &HomeId) -> Option<&Home> {
        self.homes.get(id)
    }

    /// Like [`home`](Self::home) but failing with `HomeNotFound`.
    pub fn require(&self, id: &HomeId) -> Result<&Home, CoreError> {
        self.home(id)
            .ok_or_else(|| CoreError::HomeNotFound { id: id.to_string() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Home> {
        self.homes.values()
    }

    pub fn len(&self) -> usize {
        self.homes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.homes.is_empty()
    }
}
