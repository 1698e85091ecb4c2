// ── Schedule timetables ──
//
// A timetable is a list of timepoints, each `m_offset` minutes after
// Monday 00:00 of the *home's* local week. Offsets are naive wall-clock
// minutes, so DST is applied only when a timepoint is placed in a
// concrete week:
//   - ambiguous local times (fall back) resolve to the earlier instant
//   - skipped local times (spring forward) resolve to the first instant
//     after the gap

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use netatmo_api::models::{Schedule, Timepoint, Zone};

use crate::error::CoreError;

const MINUTES_PER_WEEK: u32 = 7 * 24 * 60;

/// Upper bound when probing for the end of a DST gap.
const MAX_GAP_MINUTES: u32 = 24 * 60 + 1;

/// A timepoint placed at a concrete instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: DateTime<Tz>,
    pub timepoint: Timepoint,
}

/// A schedule bound to its home's timezone.
#[derive(Debug, Clone)]
pub struct WeekSchedule {
    schedule: Schedule,
    tz: Tz,
}

impl WeekSchedule {
    pub fn new(schedule: Schedule, tz: Tz) -> Self {
        Self { schedule, tz }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn zone(&self, id: i64) -> Option<&Zone> {
        self.schedule.zone(id)
    }

    /// Instant of `tp` in the week containing `week`.
    ///
    /// With `home_tz` the result carries the home's offset, otherwise the
    /// offset of `week`'s timezone at that instant.
    pub fn timepoint_datetime<Z: TimeZone>(
        &self,
        tp: &Timepoint,
        week: &DateTime<Z>,
        home_tz: bool,
    ) -> DateTime<FixedOffset> {
        let local = self.place(tp, self.week_origin(week));
        if home_tz {
            local.fixed_offset()
        } else {
            local.with_timezone(&week.timezone()).fixed_offset()
        }
    }

    /// Every timepoint of the week containing `week`, sorted by instant.
    ///
    /// For slot-based (`therm`/`cooling`) schedules the first timepoint is
    /// left out when it points at the same zone as the last one: the
    /// Sunday slot simply runs on past midnight.
    pub fn week_timepoints<Z: TimeZone>(
        &self,
        week: &DateTime<Z>,
    ) -> Result<Vec<Occurrence>, CoreError> {
        self.occurrences(self.week_origin(week))
    }

    /// The timepoint in force at `at`.
    ///
    /// Before the week's first timepoint, the last one of the previous
    /// week is still in force.
    pub fn timepoint_at<Z: TimeZone>(&self, at: &DateTime<Z>) -> Result<Occurrence, CoreError> {
        let at = at.with_timezone(&self.tz);
        let origin = self.week_origin(&at);

        let week = self.occurrences(origin)?;
        if let Some(current) = week.iter().rev().find(|o| o.start <= at) {
            return Ok(*current);
        }

        let previous = self.occurrences(origin - TimeDelta::weeks(1))?;
        previous.last().copied().ok_or_else(|| self.invalid("empty timetable"))
    }

    /// The zone in force at `at`.
    pub fn zone_at<Z: TimeZone>(&self, at: &DateTime<Z>) -> Result<&Zone, CoreError> {
        let current = self.timepoint_at(at)?;
        let id = current.timepoint.zone_id;
        self.zone(id)
            .ok_or_else(|| self.invalid(format!("timepoint references unknown zone {id}")))
    }

    /// Timepoints with an instant in `[from, to]`, week after week, at
    /// most `limit` of them.
    pub fn period<Z1: TimeZone, Z2: TimeZone>(
        &self,
        from: &DateTime<Z1>,
        to: &DateTime<Z2>,
        limit: Option<usize>,
    ) -> Result<Period<'_>, CoreError> {
        let from = from.with_timezone(&self.tz);
        let origin = self.week_origin(&from);
        let first_week = self.occurrences(origin)?;

        Ok(Period {
            schedule: self,
            origin,
            pending: first_week.into_iter(),
            from,
            to: to.with_timezone(&self.tz),
            remaining: limit,
            done: false,
        })
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Naive Monday 00:00 of the home-local week containing `at`.
    fn week_origin<Z: TimeZone>(&self, at: &DateTime<Z>) -> NaiveDateTime {
        let date = at.with_timezone(&self.tz).date_naive();
        let monday = date - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()));
        monday.and_time(NaiveTime::MIN)
    }

    fn place(&self, tp: &Timepoint, origin: NaiveDateTime) -> DateTime<Tz> {
        self.resolve(origin + TimeDelta::minutes(i64::from(tp.m_offset)))
    }

    fn resolve(&self, naive: NaiveDateTime) -> DateTime<Tz> {
        if let Some(dt) = self.tz.from_local_datetime(&naive).earliest() {
            return dt;
        }
        // Inside a spring-forward gap: first wall-clock minute that exists.
        let mut probe = naive;
        for _ in 0..MAX_GAP_MINUTES {
            probe += TimeDelta::minutes(1);
            if let Some(dt) = self.tz.from_local_datetime(&probe).earliest() {
                return dt;
            }
        }
        self.tz.from_utc_datetime(&naive)
    }

    fn occurrences(&self, origin: NaiveDateTime) -> Result<Vec<Occurrence>, CoreError> {
        let timetable = &self.schedule.timetable;
        let (Some(first), Some(last)) = (timetable.first(), timetable.last()) else {
            return Err(self.invalid("empty timetable"));
        };
        if let Some(tp) = timetable.iter().find(|tp| tp.m_offset >= MINUTES_PER_WEEK) {
            return Err(self.invalid(format!("m_offset {} is past the end of the week", tp.m_offset)));
        }

        let skip_first =
            self.schedule.is_slot_based() && timetable.len() > 1 && first.zone_id == last.zone_id;

        let mut week: Vec<Occurrence> = timetable
            .iter()
            .skip(usize::from(skip_first))
            .map(|tp| Occurrence {
                start: self.place(tp, origin),
                timepoint: *tp,
            })
            .collect();
        week.sort_by_key(|o| o.start);
        Ok(week)
    }

    fn invalid(&self, message: impl Into<String>) -> CoreError {
        CoreError::InvalidTimetable {
            schedule: self.schedule.id.to_string(),
            message: message.into(),
        }
    }
}

/// Iterator returned by [`WeekSchedule::period`].
#[derive(Debug)]
pub struct Period<'a> {
    schedule: &'a WeekSchedule,
    origin: NaiveDateTime,
    pending: std::vec::IntoIter<Occurrence>,
    from: DateTime<Tz>,
    to: DateTime<Tz>,
    remaining: Option<usize>,
    done: bool,
}

impl Iterator for Period<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        if self.done || self.remaining == Some(0) {
            return None;
        }

        loop {
            if let Some(occurrence) = self.pending.next() {
                if occurrence.start > self.to {
                    self.done = true;
                    return None;
                }
                if occurrence.start < self.from {
                    continue;
                }
                if let Some(remaining) = &mut self.remaining {
                    *remaining -= 1;
                }
                return Some(occurrence);
            }

            let next_week = self
                .origin
                .checked_add_signed(TimeDelta::weeks(1))
                .and_then(|origin| Some((origin, self.schedule.occurrences(origin).ok()?)));
            let Some((origin, week)) = next_week else {
                self.done = true;
                return None;
            };
            self.origin = origin;
            self.pending = week.into_iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::Europe::Vienna;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn schedule(kind: &str, timetable: serde_json::Value) -> WeekSchedule {
        let schedule: Schedule = serde_json::from_value(json!({
            "id": "604790030b9b6457a95ac54b",
            "name": "Week",
            "type": kind,
            "timetable": timetable,
            "zones": [
                { "id": 1, "name": "Night", "type": 1 },
                { "id": 2, "name": "Day", "type": 0 }
            ]
        }))
        .unwrap();
        WeekSchedule::new(schedule, Vienna)
    }

    /// Night from Sunday 22:00 through Monday 07:00, then day until 22:00.
    fn therm() -> WeekSchedule {
        schedule(
            "therm",
            json!([
                { "zone_id": 1, "m_offset": 0 },
                { "zone_id": 2, "m_offset": 420 },
                { "zone_id": 1, "m_offset": 1320 }
            ]),
        )
    }

    fn vienna(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        Vienna.with_ymd_and_hms(y, m, d, h, min, 0).earliest().unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn monday_midnight_is_home_local() {
        let sched = therm();
        let tp = Timepoint {
            zone_id: 1,
            m_offset: 0,
        };
        // Wednesday noon in Vienna.
        let week = utc("2024-06-12T10:00:00Z");

        let home = sched.timepoint_datetime(&tp, &week, true);
        assert_eq!(home.to_rfc3339(), "2024-06-10T00:00:00+02:00");

        let in_utc = sched.timepoint_datetime(&tp, &week, false);
        assert_eq!(in_utc.to_rfc3339(), "2024-06-09T22:00:00+00:00");
    }

    #[test]
    fn week_is_taken_from_home_timezone() {
        let sched = therm();
        let tp = Timepoint {
            zone_id: 2,
            m_offset: 420,
        };
        // Sunday 23:30 UTC is already Monday in Vienna.
        let week = utc("2024-06-16T23:30:00Z");
        let dt = sched.timepoint_datetime(&tp, &week, true);
        assert_eq!(dt.to_rfc3339(), "2024-06-17T07:00:00+02:00");
    }

    #[test]
    fn spring_forward_gap_moves_to_first_instant_after() {
        // Sunday 02:30 does not exist on 2024-03-31 in Vienna.
        let sched = schedule("event", json!([{ "zone_id": 1, "m_offset": 6 * 1440 + 150 }]));
        let tp = sched.schedule().timetable[0];
        let dt = sched.timepoint_datetime(&tp, &vienna(2024, 3, 27, 12, 0), true);
        assert_eq!(dt.to_rfc3339(), "2024-03-31T03:00:00+02:00");
    }

    #[test]
    fn fall_back_ambiguity_takes_earliest() {
        // Sunday 02:30 happens twice on 2024-10-27 in Vienna.
        let sched = schedule("event", json!([{ "zone_id": 1, "m_offset": 6 * 1440 + 150 }]));
        let tp = sched.schedule().timetable[0];
        let dt = sched.timepoint_datetime(&tp, &vienna(2024, 10, 23, 12, 0), true);
        assert_eq!(dt.to_rfc3339(), "2024-10-27T02:30:00+02:00");
    }

    #[test]
    fn therm_schedule_drops_duplicated_first_slot() {
        let week = assert_ok!(therm().week_timepoints(&vienna(2024, 6, 12, 12, 0)));
        let offsets: Vec<u32> = week.iter().map(|o| o.timepoint.m_offset).collect();
        assert_eq!(offsets, [420, 1320]);
        assert_eq!(week[0].start, vienna(2024, 6, 10, 7, 0));
    }

    #[test]
    fn event_schedule_keeps_every_timepoint() {
        let sched = schedule(
            "event",
            json!([
                { "zone_id": 1, "m_offset": 1320 },
                { "zone_id": 2, "m_offset": 420 },
                { "zone_id": 1, "m_offset": 0 }
            ]),
        );
        let week = assert_ok!(sched.week_timepoints(&vienna(2024, 6, 12, 12, 0)));
        let offsets: Vec<u32> = week.iter().map(|o| o.timepoint.m_offset).collect();
        assert_eq!(offsets, [0, 420, 1320]);
    }

    #[test]
    fn empty_or_overlong_timetable_is_invalid() {
        let err = assert_err!(schedule("therm", json!([])).week_timepoints(&Utc::now()));
        assert!(matches!(err, CoreError::InvalidTimetable { .. }));

        let sched = schedule("therm", json!([{ "zone_id": 1, "m_offset": 10_080 }]));
        assert_err!(sched.week_timepoints(&Utc::now()));
    }

    #[test]
    fn zone_in_force() {
        let sched = therm();

        let day = assert_ok!(sched.zone_at(&vienna(2024, 6, 10, 8, 0)));
        assert_eq!(day.name.as_deref(), Some("Day"));

        // The timetable has one day slot a week; Wednesday morning is
        // still inside Monday night's slot.
        let night = assert_ok!(sched.zone_at(&vienna(2024, 6, 12, 8, 0)));
        assert_eq!(night.name.as_deref(), Some("Night"));

        // Monday 03:00: Sunday's night slot from the previous week.
        let at = vienna(2024, 6, 10, 3, 0);
        let current = assert_ok!(sched.timepoint_at(&at));
        assert_eq!(current.timepoint.m_offset, 1320);
        assert_eq!(current.start, vienna(2024, 6, 3, 22, 0));
        assert_eq!(assert_ok!(sched.zone_at(&at)).id, 1);
    }

    #[test]
    fn unknown_zone_is_invalid() {
        let sched = schedule("event", json!([{ "zone_id": 9, "m_offset": 0 }]));
        assert_err!(sched.zone_at(&Utc::now()));
    }

    #[test]
    fn period_spans_weeks_and_honours_limit() {
        let sched = therm();
        let from = vienna(2024, 6, 10, 6, 0);
        let to = vienna(2024, 6, 18, 0, 0);

        let all: Vec<DateTime<Tz>> = assert_ok!(sched.period(&from, &to, None))
            .map(|o| o.start)
            .collect();
        assert_eq!(
            all,
            [
                vienna(2024, 6, 10, 7, 0),
                vienna(2024, 6, 10, 22, 0),
                vienna(2024, 6, 17, 7, 0),
                vienna(2024, 6, 17, 22, 0),
            ]
        );

        let capped = assert_ok!(sched.period(&from, &to, Some(3))).count();
        assert_eq!(capped, 3);

        let late = vienna(2024, 6, 10, 23, 0);
        let first = assert_ok!(sched.period(&late, &to, None)).next().unwrap();
        assert_eq!(first.start, vienna(2024, 6, 17, 7, 0));
    }

    #[test]
    fn period_with_inverted_bounds_is_empty() {
        let sched = therm();
        let mut period =
            assert_ok!(sched.period(&vienna(2024, 6, 18, 0, 0), &vienna(2024, 6, 10, 0, 0), None));
        assert!(period.next().is_none());
    }
}
