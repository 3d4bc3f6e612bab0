//! Pure slot arithmetic. Nothing in here touches the network or the clock;
//! callers pass `now` in.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

use shared_config::SchedulingConfig;
use shared_database::day_bounds;

use crate::models::{AvailableSlot, DaySlots, WorkingHours};

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `None` when the end is not representable.
    pub fn from_minutes(start: DateTime<Utc>, minutes: i64) -> Option<Self> {
        let end = start.checked_add_signed(Duration::try_minutes(minutes)?)?;
        Some(Self { start, end })
    }

    /// Whole UTC days `from..=to`.
    pub fn days(from: NaiveDate, to: NaiveDate) -> Option<Self> {
        day_bounds(from, to).map(|(start, end)| Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

fn at(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

/// Working window of one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub lunch: Option<(NaiveTime, NaiveTime)>,
}

impl From<&WorkingHours> for DayHours {
    fn from(row: &WorkingHours) -> Self {
        let lunch = match (row.lunch_start, row.lunch_end) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        };
        Self {
            start: row.start_time,
            end: row.end_time,
            lunch,
        }
    }
}

impl DayHours {
    pub fn bounds_on(&self, date: NaiveDate) -> TimeRange {
        TimeRange::new(at(date, self.start), at(date, self.end))
    }

    pub fn lunch_on(&self, date: NaiveDate) -> Option<TimeRange> {
        self.lunch
            .map(|(start, end)| TimeRange::new(at(date, start), at(date, end)))
    }

    /// Every candidate slot of the day, stepping by `duration` from opening
    /// time. Slots touching lunch are dropped; none runs past closing.
    pub fn slots_on(&self, date: NaiveDate, duration: Duration) -> Vec<TimeRange> {
        let mut slots = Vec::new();
        if duration <= Duration::zero() {
            return slots;
        }

        let bounds = self.bounds_on(date);
        let lunch = self.lunch_on(date);
        let mut cursor = bounds.start;

        while cursor + duration <= bounds.end {
            let slot = TimeRange::new(cursor, cursor + duration);
            if !lunch.map_or(false, |l| slot.overlaps(&l)) {
                slots.push(slot);
            }
            cursor += duration;
        }

        slots
    }

    /// Whether `range` lies inside this day's hours on `date` and clear of lunch.
    pub fn contains(&self, date: NaiveDate, range: &TimeRange) -> bool {
        let bounds = self.bounds_on(date);
        if range.start >= range.end || range.start < bounds.start || range.end > bounds.end {
            return false;
        }
        !self.lunch_on(date).map_or(false, |l| range.overlaps(&l))
    }
}

/// A doctor's recurring week, restricted to clinic working days.
#[derive(Debug, Clone, Default)]
pub struct WeeklyHours {
    days: HashMap<Weekday, DayHours>,
}

impl WeeklyHours {
    pub fn from_rows(rows: &[WorkingHours], working_days: &[Weekday]) -> Self {
        let days = rows
            .iter()
            .filter(|row| working_days.contains(&row.day_of_week.weekday()))
            .map(|row| (row.day_of_week.weekday(), DayHours::from(row)))
            .collect();
        Self { days }
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<&DayHours> {
        self.days.get(&date.weekday())
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Working-hours check for an arbitrary range. Ranges crossing midnight
    /// never fit.
    pub fn fits(&self, range: &TimeRange) -> bool {
        let date = range.start.date_naive();
        if range.end.date_naive() != date {
            return false;
        }
        self.for_date(date)
            .map_or(false, |hours| hours.contains(date, range))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowViolation {
    #[error("Cannot book appointments in the past")]
    InPast,
    #[error("Appointments must be booked at least {0} hours in advance")]
    TooSoon(i64),
    #[error("Appointments cannot be booked more than {0} days in advance")]
    TooFar(i64),
}

/// How far ahead of `now` a slot may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingWindow {
    pub min_advance: Duration,
    pub max_advance: Duration,
}

impl BookingWindow {
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            min_advance: Duration::hours(config.min_advance_booking_hours),
            max_advance: Duration::days(config.max_advance_booking_days),
        }
    }

    pub fn earliest(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.min_advance
    }

    pub fn latest(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.max_advance
    }

    pub fn allows(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.check(start, now).is_ok()
    }

    pub fn check(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), WindowViolation> {
        if start <= now {
            return Err(WindowViolation::InPast);
        }
        if start < self.earliest(now) {
            return Err(WindowViolation::TooSoon(self.min_advance.num_hours()));
        }
        if start > self.latest(now) {
            return Err(WindowViolation::TooFar(self.max_advance.num_days()));
        }
        Ok(())
    }
}

pub struct SlotRequest<'a> {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub duration: Duration,
    pub hours: &'a WeeklyHours,
    /// Active appointments and unavailability windows.
    pub busy: &'a [TimeRange],
    pub window: BookingWindow,
    pub now: DateTime<Utc>,
}

/// Free slots per date, ordered by date then start. Dates without a free
/// slot are left out.
pub fn generate_slots(request: &SlotRequest<'_>) -> Vec<DaySlots> {
    let duration_minutes = request.duration.num_minutes();

    request
        .from
        .iter_days()
        .take_while(|date| *date <= request.to)
        .filter_map(|date| {
            let hours = request.hours.for_date(date)?;
            let slots: Vec<AvailableSlot> = hours
                .slots_on(date, request.duration)
                .into_iter()
                .filter(|slot| request.window.allows(slot.start, request.now))
                .filter(|slot| !request.busy.iter().any(|busy| slot.overlaps(busy)))
                .map(|slot| AvailableSlot {
                    start_time: slot.start,
                    end_time: slot.end,
                    duration_minutes,
                })
                .collect();

            if slots.is_empty() {
                None
            } else {
                Some(DaySlots { date, slots })
            }
        })
        .collect()
}
