// THEORY:
// The `CellEnumerator` decides which seconds belong to which cell. A slot is an
// hour of a weekday; its four cells are that hour on the four most recent
// occurrences of the weekday up to the analysis end date.
//
// Dates are resolved in the entity's local time zone: every occurrence starts
// at local midnight, and hour `h` starts `h` hours (of elapsed time) later.
// Everything downstream of this module only sees `[start, end)` unix-second
// windows.

use crate::error::CellError;
use chrono::{Datelike, Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;

pub const DAYS_PER_WEEK: usize = 7;
pub const HOURS_PER_DAY: usize = 24;
/// Historical occurrences analyzed per slot.
pub const CELLS_PER_SLOT: usize = 4;

const SECONDS_PER_HOUR: i64 = 3600;

/// A half-open window of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CellWindow {
    pub start: i32,
    pub end: i32,
}

impl CellWindow {
    pub fn contains(&self, timestamp: i32) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// The four cells of every hour of one weekday, oldest occurrence first.
pub type DayCells = [[CellWindow; CELLS_PER_SLOT]; HOURS_PER_DAY];

/// All cells of a week, indexed by weekday (0 = Sunday).
pub type WeekCells = [DayCells; DAYS_PER_WEEK];

#[derive(Debug, Clone)]
pub struct CellEnumerator {
    end_date: NaiveDate,
    timezone: Tz,
}

impl CellEnumerator {
    pub fn new(end_date: NaiveDate, timezone: Tz) -> Self {
        Self { end_date, timezone }
    }

    /// Windows of every hour for the weekday `target` (0 = Sunday).
    pub fn day_cells(&self, target: usize) -> Result<DayCells, CellError> {
        if target >= DAYS_PER_WEEK {
            return Err(CellError::InvalidWeekday(target));
        }

        let weekday = self.end_date.weekday().num_days_from_sunday() as i64;
        let days_ago = (weekday + DAYS_PER_WEEK as i64 - target as i64) % DAYS_PER_WEEK as i64;

        // Most recent occurrence first, then flipped so that cell 0 is the oldest.
        let mut midnights = [0i64; CELLS_PER_SLOT];
        for (k, midnight) in midnights.iter_mut().enumerate() {
            let date = self.end_date - Duration::days(days_ago + 7 * k as i64);
            *midnight = self.local_midnight(date)?;
        }
        midnights.reverse();

        let mut cells = [[CellWindow { start: 0, end: 0 }; CELLS_PER_SLOT]; HOURS_PER_DAY];
        for (hour, row) in cells.iter_mut().enumerate() {
            for (cell, midnight) in row.iter_mut().zip(midnights) {
                let start = midnight + hour as i64 * SECONDS_PER_HOUR;
                *cell = CellWindow {
                    start: start as i32,
                    end: (start + SECONDS_PER_HOUR) as i32,
                };
            }
        }
        Ok(cells)
    }

    /// Windows for the whole week.
    pub fn week(&self) -> Result<WeekCells, CellError> {
        let mut week = [[[CellWindow { start: 0, end: 0 }; CELLS_PER_SLOT]; HOURS_PER_DAY];
            DAYS_PER_WEEK];
        for (day, cells) in week.iter_mut().enumerate() {
            *cells = self.day_cells(day)?;
        }
        Ok(week)
    }

    fn local_midnight(&self, date: NaiveDate) -> Result<i64, CellError> {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or(CellError::NonexistentMidnight(date))?;
        self.timezone
            .from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.timestamp())
            .ok_or(CellError::NonexistentMidnight(date))
    }
}
