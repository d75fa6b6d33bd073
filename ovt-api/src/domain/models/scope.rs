use serde::{Deserialize, Serialize};
use strum::Display;
use time::{Date, Duration, Month, Weekday};

use crate::domain::LedgerError;

use super::ids::UserId;

/// The two window kinds an aggregate row can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Month,
    Week,
}

/// Unique identifier of one aggregate row: kind, period number, year, owner.
///
/// Construction validates the period number (1-12 for months, 1-53 for ISO
/// weeks); whether week 53 exists in a given year is only known once the
/// window is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub kind: ScopeKind,
    pub period: u8,
    pub year: i32,
    pub owner: UserId,
}

impl ScopeKey {
    pub fn month(owner: UserId, month: u8, year: i32) -> Result<Self, LedgerError> {
        if !(1..=12).contains(&month) || year < 1 {
            return Err(LedgerError::InvalidPeriod {
                kind: ScopeKind::Month,
                period: month,
                year,
            });
        }

        Ok(Self {
            kind: ScopeKind::Month,
            period: month,
            year,
            owner,
        })
    }

    pub fn week(owner: UserId, week: u8, year: i32) -> Result<Self, LedgerError> {
        if !(1..=53).contains(&week) || year < 1 {
            return Err(LedgerError::InvalidPeriod {
                kind: ScopeKind::Week,
                period: week,
                year,
            });
        }

        Ok(Self {
            kind: ScopeKind::Week,
            period: week,
            year,
            owner,
        })
    }

    pub fn new(
        kind: ScopeKind,
        owner: UserId,
        period: u8,
        year: i32,
    ) -> Result<Self, LedgerError> {
        match kind {
            ScopeKind::Month => Self::month(owner, period, year),
            ScopeKind::Week => Self::week(owner, period, year),
        }
    }

    /// The `[start, end)` date window this key covers.
    pub fn window(&self) -> Result<(Date, Date), LedgerError> {
        match self.kind {
            ScopeKind::Month => {
                let month = Month::try_from(self.period).map_err(|_| self.invalid())?;
                let start =
                    Date::from_calendar_date(self.year, month, 1).map_err(|_| self.invalid())?;
                let (next_year, next_month) = match month {
                    Month::December => (self.year + 1, Month::January),
                    _ => (self.year, month.next()),
                };
                let end =
                    Date::from_calendar_date(next_year, next_month, 1).map_err(|_| self.invalid())?;

                Ok((start, end))
            }
            ScopeKind::Week => {
                // Fails for week 53 in years that only have 52 ISO weeks.
                let start = Date::from_iso_week_date(self.year, self.period, Weekday::Monday)
                    .map_err(|_| self.invalid())?;

                Ok((start, start + Duration::days(7)))
            }
        }
    }

    fn invalid(&self) -> LedgerError {
        LedgerError::InvalidPeriod {
            kind: self.kind,
            period: self.period,
            year: self.year,
        }
    }
}

/// (month number, calendar year) of a date.
pub fn month_of(date: Date) -> (u8, i32) {
    (u8::from(date.month()), date.year())
}

/// (ISO week number, ISO week-based year) of a date.
///
/// The week-based year differs from the calendar year around January 1st.
pub fn iso_week_of(date: Date) -> (u8, i32) {
    let (year, week, _) = date.to_iso_week_date();
    (week, year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn owner() -> UserId {
        UserId::new(7)
    }

    #[test]
    fn month_window_covers_whole_month() {
        let key = ScopeKey::month(owner(), 1, 2024).unwrap();
        assert_eq!(key.window().unwrap(), (date!(2024 - 01 - 01), date!(2024 - 02 - 01)));
    }

    #[test]
    fn december_window_rolls_into_next_year() {
        let key = ScopeKey::month(owner(), 12, 2024).unwrap();
        assert_eq!(key.window().unwrap(), (date!(2024 - 12 - 01), date!(2025 - 01 - 01)));
    }

    #[test]
    fn week_window_starts_on_monday() {
        let key = ScopeKey::week(owner(), 3, 2024).unwrap();
        let (start, end) = key.window().unwrap();
        assert_eq!(start, date!(2024 - 01 - 15));
        assert_eq!(end, date!(2024 - 01 - 22));
    }

    #[test]
    fn month_13_is_rejected() {
        assert!(matches!(
            ScopeKey::month(owner(), 13, 2024),
            Err(LedgerError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn week_53_is_only_valid_in_long_years() {
        // 2020 has 53 ISO weeks, 2024 does not.
        assert!(ScopeKey::week(owner(), 53, 2020).unwrap().window().is_ok());
        assert!(ScopeKey::week(owner(), 53, 2024).unwrap().window().is_err());
    }

    #[test]
    fn iso_week_year_differs_from_calendar_year_at_boundaries() {
        // 2023-01-01 is a Sunday, part of ISO week 52 of 2022.
        assert_eq!(iso_week_of(date!(2023 - 01 - 01)), (52, 2022));
        assert_eq!(month_of(date!(2023 - 01 - 01)), (1, 2023));
    }
}
