//! Reporting Period Calculation
//!
//! Computes the calendar windows a report compares against each other. All dates are
//! half-open ranges `[start, end)`, matching the exclusive end date of the cost-reporting API.
//!
//! Two modes exist:
//!
//! - **Backfill** (explicit target month): `current`, `prev_month` and `yoy` are complete months.
//! - **Daily** (no target): `current` is the in-progress month up to (excluding) the reference
//!   date. On the 1st of a month that window would be empty, so it is left out together with
//!   everything derived from it and only the most recently completed month is reported.
//!
//! The mode is encoded in [`PeriodSet`], so which periods exist is decided by the variant
//! rather than by probing keys.

use crate::models::TargetMonth;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKey {
    Current,
    PrevComplete,
    PrevMonth,
    Yoy,
    YoyPrevComplete,
    PrevMonthPartial,
}

impl PeriodKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKey::Current => "current",
            PeriodKey::PrevComplete => "prev_complete",
            PeriodKey::PrevMonth => "prev_month",
            PeriodKey::Yoy => "yoy",
            PeriodKey::YoyPrevComplete => "yoy_prev_complete",
            PeriodKey::PrevMonthPartial => "prev_month_partial",
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open date range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// `YYYY-MM` label of the month the range starts in
    pub fn label(&self) -> String {
        self.start.format("%Y-%m").to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn prev(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    pub fn year_earlier(self) -> Self {
        Self { year: self.year - 1, month: self.month }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// The whole month as `[first day, first day of next month)`
    pub fn range(self) -> Option<DateRange> {
        Some(DateRange {
            start: self.first_day()?,
            end: self.next().first_day()?,
        })
    }
}

/// Date range covering a whole calendar month; `None` for an invalid month
pub fn month_range(year: i32, month: u32) -> Option<DateRange> {
    YearMonth::new(year, month)?.range()
}

/// The prior month's window covering as many elapsed days as `mtd`.
///
/// The end is clamped to the first day of `mtd`'s month, so a 30-day window projected onto a
/// 28-day February stops at the end of February.
pub fn prior_partial_period(mtd: DateRange) -> Option<DateRange> {
    let start = YearMonth::of(mtd.start).prev().first_day()?;
    let end = start
        .checked_add_signed(Duration::days(mtd.days()))?
        .min(mtd.start);
    Some(DateRange { start, end })
}

/// The set of periods for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodSet {
    /// Explicit target month
    Backfill {
        current: DateRange,
        prev_month: DateRange,
        yoy: DateRange,
    },
    /// Daily run with a non-empty month-to-date window
    MonthToDate {
        current: DateRange,
        prev_complete: DateRange,
        prev_month: DateRange,
        yoy: DateRange,
        yoy_prev_complete: DateRange,
        prev_month_partial: DateRange,
    },
    /// Daily run on the 1st; the month-to-date window is empty and omitted
    MonthStart {
        prev_complete: DateRange,
        prev_month: DateRange,
        yoy_prev_complete: DateRange,
    },
}

impl PeriodSet {
    pub fn get(&self, key: PeriodKey) -> Option<DateRange> {
        self.entries()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, range)| range)
    }

    pub fn contains(&self, key: PeriodKey) -> bool {
        self.get(key).is_some()
    }

    pub fn entries(&self) -> Vec<(PeriodKey, DateRange)> {
        match *self {
            PeriodSet::Backfill { current, prev_month, yoy } => vec![
                (PeriodKey::Current, current),
                (PeriodKey::PrevMonth, prev_month),
                (PeriodKey::Yoy, yoy),
            ],
            PeriodSet::MonthToDate {
                current,
                prev_complete,
                prev_month,
                yoy,
                yoy_prev_complete,
                prev_month_partial,
            } => vec![
                (PeriodKey::Current, current),
                (PeriodKey::PrevComplete, prev_complete),
                (PeriodKey::PrevMonth, prev_month),
                (PeriodKey::Yoy, yoy),
                (PeriodKey::YoyPrevComplete, yoy_prev_complete),
                (PeriodKey::PrevMonthPartial, prev_month_partial),
            ],
            PeriodSet::MonthStart {
                prev_complete,
                prev_month,
                yoy_prev_complete,
            } => vec![
                (PeriodKey::PrevComplete, prev_complete),
                (PeriodKey::PrevMonth, prev_month),
                (PeriodKey::YoyPrevComplete, yoy_prev_complete),
            ],
        }
    }

    pub fn labels(&self) -> BTreeMap<PeriodKey, String> {
        self.entries()
            .into_iter()
            .map(|(key, range)| (key, range.label()))
            .collect()
    }

    pub fn is_mtd(&self) -> bool {
        matches!(self, PeriodSet::MonthToDate { .. })
    }

    /// Reports to produce for this set, primary frame first
    pub fn frames(&self) -> Vec<ReportFrame> {
        match self {
            PeriodSet::Backfill { .. } => vec![ReportFrame::BACKFILL],
            PeriodSet::MonthToDate { .. } => {
                vec![ReportFrame::MONTH_TO_DATE, ReportFrame::COMPLETED_MONTH]
            }
            PeriodSet::MonthStart { .. } => vec![ReportFrame::COMPLETED_MONTH],
        }
    }
}

/// Which concrete periods fill the three public comparison slots of one summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFrame {
    pub current: PeriodKey,
    pub prev_month: PeriodKey,
    pub yoy: PeriodKey,
    /// Prior-month partial window compared against an in-progress `current`
    pub mtd_partial: Option<PeriodKey>,
}

impl ReportFrame {
    pub const BACKFILL: ReportFrame = ReportFrame {
        current: PeriodKey::Current,
        prev_month: PeriodKey::PrevMonth,
        yoy: PeriodKey::Yoy,
        mtd_partial: None,
    };

    pub const MONTH_TO_DATE: ReportFrame = ReportFrame {
        current: PeriodKey::Current,
        prev_month: PeriodKey::PrevComplete,
        yoy: PeriodKey::Yoy,
        mtd_partial: Some(PeriodKey::PrevMonthPartial),
    };

    pub const COMPLETED_MONTH: ReportFrame = ReportFrame {
        current: PeriodKey::PrevComplete,
        prev_month: PeriodKey::PrevMonth,
        yoy: PeriodKey::YoyPrevComplete,
        mtd_partial: None,
    };

    pub fn is_mtd(&self) -> bool {
        self.mtd_partial.is_some()
    }
}

fn invalid(what: &str) -> anyhow::Error {
    anyhow!("Date out of range while computing {}", what)
}

/// Compute reporting periods for a reference instant.
///
/// With `target` set the run is a backfill of that month; otherwise the in-progress month
/// relative to `now` is reported.
pub fn get_periods(now: DateTime<Utc>, target: Option<TargetMonth>) -> Result<PeriodSet> {
    if let Some(target) = target {
        let month = YearMonth::new(target.year, target.month).ok_or_else(|| {
            anyhow!("Invalid target month: {}-{:02}", target.year, target.month)
        })?;
        return Ok(PeriodSet::Backfill {
            current: month.range().ok_or_else(|| invalid("current"))?,
            prev_month: month.prev().range().ok_or_else(|| invalid("prev_month"))?,
            yoy: month.year_earlier().range().ok_or_else(|| invalid("yoy"))?,
        });
    }

    let today = now.date_naive();
    let this_month = YearMonth::of(today);
    let completed = this_month.prev();

    let prev_complete = completed.range().ok_or_else(|| invalid("prev_complete"))?;
    let prev_month = completed.prev().range().ok_or_else(|| invalid("prev_month"))?;
    let yoy_prev_complete = completed
        .year_earlier()
        .range()
        .ok_or_else(|| invalid("yoy_prev_complete"))?;

    let current = DateRange {
        start: this_month.first_day().ok_or_else(|| invalid("current"))?,
        end: today,
    };

    if current.is_empty() {
        return Ok(PeriodSet::MonthStart {
            prev_complete,
            prev_month,
            yoy_prev_complete,
        });
    }

    Ok(PeriodSet::MonthToDate {
        current,
        prev_complete,
        prev_month,
        yoy: this_month.year_earlier().range().ok_or_else(|| invalid("yoy"))?,
        yoy_prev_complete,
        prev_month_partial: prior_partial_period(current)
            .ok_or_else(|| invalid("prev_month_partial"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_range_regular() {
        let r = month_range(2026, 3).unwrap();
        assert_eq!(r.start, d(2026, 3, 1));
        assert_eq!(r.end, d(2026, 4, 1));
    }

    #[test]
    fn test_month_range_december_rolls_year() {
        let r = month_range(2025, 12).unwrap();
        assert_eq!(r.start, d(2025, 12, 1));
        assert_eq!(r.end, d(2026, 1, 1));
    }

    #[test]
    fn test_month_range_rejects_invalid_month() {
        assert!(month_range(2025, 0).is_none());
        assert!(month_range(2025, 13).is_none());
    }

    #[test]
    fn test_month_range_end_is_next_first_for_every_month() {
        for year in [2023, 2024, 2025] {
            for month in 1..=12 {
                let r = month_range(year, month).unwrap();
                assert_eq!(r.end.day(), 1);
                assert_eq!(r.end, YearMonth::new(year, month).unwrap().next().first_day().unwrap());
                assert!(r.days() >= 28 && r.days() <= 31);
            }
        }
    }

    #[test]
    fn test_prior_partial_clamps_to_short_february() {
        // 30 elapsed days in March against a 28-day February
        let mtd = DateRange { start: d(2025, 3, 1), end: d(2025, 3, 31) };
        let prior = prior_partial_period(mtd).unwrap();
        assert_eq!(prior.start, d(2025, 2, 1));
        assert_eq!(prior.end, d(2025, 3, 1));
    }

    #[test]
    fn test_prior_partial_leap_february_not_clamped_early() {
        // 28 elapsed days fit inside a 29-day February
        let mtd = DateRange { start: d(2024, 3, 1), end: d(2024, 3, 29) };
        let prior = prior_partial_period(mtd).unwrap();
        assert_eq!(prior.end, d(2024, 2, 29));
    }

    #[test]
    fn test_prior_partial_january_rolls_back_a_year() {
        let mtd = DateRange { start: d(2026, 1, 1), end: d(2026, 1, 10) };
        let prior = prior_partial_period(mtd).unwrap();
        assert_eq!(prior.start, d(2025, 12, 1));
        assert_eq!(prior.end, d(2025, 12, 10));
    }

    #[test]
    fn test_backfill_periods() {
        let now = Utc.with_ymd_and_hms(2026, 5, 20, 6, 0, 0).unwrap();
        let set = get_periods(now, Some(TargetMonth { year: 2026, month: 1 })).unwrap();
        assert_eq!(set.get(PeriodKey::Current), month_range(2026, 1));
        assert_eq!(set.get(PeriodKey::PrevMonth), month_range(2025, 12));
        assert_eq!(set.get(PeriodKey::Yoy), month_range(2025, 1));
        assert_eq!(set.entries().len(), 3);
        assert!(!set.is_mtd());
    }

    #[test]
    fn test_backfill_rejects_bad_month() {
        let now = Utc.with_ymd_and_hms(2026, 5, 20, 6, 0, 0).unwrap();
        assert!(get_periods(now, Some(TargetMonth { year: 2026, month: 13 })).is_err());
    }

    #[test]
    fn test_daily_mid_month() {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let set = get_periods(now, None).unwrap();
        assert!(set.is_mtd());
        assert_eq!(
            set.get(PeriodKey::Current),
            Some(DateRange { start: d(2026, 2, 1), end: d(2026, 2, 10) })
        );
        assert_eq!(set.get(PeriodKey::PrevComplete), month_range(2026, 1));
        assert_eq!(set.get(PeriodKey::PrevMonth), month_range(2025, 12));
        assert_eq!(set.get(PeriodKey::Yoy), month_range(2025, 2));
        assert_eq!(set.get(PeriodKey::YoyPrevComplete), month_range(2025, 1));
        assert_eq!(
            set.get(PeriodKey::PrevMonthPartial),
            Some(DateRange { start: d(2026, 1, 1), end: d(2026, 1, 10) })
        );
    }

    #[test]
    fn test_daily_first_of_month_omits_current() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        let set = get_periods(now, None).unwrap();
        assert!(!set.contains(PeriodKey::Current));
        assert!(!set.contains(PeriodKey::Yoy));
        assert!(!set.contains(PeriodKey::PrevMonthPartial));
        assert_eq!(set.get(PeriodKey::PrevComplete), month_range(2026, 2));
        assert_eq!(set.get(PeriodKey::PrevMonth), month_range(2026, 1));
        assert_eq!(set.get(PeriodKey::YoyPrevComplete), month_range(2025, 2));
        assert_eq!(set.frames(), vec![ReportFrame::COMPLETED_MONTH]);
    }

    #[test]
    fn test_daily_january_rolls_back() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 6, 0, 0).unwrap();
        let set = get_periods(now, None).unwrap();
        assert_eq!(set.get(PeriodKey::PrevComplete), month_range(2025, 12));
        assert_eq!(set.get(PeriodKey::PrevMonth), month_range(2025, 11));
        assert_eq!(set.get(PeriodKey::Yoy), month_range(2025, 1));
        assert_eq!(set.get(PeriodKey::YoyPrevComplete), month_range(2024, 12));
    }

    #[test]
    fn test_no_empty_period_ever_emitted() {
        let mut day = d(2024, 1, 1);
        while day < d(2025, 1, 1) {
            let now = Utc.from_utc_datetime(&day.and_hms_opt(8, 0, 0).unwrap());
            let set = get_periods(now, None).unwrap();
            for (key, range) in set.entries() {
                assert!(!range.is_empty(), "{} empty on {}", key, day);
            }
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_labels() {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let labels = get_periods(now, None).unwrap().labels();
        assert_eq!(labels[&PeriodKey::Current], "2026-02");
        assert_eq!(labels[&PeriodKey::PrevComplete], "2026-01");
    }
}
