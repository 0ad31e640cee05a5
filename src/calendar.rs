use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::error::{ReportError, Result};

/// Monday of the first reporting week. Period numbers count whole weeks from
/// here, starting at 1.
pub const PERIOD_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(2024, 7, 15) {
    Some(date) => date,
    None => panic!("period epoch must be a valid date"),
};

pub const FISCAL_YEAR_MONTH: u32 = 7;
pub const FISCAL_YEAR_DAY: u32 = 12;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).map_err(|source| {
        ReportError::InvalidDate {
            input: input.to_string(),
            source,
        }
    })
}

/// Monday of the week containing `date`. Sunday belongs to the week that
/// started six days earlier.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn week_end(week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days(6)
}

pub fn is_monday(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() == 0
}

/// Whole weeks since [`PERIOD_EPOCH`] plus one, floored. Dates before the
/// epoch produce zero or negative numbers.
pub fn period_number(week_start: NaiveDate) -> i64 {
    (week_start - PERIOD_EPOCH).num_days().div_euclid(7) + 1
}

pub fn current_week_start(today: NaiveDate) -> NaiveDate {
    week_start(today)
}

pub fn previous_week_start(today: NaiveDate) -> NaiveDate {
    week_start(today - Duration::days(7))
}

/// New reports may only be filed for this week or the one before it.
pub fn is_reportable_week(week_start: NaiveDate, today: NaiveDate) -> bool {
    week_start == current_week_start(today) || week_start == previous_week_start(today)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalYear {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FiscalYear {
    /// The fiscal year that opens on July 12 of `year` and closes on July 11
    /// of the following year.
    pub fn starting_in(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, FISCAL_YEAR_MONTH, FISCAL_YEAR_DAY);
        let end = NaiveDate::from_ymd_opt(year + 1, FISCAL_YEAR_MONTH, FISCAL_YEAR_DAY - 1);
        match (start, end) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(ReportError::validation(format!(
                "fiscal year {year} is out of the supported date range"
            ))),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn previous(&self) -> Result<Self> {
        Self::starting_in(self.start.year() - 1)
    }
}

pub fn current_fiscal_year(today: NaiveDate) -> Result<FiscalYear> {
    let cutover = (FISCAL_YEAR_MONTH, FISCAL_YEAR_DAY);
    if (today.month(), today.day()) < cutover {
        FiscalYear::starting_in(today.year() - 1)
    } else {
        FiscalYear::starting_in(today.year())
    }
}

pub fn previous_fiscal_year(today: NaiveDate) -> Result<FiscalYear> {
    current_fiscal_year(today)?.previous()
}
