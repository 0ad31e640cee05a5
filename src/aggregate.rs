use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::calendar;
use crate::models::{DashboardStats, Report, TrendPoint};

/// Number of weeks shown on the dashboard chart.
pub const DEFAULT_TREND_WEEKS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub yuva: i64,
    pub bhavferni: i64,
    pub pravachan: i64,
}

impl CategoryTotals {
    pub fn add(&mut self, report: &Report) {
        self.yuva += i64::from(report.attendance.yuva);
        self.bhavferni += i64::from(report.attendance.bhavferni);
        self.pravachan += i64::from(report.attendance.pravachan);
    }

    pub fn grand_total(&self) -> i64 {
        self.yuva + self.bhavferni + self.pravachan
    }
}

pub fn category_totals<'a>(reports: impl IntoIterator<Item = &'a Report>) -> CategoryTotals {
    let mut totals = CategoryTotals::default();
    for report in reports {
        totals.add(report);
    }
    totals
}

/// Sums attendance per week start and keeps the latest `window` weeks,
/// oldest first. Weeks without reports are not filled in.
pub fn trend_series<'a>(
    reports: impl IntoIterator<Item = &'a Report>,
    window: usize,
) -> Vec<TrendPoint> {
    let mut weeks: BTreeMap<NaiveDate, CategoryTotals> = BTreeMap::new();
    for report in reports {
        weeks.entry(report.week_start).or_default().add(report);
    }

    let skip = weeks.len().saturating_sub(window);
    weeks
        .into_iter()
        .skip(skip)
        .map(|(week_start, totals)| TrendPoint {
            week_start,
            yuva: totals.yuva,
            bhavferni: totals.bhavferni,
            pravachan: totals.pravachan,
        })
        .collect()
}

/// Mean rounded half-up to two decimals; zero when there is nothing to
/// average.
pub fn rounded_mean(total: i64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let count = count as i128;
    let scaled = i128::from(total) * 200 + count;
    let hundredths = scaled.div_euclid(2 * count);
    hundredths as f64 / 100.0
}

/// Count and per-category averages with no role-specific extras.
pub fn summarize<'a>(reports: impl IntoIterator<Item = &'a Report>) -> DashboardStats {
    let mut totals = CategoryTotals::default();
    let mut count = 0usize;
    for report in reports {
        totals.add(report);
        count += 1;
    }

    DashboardStats {
        total_reports: count,
        avg_yuva: rounded_mean(totals.yuva, count),
        avg_bhavferni: rounded_mean(totals.bhavferni, count),
        avg_pravachan: rounded_mean(totals.pravachan, count),
        active_kendras: None,
        last_week_total: None,
    }
}

/// Distinct kendras with at least one report.
pub fn active_kendras<'a>(reports: impl IntoIterator<Item = &'a Report>) -> usize {
    reports
        .into_iter()
        .map(|report| report.kendra_id)
        .collect::<HashSet<Uuid>>()
        .len()
}

/// Total attendance of the kendra's report for exactly the previous week.
/// Falls back to 0 when that week was not reported; earlier weeks are not
/// consulted.
pub fn last_week_total<'a>(
    reports: impl IntoIterator<Item = &'a Report>,
    kendra_id: Uuid,
    today: NaiveDate,
) -> i64 {
    let previous = calendar::previous_week_start(today);
    reports
        .into_iter()
        .find(|report| report.kendra_id == kendra_id && report.week_start == previous)
        .map(|report| report.attendance.total())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attendance;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_report(kendra_id: Uuid, week_start: NaiveDate, attendance: Attendance) -> Report {
        Report {
            id: Uuid::new_v4(),
            kendra_id,
            week_start,
            week_end: calendar::week_end(week_start),
            period_number: calendar::period_number(week_start),
            attendance,
            note: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn trend_sums_reports_sharing_a_week() {
        let w1 = date(2025, 5, 19);
        let w2 = date(2025, 5, 26);
        let reports = vec![
            sample_report(Uuid::new_v4(), w1, Attendance::new(3, 0, 0)),
            sample_report(Uuid::new_v4(), w1, Attendance::new(2, 0, 0)),
            sample_report(Uuid::new_v4(), w2, Attendance::new(5, 0, 0)),
        ];

        let trend = trend_series(&reports, 5);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].week_start, w1);
        assert_eq!(trend[0].yuva, 5);
        assert_eq!(trend[1].week_start, w2);
        assert_eq!(trend[1].yuva, 5);
    }

    #[test]
    fn trend_keeps_latest_weeks_only() {
        let kendra = Uuid::new_v4();
        let reports: Vec<Report> = (0..8)
            .rev()
            .map(|i| {
                sample_report(
                    kendra,
                    date(2025, 1, 6) + chrono::Duration::weeks(i),
                    Attendance::new(i as i32, 1, 2),
                )
            })
            .collect();

        let trend = trend_series(&reports, 3);
        let weeks: Vec<NaiveDate> = trend.iter().map(|p| p.week_start).collect();
        assert_eq!(
            weeks,
            vec![date(2025, 2, 10), date(2025, 2, 17), date(2025, 2, 24)]
        );
        assert_eq!(trend[2].yuva, 7);
        assert!(trend_series(&reports, 0).is_empty());
    }

    #[test]
    fn empty_scope_has_zero_averages() {
        let stats = summarize(&Vec::<Report>::new());
        assert_eq!(stats.total_reports, 0);
        assert_eq!(stats.avg_yuva, 0.0);
        assert_eq!(stats.avg_bhavferni, 0.0);
        assert_eq!(stats.avg_pravachan, 0.0);
    }

    #[test]
    fn averages_round_half_up() {
        assert_eq!(rounded_mean(10, 3), 3.33);
        assert_eq!(rounded_mean(20, 3), 6.67);
        assert_eq!(rounded_mean(1, 8), 0.13);
        assert_eq!(rounded_mean(201, 200), 1.01);
        assert_eq!(rounded_mean(0, 4), 0.0);
    }

    #[test]
    fn summarize_averages_each_category() {
        let kendra = Uuid::new_v4();
        let reports = vec![
            sample_report(kendra, date(2025, 5, 19), Attendance::new(10, 4, 1)),
            sample_report(kendra, date(2025, 5, 26), Attendance::new(15, 5, 2)),
        ];
        let stats = summarize(&reports);
        assert_eq!(stats.total_reports, 2);
        assert_eq!(stats.avg_yuva, 12.5);
        assert_eq!(stats.avg_bhavferni, 4.5);
        assert_eq!(stats.avg_pravachan, 1.5);
    }

    #[test]
    fn active_kendras_counts_distinct_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let reports = vec![
            sample_report(a, date(2025, 5, 19), Attendance::default()),
            sample_report(a, date(2025, 5, 26), Attendance::default()),
            sample_report(b, date(2025, 5, 26), Attendance::default()),
        ];
        assert_eq!(active_kendras(&reports), 2);
    }

    #[test]
    fn last_week_total_uses_exact_previous_week() {
        let kendra = Uuid::new_v4();
        let today = date(2025, 6, 11);
        let reports = vec![
            sample_report(kendra, date(2025, 6, 2), Attendance::new(7, 3, 2)),
            sample_report(kendra, date(2025, 6, 9), Attendance::new(1, 1, 1)),
        ];
        assert_eq!(last_week_total(&reports, kendra, today), 12);

        let skipped = vec![sample_report(kendra, date(2025, 5, 26), Attendance::new(9, 9, 9))];
        assert_eq!(last_week_total(&skipped, kendra, today), 0);
        assert_eq!(last_week_total(&reports, Uuid::new_v4(), today), 0);
    }

    #[test]
    fn category_totals_add_up() {
        let kendra = Uuid::new_v4();
        let reports = vec![
            sample_report(kendra, date(2025, 5, 19), Attendance::new(10, 4, 1)),
            sample_report(kendra, date(2025, 5, 26), Attendance::new(15, 5, 2)),
        ];
        let totals = category_totals(&reports);
        assert_eq!(totals, CategoryTotals { yuva: 25, bhavferni: 9, pravachan: 3 });
        assert_eq!(totals.grand_total(), 37);
    }
}
