//! Splits a [`ReportFilter`] into the constraints the gateway applies and the
//! residual predicate evaluated over the joined rows it returns.
//!
//! Per field:
//!
//! | field              | on report row | pushed down when                     |
//! |--------------------|---------------|--------------------------------------|
//! | scope kendra       | yes           | always (also re-checked in memory)   |
//! | `kendra_id`        | yes           | `FilterCapabilities::kendra_id`      |
//! | `kendra_type`      | no (kendra)   | `FilterCapabilities::kendra_type`    |
//! | `city_id`          | no (city)     | `FilterCapabilities::city_id`        |
//! | dates / fiscal yrs | yes           | always, as inclusive week-start bounds |
//! | search text        | no            | never; applied last, in memory       |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::calendar;
use crate::error::Result;
use crate::gateway::{ReportCriteria, ReportQuery};
use crate::models::{KendraType, ReportRow};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportFilter {
    pub kendra_id: Option<Uuid>,
    pub city_id: Option<Uuid>,
    pub kendra_type: Option<KendraType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub current_fiscal_year: bool,
    pub previous_fiscal_year: bool,
}

impl ReportFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Role-derived visibility. `Unbound` is a member whose kendra could not be
/// resolved; it sees nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Admin,
    Member { kendra_id: Uuid },
    Unbound,
}

impl Scope {
    pub fn kendra_id(&self) -> Option<Uuid> {
        match self {
            Scope::Member { kendra_id } => Some(*kendra_id),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Scope::Admin)
    }
}

/// Which relational filters a gateway can evaluate itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterCapabilities {
    pub kendra_id: bool,
    pub kendra_type: bool,
    pub city_id: bool,
}

impl Default for FilterCapabilities {
    fn default() -> Self {
        Self {
            kendra_id: true,
            kendra_type: false,
            city_id: false,
        }
    }
}

impl FilterCapabilities {
    pub fn full() -> Self {
        Self {
            kendra_id: true,
            kendra_type: true,
            city_id: true,
        }
    }
}

/// Inclusive bounds on a report's week start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn intersect(self, other: DateRange) -> DateRange {
        DateRange {
            from: max_bound(self.from, other.from),
            to: min_bound(self.to, other.to),
        }
    }

    pub fn is_inverted(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

fn max_bound(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn min_bound(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResidualFilter {
    pub scope_kendra: Option<Uuid>,
    pub kendra_id: Option<Uuid>,
    pub kendra_type: Option<KendraType>,
    pub city_id: Option<Uuid>,
}

impl ResidualFilter {
    pub fn matches(&self, row: &ReportRow) -> bool {
        if let Some(kendra_id) = self.scope_kendra {
            if row.report.kendra_id != kendra_id {
                return false;
            }
        }
        if let Some(kendra_id) = self.kendra_id {
            if row.report.kendra_id != kendra_id {
                return false;
            }
        }
        if let Some(kendra_type) = self.kendra_type {
            if row.kendra_type != Some(kendra_type) {
                return false;
            }
        }
        if let Some(city_id) = self.city_id {
            if row.city_id != Some(city_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterPlan {
    pub criteria: ReportCriteria,
    pub residual: ResidualFilter,
    /// Set when the plan can never match (unbound member, inverted range).
    pub empty: bool,
}

impl FilterPlan {
    pub fn build(
        filter: &ReportFilter,
        scope: Scope,
        capabilities: FilterCapabilities,
        today: NaiveDate,
    ) -> Result<Self> {
        let scope_kendra = scope.kendra_id();

        // The member scope replaces any kendra the caller asked for.
        let requested_kendra = match scope {
            Scope::Admin => filter.kendra_id,
            Scope::Member { .. } | Scope::Unbound => {
                if filter.kendra_id.is_some() && filter.kendra_id != scope_kendra {
                    debug!(?filter.kendra_id, ?scope_kendra, "kendra filter overridden by member scope");
                }
                None
            }
        };

        let mut date_range = DateRange::new(filter.date_from, filter.date_to);
        if filter.current_fiscal_year {
            let fy = calendar::current_fiscal_year(today)?;
            date_range = date_range.intersect(DateRange::new(Some(fy.start), Some(fy.end)));
        }
        if filter.previous_fiscal_year {
            let fy = calendar::previous_fiscal_year(today)?;
            date_range = date_range.intersect(DateRange::new(Some(fy.start), Some(fy.end)));
        }

        let mut criteria = ReportCriteria {
            scope_kendra,
            date_range,
            ..ReportCriteria::default()
        };
        let mut residual = ResidualFilter {
            scope_kendra,
            ..ResidualFilter::default()
        };

        if capabilities.kendra_id {
            criteria.kendra_id = requested_kendra;
        } else {
            residual.kendra_id = requested_kendra;
        }
        if capabilities.kendra_type {
            criteria.kendra_type = filter.kendra_type;
        } else {
            residual.kendra_type = filter.kendra_type;
        }
        if capabilities.city_id {
            criteria.city_id = filter.city_id;
        } else {
            residual.city_id = filter.city_id;
        }

        let empty = matches!(scope, Scope::Unbound) || date_range.is_inverted();

        Ok(Self {
            criteria,
            residual,
            empty,
        })
    }

    pub fn query(&self, limit: usize, offset: usize) -> ReportQuery {
        ReportQuery {
            criteria: self.criteria,
            limit,
            offset,
        }
    }

    pub fn apply(&self, rows: Vec<ReportRow>) -> Vec<ReportRow> {
        rows.into_iter()
            .filter(|row| self.residual.matches(row))
            .collect()
    }
}

/// Case-insensitive substring match on kendra name and note. A blank query
/// matches everything.
pub fn matches_search(row: &ReportRow, query: &str) -> bool {
    if query.trim().is_empty() {
        return true;
    }
    let needle = query.to_lowercase();
    let in_name = row
        .kendra_name
        .as_deref()
        .is_some_and(|name| name.to_lowercase().contains(&needle));
    let in_note = row
        .report
        .note
        .as_deref()
        .is_some_and(|note| note.to_lowercase().contains(&needle));
    in_name || in_note
}

pub fn search<'a>(rows: &'a [ReportRow], query: &str) -> Vec<&'a ReportRow> {
    rows.iter().filter(|row| matches_search(row, query)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Attendance, Report};
    use chrono::{TimeZone, Utc};

    pub(crate) fn row(
        kendra_id: Uuid,
        kendra_name: &str,
        kendra_type: KendraType,
        city_id: Uuid,
        week_start: NaiveDate,
        attendance: Attendance,
    ) -> ReportRow {
        ReportRow {
            report: Report {
                id: Uuid::new_v4(),
                kendra_id,
                week_start,
                week_end: calendar::week_end(week_start),
                period_number: calendar::period_number(week_start),
                attendance,
                note: None,
                created_by: Uuid::new_v4(),
                created_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            },
            kendra_name: Some(kendra_name.to_string()),
            kendra_type: Some(kendra_type),
            city_id: Some(city_id),
            city_name: Some("Surat".to_string()),
            creator: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn member_scope_overrides_requested_kendra() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let filter = ReportFilter {
            kendra_id: Some(other),
            ..ReportFilter::default()
        };
        let plan = FilterPlan::build(
            &filter,
            Scope::Member { kendra_id: own },
            FilterCapabilities::default(),
            date(2025, 6, 1),
        )
        .unwrap();

        assert_eq!(plan.criteria.scope_kendra, Some(own));
        assert_eq!(plan.criteria.kendra_id, None);

        let rows = vec![
            row(own, "Vesu", KendraType::Yuvan, Uuid::new_v4(), date(2025, 5, 26), Attendance::default()),
            row(other, "Adajan", KendraType::Yuvan, Uuid::new_v4(), date(2025, 5, 26), Attendance::default()),
        ];
        let kept = plan.apply(rows);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].report.kendra_id, own);
    }

    #[test]
    fn joined_fields_stay_in_memory_without_capability() {
        let city = Uuid::new_v4();
        let filter = ReportFilter {
            city_id: Some(city),
            kendra_type: Some(KendraType::Yuvti),
            kendra_id: Some(Uuid::new_v4()),
            ..ReportFilter::default()
        };
        let plan = FilterPlan::build(
            &filter,
            Scope::Admin,
            FilterCapabilities::default(),
            date(2025, 6, 1),
        )
        .unwrap();
        assert_eq!(plan.criteria.city_id, None);
        assert_eq!(plan.criteria.kendra_type, None);
        assert_eq!(plan.criteria.kendra_id, filter.kendra_id);
        assert_eq!(plan.residual.city_id, Some(city));
        assert_eq!(plan.residual.kendra_type, Some(KendraType::Yuvti));

        let pushed = FilterPlan::build(
            &filter,
            Scope::Admin,
            FilterCapabilities::full(),
            date(2025, 6, 1),
        )
        .unwrap();
        assert_eq!(pushed.criteria.city_id, Some(city));
        assert_eq!(pushed.residual, ResidualFilter::default());
    }

    #[test]
    fn fiscal_shortcut_narrows_explicit_range() {
        let filter = ReportFilter {
            date_from: Some(date(2025, 1, 1)),
            current_fiscal_year: true,
            ..ReportFilter::default()
        };
        let plan = FilterPlan::build(
            &filter,
            Scope::Admin,
            FilterCapabilities::default(),
            date(2025, 8, 1),
        )
        .unwrap();
        assert_eq!(plan.criteria.date_range.from, Some(date(2025, 7, 12)));
        assert_eq!(plan.criteria.date_range.to, Some(date(2026, 7, 11)));
        assert!(!plan.empty);
    }

    #[test]
    fn both_fiscal_shortcuts_yield_an_empty_plan() {
        let filter = ReportFilter {
            current_fiscal_year: true,
            previous_fiscal_year: true,
            ..ReportFilter::default()
        };
        let plan = FilterPlan::build(
            &filter,
            Scope::Admin,
            FilterCapabilities::default(),
            date(2025, 8, 1),
        )
        .unwrap();
        assert!(plan.empty);
    }

    #[test]
    fn unbound_member_plan_is_empty() {
        let plan = FilterPlan::build(
            &ReportFilter::default(),
            Scope::Unbound,
            FilterCapabilities::default(),
            date(2025, 6, 1),
        )
        .unwrap();
        assert!(plan.empty);
    }

    #[test]
    fn search_matches_name_or_note_ignoring_case() {
        let mut noted = row(
            Uuid::new_v4(),
            "Vesu",
            KendraType::Yuvan,
            Uuid::new_v4(),
            date(2025, 5, 26),
            Attendance::default(),
        );
        noted.report.note = Some("Guest speaker from Pune".to_string());
        let plain = row(
            Uuid::new_v4(),
            "Adajan",
            KendraType::Yuvti,
            Uuid::new_v4(),
            date(2025, 5, 26),
            Attendance::default(),
        );
        let rows = vec![noted, plain];

        assert_eq!(search(&rows, "PUNE").len(), 1);
        assert_eq!(search(&rows, "adaj").len(), 1);
        assert_eq!(search(&rows, "   ").len(), 2);
        assert!(search(&rows, "surat").is_empty());
    }
}
