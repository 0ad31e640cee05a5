use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(ReportError::validation(format!("unknown role {other:?}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KendraType {
    Yuvan,
    Yuvti,
}

impl KendraType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KendraType::Yuvan => "Yuvan",
            KendraType::Yuvti => "Yuvti",
        }
    }
}

impl FromStr for KendraType {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Yuvan" => Ok(KendraType::Yuvan),
            "Yuvti" => Ok(KendraType::Yuvti),
            other => Err(ReportError::validation(format!(
                "kendra type must be Yuvan or Yuvti, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for KendraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: Uuid,
    pub name: String,
    pub pin_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kendra {
    pub id: Uuid,
    pub name: String,
    pub city_id: Uuid,
    pub kendra_type: KendraType,
    pub created_at: DateTime<Utc>,
    pub city_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub kendra_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Headcounts for the three weekly activities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub yuva: i32,
    pub bhavferni: i32,
    pub pravachan: i32,
}

impl Attendance {
    pub fn new(yuva: i32, bhavferni: i32, pravachan: i32) -> Self {
        Self {
            yuva,
            bhavferni,
            pravachan,
        }
    }

    pub fn total(&self) -> i64 {
        i64::from(self.yuva) + i64::from(self.bhavferni) + i64::from(self.pravachan)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub kendra_id: Uuid,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub period_number: i64,
    pub attendance: Attendance,
    pub note: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// A report joined with its kendra, city and (when resolvable) creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub report: Report,
    pub kendra_name: Option<String>,
    pub kendra_type: Option<KendraType>,
    pub city_id: Option<Uuid>,
    pub city_name: Option<String>,
    pub creator: Option<Creator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub kendra_id: Uuid,
    pub week_start: NaiveDate,
    pub attendance: Attendance,
    pub note: Option<String>,
}

/// Fully derived insert payload. Week end and period number are computed by
/// the caller; the gateway stores them as given.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportInsert {
    pub kendra_id: Uuid,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub period_number: i64,
    pub attendance: Attendance,
    pub note: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekAssignment {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub period_number: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportChanges {
    pub yuva: Option<i32>,
    pub bhavferni: Option<i32>,
    pub pravachan: Option<i32>,
    pub note: Option<String>,
    pub week: Option<WeekAssignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportUpdate {
    pub yuva: Option<i32>,
    pub bhavferni: Option<i32>,
    pub pravachan: Option<i32>,
    pub note: Option<String>,
    pub week_start: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCity {
    pub name: String,
    pub pin_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CityUpdate {
    pub name: Option<String>,
    pub pin_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKendra {
    pub name: String,
    pub city_id: Uuid,
    pub kendra_type: KendraType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KendraUpdate {
    pub name: Option<String>,
    pub city_id: Option<Uuid>,
    pub kendra_type: Option<KendraType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub kendra_id: Option<Uuid>,
}

/// Closed set of update payloads, one per entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", content = "fields", rename_all = "snake_case")]
pub enum EntityUpdate {
    City(CityUpdate),
    Kendra(KendraUpdate),
    User(UserUpdate),
    Report(ReportUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "entity", content = "value", rename_all = "snake_case")]
pub enum UpdatedEntity {
    City(City),
    Kendra(Kendra),
    User(User),
    Report(Report),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub city_id: Option<Uuid>,
    pub kendra_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub week_start: NaiveDate,
    pub yuva: i64,
    pub bhavferni: i64,
    pub pravachan: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_reports: usize,
    pub avg_yuva: f64,
    pub avg_bhavferni: f64,
    pub avg_pravachan: f64,
    pub active_kendras: Option<usize>,
    pub last_week_total: Option<i64>,
}
