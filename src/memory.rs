//! In-process [`ReportGateway`] test double. Built for this crate's tests and,
//! behind the `test-util` feature, for downstream ones.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::filter::FilterCapabilities;
use crate::gateway::{Profile, ReportCriteria, ReportGateway, ReportPage, ReportQuery, UserRow};
use crate::models::{
    City, CityUpdate, Creator, Kendra, KendraUpdate, NewCity, NewKendra, Report, ReportChanges,
    ReportInsert, ReportRow, Role, User, UserFilter, UserUpdate,
};

#[derive(Default)]
struct Tables {
    cities: Vec<City>,
    kendras: Vec<Kendra>,
    users: Vec<User>,
    reports: Vec<Report>,
}

impl Tables {
    fn kendra(&self, id: Uuid) -> Option<&Kendra> {
        self.kendras.iter().find(|k| k.id == id)
    }

    fn city(&self, id: Uuid) -> Option<&City> {
        self.cities.iter().find(|c| c.id == id)
    }

    fn join(&self, report: &Report) -> ReportRow {
        let kendra = self.kendra(report.kendra_id);
        let city = kendra.and_then(|k| self.city(k.city_id));
        let creator = self
            .users
            .iter()
            .find(|u| u.id == report.created_by)
            .map(|u| Creator {
                id: u.id,
                name: u.name.clone(),
                email: u.email.clone(),
            });
        ReportRow {
            report: report.clone(),
            kendra_name: kendra.map(|k| k.name.clone()),
            kendra_type: kendra.map(|k| k.kendra_type),
            city_id: city.map(|c| c.id),
            city_name: city.map(|c| c.name.clone()),
            creator,
        }
    }

    fn matches(&self, report: &Report, criteria: &ReportCriteria, capabilities: FilterCapabilities) -> bool {
        let kendra = self.kendra(report.kendra_id);
        if criteria.scope_kendra.is_some_and(|id| id != report.kendra_id) {
            return false;
        }
        if capabilities.kendra_id && criteria.kendra_id.is_some_and(|id| id != report.kendra_id) {
            return false;
        }
        if capabilities.kendra_type {
            if let Some(kendra_type) = criteria.kendra_type {
                if kendra.map(|k| k.kendra_type) != Some(kendra_type) {
                    return false;
                }
            }
        }
        if capabilities.city_id {
            if let Some(city_id) = criteria.city_id {
                if kendra.map(|k| k.city_id) != Some(city_id) {
                    return false;
                }
            }
        }
        criteria.date_range.contains(report.week_start)
    }

    fn with_city_name(&self, mut kendra: Kendra) -> Kendra {
        kendra.city_name = self.city(kendra.city_id).map(|c| c.name.clone());
        kendra
    }
}

pub struct InMemoryGateway {
    tables: Mutex<Tables>,
    capabilities: FilterCapabilities,
    fail_next: AtomicBool,
    report_queries: AtomicU64,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::with_capabilities(FilterCapabilities::default())
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: FilterCapabilities) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            capabilities,
            fail_next: AtomicBool::new(false),
            report_queries: AtomicU64::new(0),
        }
    }

    /// Makes the next report query fail as if the backend were unreachable.
    pub fn fail_next_query(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn report_queries(&self) -> u64 {
        self.report_queries.load(Ordering::Relaxed)
    }

    pub async fn seed_user(&self, user: User) {
        self.tables.lock().await.users.push(user);
    }

    /// Stores a fully formed report, keeping its id and timestamps.
    pub async fn seed_report(&self, report: Report) {
        self.tables.lock().await.reports.push(report);
    }

    fn take_failure(&self) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ReportError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportGateway for InMemoryGateway {
    fn capabilities(&self) -> FilterCapabilities {
        self.capabilities
    }

    async fn query_reports(&self, query: &ReportQuery) -> Result<ReportPage> {
        self.report_queries.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;

        let tables = self.tables.lock().await;
        let mut matching: Vec<&Report> = tables
            .reports
            .iter()
            .filter(|r| tables.matches(r, &query.criteria, self.capabilities))
            .collect();
        matching.sort_by(|a, b| {
            b.week_start
                .cmp(&a.week_start)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let rows = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|r| tables.join(r))
            .collect();
        Ok(ReportPage::from_rows(rows, query.limit))
    }

    async fn query_report_by_id(&self, id: Uuid) -> Result<Option<ReportRow>> {
        self.take_failure()?;
        let tables = self.tables.lock().await;
        Ok(tables.reports.iter().find(|r| r.id == id).map(|r| tables.join(r)))
    }

    async fn insert_report(&self, fields: ReportInsert) -> Result<ReportRow> {
        let mut tables = self.tables.lock().await;
        if tables.kendra(fields.kendra_id).is_none() {
            return Err(ReportError::NotFound(format!("kendra {}", fields.kendra_id)));
        }
        let report = Report {
            id: Uuid::new_v4(),
            kendra_id: fields.kendra_id,
            week_start: fields.week_start,
            week_end: fields.week_end,
            period_number: fields.period_number,
            attendance: fields.attendance,
            note: fields.note,
            created_by: fields.created_by,
            created_at: Utc::now(),
        };
        let row = tables.join(&report);
        tables.reports.push(report);
        Ok(row)
    }

    async fn update_report(&self, id: Uuid, changes: ReportChanges) -> Result<Report> {
        let mut tables = self.tables.lock().await;
        let report = tables
            .reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ReportError::NotFound(format!("report {id}")))?;
        if let Some(yuva) = changes.yuva {
            report.attendance.yuva = yuva;
        }
        if let Some(bhavferni) = changes.bhavferni {
            report.attendance.bhavferni = bhavferni;
        }
        if let Some(pravachan) = changes.pravachan {
            report.attendance.pravachan = pravachan;
        }
        if let Some(note) = changes.note {
            report.note = Some(note);
        }
        if let Some(week) = changes.week {
            report.week_start = week.week_start;
            report.week_end = week.week_end;
            report.period_number = week.period_number;
        }
        Ok(report.clone())
    }

    async fn delete_report(&self, id: Uuid) -> Result<()> {
        self.tables.lock().await.reports.retain(|r| r.id != id);
        Ok(())
    }

    async fn query_kendras(&self, city_id: Option<Uuid>) -> Result<Vec<Kendra>> {
        let tables = self.tables.lock().await;
        let mut kendras: Vec<Kendra> = tables
            .kendras
            .iter()
            .filter(|k| city_id.map_or(true, |id| k.city_id == id))
            .cloned()
            .map(|k| tables.with_city_name(k))
            .collect();
        kendras.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(kendras)
    }

    async fn query_cities(&self) -> Result<Vec<City>> {
        let mut cities = self.tables.lock().await.cities.clone();
        cities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cities)
    }

    async fn query_users(&self, filter: UserFilter) -> Result<Vec<UserRow>> {
        let tables = self.tables.lock().await;
        let mut users: Vec<UserRow> = tables
            .users
            .iter()
            .filter(|u| filter.kendra_id.map_or(true, |id| u.kendra_id == Some(id)))
            .map(|u| UserRow {
                user: u.clone(),
                city_id: u
                    .kendra_id
                    .and_then(|id| tables.kendra(id))
                    .map(|k| k.city_id),
            })
            .collect();
        users.sort_by(|a, b| a.user.name.cmp(&b.user.name));
        Ok(users)
    }

    async fn query_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| Profile {
                kendra_id: u.kendra_id,
            }))
    }

    async fn insert_city(&self, city: NewCity) -> Result<City> {
        let city = City {
            id: Uuid::new_v4(),
            name: city.name,
            pin_code: city.pin_code,
            created_at: Utc::now(),
        };
        self.tables.lock().await.cities.push(city.clone());
        Ok(city)
    }

    async fn update_city(&self, id: Uuid, update: CityUpdate) -> Result<City> {
        let mut tables = self.tables.lock().await;
        let city = tables
            .cities
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ReportError::NotFound(format!("city {id}")))?;
        if let Some(name) = update.name {
            city.name = name;
        }
        if let Some(pin_code) = update.pin_code {
            city.pin_code = pin_code;
        }
        Ok(city.clone())
    }

    async fn delete_city(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.kendras.iter().any(|k| k.city_id == id) {
            return Err(ReportError::validation(format!("city {id} still has kendras")));
        }
        tables.cities.retain(|c| c.id != id);
        Ok(())
    }

    async fn insert_kendra(&self, kendra: NewKendra) -> Result<Kendra> {
        let mut tables = self.tables.lock().await;
        if tables.city(kendra.city_id).is_none() {
            return Err(ReportError::NotFound(format!("city {}", kendra.city_id)));
        }
        let kendra = Kendra {
            id: Uuid::new_v4(),
            name: kendra.name,
            city_id: kendra.city_id,
            kendra_type: kendra.kendra_type,
            created_at: Utc::now(),
            city_name: None,
        };
        tables.kendras.push(kendra.clone());
        Ok(tables.with_city_name(kendra))
    }

    async fn update_kendra(&self, id: Uuid, update: KendraUpdate) -> Result<Kendra> {
        let mut tables = self.tables.lock().await;
        let kendra = tables
            .kendras
            .iter_mut()
            .find(|k| k.id == id)
            .ok_or_else(|| ReportError::NotFound(format!("kendra {id}")))?;
        if let Some(name) = update.name {
            kendra.name = name;
        }
        if let Some(city_id) = update.city_id {
            kendra.city_id = city_id;
        }
        if let Some(kendra_type) = update.kendra_type {
            kendra.kendra_type = kendra_type;
        }
        let kendra = kendra.clone();
        Ok(tables.with_city_name(kendra))
    }

    async fn delete_kendra(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.reports.iter().any(|r| r.kendra_id == id) {
            return Err(ReportError::validation(format!("kendra {id} still has reports")));
        }
        tables.kendras.retain(|k| k.id != id);
        Ok(())
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| ReportError::NotFound(format!("user {id}")))?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(kendra_id) = update.kendra_id {
            user.kendra_id = Some(kendra_id);
        }
        if user.role == Role::Admin {
            user.kendra_id = None;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        self.tables.lock().await.users.retain(|u| u.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KendraType;

    #[tokio::test]
    async fn referenced_cities_cannot_be_deleted() {
        let gateway = InMemoryGateway::new();
        let city = gateway
            .insert_city(NewCity {
                name: "Surat".to_string(),
                pin_code: "395007".to_string(),
            })
            .await
            .unwrap();
        let kendra = gateway
            .insert_kendra(NewKendra {
                name: "Vesu".to_string(),
                city_id: city.id,
                kendra_type: KendraType::Yuvan,
            })
            .await
            .unwrap();

        let err = gateway.delete_city(city.id).await.unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));

        gateway.delete_kendra(kendra.id).await.unwrap();
        gateway.delete_city(city.id).await.unwrap();
        assert!(gateway.query_cities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_next_query() {
        let gateway = InMemoryGateway::new();
        let query = ReportQuery {
            criteria: ReportCriteria::default(),
            limit: 10,
            offset: 0,
        };
        gateway.fail_next_query();
        assert!(gateway.query_reports(&query).await.unwrap_err().is_gateway());
        assert!(gateway.query_reports(&query).await.unwrap().rows.is_empty());
        assert_eq!(gateway.report_queries(), 2);
    }
}
