use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::filter::{DateRange, FilterCapabilities, FilterPlan};
use crate::models::{
    City, CityUpdate, Kendra, KendraType, KendraUpdate, NewCity, NewKendra, Report,
    ReportChanges, ReportInsert, ReportRow, User, UserFilter, UserUpdate,
};

/// Batch size used when a consumer needs every row in scope.
pub const COLLECT_BATCH: usize = 500;

/// Constraints evaluated by the gateway itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCriteria {
    pub scope_kendra: Option<Uuid>,
    pub kendra_id: Option<Uuid>,
    pub kendra_type: Option<KendraType>,
    pub city_id: Option<Uuid>,
    pub date_range: DateRange,
}

/// Rows always come back ordered by week start, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuery {
    pub criteria: ReportCriteria,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportPage {
    pub rows: Vec<ReportRow>,
    pub has_more: bool,
}

impl ReportPage {
    pub fn from_rows(rows: Vec<ReportRow>, limit: usize) -> Self {
        let has_more = limit > 0 && rows.len() == limit;
        Self { rows, has_more }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub kendra_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user: User,
    pub city_id: Option<Uuid>,
}

/// Query and mutation surface of the persistence collaborator.
#[async_trait]
pub trait ReportGateway: Send + Sync {
    fn capabilities(&self) -> FilterCapabilities {
        FilterCapabilities::default()
    }

    async fn query_reports(&self, query: &ReportQuery) -> Result<ReportPage>;

    async fn query_report_by_id(&self, id: Uuid) -> Result<Option<ReportRow>>;

    async fn insert_report(&self, fields: ReportInsert) -> Result<ReportRow>;

    async fn update_report(&self, id: Uuid, changes: ReportChanges) -> Result<Report>;

    async fn delete_report(&self, id: Uuid) -> Result<()>;

    async fn query_kendras(&self, city_id: Option<Uuid>) -> Result<Vec<Kendra>>;

    async fn query_cities(&self) -> Result<Vec<City>>;

    /// `filter.kendra_id` is applied by the gateway; `city_id` is left to the
    /// caller, using [`UserRow::city_id`].
    async fn query_users(&self, filter: UserFilter) -> Result<Vec<UserRow>>;

    async fn query_profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    async fn insert_city(&self, city: NewCity) -> Result<City>;

    async fn update_city(&self, id: Uuid, update: CityUpdate) -> Result<City>;

    async fn delete_city(&self, id: Uuid) -> Result<()>;

    async fn insert_kendra(&self, kendra: NewKendra) -> Result<Kendra>;

    async fn update_kendra(&self, id: Uuid, update: KendraUpdate) -> Result<Kendra>;

    async fn delete_kendra(&self, id: Uuid) -> Result<()>;

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User>;

    async fn delete_user(&self, id: Uuid) -> Result<()>;
}

/// Drains every page of `plan` and applies its residual filter.
pub async fn collect_reports<G>(gateway: &G, plan: &FilterPlan) -> Result<Vec<ReportRow>>
where
    G: ReportGateway + ?Sized,
{
    if plan.empty {
        return Ok(Vec::new());
    }

    let mut rows = Vec::new();
    let mut offset = 0;
    loop {
        let page = gateway
            .query_reports(&plan.query(COLLECT_BATCH, offset))
            .await?;
        let fetched = page.rows.len();
        rows.extend(plan.apply(page.rows));
        offset += fetched;
        if !page.has_more {
            break;
        }
    }

    debug!(rows = rows.len(), "collected reports");
    Ok(rows)
}
