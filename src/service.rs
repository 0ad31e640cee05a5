use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregate::{self, CategoryTotals};
use crate::calendar::{self, Clock, SystemClock};
use crate::error::{ReportError, Result};
use crate::filter::{FilterPlan, ReportFilter, Scope};
use crate::gateway::{collect_reports, ReportGateway};
use crate::models::{
    City, DashboardStats, EntityUpdate, Kendra, KendraType, NewCity, NewKendra, NewReport, Report,
    ReportChanges, ReportInsert, ReportRow, ReportUpdate, Role, TrendPoint, UpdatedEntity, User,
    UserFilter, WeekAssignment,
};
use crate::pagination::{LoadKind, PageOutcome, ReportPager};
use crate::validation;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub trends: Vec<TrendPoint>,
}

pub struct ReportService<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
}

impl<G> Clone for ReportService<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<G: ReportGateway> ReportService<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self::with_clock(gateway, Arc::new(SystemClock))
    }

    pub fn with_clock(gateway: Arc<G>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn scope_for(&self, actor: &User) -> Result<Scope> {
        crate::session::resolve_scope(self.gateway.as_ref(), actor).await
    }

    pub async fn plan(&self, actor: &User, filter: &ReportFilter) -> Result<FilterPlan> {
        let scope = self.scope_for(actor).await?;
        FilterPlan::build(filter, scope, self.gateway.capabilities(), self.today())
    }

    /// Replaces the pager's contents with the first page for `filter`.
    pub async fn reload(
        &self,
        pager: &mut ReportPager,
        actor: &User,
        filter: &ReportFilter,
        kind: LoadKind,
    ) -> Result<PageOutcome> {
        let plan = self.plan(actor, filter).await?;
        pager.reset(self.gateway.as_ref(), plan, kind).await
    }

    pub async fn load_more(&self, pager: &mut ReportPager) -> Result<Option<PageOutcome>> {
        pager.load_more(self.gateway.as_ref()).await
    }

    /// Every report visible to `actor` under `filter`, newest week first.
    pub async fn list_reports(&self, actor: &User, filter: &ReportFilter) -> Result<Vec<ReportRow>> {
        let plan = self.plan(actor, filter).await?;
        collect_reports(self.gateway.as_ref(), &plan).await
    }

    pub async fn report_by_id(&self, actor: &User, id: Uuid) -> Result<Option<ReportRow>> {
        let scope = self.scope_for(actor).await?;
        let row = self.gateway.query_report_by_id(id).await?;
        Ok(row.filter(|row| match scope {
            Scope::Admin => true,
            Scope::Member { kendra_id } => row.report.kendra_id == kendra_id,
            Scope::Unbound => false,
        }))
    }

    pub async fn create_report(&self, actor: &User, report: NewReport) -> Result<ReportRow> {
        validation::validate_new_report(&report)?;
        if !calendar::is_monday(report.week_start) {
            return Err(ReportError::validation(format!(
                "week start {} is not a Monday",
                report.week_start
            )));
        }

        match self.scope_for(actor).await? {
            Scope::Admin => {}
            Scope::Member { kendra_id } if kendra_id == report.kendra_id => {}
            _ => {
                return Err(ReportError::Forbidden(
                    "members can only report for their own kendra".to_string(),
                ))
            }
        }

        if !calendar::is_reportable_week(report.week_start, self.today()) {
            return Err(ReportError::WeekNotReportable {
                week_start: report.week_start,
            });
        }

        let insert = ReportInsert {
            kendra_id: report.kendra_id,
            week_start: report.week_start,
            week_end: calendar::week_end(report.week_start),
            period_number: calendar::period_number(report.week_start),
            attendance: report.attendance,
            note: report.note,
            created_by: actor.id,
        };
        let row = self.gateway.insert_report(insert).await?;
        info!(
            report_id = %row.report.id,
            kendra_id = %row.report.kendra_id,
            week_start = %row.report.week_start,
            period = row.report.period_number,
            "report created"
        );
        Ok(row)
    }

    async fn editable_report(&self, actor: &User, id: Uuid) -> Result<Report> {
        let row = self
            .gateway
            .query_report_by_id(id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("report {id}")))?;
        if actor.role != Role::Admin && actor.id != row.report.created_by {
            return Err(ReportError::Forbidden(
                "only the creator or an admin can change this report".to_string(),
            ));
        }
        Ok(row.report)
    }

    /// Edits bypass the reportable-week window.
    pub async fn update_report(&self, actor: &User, id: Uuid, update: ReportUpdate) -> Result<Report> {
        validation::validate_report_update(&update)?;
        self.editable_report(actor, id).await?;

        let week = match update.week_start {
            Some(week_start) if !calendar::is_monday(week_start) => {
                return Err(ReportError::validation(format!(
                    "week start {week_start} is not a Monday"
                )))
            }
            Some(week_start) => Some(WeekAssignment {
                week_start,
                week_end: calendar::week_end(week_start),
                period_number: calendar::period_number(week_start),
            }),
            None => None,
        };
        let changes = ReportChanges {
            yuva: update.yuva,
            bhavferni: update.bhavferni,
            pravachan: update.pravachan,
            note: update.note,
            week,
        };

        let report = self.gateway.update_report(id, changes).await?;
        info!(report_id = %id, "report updated");
        Ok(report)
    }

    pub async fn delete_report(&self, actor: &User, id: Uuid) -> Result<()> {
        self.editable_report(actor, id).await?;
        self.gateway.delete_report(id).await?;
        info!(report_id = %id, "report deleted");
        Ok(())
    }

    /// Averages follow `filter`; the admin active-kendra count is always
    /// taken over every report.
    pub async fn dashboard(&self, actor: &User, filter: &ReportFilter, weeks: usize) -> Result<Dashboard> {
        let scope = self.scope_for(actor).await?;
        let today = self.today();
        let capabilities = self.gateway.capabilities();
        let gateway = self.gateway.as_ref();
        let plan = FilterPlan::build(filter, scope, capabilities, today)?;

        let (rows, stats) = match scope {
            Scope::Admin if filter.is_empty() => {
                let rows = collect_reports(gateway, &plan).await?;
                let mut stats = aggregate::summarize(rows.iter().map(|r| &r.report));
                stats.active_kendras = Some(aggregate::active_kendras(rows.iter().map(|r| &r.report)));
                (rows, stats)
            }
            Scope::Admin => {
                let fleet = FilterPlan::build(&ReportFilter::default(), scope, capabilities, today)?;
                let (rows, all) = tokio::try_join!(
                    collect_reports(gateway, &plan),
                    collect_reports(gateway, &fleet)
                )?;
                let mut stats = aggregate::summarize(rows.iter().map(|r| &r.report));
                stats.active_kendras = Some(aggregate::active_kendras(all.iter().map(|r| &r.report)));
                (rows, stats)
            }
            Scope::Member { kendra_id } => {
                let previous = calendar::previous_week_start(today);
                let last_week = FilterPlan::build(
                    &ReportFilter {
                        date_from: Some(previous),
                        date_to: Some(previous),
                        ..ReportFilter::default()
                    },
                    scope,
                    capabilities,
                    today,
                )?;
                let (rows, last_week_rows) = tokio::try_join!(
                    collect_reports(gateway, &plan),
                    collect_reports(gateway, &last_week)
                )?;
                let mut stats = aggregate::summarize(rows.iter().map(|r| &r.report));
                stats.last_week_total = Some(aggregate::last_week_total(
                    last_week_rows.iter().map(|r| &r.report),
                    kendra_id,
                    today,
                ));
                (rows, stats)
            }
            Scope::Unbound => {
                let mut stats = aggregate::summarize(std::iter::empty());
                stats.last_week_total = Some(0);
                (Vec::new(), stats)
            }
        };

        if stats.total_reports == 0 {
            debug!(?scope, "dashboard has no reports in scope");
        }
        let trends = aggregate::trend_series(rows.iter().map(|r| &r.report), weeks);
        Ok(Dashboard { stats, trends })
    }

    /// Category sums over every report of one kendra type visible to `actor`.
    pub async fn totals_for_type(&self, actor: &User, kendra_type: KendraType) -> Result<CategoryTotals> {
        let filter = ReportFilter {
            kendra_type: Some(kendra_type),
            ..ReportFilter::default()
        };
        let rows = self.list_reports(actor, &filter).await?;
        Ok(aggregate::category_totals(rows.iter().map(|r| &r.report)))
    }

    pub async fn cities(&self) -> Result<Vec<City>> {
        self.gateway.query_cities().await
    }

    pub async fn kendras(&self, city_id: Option<Uuid>) -> Result<Vec<Kendra>> {
        self.gateway.query_kendras(city_id).await
    }

    /// Loads the city and kendra lists a filter form needs, in parallel.
    pub async fn reference_lists(&self) -> Result<(Vec<City>, Vec<Kendra>)> {
        tokio::try_join!(self.gateway.query_cities(), self.gateway.query_kendras(None))
    }

    pub async fn users(&self, actor: &User, filter: UserFilter) -> Result<Vec<User>> {
        require_admin(actor)?;
        let rows = self.gateway.query_users(filter).await?;
        Ok(rows
            .into_iter()
            .filter(|row| filter.city_id.map_or(true, |id| row.city_id == Some(id)))
            .map(|row| row.user)
            .collect())
    }

    pub async fn create_city(&self, actor: &User, city: NewCity) -> Result<City> {
        require_admin(actor)?;
        validation::validate_new_city(&city)?;
        let city = self.gateway.insert_city(city).await?;
        info!(city_id = %city.id, name = %city.name, "city created");
        Ok(city)
    }

    pub async fn delete_city(&self, actor: &User, id: Uuid) -> Result<()> {
        require_admin(actor)?;
        self.gateway.delete_city(id).await?;
        info!(city_id = %id, "city deleted");
        Ok(())
    }

    pub async fn create_kendra(&self, actor: &User, kendra: NewKendra) -> Result<Kendra> {
        require_admin(actor)?;
        validation::validate_new_kendra(&kendra)?;
        let kendra = self.gateway.insert_kendra(kendra).await?;
        info!(kendra_id = %kendra.id, name = %kendra.name, "kendra created");
        Ok(kendra)
    }

    pub async fn delete_kendra(&self, actor: &User, id: Uuid) -> Result<()> {
        require_admin(actor)?;
        self.gateway.delete_kendra(id).await?;
        info!(kendra_id = %id, "kendra deleted");
        Ok(())
    }

    pub async fn delete_user(&self, actor: &User, id: Uuid) -> Result<()> {
        require_admin(actor)?;
        self.gateway.delete_user(id).await?;
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    pub async fn apply_update(&self, actor: &User, id: Uuid, update: EntityUpdate) -> Result<UpdatedEntity> {
        match update {
            EntityUpdate::Report(update) => {
                Ok(UpdatedEntity::Report(self.update_report(actor, id, update).await?))
            }
            EntityUpdate::City(update) => {
                require_admin(actor)?;
                validation::validate_city_update(&update)?;
                Ok(UpdatedEntity::City(self.gateway.update_city(id, update).await?))
            }
            EntityUpdate::Kendra(update) => {
                require_admin(actor)?;
                validation::validate_kendra_update(&update)?;
                Ok(UpdatedEntity::Kendra(self.gateway.update_kendra(id, update).await?))
            }
            EntityUpdate::User(update) => {
                require_admin(actor)?;
                let current = self
                    .gateway
                    .query_users(UserFilter::default())
                    .await?
                    .into_iter()
                    .find(|row| row.user.id == id)
                    .ok_or_else(|| ReportError::NotFound(format!("user {id}")))?;
                validation::validate_user_update(&current.user, &update)?;
                Ok(UpdatedEntity::User(self.gateway.update_user(id, update).await?))
            }
        }
    }
}

fn require_admin(actor: &User) -> Result<()> {
    if actor.role != Role::Admin {
        return Err(ReportError::Forbidden(format!(
            "{} is not an admin",
            actor.email
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::calendar::FixedClock;
    use crate::filter::FilterCapabilities;
    use crate::memory::InMemoryGateway;
    use crate::models::{Attendance, CityUpdate, UserUpdate};
    use crate::session::tests::user;

    struct Fixture {
        service: ReportService<InMemoryGateway>,
        admin: User,
        member: User,
        vesu: Kendra,
        adajan: Kendra,
        navsari: Kendra,
        surat: City,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // Wednesday; current week starts 2025-06-09, previous 2025-06-02.
    fn today() -> NaiveDate {
        date(2025, 6, 11)
    }

    async fn fixture(capabilities: FilterCapabilities) -> Fixture {
        let gateway = Arc::new(InMemoryGateway::with_capabilities(capabilities));
        let surat = gateway
            .insert_city(NewCity {
                name: "Surat".to_string(),
                pin_code: "395007".to_string(),
            })
            .await
            .unwrap();
        let valsad = gateway
            .insert_city(NewCity {
                name: "Valsad".to_string(),
                pin_code: "396001".to_string(),
            })
            .await
            .unwrap();
        let vesu = gateway
            .insert_kendra(NewKendra {
                name: "Vesu".to_string(),
                city_id: surat.id,
                kendra_type: KendraType::Yuvan,
            })
            .await
            .unwrap();
        let adajan = gateway
            .insert_kendra(NewKendra {
                name: "Adajan".to_string(),
                city_id: surat.id,
                kendra_type: KendraType::Yuvti,
            })
            .await
            .unwrap();
        let navsari = gateway
            .insert_kendra(NewKendra {
                name: "Navsari".to_string(),
                city_id: valsad.id,
                kendra_type: KendraType::Yuvan,
            })
            .await
            .unwrap();

        let admin = user(Role::Admin, None);
        let member = user(Role::Member, Some(vesu.id));
        gateway.seed_user(admin.clone()).await;
        gateway.seed_user(member.clone()).await;

        let service = ReportService::with_clock(gateway, Arc::new(FixedClock(today())));
        Fixture {
            service,
            admin,
            member,
            vesu,
            adajan,
            navsari,
            surat,
        }
    }

    async fn seed(fx: &Fixture, kendra: &Kendra, week_start: NaiveDate, attendance: Attendance, note: Option<&str>) -> Report {
        let report = Report {
            id: Uuid::new_v4(),
            kendra_id: kendra.id,
            week_start,
            week_end: calendar::week_end(week_start),
            period_number: calendar::period_number(week_start),
            attendance,
            note: note.map(str::to_string),
            created_by: fx.admin.id,
            created_at: Utc::now(),
        };
        fx.service.gateway().seed_report(report.clone()).await;
        report
    }

    fn new_report(kendra: &Kendra, week_start: NaiveDate) -> NewReport {
        NewReport {
            kendra_id: kendra.id,
            week_start,
            attendance: Attendance::new(12, 8, 20),
            note: Some("Monthly quiz".to_string()),
        }
    }

    #[tokio::test]
    async fn member_creates_report_for_own_kendra_in_open_week() {
        let fx = fixture(FilterCapabilities::default()).await;
        let row = fx
            .service
            .create_report(&fx.member, new_report(&fx.vesu, date(2025, 6, 2)))
            .await
            .unwrap();

        assert_eq!(row.report.week_end, date(2025, 6, 8));
        assert_eq!(row.report.period_number, calendar::period_number(date(2025, 6, 2)));
        assert_eq!(row.report.created_by, fx.member.id);
        assert_eq!(row.kendra_name.as_deref(), Some("Vesu"));
    }

    #[tokio::test]
    async fn creation_is_gated() {
        let fx = fixture(FilterCapabilities::default()).await;

        let stale = fx
            .service
            .create_report(&fx.admin, new_report(&fx.vesu, date(2025, 5, 26)))
            .await;
        assert!(matches!(stale, Err(ReportError::WeekNotReportable { .. })));

        let tuesday = fx
            .service
            .create_report(&fx.admin, new_report(&fx.vesu, date(2025, 6, 10)))
            .await;
        assert!(matches!(tuesday, Err(ReportError::Validation(_))));

        let foreign = fx
            .service
            .create_report(&fx.member, new_report(&fx.adajan, date(2025, 6, 9)))
            .await;
        assert!(matches!(foreign, Err(ReportError::Forbidden(_))));

        let mut negative = new_report(&fx.vesu, date(2025, 6, 9));
        negative.attendance.pravachan = -2;
        let negative = fx.service.create_report(&fx.member, negative).await;
        assert!(matches!(negative, Err(ReportError::Validation(_))));
    }

    #[tokio::test]
    async fn edits_bypass_week_window_and_recompute_period() {
        let fx = fixture(FilterCapabilities::default()).await;
        let old = seed(&fx, &fx.vesu, date(2025, 3, 3), Attendance::new(1, 1, 1), None).await;

        let updated = fx
            .service
            .update_report(
                &fx.admin,
                old.id,
                ReportUpdate {
                    yuva: Some(30),
                    week_start: Some(date(2025, 3, 10)),
                    ..ReportUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.attendance.yuva, 30);
        assert_eq!(updated.week_end, date(2025, 3, 16));
        assert_eq!(updated.period_number, old.period_number + 1);
        assert_eq!(updated.kendra_id, old.kendra_id);
    }

    #[tokio::test]
    async fn only_creator_or_admin_can_mutate() {
        let fx = fixture(FilterCapabilities::default()).await;
        let report = seed(&fx, &fx.vesu, date(2025, 6, 2), Attendance::new(1, 1, 1), None).await;

        let denied = fx.service.delete_report(&fx.member, report.id).await;
        assert!(matches!(denied, Err(ReportError::Forbidden(_))));

        let own = fx
            .service
            .create_report(&fx.member, new_report(&fx.vesu, date(2025, 6, 9)))
            .await
            .unwrap();
        fx.service.delete_report(&fx.member, own.report.id).await.unwrap();
        fx.service.delete_report(&fx.admin, report.id).await.unwrap();

        let missing = fx.service.delete_report(&fx.admin, report.id).await;
        assert!(matches!(missing, Err(ReportError::NotFound(_))));
    }

    #[tokio::test]
    async fn member_never_sees_other_kendras() {
        let fx = fixture(FilterCapabilities::default()).await;
        seed(&fx, &fx.vesu, date(2025, 6, 2), Attendance::new(1, 1, 1), None).await;
        let foreign = seed(&fx, &fx.adajan, date(2025, 6, 2), Attendance::new(2, 2, 2), None).await;

        let filter = ReportFilter {
            kendra_id: Some(fx.adajan.id),
            ..ReportFilter::default()
        };
        let rows = fx.service.list_reports(&fx.member, &filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|r| r.report.kendra_id == fx.vesu.id));

        assert!(fx
            .service
            .report_by_id(&fx.member, foreign.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn joined_filters_match_with_and_without_pushdown() {
        for capabilities in [FilterCapabilities::default(), FilterCapabilities::full()] {
            let fx = fixture(capabilities).await;
            seed(&fx, &fx.vesu, date(2025, 6, 2), Attendance::default(), None).await;
            seed(&fx, &fx.adajan, date(2025, 6, 2), Attendance::default(), None).await;
            seed(&fx, &fx.navsari, date(2025, 6, 2), Attendance::default(), None).await;

            let by_city = ReportFilter {
                city_id: Some(fx.surat.id),
                ..ReportFilter::default()
            };
            let rows = fx.service.list_reports(&fx.admin, &by_city).await.unwrap();
            assert_eq!(rows.len(), 2);

            let by_type = ReportFilter {
                city_id: Some(fx.surat.id),
                kendra_type: Some(KendraType::Yuvan),
                ..ReportFilter::default()
            };
            let rows = fx.service.list_reports(&fx.admin, &by_type).await.unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].report.kendra_id, fx.vesu.id);
        }
    }

    #[tokio::test]
    async fn fiscal_year_shortcuts_bound_week_start() {
        let fx = fixture(FilterCapabilities::default()).await;
        seed(&fx, &fx.vesu, date(2024, 7, 8), Attendance::default(), None).await;
        seed(&fx, &fx.vesu, date(2024, 7, 15), Attendance::default(), None).await;
        seed(&fx, &fx.vesu, date(2025, 6, 2), Attendance::default(), None).await;

        let current = ReportFilter {
            current_fiscal_year: true,
            ..ReportFilter::default()
        };
        let rows = fx.service.list_reports(&fx.admin, &current).await.unwrap();
        let weeks: Vec<NaiveDate> = rows.iter().map(|r| r.report.week_start).collect();
        assert_eq!(weeks, vec![date(2025, 6, 2), date(2024, 7, 15)]);

        let previous = ReportFilter {
            previous_fiscal_year: true,
            ..ReportFilter::default()
        };
        let rows = fx.service.list_reports(&fx.admin, &previous).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].report.week_start, date(2024, 7, 8));
    }

    #[tokio::test]
    async fn paging_with_search_view() {
        let fx = fixture(FilterCapabilities::default()).await;
        for i in 0..25 {
            let note = if i % 5 == 0 { Some("Guest Speaker") } else { None };
            seed(&fx, &fx.vesu, date(2025, 6, 2) - Duration::weeks(i), Attendance::default(), note).await;
        }
        let mut pager = ReportPager::new(10);
        fx.service
            .reload(&mut pager, &fx.admin, &ReportFilter::default(), LoadKind::Reset)
            .await
            .unwrap();
        assert_eq!(pager.visible("speaker").len(), 2);

        fx.service.load_more(&mut pager).await.unwrap();
        fx.service.load_more(&mut pager).await.unwrap();
        assert_eq!(pager.rows().len(), 25);
        assert_eq!(pager.visible("speaker").len(), 5);
        assert_eq!(pager.visible("vesu").len(), 25);
    }

    #[tokio::test]
    async fn admin_dashboard_counts_fleet_regardless_of_filter() {
        let fx = fixture(FilterCapabilities::default()).await;
        seed(&fx, &fx.vesu, date(2025, 5, 26), Attendance::new(10, 2, 3), None).await;
        seed(&fx, &fx.vesu, date(2025, 6, 2), Attendance::new(20, 4, 5), None).await;
        seed(&fx, &fx.navsari, date(2025, 6, 2), Attendance::new(5, 1, 1), None).await;

        let dashboard = fx
            .service
            .dashboard(&fx.admin, &ReportFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(dashboard.stats.total_reports, 3);
        assert_eq!(dashboard.stats.active_kendras, Some(2));
        assert_eq!(dashboard.stats.avg_yuva, 11.67);
        assert_eq!(dashboard.stats.last_week_total, None);
        assert_eq!(dashboard.trends.len(), 2);
        assert_eq!(dashboard.trends[1].yuva, 25);

        let only_vesu = ReportFilter {
            kendra_id: Some(fx.vesu.id),
            ..ReportFilter::default()
        };
        let dashboard = fx.service.dashboard(&fx.admin, &only_vesu, 5).await.unwrap();
        assert_eq!(dashboard.stats.total_reports, 2);
        assert_eq!(dashboard.stats.avg_yuva, 15.0);
        assert_eq!(dashboard.stats.active_kendras, Some(2));
    }

    #[tokio::test]
    async fn member_dashboard_reports_last_week_total() {
        let fx = fixture(FilterCapabilities::default()).await;
        seed(&fx, &fx.vesu, date(2025, 6, 2), Attendance::new(7, 3, 2), None).await;
        seed(&fx, &fx.adajan, date(2025, 6, 2), Attendance::new(50, 50, 50), None).await;

        let dashboard = fx
            .service
            .dashboard(&fx.member, &ReportFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(dashboard.stats.total_reports, 1);
        assert_eq!(dashboard.stats.last_week_total, Some(12));
        assert_eq!(dashboard.stats.active_kendras, None);

        let fx = fixture(FilterCapabilities::default()).await;
        seed(&fx, &fx.vesu, date(2025, 5, 26), Attendance::new(7, 3, 2), None).await;
        let dashboard = fx
            .service
            .dashboard(&fx.member, &ReportFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(dashboard.stats.last_week_total, Some(0));
    }

    #[tokio::test]
    async fn unbound_member_gets_empty_dashboard() {
        let fx = fixture(FilterCapabilities::default()).await;
        let stray = user(Role::Member, None);
        let dashboard = fx
            .service
            .dashboard(&stray, &ReportFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(dashboard.stats.total_reports, 0);
        assert_eq!(dashboard.stats.avg_yuva, 0.0);
        assert!(dashboard.trends.is_empty());
    }

    #[tokio::test]
    async fn totals_are_grouped_by_kendra_type() {
        let fx = fixture(FilterCapabilities::default()).await;
        seed(&fx, &fx.vesu, date(2025, 5, 26), Attendance::new(10, 2, 3), None).await;
        seed(&fx, &fx.navsari, date(2025, 6, 2), Attendance::new(5, 1, 1), None).await;
        seed(&fx, &fx.adajan, date(2025, 6, 2), Attendance::new(9, 9, 9), None).await;

        let totals = fx
            .service
            .totals_for_type(&fx.admin, KendraType::Yuvan)
            .await
            .unwrap();
        assert_eq!(totals.yuva, 15);
        assert_eq!(totals.grand_total(), 22);
    }

    #[tokio::test]
    async fn reference_updates_require_admin() {
        let fx = fixture(FilterCapabilities::default()).await;
        let rename = EntityUpdate::City(CityUpdate {
            name: Some("Surat City".to_string()),
            pin_code: None,
        });

        let denied = fx.service.apply_update(&fx.member, fx.surat.id, rename.clone()).await;
        assert!(matches!(denied, Err(ReportError::Forbidden(_))));

        let updated = fx.service.apply_update(&fx.admin, fx.surat.id, rename).await.unwrap();
        assert!(matches!(updated, UpdatedEntity::City(city) if city.name == "Surat City"));

        let bad_pin = EntityUpdate::City(CityUpdate {
            name: None,
            pin_code: Some("12".to_string()),
        });
        let err = fx.service.apply_update(&fx.admin, fx.surat.id, bad_pin).await;
        assert!(matches!(err, Err(ReportError::Validation(_))));
    }

    #[tokio::test]
    async fn users_filter_by_city_after_join() {
        let fx = fixture(FilterCapabilities::default()).await;
        let navsari_member = user(Role::Member, Some(fx.navsari.id));
        fx.service.gateway().seed_user(navsari_member.clone()).await;

        let users = fx
            .service
            .users(
                &fx.admin,
                UserFilter {
                    city_id: Some(fx.surat.id),
                    kendra_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, fx.member.id);

        let denied = fx.service.users(&fx.member, UserFilter::default()).await;
        assert!(matches!(denied, Err(ReportError::Forbidden(_))));

        let (cities, kendras) = fx.service.reference_lists().await.unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(kendras.len(), 3);
    }

    #[tokio::test]
    async fn promoting_member_to_admin_drops_kendra_binding() {
        let fx = fixture(FilterCapabilities::default()).await;
        let promote = EntityUpdate::User(UserUpdate {
            role: Some(Role::Admin),
            ..UserUpdate::default()
        });

        let updated = fx
            .service
            .apply_update(&fx.admin, fx.member.id, promote)
            .await
            .unwrap();
        let UpdatedEntity::User(promoted) = updated else {
            panic!("expected a user update");
        };
        assert_eq!(promoted.role, Role::Admin);
        assert_eq!(promoted.kendra_id, None);
        assert_eq!(fx.service.scope_for(&promoted).await.unwrap(), Scope::Admin);

        let rebind = EntityUpdate::User(UserUpdate {
            kendra_id: Some(fx.vesu.id),
            ..UserUpdate::default()
        });
        let err = fx
            .service
            .apply_update(&fx.admin, fx.member.id, rebind)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }
}
