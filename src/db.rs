use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar;
use crate::error::{ReportError, Result};
use crate::filter::FilterCapabilities;
use crate::gateway::{Profile, ReportGateway, ReportPage, ReportQuery, UserRow};
use crate::models::{
    Attendance, City, CityUpdate, Creator, Kendra, KendraType, KendraUpdate, NewCity, NewKendra,
    Report, ReportChanges, ReportInsert, ReportRow, Role, User, UserFilter, UserUpdate,
};

const REPORT_COLUMNS: &str = "r.id, r.kendra_id, r.week_start_date, r.week_end_date, r.pushp_no, \
     r.yuva_kendra_attendance, r.bhavferni_attendance, r.pravachan_attendance, \
     r.description, r.created_by, r.created_at";

const REPORT_SELECT: &str = "SELECT r.id, r.kendra_id, r.week_start_date, r.week_end_date, r.pushp_no, \
     r.yuva_kendra_attendance, r.bhavferni_attendance, r.pravachan_attendance, \
     r.description, r.created_by, r.created_at, \
     k.kendra_name, k.kendra_type, c.id AS city_id, c.city_name, \
     p.name AS creator_name, p.email AS creator_email \
     FROM kendra_reports.weekly_reports r \
     LEFT JOIN kendra_reports.kendras k ON k.id = r.kendra_id \
     LEFT JOIN kendra_reports.cities c ON c.id = k.city_id \
     LEFT JOIN kendra_reports.profiles p ON p.id = r.created_by";

const KENDRA_SELECT: &str = "SELECT k.id, k.kendra_name, k.city_id, k.kendra_type, k.created_at, c.city_name \
     FROM kendra_reports.kendras k \
     LEFT JOIN kendra_reports.cities c ON c.id = k.city_id";

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn report_from_row(row: &PgRow) -> Result<Report> {
    Ok(Report {
        id: row.try_get("id")?,
        kendra_id: row.try_get("kendra_id")?,
        week_start: row.try_get("week_start_date")?,
        week_end: row.try_get("week_end_date")?,
        period_number: row.try_get("pushp_no")?,
        attendance: Attendance {
            yuva: row.try_get("yuva_kendra_attendance")?,
            bhavferni: row.try_get("bhavferni_attendance")?,
            pravachan: row.try_get("pravachan_attendance")?,
        },
        note: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_kendra_type(raw: Option<String>) -> Result<Option<KendraType>> {
    raw.map(|value| value.parse()).transpose()
}

fn report_row_from_row(row: &PgRow) -> Result<ReportRow> {
    let report = report_from_row(row)?;
    let creator_name: Option<String> = row.try_get("creator_name")?;
    let creator_email: Option<String> = row.try_get("creator_email")?;
    let creator = match (creator_name, creator_email) {
        (None, None) => None,
        (name, email) => Some(Creator {
            id: report.created_by,
            name: name.unwrap_or_default(),
            email: email.unwrap_or_default(),
        }),
    };

    Ok(ReportRow {
        kendra_name: row.try_get("kendra_name")?,
        kendra_type: parse_kendra_type(row.try_get("kendra_type")?)?,
        city_id: row.try_get("city_id")?,
        city_name: row.try_get("city_name")?,
        creator,
        report,
    })
}

fn city_from_row(row: &PgRow) -> Result<City> {
    Ok(City {
        id: row.try_get("id")?,
        name: row.try_get("city_name")?,
        pin_code: row.try_get("pin_code")?,
        created_at: row.try_get("created_at")?,
    })
}

fn kendra_from_row(row: &PgRow) -> Result<Kendra> {
    let kendra_type: String = row.try_get("kendra_type")?;
    Ok(Kendra {
        id: row.try_get("id")?,
        name: row.try_get("kendra_name")?,
        city_id: row.try_get("city_id")?,
        kendra_type: kendra_type.parse()?,
        created_at: row.try_get("created_at")?,
        city_name: row.try_get("city_name")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get::<Option<String>, _>("email")?.unwrap_or_default(),
        name: row.try_get::<Option<String>, _>("name")?.unwrap_or_default(),
        role: role.parse()?,
        kendra_id: row.try_get("kendra_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Postgres-backed gateway. Every relational filter is evaluated in SQL.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn kendra_by_id(&self, id: Uuid) -> Result<Kendra> {
        let mut query = QueryBuilder::<Postgres>::new(KENDRA_SELECT);
        query.push(" WHERE k.id = ").push_bind(id);
        let row = query
            .build()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("kendra {id}")))?;
        kendra_from_row(&row)
    }
}

#[async_trait]
impl ReportGateway for PgGateway {
    fn capabilities(&self) -> FilterCapabilities {
        FilterCapabilities::full()
    }

    async fn query_reports(&self, query: &ReportQuery) -> Result<ReportPage> {
        let criteria = &query.criteria;
        let mut sql = QueryBuilder::<Postgres>::new(REPORT_SELECT);
        sql.push(" WHERE TRUE");

        if let Some(kendra_id) = criteria.scope_kendra {
            sql.push(" AND r.kendra_id = ").push_bind(kendra_id);
        }
        if let Some(kendra_id) = criteria.kendra_id {
            sql.push(" AND r.kendra_id = ").push_bind(kendra_id);
        }
        if let Some(kendra_type) = criteria.kendra_type {
            sql.push(" AND k.kendra_type = ").push_bind(kendra_type.as_str());
        }
        if let Some(city_id) = criteria.city_id {
            sql.push(" AND k.city_id = ").push_bind(city_id);
        }
        if let Some(from) = criteria.date_range.from {
            sql.push(" AND r.week_start_date >= ").push_bind(from);
        }
        if let Some(to) = criteria.date_range.to {
            sql.push(" AND r.week_start_date <= ").push_bind(to);
        }

        sql.push(" ORDER BY r.week_start_date DESC, r.created_at DESC, r.id")
            .push(" LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let records = sql.build().fetch_all(&self.pool).await?;
        debug!(
            rows = records.len(),
            limit = query.limit,
            offset = query.offset,
            "queried weekly reports"
        );
        let rows = records
            .iter()
            .map(report_row_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(ReportPage::from_rows(rows, query.limit))
    }

    async fn query_report_by_id(&self, id: Uuid) -> Result<Option<ReportRow>> {
        let mut sql = QueryBuilder::<Postgres>::new(REPORT_SELECT);
        sql.push(" WHERE r.id = ").push_bind(id);
        let row = sql.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(report_row_from_row).transpose()
    }

    async fn insert_report(&self, fields: ReportInsert) -> Result<ReportRow> {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO kendra_reports.weekly_reports
            (id, kendra_id, week_start_date, week_end_date, pushp_no,
             yuva_kendra_attendance, bhavferni_attendance, pravachan_attendance,
             description, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(fields.kendra_id)
        .bind(fields.week_start)
        .bind(fields.week_end)
        .bind(fields.period_number)
        .bind(fields.attendance.yuva)
        .bind(fields.attendance.bhavferni)
        .bind(fields.attendance.pravachan)
        .bind(&fields.note)
        .bind(fields.created_by)
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;

        self.query_report_by_id(id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("report {id}")))
    }

    async fn update_report(&self, id: Uuid, changes: ReportChanges) -> Result<Report> {
        let mut sql = QueryBuilder::<Postgres>::new("UPDATE kendra_reports.weekly_reports r SET ");
        let mut set = sql.separated(", ");
        // Keeps the statement valid when nothing changes.
        set.push("id = id");
        if let Some(yuva) = changes.yuva {
            set.push("yuva_kendra_attendance = ").push_bind_unseparated(yuva);
        }
        if let Some(bhavferni) = changes.bhavferni {
            set.push("bhavferni_attendance = ").push_bind_unseparated(bhavferni);
        }
        if let Some(pravachan) = changes.pravachan {
            set.push("pravachan_attendance = ").push_bind_unseparated(pravachan);
        }
        if let Some(note) = changes.note {
            set.push("description = ").push_bind_unseparated(note);
        }
        if let Some(week) = changes.week {
            set.push("week_start_date = ").push_bind_unseparated(week.week_start);
            set.push("week_end_date = ").push_bind_unseparated(week.week_end);
            set.push("pushp_no = ").push_bind_unseparated(week.period_number);
        }
        sql.push(" WHERE r.id = ").push_bind(id);
        sql.push(" RETURNING ").push(REPORT_COLUMNS);

        let row = sql
            .build()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("report {id}")))?;
        report_from_row(&row)
    }

    async fn delete_report(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM kendra_reports.weekly_reports WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_kendras(&self, city_id: Option<Uuid>) -> Result<Vec<Kendra>> {
        let mut sql = QueryBuilder::<Postgres>::new(KENDRA_SELECT);
        if let Some(city_id) = city_id {
            sql.push(" WHERE k.city_id = ").push_bind(city_id);
        }
        sql.push(" ORDER BY k.kendra_name ASC");
        let rows = sql.build().fetch_all(&self.pool).await?;
        rows.iter().map(kendra_from_row).collect()
    }

    async fn query_cities(&self) -> Result<Vec<City>> {
        let rows = sqlx::query(
            "SELECT id, city_name, pin_code, created_at FROM kendra_reports.cities ORDER BY city_name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(city_from_row).collect()
    }

    async fn query_users(&self, filter: UserFilter) -> Result<Vec<UserRow>> {
        let mut sql = QueryBuilder::<Postgres>::new(
            "SELECT p.id, p.email, p.name, p.role, p.kendra_id, p.created_at, k.city_id \
             FROM kendra_reports.profiles p \
             LEFT JOIN kendra_reports.kendras k ON k.id = p.kendra_id",
        );
        if let Some(kendra_id) = filter.kendra_id {
            sql.push(" WHERE p.kendra_id = ").push_bind(kendra_id);
        }
        sql.push(" ORDER BY p.name ASC");
        let rows = sql.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<UserRow> {
                Ok(UserRow {
                    user: user_from_row(row)?,
                    city_id: row.try_get("city_id")?,
                })
            })
            .collect()
    }

    async fn query_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT kendra_id FROM kendra_reports.profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<Profile> {
            Ok(Profile {
                kendra_id: row.try_get("kendra_id")?,
            })
        })
        .transpose()
    }

    async fn insert_city(&self, city: NewCity) -> Result<City> {
        let row = sqlx::query(
            r#"
            INSERT INTO kendra_reports.cities (id, city_name, pin_code)
            VALUES ($1, $2, $3)
            RETURNING id, city_name, pin_code, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&city.name)
        .bind(&city.pin_code)
        .fetch_one(&self.pool)
        .await?;
        city_from_row(&row)
    }

    async fn update_city(&self, id: Uuid, update: CityUpdate) -> Result<City> {
        let row = sqlx::query(
            r#"
            UPDATE kendra_reports.cities
            SET city_name = COALESCE($2, city_name), pin_code = COALESCE($3, pin_code)
            WHERE id = $1
            RETURNING id, city_name, pin_code, created_at
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.pin_code)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ReportError::NotFound(format!("city {id}")))?;
        city_from_row(&row)
    }

    async fn delete_city(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM kendra_reports.cities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_kendra(&self, kendra: NewKendra) -> Result<Kendra> {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO kendra_reports.kendras (id, kendra_name, city_id, kendra_type)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&kendra.name)
        .bind(kendra.city_id)
        .bind(kendra.kendra_type.as_str())
        .fetch_one(&self.pool)
        .await?
        .try_get("id")?;
        self.kendra_by_id(id).await
    }

    async fn update_kendra(&self, id: Uuid, update: KendraUpdate) -> Result<Kendra> {
        let result = sqlx::query(
            r#"
            UPDATE kendra_reports.kendras
            SET kendra_name = COALESCE($2, kendra_name),
                city_id = COALESCE($3, city_id),
                kendra_type = COALESCE($4, kendra_type)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.city_id)
        .bind(update.kendra_type.map(|t| t.as_str()))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ReportError::NotFound(format!("kendra {id}")));
        }
        self.kendra_by_id(id).await
    }

    async fn delete_kendra(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM kendra_reports.kendras WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_user(&self, id: Uuid, update: UserUpdate) -> Result<User> {
        let row = sqlx::query(
            r#"
            UPDATE kendra_reports.profiles
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                kendra_id = CASE
                    WHEN COALESCE($4, role) = 'admin' THEN NULL
                    ELSE COALESCE($5, kendra_id)
                END
            WHERE id = $1
            RETURNING id, email, name, role, kendra_id, created_at
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.email)
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.kendra_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ReportError::NotFound(format!("user {id}")))?;
        user_from_row(&row)
    }

    async fn delete_user(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM kendra_reports.profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn upsert_city(pool: &PgPool, name: &str, pin_code: &str) -> Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO kendra_reports.cities (id, city_name, pin_code)
        VALUES ($1, $2, $3)
        ON CONFLICT (city_name) DO UPDATE SET pin_code = EXCLUDED.pin_code
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(pin_code)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

async fn upsert_kendra(pool: &PgPool, name: &str, city_id: Uuid, kendra_type: KendraType) -> Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO kendra_reports.kendras (id, kendra_name, city_id, kendra_type)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (city_id, kendra_name) DO UPDATE SET kendra_type = EXCLUDED.kendra_type
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(city_id)
    .bind(kendra_type.as_str())
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

async fn insert_keyed_report(
    pool: &PgPool,
    source_key: &str,
    kendra_id: Uuid,
    week_start: NaiveDate,
    attendance: Attendance,
    note: Option<&str>,
    created_by: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO kendra_reports.weekly_reports
        (id, kendra_id, week_start_date, week_end_date, pushp_no,
         yuva_kendra_attendance, bhavferni_attendance, pravachan_attendance,
         description, created_by, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(kendra_id)
    .bind(week_start)
    .bind(calendar::week_end(week_start))
    .bind(calendar::period_number(week_start))
    .bind(attendance.yuva)
    .bind(attendance.bhavferni)
    .bind(attendance.pravachan)
    .bind(note)
    .bind(created_by)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let surat = upsert_city(pool, "Surat", "395007").await?;
    let valsad = upsert_city(pool, "Valsad", "396001").await?;

    let kendras = vec![
        ("Vesu", surat, KendraType::Yuvan),
        ("Adajan", surat, KendraType::Yuvti),
        ("Tithal Road", valsad, KendraType::Yuvan),
    ];
    let mut kendra_ids = Vec::new();
    for (name, city_id, kendra_type) in kendras {
        kendra_ids.push(upsert_kendra(pool, name, city_id, kendra_type).await?);
    }

    let admin_id = Uuid::parse_str("6f1c2a64-3c1e-4c55-9a37-0d8a1b2f4e01")?;
    let member_id = Uuid::parse_str("b4e9d2c7-58a1-4f0e-8d4b-2a6c9e7f1d02")?;
    let vesu = *kendra_ids.first().context("seed kendras missing")?;
    let profiles = vec![
        (admin_id, "Network Admin", "admin@kendra.example.org", Role::Admin, None),
        (member_id, "Vesu Coordinator", "vesu@kendra.example.org", Role::Member, Some(vesu)),
    ];
    for (id, name, email, role, kendra_id) in profiles {
        sqlx::query(
            r#"
            INSERT INTO kendra_reports.profiles (id, name, email, role, kendra_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email,
                role = EXCLUDED.role, kendra_id = EXCLUDED.kendra_id
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .bind(kendra_id)
        .execute(pool)
        .await?;
    }

    let latest = calendar::previous_week_start(today);
    for (index, kendra_id) in kendra_ids.iter().enumerate() {
        for week in 0..6i64 {
            let week_start = latest - Duration::weeks(week);
            let offset = (index as i32) * 3 + week as i32;
            insert_keyed_report(
                pool,
                &format!("seed-{kendra_id}-{week_start}"),
                *kendra_id,
                week_start,
                Attendance::new(18 + offset, 9 + offset / 2, 25 - offset),
                None,
                admin_id,
            )
            .await?;
        }
    }

    info!(kendras = kendra_ids.len(), "seed data inserted");
    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    created_by: Uuid,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        city_name: String,
        pin_code: String,
        kendra_name: String,
        kendra_type: String,
        week_start_date: String,
        yuva_kendra_attendance: i32,
        bhavferni_attendance: i32,
        pravachan_attendance: i32,
        description: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let week_start = calendar::parse_date(&row.week_start_date)
            .with_context(|| format!("record {}", line + 1))?;
        if !calendar::is_monday(week_start) {
            anyhow::bail!("record {}: week start {week_start} is not a Monday", line + 1);
        }
        let attendance = Attendance::new(
            row.yuva_kendra_attendance,
            row.bhavferni_attendance,
            row.pravachan_attendance,
        );
        crate::validation::validate_attendance(&attendance)
            .with_context(|| format!("record {}", line + 1))?;
        let kendra_type: KendraType = row
            .kendra_type
            .parse()
            .with_context(|| format!("record {}", line + 1))?;

        let city_id = upsert_city(pool, &row.city_name, &row.pin_code).await?;
        let kendra_id = upsert_kendra(pool, &row.kendra_name, city_id, kendra_type).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let note = row.description.as_deref().filter(|d| !d.trim().is_empty());

        if insert_keyed_report(
            pool,
            &source_key,
            kendra_id,
            week_start,
            attendance,
            note,
            created_by,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}
