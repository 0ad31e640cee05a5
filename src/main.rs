use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use kendra_reports::calendar;
use kendra_reports::config::BackendConfig;
use kendra_reports::db::{self, PgGateway};
use kendra_reports::export;
use kendra_reports::gateway::ReportGateway;
use kendra_reports::models::{Attendance, EntityUpdate, KendraType, NewReport, User, UserFilter};
use kendra_reports::session::{self, AuthEvent};
use kendra_reports::summary;
use kendra_reports::{LoadKind, ReportFilter, ReportPager, ReportService, Scope};

#[derive(Parser)]
#[command(name = "kendra-reports")]
#[command(about = "Weekly attendance reports for kendras and cities", long_about = None)]
struct Cli {
    /// Profile id to act as; required for report commands
    #[arg(long, global = true)]
    as_user: Option<Uuid>,
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    kendra: Option<Uuid>,
    #[arg(long)]
    city: Option<Uuid>,
    #[arg(long = "type")]
    kendra_type: Option<KendraType>,
    #[arg(long, value_parser = parse_date_arg)]
    from: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date_arg)]
    to: Option<NaiveDate>,
    #[arg(long)]
    current_fy: bool,
    #[arg(long)]
    previous_fy: bool,
}

impl FilterArgs {
    fn to_filter(&self) -> ReportFilter {
        ReportFilter {
            kendra_id: self.kendra,
            city_id: self.city,
            kendra_type: self.kendra_type,
            date_from: self.from,
            date_to: self.to,
            current_fiscal_year: self.current_fy,
            previous_fiscal_year: self.previous_fy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample cities, kendras, profiles and reports
    Seed,
    /// Import reports from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        created_by: Uuid,
    },
    /// List reports page by page
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        search: Option<String>,
        /// Stop after this many pages
        #[arg(long)]
        pages: Option<usize>,
    },
    /// Summary statistics and weekly trend
    Dashboard {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = kendra_reports::aggregate::DEFAULT_TREND_WEEKS)]
        weeks: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export reports to CSV
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Attendance totals for one kendra type
    Totals {
        #[arg(long = "type")]
        kendra_type: KendraType,
    },
    /// Submit a weekly report
    #[command(group(
        ArgGroup::new("week")
            .args(["week_start", "last_week"])
            .required(true)
            .multiple(false)
    ))]
    Create {
        #[arg(long)]
        kendra: Uuid,
        #[arg(long, value_parser = parse_date_arg)]
        week_start: Option<NaiveDate>,
        /// Report for the previous week
        #[arg(long)]
        last_week: bool,
        #[arg(long, default_value_t = 0)]
        yuva: i32,
        #[arg(long, default_value_t = 0)]
        bhavferni: i32,
        #[arg(long, default_value_t = 0)]
        pravachan: i32,
        #[arg(long)]
        note: Option<String>,
    },
    /// Apply a JSON update, e.g. {"entity":"city","fields":{"pin_code":"395009"}}
    Update {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        fields: String,
    },
    /// Delete a report
    Delete {
        #[arg(long)]
        id: Uuid,
    },
    /// List cities
    Cities,
    /// List kendras, optionally for one city
    Kendras {
        #[arg(long)]
        city: Option<Uuid>,
    },
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    calendar::parse_date(value).map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Restores the session for `user_id` through the auth state machine.
async fn sign_in(gateway: &PgGateway, user_id: Option<Uuid>) -> anyhow::Result<User> {
    let user_id = user_id.context("--as-user is required for this command")?;
    let (events, event_rx, state_tx, state_rx) = session::auth_channel();
    let driver = tokio::spawn(session::run_auth_driver(event_rx, state_tx));

    events.send(AuthEvent::SignInStarted).await?;
    let profile = gateway
        .query_users(UserFilter::default())
        .await?
        .into_iter()
        .find(|row| row.user.id == user_id);
    let event = match profile {
        Some(row) => AuthEvent::SignedIn(row.user),
        None => AuthEvent::SignInFailed(format!("no profile for {user_id}")),
    };
    events.send(event).await?;
    drop(events);
    driver.await?;

    let user = state_rx.borrow().user()?.clone();
    Ok(user)
}

async fn scope_label(service: &ReportService<PgGateway>, actor: &User) -> anyhow::Result<String> {
    let label = match service.scope_for(actor).await? {
        Scope::Admin => "all kendras".to_string(),
        Scope::Member { kendra_id } => service
            .kendras(None)
            .await?
            .into_iter()
            .find(|k| k.id == kendra_id)
            .map(|k| k.name)
            .unwrap_or_else(|| kendra_id.to_string()),
        Scope::Unbound => "no kendra".to_string(),
    };
    Ok(label)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = BackendConfig::from_env().context("backend configuration is incomplete")?;
    let pool = config
        .connect()
        .await
        .context("failed to connect to Postgres")?;
    info!(max_connections = config.max_connections, "connected to backend");

    let gateway = Arc::new(PgGateway::new(pool));
    let service = ReportService::new(Arc::clone(&gateway));

    match cli.command {
        Commands::InitDb => {
            db::init_db(gateway.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(gateway.pool(), service.today()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv, created_by } => {
            let inserted = db::import_csv(gateway.pool(), &csv, created_by).await?;
            println!("Inserted {inserted} reports from {}.", csv.display());
        }
        Commands::List {
            filter,
            search,
            pages,
        } => {
            let actor = sign_in(&gateway, cli.as_user).await?;
            let mut pager = ReportPager::new(config.page_size);
            service
                .reload(&mut pager, &actor, &filter.to_filter(), LoadKind::Reset)
                .await?;
            while pages.map_or(true, |max| pager.pages_loaded() < max)
                && service.load_more(&mut pager).await?.is_some()
            {}

            let rows = pager.visible(search.as_deref().unwrap_or(""));
            if cli.json {
                return print_json(&rows);
            }
            if rows.is_empty() {
                println!("No reports match this filter.");
                return Ok(());
            }
            for row in &rows {
                let report = &row.report;
                println!(
                    "- {} ({}) week of {} pushp {}: yuva {}, bhavferni {}, pravachan {} [{}]",
                    row.kendra_name.as_deref().unwrap_or("unknown kendra"),
                    row.city_name.as_deref().unwrap_or("unknown city"),
                    report.week_start,
                    report.period_number,
                    report.attendance.yuva,
                    report.attendance.bhavferni,
                    report.attendance.pravachan,
                    report.id
                );
            }
            if pager.has_more() {
                println!("More reports available; raise --pages to load them.");
            }
        }
        Commands::Dashboard {
            filter,
            weeks,
            out,
        } => {
            let actor = sign_in(&gateway, cli.as_user).await?;
            let dashboard = service
                .dashboard(&actor, &filter.to_filter(), weeks)
                .await?;
            if cli.json {
                return print_json(&dashboard);
            }
            let label = scope_label(&service, &actor).await?;
            let markdown = summary::dashboard_markdown(
                &label,
                service.today(),
                &dashboard.stats,
                &dashboard.trends,
            );
            match out {
                Some(out) => {
                    std::fs::write(&out, markdown)?;
                    println!("Dashboard written to {}.", out.display());
                }
                None => print!("{markdown}"),
            }
        }
        Commands::Export { filter, out } => {
            let actor = sign_in(&gateway, cli.as_user).await?;
            let rows = service.list_reports(&actor, &filter.to_filter()).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(export::export_file_name(service.today())));
            let file = File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            export::write_reports_csv(BufWriter::new(file), &rows)?;
            println!("Exported {} reports to {}.", rows.len(), out.display());
        }
        Commands::Totals { kendra_type } => {
            let actor = sign_in(&gateway, cli.as_user).await?;
            let totals = service.totals_for_type(&actor, kendra_type).await?;
            if cli.json {
                return print_json(&totals);
            }
            print!("{}", summary::totals_message(kendra_type, &totals));
        }
        Commands::Create {
            kendra,
            week_start,
            last_week,
            yuva,
            bhavferni,
            pravachan,
            note,
        } => {
            let actor = sign_in(&gateway, cli.as_user).await?;
            let week_start = match week_start {
                Some(date) => date,
                None if last_week => calendar::previous_week_start(service.today()),
                None => calendar::current_week_start(service.today()),
            };
            let row = service
                .create_report(
                    &actor,
                    NewReport {
                        kendra_id: kendra,
                        week_start,
                        attendance: Attendance::new(yuva, bhavferni, pravachan),
                        note,
                    },
                )
                .await?;
            if cli.json {
                return print_json(&row);
            }
            println!(
                "Saved report {} for {} week of {} (pushp {}).",
                row.report.id,
                row.kendra_name.as_deref().unwrap_or("kendra"),
                row.report.week_start,
                row.report.period_number
            );
        }
        Commands::Update { id, fields } => {
            let actor = sign_in(&gateway, cli.as_user).await?;
            let update: EntityUpdate =
                serde_json::from_str(&fields).context("update payload is not valid")?;
            let updated = service.apply_update(&actor, id, update).await?;
            print_json(&updated)?;
        }
        Commands::Delete { id } => {
            let actor = sign_in(&gateway, cli.as_user).await?;
            service.delete_report(&actor, id).await?;
            println!("Deleted report {id}.");
        }
        Commands::Cities => {
            let cities = service.cities().await?;
            if cli.json {
                return print_json(&cities);
            }
            for city in cities {
                println!("- {} ({}) [{}]", city.name, city.pin_code, city.id);
            }
        }
        Commands::Kendras { city } => {
            let kendras = service.kendras(city).await?;
            if cli.json {
                return print_json(&kendras);
            }
            for kendra in kendras {
                println!(
                    "- {} {} in {} [{}]",
                    kendra.name,
                    kendra.kendra_type,
                    kendra.city_name.as_deref().unwrap_or("unknown city"),
                    kendra.id
                );
            }
        }
    }

    Ok(())
}
