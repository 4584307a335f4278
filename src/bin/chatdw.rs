use std::io::BufReader;

use clap::{Parser, Subcommand};

use chatdw::date_util::WEEKDAY_NAMES;
use chatdw::{ChatDW, DailyReportQuery, Error, JobOptions, Period};

#[derive(Parser)]
#[command(name = "chatdw", about = "Working-hours-aware chat analytics warehouse")]
struct Cli {
    /// Database path (default: $CHATDW_DB or ~/.chatdw/chatdw.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl chatdw::JobProgress for StderrProgress {
    fn on_schedules_resolved(&self, count: usize) {
        eprintln!("Resolved {count} schedules");
    }

    fn on_events_read(&self, job_key: &str, count: usize) {
        eprintln!("[{job_key}] Read {count} events");
    }

    fn on_partitions(&self, job_key: &str, count: usize) {
        eprintln!("[{job_key}] {count} partitions");
    }

    fn on_rows_upserted(&self, table: &str, count: usize) {
        eprintln!("Upserted {count} rows into {table}");
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analytics job
    Run {
        #[command(subcommand)]
        target: RunTarget,
    },
    /// Inspect resolved working-hours schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Report daily performance over a period
    Report {
        /// Filter by user id
        #[arg(long)]
        user: Option<i64>,
        /// Filter by org id
        #[arg(long)]
        org: Option<i64>,
        /// Period (e.g. 2025-01, 2025-W05, 30d, ytd, mtd)
        #[arg(long, default_value = "7d")]
        period: String,
        /// Maximum rows
        #[arg(long, default_value = "100")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load JSON-lines input into the warehouse tables
    Load {
        /// Message events file
        #[arg(long)]
        events: Option<String>,
        /// working_hours rows file
        #[arg(long)]
        schedules: Option<String>,
        /// User bindings file
        #[arg(long)]
        bindings: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum RunTarget {
    /// Daily pipeline over the recent ingestion window
    Daily {
        /// Ingestion lookback in days
        #[arg(long)]
        days: Option<u32>,
        /// Use the simple same-day response-time arithmetic
        #[arg(long)]
        simple: bool,
        /// Schedule reference timezone (e.g. UTC, Asia/Kolkata)
        #[arg(long)]
        tz: Option<String>,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lifetime backfill for one user's conversations
    Backfill {
        /// User id
        user_id: i64,
        /// Limit to one org
        #[arg(long)]
        org: Option<i64>,
        #[arg(long)]
        simple: bool,
        #[arg(long)]
        tz: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Show one user's resolved schedule
    Show {
        user_id: i64,
        #[arg(long)]
        json: bool,
    },
    /// List every principal's resolved schedule
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(exit_code(&e));
    }
}

/// 2 for validation problems the caller can fix, 1 for everything else.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<Error>() {
        Some(
            Error::Config(_)
            | Error::PeriodParse(_)
            | Error::ScheduleParse(_)
            | Error::NotFound(_),
        ) => 2,
        _ => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db = match cli.db.or_else(|| std::env::var("CHATDW_DB").ok()) {
        Some(path) => chatdw::Database::open_at(path).await?,
        None => chatdw::Database::open().await?,
    };
    let dw = ChatDW::new(db);

    match cli.command {
        Commands::Run { target } => handle_run(&dw, target).await?,
        Commands::Schedule { action } => handle_schedule(&dw, action).await?,
        Commands::Report {
            user,
            org,
            period,
            limit,
            json,
        } => handle_report(&dw, user, org, &period, limit, json).await?,
        Commands::Load {
            events,
            schedules,
            bindings,
        } => handle_load(&dw, events, schedules, bindings).await?,
        Commands::Config { action } => handle_config(&dw, action).await?,
        Commands::Status => print_status(&dw).await?,
    }

    Ok(())
}

/// Flag > environment > config store > default.
async fn effective_options(
    dw: &ChatDW,
    days: Option<u32>,
    simple: bool,
    tz: Option<String>,
) -> anyhow::Result<JobOptions> {
    let mut options = dw.job_options().await?;

    if let Ok(v) = std::env::var("CHATDW_WINDOW_DAYS") {
        options.window_days = v
            .parse()
            .map_err(|_| Error::Config(format!("invalid CHATDW_WINDOW_DAYS: {v}")))?;
    }
    if let Some(d) = days {
        options.window_days = d;
    }
    if let Ok(v) = std::env::var("CHATDW_TZ") {
        options.reference_tz = chatdw::date_util::parse_tz(&v)?;
    }
    if let Some(v) = tz {
        options.reference_tz = chatdw::date_util::parse_tz(&v)?;
    }
    options.strict_same_day_containment = simple;

    Ok(options)
}

async fn handle_run(dw: &ChatDW, target: RunTarget) -> anyhow::Result<()> {
    let progress = StderrProgress;
    let (report, json) = match target {
        RunTarget::Daily {
            days,
            simple,
            tz,
            json,
        } => {
            let options = effective_options(dw, days, simple, tz).await?;
            (dw.run_daily(&options, &progress).await?, json)
        }
        RunTarget::Backfill {
            user_id,
            org,
            simple,
            tz,
            json,
        } => {
            let options = effective_options(dw, None, simple, tz).await?;
            (
                dw.run_backfill(user_id, org, &options, &progress).await?,
                json,
            )
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} events, {} partitions, {} response pairs, {} rows upserted",
            report.job_key,
            report.events_read,
            report.partitions,
            report.response_pairs,
            report.rows_upserted
        );
    }
    Ok(())
}

fn print_schedule(resolved: &chatdw::ResolvedSchedule) {
    println!(
        "user {} (team {}, org {}) source: {}",
        resolved.user_id,
        resolved.team_id,
        resolved.org_id,
        resolved.source.as_str()
    );
    for (idx, name) in WEEKDAY_NAMES.iter().enumerate() {
        match resolved.week.window(idx) {
            Some(w) => println!("  {name}: {} – {}", w.start, w.end),
            None => println!("  {name}: closed"),
        }
    }
}

async fn handle_schedule(dw: &ChatDW, action: ScheduleAction) -> anyhow::Result<()> {
    match action {
        ScheduleAction::Show { user_id, json } => {
            let resolved = dw.resolved_schedule(user_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resolved)?);
            } else {
                print_schedule(&resolved);
            }
        }
        ScheduleAction::List { json } => {
            let all = dw.resolved_schedules().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else if all.is_empty() {
                println!("No principals bound.");
            } else {
                for resolved in &all {
                    print_schedule(resolved);
                }
            }
        }
    }
    Ok(())
}

async fn handle_report(
    dw: &ChatDW,
    user: Option<i64>,
    org: Option<i64>,
    period: &str,
    limit: u32,
    json: bool,
) -> anyhow::Result<()> {
    let period = Period::parse(period)?;
    let (start, end) = period.date_range();

    let mut query = DailyReportQuery::new().date_range(start, end).limit(limit);
    if let Some(user) = user {
        query = query.user(user);
    }
    if let Some(org) = org {
        query = query.org(org);
    }

    let rows = dw
        .db()
        .reader()
        .call(move |conn| Ok(query.fetch(conn)?))
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No rows for {period}.");
        return Ok(());
    }
    for row in &rows {
        let ttfr = row
            .time_to_first_response
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} user {} org {} chat {}: avg {:.0}s, first {}, {} in / {} out",
            row.activity_date,
            row.user_id,
            row.org_id,
            row.contact_id,
            row.average_response_time,
            ttfr,
            row.contact_message_count,
            row.agent_message_count
        );
    }
    Ok(())
}

async fn handle_load(
    dw: &ChatDW,
    events: Option<String>,
    schedules: Option<String>,
    bindings: Option<String>,
) -> anyhow::Result<()> {
    if events.is_none() && schedules.is_none() && bindings.is_none() {
        return Err(Error::Config(
            "nothing to load; pass --events, --schedules, or --bindings".into(),
        )
        .into());
    }

    if let Some(path) = schedules {
        let file = std::fs::File::open(&path)?;
        let count = dw.load_schedules(BufReader::new(file)).await?;
        println!("Loaded {count} schedule rows from {path}");
    }
    if let Some(path) = bindings {
        let file = std::fs::File::open(&path)?;
        let count = dw.load_bindings(BufReader::new(file)).await?;
        println!("Loaded {count} bindings from {path}");
    }
    if let Some(path) = events {
        let file = std::fs::File::open(&path)?;
        let count = dw.load_events(BufReader::new(file)).await?;
        println!("Loaded {count} events from {path}");
    }
    Ok(())
}

async fn handle_config(dw: &ChatDW, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match dw.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            dw.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dw.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(dw: &ChatDW) -> anyhow::Result<()> {
    let stats = dw
        .db()
        .reader()
        .call(|conn| {
            let schedules: i64 =
                conn.query_row("SELECT COUNT(*) FROM working_hours", [], |row| row.get(0))?;
            let bindings: i64 =
                conn.query_row("SELECT COUNT(*) FROM user_bindings", [], |row| row.get(0))?;
            let events: i64 =
                conn.query_row("SELECT COUNT(*) FROM message_events", [], |row| row.get(0))?;
            let conversations: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conversation_summary",
                [],
                |row| row.get(0),
            )?;
            let daily: i64 = conn.query_row(
                "SELECT COUNT(*) FROM daily_performance_summary",
                [],
                |row| row.get(0),
            )?;
            let last_run: Option<String> = conn
                .query_row(
                    "SELECT completed_at FROM job_runs WHERE status = 'completed'
                     ORDER BY id DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .ok();

            Ok::<_, rusqlite::Error>((schedules, bindings, events, conversations, daily, last_run))
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let (schedules, bindings, events, conversations, daily, last_run) = stats;
    println!("Warehouse Status");
    println!("  Schedule rows:   {schedules}");
    println!("  User bindings:   {bindings}");
    println!("  Message events:  {events}");
    println!("  Conversations:   {conversations}");
    println!("  Daily rows:      {daily}");
    println!(
        "  Last run:        {}",
        last_run.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}
