//! FindThem CLI - report, search and manage missing-person cases
//!
//! Example:
//!   findthem search photo.jpg --html results.html
//!   findthem --password secret delete 42
//!   findthem watch dashboard

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use findthem::backend::HttpBackend;
use findthem::matches::SearchState;
use findthem::model::{Case, CaseFilter, CaseStatus, Statistics};
use findthem::notify::{Notice, NoticeLevel, Notifier};
use findthem::orchestrator::{Orchestrator, SearchOutcome, Trigger};
use findthem::refresh::{AutoRefresh, Refresh, View};
use findthem::render;
use findthem::settings::SettingsStore;
use findthem::upload::{CaseSubmission, ImageUpload};
use findthem::{ClientConfig, RequestError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

const ADMIN_PASSWORD_ENV: &str = "FINDTHEM_ADMIN_PASSWORD";

#[derive(Parser, Debug)]
#[command(author, version, about = "Client for the FindThem missing-persons service")]
struct Cli {
    /// Config file (TOML)
    #[arg(long, short, global = true, default_value = "findthem.toml")]
    config: PathBuf,

    /// Override the API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Admin password for privileged commands (or FINDTHEM_ADMIN_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report a missing or found person
    Submit {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "missing")]
        status: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        contact: String,
        /// Photo of the person (JPG, PNG, GIF or BMP, max 10MB)
        photo: PathBuf,
    },
    /// Search the database with a photo
    Search {
        photo: PathBuf,
        /// Write the rendered results to this file
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Search using the stored photo of an existing case
    Similar {
        image_path: String,
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// List cases
    Cases {
        #[arg(long)]
        status: Option<CaseStatus>,
        #[arg(long)]
        html: Option<PathBuf>,
        /// Render the admin table instead of cards
        #[arg(long, requires = "html")]
        table: bool,
    },
    /// Show one case
    Case { id: i64 },
    /// Show case statistics
    Stats {
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Keep a view refreshed until Ctrl-C
    Watch { view: WatchView },
    /// Show or change the persisted similarity threshold
    Threshold {
        #[command(subcommand)]
        action: ThresholdAction,
    },
    /// Delete a case (admin)
    Delete { id: i64 },
    /// Database backups (admin)
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Check backend health
    Health,
}

#[derive(Subcommand, Debug)]
enum ThresholdAction {
    Show,
    Set { value: f64 },
    Clear,
}

#[derive(Subcommand, Debug)]
enum BackupAction {
    Create,
    List,
    Restore { filename: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WatchView {
    Dashboard,
    Cases,
}

impl From<WatchView> for View {
    fn from(view: WatchView) -> Self {
        match view {
            WatchView::Dashboard => View::Dashboard,
            WatchView::Cases => View::Cases,
        }
    }
}

/// Prints notices to stderr
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let title = match notice.level {
            NoticeLevel::Success => notice.title.green().bold(),
            NoticeLevel::Error => notice.title.red().bold(),
            NoticeLevel::Warning => notice.title.yellow().bold(),
            NoticeLevel::Info => notice.title.cyan().bold(),
        };
        eprintln!("{}: {}", title, notice.message);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    if let Err(e) = run(cli).await {
        // Request failures were already shown as notices
        if e.downcast_ref::<RequestError>().is_none() {
            eprintln!("{} {:#}", "error:".red().bold(), e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    debug!(api = config.api_base(), uploads = %config.uploads_base(), "Configured backend");

    let settings_path = config.settings_file();
    let settings = SettingsStore::open(&settings_path)
        .with_context(|| format!("Failed to open settings: {}", settings_path.display()))?;
    let backend = HttpBackend::new(&config).context("Failed to create HTTP backend")?;
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        Arc::new(backend),
        Arc::new(settings),
        Arc::new(ConsoleNotifier),
    ));

    match cli.command {
        Command::Submit {
            name,
            status,
            description,
            contact,
            photo,
        } => {
            let submission = CaseSubmission {
                name,
                status,
                description,
                contact,
                photo: Some(read_photo(&photo).await?),
            };
            let receipt = orchestrator.submit_case(&submission).await?;
            if let Some(id) = receipt.case_id {
                println!("Case ID: {}", id.to_string().bold());
            }
        }
        Command::Search { photo, html } => {
            let image = read_photo(&photo).await?;
            let outcome = orchestrator.search(Some(&image)).await?;
            show_search(&orchestrator, outcome, html.as_deref()).await?;
        }
        Command::Similar { image_path, html } => {
            let outcome = orchestrator.search_from_case(&image_path).await?;
            show_search(&orchestrator, outcome, html.as_deref()).await?;
        }
        Command::Cases { status, html, table } => {
            let filter = status.map_or(CaseFilter::All, CaseFilter::Only);
            let cases = orchestrator.load_cases(filter, Trigger::User).await?;
            match html {
                Some(path) => {
                    let markup = if table {
                        render::render_case_table(&cases, orchestrator.uploads_base())
                    } else {
                        render::render_case_cards(&cases, orchestrator.uploads_base())
                    };
                    write_html(&path, &markup).await?;
                }
                None => print_cases(&cases),
            }
        }
        Command::Case { id } => {
            let case = orchestrator.case_detail(id).await?;
            print_cases(std::slice::from_ref(&case));
            println!("    {}", case.description);
        }
        Command::Stats { html } => {
            let stats = orchestrator.load_statistics(Trigger::User).await?;
            match html {
                Some(path) => write_html(&path, &render::render_statistics(&stats)).await?,
                None => print_statistics(&stats),
            }
        }
        Command::Watch { view } => watch(orchestrator, config.refresh_interval(), view.into()).await?,
        Command::Threshold { action } => match action {
            ThresholdAction::Show => match orchestrator.threshold() {
                Some(value) => println!("Similarity threshold: {}%", value),
                None => println!("Similarity threshold: server default"),
            },
            ThresholdAction::Set { value } => orchestrator.set_threshold(value)?,
            ThresholdAction::Clear => orchestrator.clear_threshold()?,
        },
        Command::Delete { id } => {
            login(&orchestrator, cli.password).await?;
            orchestrator.delete_case(id).await?;
        }
        Command::Backup { action } => {
            login(&orchestrator, cli.password).await?;
            match action {
                BackupAction::Create => {
                    orchestrator.create_backup().await?;
                }
                BackupAction::List => {
                    let backups = orchestrator.list_backups().await?;
                    if backups.is_empty() {
                        println!("No backups found");
                    }
                    for backup in backups {
                        println!("{}  {:>10} bytes  {}", backup.filename.bold(), backup.size, backup.timestamp);
                    }
                }
                BackupAction::Restore { filename } => {
                    orchestrator.restore_backup(&filename).await?;
                }
            }
        }
        Command::Health => {
            let health = orchestrator.health().await;
            if health.healthy {
                println!(
                    "{} ({} ms, database {})",
                    "healthy".green().bold(),
                    health.latency_ms.unwrap_or_default(),
                    health.database.as_deref().unwrap_or("unknown")
                );
            } else {
                println!(
                    "{}: {}",
                    "unhealthy".red().bold(),
                    health.error.as_deref().unwrap_or("unknown error")
                );
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

async fn read_photo(path: &Path) -> Result<ImageUpload> {
    ImageUpload::from_path(path)
        .await
        .with_context(|| format!("Failed to read photo: {}", path.display()))
}

async fn write_html(path: &Path, markup: &str) -> Result<()> {
    tokio::fs::write(path, markup)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn login(orchestrator: &Orchestrator, password: Option<String>) -> Result<()> {
    let password = match password.or_else(|| std::env::var(ADMIN_PASSWORD_ENV).ok()) {
        Some(password) => password,
        None => bail!("Admin password required: pass --password or set {}", ADMIN_PASSWORD_ENV),
    };
    orchestrator.login(&password).await?;
    Ok(())
}

async fn show_search(orchestrator: &Orchestrator, outcome: SearchOutcome, html: Option<&Path>) -> Result<()> {
    let state = match outcome {
        SearchOutcome::Displayed(state) => state,
        SearchOutcome::Superseded => return Ok(()),
    };
    if let Some(path) = html {
        write_html(path, &orchestrator.render_search_panel()).await?;
    }

    if let SearchState::Results(matches) = &state {
        for m in matches {
            let c = &m.candidate;
            println!(
                "#{} {} {} {}",
                m.rank,
                c.name.bold(),
                format!("{}%", c.similarity_percentage).green(),
                format!("({})", m.tier).dimmed()
            );
            println!("    {} | {}", status_text(c.status), c.contact);
        }
    }
    Ok(())
}

fn status_text(status: CaseStatus) -> colored::ColoredString {
    match status {
        CaseStatus::Missing => "MISSING".red(),
        CaseStatus::Found => "FOUND".green(),
    }
}

fn print_cases(cases: &[Case]) {
    if cases.is_empty() {
        println!("No cases found");
    }
    for case in cases {
        println!(
            "{:>5}  {}  {}  {}  {}",
            case.case_id,
            status_text(case.status),
            case.name.bold(),
            case.contact,
            render::format_reported_at(case.created_at.as_deref()).dimmed()
        );
    }
}

fn print_statistics(stats: &Statistics) {
    println!(
        "{} total, {} missing, {} found",
        stats.total_cases.to_string().bold(),
        stats.missing_persons.to_string().red(),
        stats.found_persons.to_string().green()
    );
}

/// Poll the view through [`AutoRefresh`] and print whenever the panel changes
async fn watch(orchestrator: Arc<Orchestrator>, period: Duration, view: View) -> Result<()> {
    orchestrator.refresh(view).await?;
    println!("Watching {} every {}s, Ctrl-C to stop", view, period.as_secs());

    let auto = AutoRefresh::new(orchestrator.clone(), period);
    auto.switch_view(view);

    let mut last_stats = None;
    let mut last_cases = None;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => match view {
                View::Dashboard => {
                    let stats = orchestrator.statistics();
                    if stats != last_stats {
                        if let Some(stats) = &stats {
                            print_statistics(stats);
                        }
                        last_stats = stats;
                    }
                }
                _ => {
                    let cases = orchestrator.cases();
                    if cases != last_cases {
                        if let Some(cases) = &cases {
                            println!("{}", "--".dimmed());
                            print_cases(cases);
                        }
                        last_cases = cases;
                    }
                }
            },
        }
    }

    auto.stop();
    Ok(())
}
