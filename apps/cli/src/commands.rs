//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use scholarscout_core::{FetchCycleController, FetchCycleReport, ProgressReporter};
use scholarscout_providers::{provider_status, select_provider};
use scholarscout_shared::{
    AppConfig, ProviderKind, RunStatus, ScholarScoutError, ScholarshipCategory, StudyLevel,
    init_config, load_config,
};
use scholarscout_storage::{RecordStore, RunLog, ScholarshipFilter, Storage};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ScholarScout: find open scholarships with LLM web search.
#[derive(Parser)]
#[command(
    name = "scholarscout",
    version,
    about = "Discover, verify and store open scholarships using LLM web search.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Database path (overrides `[storage] db_path`).
    #[arg(long, global = true, env = "SCHOLARSCOUT_DB")]
    pub db: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one fetch cycle now.
    Fetch {
        /// Preferred provider for this run (overrides `[search] provider`).
        #[arg(long)]
        provider: Option<ProviderKind>,
    },

    /// Show recent fetch runs.
    Runs {
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// List stored scholarships with open deadlines.
    List {
        /// Host country (case-insensitive).
        #[arg(long)]
        country: Option<String>,

        /// Study level: Bachelor, Master, PhD, Postdoctoral or Any.
        #[arg(long)]
        level: Option<StudyLevel>,

        /// Funding category, e.g. "Fully Funded".
        #[arg(long)]
        category: Option<ScholarshipCategory>,

        /// Include scholarships whose deadline has passed.
        #[arg(long)]
        all: bool,

        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show one scholarship in full.
    Show {
        /// Scholarship id.
        id: String,
    },

    /// Corpus statistics.
    Stats,

    /// Mark a scholarship as checked by a human.
    Verify {
        /// Scholarship id.
        id: String,

        /// Clear the flag instead of setting it.
        #[arg(long)]
        revoke: bool,
    },

    /// Delete a scholarship.
    Remove {
        /// Scholarship id.
        id: String,
    },

    /// Show which search providers have an API key.
    Providers,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "scholarscout=info",
        1 => "scholarscout=debug",
        _ => "scholarscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db.as_deref();
    match cli.command {
        Command::Fetch { provider } => cmd_fetch(db, provider).await,
        Command::Runs { limit } => cmd_runs(db, limit).await,
        Command::List {
            country,
            level,
            category,
            all,
            limit,
        } => {
            let filter = ScholarshipFilter {
                country,
                level,
                category,
                deadline_from: (!all).then(|| Utc::now().date_naive()),
                limit,
            };
            cmd_list(db, &filter).await
        }
        Command::Show { id } => cmd_show(db, &id).await,
        Command::Stats => cmd_stats(db).await,
        Command::Verify { id, revoke } => cmd_verify(db, &id, !revoke).await,
        Command::Remove { id } => cmd_remove(db, &id).await,
        Command::Providers => cmd_providers().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Resolve the database path: `--db` wins over config.
fn db_path(db: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(config.storage.resolved_db_path()?),
    }
}

async fn open_readonly(db: Option<&Path>) -> Result<Storage> {
    let config = load_config()?;
    Ok(Storage::open_readonly(&db_path(db, &config)?).await?)
}

async fn open_writable(db: Option<&Path>) -> Result<Storage> {
    let config = load_config()?;
    Ok(Storage::open(&db_path(db, &config)?).await?)
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

async fn cmd_fetch(db: Option<&Path>, provider: Option<ProviderKind>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(kind) = provider {
        config.search.provider = kind;
    }
    let path = db_path(db, &config)?;

    let report = fetch(&config, &path).await?;
    print_report(&report);

    match report.status {
        RunStatus::Completed => Ok(()),
        _ => Err(eyre!(
            "fetch run failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        )),
    }
}

/// Run one fetch cycle against the database at `path`.
///
/// Provider selection still fails fast, but a missing key is recorded as a
/// failed run before the summary is returned.
async fn fetch(config: &AppConfig, path: &Path) -> Result<FetchCycleReport> {
    let provider = match select_provider(config) {
        Ok(provider) => provider,
        Err(e @ ScholarScoutError::Config { .. }) => {
            let storage = Storage::open(path).await?;
            return Ok(record_unconfigured_run(&storage, &e.to_string()).await?);
        }
        Err(e) => return Err(e.into()),
    };
    let storage = Arc::new(Storage::open(path).await?);

    info!(provider = provider.name(), db = %path.display(), "starting fetch cycle");

    let controller = FetchCycleController::from_config(config, provider, storage)?
        .with_progress(Arc::new(CliProgress::new()));
    Ok(controller.run_fetch_cycle().await)
}

/// Log a run that never reached a provider and report it as failed.
async fn record_unconfigured_run(
    storage: &Storage,
    message: &str,
) -> scholarscout_shared::Result<FetchCycleReport> {
    let start = Instant::now();
    let id = storage.create_run(&[]).await?;
    storage.fail_run(&id, message).await?;
    error!(run_id = %id, error = %message, "fetch run failed before searching");

    Ok(FetchCycleReport {
        run_id: Some(id),
        status: RunStatus::Failed,
        queries: Vec::new(),
        found: 0,
        validated: 0,
        verified: 0,
        dead_links: 0,
        added: 0,
        updated: 0,
        duplicates: 0,
        error: Some(message.to_string()),
        elapsed: start.elapsed(),
    })
}

fn print_report(report: &FetchCycleReport) {
    println!();
    match report.status {
        RunStatus::Completed => println!("  Fetch run completed"),
        _ => println!("  Fetch run failed"),
    }
    if let Some(id) = &report.run_id {
        println!("  Run:        {id}");
    }
    println!("  Queries:    {}", report.queries.len());
    println!("  Found:      {}", report.found);
    println!("  Validated:  {}", report.validated);
    println!(
        "  Verified:   {} ({} dead links)",
        report.verified, report.dead_links
    );
    println!("  Added:      {}", report.added);
    println!("  Updated:    {}", report.updated);
    println!("  Duplicates: {}", report.duplicates);
    if let Some(error) = &report.error {
        println!("  Error:      {error}");
    }
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn query_started(&self, query: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Searching [{current}/{total}] {query}"));
    }

    fn done(&self, _report: &FetchCycleReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

async fn cmd_runs(db: Option<&Path>, limit: u32) -> Result<()> {
    let storage = open_readonly(db).await?;
    let runs = storage.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No fetch runs yet.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<9}  {:<20}  {:>5}  {:>5}  ERROR",
        "ID", "STATUS", "STARTED", "FOUND", "ADDED"
    );
    for run in runs {
        println!(
            "{:<36}  {:<9}  {:<20}  {:>5}  {:>5}  {}",
            run.id,
            run.status,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.found,
            run.added,
            run.error.as_deref().map(|e| truncate(e, 60)).unwrap_or_default()
        );
    }
    Ok(())
}

async fn cmd_list(db: Option<&Path>, filter: &ScholarshipFilter) -> Result<()> {
    let storage = open_readonly(db).await?;
    let records = storage.list_scholarships(filter).await?;
    if records.is_empty() {
        println!("No scholarships match.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<10}  {:<12}  {:<18}  TITLE",
        "ID", "DEADLINE", "LEVEL", "COUNTRY"
    );
    for r in &records {
        println!(
            "{:<36}  {:<10}  {:<12}  {:<18}  {}{}",
            r.id,
            r.deadline,
            r.level,
            truncate(&r.country, 18),
            truncate(&r.title, 60),
            if r.human_verified { " ✓" } else { "" }
        );
    }
    println!("\n{} scholarship(s)", records.len());
    Ok(())
}

async fn cmd_show(db: Option<&Path>, id: &str) -> Result<()> {
    let storage = open_readonly(db).await?;
    let r = storage
        .get_scholarship(id)
        .await?
        .ok_or_else(|| eyre!("no scholarship with id {id}"))?;

    println!();
    println!("  {}", r.title);
    println!("  {}", r.organization);
    println!();
    println!("  Country:   {}", r.country);
    println!("  Level:     {}", r.level);
    println!("  Field:     {}", r.field);
    println!("  Category:  {}", r.category);
    println!("  Deadline:  {}", r.deadline);
    if let Some(amount) = &r.amount {
        match r.currency {
            Some(currency) => println!("  Amount:    {amount} ({currency})"),
            None => println!("  Amount:    {amount}"),
        }
    }
    println!("  Link:      {}", r.link);
    println!(
        "  Verified:  {}",
        if r.human_verified { "yes (by a human)" } else { "no" }
    );
    println!("  Source:    {}", r.source);
    println!("  Updated:   {}", r.updated_at.format("%Y-%m-%d %H:%M"));
    println!();
    println!("  {}", r.description);
    println!();
    Ok(())
}

async fn cmd_stats(db: Option<&Path>) -> Result<()> {
    let storage = open_readonly(db).await?;
    let total = storage.count_records().await?;
    let by_level = storage.count_by_level().await?;
    let countries = storage.distinct_countries().await?;
    let last_run = storage.list_runs(1).await?.into_iter().next();

    println!();
    println!("  Scholarships: {total}");
    for (level, count) in by_level {
        println!("    {:<14} {count}", level.as_str());
    }
    println!("  Countries:    {}", countries.len());
    if !countries.is_empty() {
        println!("    {}", countries.join(", "));
    }
    if let Some(run) = last_run {
        println!(
            "  Last run:     {} ({}, found {}, added {})",
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.status,
            run.found,
            run.added
        );
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

async fn cmd_verify(db: Option<&Path>, id: &str, verified: bool) -> Result<()> {
    let storage = open_writable(db).await?;
    if !storage.set_human_verified(id, verified).await? {
        return Err(eyre!("no scholarship with id {id}"));
    }
    info!(id, verified, "human verification flag changed");
    if verified {
        println!("Marked {id} as verified.");
    } else {
        println!("Cleared verification on {id}.");
    }
    Ok(())
}

async fn cmd_remove(db: Option<&Path>, id: &str) -> Result<()> {
    let storage = open_writable(db).await?;
    if !storage.delete_scholarship(id).await? {
        return Err(eyre!("no scholarship with id {id}"));
    }
    info!(id, "scholarship removed");
    println!("Removed {id}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Providers and config
// ---------------------------------------------------------------------------

async fn cmd_providers() -> Result<()> {
    let config = load_config()?;
    for (kind, configured) in provider_status(&config) {
        let endpoint = config.endpoint(kind);
        let marker = if kind == config.search.provider {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {:<11} {:<14} {:<28} ${}",
            kind.as_str(),
            if configured { "configured" } else { "missing key" },
            endpoint.model,
            endpoint.api_key_env
        );
    }
    println!(
        "\n* preferred provider; fallback {}",
        if config.search.allow_fallback {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

/// Shorten `s` to at most `max` characters, marking the cut.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn parses_list_filters() {
        let cli = Cli::try_parse_from([
            "scholarscout",
            "list",
            "--level",
            "phd",
            "--category",
            "Fully Funded",
            "--country",
            "Germany",
        ])
        .unwrap();
        match cli.command {
            Command::List {
                level, category, ..
            } => {
                assert_eq!(level, Some(StudyLevel::PhD));
                assert_eq!(category, Some(ScholarshipCategory::FullyFunded));
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn global_db_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["scholarscout", "runs", "--db", "/tmp/s.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/s.db")));
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["scholarscout", "fetch", "--provider", "bing"]).is_err());
        let cli = Cli::try_parse_from(["scholarscout", "fetch", "--provider", "anthropic"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Fetch {
                provider: Some(ProviderKind::Anthropic)
            }
        ));
    }

    fn keyless_config() -> AppConfig {
        let mut config = AppConfig::default();
        for (endpoint, var) in [
            (&mut config.perplexity, "SS_CLI_TEST_NO_PERPLEXITY_KEY"),
            (&mut config.openai, "SS_CLI_TEST_NO_OPENAI_KEY"),
            (&mut config.anthropic, "SS_CLI_TEST_NO_ANTHROPIC_KEY"),
        ] {
            endpoint.api_key_env = var.into();
        }
        config
    }

    #[tokio::test]
    async fn fetch_without_keys_records_failed_run() {
        let path = std::env::temp_dir().join(format!("ss_cli_fetch_{}.db", Uuid::now_v7()));

        let report = fetch(&keyless_config(), &path).await.unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        let message = report.error.clone().unwrap();
        assert!(message.contains("SS_CLI_TEST_NO_OPENAI_KEY"), "{message}");

        let storage = Storage::open_readonly(&path).await.unwrap();
        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(Some(&runs[0].id), report.run_id.as_ref());
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].error.as_deref(), Some(message.as_str()));
        assert!(runs[0].queries.is_empty());
        assert!(runs[0].completed_at.is_some());
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
