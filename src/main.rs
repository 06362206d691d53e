//! CLI entry point for `ryusync`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use ryusync::archive::reader::ArchiveReader;
use ryusync::config::Config;
use ryusync::content::extractor::Hactoolnet;
use ryusync::content::scan::{self, ExtractedContent, TitleLabeler};
use ryusync::export::registry::RegistryBuilder;
use ryusync::export::versions::VersionDirectory;
use ryusync::sync::engine::{SyncReport, SyncSettings};
use ryusync::sync::layout::{ryujinx_archive_path, EmulatorLayout};
use ryusync::sync::policy::PriorityMode;

#[derive(Parser)]
#[command(
    name = "ryusync",
    version,
    about = "Keep Ryujinx and yuzu saves in sync and register updates/DLC with Ryujinx"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Ryujinx filesystem folder
    #[arg(short = 'r', long, global = true, value_name = "DIR")]
    ryujinx_dir: Option<PathBuf>,

    /// yuzu user folder
    #[arg(short = 'y', long, global = true, value_name = "DIR")]
    yuzu_dir: Option<PathBuf>,

    /// Folder where update and DLC .nsp files are stored
    #[arg(short = 'n', long, global = true, value_name = "DIR")]
    nsp_dir: Option<PathBuf>,

    /// hactoolnet executable (default: next to this program)
    #[arg(long, global = true, value_name = "FILE")]
    hactoolnet: Option<PathBuf>,

    /// prod.keys file (default: next to this program)
    #[arg(long, global = true, value_name = "FILE")]
    prod_keys: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync saves between yuzu and Ryujinx
    Sync {
        /// yuzu, ryujinx or newer; prefix with '~' (e.g. ~newer) to simulate
        priority: Option<String>,
        /// Report what would happen without changing any file
        #[arg(long)]
        simulate: bool,
        /// Do not add save archive entries for titles only yuzu knows
        #[arg(long)]
        no_synthesize: bool,
        /// Where to copy saves before they are overwritten
        #[arg(long, value_name = "DIR")]
        backup_dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Register update and DLC packages with Ryujinx
    Autoadd,
    /// Write updates.csv with the update status of each update package
    ExportUpdates {
        /// titledb versions.json (default: ./versions.json)
        #[arg(short = 'p', long, value_name = "FILE")]
        versions: Option<PathBuf>,
        #[arg(short, long, default_value = "updates.csv")]
        output: PathBuf,
    },
    /// Show the contents of Ryujinx's save archive
    Archive {
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration and where it is read from
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = ryusync::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let paths = ResolvedPaths::new(&cli, &config);

    match cli.command {
        Commands::Sync {
            ref priority,
            simulate,
            no_synthesize,
            ref backup_dir,
            json,
        } => cmd_sync(
            &paths,
            &config,
            priority.as_deref(),
            simulate,
            no_synthesize,
            backup_dir.clone(),
            json,
        ),
        Commands::Autoadd => cmd_autoadd(&paths, &config),
        Commands::ExportUpdates {
            ref versions,
            ref output,
        } => cmd_export_updates(&paths, &config, versions.as_deref(), output),
        Commands::Archive { json } => cmd_archive(&paths, json),
        Commands::Config { init } => cmd_config(&config, init),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = ryusync::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "ryusync.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Locations from the command line, falling back to the config file.
struct ResolvedPaths {
    ryujinx_dir: Option<PathBuf>,
    yuzu_dir: Option<PathBuf>,
    nsp_dir: Option<PathBuf>,
    hactoolnet: PathBuf,
    prod_keys: PathBuf,
}

impl ResolvedPaths {
    fn new(cli: &Cli, config: &Config) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let tool_name = if cfg!(windows) {
            "hactoolnet.exe"
        } else {
            "hactoolnet"
        };

        Self {
            ryujinx_dir: cli.ryujinx_dir.clone().or(config.paths.ryujinx_dir.clone()),
            yuzu_dir: cli.yuzu_dir.clone().or(config.paths.yuzu_dir.clone()),
            nsp_dir: cli.nsp_dir.clone().or(config.paths.nsp_dir.clone()),
            hactoolnet: cli
                .hactoolnet
                .clone()
                .or(config.paths.hactoolnet.clone())
                .unwrap_or_else(|| exe_dir.join(tool_name)),
            prod_keys: cli
                .prod_keys
                .clone()
                .or(config.paths.prod_keys.clone())
                .unwrap_or_else(|| exe_dir.join("prod.keys")),
        }
    }

    fn require<'a>(value: &'a Option<PathBuf>, flag: &str, command: &str) -> anyhow::Result<&'a Path> {
        value
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("{flag} is required for '{command}'"))
    }

    fn require_dir<'a>(value: &'a Option<PathBuf>, flag: &str, command: &str) -> anyhow::Result<&'a Path> {
        let dir = Self::require(value, flag, command)?;
        if !dir.is_dir() {
            anyhow::bail!("{flag}: directory does not exist: {}", dir.display());
        }
        Ok(dir)
    }

    fn extractor(&self, config: &Config) -> anyhow::Result<Hactoolnet> {
        Ok(Hactoolnet::new(
            &self.hactoolnet,
            &self.prod_keys,
            Duration::from_secs(config.extractor.timeout_secs),
        )?)
    }
}

fn progress_bar(len: u64, verb: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {verb} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {{wide_msg}}"
            ))
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb
}

/// Parse `yuzu`, `~newer`, ... into a priority and a simulate flag.
fn parse_priority(arg: Option<&str>, config: &Config) -> anyhow::Result<(PriorityMode, bool)> {
    let Some(arg) = arg else {
        return Ok((config.sync.priority, false));
    };
    let (name, simulate) = match arg.strip_prefix('~') {
        Some(rest) => (rest, true),
        None => (arg, false),
    };
    let mode = name.parse::<PriorityMode>().map_err(anyhow::Error::msg)?;
    Ok((mode, simulate))
}

/// Sync saves and print the decisions.
fn cmd_sync(
    paths: &ResolvedPaths,
    config: &Config,
    priority: Option<&str>,
    simulate: bool,
    no_synthesize: bool,
    backup_dir: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let ryujinx_dir = ResolvedPaths::require(&paths.ryujinx_dir, "--ryujinx-dir", "sync")?;
    let yuzu_dir = ResolvedPaths::require(&paths.yuzu_dir, "--yuzu-dir", "sync")?;
    let (mode, tilde_simulate) = parse_priority(priority, config)?;

    let settings = SyncSettings {
        priority: mode,
        simulate: simulate || tilde_simulate || config.sync.simulate,
        synthesize_entries: config.sync.synthesize_entries && !no_synthesize,
        backup_dir: backup_dir.unwrap_or_else(|| ryusync::config::backup_dir(config)),
    };
    let layout = EmulatorLayout::new(yuzu_dir, ryujinx_dir);
    let labeler = TitleLabeler::from_dir(paths.nsp_dir.as_deref());

    let pb = progress_bar(0, "Syncing");
    let report = ryusync::sync::sync_saves(
        &layout,
        settings,
        config.archive.backup_retention,
        &|title| labeler.label(title),
        Some(&|done: usize, total: usize, label: &str| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
            pb.set_message(label.to_string());
            true
        }),
    )?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_sync_table(&report);
    }

    if !report.failures.is_empty() {
        anyhow::bail!("{} title(s) failed to sync", report.failures.len());
    }
    Ok(())
}

/// Register update and DLC packages with Ryujinx.
fn cmd_autoadd(paths: &ResolvedPaths, config: &Config) -> anyhow::Result<()> {
    let ryujinx_dir = ResolvedPaths::require(&paths.ryujinx_dir, "--ryujinx-dir", "autoadd")?;
    let nsp_dir = ResolvedPaths::require_dir(&paths.nsp_dir, "--nsp-dir", "autoadd")?;
    let extractor = paths.extractor(config)?;

    let content = extract_packages(nsp_dir, &extractor)?;

    let mut builder = RegistryBuilder::new();
    for (path, meta) in &content.packages {
        builder.add(path, meta);
    }

    let games_dir = ryujinx_dir.join("games");
    let pb = progress_bar(0, "Exporting");
    let stats = builder.write(&games_dir, &|done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    })?;
    pb.finish_and_clear();

    println!();
    println!("  {:<25} {}", "Packages read", content.packages.len());
    println!("  {:<25} {}", "Packages skipped", content.failures.len());
    println!("  {:<25} {}", "updates.json written", stats.update_files.len());
    println!("  {:<25} {}", "dlc.json written", stats.dlc_files.len());
    println!("  {:<25} {}", "Registry folder", games_dir.display());
    print_extraction_failures(&content);
    println!();
    Ok(())
}

/// Write the update availability report.
fn cmd_export_updates(
    paths: &ResolvedPaths,
    config: &Config,
    versions: Option<&Path>,
    output: &Path,
) -> anyhow::Result<()> {
    let nsp_dir = ResolvedPaths::require_dir(&paths.nsp_dir, "--nsp-dir", "export-updates")?;
    let versions_path = versions
        .map(Path::to_path_buf)
        .or(config.paths.versions_json.clone())
        .unwrap_or_else(|| PathBuf::from("versions.json"));
    let directory = VersionDirectory::load(&versions_path)?;
    let extractor = paths.extractor(config)?;

    let content = extract_packages(nsp_dir, &extractor)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let rows = ryusync::export::csv::export_updates_csv(&content.packages, &directory, output)?;

    println!("  Exported {rows} update(s) to {}", output.display());
    print_extraction_failures(&content);
    Ok(())
}

/// Show archive statistics.
fn cmd_archive(paths: &ResolvedPaths, json: bool) -> anyhow::Result<()> {
    let ryujinx_dir = ResolvedPaths::require(&paths.ryujinx_dir, "--ryujinx-dir", "archive")?;
    let archive_path = ryujinx_archive_path(ryujinx_dir);
    let archive = ArchiveReader::read(&archive_path)?;
    let index = archive.save_index();

    if json {
        let output = serde_json::json!({
            "archive": archive_path.to_string_lossy(),
            "entry_count": archive.entries.len(),
            "trailing_bytes": archive.trailer.len(),
            "index": index,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {:<22} {}", "Archive", archive_path.display());
    println!("  {:<22} {}", "Entries", archive.entries.len());
    println!("  {:<22} {}", "Mapped titles", index.mapping.len());
    println!("  {:<22} {}", "Auxiliary entries", index.auxiliary.len());
    println!("  {:<22} {:016x}", "Highest save index", index.max_system_index);
    println!();
    println!("  {:<18} {:<18}", "Title ID", "Save folder");
    println!("  {}", "-".repeat(36));
    for (title, save_dir) in &index.mapping {
        println!("  {:<18} {:<18}", title.to_string(), save_dir.to_string());
    }
    for (title, save_dir) in &index.auxiliary {
        println!("  {:<18} {:<18} (auxiliary)", title.to_string(), save_dir.to_string());
    }
    println!();
    Ok(())
}

/// Print config locations and the effective configuration, or save it.
fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        let path = ryusync::config::save_config(config)?;
        println!("  Wrote {}", path.display());
        return Ok(());
    }

    let config_path = ryusync::config::config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    println!();
    println!("  {:<14} {}", "Config file", config_path);
    println!(
        "  {:<14} {}",
        "Log file",
        ryusync::config::log_file_path(config).display()
    );
    println!(
        "  {:<14} {}",
        "Save backups",
        ryusync::config::backup_dir(config).display()
    );
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "ryusync", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Find and read every package below `nsp_dir` with a progress bar.
fn extract_packages(nsp_dir: &Path, extractor: &Hactoolnet) -> anyhow::Result<ExtractedContent> {
    let packages = scan::find_packages(nsp_dir)?;
    let pb = progress_bar(packages.len() as u64, "Reading");
    let content = scan::extract_all(&packages, extractor, &|done, _total, path| {
        pb.set_position(done as u64);
        pb.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
    });
    pb.finish_and_clear();
    Ok(content)
}

fn print_extraction_failures(content: &ExtractedContent) {
    if content.failures.is_empty() {
        return;
    }
    println!();
    println!("  Skipped packages:");
    for failure in &content.failures {
        println!("    {}: {}", failure.path.display(), failure.error);
    }
}

/// Print every decision and the run totals.
fn print_sync_table(report: &SyncReport) {
    use humansize::{format_size, BINARY};

    let prefix = if report.simulated { "[Simulate] " } else { "" };

    println!();
    if !report.synthesized.is_empty() {
        let verb = if report.simulated { "Would add" } else { "Added" };
        println!("  {prefix}{verb} {} save archive entr(ies):", report.synthesized.len());
        for entry in &report.synthesized {
            println!("    {}  ->  {}", entry.title_id, entry.save_dir_id);
        }
        println!();
    }
    if !report.archive_backups.is_empty() {
        for backup in &report.archive_backups {
            println!("  Archive backup: {}", backup.display());
        }
        println!();
    }

    println!(
        "  {:<40} {:<12} {:<6} {:>10}",
        "Title", "Reason", "Copy", "Copied"
    );
    println!("  {}", "-".repeat(71));
    for outcome in &report.outcomes {
        let label: String = outcome.label.chars().take(39).collect();
        let direction = match outcome.decision.direction {
            Some(_) if outcome.source_missing => "skip".to_string(),
            Some(d) => d.to_string(),
            None => "-".to_string(),
        };
        let copied = outcome
            .copied
            .map(|c| format_size(c.bytes, BINARY))
            .unwrap_or_default();
        println!(
            "  {:<40} {:<12} {:<6} {:>10}",
            label,
            outcome.decision.reason.tag(),
            direction,
            copied
        );
        if report.simulated && outcome.copies() {
            if let (Some(src), Some(dst)) = (&outcome.source, &outcome.destination) {
                println!("    {prefix}{} -> {}", src.display(), dst.display());
            }
        }
    }

    if !report.failures.is_empty() {
        println!();
        println!("  Failed:");
        for failure in &report.failures {
            println!("    {} ({}): {}", failure.label, failure.title_id, failure.error);
        }
    }

    println!();
    println!("  {:<25} {}", "Titles", report.outcomes.len() + report.failures.len());
    println!("  {:<25} {}", "Copied", report.copy_count());
    println!("  {:<25} {}", "Failed", report.failures.len());
    if report.cancelled {
        println!("  {:<25} yes", "Cancelled");
    }
    println!();
}
