mod steps;
mod ui;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use grub_rescue::RescueError;
use tracing_subscriber::EnvFilter;

// ── Global dry-run flag ───────────────────────────────────────────────────────

/// When `true`, the bundle is generated and reported but nothing is written.
/// Set by passing `--dry-run` on the command line.
pub static DRY_RUN: AtomicBool = AtomicBool::new(false);

#[inline]
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::Relaxed)
}

// ── Command line ──────────────────────────────────────────────────────────────

/// Builds a GRUB rescue USB kit: a macOS command file that prepares the stick
/// and the Linux repair script it carries.
#[derive(Debug, Parser)]
#[command(name = "grub-rescue", version, about)]
pub struct Cli {
    /// JSON file with any of: diskDesignator, distro, issueDescription,
    /// architecture, includeOptimizations
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// macOS identifier of the USB stick to erase (e.g. disk4)
    #[arg(long)]
    pub disk: Option<String>,

    /// Distribution installed on the broken machine
    #[arg(long)]
    pub distro: Option<String>,

    /// Free-text description of the boot problem
    #[arg(long)]
    pub issue: Option<String>,

    /// Target architecture (only x86_64)
    #[arg(long)]
    pub arch: Option<String>,

    /// Also apply vm.swappiness / vm.vfs_cache_pressure tuning
    #[arg(long)]
    pub optimize: bool,

    /// Directory the scripts and instructions are written to
    #[arg(long, short = 'o', value_name = "DIR", default_value = ".")]
    pub output: PathBuf,

    /// Print the bundle as JSON on stdout instead of writing files
    #[arg(long)]
    pub json: bool,

    /// Never prompt; use defaults, the config file and flags only
    #[arg(long)]
    pub non_interactive: bool,

    /// Generate and report, but write nothing
    #[arg(long)]
    pub dry_run: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    if cli.dry_run {
        DRY_RUN.store(true, Ordering::Relaxed);
    }
    init_logging();

    if let Err(e) = run(&cli) {
        println!();
        ui::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli) -> Result<(), RescueError> {
    // Machine-readable mode: no banner, no prompts, nothing written.
    if cli.json {
        let raw = steps::collect::layered(cli)?;
        let bundle = grub_rescue::generate(&raw)?;
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    let interactive = !cli.non_interactive && console::user_attended();

    // ── Welcome ───────────────────────────────────────────────────────────────
    ui::print_banner();

    if is_dry_run() {
        ui::print_warning("DRY-RUN MODE: the bundle is generated but no file is written.");
    }

    ui::print_info("This wizard writes two scripts and a short instruction sheet.");
    ui::print_info("Nothing is erased here; the Mac script asks before it formats anything.");

    // ── Step 1: Gather parameters ─────────────────────────────────────────────
    ui::print_step(1, 3, "Rescue Parameters");
    let raw = steps::collect::run(cli, interactive)?;

    // ── Step 2: Validate + compose ────────────────────────────────────────────
    ui::print_step(2, 3, "Script Generation");
    let bundle = steps::compose::run(&raw)?;

    // ── Step 3: Write the bundle ──────────────────────────────────────────────
    ui::print_step(3, 3, "Output");
    steps::write::run(&cli.output, &bundle, interactive)?;

    Ok(())
}
