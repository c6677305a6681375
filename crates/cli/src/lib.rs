use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use report::{PruneReport, StampReport, StampedEntry};
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use verkeep_core::{
    Batch, OutputFile, Placement, PruneScope, Retention, Settings, Stamped, VersionManager,
};

mod report;

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "verkeep")]
#[command(about = "Version build artifacts and prune old copies", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./verkeep.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Counter file (overrides VERKEEP_ENV_FILE and the config file)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for results)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stored version of a variable
    Get(GetArgs),

    /// Increment (or force) a variable and print the new version
    Bump(BumpArgs),

    /// Print the versioned name of a file
    Name(NameArgs),

    /// Delete old versioned copies in a directory
    Prune(PruneArgs),

    /// Copy build outputs into a directory under versioned names
    Stamp(StampArgs),
}

#[derive(Args)]
struct GetArgs {
    variable: String,
}

#[derive(Args)]
struct BumpArgs {
    variable: String,

    /// Set the version to this value instead of incrementing
    #[arg(long)]
    force: Option<u64>,
}

#[derive(Args)]
struct NameArgs {
    file: String,

    /// Counter variable (default: the file extension)
    #[arg(long)]
    variable: Option<String>,

    /// Place the version right before the final extension
    #[arg(long)]
    trailing: bool,

    /// Increment the counter before rendering the name
    #[arg(long)]
    bump: bool,
}

#[derive(Args)]
struct PruneArgs {
    directory: PathBuf,

    /// Unversioned file name the versioned copies derive from
    original: String,

    /// Versions to keep (default from config, 5)
    #[arg(long)]
    keep: Option<usize>,

    /// Only prune the family of `original`, not every family in the directory
    #[arg(long)]
    family: bool,

    /// Count a version about to be written towards `keep`
    #[arg(long)]
    pending: bool,
}

#[derive(Args)]
struct StampArgs {
    /// Destination directory for the versioned copies
    #[arg(long)]
    dest: PathBuf,

    /// Build outputs to copy
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Counter variable shared by all files (default: each file's extension)
    #[arg(long)]
    variable: Option<String>,

    /// Versions to keep per file (default from config, 5)
    #[arg(long)]
    keep: Option<usize>,

    /// Place the version right before the final extension
    #[arg(long)]
    trailing: bool,

    /// Skip files whose name contains this substring
    #[arg(long)]
    exclude: Option<String>,

    /// Reuse the stored version instead of incrementing
    #[arg(long)]
    no_increment: bool,
}

pub fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let cwd = env::current_dir().context("Failed to resolve working directory")?;
    let mut settings = Settings::load(&cwd, cli.config.as_deref())?;
    if let Some(env_file) = &cli.env_file {
        settings.env_file = cwd.join(env_file);
    }
    log::debug!("Counter file: {}", settings.env_file.display());

    match cli.command {
        Commands::Get(args) => run_get(args, settings),
        Commands::Bump(args) => run_bump(args, settings),
        Commands::Name(args) => run_name(args, settings),
        Commands::Prune(args) => run_prune(args, settings),
        Commands::Stamp(args) => run_stamp(args, settings),
    }
}

fn run_get(args: GetArgs, settings: Settings) -> Result<()> {
    let mut manager = VersionManager::from_settings(settings);
    if let Some(version) = manager.get_version(&args.variable)? {
        print_stdout(&version.to_string())?;
    }
    Ok(())
}

fn run_bump(args: BumpArgs, settings: Settings) -> Result<()> {
    let mut manager = VersionManager::from_settings(settings);
    let version = manager
        .update_version(&args.variable, args.force)
        .with_context(|| format!("Failed to update version of '{}'", args.variable))?;
    print_stdout(&version.to_string())
}

fn run_name(args: NameArgs, settings: Settings) -> Result<()> {
    let placement = placement_for(args.trailing, &settings);
    let variable = args.variable.as_deref().or(settings.variable.as_deref());
    let variable = variable.map(str::to_string);
    let mut manager = VersionManager::from_settings(settings);
    let name = if args.bump {
        manager.update_version_name(&args.file, variable.as_deref(), placement)?
    } else {
        manager.get_version_name(&args.file, variable.as_deref(), placement)?
    };
    print_stdout(&name)
}

fn run_prune(args: PruneArgs, mut settings: Settings) -> Result<()> {
    let keep = args.keep.unwrap_or(settings.keep);
    if keep == 0 {
        bail!("--keep must be at least 1");
    }
    if args.family {
        settings.prune_scope = PruneScope::Family;
    }
    let retention = if args.pending {
        Retention::counting_pending(keep)
    } else {
        Retention::existing(keep)
    };

    let manager = VersionManager::from_settings(settings);
    let deleted = manager.prune(&args.directory, &args.original, retention)?;
    let report = PruneReport {
        directory: args.directory,
        original: args.original,
        keep,
        deleted,
    };
    print_stdout(&serde_json::to_string_pretty(&report)?)
}

fn run_stamp(args: StampArgs, settings: Settings) -> Result<()> {
    let placement = placement_for(args.trailing, &settings);
    fs::create_dir_all(&args.dest)
        .with_context(|| format!("Failed to create {}", args.dest.display()))?;

    let mut manager = VersionManager::from_settings(settings);
    let mut template = manager.request(&args.dest, "").with_placement(placement);
    if let Some(variable) = &args.variable {
        template.variable = Some(variable.clone());
    }
    if let Some(exclude) = &args.exclude {
        template.exclusions = Some(exclude.clone());
    }
    if let Some(keep) = args.keep {
        if keep == 0 {
            bail!("--keep must be at least 1");
        }
        template.keep = keep;
    }

    let mut batch = if args.no_increment {
        Batch::reusing(template)
    } else {
        Batch::new(template)
    };

    let mut entries = Vec::with_capacity(args.files.len());
    for source in &args.files {
        let contents =
            fs::read(source).with_context(|| format!("Failed to read {}", source.display()))?;
        let name = source
            .file_name()
            .with_context(|| format!("{} has no file name", source.display()))?;
        let output = OutputFile::buffered(args.dest.join(name), contents);

        let entry = match batch.stamp(&mut manager, output) {
            Stamped::Renamed { file, outcome } => {
                write_output(&file)?;
                StampedEntry {
                    source: source.clone(),
                    output: Some(file.path),
                    outcome: Some(outcome),
                }
            }
            Stamped::PassedThrough(file) => {
                write_output(&file)?;
                StampedEntry {
                    source: source.clone(),
                    output: Some(file.path),
                    outcome: None,
                }
            }
            Stamped::Dropped { .. } => StampedEntry {
                source: source.clone(),
                output: None,
                outcome: None,
            },
        };
        entries.push(entry);
    }

    let report = StampReport {
        destination: args.dest,
        files: entries,
    };
    log::info!("Wrote {} of {} files", report.written(), report.files.len());
    print_stdout(&serde_json::to_string_pretty(&report)?)
}

fn write_output(file: &OutputFile) -> Result<()> {
    let Some(contents) = &file.contents else {
        return Ok(());
    };
    fs::write(&file.path, contents)
        .with_context(|| format!("Failed to write {}", file.path.display()))
}

fn placement_for(trailing: bool, settings: &Settings) -> Placement {
    if trailing {
        Placement::Trailing
    } else {
        settings.placement
    }
}
