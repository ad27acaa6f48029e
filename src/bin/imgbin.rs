use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use imgbin::app::{App, FindOptions};
use imgbin::binaries::ImageBinariesResponse;
use imgbin::catalog::CatalogStore;
use imgbin::config::{ConfigLoader, ResolvedConfig};
use imgbin::domain::ImageId;
use imgbin::error::{Cancel, ImgbinError};
use imgbin::output::{ConsoleProgress, JsonOutput, OutputMode};
use imgbin::policy::SessionPolicy;
use imgbin::pyramids::{FindPyramidsResponse, ScanOptions};
use imgbin::request::ProgressSink;
use imgbin::store::Store;

#[derive(Parser)]
#[command(name = "imgbin")]
#[command(about = "Inspect and manage the binary files behind stored images")]
#[command(version)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Pyramid files in the repository")]
    Pyramids(PyramidsArgs),
    #[command(about = "Pixel, pyramid and thumbnail files of an image")]
    Binaries(BinariesArgs),
    #[command(about = "Original files an image was imported from")]
    Files(ImageArgs),
    #[command(about = "Original metadata of an image")]
    Metadata(ImageArgs),
}

#[derive(Args)]
struct PyramidsArgs {
    #[command(subcommand)]
    command: PyramidsCommand,
}

#[derive(Subcommand)]
enum PyramidsCommand {
    #[command(about = "List images that have a pyramid on disk")]
    Find(FindArgs),
}

#[derive(Args)]
struct FindArgs {
    #[arg(long)]
    limit: Option<usize>,

    #[arg(long)]
    suffix: Option<String>,

    /// Skip empty pyramids that have a lock marker next to them.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    check_empty: Option<bool>,

    /// Keep only pyramids stored little-endian (`true`) or big-endian (`false`).
    #[arg(long)]
    little_endian: Option<bool>,

    #[arg(long, value_parser = parse_timestamp)]
    imported_after: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct BinariesArgs {
    #[command(subcommand)]
    command: BinariesCommand,
}

#[derive(Subcommand)]
enum BinariesCommand {
    #[command(about = "Report sizes without changing anything")]
    Info(ImageArgs),
    #[command(about = "Move pixels to backup and/or delete the pyramid")]
    Manage(ManageArgs),
}

#[derive(Args)]
struct ImageArgs {
    image: String,
}

#[derive(Args)]
struct ManageArgs {
    image: String,

    #[arg(long)]
    toggle_pixels: bool,

    #[arg(long)]
    delete_pyramid: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ImgbinError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ImgbinError) -> u8 {
    match error {
        ImgbinError::Cancelled(_) => 2,
        ImgbinError::MissingConfig
        | ImgbinError::ConfigRead(_)
        | ImgbinError::ConfigParse(_)
        | ImgbinError::InvalidScanOptions(_) => 2,
        _ => 1,
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ImgbinError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| ImgbinError::InvalidTimestamp(value.to_string()))
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = load_config(cli.config.as_deref())?;
    let store = match &config.data_dir {
        Some(dir) => Store::new_with_root(dir.clone()),
        None => Store::new()?,
    };
    let catalog = config.catalog_path(store.root());
    let records = CatalogStore::load(&catalog).map_err(ImgbinError::from)?;
    let policy = SessionPolicy::new(config.user, config.admin);
    tracing::debug!(root = %store.root(), %catalog, "repository opened");
    let app = App::new(store, records, policy);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &ConsoleProgress,
    };

    match cli.command {
        Commands::Pyramids(PyramidsArgs {
            command: PyramidsCommand::Find(args),
        }) => {
            let options = find_options(&config.scan, args)?;
            let result = app.find_pyramids(options, sink);
            emit(output_mode, result, print_find_summary)
        }
        Commands::Binaries(BinariesArgs { command }) => match command {
            BinariesCommand::Info(args) => {
                let image = parse_image(&args.image)?;
                emit(
                    output_mode,
                    app.image_binaries(image, sink),
                    print_binaries_summary,
                )
            }
            BinariesCommand::Manage(args) => {
                let image = parse_image(&args.image)?;
                let result =
                    app.manage_binaries(image, args.toggle_pixels, args.delete_pyramid, sink);
                emit(output_mode, result, print_binaries_summary)
            }
        },
        Commands::Files(args) => {
            let image = parse_image(&args.image)?;
            emit(output_mode, app.used_files(image, sink), print_json_summary)
        }
        Commands::Metadata(args) => {
            let image = parse_image(&args.image)?;
            emit(
                output_mode,
                app.original_metadata(image, sink),
                print_json_summary,
            )
        }
    }
}

fn find_options(defaults: &ScanOptions, args: FindArgs) -> Result<FindOptions, ImgbinError> {
    let mut scan = defaults.clone();
    if let Some(limit) = args.limit {
        scan.limit = limit;
    }
    if let Some(suffix) = args.suffix {
        scan.suffix = suffix;
    }
    if let Some(check_empty) = args.check_empty {
        scan.check_empty_file = check_empty;
    }
    scan.validate()?;
    Ok(FindOptions {
        scan,
        little_endian: args.little_endian,
        imported_after: args.imported_after,
    })
}

fn load_config(path: Option<&str>) -> Result<ResolvedConfig, ImgbinError> {
    match ConfigLoader::resolve(path) {
        Err(ImgbinError::MissingConfig) => {
            tracing::debug!("no imgbin.json found, using defaults");
            ConfigLoader::resolve_config(Default::default())
        }
        other => other,
    }
}

fn parse_image(value: &str) -> Result<ImageId, ImgbinError> {
    value.parse()
}

fn emit<T: Serialize>(
    output_mode: OutputMode,
    result: Result<T, Cancel>,
    summary: fn(&T),
) -> miette::Result<()> {
    match (output_mode, result) {
        (OutputMode::NonInteractive, Ok(value)) => JsonOutput::print(&value).into_diagnostic(),
        (OutputMode::Interactive, Ok(value)) => {
            summary(&value);
            Ok(())
        }
        (OutputMode::NonInteractive, Err(cancel)) => {
            JsonOutput::print_cancel(&cancel).into_diagnostic()?;
            Err(ImgbinError::from(cancel).into())
        }
        (OutputMode::Interactive, Err(cancel)) => Err(ImgbinError::from(cancel).into()),
    }
}

fn print_find_summary(result: &FindPyramidsResponse) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}imgbin pyramid scan{reset}");
    println!("{green}images with pyramids: {}{reset}", result.pyramid_files.len());
    if result.in_progress > 0 {
        println!("{yellow}still being written: {}{reset}", result.in_progress);
    }
    if result.skipped > 0 {
        println!("{yellow}unresolved candidates: {}{reset}", result.skipped);
    }
    for image in &result.pyramid_files {
        println!("  image {image}");
    }
}

fn print_binaries_summary(result: &ImageBinariesResponse) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    let flag = |present: bool| {
        if present {
            format!("{green}present{reset}")
        } else {
            format!("{yellow}missing{reset}")
        }
    };

    match result.image {
        Some(image) => println!("{cyan}image {image}{reset}"),
        None => println!("{cyan}image ?{reset}"),
    }
    match result.fileset {
        Some(fileset) => println!("  fileset:    {fileset}"),
        None => println!("  fileset:    {yellow}none{reset}"),
    }
    println!(
        "  pixels:     {} ({} bytes)",
        flag(result.pixels_present),
        result.pixel_size
    );
    if result.backup_present {
        println!("  backup:     {}", flag(true));
    }
    println!(
        "  pyramid:    {} ({} bytes)",
        flag(result.pyramid_present),
        result.pyramid_size
    );
    println!("  thumbnails: {} bytes", result.thumbnail_size);
    println!(
        "  archived:   {} files, {} bytes",
        result.archived_files.len(),
        result.archived_size
    );
}

fn print_json_summary<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to render result: {err}"),
    }
}
