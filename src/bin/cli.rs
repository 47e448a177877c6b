//! Binary entry point for the microtile CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use microtile::{
    cli::graph_json::{
        parse_tags, read_document, write_document, CellDocument, CellSummary, CliError,
    },
    codec::{CellGeometry, CodecOptions, DecodeScratch, DenyListValidator, MicroCache},
    logging::init_logging,
    primitives::frame,
};
use serde::Serialize;
use tracing::debug;

use crate::config::CliConfig;

const DEFAULT_DIVISOR: i32 = 80;
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser, Debug)]
#[command(
    name = "microtile",
    version,
    about = "Encode, decode and inspect routing microcache tiles",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "MICROTILE_CONFIG",
        value_name = "FILE",
        help = "Path to the CLI config file"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Log filter, e.g. info or microtile::codec=trace"
    )]
    log_level: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Encode a JSON cell document into a sealed tile")]
    Encode {
        #[arg(value_name = "GRAPH")]
        graph: PathBuf,

        #[arg(short, long, value_name = "TILE", help = "Output tile path")]
        output: PathBuf,
    },

    #[command(about = "Decode a sealed tile into a JSON cell document")]
    Decode {
        #[arg(value_name = "TILE")]
        tile: PathBuf,

        #[command(flatten)]
        cell: CellArgs,

        #[arg(
            long = "deny-way-tags",
            value_name = "TAGS",
            help = "Way tag set whose links are dropped (repeatable)"
        )]
        deny_way_tags: Vec<String>,

        #[arg(short, long, value_name = "GRAPH", help = "Output document path (stdout if omitted)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Print node, link and geometry counts of a sealed tile")]
    Inspect {
        #[arg(value_name = "TILE")]
        tile: PathBuf,

        #[command(flatten)]
        cell: CellArgs,
    },
}

#[derive(Args, Debug)]
struct CellArgs {
    #[arg(long, allow_hyphen_values = true, help = "Cell column index")]
    lon_idx: i32,

    #[arg(long, allow_hyphen_values = true, help = "Cell row index")]
    lat_idx: i32,

    #[arg(long, help = "Cells per degree (config or 80 if omitted)")]
    divisor: Option<i32>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    tile_bytes: usize,
    payload_bytes: usize,
    #[serde(flatten)]
    summary: CellSummary,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    let level = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .or_else(|| config.log_level().map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned());
    init_logging(&level)?;
    debug!(path = ?config.path(), "cli.config.loaded");

    match &cli.command {
        Command::Encode { graph, output } => run_encode(&cli, graph, output)?,
        Command::Decode {
            tile,
            cell,
            deny_way_tags,
            output,
        } => {
            let raw = read_file(tile)?;
            let cache = decode_tile(&config, frame::open(&raw)?, cell, deny_way_tags)?;
            let doc = CellDocument::from_cache(&cache)?;
            match output {
                Some(path) => {
                    write_document(path, &doc)?;
                    if cli.format == OutputFormat::Text {
                        println!("Decoded {} nodes into {}", doc.nodes.len(), path.display());
                    }
                }
                None => println!("{}", serde_json::to_string_pretty(&doc)?),
            }
        }
        Command::Inspect { tile, cell } => {
            let raw = read_file(tile)?;
            let payload = frame::open(&raw)?;
            let cache = decode_tile(&config, payload, cell, &[])?;
            let report = InspectReport {
                tile_bytes: raw.len(),
                payload_bytes: payload.len(),
                summary: CellSummary::of(&cache)?,
            };
            emit(cli.format, &report, || print_inspect_text(&report))?;
        }
    }

    Ok(())
}

fn run_encode(cli: &Cli, graph: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
    let doc = read_document(graph)?;
    let cache = doc.to_cache()?;
    let mut payload = Vec::new();
    let report = cache.encode_with_report(&CodecOptions::default(), &mut payload)?;
    let sealed = frame::seal(&payload);
    fs::write(output, &sealed).map_err(|source| CliError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    emit(cli.format, &report, || {
        println!(
            "Encoded {} nodes into {} bytes ({} sealed, link data {} bytes)",
            report.nodes,
            report.encoded_len,
            sealed.len(),
            report.link_data_size
        );
    })
}

fn decode_tile(
    config: &CliConfig,
    payload: &[u8],
    args: &CellArgs,
    deny_way_tags: &[String],
) -> Result<MicroCache, Box<dyn Error>> {
    let divisor = args
        .divisor
        .or_else(|| config.divisor())
        .unwrap_or(DEFAULT_DIVISOR);
    let cell = CellGeometry::new(args.lon_idx, args.lat_idx, divisor)?;

    let denied = deny_way_tags
        .iter()
        .chain(config.deny_way_tags())
        .map(|text| parse_tags(Some(text)))
        .filter_map(Result::transpose)
        .collect::<Result<Vec<_>, CliError>>()?;
    let validator = DenyListValidator::new(denied);

    let mut scratch = DecodeScratch::new();
    let cache = if validator.is_empty() {
        MicroCache::decode(payload, cell, &mut scratch, None, None)?
    } else {
        MicroCache::decode(payload, cell, &mut scratch, Some(&validator), None)?
    };
    Ok(cache)
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_inspect_text(report: &InspectReport) {
    let s = &report.summary;
    println!(
        "Tile: bytes={} payload={} records={}",
        report.tile_bytes, report.payload_bytes, s.record_bytes
    );
    println!("Nodes: {}", s.nodes);
    println!(
        "Links: forward={} reverse={} internal={} external={}",
        s.forward_links, s.reverse_links, s.internal_links, s.external_links
    );
    println!("Geometry points: {}", s.geometry_points);
}
