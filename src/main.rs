//! nandtags CLI
//!
//! Drives the tags layer against a NAND image file backed by [`MemNand`].
//!
//! ```text
//! ┌────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │  image on  │───▶│  MemNand (RAM)   │───▶│  Device + tags   │──▶ JSON
//! │    disk    │◀───│  saved on change │◀───│  operations      │    stdout
//! └────────────┘    └──────────────────┘    └──────────────────┘
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nandtags::{BlockState, Device, DeviceConfig, ExtendedTags, MemNand};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Inspect and modify NAND images through the tags compatibility layer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// NAND image file
    #[arg(long, env = "NANDTAGS_IMAGE")]
    image: PathBuf,

    /// Device configuration (YAML, or JSON with a .json extension)
    #[arg(long, env = "NANDTAGS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an erased image
    Format {
        /// Number of blocks; defaults to end_block + 1 from the configuration
        #[arg(long)]
        blocks: Option<u32>,
    },

    /// Write a chunk with tags
    Write {
        #[arg(long)]
        chunk: u32,

        #[arg(long, default_value = "0")]
        object_id: u32,

        #[arg(long, default_value = "0")]
        chunk_id: u32,

        /// Defaults to the length of the data
        #[arg(long)]
        byte_count: Option<u32>,

        #[arg(long, default_value = "0")]
        serial: u8,

        /// File holding the chunk data; padded with 0xFF
        #[arg(long, conflicts_with = "fill")]
        data: Option<PathBuf>,

        /// Fill the whole data area with this byte
        #[arg(long)]
        fill: Option<u8>,

        /// Write a deletion marker instead of tags
        #[arg(long, conflicts_with_all = ["data", "fill"])]
        deleted: bool,
    },

    /// Read a chunk and its tags
    Read {
        #[arg(long)]
        chunk: u32,

        /// Write the corrected data area to this file
        #[arg(long)]
        data_out: Option<PathBuf>,
    },

    /// Mark a block bad
    MarkBad {
        #[arg(long)]
        block: u32,
    },

    /// Classify one block
    Query {
        #[arg(long)]
        block: u32,
    },

    /// Classify every block in the configured range
    Scan,

    /// Read every valid chunk and report ECC counters
    Stats,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => DeviceConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => DeviceConfig::default(),
    };

    match args.command {
        Command::Format { blocks } => format_image(&args.image, config, blocks),
        command => run(&args.image, config, command),
    }
}

/// Initialize tracing on stderr
fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

fn format_image(image: &Path, mut config: DeviceConfig, blocks: Option<u32>) -> anyhow::Result<()> {
    if let Some(blocks) = blocks {
        if blocks == 0 {
            bail!("--blocks must be at least 1");
        }
        config.end_block = blocks - 1;
    }
    config.validate().context("invalid geometry")?;

    let nand = MemNand::for_config(&config);
    nand.save(image)
        .with_context(|| format!("writing image {}", image.display()))?;
    info!(image = %image.display(), blocks = config.total_blocks(), "image formatted");

    print_json(&json!({
        "image": image.display().to_string(),
        "blocks": config.total_blocks(),
        "chunks_per_block": config.chunks_per_block,
        "data_bytes_per_chunk": config.data_bytes_per_chunk,
    }))
}

fn run(image: &Path, config: DeviceConfig, command: Command) -> anyhow::Result<()> {
    let nand = MemNand::load(image, &config)
        .with_context(|| format!("loading image {}", image.display()))?;
    let mut device = Device::new(config, nand)?;
    let page = device.config().data_bytes_per_chunk;

    match command {
        Command::Format { .. } => bail!("format does not operate on an existing image"),

        Command::Write {
            chunk,
            object_id,
            chunk_id,
            byte_count,
            serial,
            data,
            fill,
            deleted,
        } => {
            let buf = match (data, fill) {
                (Some(path), _) => {
                    let mut bytes = std::fs::read(&path)
                        .with_context(|| format!("reading data {}", path.display()))?;
                    if bytes.len() > page {
                        bail!("data is {} bytes, chunk holds {}", bytes.len(), page);
                    }
                    let len = bytes.len();
                    bytes.resize(page, 0xFF);
                    Some((bytes, len))
                }
                (None, Some(byte)) => Some((vec![byte; page], page)),
                (None, None) => None,
            };

            let tags = if deleted {
                ExtendedTags::deleted()
            } else {
                let count = byte_count.unwrap_or(buf.as_ref().map_or(0, |(_, len)| *len as u32));
                ExtendedTags::new(object_id, chunk_id, count, serial)
            };

            device.write_chunk_tags(chunk, buf.as_ref().map(|(b, _)| b.as_slice()), &tags)?;
            save(&device, image)?;
            print_json(&json!({ "chunk": chunk, "written": true, "tags": tags }))
        }

        Command::Read { chunk, data_out } => {
            let mut buf = vec![0u8; page];
            let mut tags = ExtendedTags::default();
            device.read_chunk_tags(chunk, Some(&mut buf), Some(&mut tags))?;
            if let Some(path) = data_out {
                std::fs::write(&path, &buf)
                    .with_context(|| format!("writing data {}", path.display()))?;
            }
            print_json(&json!({
                "chunk": chunk,
                "tags": tags,
                "stats": device.stats(),
                "retiring_blocks": device.block_info().retiring_blocks(),
            }))
        }

        Command::MarkBad { block } => {
            device.mark_bad(block)?;
            save(&device, image)?;
            let query = device.query_block(block)?;
            print_json(&json!({ "block": block, "state": query.state }))
        }

        Command::Query { block } => {
            let query = device.query_block(block)?;
            print_json(&json!({ "block": block, "query": query }))
        }

        Command::Scan => {
            let (start, end) = (device.config().start_block, device.config().end_block);
            let mut blocks = Vec::new();
            let (mut dead, mut empty, mut in_use) = (0u32, 0u32, 0u32);
            for block in start..=end {
                let query = device.query_block(block)?;
                match query.state {
                    BlockState::Dead => dead += 1,
                    BlockState::Empty => empty += 1,
                    BlockState::NeedsScanning => in_use += 1,
                }
                blocks.push(json!({ "block": block, "state": query.state }));
            }
            print_json(&json!({
                "blocks": blocks,
                "dead": dead,
                "empty": empty,
                "needs_scanning": in_use,
            }))
        }

        Command::Stats => {
            let first = device.config().first_valid_chunk();
            let end = device.config().total_blocks() * device.config().chunks_per_block;
            let mut buf = vec![0u8; page];
            let mut used = 0u32;
            let mut deleted = 0u32;
            for chunk in first..end {
                let mut tags = ExtendedTags::default();
                device.read_chunk_tags(chunk, Some(&mut buf), Some(&mut tags))?;
                used += u32::from(tags.chunk_used);
                deleted += u32::from(tags.chunk_deleted);
            }
            print_json(&json!({
                "chunks_read": end - first,
                "chunks_used": used,
                "chunks_deleted": deleted,
                "stats": device.stats(),
                "retiring_blocks": device.block_info().retiring_blocks(),
            }))
        }
    }
}

fn save(device: &Device<MemNand>, image: &Path) -> anyhow::Result<()> {
    device
        .driver()
        .save(image)
        .with_context(|| format!("writing image {}", image.display()))
}
