use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use cptsim_config::{CheckpointMode, SimConfig, DEFAULT_PMEM_BASE};
use cptsim_core::arch::NUM_GPRS;
use cptsim_core::checkpoint::compress::open_gzip;
use cptsim_core::checkpoint::layout::CheckpointLayout;
use cptsim_core::checkpoint::path::{DirPathManager, PathManager};
use cptsim_core::checkpoint::serializer::extract_registers;
use cptsim_core::checkpoint::simpoint::SimPointManifest;
use cptsim_core::memory::PhysicalMemory;
use cptsim_core::{SimContext, SimulationError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "CptSim checkpoint tool", long_about = None)]
struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode the architectural state stored in a compressed checkpoint
    Inspect {
        /// Path to a `.gz` checkpoint
        checkpoint: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the SimPoints of a workload and the instruction counts they trigger at
    Plan {
        /// Path to the simulator config (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load a raw restorer image into simulated memory
    Restore {
        /// Path to the simulator config (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Raw image to load at the restore origin
        image: PathBuf,
    },
}

#[derive(Serialize, Debug)]
struct CheckpointSummary {
    image_size: usize,
    sha256: String,
    pc: u64,
    gpr: Vec<u64>,
    fpr: Vec<u64>,
    /// Non-zero CSRs by address.
    csr: BTreeMap<String, u64>,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        error!("{:#}", e);
        // Simulated state is exact or worthless; never carry on past a core failure.
        if e.downcast_ref::<SimulationError>().is_some() {
            std::process::abort();
        }
        std::process::exit(1);
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Inspect { checkpoint, json } => inspect(&checkpoint, json),
        Command::Plan { config } => plan(&config),
        Command::Restore { config, image } => restore(config.as_deref(), &image),
    }
}

fn inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    info!("Inspecting checkpoint: {:?}", path);
    let mut image = Vec::new();
    open_gzip(path)
        .with_context(|| format!("Failed to open checkpoint {:?}", path))?
        .read_to_end(&mut image)
        .with_context(|| format!("Failed to decompress checkpoint {:?}", path))?;

    let sha256 = Sha256::digest(&image)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    let pmem = PhysicalMemory::from_bytes(image, DEFAULT_PMEM_BASE);
    let state = extract_registers(&CheckpointLayout::default(), &pmem)?;

    let summary = CheckpointSummary {
        image_size: pmem.len(),
        sha256,
        pc: state.pc,
        gpr: state.gpr.to_vec(),
        fpr: state.fpr.to_vec(),
        csr: state
            .csr
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(|(addr, &v)| (format!("{:#05x}", addr), v))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Image size: {:#x} bytes", summary.image_size);
    println!("SHA-256:    {}", summary.sha256);
    println!("PC:         {:#018x}", summary.pc);
    for i in (0..NUM_GPRS).filter(|&i| summary.gpr[i] != 0) {
        println!("x{:<2}        {:#018x}", i, summary.gpr[i]);
    }
    for (addr, value) in &summary.csr {
        println!("csr {}   {:#018x}", addr, value);
    }
    Ok(())
}

fn plan(config_path: &Path) -> anyhow::Result<()> {
    let config = SimConfig::from_file(config_path)?;
    if config.checkpoint.mode != CheckpointMode::Simpoint {
        anyhow::bail!("Config {:?} does not enable simpoint checkpointing", config_path);
    }

    let paths = DirPathManager::from_config(&config.checkpoint);
    let manifest = SimPointManifest::load(&paths.simpoint_dir())?;
    let interval = config.checkpoint.interval;

    println!(
        "{} simpoints, interval {} instructions",
        manifest.len(),
        interval
    );
    for (point, trigger) in manifest.trigger_points(interval) {
        match trigger {
            Some(at) => println!(
                "id {:>4}  location {:>8}  weight {:.6}  at {}",
                point.id, point.location, point.weight, at
            ),
            None => println!(
                "id {:>4}  location {:>8}  weight {:.6}  unreachable",
                point.id, point.location, point.weight
            ),
        }
    }
    Ok(())
}

fn restore(config_path: Option<&Path>, image: &Path) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    let mut ctx = SimContext::from_config(&config)?;

    let loaded = ctx.serializer.restore(image, &mut ctx.pmem)?;
    println!("Loaded {:#x} bytes from {:?}", loaded, image);

    match extract_registers(ctx.serializer.layout(), &ctx.pmem) {
        Ok(state) => println!("Image carries a checkpoint, PC {:#x}", state.pc),
        Err(SimulationError::InvalidCheckpoint(_)) => println!("Image carries no register state"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
