use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use hlsc::hlsc_ir::{
    apply_ssa_conversion, infer_port_directions, validate_ssa, Design,
};
use hlsc::{BackendConfig, Compiler, ScheduleTable};

/// hlsc - SSA, state machines and pipeline control for scheduled designs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every scope to SSA form and print the IR
    Ssa {
        /// Design file (JSON)
        design: PathBuf,
    },

    /// Build the state-transition graphs of a scheduled design
    Stg {
        /// Design file (JSON)
        design: PathBuf,

        /// Schedules keyed by qualified scope name (JSON)
        #[arg(short, long)]
        schedule: PathBuf,

        /// Backend configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the STGs as JSON to this file instead of printing the listing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Ssa { design } => {
            ssa(&design)?;
        }

        Commands::Stg {
            design,
            schedule,
            config,
            output,
        } => {
            build_stgs(&design, &schedule, config.as_deref(), output.as_deref())?;
        }
    }

    Ok(())
}

fn load_design(path: &Path) -> Result<Design> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read design file: {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse design: {:?}", path))
}

fn ssa(path: &Path) -> Result<()> {
    let mut design = load_design(path)?;
    infer_port_directions(&mut design)?;
    for scope in design.ordered_scopes(true) {
        if design.scope(scope).blocks.is_empty() {
            continue;
        }
        apply_ssa_conversion(&mut design, scope)?;
        validate_ssa(&design, scope)
            .with_context(|| format!("'{}' is not in SSA form", design.scope(scope).name))?;
        println!("{}", design.dump_scope(scope));
    }
    Ok(())
}

fn build_stgs(
    design_path: &Path,
    schedule_path: &Path,
    config_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let design = load_design(design_path)?;
    let schedules = ScheduleTable::load(schedule_path)?;
    let config = match config_path {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::default(),
    };
    info!("Loaded {} schedules", schedules.len());

    let compiled = Compiler::new(schedules).with_config(config).compile(design)?;

    match output {
        Some(path) => {
            let by_scope: Vec<(&str, &[hlsc::hlsc_stg::Stg])> = compiled
                .stgs
                .iter()
                .map(|(id, stgs)| (compiled.design.scope(*id).name.as_str(), stgs.as_slice()))
                .collect();
            let json = serde_json::to_string_pretty(&by_scope)?;
            fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            println!("✅ Wrote {} STG sets to {:?}", by_scope.len(), path);
        }
        None => print!("{}", compiled.listing()),
    }
    Ok(())
}
