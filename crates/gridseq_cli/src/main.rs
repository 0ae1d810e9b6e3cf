//! gridseq-run: headless host for sequencer patch graphs
//!
//! Loads a patch graph JSON, builds the module graph, and runs it for a
//! number of frames while tracing watched output ports. Doubles as the
//! reference implementation of the host loop: build, wire, then one
//! tick/update/flip pass per frame.
//!
//! Usage:
//!   gridseq-run run patch.json --frames 48000 --watch seq-1:gate --watch seq-1:cv
//!   gridseq-run validate patch.json
//!   gridseq-run schema

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use gridseq_core::ModuleError;
use gridseq_core::dsp::{get_constructors, get_param_validators, schema};
use gridseq_core::patch::Patch;
use gridseq_core::types::{ClockMessages, Message, PatchGraph, SampleableMap};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

const DEFAULT_SAMPLE_RATE: f32 = 48000.0;
const DEFAULT_FRAMES: u64 = 48000;

/// Headless runner for sequencer patch graphs
#[derive(Parser)]
#[command(name = "gridseq-run")]
#[command(about = "Run, validate, and inspect sequencer patch graphs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a patch for a number of frames and trace watched ports
    Run {
        /// Path to the patch JSON file
        patch: PathBuf,

        /// Number of frames to process
        #[arg(short, long, default_value_t = DEFAULT_FRAMES)]
        frames: u64,

        /// Sample rate in Hz
        #[arg(short, long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: f32,

        /// Port to trace, as module:port. Repeatable. Defaults to every
        /// module's default output.
        #[arg(short, long)]
        watch: Vec<String>,

        /// Print a trace row only when a watched value changes
        #[arg(long)]
        changes_only: bool,

        /// Print at most this many trace rows
        #[arg(long, default_value_t = 64)]
        max_rows: u64,

        /// Dispatch a transport start message before the first frame
        #[arg(long)]
        start: bool,

        /// Output format for the trace
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Parse a patch file and validate every module's params
    Validate {
        /// Path to the patch JSON file
        patch: PathBuf,
    },

    /// Print the JSON schema for every module type
    Schema,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            patch,
            frames,
            sample_rate,
            watch,
            changes_only,
            max_rows,
            start,
            format,
        } => run_patch(
            &patch,
            frames,
            sample_rate,
            &watch,
            changes_only,
            max_rows,
            start,
            format,
        ),
        Commands::Validate { patch } => validate_patch(&patch),
        Commands::Schema => print_schema(),
    };

    if let Err(message) = result {
        eprintln!("{} {}", "error:".red().bold(), message);
        std::process::exit(1);
    }
}

fn load_graph(patch_path: &PathBuf) -> Result<PatchGraph, String> {
    let patch_json = fs::read_to_string(patch_path)
        .map_err(|e| format!("failed to read {:?}: {}", patch_path, e))?;
    serde_json::from_str(&patch_json).map_err(|e| format!("failed to parse patch JSON: {}", e))
}

/// Build and wire a Patch from a PatchGraph
fn build_patch(graph: &PatchGraph, sample_rate: f32) -> Result<Patch, String> {
    let constructors = get_constructors();
    let mut sampleables = SampleableMap::new();

    for module_state in &graph.modules {
        let constructor = constructors.get(&module_state.module_type).ok_or_else(|| {
            ModuleError::UnknownModuleType(module_state.module_type.clone()).to_string()
        })?;

        let module = constructor(&module_state.id, sample_rate)
            .map_err(|e| format!("failed to create module {}: {}", module_state.id, e))?;

        module
            .try_update_params(module_state.params.clone())
            .map_err(|e| format!("failed to update params for {}: {}", module_state.id, e))?;

        sampleables.insert(module_state.id.clone(), module);
    }

    let mut patch = Patch::new(sampleables);
    patch.wire();
    Ok(patch)
}

/// Resolve `--watch module:port` specs, defaulting to every module's
/// default output in patch order.
fn resolve_watches(
    graph: &PatchGraph,
    patch: &Patch,
    specs: &[String],
) -> Result<Vec<(String, String)>, String> {
    if specs.is_empty() {
        let defaults: Vec<(String, String)> = schema()
            .into_iter()
            .filter_map(|m| {
                m.outputs
                    .iter()
                    .find(|o| o.default)
                    .map(|o| (m.name.clone(), o.name.clone()))
            })
            .collect();
        return Ok(graph
            .modules
            .iter()
            .filter_map(|m| {
                defaults
                    .iter()
                    .find(|(t, _)| *t == m.module_type)
                    .map(|(_, port)| (m.id.clone(), port.clone()))
            })
            .collect());
    }

    let mut watches = Vec::with_capacity(specs.len());
    for spec in specs {
        let (id, port) = spec
            .split_once(':')
            .ok_or_else(|| format!("bad watch spec {:?}, expected module:port", spec))?;
        let (id, port) = (id.to_string(), port.to_string());
        // Fail fast on unknown ids/ports rather than mid-run.
        patch
            .get_sample(&id, &port)
            .map_err(|e| format!("cannot watch {}: {}", spec, e))?;
        watches.push((id, port));
    }
    Ok(watches)
}

#[allow(clippy::too_many_arguments)]
fn run_patch(
    patch_path: &PathBuf,
    frames: u64,
    sample_rate: f32,
    watch_specs: &[String],
    changes_only: bool,
    max_rows: u64,
    start: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let graph = load_graph(patch_path)?;

    println!(
        "Loaded patch: {} modules",
        graph.modules.len().to_string().cyan()
    );
    for module in &graph.modules {
        println!("  - {} ({})", module.id.bold(), module.module_type.dimmed());
    }

    let mut patch = build_patch(&graph, sample_rate)?;
    let watches = resolve_watches(&graph, &patch, watch_specs)?;

    if start {
        patch
            .dispatch_message(&Message::Clock(ClockMessages::Start))
            .map_err(|e| format!("transport start failed: {}", e))?;
    }

    println!(
        "\nRunning {} frames ({:.3}s at {}Hz)\n",
        frames,
        frames as f64 / sample_rate as f64,
        sample_rate
    );

    if matches!(format, OutputFormat::Table) && !watches.is_empty() {
        print!("{:>10}", "frame".bold());
        for (id, port) in &watches {
            print!(" {:>14}", format!("{}:{}", id, port).bold());
        }
        println!();
    }

    let mut prev: Vec<f32> = vec![f32::NAN; watches.len()];
    let mut rows_printed = 0u64;
    let started = Instant::now();

    for frame in 0..frames {
        patch.process_frame();

        if watches.is_empty() || rows_printed >= max_rows {
            continue;
        }

        let mut values = Vec::with_capacity(watches.len());
        for (id, port) in &watches {
            values.push(patch.get_sample(id, port).unwrap_or(0.0));
        }

        if changes_only && values == prev {
            continue;
        }
        prev = values.clone();
        rows_printed += 1;

        match format {
            OutputFormat::Table => {
                print!("{:>10}", frame);
                for value in &values {
                    let cell = format!("{:>14.4}", value);
                    if *value >= 2.0 {
                        print!(" {}", cell.green());
                    } else {
                        print!(" {}", cell);
                    }
                }
                println!();
            }
            OutputFormat::Json => {
                let row = serde_json::json!({
                    "frame": frame,
                    "values": watches
                        .iter()
                        .zip(&values)
                        .map(|((id, port), v)| {
                            (format!("{}:{}", id, port), serde_json::json!(v))
                        })
                        .collect::<serde_json::Map<_, _>>(),
                });
                println!("{}", row);
            }
        }
    }

    let elapsed = started.elapsed();
    let ns_per_frame = elapsed.as_nanos() as f64 / frames.max(1) as f64;
    let realtime_budget_ns = 1_000_000_000.0 / sample_rate as f64;

    println!("\n{}", "Timing:".bold());
    println!("  total:     {:?}", elapsed);
    println!("  ns/frame:  {:.2}", ns_per_frame);
    println!(
        "  budget:    {:.2} ns/frame @ {}Hz ({:.2}% used)",
        realtime_budget_ns,
        sample_rate,
        (ns_per_frame / realtime_budget_ns) * 100.0
    );

    Ok(())
}

fn validate_patch(patch_path: &PathBuf) -> Result<(), String> {
    let graph = load_graph(patch_path)?;
    let validators = get_param_validators();
    let mut failures = 0usize;

    for module_state in &graph.modules {
        match validators.get(&module_state.module_type) {
            None => {
                failures += 1;
                println!(
                    "  {} {} ({}): unknown module type",
                    "✗".red(),
                    module_state.id.bold(),
                    module_state.module_type
                );
            }
            Some(validate) => match validate(&module_state.params) {
                Ok(()) => {
                    println!(
                        "  {} {} ({})",
                        "✓".green(),
                        module_state.id.bold(),
                        module_state.module_type
                    );
                }
                Err(e) => {
                    failures += 1;
                    println!(
                        "  {} {} ({}): {}",
                        "✗".red(),
                        module_state.id.bold(),
                        module_state.module_type,
                        e
                    );
                }
            },
        }
    }

    if failures > 0 {
        return Err(format!(
            "{} of {} modules failed validation",
            failures,
            graph.modules.len()
        ));
    }
    println!("\n{}", "All modules valid".green());
    Ok(())
}

fn print_schema() -> Result<(), String> {
    let schemas = schema();
    let json = serde_json::to_string_pretty(&schemas)
        .map_err(|e| format!("failed to serialize schema: {}", e))?;
    println!("{}", json);
    Ok(())
}
