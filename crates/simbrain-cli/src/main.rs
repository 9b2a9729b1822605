//! # Simbrain CLI
//!
//! Command-line driver for the Simbrain network revival: load a JSON network
//! blueprint, run it for a number of ticks and record neuron activations.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use simbrain_core::{RunParams, TimeSeries};
use simbrain_network::{
    BuiltNetwork, NetworkBlueprint, NetworkEvent, NeuronId, NeuronRule, SynapseRule, UpdateMode,
};
use std::path::PathBuf;

const DEMO_BLUEPRINT: &str = include_str!("../../../demos/competitive_learning.json");

#[derive(Parser)]
#[command(name = "simbrain")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "Simbrain network core revival", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Buffered,
    Immediate,
}

impl From<Mode> for UpdateMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Buffered => UpdateMode::Buffered,
            Mode::Immediate => UpdateMode::Immediate,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a network blueprint
    Run {
        /// Blueprint file (JSON)
        blueprint: PathBuf,
        /// Number of ticks
        #[arg(short, long, default_value_t = 100)]
        ticks: u64,
        /// Override the blueprint's update mode
        #[arg(short, long, value_enum)]
        mode: Option<Mode>,
        /// Neuron or group names to record (all neurons when omitted)
        #[arg(short, long)]
        record: Vec<String>,
        /// Record every N ticks
        #[arg(long, default_value_t = 1)]
        every: u64,
        /// Write recorded traces to this file (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the bundled competitive learning network
    Demo {
        /// Number of ticks
        #[arg(short, long, default_value_t = 20)]
        ticks: u64,
    },

    /// List update and learning rules
    Rules,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    match cli.command {
        Commands::Run {
            blueprint,
            ticks,
            mode,
            record,
            every,
            output,
        } => {
            println!("{} {}", "Loading blueprint:".green().bold(), blueprint.display());
            let spec = NetworkBlueprint::from_json_file(&blueprint)
                .with_context(|| format!("reading {}", blueprint.display()))?;
            let mut built = spec.build().context("building network")?;
            if let Some(mode) = mode {
                built.network.set_update_mode(mode.into());
            }

            let targets = record_targets(&built, &record)?;
            let params = RunParams {
                ticks,
                record_interval: every,
            };
            let traces = simulate(&mut built, &params, &targets, true)?;
            print_summary(&built, &targets);

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&traces)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("{} {}", "Traces written to".green(), path.display());
            }
        }

        Commands::Demo { ticks } => {
            println!("{}", "Competitive learning demo".green().bold());
            let mut built = NetworkBlueprint::from_json_str(DEMO_BLUEPRINT)?.build()?;
            let targets = record_targets(&built, &["outputs".to_string(), "readout".to_string()])?;
            let params = RunParams {
                ticks,
                record_interval: 1,
            };
            simulate(&mut built, &params, &targets, true)?;
            print_summary(&built, &targets);

            let weights = built.group("input_weights")?;
            if let Some(group) = built.network.group(weights) {
                println!();
                println!("{}", "Learned weights:".green().bold());
                for sid in group.synapses() {
                    if let Some(s) = built.network.synapse(*sid) {
                        let label = |n: NeuronId| {
                            built
                                .network
                                .neuron(n)
                                .map(|n| n.label().to_string())
                                .unwrap_or_default()
                        };
                        println!(
                            "  {} -> {}  {:.4}",
                            label(s.source()).cyan(),
                            label(s.target()).cyan(),
                            s.strength()
                        );
                    }
                }
            }
        }

        Commands::Rules => {
            println!("{}", "Neuron update rules:".green().bold());
            for name in NeuronRule::names() {
                let rule = NeuronRule::from_name(name)?;
                let kind = if rule.is_generator() { "generator" } else { "" };
                println!("  {:<24} {:?} {}", name.cyan(), rule.time_type(), kind);
            }
            println!();
            println!("{}", "Synapse learning rules:".green().bold());
            for name in SynapseRule::names() {
                println!("  {}", name.cyan());
            }
        }
    }

    Ok(())
}

/// `(label, id)` for every neuron behind `names`; all neurons when empty
fn record_targets(built: &BuiltNetwork, names: &[String]) -> anyhow::Result<Vec<(String, NeuronId)>> {
    let ids = if names.is_empty() {
        built.network.neuron_ids()
    } else {
        let mut ids = Vec::new();
        for name in names {
            ids.extend(built.resolve(name)?);
        }
        ids
    };
    Ok(ids
        .into_iter()
        .map(|id| {
            let label = built
                .network
                .neuron(id)
                .map(|n| n.label())
                .filter(|l| !l.is_empty())
                .map_or_else(|| id.to_string(), str::to_string);
            (label, id)
        })
        .collect())
}

/// Tick the network, recording the targets' activations
fn simulate(
    built: &mut BuiltNetwork,
    params: &RunParams,
    targets: &[(String, NeuronId)],
    show_progress: bool,
) -> anyhow::Result<Vec<TimeSeries>> {
    let mut traces: Vec<TimeSeries> = targets.iter().map(|(label, _)| TimeSeries::new(label)).collect();

    let bar = if show_progress {
        let bar = ProgressBar::new(params.ticks);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} ticks {msg}")?
                .progress_chars("=> "),
        );
        bar
    } else {
        ProgressBar::hidden()
    };
    let progress = bar.clone();
    let listener = built.network.add_listener(move |event: &NetworkEvent| {
        if let NetworkEvent::Updated { time, .. } = event {
            progress.inc(1);
            progress.set_message(format!("t={:.2}", time));
        }
    });

    info!("Running {} tick(s)", params.ticks);
    let network = &mut built.network;
    for _ in 0..params.ticks {
        network.step()?;
        let tick = network.tick_count();
        if params.should_record(tick) {
            let activations = network.activations(&targets.iter().map(|(_, id)| *id).collect::<Vec<_>>())?;
            for (trace, value) in traces.iter_mut().zip(activations.iter()) {
                trace.push(network.time(), *value);
            }
        }
    }
    network.remove_listener(listener);
    bar.finish_with_message(format!("t={:.2}", network.time()));
    debug!("Recorded {} trace(s)", traces.len());
    Ok(traces)
}

fn print_summary(built: &BuiltNetwork, targets: &[(String, NeuronId)]) {
    let net = &built.network;
    println!();
    println!(
        "{} {} tick(s), t = {:.3} ({:?} time)",
        "Finished".green().bold(),
        net.tick_count(),
        net.time(),
        net.time_type()
    );
    println!(
        "  {} neurons, {} synapses, {} groups",
        net.neuron_count(),
        net.synapse_count(),
        net.group_count()
    );
    for (label, id) in targets {
        if let Some(neuron) = net.neuron(*id) {
            let value = format!("{:>8.4}", neuron.activation());
            let value = if neuron.is_clamped() {
                value.dimmed()
            } else {
                value.yellow()
            };
            println!("  {:<16} {}", label.cyan(), value);
        }
    }
}
