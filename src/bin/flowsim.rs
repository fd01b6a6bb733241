use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use flowsim_rs::controller::{NetworkController, ScenarioSpec};

#[derive(Debug, Parser)]
#[command(name = "flowsim", about = "Flow-level datacenter network simulator")]
struct Args {
    /// Disable tracing output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run a scenario (topology + workload) to completion
    Scenario {
        /// Path to the scenario file
        #[arg(long, default_value = "resources/net-scenario.json")]
        scenario_path: PathBuf,

        /// Print the final report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Build a topology and print its description
    Topology {
        /// Path to the topology file
        #[arg(long)]
        topology_path: PathBuf,

        /// Print a JSON summary instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if args.quiet {
            tracing_subscriber::EnvFilter::new("off")
        } else {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        })
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    match args.cmd {
        Cmd::Scenario {
            scenario_path,
            json,
        } => {
            let report = match ScenarioSpec::from_file(&scenario_path).and_then(|s| s.run()) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("error: scenario {}: {e}", scenario_path.display());
                    return ExitCode::FAILURE;
                }
            };
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(s) => println!("{s}"),
                    Err(e) => {
                        eprintln!("error: serialize report: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!("{}", report.snapshot.describe());
                println!(
                    "events executed: {}  dropped: {}  rejected: {}",
                    report.stats.executed, report.stats.dropped, report.stats.rejected
                );
                println!("{}", report.energy_report);
            }
        }
        Cmd::Topology {
            topology_path,
            json,
        } => {
            let ctrl = match NetworkController::from_topology_file(&topology_path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: topology {}: {e}", topology_path.display());
                    return ExitCode::FAILURE;
                }
            };
            let net = ctrl.network();
            if json {
                let summary = serde_json::json!({
                    "nodes": net.num_nodes(),
                    "hosts": net.hosts().count(),
                    "core_switches": net.core_switches().count(),
                    "internet": net.internet().is_some(),
                    "links": net.links().len() / 2,
                    "power_w": ctrl.energy_recorder().current_consumption().watts(),
                });
                println!("{summary}");
            } else {
                println!("{}", net.describe());
                println!("{}", ctrl.fmt_report());
            }
        }
    }
    ExitCode::SUCCESS
}
