use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use numaplace_core::{
    evaluate_with_ratio, spread_placement, AccessCost, CpuSet, FleetSimulation, HostConfig,
    HostParts, NumaError, NumaResult, Placement, Planner, VmRequestConfig,
};

#[derive(Parser)]
#[command(name = "numaplace")]
#[command(version)]
#[command(about = "NUMA-aware vCPU placement planner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Plan the CPUs for a single VM
    Plan {
        /// Host description (TOML)
        #[arg(long)]
        host: PathBuf,

        /// Number of virtual CPUs
        #[arg(long)]
        vcpus: u32,

        /// Guest memory in MiB
        #[arg(long, default_value = "0")]
        memory_mb: u64,

        /// Eligible host CPUs in cpulist form (e.g. 0-3,8); all CPUs when omitted
        #[arg(long)]
        affinity: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Place a fleet of identical VMs and compare against the spread baseline
    Simulate {
        /// Host description (TOML)
        #[arg(long)]
        host: PathBuf,

        /// Number of VMs to start
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        vms: u32,

        /// vCPUs per VM (default: host CPUs / VMs, at least 2)
        #[arg(long)]
        vcpus: Option<u32>,

        /// Memory per VM in MiB (default: an even share of host memory)
        #[arg(long)]
        memory_mb: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load and validate a host description
    Validate {
        /// Host description (TOML)
        #[arg(long)]
        host: PathBuf,
    },
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    placement: &'a Placement,
    cost: AccessCost,
    baseline: Option<AccessCost>,
}

fn main() -> NumaResult<()> {
    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "numaplace=info"
            .parse()
            .map_err(|e| NumaError::ConfigError(format!("Invalid log directive: {}", e)))?,
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        if e.is_configuration_error() {
            eprintln!("Invalid host or request: {}", e);
            std::process::exit(2);
        }
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn run(cli: Cli) -> NumaResult<()> {
    match cli.command {
        Commands::Plan {
            host,
            vcpus,
            memory_mb,
            affinity,
            json,
        } => {
            let parts = HostConfig::load(&host)?.into_parts()?;
            let affinity = affinity.map(|list| list.parse::<CpuSet>()).transpose()?;
            let request = VmRequestConfig {
                vcpus,
                memory_mb,
                affinity,
            }
            .to_request(&parts.topology)?;

            let planner = Planner::new(parts.planner.clone());
            let Some(placement) = planner.plan_placement(&parts.topology, &parts.node_resources, &request)? else {
                eprintln!(
                    "No NUMA placement fits {} vCPUs and {} MiB on this host",
                    vcpus, memory_mb
                );
                std::process::exit(1);
            };

            let ratio = parts.planner.interconnect_bandwidth_ratio;
            let cost = evaluate_with_ratio(&parts.topology, &[], &placement, ratio)?;
            let baseline = match spread_placement(&parts.topology, &parts.node_resources, &request)? {
                Some(spread) => Some(evaluate_with_ratio(&parts.topology, &[], &spread, ratio)?),
                None => None,
            };

            if json {
                let output = PlanOutput {
                    placement: &placement,
                    cost,
                    baseline,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("CPUs: {}", placement.cpus());
                let nodes: Vec<String> = placement.nodes().iter().map(|n| n.to_string()).collect();
                println!("Nodes: {}", nodes.join(","));
                println!("NUMA-aware cost: {}", cost);
                if let Some(baseline) = baseline {
                    println!("Spread baseline: {}", baseline);
                }
            }
        }
        Commands::Simulate {
            host,
            vms,
            vcpus,
            memory_mb,
            json,
        } => {
            let config = HostConfig::load(&host)?;
            let host_memory_mb = config
                .nodes
                .iter()
                .map(|n| n.memory_mb)
                .fold(0u64, u64::saturating_add);
            let HostParts {
                topology,
                node_resources,
                planner,
            } = config.into_parts()?;

            let vm_count = vms as usize;
            let vm = VmRequestConfig {
                vcpus: vcpus.unwrap_or_else(|| default_vcpus(topology.cpu_count(), vm_count)),
                memory_mb: memory_mb.unwrap_or(host_memory_mb / u64::from(vms)),
                affinity: None,
            };
            let request = vm.to_request(&topology)?;
            let requests = vec![request; vm_count];

            info!(
                vms = vm_count,
                vcpus = vm.vcpus,
                memory_mb = vm.memory_mb,
                "Starting fleet simulation"
            );
            let report = FleetSimulation::new(&topology, Planner::new(planner), node_resources)?.run(&requests)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", topology.summary());
                println!(
                    "Fleet of {} VMs ({} vCPUs, {} MiB each)",
                    vm_count, vm.vcpus, vm.memory_mb
                );
                for outcome in &report.vms {
                    let mode = if outcome.numa_placed { "numa" } else { "spread" };
                    println!("  vm{} [{}]: {}", outcome.index, mode, outcome.placement);
                    println!("    cost:     {}", outcome.cost);
                    println!("    baseline: {}", outcome.baseline_cost);
                }
                println!("NUMA-aware: {}", report.aware);
                println!("Spread baseline: {}", report.baseline);
                println!("Placed: {}/{}", report.placed_count(), vm_count);
                println!(
                    "Non-regressing: {}",
                    if report.is_non_regressing() { "yes" } else { "no" }
                );
            }
        }
        Commands::Validate { host } => {
            let config = HostConfig::load(&host)?;
            let memory: Vec<u64> = config.nodes.iter().map(|n| n.memory_mb).collect();
            let parts = config.into_parts()?;

            println!("{}", parts.topology.summary());
            for (node, memory_mb) in parts.topology.nodes().into_iter().zip(memory) {
                println!(
                    "  {}: cpus {}, {} MiB free",
                    node,
                    parts.topology.cpus_of_node(node),
                    memory_mb
                );
            }
            println!("Host configuration is valid");
        }
    }

    Ok(())
}

fn default_vcpus(cpus: usize, vms: usize) -> u32 {
    let share = cpus / vms.max(1);
    u32::try_from(share.max(2)).unwrap_or(u32::MAX)
}
