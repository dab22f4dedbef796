use clap::Parser;
use dfsim_rs::config::SimConfig;
use dfsim_rs::net::params::DragonflyParams;
use dfsim_rs::sim::{SimTime, Simulator};
use dfsim_rs::stats;
use dfsim_rs::workload::{JobAlloc, TraceSpec, TraceWorkload};
use dfsim_rs::world::World;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "mpi-replay",
    about = "Replay a decoded MPI trace over a dragonfly fabric"
)]
struct Args {
    /// Workload format; "dumpi" is the only recognized value
    #[arg(long = "workload_type")]
    workload_type: Option<String>,

    /// Decoded trace file
    #[arg(long = "workload_file")]
    workload_file: Option<PathBuf>,

    /// Number of ranks to replay
    #[arg(long = "num_net_traces", default_value_t = 0)]
    num_net_traces: usize,

    /// Disable compute-delay simulation (0|1)
    #[arg(long = "disable_compute", default_value_t = 0)]
    disable_compute: u8,

    /// Where to place the stats stream (unspecified -> no output)
    #[arg(long = "lp-io-dir")]
    lp_io_dir: Option<PathBuf>,

    /// Append a unique suffix to the lp-io directory (default 0)
    #[arg(long = "lp-io-use-suffix", default_value_t = 0)]
    lp_io_use_suffix: u8,

    /// 1 = sequential, 2 = conservative, 3 = optimistic
    #[arg(long = "sync", default_value_t = 1)]
    sync: u32,

    /// Topology and LP-count config file
    config: Option<PathBuf>,
}

fn usage() -> ! {
    eprintln!(
        "Usage: mpi_replay --sync=1/3 --workload_type=dumpi \
         --workload_file=trace-file-name --num_net_traces=n config-file-name"
    );
    std::process::exit(-1);
}

fn fatal(msg: impl std::fmt::Display) -> ! {
    eprintln!("mpi_replay: {msg}");
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args = Args::parse();
    let (Some(workload_type), Some(workload_file), Some(config_path)) =
        (&args.workload_type, &args.workload_file, &args.config)
    else {
        usage()
    };
    if workload_type.as_str() != "dumpi" || args.num_net_traces == 0 {
        usage();
    }

    let cfg = SimConfig::load(config_path).unwrap_or_else(|e| fatal(e));
    let params = DragonflyParams::from_config(&cfg.dragonfly).unwrap_or_else(|e| fatal(e));
    if args.num_net_traces > params.total_terminals {
        fatal(format!(
            "{} traces but the topology only has {} terminals",
            args.num_net_traces, params.total_terminals
        ));
    }

    let spec = TraceSpec::load(workload_file).unwrap_or_else(|e| fatal(e));
    let workload =
        TraceWorkload::from_spec(&spec, args.num_net_traces).unwrap_or_else(|e| fatal(e));
    let alloc = JobAlloc::identity(args.num_net_traces);

    let mut world = World::new(
        params,
        Box::new(workload),
        alloc,
        cfg.noise,
        args.disable_compute != 0,
    );
    let mut sim = Simulator::new(world.mapping.num_lps(), cfg.seed, cfg.lookahead);
    if args.sync == 3 {
        sim.set_record(true);
    }
    world.prime(&mut sim);

    info!(
        ranks = args.num_net_traces,
        terminals = world.params.total_terminals,
        routers = world.params.total_routers,
        groups = world.params.num_groups,
        sync = args.sync,
        "starting replay"
    );

    let end = SimTime::from_secs_f64(cfg.end_time_secs);
    sim.run_until(end, &mut world);
    if args.sync == 3 {
        sim.commit(sim.now());
    }

    let reports = stats::endpoint_reports(&world);
    for r in &reports {
        if r.unmatched_sends > 0 || r.unmatched_recvs > 0 {
            println!(
                "LP {} unmatched irecvs {} unmatched sends {}",
                r.lp, r.unmatched_recvs, r.unmatched_sends
            );
        }
    }

    if let Some(dir) = &args.lp_io_dir {
        let mut lines = vec![stats::STATS_HEADER.to_string()];
        lines.extend(reports.iter().map(stats::stats_line));
        match stats::write_stats(dir, args.lp_io_use_suffix != 0, &lines) {
            Ok(path) => info!(path = %path.display(), "stats stream written"),
            Err(e) => warn!("cannot write stats stream: {e}"),
        }
    }

    println!("{}", stats::summarize(&reports));
    println!("{}", stats::network_summary(&world));
    info!(events = sim.executed_events(), now = sim.now().0, "replay finished");
}
