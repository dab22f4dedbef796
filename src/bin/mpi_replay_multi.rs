use clap::Parser;
use dfsim_rs::config::SimConfig;
use dfsim_rs::net::params::DragonflyParams;
use dfsim_rs::sim::{SimTime, Simulator};
use dfsim_rs::stats;
use dfsim_rs::workload::{JobAlloc, TraceSpec, TraceWorkload};
use dfsim_rs::world::World;
use std::path::PathBuf;
use tracing::{info, warn};

const MAX_JOBS: usize = 5;

#[derive(Debug, Parser)]
#[command(
    name = "mpi-replay-multi",
    about = "Replay several decoded MPI traces side by side on one dragonfly fabric"
)]
struct Args {
    /// Lines of "<num_ranks> <trace_file>" per job (up to 5 jobs)
    #[arg(long = "workloads_conf_file")]
    workloads_conf_file: Option<PathBuf>,

    /// Per-job rank-to-global-rank assignment list, one line per job
    #[arg(long = "alloc_file")]
    alloc_file: Option<PathBuf>,

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
        "Usage: mpi_replay_multi --sync=1/3 --workloads_conf_file=conf \
         --alloc_file=alloc config-file-name"
    );
    std::process::exit(-1);
}

fn fatal(msg: impl std::fmt::Display) -> ! {
    eprintln!("mpi_replay_multi: {msg}");
    std::process::exit(1);
}

struct JobLine {
    num_ranks: usize,
    trace: PathBuf,
}

fn parse_workloads_conf(path: &PathBuf) -> Vec<JobLine> {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fatal(format!("cannot read {}: {e}", path.display())));
    let mut jobs = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let num_ranks = parts
            .next()
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or_else(|| fatal(format!("bad workloads line: {line}")));
        let trace = parts
            .next()
            .map(PathBuf::from)
            .unwrap_or_else(|| fatal(format!("bad workloads line: {line}")));
        jobs.push(JobLine { num_ranks, trace });
    }
    if jobs.is_empty() {
        fatal("workloads conf file lists no jobs");
    }
    if jobs.len() > MAX_JOBS {
        fatal(format!("{} jobs listed, at most {MAX_JOBS} supported", jobs.len()));
    }
    jobs
}

fn parse_alloc_file(path: &PathBuf, jobs: &[JobLine]) -> Vec<Vec<usize>> {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fatal(format!("cannot read {}: {e}", path.display())));
    let lists: Vec<Vec<usize>> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| {
            line.split_whitespace()
                .map(|t| {
                    t.parse::<usize>()
                        .unwrap_or_else(|_| fatal(format!("bad alloc token: {t}")))
                })
                .collect()
        })
        .collect();
    if lists.len() < jobs.len() {
        fatal(format!(
            "alloc file has {} lines but {} jobs are configured",
            lists.len(),
            jobs.len()
        ));
    }
    for (j, job) in jobs.iter().enumerate() {
        if lists[j].len() != job.num_ranks {
            fatal(format!(
                "job {j}: alloc line has {} slots, conf says {} ranks",
                lists[j].len(),
                job.num_ranks
            ));
        }
    }
    lists.into_iter().take(jobs.len()).collect()
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
    let (Some(conf_path), Some(alloc_path), Some(config_path)) =
        (&args.workloads_conf_file, &args.alloc_file, &args.config)
    else {
        usage()
    };

    let jobs = parse_workloads_conf(conf_path);
    let cfg = SimConfig::load(config_path).unwrap_or_else(|e| fatal(e));
    let params = DragonflyParams::from_config(&cfg.dragonfly).unwrap_or_else(|e| fatal(e));

    let lists = parse_alloc_file(alloc_path, &jobs);
    for (j, list) in lists.iter().enumerate() {
        for &g in list {
            if g >= params.total_terminals {
                fatal(format!(
                    "job {j}: global rank {g} beyond the {} terminals of the topology",
                    params.total_terminals
                ));
            }
        }
    }

    let mut workload = TraceWorkload::new();
    for job in &jobs {
        let spec = TraceSpec::load(&job.trace).unwrap_or_else(|e| fatal(e));
        workload
            .push_job(&spec, job.num_ranks)
            .unwrap_or_else(|e| fatal(e));
    }
    let alloc = JobAlloc::from_lists(lists);

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
        jobs = jobs.len(),
        terminals = world.params.total_terminals,
        routers = world.params.total_routers,
        sync = args.sync,
        "starting multi-job replay"
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
                "APP {} LP {} unmatched irecvs {} unmatched sends {}",
                r.app, r.lp, r.unmatched_recvs, r.unmatched_sends
            );
        }
    }

    if let Some(dir) = &args.lp_io_dir {
        let mut lines = vec![stats::STATS_HEADER.to_string()];
        lines.extend(reports.iter().map(stats::stats_line_multi));
        match stats::write_stats(dir, args.lp_io_use_suffix != 0, &lines) {
            Ok(path) => info!(path = %path.display(), "stats stream written"),
            Err(e) => warn!("cannot write stats stream: {e}"),
        }
    }

    println!("{}", stats::summarize(&reports));
    println!("{}", stats::network_summary(&world));
    info!(events = sim.executed_events(), now = sim.now().0, "replay finished");
}
