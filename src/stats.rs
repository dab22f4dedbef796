//! Per-endpoint statistics lines, run summary, and network reduction.

use crate::world::World;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub const STATS_HEADER: &str = "# Format <LP ID> <Terminal ID> <Total sends> <Total Recvs> <Bytes sent> <Bytes recvd> <Send time> <Comm. time> <Compute time>";

#[derive(Debug, Clone)]
pub struct EndpointReport {
    pub lp: usize,
    pub rank: usize,
    pub app: usize,
    pub local_rank: usize,
    pub num_sends: u64,
    pub num_recvs: u64,
    pub num_cols: u64,
    pub num_delays: u64,
    pub num_wait: u64,
    pub num_waitall: u64,
    pub bytes_sent: u64,
    pub bytes_recvd: u64,
    pub send_time: f64,
    pub recv_time: f64,
    pub wait_time: f64,
    pub compute_time: f64,
    pub elapsed_time: f64,
    pub unmatched_sends: usize,
    pub unmatched_recvs: usize,
}

impl EndpointReport {
    pub fn comm_time(&self) -> f64 {
        self.elapsed_time - self.compute_time
    }
}

/// Collects the per-rank reports of all active endpoints, in rank order.
pub fn endpoint_reports(world: &World) -> Vec<EndpointReport> {
    world
        .endpoints()
        .filter(|(_, s)| s.active)
        .map(|(lp, s)| EndpointReport {
            lp,
            rank: s.rank_id,
            app: s.app_id,
            local_rank: s.local_rank,
            num_sends: s.num_sends,
            num_recvs: s.num_recvs,
            num_cols: s.num_cols,
            num_delays: s.num_delays,
            num_wait: s.num_wait,
            num_waitall: s.num_waitall,
            bytes_sent: s.num_bytes_sent,
            bytes_recvd: s.num_bytes_recvd,
            send_time: s.send_time,
            recv_time: s.recv_time,
            wait_time: s.wait_time,
            compute_time: s.compute_time,
            elapsed_time: s.elapsed_time,
            unmatched_sends: s.arrival_queue.len(),
            unmatched_recvs: s.pending_recvs_queue.len(),
        })
        .collect()
}

pub fn stats_line(r: &EndpointReport) -> String {
    format!(
        "{} {} {} {} {} {} {:.6} {:.6} {:.6}",
        r.lp,
        r.rank,
        r.num_sends,
        r.num_recvs,
        r.bytes_sent,
        r.bytes_recvd,
        r.send_time,
        r.comm_time(),
        r.compute_time
    )
}

/// Multi-job variant carries the job id and job-local rank up front.
pub fn stats_line_multi(r: &EndpointReport) -> String {
    format!(
        "APP {} Rank {} {} {} {} {} {} {} {:.6} {:.6} {:.6}",
        r.app,
        r.local_rank,
        r.lp,
        r.rank,
        r.num_sends,
        r.num_recvs,
        r.bytes_sent,
        r.bytes_recvd,
        r.send_time,
        r.comm_time(),
        r.compute_time
    )
}

/// Rank-0 end-of-run aggregate, mirrored over all participating endpoints.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub num_ranks: usize,
    pub total_bytes_sent: u64,
    pub total_bytes_recvd: u64,
    pub max_run_time: f64,
    pub avg_run_time: f64,
    pub max_comm_time: f64,
    pub avg_comm_time: f64,
    pub max_send_time: f64,
    pub avg_send_time: f64,
    pub max_recv_time: f64,
    pub avg_recv_time: f64,
    pub max_wait_time: f64,
    pub avg_wait_time: f64,
}

pub fn summarize(reports: &[EndpointReport]) -> RunSummary {
    let mut s = RunSummary {
        num_ranks: reports.len(),
        ..RunSummary::default()
    };
    if reports.is_empty() {
        return s;
    }
    for r in reports {
        s.total_bytes_sent += r.bytes_sent;
        s.total_bytes_recvd += r.bytes_recvd;
        s.max_run_time = s.max_run_time.max(r.elapsed_time);
        s.avg_run_time += r.elapsed_time;
        s.max_comm_time = s.max_comm_time.max(r.comm_time());
        s.avg_comm_time += r.comm_time();
        s.max_send_time = s.max_send_time.max(r.send_time);
        s.avg_send_time += r.send_time;
        s.max_recv_time = s.max_recv_time.max(r.recv_time);
        s.avg_recv_time += r.recv_time;
        s.max_wait_time = s.max_wait_time.max(r.wait_time);
        s.avg_wait_time += r.wait_time;
    }
    let n = reports.len() as f64;
    s.avg_run_time /= n;
    s.avg_comm_time /= n;
    s.avg_send_time /= n;
    s.avg_recv_time /= n;
    s.avg_wait_time /= n;
    s
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total bytes sent {} recvd {}",
            self.total_bytes_sent, self.total_bytes_recvd
        )?;
        writeln!(
            f,
            "max runtime {:.6} ns avg runtime {:.6}",
            self.max_run_time, self.avg_run_time
        )?;
        writeln!(
            f,
            "max comm time {:.6} avg comm time {:.6}",
            self.max_comm_time, self.avg_comm_time
        )?;
        writeln!(
            f,
            "max send time {:.6} avg send time {:.6}",
            self.max_send_time, self.avg_send_time
        )?;
        writeln!(
            f,
            "max recv time {:.6} avg recv time {:.6}",
            self.max_recv_time, self.avg_recv_time
        )?;
        write!(
            f,
            "max wait time {:.6} avg wait time {:.6}",
            self.max_wait_time, self.avg_wait_time
        )
    }
}

/// Reduction over the router fabric and NICs.
#[derive(Debug, Clone, Default)]
pub struct NetworkSummary {
    pub total_hops: u64,
    pub finished_packets: u64,
    pub total_packet_time: f64,
    pub max_packet_time: f64,
    pub minimal_count: u64,
    pub nonmin_count: u64,
}

pub fn network_summary(world: &World) -> NetworkSummary {
    let mut n = NetworkSummary::default();
    for (_, r) in world.routers() {
        n.total_hops += r.total_hops;
    }
    for (_, e) in world.endpoints() {
        n.finished_packets += e.nic.finished_packets;
        n.total_packet_time += e.nic.total_packet_time;
        n.max_packet_time = n.max_packet_time.max(e.nic.max_packet_time);
        n.minimal_count += e.nic.minimal_count;
        n.nonmin_count += e.nic.nonmin_count;
    }
    n
}

impl fmt::Display for NetworkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total finished packets {} total hops {} avg hops {:.3} avg packet latency {:.3} ns max packet latency {:.3} ns",
            self.finished_packets,
            self.total_hops,
            if self.finished_packets > 0 {
                self.total_hops as f64 / self.finished_packets as f64
            } else {
                0.0
            },
            if self.finished_packets > 0 {
                self.total_packet_time / self.finished_packets as f64
            } else {
                0.0
            },
            self.max_packet_time
        )
    }
}

/// Writes the `mpi-replay-stats` stream under `dir`, optionally with a unique
/// per-process suffix on the directory name.
pub fn write_stats(dir: &Path, use_suffix: bool, lines: &[String]) -> io::Result<PathBuf> {
    let dir = if use_suffix {
        dir.with_file_name(format!(
            "{}-{}",
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "lp-io".to_string()),
            std::process::id()
        ))
    } else {
        dir.to_path_buf()
    };
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("mpi-replay-stats");
    std::fs::write(&path, format!("{}\n", lines.join("\n")))?;
    Ok(path)
}
