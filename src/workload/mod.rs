//! Workload provider
//!
//! The trace layer hands the endpoint state machine already-decoded operation
//! records. `next_op` pulls one operation for an (app, rank) pair; `next_op_rc`
//! rewinds the stream by one when the pulling event is rolled back.

use crate::mpi::MpiOp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("cannot read trace file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse trace file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("trace rank id {0} repeated")]
    DuplicateRank(usize),
}

/// Decoded operation stream provider.
pub trait Workload {
    fn next_op(&mut self, app: usize, rank: usize) -> MpiOp;
    fn next_op_rc(&mut self, app: usize, rank: usize);
}

/// On-disk shape of a decoded trace: per-rank operation lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpec {
    pub ranks: Vec<RankTrace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankTrace {
    pub id: usize,
    pub ops: Vec<MpiOp>,
}

impl TraceSpec {
    pub fn load(path: &Path) -> Result<TraceSpec, WorkloadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WorkloadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| WorkloadError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Replays per-rank operation vectors with a rewindable cursor.
#[derive(Debug, Default)]
pub struct TraceWorkload {
    jobs: Vec<Vec<Vec<MpiOp>>>,
    cursors: Vec<Vec<usize>>,
}

impl TraceWorkload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-job workload from one trace spec.
    pub fn from_spec(spec: &TraceSpec, num_ranks: usize) -> Result<Self, WorkloadError> {
        let mut w = TraceWorkload::new();
        w.push_job(spec, num_ranks)?;
        Ok(w)
    }

    /// Appends one job; ranks absent from the spec get an empty (End-only) stream.
    pub fn push_job(&mut self, spec: &TraceSpec, num_ranks: usize) -> Result<usize, WorkloadError> {
        let mut seen = HashMap::new();
        let mut ops = vec![Vec::new(); num_ranks];
        for rank in &spec.ranks {
            if seen.insert(rank.id, ()).is_some() {
                return Err(WorkloadError::DuplicateRank(rank.id));
            }
            if rank.id < num_ranks {
                ops[rank.id] = rank.ops.clone();
            }
        }
        // Every stream is End-terminated so the cursor always moves, even for
        // the final operation, keeping next_op/next_op_rc symmetric.
        for stream in &mut ops {
            if !matches!(stream.last(), Some(MpiOp::End)) {
                stream.push(MpiOp::End);
            }
        }
        let app = self.jobs.len();
        self.cursors.push(vec![0; ops.len()]);
        self.jobs.push(ops);
        Ok(app)
    }

    /// Test-side builder: one rank's operation list appended to job 0.
    pub fn push_rank(&mut self, ops: Vec<MpiOp>) -> usize {
        if self.jobs.is_empty() {
            self.jobs.push(Vec::new());
            self.cursors.push(Vec::new());
        }
        let mut ops = ops;
        if !matches!(ops.last(), Some(MpiOp::End)) {
            ops.push(MpiOp::End);
        }
        let rank = self.jobs[0].len();
        self.jobs[0].push(ops);
        self.cursors[0].push(0);
        rank
    }

    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn job_size(&self, app: usize) -> usize {
        self.jobs[app].len()
    }
}

impl Workload for TraceWorkload {
    fn next_op(&mut self, app: usize, rank: usize) -> MpiOp {
        let stream = &self.jobs[app][rank];
        let cursor = &mut self.cursors[app][rank];
        assert!(
            *cursor < stream.len(),
            "rank {rank} of app {app} pulled past End"
        );
        let op = stream[*cursor].clone();
        *cursor += 1;
        op
    }

    fn next_op_rc(&mut self, app: usize, rank: usize) {
        let cursor = &mut self.cursors[app][rank];
        assert!(*cursor > 0, "rank {rank} of app {app} rewound past start");
        *cursor -= 1;
    }
}

/// Per-job assignment of job-local ranks to global rank slots.
#[derive(Debug, Clone)]
pub struct JobAlloc {
    jobs: Vec<Vec<usize>>,
    by_global: HashMap<usize, (usize, usize)>,
}

impl JobAlloc {
    /// Single job occupying global ranks 0..num_ranks.
    pub fn identity(num_ranks: usize) -> Self {
        Self::from_lists(vec![(0..num_ranks).collect()])
    }

    pub fn from_lists(jobs: Vec<Vec<usize>>) -> Self {
        let mut by_global = HashMap::new();
        for (app, ranks) in jobs.iter().enumerate() {
            for (local, &global) in ranks.iter().enumerate() {
                let prev = by_global.insert(global, (app, local));
                assert!(prev.is_none(), "global rank {global} allocated twice");
            }
        }
        Self { jobs, by_global }
    }

    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn job_size(&self, app: usize) -> usize {
        self.jobs[app].len()
    }

    pub fn global_rank(&self, app: usize, local: usize) -> usize {
        self.jobs[app][local]
    }

    /// (app, local rank) of a global rank slot, if allocated.
    pub fn lookup(&self, global: usize) -> Option<(usize, usize)> {
        self.by_global.get(&global).copied()
    }
}
