use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "dfsim-rs-{prefix}-{}-{nanos}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_file(dir: &PathBuf, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write temp file");
    path
}

const CONFIG: &str = r#"
{
    "dragonfly": { "num_routers": 4, "routing": "minimal" },
    "end_time_secs": 1.0,
    "seed": 42
}
"#;

const TRACE: &str = r#"
{
    "ranks": [
        {
            "id": 0,
            "ops": [
                { "kind": "send", "src": 0, "dest": 1, "tag": 7, "bytes": 1024 },
                { "kind": "end" }
            ]
        },
        {
            "id": 1,
            "ops": [
                { "kind": "recv", "src": 0, "dest": 1, "tag": 7, "bytes": 1024 },
                { "kind": "end" }
            ]
        }
    ]
}
"#;

#[test]
fn replay_writes_stats_stream_with_header_first() {
    let dir = unique_temp_dir("replay-stats");
    let config = write_file(&dir, "config.json", CONFIG);
    let trace = write_file(&dir, "trace.json", TRACE);
    let io_dir = dir.join("io");

    let output = Command::new(env!("CARGO_BIN_EXE_mpi_replay"))
        .args([
            "--workload_type",
            "dumpi",
            "--workload_file",
            trace.to_str().unwrap(),
            "--num_net_traces",
            "2",
            "--lp-io-dir",
            io_dir.to_str().unwrap(),
            config.to_str().unwrap(),
        ])
        .output()
        .expect("run mpi_replay");
    assert!(
        output.status.success(),
        "mpi_replay failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stats = fs::read_to_string(io_dir.join("mpi-replay-stats")).expect("read stats stream");
    let lines: Vec<&str> = stats.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with('#'), "missing header: {}", lines[0]);
    for line in &lines[1..] {
        assert_eq!(
            line.split_whitespace().count(),
            9,
            "stats line shape: {line}"
        );
    }
    let rank0: Vec<&str> = lines[1].split_whitespace().collect();
    assert_eq!(rank0[2], "1", "rank 0 num_sends");
    assert_eq!(rank0[4], "1024", "rank 0 bytes sent");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Total bytes sent 1024 recvd 1024"),
        "summary missing: {stdout}"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_arguments_exit_with_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_mpi_replay"))
        .output()
        .expect("run mpi_replay");
    assert_eq!(output.status.code(), Some(255));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "stderr: {stderr}");
}

#[test]
fn unknown_workload_type_exits_with_usage_error() {
    let dir = unique_temp_dir("replay-badtype");
    let config = write_file(&dir, "config.json", CONFIG);
    let trace = write_file(&dir, "trace.json", TRACE);

    let output = Command::new(env!("CARGO_BIN_EXE_mpi_replay"))
        .args([
            "--workload_type",
            "scalatrace",
            "--workload_file",
            trace.to_str().unwrap(),
            "--num_net_traces",
            "2",
            config.to_str().unwrap(),
        ])
        .output()
        .expect("run mpi_replay");
    assert_eq!(output.status.code(), Some(255));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn sequential_and_optimistic_sync_modes_produce_identical_stats() {
    let dir = unique_temp_dir("replay-sync");
    let config = write_file(&dir, "config.json", CONFIG);
    let trace = write_file(&dir, "trace.json", TRACE);

    let mut stats_by_mode = Vec::new();
    for (sync, io) in [("1", "io-seq"), ("3", "io-opt")] {
        let io_dir = dir.join(io);
        let output = Command::new(env!("CARGO_BIN_EXE_mpi_replay"))
            .args([
                "--workload_type",
                "dumpi",
                "--workload_file",
                trace.to_str().unwrap(),
                "--num_net_traces",
                "2",
                "--sync",
                sync,
                "--lp-io-dir",
                io_dir.to_str().unwrap(),
                config.to_str().unwrap(),
            ])
            .output()
            .expect("run mpi_replay");
        assert!(
            output.status.success(),
            "sync={sync} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        stats_by_mode
            .push(fs::read_to_string(io_dir.join("mpi-replay-stats")).expect("read stats"));
    }
    assert_eq!(stats_by_mode[0], stats_by_mode[1]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn lp_io_suffix_appends_process_unique_directory_name() {
    let dir = unique_temp_dir("replay-suffix");
    let config = write_file(&dir, "config.json", CONFIG);
    let trace = write_file(&dir, "trace.json", TRACE);
    let io_dir = dir.join("io");

    let output = Command::new(env!("CARGO_BIN_EXE_mpi_replay"))
        .args([
            "--workload_type",
            "dumpi",
            "--workload_file",
            trace.to_str().unwrap(),
            "--num_net_traces",
            "2",
            "--lp-io-dir",
            io_dir.to_str().unwrap(),
            "--lp-io-use-suffix",
            "1",
            config.to_str().unwrap(),
        ])
        .output()
        .expect("run mpi_replay");
    assert!(output.status.success());

    assert!(!io_dir.exists());
    let suffixed: Vec<_> = fs::read_dir(&dir)
        .expect("list temp dir")
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("io-")
        })
        .collect();
    assert_eq!(suffixed.len(), 1, "expected one suffixed io dir");

    let _ = fs::remove_dir_all(&dir);
}
