use std::cell::RefCell;
use std::io::{self, Write};
use std::net::TcpListener;
use std::rc::Rc;
use std::thread;

use serde_json::Value;
use tempfile::{NamedTempFile, TempDir};

use gameopt::config_loader::load_config;
use gameopt::orchestrator::{Optimizer, PERFORMANCE_BEFORE_KEY};
use gameopt::perf::PerformanceMetrics;
use gameopt::utils::{CommandOutput, CommandRunner};

/// Stand-in for the host tools. Ping answers 12ms except for hosts listed as
/// silent, every call is recorded.
#[derive(Clone, Default)]
struct FakeHost {
    silent_hosts: Vec<&'static str>,
    no_ping: bool,
    calls: Rc<RefCell<Vec<String>>>,
}

impl CommandRunner for FakeHost {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        self.calls
            .borrow_mut()
            .push(format!("{} {}", program, args.join(" ")));

        match program {
            "ping" if self.no_ping => {
                Err(io::Error::new(io::ErrorKind::NotFound, "ping not installed"))
            }
            "ping" => {
                let host = args.last().copied().unwrap_or_default();
                if self.silent_hosts.contains(&host) {
                    Ok(CommandOutput::failed(1, ""))
                } else {
                    Ok(CommandOutput::ok(format!(
                        "64 bytes from {}: icmp_seq=1 ttl=57 time=12.0 ms",
                        host
                    )))
                }
            }
            "powercfg" if args.first() == Some(&"/GETACTIVESCHEME") => Ok(CommandOutput::ok(
                "Power Scheme GUID: 381b4222-f694-41f0-9685-ff5bb260df2e  (Balanced)",
            )),
            _ => Ok(CommandOutput::ok("")),
        }
    }
}

fn write_config(dir: &TempDir, body: &str) -> NamedTempFile {
    let yaml = format!(
        "paths:\n  storage_dir: {:?}\n  reports_dir: {:?}\n{}",
        dir.path().join("storage"),
        dir.path().join("reports"),
        body
    );
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

fn history(dir: &TempDir) -> Vec<Value> {
    let raw = std::fs::read_to_string(dir.path().join("reports/network_reports.json")).unwrap();
    let doc: Value = serde_json::from_str(&raw).unwrap();
    doc["reports"].as_array().unwrap().clone()
}

#[test]
fn test_stable_local_targets_get_five_stars() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            drop(stream);
        }
    });

    let dir = TempDir::new().unwrap();
    let targets: String = (1..=5)
        .map(|i| format!("  - name: \"Local {}\"\n    host: \"127.0.0.1\"\n", i))
        .collect();
    let file = write_config(
        &dir,
        &format!(
            "targets:\n{}probe:\n  attempts: 5\n  delay: \"0ms\"\n  timeout: \"1s\"\n  \
             port: {}\n  strategies: [tcp_connect]\n",
            targets, port
        ),
    );

    let config = load_config(file.path()).unwrap();
    let mut optimizer = Optimizer::new(config, Box::new(FakeHost::default()))
        .unwrap()
        .with_benchmark_iterations(1_000);
    let report = optimizer.analyze().unwrap();

    let target_lines: Vec<&str> = report.text.lines().filter(|l| l.contains("Ping:")).collect();
    assert_eq!(target_lines.len(), 5);
    for line in target_lines {
        assert!(line.ends_with("Stability: ★★★★★"), "{}", line);
        assert!(line.contains("Loss: 0.0%"), "{}", line);
    }
    assert!(!report.text.contains("High latency"));

    let entries = history(&dir);
    assert_eq!(entries.len(), 1);
    assert!(entries[0]["timestamp"].is_string());
    for i in 1..=5 {
        assert_eq!(entries[0][format!("Local {}", i)]["stability"], 5);
    }
}

#[test]
fn test_silent_target_is_flagged_and_excluded_from_mean() {
    let dir = TempDir::new().unwrap();
    let file = write_config(
        &dir,
        r#"
targets:
  - name: Reachable
    host: 192.0.2.10
  - name: Silent
    host: 192.0.2.99
probe:
  attempts: 4
  delay: 0s
  strategies: [system_ping]
"#,
    );
    let runner = FakeHost {
        silent_hosts: vec!["192.0.2.99"],
        ..FakeHost::default()
    };

    let config = load_config(file.path()).unwrap();
    let mut optimizer = Optimizer::new(config, Box::new(runner))
        .unwrap()
        .with_benchmark_iterations(1_000);
    let report = optimizer.analyze().unwrap();

    let silent_line =
        "Silent               Ping: timeout | Loss: 100.0% | Jitter: n/a | Stability: ★☆☆☆☆";
    assert!(report.text.contains(silent_line));
    assert!(report.text.contains("⚠ No reply received"));

    let baseline: PerformanceMetrics =
        optimizer.store().get_as(PERFORMANCE_BEFORE_KEY).unwrap();
    assert_eq!(baseline.mean_latency_ms, 12.0);

    let entries = history(&dir);
    assert!(entries[0]["Silent"]["avg"].is_null());
    assert_eq!(entries[0]["Silent"]["loss"], 100.0);
    assert_eq!(entries[0]["Reachable"]["avg"], 12.0);
}

#[test]
fn test_missing_ping_everywhere_aborts() {
    let dir = TempDir::new().unwrap();
    let file = write_config(
        &dir,
        "probe:\n  attempts: 2\n  delay: 0s\n  strategies: [system_ping]\n",
    );
    let runner = FakeHost {
        no_ping: true,
        ..FakeHost::default()
    };

    let config = load_config(file.path()).unwrap();
    let mut optimizer = Optimizer::new(config, Box::new(runner)).unwrap();
    let err = optimizer.analyze().unwrap_err();

    assert!(err.chain().any(|cause| cause.to_string().contains("transport unavailable")));
    assert!(!dir.path().join("reports/network_reports.json").exists());
}

#[test]
fn test_restore_in_a_later_process() {
    let dir = TempDir::new().unwrap();
    let file = write_config(
        &dir,
        r#"
targets:
  - name: Game
    host: 192.0.2.10
probe:
  attempts: 1
  strategies: [system_ping]
"#,
    );

    {
        let config = load_config(file.path()).unwrap();
        let mut optimizer = Optimizer::new(config, Box::new(FakeHost::default()))
            .unwrap()
            .with_benchmark_iterations(1_000);
        let report = optimizer.optimize().unwrap();
        assert!(report.text.contains("[SYSTEM OPTIMIZATIONS]"));
        // No baseline was recorded
        assert!(report.text.contains("Collect metrics before and after"));
    }

    let raw = std::fs::read_to_string(dir.path().join("storage/system_backup.json")).unwrap();
    let backup: Value = serde_json::from_str(&raw).unwrap();
    for key in ["tcp", "power_plan", "services", "dns", "game_features", "process_priority"] {
        assert!(backup["snapshots"].get(key).is_some(), "missing snapshot {}", key);
        assert!(backup["written_at"][key].is_string());
    }

    let runner = FakeHost::default();
    let calls = Rc::clone(&runner.calls);
    let config = load_config(file.path()).unwrap();
    let mut optimizer = Optimizer::new(config, Box::new(runner)).unwrap();
    let report = optimizer.restore().unwrap();

    assert!(report.text.starts_with("[RESTORE]"));
    assert!(calls
        .borrow()
        .contains(&"powercfg /SETACTIVE 381b4222-f694-41f0-9685-ff5bb260df2e".to_string()));
    assert!(report.path.unwrap().exists());
}
