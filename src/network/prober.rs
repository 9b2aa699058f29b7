//! Latency probing.
//!
//! Each attempt walks an ordered list of [`ProbeStrategy`] implementations and
//! keeps the first latency one of them returns. An attempt where every
//! strategy comes back empty is a timeout, which is data rather than an error.
//! Only a strategy whose transport cannot be used at all (the ping utility
//! cannot be spawned) aborts the probe of that target.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::{NetworkResult, ProbeTarget};
use crate::utils::command::CommandRunner;

/// Lower bound for the budget handed to the ping utility
const MIN_PING_TIMEOUT_MS: u64 = 100;

/// Match: "time=14ms", "time<1ms", "time=14.2 ms"
static LATENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time[=<]\s*(\d+(?:[.,]\d+)?)\s*ms").expect("Invalid latency regex")
});

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{strategy} transport unavailable for {host}: {source}")]
    TransportUnavailable {
        strategy: &'static str,
        host: String,
        #[source]
        source: io::Error,
    },
}

/// One way of measuring a round-trip time
pub trait ProbeStrategy {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when this strategy got no answer within `timeout`
    fn measure(&self, host: &str, timeout: Duration) -> Result<Option<f64>, ProbeError>;
}

/// Strategies selectable from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    TcpConnect,
    SystemPing,
}

/// Times a TCP handshake; needs no privileges and spawns nothing
#[derive(Debug, Clone, Copy)]
pub struct TcpConnectStrategy {
    port: u16,
}

impl TcpConnectStrategy {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl ProbeStrategy for TcpConnectStrategy {
    fn name(&self) -> &'static str {
        "tcp-connect"
    }

    fn measure(&self, host: &str, timeout: Duration) -> Result<Option<f64>, ProbeError> {
        let addr = match (host, self.port).to_socket_addrs() {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr,
                None => return Ok(None),
            },
            Err(e) => {
                debug!("Could not resolve {}: {}", host, e);
                return Ok(None);
            }
        };

        let start = Instant::now();
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_stream) => Ok(Some(start.elapsed().as_secs_f64() * 1000.0)),
            Err(e) => {
                debug!("TCP connect to {} failed: {}", addr, e);
                Ok(None)
            }
        }
    }
}

/// Runs the platform ping utility once and parses the reported time
pub struct SystemPingStrategy<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> SystemPingStrategy<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl ProbeStrategy for SystemPingStrategy<'_> {
    fn name(&self) -> &'static str {
        "system-ping"
    }

    fn measure(&self, host: &str, timeout: Duration) -> Result<Option<f64>, ProbeError> {
        let args = ping_args(host, timeout);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self
            .runner
            .run("ping", &arg_refs)
            .map_err(|source| ProbeError::TransportUnavailable {
                strategy: self.name(),
                host: host.to_string(),
                source,
            })?;

        if !output.success {
            return Ok(None);
        }
        Ok(parse_latency(&output.stdout))
    }
}

/// Arguments for a single echo request with the given budget
pub fn ping_args(host: &str, timeout: Duration) -> Vec<String> {
    let timeout_ms = (timeout.as_millis() as u64).max(MIN_PING_TIMEOUT_MS);
    let (count_flag, wait_flag, wait) = if cfg!(windows) {
        ("-n", "-w", timeout_ms)
    } else if cfg!(any(target_os = "macos", target_os = "freebsd", target_os = "dragonfly")) {
        // BSD ping takes -W in milliseconds
        ("-c", "-W", timeout_ms)
    } else {
        // iputils ping takes -W in whole seconds
        ("-c", "-W", timeout_ms.div_ceil(1000))
    };

    vec![
        count_flag.to_string(),
        "1".to_string(),
        wait_flag.to_string(),
        wait.to_string(),
        host.to_string(),
    ]
}

/// Extract the round-trip time from ping output
pub fn parse_latency(output: &str) -> Option<f64> {
    let caps = LATENCY_PATTERN.captures(output)?;
    caps.get(1)?.as_str().replace(',', ".").parse().ok()
}

/// Sequential prober over an ordered strategy list
pub struct Prober<'a> {
    strategies: Vec<Box<dyn ProbeStrategy + 'a>>,
}

impl<'a> Prober<'a> {
    pub fn new(strategies: Vec<Box<dyn ProbeStrategy + 'a>>) -> Self {
        Self { strategies }
    }

    /// Build the strategies named in `kinds`, in that order
    pub fn from_kinds(kinds: &[StrategyKind], runner: &'a dyn CommandRunner, port: u16) -> Self {
        let strategies = kinds
            .iter()
            .map(|kind| -> Box<dyn ProbeStrategy + 'a> {
                match kind {
                    StrategyKind::TcpConnect => Box::new(TcpConnectStrategy::new(port)),
                    StrategyKind::SystemPing => Box::new(SystemPingStrategy::new(runner)),
                }
            })
            .collect();
        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// One attempt: first strategy that returns a latency wins
    pub fn measure_once(&self, host: &str, timeout: Duration) -> Result<Option<f64>, ProbeError> {
        for strategy in &self.strategies {
            if let Some(ms) = strategy.measure(host, timeout)? {
                return Ok(Some(ms));
            }
            debug!("{} got no answer from {}", strategy.name(), host);
        }
        Ok(None)
    }

    /// Run `attempts` serial measurements against `target`, pausing `delay` between them
    pub fn probe(
        &self,
        target: &ProbeTarget,
        attempts: u32,
        delay: Duration,
        timeout: Duration,
    ) -> Result<NetworkResult, ProbeError> {
        let mut samples = Vec::with_capacity(attempts as usize);

        for i in 0..attempts {
            match self.measure_once(&target.host, timeout)? {
                Some(ms) => {
                    debug!("{} ping #{}: {:.1}ms", target.name, i + 1, ms);
                    samples.push(ms);
                }
                None => debug!("{} ping #{}: TIMEOUT", target.name, i + 1),
            }

            if i + 1 < attempts && !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        Ok(NetworkResult::from_samples(target.clone(), samples, attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::CommandOutput;
    use std::cell::{Cell, RefCell};
    use std::net::TcpListener;

    /// Replays a fixed sequence of answers
    struct Scripted {
        answers: RefCell<Vec<Option<f64>>>,
        calls: Cell<usize>,
    }

    impl Scripted {
        fn new(answers: Vec<Option<f64>>) -> Self {
            Self {
                answers: RefCell::new(answers.into_iter().rev().collect()),
                calls: Cell::new(0),
            }
        }
    }

    impl ProbeStrategy for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn measure(&self, _host: &str, _timeout: Duration) -> Result<Option<f64>, ProbeError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.answers.borrow_mut().pop().flatten())
        }
    }

    struct PingRunner {
        output: Option<CommandOutput>,
    }

    impl CommandRunner for PingRunner {
        fn run(&self, program: &str, _args: &[&str]) -> io::Result<CommandOutput> {
            assert_eq!(program, "ping");
            self.output
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::PermissionDenied, "spawn denied"))
        }
    }

    fn target() -> ProbeTarget {
        ProbeTarget::new("Local", "127.0.0.1")
    }

    #[test]
    fn test_parse_latency_formats() {
        assert_eq!(
            parse_latency("Reply from 1.1.1.1: bytes=32 time=14ms TTL=56"),
            Some(14.0)
        );
        assert_eq!(
            parse_latency("Reply from 1.1.1.1: bytes=32 time<1ms TTL=56"),
            Some(1.0)
        );
        assert_eq!(
            parse_latency("64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=14.2 ms"),
            Some(14.2)
        );
        assert_eq!(parse_latency("Request timed out."), None);
        assert_eq!(parse_latency(""), None);
    }

    #[test]
    fn test_ping_args_enforce_minimum_budget() {
        let args = ping_args("1.1.1.1", Duration::from_millis(10));
        assert_eq!(args.last().map(String::as_str), Some("1.1.1.1"));
        if cfg!(any(windows, target_os = "macos", target_os = "freebsd", target_os = "dragonfly")) {
            assert_eq!(args[3], "100");
        } else {
            assert_eq!(args[3], "1");
        }
    }

    #[test]
    fn test_ping_args_wait_unit() {
        let args = ping_args("1.1.1.1", Duration::from_millis(1500));
        if cfg!(any(windows, target_os = "macos", target_os = "freebsd", target_os = "dragonfly")) {
            assert_eq!(args[3], "1500");
        } else {
            // Rounded up to whole seconds
            assert_eq!(args[3], "2");
        }
    }

    /// Records when each attempt started
    struct Stamped<'a> {
        stamps: &'a RefCell<Vec<Instant>>,
    }

    impl ProbeStrategy for Stamped<'_> {
        fn name(&self) -> &'static str {
            "stamped"
        }

        fn measure(&self, _host: &str, _timeout: Duration) -> Result<Option<f64>, ProbeError> {
            self.stamps.borrow_mut().push(Instant::now());
            Ok(Some(1.0))
        }
    }

    #[test]
    fn test_delay_between_attempts_only() {
        let stamps = RefCell::new(Vec::new());
        let prober = Prober::new(vec![Box::new(Stamped { stamps: &stamps })]);
        let delay = Duration::from_millis(30);

        let start = Instant::now();
        let result = prober.probe(&target(), 3, delay, Duration::from_millis(50)).unwrap();
        let finished = Instant::now();
        assert_eq!(result.samples.len(), 3);

        let stamps = stamps.borrow();
        assert_eq!(stamps.len(), 3);
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= delay);
        }
        // Two pauses in total, none after the last attempt
        assert!(finished - start >= delay * 2);
        assert!(finished - stamps[2] < delay);
    }

    #[test]
    fn test_fallback_used_when_primary_fails() {
        let primary = Scripted::new(vec![None, Some(10.0), None]);
        let fallback = Scripted::new(vec![Some(20.0), Some(22.0)]);
        let prober = Prober::new(vec![Box::new(primary), Box::new(fallback)]);

        let result = prober.probe(&target(), 3, Duration::ZERO, Duration::from_millis(50)).unwrap();
        assert_eq!(result.samples, vec![20.0, 10.0, 22.0]);
        assert_eq!(result.timeouts, 0);
    }

    #[test]
    fn test_all_strategies_empty_counts_timeout() {
        let prober = Prober::new(vec![
            Box::new(Scripted::new(vec![None, None, Some(5.0), None])),
            Box::new(Scripted::new(vec![None, None, None])),
        ]);

        let result = prober.probe(&target(), 4, Duration::ZERO, Duration::from_millis(50)).unwrap();
        assert_eq!(result.samples, vec![5.0]);
        assert_eq!(result.timeouts, 3);
        assert_eq!(result.packet_loss_pct, 75.0);
    }

    #[test]
    fn test_system_ping_parses_output() {
        let runner = PingRunner {
            output: Some(CommandOutput::ok("Reply from 10.0.0.1: bytes=32 time=33ms TTL=60")),
        };
        let strategy = SystemPingStrategy::new(&runner);
        assert_eq!(strategy.measure("10.0.0.1", Duration::from_secs(1)).unwrap(), Some(33.0));
    }

    #[test]
    fn test_system_ping_nonzero_exit_is_timeout() {
        let runner = PingRunner {
            output: Some(CommandOutput::failed(1, "Request timed out.")),
        };
        let strategy = SystemPingStrategy::new(&runner);
        assert_eq!(strategy.measure("10.0.0.1", Duration::from_secs(1)).unwrap(), None);
    }

    #[test]
    fn test_spawn_failure_is_transport_error() {
        let runner = PingRunner { output: None };
        let prober = Prober::new(vec![
            Box::new(Scripted::new(vec![None])),
            Box::new(SystemPingStrategy::new(&runner)),
        ]);

        let err = prober
            .probe(&target(), 2, Duration::ZERO, Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, ProbeError::TransportUnavailable { strategy: "system-ping", .. }));
    }

    #[test]
    fn test_tcp_connect_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let strategy = TcpConnectStrategy::new(port);
        let latency = strategy.measure("127.0.0.1", Duration::from_secs(1)).unwrap();
        assert!(latency.is_some());
        assert!(latency.unwrap() >= 0.0);
    }

    #[test]
    fn test_from_kinds_keeps_order() {
        let runner = PingRunner { output: None };
        let prober = Prober::from_kinds(
            &[StrategyKind::SystemPing, StrategyKind::TcpConnect],
            &runner,
            443,
        );
        assert_eq!(prober.strategy_names(), vec!["system-ping", "tcp-connect"]);
    }
}
