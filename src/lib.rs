//! # GameOpt - Network diagnostics and reversible system tuning for gaming
//!
//! This library measures the quality of the link to a set of game servers and
//! applies a batch of operating-system tweaks that can be rolled back later.
//!
//! ## Overview
//!
//! Diagnostics probe every configured target several times, aggregate the
//! round-trip times into average latency, jitter and packet loss, and grade
//! each link on a 1 to 5 stability scale. Every run is appended to a JSON
//! history log.
//!
//! Optimizations are independent actions (TCP stack, power plan, background
//! services, DNS, Game Mode, process priority). Each one persists the state it
//! is about to change before changing it, so `restore` can reverse it in a
//! later process. A failing action never stops the others.
//!
//! ## Architecture
//!
//! - `config`: Type-safe configuration structures and validation
//! - `config_loader`: YAML configuration loading
//! - `store`: Persistent snapshot store, history log and report export
//! - `network`: Probing strategies, aggregation and the diagnostics run
//! - `mutation`: Reversible actions and the failure-isolating runner
//! - `report`: Text report sections
//! - `perf`: Synthetic before/after performance sampling
//! - `monitor`: Live latency and resource readout
//! - `orchestrator`: The user-facing commands
//! - `utils`: External command execution and interval parsing
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gameopt::config_loader;
//! use gameopt::orchestrator::Optimizer;
//! use gameopt::utils::SystemCommandRunner;
//!
//! let config = config_loader::load_or_default(None)?;
//! let mut optimizer = Optimizer::new(config, Box::new(SystemCommandRunner))?;
//!
//! let report = optimizer.analyze()?;
//! println!("{}", report.text);
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! targets:
//!   - name: "CS2 EU West"
//!     host: "146.66.152.12"
//! probe:
//!   attempts: 5
//!   delay: "200ms"
//!   timeout: "1s"
//!   strategies: [tcp_connect, system_ping]
//! paths:
//!   storage_dir: "storage"
//!   reports_dir: "reports"
//! ```
//!
//! ## Error Handling
//!
//! Modules define their own `thiserror` enums. The orchestrator and the
//! binary wrap them with `color_eyre` context.

pub mod config;
pub mod config_loader;
pub mod monitor;
pub mod mutation;
pub mod network;
pub mod orchestrator;
pub mod perf;
pub mod report;
pub mod store;
pub mod utils;
