use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gameopt::config_loader;
use gameopt::orchestrator::{CommandReport, Optimizer};
use gameopt::utils::{parse_interval, SystemCommandRunner};

/// Network diagnostics and reversible system tuning for gaming
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration YAML file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Diagnose the network and record a performance baseline
    Analyze,
    /// Apply the system optimizations
    Optimize {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Longer network diagnostics
    NetworkTest,
    /// Roll back the optimizations from the saved snapshots
    Restore,
    /// Live ping, CPU and RAM readout until Ctrl-C
    Monitor {
        /// Time between two readings (e.g. "2s", "500ms")
        #[arg(short, long, value_parser = parse_interval)]
        interval: Option<Duration>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    let config = config_loader::load_or_default(args.config.as_deref())?;
    let mut optimizer = Optimizer::new(config, Box::new(SystemCommandRunner))
        .wrap_err("Failed to open the snapshot store")?;

    let result = match args.command {
        Command::Analyze => optimizer.analyze().map(Some),
        Command::Optimize { yes } => {
            if !yes && !confirm("Apply system optimizations? (y/N) ")? {
                println!("Optimization cancelled.");
                return Ok(());
            }
            optimizer.optimize().map(Some)
        }
        Command::NetworkTest => optimizer.network_test().map(Some),
        Command::Restore => optimizer.restore().map(Some),
        Command::Monitor { interval } => {
            let running = Arc::new(AtomicBool::new(true));
            let handler_flag = Arc::clone(&running);
            ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
                .wrap_err("Failed to install the Ctrl-C handler")?;

            let ticks = optimizer.monitor(interval, &running, None);
            info!("Monitor stopped after {} reading(s)", ticks);
            Ok(None)
        }
    };

    match result {
        Ok(Some(report)) => print_report(&report),
        Ok(None) => {}
        Err(e) => {
            error!("Command failed: {}", e);
            return Err(e);
        }
    }
    Ok(())
}

fn print_report(report: &CommandReport) {
    println!("{}", report.text);
    if let Some(ref path) = report.path {
        println!("\nReport saved: {}", path.display());
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .wrap_err("Failed to read confirmation")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
