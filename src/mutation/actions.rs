//! The system levers applied by `optimize` and reversed by `restore`.
//!
//! All of them drive stock Windows utilities (`netsh`, `powercfg`, `reg`,
//! PowerShell) through the context's command runner. Each one captures the
//! state it is about to change before changing it.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MutationAction, MutationContext, MutationError};
use crate::config::Config;

/// Match: "AllowAutoGameMode    REG_DWORD    0x1"
static REG_DWORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"REG_DWORD\s+0x([0-9a-fA-F]+)").expect("Invalid reg dword regex"));

/// The full lever set, in the order `optimize` applies it
pub fn default_actions(config: &Config) -> Vec<Box<dyn MutationAction>> {
    vec![
        Box::new(TcpTuning),
        Box::new(PowerPlan),
        Box::new(BackgroundServices::new(config.background_services.clone())),
        Box::new(DnsServers::new(config.dns_servers.clone())),
        Box::new(GameFeatures),
        Box::new(ProcessPriority::new(config.game_processes.clone())),
    ]
}

fn parse_snapshot<T: DeserializeOwned>(key: &str, snapshot: &Value) -> Result<T, MutationError> {
    serde_json::from_value(snapshot.clone()).map_err(|e| MutationError::InvalidSnapshot {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn non_empty_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty())
}

// ---------- TCP/IP ----------

/// (netsh parameter, optimized value, label in `netsh int tcp show global`)
const TCP_SETTINGS: [(&str, &str, &str); 4] = [
    ("autotuninglevel", "normal", "Receive Window Auto-Tuning Level"),
    ("ecncapability", "enabled", "ECN Capability"),
    ("dca", "enabled", "Direct Cache Access (DCA)"),
    ("chimney", "enabled", "Chimney Offload State"),
];

#[derive(Debug, Serialize, Deserialize)]
struct TcpSnapshot {
    raw: String,
}

/// Global TCP stack parameters
#[derive(Debug, Clone, Copy)]
pub struct TcpTuning;

impl MutationAction for TcpTuning {
    fn name(&self) -> &str {
        "TCP tuning"
    }

    fn snapshot_key(&self) -> &'static str {
        "tcp"
    }

    fn apply(&self, ctx: &mut MutationContext<'_>) -> Result<String, MutationError> {
        let current = ctx.run("netsh", &["int", "tcp", "show", "global"])?;
        ctx.snapshot(&TcpSnapshot { raw: current.stdout })?;

        for (param, value, _) in TCP_SETTINGS {
            let setting = format!("{}={}", param, value);
            ctx.run("netsh", &["int", "tcp", "set", "global", &setting])?;
        }
        Ok("TCP parameters optimized".to_string())
    }

    fn restore(
        &self,
        ctx: &mut MutationContext<'_>,
        snapshot: &Value,
    ) -> Result<String, MutationError> {
        let snapshot: TcpSnapshot = parse_snapshot(self.snapshot_key(), snapshot)?;
        let previous = parse_tcp_globals(&snapshot.raw);
        if previous.is_empty() {
            return Err(MutationError::InvalidSnapshot {
                key: self.snapshot_key().to_string(),
                reason: "nothing to replay, reset manually with `netsh int tcp reset`".to_string(),
            });
        }

        for (param, value) in &previous {
            let setting = format!("{}={}", param, value);
            ctx.run("netsh", &["int", "tcp", "set", "global", &setting])?;
        }
        Ok(format!("{} TCP setting(s) restored", previous.len()))
    }
}

/// Pull the tuned parameters out of captured `netsh int tcp show global` output
pub fn parse_tcp_globals(raw: &str) -> Vec<(&'static str, String)> {
    let mut found = Vec::new();
    for (param, _, label) in TCP_SETTINGS {
        let value = raw
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with(label))
            .find_map(|line| line.split_once(':'))
            .map(|(_, value)| value.trim().to_lowercase());

        if let Some(value) = value.filter(|v| !v.is_empty()) {
            found.push((param, value));
        }
    }
    found
}

// ---------- Power ----------

#[derive(Debug, Serialize, Deserialize)]
struct PowerSnapshot {
    scheme: String,
}

/// Active power scheme
#[derive(Debug, Clone, Copy)]
pub struct PowerPlan;

impl MutationAction for PowerPlan {
    fn name(&self) -> &str {
        "Power plan"
    }

    fn snapshot_key(&self) -> &'static str {
        "power_plan"
    }

    fn apply(&self, ctx: &mut MutationContext<'_>) -> Result<String, MutationError> {
        let current = ctx.run("powercfg", &["/GETACTIVESCHEME"])?;
        ctx.snapshot(&PowerSnapshot {
            scheme: current.stdout.trim().to_string(),
        })?;

        ctx.run("powercfg", &["/SETACTIVE", "SCHEME_MIN"])?;
        Ok("power plan set to maximum performance".to_string())
    }

    fn restore(
        &self,
        ctx: &mut MutationContext<'_>,
        snapshot: &Value,
    ) -> Result<String, MutationError> {
        let snapshot: PowerSnapshot = parse_snapshot(self.snapshot_key(), snapshot)?;
        let guid =
            parse_scheme_guid(&snapshot.scheme).ok_or_else(|| MutationError::InvalidSnapshot {
                key: self.snapshot_key().to_string(),
                reason: "could not determine the power scheme GUID".to_string(),
            })?;

        ctx.run("powercfg", &["/SETACTIVE", &guid])?;
        Ok(format!("power plan {} restored", guid))
    }
}

/// "Power Scheme GUID: 381b4222-...  (Balanced)" -> "381b4222-..."
pub fn parse_scheme_guid(scheme: &str) -> Option<String> {
    if !scheme.contains("GUID") {
        return None;
    }
    let (_, rest) = scheme.split_once(':')?;
    let guid = rest.split('(').next()?.trim();
    if guid.is_empty() {
        None
    } else {
        Some(guid.to_string())
    }
}

// ---------- Services ----------

#[derive(Debug, Serialize, Deserialize)]
struct ServicesSnapshot {
    /// Service name -> startup type before the change
    start_types: BTreeMap<String, String>,
}

/// Telemetry, indexing and Xbox services that compete with games for I/O
#[derive(Debug, Clone)]
pub struct BackgroundServices {
    services: Vec<String>,
}

impl BackgroundServices {
    pub fn new(services: Vec<String>) -> Self {
        Self { services }
    }
}

impl MutationAction for BackgroundServices {
    fn name(&self) -> &str {
        "Background services"
    }

    fn snapshot_key(&self) -> &'static str {
        "services"
    }

    fn apply(&self, ctx: &mut MutationContext<'_>) -> Result<String, MutationError> {
        let mut start_types = BTreeMap::new();
        for service in &self.services {
            let query = format!(
                "(Get-Service -Name {} -ErrorAction SilentlyContinue).StartType",
                service
            );
            let output = ctx.powershell_unchecked(&query)?;
            let start_type = output.stdout.trim();
            if output.success && !start_type.is_empty() {
                start_types.insert(service.clone(), start_type.to_string());
            } else {
                debug!("Service {} not present, skipping", service);
            }
        }

        let present: Vec<String> = start_types.keys().cloned().collect();
        ctx.snapshot(&ServicesSnapshot { start_types })?;

        for service in &present {
            ctx.powershell_unchecked(&format!(
                "Stop-Service -Name {} -Force -ErrorAction SilentlyContinue",
                service
            ))?;
            ctx.powershell_unchecked(&format!(
                "Set-Service -Name {} -StartupType Manual -ErrorAction SilentlyContinue",
                service
            ))?;
        }
        Ok(format!(
            "services switched to manual: {}/{}",
            present.len(),
            self.services.len()
        ))
    }

    fn restore(
        &self,
        ctx: &mut MutationContext<'_>,
        snapshot: &Value,
    ) -> Result<String, MutationError> {
        let snapshot: ServicesSnapshot = parse_snapshot(self.snapshot_key(), snapshot)?;

        let mut restored = 0;
        for (service, start_type) in &snapshot.start_types {
            let output = ctx.powershell_unchecked(&format!(
                "Set-Service -Name {} -StartupType {} -ErrorAction SilentlyContinue",
                service, start_type
            ))?;
            if output.success {
                restored += 1;
            }
            if start_type.eq_ignore_ascii_case("Automatic") {
                ctx.powershell_unchecked(&format!(
                    "Start-Service -Name {} -ErrorAction SilentlyContinue",
                    service
                ))?;
            }
        }
        Ok(format!(
            "startup type restored for {}/{} service(s)",
            restored,
            snapshot.start_types.len()
        ))
    }
}

// ---------- DNS ----------

#[derive(Debug, Serialize, Deserialize)]
struct DnsSnapshot {
    /// Interface alias -> IPv4 servers before the change (empty means DHCP)
    adapters: BTreeMap<String, Vec<String>>,
}

/// One interface alias per line
const DNS_ADAPTER_LISTING: &str = "Get-DnsClientServerAddress -AddressFamily IPv4 | \
                                   Select-Object -ExpandProperty InterfaceAlias";

/// IPv4 DNS servers of every interface
#[derive(Debug, Clone)]
pub struct DnsServers {
    servers: Vec<String>,
}

impl DnsServers {
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers }
    }
}

impl MutationAction for DnsServers {
    fn name(&self) -> &str {
        "DNS servers"
    }

    fn snapshot_key(&self) -> &'static str {
        "dns"
    }

    fn apply(&self, ctx: &mut MutationContext<'_>) -> Result<String, MutationError> {
        if self.servers.is_empty() {
            return Ok("no DNS servers configured, skipped".to_string());
        }

        // A failed capture must not replace the last good snapshot
        let listing = ctx.powershell(DNS_ADAPTER_LISTING)?;

        let mut adapters = BTreeMap::new();
        for alias in non_empty_lines(&listing.stdout) {
            let current = ctx.powershell(&format!(
                "(Get-DnsClientServerAddress -InterfaceAlias \"{}\" -AddressFamily IPv4)\
                 .ServerAddresses",
                alias
            ))?;
            let servers: Vec<String> = non_empty_lines(&current.stdout)
                .map(str::to_string)
                .collect();
            adapters.insert(alias.to_string(), servers);
        }

        let aliases: Vec<String> = adapters.keys().cloned().collect();
        ctx.snapshot(&DnsSnapshot { adapters })?;

        let server_list = self.servers.join(",");
        let mut updated = 0;
        for alias in &aliases {
            let output = ctx.powershell_unchecked(&format!(
                "Set-DnsClientServerAddress -InterfaceAlias \"{}\" -ServerAddresses {}",
                alias, server_list
            ))?;
            if output.success {
                updated += 1;
            }
        }
        Ok(format!(
            "DNS set to {} on {} interface(s)",
            self.servers.join(", "),
            updated
        ))
    }

    fn restore(
        &self,
        ctx: &mut MutationContext<'_>,
        snapshot: &Value,
    ) -> Result<String, MutationError> {
        let snapshot: DnsSnapshot = parse_snapshot(self.snapshot_key(), snapshot)?;

        let mut restored = 0;
        for (alias, servers) in &snapshot.adapters {
            let script = if servers.is_empty() {
                format!(
                    "Set-DnsClientServerAddress -InterfaceAlias \"{}\" -ResetServerAddresses",
                    alias
                )
            } else {
                format!(
                    "Set-DnsClientServerAddress -InterfaceAlias \"{}\" -ServerAddresses {}",
                    alias,
                    servers.join(",")
                )
            };
            if ctx.powershell_unchecked(&script)?.success {
                restored += 1;
            }
        }
        Ok(format!(
            "DNS restored on {}/{} interface(s)",
            restored,
            snapshot.adapters.len()
        ))
    }
}

// ---------- Game Mode / DVR ----------

struct RegistryFlag {
    key: &'static str,
    value: &'static str,
    optimized: u32,
}

const GAME_FLAGS: [RegistryFlag; 2] = [
    RegistryFlag {
        key: r"HKCU\Software\Microsoft\GameBar",
        value: "AllowAutoGameMode",
        optimized: 1,
    },
    RegistryFlag {
        key: r"HKCU\System\GameConfigStore",
        value: "GameDVR_Enabled",
        optimized: 0,
    },
];

#[derive(Debug, Serialize, Deserialize)]
struct GameFeaturesSnapshot {
    /// Registry value name -> DWORD before the change (`null` when unset)
    values: BTreeMap<String, Option<u32>>,
}

/// Windows Game Mode on, background Game DVR capture off
#[derive(Debug, Clone, Copy)]
pub struct GameFeatures;

impl MutationAction for GameFeatures {
    fn name(&self) -> &str {
        "Game Mode"
    }

    fn snapshot_key(&self) -> &'static str {
        "game_features"
    }

    fn apply(&self, ctx: &mut MutationContext<'_>) -> Result<String, MutationError> {
        let mut values = BTreeMap::new();
        for flag in &GAME_FLAGS {
            let output = ctx.run_unchecked("reg", &["query", flag.key, "/v", flag.value])?;
            let current = if output.success {
                parse_reg_dword(&output.stdout)
            } else {
                None
            };
            values.insert(flag.value.to_string(), current);
        }
        ctx.snapshot(&GameFeaturesSnapshot { values })?;

        for flag in &GAME_FLAGS {
            let data = flag.optimized.to_string();
            ctx.run(
                "reg",
                &["add", flag.key, "/v", flag.value, "/t", "REG_DWORD", "/d", &data, "/f"],
            )?;
        }
        Ok("Game Mode enabled, Game DVR disabled".to_string())
    }

    fn restore(
        &self,
        ctx: &mut MutationContext<'_>,
        snapshot: &Value,
    ) -> Result<String, MutationError> {
        let snapshot: GameFeaturesSnapshot = parse_snapshot(self.snapshot_key(), snapshot)?;

        for flag in &GAME_FLAGS {
            match snapshot.values.get(flag.value) {
                Some(Some(previous)) => {
                    let data = previous.to_string();
                    ctx.run(
                        "reg",
                        &["add", flag.key, "/v", flag.value, "/t", "REG_DWORD", "/d", &data, "/f"],
                    )?;
                }
                Some(None) => {
                    // The value did not exist before, remove it again
                    ctx.run_unchecked("reg", &["delete", flag.key, "/v", flag.value, "/f"])?;
                }
                None => {}
            }
        }
        Ok("Game Mode and Game DVR settings restored".to_string())
    }
}

/// Parse the DWORD shown by `reg query`
pub fn parse_reg_dword(output: &str) -> Option<u32> {
    let caps = REG_DWORD_PATTERN.captures(output)?;
    u32::from_str_radix(caps.get(1)?.as_str(), 16).ok()
}

// ---------- Process priority ----------

#[derive(Debug, Serialize, Deserialize)]
struct PrioritySnapshot {
    targets: Vec<String>,
}

/// High scheduling priority for running game executables
#[derive(Debug, Clone)]
pub struct ProcessPriority {
    processes: Vec<String>,
}

impl ProcessPriority {
    pub fn new(processes: Vec<String>) -> Self {
        Self { processes }
    }

    fn set_priority(
        ctx: &MutationContext<'_>,
        targets: &[String],
        class: &str,
    ) -> Result<usize, MutationError> {
        let mut changed = 0;
        for name in targets {
            let stem = name.trim_end_matches(".exe");
            let script = format!(
                "Get-Process -Name '{}' -ErrorAction SilentlyContinue | \
                 ForEach-Object {{ $_.PriorityClass = '{}'; $_.Id }}",
                stem, class
            );
            let output = ctx.powershell_unchecked(&script)?;
            if output.success {
                changed += non_empty_lines(&output.stdout).count();
            }
        }
        Ok(changed)
    }
}

impl MutationAction for ProcessPriority {
    fn name(&self) -> &str {
        "Process priority"
    }

    fn snapshot_key(&self) -> &'static str {
        "process_priority"
    }

    fn apply(&self, ctx: &mut MutationContext<'_>) -> Result<String, MutationError> {
        let targets: Vec<String> = self.processes.iter().map(|p| p.to_lowercase()).collect();
        ctx.snapshot(&PrioritySnapshot {
            targets: targets.clone(),
        })?;

        let boosted = Self::set_priority(ctx, &targets, "High")?;
        Ok(format!("high priority applied to {} process(es)", boosted))
    }

    fn restore(
        &self,
        ctx: &mut MutationContext<'_>,
        snapshot: &Value,
    ) -> Result<String, MutationError> {
        let snapshot: PrioritySnapshot = parse_snapshot(self.snapshot_key(), snapshot)?;
        let restored = Self::set_priority(ctx, &snapshot.targets, "Normal")?;
        Ok(format!("normal priority restored on {} process(es)", restored))
    }
}
