// WireGuard peer status fetching

//! WireGuard peer status
//!
//! This module fetches the live peer table as `wg show all dump` text, either
//! by running the `wg` tool (optionally through `sudo`) or by reading devices
//! over the kernel netlink API and rendering them in the same dump format.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use tokio::process::Command;
use wireguard_control::{Backend, Device, PeerInfo};

/// Upper bound on a single status fetch
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while fetching the peer table
#[derive(Debug, Error)]
pub enum FetchError {
    /// `wg` or `sudo` is not on the PATH
    #[error("wireguard-tools are not installed ({program} not found)")]
    NotInstalled {
        /// Missing program
        program: String,
    },
    /// Command could not run or exited non-zero
    #[error("executing '{command}' failed: {detail}")]
    Failed {
        /// Command line
        command: String,
        /// Exit status and stderr, or the spawn error
        detail: String,
    },
    /// Command still running after the fetch timeout
    #[error("executing '{command}' timed out after {}s", .timeout.as_secs())]
    TimedOut {
        /// Command line
        command: String,
        /// Limit that was hit
        timeout: Duration,
    },
    /// Kernel netlink query failed
    #[error("cannot read WireGuard devices over netlink: {0}")]
    Netlink(#[source] io::Error),
}

/// Source of raw peer dumps
pub trait StatusSource {
    /// Fetch the current peer table as dump text
    fn fetch(&mut self) -> impl Future<Output = Result<String, FetchError>>;
}

/// Runs `wg show all dump`, optionally prefixed with `sudo`
#[derive(Debug, Clone)]
pub struct WgDump {
    sudo: bool,
    timeout: Duration,
}

impl WgDump {
    /// Create a fetcher using the default timeout
    pub fn new(sudo: bool) -> Self {
        Self {
            sudo,
            timeout: FETCH_TIMEOUT,
        }
    }

    /// Override the fetch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments that will be executed
    pub fn command_line(&self) -> Vec<&'static str> {
        let mut argv = vec!["wg", "show", "all", "dump"];
        if self.sudo {
            argv.insert(0, "sudo");
        }
        argv
    }
}

impl StatusSource for WgDump {
    async fn fetch(&mut self) -> Result<String, FetchError> {
        run_command(&self.command_line(), self.timeout).await
    }
}

/// Run a command and return its stdout
///
/// A missing executable, a non-zero exit and an expired timeout map to
/// distinct errors. The child is killed if the timeout fires.
pub async fn run_command(argv: &[&str], timeout: Duration) -> Result<String, FetchError> {
    let command = argv.join(" ");
    let Some((program, args)) = argv.split_first() else {
        return Err(FetchError::Failed {
            command,
            detail: "empty command".to_string(),
        });
    };

    let child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Err(_) => return Err(FetchError::TimedOut { command, timeout }),
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FetchError::NotInstalled {
                program: program.to_string(),
            })
        }
        Ok(Err(e)) => {
            return Err(FetchError::Failed {
                command,
                detail: e.to_string(),
            })
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FetchError::Failed {
            command,
            detail: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Reads peers from the kernel over netlink
#[derive(Debug, Clone, Copy, Default)]
pub struct Netlink;

impl StatusSource for Netlink {
    async fn fetch(&mut self) -> Result<String, FetchError> {
        // Netlink calls are blocking
        tokio::task::spawn_blocking(read_kernel_devices)
            .await
            .map_err(|e| FetchError::Netlink(io::Error::other(e)))?
    }
}

fn read_kernel_devices() -> Result<String, FetchError> {
    let mut dump = String::new();

    for name in Device::list(Backend::Kernel).map_err(FetchError::Netlink)? {
        let device = Device::get(&name, Backend::Kernel).map_err(FetchError::Netlink)?;
        let interface = device.name.to_string();
        for peer in &device.peers {
            dump.push_str(&DumpLine::from_peer(&interface, peer).to_string());
            dump.push('\n');
        }
    }

    Ok(dump)
}

/// One peer line of `wg show all dump`
///
/// Preshared keys are never rendered, only whether one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpLine {
    /// Interface name
    pub interface: String,
    /// Base64 public key
    pub public_key: String,
    /// Whether a preshared key is configured
    pub has_preshared_key: bool,
    /// Last known endpoint
    pub endpoint: Option<SocketAddr>,
    /// Allowed IPs in CIDR notation
    pub allowed_ips: Vec<String>,
    /// Unix seconds, 0 for never
    pub latest_handshake: u64,
    /// Bytes received
    pub rx_bytes: u64,
    /// Bytes sent
    pub tx_bytes: u64,
    /// Keepalive interval in seconds, `None` when off
    pub persistent_keepalive: Option<u16>,
}

impl DumpLine {
    fn from_peer(interface: &str, peer: &PeerInfo) -> Self {
        let latest_handshake = peer
            .stats
            .last_handshake_time
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            interface: interface.to_string(),
            public_key: peer.config.public_key.to_base64(),
            has_preshared_key: peer.config.preshared_key.is_some(),
            endpoint: peer.config.endpoint,
            allowed_ips: peer
                .config
                .allowed_ips
                .iter()
                .map(|ip| format!("{}/{}", ip.address, ip.cidr))
                .collect(),
            latest_handshake,
            rx_bytes: peer.stats.rx_bytes,
            tx_bytes: peer.stats.tx_bytes,
            persistent_keepalive: peer.config.persistent_keepalive_interval,
        }
    }
}

impl fmt::Display for DumpLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preshared_key = if self.has_preshared_key {
            "(hidden)"
        } else {
            "(none)"
        };
        let endpoint = self
            .endpoint
            .map(|e| e.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let allowed_ips = if self.allowed_ips.is_empty() {
            "(none)".to_string()
        } else {
            self.allowed_ips.join(",")
        };
        let keepalive = self
            .persistent_keepalive
            .map(|k| k.to_string())
            .unwrap_or_else(|| "off".to_string());

        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.interface,
            self.public_key,
            preshared_key,
            endpoint,
            allowed_ips,
            self.latest_handshake,
            self.rx_bytes,
            self.tx_bytes,
            keepalive
        )
    }
}
