// WireGuard peer activity logging daemon

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use wirelogd::{
    config::{self, CliValues, ConfigSpec, Settings, CONFIG_PATH_ENV, ENV_PREFIX},
    logging,
    monitor::{LogSink, Monitor, MonitorError},
    wg_status::{Netlink, StatusSource, WgDump},
};

#[derive(Parser)]
#[command(name = "wirelogd", version)]
#[command(about = "Log WireGuard peers becoming active or inactive", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Refresh interval in seconds
    #[arg(short, long)]
    refresh: Option<i64>,

    /// Run wg with sudo
    #[arg(short, long)]
    sudo: bool,

    /// WireGuard handshake timeout in seconds
    #[arg(short, long)]
    timeout: Option<i64>,

    /// Link peers with their wg-gen-web config name
    #[arg(short, long)]
    wg_gen_web: bool,

    /// Path where wg-gen-web stores its config files
    #[arg(long)]
    wg_gen_web_path: Option<String>,

    /// Read peers over netlink instead of running wg
    #[arg(short, long)]
    netlink: bool,

    /// Log line format: text or json
    #[arg(long)]
    log_format: Option<String>,

    /// Log destination: stdout, stderr, syslog or a file path
    #[arg(long)]
    log_destination: Option<String>,
}

impl Args {
    /// Values given on the command line, keyed by option name
    ///
    /// Flags count only when set and zero intervals count as not given;
    /// the resolver skips empty values.
    fn cli_values(&self) -> CliValues {
        let flags = [
            ("debug", self.debug),
            ("sudo", self.sudo),
            ("wg-gen-web", self.wg_gen_web),
            ("netlink", self.netlink),
        ];
        let options = [
            ("refresh", non_zero(self.refresh)),
            ("timeout", non_zero(self.timeout)),
            ("wg-gen-web-path", self.wg_gen_web_path.clone()),
            ("log-format", self.log_format.clone()),
            ("log-destination", self.log_destination.clone()),
        ];

        flags
            .into_iter()
            .filter(|(_, set)| *set)
            .map(|(key, _)| (key.to_string(), "true".to_string()))
            .chain(
                options
                    .into_iter()
                    .filter_map(|(key, value)| value.map(|v| (key.to_string(), v))),
            )
            .collect()
    }
}

fn non_zero(value: Option<i64>) -> Option<String> {
    value.filter(|v| *v != 0).map(|v| v.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = config::select_config_path(
        args.config.clone(),
        std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from),
    )?;

    let spec = ConfigSpec::wirelogd();
    let resolved = config::resolve(&spec, &config_path, ENV_PREFIX, &args.cli_values())
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let settings = Settings::try_from(&resolved).context("Invalid configuration")?;

    logging::init(settings.debug, settings.log_format, &settings.log_destination)?;

    log::info!("starting wirelogd");
    log::debug!(
        "config: {}",
        serde_json::to_string(&resolved).unwrap_or_default()
    );

    // Polling is strictly sequential, one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .thread_name("wirelogd")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(settings))
}

async fn async_main(settings: Settings) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;

    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
            _ = sigint.recv() => log::info!("Received SIGINT"),
        }
    };

    if settings.netlink {
        if settings.sudo {
            log::warn!("sudo is ignored when reading peers over netlink");
        }
        run_monitor(Netlink, &settings, shutdown).await?;
    } else {
        run_monitor(WgDump::new(settings.sudo), &settings, shutdown).await?;
    }

    log::info!("stopping wirelogd");
    Ok(())
}

async fn run_monitor<S, F>(source: S, settings: &Settings, shutdown: F) -> Result<(), MonitorError>
where
    S: StatusSource,
    F: Future<Output = ()>,
{
    let mut monitor = Monitor::new(source, LogSink::new(settings.log_format), settings);
    monitor.run(shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_cli_values_only_supplied() {
        let args = Args::parse_from(["wirelogd", "-d", "--timeout", "60", "--wg-gen-web-path", ""]);
        let values = args.cli_values();

        assert_eq!(values.get("debug").map(String::as_str), Some("true"));
        assert_eq!(values.get("timeout").map(String::as_str), Some("60"));
        assert!(!values.contains_key("sudo"));
        assert!(!values.contains_key("refresh"));
        // Present but empty; dropped by the resolver
        assert_eq!(values.get("wg-gen-web-path").map(String::as_str), Some(""));
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let args = Args::parse_from(["wirelogd", "-r", "10", "-w", "--wg-gen-web-path", "/srv/wg"]);

        let resolved = config::resolve_with(
            &ConfigSpec::wirelogd(),
            &dir.path().join("wirelogd.cfg"),
            ENV_PREFIX,
            |_| None,
            &args.cli_values(),
        )
        .unwrap();
        let settings = Settings::try_from(&resolved).unwrap();

        assert_eq!(settings.refresh, std::time::Duration::from_secs(10));
        assert!(settings.wg_gen_web);
        assert_eq!(settings.wg_gen_web_path, PathBuf::from("/srv/wg"));
        assert_eq!(settings.timeout, 300);
    }

    #[test]
    fn test_cli_zero_intervals_ignored() {
        let args = Args::parse_from(["wirelogd", "--refresh", "0", "-t", "0"]);
        let values = args.cli_values();
        assert!(!values.contains_key("refresh"));
        assert!(!values.contains_key("timeout"));

        let dir = tempfile::TempDir::new().unwrap();
        let env = |name: &str| (name == "WIRELOGD_TIMEOUT").then(|| "120".to_string());
        let resolved = config::resolve_with(
            &ConfigSpec::wirelogd(),
            &dir.path().join("wirelogd.cfg"),
            ENV_PREFIX,
            env,
            &values,
        )
        .unwrap();
        let settings = Settings::try_from(&resolved).unwrap();

        // Lower layers keep their values
        assert_eq!(settings.refresh, std::time::Duration::from_secs(5));
        assert_eq!(settings.timeout, 120);
    }

    #[test]
    fn test_cli_log_options() {
        let args = Args::parse_from([
            "wirelogd",
            "--log-format",
            "json",
            "--log-destination",
            "syslog",
        ]);
        let values = args.cli_values();

        assert_eq!(values.get("log-format").map(String::as_str), Some("json"));
        assert_eq!(values.get("log-destination").map(String::as_str), Some("syslog"));
    }
}
