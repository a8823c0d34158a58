use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

use xpu_probe::{load_fixture_dir, ApiSet, LinuxHost, SysfsProbe};
use xpu_registry::{
    compare, load_snapshot, render, save_snapshot, Device, DeviceRegistry, LogAndContinue,
    MetricsHub, RegistryBuilder, RegistryMetrics,
};
use xpu_telemetry::{SamplerConfig, TelemetryItem, TelemetrySampler};

#[derive(Parser, Debug)]
#[command(
    name = "xpuinfo",
    version,
    about = "XPU device inventory and telemetry",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct Discovery {
    /// Read device fixtures (*.yaml) from this directory instead of sysfs
    #[arg(long)]
    fixtures: Option<PathBuf>,
    /// Comma-separated API names to request (default: all)
    #[arg(long, value_delimiter = ',')]
    apis: Vec<String>,
    /// Skip CPU, memory and system inventory
    #[arg(long, action = ArgAction::SetTrue)]
    no_host: bool,
    /// Log structural violations and keep going
    #[arg(long, action = ArgAction::SetTrue)]
    lenient: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover devices and print the text report
    List {
        #[command(flatten)]
        discovery: Discovery,
    },
    /// Discover devices and write a JSON snapshot
    Snapshot {
        #[command(flatten)]
        discovery: Discovery,
        /// Output file
        #[arg(long)]
        out: PathBuf,
    },
    /// Load a JSON snapshot and print its report
    Replay {
        #[command(flatten)]
        discovery: Discovery,
        /// Snapshot file
        #[arg(long)]
        from: PathBuf,
        /// Also discover live devices and compare field by field
        #[arg(long, action = ArgAction::SetTrue)]
        compare: bool,
    },
    /// Sample telemetry for one device
    Track {
        #[command(flatten)]
        discovery: Discovery,
        /// Adapter index or a substring of the device name
        #[arg(long, default_value = "0")]
        device: String,
        /// Sampling period in milliseconds
        #[arg(long, default_value_t = 100u64)]
        period_ms: u64,
        /// How long to sample in milliseconds
        #[arg(long, default_value_t = 2000u64)]
        duration_ms: u64,
        /// Stream CSV rows to stdout while sampling
        #[arg(long, action = ArgAction::SetTrue)]
        realtime: bool,
        /// Keep only the latest record
        #[arg(long, action = ArgAction::SetTrue)]
        peak_only: bool,
    },
    /// Discover devices and print Prometheus metrics
    Metrics {
        #[command(flatten)]
        discovery: Discovery,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::List { discovery } => {
            let reg = discover(&discovery, None)?;
            print!("{}", render(&reg));
            Ok(())
        }
        Commands::Snapshot { discovery, out } => {
            let reg = discover(&discovery, None)?;
            save_snapshot(&out, &reg)?;
            info!(path = %out.display(), devices = reg.len(), "snapshot written");
            Ok(())
        }
        Commands::Replay {
            discovery,
            from,
            compare: check,
        } => replay(&discovery, &from, check),
        Commands::Track {
            discovery,
            device,
            period_ms,
            duration_ms,
            realtime,
            peak_only,
        } => track(&discovery, &device, period_ms, duration_ms, realtime, peak_only),
        Commands::Metrics { discovery } => {
            let hub = MetricsHub::new().map_err(|e| anyhow!(e))?;
            let reg = discover(&discovery, Some(hub.xpu.clone()))?;
            hub.xpu.devices_registered.set(reg.len() as i64);
            print!("{}", hub.encode_text());
            Ok(())
        }
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_apis(names: &[String]) -> Result<ApiSet> {
    if names.is_empty() {
        return Ok(ApiSet::all());
    }
    names.iter().try_fold(ApiSet::empty(), |acc, n| {
        ApiSet::from_api_name(n.trim())
            .map(|api| acc | api)
            .ok_or_else(|| anyhow!("unknown API name: {n}"))
    })
}

fn discover(opts: &Discovery, metrics: Option<RegistryMetrics>) -> Result<DeviceRegistry> {
    let mut builder = RegistryBuilder::new().apis(parse_apis(&opts.apis)?);
    builder = match &opts.fixtures {
        Some(dir) => builder.probe(Box::new(load_fixture_dir(dir)?)),
        None => builder.probe(Box::new(SysfsProbe::default())),
    };
    if !opts.no_host {
        builder = builder
            .host(Box::new(LinuxHost::default()))
            .inventory(Box::new(LinuxHost::default()));
    }
    if opts.lenient {
        builder = builder.error_handler(Arc::new(LogAndContinue));
    }
    if let Some(m) = metrics {
        builder = builder.metrics(m);
    }
    builder.build().context("building device registry")
}

fn replay(opts: &Discovery, from: &Path, check: bool) -> Result<()> {
    let replayed = load_snapshot(from)?;
    print!("{}", render(&replayed));
    if check {
        let live = discover(opts, None)?;
        compare(&live, &replayed).with_context(|| format!("live system differs from {}", from.display()))?;
        println!("Snapshot matches live system");
    }
    Ok(())
}

fn select_device(reg: &DeviceRegistry, selector: &str) -> Option<Arc<Device>> {
    match selector.parse::<u32>() {
        Ok(index) => reg.by_index(index),
        Err(_) => reg.by_name(selector),
    }
    .cloned()
}

fn track(
    opts: &Discovery,
    selector: &str,
    period_ms: u64,
    duration_ms: u64,
    realtime: bool,
    peak_only: bool,
) -> Result<()> {
    let reg = discover(opts, None)?;
    let Some(device) = select_device(&reg, selector) else {
        bail!("no device matches '{selector}' ({} discovered)", reg.len());
    };
    let config = SamplerConfig {
        period: Duration::from_millis(period_ms),
        control: if peak_only {
            TelemetryItem::PEAK_USAGE_ONLY
        } else {
            TelemetryItem::empty()
        },
    };
    let hub = MetricsHub::new().map_err(|e| anyhow!(e))?;
    let mut sampler = TelemetrySampler::with_defaults(device, config)?
        .with_metrics(hub.xpu.telemetry_samples.clone());
    if sampler.source_count() == 0 {
        bail!("no telemetry sources available for {}", sampler.device().name());
    }
    if realtime {
        sampler = sampler.with_realtime(Box::new(std::io::stdout()));
    }

    sampler.start()?;
    thread::sleep(Duration::from_millis(duration_ms));
    sampler.stop();
    info!(samples = hub.xpu.telemetry_samples.get(), "tracking finished");

    if !realtime {
        print!("{}", sampler.log());
    }
    let peak = sampler.peak_usage();
    let initial = sampler.initial_usage();
    println!(
        "Device memory used (MB): initial {}, peak {}",
        initial.device_memory_used_bytes >> 20,
        peak.device_memory_used_bytes >> 20
    );
    println!("Fields: {:?}", sampler.result_mask());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_track() {
        let cli = Cli::try_parse_from([
            "xpuinfo",
            "track",
            "--device",
            "arc",
            "--period-ms",
            "50",
            "--fixtures",
            "fx",
        ])
        .unwrap();
        match cli.command {
            Commands::Track {
                device,
                period_ms,
                discovery,
                ..
            } => {
                assert_eq!(device, "arc");
                assert_eq!(period_ms, 50);
                assert_eq!(discovery.fixtures, Some(PathBuf::from("fx")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_apis() {
        assert_eq!(parse_apis(&[]).unwrap(), ApiSet::all());
        let set = parse_apis(&["sysfs".into(), "FIXTURE".into()]).unwrap();
        assert_eq!(set, ApiSet::SYSFS | ApiSet::FIXTURE);
        assert!(parse_apis(&["nope".into()]).is_err());
    }
}
