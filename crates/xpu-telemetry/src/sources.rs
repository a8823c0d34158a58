use crate::{Result, Sample, TelemetryError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use xpu_probe::{parse_meminfo, PciAddress};
use xpu_registry::Device;

/// One acquired handle to a metric backend.
pub trait MetricSource: Send {
    fn name(&self) -> &str;
    /// Reads current values at `now`, the sampler clock's time for this
    /// tick. An empty sample means no data this tick.
    fn read(&mut self, now: Duration) -> Result<Sample>;
}

/// Opens a [`MetricSource`] for a device, if the backend supports it.
pub trait MetricSourceFactory: Send + Sync {
    fn name(&self) -> &str;
    fn acquire(&self, device: &Device) -> Result<Box<dyn MetricSource>>;
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Host memory and commit charge from `/proc/meminfo`.
pub struct SystemMemorySource {
    meminfo: PathBuf,
    commit_peak: u64,
}

impl SystemMemorySource {
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            meminfo: root.as_ref().join("proc/meminfo"),
            commit_peak: 0,
        }
    }
}

impl MetricSource for SystemMemorySource {
    fn name(&self) -> &str {
        "procfs-meminfo"
    }

    fn read(&mut self, _now: Duration) -> Result<Sample> {
        let raw = fs::read_to_string(&self.meminfo)
            .map_err(|e| TelemetryError::Read(format!("{}: {e}", self.meminfo.display())))?;
        let info = parse_meminfo(&raw);
        let committed = info.get("Committed_AS").copied();
        if let Some(c) = committed {
            self.commit_peak = self.commit_peak.max(c);
        }
        Ok(Sample {
            system_available: info.get("MemAvailable").copied(),
            commit_total: committed,
            commit_limit: info.get("CommitLimit").copied(),
            commit_peak: committed.map(|_| self.commit_peak),
            ..Sample::default()
        })
    }
}

#[derive(Debug, Clone)]
pub struct SystemMemoryFactory {
    root: PathBuf,
}

impl SystemMemoryFactory {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SystemMemoryFactory {
    fn default() -> Self {
        Self::with_root("/")
    }
}

impl MetricSourceFactory for SystemMemoryFactory {
    fn name(&self) -> &str {
        "procfs-meminfo"
    }

    fn acquire(&self, _device: &Device) -> Result<Box<dyn MetricSource>> {
        let source = SystemMemorySource::with_root(&self.root);
        if !source.meminfo.exists() {
            return Err(TelemetryError::SourceUnavailable(format!(
                "{} not found",
                source.meminfo.display()
            )));
        }
        Ok(Box::new(source))
    }
}

/// GPU frequency, VRAM usage and busy time from the DRM sysfs tree of one
/// PCI function.
pub struct DrmSource {
    freq: Option<PathBuf>,
    vram_used: Option<PathBuf>,
    vram_total: Option<PathBuf>,
    busy: Option<PathBuf>,
    busy_secs: f64,
    last_read: Option<Duration>,
}

impl DrmSource {
    /// Integrates the instantaneous busy percentage into busy seconds.
    fn accumulate_busy(&mut self, now: Duration) -> Option<f64> {
        let pct = self.busy.as_deref().and_then(read_u64)?;
        if let Some(last) = self.last_read {
            self.busy_secs += pct.min(100) as f64 / 100.0 * now.saturating_sub(last).as_secs_f64();
        }
        self.last_read = Some(now);
        Some(self.busy_secs)
    }
}

impl MetricSource for DrmSource {
    fn name(&self) -> &str {
        "drm-sysfs"
    }

    fn read(&mut self, now: Duration) -> Result<Sample> {
        let activity_global = self.accumulate_busy(now);
        Ok(Sample {
            activity_global,
            freq_mhz: self.freq.as_deref().and_then(read_u64).map(|f| f as f64),
            device_memory_used: self.vram_used.as_deref().and_then(read_u64),
            device_memory_budget: self.vram_total.as_deref().and_then(read_u64),
            ..Sample::default()
        })
    }
}

#[derive(Debug, Clone)]
pub struct DrmFactory {
    root: PathBuf,
}

impl DrmFactory {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pci_dir(&self, addr: &PciAddress) -> PathBuf {
        self.root.join(format!(
            "sys/bus/pci/devices/{:04x}:{:02x}:{:02x}.{:x}",
            addr.domain, addr.bus, addr.device, addr.function
        ))
    }
}

impl Default for DrmFactory {
    fn default() -> Self {
        Self::with_root("/")
    }
}

fn first_existing(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|p| p.exists())
}

fn card_dirs(pci: &Path) -> Vec<PathBuf> {
    let mut cards: Vec<PathBuf> = fs::read_dir(pci.join("drm"))
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("card"))
                })
                .collect()
        })
        .unwrap_or_default();
    cards.sort();
    cards
}

impl MetricSourceFactory for DrmFactory {
    fn name(&self) -> &str {
        "drm-sysfs"
    }

    fn acquire(&self, device: &Device) -> Result<Box<dyn MetricSource>> {
        let addr = device.properties.pci_address.ok_or_else(|| {
            TelemetryError::SourceUnavailable(format!("{} has no PCI address", device.identity))
        })?;
        let pci = self.pci_dir(&addr);
        let freq = card_dirs(&pci).into_iter().find_map(|card| {
            first_existing([card.join("gt_act_freq_mhz"), card.join("gt_cur_freq_mhz")])
        });
        let source = DrmSource {
            freq,
            vram_used: first_existing([pci.join("mem_info_vram_used")]),
            vram_total: first_existing([pci.join("mem_info_vram_total")]),
            busy: first_existing([pci.join("gpu_busy_percent")]),
            busy_secs: 0.0,
            last_read: None,
        };
        if source.freq.is_none() && source.vram_used.is_none() && source.busy.is_none() {
            return Err(TelemetryError::SourceUnavailable(format!(
                "no DRM counters under {}",
                pci.display()
            )));
        }
        debug!(
            device = %device.identity,
            freq = source.freq.is_some(),
            vram = source.vram_used.is_some(),
            busy = source.busy.is_some(),
            "telemetry: drm source acquired"
        );
        Ok(Box::new(source))
    }
}

/// Backends available on this host by default.
pub fn default_factories() -> Vec<Box<dyn MetricSourceFactory>> {
    vec![
        Box::new(DrmFactory::default()),
        Box::new(SystemMemoryFactory::default()),
    ]
}
