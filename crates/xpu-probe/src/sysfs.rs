//! Linux backend: PCI devices from sysfs, host facts from procfs and DMI.
//!
//! Every path is resolved under a configurable root so the parsers can be
//! exercised against a fake tree.

use crate::{
    ApiSet, CpuDescriptor, DeviceKind, DriverVersion, HostProbe, Identity, MemoryInfo, PciAddress,
    Probe, ProbeError, ProbeReport, ProbeRequest, Properties, ResizableBar, Result,
    RuntimeVersion, SystemInfo, SystemInventory, Uma, VENDOR_AMD, VENDOR_INTEL, VENDOR_NVIDIA,
};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const PCI_CLASS_DISPLAY: u32 = 0x03;
const PCI_CLASS_ACCELERATOR: u32 = 0x12;

/// Instruction sets reported in the CPU block, in print order.
const CPU_FEATURES: &[(&str, &str)] = &[
    ("avx512f", "AVX512F"),
    ("avx512vl", "AVX512VL"),
    ("avx512cd", "AVX512CD"),
    ("avx512dq", "AVX512DQ"),
    ("avx512bw", "AVX512BW"),
    ("avx512ifma", "AVX512_IFMA"),
    ("avx2", "AVX2"),
    ("f16c", "F16C"),
    ("avx", "AVX"),
    ("sse4_2", "SSE4.2"),
    ("sse4_1", "SSE4.1"),
    ("ssse3", "SSSE3"),
    ("pni", "SSE3"),
];

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_hex(path: &Path) -> Option<u32> {
    let s = read_trimmed(path)?;
    u32::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

fn read_u64(path: &Path) -> Option<u64> {
    read_trimmed(path)?.parse().ok()
}

fn vendor_name(vendor: u32) -> &'static str {
    match vendor {
        VENDOR_INTEL => "Intel",
        VENDOR_AMD => "AMD",
        VENDOR_NVIDIA => "NVIDIA",
        _ => "Unknown vendor",
    }
}

/// Maps a PCI class code (24-bit) to a device kind we inventory.
pub fn kind_for_class(class: u32) -> Option<DeviceKind> {
    match class >> 16 {
        PCI_CLASS_DISPLAY => Some(DeviceKind::Gpu),
        PCI_CLASS_ACCELERATOR => Some(DeviceKind::Npu),
        _ => None,
    }
}

/// Parses a sysfs link speed such as `16.0 GT/s PCIe` into a PCIe generation.
pub fn parse_link_speed(s: &str) -> Option<u32> {
    let rate: f64 = s.split_whitespace().next()?.parse().ok()?;
    let gen = match rate {
        r if r < 3.0 => 1,
        r if r < 6.0 => 2,
        r if r < 10.0 => 3,
        r if r < 20.0 => 4,
        r if r < 40.0 => 5,
        _ => 6,
    };
    Some(gen)
}

/// Peak unidirectional link bandwidth in bytes per second.
pub fn link_bandwidth(gen: u32, width: u32) -> Option<u64> {
    // transfer rate in MT/s and line-code efficiency
    let (mt_per_s, num, den): (u64, u64, u64) = match gen {
        1 => (2_500, 8, 10),
        2 => (5_000, 8, 10),
        3 => (8_000, 128, 130),
        4 => (16_000, 128, 130),
        5 => (32_000, 128, 130),
        6 => (64_000, 242, 256),
        _ => return None,
    };
    let per_lane = mt_per_s * 1_000_000 * num / den / 8;
    Some(per_lane * u64::from(width))
}

/// PCI display and accelerator functions under `<root>/sys/bus/pci/devices`.
pub struct SysfsProbe {
    root: PathBuf,
}

impl Default for SysfsProbe {
    fn default() -> Self {
        Self::with_root("/")
    }
}

impl SysfsProbe {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn describe_function(
        &self,
        dir: &Path,
        addr: PciAddress,
        kind: DeviceKind,
        request: &ProbeRequest,
    ) -> ProbeReport {
        let identity = request
            .identity_for_pci(&addr)
            .unwrap_or_else(|| Identity::from_pci(&addr));
        let mut props = Properties {
            pci_address: Some(addr),
            vendor_id: read_hex(&dir.join("vendor")),
            device_id: read_hex(&dir.join("device")),
            subsys_id: read_hex(&dir.join("subsystem_device")),
            revision: read_hex(&dir.join("revision")),
            location_info: Some(format!(
                "PCI bus {}, device {}, function {}",
                addr.bus, addr.device, addr.function
            )),
            ..Properties::default()
        };
        let vendor = props.vendor_id.unwrap_or_default();
        props.name = Some(format!(
            "{} {} [{:04x}:{:04x}]",
            vendor_name(vendor),
            kind,
            vendor,
            props.device_id.unwrap_or_default()
        ));

        let link = |name: &str| read_trimmed(&dir.join(name));
        props.pci_device_gen = link("max_link_speed").as_deref().and_then(parse_link_speed);
        props.pci_device_width = link("max_link_width").and_then(|w| w.parse().ok());
        props.pci_current_gen = link("current_link_speed").as_deref().and_then(parse_link_speed);
        props.pci_current_width = link("current_link_width").and_then(|w| w.parse().ok());
        if let (Some(g), Some(w)) = (props.pci_device_gen, props.pci_device_width) {
            props.pci_device_max_bandwidth = link_bandwidth(g, w);
        }
        if let (Some(g), Some(w)) = (props.pci_current_gen, props.pci_current_width) {
            props.pci_current_max_bandwidth = link_bandwidth(g, w);
        }

        // amdgpu exposes VRAM and the CPU-visible aperture
        if let Some(vram) = read_u64(&dir.join("mem_info_vram_total")) {
            props.dedicated_memory = Some(vram);
            if let Some(visible) = read_u64(&dir.join("mem_info_vis_vram_total")) {
                props.resizable_bar = Some(ResizableBar {
                    supported: true,
                    enabled: visible >= vram,
                });
            }
        }
        if let Some(gtt) = read_u64(&dir.join("mem_info_gtt_total")) {
            props.shared_memory = Some(gtt);
        }

        // Intel graphics on the root bus is the integrated part
        if kind == DeviceKind::Gpu && vendor == VENDOR_INTEL && addr.bus == 0 {
            props.uma = Uma::Integrated;
        }

        if let Some(card) = first_drm_card(dir) {
            props.freq_max_mhz = read_u64(&card.join("gt_max_freq_mhz")).and_then(|v| u32::try_from(v).ok());
            props.freq_min_mhz = read_u64(&card.join("gt_min_freq_mhz")).and_then(|v| u32::try_from(v).ok());
        }

        let mut report = ProbeReport::new(identity, kind, ApiSet::SYSFS).with_properties(props);
        if let Some(driver) = fs::read_link(dir.join("driver"))
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        {
            if let Some(v) = read_trimmed(&self.root.join("sys/module").join(&driver).join("version")) {
                report.driver_version = DriverVersion::parse(&v);
            }
            report.properties.driver_description = Some(driver);
        }
        report
    }
}

fn first_drm_card(dir: &Path) -> Option<PathBuf> {
    let mut cards: Vec<PathBuf> = fs::read_dir(dir.join("drm"))
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("card"))
        })
        .collect();
    cards.sort();
    cards.into_iter().next()
}

impl Probe for SysfsProbe {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn api(&self) -> ApiSet {
        ApiSet::SYSFS
    }

    fn describe(&mut self, request: &ProbeRequest) -> Result<Vec<ProbeReport>> {
        let bus = self.root.join("sys/bus/pci/devices");
        let entries = fs::read_dir(&bus)
            .map_err(|e| ProbeError::Unavailable(format!("{}: {e}", bus.display())))?;
        let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        dirs.sort();

        let mut reports = Vec::new();
        for dir in dirs {
            let Some(addr) = dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(PciAddress::parse_sysfs)
            else {
                continue;
            };
            let Some(kind) = read_hex(&dir.join("class")).and_then(kind_for_class) else {
                continue;
            };
            debug!(pci = %addr, kind = %kind, "sysfs: found device");
            reports.push(self.describe_function(&dir, addr, kind, request));
        }
        for (i, r) in reports.iter_mut().enumerate() {
            r.index = Some(i as u32);
        }
        Ok(reports)
    }
}

/// Parses `/proc/cpuinfo` text.
pub fn parse_cpuinfo(content: &str) -> CpuDescriptor {
    let mut brand = None;
    let mut logical = 0u32;
    let mut cores_field = None;
    let mut physical: BTreeSet<(String, String)> = BTreeSet::new();
    let mut package = String::new();
    let mut flags: Option<Vec<String>> = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "processor" => logical += 1,
            "model name" if brand.is_none() => brand = Some(value.to_string()),
            "cpu cores" if cores_field.is_none() => cores_field = value.parse::<u32>().ok(),
            "physical id" => package = value.to_string(),
            "core id" => {
                physical.insert((package.clone(), value.to_string()));
            }
            "flags" if flags.is_none() => {
                flags = Some(value.split_whitespace().map(str::to_string).collect())
            }
            _ => {}
        }
    }

    let flags = flags.unwrap_or_default();
    let features = CPU_FEATURES
        .iter()
        .filter(|(flag, _)| flags.iter().any(|f| f == flag))
        .map(|(_, name)| name.to_string())
        .collect();
    let physical_cores = if physical.is_empty() {
        cores_field.unwrap_or(logical)
    } else {
        physical.len() as u32
    };
    CpuDescriptor {
        brand: brand.unwrap_or_else(|| "Unknown CPU".to_string()),
        physical_cores,
        logical_cores: logical,
        hybrid: false,
        features,
    }
}

/// Parses `/proc/meminfo` into byte values keyed by field name.
pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
    content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let mut parts = rest.split_whitespace();
            let n: u64 = parts.next()?.parse().ok()?;
            let scale = match parts.next() {
                Some("kB") => 1024,
                _ => 1,
            };
            Some((key.trim().to_string(), n.checked_mul(scale)?))
        })
        .collect()
}

/// Parses `NAME`/`VERSION_ID` style pairs from `/etc/os-release`.
pub fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| {
            let (k, v) = line.split_once('=')?;
            Some((k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Splits a kernel release like `6.8.0-45-generic` into numeric parts.
pub fn parse_kernel_release(release: &str) -> Option<RuntimeVersion> {
    let numeric = release.split(['-', '+']).next()?;
    let mut parts = numeric.split('.').map(|p| p.parse::<u32>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().and_then(|p| p.ok()).unwrap_or(0);
    let build = parts.next().and_then(|p| p.ok()).unwrap_or(0);
    Some(RuntimeVersion {
        major,
        minor,
        build,
        product_version: Some(release.to_string()),
    })
}

/// CPU, memory and runtime facts from procfs; system identity from DMI.
pub struct LinuxHost {
    root: PathBuf,
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::with_root("/")
    }
}

impl LinuxHost {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, rel: &str) -> Result<String> {
        let path = self.root.join(rel);
        fs::read_to_string(&path).map_err(|e| ProbeError::Unavailable(format!("{}: {e}", path.display())))
    }

    fn page_size(&self) -> Option<u64> {
        let smaps = self.read("proc/self/smaps").ok()?;
        smaps
            .lines()
            .find_map(|l| l.strip_prefix("KernelPageSize:"))
            .and_then(|v| v.split_whitespace().next()?.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    }
}

impl HostProbe for LinuxHost {
    fn cpu(&mut self) -> Result<CpuDescriptor> {
        let mut cpu = parse_cpuinfo(&self.read("proc/cpuinfo")?);
        cpu.hybrid = self.root.join("sys/devices/cpu_atom").exists();
        Ok(cpu)
    }

    fn memory(&mut self) -> Result<MemoryInfo> {
        let info = parse_meminfo(&self.read("proc/meminfo")?);
        let total = *info
            .get("MemTotal")
            .ok_or_else(|| ProbeError::Malformed("meminfo without MemTotal".to_string()))?;
        Ok(MemoryInfo {
            installed: total,
            total,
            available_at_init: info.get("MemAvailable").copied().unwrap_or_default(),
            page_size: self.page_size().unwrap_or(4096),
        })
    }

    fn runtime_versions(&mut self) -> Result<Vec<(String, RuntimeVersion)>> {
        let release = self.read("proc/sys/kernel/osrelease")?;
        Ok(parse_kernel_release(release.trim())
            .map(|v| vec![("Linux Kernel".to_string(), v)])
            .unwrap_or_default())
    }
}

impl SystemInventory for LinuxHost {
    fn collect(&mut self) -> Result<SystemInfo> {
        let dmi = |name: &str| read_trimmed(&self.root.join("sys/class/dmi/id").join(name));
        let os = self
            .read("etc/os-release")
            .map(|s| parse_os_release(&s))
            .unwrap_or_default();
        let uptime_secs = self.read("proc/uptime").ok().and_then(|s| {
            s.split_whitespace()
                .next()
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| v as u64)
        });
        Ok(SystemInfo {
            manufacturer: dmi("sys_vendor"),
            model: dmi("product_name"),
            os_name: os.get("PRETTY_NAME").or_else(|| os.get("NAME")).cloned(),
            os_version: os.get("VERSION_ID").cloned(),
            bios_vendor: dmi("bios_vendor"),
            bios_version: dmi("bios_version"),
            uptime_secs,
        })
    }
}
