use crate::DriverVersion;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-run device key. Displayed as hexadecimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub u64);

impl Identity {
    /// Identity reserved for the host CPU.
    pub const CPU: Identity = Identity(u64::MAX);

    pub fn from_pci(addr: &PciAddress) -> Self {
        Identity(
            (u64::from(addr.domain) << 32)
                | (u64::from(addr.bus) << 16)
                | (u64::from(addr.device) << 8)
                | u64::from(addr.function),
        )
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Unknown,
    Cpu,
    Gpu,
    Npu,
    Other,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Unknown => "Unknown",
            DeviceKind::Cpu => "CPU",
            DeviceKind::Gpu => "GPU",
            DeviceKind::Npu => "NPU",
            DeviceKind::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Some(DeviceKind::Unknown),
            "cpu" => Some(DeviceKind::Cpu),
            "gpu" => Some(DeviceKind::Gpu),
            "npu" => Some(DeviceKind::Npu),
            "other" => Some(DeviceKind::Other),
            _ => None,
        }
    }

    /// Two kinds conflict when both are known and differ.
    pub fn conflicts_with(self, other: DeviceKind) -> bool {
        self != DeviceKind::Unknown && other != DeviceKind::Unknown && self != other
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Probe APIs, used both as a request mask and as a per-device source record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ApiSet: u32 {
        const DXGI = 1;
        const DX11_PERF_COUNTER = 1 << 1;
        const IGCL = 1 << 2;
        const OPENCL = 1 << 3;
        const LEVEL_ZERO = 1 << 4;
        const SETUPAPI = 1 << 5;
        const DXCORE = 1 << 6;
        const NVML = 1 << 7;
        const METAL = 1 << 8;
        const WMI = 1 << 9;
        const DESERIALIZED = 1 << 10;
        const IGCL_L0 = 1 << 11;
        const SYSFS = 1 << 12;
        const FIXTURE = 1 << 13;
    }
}

const API_NAMES: &[(ApiSet, &str)] = &[
    (ApiSet::DXGI, "DXGI"),
    (ApiSet::DX11_PERF_COUNTER, "DX11_INTEL_PERF_COUNTER"),
    (ApiSet::IGCL, "IGCL"),
    (ApiSet::OPENCL, "OPENCL"),
    (ApiSet::LEVEL_ZERO, "LEVELZERO"),
    (ApiSet::SETUPAPI, "SETUPAPI"),
    (ApiSet::DXCORE, "DXCORE"),
    (ApiSet::NVML, "NVML"),
    (ApiSet::METAL, "METAL"),
    (ApiSet::WMI, "WMI"),
    (ApiSet::DESERIALIZED, "DESERIALIZED"),
    (ApiSet::IGCL_L0, "IGCL_L0"),
    (ApiSet::SYSFS, "SYSFS"),
    (ApiSet::FIXTURE, "FIXTURE"),
];

impl ApiSet {
    /// Parses a single API name as printed by `Display`.
    pub fn from_api_name(name: &str) -> Option<ApiSet> {
        API_NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(api, _)| *api)
    }
}

impl fmt::Display for ApiSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }
        let mut first = true;
        for (api, name) in API_NAMES {
            if self.contains(*api) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Memory architecture classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Uma {
    #[default]
    Unknown,
    Integrated,
    Discrete,
}

impl Uma {
    pub fn as_str(self) -> &'static str {
        match self {
            Uma::Unknown => "Unknown",
            Uma::Integrated => "Integrated",
            Uma::Discrete => "Discrete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unknown" => Some(Uma::Unknown),
            "integrated" => Some(Uma::Integrated),
            "discrete" => Some(Uma::Discrete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PciAddress {
    pub domain: u32,
    pub bus: u32,
    pub device: u32,
    pub function: u32,
}

impl PciAddress {
    /// Parses the sysfs form `DDDD:BB:DD.F` (hex fields).
    pub fn parse_sysfs(s: &str) -> Option<Self> {
        let (domain, rest) = s.split_once(':')?;
        let (bus, rest) = rest.split_once(':')?;
        let (device, function) = rest.split_once('.')?;
        Some(Self {
            domain: u32::from_str_radix(domain, 16).ok()?,
            bus: u32::from_str_radix(bus, 16).ok()?,
            device: u32::from_str_radix(device, 16).ok()?,
            function: u32::from_str_radix(function, 16).ok()?,
        })
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResizableBar {
    pub supported: bool,
    pub enabled: bool,
}

/// Which identifier space a generation id was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSpace {
    /// Counter-style id reported by vendor performance counters.
    Legacy,
    /// Packed architecture/release/revision id.
    IpVersion,
    /// Legacy id resolved from a driver package name prefix.
    InfPrefix,
    /// Vendor architecture number (e.g. NVML).
    VendorArch,
}

impl GenerationSpace {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationSpace::Legacy => "legacy",
            GenerationSpace::IpVersion => "ip_version",
            GenerationSpace::InfPrefix => "inf_prefix",
            GenerationSpace::VendorArch => "vendor_arch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "legacy" => Some(GenerationSpace::Legacy),
            "ip_version" => Some(GenerationSpace::IpVersion),
            "inf_prefix" => Some(GenerationSpace::InfPrefix),
            "vendor_arch" => Some(GenerationSpace::VendorArch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generation {
    pub id: u32,
    pub space: GenerationSpace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub dp4a: bool,
    #[serde(default)]
    pub dpas: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CudaCapability {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for CudaCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Sparse property bag. `None` means no probe has reported the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Properties {
    pub name: Option<String>,
    pub vendor_id: Option<u32>,
    pub device_id: Option<u32>,
    pub subsys_id: Option<u32>,
    pub revision: Option<u32>,

    pub dedicated_memory: Option<u64>,
    pub shared_memory: Option<u64>,
    pub memory_bandwidth_max: Option<u64>,

    pub pci_device_gen: Option<u32>,
    pub pci_device_width: Option<u32>,
    pub pci_device_max_bandwidth: Option<u64>,
    pub pci_current_gen: Option<u32>,
    pub pci_current_width: Option<u32>,
    pub pci_current_max_bandwidth: Option<u64>,
    pub resizable_bar: Option<ResizableBar>,
    pub pci_address: Option<PciAddress>,

    pub uma: Uma,

    pub freq_max_mhz: Option<u32>,
    pub freq_min_mhz: Option<u32>,
    pub media_freq_max_mhz: Option<u32>,
    pub media_freq_min_mhz: Option<u32>,
    pub memory_freq_max_mhz: Option<u32>,
    pub memory_freq_min_mhz: Option<u32>,

    pub generation: Option<Generation>,
    pub ip_version: Option<u32>,
    pub compute_units: Option<u32>,
    pub simd_width: Option<u32>,
    pub package_tdp: Option<u32>,
    pub features: Option<FeatureFlags>,
    pub cuda_capability: Option<CudaCapability>,

    pub high_performance: Option<bool>,
    pub minimum_power: Option<bool>,
    pub detachable: Option<bool>,

    pub driver_description: Option<String>,
    pub driver_inf_section: Option<String>,
    pub device_instance_id: Option<String>,
    pub location_info: Option<String>,
}

pub const VENDOR_INTEL: u32 = 0x8086;
pub const VENDOR_AMD: u32 = 0x1002;
pub const VENDOR_NVIDIA: u32 = 0x10de;

impl Properties {
    pub fn is_vendor(&self, vendor: u32) -> bool {
        self.vendor_id == Some(vendor)
    }
}

/// One partial description of a device, as returned by a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub identity: Identity,
    pub kind: DeviceKind,
    pub api: ApiSet,
    pub index: Option<u32>,
    pub driver_version: DriverVersion,
    pub properties: Properties,
}

impl ProbeReport {
    pub fn new(identity: Identity, kind: DeviceKind, api: ApiSet) -> Self {
        Self {
            identity,
            kind,
            api,
            index: None,
            driver_version: DriverVersion::invalid(),
            properties: Properties::default(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// What the registry already knows, handed to each probe so it can reuse identities.
#[derive(Debug, Clone, Default)]
pub struct ProbeRequest {
    pub known: Vec<KnownDevice>,
}

#[derive(Debug, Clone)]
pub struct KnownDevice {
    pub identity: Identity,
    pub kind: DeviceKind,
    pub name: Option<String>,
    pub pci_address: Option<PciAddress>,
}

impl ProbeRequest {
    pub fn identity_for_pci(&self, addr: &PciAddress) -> Option<Identity> {
        self.known
            .iter()
            .find(|k| k.pci_address.as_ref() == Some(addr))
            .map(|k| k.identity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuDescriptor {
    pub brand: String,
    pub physical_cores: u32,
    pub logical_cores: u32,
    pub hybrid: bool,
    pub features: Vec<String>,
}

/// Host memory in bytes, sampled once at registry construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    pub installed: u64,
    pub total: u64,
    pub available_at_init: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub bios_vendor: Option<String>,
    pub bios_version: Option<String>,
    pub uptime_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub product_version: Option<String>,
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display_is_hex() {
        assert_eq!(Identity(0x100).to_string(), "0x100");
        assert_eq!(Identity::CPU.to_string(), "0xffffffffffffffff");
    }

    #[test]
    fn test_api_set_display_and_lookup() {
        let apis = ApiSet::DXGI | ApiSet::OPENCL;
        assert_eq!(apis.to_string(), "DXGI, OPENCL");
        assert_eq!(ApiSet::empty().to_string(), "NONE");
        assert_eq!(ApiSet::from_api_name("levelzero"), Some(ApiSet::LEVEL_ZERO));
        assert_eq!(ApiSet::from_api_name("nope"), None);
        assert_eq!(
            ApiSet::from_api_name("DX11_INTEL_PERF_COUNTER"),
            Some(ApiSet::DX11_PERF_COUNTER)
        );
        // display names, not the constant identifiers
        assert_eq!(ApiSet::from_api_name("LEVEL_ZERO"), None);
        assert_eq!(ApiSet::from_name("LEVEL_ZERO"), Some(ApiSet::LEVEL_ZERO));
        assert_eq!(ApiSet::DESERIALIZED.bits(), 1024);
    }

    #[test]
    fn test_pci_address_parse() {
        let addr = PciAddress::parse_sysfs("0000:03:00.1");
        assert_eq!(
            addr,
            Some(PciAddress {
                domain: 0,
                bus: 3,
                device: 0,
                function: 1
            })
        );
        assert!(PciAddress::parse_sysfs("garbage").is_none());
        let id = addr.map(|a| Identity::from_pci(&a));
        assert_eq!(id, Some(Identity(0x0003_0001)));
    }

    #[test]
    fn test_kind_conflicts() {
        assert!(DeviceKind::Cpu.conflicts_with(DeviceKind::Gpu));
        assert!(!DeviceKind::Unknown.conflicts_with(DeviceKind::Gpu));
        assert!(!DeviceKind::Gpu.conflicts_with(DeviceKind::Gpu));
    }
}
