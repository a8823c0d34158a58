use crate::fields as f;
use crate::{Device, DeviceRegistry, Provenance, RegistryError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use xpu_probe::{
    ApiSet, CpuDescriptor, CudaCapability, DeviceKind, DriverVersion, FeatureFlags, Generation,
    GenerationSpace, Identity, MemoryInfo, PciAddress, Properties, ResizableBar, RuntimeVersion,
    SystemInfo, Uma,
};

/// Read-only view over one JSON object. Absent keys read as `None`; keys of
/// the wrong type are logged and read as `None`.
#[derive(Clone, Copy)]
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    scope: &'a str,
}

impl<'a> Fields<'a> {
    fn new(obj: &'a Map<String, Value>, scope: &'a str) -> Self {
        Self { obj, scope }
    }

    fn get<T>(&self, key: &str, read: impl FnOnce(&'a Value) -> Option<T>) -> Option<T> {
        let value = self.obj.get(key)?;
        if value.is_null() {
            return None;
        }
        let out = read(value);
        if out.is_none() {
            warn!(scope = self.scope, field = key, value = %value, "snapshot: ignoring mistyped field");
        }
        out
    }

    fn u64(&self, key: &str) -> Option<u64> {
        self.get(key, Value::as_u64)
    }

    fn u32(&self, key: &str) -> Option<u32> {
        self.get(key, |v| v.as_u64().and_then(|n| u32::try_from(n).ok()))
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.get(key, Value::as_bool)
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(key, |v| v.as_str().map(str::to_string))
    }

    fn object(&self, key: &str) -> Option<Fields<'a>> {
        let scope = self.scope;
        self.get(key, |v| v.as_object()).map(|obj| Fields::new(obj, scope))
    }

    fn strings(&self, key: &str) -> Option<Vec<String>> {
        self.get(key, |v| {
            v.as_array()?
                .iter()
                .map(|s| s.as_str().map(str::to_string))
                .collect()
        })
    }
}

fn decode_properties(d: Fields<'_>) -> Properties {
    let mut p = Properties {
        name: d.string(f::NAME),
        ..Properties::default()
    };

    if let Some(desc) = d.object(f::DESC) {
        p.vendor_id = desc.u32(f::VENDOR_ID);
        p.device_id = desc.u32(f::DEVICE_ID);
        p.subsys_id = desc.u32(f::SUBSYS_ID);
        p.revision = desc.u32(f::REVISION);
        p.dedicated_memory = desc.u64(f::DEDICATED_MEMORY);
        p.shared_memory = desc.u64(f::SHARED_MEMORY);
    }
    if let Some(drv) = d.object(f::DRIVER_INFO) {
        p.driver_description = drv.string(f::DRIVER_DESC);
        p.driver_inf_section = drv.string(f::DRIVER_INF_SECTION);
        p.device_instance_id = drv.string(f::DEVICE_INSTANCE_ID);
        p.location_info = drv.string(f::LOCATION_INFO);
    }

    p.memory_bandwidth_max = d.u64(f::MEMORY_BANDWIDTH_MAX);
    p.pci_device_gen = d.u32(f::PCI_DEVICE_GEN);
    p.pci_device_width = d.u32(f::PCI_DEVICE_WIDTH);
    p.pci_device_max_bandwidth = d.u64(f::PCI_DEVICE_MAX_BANDWIDTH);
    p.pci_current_gen = d.u32(f::PCI_CURRENT_GEN);
    p.pci_current_width = d.u32(f::PCI_CURRENT_WIDTH);
    p.pci_current_max_bandwidth = d.u64(f::PCI_CURRENT_MAX_BANDWIDTH);
    p.resizable_bar = d.object(f::RESIZABLE_BAR).map(|o| ResizableBar {
        supported: o.bool(f::SUPPORTED).unwrap_or(false),
        enabled: o.bool(f::ENABLED).unwrap_or(false),
    });
    p.pci_address = d.object(f::PCI_ADDRESS).and_then(|o| {
        Some(PciAddress {
            domain: o.u32(f::DOMAIN).unwrap_or(0),
            bus: o.u32(f::BUS)?,
            device: o.u32(f::DEVICE)?,
            function: o.u32(f::FUNCTION)?,
        })
    });
    p.uma = d
        .get(f::UMA, |v| v.as_str().and_then(Uma::parse))
        .unwrap_or_default();

    p.freq_max_mhz = d.u32(f::FREQ_MAX);
    p.freq_min_mhz = d.u32(f::FREQ_MIN);
    p.media_freq_max_mhz = d.u32(f::MEDIA_FREQ_MAX);
    p.media_freq_min_mhz = d.u32(f::MEDIA_FREQ_MIN);
    p.memory_freq_max_mhz = d.u32(f::MEMORY_FREQ_MAX);
    p.memory_freq_min_mhz = d.u32(f::MEMORY_FREQ_MIN);

    if let Some(id) = d.u32(f::GENERATION_ID) {
        let space = d
            .get(f::GENERATION_SPACE, |v| v.as_str().and_then(GenerationSpace::parse))
            .unwrap_or(GenerationSpace::Legacy);
        p.generation = Some(Generation { id, space });
    }
    p.ip_version = d.u32(f::IP_VERSION);
    p.compute_units = d.u32(f::COMPUTE_UNITS);
    p.simd_width = d.u32(f::SIMD_WIDTH);
    p.package_tdp = d.u32(f::PACKAGE_TDP);
    p.features = d.object(f::VENDOR_FLAGS).map(|o| FeatureFlags {
        dp4a: o.bool(f::DP4A).unwrap_or(false),
        dpas: o.bool(f::DPAS).unwrap_or(false),
    });
    p.cuda_capability = d.object(f::CUDA_CAPABILITY).and_then(|o| {
        Some(CudaCapability {
            major: o.u32(f::MAJOR)?,
            minor: o.u32(f::MINOR).unwrap_or(0),
        })
    });
    p.high_performance = d.bool(f::HIGH_PERFORMANCE);
    p.minimum_power = d.bool(f::MINIMUM_POWER);
    p.detachable = d.bool(f::DETACHABLE);
    p
}

fn decode_device(d: Fields<'_>, position: usize) -> Option<Device> {
    let Some(identity) = d.u64(f::IDENTITY) else {
        warn!(position, "snapshot: device entry without {}, skipping", f::IDENTITY);
        return None;
    };
    let kind = d
        .get(f::TYPE, |v| v.as_str().and_then(DeviceKind::parse))
        .unwrap_or_default();
    let index = d.u32(f::INDEX).unwrap_or(position as u32);
    let mut dev = Device::new(Identity(identity), kind, index);
    dev.sources = d
        .u32(f::VALID_APIS)
        .map(ApiSet::from_bits_truncate)
        .unwrap_or_default();
    dev.driver_version = d
        .u64(f::DRIVER_VERSION_RAW)
        .map(DriverVersion::from_raw)
        .unwrap_or_default();
    dev.properties = decode_properties(d);
    dev.provenance = Provenance::Replay;
    Some(dev)
}

fn decode_cpu(o: Fields<'_>) -> CpuDescriptor {
    CpuDescriptor {
        brand: o.string(f::BRAND).unwrap_or_default(),
        physical_cores: o.u32(f::PHYSICAL_CORES).unwrap_or(0),
        logical_cores: o.u32(f::LOGICAL_CORES).unwrap_or(0),
        hybrid: o.bool(f::HYBRID).unwrap_or(false),
        features: o.strings(f::FEATURES).unwrap_or_default(),
    }
}

fn decode_memory(o: Fields<'_>) -> MemoryInfo {
    MemoryInfo {
        installed: o.u64(f::INSTALLED).unwrap_or(0),
        total: o.u64(f::TOTAL).unwrap_or(0),
        available_at_init: o.u64(f::AVAILABLE_AT_INIT).unwrap_or(0),
        page_size: o.u64(f::PAGE_SIZE).unwrap_or(0),
    }
}

fn decode_system(o: Fields<'_>) -> SystemInfo {
    SystemInfo {
        manufacturer: o.string(f::MANUFACTURER),
        model: o.string(f::MODEL),
        os_name: o.string(f::OS_NAME),
        os_version: o.string(f::OS_VERSION),
        bios_vendor: o.string(f::BIOS_VENDOR),
        bios_version: o.string(f::BIOS_VERSION),
        uptime_secs: o.u64(f::UPTIME_SECS),
    }
}

fn decode_runtimes(o: Fields<'_>) -> BTreeMap<String, RuntimeVersion> {
    o.obj
        .iter()
        .filter_map(|(name, value)| {
            let Some(obj) = value.as_object() else {
                warn!(runtime = %name, "snapshot: ignoring mistyped runtime entry");
                return None;
            };
            let v = Fields::new(obj, name);
            Some((
                name.clone(),
                RuntimeVersion {
                    major: v.u32(f::MAJOR).unwrap_or(0),
                    minor: v.u32(f::MINOR).unwrap_or(0),
                    build: v.u32(f::BUILD).unwrap_or(0),
                    product_version: v.string(f::PRODUCT_VERSION),
                },
            ))
        })
        .collect()
}

/// Rebuilds a registry from a snapshot document.
///
/// Only text that is not JSON, or a top level that is not an object, is an
/// error. Missing or mistyped fields leave the corresponding value unset.
pub fn decode(text: &str) -> Result<DeviceRegistry> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| RegistryError::MalformedInput(format!("snapshot is not JSON: {e}")))?;
    let root = doc
        .as_object()
        .ok_or_else(|| RegistryError::MalformedInput("snapshot root is not an object".into()))?;
    let top = Fields::new(root, "snapshot");

    match top.string(f::VERSION) {
        Some(v) if v != f::SNAPSHOT_VERSION => {
            debug!(version = %v, expected = f::SNAPSHOT_VERSION, "snapshot: version differs")
        }
        _ => {}
    }

    let devices = match top.get(f::DEVICES, Value::as_array) {
        Some(entries) => entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry.as_object() {
                Some(obj) => decode_device(Fields::new(obj, f::DEVICES), i),
                None => {
                    warn!(position = i, "snapshot: device entry is not an object, skipping");
                    None
                }
            })
            .collect::<Vec<_>>(),
        None => Vec::new(),
    };

    let mut reg = DeviceRegistry::from_devices(devices);
    reg.provenance = Provenance::Replay;
    reg.apis_requested = top
        .u32(f::APIS_REQUESTED)
        .map(ApiSet::from_bits_truncate)
        .unwrap_or_default();
    reg.apis_used = top
        .u32(f::APIS_USED)
        .map(ApiSet::from_bits_truncate)
        .unwrap_or_default()
        | ApiSet::DESERIALIZED;
    reg.cpu = top.object(f::CPU).map(decode_cpu);
    reg.memory = top.object(f::MEMORY).map(decode_memory);
    reg.system = top.object(f::SYSTEM).map(decode_system);
    reg.runtime_versions = top.object(f::RUNTIMES).map(decode_runtimes).unwrap_or_default();
    Ok(reg)
}
