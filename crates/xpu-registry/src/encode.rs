use crate::fields as f;
use crate::{Device, DeviceRegistry, RegistryError, Result};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use xpu_probe::{CpuDescriptor, MemoryInfo, SystemInfo};

type Object = Map<String, Value>;

fn put<T: Into<Value>>(obj: &mut Object, key: &str, value: Option<T>) {
    if let Some(v) = value {
        obj.insert(key.to_string(), v.into());
    }
}

fn put_obj(obj: &mut Object, key: &str, child: Object) {
    if !child.is_empty() {
        obj.insert(key.to_string(), Value::Object(child));
    }
}

fn encode_device(dev: &Device) -> Value {
    let p = &dev.properties;
    let mut obj = Object::new();
    put(&mut obj, f::NAME, p.name.clone());
    put(&mut obj, f::IDENTITY, Some(dev.identity.0));
    put(&mut obj, f::INDEX, Some(dev.index));
    put(&mut obj, f::TYPE, Some(dev.kind.as_str()));
    put(&mut obj, f::VALID_APIS, Some(dev.sources.bits()));
    if dev.driver_version.is_valid() {
        put(&mut obj, f::DRIVER_VERSION_RAW, Some(dev.driver_version.as_u64()));
    }
    put(&mut obj, f::GENERATION_NAME, dev.generation_name());

    let mut desc = Object::new();
    put(&mut desc, f::VENDOR_ID, p.vendor_id);
    put(&mut desc, f::DEVICE_ID, p.device_id);
    put(&mut desc, f::SUBSYS_ID, p.subsys_id);
    put(&mut desc, f::REVISION, p.revision);
    put(&mut desc, f::DEDICATED_MEMORY, p.dedicated_memory);
    put(&mut desc, f::SHARED_MEMORY, p.shared_memory);
    put_obj(&mut obj, f::DESC, desc);

    let mut driver = Object::new();
    put(&mut driver, f::DRIVER_DESC, p.driver_description.clone());
    if dev.driver_version.is_valid() {
        put(&mut driver, f::DRIVER_VERSION, Some(dev.driver_version.to_string()));
    }
    put(&mut driver, f::DRIVER_INF_SECTION, p.driver_inf_section.clone());
    put(&mut driver, f::DEVICE_INSTANCE_ID, p.device_instance_id.clone());
    put(&mut driver, f::LOCATION_INFO, p.location_info.clone());
    put_obj(&mut obj, f::DRIVER_INFO, driver);

    put(&mut obj, f::MEMORY_BANDWIDTH_MAX, p.memory_bandwidth_max);
    put(&mut obj, f::PCI_DEVICE_GEN, p.pci_device_gen);
    put(&mut obj, f::PCI_DEVICE_WIDTH, p.pci_device_width);
    put(&mut obj, f::PCI_DEVICE_MAX_BANDWIDTH, p.pci_device_max_bandwidth);
    put(&mut obj, f::PCI_CURRENT_GEN, p.pci_current_gen);
    put(&mut obj, f::PCI_CURRENT_WIDTH, p.pci_current_width);
    put(&mut obj, f::PCI_CURRENT_MAX_BANDWIDTH, p.pci_current_max_bandwidth);
    if let Some(bar) = p.resizable_bar {
        let mut o = Object::new();
        put(&mut o, f::SUPPORTED, Some(bar.supported));
        put(&mut o, f::ENABLED, Some(bar.enabled));
        put_obj(&mut obj, f::RESIZABLE_BAR, o);
    }
    if let Some(addr) = p.pci_address {
        let mut o = Object::new();
        put(&mut o, f::DOMAIN, Some(addr.domain));
        put(&mut o, f::BUS, Some(addr.bus));
        put(&mut o, f::DEVICE, Some(addr.device));
        put(&mut o, f::FUNCTION, Some(addr.function));
        put_obj(&mut obj, f::PCI_ADDRESS, o);
    }
    put(&mut obj, f::UMA, Some(p.uma.as_str()));

    put(&mut obj, f::FREQ_MAX, p.freq_max_mhz);
    put(&mut obj, f::FREQ_MIN, p.freq_min_mhz);
    put(&mut obj, f::MEDIA_FREQ_MAX, p.media_freq_max_mhz);
    put(&mut obj, f::MEDIA_FREQ_MIN, p.media_freq_min_mhz);
    put(&mut obj, f::MEMORY_FREQ_MAX, p.memory_freq_max_mhz);
    put(&mut obj, f::MEMORY_FREQ_MIN, p.memory_freq_min_mhz);

    if let Some(g) = p.generation {
        put(&mut obj, f::GENERATION_ID, Some(g.id));
        put(&mut obj, f::GENERATION_SPACE, Some(g.space.as_str()));
    }
    put(&mut obj, f::IP_VERSION, p.ip_version);
    put(&mut obj, f::COMPUTE_UNITS, p.compute_units);
    put(&mut obj, f::SIMD_WIDTH, p.simd_width);
    put(&mut obj, f::PACKAGE_TDP, p.package_tdp);
    if let Some(flags) = p.features {
        let mut o = Object::new();
        put(&mut o, f::DP4A, Some(flags.dp4a));
        put(&mut o, f::DPAS, Some(flags.dpas));
        put_obj(&mut obj, f::VENDOR_FLAGS, o);
    }
    if let Some(cc) = p.cuda_capability {
        let mut o = Object::new();
        put(&mut o, f::MAJOR, Some(cc.major));
        put(&mut o, f::MINOR, Some(cc.minor));
        put_obj(&mut obj, f::CUDA_CAPABILITY, o);
    }
    put(&mut obj, f::HIGH_PERFORMANCE, p.high_performance);
    put(&mut obj, f::MINIMUM_POWER, p.minimum_power);
    put(&mut obj, f::DETACHABLE, p.detachable);
    Value::Object(obj)
}

fn encode_cpu(cpu: &CpuDescriptor) -> Value {
    let mut o = Object::new();
    put(&mut o, f::BRAND, Some(cpu.brand.clone()));
    put(&mut o, f::PHYSICAL_CORES, Some(cpu.physical_cores));
    put(&mut o, f::LOGICAL_CORES, Some(cpu.logical_cores));
    put(&mut o, f::HYBRID, Some(cpu.hybrid));
    put(&mut o, f::FEATURES, Some(cpu.features.clone()));
    Value::Object(o)
}

fn encode_memory(mem: &MemoryInfo) -> Value {
    let mut o = Object::new();
    put(&mut o, f::INSTALLED, Some(mem.installed));
    put(&mut o, f::TOTAL, Some(mem.total));
    put(&mut o, f::AVAILABLE_AT_INIT, Some(mem.available_at_init));
    put(&mut o, f::PAGE_SIZE, Some(mem.page_size));
    Value::Object(o)
}

fn encode_system(sys: &SystemInfo) -> Value {
    let mut o = Object::new();
    put(&mut o, f::MANUFACTURER, sys.manufacturer.clone());
    put(&mut o, f::MODEL, sys.model.clone());
    put(&mut o, f::OS_NAME, sys.os_name.clone());
    put(&mut o, f::OS_VERSION, sys.os_version.clone());
    put(&mut o, f::BIOS_VENDOR, sys.bios_vendor.clone());
    put(&mut o, f::BIOS_VERSION, sys.bios_version.clone());
    put(&mut o, f::UPTIME_SECS, sys.uptime_secs);
    Value::Object(o)
}

/// Snapshot document for `reg`, stamped with `generated_at`.
pub fn encode_at(reg: &DeviceRegistry, generated_at: OffsetDateTime) -> Value {
    let mut doc = Object::new();
    put(&mut doc, f::VERSION, Some(f::SNAPSHOT_VERSION));
    put(&mut doc, f::GENERATED_AT, generated_at.format(&Rfc3339).ok());
    put(&mut doc, f::APIS_REQUESTED, Some(reg.apis_requested.bits()));
    put(&mut doc, f::APIS_USED, Some(reg.apis_used.bits()));
    doc.insert(
        f::DEVICES.to_string(),
        Value::Array(reg.devices().map(|d| encode_device(d)).collect()),
    );
    if let Some(cpu) = &reg.cpu {
        doc.insert(f::CPU.to_string(), encode_cpu(cpu));
    }
    if let Some(mem) = &reg.memory {
        doc.insert(f::MEMORY.to_string(), encode_memory(mem));
    }
    if let Some(sys) = &reg.system {
        doc.insert(f::SYSTEM.to_string(), encode_system(sys));
    }
    let mut runtimes = Object::new();
    for (name, v) in &reg.runtime_versions {
        let mut o = Object::new();
        put(&mut o, f::MAJOR, Some(v.major));
        put(&mut o, f::MINOR, Some(v.minor));
        put(&mut o, f::BUILD, Some(v.build));
        put(&mut o, f::PRODUCT_VERSION, v.product_version.clone());
        runtimes.insert(name.clone(), Value::Object(o));
    }
    put_obj(&mut doc, f::RUNTIMES, runtimes);
    Value::Object(doc)
}

pub fn encode(reg: &DeviceRegistry) -> Value {
    encode_at(reg, OffsetDateTime::now_utc())
}

pub fn to_string_pretty(reg: &DeviceRegistry) -> Result<String> {
    serde_json::to_string_pretty(&encode(reg))
        .map_err(|e| RegistryError::MalformedInput(format!("encoding snapshot: {e}")))
}
