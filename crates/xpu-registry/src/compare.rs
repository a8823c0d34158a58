use crate::fields as f;
use crate::{Device, DeviceRegistry};
use std::fmt::Debug;
use thiserror::Error;
use xpu_probe::ApiSet;

/// First difference found between two registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{scope}: {field} differs (live: {live}, replay: {replay})")]
pub struct Mismatch {
    /// `registry` or `device <index>`.
    pub scope: String,
    /// Snapshot field name of the differing value.
    pub field: &'static str,
    pub live: String,
    pub replay: String,
}

fn check<T: PartialEq + Debug>(
    scope: &str,
    field: &'static str,
    live: &T,
    replay: &T,
) -> Result<(), Mismatch> {
    if live == replay {
        return Ok(());
    }
    Err(Mismatch {
        scope: scope.to_string(),
        field,
        live: format!("{live:?}"),
        replay: format!("{replay:?}"),
    })
}

fn compare_device(live: &Device, replay: &Device) -> Result<(), Mismatch> {
    let scope = format!("device {}", live.index);
    let s = scope.as_str();
    let (a, b) = (&live.properties, &replay.properties);

    check(s, f::TYPE, &live.kind, &replay.kind)?;
    check(s, f::VALID_APIS, &live.sources, &replay.sources)?;
    check(s, f::DRIVER_VERSION_RAW, &live.driver_version, &replay.driver_version)?;
    check(s, f::NAME, &a.name, &b.name)?;
    check(s, f::VENDOR_ID, &a.vendor_id, &b.vendor_id)?;
    check(s, f::DEVICE_ID, &a.device_id, &b.device_id)?;
    check(s, f::SUBSYS_ID, &a.subsys_id, &b.subsys_id)?;
    check(s, f::REVISION, &a.revision, &b.revision)?;
    check(s, f::DEDICATED_MEMORY, &a.dedicated_memory, &b.dedicated_memory)?;
    check(s, f::SHARED_MEMORY, &a.shared_memory, &b.shared_memory)?;
    check(s, f::MEMORY_BANDWIDTH_MAX, &a.memory_bandwidth_max, &b.memory_bandwidth_max)?;
    check(s, f::PCI_DEVICE_GEN, &a.pci_device_gen, &b.pci_device_gen)?;
    check(s, f::PCI_DEVICE_WIDTH, &a.pci_device_width, &b.pci_device_width)?;
    check(s, f::PCI_DEVICE_MAX_BANDWIDTH, &a.pci_device_max_bandwidth, &b.pci_device_max_bandwidth)?;
    check(s, f::PCI_CURRENT_GEN, &a.pci_current_gen, &b.pci_current_gen)?;
    check(s, f::PCI_CURRENT_WIDTH, &a.pci_current_width, &b.pci_current_width)?;
    check(s, f::PCI_CURRENT_MAX_BANDWIDTH, &a.pci_current_max_bandwidth, &b.pci_current_max_bandwidth)?;
    check(s, f::RESIZABLE_BAR, &a.resizable_bar, &b.resizable_bar)?;
    check(s, f::PCI_ADDRESS, &a.pci_address, &b.pci_address)?;
    check(s, f::UMA, &a.uma, &b.uma)?;
    check(s, f::FREQ_MAX, &a.freq_max_mhz, &b.freq_max_mhz)?;
    check(s, f::FREQ_MIN, &a.freq_min_mhz, &b.freq_min_mhz)?;
    check(s, f::MEDIA_FREQ_MAX, &a.media_freq_max_mhz, &b.media_freq_max_mhz)?;
    check(s, f::MEDIA_FREQ_MIN, &a.media_freq_min_mhz, &b.media_freq_min_mhz)?;
    check(s, f::MEMORY_FREQ_MAX, &a.memory_freq_max_mhz, &b.memory_freq_max_mhz)?;
    check(s, f::MEMORY_FREQ_MIN, &a.memory_freq_min_mhz, &b.memory_freq_min_mhz)?;
    check(s, f::GENERATION_ID, &a.generation, &b.generation)?;
    check(s, f::IP_VERSION, &a.ip_version, &b.ip_version)?;
    check(s, f::COMPUTE_UNITS, &a.compute_units, &b.compute_units)?;
    check(s, f::SIMD_WIDTH, &a.simd_width, &b.simd_width)?;
    check(s, f::PACKAGE_TDP, &a.package_tdp, &b.package_tdp)?;
    check(s, f::VENDOR_FLAGS, &a.features, &b.features)?;
    check(s, f::CUDA_CAPABILITY, &a.cuda_capability, &b.cuda_capability)?;
    check(s, f::HIGH_PERFORMANCE, &a.high_performance, &b.high_performance)?;
    check(s, f::MINIMUM_POWER, &a.minimum_power, &b.minimum_power)?;
    check(s, f::DETACHABLE, &a.detachable, &b.detachable)?;
    check(s, f::DRIVER_DESC, &a.driver_description, &b.driver_description)?;
    check(s, f::DRIVER_INF_SECTION, &a.driver_inf_section, &b.driver_inf_section)?;
    check(s, f::DEVICE_INSTANCE_ID, &a.device_instance_id, &b.device_instance_id)?;
    check(s, f::LOCATION_INFO, &a.location_info, &b.location_info)
}

/// Field-by-field equality of a live registry and its replay.
///
/// Covers the used API set, the device count and every device field. Devices
/// are paired by index. Identities and provenance are not compared, and the
/// replay marker is masked out of the API sets. The requested API mask and
/// the host blocks (CPU, memory, system, runtimes) describe the run rather
/// than the devices and are left out.
pub fn compare(live: &DeviceRegistry, replay: &DeviceRegistry) -> Result<(), Mismatch> {
    const REGISTRY: &str = "registry";
    let used = |r: &DeviceRegistry| r.apis_used - ApiSet::DESERIALIZED;

    check(REGISTRY, f::APIS_USED, &used(live), &used(replay))?;
    check(REGISTRY, f::DEVICES, &live.len(), &replay.len())?;
    for dev in live.devices() {
        let Some(other) = replay.by_index(dev.index) else {
            return Err(Mismatch {
                scope: format!("device {}", dev.index),
                field: f::INDEX,
                live: dev.index.to_string(),
                replay: "missing".to_string(),
            });
        };
        compare_device(dev, other)?;
    }
    Ok(())
}
