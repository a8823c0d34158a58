//! Fixed-layout text report. Tools scrape this output, so labels and column
//! widths are part of the interface.

use crate::{Device, DeviceRegistry, GenerationTable, IpVersion};
use std::fmt::{self, Write};
use xpu_probe::{GenerationSpace, Uma, VENDOR_INTEL, VENDOR_NVIDIA};

const GIB: f64 = (1u64 << 30) as f64;
const MIB: u64 = 1 << 20;

const MEMORY_COLUMN: usize = 41;
const SYSTEM_COLUMN: usize = 36;
const RUNTIME_NAME_COLUMN: usize = 36;
const RUNTIME_VERSION_COLUMN: usize = 14;
const FOOTER_COLUMN: usize = 24;

/// Formats `value` with at most `digits` significant digits and no trailing
/// zeros, like a C++ stream in default float mode.
pub fn format_significant(value: f64, digits: u32) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits as i32 - 1 - magnitude).max(0) as usize;
    let s = format!("{value:.decimals$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

fn gib(bytes: u64, digits: u32) -> String {
    format_significant(bytes as f64 / GIB, digits)
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

/// `Display` adapter printing the full inventory report.
pub struct Report<'a>(pub &'a DeviceRegistry);

/// `Display` adapter printing one device block.
pub struct DeviceReport<'a>(pub &'a Device);

impl fmt::Display for DeviceReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dev = self.0;
        let p = &dev.properties;
        writeln!(f, "XPUInfo[Index={}, LUID={}]:", dev.index, dev.identity)?;
        writeln!(f, "\tName: {}", dev.name())?;
        if dev.driver_version.is_valid() {
            writeln!(f, "\tDriver Version: {}", dev.driver_version)?;
        }

        write!(f, "\tType: {}", dev.kind)?;
        match p.uma {
            Uma::Integrated => f.write_str(", Integrated")?,
            Uma::Discrete => f.write_str(", Discrete")?,
            Uma::Unknown => {}
        }
        if p.high_performance == Some(true) {
            f.write_str(", HighPerformance")?;
        }
        if p.minimum_power == Some(true) {
            f.write_str(", MinimumPower")?;
        }
        if p.detachable == Some(true) {
            f.write_str(", Detachable")?;
        }
        writeln!(f)?;

        if let Some(dedicated) = p.dedicated_memory {
            write!(f, "\tMemory (MB): Dedicated = {}", dedicated / MIB)?;
            if let Some(shared) = p.shared_memory {
                write!(f, ", Shared = {}", shared / MIB)?;
            }
            writeln!(f)?;
        }
        if let Some(bw) = p.memory_bandwidth_max {
            writeln!(f, "\tMax Memory Bandwidth (GB/s): {}", (bw as f64 / GIB) as i64)?;
        }
        writeln!(f, "\tAPIs: {}", dev.sources)?;
        if let Some(bar) = p.resizable_bar {
            writeln!(
                f,
                "\tResizable Bar: supported = {}, enabled = {}",
                flag(bar.supported),
                flag(bar.enabled)
            )?;
        }
        pci_line(f, "\tDEVICE:  PCI Gen ", p.pci_device_gen, p.pci_device_width, p.pci_device_max_bandwidth)?;
        pci_line(f, "\tCURRENT: PCI Gen ", p.pci_current_gen, p.pci_current_width, p.pci_current_max_bandwidth)?;
        if let Some(inf) = p.driver_inf_section.as_deref().filter(|s| !s.is_empty()) {
            writeln!(f, "\tDriver Inf Section: {inf}")?;
        }
        if let Some(id) = p.device_instance_id.as_deref().filter(|s| !s.is_empty()) {
            writeln!(f, "\tDevice Instance ID: {id}")?;
        }
        if let Some(addr) = p.pci_address {
            writeln!(f, "\tPCI Domain:Bus:Device:Function: {addr}")?;
        }
        freq_line(f, "\tFrequency(MHz) Max = ", p.freq_max_mhz, p.freq_min_mhz)?;
        freq_line(f, "\tMedia Frequency(MHz) Max = ", p.media_freq_max_mhz, p.media_freq_min_mhz)?;
        freq_line(f, "\tMemory Frequency(MHz) Max = ", p.memory_freq_max_mhz, p.memory_freq_min_mhz)?;

        if let Some(generation) = p.generation {
            let table = GenerationTable::builtin();
            let name = table.name(generation);
            writeln!(f, "\tGenerationAPI = {}", generation.space.as_str())?;
            f.write_str("\tGeneration = ")?;
            let id = if generation.id & 0x8000_0000 != 0 {
                table.ip_version_for(generation.id).map(|ipv| format!("0x{ipv:x}"))
            } else if generation.space == GenerationSpace::Legacy {
                Some(generation.id.to_string())
            } else {
                Some(format!("0x{:x}", generation.id))
            };
            match (id, name) {
                (Some(id), Some(name)) => write!(f, "{id}, {name}")?,
                (Some(id), None) => f.write_str(&id)?,
                (None, Some(name)) => f.write_str(name)?,
                (None, None) => {}
            }
            writeln!(f)?;
        }
        if let Some(ipv) = p.ip_version.filter(|v| *v != 0) {
            write!(f, "\tIP Version: 0x{ipv:08x}")?;
            let family = IpVersion::from_raw(ipv).intel_family();
            if let (true, Some(family)) = (p.is_vendor(VENDOR_INTEL), family) {
                write!(f, ", {family}")?;
            }
            writeln!(f)?;
        }
        if let Some(flags) = p.features.filter(|fl| p.is_vendor(VENDOR_INTEL) && (fl.dp4a || fl.dpas)) {
            f.write_str("\tFeature Flags: ")?;
            if flags.dp4a {
                f.write_str("DP4A ")?;
            }
            if flags.dpas {
                f.write_str("DPAS ")?;
            }
            writeln!(f)?;
        }
        if let Some(cc) = p.cuda_capability.filter(|_| p.is_vendor(VENDOR_NVIDIA)) {
            writeln!(f, "\tCUDA Compute Capability: {cc}")?;
        }
        if let Some(cu) = p.compute_units {
            write!(f, "\tCompute Units: {cu}")?;
            if let Some(simd) = p.simd_width {
                write!(f, ", SIMD Width: {simd}")?;
            }
            writeln!(f)?;
        }
        if let Some(tdp) = p.package_tdp {
            writeln!(f, "\tPackage TDP (W): {tdp}")?;
        }
        Ok(())
    }
}

fn pci_line(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    gen: Option<u32>,
    width: Option<u32>,
    bandwidth: Option<u64>,
) -> fmt::Result {
    let Some(gen) = gen else { return Ok(()) };
    write!(f, "{label}{gen}")?;
    if let Some(w) = width {
        write!(f, ", Width {w}")?;
    }
    if let Some(bw) = bandwidth {
        write!(f, ", Max Bandwidth = {} GB/s", gib(bw, 4))?;
    }
    writeln!(f)
}

fn freq_line(f: &mut fmt::Formatter<'_>, label: &str, max: Option<u32>, min: Option<u32>) -> fmt::Result {
    let Some(max) = max else { return Ok(()) };
    write!(f, "{label}{max}")?;
    if let Some(min) = min {
        write!(f, ", Min = {min}")?;
    }
    writeln!(f)
}

fn row(f: &mut fmt::Formatter<'_>, width: usize, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(f, "{label:<width$}{value}")
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reg = self.0;
        writeln!(f, "XPUInfo detected {} devices", reg.len())?;
        let mut first = true;
        for dev in reg.devices() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{}", DeviceReport(dev))?;
        }
        writeln!(f)?;

        if let Some(cpu) = &reg.cpu {
            writeln!(f, "CPU: {}", cpu.brand)?;
            write!(f, "\tCores: {}", cpu.physical_cores)?;
            if cpu.hybrid {
                f.write_str(" (Hybrid)")?;
            }
            writeln!(f)?;
            writeln!(f, "\tLogical: {}", cpu.logical_cores)?;
            if !cpu.features.is_empty() {
                f.write_str("\tFeatures: ")?;
                for feature in &cpu.features {
                    write!(f, "{feature} ")?;
                }
                writeln!(f)?;
            }
            writeln!(f)?;
        }

        if let Some(mem) = &reg.memory {
            writeln!(f, "System Memory:")?;
            row(f, MEMORY_COLUMN, "\tInstalled Physical Memory (GB): ", gib(mem.installed, 5))?;
            row(f, MEMORY_COLUMN, "\tTotal Physical Memory (GB): ", gib(mem.total, 5))?;
            row(f, MEMORY_COLUMN, "\tAvailable Physical Memory At Init (GB): ", gib(mem.available_at_init, 5))?;
            row(
                f,
                MEMORY_COLUMN,
                "\tPage Size (KB): ",
                format_significant(mem.page_size as f64 / 1024.0, 3),
            )?;
        }

        if let Some(sys) = &reg.system {
            writeln!(f, "System Information:")?;
            let rows = [
                ("\tManufacturer:", &sys.manufacturer),
                ("\tModel:", &sys.model),
                ("\tOS:", &sys.os_name),
                ("\tOS Version:", &sys.os_version),
                ("\tBIOS Manufacturer:", &sys.bios_vendor),
                ("\tBIOS Version:", &sys.bios_version),
            ];
            for (label, value) in rows {
                if let Some(v) = value {
                    row(f, SYSTEM_COLUMN, label, v)?;
                }
            }
            if let Some(secs) = sys.uptime_secs {
                row(f, SYSTEM_COLUMN, "\tUptime (Days):", format_significant(secs as f64 / 86_400.0, 6))?;
            }
            writeln!(f)?;
        }

        if !reg.runtime_versions.is_empty() {
            writeln!(f, "Runtime Version Info:")?;
            for (name, version) in &reg.runtime_versions {
                let label = format!("\t{name}:");
                write!(
                    f,
                    "{label:<RUNTIME_NAME_COLUMN$}{:<RUNTIME_VERSION_COLUMN$}",
                    version.to_string()
                )?;
                if let Some(product) = version.product_version.as_deref().filter(|s| !s.is_empty()) {
                    write!(f, " ({product})")?;
                }
                writeln!(f)?;
            }
        }

        writeln!(f)?;
        row(f, FOOTER_COLUMN, "APIs requested at init:", reg.apis_requested)?;
        row(f, FOOTER_COLUMN, "APIs initialized: ", reg.apis_used)?;
        row(f, FOOTER_COLUMN, "XPUInfo API Version: ", env!("CARGO_PKG_VERSION"))
    }
}

/// Renders the full report into a string.
pub fn render(reg: &DeviceRegistry) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write!(out, "{}", Report(reg));
    out
}
