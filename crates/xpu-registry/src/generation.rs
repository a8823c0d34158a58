use std::collections::HashMap;
use std::sync::OnceLock;
use xpu_probe::{Generation, GenerationSpace};

/// One row of the generation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRecord {
    pub id: u32,
    pub name: &'static str,
    /// Driver package name prefix (part before the first `_` or platform suffix).
    pub prefix: Option<&'static str>,
    pub ip_version: Option<u32>,
}

const fn row(
    id: u32,
    name: &'static str,
    prefix: Option<&'static str>,
    ip_version: Option<u32>,
) -> GenerationRecord {
    GenerationRecord {
        id,
        name,
        prefix,
        ip_version,
    }
}

/// Rows are ordered oldest first. Later rows with the same key shadow earlier ones.
pub const BUILTIN_GENERATIONS: &[GenerationRecord] = &[
    row(0x0e, "Haswell", None, None),
    row(0x10, "Broadwell", None, None),
    row(0x12, "Sky Lake", None, None),
    row(0x13, "Kaby Lake", None, None),
    row(0x14, "Coffee Lake", None, None),
    row(0x1d, "Ice Lake", None, None),
    row(0x21, "Tiger Lake", Some("iTGLD"), Some(0x0300_0000)),
    row(0x23, "Rocket Lake", Some("iRKLD"), Some(0x0300_4000)),
    row(0x24, "Raptor Lake S", Some("iRPLSD"), Some(0x0300_8000)),
    row(0x24, "Alder Lake S", Some("iADLSD"), Some(0x0300_8000)),
    row(0x25, "Raptor Lake P", Some("iRPLPD"), Some(0x0300_8000)),
    row(0x25, "Alder Lake P", Some("iADLPD"), Some(0x0300_8000)),
    row(1210, "DG1", None, None),
    row(1270, "DG2", Some("iDG2D"), Some(0x030d_c008)),
    row(1272, "Meteor Lake", Some("iMTL"), Some(0x0311_c004)),
    row(1272, "Meteor Lake", Some("MTL_IAG"), Some(0x0311_c004)),
    row(1273, "Arrow Lake", Some("iARL"), Some(0x0311_8004)),
    row(1274, "Battlemage", Some("BMG_"), Some(0x0500_4000)),
    row(1275, "Lunar Lake", Some("iLNL"), Some(0x0501_0001)),
    row(1275, "Lunar Lake", Some("LNL_"), Some(0x0501_0001)),
    row(1275, "Lunar Lake", Some("LNL_"), Some(0x0501_0004)),
    row(1300, "Panther Lake", Some("PTL_"), Some(0x0780_0004)),
    row(0x8000_0000, "NPU2.7", Some("mtl_w"), None),
    row(0x8000_0000, "NPU2.7", Some("NPU2_7"), None),
    row(0x8000_0002, "NPU4", Some("NPU4"), None),
    row(0x8000_0003, "NPU5", Some("NPU5"), None),
];

/// NVML architecture numbers.
const VENDOR_ARCHITECTURES: &[(u32, &str)] = &[
    (2, "Kepler"),
    (3, "Maxwell"),
    (4, "Pascal"),
    (5, "Volta"),
    (6, "Turing"),
    (7, "Ampere"),
    (8, "Ada"),
    (9, "Hopper"),
    (10, "Blackwell"),
    (11, "Orin"),
];

/// Per-space name lookup built from an ordered row list; last insert wins.
#[derive(Debug, Clone, Default)]
pub struct GenerationTable {
    by_id: HashMap<u32, &'static str>,
    by_ip_version: HashMap<u32, &'static str>,
    by_vendor_arch: HashMap<u32, &'static str>,
    ip_version_by_id: HashMap<u32, u32>,
    prefixes: Vec<(&'static str, u32)>,
}

impl GenerationTable {
    pub fn from_rows(rows: &[GenerationRecord]) -> Self {
        let mut table = GenerationTable::default();
        for r in rows {
            table.by_id.insert(r.id, r.name);
            if let Some(ipv) = r.ip_version {
                table.by_ip_version.insert(ipv, r.name);
                table.ip_version_by_id.insert(r.id, ipv);
            }
            if let Some(prefix) = r.prefix {
                table.prefixes.push((prefix, r.id));
            }
        }
        for (arch, name) in VENDOR_ARCHITECTURES {
            table.by_vendor_arch.insert(*arch, *name);
        }
        table
    }

    pub fn builtin() -> &'static GenerationTable {
        static TABLE: OnceLock<GenerationTable> = OnceLock::new();
        TABLE.get_or_init(|| GenerationTable::from_rows(BUILTIN_GENERATIONS))
    }

    pub fn name(&self, generation: Generation) -> Option<&'static str> {
        let map = match generation.space {
            GenerationSpace::Legacy | GenerationSpace::InfPrefix => &self.by_id,
            GenerationSpace::IpVersion => &self.by_ip_version,
            GenerationSpace::VendorArch => &self.by_vendor_arch,
        };
        map.get(&generation.id).copied()
    }

    /// Resolves a driver package name to a generation. The most recently added
    /// matching prefix wins.
    pub fn resolve_prefix(&self, package: &str) -> Option<Generation> {
        self.prefixes
            .iter()
            .rev()
            .find(|(prefix, _)| package.starts_with(prefix))
            .map(|(_, id)| Generation {
                id: *id,
                space: GenerationSpace::InfPrefix,
            })
    }

    /// The packed ip-version of the most recent row for `id` that has one.
    pub fn ip_version_for(&self, id: u32) -> Option<u32> {
        self.ip_version_by_id.get(&id).copied()
    }
}

/// Decoded ip-version fields. Layout (LSB first): revision:6, reserved:8, release:8, architecture:10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpVersion {
    pub architecture: u32,
    pub release: u32,
    pub revision: u32,
}

impl IpVersion {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            revision: raw & 0x3f,
            release: (raw >> 14) & 0xff,
            architecture: raw >> 22,
        }
    }

    /// Intel graphics family for this ip-version, if known.
    pub fn intel_family(&self) -> Option<&'static str> {
        match self.architecture {
            9 => Some("Gen9_Generic"),
            11 => Some("Gen11_Generic"),
            12 => Some(match self.release {
                51..=59 => "Gen12HP_DG2",
                70 => "Xe_S",
                71 => "Xe_L_MeteorLakeH",
                74 => "Xe_L_ArrowLakeH",
                _ => "Gen12LP_Generic",
            }),
            20 => Some("Xe2_Generic"),
            30 => Some("Xe3_Generic"),
            _ => None,
        }
    }
}
