use crate::merge::{merge_kind, merge_properties};
use crate::{ErrorHandler, GenerationTable, RaiseError, RegistryError, RegistryMetrics, Result};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use xpu_probe::{
    ApiSet, CpuDescriptor, DeviceKind, DriverVersion, HostProbe, Identity, KnownDevice,
    MemoryInfo, Probe, ProbeError, ProbeReport, ProbeRequest, Properties, RuntimeVersion,
    SystemInfo, SystemInventory, Uma,
};

/// Where a device record came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Provenance {
    #[default]
    Live,
    Replay,
}

/// Canonical record for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub identity: Identity,
    pub kind: DeviceKind,
    pub index: u32,
    pub sources: ApiSet,
    pub driver_version: DriverVersion,
    pub properties: Properties,
    pub provenance: Provenance,
}

impl Device {
    pub fn new(identity: Identity, kind: DeviceKind, index: u32) -> Self {
        Self {
            identity,
            kind,
            index,
            sources: ApiSet::empty(),
            driver_version: DriverVersion::invalid(),
            properties: Properties::default(),
            provenance: Provenance::Live,
        }
    }

    /// Size a caller passes to [`RegistryBuilder::expect_layout`].
    pub const fn layout_size() -> usize {
        std::mem::size_of::<Device>()
    }

    pub fn name(&self) -> &str {
        self.properties.name.as_deref().unwrap_or("")
    }

    pub fn generation_name(&self) -> Option<&'static str> {
        self.properties
            .generation
            .and_then(|g| GenerationTable::builtin().name(g))
    }
}

/// UMA inference thresholds. The defaults are heuristics, not derived limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UmaPolicy {
    pub integrated_max_dedicated: u64,
    pub integrated_min_shared: u64,
    pub discrete_min_dedicated: u64,
}

impl Default for UmaPolicy {
    fn default() -> Self {
        Self {
            integrated_max_dedicated: 256 << 20,
            integrated_min_shared: 2 << 30,
            discrete_min_dedicated: 2 << 30,
        }
    }
}

impl UmaPolicy {
    pub fn classify(&self, dedicated: Option<u64>, shared: Option<u64>) -> Uma {
        match (dedicated, shared) {
            (Some(d), Some(s))
                if d <= self.integrated_max_dedicated && s >= self.integrated_min_shared =>
            {
                Uma::Integrated
            }
            (Some(d), _) if d >= self.discrete_min_dedicated => Uma::Discrete,
            _ => Uma::Unknown,
        }
    }
}

/// Mutable registry under construction. Single-threaded by construction.
pub struct RegistryAssembly {
    devices: BTreeMap<Identity, Device>,
    handler: Arc<dyn ErrorHandler>,
}

impl RegistryAssembly {
    pub fn new(handler: Arc<dyn ErrorHandler>) -> Self {
        Self {
            devices: BTreeMap::new(),
            handler,
        }
    }

    pub fn get(&self, identity: Identity) -> Option<&Device> {
        self.devices.get(&identity)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Snapshot of known devices handed to the next probe.
    pub fn request(&self) -> ProbeRequest {
        ProbeRequest {
            known: self
                .devices
                .values()
                .map(|d| KnownDevice {
                    identity: d.identity,
                    kind: d.kind,
                    name: d.properties.name.clone(),
                    pci_address: d.properties.pci_address,
                })
                .collect(),
        }
    }

    /// Lowest ordinal not yet held by any device.
    fn free_index(&self) -> u32 {
        let taken: BTreeSet<u32> = self.devices.values().map(|d| d.index).collect();
        let mut index = 0;
        while taken.contains(&index) {
            index += 1;
        }
        index
    }

    /// Creates or refines the device for `report.identity`.
    ///
    /// A new device keeps the ordinal its probe reported unless another device
    /// already holds it; it then gets the lowest free ordinal instead.
    pub fn ingest(&mut self, report: ProbeReport) -> Result<()> {
        let index = match report.index {
            Some(i) if !self.devices.values().any(|d| d.index == i) => i,
            Some(i) => {
                let free = self.free_index();
                if !self.devices.contains_key(&report.identity) {
                    warn!(identity = %report.identity, requested = i, assigned = free, "registry: duplicate adapter index");
                }
                free
            }
            None => self.free_index(),
        };
        let device = match self.devices.entry(report.identity) {
            Entry::Vacant(slot) => {
                debug!(identity = %report.identity, kind = %report.kind, index, "registry: new device");
                slot.insert(Device::new(report.identity, report.kind, index))
            }
            Entry::Occupied(slot) => {
                let existing = slot.get().kind;
                if existing.conflicts_with(report.kind) {
                    return self.handler.handle(RegistryError::KindConflict {
                        identity: report.identity,
                        existing,
                        incoming: report.kind,
                    });
                }
                slot.into_mut()
            }
        };
        merge_kind(&mut device.kind, report.kind);
        merge_properties(&mut device.properties, &report.properties);
        device.sources |= report.api;
        if !device.driver_version.is_valid() && report.driver_version.is_valid() {
            device.driver_version = report.driver_version;
        }
        Ok(())
    }

    /// Infers UMA where still unknown and freezes the devices.
    pub fn finalize(self, policy: &UmaPolicy) -> DeviceRegistry {
        let devices = self
            .devices
            .into_iter()
            .map(|(id, mut dev)| {
                if dev.properties.uma == Uma::Unknown {
                    dev.properties.uma =
                        policy.classify(dev.properties.dedicated_memory, dev.properties.shared_memory);
                }
                (id, Arc::new(dev))
            })
            .collect();
        DeviceRegistry {
            devices,
            ..DeviceRegistry::default()
        }
    }
}

/// Finalized, read-only device inventory.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<Identity, Arc<Device>>,
    pub cpu: Option<CpuDescriptor>,
    pub memory: Option<MemoryInfo>,
    pub system: Option<SystemInfo>,
    pub runtime_versions: BTreeMap<String, RuntimeVersion>,
    pub apis_requested: ApiSet,
    pub apis_used: ApiSet,
    pub provenance: Provenance,
}

impl DeviceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Assembles a registry from already-merged devices (used by snapshot replay).
    pub fn from_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|d| (d.identity, Arc::new(d)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices in ascending identity order.
    pub fn devices(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.devices.values()
    }

    pub fn get(&self, identity: Identity) -> Option<&Arc<Device>> {
        self.devices.get(&identity)
    }

    pub fn by_index(&self, index: u32) -> Option<&Arc<Device>> {
        self.devices.values().find(|d| d.index == index)
    }

    /// Case-insensitive substring match; the lowest identity wins ties.
    pub fn by_name(&self, needle: &str) -> Option<&Arc<Device>> {
        let needle = needle.to_lowercase();
        self.devices
            .values()
            .find(|d| d.name().to_lowercase().contains(&needle))
    }
}

/// Drives probes into a [`RegistryAssembly`] and finalizes it.
pub struct RegistryBuilder {
    apis: ApiSet,
    expected_layout: Option<usize>,
    uma_policy: UmaPolicy,
    handler: Arc<dyn ErrorHandler>,
    probes: Vec<Box<dyn Probe>>,
    host: Option<Box<dyn HostProbe>>,
    inventory: Option<Box<dyn SystemInventory>>,
    metrics: Option<RegistryMetrics>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            apis: ApiSet::all(),
            expected_layout: None,
            uma_policy: UmaPolicy::default(),
            handler: Arc::new(RaiseError),
            probes: Vec::new(),
            host: None,
            inventory: None,
            metrics: None,
        }
    }

    /// Only probes whose API is in `apis` run.
    pub fn apis(mut self, apis: ApiSet) -> Self {
        self.apis = apis;
        self
    }

    /// Guards against a caller built against a different `Device` layout.
    pub fn expect_layout(mut self, device_size: usize) -> Self {
        self.expected_layout = Some(device_size);
        self
    }

    pub fn uma_policy(mut self, policy: UmaPolicy) -> Self {
        self.uma_policy = policy;
        self
    }

    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn probe(mut self, probe: Box<dyn Probe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn host(mut self, host: Box<dyn HostProbe>) -> Self {
        self.host = Some(host);
        self
    }

    /// The slow system inventory; it runs on a worker thread during `build`.
    pub fn inventory(mut self, inventory: Box<dyn SystemInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn metrics(mut self, metrics: RegistryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<DeviceRegistry> {
        if let Some(size) = self.expected_layout {
            if size != Device::layout_size() {
                return Err(RegistryError::ConfigurationMismatch(format!(
                    "device layout is {} bytes, caller expects {size}",
                    Device::layout_size()
                )));
            }
        }

        let RegistryBuilder {
            apis,
            uma_policy,
            handler,
            probes,
            host,
            inventory,
            metrics,
            ..
        } = self;

        std::thread::scope(|s| {
            let worker = inventory.map(|mut inv| {
                std::thread::Builder::new()
                    .name("xpu-inventory".to_string())
                    .spawn_scoped(s, move || inv.collect())
            });
            let worker = match worker.transpose() {
                Ok(w) => w,
                Err(e) => {
                    warn!(error = %e, "registry: inventory worker not started");
                    None
                }
            };

            let probed = run_probes(probes, apis, &handler, metrics.as_ref());
            let host_facts = host.map(collect_host);
            // joined before any early return
            let system = worker.map(|w| w.join());
            let (assembly, apis_used) = probed?;

            let mut registry = assembly.finalize(&uma_policy);
            registry.apis_requested = apis;
            registry.apis_used = apis_used;
            if let Some((cpu, memory, runtimes)) = host_facts {
                registry.cpu = cpu;
                registry.memory = memory;
                registry.runtime_versions.extend(runtimes);
            }

            if let Some(joined) = system {
                registry.system = match joined {
                    Ok(Ok(info)) => Some(info),
                    Ok(Err(e)) => {
                        warn!(error = %e, "registry: system inventory failed");
                        None
                    }
                    Err(_) => {
                        handler.handle(RegistryError::invariant("system inventory worker panicked"))?;
                        None
                    }
                };
            }

            if let Some(m) = &metrics {
                m.devices_registered.set(registry.len() as i64);
            }
            info!(devices = registry.len(), apis = %registry.apis_used, "registry: built");
            Ok(registry)
        })
    }
}

type HostFacts = (
    Option<CpuDescriptor>,
    Option<MemoryInfo>,
    Vec<(String, RuntimeVersion)>,
);

fn collect_host(mut host: Box<dyn HostProbe>) -> HostFacts {
    let cpu = host
        .cpu()
        .map_err(|e| warn!(error = %e, "registry: cpu descriptor unavailable"))
        .ok();
    let memory = host
        .memory()
        .map_err(|e| debug!(error = %e, "registry: memory info unavailable"))
        .ok();
    let runtimes = host.runtime_versions().unwrap_or_else(|e| {
        debug!(error = %e, "registry: runtime versions unavailable");
        Vec::new()
    });
    (cpu, memory, runtimes)
}

/// Runs each requested probe in order and ingests its reports.
fn run_probes(
    probes: Vec<Box<dyn Probe>>,
    apis: ApiSet,
    handler: &Arc<dyn ErrorHandler>,
    metrics: Option<&RegistryMetrics>,
) -> Result<(RegistryAssembly, ApiSet)> {
    let mut assembly = RegistryAssembly::new(handler.clone());
    let mut apis_used = ApiSet::empty();
    for mut probe in probes {
        if !apis.intersects(probe.api()) {
            debug!(probe = probe.name(), "registry: api not requested, skipping");
            continue;
        }
        match probe.describe(&assembly.request()) {
            Ok(reports) => {
                apis_used |= probe.api();
                info!(probe = probe.name(), n = reports.len(), "registry: probe reported");
                if let Some(m) = metrics {
                    m.probe_reports.inc_by(reports.len() as u64);
                }
                for report in reports {
                    assembly.ingest(report)?;
                }
            }
            Err(e @ ProbeError::InvariantViolation { .. }) => {
                handler.handle(e.into())?;
            }
            Err(e) => {
                if let Some(m) = metrics {
                    m.probe_failures.inc();
                }
                if e.is_unavailable() {
                    info!(probe = probe.name(), reason = %e, "registry: probe unavailable");
                } else {
                    warn!(probe = probe.name(), error = %e, "registry: probe failed");
                }
            }
        }
    }
    Ok((assembly, apis_used))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogAndContinue;
    use std::time::Duration;
    use xpu_probe::{MockHost, MockInventory, MockProbe};

    fn gpu(identity: u64, props: Properties) -> ProbeReport {
        ProbeReport::new(Identity(identity), DeviceKind::Gpu, ApiSet::empty()).with_properties(props)
    }

    #[test]
    fn test_uma_override_scenario() {
        let mut asm = RegistryAssembly::new(Arc::new(RaiseError));
        asm.ingest(gpu(0x100, Properties::default())).unwrap();
        let b = ProbeReport::new(Identity(0x100), DeviceKind::Unknown, ApiSet::OPENCL)
            .with_properties(Properties {
                uma: Uma::Integrated,
                ..Properties::default()
            });
        asm.ingest(b).unwrap();
        let reg = asm.finalize(&UmaPolicy::default());
        let dev = reg.get(Identity(0x100)).unwrap();
        assert_eq!(dev.kind, DeviceKind::Gpu);
        assert_eq!(dev.properties.uma, Uma::Integrated);
        assert_eq!(dev.sources, ApiSet::OPENCL);
    }

    #[test]
    fn test_kind_conflict_raises_by_default() {
        let mut asm = RegistryAssembly::new(Arc::new(RaiseError));
        asm.ingest(gpu(1, Properties::default())).unwrap();
        let npu = ProbeReport::new(Identity(1), DeviceKind::Npu, ApiSet::LEVEL_ZERO);
        let err = asm.ingest(npu).unwrap_err();
        assert!(matches!(err, RegistryError::KindConflict { .. }));
    }

    #[test]
    fn test_kind_conflict_can_be_ignored() {
        let mut asm = RegistryAssembly::new(Arc::new(LogAndContinue));
        asm.ingest(gpu(1, Properties::default())).unwrap();
        let mut npu = ProbeReport::new(Identity(1), DeviceKind::Npu, ApiSet::LEVEL_ZERO);
        npu.properties.freq_max_mhz = Some(1);
        asm.ingest(npu).unwrap();
        let dev = asm.get(Identity(1)).unwrap();
        assert_eq!(dev.kind, DeviceKind::Gpu);
        assert_eq!(dev.properties.freq_max_mhz, None);
    }

    #[test]
    fn test_uma_policy_thresholds() {
        let p = UmaPolicy::default();
        assert_eq!(p.classify(Some(128 << 20), Some(16 << 30)), Uma::Integrated);
        assert_eq!(p.classify(Some(256 << 20), Some(2 << 30)), Uma::Integrated);
        assert_eq!(p.classify(Some(8 << 30), Some(16 << 30)), Uma::Discrete);
        assert_eq!(p.classify(Some(1 << 30), Some(16 << 30)), Uma::Unknown);
        assert_eq!(p.classify(Some(128 << 20), None), Uma::Unknown);
        assert_eq!(p.classify(None, Some(16 << 30)), Uma::Unknown);
    }

    #[test]
    fn test_finalize_keeps_reported_uma() {
        let mut asm = RegistryAssembly::new(Arc::new(RaiseError));
        asm.ingest(gpu(
            2,
            Properties {
                uma: Uma::Integrated,
                dedicated_memory: Some(8 << 30),
                ..Properties::default()
            },
        ))
        .unwrap();
        let reg = asm.finalize(&UmaPolicy::default());
        assert_eq!(reg.get(Identity(2)).unwrap().properties.uma, Uma::Integrated);
    }

    fn sample_registry() -> DeviceRegistry {
        let igpu = gpu(
            0x200,
            Properties {
                name: Some("Intel(R) Arc(TM) Graphics".into()),
                dedicated_memory: Some(128 << 20),
                shared_memory: Some(16 << 30),
                ..Properties::default()
            },
        );
        let dgpu = gpu(
            0x30000,
            Properties {
                name: Some("NVIDIA GeForce RTX 4070".into()),
                dedicated_memory: Some(12 << 30),
                ..Properties::default()
            },
        );
        let npu = ProbeReport::new(Identity(0x100), DeviceKind::Npu, ApiSet::empty())
            .with_properties(Properties {
                name: Some("Intel(R) AI Boost".into()),
                ..Properties::default()
            });
        DeviceRegistry::builder()
            .probe(Box::new(MockProbe::new("dxgi", ApiSet::DXGI, vec![igpu, dgpu])))
            .probe(Box::new(MockProbe::new("level-zero", ApiSet::LEVEL_ZERO, vec![npu])))
            .probe(Box::new(MockProbe::unavailable("nvml", ApiSet::NVML)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_and_lookups() {
        let reg = sample_registry();
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.apis_used, ApiSet::DXGI | ApiSet::LEVEL_ZERO);
        assert_eq!(reg.apis_requested, ApiSet::all());

        let igpu = reg.by_name("arc").unwrap();
        assert_eq!(igpu.identity, Identity(0x200));
        assert_eq!(igpu.properties.uma, Uma::Integrated);
        assert_eq!(igpu.index, 0);

        let dgpu = reg.by_index(1).unwrap();
        assert_eq!(dgpu.properties.uma, Uma::Discrete);
        assert_eq!(reg.by_index(2).unwrap().kind, DeviceKind::Npu);
        assert!(reg.by_index(9).is_none());
        assert!(reg.by_name("radeon").is_none());

        // "intel" matches the NPU and the iGPU; lowest identity wins
        assert_eq!(reg.by_name("INTEL").unwrap().identity, Identity(0x100));

        let order: Vec<u64> = reg.devices().map(|d| d.identity.0).collect();
        assert_eq!(order, vec![0x100, 0x200, 0x30000]);
    }

    #[test]
    fn test_api_mask_skips_probes() {
        let reg = DeviceRegistry::builder()
            .apis(ApiSet::LEVEL_ZERO)
            .probe(Box::new(MockProbe::new("dxgi", ApiSet::DXGI, vec![gpu(1, Properties::default())])))
            .probe(Box::new(MockProbe::new("l0", ApiSet::LEVEL_ZERO, Vec::new())))
            .build()
            .unwrap();
        assert!(reg.is_empty());
        assert_eq!(reg.apis_requested, ApiSet::LEVEL_ZERO);
        assert_eq!(reg.apis_used, ApiSet::LEVEL_ZERO);
    }

    #[test]
    fn test_layout_mismatch_aborts() {
        let err = DeviceRegistry::builder()
            .expect_layout(Device::layout_size() + 8)
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::ConfigurationMismatch(_)));
        assert!(DeviceRegistry::builder()
            .expect_layout(Device::layout_size())
            .build()
            .is_ok());
    }

    #[test]
    fn test_inventory_joined_and_host_collected() {
        let host = MockHost {
            cpu: CpuDescriptor {
                brand: "Test CPU".into(),
                physical_cores: 4,
                logical_cores: 8,
                ..CpuDescriptor::default()
            },
            memory: None,
            runtimes: vec![(
                "OpenCL".into(),
                RuntimeVersion {
                    major: 3,
                    minor: 0,
                    build: 0,
                    product_version: None,
                },
            )],
        };
        let inventory = MockInventory {
            info: SystemInfo {
                manufacturer: Some("ACME".into()),
                ..SystemInfo::default()
            },
            delay: Duration::from_millis(20),
        };
        let reg = DeviceRegistry::builder()
            .host(Box::new(host))
            .inventory(Box::new(inventory))
            .build()
            .unwrap();
        assert_eq!(reg.cpu.as_ref().map(|c| c.logical_cores), Some(8));
        assert!(reg.memory.is_none());
        assert_eq!(reg.system.and_then(|s| s.manufacturer).as_deref(), Some("ACME"));
        assert!(reg.runtime_versions.contains_key("OpenCL"));
    }

    #[test]
    fn test_driver_version_first_valid_wins() {
        let mut asm = RegistryAssembly::new(Arc::new(RaiseError));
        asm.ingest(gpu(1, Properties::default())).unwrap();
        let mut r = gpu(1, Properties::default());
        r.driver_version = DriverVersion::parse("31.0.101.5186");
        asm.ingest(r).unwrap();
        let mut r = gpu(1, Properties::default());
        r.driver_version = DriverVersion::parse("31.0.101.9999");
        asm.ingest(r).unwrap();
        assert_eq!(
            asm.get(Identity(1)).unwrap().driver_version.to_string(),
            "31.0.101.5186"
        );
    }

    fn indexed(identity: u64, index: Option<u32>) -> ProbeReport {
        let mut r = gpu(identity, Properties::default());
        r.index = index;
        r
    }

    #[test]
    fn test_adapter_indices_stay_unique() {
        let mut asm = RegistryAssembly::new(Arc::new(RaiseError));
        asm.ingest(indexed(5, Some(1))).unwrap();
        asm.ingest(indexed(6, None)).unwrap();
        asm.ingest(indexed(7, Some(1))).unwrap();
        // a later report for a known device does not move it
        asm.ingest(indexed(5, Some(4))).unwrap();
        assert_eq!(asm.get(Identity(5)).unwrap().index, 1);
        assert_eq!(asm.get(Identity(6)).unwrap().index, 0);
        assert_eq!(asm.get(Identity(7)).unwrap().index, 2);
    }

    #[test]
    fn test_duplicate_index_survives_snapshot_round_trip() {
        let a = MockProbe::new("fixture-a", ApiSet::FIXTURE, vec![indexed(5, Some(1))]);
        let b = MockProbe::new("fixture-b", ApiSet::FIXTURE, vec![indexed(6, None), indexed(7, Some(1))]);
        let reg = DeviceRegistry::builder()
            .probe(Box::new(a))
            .probe(Box::new(b))
            .build()
            .unwrap();
        let mut indices: Vec<u32> = reg.devices().map(|d| d.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2]);

        let replay = crate::decode(&crate::to_string_pretty(&reg).unwrap()).unwrap();
        crate::compare(&reg, &replay).unwrap();
    }

    struct PanickingInventory;

    impl SystemInventory for PanickingInventory {
        fn collect(&mut self) -> xpu_probe::Result<SystemInfo> {
            std::thread::sleep(Duration::from_millis(20));
            panic!("inventory backend crashed");
        }
    }

    #[test]
    fn test_ingest_error_returned_while_inventory_panics() {
        let conflicting = vec![
            gpu(1, Properties::default()),
            ProbeReport::new(Identity(1), DeviceKind::Npu, ApiSet::empty()),
        ];
        let err = DeviceRegistry::builder()
            .probe(Box::new(MockProbe::new("dxgi", ApiSet::DXGI, conflicting)))
            .inventory(Box::new(PanickingInventory))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::KindConflict { .. }));
    }

    #[test]
    fn test_inventory_panic_is_handled() {
        let err = DeviceRegistry::builder()
            .inventory(Box::new(PanickingInventory))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvariantViolation { .. }));

        let reg = DeviceRegistry::builder()
            .inventory(Box::new(PanickingInventory))
            .error_handler(Arc::new(LogAndContinue))
            .build()
            .unwrap();
        assert!(reg.system.is_none());
    }
}
