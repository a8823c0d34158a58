use crate::{
    ApiSet, CpuDescriptor, HostProbe, MemoryInfo, Probe, ProbeError, ProbeReport, ProbeRequest,
    Result, RuntimeVersion, SystemInfo, SystemInventory,
};
use std::time::Duration;

/// Scripted probe. Returns the same reports on every call.
pub struct MockProbe {
    name: String,
    api: ApiSet,
    reports: Vec<ProbeReport>,
    available: bool,
    calls: usize,
}

impl MockProbe {
    pub fn new(name: &str, api: ApiSet, reports: Vec<ProbeReport>) -> Self {
        Self {
            name: name.to_string(),
            api,
            reports,
            available: true,
            calls: 0,
        }
    }

    /// A probe whose backend is missing on this host.
    pub fn unavailable(name: &str, api: ApiSet) -> Self {
        Self {
            available: false,
            ..Self::new(name, api, Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Probe for MockProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn api(&self) -> ApiSet {
        self.api
    }

    fn describe(&mut self, _request: &ProbeRequest) -> Result<Vec<ProbeReport>> {
        self.calls += 1;
        if !self.available {
            return Err(ProbeError::Unavailable(format!("{} backend not present", self.name)));
        }
        // Stamp our own API bit so scripts can leave it empty
        Ok(self
            .reports
            .iter()
            .cloned()
            .map(|mut r| {
                r.api = self.api;
                r
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MockHost {
    pub cpu: CpuDescriptor,
    pub memory: Option<MemoryInfo>,
    pub runtimes: Vec<(String, RuntimeVersion)>,
}

impl HostProbe for MockHost {
    fn cpu(&mut self) -> Result<CpuDescriptor> {
        Ok(self.cpu.clone())
    }

    fn memory(&mut self) -> Result<MemoryInfo> {
        self.memory
            .ok_or_else(|| ProbeError::Unavailable("mock memory".to_string()))
    }

    fn runtime_versions(&mut self) -> Result<Vec<(String, RuntimeVersion)>> {
        Ok(self.runtimes.clone())
    }
}

/// System inventory that sleeps before answering, to exercise the worker join.
#[derive(Default)]
pub struct MockInventory {
    pub info: SystemInfo,
    pub delay: Duration,
}

impl SystemInventory for MockInventory {
    fn collect(&mut self) -> Result<SystemInfo> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(self.info.clone())
    }
}
