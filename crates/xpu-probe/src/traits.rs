use crate::{
    ApiSet, CpuDescriptor, MemoryInfo, ProbeError, ProbeReport, ProbeRequest, Result,
    RuntimeVersion, SystemInfo,
};

/// A source of partial device descriptions.
pub trait Probe: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// The API bit recorded in each device's sources when this probe contributes.
    fn api(&self) -> ApiSet;

    /// Describe every device this probe can see. Unset fields stay `None`.
    fn describe(&mut self, request: &ProbeRequest) -> Result<Vec<ProbeReport>>;
}

/// Host-level facts gathered on the caller's thread.
pub trait HostProbe: Send {
    fn cpu(&mut self) -> Result<CpuDescriptor>;

    fn memory(&mut self) -> Result<MemoryInfo> {
        Err(ProbeError::Unavailable("memory info".to_string()))
    }

    /// Named runtime/library versions.
    fn runtime_versions(&mut self) -> Result<Vec<(String, RuntimeVersion)>> {
        Ok(Vec::new())
    }
}

/// The slow system inventory. Runs on a worker thread during registry construction.
pub trait SystemInventory: Send {
    fn collect(&mut self) -> Result<SystemInfo>;
}
