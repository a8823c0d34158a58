use crate::{
    ApiSet, DeviceKind, DriverVersion, Identity, Probe, ProbeReport, ProbeRequest, Properties,
    Result,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// One device described in a YAML fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFixture {
    pub identity: Identity,
    #[serde(default)]
    pub kind: DeviceKind,
    pub index: Option<u32>,
    pub driver_version: Option<String>,
    #[serde(flatten)]
    pub properties: Properties,
}

impl DeviceFixture {
    pub fn to_report(&self) -> ProbeReport {
        let mut report = ProbeReport::new(self.identity, self.kind, ApiSet::FIXTURE)
            .with_properties(self.properties.clone());
        report.index = self.index;
        if let Some(v) = &self.driver_version {
            report.driver_version = DriverVersion::parse(v);
        }
        report
    }
}

pub fn load_fixture_file(path: impl AsRef<Path>) -> anyhow::Result<DeviceFixture> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading fixture: {}", path.display()))?;
    let val: Value =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    let fixture: DeviceFixture = serde_yaml::from_value(val)
        .with_context(|| format!("decoding fixture: {}", path.display()))?;
    Ok(fixture)
}

/// Loads every `.yml`/`.yaml` file in `dir`, in file name order.
pub fn load_fixture_dir(dir: impl AsRef<Path>) -> anyhow::Result<FixtureProbe> {
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir.as_ref())
        .with_context(|| format!("listing fixtures: {}", dir.as_ref().display()))?
    {
        let path = entry?.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    let mut fixtures = Vec::with_capacity(entries.len());
    for p in entries {
        fixtures.push(load_fixture_file(&p)?);
    }
    Ok(FixtureProbe { fixtures })
}

/// Probe that replays hand-written device descriptions.
#[derive(Debug, Default, Clone)]
pub struct FixtureProbe {
    pub fixtures: Vec<DeviceFixture>,
}

impl Probe for FixtureProbe {
    fn name(&self) -> &str {
        "fixture"
    }

    fn api(&self) -> ApiSet {
        ApiSet::FIXTURE
    }

    fn describe(&mut self, _request: &ProbeRequest) -> Result<Vec<ProbeReport>> {
        Ok(self.fixtures.iter().map(DeviceFixture::to_report).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Uma;

    const ARC: &str = r#"
identity: 4096
kind: gpu
index: 1
driver_version: "32.0.101.6078"
name: "Intel(R) Arc(TM) A770 Graphics"
vendor_id: 32902
dedicated_memory: 17179869184
uma: discrete
pci_address: { domain: 0, bus: 3, device: 0, function: 0 }
"#;

    #[test]
    fn test_load_fixture_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.yaml"), ARC).unwrap();
        fs::write(
            dir.path().join("a.yml"),
            "identity: 1\nkind: npu\nname: \"Intel(R) AI Boost\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut probe = load_fixture_dir(dir.path()).unwrap();
        assert_eq!(probe.fixtures.len(), 2);
        assert_eq!(probe.fixtures[0].identity, Identity(1));

        let reports = probe.describe(&ProbeRequest::default()).unwrap();
        let arc = &reports[1];
        assert_eq!(arc.kind, DeviceKind::Gpu);
        assert_eq!(arc.api, ApiSet::FIXTURE);
        assert_eq!(arc.index, Some(1));
        assert_eq!(arc.driver_version.to_string(), "32.0.101.6078");
        assert_eq!(arc.properties.uma, Uma::Discrete);
        assert_eq!(arc.properties.dedicated_memory, Some(16 << 30));
        assert_eq!(arc.properties.pci_address.map(|a| a.bus), Some(3));
        assert_eq!(arc.properties.shared_memory, None);
    }

    #[test]
    fn test_bad_fixture_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "kind: gpu\n").unwrap();
        let err = load_fixture_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.yaml"));
    }
}
