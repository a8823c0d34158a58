use crate::{decode, to_string_pretty, DeviceRegistry};
use anyhow::Context;
use std::fs;
use std::path::Path;

pub fn save_snapshot(path: impl AsRef<Path>, reg: &DeviceRegistry) -> anyhow::Result<()> {
    let path = path.as_ref();
    let text = to_string_pretty(reg)?;
    fs::write(path, text).with_context(|| format!("writing snapshot: {}", path.display()))?;
    Ok(())
}

pub fn load_snapshot(path: impl AsRef<Path>) -> anyhow::Result<DeviceRegistry> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading snapshot: {}", path.display()))?;
    let reg = decode(&raw).with_context(|| format!("decoding snapshot: {}", path.display()))?;
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compare, Provenance};
    use xpu_probe::{ApiSet, DeviceKind, Identity, MockProbe, ProbeReport, Properties};

    #[test]
    fn test_save_then_load_from_file() {
        let report = ProbeReport::new(Identity(0x42), DeviceKind::Gpu, ApiSet::empty())
            .with_properties(Properties {
                name: Some("Radeon RX 7600".into()),
                vendor_id: Some(0x1002),
                dedicated_memory: Some(8 << 30),
                ..Properties::default()
            });
        let live = DeviceRegistry::builder()
            .probe(Box::new(MockProbe::new("sysfs", ApiSet::SYSFS, vec![report])))
            .build()
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        save_snapshot(&path, &live).unwrap();
        let replay = load_snapshot(&path).unwrap();
        assert_eq!(replay.provenance, Provenance::Replay);
        compare(&live, &replay).unwrap();
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_snapshot(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
        assert!(load_snapshot(dir.path().join("missing.json")).is_err());
    }
}
