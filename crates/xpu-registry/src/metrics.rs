use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct RegistryMetrics {
    pub devices_registered: IntGauge,
    pub probe_reports: IntCounter,
    pub probe_failures: IntCounter,
    pub telemetry_samples: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub xpu: RegistryMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let devices_registered =
            IntGauge::new("xpu_devices_registered", "Devices in the finalized registry")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let probe_reports = IntCounter::new("xpu_probe_reports", "Probe reports ingested")
            .map_err(|e| format!("metrics init error: {e}"))?;
        let probe_failures =
            IntCounter::new("xpu_probe_failures", "Probes that failed or were unavailable")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let telemetry_samples =
            IntCounter::new("xpu_telemetry_samples", "Telemetry records appended")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let xpu = RegistryMetrics {
            devices_registered,
            probe_reports,
            probe_failures,
            telemetry_samples,
        };
        let _ = registry.register(Box::new(xpu.devices_registered.clone()));
        let _ = registry.register(Box::new(xpu.probe_reports.clone()));
        let _ = registry.register(Box::new(xpu.probe_failures.clone()));
        let _ = registry.register(Box::new(xpu.telemetry_samples.clone()));
        Ok(Self { registry, xpu })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_text_lists_all_metrics() {
        let hub = MetricsHub::new().unwrap();
        hub.xpu.devices_registered.set(3);
        hub.xpu.probe_reports.inc_by(5);
        let text = hub.encode_text();
        assert!(text.contains("xpu_devices_registered 3"));
        assert!(text.contains("xpu_probe_reports 5"));
        assert!(text.contains("xpu_probe_failures 0"));
        assert!(text.contains("xpu_telemetry_samples 0"));
    }
}
