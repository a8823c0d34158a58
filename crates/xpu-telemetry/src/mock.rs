use crate::{MetricSource, MetricSourceFactory, Result, Sample, TelemetryError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use xpu_registry::Device;

type Generator = Box<dyn FnMut(usize) -> Sample + Send>;

/// Source producing `generator(n)` on its n-th read.
pub struct MockSource {
    name: String,
    reads: Arc<AtomicUsize>,
    generator: Generator,
}

impl MockSource {
    pub fn new(name: &str, generator: impl FnMut(usize) -> Sample + Send + 'static) -> Self {
        Self {
            name: name.to_string(),
            reads: Arc::new(AtomicUsize::new(0)),
            generator: Box::new(generator),
        }
    }

    /// Device memory usage growing by `step` bytes per read, and a frequency.
    pub fn monotonic_memory(start: u64, step: u64) -> Self {
        Self::new("mock-memory", move |n| Sample {
            freq_mhz: Some(1000.0 + n as f64),
            device_memory_used: Some(start + step * n as u64),
            ..Sample::default()
        })
    }

    /// Shared read counter.
    pub fn reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }
}

impl MetricSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, _now: Duration) -> Result<Sample> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        Ok((self.generator)(n))
    }
}

type Maker = Box<dyn Fn() -> Option<MockSource> + Send + Sync>;

/// Factory handing out a fresh [`MockSource`] per acquire, or failing.
pub struct MockSourceFactory {
    name: String,
    make: Maker,
}

impl MockSourceFactory {
    pub fn new(name: &str, make: impl Fn() -> MockSource + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            make: Box::new(move || Some(make())),
        }
    }

    /// A backend missing on this host.
    pub fn unavailable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            make: Box::new(|| None),
        }
    }
}

impl MetricSourceFactory for MockSourceFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self, device: &Device) -> Result<Box<dyn MetricSource>> {
        match (self.make)() {
            Some(src) => Ok(Box::new(src)),
            None => Err(TelemetryError::SourceUnavailable(format!(
                "{} cannot open {}",
                self.name, device.identity
            ))),
        }
    }
}
