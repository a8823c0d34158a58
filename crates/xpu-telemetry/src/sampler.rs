use crate::record::{csv_header, csv_row};
use crate::{
    default_factories, Clock, MetricSource, MetricSourceFactory, PeakUsage, Rates, Result,
    Sample, Scheduler, SystemClock, TaskHandle, TelemetryError, TelemetryItem, ThreadScheduler,
    TimedRecord,
};
use parking_lot::Mutex;
use prometheus::IntCounter;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use xpu_registry::Device;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub period: Duration,
    /// Control flags; only [`TelemetryItem::PEAK_USAGE_ONLY`] is honored.
    pub control: TelemetryItem,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            control: TelemetryItem::empty(),
        }
    }
}

enum State {
    Idle,
    Running(Box<dyn TaskHandle>),
    Stopped,
}

impl State {
    fn label(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Running(_) => "running",
            State::Stopped => "stopped",
        }
    }
}

/// Everything the tick touches, behind the sampler's one mutex.
struct Buffer {
    sources: Vec<Box<dyn MetricSource>>,
    records: Vec<TimedRecord>,
    appended: u64,
    origin: Option<Duration>,
    result_mask: Option<TelemetryItem>,
    peak: PeakUsage,
    initial: Option<PeakUsage>,
    keep_last_only: bool,
    realtime: Option<Box<dyn Write + Send>>,
    samples_counter: Option<IntCounter>,
}

impl Buffer {
    fn poll(&mut self, now: Duration) -> Option<Sample> {
        let mut merged = Sample::default();
        let mut any = false;
        for source in &mut self.sources {
            match source.read(now) {
                Ok(sample) if !sample.is_empty() => {
                    merged.merge(sample);
                    any = true;
                }
                Ok(_) => {}
                Err(e) => debug!(source = source.name(), error = %e, "telemetry: read failed"),
            }
        }
        any.then_some(merged)
    }

    fn append(&mut self, now: Duration, sample: Sample) {
        let origin = *self.origin.get_or_insert(now);
        let elapsed_secs = now.saturating_sub(origin).as_secs_f64();
        let rates = self
            .records
            .last()
            .and_then(|prev| Rates::between(&prev.sample, &sample, elapsed_secs - prev.elapsed_secs));
        let record = TimedRecord {
            elapsed_secs,
            sample,
            rates,
        };

        let mask = *self
            .result_mask
            .get_or_insert(record.sample.items() | TelemetryItem::TIMESTAMP_DOUBLE);
        self.peak.update_peak(&record.sample);
        self.initial
            .get_or_insert_with(|| PeakUsage::from_sample(&record.sample));

        if let Some(sink) = self.realtime.as_mut() {
            let mut text = String::new();
            if self.appended == 0 {
                text.push_str(&csv_header(mask));
            }
            text.push_str(&csv_row(mask, &record));
            if let Err(e) = sink.write_all(text.as_bytes()) {
                warn!(error = %e, "telemetry: realtime sink failed, detaching");
                self.realtime = None;
            }
        }

        if self.keep_last_only {
            self.records.clear();
        }
        self.records.push(record);
        self.appended += 1;
        if let Some(c) = &self.samples_counter {
            c.inc();
        }
    }
}

fn tick(buffer: &Mutex<Buffer>, clock: &dyn Clock) {
    let mut buf = buffer.lock();
    let now = clock.now();
    if let Some(sample) = buf.poll(now) {
        buf.append(now, sample);
    }
}

/// Samples one device's metric sources on a fixed period.
///
/// A sampler is started at most once. Read results after [`stop`](Self::stop)
/// for a consistent view; reading while running sees a prefix of the run.
pub struct TelemetrySampler {
    device: Arc<Device>,
    config: SamplerConfig,
    buffer: Arc<Mutex<Buffer>>,
    scheduler: Box<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    state: State,
}

impl TelemetrySampler {
    /// Acquires what it can from `factories`. Sources that fail to open only
    /// narrow what the run records.
    pub fn new(
        device: Arc<Device>,
        config: SamplerConfig,
        factories: &[Box<dyn MetricSourceFactory>],
        scheduler: Box<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.period.is_zero() {
            return Err(TelemetryError::InvalidPeriod);
        }
        let mut sources = Vec::new();
        for factory in factories {
            match factory.acquire(&device) {
                Ok(source) => {
                    debug!(device = %device.identity, source = factory.name(), "telemetry: source acquired");
                    sources.push(source);
                }
                Err(e) => {
                    info!(device = %device.identity, source = factory.name(), reason = %e, "telemetry: source skipped")
                }
            }
        }
        let buffer = Buffer {
            sources,
            records: Vec::new(),
            appended: 0,
            origin: None,
            result_mask: None,
            peak: PeakUsage::default(),
            initial: None,
            keep_last_only: config.control.contains(TelemetryItem::PEAK_USAGE_ONLY),
            realtime: None,
            samples_counter: None,
        };
        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(buffer)),
            scheduler,
            clock,
            state: State::Idle,
        })
    }

    /// Host defaults: DRM and procfs sources, a timer thread, the system clock.
    pub fn with_defaults(device: Arc<Device>, config: SamplerConfig) -> Result<Self> {
        Self::new(
            device,
            config,
            &default_factories(),
            Box::new(ThreadScheduler::default()),
            Arc::new(SystemClock::default()),
        )
    }

    /// Streams the CSV header and each record to `sink` as they are appended.
    pub fn with_realtime(self, sink: Box<dyn Write + Send>) -> Self {
        self.buffer.lock().realtime = Some(sink);
        self
    }

    pub fn with_metrics(self, samples: IntCounter) -> Self {
        self.buffer.lock().samples_counter = Some(samples);
        self
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn source_count(&self) -> usize {
        self.buffer.lock().sources.len()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// Arms the ticker. The first sample is taken immediately.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::Idle) {
            return Err(TelemetryError::InvalidState {
                op: "start",
                state: self.state.label(),
            });
        }
        let buffer = self.buffer.clone();
        let clock = self.clock.clone();
        let task = self.scheduler.schedule(
            self.config.period,
            Box::new(move || tick(&buffer, clock.as_ref())),
        )?;
        info!(
            device = %self.device.identity,
            period_ms = self.config.period.as_millis() as u64,
            "telemetry: started"
        );
        self.state = State::Running(task);
        Ok(())
    }

    /// Cancels the ticker and waits for an in-flight tick. A no-op unless running.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        if let State::Running(mut task) = std::mem::replace(&mut self.state, State::Stopped) {
            task.cancel();
            let mut buf = self.buffer.lock();
            if let Some(sink) = buf.realtime.as_mut() {
                let _ = sink.flush();
            }
            info!(device = %self.device.identity, records = buf.appended, "telemetry: stopped");
        }
    }

    /// Fields populated by this run, fixed by its first record.
    pub fn result_mask(&self) -> TelemetryItem {
        self.buffer.lock().result_mask.unwrap_or_default()
    }

    pub fn records(&self) -> Vec<TimedRecord> {
        self.buffer.lock().records.clone()
    }

    /// Records appended over the whole run, including any no longer buffered.
    pub fn samples_taken(&self) -> u64 {
        self.buffer.lock().appended
    }

    pub fn peak_usage(&self) -> PeakUsage {
        self.buffer.lock().peak
    }

    pub fn initial_usage(&self) -> PeakUsage {
        self.buffer.lock().initial.unwrap_or_default()
    }

    /// Buffered records as CSV, preceded by a title line.
    pub fn log(&self) -> String {
        let buf = self.buffer.lock();
        let mask = buf.result_mask.unwrap_or_default();
        let mut out = format!(
            "Stats for {} ({}ms interval):\n",
            self.device.name(),
            self.config.period.as_millis()
        );
        out.push_str(&csv_header(mask));
        if buf.records.is_empty() {
            out.push_str("TelemetryTracker: No records!\n");
        }
        for rec in &buf.records {
            out.push_str(&csv_row(mask, rec));
        }
        out
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DrmFactory, ManualClock, ManualScheduler, MockSource, MockSourceFactory};
    use std::sync::atomic::Ordering;
    use xpu_probe::{DeviceKind, Identity};

    fn device() -> Arc<Device> {
        let mut dev = Device::new(Identity(0x42), DeviceKind::Gpu, 0);
        dev.properties.name = Some("Test GPU".into());
        Arc::new(dev)
    }

    fn memory_factory() -> Box<dyn MetricSourceFactory> {
        Box::new(MockSourceFactory::new("mem", || MockSource::monotonic_memory(100 << 20, 1 << 20)))
    }

    struct Harness {
        sampler: TelemetrySampler,
        sched: ManualScheduler,
        clock: Arc<ManualClock>,
    }

    fn harness(config: SamplerConfig, factories: Vec<Box<dyn MetricSourceFactory>>) -> Harness {
        let sched = ManualScheduler::default();
        let clock = Arc::new(ManualClock::default());
        let sampler = TelemetrySampler::new(
            device(),
            config,
            &factories,
            Box::new(sched.clone()),
            clock.clone(),
        )
        .unwrap();
        Harness {
            sampler,
            sched,
            clock,
        }
    }

    impl Harness {
        fn step(&self, ms: u64) {
            self.clock.advance(Duration::from_millis(ms));
            assert!(self.sched.fire());
        }
    }

    #[test]
    fn test_zero_period_rejected() {
        let err = TelemetrySampler::new(
            device(),
            SamplerConfig {
                period: Duration::ZERO,
                ..SamplerConfig::default()
            },
            &[],
            Box::new(ManualScheduler::default()),
            Arc::new(ManualClock::default()),
        )
        .err();
        assert!(matches!(err, Some(TelemetryError::InvalidPeriod)));
    }

    #[test]
    fn test_lifecycle_is_one_shot() {
        let mut h = harness(SamplerConfig::default(), vec![memory_factory()]);
        assert!(!h.sampler.is_running());
        h.sampler.start().unwrap();
        assert!(h.sampler.is_running());
        assert!(matches!(
            h.sampler.start(),
            Err(TelemetryError::InvalidState { state: "running", .. })
        ));
        h.sampler.stop();
        h.sampler.stop();
        assert!(!h.sched.is_armed());
        assert!(matches!(
            h.sampler.start(),
            Err(TelemetryError::InvalidState { state: "stopped", .. })
        ));
    }

    #[test]
    fn test_first_tick_immediate_and_peak_over_initial() {
        let mut h = harness(SamplerConfig::default(), vec![memory_factory()]);
        h.sampler.start().unwrap();
        assert_eq!(h.sampler.records().len(), 1);
        h.step(100);
        h.step(100);
        h.sampler.stop();

        let records = h.sampler.records();
        assert_eq!(records.len(), 3);
        assert!(records[0].rates.is_none());
        assert!(records[1].rates.is_some());
        assert!((records[2].elapsed_secs - 0.2).abs() < 1e-9);

        let peak = h.sampler.peak_usage();
        let initial = h.sampler.initial_usage();
        assert_eq!(initial.device_memory_used_bytes, 100 << 20);
        assert_eq!(peak.device_memory_used_bytes, 102 << 20);
        assert!(peak.device_memory_used_bytes >= initial.device_memory_used_bytes);
    }

    #[test]
    fn test_result_mask_fixed_at_first_record() {
        let late = Box::new(MockSourceFactory::new("late", || {
            MockSource::new("late", |n| Sample {
                commit_total: (n > 0).then_some(1 << 30),
                ..Sample::default()
            })
        }));
        let mut h = harness(SamplerConfig::default(), vec![memory_factory(), late]);
        h.sampler.start().unwrap();
        let first = h.sampler.result_mask();
        assert_eq!(
            first,
            TelemetryItem::FREQUENCY | TelemetryItem::MEMORY_USAGE | TelemetryItem::TIMESTAMP_DOUBLE
        );
        h.step(50);
        h.sampler.stop();
        assert!(h.sampler.records()[1].sample.commit_total.is_some());
        assert_eq!(h.sampler.result_mask(), first);
    }

    #[test]
    fn test_no_sources_records_nothing() {
        let mut h = harness(
            SamplerConfig::default(),
            vec![Box::new(MockSourceFactory::unavailable("l0"))],
        );
        assert_eq!(h.sampler.source_count(), 0);
        h.sampler.start().unwrap();
        h.step(100);
        h.sampler.stop();
        assert!(h.sampler.records().is_empty());
        assert_eq!(h.sampler.result_mask(), TelemetryItem::empty());
        assert_eq!(h.sampler.peak_usage(), PeakUsage::default());
        assert!(h.sampler.log().ends_with("TelemetryTracker: No records!\n"));
    }

    #[test]
    fn test_empty_reads_are_skipped() {
        let sparse = Box::new(MockSourceFactory::new("sparse", || {
            MockSource::new("sparse", |n| Sample {
                device_memory_used: (n % 2 == 1).then_some(4096),
                ..Sample::default()
            })
        }));
        let mut h = harness(SamplerConfig::default(), vec![sparse]);
        h.sampler.start().unwrap();
        h.step(10);
        h.step(10);
        h.step(10);
        h.sampler.stop();
        assert_eq!(h.sampler.samples_taken(), 2);
    }

    #[test]
    fn test_peak_usage_only_keeps_last_record() {
        let config = SamplerConfig {
            control: TelemetryItem::PEAK_USAGE_ONLY,
            ..SamplerConfig::default()
        };
        let mut h = harness(config, vec![memory_factory()]);
        h.sampler.start().unwrap();
        for _ in 0..4 {
            h.step(100);
        }
        h.sampler.stop();
        let records = h.sampler.records();
        assert_eq!(records.len(), 1);
        assert_eq!(h.sampler.samples_taken(), 5);
        assert_eq!(records[0].sample.device_memory_used, Some(104 << 20));
        assert_eq!(h.sampler.initial_usage().device_memory_used_bytes, 100 << 20);
        assert!(records[0].rates.is_some());
    }

    #[test]
    fn test_log_layout() {
        let mut h = harness(
            SamplerConfig {
                period: Duration::from_millis(250),
                ..SamplerConfig::default()
            },
            vec![memory_factory()],
        );
        h.sampler.start().unwrap();
        h.step(250);
        h.sampler.stop();
        assert_eq!(
            h.sampler.log(),
            "Stats for Test GPU (250ms interval):\n\
             Time(s), Freq(MHz),Device Memory Used (MB)\n\
             0,1000,100\n\
             0.25,1001,101\n"
        );
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_realtime_sink_gets_header_once() {
        let sink = SharedSink::default();
        let h = harness(SamplerConfig::default(), vec![memory_factory()]);
        let mut h = Harness {
            sampler: h.sampler.with_realtime(Box::new(sink.clone())),
            ..h
        };
        h.sampler.start().unwrap();
        h.step(100);
        h.sampler.stop();
        let text = String::from_utf8(sink.0.lock().clone()).unwrap();
        assert_eq!(text.matches("Time(s)").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_metrics_counter_and_drop_stops() {
        let counter = IntCounter::new("samples", "samples").unwrap();
        let src = MockSource::monotonic_memory(0, 1);
        let reads = src.reads();
        let slot = Mutex::new(Some(src));
        let factory = Box::new(MockSourceFactory::new("once", move || {
            slot.lock()
                .take()
                .unwrap_or_else(|| MockSource::monotonic_memory(0, 1))
        }));
        let sched = ManualScheduler::default();
        {
            let mut sampler = TelemetrySampler::new(
                device(),
                SamplerConfig::default(),
                &[factory as Box<dyn MetricSourceFactory>],
                Box::new(sched.clone()),
                Arc::new(ManualClock::default()),
            )
            .unwrap()
            .with_metrics(counter.clone());
            sampler.start().unwrap();
            assert!(sched.fire());
        }
        assert!(!sched.is_armed());
        assert_eq!(counter.get(), 2);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_busy_rate_follows_sampler_clock() {
        let root = tempfile::tempdir().unwrap();
        let pci = root.path().join("sys/bus/pci/devices/0000:0a:00.0");
        std::fs::create_dir_all(&pci).unwrap();
        std::fs::write(pci.join("gpu_busy_percent"), "50\n").unwrap();
        let mut dev = Device::new(Identity(0x43), DeviceKind::Gpu, 0);
        dev.properties.pci_address = Some(xpu_probe::PciAddress {
            domain: 0,
            bus: 0x0a,
            device: 0,
            function: 0,
        });

        let sched = ManualScheduler::default();
        let clock = Arc::new(ManualClock::default());
        let mut sampler = TelemetrySampler::new(
            Arc::new(dev),
            SamplerConfig::default(),
            &[Box::new(DrmFactory::with_root(root.path())) as Box<dyn MetricSourceFactory>],
            Box::new(sched.clone()),
            clock.clone(),
        )
        .unwrap();
        sampler.start().unwrap();
        clock.advance(Duration::from_secs(2));
        assert!(sched.fire());
        sampler.stop();

        let records = sampler.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sample.activity_global, Some(1.0));
        let pct = records[1].rates.as_ref().and_then(|r| r.global_pct).unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_thread_scheduler_run() {
        let mut sampler = TelemetrySampler::new(
            device(),
            SamplerConfig {
                period: Duration::from_millis(5),
                ..SamplerConfig::default()
            },
            &[memory_factory()],
            Box::new(ThreadScheduler::default()),
            Arc::new(SystemClock::default()),
        )
        .unwrap();
        sampler.start().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        sampler.stop();
        let n = sampler.records().len();
        assert!(n >= 2, "only {n} records");
        assert!(sampler.peak_usage().device_memory_used_bytes >= sampler.initial_usage().device_memory_used_bytes);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sampler.records().len(), n);
    }
}
