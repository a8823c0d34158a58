//! xpu-telemetry: periodic sampling of one device's runtime metrics
//!
//! A [`TelemetrySampler`] owns the [`MetricSource`]s it could acquire for a
//! device and reads them on a [`Scheduler`] tick. Each tick appends one
//! [`TimedRecord`] to a buffer behind a single lock; peak and initial memory
//! usage are tracked alongside. The set of fields a run reports is fixed by
//! its first record.

mod error;
pub use error::{Result, TelemetryError};

mod record;
pub use record::{csv_header, csv_row, PeakUsage, Rates, Sample, TelemetryItem, TimedRecord};

mod ticker;
pub use ticker::{
    Clock, ManualClock, ManualScheduler, Scheduler, SystemClock, TaskHandle, ThreadScheduler, Tick,
};

mod sources;
pub use sources::{
    default_factories, DrmFactory, DrmSource, MetricSource, MetricSourceFactory,
    SystemMemoryFactory, SystemMemorySource,
};

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockSource, MockSourceFactory};

mod sampler;
pub use sampler::{SamplerConfig, TelemetrySampler};
