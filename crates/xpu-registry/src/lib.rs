//! xpu-registry: one merged record per device, built from many probes
//!
//! [`RegistryBuilder`] runs the configured probes in order and folds their
//! reports into a [`DeviceRegistry`]. A finalized registry is immutable and can
//! be shared across threads, written to a JSON snapshot, replayed from one, or
//! rendered as the fixed-layout text report.

mod error;
pub use error::{ErrorHandler, LogAndContinue, RaiseError, RegistryError, Result};

mod generation;
pub use generation::{GenerationRecord, GenerationTable, IpVersion, BUILTIN_GENERATIONS};

mod merge;
pub use merge::{merge_kind, merge_properties, override_if_equals, set_if_nonzero, set_if_unset};

mod metrics;
pub use metrics::{MetricsHub, RegistryMetrics};

mod registry;
pub use registry::{Device, DeviceRegistry, Provenance, RegistryAssembly, RegistryBuilder, UmaPolicy};

pub mod fields;

mod encode;
pub use encode::{encode, encode_at, to_string_pretty};

mod decode;
pub use decode::decode;

mod compare;
pub use compare::{compare, Mismatch};

mod report;
pub use report::{format_significant, render, DeviceReport, Report};

mod snapshot;
pub use snapshot::{load_snapshot, save_snapshot};
