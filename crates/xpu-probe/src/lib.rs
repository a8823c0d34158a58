//! xpu-probe: device data model and probe backends for the XPU inventory
//!
//! Probes report sparse, typed property bags for the devices they can see. The
//! registry crate merges them into one record per device. The default build
//! enables a scripted `mock` backend and the Linux `sysfs` backend; the sysfs
//! backend degrades to "unavailable" on hosts without those trees.

mod types;
pub use types::*;

mod version;
pub use version::DriverVersion;

mod error;
pub use error::{ProbeError, Result};

mod traits;
pub use traits::{HostProbe, Probe, SystemInventory};

mod fixture;
pub use fixture::{load_fixture_dir, load_fixture_file, DeviceFixture, FixtureProbe};

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockHost, MockInventory, MockProbe};

#[cfg(feature = "sysfs")]
mod sysfs;

#[cfg(feature = "sysfs")]
pub use sysfs::{
    kind_for_class, link_bandwidth, parse_cpuinfo, parse_kernel_release, parse_link_speed,
    parse_meminfo, parse_os_release, LinuxHost, SysfsProbe,
};
