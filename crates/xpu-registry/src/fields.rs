//! Snapshot document field names. Archived documents depend on these; do not rename.

pub const SNAPSHOT_VERSION: &str = "0.0.1";

pub const VERSION: &str = "XPUInfoJSONVersion";
pub const GENERATED_AT: &str = "GeneratedAt";
pub const APIS_REQUESTED: &str = "APIsRequested";
pub const APIS_USED: &str = "APIsUsed";
pub const DEVICES: &str = "Devices";
pub const CPU: &str = "CPU";
pub const MEMORY: &str = "SystemMemory";
pub const SYSTEM: &str = "SystemInfo";
pub const RUNTIMES: &str = "RuntimeVersions";

pub const NAME: &str = "Name";
pub const IDENTITY: &str = "LUID";
pub const INDEX: &str = "AdapterIndex";
pub const TYPE: &str = "Type";
pub const VALID_APIS: &str = "validAPIs";
pub const DRIVER_VERSION_RAW: &str = "DriverVersionRaw";
pub const GENERATION_NAME: &str = "GenerationName";

pub const DESC: &str = "dxgiDesc";
pub const VENDOR_ID: &str = "VendorID";
pub const DEVICE_ID: &str = "DeviceID";
pub const SUBSYS_ID: &str = "SubSysID";
pub const REVISION: &str = "Revision";
pub const DEDICATED_MEMORY: &str = "DedicatedVideoMemory";
pub const SHARED_MEMORY: &str = "SharedSystemMemory";

pub const DRIVER_INFO: &str = "DriverInfo";
pub const DRIVER_DESC: &str = "DriverDesc";
pub const DRIVER_VERSION: &str = "DriverVersion";
pub const DRIVER_INF_SECTION: &str = "DriverInfSection";
pub const DEVICE_INSTANCE_ID: &str = "DeviceInstanceId";
pub const LOCATION_INFO: &str = "LocationInfo";

pub const MEMORY_BANDWIDTH_MAX: &str = "MemoryBandWidthMax";
pub const PCI_DEVICE_GEN: &str = "PCIDeviceGen";
pub const PCI_DEVICE_WIDTH: &str = "PCIDeviceWidth";
pub const PCI_DEVICE_MAX_BANDWIDTH: &str = "PCIDeviceMaxBandwidth";
pub const PCI_CURRENT_GEN: &str = "PCICurrentGen";
pub const PCI_CURRENT_WIDTH: &str = "PCICurrentWidth";
pub const PCI_CURRENT_MAX_BANDWIDTH: &str = "PCICurrentMaxBandwidth";
pub const RESIZABLE_BAR: &str = "ResizableBar";
pub const SUPPORTED: &str = "Supported";
pub const ENABLED: &str = "Enabled";
pub const PCI_ADDRESS: &str = "PCIAddress";
pub const DOMAIN: &str = "Domain";
pub const BUS: &str = "Bus";
pub const DEVICE: &str = "Device";
pub const FUNCTION: &str = "Function";
pub const UMA: &str = "UMA";

pub const FREQ_MAX: &str = "FreqMaxMHz";
pub const FREQ_MIN: &str = "FreqMinMHz";
pub const MEDIA_FREQ_MAX: &str = "MediaFreqMaxMHz";
pub const MEDIA_FREQ_MIN: &str = "MediaFreqMinMHz";
pub const MEMORY_FREQ_MAX: &str = "MemoryFreqMaxMHz";
pub const MEMORY_FREQ_MIN: &str = "MemoryFreqMinMHz";

pub const GENERATION_ID: &str = "GenerationID";
pub const GENERATION_SPACE: &str = "GenerationAPI";
pub const IP_VERSION: &str = "DeviceIPVersion";
pub const COMPUTE_UNITS: &str = "ComputeUnits";
pub const SIMD_WIDTH: &str = "ComputeUnitsSIMDWidth";
pub const PACKAGE_TDP: &str = "PackageTDP";
pub const VENDOR_FLAGS: &str = "VendorFlags";
pub const DP4A: &str = "DP4A";
pub const DPAS: &str = "DPAS";
pub const CUDA_CAPABILITY: &str = "CudaComputeCapability";
pub const MAJOR: &str = "Major";
pub const MINOR: &str = "Minor";
pub const BUILD: &str = "Build";
pub const PRODUCT_VERSION: &str = "productVersion";
pub const HIGH_PERFORMANCE: &str = "IsHighPerformance";
pub const MINIMUM_POWER: &str = "IsMinimumPower";
pub const DETACHABLE: &str = "IsDetachable";

pub const BRAND: &str = "Brand";
pub const PHYSICAL_CORES: &str = "PhysicalCores";
pub const LOGICAL_CORES: &str = "LogicalCores";
pub const HYBRID: &str = "Hybrid";
pub const FEATURES: &str = "Features";

pub const INSTALLED: &str = "InstalledPhysical";
pub const TOTAL: &str = "TotalPhysical";
pub const AVAILABLE_AT_INIT: &str = "AvailablePhysicalAtInit";
pub const PAGE_SIZE: &str = "PageSize";

pub const MANUFACTURER: &str = "Manufacturer";
pub const MODEL: &str = "Model";
pub const OS_NAME: &str = "OSName";
pub const OS_VERSION: &str = "OSVersion";
pub const BIOS_VENDOR: &str = "BIOSManufacturer";
pub const BIOS_VERSION: &str = "BIOSVersion";
pub const UPTIME_SECS: &str = "UptimeSeconds";
