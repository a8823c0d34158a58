use bitflags::bitflags;
use xpu_registry::format_significant;

const MIB: f64 = (1u64 << 20) as f64;
const GIB: f64 = (1u64 << 30) as f64;

bitflags! {
    /// Telemetry fields a sampling run populates, plus control flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TelemetryItem: u32 {
        const FREQUENCY = 1;
        const READ_BW = 1 << 1;
        const WRITE_BW = 1 << 2;
        const GLOBAL_ACTIVITY = 1 << 3;
        const RENDER_COMPUTE_ACTIVITY = 1 << 4;
        const MEDIA_ACTIVITY = 1 << 5;
        const MEMORY_USAGE = 1 << 6;
        const TIMESTAMP_DOUBLE = 1 << 7;
        const FREQUENCY_MEDIA = 1 << 8;
        const FREQUENCY_MEMORY = 1 << 9;
        const SYSTEMMEMORY = 1 << 10;
        /// Control flag: keep only the latest record.
        const PEAK_USAGE_ONLY = 1 << 31;
    }
}

/// Raw values from one read of one or more metric sources.
///
/// Byte counters and activity counters are cumulative. Activity counters are
/// busy seconds since an arbitrary origin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub freq_mhz: Option<f64>,
    pub read_bytes: Option<u64>,
    pub write_bytes: Option<u64>,
    pub activity_global: Option<f64>,
    pub activity_compute: Option<f64>,
    pub activity_media: Option<f64>,
    pub device_memory_used: Option<u64>,
    pub device_memory_budget: Option<u64>,
    pub freq_media_mhz: Option<f64>,
    pub freq_memory_mhz: Option<f64>,
    pub system_available: Option<u64>,
    pub commit_total: Option<u64>,
    pub commit_limit: Option<u64>,
    pub commit_peak: Option<u64>,
    pub gpu_mem_adapter_total: Option<u64>,
    pub gpu_mem_adapter_shared: Option<u64>,
    pub gpu_mem_adapter_dedicated: Option<u64>,
}

macro_rules! fill {
    ($dst:ident, $src:ident, $($field:ident),+ $(,)?) => {
        $( if $dst.$field.is_none() { $dst.$field = $src.$field; } )+
    };
}

impl Sample {
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Fills fields still unset from `other`; the first source to report a field wins.
    pub fn merge(&mut self, other: Sample) {
        fill!(
            self,
            other,
            freq_mhz,
            read_bytes,
            write_bytes,
            activity_global,
            activity_compute,
            activity_media,
            device_memory_used,
            device_memory_budget,
            freq_media_mhz,
            freq_memory_mhz,
            system_available,
            commit_total,
            commit_limit,
            commit_peak,
            gpu_mem_adapter_total,
            gpu_mem_adapter_shared,
            gpu_mem_adapter_dedicated,
        );
    }

    /// Items this sample carries a value for.
    pub fn items(&self) -> TelemetryItem {
        let mut items = TelemetryItem::empty();
        items.set(TelemetryItem::FREQUENCY, self.freq_mhz.is_some());
        items.set(TelemetryItem::READ_BW, self.read_bytes.is_some());
        items.set(TelemetryItem::WRITE_BW, self.write_bytes.is_some());
        items.set(TelemetryItem::GLOBAL_ACTIVITY, self.activity_global.is_some());
        items.set(TelemetryItem::RENDER_COMPUTE_ACTIVITY, self.activity_compute.is_some());
        items.set(TelemetryItem::MEDIA_ACTIVITY, self.activity_media.is_some());
        items.set(TelemetryItem::MEMORY_USAGE, self.device_memory_used.is_some());
        items.set(TelemetryItem::FREQUENCY_MEDIA, self.freq_media_mhz.is_some());
        items.set(TelemetryItem::FREQUENCY_MEMORY, self.freq_memory_mhz.is_some());
        items.set(
            TelemetryItem::SYSTEMMEMORY,
            self.system_available.is_some() || self.commit_total.is_some(),
        );
        items
    }
}

/// Per-interval rates derived from two consecutive records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    pub read_mib_s: Option<f64>,
    pub write_mib_s: Option<f64>,
    pub total_mib_s: Option<f64>,
    pub global_pct: Option<f64>,
    pub compute_pct: Option<f64>,
    pub media_pct: Option<f64>,
}

/// Counter delta; `None` if either side is missing or the counter went backwards.
fn delta(cur: Option<u64>, prev: Option<u64>) -> Option<u64> {
    cur?.checked_sub(prev?)
}

fn busy_pct(cur: Option<f64>, prev: Option<f64>, dt: f64) -> Option<f64> {
    Some((cur? - prev?) * 100.0 / dt)
}

impl Rates {
    /// `None` when `dt` is not positive.
    pub fn between(prev: &Sample, cur: &Sample, dt: f64) -> Option<Rates> {
        if dt <= 0.0 {
            return None;
        }
        let rd = delta(cur.read_bytes, prev.read_bytes);
        let wr = delta(cur.write_bytes, prev.write_bytes);
        let per_s = |bytes: u64| bytes as f64 / (dt * MIB);
        Some(Rates {
            read_mib_s: rd.map(per_s),
            write_mib_s: wr.map(per_s),
            total_mib_s: rd.zip(wr).map(|(r, w)| per_s(r + w)),
            global_pct: busy_pct(cur.activity_global, prev.activity_global, dt),
            compute_pct: busy_pct(cur.activity_compute, prev.activity_compute, dt),
            media_pct: busy_pct(cur.activity_media, prev.activity_media, dt),
        })
    }
}

/// One appended sample. `rates` is `None` for the first record of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedRecord {
    /// Seconds since the first record.
    pub elapsed_secs: f64,
    pub sample: Sample,
    pub rates: Option<Rates>,
}

/// Memory figures tracked as running maxima, or as the first record's values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeakUsage {
    pub device_memory_used_bytes: u64,
    pub gpu_mem_adapter_total: u64,
    pub gpu_mem_adapter_shared: u64,
    pub gpu_mem_adapter_dedicated: u64,
}

impl PeakUsage {
    pub fn from_sample(s: &Sample) -> Self {
        Self {
            device_memory_used_bytes: s.device_memory_used.unwrap_or(0),
            gpu_mem_adapter_total: s.gpu_mem_adapter_total.unwrap_or(0),
            gpu_mem_adapter_shared: s.gpu_mem_adapter_shared.unwrap_or(0),
            gpu_mem_adapter_dedicated: s.gpu_mem_adapter_dedicated.unwrap_or(0),
        }
    }

    pub fn update_peak(&mut self, s: &Sample) -> &mut Self {
        let other = Self::from_sample(s);
        self.device_memory_used_bytes = self.device_memory_used_bytes.max(other.device_memory_used_bytes);
        self.gpu_mem_adapter_total = self.gpu_mem_adapter_total.max(other.gpu_mem_adapter_total);
        self.gpu_mem_adapter_shared = self.gpu_mem_adapter_shared.max(other.gpu_mem_adapter_shared);
        self.gpu_mem_adapter_dedicated =
            self.gpu_mem_adapter_dedicated.max(other.gpu_mem_adapter_dedicated);
        self
    }
}

fn has_bandwidth(mask: TelemetryItem) -> bool {
    mask.contains(TelemetryItem::READ_BW | TelemetryItem::WRITE_BW)
}

/// CSV header line for a run with result mask `mask`, newline included.
pub fn csv_header(mask: TelemetryItem) -> String {
    let mut out = String::from("Time(s)");
    if mask.contains(TelemetryItem::FREQUENCY) {
        out.push_str(", Freq(MHz)");
    }
    if has_bandwidth(mask) {
        out.push_str(",Rd BW(MB/s),Wr BW(MB/s),BW(MB/s)");
    }
    if mask.contains(TelemetryItem::GLOBAL_ACTIVITY) {
        out.push_str(",% Global");
    }
    if mask.contains(TelemetryItem::RENDER_COMPUTE_ACTIVITY) {
        out.push_str(",% Compute");
    }
    if mask.contains(TelemetryItem::MEDIA_ACTIVITY) {
        out.push_str(",% Media");
    }
    if mask.contains(TelemetryItem::MEMORY_USAGE) {
        out.push_str(",Device Memory Used (MB)");
    }
    if mask.contains(TelemetryItem::FREQUENCY_MEDIA) {
        out.push_str(",Media Freq (MHz)");
    }
    if mask.contains(TelemetryItem::FREQUENCY_MEMORY) {
        out.push_str(",Memory Freq (GT/s)");
    }
    if mask.contains(TelemetryItem::SYSTEMMEMORY) {
        out.push_str(
            ",Physical System Memory Available (GB),Commit Total (GB),Commit Limit (GB),Commit Peak (GB)",
        );
    }
    out.push('\n');
    out
}

fn cell(out: &mut String, value: Option<f64>, digits: u32) {
    out.push(',');
    if let Some(v) = value {
        out.push_str(&format_significant(v, digits));
    }
}

/// CSV row for `rec`, newline included. Columns follow [`csv_header`].
pub fn csv_row(mask: TelemetryItem, rec: &TimedRecord) -> String {
    let s = &rec.sample;
    let r = rec.rates.unwrap_or_default();
    let gb = |v: Option<u64>| v.map(|b| b as f64 / GIB);

    let mut out = format_significant(rec.elapsed_secs, 6);
    if mask.contains(TelemetryItem::FREQUENCY) {
        cell(&mut out, s.freq_mhz, 6);
    }
    if has_bandwidth(mask) {
        cell(&mut out, r.read_mib_s, 6);
        cell(&mut out, r.write_mib_s, 6);
        cell(&mut out, r.total_mib_s, 6);
    }
    if mask.contains(TelemetryItem::GLOBAL_ACTIVITY) {
        cell(&mut out, r.global_pct, 6);
    }
    if mask.contains(TelemetryItem::RENDER_COMPUTE_ACTIVITY) {
        cell(&mut out, r.compute_pct, 6);
    }
    if mask.contains(TelemetryItem::MEDIA_ACTIVITY) {
        cell(&mut out, r.media_pct, 6);
    }
    if mask.contains(TelemetryItem::MEMORY_USAGE) {
        cell(&mut out, s.device_memory_used.map(|b| b as f64 / MIB), 6);
    }
    if mask.contains(TelemetryItem::FREQUENCY_MEDIA) {
        cell(&mut out, s.freq_media_mhz, 6);
    }
    if mask.contains(TelemetryItem::FREQUENCY_MEMORY) {
        cell(&mut out, s.freq_memory_mhz.map(|f| f / 1000.0), 3);
    }
    if mask.contains(TelemetryItem::SYSTEMMEMORY) {
        cell(&mut out, gb(s.system_available), 5);
        cell(&mut out, gb(s.commit_total), 5);
        cell(&mut out, gb(s.commit_limit), 5);
        cell(&mut out, gb(s.commit_peak), 5);
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_first_value() {
        let mut a = Sample {
            freq_mhz: Some(1500.0),
            ..Sample::default()
        };
        a.merge(Sample {
            freq_mhz: Some(900.0),
            device_memory_used: Some(64 << 20),
            ..Sample::default()
        });
        assert_eq!(a.freq_mhz, Some(1500.0));
        assert_eq!(a.device_memory_used, Some(64 << 20));
        assert_eq!(a.items(), TelemetryItem::FREQUENCY | TelemetryItem::MEMORY_USAGE);
        assert!(Sample::default().is_empty());
    }

    #[test]
    fn test_rates_from_deltas() {
        let prev = Sample {
            read_bytes: Some(0),
            write_bytes: Some(1 << 20),
            activity_global: Some(10.0),
            ..Sample::default()
        };
        let cur = Sample {
            read_bytes: Some(4 << 20),
            write_bytes: Some(3 << 20),
            activity_global: Some(11.0),
            ..Sample::default()
        };
        let r = Rates::between(&prev, &cur, 2.0).unwrap();
        assert_eq!(r.read_mib_s, Some(2.0));
        assert_eq!(r.write_mib_s, Some(1.0));
        assert_eq!(r.total_mib_s, Some(3.0));
        assert_eq!(r.global_pct, Some(50.0));
        assert_eq!(r.compute_pct, None);
        assert!(Rates::between(&prev, &cur, 0.0).is_none());
    }

    #[test]
    fn test_counter_reset_yields_no_rate() {
        let prev = Sample {
            read_bytes: Some(100),
            ..Sample::default()
        };
        let cur = Sample {
            read_bytes: Some(10),
            ..Sample::default()
        };
        assert_eq!(Rates::between(&prev, &cur, 1.0).unwrap().read_mib_s, None);
    }

    #[test]
    fn test_peak_takes_field_maxima() {
        let mut peak = PeakUsage::default();
        peak.update_peak(&Sample {
            device_memory_used: Some(10),
            gpu_mem_adapter_total: Some(50),
            ..Sample::default()
        })
        .update_peak(&Sample {
            device_memory_used: Some(30),
            gpu_mem_adapter_total: Some(20),
            ..Sample::default()
        });
        assert_eq!(peak.device_memory_used_bytes, 30);
        assert_eq!(peak.gpu_mem_adapter_total, 50);
    }

    #[test]
    fn test_csv_columns_follow_mask() {
        let mask = TelemetryItem::FREQUENCY
            | TelemetryItem::READ_BW
            | TelemetryItem::WRITE_BW
            | TelemetryItem::MEMORY_USAGE;
        assert_eq!(
            csv_header(mask),
            "Time(s), Freq(MHz),Rd BW(MB/s),Wr BW(MB/s),BW(MB/s),Device Memory Used (MB)\n"
        );
        let first = TimedRecord {
            elapsed_secs: 0.0,
            sample: Sample {
                freq_mhz: Some(2400.0),
                device_memory_used: Some(512 << 20),
                ..Sample::default()
            },
            rates: None,
        };
        assert_eq!(csv_row(mask, &first), "0,2400,,,,512\n");
        let second = TimedRecord {
            elapsed_secs: 0.1,
            rates: Some(Rates {
                read_mib_s: Some(1.5),
                write_mib_s: Some(0.5),
                total_mib_s: Some(2.0),
                ..Rates::default()
            }),
            ..first
        };
        assert_eq!(csv_row(mask, &second), "0.1,2400,1.5,0.5,2,512\n");
    }
}
