//! Field-level merge rules for combining probe reports.
//!
//! Every property uses exactly one rule. None of them can clear a field, so
//! data only accumulates as more probes contribute.

use xpu_probe::{DeviceKind, Properties, Uma};

/// Stores `src` only while `dst` is unset.
pub fn set_if_unset<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if dst.is_none() {
        if let Some(v) = src {
            *dst = Some(v.clone());
        }
    }
}

/// Stores `src` whenever it is a nonzero measurement.
pub fn set_if_nonzero<T: Clone + Default + PartialEq>(dst: &mut Option<T>, src: &Option<T>) {
    if let Some(v) = src {
        if *v != T::default() {
            *dst = Some(v.clone());
        }
    }
}

/// Replaces `dst` with `src` only while `dst` still holds `prior`.
pub fn override_if_equals<T: Clone + PartialEq>(dst: &mut T, prior: &T, src: &T) {
    if dst == prior {
        *dst = src.clone();
    }
}

/// Lets a later report refine an unknown kind. Conflicts are checked by the caller.
pub fn merge_kind(dst: &mut DeviceKind, src: DeviceKind) {
    override_if_equals(dst, &DeviceKind::Unknown, &src);
}

macro_rules! unset {
    ($dst:ident, $src:ident, $($field:ident),+ $(,)?) => {
        $( set_if_unset(&mut $dst.$field, &$src.$field); )+
    };
}

macro_rules! nonzero {
    ($dst:ident, $src:ident, $($field:ident),+ $(,)?) => {
        $( set_if_nonzero(&mut $dst.$field, &$src.$field); )+
    };
}

pub fn merge_properties(dst: &mut Properties, src: &Properties) {
    unset!(
        dst,
        src,
        name,
        vendor_id,
        device_id,
        subsys_id,
        revision,
        dedicated_memory,
        shared_memory,
        memory_bandwidth_max,
        resizable_bar,
        pci_address,
        freq_max_mhz,
        freq_min_mhz,
        media_freq_max_mhz,
        media_freq_min_mhz,
        memory_freq_max_mhz,
        memory_freq_min_mhz,
        generation,
        ip_version,
        compute_units,
        simd_width,
        package_tdp,
        features,
        cuda_capability,
        high_performance,
        minimum_power,
        detachable,
        driver_description,
        driver_inf_section,
        device_instance_id,
        location_info,
    );
    // zero link readings mean the link was not trained when sampled
    nonzero!(
        dst,
        src,
        pci_device_gen,
        pci_device_width,
        pci_device_max_bandwidth,
        pci_current_gen,
        pci_current_width,
        pci_current_max_bandwidth,
    );
    override_if_equals(&mut dst.uma, &Uma::Unknown, &src.uma);
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpu_probe::{Generation, GenerationSpace, PciAddress};

    fn probe_a() -> Properties {
        Properties {
            name: Some("Intel(R) Arc(TM) Graphics".to_string()),
            dedicated_memory: Some(128 << 20),
            pci_current_gen: Some(4),
            ..Properties::default()
        }
    }

    fn probe_b() -> Properties {
        Properties {
            freq_max_mhz: Some(2250),
            generation: Some(Generation {
                id: 1272,
                space: GenerationSpace::Legacy,
            }),
            pci_address: Some(PciAddress {
                domain: 0,
                bus: 0,
                device: 2,
                function: 0,
            }),
            ..Properties::default()
        }
    }

    #[test]
    fn test_set_if_unset_keeps_first() {
        let mut dst = Some(1);
        set_if_unset(&mut dst, &Some(2));
        assert_eq!(dst, Some(1));
        let mut dst = None;
        set_if_unset(&mut dst, &Some(2));
        assert_eq!(dst, Some(2));
        set_if_unset(&mut dst, &None);
        assert_eq!(dst, Some(2));
    }

    #[test]
    fn test_set_if_nonzero() {
        let mut dst = Some(3u32);
        set_if_nonzero(&mut dst, &Some(0));
        assert_eq!(dst, Some(3));
        set_if_nonzero(&mut dst, &Some(4));
        assert_eq!(dst, Some(4));
        set_if_nonzero(&mut dst, &None);
        assert_eq!(dst, Some(4));
    }

    #[test]
    fn test_override_if_equals() {
        let mut uma = Uma::Unknown;
        override_if_equals(&mut uma, &Uma::Unknown, &Uma::Integrated);
        assert_eq!(uma, Uma::Integrated);
        override_if_equals(&mut uma, &Uma::Unknown, &Uma::Discrete);
        assert_eq!(uma, Uma::Integrated);

        let mut kind = DeviceKind::Unknown;
        merge_kind(&mut kind, DeviceKind::Gpu);
        assert_eq!(kind, DeviceKind::Gpu);
        merge_kind(&mut kind, DeviceKind::Unknown);
        assert_eq!(kind, DeviceKind::Gpu);
    }

    #[test]
    fn test_merge_idempotent() {
        let mut once = Properties::default();
        merge_properties(&mut once, &probe_a());
        let mut twice = once.clone();
        merge_properties(&mut twice, &probe_a());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_order_independent_for_disjoint_fields() {
        let mut ab = Properties::default();
        merge_properties(&mut ab, &probe_a());
        merge_properties(&mut ab, &probe_b());
        let mut ba = Properties::default();
        merge_properties(&mut ba, &probe_b());
        merge_properties(&mut ba, &probe_a());
        assert_eq!(ab, ba);
        assert_eq!(ab.freq_max_mhz, Some(2250));
        assert_eq!(ab.dedicated_memory, Some(128 << 20));
    }

    #[test]
    fn test_merge_never_clears() {
        let mut dst = probe_a();
        merge_properties(&mut dst, &Properties::default());
        assert_eq!(dst, probe_a());
    }
}
