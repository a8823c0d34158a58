use crate::{ProbeError, Result};
use std::fmt;
use std::str::FromStr;

/// Driver version packed as four 16-bit words, most significant first.
///
/// Only the low two words take part in ordering: word 1 is the release and
/// word 0 the build. This follows vendor numbering where the top words carry
/// OS and branding information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverVersion {
    raw: u64,
    valid: bool,
}

static MAX: DriverVersion = DriverVersion::from_raw(u64::MAX);
static MIN: DriverVersion = DriverVersion::from_raw(0);

/// Releases above this pass any `at_least` check that ignores the release.
const RELEASE_ROLLOVER: u16 = 100;

impl Default for DriverVersion {
    fn default() -> Self {
        Self::invalid()
    }
}

impl DriverVersion {
    pub const fn from_raw(raw: u64) -> Self {
        Self { raw, valid: true }
    }

    /// Version for a failed platform lookup.
    pub const fn invalid() -> Self {
        Self {
            raw: 0,
            valid: false,
        }
    }

    /// Parses `a.b` or `a.b.c.d`; anything else yields an invalid version.
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| Self::invalid())
    }

    pub fn max() -> &'static DriverVersion {
        &MAX
    }

    pub fn min() -> &'static DriverVersion {
        &MIN
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn as_u64(&self) -> u64 {
        self.raw
    }

    /// Words from most to least significant.
    pub fn words(&self) -> [u16; 4] {
        [
            (self.raw >> 48) as u16,
            (self.raw >> 32) as u16,
            (self.raw >> 16) as u16,
            self.raw as u16,
        ]
    }

    pub fn release(&self) -> u16 {
        (self.raw >> 16) as u16
    }

    pub fn build(&self) -> u16 {
        self.raw as u16
    }

    #[track_caller]
    pub fn compare_ge(&self, rhs: &DriverVersion) -> Result<bool> {
        if !self.valid || !rhs.valid {
            return Err(ProbeError::invariant(format!(
                "compare of invalid driver versions ({self} >= {rhs})"
            )));
        }
        Ok(self.release() > rhs.release()
            || (self.release() == rhs.release() && self.build() >= rhs.build()))
    }

    /// `release == None` ignores the release word, except that releases past
    /// 100 always pass.
    #[track_caller]
    pub fn at_least(&self, build: u16, release: Option<u16>) -> Result<bool> {
        if !self.valid {
            return Err(ProbeError::invariant("at_least on invalid driver version"));
        }
        match release {
            None => Ok(self.release() > RELEASE_ROLLOVER || self.build() >= build),
            Some(release) => {
                let floor = DriverVersion::from_raw((u64::from(release) << 16) | u64::from(build));
                self.compare_ge(&floor)
            }
        }
    }

    /// Inclusive on both ends.
    #[track_caller]
    pub fn in_range(&self, low: &DriverVersion, high: &DriverVersion) -> Result<bool> {
        if !self.valid || !low.valid || !high.valid {
            return Err(ProbeError::invariant("in_range with invalid driver version"));
        }
        Ok(self.compare_ge(low)? && high.compare_ge(self)?)
    }
}

impl FromStr for DriverVersion {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        let groups: Vec<&str> = s.trim().split('.').collect();
        if groups.len() != 2 && groups.len() != 4 {
            return Err(ProbeError::Malformed(format!(
                "driver version needs 2 or 4 groups: {s:?}"
            )));
        }
        let mut raw = 0u64;
        for g in groups {
            let word: u16 = g
                .parse()
                .map_err(|e| ProbeError::Malformed(format!("driver version group {g:?}: {e}")))?;
            raw = (raw << 16) | u64::from(word);
        }
        Ok(Self::from_raw(raw))
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return f.write_str("InvalidVersion");
        }
        let [a, b, c, d] = self.words();
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip() {
        for raw in [0u64, 1, 0xffff, 0x1f_0000_0065_144a, u64::MAX, 0x8000_0000_0000_0000] {
            assert_eq!(DriverVersion::from_raw(raw).as_u64(), raw);
        }
    }

    #[test]
    fn test_string_round_trip() {
        let v = DriverVersion::parse("31.0.101.5186");
        assert!(v.is_valid());
        assert_eq!(v.to_string(), "31.0.101.5186");
        assert_eq!(v.release(), 101);
        assert_eq!(v.build(), 5186);
    }

    #[test]
    fn test_two_groups_fill_low_words() {
        let v = DriverVersion::parse("101.5186");
        assert_eq!(v.as_u64(), (101 << 16) | 5186);
        assert_eq!(v.to_string(), "0.0.101.5186");
    }

    #[test]
    fn test_bad_strings_are_invalid() {
        for s in ["", "1.2.3", "a.b", "1.70000", "1.2.3.4.5"] {
            let v = DriverVersion::parse(s);
            assert!(!v.is_valid(), "{s:?} should be invalid");
            assert_eq!(v.to_string(), "InvalidVersion");
        }
    }

    #[test]
    fn test_compare_ignores_top_words() {
        let a = DriverVersion::parse("31.0.101.5186");
        let b = DriverVersion::parse("1.2.101.5186");
        assert!(a.compare_ge(&b).unwrap());
        assert!(b.compare_ge(&a).unwrap());
        let newer_release = DriverVersion::parse("31.0.102.1");
        assert!(newer_release.compare_ge(&a).unwrap());
        assert!(!a.compare_ge(&newer_release).unwrap());
    }

    #[test]
    fn test_compare_invalid_is_violation() {
        let err = DriverVersion::invalid()
            .compare_ge(&DriverVersion::from_raw(1))
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvariantViolation { .. }));
    }

    #[test]
    fn test_at_least() {
        let v = DriverVersion::parse("31.0.101.5186");
        assert!(v.at_least(5000, None).unwrap());
        // release > 100 passes regardless of build when release is ignored
        assert!(v.at_least(6000, None).unwrap());
        let old = DriverVersion::parse("27.20.100.9000");
        assert!(!old.at_least(9100, None).unwrap());
        assert!(old.at_least(8000, None).unwrap());
        assert!(v.at_least(5186, Some(101)).unwrap());
        assert!(!v.at_least(5187, Some(101)).unwrap());
        assert!(v.at_least(9999, Some(100)).unwrap());
    }

    #[test]
    fn test_in_range_reflexive() {
        for s in ["31.0.101.5186", "0.0.0.0", "65535.65535.65535.65535"] {
            let v = DriverVersion::parse(s);
            assert!(v.in_range(&v, &v).unwrap(), "{s}");
        }
        let v = DriverVersion::parse("31.0.101.5186");
        assert!(v.in_range(DriverVersion::min(), DriverVersion::max()).unwrap());
        let low = DriverVersion::parse("31.0.101.5187");
        assert!(!v.in_range(&low, DriverVersion::max()).unwrap());
        assert!(v.in_range(&DriverVersion::invalid(), &v).is_err());
    }
}
