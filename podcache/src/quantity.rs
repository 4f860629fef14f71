//! CPU quantities in Kubernetes notation (e.g., "45m", "2", "0.5").
//!
//! Instance load and limits are compared as millicores. Only the CPU forms
//! that pod specs actually use are accepted: a bare or fractional number of
//! cores, or an integer count of millicores with the `m` suffix.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Millicores in one core.
const MILLIS_PER_CORE: u64 = 1000;

/// Error parsing a CPU quantity string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid CPU quantity '{input}' - expected format like '250m', '2' or '0.5'")]
pub struct QuantityParseError {
    input: String,
}

impl QuantityParseError {
    fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// A CPU amount stored as millicores.
///
/// Ordering follows the numeric value, so `usage <= limit` is the
/// eligibility test used by admission.
///
/// # Examples
///
/// ```
/// use podcache::CpuQuantity;
///
/// let limit: CpuQuantity = "45m".parse().unwrap();
/// assert_eq!(limit.millis(), 45);
/// assert_eq!("1.5".parse::<CpuQuantity>().unwrap(), CpuQuantity::from_millis(1500));
/// assert!(CpuQuantity::from_millis(44) <= limit);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuQuantity(u64);

impl CpuQuantity {
    /// Zero CPU.
    pub const ZERO: CpuQuantity = CpuQuantity(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn from_cores(cores: u64) -> Self {
        Self(cores * MILLIS_PER_CORE)
    }

    pub const fn millis(self) -> u64 {
        self.0
    }
}

impl FromStr for CpuQuantity {
    type Err = QuantityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(QuantityParseError::new(s));
        }

        if let Some(millis) = trimmed.strip_suffix('m') {
            return millis
                .parse::<u64>()
                .map(CpuQuantity)
                .map_err(|_| QuantityParseError::new(s));
        }

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };

        // Sub-millicore precision cannot be represented.
        if fraction.len() > 3 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QuantityParseError::new(s));
        }
        if whole.is_empty() && fraction.is_empty() {
            return Err(QuantityParseError::new(s));
        }

        let cores: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| QuantityParseError::new(s))?
        };
        let fraction_millis: u64 = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{:0<3}", fraction);
            padded.parse().map_err(|_| QuantityParseError::new(s))?
        };

        cores
            .checked_mul(MILLIS_PER_CORE)
            .and_then(|m| m.checked_add(fraction_millis))
            .map(CpuQuantity)
            .ok_or_else(|| QuantityParseError::new(s))
    }
}

impl fmt::Display for CpuQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 != 0 && self.0.is_multiple_of(MILLIS_PER_CORE) {
            write!(f, "{}", self.0 / MILLIS_PER_CORE)
        } else {
            write!(f, "{}m", self.0)
        }
    }
}
