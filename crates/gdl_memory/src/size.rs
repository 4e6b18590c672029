//! # Memory Sizes
//!
//! Byte counts with decimal (`kB`, `MB`, `GB`) and binary (`KiB`, `MiB`,
//! `GiB`) units, usable from code and from configuration files.
//!
//! ```rust,ignore
//! assert_eq!(MemorySize::megabytes(1).num_bytes(), 1_000_000);
//! assert_eq!("64KiB".parse::<MemorySize>()?, MemorySize::kibibytes(64));
//! ```

use std::fmt;
use std::ops::{Add, Mul};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MemoryError;

const KILO: usize = 1000;
const KIBI: usize = 1024;

/// A number of bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemorySize(usize);

impl MemorySize {
    /// `n` bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(n: usize) -> Self {
        Self(n)
    }

    /// `n` kilobytes (1000 bytes).
    #[inline]
    #[must_use]
    pub const fn kilobytes(n: usize) -> Self {
        Self(n * KILO)
    }

    /// `n` megabytes (1000² bytes).
    #[inline]
    #[must_use]
    pub const fn megabytes(n: usize) -> Self {
        Self(n * KILO * KILO)
    }

    /// `n` gigabytes (1000³ bytes).
    #[inline]
    #[must_use]
    pub const fn gigabytes(n: usize) -> Self {
        Self(n * KILO * KILO * KILO)
    }

    /// `n` kibibytes (1024 bytes).
    #[inline]
    #[must_use]
    pub const fn kibibytes(n: usize) -> Self {
        Self(n * KIBI)
    }

    /// `n` mebibytes (1024² bytes).
    #[inline]
    #[must_use]
    pub const fn mebibytes(n: usize) -> Self {
        Self(n * KIBI * KIBI)
    }

    /// `n` gibibytes (1024³ bytes).
    #[inline]
    #[must_use]
    pub const fn gibibytes(n: usize) -> Self {
        Self(n * KIBI * KIBI * KIBI)
    }

    /// The size in bytes.
    #[inline]
    #[must_use]
    pub const fn num_bytes(self) -> usize {
        self.0
    }
}

impl From<usize> for MemorySize {
    fn from(bytes: usize) -> Self {
        Self(bytes)
    }
}

impl From<MemorySize> for usize {
    fn from(size: MemorySize) -> Self {
        size.0
    }
}

impl Add for MemorySize {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Mul<usize> for MemorySize {
    type Output = Self;

    fn mul(self, rhs: usize) -> Self {
        Self(self.0 * rhs)
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl FromStr for MemorySize {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit() && c != '_').unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let value: usize = digits
            .replace('_', "")
            .parse()
            .map_err(|_| MemoryError::InvalidSize(format!("`{s}` does not start with a number")))?;

        let factor = match unit.trim() {
            "" | "B" => 1,
            "kB" | "KB" => KILO,
            "MB" => KILO * KILO,
            "GB" => KILO * KILO * KILO,
            "KiB" => KIBI,
            "MiB" => KIBI * KIBI,
            "GiB" => KIBI * KIBI * KIBI,
            other => {
                return Err(MemoryError::InvalidSize(format!("unknown unit `{other}`")));
            }
        };

        value
            .checked_mul(factor)
            .map(Self)
            .ok_or_else(|| MemoryError::InvalidSize(format!("`{s}` overflows")))
    }
}

impl Serialize for MemorySize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0 as u64)
    }
}

impl<'de> Deserialize<'de> for MemorySize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MemorySizeVisitor)
    }
}

struct MemorySizeVisitor;

impl<'de> Visitor<'de> for MemorySizeVisitor {
    type Value = MemorySize;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte count or a string such as \"64KiB\" or \"1MB\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MemorySize, E> {
        usize::try_from(v).map(MemorySize).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MemorySize, E> {
        usize::try_from(v).map(MemorySize).map_err(E::custom)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<MemorySize, E> {
        v.parse().map_err(E::custom)
    }
}
