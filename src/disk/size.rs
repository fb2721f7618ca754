//! Human size strings ("513MiB", "2GiB", "0") to and from byte counts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Supported size suffixes.
///
/// Binary units are 1024-based, decimal units 1000-based. The bare letters
/// `K`, `M` and `G` are aliases for the binary units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    KiB,
    MiB,
    GiB,
    KB,
    MB,
    GB,
}

impl SizeUnit {
    /// Units tried by [`from_bytes`], largest first, binary before decimal.
    const BY_PREFERENCE: [SizeUnit; 6] = [
        SizeUnit::GiB,
        SizeUnit::MiB,
        SizeUnit::KiB,
        SizeUnit::GB,
        SizeUnit::MB,
        SizeUnit::KB,
    ];

    pub fn multiplier(self) -> u64 {
        match self {
            SizeUnit::KiB => 1 << 10,
            SizeUnit::MiB => 1 << 20,
            SizeUnit::GiB => 1 << 30,
            SizeUnit::KB => 1_000,
            SizeUnit::MB => 1_000_000,
            SizeUnit::GB => 1_000_000_000,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            SizeUnit::KiB => "KiB",
            SizeUnit::MiB => "MiB",
            SizeUnit::GiB => "GiB",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
            SizeUnit::GB => "GB",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "KiB" | "K" => Some(SizeUnit::KiB),
            "MiB" | "M" => Some(SizeUnit::MiB),
            "GiB" | "G" => Some(SizeUnit::GiB),
            "KB" => Some(SizeUnit::KB),
            "MB" => Some(SizeUnit::MB),
            "GB" => Some(SizeUnit::GB),
            _ => None,
        }
    }
}

/// A validated size value from a disk template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawSize", into = "String")]
pub enum Size {
    /// The literal `"0"`: unspecified, or "extend to end" when used as an end offset.
    Unspecified,
    Exact { value: u64, unit: SizeUnit },
}

impl Size {
    pub fn mib(value: u64) -> Self {
        Size::Exact {
            value,
            unit: SizeUnit::MiB,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        matches!(self, Size::Unspecified)
    }

    /// Byte count; `Unspecified` is zero.
    pub fn bytes(&self) -> Result<u64, ValidationError> {
        match *self {
            Size::Unspecified => Ok(0),
            Size::Exact { value, unit } => value
                .checked_mul(unit.multiplier())
                .ok_or_else(|| ValidationError::size(self.to_string(), "size overflows 64 bits")),
        }
    }
}

impl FromStr for Size {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "0" {
            return Ok(Size::Unspecified);
        }

        let digits_end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, suffix) = s.split_at(digits_end);

        if digits.is_empty() {
            return Err(ValidationError::size(s, "size number incorrect"));
        }
        let unit = SizeUnit::from_suffix(suffix)
            .ok_or_else(|| ValidationError::size(s, format!("size suffix incorrect: '{}'", suffix)))?;
        let value: u64 = digits
            .parse()
            .map_err(|e| ValidationError::size(s, format!("size number incorrect: {}", e)))?;

        let size = Size::Exact { value, unit };
        size.bytes()?;
        Ok(size)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Unspecified => write!(f, "0"),
            Size::Exact { value, unit } => write!(f, "{}{}", value, unit.suffix()),
        }
    }
}

impl From<Size> for String {
    fn from(size: Size) -> String {
        size.to_string()
    }
}

/// What a template may contain in a size field.
///
/// Bare integers are MiB. Floats are parsed only so they can be rejected
/// with a useful message.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Int(u64),
    Text(String),
    Float(f64),
}

impl TryFrom<RawSize> for Size {
    type Error = ValidationError;

    fn try_from(raw: RawSize) -> Result<Self, Self::Error> {
        match raw {
            RawSize::Int(0) => Ok(Size::Unspecified),
            RawSize::Int(value) => {
                let size = Size::mib(value);
                size.bytes()?;
                Ok(size)
            }
            RawSize::Text(s) => s.parse(),
            RawSize::Float(v) => Err(ValidationError::size(
                v.to_string(),
                "unsupported size type (floating point)",
            )),
        }
    }
}

/// Parse a size string into bytes. `"0"` yields zero.
pub fn to_bytes(s: &str) -> Result<u64, ValidationError> {
    s.parse::<Size>()?.bytes()
}

/// Render a byte count with the largest unit that divides it exactly.
///
/// Fails when the count is not a whole number of KiB or KB, since bare byte
/// counts have no suffix in the template grammar.
pub fn from_bytes(bytes: u64) -> Result<String, ValidationError> {
    if bytes == 0 {
        return Ok("0".to_string());
    }
    SizeUnit::BY_PREFERENCE
        .iter()
        .find(|unit| bytes % unit.multiplier() == 0)
        .map(|unit| format!("{}{}", bytes / unit.multiplier(), unit.suffix()))
        .ok_or_else(|| {
            ValidationError::size(bytes.to_string(), "not a whole number of KiB or KB")
        })
}
