// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC data-access quality decoding.
//!
//! The DA quality word is a byte laid out as `QQSSSSLL`: two major quality
//! bits, four substatus bits and two limit bits. [`Quality::from_bits`]
//! masks the limit bits and maps the remainder through the documented
//! table; unknown substatus combinations fall back to their major quality.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Quality
// =============================================================================

/// Quality indicator attached to a sampled tag value.
///
/// The `Error` variant is not part of the wire encoding. It marks result
/// rows for tags that produced no usable value (failed validation, failed
/// add, per-tag read error or missing callback data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Good quality, value is usable.
    Good,

    /// Good with a local override in effect.
    GoodLocalOverride,

    /// Uncertain quality, value may be usable.
    Uncertain,

    /// Uncertain, last usable value.
    UncertainLastUsable,

    /// Uncertain, sensor not accurate.
    UncertainSensorNotAccurate,

    /// Uncertain, engineering units exceeded.
    UncertainEUExceeded,

    /// Uncertain, value from multiple sources with fewer than required good.
    UncertainSubNormal,

    /// Bad quality, value should not be used.
    #[default]
    Bad,

    /// Bad, configuration error.
    BadConfigError,

    /// Bad, not connected.
    BadNotConnected,

    /// Bad, device failure.
    BadDeviceFailure,

    /// Bad, sensor failure.
    BadSensorFailure,

    /// Bad, last known value.
    BadLastKnownValue,

    /// Bad, communication failure.
    BadCommFailure,

    /// Bad, out of service.
    BadOutOfService,

    /// No usable value for this tag.
    Error,
}

impl Quality {
    /// Decodes a DA quality word.
    ///
    /// Limit bits (the low two) are ignored; only the low byte of the word
    /// is significant.
    pub fn from_bits(bits: u16) -> Self {
        match bits as u8 & 0xFC {
            0xC0 => Self::Good,
            0xD8 => Self::GoodLocalOverride,
            0x40 => Self::Uncertain,
            0x44 => Self::UncertainLastUsable,
            0x50 => Self::UncertainSensorNotAccurate,
            0x54 => Self::UncertainEUExceeded,
            0x58 => Self::UncertainSubNormal,
            0x00 => Self::Bad,
            0x04 => Self::BadConfigError,
            0x08 => Self::BadNotConnected,
            0x0C => Self::BadDeviceFailure,
            0x10 => Self::BadSensorFailure,
            0x14 => Self::BadLastKnownValue,
            0x18 => Self::BadCommFailure,
            0x1C => Self::BadOutOfService,
            // Unknown substatus: fall back to the major quality bits.
            other => match other >> 6 {
                0b11 => Self::Good,
                0b01 => Self::Uncertain,
                _ => Self::Bad,
            },
        }
    }

    /// Encodes this quality back to its DA quality word.
    ///
    /// `Error` has no wire encoding and maps to plain `Bad`.
    pub fn bits(&self) -> u16 {
        match self {
            Self::Good => 0xC0,
            Self::GoodLocalOverride => 0xD8,
            Self::Uncertain => 0x40,
            Self::UncertainLastUsable => 0x44,
            Self::UncertainSensorNotAccurate => 0x50,
            Self::UncertainEUExceeded => 0x54,
            Self::UncertainSubNormal => 0x58,
            Self::Bad | Self::Error => 0x00,
            Self::BadConfigError => 0x04,
            Self::BadNotConnected => 0x08,
            Self::BadDeviceFailure => 0x0C,
            Self::BadSensorFailure => 0x10,
            Self::BadLastKnownValue => 0x14,
            Self::BadCommFailure => 0x18,
            Self::BadOutOfService => 0x1C,
        }
    }

    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good | Self::GoodLocalOverride)
    }

    /// Returns `true` if the quality is uncertain.
    #[inline]
    pub fn is_uncertain(&self) -> bool {
        matches!(
            self,
            Self::Uncertain
                | Self::UncertainLastUsable
                | Self::UncertainSensorNotAccurate
                | Self::UncertainEUExceeded
                | Self::UncertainSubNormal
        )
    }

    /// Returns `true` if the quality is bad or marks a read error.
    #[inline]
    pub fn is_bad(&self) -> bool {
        !self.is_good() && !self.is_uncertain()
    }

    /// Returns `true` if the value is usable (good or uncertain).
    #[inline]
    pub fn is_usable(&self) -> bool {
        !self.is_bad()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "Good"),
            Self::GoodLocalOverride => write!(f, "Good (Local Override)"),
            Self::Uncertain => write!(f, "Uncertain"),
            Self::UncertainLastUsable => write!(f, "Uncertain (Last Usable)"),
            Self::UncertainSensorNotAccurate => write!(f, "Uncertain (Sensor Not Accurate)"),
            Self::UncertainEUExceeded => write!(f, "Uncertain (EU Exceeded)"),
            Self::UncertainSubNormal => write!(f, "Uncertain (Sub-Normal)"),
            Self::Bad => write!(f, "Bad"),
            Self::BadConfigError => write!(f, "Bad (Configuration Error)"),
            Self::BadNotConnected => write!(f, "Bad (Not Connected)"),
            Self::BadDeviceFailure => write!(f, "Bad (Device Failure)"),
            Self::BadSensorFailure => write!(f, "Bad (Sensor Failure)"),
            Self::BadLastKnownValue => write!(f, "Bad (Last Known Value)"),
            Self::BadCommFailure => write!(f, "Bad (Comm Failure)"),
            Self::BadOutOfService => write!(f, "Bad (Out of Service)"),
            Self::Error => write!(f, "Error"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
