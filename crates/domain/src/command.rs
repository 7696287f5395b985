//! Brew command encoding.
//!
//! A brew command is a 10-byte frame written to the command
//! characteristic:
//!
//! | Bytes | Value | Meaning |
//! |-------|-------|---------|
//! | 0–7 | `03 05 07 04 00 00 00 00` | Brew opcode |
//! | 8 | `00` | Temperature (reserved, always zero on Prodigio) |
//! | 9 | `00`/`01`/`02` | Volume |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fixed opcode prefix of every brew command.
pub const BREW_PREFIX: [u8; 8] = [0x03, 0x05, 0x07, 0x04, 0x00, 0x00, 0x00, 0x00];

/// Temperature byte; the Prodigio family ignores it.
const DEFAULT_TEMPERATURE: u8 = 0x00;

/// Cup size selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Volume {
    Ristretto,
    Espresso,
    #[default]
    Lungo,
}

impl Volume {
    /// Every selectable volume.
    pub const ALL: [Self; 3] = [Self::Ristretto, Self::Espresso, Self::Lungo];

    /// Wire byte for this volume.
    #[must_use]
    pub fn byte(self) -> u8 {
        match self {
            Self::Ristretto => 0x00,
            Self::Espresso => 0x01,
            Self::Lungo => 0x02,
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ristretto => "Ristretto",
            Self::Espresso => "Espresso",
            Self::Lungo => "Lungo",
        })
    }
}

impl FromStr for Volume {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownVolume(s.to_owned()))
    }
}

/// A brew command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrewCommand {
    pub volume: Volume,
}

impl BrewCommand {
    /// Encoded frame length in bytes.
    pub const LEN: usize = 10;

    #[must_use]
    pub fn new(volume: Volume) -> Self {
        Self { volume }
    }

    /// Encode the command frame.
    #[must_use]
    pub fn encode(self) -> [u8; Self::LEN] {
        let mut frame = [0u8; Self::LEN];
        frame[..BREW_PREFIX.len()].copy_from_slice(&BREW_PREFIX);
        frame[8] = DEFAULT_TEMPERATURE;
        frame[9] = self.volume.byte();
        frame
    }
}

/// Encode a brew command for `volume`.
#[must_use]
pub fn encode_brew(volume: Volume) -> [u8; BrewCommand::LEN] {
    BrewCommand::new(volume).encode()
}
