//! GATT layout of the Prodigio machine family.
//!
//! All UUIDs share the vendor base `xxxxxxxx-f22a-11e3-9daa-0002a5d5c51b`.

use uuid::Uuid;

/// Primary service advertised by every Prodigio machine; used as the scan filter.
pub const SERVICE: Uuid = Uuid::from_u128(0x06aa_1910_f22a_11e3_9daa_0002_a5d5_c51b);

/// Machine status bit field plus descaling counter.
pub const STATE_CHAR: Uuid = Uuid::from_u128(0x06aa_3a12_f22a_11e3_9daa_0002_a5d5_c51b);

/// Remaining capsule counter.
pub const CAPS_CHAR: Uuid = Uuid::from_u128(0x06aa_3a15_f22a_11e3_9daa_0002_a5d5_c51b);

/// Capsule slider position.
pub const SLIDER_CHAR: Uuid = Uuid::from_u128(0x06aa_3a22_f22a_11e3_9daa_0002_a5d5_c51b);

/// Configured water hardness level.
pub const WATER_HARDNESS_CHAR: Uuid = Uuid::from_u128(0x06aa_3a44_f22a_11e3_9daa_0002_a5d5_c51b);

/// Authentication characteristic. The same UUID reads back the manufacturer name.
pub const AUTH_CHAR: Uuid = Uuid::from_u128(0x06aa_3a41_f22a_11e3_9daa_0002_a5d5_c51b);

/// Command characteristic accepting [`BrewCommand`](crate::command::BrewCommand) frames.
pub const COMMAND_CHAR: Uuid = Uuid::from_u128(0x06aa_3a42_f22a_11e3_9daa_0002_a5d5_c51b);

/// Local-name prefix advertised by machines of this family.
pub const LOCAL_NAME_PREFIX: &str = "Prodigio";
