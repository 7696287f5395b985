//! Sensor characteristic payload decoding.
//!
//! Pure functions operating on raw `&[u8]` slices, with no BLE dependency.
//! Decoding never fails: machines occasionally report truncated payloads,
//! so missing bytes read as zero and unknown values map to a sentinel.

use serde::Serialize;
use uuid::Uuid;

use crate::attribute_value::AttributeValue;
use crate::protocol;

/// The four sensor-bearing characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    State,
    CapsNumber,
    Slider,
    WaterHardness,
}

impl SensorKind {
    /// Every sensor kind, in read order.
    pub const ALL: [Self; 4] = [
        Self::State,
        Self::CapsNumber,
        Self::Slider,
        Self::WaterHardness,
    ];

    /// Resolve the sensor kind carried by a characteristic, if any.
    #[must_use]
    pub fn from_characteristic(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.characteristic() == uuid)
    }

    /// UUID of the characteristic carrying this sensor.
    #[must_use]
    pub fn characteristic(self) -> Uuid {
        match self {
            Self::State => protocol::STATE_CHAR,
            Self::CapsNumber => protocol::CAPS_CHAR,
            Self::Slider => protocol::SLIDER_CHAR,
            Self::WaterHardness => protocol::WATER_HARDNESS_CHAR,
        }
    }

    /// Attribute key under which readings of this kind are exposed.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::CapsNumber => "caps_number",
            Self::Slider => "slider",
            Self::WaterHardness => "water_hardness",
        }
    }
}

/// Position of the capsule slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliderPosition {
    /// Slider open (`0x00`), exposed as `0`.
    Open,
    /// Slider closed (`0x02`), exposed as `1`.
    Closed,
    /// Any other payload, exposed as `"N/A"`.
    Unknown,
}

/// Machine status flags decoded from the state characteristic.
///
/// | Byte | Bit | Field |
/// |------|-----|-------|
/// | 0 | 0 | `water_is_empty` |
/// | 0 | 2 | `descaling_needed` |
/// | 0 | 4 | `capsule_mechanism_jammed` |
/// | 0 | 6 | `always_1` |
/// | 1 | 0 | `water_temp_low` |
/// | 1 | 1 | `awake` |
/// | 1 | 2 | `water_engaged` |
/// | 1 | 3 | `sleeping` |
/// | 1 | 4 | `tray_sensor_during_brewing` |
/// | 1 | 6 | `tray_open_tray_sensor_full` |
/// | 1 | 7 | `capsule_engaged` |
/// | 3 | 5 | `fault` |
///
/// Bytes 6–8 hold the descaling counter (u24 BE).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct MachineState {
    pub water_is_empty: bool,
    pub descaling_needed: bool,
    pub capsule_mechanism_jammed: bool,
    pub always_1: bool,
    pub water_temp_low: bool,
    pub awake: bool,
    pub water_engaged: bool,
    pub sleeping: bool,
    pub tray_sensor_during_brewing: bool,
    pub tray_open_tray_sensor_full: bool,
    pub capsule_engaged: bool,
    pub fault: bool,
    pub descaling_counter: u32,
}

const DESCALING_COUNTER_OFFSET: usize = 6;
const DESCALING_COUNTER_END: usize = 9;
const WATER_HARDNESS_OFFSET: usize = 2;

/// A decoded sensor value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorReading {
    State(MachineState),
    CapsNumber(u64),
    Slider(SliderPosition),
    WaterHardness(u64),
}

impl SensorReading {
    /// Convert into the value exposed in a device's attribute map.
    ///
    /// Counters above `i64::MAX` are exposed as a JSON number rather than
    /// clamped, so `ff..ff` still reads as `u64::MAX`.
    #[must_use]
    pub fn to_attribute(&self) -> AttributeValue {
        match self {
            Self::State(state) => AttributeValue::Json(
                serde_json::to_value(state).unwrap_or(serde_json::Value::Null),
            ),
            Self::CapsNumber(v) | Self::WaterHardness(v) => i64::try_from(*v).map_or_else(
                |_| AttributeValue::Json(serde_json::Value::from(*v)),
                AttributeValue::Int,
            ),
            Self::Slider(SliderPosition::Open) => AttributeValue::Int(0),
            Self::Slider(SliderPosition::Closed) => AttributeValue::Int(1),
            Self::Slider(SliderPosition::Unknown) => AttributeValue::String("N/A".to_owned()),
        }
    }
}

/// Decode a raw characteristic payload. Never fails.
#[must_use]
pub fn decode(kind: SensorKind, raw: &[u8]) -> SensorReading {
    match kind {
        SensorKind::State => SensorReading::State(decode_state(raw)),
        SensorKind::CapsNumber => SensorReading::CapsNumber(be_uint(raw)),
        SensorKind::Slider => SensorReading::Slider(decode_slider(raw)),
        SensorKind::WaterHardness => SensorReading::WaterHardness(
            raw.get(WATER_HARDNESS_OFFSET).copied().map_or(0, u64::from),
        ),
    }
}

/// Whether `decode` had to fill in or discard data for this payload.
///
/// Callers use this to log short payloads; it does not affect decoding.
#[must_use]
pub fn is_anomalous(kind: SensorKind, raw: &[u8]) -> bool {
    match kind {
        SensorKind::State => raw.len() < DESCALING_COUNTER_END,
        SensorKind::CapsNumber => raw.is_empty() || raw.len() > 8,
        SensorKind::Slider => decode_slider(raw) == SliderPosition::Unknown,
        SensorKind::WaterHardness => raw.len() <= WATER_HARDNESS_OFFSET,
    }
}

fn decode_slider(raw: &[u8]) -> SliderPosition {
    match raw {
        [0x00] => SliderPosition::Open,
        [0x02] => SliderPosition::Closed,
        _ => SliderPosition::Unknown,
    }
}

fn decode_state(raw: &[u8]) -> MachineState {
    let byte = |i: usize| raw.get(i).copied().unwrap_or(0);
    let (b0, b1, b3) = (byte(0), byte(1), byte(3));

    let end = raw.len().min(DESCALING_COUNTER_END);
    let counter = raw.get(DESCALING_COUNTER_OFFSET..end).map_or(0, be_uint);

    MachineState {
        water_is_empty: bit(b0, 0),
        descaling_needed: bit(b0, 2),
        capsule_mechanism_jammed: bit(b0, 4),
        always_1: bit(b0, 6),
        water_temp_low: bit(b1, 0),
        awake: bit(b1, 1),
        water_engaged: bit(b1, 2),
        sleeping: bit(b1, 3),
        tray_sensor_during_brewing: bit(b1, 4),
        tray_open_tray_sensor_full: bit(b1, 6),
        capsule_engaged: bit(b1, 7),
        fault: bit(b3, 5),
        // At most three bytes, always fits.
        descaling_counter: u32::try_from(counter).unwrap_or(u32::MAX),
    }
}

fn bit(byte: u8, n: u8) -> bool {
    (byte >> n) & 1 == 1
}

/// Big-endian unsigned integer over `bytes`; wider inputs keep the low 8 bytes.
fn be_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, b| acc.wrapping_shl(8) | u64::from(*b))
}
