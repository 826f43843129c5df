use crate::mux::MUX_CHANNELS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version register value of an AS7262 (visible, six bands)
pub const AS7262_CODE: u8 = 0x3E;
/// Version register value of an AS7263 (near infrared, six bands)
pub const AS7263_CODE: u8 = 0x3F;
/// Version register value of an AS7265x triad (eighteen bands)
pub const AS7265X_CODE: u8 = 0x41;

/// Sensor family attached to a channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorVariant {
    #[default]
    None,
    As7262,
    As7263,
    As7265x,
}

impl SensorVariant {
    /// Closed classification of a version identifier. Anything unknown is `None`.
    pub fn from_version(version: u8) -> Self {
        match version {
            AS7262_CODE => SensorVariant::As7262,
            AS7263_CODE => SensorVariant::As7263,
            AS7265X_CODE => SensorVariant::As7265x,
            _ => SensorVariant::None,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, SensorVariant::None)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensorVariant::None => "none",
            SensorVariant::As7262 => "AS7262",
            SensorVariant::As7263 => "AS7263",
            SensorVariant::As7265x => "AS7265x",
        }
    }
}

impl fmt::Display for SensorVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Illumination bulbs a sensor may drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bulb {
    White,
    Ir,
    Uv,
}

impl Bulb {
    pub const ALL: [Bulb; 3] = [Bulb::White, Bulb::Ir, Bulb::Uv];

    /// Bit of this bulb inside a [`BulbMask`]
    pub fn bit(&self) -> u8 {
        match self {
            Bulb::White => 0b001,
            Bulb::Ir => 0b010,
            Bulb::Uv => 0b100,
        }
    }
}

/// 3-bit bulb enable flags. Six-band sensors own a single bulb driven by `WHITE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulbMask(u8);

impl BulbMask {
    pub const NONE: BulbMask = BulbMask(0);
    pub const WHITE: BulbMask = BulbMask(0b001);
    pub const IR: BulbMask = BulbMask(0b010);
    pub const UV: BulbMask = BulbMask(0b100);
    pub const ALL: BulbMask = BulbMask(0b111);

    /// Build a mask from raw bits, `None` if anything above bit 2 is set
    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits & !Self::ALL.0 == 0).then_some(BulbMask(bits))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, bulb: Bulb) -> bool {
        self.0 & bulb.bit() != 0
    }

    /// Bulbs flagged in this mask, in White/IR/UV order
    pub fn bulbs(&self) -> impl Iterator<Item = Bulb> + '_ {
        Bulb::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

impl Default for BulbMask {
    fn default() -> Self {
        BulbMask::NONE
    }
}

/// Per-channel record of what was found and how it is configured
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TopologyEntry {
    pub variant: SensorVariant,
    pub bulb_mask: BulbMask,
    /// Integration override applied before each measurement
    pub integration: Option<u8>,
    /// Bulb current override applied before each measurement
    pub led_current: Option<u8>,
    /// A button accessory answered during classification
    pub has_button: bool,
}

impl TopologyEntry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_present(&self) -> bool {
        self.variant.is_present()
    }
}

/// Fixed 8-slot table, one slot per mux channel. Slot 0 doubles as the direct channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TopologyTable {
    entries: [TopologyEntry; MUX_CHANNELS as usize],
}

impl TopologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every classification and override
    pub fn reset(&mut self) {
        self.entries = [TopologyEntry::empty(); MUX_CHANNELS as usize];
    }

    pub fn entry(&self, channel: u8) -> Option<&TopologyEntry> {
        self.entries.get(channel as usize)
    }

    pub fn entry_mut(&mut self, channel: u8) -> Option<&mut TopologyEntry> {
        self.entries.get_mut(channel as usize)
    }

    pub fn set(&mut self, channel: u8, entry: TopologyEntry) {
        if let Some(slot) = self.entries.get_mut(channel as usize) {
            *slot = entry;
        }
    }

    pub fn variant(&self, channel: u8) -> SensorVariant {
        self.entry(channel).map(|e| e.variant).unwrap_or_default()
    }

    /// Channels holding a classified sensor, ascending
    pub fn occupied(&self) -> impl Iterator<Item = (u8, &TopologyEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_present())
            .map(|(i, e)| (i as u8, e))
    }

    pub fn sensor_count(&self) -> usize {
        self.occupied().count()
    }
}
