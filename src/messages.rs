use crate::drivers::as7265x::AS7265X_BANDS;
use crate::drivers::as726x::{AS7262_BANDS, AS7263_BANDS};
use crate::topology::{BulbMask, SensorVariant};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Header metadata common to all readings
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Header {
    /// Unique device identifier
    pub device_id: String,
    /// Mux channel the sensor sits on (0 when wired directly)
    pub channel: u8,
    pub variant: SensorVariant,
    /// Sequence number for message ordering
    pub seq: u64,
    /// UTC timestamp in nanoseconds
    pub t_utc_ns: u64,
}

impl Header {
    /// Create a new header stamped with the current time
    pub fn new(device_id: String, channel: u8, variant: SensorVariant, seq: u64) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let t_utc_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        Self { device_id, channel, variant, seq, t_utc_ns }
    }
}

/// One calibrated band
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChannelValue {
    pub band: char,
    pub wavelength_nm: u16,
    pub value: f32,
}

/// Calibrated spectrum taken on a button click
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SpectralReading {
    pub h: Header,
    /// Bulbs that were lit for this reading
    pub bulb_mask: u8,
    pub values: Vec<ChannelValue>,
}

impl SpectralReading {
    /// Pair six-band values with the band table of `variant`
    pub fn six_band(h: Header, bulb_mask: BulbMask, values: [f32; 6]) -> Self {
        let bands = match h.variant {
            SensorVariant::As7263 => &AS7263_BANDS,
            _ => &AS7262_BANDS,
        };
        let values = bands
            .iter()
            .zip(values)
            .map(|(&(band, wavelength_nm), value)| ChannelValue { band, wavelength_nm, value })
            .collect();
        Self { h, bulb_mask: bulb_mask.bits(), values }
    }

    pub fn eighteen_band(h: Header, bulb_mask: BulbMask, values: [f32; 18]) -> Self {
        let values = AS7265X_BANDS
            .iter()
            .zip(values)
            .map(|(&(band, wavelength_nm, _, _), value)| ChannelValue { band, wavelength_nm, value })
            .collect();
        Self { h, bulb_mask: bulb_mask.bits(), values }
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Human readable line: `ch2 AS7262 #7 450nm=1.00 500nm=2.00 ...`
    pub fn to_text(&self) -> String {
        let mut line = format!("ch{} {} #{}", self.h.channel, self.h.variant, self.h.seq);
        for v in &self.values {
            let _ = write!(line, " {}nm={:.2}", v.wavelength_nm, v.value);
        }
        line
    }
}
