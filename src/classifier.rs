//! Identify and bring up whatever sits at the sensor address on the
//! currently selected channel.

use crate::bus::I2cTransport;
use crate::config::DiscoverySection;
use crate::drivers::Peripherals;
use crate::errors::DriverResult;
use crate::topology::{Bulb, BulbMask, SensorVariant, TopologyEntry};
use tracing::{debug, info, warn};

/// Settings applied once to every sensor found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUp {
    pub integration_time: u8,
    pub measurement_mode: u8,
    pub bulb_current: u8,
    pub triad_bulb_current: u8,
    pub triad_integration_cycles: u8,
    pub button_debounce_ms: u16,
    pub default_bulb_mask: BulbMask,
}

impl Default for BringUp {
    fn default() -> Self {
        Self::from(&DiscoverySection::default())
    }
}

impl From<&DiscoverySection> for BringUp {
    fn from(section: &DiscoverySection) -> Self {
        Self {
            integration_time: section.integration_time,
            measurement_mode: section.measurement_mode,
            bulb_current: section.bulb_current,
            triad_bulb_current: section.triad_bulb_current,
            triad_integration_cycles: section.triad_integration_cycles,
            button_debounce_ms: section.button_debounce_ms,
            default_bulb_mask: BulbMask::from_bits(section.default_bulb_mask).unwrap_or(BulbMask::ALL),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Classifier {
    settings: BringUp,
}

impl Classifier {
    pub fn new(settings: BringUp) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BringUp {
        &self.settings
    }

    /// Classify the sensor on `channel`. The caller has already selected it.
    ///
    /// Never fails: anything that does not answer with a known version is
    /// recorded as [`SensorVariant::None`].
    pub async fn classify(
        &self,
        bus: &mut dyn I2cTransport,
        peripherals: &mut Peripherals,
        channel: u8,
    ) -> TopologyEntry {
        // The triad refuses the six-band begin but still answers the version read
        if let Err(e) = peripherals.spectral.begin(bus).await {
            debug!("[classify] ch{} six-band begin failed: {}", channel, e);
        }

        let variant = match peripherals.spectral.version_id(bus).await {
            Ok(version) => {
                debug!("[classify] ch{} hardware version {:#04x}", channel, version);
                SensorVariant::from_version(version)
            }
            Err(e) => {
                debug!("[classify] ch{} version read failed: {}", channel, e);
                SensorVariant::None
            }
        };

        let bring_up = match variant {
            SensorVariant::As7262 | SensorVariant::As7263 => self.bring_up_six_band(bus, peripherals).await,
            SensorVariant::As7265x => self.bring_up_triad(bus, peripherals).await,
            SensorVariant::None => Ok(()),
        };
        match bring_up {
            Ok(()) if variant.is_present() => {
                info!("[classify] {} device attached to port {}", variant, channel)
            }
            Ok(()) => debug!("[classify] ch{} has no recognised sensor", channel),
            Err(e) => warn!("[classify] ch{} {} bring-up incomplete: {}", channel, variant, e),
        }

        let has_button = self.bring_up_button(bus, peripherals, channel).await;

        TopologyEntry {
            variant,
            bulb_mask: self.settings.default_bulb_mask,
            integration: None,
            led_current: None,
            has_button,
        }
    }

    async fn bring_up_six_band(&self, bus: &mut dyn I2cTransport, peripherals: &mut Peripherals) -> DriverResult<()> {
        let sensor = &mut peripherals.spectral;
        sensor.set_integration_time(bus, self.settings.integration_time).await?;
        sensor.set_measurement_mode(bus, self.settings.measurement_mode).await?;
        sensor.set_bulb_current(bus, self.settings.bulb_current).await
    }

    async fn bring_up_triad(&self, bus: &mut dyn I2cTransport, peripherals: &mut Peripherals) -> DriverResult<()> {
        let sensor = &mut peripherals.triad;
        sensor.begin(bus).await?;
        for bulb in Bulb::ALL {
            sensor
                .set_bulb_current_limit(bus, self.settings.triad_bulb_current, bulb)
                .await?;
        }
        sensor.disable_indicator(bus).await?;
        sensor
            .set_integration_cycles(bus, self.settings.triad_integration_cycles)
            .await
    }

    /// The button is independent hardware and is probed whatever the sensor turned out to be
    async fn bring_up_button(&self, bus: &mut dyn I2cTransport, peripherals: &mut Peripherals, channel: u8) -> bool {
        let button = &mut peripherals.button;
        if !button.is_connected(bus).await {
            info!("[classify] ch{} no button attached", channel);
            return false;
        }

        let setup: DriverResult<()> = async {
            button.clear_event_bits(bus).await?;
            button.led_off(bus).await?;
            button.set_debounce_time(bus, self.settings.button_debounce_ms).await
        }
        .await;
        if let Err(e) = setup {
            warn!("[classify] ch{} button setup incomplete: {}", channel, e);
        }
        info!("[classify] ch{} button attached", channel);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::as726x::AS726X_ADDR;
    use crate::drivers::qwiic_button::BUTTON_ADDR;
    use crate::sim::{SimBus, SimButton, SimSpectral};

    const INT_T: u8 = 0x05;
    const LED_CONTROL: u8 = 0x07;

    async fn classify_direct(bus: &mut SimBus) -> TopologyEntry {
        let mut peripherals = Peripherals::default();
        Classifier::default().classify(bus, &mut peripherals, 0).await
    }

    #[tokio::test]
    async fn test_known_versions_map_to_variants() {
        let cases = [
            (SimSpectral::as7262(), SensorVariant::As7262),
            (SimSpectral::as7263(), SensorVariant::As7263),
            (SimSpectral::as7265x(), SensorVariant::As7265x),
            (SimSpectral::unknown(0x00), SensorVariant::None),
        ];
        for (sensor, expected) in cases {
            let mut bus = SimBus::direct();
            bus.attach_direct(AS726X_ADDR, sensor);
            assert_eq!(classify_direct(&mut bus).await.variant, expected);
        }
    }

    #[tokio::test]
    async fn test_six_band_bring_up() {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, SimSpectral::as7263());

        let entry = classify_direct(&mut bus).await;
        assert_eq!(entry.variant, SensorVariant::As7263);
        assert_eq!(entry.bulb_mask, BulbMask::ALL);

        let sim = bus.spectral(None, AS726X_ADDR).unwrap();
        assert_eq!(sim.register(0, INT_T), 150);
        assert_eq!(sim.register(0, LED_CONTROL) & 0b0011_0000, 0b0011_0000);
        assert!(sim.bulb_log().is_empty());
    }

    #[tokio::test]
    async fn test_triad_bring_up() {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, SimSpectral::as7265x());

        let entry = classify_direct(&mut bus).await;
        assert_eq!(entry.variant, SensorVariant::As7265x);

        let sim = bus.spectral(None, AS726X_ADDR).unwrap();
        assert_eq!(sim.register(0, INT_T), 150);
        for die in 0..3 {
            assert_eq!(sim.register(die, LED_CONTROL) & 0b0011_0000, 0);
        }
        assert_eq!(sim.register(0, LED_CONTROL) & 0b1, 0, "indicator left on");
    }

    #[tokio::test]
    async fn test_unknown_version_gets_no_bring_up() {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, SimSpectral::unknown(0x00));

        let entry = classify_direct(&mut bus).await;
        assert_eq!(entry, TopologyEntry { bulb_mask: BulbMask::ALL, ..TopologyEntry::empty() });
        assert_eq!(bus.spectral(None, AS726X_ADDR).unwrap().register(0, INT_T), 0);
    }

    #[tokio::test]
    async fn test_button_probed_regardless_of_sensor() {
        let mut bus = SimBus::direct();
        bus.attach_direct(BUTTON_ADDR, SimButton::clicked());

        let entry = classify_direct(&mut bus).await;
        assert_eq!(entry.variant, SensorVariant::None);
        assert!(entry.has_button);

        let button = bus.button(None, BUTTON_ADDR).unwrap();
        assert!(!button.is_click_pending(), "stale click survived bring-up");
        assert_eq!(button.debounce_ms(), 20);
    }

    #[tokio::test]
    async fn test_classification_is_idempotent() {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, SimSpectral::as7265x());
        bus.attach_direct(BUTTON_ADDR, SimButton::new());

        let first = classify_direct(&mut bus).await;
        let second = classify_direct(&mut bus).await;
        assert_eq!(first, second);
    }
}
