//! The hub: owns the bus, the topology table and the shared drivers.
//!
//! [`SpectroHub::begin`] discovers the topology once, [`SpectroHub::poll`]
//! (in `polling.rs`) services it afterwards. Every visit to a mux port ends
//! with all ports disabled, so at most one port is ever connected.

use crate::bus::{probe_address, I2cTransport};
use crate::classifier::{BringUp, Classifier};
use crate::config::{ChannelOverride, HubConfig};
use crate::drivers::{Peripherals, PollTiming};
use crate::errors::{ConfigError, HubError, HubResult};
use crate::mux::{MuxController, MUX_CHANNELS};
use crate::report::ReportSink;
use crate::topology::{BulbMask, TopologyEntry, TopologyTable};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SpectroHub<B: I2cTransport> {
    pub(crate) bus: B,
    pub(crate) mux: MuxController,
    pub(crate) sensor_address: u8,
    pub(crate) classifier: Classifier,
    pub(crate) peripherals: Peripherals,
    pub(crate) table: TopologyTable,
    pub(crate) use_mux: bool,
    pub(crate) select_retries: u8,
    pub(crate) indicator_brightness: u8,
    pub(crate) device_id: String,
    pub(crate) sink: Box<dyn ReportSink>,
    pub(crate) seq: u64,
}

impl<B: I2cTransport> SpectroHub<B> {
    /// Hub with default addresses and bring-up settings
    pub fn new(bus: B, sink: Box<dyn ReportSink>) -> Self {
        Self::from_config(bus, &HubConfig::default(), sink)
    }

    pub fn from_config(bus: B, config: &HubConfig, sink: Box<dyn ReportSink>) -> Self {
        let timing = PollTiming {
            interval: Duration::from_millis(config.bus.handshake_poll_ms),
            ..PollTiming::default()
        };
        Self {
            bus,
            mux: MuxController::new(config.bus.mux_address),
            sensor_address: config.bus.sensor_address,
            classifier: Classifier::new(BringUp::from(&config.discovery)),
            peripherals: Peripherals::new(config.bus.sensor_address, config.bus.button_address, timing),
            table: TopologyTable::new(),
            use_mux: false,
            select_retries: config.discovery.select_retries,
            indicator_brightness: config.polling.indicator_brightness,
            device_id: config.polling.device_id.clone(),
            sink,
            seq: 0,
        }
    }

    /// Swap in other driver implementations
    pub fn with_peripherals(mut self, peripherals: Peripherals) -> Self {
        self.peripherals = peripherals;
        self
    }

    pub fn table(&self) -> &TopologyTable {
        &self.table
    }

    pub fn entry(&self, channel: u8) -> Option<&TopologyEntry> {
        self.table.entry(channel)
    }

    pub fn use_mux(&self) -> bool {
        self.use_mux
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Discover the topology and fill the table. Returns true if any sensor was found.
    ///
    /// The table is rebuilt from scratch on every call.
    pub async fn begin(&mut self) -> bool {
        self.table.reset();

        self.use_mux = probe_address(&mut self.bus, self.mux.address()).await;
        if self.use_mux {
            info!("[discovery] mux found at {:#04x}", self.mux.address());
            self.mux_scan().await;
        } else {
            info!("[discovery] no mux, scanning the direct channel");
            self.direct_scan().await;
        }

        let found = self.table.sensor_count();
        info!("[discovery] setup done, {} sensor(s) found", found);
        found > 0
    }

    async fn direct_scan(&mut self) {
        if probe_address(&mut self.bus, self.sensor_address).await {
            let entry = self.classifier.classify(&mut self.bus, &mut self.peripherals, 0).await;
            self.table.set(0, entry);
        } else {
            info!("[discovery] no sensor answering at {:#04x}", self.sensor_address);
        }
    }

    async fn mux_scan(&mut self) {
        self.release_ports().await;

        for channel in 0..MUX_CHANNELS {
            if !self.select_for_discovery(channel).await {
                warn!("[discovery] port {} could not be selected, recording no sensor", channel);
                self.release_ports().await;
                continue;
            }

            let available = probe_address(&mut self.bus, self.sensor_address).await;
            info!("[discovery] port {} available: {}", channel, available);
            if available {
                let entry = self.classifier.classify(&mut self.bus, &mut self.peripherals, channel).await;
                self.table.set(channel, entry);
            }

            self.release_ports().await;
        }
    }

    /// Select `channel`, retrying as configured. Discovery can afford the extra traffic.
    async fn select_for_discovery(&mut self, channel: u8) -> bool {
        for attempt in 0..=self.select_retries {
            match self.mux.enable_channel(&mut self.bus, channel).await {
                Ok(()) => return true,
                Err(e) => debug!("[discovery] port {} select attempt {} failed: {}", channel, attempt + 1, e),
            }
        }
        false
    }

    pub(crate) async fn release_ports(&mut self) {
        if let Err(e) = self.mux.disable_all_channels(&mut self.bus).await {
            warn!("[mux] failed to disable ports: {}", e);
        }
    }

    fn entry_for_update(&mut self, channel: u8) -> HubResult<&mut TopologyEntry> {
        self.table
            .entry_mut(channel)
            .ok_or(HubError::InvalidChannel(channel))
    }

    /// Bulbs lit while measuring on `channel`
    pub fn set_bulb_mask(&mut self, channel: u8, mask: BulbMask) -> HubResult<()> {
        self.entry_for_update(channel)?.bulb_mask = mask;
        Ok(())
    }

    /// Bulb current level (0-3) applied before each measurement on `channel`
    pub fn set_led_current(&mut self, channel: u8, level: u8) -> HubResult<()> {
        if level > 0b11 {
            return Err(HubError::Config(ConfigError::InvalidValue {
                field: "led_current".to_string(),
                reason: format!("{} is not a 2-bit level", level),
            }));
        }
        self.entry_for_update(channel)?.led_current = Some(level);
        Ok(())
    }

    /// Integration time (six-band) or cycles (triad) applied before each measurement
    pub fn set_integration(&mut self, channel: u8, value: u8) -> HubResult<()> {
        self.entry_for_update(channel)?.integration = Some(value);
        Ok(())
    }

    /// Apply `[[channel]]` overrides from the config file
    pub fn apply_overrides(&mut self, overrides: &[ChannelOverride]) -> HubResult<()> {
        for o in overrides {
            if let Some(bits) = o.bulb_mask {
                let mask = BulbMask::from_bits(bits).ok_or_else(|| {
                    HubError::Config(ConfigError::InvalidValue {
                        field: "channel.bulb_mask".to_string(),
                        reason: format!("{:#b} is wider than 3 bits", bits),
                    })
                })?;
                self.set_bulb_mask(o.index, mask)?;
            }
            if let Some(level) = o.led_current {
                self.set_led_current(o.index, level)?;
            }
            if let Some(value) = o.integration {
                self.set_integration(o.index, value)?;
            }
            debug!("[config] ch{} overrides applied", o.index);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::as726x::AS726X_ADDR;
    use crate::drivers::qwiic_button::BUTTON_ADDR;
    use crate::report::BroadcastSink;
    use crate::sim::{SimBus, SimButton, SimSpectral};
    use crate::topology::SensorVariant;

    fn hub(bus: SimBus) -> SpectroHub<SimBus> {
        SpectroHub::new(bus, Box::new(BroadcastSink::new(8)))
    }

    fn variants(hub: &SpectroHub<SimBus>) -> Vec<SensorVariant> {
        (0..MUX_CHANNELS).map(|ch| hub.table().variant(ch)).collect()
    }

    #[tokio::test]
    async fn test_direct_sensor_without_mux() {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, SimSpectral::as7263());
        let mut hub = hub(bus);

        assert!(hub.begin().await);
        assert!(!hub.use_mux());

        let mut expected = vec![SensorVariant::None; 8];
        expected[0] = SensorVariant::As7263;
        assert_eq!(variants(&hub), expected);
    }

    #[tokio::test]
    async fn test_mux_with_sensors_on_two_ports() {
        let mut bus = SimBus::with_mux();
        bus.attach(2, AS726X_ADDR, SimSpectral::as7262());
        bus.attach(5, AS726X_ADDR, SimSpectral::as7265x());
        bus.attach(5, BUTTON_ADDR, SimButton::new());
        let mut hub = hub(bus);

        assert!(hub.begin().await);
        assert!(hub.use_mux());
        assert_eq!(hub.table().occupied().map(|(ch, _)| ch).collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(hub.table().variant(2), SensorVariant::As7262);
        assert_eq!(hub.table().variant(5), SensorVariant::As7265x);
        assert!(!hub.entry(2).unwrap().has_button);
        assert!(hub.entry(5).unwrap().has_button);

        // Never more than one port at a time, and nothing left connected
        assert_eq!(hub.bus().widest_mask(), 1);
        assert_eq!(hub.bus().mux_mask(), Some(0));
    }

    #[tokio::test]
    async fn test_nothing_found() {
        let mut hub = hub(SimBus::with_mux());
        assert!(!hub.begin().await);
        assert_eq!(hub.table(), &TopologyTable::new());
    }

    #[tokio::test]
    async fn test_discovery_is_idempotent() {
        let mut bus = SimBus::with_mux();
        bus.attach(0, AS726X_ADDR, SimSpectral::as7263());
        bus.attach(0, BUTTON_ADDR, SimButton::new());
        bus.attach(7, AS726X_ADDR, SimSpectral::as7265x());
        let mut hub = hub(bus);

        assert!(hub.begin().await);
        let first = hub.table().clone();
        assert!(hub.begin().await);
        assert_eq!(hub.table(), &first);
    }

    #[tokio::test]
    async fn test_unselectable_ports_recorded_empty() {
        let mut bus = SimBus::with_mux();
        bus.attach(1, AS726X_ADDR, SimSpectral::as7262());
        bus.force_mux_readback(Some(0));
        let mut hub = hub(bus);

        assert!(!hub.begin().await);
        assert!(hub.use_mux());
        assert_eq!(variants(&hub), vec![SensorVariant::None; 8]);
    }

    #[tokio::test]
    async fn test_select_retries_are_bounded() {
        let mut bus = SimBus::with_mux();
        bus.force_mux_readback(Some(0));
        let mut hub = hub(bus);
        hub.select_retries = 0;

        hub.begin().await;
        let without_retries = hub.bus().transaction_count();

        let mut bus = SimBus::with_mux();
        bus.force_mux_readback(Some(0));
        let mut retrying = self::hub(bus);
        retrying.select_retries = 2;
        retrying.begin().await;

        // Each extra attempt is one write plus one readback per port
        assert_eq!(retrying.bus().transaction_count(), without_retries + 8 * 2 * 2);
    }

    #[tokio::test]
    async fn test_unknown_sensor_not_counted() {
        let mut bus = SimBus::direct();
        bus.attach_direct(AS726X_ADDR, SimSpectral::unknown(0x12));
        let mut hub = hub(bus);

        assert!(!hub.begin().await);
        assert_eq!(hub.table().variant(0), SensorVariant::None);
    }

    #[tokio::test]
    async fn test_channel_configuration_calls() {
        let mut hub = hub(SimBus::direct());

        hub.set_bulb_mask(3, BulbMask::UV).unwrap();
        hub.set_led_current(3, 2).unwrap();
        hub.set_integration(3, 90).unwrap();
        let entry = hub.entry(3).unwrap();
        assert_eq!(entry.bulb_mask, BulbMask::UV);
        assert_eq!(entry.led_current, Some(2));
        assert_eq!(entry.integration, Some(90));

        assert!(matches!(hub.set_bulb_mask(8, BulbMask::ALL), Err(HubError::InvalidChannel(8))));
        assert!(matches!(hub.set_led_current(0, 4), Err(HubError::Config(_))));
    }

    #[tokio::test]
    async fn test_apply_overrides() {
        let mut hub = hub(SimBus::direct());
        let overrides = vec![
            ChannelOverride { index: 1, bulb_mask: Some(0b011), led_current: None, integration: Some(40) },
            ChannelOverride { index: 6, bulb_mask: None, led_current: Some(1), integration: None },
        ];

        hub.apply_overrides(&overrides).unwrap();
        assert_eq!(hub.entry(1).unwrap().bulb_mask.bits(), 0b011);
        assert_eq!(hub.entry(1).unwrap().integration, Some(40));
        assert_eq!(hub.entry(6).unwrap().led_current, Some(1));

        let bad = vec![ChannelOverride { index: 9, bulb_mask: None, led_current: None, integration: Some(1) }];
        assert!(hub.apply_overrides(&bad).is_err());
    }
}
