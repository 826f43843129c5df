use crate::bus::I2cTransport;
use crate::errors::{DriverResult, HubError, HubResult};
use crate::hub::SpectroHub;
use crate::messages::{Header, SpectralReading};
use crate::mux::MUX_CHANNELS;
use crate::topology::{Bulb, BulbMask, SensorVariant, TopologyEntry};
use tracing::{debug, info, warn};

/// What one polling pass did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Channels with a sensor whose button was checked for a click
    pub channels_visited: usize,
    pub select_failures: usize,
    pub clicks: usize,
    pub reports: usize,
}

impl<B: I2cTransport> SpectroHub<B> {
    /// One pass over all channels. Measures only where a click is pending.
    ///
    /// Every channel holding a sensor has its button queried, whether or not
    /// the button answered during discovery. Failures are logged and
    /// skipped; the next pass is the retry.
    pub async fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();

        for channel in 0..MUX_CHANNELS {
            if self.use_mux {
                if let Err(e) = self.mux.enable_channel(&mut self.bus, channel).await {
                    debug!("[poll] ch{} select failed: {}", channel, e);
                    summary.select_failures += 1;
                    self.release_ports().await;
                    continue;
                }
            }

            let entry = self.table.entry(channel).copied().unwrap_or_default();
            if entry.is_present() {
                summary.channels_visited += 1;
                self.service_channel(channel, &entry, &mut summary).await;
            }

            if self.use_mux {
                self.release_ports().await;
            }
        }

        summary
    }

    async fn service_channel(&mut self, channel: u8, entry: &TopologyEntry, summary: &mut PollSummary) {
        let clicked = match self.peripherals.button.has_been_clicked(&mut self.bus).await {
            Ok(clicked) => clicked,
            Err(e) => {
                debug!("[poll] ch{} button check failed: {}", channel, e);
                return;
            }
        };
        if !clicked {
            return;
        }

        summary.clicks += 1;
        info!("[poll] ch{} button clicked", channel);

        let button = &mut self.peripherals.button;
        if let Err(e) = button.led_on(&mut self.bus, self.indicator_brightness).await {
            warn!("[poll] ch{} indicator on failed: {}", channel, e);
        }
        if let Err(e) = button.clear_event_bits(&mut self.bus).await {
            warn!("[poll] ch{} clearing click failed: {}", channel, e);
        }

        match self.measure_and_report(channel, entry).await {
            Ok(_) => summary.reports += 1,
            Err(e) => warn!("[poll] ch{} measurement failed: {}", channel, e),
        }

        if let Err(e) = self.peripherals.button.led_off(&mut self.bus).await {
            warn!("[poll] ch{} indicator off failed: {}", channel, e);
        }
    }

    /// Measure the sensor on `channel` (already selected) and publish the reading
    pub async fn measure_and_report(&mut self, channel: u8, entry: &TopologyEntry) -> HubResult<SpectralReading> {
        let header = Header::new(self.device_id.clone(), channel, entry.variant, self.seq + 1);

        let reading = match entry.variant {
            SensorVariant::As7262 | SensorVariant::As7263 => {
                let lit = if entry.bulb_mask.contains(Bulb::White) {
                    BulbMask::WHITE
                } else {
                    BulbMask::NONE
                };
                let values = self.measure_six_band(entry, lit).await?;
                SpectralReading::six_band(header, lit, values)
            }
            SensorVariant::As7265x => {
                let values = self.measure_triad(entry).await?;
                SpectralReading::eighteen_band(header, entry.bulb_mask, values)
            }
            SensorVariant::None => return Err(HubError::NoSensor(channel)),
        };

        self.seq = reading.h.seq;
        info!("[poll] ch{} {} reading #{}", channel, entry.variant, reading.h.seq);
        debug!("[poll] {}", reading.to_text());
        if let Err(e) = self.sink.publish(&reading).await {
            warn!("[report] ch{} publish failed: {}", channel, e);
        }
        Ok(reading)
    }

    async fn measure_six_band(&mut self, entry: &TopologyEntry, lit: BulbMask) -> DriverResult<[f32; 6]> {
        let sensor = &mut self.peripherals.spectral;
        let bus: &mut dyn I2cTransport = &mut self.bus;
        let bulb = lit.contains(Bulb::White);

        if let Some(value) = entry.integration {
            sensor.set_integration_time(bus, value).await?;
        }
        if let Some(level) = entry.led_current {
            sensor.set_bulb_current(bus, level).await?;
        }

        let result = async {
            if bulb {
                sensor.enable_bulb(bus).await?;
            }
            sensor.take_measurement(bus).await?;
            sensor.calibrated_channels(bus).await
        }
        .await;

        if bulb {
            if let Err(e) = sensor.disable_bulb(bus).await {
                warn!("[poll] bulb left on: {}", e);
            }
        }
        result
    }

    async fn measure_triad(&mut self, entry: &TopologyEntry) -> DriverResult<[f32; 18]> {
        let sensor = &mut self.peripherals.triad;
        let bus: &mut dyn I2cTransport = &mut self.bus;

        if let Some(cycles) = entry.integration {
            sensor.set_integration_cycles(bus, cycles).await?;
        }

        let result = async {
            for bulb in entry.bulb_mask.bulbs() {
                if let Some(level) = entry.led_current {
                    sensor.set_bulb_current_limit(bus, level, bulb).await?;
                }
                sensor.enable_bulb(bus, bulb).await?;
            }
            sensor.take_measurement(bus).await?;
            sensor.calibrated_channels(bus).await
        }
        .await;

        for bulb in entry.bulb_mask.bulbs() {
            if let Err(e) = sensor.disable_bulb(bus, bulb).await {
                warn!("[poll] {:?} bulb left on: {}", bulb, e);
            }
        }
        result
    }
}
