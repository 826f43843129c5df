//! Eight-port I2C multiplexer (TCA9548A-style) channel selection.
//!
//! The device exposes a single 8-bit channel-enable register. Writing a mask
//! connects the matching downstream ports; reading returns the latched mask.
//! The mask is never cached here: the chip is the only source of truth.

use crate::bus::I2cTransport;
use crate::errors::MuxError;
use tracing::{debug, warn};

/// Default address of the multiplexer
pub const MUX_ADDR: u8 = 0x70;
/// Number of downstream ports
pub const MUX_CHANNELS: u8 = 8;
/// Returned by [`MuxController::get_settings`] when the mux did not answer
pub const SETTINGS_UNAVAILABLE: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxController {
    address: u8,
}

impl Default for MuxController {
    fn default() -> Self {
        Self::new(MUX_ADDR)
    }
}

impl MuxController {
    pub fn new(address: u8) -> Self {
        Self { address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Connect port `channel` and nothing else, then verify the latch.
    ///
    /// The mask is written outright rather than OR-ed into the current one,
    /// and read back afterwards because some chips silently fail to latch.
    pub async fn enable_channel(&self, bus: &mut dyn I2cTransport, channel: u8) -> Result<(), MuxError> {
        if channel >= MUX_CHANNELS {
            warn!("[mux] enable_channel: port {} rejected, must be 7 or less", channel);
            return Err(MuxError::InvalidChannel(channel));
        }

        let mask = 1u8 << channel;
        bus.write(self.address, &[mask]).await?;

        let read = self.read_settings(bus).await.ok_or(MuxError::SettingsUnavailable)?;
        if read != mask {
            debug!("[mux] port {} failed to latch: wrote {:#010b}, read {:#010b}", channel, mask, read);
            return Err(MuxError::VerifyMismatch { wrote: mask, read });
        }
        Ok(())
    }

    /// Disconnect every downstream port
    pub async fn disable_all_channels(&self, bus: &mut dyn I2cTransport) -> Result<(), MuxError> {
        bus.write(self.address, &[0]).await?;
        Ok(())
    }

    /// Current channel-enable register, or `None` if the mux stayed silent
    pub async fn read_settings(&self, bus: &mut dyn I2cTransport) -> Option<u8> {
        let mut buf = [0u8; 1];
        match bus.read(self.address, &mut buf).await {
            Ok(()) => Some(buf[0]),
            Err(e) => {
                debug!("[mux] settings read failed: {}", e);
                None
            }
        }
    }

    /// Current channel-enable register with [`SETTINGS_UNAVAILABLE`] standing in for silence
    pub async fn get_settings(&self, bus: &mut dyn I2cTransport) -> u8 {
        self.read_settings(bus).await.unwrap_or(SETTINGS_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    #[tokio::test]
    async fn test_enable_each_channel_latches_single_bit() {
        let mut bus = SimBus::with_mux();
        let mux = MuxController::default();

        for n in 0..MUX_CHANNELS {
            assert_eq!(mux.enable_channel(&mut bus, n).await, Ok(()));
            assert_eq!(mux.get_settings(&mut bus).await, 1 << n);
        }
    }

    #[tokio::test]
    async fn test_enable_overwrites_previous_mask() {
        let mut bus = SimBus::with_mux();
        let mux = MuxController::default();

        mux.enable_channel(&mut bus, 2).await.unwrap();
        mux.enable_channel(&mut bus, 6).await.unwrap();
        assert_eq!(mux.get_settings(&mut bus).await, 0b0100_0000);
    }

    #[tokio::test]
    async fn test_forced_readback_mismatch_fails() {
        let mut bus = SimBus::with_mux();
        bus.force_mux_readback(Some(0x00));
        let mux = MuxController::default();

        assert_eq!(
            mux.enable_channel(&mut bus, 3).await,
            Err(MuxError::VerifyMismatch { wrote: 0b1000, read: 0 })
        );
    }

    #[tokio::test]
    async fn test_failed_latch_is_detected() {
        let mut bus = SimBus::with_mux();
        let mux = MuxController::default();
        mux.enable_channel(&mut bus, 1).await.unwrap();

        bus.set_mux_latch_fault(true);
        assert_eq!(
            mux.enable_channel(&mut bus, 4).await,
            Err(MuxError::VerifyMismatch { wrote: 0b1_0000, read: 0b10 })
        );
    }

    #[tokio::test]
    async fn test_out_of_range_channel_touches_nothing() {
        let mut bus = SimBus::with_mux();
        let mux = MuxController::default();

        for n in [8u8, 9, 200] {
            assert_eq!(mux.enable_channel(&mut bus, n).await, Err(MuxError::InvalidChannel(n)));
        }
        assert_eq!(bus.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_disable_all_clears_mask() {
        let mut bus = SimBus::with_mux();
        let mux = MuxController::default();

        mux.enable_channel(&mut bus, 5).await.unwrap();
        mux.disable_all_channels(&mut bus).await.unwrap();
        assert_eq!(mux.get_settings(&mut bus).await, 0);
    }

    #[tokio::test]
    async fn test_missing_mux_reports_sentinel() {
        let mut bus = SimBus::direct();
        let mux = MuxController::default();

        assert_eq!(mux.get_settings(&mut bus).await, SETTINGS_UNAVAILABLE);
        assert!(matches!(
            mux.enable_channel(&mut bus, 0).await,
            Err(MuxError::Transport(_))
        ));
    }
}
