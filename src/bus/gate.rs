use super::{I2cTransport, TransportError};
use tracing::{debug, warn};

/// Returns true iff `address` acknowledges a zero-length write.
///
/// A busy/unready bus is reset before returning false so a wedged line
/// recovers on its own. Any other failure is just "not there".
pub async fn probe_address(bus: &mut dyn I2cTransport, address: u8) -> bool {
    match bus.write(address, &[]).await {
        Ok(()) => true,
        Err(TransportError::Busy) => {
            warn!("[bus] {:#04x} probe hit a busy bus, resetting transport", address);
            if let Err(e) = bus.reset().await {
                warn!("[bus] transport reset failed: {}", e);
            }
            false
        }
        Err(e) => {
            debug!("[bus] {:#04x} probe failed with code {}: {}", address, e.code(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBus, SimButton};

    #[tokio::test]
    async fn test_probe_acknowledged_address() {
        let mut bus = SimBus::direct();
        bus.attach_direct(0x6F, SimButton::new());

        assert!(probe_address(&mut bus, 0x6F).await);
        assert!(!probe_address(&mut bus, 0x49).await);
        assert_eq!(bus.reset_count(), 0);
    }

    #[tokio::test]
    async fn test_busy_bus_is_reset() {
        let mut bus = SimBus::direct();
        bus.attach_direct(0x6F, SimButton::new());
        bus.inject_busy(1);

        assert!(!probe_address(&mut bus, 0x6F).await);
        assert_eq!(bus.reset_count(), 1);

        // The line is usable again after the reset.
        assert!(probe_address(&mut bus, 0x6F).await);
    }

    #[tokio::test]
    async fn test_plain_nack_does_not_reset() {
        let mut bus = SimBus::direct();
        assert!(!probe_address(&mut bus, 0x70).await);
        assert_eq!(bus.reset_count(), 0);
    }
}
