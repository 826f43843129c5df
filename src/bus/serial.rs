use std::io;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

/// Serial link to the desktop host that consumes measurement reports
pub struct SerialLink {
    port: SerialStream,
    /// Port path - useful for logging and error messages
    path: String,
}

impl SerialLink {
    /// Open a serial link with a custom baud rate
    pub fn new_with_baud(path: &str, baud_rate: u32) -> io::Result<Self> {
        let port = tokio_serial::new(path, baud_rate).open_native_async()?;
        info!("[SerialLink] opened {} at {} baud", path, baud_rate);

        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Consume self and return the underlying SerialStream
    pub fn into_stream(self) -> SerialStream {
        self.port
    }
}
