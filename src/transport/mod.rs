//! Serial transport abstractions.
//!
//! The protocol engine talks to any `AsyncRead + AsyncWrite + Unpin + Send`
//! byte stream:
//! - `tokio_serial::SerialStream` for real hardware (feature `serial`)
//! - `tokio::io::DuplexStream` or [`mock_serial::MockSerialPort`] in tests
//!
//! # Example
//!
//! ```rust,ignore
//! use pressure_integrity::transport::{open_serial_async, DynSerial};
//!
//! let port: DynSerial = Box::new(open_serial_async("/dev/ttyUSB0", 9600, "Ruska PPG").await?);
//! ```

pub mod mock_serial;

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Trait alias for async serial port I/O.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Outcome of draining pending input before a command write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainOutcome {
    /// Bytes read and thrown away.
    pub discarded: usize,
    /// The port reported end-of-stream while draining.
    pub closed: bool,
}

/// Discard bytes already pending on `port`.
///
/// Reads until nothing more arrives within `window`. A zero window still
/// collects everything that is immediately readable. I/O errors stop the drain;
/// the next real read reports them.
pub async fn drain_pending<R: AsyncRead + Unpin + ?Sized>(
    port: &mut R,
    window: Duration,
) -> DrainOutcome {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + window;
    let mut outcome = DrainOutcome::default();

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, port.read(&mut discard)).await {
            Ok(Ok(0)) => {
                outcome.closed = true;
                break;
            }
            Ok(Ok(n)) => outcome.discarded += n,
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }

    outcome
}

/// Open a serial port asynchronously using `spawn_blocking`, 8N1 without flow control.
///
/// # Errors
///
/// Returns an error if the port cannot be opened or `spawn_blocking` fails.
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| {
                format!(
                    "Failed to open {} serial port: {}",
                    device_name_owned, port_path_owned
                )
            })
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn drain_discards_stale_bytes() {
        let (mut host, mut device) = tokio::io::duplex(64);
        host.write_all(b"PA,100.0\rPA,").await.unwrap();

        let outcome = drain_pending(&mut device, Duration::from_millis(20)).await;
        assert_eq!(outcome.discarded, 12);
        assert!(!outcome.closed);

        // Nothing left to read.
        let mut buf = [0u8; 1];
        let res = tokio::time::timeout(Duration::from_millis(10), device.read(&mut buf)).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn zero_window_takes_only_ready_bytes() {
        let (mut host, mut device) = tokio::io::duplex(64);
        host.write_all(b"late").await.unwrap();
        let outcome = drain_pending(&mut device, Duration::ZERO).await;
        assert_eq!(outcome.discarded, 4);
    }

    #[tokio::test]
    async fn drain_reports_closed_port() {
        let (host, mut device) = tokio::io::duplex(64);
        drop(host);
        let outcome = drain_pending(&mut device, Duration::from_millis(10)).await;
        assert!(outcome.closed);
    }
}
