//! Scriptable in-memory serial port for tests and demos.
//!
//! `MockSerialPort` is handed to the code under test (it implements
//! `AsyncRead`/`AsyncWrite`); `MockInstrument` stays with the test and plays the
//! instrument side: asserting on written commands and sending response bytes,
//! split or coalesced however the test needs.
//!
//! Two unbounded channels carry the traffic. Dropping the `MockInstrument`
//! makes the port read end-of-stream and fail writes with `BrokenPipe`.
//!
//! # Example
//!
//! ```rust,ignore
//! let (port, mut instrument) = mock_serial::new();
//! let engine = ProtocolEngine::new(port, ProtocolConfig::default(), FramingConfig::default());
//!
//! let task = tokio::spawn(async move {
//!     engine.read_pressure(RuskaCommand::Pressure, Duration::from_millis(500)).await
//! });
//! instrument.expect_and_respond(b"PA\r", b"PA,100.0\r").await;
//! ```

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

const EXPECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Port side of the mock, given to the code under test.
#[derive(Debug)]
pub struct MockSerialPort {
    writes_tx: UnboundedSender<Vec<u8>>,
    reads_rx: UnboundedReceiver<Vec<u8>>,
    read_buffer: VecDeque<u8>,
}

/// Instrument side of the mock, kept by the test.
#[derive(Debug)]
pub struct MockInstrument {
    writes_rx: UnboundedReceiver<Vec<u8>>,
    reads_tx: UnboundedSender<Vec<u8>>,
    write_buffer: Vec<u8>,
}

/// Create a connected port/instrument pair.
pub fn new() -> (MockSerialPort, MockInstrument) {
    let (writes_tx, writes_rx) = mpsc::unbounded_channel();
    let (reads_tx, reads_rx) = mpsc::unbounded_channel();

    (
        MockSerialPort {
            writes_tx,
            reads_rx,
            read_buffer: VecDeque::new(),
        },
        MockInstrument {
            writes_rx,
            reads_tx,
            write_buffer: Vec::new(),
        },
    )
}

impl MockSerialPort {
    fn fill(&mut self, buf: &mut ReadBuf<'_>) {
        let n = buf.remaining().min(self.read_buffer.len());
        let (front, back) = self.read_buffer.as_slices();
        if n <= front.len() {
            buf.put_slice(&front[..n]);
        } else {
            buf.put_slice(front);
            buf.put_slice(&back[..n - front.len()]);
        }
        self.read_buffer.drain(..n);
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        // Empty chunks are skipped so that a zero-byte read only ever means EOF.
        while self.read_buffer.is_empty() {
            match self.reads_rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.read_buffer.extend(chunk),
                // Instrument dropped: end-of-stream.
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
        self.fill(buf);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.writes_tx.send(buf.to_vec()) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(_) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock instrument disconnected",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl MockInstrument {
    /// Send bytes to the port as one read chunk.
    ///
    /// # Errors
    /// Returns error if the port has been dropped.
    pub fn send_response(&self, data: &[u8]) -> Result<(), &'static str> {
        self.reads_tx
            .send(data.to_vec())
            .map_err(|_| "Failed to send response: port dropped")
    }

    /// Send `data` split into chunks of at most `chunk` bytes.
    ///
    /// # Errors
    /// Returns error if the port has been dropped.
    pub fn send_chunked(&self, data: &[u8], chunk: usize) -> Result<(), &'static str> {
        for piece in data.chunks(chunk.max(1)) {
            self.send_response(piece)?;
        }
        Ok(())
    }

    /// Wait for the port to write `expected`.
    ///
    /// # Panics
    /// Panics if the bytes do not arrive within two seconds or differ.
    pub async fn expect_write(&mut self, expected: &[u8]) {
        while self.write_buffer.len() < expected.len() {
            match tokio::time::timeout(EXPECT_TIMEOUT, self.writes_rx.recv()).await {
                Ok(Some(chunk)) => self.write_buffer.extend_from_slice(&chunk),
                Ok(None) => panic!("Port closed while expecting a write."),
                Err(_) => panic!(
                    "Timeout waiting for write. Expected `{:?}`, received `{:?}`.",
                    String::from_utf8_lossy(expected),
                    String::from_utf8_lossy(&self.write_buffer),
                ),
            }
        }

        let actual = &self.write_buffer[..expected.len()];
        assert_eq!(
            actual,
            expected,
            "Mismatch in expected write. Expected `{:?}`, got `{:?}`.",
            String::from_utf8_lossy(expected),
            String::from_utf8_lossy(actual)
        );
        self.write_buffer.drain(..expected.len());
    }

    /// Expect a command and answer it.
    ///
    /// # Panics
    /// Panics under the same conditions as [`expect_write`](Self::expect_write)
    /// or if the port is gone.
    pub async fn expect_and_respond(&mut self, expected: &[u8], response: &[u8]) {
        self.expect_write(expected).await;
        self.send_response(response)
            .unwrap_or_else(|e| panic!("{}", e));
    }

    /// Take every byte written so far without waiting.
    pub fn take_writes(&mut self) -> Vec<u8> {
        loop {
            match self.writes_rx.try_recv() {
                Ok(chunk) => self.write_buffer.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        std::mem::take(&mut self.write_buffer)
    }

    /// Discard pending writes, waiting briefly for stragglers.
    pub async fn drain_writes(&mut self) {
        let short = Duration::from_millis(50);
        while let Ok(Some(chunk)) = tokio::time::timeout(short, self.writes_rx.recv()).await {
            self.write_buffer.extend_from_slice(&chunk);
        }
        self.write_buffer.clear();
    }
}
