//! USB serial transport
//!
//! The device is located by USB product string and serial number, so the
//! configuration survives port renumbering. Payloads are length-prefixed in
//! both directions, see [`super::framing`].
//!
//! Port enumeration, opening and writes are blocking calls; they run on the
//! blocking pool so a slow device never stalls the event loop.

use super::framing::{encode_frame, FrameDecoder};
use super::{Connection, FrameSender};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serialport::{FlowControl, SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Reader poll interval, bounds how long disconnect waits for the thread
const READ_POLL: Duration = Duration::from_millis(50);

/// USB serial device parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialParams {
    /// USB product string
    pub product: String,
    /// USB serial number
    pub serial_number: String,
    /// Baud rate
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    /// Write timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f32,
}

fn default_baudrate() -> u32 {
    115200
}
fn default_timeout() -> f32 {
    5.0
}

/// Write half shared with the blocking pool
type SharedWriter<W> = Arc<Mutex<Option<Box<W>>>>;

/// Length-prefixed serial link to one device
pub struct SerialConnection {
    params: SerialParams,
    writer: SharedWriter<dyn SerialPort>,
    reader: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

impl SerialConnection {
    pub fn new(params: SerialParams) -> Self {
        Self {
            params,
            writer: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Find the port whose USB descriptor matches product and serial number
    pub fn find_port(&self) -> Result<String> {
        find_port(&self.params.product, &self.params.serial_number)
    }

    fn write_timeout(&self) -> Duration {
        Duration::try_from_secs_f32(self.params.timeout).unwrap_or(Duration::from_secs(5))
    }
}

fn find_port(product: &str, serial_number: &str) -> Result<String> {
    for port in serialport::available_ports()? {
        if let SerialPortType::UsbPort(info) = &port.port_type {
            log::trace!(
                "Serial candidate {}: {:?} #{:?}",
                port.port_name,
                info.product,
                info.serial_number
            );
            if info.product.as_deref() == Some(product)
                && info.serial_number.as_deref() == Some(serial_number)
            {
                return Ok(port.port_name);
            }
        }
    }
    Err(Error::DeviceNotFound {
        product: product.to_string(),
        serial_number: serial_number.to_string(),
    })
}

/// Write one frame from the blocking pool
///
/// The lock is held for the whole frame so frames never interleave.
async fn write_frame<W>(writer: SharedWriter<W>, frame: Vec<u8>) -> Result<()>
where
    W: Write + Send + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut writer = writer.lock();
        let port = writer.as_mut().ok_or(Error::NotConnected)?;
        port.write_all(&frame)?;
        port.flush()?;
        Ok(())
    })
    .await
    .map_err(|e| Error::Other(format!("Serial write task failed: {}", e)))?
}

/// Blocking read loop: feed the decoder, forward complete payloads
fn reader_loop(
    mut port: Box<dyn SerialPort>,
    shutdown: Arc<AtomicBool>,
    frames: FrameSender,
    name: String,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 256];

    while !shutdown.load(Ordering::Relaxed) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for frame in decoder.push(&buf[..n]) {
                    if frames.send(frame).is_err() {
                        return;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("{}: read error: {}", name, e);
                break;
            }
        }
    }
    log::debug!("{}: reader stopped", name);
}

#[async_trait]
impl Connection for SerialConnection {
    async fn connect(&self, frames: FrameSender) -> Result<()> {
        self.disconnect().await?;

        let product = self.params.product.clone();
        let serial_number = self.params.serial_number.clone();
        let baudrate = self.params.baudrate;
        let timeout = self.write_timeout();
        let (path, writer, reader) = tokio::task::spawn_blocking(move || -> Result<_> {
            let path = find_port(&product, &serial_number)?;
            let writer = serialport::new(&path, baudrate)
                .flow_control(FlowControl::None)
                .timeout(timeout)
                .open()?;
            let mut reader = writer.try_clone()?;
            reader.set_timeout(READ_POLL)?;
            Ok((path, writer, reader))
        })
        .await
        .map_err(|e| Error::Other(format!("Serial open task failed: {}", e)))??;
        log::info!("Opened serial port: {} at {} baud", path, self.params.baudrate);

        self.shutdown.store(false, Ordering::Relaxed);

        let shutdown = Arc::clone(&self.shutdown);
        let name = self.describe();
        let handle = std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || reader_loop(reader, shutdown, frames, name))?;

        *self.writer.lock() = Some(writer);
        *self.reader.lock() = Some(handle);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        let writer = Arc::clone(&self.writer);
        let handle = self.reader.lock().take();
        // Waits out any in-flight write before the port is dropped
        tokio::task::spawn_blocking(move || {
            writer.lock().take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    log::error!("Serial reader thread panicked");
                }
            }
        })
        .await
        .map_err(|e| Error::Other(format!("Serial reader join failed: {}", e)))
    }

    fn is_connected(&self) -> bool {
        // Locked means a write is in flight
        self.writer.try_lock().map_or(true, |w| w.is_some())
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        let frame = encode_frame(data)?;
        write_frame(Arc::clone(&self.writer), frame).await
    }

    fn describe(&self) -> String {
        format!(
            "serial:{}#{}@{}",
            self.params.product, self.params.serial_number, self.params.baudrate
        )
    }
}
