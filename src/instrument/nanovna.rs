use std::io::{ErrorKind, Read, Write};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, warn};
use serialport::{ClearBuffer, SerialPort};

use super::{DataChannel, Instrument, InstrumentError};

/// Marks the end of every shell response.
pub const PROMPT: &[u8] = b"ch> ";

const SCAN_VERSION: Version = Version(0, 2, 0);

/// Byte stream to a device. Serial ports can drop stale input before a
/// command is sent.
pub trait Port: Read + Write + Send {
    fn drain(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for Box<dyn SerialPort> {
    fn drain(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(std::io::Error::from)
    }
}

/// Leading `major.minor.patch` of a firmware version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version(pub u32, pub u32, pub u32);

impl Version {
    pub fn parse(text: &str) -> Version {
        let start = text.find(|c: char| c.is_ascii_digit()).unwrap_or(text.len());
        let mut parts = text[start..]
            .split(|c: char| !c.is_ascii_digit())
            .take(3)
            .map(|p| p.parse().unwrap_or(0));
        Version(
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        )
    }
}

pub struct NanoVna<P: Port = Box<dyn SerialPort>> {
    port: Mutex<Option<P>>,
    version: Version,
    use_scan: bool,
    validate_input: bool,
    sweep_settle: Duration,
}

impl NanoVna<Box<dyn SerialPort>> {
    pub fn connect(path: &str, baud_rate: u32) -> Result<Self, InstrumentError> {
        info!("Opening serial port {} at {} baud", path, baud_rate);
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(500))
            .open()?;
        NanoVna::with_port(port)
    }
}

impl<P: Port> NanoVna<P> {
    /// Wraps an open byte stream and probes the firmware version to pick the
    /// sweep command.
    pub fn with_port(port: P) -> Result<Self, InstrumentError> {
        let mut vna = NanoVna {
            port: Mutex::new(Some(port)),
            version: Version::default(),
            use_scan: false,
            validate_input: true,
            sweep_settle: Duration::from_secs(1),
        };

        let version_string = vna
            .exchange("version")?
            .into_iter()
            .next()
            .unwrap_or_default();
        vna.version = Version::parse(&version_string);
        debug!("Found version info: {}", version_string);

        if version_string.contains("extended with scan") {
            debug!("Incompatible scan command detected.");
            vna.use_scan = false;
        } else if vna.version >= SCAN_VERSION {
            debug!("Newer than 0.2.0, using new scan command.");
            vna.use_scan = true;
        } else {
            debug!("Older than 0.2.0, using old sweep command.");
            vna.use_scan = false;
        }
        info!("Connected to NanoVNA firmware {}", version_string);
        Ok(vna)
    }

    pub fn set_validate_input(&mut self, validate: bool) {
        self.validate_input = validate;
    }

    /// Pause after a `sweep` command on firmware without `scan`.
    pub fn set_sweep_settle(&mut self, settle: Duration) {
        self.sweep_settle = settle;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn uses_scan(&self) -> bool {
        self.use_scan
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<P>>, InstrumentError> {
        self.port
            .lock()
            .map_err(|_| InstrumentError::Protocol("serial port lock poisoned".to_string()))
    }

    /// Sends one command and collects its response up to the prompt. The
    /// echoed command and the prompt are not returned.
    fn exchange(&self, command: &str) -> Result<Vec<String>, InstrumentError> {
        let mut guard = self.lock()?;
        let port = guard.as_mut().ok_or(InstrumentError::NotConnected)?;

        port.drain()?;
        port.write_all(format!("{command}\r").as_bytes())?;
        port.flush()?;

        let mut response = Vec::new();
        let mut buf = [0u8; 512];
        while !response.ends_with(PROMPT) {
            match port.read(&mut buf) {
                Ok(0) => {
                    return Err(InstrumentError::Protocol(format!(
                        "port closed while reading '{command}'"
                    )))
                }
                Ok(n) => response.extend_from_slice(&buf[..n]),
                // A silent device stalls here; there is no overall timeout.
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                    continue
                }
                Err(e) => return Err(e.into()),
            }
        }
        drop(guard);

        let text = String::from_utf8_lossy(&response[..response.len() - PROMPT.len()]);
        let lines: Vec<String> = text
            .lines()
            .skip(1)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        debug!("VNA done reading {} ({} values)", command, lines.len());
        Ok(lines)
    }
}

impl<P: Port> Instrument for NanoVna<P> {
    fn connected(&self) -> bool {
        self.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    fn disconnect(&self) {
        if let Ok(mut port) = self.lock() {
            if port.take().is_some() {
                info!("Disconnected from NanoVNA");
            }
        }
    }

    fn validate_input(&self) -> bool {
        self.validate_input
    }

    fn set_sweep(&self, start: u64, stop: u64, points: usize) -> Result<(), InstrumentError> {
        if self.use_scan {
            self.exchange(&format!("scan {start} {stop} {points}"))?;
        } else {
            self.exchange(&format!("sweep {start} {stop} {points}"))?;
            sleep(self.sweep_settle);
        }
        Ok(())
    }

    fn reset_sweep(&self, start: u64, stop: u64, points: usize) -> Result<(), InstrumentError> {
        self.exchange(&format!("sweep {start} {stop} {points}"))?;
        self.exchange("resume")?;
        Ok(())
    }

    fn read_frequencies(&self) -> Result<Vec<u64>, InstrumentError> {
        let lines = self.exchange("frequencies")?;
        Ok(lines
            .iter()
            .filter_map(|l| match l.parse() {
                Ok(f) => Some(f),
                Err(_) => {
                    warn!("Ignoring unparsable frequency '{}'", l);
                    None
                }
            })
            .collect())
    }

    fn read_values(&self, channel: DataChannel) -> Result<Vec<String>, InstrumentError> {
        debug!("VNA reading {}", channel);
        self.exchange(channel.command())
    }

    fn read_firmware(&self) -> Result<String, InstrumentError> {
        Ok(self.exchange("info")?.join("\n"))
    }
}
