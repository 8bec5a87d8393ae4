//! GPIO output drivers for the relay line.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Electrical level on the relay line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    /// Level that puts the relay into `on`, honoring polarity.
    pub fn for_state(on: bool, active_low: bool) -> Self {
        if on != active_low {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

/// Error writing the relay line.
#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("GPIO {pin} unavailable: {source}")]
    Io {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("GPIO {0} rejected the write")]
    Rejected(u32),
}

/// An output line that can drive the relay coil.
pub trait RelayPin: Send + std::fmt::Debug {
    /// Drive the line to `level`.
    fn write(&mut self, level: PinLevel) -> Result<(), PinError>;

    /// GPIO number, for logs and status documents.
    fn number(&self) -> u32;
}

/// In-memory pin with a shareable handle.
///
/// Clones observe the same line, so a test can keep one handle while the
/// controller owns another.
#[derive(Debug, Clone)]
pub struct MockPin {
    number: u32,
    inner: Arc<MockPinState>,
}

#[derive(Debug)]
struct MockPinState {
    high: AtomicBool,
    failing: AtomicBool,
    writes: AtomicU64,
}

impl MockPin {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            inner: Arc::new(MockPinState {
                high: AtomicBool::new(false),
                failing: AtomicBool::new(false),
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Current level of the line.
    pub fn level(&self) -> PinLevel {
        if self.inner.high.load(Ordering::SeqCst) {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }
}

impl RelayPin for MockPin {
    fn write(&mut self, level: PinLevel) -> Result<(), PinError> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(PinError::Rejected(self.number));
        }
        self.inner
            .high
            .store(level == PinLevel::High, Ordering::SeqCst);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn number(&self) -> u32 {
        self.number
    }
}

/// Linux sysfs GPIO line (`<root>/gpioN/value`).
#[derive(Debug)]
pub struct SysfsPin {
    number: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export the line if needed and configure it as an output.
    pub fn open(root: impl Into<PathBuf>, number: u32) -> Result<Self, PinError> {
        let root = root.into();
        let line_dir = root.join(format!("gpio{number}"));
        let io_err = |source| PinError::Io { pin: number, source };

        if !line_dir.exists() {
            fs::write(root.join("export"), number.to_string()).map_err(io_err)?;
        }
        fs::write(line_dir.join("direction"), "out").map_err(io_err)?;

        tracing::debug!(pin = number, path = %line_dir.display(), "GPIO line exported");
        Ok(Self {
            number,
            value_path: line_dir.join("value"),
        })
    }
}

impl RelayPin for SysfsPin {
    fn write(&mut self, level: PinLevel) -> Result<(), PinError> {
        let value = match level {
            PinLevel::High => "1",
            PinLevel::Low => "0",
        };
        fs::write(&self.value_path, value).map_err(|source| PinError::Io {
            pin: self.number,
            source,
        })
    }

    fn number(&self) -> u32 {
        self.number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polarity_mapping() {
        assert_eq!(PinLevel::for_state(true, false), PinLevel::High);
        assert_eq!(PinLevel::for_state(false, false), PinLevel::Low);
        assert_eq!(PinLevel::for_state(true, true), PinLevel::Low);
        assert_eq!(PinLevel::for_state(false, true), PinLevel::High);
    }

    #[test]
    fn mock_pin_shares_state_and_fails_on_demand() {
        let handle = MockPin::new(18);
        let mut pin = handle.clone();

        pin.write(PinLevel::High).unwrap();
        assert_eq!(handle.level(), PinLevel::High);
        assert_eq!(handle.write_count(), 1);

        handle.set_failing(true);
        assert!(pin.write(PinLevel::Low).is_err());
        assert_eq!(handle.level(), PinLevel::High);
        assert_eq!(handle.write_count(), 1);
    }

    #[test]
    fn sysfs_pin_writes_value_file() {
        let root = std::env::temp_dir().join(format!("gpio-{}", uuid::Uuid::new_v4()));
        let line = root.join("gpio7");
        fs::create_dir_all(&line).unwrap();

        let mut pin = SysfsPin::open(&root, 7).unwrap();
        assert_eq!(fs::read_to_string(line.join("direction")).unwrap(), "out");

        pin.write(PinLevel::High).unwrap();
        assert_eq!(fs::read_to_string(line.join("value")).unwrap(), "1");
        pin.write(PinLevel::Low).unwrap();
        assert_eq!(fs::read_to_string(line.join("value")).unwrap(), "0");

        fs::remove_dir_all(&root).unwrap_or_default();
    }
}
