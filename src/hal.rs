//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the two peripherals the host touches:
//!     the temperature sensor's ADC and the indicator output pin.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": The host should compile on Windows/Mac/Linux.
//!     - "Zero Cost": On the Pi, this compiles down to direct `rppal` calls.
//!
//! relationships:
//!     - used by: sampler.rs (adc reads), state.rs (indicator writes)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use crate::config::SensorConfig;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

pub trait HardwareProvider: Send + Sync {
    /// one raw sample from the temperature sensor's ADC
    fn read_adc(&self) -> Result<u16>;
    /// configure a pin as output and drive it low
    fn configure_output(&self, pin: u8) -> Result<()>;
    fn write_gpio(&self, pin: u8, level: bool) -> Result<()>;
    /// last level written to an output pin
    fn gpio_level(&self, pin: u8) -> bool;
}

/// output levels as last written, shared by both implementations
#[derive(Default)]
struct OutputLevels(Mutex<HashMap<u8, bool>>);

impl OutputLevels {
    fn set(&self, pin: u8, level: bool) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).insert(pin, level);
    }

    fn get(&self, pin: u8) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pin)
            .copied()
            .unwrap_or(false)
    }
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For Non-Hardware Build)
// ==============================================================================================

/// half-width of the mock sweep in raw counts
#[cfg(not(feature = "hardware"))]
const MOCK_SWEEP: u32 = 20;

#[cfg(not(feature = "hardware"))]
pub struct Hal {
    centre: u16,
    tick: std::sync::atomic::AtomicU32,
    levels: OutputLevels,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new(sensor: &SensorConfig) -> Result<Self> {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Ok(Self {
            centre: sensor.mock_raw_sample,
            tick: std::sync::atomic::AtomicU32::new(0),
            levels: OutputLevels::default(),
        })
    }
}

#[cfg(not(feature = "hardware"))]
impl HardwareProvider for Hal {
    fn read_adc(&self) -> Result<u16> {
        use std::sync::atomic::Ordering;

        // triangle wave around the centre so the threshold logic sees movement
        let phase = (self.tick.fetch_add(1, Ordering::Relaxed) % (4 * MOCK_SWEEP)) as i32;
        let sweep = MOCK_SWEEP as i32;
        let offset = if phase < 2 * sweep { phase - sweep } else { 3 * sweep - phase };
        let raw = (i32::from(self.centre) + offset).clamp(0, 4095) as u16;
        tracing::debug!("[MOCK ADC] Raw sample {}", raw);
        Ok(raw)
    }

    fn configure_output(&self, pin: u8) -> Result<()> {
        tracing::debug!("[MOCK GPIO] Pin {} set to output", pin);
        self.levels.set(pin, false);
        Ok(())
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        tracing::debug!("[MOCK GPIO] Pin {} write {}", pin, level);
        self.levels.set(pin, level);
        Ok(())
    }

    fn gpio_level(&self, pin: u8) -> bool {
        self.levels.get(pin)
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================

#[cfg(feature = "hardware")]
pub struct Hal {
    adc_address: u16,
    levels: OutputLevels,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new(sensor: &SensorConfig) -> Result<Self> {
        use anyhow::Context;

        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        let adc_address = u16::from_str_radix(sensor.i2c_address.trim_start_matches("0x"), 16)
            .with_context(|| format!("invalid ADC i2c address '{}'", sensor.i2c_address))?;
        Ok(Self { adc_address, levels: OutputLevels::default() })
    }
}

#[cfg(feature = "hardware")]
impl HardwareProvider for Hal {
    fn read_adc(&self) -> Result<u16> {
        use rppal::i2c::I2c;

        // MCP3221: a plain 2-byte read returns the 12-bit conversion result
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(self.adc_address)?;
        let mut buf = [0u8; 2];
        i2c.read(&mut buf)?;
        Ok((u16::from(buf[0] & 0x0F) << 8) | u16::from(buf[1]))
    }

    fn configure_output(&self, pin: u8) -> Result<()> {
        self.write_gpio(pin, false)
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new()?;
        let mut p = gpio.get(pin)?.into_output();
        // keep the level after the handle drops, otherwise the indicator
        // turns off as soon as this function returns
        p.set_reset_on_drop(false);
        if level { p.set_high(); } else { p.set_low(); }
        self.levels.set(pin, level);
        Ok(())
    }

    fn gpio_level(&self, pin: u8) -> bool {
        self.levels.get(pin)
    }
}

/// scripted hal for tests: fixed adc sample, recorded output levels
#[cfg(test)]
pub struct TestHal {
    pub raw: std::sync::atomic::AtomicU16,
    pub fail_adc: std::sync::atomic::AtomicBool,
    levels: OutputLevels,
}

#[cfg(test)]
impl TestHal {
    pub fn new(raw: u16) -> Self {
        Self {
            raw: std::sync::atomic::AtomicU16::new(raw),
            fail_adc: std::sync::atomic::AtomicBool::new(false),
            levels: OutputLevels::default(),
        }
    }
}

#[cfg(test)]
impl HardwareProvider for TestHal {
    fn read_adc(&self) -> Result<u16> {
        use std::sync::atomic::Ordering;
        if self.fail_adc.load(Ordering::SeqCst) {
            anyhow::bail!("adc not responding");
        }
        Ok(self.raw.load(Ordering::SeqCst))
    }

    fn configure_output(&self, pin: u8) -> Result<()> {
        self.levels.set(pin, false);
        Ok(())
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        self.levels.set(pin, level);
        Ok(())
    }

    fn gpio_level(&self, pin: u8) -> bool {
        self.levels.get(pin)
    }
}

#[cfg(all(test, not(feature = "hardware")))]
mod tests {
    use super::*;

    fn hal() -> Hal {
        Hal::new(&SensorConfig { i2c_address: "0x4D".to_string(), mock_raw_sample: 1450 }).unwrap()
    }

    #[test]
    fn test_mock_adc_sweeps_around_centre() {
        let hal = hal();
        let samples: Vec<u16> = (0..80).map(|_| hal.read_adc().unwrap()).collect();
        assert_eq!(samples[0], 1430);
        assert_eq!(*samples.iter().max().unwrap(), 1470);
        assert_eq!(*samples.iter().min().unwrap(), 1430);
        // period is 80 samples
        assert_eq!(hal.read_adc().unwrap(), samples[0]);
    }

    #[test]
    fn test_mock_gpio_tracks_levels() {
        let hal = hal();
        assert!(!hal.gpio_level(4));
        hal.write_gpio(4, true).unwrap();
        assert!(hal.gpio_level(4));
        hal.configure_output(4).unwrap();
        assert!(!hal.gpio_level(4));
    }
}
