//! ==============================================================================
//! convert.rs - raw adc sample to degrees celsius
//! ==============================================================================
//!
//! the sensor's transfer curve is a parabola, so the temperature is the
//! positive root of its quadratic:
//!
//!     t = (a - sqrt(a^2 + 4 b (c - mV))) / (2 * -b) + 40
//!
//! the output falls as the raw sample rises. samples large enough to make the
//! radicand negative have no physical meaning and are rejected, so a NaN can
//! never reach the controller or the history log.
//!
//! ==============================================================================

use thiserror::Error;

const A: f64 = 8.194;
const B: f64 = 0.00262;
const C: f64 = 1324.0;

/// offset of the curve's reference point in degrees celsius
const REFERENCE_C: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConversionError {
    #[error("raw sample {raw} is outside the sensor's range (radicand {radicand:.3})")]
    OutOfRange { raw: i32, radicand: f64 },
}

/// convert a raw sample in the millivolt domain to degrees celsius
pub fn convert(raw: i32) -> Result<f64, ConversionError> {
    let radicand = A * A + 4.0 * B * (C - f64::from(raw));
    if radicand < 0.0 || !radicand.is_finite() {
        return Err(ConversionError::OutOfRange { raw, radicand });
    }

    Ok((A - radicand.sqrt()) / (2.0 * -B) + REFERENCE_C)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_point_is_forty_degrees() {
        let t = convert(1324).unwrap();
        assert!((t - 40.0).abs() < 1e-9, "got {t}");
    }

    #[test]
    fn test_monotonic_over_adc_range() {
        let mut previous = convert(0).unwrap();
        for raw in 1..=4095 {
            let t = convert(raw).unwrap();
            assert!(t < previous, "not decreasing at raw={raw}: {t} >= {previous}");
            previous = t;
        }
    }

    #[test]
    fn test_room_temperature_sample() {
        let t = convert(1446).unwrap();
        assert!(t > 24.0 && t < 26.0, "got {t}");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(convert(2048), convert(2048));
    }

    #[test]
    fn test_negative_radicand_rejected() {
        // radicand crosses zero just above 7730
        assert!(convert(7730).is_ok());
        match convert(8000) {
            Err(ConversionError::OutOfRange { raw, radicand }) => {
                assert_eq!(raw, 8000);
                assert!(radicand < 0.0);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }
}
