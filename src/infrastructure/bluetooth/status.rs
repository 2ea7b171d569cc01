//! Flight and battery status notifications

use crate::domain::models::FlightState;
use crate::error::DecodeError;

/// Offset of the flight state index in a flight-status notification
pub const FLIGHT_STATE_OFFSET: usize = 6;

/// Battery level below which a warning is raised
pub const LOW_BATTERY_THRESHOLD: u8 = 10;

/// Decoded battery notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    /// Charge in percent (0-100)
    pub percent: u8,
}

impl BatteryStatus {
    pub fn is_low(&self, threshold: u8) -> bool {
        self.percent < threshold
    }
}

/// Decode a flight-status notification.
///
/// Indices outside the known table decode to [`FlightState::Unrecognized`].
pub fn parse_flight_status(bytes: &[u8]) -> Result<FlightState, DecodeError> {
    let index = bytes
        .get(FLIGHT_STATE_OFFSET)
        .ok_or(DecodeError::TooShort {
            expected: FLIGHT_STATE_OFFSET + 1,
            actual: bytes.len(),
        })?;

    Ok(FlightState::from_index(*index))
}

/// Decode a battery notification; the level is the last byte
pub fn parse_battery_status(bytes: &[u8]) -> Result<BatteryStatus, DecodeError> {
    let percent = *bytes.last().ok_or(DecodeError::TooShort {
        expected: 1,
        actual: 0,
    })?;

    if percent > 100 {
        return Err(DecodeError::BatteryOutOfRange(percent));
    }

    Ok(BatteryStatus { percent })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flight_states() {
        let mut payload = [4, 7, 2, 3, 1, 0, 2];
        assert_eq!(parse_flight_status(&payload), Ok(FlightState::Hovering));

        payload[6] = 5;
        assert_eq!(parse_flight_status(&payload), Ok(FlightState::CutOff));

        payload[6] = 0;
        assert_eq!(parse_flight_status(&payload), Ok(FlightState::Landed));
    }

    #[test]
    fn test_unknown_index_is_not_an_error() {
        let payload = [4, 7, 2, 3, 1, 0, 42, 0];
        assert_eq!(
            parse_flight_status(&payload),
            Ok(FlightState::Unrecognized(42))
        );
    }

    #[test]
    fn test_short_flight_payload() {
        assert_eq!(
            parse_flight_status(&[4, 7, 2]),
            Err(DecodeError::TooShort {
                expected: 7,
                actual: 3
            })
        );
    }

    #[test]
    fn test_battery_levels() {
        let low = parse_battery_status(&[4, 3, 0, 5, 1, 0, 5]).unwrap();
        assert_eq!(low.percent, 5);
        assert!(low.is_low(LOW_BATTERY_THRESHOLD));

        let ok = parse_battery_status(&[4, 3, 0, 5, 1, 0, 55]).unwrap();
        assert_eq!(ok.percent, 55);
        assert!(!ok.is_low(LOW_BATTERY_THRESHOLD));

        assert!(!BatteryStatus { percent: 10 }.is_low(LOW_BATTERY_THRESHOLD));
    }

    #[test]
    fn test_malformed_battery_payloads() {
        assert_eq!(
            parse_battery_status(&[]),
            Err(DecodeError::TooShort {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(
            parse_battery_status(&[1, 2, 200]),
            Err(DecodeError::BatteryOutOfRange(200))
        );
    }
}
