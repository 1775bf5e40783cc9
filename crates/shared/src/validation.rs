//! Common validation utilities.

use chrono::Utc;
use validator::ValidationError;

/// Maximum allowed future timestamp tolerance in seconds (5 minutes for clock skew).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 300;

/// Validates a hardware (MAC) address: six colon- or dash-separated
/// hex octets, or a bare 12-digit hex string as some units report it.
pub fn validate_mac_address(mac: &str) -> Result<(), ValidationError> {
    let bare: String = mac
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .collect();

    let separated = mac.len() == 17 && mac.as_bytes().iter().skip(2).step_by(3).all(|b| *b == b':' || *b == b'-');
    let plain = mac.len() == 12;

    if (separated || plain) && bare.len() == 12 && bare.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("mac_format");
        err.message = Some("Hardware address must be a 6-octet MAC".into());
        Err(err)
    }
}

/// Validates that an hour value is within 0-23.
pub fn validate_hour(hour: u8) -> Result<(), ValidationError> {
    if hour <= 23 {
        Ok(())
    } else {
        let mut err = ValidationError::new("hour_range");
        err.message = Some("Hour must be between 0 and 23".into());
        Err(err)
    }
}

/// Validates that a minute value is within 0-59.
pub fn validate_minute(minute: u8) -> Result<(), ValidationError> {
    if minute <= 59 {
        Ok(())
    } else {
        let mut err = ValidationError::new("minute_range");
        err.message = Some("Minute must be between 0 and 59".into());
        Err(err)
    }
}

/// Validates that an epoch-seconds timestamp is not unreasonably far in
/// the future. Old timestamps are accepted: units buffer readings while
/// offline and flush them on reconnect.
pub fn validate_epoch_seconds(ts: i64) -> Result<(), ValidationError> {
    let now = Utc::now().timestamp();
    if ts <= now + MAX_FUTURE_TOLERANCE_SECS {
        Ok(())
    } else {
        let mut err = ValidationError::new("timestamp_future");
        err.message = Some("Timestamp is too far in the future".into());
        Err(err)
    }
}
