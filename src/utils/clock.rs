//! Epoch and tick-rate conversions shared across codecs: SCTE-35 segmentation UPIDs reference
//! wall-clock time relative to the GPS epoch, SDP session timing is relative to the NTP/1900
//! epoch, and SCTE-35/MPEG-TS both clock media time in 90kHz ticks.

use std::time::Duration;

use crate::error::{Result, VdkError};

/// Seconds between the Unix epoch (1970-01-01T00:00:00Z) and the GPS epoch (1980-01-06T00:00:00Z).
pub const GPS_EPOCH_OFFSET: i64 = 315_964_800;

/// Seconds between the NTP epoch (1900-01-01T00:00:00Z) and the Unix epoch.
pub const NTP_EPOCH_OFFSET: i64 = 2_208_988_800;

/// Tick rate of the 90kHz presentation clock used by SCTE-35 and MPEG-TS PES timestamps.
pub const PTS_CLOCK_HZ: u64 = 90_000;

/// Converts a Unix timestamp (seconds since 1970) to GPS seconds. Times before the GPS epoch
/// have no representation and are rejected.
pub fn unix_to_gps_seconds(unix_seconds: i64) -> Result<u64> {
    let gps = unix_seconds - GPS_EPOCH_OFFSET;
    if gps < 0 {
        return Err(VdkError::InvalidData(
            "timestamp predates the GPS epoch (1980-01-06T00:00:00Z)".into(),
        ));
    }
    Ok(gps as u64)
}

/// Converts GPS seconds back to a Unix timestamp.
pub fn gps_to_unix_seconds(gps_seconds: u64) -> i64 {
    gps_seconds as i64 + GPS_EPOCH_OFFSET
}

/// Converts a Unix timestamp to an NTP/1900-epoch timestamp, as used by SDP's `t=` field.
pub fn unix_to_ntp_seconds(unix_seconds: i64) -> u64 {
    (unix_seconds + NTP_EPOCH_OFFSET).max(0) as u64
}

/// Converts an NTP/1900-epoch timestamp back to Unix seconds. `0` is SDP's "unbounded" sentinel
/// and passes through unchanged; callers that care about that sentinel should check for it
/// before calling this.
pub fn ntp_to_unix_seconds(ntp_seconds: u64) -> i64 {
    ntp_seconds as i64 - NTP_EPOCH_OFFSET
}

/// Converts a tick count at the 90kHz presentation clock to a [`Duration`].
pub fn ticks_to_duration(ticks: u64) -> Duration {
    let whole_secs = ticks / PTS_CLOCK_HZ;
    let remainder_ticks = ticks % PTS_CLOCK_HZ;
    let nanos = remainder_ticks * 1_000_000_000 / PTS_CLOCK_HZ;
    Duration::new(whole_secs, nanos as u32)
}

/// Converts a [`Duration`] to a 90kHz tick count, rounding up so that `duration_to_ticks` is a
/// right inverse of `ticks_to_duration` on every tick boundary and never silently truncates a
/// fractional tick, only over-represents it by at most one tick.
pub fn duration_to_ticks(duration: Duration) -> u64 {
    let whole_ticks = duration.as_secs() * PTS_CLOCK_HZ;
    let nanos = duration.subsec_nanos() as u64;
    let frac_ticks = (nanos * PTS_CLOCK_HZ + 999_999_999) / 1_000_000_000;
    whole_ticks + frac_ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_gps_epoch_round_trip() {
        let unix_now = 1_753_660_800i64; // 2025-07-28T00:00:00Z, well after the GPS epoch
        let gps = unix_to_gps_seconds(unix_now).unwrap();
        assert_eq!(gps_to_unix_seconds(gps), unix_now);
    }

    #[test]
    fn test_gps_epoch_rejects_pre_epoch_timestamps() {
        assert!(unix_to_gps_seconds(GPS_EPOCH_OFFSET - 1).is_err());
        assert!(unix_to_gps_seconds(GPS_EPOCH_OFFSET).is_ok());
    }

    #[test]
    fn test_ntp_epoch_round_trip() {
        let unix_now = 1_753_660_800i64;
        let ntp = unix_to_ntp_seconds(unix_now);
        assert_eq!(ntp_to_unix_seconds(ntp), unix_now);
    }

    #[test]
    fn test_ticks_to_duration_known_value() {
        // 9.967 seconds, from the #EXTINF:9.967 seed fixture.
        let ticks = 896_930u64; // round(9.967 * 90000)
        let d = ticks_to_duration(ticks);
        assert_eq!(d.as_secs(), 9);
        assert!((d.subsec_millis() as i64 - 967).abs() <= 1);
    }

    #[test]
    fn test_duration_to_ticks_rounds_up() {
        // One nanosecond is a fraction of a tick at 90kHz; it must round up to 1, not 0.
        assert_eq!(duration_to_ticks(Duration::from_nanos(1)), 1);
        assert_eq!(duration_to_ticks(Duration::from_secs(0)), 0);
    }

    #[quickcheck]
    fn prop_ticks_duration_round_trip_on_tick_boundaries(ticks: u32) -> bool {
        let ticks = ticks as u64;
        let d = ticks_to_duration(ticks);
        duration_to_ticks(d) == ticks
    }
}
