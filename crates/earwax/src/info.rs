//! Stream information captured once when a context is opened.

use serde::Serialize;

/// Rational time unit: one timestamp tick lasts `num / den` seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const fn new(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Convert a timestamp in this unit to seconds.
    ///
    /// Returns `0.0` for a zero denominator.
    pub fn seconds(&self, ts: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        ts as f64 * self.num as f64 / self.den as f64
    }
}

/// Snapshot of the selected audio stream.
///
/// All times are in the stream's native `time_base` units. The snapshot is
/// never refreshed from the live container after construction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamInfo {
    /// Bits per second (best-effort, 0 when unknown).
    pub bitrate: i64,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Channel count of the PCM produced by `spit`.
    pub channels: u16,
    /// Timestamp of the first frame.
    pub start_time: i64,
    /// Stream duration.
    pub duration: i64,
    pub time_base: Rational,
    /// Codec short name (best-effort).
    pub codec: Option<String>,
}

impl StreamInfo {
    /// Duration in seconds, or `0.0` when the time base is unknown.
    pub fn duration_secs(&self) -> f64 {
        self.time_base.seconds(self.duration)
    }

    /// Clamp `pts` into `[start_time, duration]`.
    ///
    /// The lower bound is applied first, so a snapshot whose duration lies
    /// before its start time clamps everything to the duration.
    pub fn clamp_pts(&self, pts: i64) -> i64 {
        let mut pts = pts;
        if pts < self.start_time {
            pts = self.start_time;
        }
        if pts > self.duration {
            pts = self.duration;
        }
        pts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(start_time: i64, duration: i64) -> StreamInfo {
        StreamInfo {
            start_time,
            duration,
            time_base: Rational::new(1, 44_100),
            ..StreamInfo::default()
        }
    }

    #[test]
    fn default_is_zeroed() {
        let info = StreamInfo::default();
        assert_eq!(info.bitrate, 0);
        assert_eq!(info.sample_rate, 0);
        assert_eq!(info.time_base, Rational::new(0, 0));
        assert!(info.codec.is_none());
    }

    #[test]
    fn seconds_handles_zero_denominator() {
        assert_eq!(Rational::default().seconds(1234), 0.0);
        assert_eq!(Rational::new(1, 1000).seconds(1500), 1.5);
    }

    #[test]
    fn duration_secs_uses_time_base() {
        assert_eq!(info(0, 88_200).duration_secs(), 2.0);
    }

    #[test]
    fn clamp_pts_bounds_both_sides() {
        let info = info(100, 5_000);
        assert_eq!(info.clamp_pts(-10), 100);
        assert_eq!(info.clamp_pts(99), 100);
        assert_eq!(info.clamp_pts(2_500), 2_500);
        assert_eq!(info.clamp_pts(5_001), 5_000);
    }

    #[test]
    fn clamp_pts_prefers_duration_when_bounds_cross() {
        assert_eq!(info(10, 0).clamp_pts(5), 0);
    }
}
