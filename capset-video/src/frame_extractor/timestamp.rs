use std::fmt;
use std::time::Duration;

use capset_common::utils::time::format_seconds;
use ffmpeg::Rational;

extern crate ffmpeg_next as ffmpeg;

/// The presentation time of a decoded frame, relative to the start of its stream.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Timestamp {
    pub(super) timebase_numerator: i32,
    pub(super) timebase_denominator: i32,
    pub(super) timestamp: i64,
    pub(super) first_timestamp: i64,
}

impl Timestamp {
    pub(super) fn new(ts: i64, timebase: Rational, first_timestamp: i64) -> Self {
        Self {
            timestamp: ts,
            first_timestamp,
            timebase_numerator: timebase.numerator(),
            timebase_denominator: timebase.denominator(),
        }
    }

    pub(super) fn new_abs(ts: i64, timebase: Rational) -> Self {
        Self::new(ts, timebase, 0)
    }

    /// Seconds since the first frame, negative if the stream has frames before its
    /// declared start.
    pub fn seconds(&self) -> f64 {
        if self.timebase_denominator == 0 {
            return 0.0;
        }
        (self.timestamp as f64 - self.first_timestamp as f64)
            * (self.timebase_numerator as f64 / self.timebase_denominator as f64)
    }

    /// Same as [Self::seconds], but anything before the start becomes zero.
    pub fn to_duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds().max(0.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_seconds(self.seconds()))
    }
}
