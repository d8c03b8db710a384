//! Timestamp ⇄ filename stem codec.
//!
//! Story files are named after the minute they were posted, in a form that
//! sorts chronologically and reads naturally: `2023-09-01 6.05am`. The stem
//! is the only record of the posting time that survives a plain file copy,
//! so the codec must also run in reverse and recover the timestamp from a
//! stem alone.

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;
use thiserror::Error;

/// A filename stem that does not parse back into a timestamp.
#[derive(Debug, Error)]
#[error("cannot recover a timestamp from {stem:?}: {reason}")]
pub struct MalformedStemError {
    pub stem: String,
    pub reason: String,
}

/// Parse format for `decode`. `%I` accepts the hour with or without its
/// leading zero and `%p` matches the meridiem in either case, so stems
/// written before the zero-stripping rule still decode.
const DECODE_FORMAT: &str = "%Y-%m-%d %I.%M%p";

/// Encodes POSIX timestamps as minute-resolution filename stems and
/// recovers timestamps from such stems.
///
/// Encoding is lossy: seconds are discarded, and `decode` always lands on
/// the start of the encoded minute. Without a configured timezone both
/// directions use the platform local zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct StemCodec {
    tz: Option<Tz>,
}

impl StemCodec {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }

    /// Render `timestamp` as a stem like `2023-09-01 6.05am`: hyphenated
    /// date, 12-hour hour without a leading zero, zero-padded minute,
    /// lowercase meridiem.
    pub fn encode(&self, timestamp: i64) -> String {
        // Timestamps outside chrono's representable range clamp to the epoch.
        let utc = DateTime::from_timestamp(timestamp, 0).unwrap_or_default();
        match self.tz {
            Some(tz) => format_stem(&utc.with_timezone(&tz)),
            None => format_stem(&utc.with_timezone(&Local)),
        }
    }

    /// Recover the POSIX timestamp a stem encodes, ignoring a trailing
    /// ` (n)` collision suffix.
    ///
    /// The recovered value has zero seconds; nothing finer than the minute
    /// is present in a stem.
    pub fn decode(&self, stem: &str) -> Result<i64, MalformedStemError> {
        let core = strip_collision_suffix(stem);
        let naive = NaiveDateTime::parse_from_str(core, DECODE_FORMAT).map_err(|e| {
            MalformedStemError {
                stem: stem.to_string(),
                reason: e.to_string(),
            }
        })?;
        // A wall-clock time repeated by a DST fold resolves to the earlier
        // instant; one skipped by a DST gap does not exist at all.
        let resolved = match self.tz {
            Some(tz) => tz.from_local_datetime(&naive).earliest().map(|dt| dt.timestamp()),
            None => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp()),
        };
        match resolved {
            Some(timestamp) => Ok(timestamp),
            None => Err(MalformedStemError {
                stem: stem.to_string(),
                reason: "wall-clock time does not exist in the target timezone".to_string(),
            }),
        }
    }
}

/// Assembled by hand: chrono has no specifier for an unpadded 12-hour hour
/// next to a lowercase meridiem.
fn format_stem<T: Datelike + Timelike>(dt: &T) -> String {
    let (is_pm, hour) = dt.hour12();
    format!(
        "{:04}-{:02}-{:02} {}.{:02}{}",
        dt.year(),
        dt.month(),
        dt.day(),
        hour,
        dt.minute(),
        if is_pm { "pm" } else { "am" },
    )
}

/// Drop a trailing ` (n)` collision counter. Anything other than a
/// parenthesized integer stays put and fails the parse instead.
fn strip_collision_suffix(stem: &str) -> &str {
    if let Some(idx) = stem.find(" (") {
        let counter = &stem[idx + 2..];
        if let Some(digits) = counter.strip_suffix(')') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return &stem[..idx];
            }
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::Tz;

    fn utc_codec() -> StemCodec {
        StemCodec::new(Some(Tz::UTC))
    }

    fn utc_ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap().timestamp()
    }

    #[test]
    fn test_encode_strips_leading_zero_and_seconds() {
        let ts = utc_ts(2023, 9, 1, 6, 5, 30);
        assert_eq!(utc_codec().encode(ts), "2023-09-01 6.05am");
    }

    #[test]
    fn test_encode_double_digit_hour() {
        let ts = utc_ts(2023, 9, 1, 23, 59, 0);
        assert_eq!(utc_codec().encode(ts), "2023-09-01 11.59pm");
    }

    #[test]
    fn test_encode_midnight_and_noon() {
        assert_eq!(
            utc_codec().encode(utc_ts(2023, 9, 1, 0, 5, 0)),
            "2023-09-01 12.05am"
        );
        assert_eq!(
            utc_codec().encode(utc_ts(2023, 9, 1, 12, 5, 0)),
            "2023-09-01 12.05pm"
        );
    }

    #[test]
    fn test_decode_recovers_minute_start() {
        let codec = utc_codec();
        assert_eq!(
            codec.decode("2023-09-01 6.05am").unwrap(),
            utc_ts(2023, 9, 1, 6, 5, 0)
        );
    }

    #[test]
    fn test_round_trip_truncates_to_minute() {
        let codec = utc_codec();
        let ts = utc_ts(2023, 9, 1, 6, 5, 30);
        let recovered = codec.decode(&codec.encode(ts)).unwrap();
        assert_eq!(recovered, ts - 30);
    }

    #[test]
    fn test_decode_accepts_padded_hour() {
        let codec = utc_codec();
        assert_eq!(
            codec.decode("2023-09-01 06.05am").unwrap(),
            codec.decode("2023-09-01 6.05am").unwrap()
        );
    }

    #[test]
    fn test_decode_ignores_collision_suffix() {
        let codec = utc_codec();
        assert_eq!(
            codec.decode("2023-09-01 6.05am (3)").unwrap(),
            codec.decode("2023-09-01 6.05am").unwrap()
        );
    }

    #[test]
    fn test_decode_midnight_and_noon() {
        let codec = utc_codec();
        assert_eq!(
            codec.decode("2023-09-01 12.05am").unwrap(),
            utc_ts(2023, 9, 1, 0, 5, 0)
        );
        assert_eq!(
            codec.decode("2023-09-01 12.05pm").unwrap(),
            utc_ts(2023, 9, 1, 12, 5, 0)
        );
    }

    #[test]
    fn test_non_utc_zone_round_trip() {
        let codec = StemCodec::new(Some(Tz::America__New_York));
        // 18:30 UTC on a standard-time date is 1.30pm in New York.
        let ts = utc_ts(2023, 1, 15, 18, 30, 42);
        let stem = codec.encode(ts);
        assert_eq!(stem, "2023-01-15 1.30pm");
        assert_eq!(codec.decode(&stem).unwrap(), ts - 42);
    }

    #[test]
    fn test_decode_dst_fold_takes_earlier_instant() {
        let codec = StemCodec::new(Some(Tz::America__New_York));
        // 2023-11-05 01:30 happens twice in New York; the first occurrence
        // is still on daylight time.
        let expected = Tz::America__New_York
            .with_ymd_and_hms(2023, 11, 5, 1, 30, 0)
            .earliest()
            .unwrap()
            .timestamp();
        assert_eq!(codec.decode("2023-11-05 1.30am").unwrap(), expected);
    }

    #[test]
    fn test_decode_dst_gap_is_malformed() {
        let codec = StemCodec::new(Some(Tz::America__New_York));
        // 2023-03-12 02:30 was skipped by the spring-forward transition.
        assert!(codec.decode("2023-03-12 2.30am").is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_stems() {
        let codec = utc_codec();
        for stem in [
            "",
            "not a stem",
            "2023-09-01",
            "2023-09-01 6.05",
            "2023-13-01 6.05am",
            "2023-09-01 0.05am",
            "2023-09-01 6.05am junk",
            "2023-09-01 6.05am (x)",
        ] {
            let err = codec.decode(stem).unwrap_err();
            assert_eq!(err.stem, stem);
        }
    }

    #[test]
    fn test_strip_collision_suffix() {
        assert_eq!(strip_collision_suffix("2023-09-01 6.05am"), "2023-09-01 6.05am");
        assert_eq!(
            strip_collision_suffix("2023-09-01 6.05am (1)"),
            "2023-09-01 6.05am"
        );
        assert_eq!(
            strip_collision_suffix("2023-09-01 6.05am (42)"),
            "2023-09-01 6.05am"
        );
        // Not collision counters: empty or non-numeric parentheticals.
        assert_eq!(strip_collision_suffix("a ()"), "a ()");
        assert_eq!(strip_collision_suffix("a (x)"), "a (x)");
        assert_eq!(strip_collision_suffix("a (1"), "a (1");
    }

    #[test]
    fn test_encode_is_pure() {
        let codec = utc_codec();
        let ts = utc_ts(2024, 2, 29, 9, 41, 7);
        assert_eq!(codec.encode(ts), codec.encode(ts));
    }
}
