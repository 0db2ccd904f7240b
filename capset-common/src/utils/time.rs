use std::time::Duration;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseTimeError {
    #[error("time can't be negative: {0}")]
    Negative(String),
    #[error("not a time: {0:?}, expected seconds like `2.5` or a duration like `1m30s`")]
    Malformed(String),
}

/// Parses a point in time, in seconds. Both plain decimal seconds (`2.5`) and humantime
/// durations (`1m 30s`, `500ms`) are accepted.
pub fn parse_seconds(s: &str) -> Result<f64, ParseTimeError> {
    let s = s.trim();
    match s.parse::<f64>() {
        Ok(secs) if !secs.is_finite() => Err(ParseTimeError::Malformed(s.to_string())),
        Ok(secs) if secs < 0.0 => Err(ParseTimeError::Negative(s.to_string())),
        Ok(secs) => Ok(secs),
        Err(_) => humantime::parse_duration(s)
            .map(|dur| dur.as_secs_f64())
            .map_err(|_| ParseTimeError::Malformed(s.to_string())),
    }
}

/// To be used as a clap `value_parser`
pub fn clap_seconds_parser(s: &str) -> Result<f64, ParseTimeError> {
    parse_seconds(s)
}

/// Formats seconds as `HH:MM:SS.mmm`, rounded to the closest millisecond, with a leading
/// minus if negative.
pub fn format_seconds(total: f64) -> String {
    let negative = if total < 0.0 { "-" } else { "" };
    let millis = (total.abs() * 1e3).round() as u64;

    let subsec = millis % 1000;
    let seconds = millis / 1000 % 60;
    let minutes = millis / (60 * 1000) % 60;
    let hours = millis / (60 * 60 * 1000);

    format!("{negative}{hours:02}:{minutes:02}:{seconds:02}.{subsec:03}")
}

pub fn format_duration(dur: Duration) -> String {
    format_seconds(dur.as_secs_f64())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_seconds() {
        assert_eq!(Ok(5.0), parse_seconds("5"));
        assert_eq!(Ok(2.5), parse_seconds(" 2.5 "));
        assert_eq!(Ok(0.0), parse_seconds("0"));
    }

    #[test]
    fn humantime_durations() {
        assert_eq!(Ok(90.0), parse_seconds("1m 30s"));
        assert_eq!(Ok(0.5), parse_seconds("500ms"));
    }

    #[test]
    fn bad_times() {
        assert!(matches!(
            parse_seconds("-1"),
            Err(ParseTimeError::Negative(_))
        ));
        assert!(matches!(
            parse_seconds("soon"),
            Err(ParseTimeError::Malformed(_))
        ));
        assert!(matches!(
            parse_seconds("NaN"),
            Err(ParseTimeError::Malformed(_))
        ));
    }

    #[test]
    fn formatting() {
        assert_eq!("00:00:00.050", format_seconds(0.05));
        assert_eq!("00:00:01.005", format_duration(Duration::from_millis(1005)));
        assert_eq!("01:01:01.000", format_seconds(3661.0));
        assert_eq!("-00:00:02.000", format_seconds(-2.0));
    }
}
