use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use snafu::Snafu;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum CadenceParseError {
    #[snafu(display("Empty duration"))]
    Empty,
    #[snafu(display("Invalid duration {input:?}"))]
    Invalid { input: String },
    #[snafu(display("Missing unit in duration {input:?}"))]
    MissingUnit { input: String },
    #[snafu(display("Unknown unit {unit:?} in duration {input:?}"))]
    UnknownUnit { unit: String, input: String },
    #[snafu(display("Duration {input:?} is out of range"))]
    OutOfRange { input: String },
    #[snafu(display("Duration must be positive, got {input:?}"))]
    NotPositive { input: String },
}

/// Time between two polling cycles
///
/// Parsed from a Go-style duration string: a sequence of decimal numbers,
/// each with an optional fraction and a mandatory unit (`ns`, `us`/`µs`, `ms`,
/// `s`, `m`, `h`), e.g. `1m`, `1h30m`, `1.5s`. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cadence(Duration);

impl Cadence {
    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl FromStr for Cadence {
    type Err = CadenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(CadenceParseError::Empty);
        }

        let (negative, unsigned) = match input.as_bytes()[0] {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let nanos = if unsigned == "0" {
            0
        } else {
            parse_unsigned_nanos(unsigned, input)?
        };

        if negative || nanos == 0 {
            return NotPositiveSnafu { input }.fail();
        }

        Ok(Self(Duration::from_nanos(nanos)))
    }
}

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        // micro sign and greek mu both show up in the wild
        "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 60 * 60 * 1_000_000_000,
        _ => return None,
    })
}

fn parse_unsigned_nanos(mut rest: &str, input: &str) -> Result<u64, CadenceParseError> {
    if rest.is_empty() {
        return InvalidSnafu { input }.fail();
    }

    let mut total: u128 = 0;

    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after) = rest.split_at(int_len);

        let (frac_digits, after) = match after.strip_prefix('.') {
            Some(after) => {
                let frac_len = after.bytes().take_while(u8::is_ascii_digit).count();
                after.split_at(frac_len)
            }
            None => ("", after),
        };

        if int_digits.is_empty() && frac_digits.is_empty() {
            return InvalidSnafu { input }.fail();
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);

        if unit.is_empty() {
            return MissingUnitSnafu { input }.fail();
        }
        let Some(unit_nanos) = unit_nanos(unit) else {
            return UnknownUnitSnafu { unit, input }.fail();
        };

        let int: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits
                .parse()
                .map_err(|_| CadenceParseError::OutOfRange { input: input.into() })?
        };
        let mut value = int
            .checked_mul(unit_nanos)
            .ok_or_else(|| CadenceParseError::OutOfRange { input: input.into() })?;

        if !frac_digits.is_empty() {
            // digits past nanosecond precision of the largest unit don't matter
            let frac_digits = &frac_digits[..frac_digits.len().min(18)];
            let frac: u128 = frac_digits
                .parse()
                .map_err(|_| CadenceParseError::Invalid { input: input.into() })?;
            let scale = 10u128.pow(frac_digits.len() as u32);
            value += frac * unit_nanos / scale;
        }

        total = total
            .checked_add(value)
            .ok_or_else(|| CadenceParseError::OutOfRange { input: input.into() })?;
        rest = after;
    }

    u64::try_from(total).map_err(|_| CadenceParseError::OutOfRange { input: input.into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Duration, CadenceParseError> {
        s.parse::<Cadence>().map(Cadence::as_duration)
    }

    #[test]
    fn parses_go_style_durations() {
        assert_eq!(parse("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse(".5m").unwrap(), Duration::from_secs(30));
        assert_eq!(parse("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse("3ns").unwrap(), Duration::from_nanos(3));
        assert_eq!(parse("+2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse(" 1m ").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!(parse(""), Err(CadenceParseError::Empty));
        assert!(matches!(parse("abc"), Err(CadenceParseError::Invalid { .. })));
        assert!(matches!(parse(".s"), Err(CadenceParseError::Invalid { .. })));
        assert!(matches!(parse("10"), Err(CadenceParseError::MissingUnit { .. })));
        assert!(matches!(parse("1.5"), Err(CadenceParseError::MissingUnit { .. })));
        assert!(matches!(
            parse("10x"),
            Err(CadenceParseError::UnknownUnit { unit, .. }) if unit == "x"
        ));
        assert!(matches!(
            parse("99999999999999999999h"),
            Err(CadenceParseError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_durations() {
        for s in ["0", "0s", "0.0h", "-1s", "-0"] {
            assert!(
                matches!(parse(s), Err(CadenceParseError::NotPositive { .. })),
                "{s}"
            );
        }
    }

    #[test]
    fn displays_as_duration() {
        assert_eq!("1m".parse::<Cadence>().unwrap().to_string(), "60s");
    }
}
