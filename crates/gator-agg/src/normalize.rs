//! Publication date parsing
//!
//! Syndication documents in the wild use a handful of date formats. We accept
//! a fixed list of them, tried in order, and reject everything else: a post
//! never silently gets "now" as its publication date.
//!
//! Every layout takes an optional fraction of a second after the seconds.

use snafu::Snafu;
use time::format_description::FormatItem;
use time::macros::{format_description, offset};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const DAY_MONTH_YEAR_TIME: &[FormatItem<'_>] = format_description!(
    "[day] [month repr:short] [year] [hour]:[minute]:[second][optional [.[subsecond]]]"
);
const DAY_MONTH_YEAR_TIME_OFFSET: &[FormatItem<'_>] = format_description!(
    "[day] [month repr:short] [year] [hour]:[minute]:[second][optional [.[subsecond]]] [offset_hour sign:mandatory][offset_minute]"
);
const SHORT_DAY_MONTH_YEAR_TIME_OFFSET: &[FormatItem<'_>] = format_description!(
    "[day padding:none] [month repr:short] [year] [hour]:[minute]:[second][optional [.[subsecond]]] [offset_hour sign:mandatory][offset_minute]"
);
const ISO_8601_UTC: &[FormatItem<'_>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]Z"
);
const BARE: &[FormatItem<'_>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);

#[derive(Debug, Snafu)]
#[snafu(display("Unrecognized publication date: {raw:?}"))]
pub struct InvalidTimestamp {
    pub raw: String,
}

/// Accepted date layouts, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLayout {
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123NumericZone,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123ZoneName,
    /// `Mon, 2 Jan 2006 15:04:05 -0700`
    Rfc1123ShortDay,
    /// `2006-01-02T15:04:05Z`
    Iso8601Utc,
    /// `2006-01-02 15:04:05`, taken as UTC
    Bare,
}

impl DateLayout {
    pub const ALL: [DateLayout; 5] = [
        DateLayout::Rfc1123NumericZone,
        DateLayout::Rfc1123ZoneName,
        DateLayout::Rfc1123ShortDay,
        DateLayout::Iso8601Utc,
        DateLayout::Bare,
    ];

    pub fn parse(self, s: &str) -> Option<OffsetDateTime> {
        match self {
            DateLayout::Rfc1123NumericZone => {
                OffsetDateTime::parse(strip_weekday(s)?, DAY_MONTH_YEAR_TIME_OFFSET).ok()
            }
            DateLayout::Rfc1123ZoneName => {
                let (date_time, zone) = strip_weekday(s)?.rsplit_once(' ')?;
                let offset = zone_offset(zone)?;
                Some(
                    PrimitiveDateTime::parse(date_time, DAY_MONTH_YEAR_TIME)
                        .ok()?
                        .assume_offset(offset),
                )
            }
            DateLayout::Rfc1123ShortDay => {
                OffsetDateTime::parse(strip_weekday(s)?, SHORT_DAY_MONTH_YEAR_TIME_OFFSET).ok()
            }
            DateLayout::Iso8601Utc => Some(PrimitiveDateTime::parse(s, ISO_8601_UTC).ok()?.assume_utc()),
            DateLayout::Bare => Some(PrimitiveDateTime::parse(s, BARE).ok()?.assume_utc()),
        }
    }
}

/// Parse an entry publication date in any of the [`DateLayout`]s
///
/// Surrounding whitespace is ignored. The weekday, where a layout has one,
/// must be a valid abbreviation but is not checked against the date.
pub fn normalize_pub_date(raw: &str) -> Result<OffsetDateTime, InvalidTimestamp> {
    let s = raw.trim();

    if !s.is_empty() {
        for layout in DateLayout::ALL {
            if let Some(date) = layout.parse(s) {
                return Ok(date);
            }
        }
    }

    InvalidTimestampSnafu { raw }.fail()
}

fn strip_weekday(s: &str) -> Option<&str> {
    let (weekday, rest) = s.split_once(", ")?;
    WEEKDAYS.contains(&weekday).then_some(rest)
}

/// Offset of an alphabetic zone name
///
/// RFC 822 North American zones get their offsets, anything else
/// (`UT`, `GMT`, `CEST`...) is taken as UTC.
fn zone_offset(zone: &str) -> Option<UtcOffset> {
    if zone.is_empty() || !zone.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    Some(match zone {
        "EST" => offset!(-5),
        "EDT" => offset!(-4),
        "CST" => offset!(-6),
        "CDT" => offset!(-5),
        "MST" => offset!(-7),
        "MDT" => offset!(-6),
        "PST" => offset!(-8),
        "PDT" => offset!(-7),
        _ => UtcOffset::UTC,
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn parses_numeric_zone() {
        assert_eq!(
            normalize_pub_date("Mon, 02 Jan 2006 15:04:05 -0700").unwrap(),
            datetime!(2006-01-02 22:04:05 UTC)
        );
        assert!(DateLayout::Rfc1123NumericZone
            .parse("Mon, 02 Jan 2006 15:04:05 -0700")
            .is_some());
    }

    #[test]
    fn parses_zone_names() {
        assert_eq!(
            normalize_pub_date("Mon, 02 Jan 2006 15:04:05 GMT").unwrap(),
            datetime!(2006-01-02 15:04:05 UTC)
        );
        assert_eq!(
            normalize_pub_date("Mon, 02 Jan 2006 15:04:05 MST").unwrap(),
            datetime!(2006-01-02 22:04:05 UTC)
        );
        assert_eq!(
            normalize_pub_date("Mon, 02 Jan 2006 15:04:05 CEST").unwrap(),
            datetime!(2006-01-02 15:04:05 UTC)
        );
    }

    #[test]
    fn parses_single_digit_day() {
        let s = "Tue, 3 Jan 2006 15:04:05 +0100";

        assert!(DateLayout::Rfc1123NumericZone.parse(s).is_none());
        assert_eq!(
            normalize_pub_date(s).unwrap(),
            datetime!(2006-01-03 14:04:05 UTC)
        );
    }

    #[test]
    fn parses_iso_8601_utc() {
        assert_eq!(
            normalize_pub_date("2006-01-02T15:04:05Z").unwrap(),
            datetime!(2006-01-02 15:04:05 UTC)
        );
    }

    #[test]
    fn parses_bare_as_utc() {
        assert_eq!(
            normalize_pub_date("2006-01-02 15:04:05").unwrap(),
            datetime!(2006-01-02 15:04:05 UTC)
        );
    }

    #[test]
    fn accepts_fractional_seconds() {
        assert_eq!(
            normalize_pub_date("2024-01-02T15:04:05.123Z").unwrap(),
            datetime!(2024-01-02 15:04:05.123 UTC)
        );
        assert_eq!(
            normalize_pub_date("2024-01-02 15:04:05.5").unwrap(),
            datetime!(2024-01-02 15:04:05.5 UTC)
        );
        assert_eq!(
            normalize_pub_date("Tue, 02 Jan 2024 15:04:05.250 +0100").unwrap(),
            datetime!(2024-01-02 14:04:05.25 UTC)
        );
        assert_eq!(
            normalize_pub_date("Tue, 02 Jan 2024 15:04:05.000001 GMT").unwrap(),
            datetime!(2024-01-02 15:04:05.000001 UTC)
        );
        assert_eq!(
            normalize_pub_date("Tue, 2 Jan 2024 15:04:05.9 -0500").unwrap(),
            datetime!(2024-01-02 20:04:05.9 UTC)
        );
        assert!(normalize_pub_date("2024-01-02T15:04:05.Z").is_err());
    }

    #[test]
    fn ignores_surrounding_whitespace() {
        assert_eq!(
            normalize_pub_date("\n  2006-01-02 15:04:05 \t").unwrap(),
            datetime!(2006-01-02 15:04:05 UTC)
        );
    }

    #[test]
    fn weekday_is_not_cross_checked() {
        // 2006-01-02 was a Monday
        assert_eq!(
            normalize_pub_date("Fri, 02 Jan 2006 15:04:05 +0000").unwrap(),
            datetime!(2006-01-02 15:04:05 UTC)
        );
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(normalize_pub_date("").unwrap_err().raw, "");
        assert!(normalize_pub_date("   ").is_err());
    }

    #[test]
    fn rejects_unknown_formats() {
        for raw in [
            "yesterday",
            "2006-01-02T15:04:05+01:00",
            "Mon, 02 Jan 2006",
            "Foo, 02 Jan 2006 15:04:05 -0700",
            "Mon, 2 Jan 2006 15:04:05 GMT",
            "Mon, 02 Jan 2006 15:04:05 +01:00",
            "02 Jan 2006 15:04:05 -0700",
        ] {
            let err = normalize_pub_date(raw).unwrap_err();
            assert_eq!(err.raw, raw);
        }
    }
}
