use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use snafu::Snafu;
use time::OffsetDateTime;

const MICROS_PER_SEC: u64 = 1_000_000;

/// Point in time, as microseconds since the unix epoch (UTC)
///
/// Microsecond resolution keeps back-to-back claims of different feeds
/// distinguishable, which the poll ordering relies on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "bincode", derive(::bincode::Encode, ::bincode::Decode))]
pub struct Timestamp(u64);

#[derive(Debug, Snafu)]
#[snafu(display("Instant {unix_secs} is outside of the representable range"))]
pub struct TimestampOutOfRange {
    pub unix_secs: i64,
}

impl Timestamp {
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(MICROS_PER_SEC))
    }

    pub fn to_offset_date_time(self) -> Option<OffsetDateTime> {
        let nanos = i128::from(self.0) * 1_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        let micros = value
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self(micros)
    }
}

impl TryFrom<OffsetDateTime> for Timestamp {
    type Error = TimestampOutOfRange;

    fn try_from(value: OffsetDateTime) -> Result<Self, Self::Error> {
        let micros = value.unix_timestamp_nanos() / 1_000;
        u64::try_from(micros).map(Self).map_err(|_| TimestampOutOfRange {
            unix_secs: value.unix_timestamp(),
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self
            .to_offset_date_time()
            .and_then(|dt| dt.format(&time::format_description::well_known::Rfc3339).ok())
        {
            Some(s) => f.write_str(&s),
            None => write!(f, "@{}us", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn converts_from_offset_date_time() {
        let ts = Timestamp::try_from(datetime!(2024-03-05 10:20:30 +02:00)).unwrap();

        assert_eq!(ts, Timestamp::from_secs(1_709_626_830));
        assert_eq!(
            ts.to_offset_date_time().unwrap(),
            datetime!(2024-03-05 08:20:30 UTC)
        );
    }

    #[test]
    fn rejects_pre_epoch_instants() {
        assert!(Timestamp::try_from(datetime!(1969-12-31 23:59:59 UTC)).is_err());
    }

    #[test]
    fn displays_as_rfc3339() {
        assert_eq!(
            Timestamp::from_secs(1_709_626_830).to_string(),
            "2024-03-05T08:20:30Z"
        );
    }
}
