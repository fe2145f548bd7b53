//! Certificate validity timestamps
//!
//! A certificate stores its not-after time either as an ASN.1 UTCTime
//! (`YYMMDDHHMM[SS]Z`) or a GeneralizedTime (`YYYYMMDDHHMM[SS]Z`). Both are
//! decoded positionally into a [`CalendarMoment`]; no generic date parser is
//! involved.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use super::config::ProbeError;

/// ASN.1 time encoding of a certificate timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampEncoding {
    /// Two-digit year, pivoting at 2050
    UtcTime,
    /// Four-digit year
    GeneralizedTime,
}

/// Timestamp bytes exactly as stored in the certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCertificateTimestamp {
    pub encoding: TimestampEncoding,
    pub digits: Vec<u8>,
}

impl RawCertificateTimestamp {
    pub fn new(encoding: TimestampEncoding, digits: impl Into<Vec<u8>>) -> Self {
        RawCertificateTimestamp {
            encoding,
            digits: digits.into(),
        }
    }

    /// UTCTime timestamp, e.g. `"240115000000Z"`
    pub fn utc_time(digits: &str) -> Self {
        Self::new(TimestampEncoding::UtcTime, digits)
    }

    /// GeneralizedTime timestamp, e.g. `"20240115000000Z"`
    pub fn generalized_time(digits: &str) -> Self {
        Self::new(TimestampEncoding::GeneralizedTime, digits)
    }
}

/// Broken-down UTC calendar time
///
/// Fields follow the C `struct tm` layout: `year` counts from 1900 and
/// `month` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarMoment {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl CalendarMoment {
    /// Decode a raw certificate timestamp
    ///
    /// A UTCTime needs at least 10 bytes and a GeneralizedTime at least 12.
    /// The seconds pair may be absent, in which case it reads as zero.
    pub fn decode(raw: &RawCertificateTimestamp) -> Result<Self, ProbeError> {
        let digits = raw.digits.as_slice();

        let (year, base) = match raw.encoding {
            TimestampEncoding::UtcTime => {
                if digits.len() < 10 {
                    return Err(ProbeError::MalformedTimestamp);
                }
                let year = digit_pair(digits, 0).ok_or(ProbeError::MalformedTimestamp)? as i32;
                // Pivot: 00-49 are 2000-2049, 50-99 are 1950-1999
                (if year < 50 { year + 100 } else { year }, 0)
            }
            TimestampEncoding::GeneralizedTime => {
                if digits.len() < 12 {
                    return Err(ProbeError::MalformedTimestamp);
                }
                let century = digit_pair(digits, 0).ok_or(ProbeError::MalformedTimestamp)?;
                let year = digit_pair(digits, 2).ok_or(ProbeError::MalformedTimestamp)?;
                ((century * 100 + year) as i32 - 1900, 2)
            }
        };

        let field = |offset: usize| {
            digit_pair(digits, base + offset).ok_or(ProbeError::MalformedTimestamp)
        };

        let month = field(2)?;
        if !(1..=12).contains(&month) {
            return Err(ProbeError::MalformedTimestamp);
        }

        Ok(CalendarMoment {
            year,
            month: month - 1,
            day: field(4)?,
            hour: field(6)?,
            minute: field(8)?,
            second: digit_pair(digits, base + 10).unwrap_or(0),
        })
    }

    /// Four-digit calendar year
    pub fn calendar_year(&self) -> i32 {
        self.year + 1900
    }

    /// Absolute instant, always interpreted as UTC
    ///
    /// Hour, minute and second overflow carries into the next unit; an
    /// impossible date is malformed.
    pub fn to_instant(&self) -> Result<DateTime<Utc>, ProbeError> {
        let midnight = NaiveDate::from_ymd_opt(self.calendar_year(), self.month + 1, self.day)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or(ProbeError::MalformedTimestamp)?;
        let offset = i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second);

        Ok(Utc.from_utc_datetime(&(midnight + Duration::seconds(offset))))
    }

    /// Break an instant down into calendar fields
    pub fn from_instant(instant: &DateTime<Utc>) -> Self {
        CalendarMoment {
            year: instant.year() - 1900,
            month: instant.month0(),
            day: instant.day(),
            hour: instant.hour(),
            minute: instant.minute(),
            second: instant.second(),
        }
    }

    /// Encode back into certificate form
    ///
    /// Returns `None` when the year does not fit the encoding.
    pub fn encode(&self, encoding: TimestampEncoding) -> Option<RawCertificateTimestamp> {
        let year = self.calendar_year();
        let prefix = match encoding {
            TimestampEncoding::UtcTime if (1950..2050).contains(&year) => format!("{:02}", year % 100),
            TimestampEncoding::GeneralizedTime if (0..10000).contains(&year) => format!("{:04}", year),
            _ => return None,
        };

        let digits = format!(
            "{}{:02}{:02}{:02}{:02}{:02}Z",
            prefix,
            self.month + 1,
            self.day,
            self.hour,
            self.minute,
            self.second
        );
        Some(RawCertificateTimestamp::new(encoding, digits))
    }
}

/// Two ASCII digits at `at`, as a number
fn digit_pair(digits: &[u8], at: usize) -> Option<u32> {
    let tens = *digits.get(at)?;
    let ones = *digits.get(at + 1)?;
    if !tens.is_ascii_digit() || !ones.is_ascii_digit() {
        return None;
    }
    Some(u32::from(tens - b'0') * 10 + u32::from(ones - b'0'))
}
