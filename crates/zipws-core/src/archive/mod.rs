//! Archive handling: safe extraction, repacking, and content hashing.
//!
//! The zip format is handled exclusively through the `zip` crate's
//! fallible APIs; declared sizes from the central directory are treated as
//! untrusted and re-checked against actual stream lengths during
//! extraction.

mod extract;
mod hash;
mod pack;

pub use extract::{extract, Extracted};
pub use hash::hash_file;
pub use pack::pack;

use chrono::{NaiveDate, NaiveDateTime};

/// Converts a zip datetime (timezone-less, two-second resolution) to unix
/// seconds, interpreting it as UTC. Returns `None` for values outside the
/// representable calendar.
#[must_use]
pub fn zip_datetime_to_unix(dt: &zip::DateTime) -> Option<i64> {
    let date = NaiveDate::from_ymd_opt(
        i32::from(dt.year()),
        u32::from(dt.month()),
        u32::from(dt.day()),
    )?;
    let datetime: NaiveDateTime = date.and_hms_opt(
        u32::from(dt.hour()),
        u32::from(dt.minute()),
        u32::from(dt.second()),
    )?;
    Some(datetime.and_utc().timestamp())
}
