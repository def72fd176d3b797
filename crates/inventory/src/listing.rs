//! crates/inventory/src/listing.rs
//!
//! Parsing of `zfs list -H -o name,creation` output.

use regex::Regex;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::dataset::{Dataset, DatasetKind};
use crate::error::InventoryError;

/// `Www Mmm d hh:mm yyyy` after whitespace runs are collapsed.
const CREATION_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short] [month repr:short] [day padding:none] [hour]:[minute] [year]"
);

/// Parses a `creation` column.
///
/// Accepts the human-readable form `zfs` prints by default (the day of month
/// is space padded) and the seconds-since-epoch form printed with `-p`.
///
/// ```
/// use inventory::parse_creation;
///
/// let created = parse_creation("Mon Jan  1 12:00 2024").unwrap();
/// assert_eq!(created.to_string(), "2024-01-01 12:00:00.0");
/// assert!(parse_creation("yesterday").is_none());
/// ```
#[must_use]
pub fn parse_creation(value: &str) -> Option<PrimitiveDateTime> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit()) {
        let seconds = value.parse::<i64>().ok()?;
        let moment = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
        return Some(PrimitiveDateTime::new(moment.date(), moment.time()));
    }

    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    PrimitiveDateTime::parse(&collapsed, CREATION_FORMAT).ok()
}

/// Turns listing rows into records, keeping those whose name matches `pattern`.
///
/// Row order is preserved, so a listing sorted by creation yields records
/// oldest-first. Blank rows are ignored.
///
/// # Errors
///
/// Fails on a row that is not exactly `name<TAB>creation`, or on a matching
/// row whose creation column cannot be parsed.
pub fn parse_listing<I, S>(
    lines: I,
    kind: DatasetKind,
    pattern: &Regex,
) -> Result<Vec<Dataset>, InventoryError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }

        let mut fields = line.split('\t');
        let (Some(name), Some(creation), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(InventoryError::MalformedListing {
                line: line.to_owned(),
            });
        };
        if name.is_empty() {
            return Err(InventoryError::MalformedListing {
                line: line.to_owned(),
            });
        }
        if !pattern.is_match(name) {
            continue;
        }

        let created = parse_creation(creation).ok_or_else(|| InventoryError::InvalidTimestamp {
            name: name.to_owned(),
            value: creation.to_owned(),
        })?;
        records.push(Dataset::new(name, kind, created));
    }
    Ok(records)
}
