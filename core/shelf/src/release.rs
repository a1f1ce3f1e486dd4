//! Release identifiers and stored-artifact references.
//!
//! A release is identified by its version string together with the publish
//! timestamp reported by the registry. Two releases that share a version but
//! were published at different times are different releases.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one published compiler release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReleaseId {
    /// The version string (e.g., "2.0.20").
    pub version: String,
    /// Publish time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ReleaseId {
    #[must_use]
    pub fn new(version: impl Into<String>, timestamp: i64) -> Self {
        Self {
            version: version.into(),
            timestamp,
        }
    }

    /// Orders releases for display: newest first, ties broken by version.
    #[must_use]
    pub fn display_order(a: &Self, b: &Self) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.version.cmp(&a.version))
    }

    /// Returns the publish date as `YYYY-MM-DD` (UTC).
    #[must_use]
    pub fn published_on(&self) -> String {
        let secs = u64::try_from(self.timestamp / 1000).unwrap_or(0);
        let date = CivilDate::from_unix_secs(secs);
        format!("{:04}-{:02}-{:02}", date.year, date.month, date.day)
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.timestamp)
    }
}

/// Sorts releases in display order (newest first).
pub fn sort_for_display(releases: &mut [ReleaseId]) {
    releases.sort_by(ReleaseId::display_order);
}

/// Names an artifact held by an [`ArtifactStore`](crate::store::ArtifactStore).
///
/// The key is opaque to the core; the filesystem store uses the file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef(String);

impl BlobRef {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Calendar date computed from a Unix timestamp.
struct CivilDate {
    year: u64,
    month: u64,
    day: u64,
}

impl CivilDate {
    /// Proleptic Gregorian date of `secs`, counted in 400-year eras that
    /// start on March 1 so the leap day falls at the end of each year.
    fn from_unix_secs(secs: u64) -> Self {
        const DAYS_PER_ERA: u64 = 146_097;
        // Days from 0000-03-01 to 1970-01-01.
        const EPOCH_SHIFT: u64 = 719_468;

        let days = secs / 86_400 + EPOCH_SHIFT;
        let era = days / DAYS_PER_ERA;
        let day_of_era = days % DAYS_PER_ERA;
        let year_of_era =
            (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
        let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
        let shifted_month = (5 * day_of_year + 2) / 153;

        let day = day_of_year - (153 * shifted_month + 2) / 5 + 1;
        let month = if shifted_month < 10 {
            shifted_month + 3
        } else {
            shifted_month - 9
        };
        let year = era * 400 + year_of_era + u64::from(month <= 2);
        Self { year, month, day }
    }
}
