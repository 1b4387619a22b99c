//! UTC timestamps for artifact names and payloads

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 UTC timestamp with millisecond precision, e.g. `2024-05-01T08:30:00.125Z`
#[inline]
#[must_use]
pub fn iso_stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Filesystem-safe variant of [`iso_stamp`]: colons become hyphens
///
/// Stamps sort lexically in chronological order.
#[inline]
#[must_use]
pub fn file_stamp(at: DateTime<Utc>) -> String {
    iso_stamp(at).replace(':', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn file_stamp_replaces_colons() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(iso_stamp(at), "2024-05-01T08:30:00.000Z");
        assert_eq!(file_stamp(at), "2024-05-01T08-30-00.000Z");
    }

    proptest! {
        #[test]
        fn file_stamp_is_safe_and_ordered(a in 0i64..4_000_000_000_000, b in 0i64..4_000_000_000_000) {
            let ta = DateTime::<Utc>::from_timestamp_millis(a).unwrap();
            let tb = DateTime::<Utc>::from_timestamp_millis(b).unwrap();
            let (sa, sb) = (file_stamp(ta), file_stamp(tb));
            prop_assert!(!sa.contains(':'));
            prop_assert_eq!(a.cmp(&b), sa.cmp(&sb));
        }
    }
}
