/// Utility functions for expiry arithmetic and formatting
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format.
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(&format).unwrap_or_else(|_| dt.to_string())
}

/// Compute when a freshly issued token should be treated as expired
///
/// The safety margin is subtracted from the provider TTL so the token is
/// replaced before the provider rejects it. When the TTL is not larger than
/// the margin, half the TTL is used instead, and the result is never less
/// than one second after `issued_at`.
///
/// Returns `None` when the TTL reaches past the representable date range.
pub fn token_expiry(
    issued_at: OffsetDateTime,
    ttl_secs: u64,
    safety_margin: Duration,
) -> Option<OffsetDateTime> {
    let margin = safety_margin.as_secs();
    let lifetime = if ttl_secs > margin {
        ttl_secs - margin
    } else {
        ttl_secs / 2
    }
    .max(1);

    let lifetime = time::Duration::try_from(Duration::from_secs(lifetime)).ok()?;
    issued_at.checked_add(lifetime)
}

/// Render a metric as its canonical decimal string
///
/// Integral values print without a fractional part (`410`), everything
/// else uses the shortest representation that round-trips (`21.5`).
pub fn format_value(value: f64) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn expiry_subtracts_safety_margin() {
        let issued = datetime!(2026-03-01 08:00:00 UTC);
        let expiry = token_expiry(issued, 10800, Duration::from_secs(800));
        assert_eq!(expiry, Some(datetime!(2026-03-01 10:46:40 UTC)));
    }

    #[test]
    fn short_ttl_still_expires_in_the_future() {
        let issued = datetime!(2026-03-01 08:00:00 UTC);

        let expiry = token_expiry(issued, 600, Duration::from_secs(800));
        assert_eq!(expiry, Some(datetime!(2026-03-01 08:05:00 UTC)));

        let expiry = token_expiry(issued, 0, Duration::from_secs(800)).unwrap();
        assert!(expiry > issued);
    }

    #[test]
    fn huge_ttl_has_no_expiry() {
        let issued = datetime!(2026-03-01 08:00:00 UTC);
        let margin = Duration::from_secs(800);

        assert_eq!(token_expiry(issued, u64::MAX, margin), None);
        // Fits a time::Duration but lands past year 9999
        assert_eq!(token_expiry(issued, i64::MAX as u64, margin), None);
    }

    #[test]
    fn values_use_canonical_decimal_form() {
        assert_eq!(format_value(21.5), "21.5");
        assert_eq!(format_value(410.0), "410");
        assert_eq!(format_value(-3.2), "-3.2");
        assert_eq!(format_value(1013.7), "1013.7");
        assert_eq!(format_value(0.0), "0");
    }

    #[test]
    fn datetime_formatting() {
        let dt = datetime!(2026-10-19 07:05:09 UTC);
        assert_eq!(format_datetime(&dt), "19.10.2026 - 07:05:09");
    }
}
