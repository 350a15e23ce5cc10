//! Text utilities: slug canonicalisation and duration humanising

/// Canonicalise a human label into a slug.
///
/// Lowercases, maps every non-alphanumeric run to a single `_`, and trims
/// leading/trailing underscores. Input that carries no alphanumerics slugs
/// to the empty string.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}

/// Render a whole number of hours as the largest fitting coarse unit.
///
/// Months are the 730-hour average month, weeks 168 hours, days 24.
pub fn humanize_hours(hours: i64) -> String {
    fn plural(count: i64, unit: &str) -> String {
        if count == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", count, unit)
        }
    }

    if hours >= 730 {
        plural(hours / 730, "month")
    } else if hours >= 168 {
        plural(hours / 168, "week")
    } else if hours >= 24 {
        plural(hours / 24, "day")
    } else {
        plural(hours, "hour")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("In Progress"), "in_progress");
        assert_eq!(slugify("  ---  "), "");
        assert_eq!(slugify("Awaiting / Vendor"), "awaiting_vendor");
        assert_eq!(slugify("already_slugged"), "already_slugged");
        assert_eq!(slugify("UPPER"), "upper");
        assert_eq!(slugify("a--b__c"), "a_b_c");
        assert_eq!(slugify("_edge_"), "edge");
    }

    #[test]
    fn test_humanize_hours() {
        assert_eq!(humanize_hours(1), "1 hour");
        assert_eq!(humanize_hours(5), "5 hours");
        assert_eq!(humanize_hours(24), "1 day");
        assert_eq!(humanize_hours(72), "3 days");
        assert_eq!(humanize_hours(168), "1 week");
        assert_eq!(humanize_hours(336), "2 weeks");
        assert_eq!(humanize_hours(730), "1 month");
        assert_eq!(humanize_hours(1460), "2 months");
    }
}
