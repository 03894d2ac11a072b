//! Broker-style subscription filter matching
//!
//! Filter wildcards:
//! - `+` matches exactly one level
//! - `#` matches the remaining levels, including none (`sport/#` matches `sport`)
//!
//! Topics starting with `$` are not matched by a wildcard in the first level.
//! A malformed filter (see [`is_valid_filter`]) matches nothing.

/// Check if a topic matches a subscription filter
///
/// # Example
///
/// ```ignore
/// use mqtt2influx::topic::matches_subscription;
///
/// assert!(matches_subscription("home/+/temp", "home/kitchen/temp"));
/// assert!(matches_subscription("home/#", "home"));
/// assert!(!matches_subscription("#", "$SYS/uptime"));
/// ```
pub fn matches_subscription(filter: &str, topic: &str) -> bool {
    if !is_valid_filter(filter) {
        return false;
    }

    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    if filter == topic || filter == "#" {
        return true;
    }

    let mut topic_parts = topic.split('/');

    for level in filter.split('/') {
        if level == "#" {
            return true;
        }

        match topic_parts.next() {
            Some(part) if level == "+" || level == part => {}
            _ => return false,
        }
    }

    topic_parts.next().is_none()
}

/// Check that a filter is acceptable as a subscription
///
/// `#` must be the last level, and wildcards must occupy a whole level.
pub fn is_valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;

    levels.iter().enumerate().all(|(index, level)| match *level {
        "#" => index == last,
        "+" => true,
        other => !other.contains('+') && !other.contains('#'),
    })
}
