//! MQTT topic-pattern matching (`+` single-level, `#` multi-level
//! wildcards), used to decide which remote handlers care about a
//! locally posted event.

pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern_levels: Vec<&str> = pattern.split('/').collect();
    let topic_levels: Vec<&str> = topic.split('/').collect();
    matches_levels(&pattern_levels, &topic_levels)
}

fn matches_levels(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.first() {
        None => topic.is_empty(),
        Some(&"#") => true,
        Some(&"+") => {
            if topic.is_empty() {
                false
            } else {
                matches_levels(&pattern[1..], &topic[1..])
            }
        }
        Some(level) => {
            if topic.first() == Some(level) {
                matches_levels(&pattern[1..], &topic[1..])
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(topic_matches("a/b/c", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b/d"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(topic_matches("a/+/c", "a/b/c"));
        assert!(!topic_matches("a/+/c", "a/b/c/d"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(topic_matches("a/#", "a/b/c"));
        assert!(topic_matches("a/#", "a"));
        assert!(!topic_matches("a/#", "x/b/c"));
    }
}
