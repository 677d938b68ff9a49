//! Topic helpers
//!
//! A topic is the dotted path of a node below the root. The root itself has
//! the empty topic; `server.port` is field `port` of field `server`.

use std::cmp::Ordering;

/// Separator between path segments
pub const SEPARATOR: char = '.';

/// Wildcard segment accepted in section patterns
pub const WILDCARD: &str = "*";

/// Join a parent topic and a child segment
pub fn join(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        let mut topic = String::with_capacity(parent.len() + 1 + segment.len());
        topic.push_str(parent);
        topic.push(SEPARATOR);
        topic.push_str(segment);
        topic
    }
}

/// Split a topic into its segments (the root topic has none)
pub fn segments(topic: &str) -> impl Iterator<Item = &str> {
    let empty = topic.is_empty();
    topic.split(SEPARATOR).filter(move |_| !empty)
}

/// Number of segments in a topic
pub fn depth(topic: &str) -> usize {
    segments(topic).count()
}

/// Topic of the parent node, `None` for the root
pub fn parent(topic: &str) -> Option<&str> {
    if topic.is_empty() {
        return None;
    }
    Some(topic.rfind(SEPARATOR).map_or("", |pos| &topic[..pos]))
}

/// Whether `topic` is `ancestor` itself or lies below it
pub fn is_within(topic: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() || topic == ancestor {
        return true;
    }
    topic.len() > ancestor.len()
        && topic.starts_with(ancestor)
        && topic[ancestor.len()..].starts_with(SEPARATOR)
}

/// Whether a segment can be used as a path component
pub fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(SEPARATOR)
}

/// Match a path against a pattern where `*` stands for any one segment
pub fn matches_pattern(pattern: &str, topic: &str) -> bool {
    let mut pattern_segments = segments(pattern);
    let mut topic_segments = segments(topic);
    loop {
        match (pattern_segments.next(), topic_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(t)) if p == WILDCARD || p == t => continue,
            _ => return false,
        }
    }
}

/// Order topics segment by segment, comparing numeric segments as numbers
///
/// Keeps `list.2` before `list.10` so sequences are rebuilt in order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = segments(a);
    let mut right = segments(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}
