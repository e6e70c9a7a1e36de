//! Public key formats and lookup-reference parsing.
//!
//! Keys are the human-facing identifiers (`E07`, `E07-F11`, `T-E07-F11-003`),
//! distinct from the internal row ids. Callers may supply abbreviated or
//! slug-qualified forms; parsing normalizes the key portion to uppercase and
//! the slug portion to lowercase, splitting at the last numeric segment.

use regex::Regex;
use std::sync::LazyLock;

static EPIC_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E\d{2}$").expect("epic key regex"));
static FEATURE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E\d{2}-F\d{2}$").expect("feature key regex"));
static TASK_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T-E\d{2}-F\d{2}-\d{3}$").expect("task key regex"));

static EPIC_SEG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E\d{2}$").expect("epic segment regex"));
static FEATURE_SEG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^F\d{2}$").expect("feature segment regex"));
static SERIAL_SEG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{3}$").expect("serial segment regex"));

/// Returns `true` if `key` is a well-formed epic key (`E07`).
pub fn is_valid_epic_key(key: &str) -> bool {
    EPIC_KEY_RE.is_match(key)
}

/// Returns `true` if `key` is a well-formed feature key (`E07-F11`).
pub fn is_valid_feature_key(key: &str) -> bool {
    FEATURE_KEY_RE.is_match(key)
}

/// Returns `true` if `key` is a well-formed task key (`T-E07-F11-003`).
pub fn is_valid_task_key(key: &str) -> bool {
    TASK_KEY_RE.is_match(key)
}

/// Returns the feature key embedded in a task key (`T-E07-F11-003` -> `E07-F11`).
pub fn feature_key_of_task(task_key: &str) -> Option<String> {
    if !is_valid_task_key(task_key) {
        return None;
    }
    // "T-" prefix (2) .. "-NNN" suffix (4).
    Some(task_key[2..task_key.len() - 4].to_string())
}

/// Returns the epic key embedded in a feature key (`E07-F11` -> `E07`).
pub fn epic_key_of_feature(feature_key: &str) -> Option<String> {
    if !is_valid_feature_key(feature_key) {
        return None;
    }
    Some(feature_key[..3].to_string())
}

// ---------------------------------------------------------------------------
// Lookup references
// ---------------------------------------------------------------------------

/// How an epic lookup input should be matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpicRef {
    /// `E07` -- exact key.
    Exact(String),
    /// `E07-epic-name` -- key plus a human slug; resolved by the key portion.
    Slugged { key: String, slug: String },
}

/// How a feature lookup input should be matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureRef {
    /// `E07-F11` -- exact key.
    Exact(String),
    /// `F11` -- matched by key suffix among all features; may be ambiguous.
    Numeric(String),
    /// `F11-feature-slug` -- numeric suffix plus slug.
    NumericSlugged { number: String, slug: String },
    /// `E07-F11-feature-slug` -- full key plus slug; resolved by the key portion.
    Slugged { key: String, slug: String },
}

/// How a task lookup input should be matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    /// `T-E07-F11-003` -- exact key.
    Exact(String),
    /// `003` or `T-003` -- matched by serial suffix among all tasks; may be
    /// ambiguous.
    Numeric(String),
    /// `T-E07-F11-003-some-slug` -- full key plus slug; resolved by the key
    /// portion.
    Slugged { key: String, slug: String },
}

impl EpicRef {
    /// The key (or key fragment) this reference matches on.
    pub fn key_part(&self) -> &str {
        match self {
            Self::Exact(k) => k,
            Self::Slugged { key, .. } => key,
        }
    }
}

impl FeatureRef {
    /// The key (or key fragment) this reference matches on.
    pub fn key_part(&self) -> &str {
        match self {
            Self::Exact(k) => k,
            Self::Numeric(n) => n,
            Self::NumericSlugged { number, .. } => number,
            Self::Slugged { key, .. } => key,
        }
    }
}

impl TaskRef {
    /// The key (or key fragment) this reference matches on.
    pub fn key_part(&self) -> &str {
        match self {
            Self::Exact(k) => k,
            Self::Numeric(n) => n,
            Self::Slugged { key, .. } => key,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a caller-supplied epic reference. Returns `None` if the input does
/// not start with a well-formed epic segment.
pub fn parse_epic_ref(input: &str) -> Option<EpicRef> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let segments: Vec<&str> = trimmed.split('-').collect();
    let head = segments[0].to_uppercase();
    if !EPIC_SEG_RE.is_match(&head) {
        return None;
    }
    if segments.len() == 1 {
        return Some(EpicRef::Exact(head));
    }
    Some(EpicRef::Slugged {
        key: head,
        slug: segments[1..].join("-").to_lowercase(),
    })
}

/// Parses a caller-supplied feature reference.
pub fn parse_feature_ref(input: &str) -> Option<FeatureRef> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let segments: Vec<&str> = trimmed.split('-').collect();
    let first = segments[0].to_uppercase();

    if EPIC_SEG_RE.is_match(&first) {
        if segments.len() < 2 {
            return None;
        }
        let second = segments[1].to_uppercase();
        if !FEATURE_SEG_RE.is_match(&second) {
            return None;
        }
        let key = format!("{first}-{second}");
        if segments.len() == 2 {
            return Some(FeatureRef::Exact(key));
        }
        return Some(FeatureRef::Slugged {
            key,
            slug: segments[2..].join("-").to_lowercase(),
        });
    }

    if FEATURE_SEG_RE.is_match(&first) {
        if segments.len() == 1 {
            return Some(FeatureRef::Numeric(first));
        }
        return Some(FeatureRef::NumericSlugged {
            number: first,
            slug: segments[1..].join("-").to_lowercase(),
        });
    }

    None
}

/// Parses a caller-supplied task reference.
pub fn parse_task_ref(input: &str) -> Option<TaskRef> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let segments: Vec<&str> = trimmed.split('-').collect();
    let first = segments[0].to_uppercase();

    // Bare three-digit serial.
    if segments.len() == 1 && SERIAL_SEG_RE.is_match(&first) {
        return Some(TaskRef::Numeric(first));
    }

    if first != "T" || segments.len() < 2 {
        return None;
    }

    // T-003 shorthand.
    let second = segments[1].to_uppercase();
    if segments.len() == 2 && SERIAL_SEG_RE.is_match(&second) {
        return Some(TaskRef::Numeric(second));
    }

    // Full key: T-E07-F11-003, optionally followed by a slug.
    if segments.len() < 4 {
        return None;
    }
    let epic = segments[1].to_uppercase();
    let feature = segments[2].to_uppercase();
    let serial = segments[3].to_uppercase();
    if !EPIC_SEG_RE.is_match(&epic)
        || !FEATURE_SEG_RE.is_match(&feature)
        || !SERIAL_SEG_RE.is_match(&serial)
    {
        return None;
    }
    let key = format!("T-{epic}-{feature}-{serial}");
    if segments.len() == 4 {
        return Some(TaskRef::Exact(key));
    }
    Some(TaskRef::Slugged {
        key,
        slug: segments[4..].join("-").to_lowercase(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_format_validation() {
        assert!(is_valid_epic_key("E07"));
        assert!(!is_valid_epic_key("E7"));
        assert!(!is_valid_epic_key("E007"));
        assert!(is_valid_feature_key("E07-F11"));
        assert!(!is_valid_feature_key("F11"));
        assert!(is_valid_task_key("T-E07-F11-003"));
        assert!(!is_valid_task_key("T-E07-F11-03"));
        assert!(!is_valid_task_key("E07-F11-003"));
    }

    #[test]
    fn key_fragments() {
        assert_eq!(
            feature_key_of_task("T-E07-F11-003").as_deref(),
            Some("E07-F11")
        );
        assert_eq!(feature_key_of_task("T-bogus"), None);
        assert_eq!(epic_key_of_feature("E07-F11").as_deref(), Some("E07"));
    }

    #[test]
    fn parse_epic_exact_and_slugged() {
        assert_eq!(parse_epic_ref("E07"), Some(EpicRef::Exact("E07".into())));
        // Key portion normalized to uppercase, slug to lowercase.
        assert_eq!(
            parse_epic_ref("e07-User-Auth"),
            Some(EpicRef::Slugged {
                key: "E07".into(),
                slug: "user-auth".into()
            })
        );
        assert_eq!(parse_epic_ref("X07"), None);
        assert_eq!(parse_epic_ref(""), None);
    }

    #[test]
    fn parse_feature_forms() {
        assert_eq!(
            parse_feature_ref("E07-F11"),
            Some(FeatureRef::Exact("E07-F11".into()))
        );
        assert_eq!(
            parse_feature_ref("f11"),
            Some(FeatureRef::Numeric("F11".into()))
        );
        assert_eq!(
            parse_feature_ref("F11-login-flow"),
            Some(FeatureRef::NumericSlugged {
                number: "F11".into(),
                slug: "login-flow".into()
            })
        );
        assert_eq!(
            parse_feature_ref("E07-F11-Login-Flow"),
            Some(FeatureRef::Slugged {
                key: "E07-F11".into(),
                slug: "login-flow".into()
            })
        );
        assert_eq!(parse_feature_ref("E07"), None);
    }

    #[test]
    fn parse_task_forms() {
        assert_eq!(
            parse_task_ref("T-E07-F11-003"),
            Some(TaskRef::Exact("T-E07-F11-003".into()))
        );
        assert_eq!(parse_task_ref("003"), Some(TaskRef::Numeric("003".into())));
        assert_eq!(
            parse_task_ref("t-003"),
            Some(TaskRef::Numeric("003".into()))
        );
        assert_eq!(
            parse_task_ref("t-e07-f11-003-fix-login"),
            Some(TaskRef::Slugged {
                key: "T-E07-F11-003".into(),
                slug: "fix-login".into()
            })
        );
        assert_eq!(parse_task_ref("T-E07-003"), None);
        assert_eq!(parse_task_ref("42"), None);
    }
}
