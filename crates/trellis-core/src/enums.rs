//! Enum types for the trellis work-item hierarchy.
//!
//! Statuses and type tags are stored and transported as snake_case strings.
//! Because the workflow graph is configurable, the string-backed enums keep
//! unknown values instead of failing: anything outside the built-in set
//! lands in a `Custom(String)` variant and round-trips verbatim.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Macro: string-backed enum with a Custom fallback.
//
// Generates the variant <-> string mapping, Default, Display, From<&str> /
// From<String>, and serde impls that serialize as the plain string.
// ---------------------------------------------------------------------------
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            default: $default:ident,
            $( $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
            /// Value outside the built-in set, kept verbatim.
            Custom(String),
        }

        impl $name {
            fn from_text(s: &str) -> Option<Self> {
                match s {
                    $( $text => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// The canonical string form.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $text, )+
                    Self::Custom(s) => s,
                }
            }

            /// Returns `true` unless this is a `Custom` value.
            pub fn is_builtin(&self) -> bool {
                !matches!(self, Self::Custom(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from_text(s).unwrap_or_else(|| Self::Custom(s.to_owned()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from_text(&s).unwrap_or(Self::Custom(s))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                String::deserialize(deserializer).map(Self::from)
            }
        }
    };
}

// ===========================================================================
// TaskStatus
// ===========================================================================

string_enum! {
    /// Current state of a task. The transition graph over these values comes
    /// from the workflow configuration; custom statuses are accepted when
    /// the configured flow declares them.
    TaskStatus {
        default: Todo,
        Todo => "todo",
        InProgress => "in_progress",
        ReadyForReview => "ready_for_review",
        Blocked => "blocked",
        Completed => "completed",
        Archived => "archived",
    }
}

impl TaskStatus {
    /// Returns `true` if the status may be stored under the given workflow:
    /// built-in values always, custom values only when the workflow declares
    /// them.
    pub fn is_declared_in(&self, declared: &[&str]) -> bool {
        match self {
            Self::Custom(s) => declared.contains(&s.as_str()),
            _ => true,
        }
    }
}

// ===========================================================================
// FeatureStatus
// ===========================================================================

string_enum! {
    /// Current state of a feature.
    FeatureStatus {
        default: Planning,
        Planning => "planning",
        InProgress => "in_progress",
        Completed => "completed",
        OnHold => "on_hold",
        Archived => "archived",
    }
}

impl FeatureStatus {
    /// Returns `true` if the feature counts as fully done for epic progress.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Archived)
    }
}

// ===========================================================================
// EpicStatus
// ===========================================================================

string_enum! {
    /// Current state of an epic.
    EpicStatus {
        default: Planning,
        Planning => "planning",
        InProgress => "in_progress",
        Completed => "completed",
        OnHold => "on_hold",
        Archived => "archived",
    }
}

// ===========================================================================
// AgentType
// ===========================================================================

string_enum! {
    /// Which kind of agent a task is intended for.
    AgentType {
        default: Generalist,
        Generalist => "generalist",
        Architect => "architect",
        Developer => "developer",
        Tester => "tester",
        Reviewer => "reviewer",
        Devops => "devops",
    }
}

// ===========================================================================
// RelationshipType
// ===========================================================================

string_enum! {
    /// Typed edge between two tasks.
    RelationshipType {
        default: DependsOn,
        DependsOn => "depends_on",
        Blocks => "blocks",
        RelatesTo => "relates_to",
        Duplicates => "duplicates",
        DiscoveredFrom => "discovered_from",
    }
}

impl RelationshipType {
    /// Returns `true` if this edge participates in cycle detection.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::DependsOn | Self::Blocks)
    }
}

// ===========================================================================
// NoteType
// ===========================================================================

string_enum! {
    /// Structured note category. Only built-in values pass validation; the
    /// Custom variant exists so unknown rows read back without data loss.
    NoteType {
        default: Comment,
        Comment => "comment",
        Decision => "decision",
        Implementation => "implementation",
        Testing => "testing",
        Solution => "solution",
        Blocker => "blocker",
        Reference => "reference",
        Rejection => "rejection",
    }
}

// ===========================================================================
// VerificationStatus
// ===========================================================================

string_enum! {
    /// Post-completion verification state of a task.
    VerificationStatus {
        default: Unverified,
        Unverified => "unverified",
        Verified => "verified",
        Rejected => "rejected",
    }
}

// ===========================================================================
// IdeaStatus
// ===========================================================================

string_enum! {
    /// Lifecycle state of a backlog idea.
    IdeaStatus {
        default: New,
        New => "new",
        Exploring => "exploring",
        OnHold => "on_hold",
        Converted => "converted",
        Rejected => "rejected",
    }
}

// ===========================================================================
// Priority
// ===========================================================================

/// Ordered priority scale for epics and ideas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

// ===========================================================================
// BusinessValue
// ===========================================================================

/// Ordered business-value scale for epics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BusinessValue {
    Low,
    #[default]
    Medium,
    High,
}

impl BusinessValue {
    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for BusinessValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BusinessValue {
    fn from(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl Serialize for BusinessValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BusinessValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

// ===========================================================================
// ConvertedType
// ===========================================================================

/// What an idea was converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertedType {
    Epic,
    Feature,
    Task,
}

impl ConvertedType {
    /// Returns the string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Task => "task",
        }
    }

    /// Parses from a stored string, `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "epic" => Some(Self::Epic),
            "feature" => Some(Self::Feature),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

impl fmt::Display for ConvertedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConvertedType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConvertedType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown converted type: {s}")))
    }
}
