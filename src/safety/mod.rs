//! Statement Classification and Safety Gate
//!
//! This module decides whether a statement may run before any connection is
//! touched. It is deliberately lexical: classification looks at the leading
//! keyword, the blacklist is a substring check, and confirmation keywords are
//! matched on space boundaries. A keyword inside a string literal still
//! triggers confirmation; a keyword fused into a longer identifier does not.
//!
//! # Validation Strategy
//! - Pure text predicates, no failure mode
//! - Blacklist runs unconditionally and takes precedence over confirmation
//! - Advisories never block; their order is deterministic

use serde::{Deserialize, Serialize};

use crate::config::SafetyPolicy;

/// Coarse statement category derived from the leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Drop,
    Create,
    Alter,
    Truncate,
    Show,
    Describe,
    Explain,
    Unknown,
}

impl StatementKind {
    /// Get the keyword as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Drop => "DROP",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Truncate => "TRUNCATE",
            Self::Show => "SHOW",
            Self::Describe => "DESCRIBE",
            Self::Explain => "EXPLAIN",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether statements of this kind produce a result set
    #[must_use]
    pub const fn returns_rows(&self) -> bool {
        matches!(self, Self::Select | Self::Show | Self::Describe | Self::Explain)
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a statement by its first whitespace-delimited token
///
/// Trims, uppercases, takes the first token, and matches it against the fixed
/// keyword set. Anything else (including the empty string) is `Unknown`.
#[must_use]
pub fn classify(statement: &str) -> StatementKind {
    let upper = statement.trim().to_uppercase();
    match upper.split_whitespace().next() {
        Some("SELECT") => StatementKind::Select,
        Some("INSERT") => StatementKind::Insert,
        Some("UPDATE") => StatementKind::Update,
        Some("DELETE") => StatementKind::Delete,
        Some("DROP") => StatementKind::Drop,
        Some("CREATE") => StatementKind::Create,
        Some("ALTER") => StatementKind::Alter,
        Some("TRUNCATE") => StatementKind::Truncate,
        Some("SHOW") => StatementKind::Show,
        Some("DESCRIBE") => StatementKind::Describe,
        Some("EXPLAIN") => StatementKind::Explain,
        _ => StatementKind::Unknown,
    }
}

/// Advisory severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Info,
}

impl Severity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Info => "note",
        }
    }
}

/// Non-blocking observation about a statement's shape
///
/// Distinct from a blocking policy violation: advisories are attached to the
/// rendered output but never stop execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub severity: Severity,
    pub message: String,
    pub suggestion: String,
}

impl Advisory {
    fn warning(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into(), suggestion: suggestion.into() }
    }

    fn info(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self { severity: Severity::Info, message: message.into(), suggestion: suggestion.into() }
    }

    /// One-line rendering used above statement output
    #[must_use]
    pub fn render(&self) -> String {
        format!("{}: {} ({})", self.severity.as_str(), self.message, self.suggestion)
    }
}

/// Outcome of evaluating a statement against the safety policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// False when a blacklisted phrase matched
    pub allowed: bool,

    /// Reason naming the matched phrase, when blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,

    /// True when a confirmation keyword matched (and the statement is allowed)
    pub confirmation_required: bool,

    /// Message naming the matched keyword, when confirmation is required
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_message: Option<String>,

    /// Non-blocking advisories in deterministic order
    pub advisories: Vec<Advisory>,
}

/// Evaluate a statement against the policy
///
/// The blacklist check runs unconditionally and takes precedence over the
/// confirmation check. Advisories are computed for every statement. Matching
/// is lexical throughout: a confirmation keyword counts when it is the
/// statement's leading token or a standalone word bounded by spaces anywhere
/// else in the statement.
#[must_use]
pub fn evaluate(statement: &str, policy: &SafetyPolicy) -> SafetyVerdict {
    let trimmed = statement.trim();
    let upper = trimmed.to_uppercase();
    let kind = classify(trimmed);

    let block_reason = policy.blacklist.iter().find_map(|phrase| {
        let phrase = phrase.trim();
        if !phrase.is_empty() && upper.contains(&phrase.to_uppercase()) {
            Some(format!("statement matches blacklisted phrase '{phrase}'"))
        } else {
            None
        }
    });
    let allowed = block_reason.is_none();

    // Confirmation is moot for a blocked statement
    let confirmation_message = if allowed {
        policy.confirm_keywords.iter().find_map(|keyword| {
            let keyword = keyword.trim().to_uppercase();
            if keyword.is_empty() {
                return None;
            }
            let leading = upper.split_whitespace().next() == Some(keyword.as_str());
            let standalone = upper.contains(&format!(" {keyword} "));
            if leading || standalone {
                Some(format!("statement contains '{keyword}'; explicit confirmation is required"))
            } else {
                None
            }
        })
    } else {
        None
    };

    SafetyVerdict {
        allowed,
        block_reason,
        confirmation_required: confirmation_message.is_some(),
        confirmation_message,
        advisories: analyze(kind, &upper),
    }
}

/// Advisory analysis: WHERE-missing, then star, then limit
fn analyze(kind: StatementKind, upper: &str) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    if matches!(kind, StatementKind::Update | StatementKind::Delete) && !upper.contains("WHERE") {
        advisories.push(Advisory::warning(
            format!("{kind} statement has no WHERE clause"),
            "every row in the table will be affected",
        ));
    }

    if kind == StatementKind::Select {
        if upper.contains("SELECT *") {
            advisories.push(Advisory::warning(
                "SELECT * retrieves every column",
                "name only the columns you need",
            ));
        }
        if !upper.contains("LIMIT") {
            advisories.push(Advisory::info(
                "SELECT has no LIMIT clause",
                "the configured row limit will be appended",
            ));
        }
    }

    advisories
}

/// Append the default LIMIT to an unbounded SELECT
///
/// Only statements classified SELECT with no `LIMIT` token (case-insensitive
/// substring check) are touched; those get ` LIMIT {n}` appended to the
/// trimmed text. Everything else is returned unmodified, original casing and
/// whitespace intact.
#[must_use]
pub fn apply_default_limit(statement: &str, limit: u32) -> String {
    if classify(statement) == StatementKind::Select
        && !statement.to_uppercase().contains("LIMIT")
    {
        format!("{} LIMIT {limit}", statement.trim())
    } else {
        statement.to_string()
    }
}
