//! Safety Gate Edge Cases
//!
//! The gate is deliberately lexical; these tests pin down exactly where that
//! choice over- and under-triggers so the behavior stays deterministic.

use pretty_assertions::assert_eq;

use sqlward::{apply_default_limit, classify, evaluate, SafetyPolicy, StatementKind};

fn policy() -> SafetyPolicy {
    SafetyPolicy {
        row_limit: 100,
        confirm_keywords: ["DELETE", "UPDATE", "DROP", "TRUNCATE", "ALTER"]
            .iter()
            .map(ToString::to_string)
            .collect(),
        blacklist: vec!["DROP DATABASE".to_string(), "GRANT ALL".to_string()],
    }
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_classify_spec_reference_cases() {
    assert_eq!(classify("  select id from t  "), StatementKind::Select);
    assert_eq!(classify(""), StatementKind::Unknown);
}

#[test]
fn test_classify_handles_tabs_and_newlines() {
    assert_eq!(classify("\n\tSELECT\n1"), StatementKind::Select);
    assert_eq!(classify("\tshow tables"), StatementKind::Show);
}

#[test]
fn test_classify_keyword_must_be_whole_token() {
    assert_eq!(classify("SELECTION FROM t"), StatementKind::Unknown);
    assert_eq!(classify("DELETED_ROWS()"), StatementKind::Unknown);
}

#[test]
fn test_classify_cte_is_unknown() {
    // WITH is outside the fixed keyword set
    assert_eq!(classify("WITH cte AS (SELECT 1) SELECT * FROM cte"), StatementKind::Unknown);
}

// ============================================================================
// Blacklist
// ============================================================================

#[test]
fn test_blacklist_matches_every_casing() {
    for statement in ["DROP DATABASE x", "drop database x", "DrOp DaTaBaSe x"] {
        let verdict = evaluate(statement, &policy());
        assert!(!verdict.allowed, "should block: {statement}");
    }
}

#[test]
fn test_blacklist_is_a_substring_check() {
    // The phrase anywhere in the text blocks, even mid-statement
    let verdict = evaluate("SELECT 1 /* then DROP DATABASE prod */", &policy());
    assert!(!verdict.allowed);
}

#[test]
fn test_blacklist_first_match_named() {
    let verdict = evaluate("GRANT ALL; DROP DATABASE x", &policy());
    // Policy order decides which phrase the reason names
    assert!(verdict.block_reason.unwrap().contains("DROP DATABASE"));
}

#[test]
fn test_blacklist_no_partial_phrase_match() {
    let verdict = evaluate("SELECT drop_database_log FROM audit LIMIT 5", &policy());
    // "DROP DATABASE" has a space; the fused identifier does not contain it
    assert!(verdict.allowed);
}

// ============================================================================
// Confirmation Boundaries
// ============================================================================

#[test]
fn test_keyword_as_leading_token() {
    let verdict = evaluate("TRUNCATE audit_log", &policy());
    assert!(verdict.confirmation_required);
}

#[test]
fn test_keyword_space_bounded_mid_statement() {
    let verdict = evaluate("EXPLAIN UPDATE t SET a = 1 WHERE id = 2", &policy());
    assert!(verdict.confirmation_required);
    assert!(verdict.confirmation_message.unwrap().contains("UPDATE"));
}

#[test]
fn test_keyword_fused_into_identifier_does_not_trigger() {
    for statement in [
        "SELECT updated_at FROM t LIMIT 1",
        "SELECT * FROM deleted_items LIMIT 1",
        "SELECT dropped FROM t LIMIT 1",
    ] {
        let verdict = evaluate(statement, &policy());
        assert!(!verdict.confirmation_required, "should not trigger: {statement}");
    }
}

#[test]
fn test_keyword_inside_string_literal_still_triggers() {
    // Lexical matching cannot see quoting; this over-trigger is accepted
    let verdict = evaluate("SELECT 'DROP the beat' AS title LIMIT 1", &policy());
    assert!(verdict.confirmation_required);
}

#[test]
fn test_trailing_keyword_without_both_bounds_does_not_trigger() {
    // Bounded-by-spaces means both sides; a keyword ending the statement has
    // no trailing space and is not the leading token
    let verdict = evaluate("SELECT 1 AS drop", &policy());
    assert!(!verdict.confirmation_required);
}

// ============================================================================
// Limit Injection
// ============================================================================

#[test]
fn test_limit_injection_reference_cases() {
    assert_eq!(apply_default_limit("SELECT * FROM t", 100), "SELECT * FROM t LIMIT 100");
    assert_eq!(apply_default_limit("SELECT * FROM t LIMIT 5", 100), "SELECT * FROM t LIMIT 5");
    assert_eq!(apply_default_limit("DELETE FROM t", 100), "DELETE FROM t");
}

#[test]
fn test_limit_injection_preserves_interior_whitespace() {
    assert_eq!(
        apply_default_limit("  SELECT a,\n       b FROM t  ", 10),
        "SELECT a,\n       b FROM t LIMIT 10"
    );
}

#[test]
fn test_limit_substring_anywhere_suppresses_injection() {
    // Lexical check: a column named "limit_value" already contains LIMIT
    let statement = "SELECT limit_value FROM quotas";
    assert_eq!(apply_default_limit(statement, 100), statement);
}

#[test]
fn test_limit_injection_ignores_unknown_statements() {
    let statement = "WITH cte AS (SELECT 1) SELECT * FROM cte";
    assert_eq!(apply_default_limit(statement, 100), statement);
}

// ============================================================================
// Policy Corners
// ============================================================================

#[test]
fn test_empty_policy_allows_everything() {
    let empty = SafetyPolicy { row_limit: 100, confirm_keywords: vec![], blacklist: vec![] };
    let verdict = evaluate("DROP DATABASE prod", &empty);
    assert!(verdict.allowed);
    assert!(!verdict.confirmation_required);
}

#[test]
fn test_blank_policy_entries_are_ignored() {
    let sloppy = SafetyPolicy {
        row_limit: 100,
        confirm_keywords: vec![String::new(), "  ".to_string()],
        blacklist: vec![String::new()],
    };
    let verdict = evaluate("SELECT 1 LIMIT 1", &sloppy);
    assert!(verdict.allowed);
    assert!(!verdict.confirmation_required);
}

#[test]
fn test_advisories_never_block() {
    let verdict = evaluate("UPDATE t SET a = 1", &policy());
    // Confirmation is required and two observations fire, yet allowed stays true
    assert!(verdict.allowed);
    assert!(verdict.confirmation_required);
    assert_eq!(verdict.advisories.len(), 1);
}
