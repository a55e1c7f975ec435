//! # Dedup Rule Tests
//!
//! Rule evaluation on its own and as the gate in front of `upsert`.

mod common;

use crate::common::{catering_form, customer, memory_store, setup_tracing};
use anyform::dedup::{self, ConflictPolicy, DedupRule, MatchMode};
use anyform::errors::FormError;
use anyform::model::{FieldValue, LocalizedText, Record};
use anyhow::Result;

fn rule(mode: MatchMode, policy: ConflictPolicy) -> DedupRule {
    DedupRule {
        id: "one-order-per-dish".to_string(),
        scope: "form".to_string(),
        keys: vec!["NAME".to_string(), "DISH".to_string()],
        match_mode: mode,
        on_conflict: policy,
        message: LocalizedText::new(&[
            ("EN", "You already ordered this dish."),
            ("FR", "Vous avez déjà commandé ce plat."),
        ]),
    }
}

#[tokio::test]
async fn test_exact_rule_rejects_second_insert() -> Result<()> {
    setup_tracing();

    // --- 1. Arrange ---
    let mut form = catering_form();
    form.dedup_rules = vec![rule(MatchMode::Exact, ConflictPolicy::Reject)];
    let (store, table, _cache) = memory_store();
    store.upsert(&form, customer("a", "Ann", "Soup")).await?;
    let writes_before = table.write_count();

    // --- 2. Act ---
    let result = store.upsert(&form, customer("b", "Ann", "Soup")).await;

    // --- 3. Assert ---
    match result {
        Err(FormError::Conflict { rule_id, message }) => {
            assert_eq!(rule_id, "one-order-per-dish");
            assert_eq!(message, "You already ordered this dish.");
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(table.write_count(), writes_before, "a rejected write touches nothing");
    assert_eq!(table.rows().await.len(), 2);
    Ok(())
}

#[test]
fn test_case_insensitive_mode_collides_on_case() {
    let existing = vec![customer("a", "Ann", "Soup")];
    let candidate = customer("b", "ann", "soup");

    let exact = dedup::evaluate(
        &[rule(MatchMode::Exact, ConflictPolicy::Reject)],
        &candidate,
        &existing,
        "EN",
    );
    let insensitive = dedup::evaluate(
        &[rule(MatchMode::CaseInsensitive, ConflictPolicy::Reject)],
        &candidate,
        &existing,
        "EN",
    );

    assert!(exact.is_none(), "exact mode keeps Soup and soup apart");
    assert!(insensitive.is_some(), "Soup and soup collide");
}

#[tokio::test]
async fn test_record_never_conflicts_with_itself() -> Result<()> {
    setup_tracing();
    let mut form = catering_form();
    form.dedup_rules = vec![rule(MatchMode::Exact, ConflictPolicy::Reject)];
    let (store, _table, _cache) = memory_store();
    store.upsert(&form, customer("a", "Ann", "Soup")).await?;

    let outcome = store.upsert(&form, customer("a", "Ann", "Soup")).await?;

    assert!(!outcome.created);
    Ok(())
}

#[test]
fn test_ignore_allows_and_merge_rejects() {
    let existing = vec![customer("a", "Ann", "Soup")];
    let candidate = customer("b", "Ann", "Soup");

    let ignored = dedup::evaluate(
        &[rule(MatchMode::Exact, ConflictPolicy::Ignore)],
        &candidate,
        &existing,
        "EN",
    );
    let merged = dedup::evaluate(
        &[rule(MatchMode::Exact, ConflictPolicy::Merge)],
        &candidate,
        &existing,
        "FR",
    );

    assert!(ignored.is_none());
    let merged = merged.expect("merge behaves like reject");
    assert_eq!(merged.message, "Vous avez déjà commandé ce plat.");
}

#[test]
fn test_empty_key_component_skips_rule() {
    let existing = vec![Record::new("EN")
        .with_id("a")
        .with_value("NAME", FieldValue::text("Ann"))];
    let candidate = Record::new("EN")
        .with_id("b")
        .with_value("NAME", FieldValue::text("Ann"))
        .with_value("DISH", FieldValue::text("  "));

    let conflict = dedup::evaluate(
        &[rule(MatchMode::Exact, ConflictPolicy::Reject)],
        &candidate,
        &existing,
        "EN",
    );

    assert!(conflict.is_none());
}

#[test]
fn test_first_matching_rule_wins() {
    let existing = vec![customer("a", "Ann", "Soup")];
    let candidate = customer("b", "Ann", "Soup");
    let mut by_name = rule(MatchMode::Exact, ConflictPolicy::Ignore);
    by_name.id = "by-name".to_string();
    by_name.keys = vec!["NAME".to_string()];

    // The ignoring rule matches first and ends evaluation.
    let conflict = dedup::evaluate(
        &[by_name, rule(MatchMode::Exact, ConflictPolicy::Reject)],
        &candidate,
        &existing,
        "EN",
    );

    assert!(conflict.is_none());
}

#[test]
fn test_list_values_are_joined_into_the_key() {
    let mut tags = rule(MatchMode::CaseInsensitive, ConflictPolicy::Reject);
    tags.keys = vec!["TAGS".to_string()];
    let existing = vec![Record::new("EN")
        .with_id("a")
        .with_value("TAGS", FieldValue::list(&["Vegan", "Spicy"]))];
    let candidate = Record::new("EN")
        .with_id("b")
        .with_value("TAGS", FieldValue::list(&["vegan", "spicy"]));

    assert!(dedup::evaluate(&[tags], &candidate, &existing, "EN").is_some());
}

#[test]
fn test_rule_parses_from_config_row() -> Result<()> {
    let cells: Vec<String> = [
        "dup-email",
        "form",
        "EMAIL, SITE",
        "caseInsensitive",
        "reject",
        r#"{"EN": "Already registered", "NL": "Al geregistreerd"}"#,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();

    let parsed = DedupRule::from_config_row(&cells)?;

    assert_eq!(parsed.keys, vec!["EMAIL", "SITE"]);
    assert_eq!(parsed.match_mode, MatchMode::CaseInsensitive);
    assert_eq!(parsed.on_conflict, ConflictPolicy::Reject);
    assert_eq!(parsed.message.resolve("NL"), Some("Al geregistreerd"));
    assert!(DedupRule::from_config_row(&["x".to_string()]).is_err());
    Ok(())
}
