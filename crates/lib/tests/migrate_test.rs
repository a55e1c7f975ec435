//! # Template Migrator Tests

mod common;

use crate::common::{paragraph_document, setup_tracing};
use anyform::migrate::{self, migrate_template};
use anyform::model::{
    FieldDef, LineItemGroupSchema, LocalizedText, QuestionSchema, QuestionType, SubGroupSchema,
};
use anyform::providers::documents::{DocumentStore, MemoryDocumentStore};
use anyform::render::{Block, Table, TemplateDocument};
use anyhow::Result;

/// `FIRST` and `LAST` share the label "Name", so `{{NAME}}` is ambiguous.
fn legacy_schema() -> QuestionSchema {
    let items = LineItemGroupSchema::new(vec![
        FieldDef::new("ITEM", "Dish name", QuestionType::Text),
        FieldDef::new("QTY", "Quantity", QuestionType::Number),
    ]);
    QuestionSchema::new(
        "legacy",
        vec![
            FieldDef::new("FIRST", "Name", QuestionType::Text),
            FieldDef::new("LAST", "Name", QuestionType::Text),
            FieldDef::new("EMAIL", "E-mail address", QuestionType::Text),
            FieldDef::group("ORDERS", "Orders", items),
        ],
    )
}

#[tokio::test]
async fn test_ambiguous_slug_is_skipped_with_one_warning_and_rerun_is_noop() -> Result<()> {
    setup_tracing();

    // --- 1. Arrange ---
    let schema = legacy_schema();
    let documents = MemoryDocumentStore::new();
    documents
        .insert(paragraph_document(
            "tpl",
            "{{NAME}} <{{E_MAIL_ADDRESS}}> {{LABEL(E_MAIL_ADDRESS)}} {{COUNT(ORDERS)}} \
             {{CONSOLIDATED(ORDERS.DISH_NAME)}}",
        ))
        .await;

    // --- 2. Act ---
    let first = migrate_template(&schema, &documents, "tpl", false).await?;
    let second = migrate_template(&schema, &documents, "tpl", false).await?;

    // --- 3. Assert ---
    assert!(first.success);
    assert_eq!(first.warnings.len(), 1, "{:?}", first.warnings);
    assert!(first.warnings[0].contains("NAME"));
    assert_eq!(first.rewrites.get("plain"), Some(&1));
    assert_eq!(first.rewrites.get("LABEL"), Some(&1));
    assert_eq!(first.rewrites.get("CONSOLIDATED"), Some(&1));
    assert_eq!(first.rewrites.get("COUNT"), None);

    let stored = documents.fetch("tpl").await?;
    assert_eq!(
        stored.body,
        vec![Block::Paragraph(
            "{{NAME}} <{{EMAIL}}> {{LABEL(EMAIL)}} {{COUNT(ORDERS)}} \
             {{CONSOLIDATED(ORDERS.ITEM)}}"
                .to_string()
        )]
    );

    assert_eq!(second.total_rewrites(), 0);
    assert_eq!(second.document, stored);
    assert_eq!(documents.save_count(), 1, "nothing to save the second time");
    Ok(())
}

#[tokio::test]
async fn test_dry_run_reports_without_saving() -> Result<()> {
    setup_tracing();
    let schema = legacy_schema();
    let documents = MemoryDocumentStore::new();
    documents
        .insert(paragraph_document("tpl", "{{SUM(ORDERS.QUANTITY)}}"))
        .await;

    let report = migrate_template(&schema, &documents, "tpl", true).await?;

    assert_eq!(report.rewrites.get("SUM"), Some(&1));
    assert_eq!(documents.save_count(), 0);
    assert_eq!(
        documents.fetch("tpl").await?.body,
        vec![Block::Paragraph("{{SUM(ORDERS.QUANTITY)}}".to_string())]
    );
    Ok(())
}

#[tokio::test]
async fn test_header_footer_and_tables_are_migrated() -> Result<()> {
    setup_tracing();

    // --- 1. Arrange ---
    let schema = legacy_schema();
    let documents = MemoryDocumentStore::new();
    documents
        .insert(TemplateDocument {
            id: "tpl".to_string(),
            title: "Orders".to_string(),
            header: vec![Block::Paragraph("{{e_mail_address}}".to_string())],
            body: vec![Block::Table(Table::new(vec![
                vec!["{{GROUP_TABLE(ORDERS.DISH_NAME)}}"],
                vec!["{{ORDERS.QUANTITY}}"],
            ]))],
            footer: vec![Block::Paragraph("{{ROW_TABLE(Orders.Dish_Name)}}".to_string())],
        })
        .await;

    // --- 2. Act ---
    let report = migrate_template(&schema, &documents, "tpl", false).await?;

    // --- 3. Assert ---
    let stored = documents.fetch("tpl").await?;
    assert_eq!(stored.header, vec![Block::Paragraph("{{EMAIL}}".to_string())]);
    assert_eq!(
        stored.body,
        vec![Block::Table(Table::new(vec![
            vec!["{{GROUP_TABLE(ORDERS.ITEM)}}"],
            vec!["{{ORDERS.QTY}}"],
        ]))]
    );
    assert_eq!(
        stored.footer,
        vec![Block::Paragraph("{{ROW_TABLE(ORDERS.ITEM)}}".to_string())]
    );
    assert_eq!(report.total_rewrites(), 4);
    Ok(())
}

#[test]
fn test_slug_equal_to_another_fields_id_is_not_rewritten() {
    // "Code" slugifies to CODE, which is the id of a different field.
    let schema = QuestionSchema::new(
        "codes",
        vec![
            FieldDef::new("CODE", "Reference", QuestionType::Text),
            FieldDef::new("POSTAL", "Code", QuestionType::Text),
        ],
    );

    let plan = migrate::plan(&schema);

    assert_eq!(plan.canonical("CODE"), None);
    assert_eq!(plan.canonical("REFERENCE"), Some("CODE"));
    assert_eq!(plan.warnings.len(), 1);
}

#[test]
fn test_every_language_label_is_a_legacy_key_and_subgroups_need_ids() {
    let mut city = FieldDef::new("CITY", "City", QuestionType::Text);
    city.label = LocalizedText::new(&[("EN", "City"), ("FR", "Ville"), ("NL", "Stad")]);
    let legacy_sub = SubGroupSchema {
        id: None,
        label: LocalizedText::uniform("Options"),
        group: LineItemGroupSchema::new(vec![FieldDef::new("OPT", "Option", QuestionType::Text)]),
    };
    let rooms = LineItemGroupSchema::new(vec![FieldDef::new("BEDS", "Beds", QuestionType::Number)])
        .with_sub_group(legacy_sub)
        .with_sub_group(SubGroupSchema::new(
            "GUESTS",
            "Guest list",
            LineItemGroupSchema::new(vec![FieldDef::new("GUEST", "Guest name", QuestionType::Text)]),
        ));
    let schema = QuestionSchema::new(
        "hotel",
        vec![city, FieldDef::group("ROOMS", "Rooms", rooms)],
    );

    let plan = migrate::plan(&schema);

    assert_eq!(plan.canonical("VILLE"), Some("CITY"));
    assert_eq!(plan.canonical("stad"), Some("CITY"));
    assert_eq!(plan.canonical("ROOMS.GUEST_LIST"), Some("ROOMS.GUESTS"));
    assert_eq!(plan.canonical("ROOMS.GUEST_LIST.GUEST_NAME"), Some("ROOMS.GUESTS.GUEST"));
    assert_eq!(plan.canonical("ROOMS.GUESTS.GUEST_NAME"), Some("ROOMS.GUESTS.GUEST"));
    assert_eq!(plan.canonical("ROOMS.OPTIONS.OPTION"), None);
    assert_eq!(plan.warnings.len(), 1);
    assert!(plan.warnings[0].contains("no id"));
}

/// Subgroups nested below a subgroup are migrated like the first level.
#[tokio::test]
async fn test_nested_subgroups_are_migrated_at_every_depth() -> Result<()> {
    setup_tracing();

    // --- 1. Arrange ---
    let toppings = LineItemGroupSchema::new(vec![FieldDef::new("TOPPING", "Topping name", QuestionType::Text)]);
    let extras = LineItemGroupSchema::new(vec![FieldDef::new("NOTE", "Extra note", QuestionType::Text)])
        .with_sub_group(SubGroupSchema::new("TOPPINGS", "Toppings", toppings));
    let orders = LineItemGroupSchema::new(vec![FieldDef::new("ITEM", "Dish", QuestionType::Text)])
        .with_sub_group(SubGroupSchema::new("EXTRAS", "Extras", extras));
    let schema = QuestionSchema::new("pizza", vec![FieldDef::group("ORDERS", "Orders", orders)]);
    let documents = MemoryDocumentStore::new();
    documents
        .insert(paragraph_document(
            "tpl",
            "{{ORDERS.EXTRAS.TOPPINGS.TOPPING_NAME}} {{COUNT(ORDERS.EXTRAS.TOPPINGS)}}",
        ))
        .await;

    // --- 2. Act ---
    let plan = migrate::plan(&schema);
    let report = migrate_template(&schema, &documents, "tpl", false).await?;

    // --- 3. Assert ---
    assert!(plan.warnings.is_empty(), "{:?}", plan.warnings);
    assert_eq!(
        plan.canonical("ORDERS.EXTRAS.TOPPINGS.TOPPING_NAME"),
        Some("ORDERS.EXTRAS.TOPPINGS.TOPPING")
    );
    assert_eq!(plan.canonical("ORDERS.EXTRAS.TOPPINGS"), None, "already canonical");
    assert!(report.success);
    let stored = documents.fetch("tpl").await?;
    assert_eq!(
        stored.body,
        vec![Block::Paragraph(
            "{{ORDERS.EXTRAS.TOPPINGS.TOPPING}} {{COUNT(ORDERS.EXTRAS.TOPPINGS)}}".to_string()
        )]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_document_is_an_error() -> Result<()> {
    let documents = MemoryDocumentStore::new();

    let result = migrate_template(&legacy_schema(), &documents, "nope", false).await;

    assert!(matches!(result, Err(anyform::FormError::NotFound(_))));
    Ok(())
}
