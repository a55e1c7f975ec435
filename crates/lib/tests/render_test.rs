//! # Rendering Tests
//!
//! Flattening, placeholder families, aggregations and template table expansion.

mod common;

use crate::common::{catering_schema, order, setup_tracing};
use anyform::model::{FieldDef, FieldValue, LocalizedText, QuestionSchema, QuestionType, Record, Row};
use anyform::render::{
    build_placeholders, flatten, render_document, Block, ReferenceLookup, ReferenceTable,
    ReferenceTables, Table, TemplateDocument,
};
use anyform::MemoryTable;
use anyhow::Result;

fn order_record(orders: Vec<Row>) -> Record {
    Record::new("EN")
        .with_id("rec-1")
        .with_value("NAME", FieldValue::text("Ann"))
        .with_value("SITE", FieldValue::text("brussels"))
        .with_value("ORDERS", FieldValue::Group(orders))
}

fn table_document(rows: Vec<Vec<&str>>) -> TemplateDocument {
    TemplateDocument {
        id: "tpl".to_string(),
        body: vec![Block::Table(Table::new(rows))],
        ..Default::default()
    }
}

fn tables(document: &TemplateDocument) -> Vec<&Table> {
    document
        .body
        .iter()
        .filter_map(|block| match block {
            Block::Table(table) => Some(table),
            Block::Paragraph(_) => None,
        })
        .collect()
}

#[test]
fn test_consolidated_deduplicates_in_first_seen_order() {
    setup_tracing();

    // --- 1. Arrange ---
    let schema = catering_schema();
    let record = order_record(vec![
        order("Soup", "Starter", "1", "Milk"),
        order("Satay", "Main", "2", "Peanuts"),
        order("Cake", "Dessert", "1", "Milk"),
    ]);
    let empty = order_record(Vec::new());

    // --- 2. Act ---
    let rows = flatten(&record, &schema);
    let map = build_placeholders(&record, &schema, &rows, None);
    let empty_rows = flatten(&empty, &schema);
    let empty_map = build_placeholders(&empty, &schema, &empty_rows, None);

    // --- 3. Assert ---
    assert_eq!(map.get("CONSOLIDATED(ORDERS.ALLERGEN)"), Some("Milk, Peanuts"));
    assert_eq!(empty_map.get("CONSOLIDATED(ORDERS.ALLERGEN)"), Some("None"));
    assert_eq!(map.get("COUNT(ORDERS)"), Some("3"));
    assert_eq!(empty_map.get("COUNT(ORDERS)"), Some("0"));
}

#[test]
fn test_sum_accepts_comma_decimals_and_skips_text() {
    let schema = catering_schema();
    let record = order_record(vec![
        order("Soup", "Starter", "1,5", ""),
        order("Satay", "Main", "2", ""),
        order("Cake", "Dessert", "abc", ""),
    ]);
    let rows = flatten(&record, &schema);

    let map = build_placeholders(&record, &schema, &rows, None);

    assert_eq!(map.get("SUM(ORDERS.QTY)"), Some("3.5"));
}

#[test]
fn test_sum_of_nothing_is_zero() {
    let schema = catering_schema();
    let record = order_record(vec![order("Soup", "Starter", "n/a", "")]);
    let rows = flatten(&record, &schema);

    let map = build_placeholders(&record, &schema, &rows, None);

    assert_eq!(map.get("SUM(ORDERS.QTY)"), Some("0"));
}

#[test]
fn test_placeholders_answer_to_case_variants_and_labels() {
    let schema = catering_schema();
    let record = order_record(vec![order("Soup", "Starter", "1", "")]);
    let rows = flatten(&record, &schema);

    let map = build_placeholders(&record, &schema, &rows, None);

    assert_eq!(map.apply("{{NAME}} / {{name}} / {{ Name }}"), "Ann / Ann / Ann");
    assert_eq!(map.apply("{{LABEL(NAME)}}"), "Customer name");
    assert_eq!(map.apply("{{LABEL(ORDERS.QTY)}}"), "Quantity");
    assert_eq!(map.apply("{{ID}} {{UNKNOWN}}"), "rec-1 {{UNKNOWN}}");
}

/// A label only written in a language outside the fallback chain is not used;
/// the token falls back to the field id.
#[test]
fn test_label_outside_the_fallback_chain_falls_back_to_id() {
    let mut qty = FieldDef::new("QTY", "", QuestionType::Number);
    qty.label = LocalizedText::new(&[("DE", "Menge")]);
    let schema = QuestionSchema::new("stock", vec![qty]);
    let record = Record::new("EN").with_value("QTY", FieldValue::number(3.0));
    let rows = flatten(&record, &schema);

    let map = build_placeholders(&record, &schema, &rows, None);

    assert_eq!(map.apply("{{LABEL(QTY)}}"), "QTY");
}

#[test]
fn test_flatten_links_subgroup_rows_to_parents() {
    let schema = catering_schema();
    let extras = |notes: &[&str]| {
        FieldValue::Group(
            notes
                .iter()
                .map(|n| Row::new().with("NOTE", FieldValue::text(n)))
                .collect(),
        )
    };
    let record = order_record(vec![
        order("Soup", "Starter", "1", "").with("EXTRAS", extras(&["bread"])),
        order("Cake", "Dessert", "1", "").with("EXTRAS", extras(&["cream", "candles"])),
    ]);

    let rows = flatten(&record, &schema);

    assert_eq!(rows.rows("ORDERS").len(), 2);
    assert_eq!(rows.rows("ORDERS.EXTRAS").len(), 3);
    assert_eq!(rows.ancestor_index("ORDERS.EXTRAS", 2, "ORDERS"), Some(1));
    assert_eq!(
        rows.scoped_value("ORDERS.EXTRAS", 0, "ORDERS", "ITEM"),
        Some(&FieldValue::text("Soup"))
    );
}

#[test]
fn test_lookup_tokens_expose_reference_columns() {
    let schema = catering_schema();
    let record = order_record(Vec::new());
    let rows = flatten(&record, &schema);
    let lookup = ReferenceTables::new().with_source(
        "sites",
        ReferenceTable::new(
            vec!["Site".into(), "Manager email".into(), "City".into()],
            vec![vec!["Brussels".into(), "boss@example.com".into(), "Bruxelles".into()]],
        ),
    );

    let map = build_placeholders(&record, &schema, &rows, Some(&lookup));

    assert_eq!(map.get("SITE.MANAGER_EMAIL"), Some("boss@example.com"));
    assert_eq!(map.get("SITE.CITY"), Some("Bruxelles"));
}

#[tokio::test]
async fn test_reference_table_loads_from_any_table() -> Result<()> {
    let source = MemoryTable::from_csv("sites", "Site,City\nGhent,Gent\n")?;

    let reference = ReferenceTable::load(&source).await?;
    let tables = ReferenceTables::new().with_source("sites", reference);

    let row = tables.find_row("sites", "site", "GHENT")?;
    assert_eq!(
        row,
        Some(vec![
            ("Site".to_string(), "Ghent".to_string()),
            ("City".to_string(), "Gent".to_string())
        ])
    );
    Ok(())
}

/// One row per data row; unrelated rows untouched; zero rows clears the row.
#[test]
fn test_table_rows_are_cloned_per_data_row() {
    setup_tracing();

    // --- 1. Arrange ---
    let schema = catering_schema();
    let template = table_document(vec![
        vec!["Dish", "Qty"],
        vec!["{{ORDERS.ITEM}}", "{{ORDERS.QTY}}"],
        vec!["Total", "{{SUM(ORDERS.QTY)}}"],
    ]);
    let full = order_record(vec![
        order("Soup", "Starter", "1,5", ""),
        order("Cake", "Dessert", "2", ""),
    ]);
    let empty = order_record(Vec::new());

    // --- 2. Act ---
    let rendered = render_document(&template, &full, &schema, None);
    let rendered_empty = render_document(&template, &empty, &schema, None);

    // --- 3. Assert ---
    assert_eq!(
        tables(&rendered)[0].rows,
        vec![
            vec!["Dish", "Qty"],
            vec!["Soup", "1.5"],
            vec!["Cake", "2"],
            vec!["Total", "3.5"],
        ]
    );
    assert_eq!(
        tables(&rendered_empty)[0].rows,
        vec![vec!["Dish", "Qty"], vec!["", ""], vec!["Total", "0"]]
    );
}

#[test]
fn test_subgroup_rows_resolve_ancestor_fields() {
    let schema = catering_schema();
    let template = table_document(vec![vec!["{{ORDERS.ITEM}}", "{{ORDERS.EXTRAS.NOTE}}"]]);
    let record = order_record(vec![
        order("Soup", "Starter", "1", "").with(
            "EXTRAS",
            FieldValue::Group(vec![Row::new().with("NOTE", FieldValue::text("bread"))]),
        ),
        order("Cake", "Dessert", "1", "").with(
            "EXTRAS",
            FieldValue::Group(vec![
                Row::new().with("NOTE", FieldValue::text("cream")),
                Row::new().with("NOTE", FieldValue::text("candles")),
            ]),
        ),
    ]);

    let rendered = render_document(&template, &record, &schema, None);

    assert_eq!(
        tables(&rendered)[0].rows,
        vec![
            vec!["Soup", "bread"],
            vec!["Cake", "cream"],
            vec!["Cake", "candles"],
        ]
    );
}

#[test]
fn test_group_table_emits_one_copy_per_distinct_value() {
    // --- 1. Arrange ---
    let schema = catering_schema();
    let template = table_document(vec![
        vec!["{{GROUP_TABLE(ORDERS.CATEGORY)}}"],
        vec!["{{ORDERS.ITEM}}"],
    ]);
    let record = order_record(vec![
        order("Soup", "Starter", "1", ""),
        order("Steak", "Main", "1", ""),
        order("Salad", "Starter", "1", ""),
    ]);

    // --- 2. Act ---
    let rendered = render_document(&template, &record, &schema, None);

    // --- 3. Assert ---
    let copies = tables(&rendered);
    assert_eq!(copies.len(), 2);
    assert_eq!(copies[0].rows, vec![vec!["Starter"], vec!["Soup"], vec!["Salad"]]);
    assert_eq!(copies[1].rows, vec![vec!["Main"], vec!["Steak"]]);
}

#[test]
fn test_row_table_emits_one_copy_per_row_with_its_children() {
    let schema = catering_schema();
    let template = table_document(vec![
        vec!["{{ROW_TABLE(ORDERS.ITEM)}}"],
        vec!["{{ORDERS.EXTRAS.NOTE}}"],
    ]);
    let record = order_record(vec![
        order("Soup", "Starter", "1", "").with(
            "EXTRAS",
            FieldValue::Group(vec![Row::new().with("NOTE", FieldValue::text("bread"))]),
        ),
        order("Cake", "Dessert", "1", ""),
    ]);

    let rendered = render_document(&template, &record, &schema, None);

    let copies = tables(&rendered);
    assert_eq!(copies.len(), 2);
    assert_eq!(copies[0].rows, vec![vec!["Soup"], vec!["bread"]]);
    assert_eq!(copies[1].rows, vec![vec!["Cake"], vec![""]]);
}

#[test]
fn test_plain_text_joins_table_cells() {
    let document = TemplateDocument {
        id: "mail".to_string(),
        header: vec![Block::Paragraph("Hello".to_string())],
        body: vec![Block::Table(Table::new(vec![vec!["a", "b"], vec!["c", "d"]]))],
        ..Default::default()
    };

    assert_eq!(document.to_plain_text(), "Hello\na | b\nc | d");
}
