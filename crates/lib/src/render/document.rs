//! # Template Documents
//!
//! A minimal document model (paragraphs and tables in a header, body and footer)
//! and the renderer that fills it from a record.
//!
//! Table rows that reference a group path are repeated once per data row at
//! that path. A template row with no data is cleared, never deleted. Two table
//! directives produce one table copy per block of data:
//!
//! - `{{GROUP_TABLE(path.field)}}`: one copy per distinct value of `field`
//! - `{{ROW_TABLE(path.field)}}`: one copy per row at `path`

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::flatten::FlattenedRowSet;
use super::format::format_optional;
use super::placeholders::{PlaceholderMap, TOKEN_PATTERN};
use crate::model::{GroupIndex, QuestionSchema};

static DIRECTIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(GROUP_TABLE|ROW_TABLE)\(\s*([^(){}]+?)\s*\)\s*\}\}")
        .expect("directive pattern is a valid regex")
});

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<&str>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
        }
    }

    fn cells_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.rows.iter_mut().flatten()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum Block {
    Paragraph(String),
    Table(Table),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemplateDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub header: Vec<Block>,
    #[serde(default)]
    pub body: Vec<Block>,
    #[serde(default)]
    pub footer: Vec<Block>,
}

impl TemplateDocument {
    /// Every editable text segment (paragraphs and table cells) of all sections.
    pub fn text_segments_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.header
            .iter_mut()
            .chain(self.body.iter_mut())
            .chain(self.footer.iter_mut())
            .flat_map(block_segments)
    }

    /// Plain-text rendering used for email bodies: one line per paragraph,
    /// table cells separated by `" | "`.
    pub fn to_plain_text(&self) -> String {
        let mut lines = Vec::new();
        for block in self.header.iter().chain(&self.body).chain(&self.footer) {
            match block {
                Block::Paragraph(text) => lines.push(text.clone()),
                Block::Table(table) => lines.extend(table.rows.iter().map(|row| row.join(" | "))),
            }
        }
        lines.join("\n")
    }
}

fn block_segments(block: &mut Block) -> Box<dyn Iterator<Item = &mut String> + '_> {
    match block {
        Block::Paragraph(text) => Box::new(std::iter::once(text)),
        Block::Table(table) => Box::new(table.cells_mut()),
    }
}

/// Limits a table copy to the rows of one block of data.
#[derive(Debug, Clone, Default)]
struct RowScope {
    /// `(path, allowed indexes)`. Rows at `path`, and rows descending from them,
    /// are kept only when their index (or their ancestor's) is allowed.
    restriction: Option<(String, Vec<usize>)>,
}

impl RowScope {
    fn allows(&self, rows: &FlattenedRowSet, path: &str, index: usize) -> bool {
        let Some((scope_path, allowed)) = &self.restriction else {
            return true;
        };
        if path != scope_path && !path.starts_with(&format!("{scope_path}.")) {
            return true;
        }
        rows.ancestor_index(path, index, scope_path)
            .is_some_and(|ancestor| allowed.contains(&ancestor))
    }
}

/// Everything needed to fill a template for one record.
pub struct RenderContext<'a> {
    pub schema: &'a QuestionSchema,
    pub groups: GroupIndex,
    pub rows: &'a FlattenedRowSet,
    pub placeholders: &'a PlaceholderMap,
    pub language: &'a str,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        schema: &'a QuestionSchema,
        rows: &'a FlattenedRowSet,
        placeholders: &'a PlaceholderMap,
        language: &'a str,
    ) -> Self {
        Self {
            schema,
            groups: schema.group_index(),
            rows,
            placeholders,
            language,
        }
    }

    /// Splits a `path.field` token body into a known group path and a field id.
    fn split_group_token(&self, token: &str) -> Option<(String, String)> {
        let (path, field) = token.rsplit_once('.')?;
        let path = self.rows.resolve_path(path.trim())?.to_string();
        let entry = self.groups.get(&path)?;
        let field = entry
            .schema
            .fields
            .iter()
            .find(|f| f.id.eq_ignore_ascii_case(field.trim()))?;
        Some((path, field.id.clone()))
    }

    /// The deepest group path referenced by any plain token in `row`.
    fn row_group_path(&self, row: &[String]) -> Option<String> {
        row.iter()
            .flat_map(|cell| TOKEN_PATTERN.captures_iter(cell))
            .filter_map(|caps| caps.get(1))
            .filter(|m| !m.as_str().contains('('))
            .filter_map(|m| self.split_group_token(m.as_str()))
            .map(|(path, _)| path)
            .max_by_key(|path| path.matches('.').count())
    }

    /// Tokens for one data row: its own fields plus those of its ancestors.
    fn row_placeholders(&self, path: &str, index: usize) -> PlaceholderMap {
        let mut map = PlaceholderMap::new();
        let mut current = Some((path.to_string(), index));
        while let Some((row_path, row_index)) = current {
            let Some(row) = self.rows.row(&row_path, row_index) else {
                break;
            };
            if let Some(entry) = self.groups.get(&row_path) {
                for field in &entry.schema.fields {
                    map.insert(
                        &format!("{row_path}.{}", field.id),
                        format_optional(row.get(&field.id), Some(field.kind)),
                    );
                }
            }
            current = row.parent.as_ref().map(|p| (p.path.clone(), p.index));
        }
        map
    }

    /// Renders a whole document.
    pub fn render(&self, template: &TemplateDocument) -> TemplateDocument {
        TemplateDocument {
            id: template.id.clone(),
            title: self.placeholders.apply(&template.title),
            header: self.render_blocks(&template.header),
            body: self.render_blocks(&template.body),
            footer: self.render_blocks(&template.footer),
        }
    }

    fn render_blocks(&self, blocks: &[Block]) -> Vec<Block> {
        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block {
                Block::Paragraph(text) => out.push(Block::Paragraph(self.placeholders.apply(text))),
                Block::Table(table) => out.extend(self.render_table_block(table).into_iter().map(Block::Table)),
            }
        }
        out
    }

    fn find_directive(&self, table: &Table) -> Option<(String, String, String)> {
        table.rows.iter().flatten().find_map(|cell| {
            let caps = DIRECTIVE_PATTERN.captures(cell)?;
            let (path, field) = self.split_group_token(&caps[2])?;
            Some((caps[1].to_string(), path, field))
        })
    }

    /// Expands directive tables into their copies, then renders each copy.
    fn render_table_block(&self, table: &Table) -> Vec<Table> {
        let Some((directive, path, field_id)) = self.find_directive(table) else {
            return vec![self.render_table(table, &RowScope::default())];
        };
        let kind = self.groups.field(&path, &field_id).map(|f| f.kind);
        let rows = self.rows.rows(&path);

        // (directive text, allowed row indexes) per copy.
        let mut blocks: Vec<(String, Vec<usize>)> = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let value = format_optional(row.get(&field_id), kind);
            if directive == "GROUP_TABLE" {
                if let Some((_, indexes)) = blocks.iter_mut().find(|(v, _)| *v == value) {
                    indexes.push(index);
                    continue;
                }
            }
            blocks.push((value, vec![index]));
        }
        if blocks.is_empty() {
            blocks.push((String::new(), Vec::new()));
        }

        blocks
            .into_iter()
            .map(|(value, indexes)| {
                let mut copy = table.clone();
                for cell in copy.cells_mut() {
                    *cell = DIRECTIVE_PATTERN
                        .replace_all(cell, |_: &Captures| value.clone())
                        .into_owned();
                }
                let scope = RowScope {
                    restriction: Some((path.clone(), indexes)),
                };
                self.render_table(&copy, &scope)
            })
            .collect()
    }

    fn render_table(&self, table: &Table, scope: &RowScope) -> Table {
        let mut out = Table::default();
        for template_row in &table.rows {
            let Some(path) = self.row_group_path(template_row) else {
                out.rows.push(
                    template_row
                        .iter()
                        .map(|cell| self.placeholders.apply(cell))
                        .collect(),
                );
                continue;
            };

            let data: Vec<usize> = (0..self.rows.rows(&path).len())
                .filter(|index| scope.allows(self.rows, &path, *index))
                .collect();
            if data.is_empty() {
                out.rows.push(vec![String::new(); template_row.len()]);
                continue;
            }
            for index in data {
                let tokens = self.placeholders.layered(&self.row_placeholders(&path, index));
                out.rows.push(template_row.iter().map(|cell| tokens.apply(cell)).collect());
            }
        }
        out
    }
}
