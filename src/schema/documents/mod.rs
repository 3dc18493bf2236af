
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::str::FromStr;
use tracing::info;

use super::{ColumnSpec, SchemaDescription, TableSpec};

const INLINE_SYNONYMS: usize = 3;
const AGGREGATE_SYNONYMS: usize = 15;

/// Kind of a retrievable document; ordering drives retrieval re-ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Example,
    Table,
    Column,
    Relationship,
    Other,
}

impl DocumentType {
    /// Lower ranks first
    #[inline]
    pub fn priority(self) -> u8 {
        match self {
            Self::Example => 0,
            Self::Table => 1,
            Self::Column => 2,
            Self::Relationship => 3,
            Self::Other => 4,
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Example => "example",
            Self::Table => "table",
            Self::Column => "column",
            Self::Relationship => "relationship",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = std::convert::Infallible;

    /// Unknown tags map to [`DocumentType::Other`]
    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "example" => Self::Example,
            "table" => Self::Table,
            "column" => Self::Column,
            "relationship" => Self::Relationship,
            _ => Self::Other,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievableDocument {
    pub doc_type: DocumentType,
    pub content: String,
    pub table: Option<String>,
    pub column: Option<String>,
}

impl RetrievableDocument {
    #[inline]
    pub fn priority(&self) -> u8 {
        self.doc_type.priority()
    }

    /// `[TYPE]` header followed by the content, as placed in prompts
    #[inline]
    pub fn render(&self) -> String {
        format!(
            "[{}]\n{}",
            self.doc_type.as_str().to_uppercase(),
            self.content
        )
    }
}

fn non_blank(text: Option<&String>) -> Option<&str> {
    text.map(String::as_str).filter(|t| !t.trim().is_empty())
}

fn render_sample_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn column_line(column: &ColumnSpec) -> String {
    let mut line = format!("{} ({})", column.name, column.data_type);
    if let Some(description) = non_blank(column.description.as_ref()) {
        line.push_str(" - ");
        line.push_str(description);
    }
    if !column.synonyms.is_empty() {
        let inline: Vec<&str> = column
            .synonyms
            .iter()
            .take(INLINE_SYNONYMS)
            .map(String::as_str)
            .collect();
        let _ = write!(line, " [synonymes: {}]", inline.join(", "));
    }
    line
}

fn table_document(table: &TableSpec) -> RetrievableDocument {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("  - {}", column_line(c)))
        .collect();

    let synonyms: Vec<&str> = table
        .columns
        .iter()
        .flat_map(|c| c.synonyms.iter().map(String::as_str))
        .take(AGGREGATE_SYNONYMS)
        .collect();
    let synonyms = if synonyms.is_empty() {
        "Aucun".to_string()
    } else {
        synonyms.join(", ")
    };

    let content = format!(
        "Table: {}\nDescription: {}\n\nColonnes:\n{}\n\nSynonymes de colonnes: {}",
        table.name,
        non_blank(table.description.as_ref()).unwrap_or("Pas de description"),
        columns.join("\n"),
        synonyms
    );

    RetrievableDocument {
        doc_type: DocumentType::Table,
        content,
        table: Some(table.name.clone()),
        column: None,
    }
}

fn column_document(table: &TableSpec, column: &ColumnSpec) -> Option<RetrievableDocument> {
    let description = non_blank(column.description.as_ref());
    if description.is_none() && column.synonyms.is_empty() {
        return None;
    }

    let mut lines = vec![
        format!("Colonne {} dans la table {}", column.name, table.name),
        format!("Type: {}", column.data_type),
    ];
    if let Some(description) = description {
        lines.push(format!("Description: {description}"));
    }
    if !column.synonyms.is_empty() {
        lines.push(format!("Synonymes: {}", column.synonyms.join(", ")));
    }
    if !column.sample_values.is_empty() {
        let samples: Vec<String> = column.sample_values.iter().map(render_sample_value).collect();
        lines.push(format!("Exemples de valeurs: {}", samples.join(", ")));
    }

    Some(RetrievableDocument {
        doc_type: DocumentType::Column,
        content: lines.join("\n"),
        table: Some(table.name.clone()),
        column: Some(column.name.clone()),
    })
}

/// Convert a schema description into retrievable documents.
///
/// Order: per table its aggregate document then its column documents, then
/// relationships, then sample queries. Pure and deterministic.
#[inline]
pub fn build_documents(schema: &SchemaDescription) -> Vec<RetrievableDocument> {
    let mut documents = Vec::new();

    for table in &schema.tables {
        documents.push(table_document(table));
        documents.extend(
            table
                .columns
                .iter()
                .filter_map(|column| column_document(table, column)),
        );
    }

    for relationship in &schema.relationships {
        let content = format!(
            "Relation: {from} -> {to}\nType: {kind}\nCondition de jointure: {from}.{on} = {to}.{on}\nDescription: {description}",
            from = relationship.from,
            to = relationship.to,
            kind = relationship.kind,
            on = relationship.on,
            description = non_blank(relationship.description.as_ref())
                .unwrap_or("Clé étrangère standard"),
        );
        documents.push(RetrievableDocument {
            doc_type: DocumentType::Relationship,
            content,
            table: Some(relationship.from.clone()),
            column: Some(relationship.on.clone()),
        });
    }

    for sample in &schema.sample_queries {
        documents.push(RetrievableDocument {
            doc_type: DocumentType::Example,
            content: format!(
                "EXEMPLE DE REQUÊTE:\nQuestion en langage naturel: {}\nRequête SQL correspondante:\n{}",
                sample.natural_language, sample.sql
            ),
            table: None,
            column: None,
        });
    }

    info!("Built {} documents from schema", documents.len());
    documents
}
