// Schema module
// The structured description of the relational schema and its conversion into retrievable documents

pub mod documents;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

pub use documents::{DocumentType, RetrievableDocument, build_documents};

/// Sample values kept per column
pub const MAX_SAMPLE_VALUES: usize = 10;

/// Tables, relationships and few-shot examples describing the incident database
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SchemaDescription {
    /// In document order
    #[serde(default, deserialize_with = "tables_in_document_order")]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
    #[serde(default)]
    pub sample_queries: Vec<SampleQuery>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSpec {
    pub name: String,
    pub description: Option<String>,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub sample_values: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelationshipSpec {
    pub from: String,
    pub to: String,
    /// Join column, present on both sides
    pub on: String,
    #[serde(rename = "type", default = "default_relationship_kind")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_relationship_kind() -> String {
    "foreign_key".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SampleQuery {
    pub natural_language: String,
    pub sql: String,
}

#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    columns: Vec<ColumnSpec>,
}

struct TablesVisitor;

impl<'de> Visitor<'de> for TablesVisitor {
    type Value = Vec<TableSpec>;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a map of table name to table description")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut tables = Vec::with_capacity(access.size_hint().unwrap_or(0));

        while let Some((name, raw)) = access.next_entry::<String, RawTable>()? {
            if tables.iter().any(|t: &TableSpec| t.name == name) {
                return Err(de::Error::custom(format!("duplicate table `{name}`")));
            }
            tables.push(TableSpec {
                name,
                description: raw.description,
                columns: raw.columns,
            });
        }

        Ok(tables)
    }
}

fn tables_in_document_order<'de, D>(deserializer: D) -> Result<Vec<TableSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(TablesVisitor)
}

impl SchemaDescription {
    #[inline]
    pub fn from_json(content: &str) -> Result<Self> {
        let mut schema: Self =
            serde_json::from_str(content).context("Failed to parse schema description")?;

        for column in schema.tables.iter_mut().flat_map(|t| t.columns.iter_mut()) {
            column.sample_values.truncate(MAX_SAMPLE_VALUES);
        }

        Ok(schema)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid schema file: {}", path.display()))
    }

    #[inline]
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }
}
