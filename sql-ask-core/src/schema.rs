use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub source_table: String,
    pub source_columns: Vec<String>,
    pub target_table: String,
    pub target_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyEdge>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// Tables, columns and relationships of one database owner.
///
/// Built once per refresh and never mutated afterwards; a refresh produces a
/// new document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    tables: Vec<TableInfo>,
    foreign_keys: Vec<ForeignKeyEdge>,
}

impl SchemaDocument {
    /// Appends a table, registering its edges in the flattened list.
    ///
    /// A table with a name already present replaces the previous entry in
    /// place so names stay unique.
    pub(crate) fn push_table(&mut self, table: TableInfo) {
        self.foreign_keys.retain(|edge| edge.source_table != table.name);
        self.foreign_keys.extend(table.foreign_keys.iter().cloned());
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyEdge] {
        &self.foreign_keys
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<TableInfo> for SchemaDocument {
    fn from_iter<I: IntoIterator<Item = TableInfo>>(iter: I) -> Self {
        let mut document = SchemaDocument::default();
        for table in iter {
            document.push_table(table);
        }
        document
    }
}

impl Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "- {}: {}", self.name, self.data_type)?;
        if self.is_primary_key {
            write!(f, " (PRIMARY KEY)")?;
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {default}")?;
        }
        Ok(())
    }
}

impl Display for ForeignKeyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Column lists are joined independently; stale metadata may leave
        // them with different lengths.
        write!(
            f,
            "- {} → {}({})",
            self.source_columns.join(", "),
            self.target_table,
            self.target_columns.join(", ")
        )
    }
}

impl Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "### {} Tablosu", self.name)?;
        for column in &self.columns {
            write!(f, "\n{column}")?;
        }
        if !self.foreign_keys.is_empty() {
            write!(f, "\n\n  İlişkiler:")?;
            for edge in &self.foreign_keys {
                write!(f, "\n{edge}")?;
            }
        }
        Ok(())
    }
}

impl Display for SchemaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, table) in self.tables.iter().enumerate() {
            if idx > 0 {
                write!(f, "\n\n")?;
            }
            write!(f, "{table}")?;
        }
        Ok(())
    }
}

/// Renders the document as the text block embedded in prompts.
pub fn format_schema(document: &SchemaDocument) -> String {
    document.to_string()
}
