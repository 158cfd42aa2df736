//! Table and column metadata for the write path.
//!
//! Only what save-changes planning needs: key membership, which columns
//! the backend fills in (commit timestamps, computed columns) and which
//! column carries the optimistic-concurrency version.

use std::collections::HashMap;

use crate::sql::StoreType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub store_type: StoreType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Assigned the commit timestamp by the backend on every write.
    pub commit_timestamp: bool,
    /// Computed by the database; only readable after the write lands.
    pub computed: bool,
    /// Version column checked and bumped for optimistic concurrency.
    pub version: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, store_type: StoreType) -> ColumnSchema {
        ColumnSchema {
            name: name.into(),
            store_type,
            nullable: false,
            primary_key: false,
            commit_timestamp: false,
            computed: false,
            version: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn commit_timestamp(mut self) -> Self {
        self.commit_timestamp = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> TableSchema {
        TableSchema {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn version_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.version)
    }

    pub fn commit_timestamp_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.commit_timestamp)
    }

    /// Columns whose post-write values only the backend knows.
    pub fn read_back_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|c| c.commit_timestamp || c.computed)
    }
}

/// The set of tables a context knows about.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: HashMap<String, TableSchema>,
}

impl Catalog {
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Catalog {
        Catalog {
            tables: tables
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_covers_commit_timestamps_and_computed() {
        let table = TableSchema::new(
            "Singers",
            vec![
                ColumnSchema::new("Id", StoreType::Int64).primary_key(),
                ColumnSchema::new("Name", StoreType::String),
                ColumnSchema::new("FullName", StoreType::String).computed(),
                ColumnSchema::new("LastUpdated", StoreType::Timestamp).commit_timestamp(),
            ],
        );
        let names: Vec<_> = table.read_back_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["FullName", "LastUpdated"]);
        assert_eq!(
            table.key_columns().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            ["Id"]
        );
        assert!(table.version_column().is_none());
    }
}
