//! Column metadata reported by a backend at prepare time.

use crate::types::ColumnType;
use serde::{Deserialize, Serialize};

/// Description of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,
    /// Column type tag
    pub column_type: ColumnType,
    /// Backend-native type name, used in diagnostics
    pub type_name: String,
    /// Declared maximum size in bytes for variable-length columns
    pub size: Option<usize>,
    /// Whether the column may contain NULL
    pub nullable: bool,
}

impl ColumnDescriptor {
    /// Create a nullable column descriptor.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            type_name: column_type.to_string(),
            size: None,
            nullable: true,
        }
    }

    /// Set the declared size.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the backend-native type name.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Set nullability.
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Builder for a list of column descriptors.
pub struct SchemaBuilder {
    columns: Vec<ColumnDescriptor>,
}

impl SchemaBuilder {
    /// Create a new schema builder.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Add a nullable column of the given type.
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDescriptor::new(name, column_type));
        self
    }

    /// Add a fully described column.
    pub fn add_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// Build the column list.
    pub fn build(self) -> Vec<ColumnDescriptor> {
        self.columns
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder() {
        let columns = SchemaBuilder::new()
            .column("id", ColumnType::Int64)
            .add_column(
                ColumnDescriptor::new("name", ColumnType::String)
                    .with_size(100)
                    .with_type_name("VARCHAR(100)")
                    .with_nullable(false),
            )
            .build();

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].type_name, "INT64");
        assert!(columns[0].nullable);
        assert_eq!(columns[1].size, Some(100));
        assert_eq!(columns[1].type_name, "VARCHAR(100)");
        assert!(!columns[1].nullable);
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = serde_json::json!({
            "name": "price",
            "column_type": "FLOAT64",
            "type_name": "DOUBLE",
            "size": null,
            "nullable": true
        });

        let column: ColumnDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(column.column_type, ColumnType::Float64);
        assert_eq!(column.type_name, "DOUBLE");
    }
}
