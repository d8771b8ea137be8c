//! Materialized result rows.

use crate::types::Value;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// One row of a record set: column names paired with value cells.
///
/// Rows of the same record set share a single name list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { names, values }
    }

    /// Value of column `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the first column named `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether both rows use the same name list instance.
    pub fn shares_names_with(&self, other: &Row) -> bool {
        Arc::ptr_eq(&self.names, &other.names)
    }

    /// Convert to a JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .names
            .iter()
            .zip(&self.values)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str("\t")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let names: Arc<[String]> = Arc::from(vec!["id".to_string(), "name".to_string()]);
        Row::new(names, vec![Value::Int64(1), Value::Null])
    }

    #[test]
    fn test_access() {
        let row = row();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0], Value::Int64(1));
        assert_eq!(row.get_by_name("name"), Some(&Value::Null));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(row.get(2), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(row().to_string(), "1\tNULL");
    }

    #[test]
    fn test_to_json() {
        assert_eq!(row().to_json(), serde_json::json!({"id": 1, "name": null}));
    }

    #[test]
    fn test_shared_names() {
        let a = row();
        let b = Row::new(Arc::clone(&a.names), vec![Value::Int64(2), Value::Null]);
        assert!(a.shares_names_with(&b));
        assert!(!a.shares_names_with(&row()));
    }
}
