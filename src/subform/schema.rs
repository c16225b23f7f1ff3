use std::collections::HashSet;

/// An ordered list of unique column names that can only grow
///
/// Columns keep the position of their first appearance; a pinned leading
/// column (the serial number) always stays first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<String>,
    known: HashSet<String>,
}

impl ColumnSchema {
    pub fn new() -> Self {
        ColumnSchema::default()
    }

    /// A schema whose first column is `leading`
    pub fn with_leading(leading: &str) -> Self {
        let mut schema = ColumnSchema::new();
        schema.push(leading);
        schema
    }

    /// Append `column` unless already present; returns whether it was new
    pub fn push(&mut self, column: &str) -> bool {
        if self.known.contains(column) {
            return false;
        }
        self.known.insert(column.to_string());
        self.columns.push(column.to_string());
        true
    }

    /// Append every unseen column in iteration order, returning the new ones
    pub fn extend<'a, I>(&mut self, columns: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        columns
            .into_iter()
            .filter(|column| self.push(column))
            .cloned()
            .collect()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.known.contains(column)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let mut schema = ColumnSchema::with_leading("serialNumber");
        let added = schema.extend(&names(&["a", "b"]));
        assert_eq!(added, names(&["a", "b"]));

        let added = schema.extend(&names(&["b", "c"]));
        assert_eq!(added, names(&["c"]));

        assert_eq!(schema.columns(), names(&["serialNumber", "a", "b", "c"]).as_slice());
    }

    #[test]
    fn test_leading_column_is_not_repeated() {
        let mut schema = ColumnSchema::with_leading("serialNumber");
        schema.extend(&names(&["x", "serialNumber", "y"]));
        assert_eq!(schema.columns(), names(&["serialNumber", "x", "y"]).as_slice());
        assert!(schema.contains("y"));
        assert_eq!(schema.len(), 3);
    }
}
