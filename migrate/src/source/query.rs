use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::bail;
use crate::error::{ErrorKind, MigrateResult};
use crate::types::Value;

/// One table of the injected legacy data, rows as property bags.
pub type TableRows = Vec<BTreeMap<String, Value>>;

/// The legacy data a source reads from.
///
/// The engine deliberately does not own a database connection; the storage
/// engine is an external collaborator. Callers materialize the relevant
/// legacy tables into a [`Dataset`] and sources evaluate their declarative
/// queries against it.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    tables: BTreeMap<String, TableRows>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, replacing any previous contents under the same name.
    pub fn with_table(mut self, name: impl Into<String>, rows: TableRows) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableRows> {
        self.tables.get(name)
    }
}

/// Comparison operator of a query condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// One filter condition on a query.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub comparison: Comparison,
    pub value: Value,
}

/// Sort direction of one ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A declarative description of which legacy records to fetch.
///
/// Filterable and orderable; an empty field list selects every column. This
/// is the migration analogue of a select query, without committing the engine
/// to any particular storage backend.
#[derive(Debug, Clone)]
pub struct SourceQuery {
    pub table: String,
    pub fields: Vec<String>,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<(String, SortDirection)>,
}

impl SourceQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Restricts the selected columns.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Adds a filter condition.
    pub fn condition(
        mut self,
        field: impl Into<String>,
        comparison: Comparison,
        value: impl Into<Value>,
    ) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            comparison,
            value: value.into(),
        });
        self
    }

    /// Adds an ordering key. Keys apply in declaration order.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    /// Evaluates the query against a dataset.
    ///
    /// A missing table means the legacy system cannot provide what the
    /// migration was configured to read, which is run-fatal.
    pub fn run(&self, dataset: &Dataset) -> MigrateResult<TableRows> {
        let Some(rows) = dataset.table(&self.table) else {
            bail!(
                ErrorKind::SourceUnavailable,
                "Query references a table the source system does not provide",
                self.table.clone()
            );
        };

        let mut selected: TableRows = rows
            .iter()
            .filter(|row| self.matches(row))
            .cloned()
            .collect();

        if !self.order_by.is_empty() {
            selected.sort_by(|a, b| self.compare_rows(a, b));
        }

        if !self.fields.is_empty() {
            for row in &mut selected {
                row.retain(|key, _| self.fields.iter().any(|field| field == key));
            }
        }

        Ok(selected)
    }

    fn matches(&self, row: &BTreeMap<String, Value>) -> bool {
        self.conditions.iter().all(|condition| {
            let actual = row.get(&condition.field).unwrap_or(&Value::Null);
            let ordering = compare_values(actual, &condition.value);
            match condition.comparison {
                Comparison::Eq => ordering == Ordering::Equal,
                Comparison::Ne => ordering != Ordering::Equal,
                Comparison::Gt => ordering == Ordering::Greater,
                Comparison::Ge => ordering != Ordering::Less,
                Comparison::Lt => ordering == Ordering::Less,
                Comparison::Le => ordering != Ordering::Greater,
            }
        })
    }

    fn compare_rows(&self, a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Ordering {
        for (field, direction) in &self.order_by {
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ordering = match direction {
                SortDirection::Ascending => compare_values(left, right),
                SortDirection::Descending => compare_values(right, left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Total order over values for filtering and sorting: numerically when both
/// sides are numeric, otherwise by string rendering, with non-renderable
/// values last.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(left), Some(right)) = (a.as_i64(), b.as_i64()) {
        return left.cmp(&right);
    }

    match (a.to_display_string(), b.to_display_string()) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn dataset() -> Dataset {
        Dataset::new().with_table(
            "node",
            vec![
                row(&[("nid", Value::Int(2)), ("type", Value::from("article"))]),
                row(&[("nid", Value::Int(1)), ("type", Value::from("page"))]),
                row(&[("nid", Value::Int(3)), ("type", Value::from("page"))]),
            ],
        )
    }

    #[test]
    fn conditions_filter_and_order_applies() {
        let result = SourceQuery::new("node")
            .condition("type", Comparison::Eq, "page")
            .order_by("nid", SortDirection::Descending)
            .run(&dataset())
            .unwrap();

        let nids: Vec<i64> = result
            .iter()
            .map(|row| row["nid"].as_i64().unwrap())
            .collect();
        assert_eq!(nids, vec![3, 1]);
    }

    #[test]
    fn field_projection_drops_columns() {
        let result = SourceQuery::new("node")
            .field("nid")
            .run(&dataset())
            .unwrap();

        assert!(result.iter().all(|row| row.len() == 1 && row.contains_key("nid")));
    }

    #[test]
    fn missing_table_is_source_unavailable() {
        let error = SourceQuery::new("gone").run(&dataset()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::SourceUnavailable);
    }
}
