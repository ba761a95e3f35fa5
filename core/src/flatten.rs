use crate::fetch::Patent;
use crate::PATENT_KEY;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Table name the one-row-per-patent parent table is returned under.
pub const PARENT_TABLE: &str = "patent";

/// The API reports a patent with no related entities as a single null-filled
/// element, so an absent field, a null and an empty list are all given one
/// placeholder child row carrying only the patent key. Flip to `false` to
/// drop the placeholder instead.
pub const MISSING_RELATION_EMITS_NULL_ROW: bool = true;

/// Output of the flattener: table name to table.
pub type TableMap = BTreeMap<String, Table>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    /// A single nested object per patent, merged column-wise into the
    /// parent table.
    OneToOne,
    /// A sequence of nested objects per patent, exploded into a child table.
    OneToMany,
}

struct Category {
    field: &'static str,
    table: &'static str,
    cardinality: Cardinality,
    /// Column dropped after flattening because it duplicates identifying
    /// information the table already carries.
    drop: Option<&'static str>,
}

use Cardinality::{OneToMany, OneToOne};

const CATEGORIES: &[Category] = &[
    Category { field: "inventors", table: "inventor", cardinality: OneToMany, drop: Some("inventor_key_id") },
    Category { field: "rawinventors", table: "rawinventor", cardinality: OneToMany, drop: None },
    Category { field: "assignees", table: "assignee", cardinality: OneToMany, drop: Some("assignee_key_id") },
    Category { field: "IPCs", table: "ipc", cardinality: OneToMany, drop: None },
    Category { field: "application_citations", table: "application_citation", cardinality: OneToMany, drop: None },
    Category { field: "cited_patents", table: "cited_patent", cardinality: OneToMany, drop: None },
    Category { field: "citedby_patents", table: "citedby_patent", cardinality: OneToMany, drop: None },
    Category { field: "uspcs", table: "uspc", cardinality: OneToMany, drop: None },
    Category { field: "cpcs", table: "cpc", cardinality: OneToMany, drop: None },
    Category { field: "wipos", table: "wipo", cardinality: OneToMany, drop: None },
    Category { field: "gov_interests", table: "gov_interest", cardinality: OneToMany, drop: None },
    Category { field: "lawyers", table: "lawyer", cardinality: OneToMany, drop: None },
    Category { field: "examiners", table: "examiner", cardinality: OneToMany, drop: None },
    Category { field: "foreign_priority", table: "foreign_priority", cardinality: OneToMany, drop: None },
    Category { field: "pct_data", table: "pct_data", cardinality: OneToMany, drop: None },
    Category { field: "applications", table: "application", cardinality: OneToOne, drop: Some("app_id") },
    Category { field: "nbers", table: "nber", cardinality: OneToOne, drop: None },
];

fn category_for(field: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.field == field)
}

/// Column-ordered rows with null padding; the flat in-memory analogue of one
/// relational table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at (row, column name); `None` when either is unknown.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col)
    }

    /// Append a row given as (column, value) pairs. Columns appear in
    /// first-seen order; rows that never mention a column hold null there.
    pub fn push_row(&mut self, cells: Vec<(String, Value)>) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (name, value) in cells {
            match self.column_index(&name) {
                Some(i) => row[i] = value,
                None => {
                    self.columns.push(name);
                    for existing in &mut self.rows {
                        existing.push(Value::Null);
                    }
                    row.push(value);
                }
            }
        }
        self.rows.push(row);
    }
}

/// Decompose fetched patents into a parent table plus one child table per
/// requested one-to-many field, all keyed by `patent_number`.
///
/// Requested fields are partitioned against the category table: one-to-many
/// fields explode into child tables under their singular name, one-to-one
/// fields merge into the parent row, everything else is a parent scalar
/// column. No information is lost beyond the restructuring itself.
pub fn flatten_patents(patents: &[Patent], fields: &[String]) -> TableMap {
    let mut scalar_fields: Vec<&str> = Vec::new();
    let mut one_to_one: Vec<&'static Category> = Vec::new();
    let mut one_to_many: Vec<&'static Category> = Vec::new();
    for field in fields {
        match category_for(field) {
            Some(cat) if cat.cardinality == OneToMany => one_to_many.push(cat),
            Some(cat) => one_to_one.push(cat),
            None => scalar_fields.push(field),
        }
    }

    let mut tables = TableMap::new();

    let mut parent = Table::new();
    for patent in patents {
        let mut cells: Vec<(String, Value)> = Vec::new();
        for &field in &scalar_fields {
            cells.push((
                field.to_string(),
                patent.get(field).cloned().unwrap_or(Value::Null),
            ));
        }
        for cat in &one_to_one {
            if let Some(object) = single_object(patent.get(cat.field)) {
                flatten_object(object, cat.drop, None, &mut cells);
            }
        }
        parent.push_row(cells);
    }
    tables.insert(PARENT_TABLE.to_string(), parent);

    for cat in &one_to_many {
        let mut table = Table::new();
        for patent in patents {
            let key = patent.get(PATENT_KEY).cloned().unwrap_or(Value::Null);
            let items = match patent.get(cat.field) {
                Some(Value::Array(items)) if !items.is_empty() => items.as_slice(),
                _ => {
                    if MISSING_RELATION_EMITS_NULL_ROW {
                        table.push_row(vec![(PATENT_KEY.to_string(), key)]);
                    }
                    continue;
                }
            };
            for item in items {
                let mut cells = vec![(PATENT_KEY.to_string(), key.clone())];
                match item {
                    Value::Object(object) => flatten_object(object, cat.drop, None, &mut cells),
                    other => cells.push((cat.field.to_string(), other.clone())),
                }
                table.push_row(cells);
            }
        }
        tables.insert(cat.table.to_string(), table);
    }

    debug!(
        patents = patents.len(),
        tables = tables.len(),
        "flatten complete"
    );
    tables
}

/// One-to-one relations arrive either as a bare object or wrapped in a
/// single-element list; unwrap to the object.
fn single_object(value: Option<&Value>) -> Option<&serde_json::Map<String, Value>> {
    match value? {
        Value::Object(object) => Some(object),
        Value::Array(items) => items.first().and_then(Value::as_object),
        _ => None,
    }
}

/// Copy an object's entries into `cells`, dotted-prefixing the keys of
/// nested objects and skipping the category's dropped duplicate column.
fn flatten_object(
    object: &serde_json::Map<String, Value>,
    drop: Option<&str>,
    prefix: Option<&str>,
    cells: &mut Vec<(String, Value)>,
) {
    for (key, value) in object {
        if prefix.is_none() && drop == Some(key.as_str()) {
            continue;
        }
        let column = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) => flatten_object(inner, drop, Some(&column), cells),
            other => cells.push((column, other.clone())),
        }
    }
}
