//! In-memory repositories, backed by a shared table map.
//!
//! Used by the test suite and the server's `--memory` demo mode. Integer
//! generated primary keys are assigned from a per-table sequence.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{AdminError, AdminResult};
use crate::metadata::{EntityMetadata, Record, RelationKind, RelationMetadata};
use crate::repository::{FindOptions, Repository};

#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<Record>,
    next_id: i64,
}

/// A set of named in-memory tables shared by every repository built from it.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, MemoryTable>>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn repository(self: &Arc<Self>, metadata: EntityMetadata) -> MemoryRepository {
        MemoryRepository {
            db: Arc::clone(self),
            metadata,
        }
    }

    /// Insert a raw row, bypassing any entity metadata. Join tables of
    /// many-to-many relations are filled this way.
    pub async fn insert_row(&self, table: &str, row: Record) {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().rows.push(row);
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(table).map_or(0, |t| t.rows.len())
    }
}

pub struct MemoryRepository {
    db: Arc<MemoryDatabase>,
    metadata: EntityMetadata,
}

/// Equality that tolerates `1` vs `"1"`, as keys arrive from URLs and forms.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        _ => display(a) == display(b),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => display(x).cmp(&display(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn matches(row: &Record, criteria: &Record) -> bool {
    criteria
        .iter()
        .all(|(column, expected)| row.get(column).is_some_and(|v| loose_eq(v, expected)))
}

impl MemoryRepository {
    fn primary_names(&self) -> Vec<String> {
        self.metadata
            .primary_columns()
            .map(|c| c.name.clone())
            .collect()
    }

    fn load_relation(
        &self,
        tables: &HashMap<String, MemoryTable>,
        row: &Record,
        relation: &RelationMetadata,
    ) -> Value {
        let empty = Vec::new();
        let target_rows = tables
            .get(&relation.target_table)
            .map_or(&empty, |t| &t.rows);

        match relation.kind {
            RelationKind::ManyToOne | RelationKind::OneToOne => {
                let local = relation
                    .join_column
                    .as_ref()
                    .and_then(|c| row.get(c))
                    .unwrap_or(&Value::Null);
                if local.is_null() {
                    return Value::Null;
                }
                target_rows
                    .iter()
                    .find(|t| {
                        t.get(&relation.target_column)
                            .is_some_and(|v| loose_eq(v, local))
                    })
                    .map_or(Value::Null, |t| Value::Object(t.clone()))
            }
            RelationKind::OneToMany => {
                let (Some(own_key), Some(inverse)) =
                    (self.single_key(row), relation.join_column.as_ref())
                else {
                    return Value::Array(Vec::new());
                };
                Value::Array(
                    target_rows
                        .iter()
                        .filter(|t| t.get(inverse).is_some_and(|v| loose_eq(v, &own_key)))
                        .map(|t| Value::Object(t.clone()))
                        .collect(),
                )
            }
            RelationKind::ManyToMany => {
                let (Some(own_key), Some(join)) = (self.single_key(row), relation.join_table.as_ref())
                else {
                    return Value::Array(Vec::new());
                };
                let linked: Vec<&Value> = tables
                    .get(&join.name)
                    .map(|t| {
                        t.rows
                            .iter()
                            .filter(|j| {
                                j.get(&join.owner_column)
                                    .is_some_and(|v| loose_eq(v, &own_key))
                            })
                            .filter_map(|j| j.get(&join.target_column))
                            .collect()
                    })
                    .unwrap_or_default();
                Value::Array(
                    target_rows
                        .iter()
                        .filter(|t| {
                            t.get(&relation.target_column)
                                .is_some_and(|v| linked.iter().any(|l| loose_eq(v, l)))
                        })
                        .map(|t| Value::Object(t.clone()))
                        .collect(),
                )
            }
        }
    }

    fn single_key(&self, row: &Record) -> Option<Value> {
        let mut primary = self.metadata.primary_columns();
        let column = primary.next()?;
        if primary.next().is_some() {
            return None;
        }
        row.get(&column.name).filter(|v| !v.is_null()).cloned()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    async fn find_and_count(&self, options: &FindOptions) -> AdminResult<(Vec<Record>, u64)> {
        let tables = self.db.tables.read().await;
        let Some(table) = tables.get(&self.metadata.table_name) else {
            return Ok((Vec::new(), 0));
        };

        let mut rows: Vec<&Record> = match &options.search {
            Some(search) => {
                let term = search.term.to_lowercase();
                table
                    .rows
                    .iter()
                    .filter(|row| {
                        search.columns.iter().any(|c| {
                            row.get(c)
                                .filter(|v| !v.is_null())
                                .is_some_and(|v| display(v).to_lowercase().contains(&term))
                        })
                    })
                    .collect()
            }
            None => table.rows.iter().collect(),
        };

        let primary = self.primary_names();
        rows.sort_by(|a, b| {
            primary
                .iter()
                .map(|c| compare_values(a.get(c), b.get(c)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let count = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(options.skip as usize)
            .take(options.take as usize)
            .cloned()
            .collect();
        Ok((page, count))
    }

    async fn find_one(&self, id_map: &Record, relations: &[String]) -> AdminResult<Option<Record>> {
        let tables = self.db.tables.read().await;
        let Some(row) = tables
            .get(&self.metadata.table_name)
            .and_then(|t| t.rows.iter().find(|r| matches(r, id_map)))
        else {
            return Ok(None);
        };

        let mut loaded = row.clone();
        for name in relations {
            match self.metadata.relation(name) {
                Some(relation) => {
                    let value = self.load_relation(&tables, row, relation);
                    loaded.insert(name.clone(), value);
                }
                None => tracing::warn!("{} has no relation named {}", self.metadata.name, name),
            }
        }
        Ok(Some(loaded))
    }

    async fn save(&self, record: &Record) -> AdminResult<Record> {
        let mut tables = self.db.tables.write().await;
        let table = tables
            .entry(self.metadata.table_name.clone())
            .or_default();

        let mut row: Record = record
            .iter()
            .filter(|(k, _)| self.metadata.column(k).is_some())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(id_map) = self.metadata.get_entity_id_map(&row) {
            if let Some(existing) = table.rows.iter_mut().find(|r| matches(r, &id_map)) {
                for (column, value) in row {
                    existing.insert(column, value);
                }
                return Ok(existing.clone());
            }
        }

        for column in &self.metadata.columns {
            let missing = row.get(&column.name).map_or(true, Value::is_null);
            if column.is_primary && column.is_generated && column.column_type.is_integer() && missing
            {
                table.next_id += 1;
                row.insert(column.name.clone(), Value::from(table.next_id));
            } else if !row.contains_key(&column.name) {
                row.insert(column.name.clone(), Value::Null);
            }
            if column.is_primary && column.column_type.is_integer() {
                if let Some(id) = row.get(&column.name).and_then(Value::as_i64) {
                    table.next_id = table.next_id.max(id);
                }
            }
        }

        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, criteria: &Record, values: &Record) -> AdminResult<u64> {
        let mut tables = self.db.tables.write().await;
        let Some(table) = tables.get_mut(&self.metadata.table_name) else {
            return Ok(0);
        };

        let assign = |row: &mut Record| {
            for (column, value) in values {
                if self.metadata.column(column).is_some() {
                    row.insert(column.clone(), value.clone());
                }
            }
        };

        // A moved key must not collide with another row.
        let primary = self.primary_names();
        if values.keys().any(|k| primary.contains(k)) {
            let mut moved_ids: Vec<Record> = Vec::new();
            for row in table.rows.iter().filter(|r| matches(r, criteria)) {
                let mut moved = row.clone();
                assign(&mut moved);
                let Some(new_id) = self.metadata.get_entity_id_map(&moved) else {
                    continue;
                };
                let taken = moved_ids.iter().any(|id| matches(id, &new_id))
                    || table
                        .rows
                        .iter()
                        .any(|other| !matches(other, criteria) && matches(other, &new_id));
                if taken {
                    return Err(AdminError::Database(format!(
                        "duplicate key {} in {}",
                        Value::Object(new_id),
                        self.metadata.table_name
                    )));
                }
                moved_ids.push(new_id);
            }
        }

        let mut affected = 0;
        for row in table.rows.iter_mut().filter(|r| matches(r, criteria)) {
            assign(row);
            affected += 1;
        }
        Ok(affected)
    }

    async fn remove(&self, id_map: &Record) -> AdminResult<u64> {
        let mut tables = self.db.tables.write().await;
        let Some(table) = tables.get_mut(&self.metadata.table_name) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|r| !matches(r, id_map));
        Ok((before - table.rows.len()) as u64)
    }
}
