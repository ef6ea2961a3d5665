//! Entity metadata — fields, primary key and relations of an admin entity.
//!
//! Records themselves are untyped JSON objects keyed by column name; the
//! metadata is what lets the admin build queries, forms and URLs for them.

use serde::Serialize;
use serde_json::Value;

use crate::error::{AdminError, AdminResult};

/// A stored row: column name → value.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    BigInt,
    Float,
    /// Arbitrary-precision decimal, carried as its string form.
    Numeric,
    Boolean,
    Text,
    Uuid,
    Date,
    Timestamp,
    Timestamptz,
    Json,
    Other(String),
}

impl ColumnType {
    /// Map a PostgreSQL `information_schema.columns.data_type` value.
    pub fn from_pg_data_type(data_type: &str) -> Self {
        match data_type {
            "smallint" | "integer" => Self::Integer,
            "bigint" => Self::BigInt,
            "real" | "double precision" => Self::Float,
            "numeric" | "decimal" => Self::Numeric,
            "boolean" => Self::Boolean,
            "text" | "character varying" | "character" => Self::Text,
            "uuid" => Self::Uuid,
            "date" => Self::Date,
            "timestamp without time zone" => Self::Timestamp,
            "timestamp with time zone" => Self::Timestamptz,
            "json" | "jsonb" => Self::Json,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInt)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub column_type: ColumnType,
    pub is_primary: bool,
    /// Value produced by the database (serial, identity).
    pub is_generated: bool,
    pub is_nullable: bool,
    pub has_default: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            is_primary: false,
            is_generated: false,
            is_nullable: false,
            has_default: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.is_generated = true;
        self.has_default = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    pub fn is_to_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinTable {
    pub name: String,
    /// Join table column referring to the owning entity.
    pub owner_column: String,
    /// Join table column referring to the target entity.
    pub target_column: String,
}

/// A named relation from one entity to rows of another table.
///
/// For to-one relations `join_column` is a local column holding the value of
/// `target_table.target_column`. For one-to-many relations it is the column of
/// the target table that refers back to this entity's primary key.
#[derive(Debug, Clone, Serialize)]
pub struct RelationMetadata {
    pub property_name: String,
    pub kind: RelationKind,
    pub target_table: String,
    pub target_column: String,
    pub join_column: Option<String>,
    pub join_table: Option<JoinTable>,
}

impl RelationMetadata {
    pub fn many_to_one(
        property_name: impl Into<String>,
        join_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::ManyToOne,
            target_table: target_table.into(),
            target_column: target_column.into(),
            join_column: Some(join_column.into()),
            join_table: None,
        }
    }

    pub fn one_to_one(
        property_name: impl Into<String>,
        join_column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::OneToOne,
            ..Self::many_to_one(property_name, join_column, target_table, target_column)
        }
    }

    /// `target_table.inverse_column` holds this entity's primary key.
    pub fn one_to_many(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        inverse_column: impl Into<String>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::OneToMany,
            target_table: target_table.into(),
            target_column: String::new(),
            join_column: Some(inverse_column.into()),
            join_table: None,
        }
    }

    pub fn many_to_many(
        property_name: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
        join_table: JoinTable,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            kind: RelationKind::ManyToMany,
            target_table: target_table.into(),
            target_column: target_column.into(),
            join_column: None,
            join_table: Some(join_table),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityMetadata {
    pub name: String,
    pub table_name: String,
    pub columns: Vec<ColumnMetadata>,
    pub relations: Vec<RelationMetadata>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            columns: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_relation(mut self, relation: RelationMetadata) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, property_name: &str) -> Option<&RelationMetadata> {
        self.relations
            .iter()
            .find(|r| r.property_name == property_name)
    }

    pub fn primary_columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter().filter(|c| c.is_primary)
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary)
    }

    /// Property names of every relation, for loading them all at once.
    pub fn relation_names(&self) -> Vec<String> {
        self.relations
            .iter()
            .map(|r| r.property_name.clone())
            .collect()
    }

    /// Primary column → value for `record`, or `None` when part of the key is missing.
    pub fn get_entity_id_map(&self, record: &Record) -> Option<Record> {
        let mut id_map = Record::new();
        for column in self.primary_columns() {
            match record.get(&column.name) {
                Some(Value::Null) | None => return None,
                Some(value) => {
                    id_map.insert(column.name.clone(), value.clone());
                }
            }
        }
        if id_map.is_empty() {
            None
        } else {
            Some(id_map)
        }
    }

    /// The value that identifies `record` in URLs: the bare value for a single
    /// primary column, the id map for a composite key.
    pub fn get_primary_key_value(&self, record: &Record) -> Option<Value> {
        let id_map = self.get_entity_id_map(record)?;
        if id_map.len() == 1 {
            id_map.into_iter().next().map(|(_, value)| value)
        } else {
            Some(Value::Object(id_map))
        }
    }

    /// Inverse of [`Self::get_primary_key_value`].
    pub fn id_map_from_key(&self, key: &Value) -> AdminResult<Record> {
        let primary: Vec<&ColumnMetadata> = self.primary_columns().collect();
        if primary.is_empty() {
            return Err(AdminError::InvalidPrimaryKey(format!(
                "{} has no primary key",
                self.name
            )));
        }

        match key {
            Value::Object(fields) => {
                let mut id_map = Record::new();
                for column in primary {
                    match fields.get(&column.name) {
                        Some(Value::Null) | None => {
                            return Err(AdminError::InvalidPrimaryKey(format!(
                                "missing primary column `{}`",
                                column.name
                            )))
                        }
                        Some(value) => {
                            id_map.insert(column.name.clone(), value.clone());
                        }
                    }
                }
                Ok(id_map)
            }
            Value::Null | Value::Array(_) => Err(AdminError::InvalidPrimaryKey(key.to_string())),
            scalar if primary.len() == 1 => {
                let mut id_map = Record::new();
                id_map.insert(primary[0].name.clone(), scalar.clone());
                Ok(id_map)
            }
            _ => Err(AdminError::InvalidPrimaryKey(format!(
                "{} has a composite primary key, got {key}",
                self.name
            ))),
        }
    }
}
