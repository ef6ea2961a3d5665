//! Entity metadata read from the PostgreSQL catalog.
//!
//! Columns, primary key and single-column foreign keys come from
//! `information_schema`. Foreign keys become many-to-one relations on the
//! referencing table and one-to-many relations on the referenced one.
//! Many-to-many relations are not inferred; declare them with
//! [`EntityMetadata::with_relation`].

use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::{AdminError, AdminResult};
use crate::metadata::{ColumnMetadata, ColumnType, EntityMetadata, RelationMetadata};

#[derive(Debug, QueryableByName)]
struct ColumnInfo {
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
    #[diesel(sql_type = Text)]
    is_nullable: String,
    #[diesel(sql_type = Nullable<Text>)]
    column_default: Option<String>,
    #[diesel(sql_type = Text)]
    is_identity: String,
}

#[derive(Debug, QueryableByName)]
struct KeyColumn {
    #[diesel(sql_type = Text)]
    column_name: String,
}

#[derive(Debug, QueryableByName)]
struct ForeignKey {
    #[diesel(sql_type = Text)]
    local_table: String,
    #[diesel(sql_type = Text)]
    local_column: String,
    #[diesel(sql_type = Text)]
    foreign_table: String,
    #[diesel(sql_type = Text)]
    foreign_column: String,
}

const FOREIGN_KEYS_SQL: &str = "SELECT \
        kcu.table_name::text AS local_table, \
        kcu.column_name::text AS local_column, \
        ccu.table_name::text AS foreign_table, \
        ccu.column_name::text AS foreign_column \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
     JOIN information_schema.constraint_column_usage ccu \
       ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema \
     WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = current_schema()";

/// Relation property name for a foreign key column: `author_id` → `author`.
pub fn many_to_one_name(column: &str, foreign_table: &str) -> String {
    match column.strip_suffix("_id") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => format!("{foreign_table}_ref"),
    }
}

fn unique_property(metadata: &EntityMetadata, candidate: String, fallback_suffix: &str) -> String {
    let taken = |name: &str| metadata.column(name).is_some() || metadata.relation(name).is_some();
    if !taken(&candidate) {
        return candidate;
    }
    let suffixed = format!("{candidate}_{fallback_suffix}");
    if !taken(&suffixed) {
        return suffixed;
    }
    let mut n = 2;
    loop {
        let numbered = format!("{suffixed}_{n}");
        if !taken(&numbered) {
            return numbered;
        }
        n += 1;
    }
}

/// Build the metadata of `table`; `name` defaults to the table name.
pub async fn introspect_table(
    conn: &mut AsyncPgConnection,
    table: &str,
    name: Option<&str>,
) -> AdminResult<EntityMetadata> {
    let columns: Vec<ColumnInfo> = diesel::sql_query(
        "SELECT \
            column_name::text AS column_name, \
            data_type::text AS data_type, \
            is_nullable::text AS is_nullable, \
            column_default::text AS column_default, \
            is_identity::text AS is_identity \
         FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind::<Text, _>(table)
    .load(conn)
    .await?;

    if columns.is_empty() {
        return Err(AdminError::Registration(format!(
            "table {table} does not exist or has no columns"
        )));
    }

    let primary: Vec<KeyColumn> = diesel::sql_query(
        "SELECT kcu.column_name::text AS column_name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
         WHERE tc.constraint_type = 'PRIMARY KEY' \
           AND tc.table_schema = current_schema() AND tc.table_name = $1 \
         ORDER BY kcu.ordinal_position",
    )
    .bind::<Text, _>(table)
    .load(conn)
    .await?;

    let outgoing: Vec<ForeignKey> =
        diesel::sql_query(format!("{FOREIGN_KEYS_SQL} AND kcu.table_name = $1"))
            .bind::<Text, _>(table)
            .load(conn)
            .await?;

    let incoming: Vec<ForeignKey> =
        diesel::sql_query(format!("{FOREIGN_KEYS_SQL} AND ccu.table_name = $1"))
            .bind::<Text, _>(table)
            .load(conn)
            .await?;

    let mut metadata = EntityMetadata::new(name.unwrap_or(table), table);
    for info in columns {
        let column_type = ColumnType::from_pg_data_type(&info.data_type);
        let generated = info.is_identity == "YES"
            || info
                .column_default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
        let mut column = ColumnMetadata::new(info.column_name.clone(), column_type);
        if primary.iter().any(|k| k.column_name == info.column_name) {
            column = column.primary();
        }
        if generated {
            column = column.generated();
        } else if info.column_default.is_some() {
            column = column.with_default();
        }
        if info.is_nullable == "YES" {
            column = column.nullable();
        }
        metadata = metadata.with_column(column);
    }

    for fk in outgoing {
        let property = unique_property(
            &metadata,
            many_to_one_name(&fk.local_column, &fk.foreign_table),
            "ref",
        );
        metadata = metadata.with_relation(RelationMetadata::many_to_one(
            property,
            fk.local_column,
            fk.foreign_table,
            fk.foreign_column,
        ));
    }

    // One-to-many needs a single-column primary key to match against.
    if metadata.primary_columns().count() == 1 {
        for fk in incoming {
            let property = unique_property(&metadata, fk.local_table.clone(), &fk.local_column);
            metadata = metadata.with_relation(RelationMetadata::one_to_many(
                property,
                fk.local_table,
                fk.local_column,
            ));
        }
    }

    tracing::debug!(
        "Introspected {}: {} columns, {} relations",
        table,
        metadata.columns.len(),
        metadata.relations.len()
    );
    Ok(metadata)
}
