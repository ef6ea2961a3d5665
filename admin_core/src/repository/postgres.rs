//! PostgreSQL repository over a diesel-async connection pool.
//!
//! Rows travel as `jsonb`: reads select `to_jsonb(t)` and writes feed the
//! submitted object through `jsonb_populate_record(NULL::table, $1)`, which
//! lets PostgreSQL apply the real column types. Identifiers always come from
//! entity metadata and are quoted.
//!
//! `save` of a keyed record updates the matching row first and inserts only
//! when none matched; generated columns are never assigned by the update.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Jsonb, Text};
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde_json::Value;

use crate::error::{AdminError, AdminResult};
use crate::metadata::{EntityMetadata, Record, RelationKind, RelationMetadata};
use crate::repository::{FindOptions, Repository};

pub type PgPool = Pool<AsyncPgConnection>;

#[derive(Debug, QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Jsonb)]
    data: Value,
}

#[derive(Debug, QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn column_list<'a>(columns: impl Iterator<Item = &'a str>, prefix: &str) -> String {
    columns
        .map(|c| format!("{prefix}{}", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── SQL builders ──────────────────────────────────────────────
//
// Every builder takes an already quoted table name and unquoted column
// names. Row values are always passed as a `jsonb` parameter.

/// `(t.a, t.b) = (SELECT "a", "b" FROM jsonb_populate_record(NULL::table, $n))`
pub fn match_predicate(table: &str, columns: &[&str], param: usize) -> String {
    format!(
        "({}) = (SELECT {} FROM jsonb_populate_record(NULL::{table}, ${param}))",
        column_list(columns.iter().copied(), "t."),
        column_list(columns.iter().copied(), "")
    )
}

/// Filter shared by the page and count queries. Both bind exactly one text
/// parameter: the ILIKE pattern, or an empty string that disables filtering.
pub fn search_filter(columns: Option<&[String]>) -> String {
    match columns {
        Some(columns) if !columns.is_empty() => format!(
            "WHERE ({})",
            columns
                .iter()
                .map(|c| format!("t.{}::text ILIKE $1", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(" OR ")
        ),
        _ => "WHERE $1::text = ''".to_string(),
    }
}

pub fn page_sql(table: &str, filter: &str, order_by: &[&str], take: u64, skip: u64) -> String {
    format!(
        "SELECT to_jsonb(t) AS data FROM {table} AS t {filter} ORDER BY {} LIMIT {take} OFFSET {skip}",
        column_list(order_by.iter().copied(), "t.")
    )
}

pub fn count_sql(table: &str, filter: &str) -> String {
    format!("SELECT COUNT(*) AS count FROM {table} AS t {filter}")
}

/// Row matching the id map bound as `$1`.
pub fn select_one_sql(table: &str, key_columns: &[&str]) -> String {
    format!(
        "SELECT to_jsonb(t) AS data FROM {table} AS t WHERE {}",
        match_predicate(table, key_columns, 1)
    )
}

/// Insert the record bound as `$1`. `override_generated` lets explicit values
/// reach `GENERATED ALWAYS` identity columns.
pub fn insert_sql(table: &str, columns: &[&str], override_generated: bool) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {table} AS t DEFAULT VALUES RETURNING to_jsonb(t.*) AS data");
    }
    let cols = column_list(columns.iter().copied(), "");
    let overriding = if override_generated {
        " OVERRIDING SYSTEM VALUE"
    } else {
        ""
    };
    format!(
        "INSERT INTO {table} AS t ({cols}){overriding} \
         SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1) \
         RETURNING to_jsonb(t.*) AS data"
    )
}

/// Set `columns` from the record bound as `$1` on rows matching the id map
/// bound as `$2`.
pub fn update_sql(table: &str, columns: &[&str], key_columns: &[&str], returning: bool) -> String {
    let cols = column_list(columns.iter().copied(), "");
    let mut sql = format!(
        "UPDATE {table} AS t SET ({cols}) = \
         (SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1)) \
         WHERE {}",
        match_predicate(table, key_columns, 2)
    );
    if returning {
        sql.push_str(" RETURNING to_jsonb(t.*) AS data");
    }
    sql
}

pub fn delete_sql(table: &str, key_columns: &[&str]) -> String {
    format!(
        "DELETE FROM {table} AS t WHERE {}",
        match_predicate(table, key_columns, 1)
    )
}

fn keys(record: &Record) -> Vec<&str> {
    record.keys().map(String::as_str).collect()
}

fn into_record(row: JsonRow) -> AdminResult<Record> {
    match row.data {
        Value::Object(map) => Ok(map),
        other => Err(AdminError::Database(format!(
            "unexpected row returned: {other}"
        ))),
    }
}

// ── Repository ────────────────────────────────────────────────

pub struct PgRepository {
    pool: PgPool,
    metadata: EntityMetadata,
}

impl PgRepository {
    pub fn new(pool: PgPool, metadata: EntityMetadata) -> Self {
        Self { pool, metadata }
    }

    async fn conn(&self) -> AdminResult<Object<AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| AdminError::Database(format!("diesel pool: {e}")))
    }

    fn table(&self) -> String {
        quote_ident(&self.metadata.table_name)
    }

    /// Keep only the entries of `record` naming a column of this entity.
    fn known_columns(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(k, _)| self.metadata.column(k).is_some())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn is_generated(&self, column: &str) -> bool {
        self.metadata.column(column).is_some_and(|c| c.is_generated)
    }

    /// Write `values` onto the existing row with the same key, if there is one.
    async fn update_existing(
        &self,
        conn: &mut AsyncPgConnection,
        values: &Record,
        id_map: &Record,
    ) -> AdminResult<Option<Record>> {
        // Generated columns can only be set to DEFAULT by an UPDATE.
        let assignable: Vec<&str> = keys(values)
            .into_iter()
            .filter(|c| !self.is_generated(c))
            .collect();
        let table = self.table();

        let existing: Option<JsonRow> = if assignable.is_empty() {
            diesel::sql_query(select_one_sql(&table, &keys(id_map)))
                .bind::<Jsonb, _>(Value::Object(id_map.clone()))
                .get_result(conn)
                .await
                .optional()?
        } else {
            diesel::sql_query(update_sql(&table, &assignable, &keys(id_map), true))
                .bind::<Jsonb, _>(Value::Object(values.clone()))
                .bind::<Jsonb, _>(Value::Object(id_map.clone()))
                .get_result(conn)
                .await
                .optional()?
        };
        existing.map(into_record).transpose()
    }

    async fn load_relation(
        &self,
        conn: &mut AsyncPgConnection,
        row: &Record,
        relation: &RelationMetadata,
    ) -> AdminResult<Value> {
        let target = quote_ident(&relation.target_table);

        match relation.kind {
            RelationKind::ManyToOne | RelationKind::OneToOne => {
                let local = relation
                    .join_column
                    .as_ref()
                    .and_then(|c| row.get(c))
                    .unwrap_or(&Value::Null);
                if local.is_null() {
                    return Ok(Value::Null);
                }
                let related: Option<JsonRow> = diesel::sql_query(format!(
                    "SELECT to_jsonb(r) AS data FROM {target} AS r \
                     WHERE r.{}::text = $1 LIMIT 1",
                    quote_ident(&relation.target_column)
                ))
                .bind::<Text, _>(as_text(local))
                .get_result(conn)
                .await
                .optional()?;
                Ok(related.map_or(Value::Null, |r| r.data))
            }
            RelationKind::OneToMany => {
                let (Some(own_key), Some(inverse)) =
                    (self.metadata.get_primary_key_value(row), relation.join_column.as_ref())
                else {
                    return Ok(Value::Array(Vec::new()));
                };
                let related: Vec<JsonRow> = diesel::sql_query(format!(
                    "SELECT to_jsonb(r) AS data FROM {target} AS r WHERE r.{}::text = $1",
                    quote_ident(inverse)
                ))
                .bind::<Text, _>(as_text(&own_key))
                .load(conn)
                .await?;
                Ok(Value::Array(related.into_iter().map(|r| r.data).collect()))
            }
            RelationKind::ManyToMany => {
                let (Some(own_key), Some(join)) =
                    (self.metadata.get_primary_key_value(row), relation.join_table.as_ref())
                else {
                    return Ok(Value::Array(Vec::new()));
                };
                let related: Vec<JsonRow> = diesel::sql_query(format!(
                    "SELECT to_jsonb(r) AS data FROM {target} AS r \
                     JOIN {} AS j ON j.{}::text = r.{}::text \
                     WHERE j.{}::text = $1",
                    quote_ident(&join.name),
                    quote_ident(&join.target_column),
                    quote_ident(&relation.target_column),
                    quote_ident(&join.owner_column)
                ))
                .bind::<Text, _>(as_text(&own_key))
                .load(conn)
                .await?;
                Ok(Value::Array(related.into_iter().map(|r| r.data).collect()))
            }
        }
    }
}

#[async_trait]
impl Repository for PgRepository {
    fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    async fn find_and_count(&self, options: &FindOptions) -> AdminResult<(Vec<Record>, u64)> {
        let (filter, pattern) = match &options.search {
            Some(search) => (
                search_filter(Some(search.columns.as_slice())),
                format!("%{}%", escape_like(&search.term)),
            ),
            None => (search_filter(None), String::new()),
        };
        let table = self.table();
        let order_by: Vec<&str> = self
            .metadata
            .primary_columns()
            .map(|c| c.name.as_str())
            .collect();

        let mut conn = self.conn().await?;

        let rows: Vec<JsonRow> = diesel::sql_query(page_sql(
            &table,
            &filter,
            &order_by,
            options.take,
            options.skip,
        ))
        .bind::<Text, _>(pattern.clone())
        .load(&mut *conn)
        .await?;

        let count: CountRow = diesel::sql_query(count_sql(&table, &filter))
            .bind::<Text, _>(pattern)
            .get_result(&mut *conn)
            .await?;

        let records = rows
            .into_iter()
            .filter_map(|r| match r.data {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Ok((records, count.count.max(0) as u64))
    }

    async fn find_one(&self, id_map: &Record, relations: &[String]) -> AdminResult<Option<Record>> {
        let criteria = self.known_columns(id_map);
        if criteria.is_empty() {
            return Ok(None);
        }

        let mut conn = self.conn().await?;
        let sql = select_one_sql(&self.table(), &keys(&criteria));
        let found: Option<JsonRow> = diesel::sql_query(sql)
            .bind::<Jsonb, _>(Value::Object(criteria.clone()))
            .get_result(&mut *conn)
            .await
            .optional()?;

        let Some(Value::Object(row)) = found.map(|r| r.data) else {
            return Ok(None);
        };

        let mut loaded = row.clone();
        for name in relations {
            match self.metadata.relation(name) {
                Some(relation) => {
                    let value = self.load_relation(&mut conn, &row, relation).await?;
                    loaded.insert(name.clone(), value);
                }
                None => tracing::warn!("{} has no relation named {}", self.metadata.name, name),
            }
        }
        Ok(Some(loaded))
    }

    /// Update the row with the record's key, or insert when there is none.
    async fn save(&self, record: &Record) -> AdminResult<Record> {
        let values = self.known_columns(record);
        let mut conn = self.conn().await?;

        if let Some(id_map) = self.metadata.get_entity_id_map(&values) {
            if let Some(row) = self.update_existing(&mut conn, &values, &id_map).await? {
                tracing::debug!("Updated {} row", self.metadata.table_name);
                return Ok(row);
            }
        }

        let columns = keys(&values);
        let override_generated = columns.iter().any(|c| self.is_generated(c));
        let sql = insert_sql(&self.table(), &columns, override_generated);
        let saved: JsonRow = diesel::sql_query(sql)
            .bind::<Jsonb, _>(Value::Object(values.clone()))
            .get_result(&mut *conn)
            .await?;

        tracing::debug!("Inserted {} row", self.metadata.table_name);
        into_record(saved)
    }

    async fn update(&self, criteria: &Record, values: &Record) -> AdminResult<u64> {
        let criteria = self.known_columns(criteria);
        let values = self.known_columns(values);
        if criteria.is_empty() || values.is_empty() {
            return Ok(0);
        }

        let sql = update_sql(&self.table(), &keys(&values), &keys(&criteria), false);
        let mut conn = self.conn().await?;
        let affected = diesel::sql_query(sql)
            .bind::<Jsonb, _>(Value::Object(values))
            .bind::<Jsonb, _>(Value::Object(criteria))
            .execute(&mut *conn)
            .await?;
        Ok(affected as u64)
    }

    async fn remove(&self, id_map: &Record) -> AdminResult<u64> {
        let criteria = self.known_columns(id_map);
        if criteria.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn().await?;
        let affected = diesel::sql_query(delete_sql(&self.table(), &keys(&criteria)))
            .bind::<Jsonb, _>(Value::Object(criteria))
            .execute(&mut *conn)
            .await?;
        Ok(affected as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("posts"), "\"posts\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn column_lists_are_prefixed() {
        assert_eq!(
            column_list(["a", "b"].into_iter(), "t."),
            "t.\"a\", t.\"b\""
        );
    }

    #[test]
    fn predicates_compare_row_tuples() {
        assert_eq!(
            match_predicate("\"members\"", &["team", "user_id"], 2),
            "(t.\"team\", t.\"user_id\") = (SELECT \"team\", \"user_id\" \
             FROM jsonb_populate_record(NULL::\"members\", $2))"
        );
    }

    #[test]
    fn search_filter_binds_one_parameter() {
        let columns = vec!["title".to_string(), "body".to_string()];
        assert_eq!(
            search_filter(Some(columns.as_slice())),
            "WHERE (t.\"title\"::text ILIKE $1 OR t.\"body\"::text ILIKE $1)"
        );
        assert_eq!(search_filter(None), "WHERE $1::text = ''");
        let empty: Vec<String> = Vec::new();
        assert_eq!(search_filter(Some(empty.as_slice())), "WHERE $1::text = ''");
    }

    #[test]
    fn page_and_count_share_the_filter() {
        let filter = search_filter(None);
        assert_eq!(
            page_sql("\"posts\"", &filter, &["id"], 25, 50),
            "SELECT to_jsonb(t) AS data FROM \"posts\" AS t WHERE $1::text = '' \
             ORDER BY t.\"id\" LIMIT 25 OFFSET 50"
        );
        assert_eq!(
            count_sql("\"posts\"", &filter),
            "SELECT COUNT(*) AS count FROM \"posts\" AS t WHERE $1::text = ''"
        );
    }

    #[test]
    fn insert_without_values_uses_defaults() {
        assert_eq!(
            insert_sql("\"posts\"", &[], false),
            "INSERT INTO \"posts\" AS t DEFAULT VALUES RETURNING to_jsonb(t.*) AS data"
        );
    }

    #[test]
    fn insert_overrides_generated_values_only_when_asked() {
        let plain = insert_sql("\"posts\"", &["title"], false);
        assert_eq!(
            plain,
            "INSERT INTO \"posts\" AS t (\"title\") \
             SELECT \"title\" FROM jsonb_populate_record(NULL::\"posts\", $1) \
             RETURNING to_jsonb(t.*) AS data"
        );
        assert!(!plain.contains("ON CONFLICT"));

        let keyed = insert_sql("\"posts\"", &["id", "title"], true);
        assert!(keyed.starts_with(
            "INSERT INTO \"posts\" AS t (\"id\", \"title\") OVERRIDING SYSTEM VALUE SELECT"
        ));
    }

    #[test]
    fn update_sets_from_first_parameter_and_matches_second() {
        assert_eq!(
            update_sql("\"posts\"", &["title"], &["id"], true),
            "UPDATE \"posts\" AS t SET (\"title\") = \
             (SELECT \"title\" FROM jsonb_populate_record(NULL::\"posts\", $1)) \
             WHERE (t.\"id\") = (SELECT \"id\" FROM jsonb_populate_record(NULL::\"posts\", $2)) \
             RETURNING to_jsonb(t.*) AS data"
        );
        assert!(!update_sql("\"posts\"", &["title"], &["id"], false).contains("RETURNING"));
    }

    #[test]
    fn select_and_delete_match_on_first_parameter() {
        assert_eq!(
            select_one_sql("\"tags\"", &["slug"]),
            "SELECT to_jsonb(t) AS data FROM \"tags\" AS t \
             WHERE (t.\"slug\") = (SELECT \"slug\" FROM jsonb_populate_record(NULL::\"tags\", $1))"
        );
        assert_eq!(
            delete_sql("\"tags\"", &["slug"]),
            "DELETE FROM \"tags\" AS t \
             WHERE (t.\"slug\") = (SELECT \"slug\" FROM jsonb_populate_record(NULL::\"tags\", $1))"
        );
    }
}
