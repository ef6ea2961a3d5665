//! Demo blog schema — PostgreSQL migration and the in-memory equivalent.

use admin_core::metadata::{
    ColumnMetadata, ColumnType, EntityMetadata, JoinTable, Record, RelationMetadata,
};
use admin_core::repository::Repository;
use admin_core::{AdminEntity, AdminResult, AdminSection, AdminSite, MemoryDatabase};
use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};
use serde_json::{json, Value};

use crate::config::SectionConfig;

pub const DEMO_SCHEMA_SQL: &str = r#"
-- ================================================================
-- Demo blog tables
-- ================================================================

CREATE TABLE IF NOT EXISTS users (
    id          BIGSERIAL PRIMARY KEY,
    name        VARCHAR(255) NOT NULL,
    email       VARCHAR(255) NOT NULL UNIQUE,
    active      BOOLEAN NOT NULL DEFAULT TRUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS posts (
    id          BIGSERIAL PRIMARY KEY,
    author_id   BIGINT REFERENCES users(id) ON DELETE SET NULL,
    title       VARCHAR(255) NOT NULL,
    body        TEXT NOT NULL DEFAULT '',
    published   BOOLEAN NOT NULL DEFAULT FALSE,
    metadata    JSONB
);

CREATE INDEX IF NOT EXISTS idx_posts_author ON posts (author_id);

CREATE TABLE IF NOT EXISTS tags (
    slug        VARCHAR(64) PRIMARY KEY,
    label       VARCHAR(255) NOT NULL
);

CREATE TABLE IF NOT EXISTS post_tags (
    post_id     BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    tag_slug    VARCHAR(64) NOT NULL REFERENCES tags(slug) ON DELETE CASCADE ON UPDATE CASCADE,
    PRIMARY KEY (post_id, tag_slug)
);

CREATE TABLE IF NOT EXISTS comments (
    id          BIGSERIAL PRIMARY KEY,
    post_id     BIGINT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    body        TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- ================================================================
-- Demo rows
-- ================================================================

INSERT INTO users (id, name, email) VALUES
    (1, 'Ada Lovelace', 'ada@example.com'),
    (2, 'Grace Hopper', 'grace@example.com')
ON CONFLICT DO NOTHING;

SELECT setval(pg_get_serial_sequence('users', 'id'), GREATEST((SELECT MAX(id) FROM users), 1));

INSERT INTO posts (id, author_id, title, body, published) VALUES
    (1, 1, 'Notes on the Analytical Engine', 'Sketch of the engine.', TRUE),
    (2, 2, 'Compilers for everyone', 'Draft.', FALSE)
ON CONFLICT DO NOTHING;

SELECT setval(pg_get_serial_sequence('posts', 'id'), GREATEST((SELECT MAX(id) FROM posts), 1));

INSERT INTO tags (slug, label) VALUES
    ('history', 'History'),
    ('compilers', 'Compilers')
ON CONFLICT DO NOTHING;

INSERT INTO post_tags (post_id, tag_slug) VALUES
    (1, 'history'),
    (2, 'compilers'),
    (2, 'history')
ON CONFLICT DO NOTHING;

INSERT INTO comments (id, post_id, body) VALUES
    (1, 1, 'A classic.')
ON CONFLICT DO NOTHING;

SELECT setval(pg_get_serial_sequence('comments', 'id'), GREATEST((SELECT MAX(id) FROM comments), 1));
"#;

/// Sections used when `--seed-demo` runs without `ADMIN_SECTIONS`.
pub fn demo_sections() -> Vec<SectionConfig> {
    vec![
        SectionConfig {
            name: "Blog".into(),
            tables: vec!["posts".into(), "comments".into(), "tags".into()],
        },
        SectionConfig {
            name: "Accounts".into(),
            tables: vec!["users".into()],
        },
    ]
}

/// Create and fill the demo tables. Idempotent.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(DEMO_SCHEMA_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("demo migration failed: {e}"))?;
    Ok(())
}

// ── In-memory demo ──────────────────────────────────────────────

fn users() -> EntityMetadata {
    EntityMetadata::new("User", "users")
        .with_column(ColumnMetadata::new("id", ColumnType::BigInt).primary().generated())
        .with_column(ColumnMetadata::new("name", ColumnType::Text))
        .with_column(ColumnMetadata::new("email", ColumnType::Text))
        .with_column(ColumnMetadata::new("active", ColumnType::Boolean).with_default())
        .with_column(ColumnMetadata::new("created_at", ColumnType::Timestamptz).with_default())
        .with_relation(RelationMetadata::one_to_many("posts", "posts", "author_id"))
}

fn posts() -> EntityMetadata {
    EntityMetadata::new("Post", "posts")
        .with_column(ColumnMetadata::new("id", ColumnType::BigInt).primary().generated())
        .with_column(ColumnMetadata::new("author_id", ColumnType::BigInt).nullable())
        .with_column(ColumnMetadata::new("title", ColumnType::Text))
        .with_column(ColumnMetadata::new("body", ColumnType::Text).with_default())
        .with_column(ColumnMetadata::new("published", ColumnType::Boolean).with_default())
        .with_column(ColumnMetadata::new("metadata", ColumnType::Json).nullable())
        .with_relation(RelationMetadata::many_to_one("author", "author_id", "users", "id"))
        .with_relation(RelationMetadata::many_to_many(
            "tags",
            "tags",
            "slug",
            JoinTable {
                name: "post_tags".into(),
                owner_column: "post_id".into(),
                target_column: "tag_slug".into(),
            },
        ))
        .with_relation(RelationMetadata::one_to_many("comments", "comments", "post_id"))
}

fn tags() -> EntityMetadata {
    EntityMetadata::new("Tag", "tags")
        .with_column(ColumnMetadata::new("slug", ColumnType::Text).primary())
        .with_column(ColumnMetadata::new("label", ColumnType::Text))
}

fn comments() -> EntityMetadata {
    EntityMetadata::new("Comment", "comments")
        .with_column(ColumnMetadata::new("id", ColumnType::BigInt).primary().generated())
        .with_column(ColumnMetadata::new("post_id", ColumnType::BigInt))
        .with_column(ColumnMetadata::new("body", ColumnType::Text))
        .with_column(ColumnMetadata::new("created_at", ColumnType::Timestamptz).with_default())
        .with_relation(RelationMetadata::many_to_one("post", "post_id", "posts", "id"))
}

fn row(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

async fn seed(repository: &impl Repository, rows: Vec<Value>) -> AdminResult<()> {
    for value in rows {
        repository.save(&row(value)).await?;
    }
    Ok(())
}

/// The demo blog on an in-memory database, filled with the same rows as the
/// PostgreSQL demo.
pub async fn memory_site(results_per_page: u64) -> AdminResult<AdminSite> {
    let db = MemoryDatabase::new();
    let now = chrono::Utc::now().to_rfc3339();

    let user_repo = db.repository(users());
    seed(
        &user_repo,
        vec![
            json!({"name": "Ada Lovelace", "email": "ada@example.com", "active": true, "created_at": now}),
            json!({"name": "Grace Hopper", "email": "grace@example.com", "active": true, "created_at": now}),
        ],
    )
    .await?;

    let post_repo = db.repository(posts());
    seed(
        &post_repo,
        vec![
            json!({"author_id": 1, "title": "Notes on the Analytical Engine", "body": "Sketch of the engine.", "published": true}),
            json!({"author_id": 2, "title": "Compilers for everyone", "body": "Draft.", "published": false}),
        ],
    )
    .await?;

    let tag_repo = db.repository(tags());
    seed(
        &tag_repo,
        vec![
            json!({"slug": "history", "label": "History"}),
            json!({"slug": "compilers", "label": "Compilers"}),
        ],
    )
    .await?;

    for (post_id, tag_slug) in [(1, "history"), (2, "compilers"), (2, "history")] {
        db.insert_row("post_tags", row(json!({"post_id": post_id, "tag_slug": tag_slug})))
            .await;
    }

    let comment_repo = db.repository(comments());
    seed(
        &comment_repo,
        vec![json!({"post_id": 1, "body": "A classic.", "created_at": now})],
    )
    .await?;

    let blog = AdminSection::new("Blog")
        .with_entity(
            AdminEntity::new(post_repo)
                .with_list_display(&["id", "title", "author_id", "published"])
                .with_search_fields(&["title", "body"])
                .with_results_per_page(results_per_page),
        )?
        .with_entity(
            AdminEntity::new(comment_repo)
                .with_search_fields(&["body"])
                .with_results_per_page(results_per_page),
        )?
        .with_entity(AdminEntity::new(tag_repo).with_results_per_page(results_per_page))?;
    let accounts = AdminSection::new("Accounts").with_entity(
        AdminEntity::new(user_repo)
            .with_list_display(&["id", "name", "email", "active"])
            .with_search_fields(&["name", "email"])
            .with_results_per_page(results_per_page),
    )?;

    AdminSite::new().with_section(blog)?.with_section(accounts)
}
