//! End-to-end tests of the admin router over in-memory repositories.

use std::sync::Arc;

use admin_core::metadata::{ColumnMetadata, ColumnType, EntityMetadata, Record, RelationMetadata};
use admin_core::repository::Repository;
use admin_core::urls::encode_primary_key;
use admin_core::{
    mount, AdminEntity, AdminEnvironment, AdminSection, AdminSite, AdminState, MemoryDatabase,
    UrlBuilder, Widget,
};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

// ── Fixtures ──────────────────────────────────────────────────

fn users() -> EntityMetadata {
    EntityMetadata::new("User", "users")
        .with_column(ColumnMetadata::new("id", ColumnType::BigInt).primary().generated())
        .with_column(ColumnMetadata::new("name", ColumnType::Text))
        .with_column(ColumnMetadata::new("active", ColumnType::Boolean).with_default())
        .with_relation(RelationMetadata::one_to_many("posts", "posts", "author_id"))
}

fn posts() -> EntityMetadata {
    EntityMetadata::new("Post", "posts")
        .with_column(ColumnMetadata::new("id", ColumnType::BigInt).primary().generated())
        .with_column(ColumnMetadata::new("title", ColumnType::Text))
        .with_column(ColumnMetadata::new("author_id", ColumnType::BigInt).nullable())
        .with_relation(RelationMetadata::many_to_one("author", "author_id", "users", "id"))
}

fn tags() -> EntityMetadata {
    EntityMetadata::new("Tag", "tags")
        .with_column(ColumnMetadata::new("slug", ColumnType::Text).primary())
        .with_column(ColumnMetadata::new("label", ColumnType::Text))
}

fn memberships() -> EntityMetadata {
    EntityMetadata::new("Membership", "memberships")
        .with_column(ColumnMetadata::new("team", ColumnType::Text).primary())
        .with_column(ColumnMetadata::new("user_id", ColumnType::BigInt).primary())
        .with_column(ColumnMetadata::new("role", ColumnType::Text))
}

fn credentials() -> EntityMetadata {
    EntityMetadata::new("Credential", "credentials")
        .with_column(ColumnMetadata::new("id", ColumnType::BigInt).primary().generated())
        .with_column(ColumnMetadata::new("login", ColumnType::Text))
        .with_column(ColumnMetadata::new("secret", ColumnType::Text))
}

/// Change-list path of a membership, `verb` appended.
fn membership_url(team: &str, user_id: i64, verb: &str) -> String {
    let key = encode_primary_key(&json!({"team": team, "user_id": user_id}));
    format!("/api/admin/blog/membership/{key}/{verb}")
}

fn obj(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

struct Fixture {
    db: Arc<MemoryDatabase>,
    app: Router,
}

fn fixture() -> Fixture {
    let db = MemoryDatabase::new();
    let section = AdminSection::new("Blog")
        .with_entity(
            AdminEntity::new(db.repository(users()))
                .with_list_display(&["id", "name"])
                .with_search_fields(&["name"])
                .with_results_per_page(10),
        )
        .unwrap()
        .with_entity(AdminEntity::new(db.repository(posts())))
        .unwrap()
        .with_entity(AdminEntity::new(db.repository(tags())))
        .unwrap()
        .with_entity(AdminEntity::new(db.repository(memberships())))
        .unwrap()
        .with_entity(
            AdminEntity::new(db.repository(credentials()))
                .with_list_display(&["login", "secret"])
                .with_widget("secret", Widget::Password),
        )
        .unwrap();
    let site = AdminSite::new().with_section(section).unwrap();
    let state = AdminState::new(
        site,
        AdminEnvironment::new().unwrap(),
        UrlBuilder::default(),
    );
    Fixture {
        db,
        app: mount(state),
    }
}

impl Fixture {
    async fn seed(&self, metadata: EntityMetadata, row: Value) -> Record {
        self.db.repository(metadata).save(&obj(row)).await.unwrap()
    }

    async fn get(&self, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn post_form(&self, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Status plus the body, or the `Location` header for redirects.
    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        if status.is_redirection() {
            let location = response.headers()[header::LOCATION]
                .to_str()
                .unwrap()
                .to_string();
            return (status, location);
        }
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

// ── Index and change list ─────────────────────────────────────

#[tokio::test]
async fn index_lists_sections_and_entities() {
    let fx = fixture();
    let (status, body) = fx.get("/api/admin").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Blog"));
    assert!(body.contains("/api/admin/blog/user"));
    assert!(body.contains("/api/admin/blog/post/add"));
}

#[tokio::test]
async fn changelist_paginates_in_key_order() {
    let fx = fixture();
    for i in 1..=25 {
        fx.seed(users(), json!({"name": format!("member-{i:02}")})).await;
    }

    let (status, body) = fx.get("/api/admin/blog/user?page=3").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Page 3 of 3"));
    assert!(body.contains("member-21"));
    assert!(!body.contains("member-05"));
    assert!(body.contains("25 User rows"));

    let (_, first) = fx.get("/api/admin/blog/user?page=bogus").await;
    assert!(first.contains("Page 1 of 3"));
    assert!(first.contains("member-01"));
}

#[tokio::test]
async fn changelist_search_filters_rows() {
    let fx = fixture();
    fx.seed(users(), json!({"name": "Ada Lovelace"})).await;
    fx.seed(users(), json!({"name": "Bob"})).await;

    let (status, body) = fx.get("/api/admin/blog/user?search=ada").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Ada Lovelace"));
    assert!(!body.contains("Bob"));
    assert!(body.contains("1 User row"));
}

// ── Add and change ────────────────────────────────────────────

#[tokio::test]
async fn add_form_hides_generated_columns() {
    let fx = fixture();
    let (status, body) = fx.get("/api/admin/blog/user/add").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("name=\"name\""));
    assert!(!body.contains("name=\"id\""));
}

#[tokio::test]
async fn create_redirects_to_change_page() {
    let fx = fixture();
    let (status, location) = fx
        .post_form("/api/admin/blog/user/add", "name=Carol&active=on")
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "/api/admin/blog/user/1/change");

    let stored = fx
        .db
        .repository(users())
        .find_one(&obj(json!({"id": 1})), &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["name"], json!("Carol"));
    assert_eq!(stored["active"], json!(true));
}

#[tokio::test]
async fn change_page_links_loaded_relations() {
    let fx = fixture();
    fx.seed(users(), json!({"name": "Ada"})).await;
    fx.seed(posts(), json!({"title": "Notes", "author_id": 1})).await;

    let (status, body) = fx.get("/api/admin/blog/post/1/change").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("value=\"Notes\""));
    assert!(body.contains("<a href=\"/api/admin/blog/user/1/change\">Ada</a>"));
    assert!(body.contains("/api/admin/blog/post/1/delete"));

    let (_, author) = fx.get("/api/admin/blog/user/1/change").await;
    assert!(author.contains("<a href=\"/api/admin/blog/post/1/change\">Notes</a>"));
}

#[tokio::test]
async fn update_saves_edits_and_unchecked_boxes() {
    let fx = fixture();
    fx.seed(users(), json!({"name": "Ada", "active": true})).await;

    let (status, body) = fx
        .post_form("/api/admin/blog/user/1/change", "id=1&name=Ada+King")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("The User was changed successfully."));

    let stored = fx
        .db
        .repository(users())
        .find_one(&obj(json!({"id": 1})), &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["name"], json!("Ada King"));
    assert_eq!(stored["active"], json!(false));
    assert_eq!(fx.db.row_count("users").await, 1);
}

#[tokio::test]
async fn update_moves_changed_primary_key() {
    let fx = fixture();
    fx.seed(tags(), json!({"slug": "rust", "label": "Rust"})).await;

    let (status, body) = fx
        .post_form(
            "/api/admin/blog/tag/%22rust%22/change",
            "slug=rustlang&label=Rust+language",
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/api/admin/blog/tag/%22rustlang%22/delete"));
    assert_eq!(fx.db.row_count("tags").await, 1);

    let (old, _) = fx.get("/api/admin/blog/tag/%22rust%22/change").await;
    assert_eq!(old, StatusCode::NOT_FOUND);
    let (new, _) = fx.get("/api/admin/blog/tag/%22rustlang%22/change").await;
    assert_eq!(new, StatusCode::OK);
}

#[tokio::test]
async fn renaming_onto_an_existing_key_is_refused() {
    let fx = fixture();
    fx.seed(tags(), json!({"slug": "rust", "label": "Rust"})).await;
    fx.seed(tags(), json!({"slug": "go", "label": "Go"})).await;

    let (status, _) = fx
        .post_form("/api/admin/blog/tag/%22rust%22/change", "slug=go&label=Rust")
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(fx.db.row_count("tags").await, 2);

    let (_, go) = fx.get("/api/admin/blog/tag/%22go%22/change").await;
    assert!(go.contains("value=\"Go\""));
    let (rust, _) = fx.get("/api/admin/blog/tag/%22rust%22/change").await;
    assert_eq!(rust, StatusCode::OK);
}

// ── Composite keys ────────────────────────────────────────────

#[tokio::test]
async fn composite_key_change_page_and_update() {
    let fx = fixture();
    fx.seed(memberships(), json!({"team": "core", "user_id": 1, "role": "member"}))
        .await;
    fx.seed(memberships(), json!({"team": "core", "user_id": 2, "role": "member"}))
        .await;

    let (status, body) = fx.get(&membership_url("core", 1, "change")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("value=\"member\""));
    assert!(body.contains(&membership_url("core", 1, "delete")));

    let (status, body) = fx
        .post_form(
            &membership_url("core", 1, "change"),
            "team=core&user_id=1&role=lead",
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("value=\"lead\""));
    assert_eq!(fx.db.row_count("memberships").await, 2);

    let stored = fx
        .db
        .repository(memberships())
        .find_one(&obj(json!({"team": "core", "user_id": 2})), &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["role"], json!("member"));
}

#[tokio::test]
async fn composite_key_moves_when_a_key_column_changes() {
    let fx = fixture();
    fx.seed(memberships(), json!({"team": "core", "user_id": 1, "role": "lead"}))
        .await;

    let (status, _) = fx
        .post_form(
            &membership_url("core", 1, "change"),
            "team=platform&user_id=1&role=lead",
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fx.db.row_count("memberships").await, 1);

    let (old, _) = fx.get(&membership_url("core", 1, "change")).await;
    assert_eq!(old, StatusCode::NOT_FOUND);
    let (new, _) = fx.get(&membership_url("platform", 1, "change")).await;
    assert_eq!(new, StatusCode::OK);
}

#[tokio::test]
async fn composite_key_delete_and_list_action() {
    let fx = fixture();
    for (team, user_id) in [("core", 1), ("core", 2), ("web", 1)] {
        fx.seed(memberships(), json!({"team": team, "user_id": user_id, "role": "member"}))
            .await;
    }

    let (status, location) = fx.post_form(&membership_url("web", 1, "delete"), "").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "/api/admin/blog/membership");
    assert_eq!(fx.db.row_count("memberships").await, 2);

    let body = format!(
        "action=delete&selected={}",
        encode_primary_key(&json!({"team": "core", "user_id": 2}))
    );
    let (status, _) = fx.post_form("/api/admin/blog/membership/action", &body).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(fx.db.row_count("memberships").await, 1);

    let (remaining, _) = fx.get(&membership_url("core", 1, "change")).await;
    assert_eq!(remaining, StatusCode::OK);

    let (partial, _) = fx
        .post_form(
            "/api/admin/blog/membership/action",
            "action=delete&selected=%7B%22team%22%3A%22core%22%7D",
        )
        .await;
    assert_eq!(partial, StatusCode::BAD_REQUEST);
    assert_eq!(fx.db.row_count("memberships").await, 1);
}

// ── Password widgets ──────────────────────────────────────────

#[tokio::test]
async fn password_columns_are_masked_and_kept_when_blank() {
    let fx = fixture();
    fx.seed(credentials(), json!({"login": "ada", "secret": "hunter2"})).await;

    let (_, list) = fx.get("/api/admin/blog/credential").await;
    assert!(list.contains("********"));
    assert!(!list.contains("hunter2"));

    let (status, page) = fx.get("/api/admin/blog/credential/1/change").await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("type=\"password\""));
    assert!(!page.contains("hunter2"));

    let repo = fx.db.repository(credentials());
    let (status, _) = fx
        .post_form("/api/admin/blog/credential/1/change", "login=ada.k&secret=")
        .await;
    assert_eq!(status, StatusCode::OK);
    let stored = repo.find_one(&obj(json!({"id": 1})), &[]).await.unwrap().unwrap();
    assert_eq!(stored["login"], json!("ada.k"));
    assert_eq!(stored["secret"], json!("hunter2"));

    fx.post_form("/api/admin/blog/credential/1/change", "login=ada.k&secret=s3cret")
        .await;
    let stored = repo.find_one(&obj(json!({"id": 1})), &[]).await.unwrap().unwrap();
    assert_eq!(stored["secret"], json!("s3cret"));
}

// ── Delete and actions ────────────────────────────────────────

#[tokio::test]
async fn delete_redirects_to_changelist() {
    let fx = fixture();
    fx.seed(users(), json!({"name": "Ada"})).await;

    let (status, location) = fx.post_form("/api/admin/blog/user/1/delete", "").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "/api/admin/blog/user");
    assert_eq!(fx.db.row_count("users").await, 0);
}

#[tokio::test]
async fn delete_action_removes_selected_rows() {
    let fx = fixture();
    for name in ["Ada", "Bob", "Carol"] {
        fx.seed(users(), json!({ "name": name })).await;
    }

    let (status, location) = fx
        .post_form(
            "/api/admin/blog/user/action",
            "action=delete&selected=1&selected=3",
        )
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "/api/admin/blog/user");
    assert_eq!(fx.db.row_count("users").await, 1);

    let (_, body) = fx.get("/api/admin/blog/user").await;
    assert!(body.contains("Bob"));
    assert!(!body.contains("Carol"));
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let fx = fixture();
    fx.seed(users(), json!({"name": "Ada"})).await;

    let (status, _) = fx
        .post_form("/api/admin/blog/user/action", "action=archive&selected=1")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fx.db.row_count("users").await, 1);
}

#[tokio::test]
async fn change_page_action_applies_to_its_record() {
    let fx = fixture();
    fx.seed(users(), json!({"name": "Ada"})).await;
    fx.seed(users(), json!({"name": "Bob"})).await;

    let (_, page) = fx.get("/api/admin/blog/user/2/change").await;
    assert!(page.contains("action=\"/api/admin/blog/user/2/action\""));

    let (status, _) = fx
        .post_form("/api/admin/blog/user/2/action", "action=archive")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, location) = fx
        .post_form("/api/admin/blog/user/2/action", "action=delete")
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(location, "/api/admin/blog/user");
    assert_eq!(fx.db.row_count("users").await, 1);

    let (missing, _) = fx
        .post_form("/api/admin/blog/user/2/action", "action=delete")
        .await;
    assert_eq!(missing, StatusCode::NOT_FOUND);
}

// ── Errors ────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_names_are_not_found() {
    let fx = fixture();
    let (section, body) = fx.get("/api/admin/shop/user").await;
    assert_eq!(section, StatusCode::NOT_FOUND);
    assert!(body.contains("404"));

    let (entity, _) = fx.get("/api/admin/blog/comment").await;
    assert_eq!(entity, StatusCode::NOT_FOUND);

    let (record, _) = fx.get("/api/admin/blog/user/42/change").await;
    assert_eq!(record, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
    let fx = fixture();
    let (key, _) = fx.get("/api/admin/blog/user/not-json/change").await;
    assert_eq!(key, StatusCode::BAD_REQUEST);

    let (field, body) = fx
        .post_form("/api/admin/blog/post/add", "title=Notes&author_id=abc")
        .await;
    assert_eq!(field, StatusCode::BAD_REQUEST);
    assert!(body.contains("author_id"));
    assert_eq!(fx.db.row_count("posts").await, 0);
}
