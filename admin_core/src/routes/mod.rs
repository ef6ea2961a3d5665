//! Admin HTTP routes — change list, add, change, delete and list actions.

pub mod admin;
pub mod views;

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::environment::AdminEnvironment;
use crate::error::{AdminError, AdminResult};
use crate::site::AdminSite;
use crate::urls::UrlBuilder;

/// Shared state for admin route handlers.
#[derive(Clone)]
pub struct AdminState {
    pub site: Arc<AdminSite>,
    pub env: Arc<AdminEnvironment>,
    pub urls: UrlBuilder,
}

impl AdminState {
    pub fn new(site: AdminSite, env: AdminEnvironment, urls: UrlBuilder) -> Self {
        Self {
            site: Arc::new(site),
            env: Arc::new(env),
            urls,
        }
    }

    /// Render `err` with the error template and its mapped status.
    pub fn error_response(&self, err: AdminError) -> Response {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!("Admin request failed: {err}");
        } else {
            tracing::warn!("Admin request rejected: {err}");
        }
        crate::metrics::error_recorded(err.kind());

        let view = views::ErrorView {
            index_url: self.urls.index_url(),
            status: status.as_u16(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            message: err.public_message(),
        };
        match self.env.render("error.html", &view) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(render_err) => {
                tracing::error!("Error template failed to render: {render_err}");
                (status, view.message).into_response()
            }
        }
    }

    fn respond(&self, result: AdminResult<Response>) -> Response {
        result.unwrap_or_else(|err| self.error_response(err))
    }
}

/// Build the admin router with paths relative to the admin base path.
pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/{section}/{entity}", get(changelist_handler))
        .route("/{section}/{entity}/add", get(add_handler).post(create_handler))
        .route("/{section}/{entity}/action", post(list_action_handler))
        .route(
            "/{section}/{entity}/{primary_key}/change",
            get(change_handler).post(update_handler),
        )
        .route("/{section}/{entity}/{primary_key}/delete", post(delete_handler))
        .route("/{section}/{entity}/{primary_key}/action", post(change_action_handler))
        .with_state(state)
}

/// The admin router nested under the state's base path.
pub fn mount(state: AdminState) -> Router {
    let base = state.urls.base().to_string();
    let router = admin_router(state);
    if base.is_empty() {
        router
    } else {
        Router::new().nest(&base, router)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeListQuery {
    pub page: Option<String>,
    pub search: Option<String>,
}

async fn index_handler(State(state): State<AdminState>) -> Response {
    state.respond(admin::index(&state).await)
}

async fn changelist_handler(
    State(state): State<AdminState>,
    Path((section, entity)): Path<(String, String)>,
    Query(query): Query<ChangeListQuery>,
) -> Response {
    let result = admin::changelist(
        &state,
        &section,
        &entity,
        query.page.as_deref(),
        query.search.as_deref(),
    )
    .await;
    state.respond(result)
}

async fn add_handler(
    State(state): State<AdminState>,
    Path((section, entity)): Path<(String, String)>,
) -> Response {
    state.respond(admin::add(&state, &section, &entity).await)
}

async fn create_handler(
    State(state): State<AdminState>,
    Path((section, entity)): Path<(String, String)>,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    state.respond(admin::create(&state, &section, &entity, &form).await)
}

async fn list_action_handler(
    State(state): State<AdminState>,
    Path((section, entity)): Path<(String, String)>,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    state.respond(admin::list_action(&state, &section, &entity, &form).await)
}

async fn change_handler(
    State(state): State<AdminState>,
    Path((section, entity, primary_key)): Path<(String, String, String)>,
) -> Response {
    state.respond(admin::change(&state, &section, &entity, &primary_key).await)
}

async fn update_handler(
    State(state): State<AdminState>,
    Path((section, entity, primary_key)): Path<(String, String, String)>,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    state.respond(admin::update(&state, &section, &entity, &primary_key, &form).await)
}

async fn delete_handler(
    State(state): State<AdminState>,
    Path((section, entity, primary_key)): Path<(String, String, String)>,
) -> Response {
    state.respond(admin::delete(&state, &section, &entity, &primary_key).await)
}

async fn change_action_handler(
    State(state): State<AdminState>,
    Path((section, entity, primary_key)): Path<(String, String, String)>,
    Form(form): Form<Vec<(String, String)>>,
) -> Response {
    state.respond(admin::change_action(&state, &section, &entity, &primary_key, &form).await)
}
