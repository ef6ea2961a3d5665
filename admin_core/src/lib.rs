//! Centrix Admin — generated CRUD administration for relational tables.
//!
//! Entities are described by [`metadata::EntityMetadata`], persisted through a
//! [`repository::Repository`], grouped into sections on an [`site::AdminSite`]
//! and served by the axum router in [`routes`].

pub mod clean;
pub mod environment;
pub mod error;
pub mod introspect;
pub mod metadata;
pub mod metrics;
pub mod repository;
pub mod routes;
pub mod site;
pub mod urls;

pub use environment::AdminEnvironment;
pub use error::{AdminError, AdminResult};
pub use metadata::{ColumnMetadata, ColumnType, EntityMetadata, Record, RelationMetadata};
pub use repository::{MemoryDatabase, PgPool, PgRepository, Repository};
pub use routes::{admin_router, mount, AdminState};
pub use site::{AdminEntity, AdminSection, AdminSite, ListAction, Widget};
pub use urls::UrlBuilder;
