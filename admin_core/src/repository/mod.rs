//! Repositories — the persistence seam between the admin and a data store.
//!
//! Records cross this boundary as JSON objects; the repository is responsible
//! for typing them against its own store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::AdminResult;
use crate::metadata::{EntityMetadata, Record};

pub use memory::{MemoryDatabase, MemoryRepository};
pub use postgres::{PgPool, PgRepository};

pub const DEFAULT_RESULTS_PER_PAGE: u64 = 25;

/// Case-insensitive substring filter over a set of columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub term: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: u64,
    pub take: u64,
    pub search: Option<SearchOptions>,
}

impl FindOptions {
    /// Options for the 1-based `page` of `per_page` results.
    pub fn page(page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        Self {
            skip: per_page * (page - 1),
            take: per_page,
            search: None,
        }
    }

    /// Adds a search filter; blank terms and empty column lists are ignored.
    pub fn with_search(mut self, term: &str, columns: &[String]) -> Self {
        let term = term.trim();
        if !term.is_empty() && !columns.is_empty() {
            self.search = Some(SearchOptions {
                term: term.to_string(),
                columns: columns.to_vec(),
            });
        }
        self
    }
}

/// Parse a `?page=` query value; anything unusable is page 1.
pub fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1)
}

#[async_trait]
pub trait Repository: Send + Sync {
    fn metadata(&self) -> &EntityMetadata;

    /// One page of records ordered by primary key, plus the total count of
    /// records matching the search filter.
    async fn find_and_count(&self, options: &FindOptions) -> AdminResult<(Vec<Record>, u64)>;

    /// The record identified by `id_map`, with the named relations loaded
    /// under their property names.
    async fn find_one(&self, id_map: &Record, relations: &[String]) -> AdminResult<Option<Record>>;

    /// Insert `record`, or update the stored row with the same primary key.
    async fn save(&self, record: &Record) -> AdminResult<Record>;

    /// Overwrite `values` on every row matching `criteria`.
    async fn update(&self, criteria: &Record, values: &Record) -> AdminResult<u64>;

    async fn remove(&self, id_map: &Record) -> AdminResult<u64>;
}
