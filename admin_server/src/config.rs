//! Admin server configuration — loaded from environment variables.

use std::path::PathBuf;

use admin_core::repository::DEFAULT_RESULTS_PER_PAGE;
use admin_core::urls::DEFAULT_BASE_PATH;

/// Tables administered under one section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionConfig {
    pub name: String,
    pub tables: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct AdminConfig {
    /// Path the admin router is mounted at.
    pub base_path: String,
    /// Sections and their tables, from `ADMIN_SECTIONS`.
    pub sections: Vec<SectionConfig>,
    /// Directory of template overrides.
    pub template_dir: Option<PathBuf>,
    pub results_per_page: u64,
    /// Maximum pooled database connections.
    pub max_connections: usize,
}

impl AdminConfig {
    pub fn from_env() -> Self {
        let base_path =
            std::env::var("ADMIN_BASE_PATH").unwrap_or_else(|_| DEFAULT_BASE_PATH.to_string());
        let sections = std::env::var("ADMIN_SECTIONS")
            .map(|s| parse_sections(&s))
            .unwrap_or_default();
        let template_dir = std::env::var("ADMIN_TEMPLATE_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let results_per_page = std::env::var("ADMIN_RESULTS_PER_PAGE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_RESULTS_PER_PAGE);
        let max_connections = std::env::var("ADMIN_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(5);

        Self {
            base_path,
            sections,
            template_dir,
            results_per_page,
            max_connections,
        }
    }
}

/// Parse `Blog:users,posts;Shop:orders` into sections. Entries without a
/// name or without tables are skipped with a warning.
pub fn parse_sections(raw: &str) -> Vec<SectionConfig> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let Some((name, tables)) = entry.split_once(':') else {
                tracing::warn!("ADMIN_SECTIONS entry {entry:?} has no ':' -- skipped");
                return None;
            };
            let name = name.trim();
            let tables: Vec<String> = tables
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if name.is_empty() || tables.is_empty() {
                tracing::warn!("ADMIN_SECTIONS entry {entry:?} is incomplete -- skipped");
                return None;
            }
            Some(SectionConfig {
                name: name.to_string(),
                tables,
            })
        })
        .collect()
}
