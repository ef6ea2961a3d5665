//! Admin URL construction and primary-key encoding.
//!
//! Every entity URL has the shape `{base}/{section}/{entity}[/{pk}]/{verb}`
//! where section and entity are slugs and `pk` is the percent-encoded JSON of
//! the entity's primary key value.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{AdminError, AdminResult};
use crate::metadata::{EntityMetadata, Record};

pub const DEFAULT_BASE_PATH: &str = "/api/admin";

static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());
static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// URL slug for a section or entity name: `BlogPost` → `blog-post`.
pub fn parse_name(name: &str) -> String {
    let split = CAMEL_BOUNDARY.replace_all(name, "$1-$2");
    let lower = split.to_lowercase();
    NON_ALNUM.replace_all(&lower, "-").trim_matches('-').to_string()
}

/// JSON-serialize then percent-encode a primary key for a path segment.
pub fn encode_primary_key(primary_key: &Value) -> String {
    urlencoding::encode(&primary_key.to_string()).into_owned()
}

/// Parse a primary key path segment back into its JSON value.
///
/// The router already percent-decodes path parameters; a segment that was
/// encoded twice is decoded once more before giving up.
pub fn decode_primary_key(segment: &str) -> AdminResult<Value> {
    if let Ok(value) = serde_json::from_str(segment) {
        return Ok(value);
    }
    let decoded = urlencoding::decode(segment)
        .map_err(|_| AdminError::InvalidPrimaryKey(segment.to_string()))?;
    serde_json::from_str(&decoded).map_err(|_| AdminError::InvalidPrimaryKey(segment.to_string()))
}

/// Builds the URLs of one admin site mounted at `base`.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base: String,
}

impl Default for UrlBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH)
    }
}

impl UrlBuilder {
    pub fn new(base: &str) -> Self {
        let trimmed = base.trim_end_matches('/');
        let base = if trimmed.starts_with('/') || trimmed.is_empty() {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn index_url(&self) -> String {
        if self.base.is_empty() {
            "/".to_string()
        } else {
            self.base.clone()
        }
    }

    pub fn changelist_url(&self, section: &str, metadata: &EntityMetadata) -> String {
        format!(
            "{}/{}/{}",
            self.base,
            parse_name(section),
            parse_name(&metadata.name)
        )
    }

    pub fn list_action_url(&self, section: &str, metadata: &EntityMetadata) -> String {
        format!("{}/action", self.changelist_url(section, metadata))
    }

    pub fn add_url(&self, section: &str, metadata: &EntityMetadata) -> String {
        format!("{}/add", self.changelist_url(section, metadata))
    }

    /// `None` when the record lacks part of its primary key.
    pub fn change_url(
        &self,
        section: &str,
        metadata: &EntityMetadata,
        record: &Record,
    ) -> Option<String> {
        self.entity_url(section, metadata, record, "change")
    }

    pub fn delete_url(
        &self,
        section: &str,
        metadata: &EntityMetadata,
        record: &Record,
    ) -> Option<String> {
        self.entity_url(section, metadata, record, "delete")
    }

    /// Target of the action form on a change page.
    pub fn change_action_url(
        &self,
        section: &str,
        metadata: &EntityMetadata,
        record: &Record,
    ) -> Option<String> {
        self.entity_url(section, metadata, record, "action")
    }

    fn entity_url(
        &self,
        section: &str,
        metadata: &EntityMetadata,
        record: &Record,
        verb: &str,
    ) -> Option<String> {
        let primary_key = metadata.get_primary_key_value(record)?;
        Some(format!(
            "{}/{}/{}",
            self.changelist_url(section, metadata),
            encode_primary_key(&primary_key),
            verb
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColumnMetadata, ColumnType};
    use serde_json::json;

    fn membership() -> EntityMetadata {
        EntityMetadata::new("TeamMembership", "team_memberships")
            .with_column(ColumnMetadata::new("user_id", ColumnType::BigInt).primary())
            .with_column(ColumnMetadata::new("team", ColumnType::Text).primary())
    }

    #[test]
    fn parse_name_builds_slugs() {
        assert_eq!(parse_name("BlogPost"), "blog-post");
        assert_eq!(parse_name("user_profiles"), "user-profiles");
        assert_eq!(parse_name("  Site Settings "), "site-settings");
        assert_eq!(parse_name("HTTPLog2"), "httplog2");
        assert_eq!(parse_name("blog"), "blog");
    }

    #[test]
    fn primary_keys_are_json_then_percent_encoded() {
        assert_eq!(encode_primary_key(&json!(42)), "42");
        assert_eq!(encode_primary_key(&json!("a/b")), "%22a%2Fb%22");
        let composite = json!({"team": "x y", "user_id": 1});
        let encoded = encode_primary_key(&composite);
        assert!(encoded.starts_with("%7B%22"));
        assert!(!encoded.contains(' '));
        assert_eq!(decode_primary_key(&encoded).unwrap(), composite);
    }

    #[test]
    fn decode_accepts_router_decoded_and_raw_segments() {
        assert_eq!(decode_primary_key("42").unwrap(), json!(42));
        assert_eq!(decode_primary_key("\"a/b\"").unwrap(), json!("a/b"));
        assert_eq!(decode_primary_key("%22a%2Fb%22").unwrap(), json!("a/b"));
        assert!(decode_primary_key("not-json").is_err());
    }

    #[test]
    fn entity_urls_embed_the_encoded_key() {
        let urls = UrlBuilder::default();
        let meta = membership();
        let row = match json!({"user_id": 3, "team": "core"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        assert_eq!(
            urls.changelist_url("Accounts", &meta),
            "/api/admin/accounts/team-membership"
        );
        assert_eq!(
            urls.add_url("Accounts", &meta),
            "/api/admin/accounts/team-membership/add"
        );
        let change = urls.change_url("Accounts", &meta, &row).unwrap();
        let segment = change
            .strip_prefix("/api/admin/accounts/team-membership/")
            .and_then(|rest| rest.strip_suffix("/change"))
            .unwrap();
        assert_eq!(
            decode_primary_key(segment).unwrap(),
            json!({"user_id": 3, "team": "core"})
        );
        assert!(urls
            .delete_url("Accounts", &meta, &row)
            .unwrap()
            .ends_with("/delete"));
        let action = urls.change_action_url("Accounts", &meta, &row).unwrap();
        assert_eq!(action, change.replace("/change", "/action"));
        assert!(urls.change_url("Accounts", &meta, &Record::new()).is_none());
    }

    #[test]
    fn base_path_is_normalised() {
        assert_eq!(UrlBuilder::new("admin/").index_url(), "/admin");
        assert_eq!(UrlBuilder::new("/").index_url(), "/");
        assert_eq!(UrlBuilder::new("/").base(), "");
    }
}
