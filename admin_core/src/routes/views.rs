//! View models handed to the templates.
//!
//! Everything a template shows is computed here (URLs, display strings,
//! pagination) so templates stay free of lookup logic.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::metadata::{ColumnMetadata, ColumnType, EntityMetadata, Record};
use crate::site::{AdminEntity, AdminSection, AdminSite, Widget};
use crate::urls::UrlBuilder;

#[derive(Debug, Serialize)]
pub struct EntityLink {
    pub name: String,
    pub changelist_url: String,
    pub add_url: String,
}

#[derive(Debug, Serialize)]
pub struct SectionView {
    pub name: String,
    pub entities: Vec<EntityLink>,
}

#[derive(Debug, Serialize)]
pub struct IndexView {
    pub index_url: String,
    pub sections: Vec<SectionView>,
}

#[derive(Debug, Serialize)]
pub struct RowView {
    /// JSON primary key, submitted back by the list action checkboxes.
    pub key: String,
    pub change_url: Option<String>,
    pub cells: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionView {
    pub name: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChangeListView {
    pub index_url: String,
    pub section: String,
    pub entity_name: String,
    pub changelist_url: String,
    pub add_url: String,
    pub action_url: String,
    pub actions: Vec<ActionView>,
    pub columns: Vec<String>,
    pub rows: Vec<RowView>,
    pub count: u64,
    pub page: u64,
    pub total_pages: u64,
    pub results_per_page: u64,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
    pub searchable: bool,
    pub search: String,
}

#[derive(Debug, Serialize)]
pub struct FieldView {
    pub name: String,
    pub input_type: &'static str,
    pub value: String,
    pub checked: bool,
    pub required: bool,
    pub readonly: bool,
}

#[derive(Debug, Serialize)]
pub struct LinkView {
    pub label: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RelationView {
    pub name: String,
    pub kind: String,
    pub items: Vec<LinkView>,
}

#[derive(Debug, Serialize)]
pub struct FormView {
    pub index_url: String,
    pub section: String,
    pub entity_name: String,
    pub changelist_url: String,
    pub form_action: String,
    pub label: String,
    pub fields: Vec<FieldView>,
    pub relations: Vec<RelationView>,
    pub delete_url: Option<String>,
    pub action_url: Option<String>,
    pub actions: Vec<ActionView>,
    pub saved: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorView {
    pub index_url: String,
    pub status: u16,
    pub title: String,
    pub message: String,
}

/// Text shown for a stored value.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Human label of a record: its first non-empty text column, else its key.
pub fn record_label(metadata: &EntityMetadata, record: &Record) -> String {
    let text = metadata
        .columns
        .iter()
        .filter(|c| !c.is_primary && c.column_type == ColumnType::Text)
        .find_map(|c| match record.get(&c.name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        });
    text.or_else(|| {
        metadata
            .get_primary_key_value(record)
            .map(|pk| display_value(&pk))
    })
    .unwrap_or_else(|| metadata.name.clone())
}

fn input_type(column: &ColumnMetadata) -> &'static str {
    match column.column_type {
        ColumnType::Integer | ColumnType::BigInt | ColumnType::Float | ColumnType::Numeric => {
            "number"
        }
        ColumnType::Boolean => "checkbox",
        ColumnType::Date => "date",
        ColumnType::Timestamp | ColumnType::Timestamptz => "datetime-local",
        ColumnType::Json => "textarea",
        ColumnType::Text | ColumnType::Uuid | ColumnType::Other(_) => "text",
    }
}

/// Value as an HTML input expects it.
fn input_value(column: &ColumnMetadata, value: &Value) -> String {
    match (&column.column_type, value) {
        (_, Value::Null) => String::new(),
        (ColumnType::Timestamptz, Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%S").to_string())
            .unwrap_or_else(|_| s.clone()),
        (ColumnType::Timestamp, Value::String(s)) => s.chars().take(19).collect(),
        (ColumnType::Json, other) => {
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
        }
        (_, other) => display_value(other),
    }
}

/// Form fields for `record`; generated columns are hidden on the add form.
pub fn fields(metadata: &EntityMetadata, record: Option<&Record>) -> Vec<FieldView> {
    metadata
        .columns
        .iter()
        .filter(|c| record.is_some() || !c.is_generated)
        .map(|column| {
            let value = record
                .and_then(|r| r.get(&column.name))
                .unwrap_or(&Value::Null);
            FieldView {
                name: column.name.clone(),
                input_type: input_type(column),
                value: input_value(column, value),
                checked: value.as_bool().unwrap_or(false),
                required: !column.is_nullable
                    && !column.has_default
                    && column.column_type != ColumnType::Boolean,
                readonly: column.is_generated,
            }
        })
        .collect()
}

/// Apply the entity's widgets to `fields`. Password values are never rendered
/// and become optional once the record exists.
pub fn apply_widgets(entity: &AdminEntity, fields: &mut [FieldView], editing: bool) {
    for field in fields.iter_mut() {
        if entity.widget(&field.name) == Some(Widget::Password) {
            field.input_type = "password";
            field.value = String::new();
            field.required &= !editing;
        }
    }
}

fn actions(entity: &AdminEntity) -> Vec<ActionView> {
    entity
        .list_actions
        .iter()
        .map(|a| ActionView {
            name: a.name(),
            label: a.label(),
        })
        .collect()
}

/// Loaded relations of `record`, linked to their own change pages when the
/// target table is administered by `site`.
pub fn relations(
    site: &AdminSite,
    urls: &UrlBuilder,
    metadata: &EntityMetadata,
    record: &Record,
) -> Vec<RelationView> {
    metadata
        .relations
        .iter()
        .map(|relation| {
            let related: Vec<&Record> = match record.get(&relation.property_name) {
                Some(Value::Object(item)) => vec![item],
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| match v {
                        Value::Object(item) => Some(item),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            let target = site.find_by_table(&relation.target_table);
            let items = related
                .into_iter()
                .map(|item| match target {
                    Some((section, entity)) => LinkView {
                        label: record_label(entity.metadata(), item),
                        url: urls.change_url(&section.name, entity.metadata(), item),
                    },
                    None => LinkView {
                        label: display_value(&Value::Object(item.clone())),
                        url: None,
                    },
                })
                .collect();
            RelationView {
                name: relation.property_name.clone(),
                kind: format!("{:?}", relation.kind),
                items,
            }
        })
        .collect()
}

pub fn index(site: &AdminSite, urls: &UrlBuilder) -> IndexView {
    IndexView {
        index_url: urls.index_url(),
        sections: site
            .get_section_list()
            .iter()
            .map(|section| SectionView {
                name: section.name.clone(),
                entities: section
                    .entities()
                    .iter()
                    .map(|entity| EntityLink {
                        name: entity.metadata().name.clone(),
                        changelist_url: urls.changelist_url(&section.name, entity.metadata()),
                        add_url: urls.add_url(&section.name, entity.metadata()),
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn page_url(base: &str, page: u64, search: &str) -> String {
    if search.is_empty() {
        format!("{base}?page={page}")
    } else {
        format!("{base}?page={page}&search={}", urlencoding::encode(search))
    }
}

pub fn changelist(
    urls: &UrlBuilder,
    section: &AdminSection,
    entity: &AdminEntity,
    records: &[Record],
    count: u64,
    page: u64,
    search: &str,
) -> ChangeListView {
    let metadata = entity.metadata();
    let columns = entity.display_columns();
    let changelist_url = urls.changelist_url(&section.name, metadata);
    let per_page = entity.results_per_page.max(1);
    let total_pages = count.div_ceil(per_page).max(1);

    let rows = records
        .iter()
        .map(|record| RowView {
            key: metadata
                .get_primary_key_value(record)
                .map(|pk| pk.to_string())
                .unwrap_or_default(),
            change_url: urls.change_url(&section.name, metadata, record),
            cells: columns
                .iter()
                .map(|c| match entity.widget(c) {
                    Some(Widget::Password) => "********".to_string(),
                    None => record.get(c).map(display_value).unwrap_or_default(),
                })
                .collect(),
        })
        .collect();

    ChangeListView {
        index_url: urls.index_url(),
        section: section.name.clone(),
        entity_name: metadata.name.clone(),
        add_url: urls.add_url(&section.name, metadata),
        action_url: urls.list_action_url(&section.name, metadata),
        actions: actions(entity),
        columns,
        rows,
        count,
        page,
        total_pages,
        results_per_page: per_page,
        prev_url: (page > 1).then(|| page_url(&changelist_url, page - 1, search)),
        next_url: (page < total_pages).then(|| page_url(&changelist_url, page + 1, search)),
        searchable: !entity.search_fields.is_empty(),
        search: search.to_string(),
        changelist_url,
    }
}

pub fn add_form(urls: &UrlBuilder, section: &AdminSection, entity: &AdminEntity) -> FormView {
    let metadata = entity.metadata();
    let mut fields = fields(metadata, None);
    apply_widgets(entity, &mut fields, false);
    FormView {
        index_url: urls.index_url(),
        section: section.name.clone(),
        entity_name: metadata.name.clone(),
        changelist_url: urls.changelist_url(&section.name, metadata),
        form_action: urls.add_url(&section.name, metadata),
        label: String::new(),
        fields,
        relations: Vec::new(),
        delete_url: None,
        action_url: None,
        actions: Vec::new(),
        saved: false,
    }
}

pub fn change_form(
    site: &AdminSite,
    urls: &UrlBuilder,
    section: &AdminSection,
    entity: &AdminEntity,
    record: &Record,
    saved: bool,
) -> FormView {
    let metadata = entity.metadata();
    let changelist_url = urls.changelist_url(&section.name, metadata);
    let mut fields = fields(metadata, Some(record));
    apply_widgets(entity, &mut fields, true);
    FormView {
        index_url: urls.index_url(),
        section: section.name.clone(),
        entity_name: metadata.name.clone(),
        form_action: urls
            .change_url(&section.name, metadata, record)
            .unwrap_or_else(|| changelist_url.clone()),
        changelist_url,
        label: record_label(metadata, record),
        fields,
        relations: relations(site, urls, metadata, record),
        delete_url: urls.delete_url(&section.name, metadata, record),
        action_url: urls.change_action_url(&section.name, metadata, record),
        actions: actions(entity),
        saved,
    }
}
