//! Generic CRUD operations behind the admin routes.

use axum::response::{Html, IntoResponse, Redirect, Response};

use crate::clean::CleanMode;
use crate::error::{AdminError, AdminResult};
use crate::metadata::Record;
use crate::repository::{parse_page, FindOptions};
use crate::routes::views;
use crate::routes::AdminState;
use crate::site::{AdminEntity, AdminSection, ListAction};
use crate::urls::decode_primary_key;

/// Section, entity and (optionally) record resolved from the URL params.
pub struct AdminModels<'a> {
    pub section: &'a AdminSection,
    pub entity: &'a AdminEntity,
    pub record: Option<Record>,
}

/// Load the record identified by `id_map` with every relation expanded.
pub async fn get_entity_with_relations(
    entity: &AdminEntity,
    id_map: &Record,
) -> AdminResult<Record> {
    let metadata = entity.metadata();
    entity
        .repository
        .find_one(id_map, &metadata.relation_names())
        .await?
        .ok_or_else(|| AdminError::RecordNotFound {
            entity: metadata.name.clone(),
            key: serde_json::Value::Object(id_map.clone()).to_string(),
        })
}

pub async fn get_admin_models<'a>(
    state: &'a AdminState,
    section_name: &str,
    entity_name: &str,
    primary_key: Option<&str>,
) -> AdminResult<AdminModels<'a>> {
    let section = state.site.get_section(section_name)?;
    let entity = section.get_entity(entity_name)?;
    let record = match primary_key {
        Some(segment) => {
            let key = decode_primary_key(segment)?;
            let id_map = entity.metadata().id_map_from_key(&key)?;
            Some(get_entity_with_relations(entity, &id_map).await?)
        }
        None => None,
    };
    Ok(AdminModels {
        section,
        entity,
        record,
    })
}

fn last_value<'f>(form: &'f [(String, String)], key: &str) -> Option<&'f str> {
    form.iter()
        .rev()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub async fn index(state: &AdminState) -> AdminResult<Response> {
    let view = views::index(&state.site, &state.urls);
    let html = state.env.render("index.html", &view)?;
    crate::metrics::request("index");
    Ok(Html(html).into_response())
}

pub async fn changelist(
    state: &AdminState,
    section_name: &str,
    entity_name: &str,
    page: Option<&str>,
    search: Option<&str>,
) -> AdminResult<Response> {
    let AdminModels { section, entity, .. } =
        get_admin_models(state, section_name, entity_name, None).await?;

    let page = parse_page(page);
    let search = search.unwrap_or_default().trim();
    let options =
        FindOptions::page(page, entity.results_per_page).with_search(search, &entity.search_fields);
    let (records, count) = entity.repository.find_and_count(&options).await?;

    let view = views::changelist(&state.urls, section, entity, &records, count, page, search);
    let html = state.env.render("changelist.html", &view)?;
    crate::metrics::request("changelist");
    Ok(Html(html).into_response())
}

pub async fn add(state: &AdminState, section_name: &str, entity_name: &str) -> AdminResult<Response> {
    let AdminModels { section, entity, .. } =
        get_admin_models(state, section_name, entity_name, None).await?;
    let view = views::add_form(&state.urls, section, entity);
    let html = state.env.render("add.html", &view)?;
    crate::metrics::request("add");
    Ok(Html(html).into_response())
}

pub async fn create(
    state: &AdminState,
    section_name: &str,
    entity_name: &str,
    form: &[(String, String)],
) -> AdminResult<Response> {
    let AdminModels { section, entity, .. } =
        get_admin_models(state, section_name, entity_name, None).await?;
    let metadata = entity.metadata();

    let values = state.site.clean_values(form, metadata, CleanMode::Create)?;
    let created = entity.repository.save(&values).await?;

    tracing::info!("Created {} in section {}", metadata.name, section.name);
    crate::metrics::entity_created(&metadata.name);

    let target = state
        .urls
        .change_url(&section.name, metadata, &created)
        .unwrap_or_else(|| state.urls.changelist_url(&section.name, metadata));
    Ok(Redirect::to(&target).into_response())
}

pub async fn change(
    state: &AdminState,
    section_name: &str,
    entity_name: &str,
    primary_key: &str,
) -> AdminResult<Response> {
    let AdminModels {
        section,
        entity,
        record,
    } = get_admin_models(state, section_name, entity_name, Some(primary_key)).await?;
    let record = record.ok_or_else(|| AdminError::InvalidPrimaryKey(primary_key.to_string()))?;
    let view = views::change_form(&state.site, &state.urls, section, entity, &record, false);
    let html = state.env.render("change.html", &view)?;
    crate::metrics::request("change");
    Ok(Html(html).into_response())
}

pub async fn update(
    state: &AdminState,
    section_name: &str,
    entity_name: &str,
    primary_key: &str,
    form: &[(String, String)],
) -> AdminResult<Response> {
    let AdminModels {
        section,
        entity,
        record,
    } = get_admin_models(state, section_name, entity_name, Some(primary_key)).await?;
    let stored = record.ok_or_else(|| AdminError::InvalidPrimaryKey(primary_key.to_string()))?;
    let metadata = entity.metadata();

    let form = entity.without_blank_passwords(form);
    let updated_values = state.site.clean_values(&form, metadata, CleanMode::Update)?;

    // Loaded relations are not columns; persist only the stored columns plus the edits.
    let mut merged: Record = stored
        .iter()
        .filter(|(k, _)| metadata.column(k).is_some())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    merged.extend(updated_values);

    let old_id = metadata
        .get_entity_id_map(&stored)
        .ok_or_else(|| AdminError::InvalidPrimaryKey(primary_key.to_string()))?;
    let new_id = metadata.get_entity_id_map(&merged).ok_or_else(|| {
        AdminError::invalid_field(
            metadata
                .primary_columns()
                .next()
                .map_or("primary key", |c| c.name.as_str()),
            "required",
        )
    })?;

    // The key moves first so that `save` updates the row instead of inserting a new one.
    if old_id != new_id {
        entity.repository.update(&old_id, &new_id).await?;
        tracing::info!(
            "Changed primary key of {} {} to {:?}",
            metadata.name,
            primary_key,
            new_id
        );
    }
    entity.repository.save(&merged).await?;

    let updated = get_entity_with_relations(entity, &new_id).await?;
    tracing::info!("Updated {} in section {}", metadata.name, section.name);
    crate::metrics::entity_updated(&metadata.name);

    let view = views::change_form(&state.site, &state.urls, section, entity, &updated, true);
    let html = state.env.render("change.html", &view)?;
    Ok(Html(html).into_response())
}

pub async fn delete(
    state: &AdminState,
    section_name: &str,
    entity_name: &str,
    primary_key: &str,
) -> AdminResult<Response> {
    let AdminModels {
        section,
        entity,
        record,
    } = get_admin_models(state, section_name, entity_name, Some(primary_key)).await?;
    let record = record.ok_or_else(|| AdminError::InvalidPrimaryKey(primary_key.to_string()))?;
    let metadata = entity.metadata();

    let id_map = metadata
        .get_entity_id_map(&record)
        .ok_or_else(|| AdminError::InvalidPrimaryKey(primary_key.to_string()))?;
    let removed = entity.repository.remove(&id_map).await?;

    tracing::info!("Deleted {} {} from section {}", metadata.name, primary_key, section.name);
    crate::metrics::entities_deleted(&metadata.name, removed);

    Ok(Redirect::to(&state.urls.changelist_url(&section.name, metadata)).into_response())
}

/// The submitted `action`, if the entity offers it.
fn requested_action(entity: &AdminEntity, form: &[(String, String)]) -> AdminResult<ListAction> {
    let action_name = last_value(form, "action").unwrap_or_default();
    let action = ListAction::from_name(action_name)?;
    if !entity.allows(action) {
        return Err(AdminError::UnknownAction(action_name.to_string()));
    }
    Ok(action)
}

async fn apply_action(
    entity: &AdminEntity,
    action: ListAction,
    id_maps: &[Record],
) -> AdminResult<()> {
    let metadata = entity.metadata();
    match action {
        ListAction::Delete => {
            let mut removed = 0;
            for id_map in id_maps {
                removed += entity.repository.remove(id_map).await?;
            }
            tracing::info!(
                "Action delete removed {} of {} selected {} rows",
                removed,
                id_maps.len(),
                metadata.name
            );
            crate::metrics::entities_deleted(&metadata.name, removed);
        }
    }
    Ok(())
}

pub async fn list_action(
    state: &AdminState,
    section_name: &str,
    entity_name: &str,
    form: &[(String, String)],
) -> AdminResult<Response> {
    let AdminModels { section, entity, .. } =
        get_admin_models(state, section_name, entity_name, None).await?;
    let metadata = entity.metadata();
    let action = requested_action(entity, form)?;

    let mut id_maps = Vec::new();
    for (_, selected) in form.iter().filter(|(k, _)| k == "selected") {
        let key = decode_primary_key(selected)?;
        id_maps.push(metadata.id_map_from_key(&key)?);
    }
    apply_action(entity, action, &id_maps).await?;

    Ok(Redirect::to(&state.urls.changelist_url(&section.name, metadata)).into_response())
}

/// Apply an action from the change page to the record it shows.
pub async fn change_action(
    state: &AdminState,
    section_name: &str,
    entity_name: &str,
    primary_key: &str,
    form: &[(String, String)],
) -> AdminResult<Response> {
    let AdminModels {
        section,
        entity,
        record,
    } = get_admin_models(state, section_name, entity_name, Some(primary_key)).await?;
    let record = record.ok_or_else(|| AdminError::InvalidPrimaryKey(primary_key.to_string()))?;
    let metadata = entity.metadata();
    let action = requested_action(entity, form)?;

    let id_map = metadata
        .get_entity_id_map(&record)
        .ok_or_else(|| AdminError::InvalidPrimaryKey(primary_key.to_string()))?;
    apply_action(entity, action, std::slice::from_ref(&id_map)).await?;

    Ok(Redirect::to(&state.urls.changelist_url(&section.name, metadata)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_value_wins() {
        let form = vec![
            ("action".to_string(), "archive".to_string()),
            ("action".to_string(), "delete".to_string()),
        ];
        assert_eq!(last_value(&form, "action"), Some("delete"));
        assert_eq!(last_value(&form, "selected"), None);
    }
}
