//! Admin site registry — sections of entities, looked up by URL slug.

use std::sync::Arc;

use serde::Serialize;

use crate::clean::{self, CleanMode};
use crate::error::{AdminError, AdminResult};
use crate::metadata::{EntityMetadata, Record};
use crate::repository::{Repository, DEFAULT_RESULTS_PER_PAGE};
use crate::urls::parse_name;

/// Operations applied to the rows selected on a change list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListAction {
    Delete,
}

impl ListAction {
    pub fn from_name(name: &str) -> AdminResult<Self> {
        match name {
            "delete" => Ok(Self::Delete),
            other => Err(AdminError::UnknownAction(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Delete => "delete",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Delete => "Delete selected",
        }
    }
}

/// Form inputs that replace the one derived from a column's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Widget {
    /// Masked input. The stored value is never rendered and a blank
    /// submission on the change form keeps it.
    Password,
}

/// One registered entity and its change-list options.
#[derive(Clone)]
pub struct AdminEntity {
    pub repository: Arc<dyn Repository>,
    pub list_display: Vec<String>,
    pub search_fields: Vec<String>,
    pub results_per_page: u64,
    pub list_actions: Vec<ListAction>,
    pub widgets: Vec<(String, Widget)>,
}

impl AdminEntity {
    pub fn new(repository: impl Repository + 'static) -> Self {
        Self::from_arc(Arc::new(repository))
    }

    pub fn from_arc(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            list_display: Vec::new(),
            search_fields: Vec::new(),
            results_per_page: DEFAULT_RESULTS_PER_PAGE,
            list_actions: vec![ListAction::Delete],
            widgets: Vec::new(),
        }
    }

    pub fn metadata(&self) -> &EntityMetadata {
        self.repository.metadata()
    }

    pub fn with_list_display(mut self, columns: &[&str]) -> Self {
        self.list_display = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_search_fields(mut self, columns: &[&str]) -> Self {
        self.search_fields = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_results_per_page(mut self, results_per_page: u64) -> Self {
        self.results_per_page = results_per_page.max(1);
        self
    }

    pub fn with_list_actions(mut self, actions: &[ListAction]) -> Self {
        self.list_actions = actions.to_vec();
        self
    }

    pub fn with_widget(mut self, column: &str, widget: Widget) -> Self {
        self.widgets.retain(|(c, _)| c != column);
        self.widgets.push((column.to_string(), widget));
        self
    }

    pub fn widget(&self, column: &str) -> Option<Widget> {
        self.widgets
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, w)| *w)
    }

    /// Drop blank submissions of password columns so the stored values stay.
    pub fn without_blank_passwords(&self, form: &[(String, String)]) -> Vec<(String, String)> {
        form.iter()
            .filter(|(k, v)| !(v.is_empty() && self.widget(k) == Some(Widget::Password)))
            .cloned()
            .collect()
    }

    /// Columns shown on the change list: the configured ones that exist, or all.
    pub fn display_columns(&self) -> Vec<String> {
        let metadata = self.metadata();
        let configured: Vec<String> = self
            .list_display
            .iter()
            .filter(|c| metadata.column(c).is_some())
            .cloned()
            .collect();
        if configured.is_empty() {
            metadata.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            configured
        }
    }

    pub fn allows(&self, action: ListAction) -> bool {
        self.list_actions.contains(&action)
    }
}

#[derive(Clone)]
pub struct AdminSection {
    pub name: String,
    entities: Vec<AdminEntity>,
}

impl AdminSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    pub fn slug(&self) -> String {
        parse_name(&self.name)
    }

    /// Add an entity. It must have a primary key and a slug unique in this section.
    pub fn register(&mut self, entity: AdminEntity) -> AdminResult<()> {
        let metadata = entity.metadata();
        if !metadata.has_primary_key() {
            return Err(AdminError::Registration(format!(
                "{} has no primary key and cannot be administered",
                metadata.name
            )));
        }
        let slug = parse_name(&metadata.name);
        if self
            .entities
            .iter()
            .any(|e| parse_name(&e.metadata().name) == slug)
        {
            return Err(AdminError::Registration(format!(
                "{} is already registered in section {}",
                metadata.name, self.name
            )));
        }
        tracing::debug!("Registered {} in section {}", metadata.name, self.name);
        self.entities.push(entity);
        Ok(())
    }

    pub fn with_entity(mut self, entity: AdminEntity) -> AdminResult<Self> {
        self.register(entity)?;
        Ok(self)
    }

    pub fn entities(&self) -> &[AdminEntity] {
        &self.entities
    }

    /// Look up an entity by name or slug.
    pub fn get_entity(&self, name: &str) -> AdminResult<&AdminEntity> {
        let slug = parse_name(name);
        self.entities
            .iter()
            .find(|e| parse_name(&e.metadata().name) == slug)
            .ok_or_else(|| AdminError::EntityNotFound {
                section: self.name.clone(),
                entity: name.to_string(),
            })
    }
}

#[derive(Clone, Default)]
pub struct AdminSite {
    sections: Vec<AdminSection>,
}

impl AdminSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_section(&mut self, section: AdminSection) -> AdminResult<()> {
        let slug = section.slug();
        if self.sections.iter().any(|s| s.slug() == slug) {
            return Err(AdminError::Registration(format!(
                "section {} is already registered",
                section.name
            )));
        }
        tracing::info!(
            "Registered admin section {} ({} entities)",
            section.name,
            section.entities.len()
        );
        self.sections.push(section);
        Ok(())
    }

    pub fn with_section(mut self, section: AdminSection) -> AdminResult<Self> {
        self.register_section(section)?;
        Ok(self)
    }

    /// Sections in registration order.
    pub fn get_section_list(&self) -> &[AdminSection] {
        &self.sections
    }

    pub fn get_section(&self, name: &str) -> AdminResult<&AdminSection> {
        let slug = parse_name(name);
        self.sections
            .iter()
            .find(|s| s.slug() == slug)
            .ok_or_else(|| AdminError::SectionNotFound(name.to_string()))
    }

    /// The section and entity administering `table`, if any.
    pub fn find_by_table(&self, table: &str) -> Option<(&AdminSection, &AdminEntity)> {
        self.sections.iter().find_map(|section| {
            section
                .entities
                .iter()
                .find(|e| e.metadata().table_name == table)
                .map(|e| (section, e))
        })
    }

    /// Prepare submitted form values for persistence.
    pub fn clean_values(
        &self,
        form: &[(String, String)],
        metadata: &EntityMetadata,
        mode: CleanMode,
    ) -> AdminResult<Record> {
        clean::clean_values(form, metadata, mode)
    }
}
