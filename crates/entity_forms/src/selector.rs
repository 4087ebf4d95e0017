//! Lazily loaded options for reference (foreign key) fields.

use std::sync::Arc;

use async_trait::async_trait;
use client_core::{AdminApi, ClientError};
use shared::protocol::{OrganizationQuery, OrganizationRecord};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    controller::EntityFormController,
    form::{EntityForm, FieldValue, FormError},
};

#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    type Item: Send;

    async fn fetch(&self) -> Result<Vec<Self::Item>, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorState {
    Idle,
    Loading,
    Loaded(Vec<SelectOption>),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("failed to load options for {field}: {source}")]
    Fetch {
        field: &'static str,
        #[source]
        source: ClientError,
    },
    #[error("'{value}' is not an available option for {field}")]
    UnknownOption { field: &'static str, value: String },
    #[error(transparent)]
    Form(#[from] FormError),
}

pub struct AsyncReferenceSelector<T> {
    field: &'static str,
    label: &'static str,
    placeholder: &'static str,
    fetcher: Arc<dyn ReferenceFetcher<Item = T>>,
    render: fn(&T) -> SelectOption,
    state: Mutex<SelectorState>,
    load_lock: Mutex<()>,
}

impl<T: Send + 'static> AsyncReferenceSelector<T> {
    pub fn new(
        field: &'static str,
        label: &'static str,
        placeholder: &'static str,
        fetcher: Arc<dyn ReferenceFetcher<Item = T>>,
        render: fn(&T) -> SelectOption,
    ) -> Self {
        Self {
            field,
            label,
            placeholder,
            fetcher,
            render,
            state: Mutex::new(SelectorState::Idle),
            load_lock: Mutex::new(()),
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub async fn state(&self) -> SelectorState {
        self.state.lock().await.clone()
    }

    /// Returns the options, fetching them on first use.
    pub async fn options(&self) -> Result<Vec<SelectOption>, SelectorError> {
        let _loading = self.load_lock.lock().await;
        if let SelectorState::Loaded(options) = &*self.state.lock().await {
            return Ok(options.clone());
        }
        self.load().await
    }

    /// Discards loaded options and fetches again.
    pub async fn reload(&self) -> Result<Vec<SelectOption>, SelectorError> {
        let _loading = self.load_lock.lock().await;
        self.load().await
    }

    async fn load(&self) -> Result<Vec<SelectOption>, SelectorError> {
        *self.state.lock().await = SelectorState::Loading;
        match self.fetcher.fetch().await {
            Ok(records) => {
                let options: Vec<SelectOption> = records.iter().map(self.render).collect();
                debug!(field = self.field, options = options.len(), "reference options loaded");
                *self.state.lock().await = SelectorState::Loaded(options.clone());
                Ok(options)
            }
            Err(source) => {
                warn!(field = self.field, error = %source, "reference options failed to load");
                *self.state.lock().await = SelectorState::Failed(source.to_string());
                Err(SelectorError::Fetch {
                    field: self.field,
                    source,
                })
            }
        }
    }

    /// Writes the chosen identifier into the form; an empty value clears it.
    pub async fn select<F: EntityForm>(
        &self,
        controller: &EntityFormController<F>,
        value: &str,
    ) -> Result<(), SelectorError> {
        let value = value.trim();
        if value.is_empty() {
            controller
                .set_value(self.field, FieldValue::Reference(None))
                .await?;
            return Ok(());
        }

        let options = self.options().await?;
        if !options.iter().any(|option| option.value == value) {
            return Err(SelectorError::UnknownOption {
                field: self.field,
                value: value.to_string(),
            });
        }
        controller
            .set_value(self.field, FieldValue::Reference(Some(value.to_string())))
            .await?;
        Ok(())
    }
}

pub struct OrganizationFetcher {
    api: Arc<dyn AdminApi>,
    query: OrganizationQuery,
}

impl OrganizationFetcher {
    pub fn new(api: Arc<dyn AdminApi>) -> Self {
        Self {
            api,
            query: OrganizationQuery::default(),
        }
    }

    pub fn with_query(mut self, query: OrganizationQuery) -> Self {
        self.query = query;
        self
    }
}

#[async_trait]
impl ReferenceFetcher for OrganizationFetcher {
    type Item = OrganizationRecord;

    async fn fetch(&self) -> Result<Vec<OrganizationRecord>, ClientError> {
        Ok(self.api.get_organizations(&self.query).await?.data)
    }
}

fn organization_option(record: &OrganizationRecord) -> SelectOption {
    SelectOption {
        value: record.id.to_string(),
        label: record.name.clone(),
    }
}

/// Selector for a book's `organization_id`.
pub fn organization_selector(api: Arc<dyn AdminApi>) -> AsyncReferenceSelector<OrganizationRecord> {
    AsyncReferenceSelector::new(
        "organization_id",
        "Select Organization",
        "Select Organization",
        Arc::new(OrganizationFetcher::new(api)),
        organization_option,
    )
}

#[cfg(test)]
#[path = "tests/selector_tests.rs"]
mod tests;
