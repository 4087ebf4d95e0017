//! Form state for each managed entity and the raw-input coercion rules.

use std::fmt;

use async_trait::async_trait;
use client_core::{AdminApi, ClientError};
use shared::{
    domain::{BookId, OrganizationId},
    protocol::{BookPayload, BookRecord, OrganizationPayload, OrganizationRecord},
};
use thiserror::Error;

use crate::{
    navigation::NavigationContext,
    schema::{book_schema, organization_schema, FieldKind, Schema},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i32),
    Reference(Option<String>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Reference(_) => FieldKind::Reference,
        }
    }

    /// Converts raw input for a field of `kind`.
    ///
    /// Integer input that does not parse resolves to `0`.
    pub fn from_raw(kind: FieldKind, raw: &str) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(raw.to_string()),
            FieldKind::Integer => FieldValue::Integer(coerce_integer(raw)),
            FieldKind::Reference => {
                let trimmed = raw.trim();
                FieldValue::Reference((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
        }
    }
}

/// Parses numeric input, falling back to `0` for anything that is not a
/// finite number in `i32` range. Fractions are truncated.
pub fn coerce_integer(raw: &str) -> i32 {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i32>() {
        return value;
    }
    match trimmed.parse::<f64>() {
        Ok(value)
            if value.is_finite() && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) =>
        {
            value.trunc() as i32
        }
        _ => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{entity} form has no field '{field}'")]
    UnknownField { entity: &'static str, field: String },
    #[error("field '{field}' expects a {expected:?} value")]
    TypeMismatch { field: String, expected: FieldKind },
    #[error("form has been unmounted")]
    Unmounted,
}

/// One entity's form state and how it is persisted.
#[async_trait]
pub trait EntityForm: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Id: Clone + fmt::Display + fmt::Debug + Send + Sync;
    type Payload: fmt::Debug + Send + Sync;
    type Record: fmt::Debug + Send + Sync;

    /// Entity name used for permissions and logs.
    const ENTITY: &'static str;
    /// Listing route navigated to after a successful save.
    const LIST_ROUTE: &'static str;
    /// Human-readable singular name, e.g. for page headings.
    const DISPLAY_NAME: &'static str;

    fn schema() -> Schema;
    fn defaults(context: &NavigationContext) -> Self;
    fn from_record(record: &Self::Record) -> Self;
    fn record_id(record: &Self::Record) -> Self::Id;
    fn value(&self, field: &str) -> Option<FieldValue>;
    fn set_value(&mut self, field: &str, value: FieldValue) -> Result<(), FormError>;
    fn to_payload(&self) -> Self::Payload;

    async fn create(
        api: &dyn AdminApi,
        payload: &Self::Payload,
    ) -> Result<Self::Record, ClientError>;
    async fn update(
        api: &dyn AdminApi,
        id: &Self::Id,
        payload: &Self::Payload,
    ) -> Result<Self::Record, ClientError>;
}

fn unknown_field<F: EntityForm>(field: &str) -> FormError {
    FormError::UnknownField {
        entity: F::ENTITY,
        field: field.to_string(),
    }
}

fn mismatch(field: &str, expected: FieldKind) -> FormError {
    FormError::TypeMismatch {
        field: field.to_string(),
        expected,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookForm {
    pub title: String,
    pub author: String,
    /// `None` only when an edited record had no year and it was not changed.
    pub publication_year: Option<i32>,
    pub organization_id: Option<OrganizationId>,
}

#[async_trait]
impl EntityForm for BookForm {
    type Id = BookId;
    type Payload = BookPayload;
    type Record = BookRecord;

    const ENTITY: &'static str = "book";
    const LIST_ROUTE: &'static str = "/books";
    const DISPLAY_NAME: &'static str = "Book";

    fn schema() -> Schema {
        book_schema()
    }

    fn defaults(context: &NavigationContext) -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            publication_year: Some(0),
            organization_id: context
                .query_param("organization_id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(OrganizationId::new),
        }
    }

    fn from_record(record: &BookRecord) -> Self {
        Self {
            title: record.title.clone(),
            author: record.author.clone(),
            publication_year: record.publication_year,
            organization_id: record.organization_id.clone(),
        }
    }

    fn record_id(record: &BookRecord) -> BookId {
        record.id.clone()
    }

    fn value(&self, field: &str) -> Option<FieldValue> {
        match field {
            "title" => Some(FieldValue::Text(self.title.clone())),
            "author" => Some(FieldValue::Text(self.author.clone())),
            "publication_year" => self.publication_year.map(FieldValue::Integer),
            "organization_id" => Some(FieldValue::Reference(
                self.organization_id.as_ref().map(|id| id.0.clone()),
            )),
            _ => None,
        }
    }

    fn set_value(&mut self, field: &str, value: FieldValue) -> Result<(), FormError> {
        match (field, value) {
            ("title", FieldValue::Text(text)) => self.title = text,
            ("author", FieldValue::Text(text)) => self.author = text,
            ("publication_year", FieldValue::Integer(year)) => self.publication_year = Some(year),
            ("organization_id", FieldValue::Reference(id)) => {
                self.organization_id = id.map(OrganizationId)
            }
            ("title" | "author", _) => return Err(mismatch(field, FieldKind::Text)),
            ("publication_year", _) => return Err(mismatch(field, FieldKind::Integer)),
            ("organization_id", _) => return Err(mismatch(field, FieldKind::Reference)),
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }

    fn to_payload(&self) -> BookPayload {
        BookPayload {
            title: self.title.clone(),
            author: self.author.clone(),
            publication_year: self.publication_year,
            organization_id: self.organization_id.clone(),
        }
    }

    async fn create(api: &dyn AdminApi, payload: &BookPayload) -> Result<BookRecord, ClientError> {
        api.create_book(payload).await
    }

    async fn update(
        api: &dyn AdminApi,
        id: &BookId,
        payload: &BookPayload,
    ) -> Result<BookRecord, ClientError> {
        api.update_book(id, payload).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationForm {
    pub name: String,
}

#[async_trait]
impl EntityForm for OrganizationForm {
    type Id = OrganizationId;
    type Payload = OrganizationPayload;
    type Record = OrganizationRecord;

    const ENTITY: &'static str = "organization";
    const LIST_ROUTE: &'static str = "/organizations";
    const DISPLAY_NAME: &'static str = "Organization";

    fn schema() -> Schema {
        organization_schema()
    }

    fn defaults(_context: &NavigationContext) -> Self {
        Self::default()
    }

    fn from_record(record: &OrganizationRecord) -> Self {
        Self {
            name: record.name.clone(),
        }
    }

    fn record_id(record: &OrganizationRecord) -> OrganizationId {
        record.id.clone()
    }

    fn value(&self, field: &str) -> Option<FieldValue> {
        (field == "name").then(|| FieldValue::Text(self.name.clone()))
    }

    fn set_value(&mut self, field: &str, value: FieldValue) -> Result<(), FormError> {
        match (field, value) {
            ("name", FieldValue::Text(name)) => self.name = name,
            ("name", _) => return Err(mismatch(field, FieldKind::Text)),
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }

    fn to_payload(&self) -> OrganizationPayload {
        OrganizationPayload {
            name: self.name.clone(),
        }
    }

    async fn create(
        api: &dyn AdminApi,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError> {
        api.create_organization(payload).await
    }

    async fn update(
        api: &dyn AdminApi,
        id: &OrganizationId,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError> {
        api.update_organization(id, payload).await
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
