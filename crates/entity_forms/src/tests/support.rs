//! In-memory `AdminApi` used by the controller and selector tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use client_core::{AdminApi, ClientError};
use shared::{
    domain::{AccessOperation, BookId, OrganizationId, Permission, Principal, UserId},
    error::ErrorCode,
    protocol::{
        BookPayload, BookQuery, BookRecord, OrganizationPayload, OrganizationQuery,
        OrganizationRecord, Page,
    },
};
use tokio::sync::{Mutex, Notify};

use crate::{
    access::{Admission, GateContext, Session},
    navigation::NavigationContext,
    AccessGate,
};

#[derive(Default)]
pub(crate) struct FakeAdminApi {
    pub book_creates: Mutex<Vec<BookPayload>>,
    pub book_updates: Mutex<Vec<(BookId, BookPayload)>>,
    pub organization_creates: Mutex<Vec<OrganizationPayload>>,
    pub organization_fetches: AtomicUsize,
    pub organizations: Vec<OrganizationRecord>,
    pub fail_with: Option<(u16, ErrorCode, String)>,
    pub fail_organizations: bool,
    /// Notified when a write request arrives.
    pub entered: Arc<Notify>,
    /// When set, write requests wait for a notification before answering.
    pub release: Option<Arc<Notify>>,
}

impl FakeAdminApi {
    pub fn failing(status: u16, code: ErrorCode, message: &str) -> Self {
        Self {
            fail_with: Some((status, code, message.to_string())),
            ..Self::default()
        }
    }

    pub fn holding(release: Arc<Notify>) -> Self {
        Self {
            release: Some(release),
            ..Self::default()
        }
    }

    pub fn with_organizations(names: &[(&str, &str)]) -> Self {
        Self {
            organizations: names
                .iter()
                .map(|(id, name)| OrganizationRecord {
                    id: OrganizationId::new(*id),
                    name: name.to_string(),
                    created_at: None,
                    updated_at: None,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub async fn create_count(&self) -> usize {
        self.book_creates.lock().await.len()
    }

    async fn write_gate(&self) -> Result<(), ClientError> {
        self.entered.notify_one();
        if let Some(release) = &self.release {
            release.notified().await;
        }
        match &self.fail_with {
            Some((status, code, message)) => {
                Err(ClientError::api(*status, *code, message.clone()))
            }
            None => Ok(()),
        }
    }
}

fn book_record(id: &str, payload: &BookPayload) -> BookRecord {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    BookRecord {
        id: BookId::new(id),
        title: payload.title.clone(),
        author: payload.author.clone(),
        publication_year: payload.publication_year,
        organization_id: payload.organization_id.clone(),
        created_at: at,
        updated_at: at,
        organization: None,
    }
}

#[async_trait]
impl AdminApi for FakeAdminApi {
    async fn create_book(&self, payload: &BookPayload) -> Result<BookRecord, ClientError> {
        let position = {
            let mut creates = self.book_creates.lock().await;
            creates.push(payload.clone());
            creates.len()
        };
        self.write_gate().await?;
        Ok(book_record(&format!("book-{position}"), payload))
    }

    async fn update_book(
        &self,
        id: &BookId,
        payload: &BookPayload,
    ) -> Result<BookRecord, ClientError> {
        self.book_updates
            .lock()
            .await
            .push((id.clone(), payload.clone()));
        self.write_gate().await?;
        Ok(book_record(id.as_str(), payload))
    }

    async fn get_books(&self, _query: &BookQuery) -> Result<Page<BookRecord>, ClientError> {
        Ok(Page::new(Vec::new()))
    }

    async fn get_book_by_id(&self, id: &BookId) -> Result<BookRecord, ClientError> {
        Err(ClientError::api(
            404,
            ErrorCode::NotFound,
            format!("book {id} not found"),
        ))
    }

    async fn get_organizations(
        &self,
        _query: &OrganizationQuery,
    ) -> Result<Page<OrganizationRecord>, ClientError> {
        self.organization_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_organizations {
            return Err(ClientError::api(500, ErrorCode::Internal, "database offline"));
        }
        Ok(Page::new(self.organizations.clone()))
    }

    async fn create_organization(
        &self,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError> {
        self.organization_creates.lock().await.push(payload.clone());
        self.write_gate().await?;
        Ok(OrganizationRecord {
            id: OrganizationId::new("org-new"),
            name: payload.name.clone(),
            created_at: None,
            updated_at: None,
        })
    }

    async fn update_organization(
        &self,
        id: &OrganizationId,
        payload: &OrganizationPayload,
    ) -> Result<OrganizationRecord, ClientError> {
        self.write_gate().await?;
        Ok(OrganizationRecord {
            id: id.clone(),
            name: payload.name.clone(),
            created_at: None,
            updated_at: None,
        })
    }

    async fn current_principal(&self) -> Result<Principal, ClientError> {
        Ok(book_admin())
    }
}

pub(crate) fn book_admin() -> Principal {
    Principal {
        user_id: UserId::new("user-7"),
        display_name: Some("Ada".into()),
        permissions: vec![
            Permission::project("book", AccessOperation::Create),
            Permission::project("book", AccessOperation::Update),
            Permission::project("organization", AccessOperation::Create),
        ],
    }
}

/// Admission obtained through the real gate for `entity`/`operation`.
pub(crate) fn admit(entity: &str, operation: AccessOperation, location: &str) -> Admission {
    AccessGate::for_entity(entity, operation)
        .admit(GateContext::new(
            Some(Session::new(book_admin())),
            NavigationContext::parse(location),
        ))
        .expect("test principal is admitted")
}
