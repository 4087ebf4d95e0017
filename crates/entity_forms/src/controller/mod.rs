//! Entity form controller: field state, submit-time validation, the single
//! create/update call per submission, and navigation on success.

pub mod events;

use std::sync::Arc;

use client_core::{AdminApi, ClientError};
use shared::domain::Principal;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    access::Admission,
    form::{EntityForm, FieldValue, FormError},
    navigation::Navigator,
    schema::{FieldErrors, Schema},
};
use events::{FormEvent, SubmitError};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode<Id> {
    Create,
    Edit(Id),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome<R> {
    Saved(R),
    /// Validation failed; no request was sent.
    Invalid(FieldErrors),
    Failed(SubmitError),
    /// Another submission was in flight or the form is unmounted.
    Ignored,
    /// The form was unmounted while the request was pending.
    Cancelled,
}

/// Read-only view of the form for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSnapshot<F> {
    pub values: F,
    pub field_errors: FieldErrors,
    pub submit_error: Option<SubmitError>,
    pub submitting: bool,
    pub unmounted: bool,
}

impl<F> FormSnapshot<F> {
    pub fn submit_enabled(&self) -> bool {
        !self.submitting && !self.unmounted
    }
}

struct FormState<F> {
    values: F,
    field_errors: FieldErrors,
    submit_error: Option<SubmitError>,
    submitting: bool,
}

pub struct EntityFormController<F: EntityForm> {
    api: Arc<dyn AdminApi>,
    navigator: Arc<dyn Navigator>,
    admission: Admission,
    mode: FormMode<F::Id>,
    schema: Schema,
    defaults: F,
    inner: Mutex<FormState<F>>,
    cancel: CancellationToken,
    events: broadcast::Sender<FormEvent>,
}

impl<F: EntityForm> EntityFormController<F> {
    /// Mounts a create form seeded from the admission's navigation context.
    pub fn mount(
        admission: Admission,
        api: Arc<dyn AdminApi>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let defaults = F::defaults(admission.navigation());
        Self::with_defaults(admission, api, navigator, FormMode::Create, defaults)
    }

    /// Mounts an edit form seeded from an existing record.
    pub fn mount_edit(
        admission: Admission,
        api: Arc<dyn AdminApi>,
        navigator: Arc<dyn Navigator>,
        record: &F::Record,
    ) -> Self {
        let mode = FormMode::Edit(F::record_id(record));
        let defaults = F::from_record(record);
        Self::with_defaults(admission, api, navigator, mode, defaults)
    }

    fn with_defaults(
        admission: Admission,
        api: Arc<dyn AdminApi>,
        navigator: Arc<dyn Navigator>,
        mode: FormMode<F::Id>,
        defaults: F,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        debug!(
            entity = F::ENTITY,
            user_id = %admission.principal().user_id,
            mode = ?mode,
            "mounted entity form"
        );
        Self {
            api,
            navigator,
            admission,
            mode,
            schema: F::schema(),
            inner: Mutex::new(FormState {
                values: defaults.clone(),
                field_errors: FieldErrors::default(),
                submit_error: None,
                submitting: false,
            }),
            defaults,
            cancel: CancellationToken::new(),
            events,
        }
    }

    pub fn principal(&self) -> &Principal {
        self.admission.principal()
    }

    pub fn mode(&self) -> &FormMode<F::Id> {
        &self.mode
    }

    /// Page heading for the current mode.
    pub fn title(&self) -> String {
        match self.mode {
            FormMode::Create => format!("Create {}", F::DISPLAY_NAME),
            FormMode::Edit(_) => format!("Edit {}", F::DISPLAY_NAME),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FormEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: FormEvent) {
        let _ = self.events.send(event);
    }

    /// Applies raw input to `field`, converting it by the field's kind.
    pub async fn set_field(&self, field: &str, raw: &str) -> Result<(), FormError> {
        let kind = self
            .schema
            .field(field)
            .map(|rules| rules.kind)
            .ok_or_else(|| FormError::UnknownField {
                entity: F::ENTITY,
                field: field.to_string(),
            })?;
        self.set_value(field, FieldValue::from_raw(kind, raw)).await
    }

    pub async fn set_value(&self, field: &str, value: FieldValue) -> Result<(), FormError> {
        if self.cancel.is_cancelled() {
            return Err(FormError::Unmounted);
        }
        self.inner.lock().await.values.set_value(field, value)?;
        debug!(entity = F::ENTITY, field, "form field updated");
        self.emit(FormEvent::FieldChanged {
            field: field.to_string(),
        });
        Ok(())
    }

    pub async fn values(&self) -> F {
        self.inner.lock().await.values.clone()
    }

    pub async fn snapshot(&self) -> FormSnapshot<F> {
        let state = self.inner.lock().await;
        FormSnapshot {
            values: state.values.clone(),
            field_errors: state.field_errors.clone(),
            submit_error: state.submit_error.clone(),
            submitting: state.submitting,
            unmounted: self.cancel.is_cancelled(),
        }
    }

    pub async fn submit_enabled(&self) -> bool {
        !self.cancel.is_cancelled() && !self.inner.lock().await.submitting
    }

    /// Restores default values and clears every error.
    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        state.values = self.defaults.clone();
        state.field_errors = FieldErrors::default();
        state.submit_error = None;
    }

    /// Validates and, when valid, sends exactly one create or update request.
    pub async fn submit(&self) -> SubmitOutcome<F::Record> {
        if self.cancel.is_cancelled() {
            return SubmitOutcome::Ignored;
        }

        let payload = {
            let mut state = self.inner.lock().await;
            if state.submitting {
                debug!(entity = F::ENTITY, "submit ignored while a request is in flight");
                return SubmitOutcome::Ignored;
            }

            let errors = self.schema.validate(|field| state.values.value(field));
            state.field_errors = errors.clone();
            if !errors.is_empty() {
                drop(state);
                debug!(entity = F::ENTITY, invalid_fields = errors.len(), "form validation failed");
                self.emit(FormEvent::ValidationFailed(errors.clone()));
                return SubmitOutcome::Invalid(errors);
            }

            state.submit_error = None;
            state.submitting = true;
            state.values.to_payload()
        };
        self.emit(FormEvent::SubmitStarted);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.dispatch(&payload) => Some(result),
        };

        let mut state = self.inner.lock().await;
        state.submitting = false;
        let result = match result {
            Some(result) if !self.cancel.is_cancelled() => result,
            _ => {
                debug!(entity = F::ENTITY, "submission abandoned after unmount");
                return SubmitOutcome::Cancelled;
            }
        };

        match result {
            Ok(record) => {
                // An edit form shows what the server stored.
                state.values = match self.mode {
                    FormMode::Create => self.defaults.clone(),
                    FormMode::Edit(_) => F::from_record(&record),
                };
                state.field_errors = FieldErrors::default();
                drop(state);

                let id = F::record_id(&record).to_string();
                info!(entity = F::ENTITY, id = %id, "entity saved");
                self.emit(FormEvent::Saved {
                    entity: F::ENTITY,
                    id,
                });
                self.navigator.navigate(F::LIST_ROUTE);
                self.emit(FormEvent::Navigated {
                    route: F::LIST_ROUTE.to_string(),
                });
                SubmitOutcome::Saved(record)
            }
            Err(err) => {
                let error = SubmitError::from_client_error(&err);
                warn!(entity = F::ENTITY, error = %err, "entity submission failed");
                state.submit_error = Some(error.clone());
                drop(state);
                self.emit(FormEvent::SubmitFailed(error.clone()));
                SubmitOutcome::Failed(error)
            }
        }
    }

    async fn dispatch(&self, payload: &F::Payload) -> Result<F::Record, ClientError> {
        debug!(entity = F::ENTITY, ?payload, "submitting entity");
        match &self.mode {
            FormMode::Create => F::create(self.api.as_ref(), payload).await,
            FormMode::Edit(id) => F::update(self.api.as_ref(), id, payload).await,
        }
    }

    /// Cancels any pending request; later submissions and field updates are
    /// rejected.
    pub fn unmount(&self) {
        if !self.cancel.is_cancelled() {
            self.cancel.cancel();
            self.emit(FormEvent::Unmounted);
        }
    }

    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<F: EntityForm> Drop for EntityFormController<F> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "../tests/controller_tests.rs"]
mod tests;
