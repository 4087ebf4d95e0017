//! Headless entity admin forms: form state, validation, submission, reference
//! selection and the access gate that precedes them.

pub mod access;
pub mod controller;
pub mod form;
pub mod navigation;
pub mod schema;
pub mod selector;

pub use access::{AccessGate, Admission, GateContext, Guard, GuardChain, Redirect, Session};
pub use controller::{
    events::{FormEvent, SubmitError, SubmitErrorCategory},
    EntityFormController, FormMode, FormSnapshot, SubmitOutcome,
};
pub use form::{BookForm, EntityForm, FieldValue, FormError, OrganizationForm};
pub use navigation::{NavigationContext, Navigator, RecordingNavigator};
pub use schema::{FieldErrors, FieldKind, Schema};
pub use selector::{AsyncReferenceSelector, SelectOption, SelectorError, SelectorState};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
