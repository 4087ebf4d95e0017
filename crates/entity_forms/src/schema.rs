//! Declarative per-field validation rules, evaluated only when a form is submitted.

use std::collections::BTreeMap;

use crate::form::FieldValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    /// Identifier of a related record, or absent.
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    MaxLength(usize),
    Min(i64),
    Max(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRules {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub rules: Vec<Rule>,
}

impl FieldRules {
    fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
            rules: Vec::new(),
        }
    }

    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn integer(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Integer)
    }

    pub fn reference(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Reference)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.rules.push(Rule::MaxLength(max));
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.rules.push(Rule::Min(min));
        self
    }

    pub fn max(mut self, max: i64) -> Self {
        self.rules.push(Rule::Max(max));
        self
    }

    fn check(&self, value: Option<&FieldValue>) -> Option<String> {
        let present = match value {
            None => false,
            Some(FieldValue::Text(text)) => !text.trim().is_empty(),
            Some(FieldValue::Integer(_)) => true,
            Some(FieldValue::Reference(reference)) => {
                reference.as_deref().is_some_and(|id| !id.trim().is_empty())
            }
        };
        if !present {
            return self
                .required
                .then(|| format!("{} is a required field", self.label));
        }

        for rule in &self.rules {
            let failure = match (rule, value) {
                (Rule::MaxLength(max), Some(FieldValue::Text(text)))
                    if text.chars().count() > *max =>
                {
                    Some(format!("{} must be at most {max} characters", self.label))
                }
                (Rule::Min(min), Some(FieldValue::Integer(number))) if i64::from(*number) < *min => {
                    Some(format!(
                        "{} must be greater than or equal to {min}",
                        self.label
                    ))
                }
                (Rule::Max(max), Some(FieldValue::Integer(number))) if i64::from(*number) > *max => {
                    Some(format!("{} must be less than or equal to {max}", self.label))
                }
                _ => None,
            };
            if failure.is_some() {
                return failure;
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldRules>,
}

impl Schema {
    pub fn new(fields: Vec<FieldRules>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldRules> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldRules> {
        self.fields.iter()
    }

    /// Runs every field's rules against the values `lookup` returns and keeps
    /// the first failure per field.
    pub fn validate(&self, lookup: impl Fn(&str) -> Option<FieldValue>) -> FieldErrors {
        let mut errors = FieldErrors::default();
        for field in &self.fields {
            let value = lookup(field.name);
            if let Some(message) = field.check(value.as_ref()) {
                errors.insert(field.name, message);
            }
        }
        errors
    }
}

pub fn book_schema() -> Schema {
    Schema::new(vec![
        FieldRules::text("title", "title").required().max_length(255),
        FieldRules::text("author", "author").required().max_length(255),
        FieldRules::integer("publication_year", "publication_year").min(0),
        FieldRules::reference("organization_id", "organization_id"),
    ])
}

pub fn organization_schema() -> Schema {
    Schema::new(vec![FieldRules::text("name", "name").required().max_length(255)])
}

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub(crate) fn insert(&mut self, field: &str, message: String) {
        self.0.insert(field.to_string(), message);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }
}

#[cfg(test)]
#[path = "tests/schema_tests.rs"]
mod tests;
