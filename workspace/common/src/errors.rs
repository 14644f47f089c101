use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field-keyed validation errors.
///
/// Serialized as a flat object mapping every offending field to the list of
/// messages raised for it, e.g. `{"password": ["This field is required."]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors for a single field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    /// Adds every message in `messages` under `field`.
    pub fn extend_field<I, S>(&mut self, field: &str, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for message in messages {
            self.add(field, message);
        }
    }

    /// Moves all errors of `other` into `self`.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// Drops the messages of every field for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|field, _| keep(field));
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `Err(self)` when any error was collected.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

/// Error body carrying a human readable detail and an optional machine code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error message
    pub detail: String,
    /// Machine readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorDetail {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into(), code: None }
    }

    pub fn with_code(detail: impl Into<String>, code: impl Into<String>) -> Self {
        Self { detail: detail.into(), code: Some(code.into()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_serialize_as_flat_object() {
        let mut errors = FieldErrors::new();
        errors.add("password", "This field is required.");
        errors.add("password", "Second message.");
        errors.add_non_field("Mismatch.");

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "non_field_errors": ["Mismatch."],
                "password": ["This field is required.", "Second message."],
            })
        );
    }

    #[test]
    fn merge_appends_messages_per_field() {
        let mut left = FieldErrors::single("email", "a");
        let mut right = FieldErrors::single("email", "b");
        right.add("username", "c");
        left.merge(right);

        assert_eq!(left.get("email"), Some(&["a".to_string(), "b".to_string()][..]));
        assert!(left.contains("username"));
        left.retain(|field| field != "email");
        assert_eq!(left.get("email"), None);
        assert!(left.into_result().is_err());
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn error_detail_omits_missing_code() {
        let plain = serde_json::to_value(ErrorDetail::new("Not found.")).unwrap();
        assert_eq!(plain, serde_json::json!({"detail": "Not found."}));

        let coded = serde_json::to_value(ErrorDetail::with_code("bad", "token_not_valid")).unwrap();
        assert_eq!(coded["code"], "token_not_valid");
    }
}
