use serde::Deserialize;

use crate::app::error::ValidationError;
use crate::app::sanitize::strip_tags;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A contact message with every field reduced to non-empty plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactMessage {
    pub fn from_request(request: &ContactRequest) -> Result<Self, ValidationError> {
        let clean = |field: &Option<String>| {
            field
                .as_deref()
                .map(|v| strip_tags(v).trim().to_owned())
                .unwrap_or_default()
        };
        let message = Self {
            name: clean(&request.name),
            email: clean(&request.email),
            message: clean(&request.message),
        };
        if message.name.is_empty() || message.email.is_empty() || message.message.is_empty() {
            return Err(ValidationError::new(
                "name, email, and message are required",
            ));
        }
        Ok(message)
    }
}
