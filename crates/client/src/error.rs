use std::collections::BTreeMap;

/// Errors from the API client, the token stores and the session manager.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        /// Machine-readable code from the error body, e.g. `"UNAUTHORIZED"`.
        code: Option<String>,
        message: String,
        /// Per-field validation messages; empty unless the API sent them.
        fields: BTreeMap<String, Vec<String>>,
    },

    /// Reading or writing persisted tokens failed.
    #[error("Token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted tokens could not be (de)serialized.
    #[error("Token store format error: {0}")]
    Format(#[from] serde_json::Error),

    /// The operation needs a signed-in session.
    #[error("No active session")]
    NotAuthenticated,
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// First message reported for `field`, if any.
    pub fn field_message(&self, field: &str) -> Option<&str> {
        match self {
            ClientError::Api { fields, .. } => fields
                .get(field)
                .and_then(|messages| messages.first())
                .map(String::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error() -> ClientError {
        let mut fields = BTreeMap::new();
        fields.insert(
            "email".to_string(),
            vec!["Informe um e-mail válido".to_string()],
        );
        ClientError::Api {
            status: 400,
            code: Some("VALIDATION_ERROR".to_string()),
            message: "Informe um e-mail válido".to_string(),
            fields,
        }
    }

    #[test]
    fn status_only_for_api_errors() {
        assert_eq!(api_error().status(), Some(400));
        assert_eq!(ClientError::NotAuthenticated.status(), None);
    }

    #[test]
    fn field_message_returns_first_entry() {
        let err = api_error();
        assert_eq!(err.field_message("email"), Some("Informe um e-mail válido"));
        assert_eq!(err.field_message("password"), None);
    }

    #[test]
    fn display_includes_status_and_message() {
        assert_eq!(
            api_error().to_string(),
            "API error (400): Informe um e-mail válido"
        );
    }
}
