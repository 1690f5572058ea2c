use serde::{Deserialize, Serialize};

/// Identity of the requesting user, used for `$user` tab filters and for
/// attributing bulk mutations in the logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

impl UserContext {
    pub fn new(user_id: String) -> Self {
        Self {
            user_id,
            user_email: None,
            user_name: None,
        }
    }

    pub fn with_details(user_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            user_id,
            user_email: email,
            user_name: name,
        }
    }

    /// Fallback identity when no user headers are present (development)
    pub fn default_user() -> Self {
        Self {
            user_id: "1".to_string(),
            user_email: Some("admin@localhost".to_string()),
            user_name: Some("Administrator".to_string()),
        }
    }

    /// Name for log lines: display name when known, otherwise the id
    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.user_id)
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::default_user()
    }
}
