//! Viewer identity supplied by the identity provider.

use serde::{Deserialize, Serialize};

/// Who this client is, as reported by the identity provider.
///
/// The core only reads these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier; also the viewer key for per-viewer content.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Room the identity provider believes the user is in.
    pub location: Option<String>,
}

impl Identity {
    /// Create an identity with no known location.
    #[must_use]
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            location: None,
        }
    }

    /// Set the externally-known current location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Build the connection address for a viewer: `<base>/<viewer-id>`.
#[must_use]
pub fn hub_url(base: &str, viewer_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), viewer_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_url() {
        assert_eq!(hub_url("ws://hub/players", "u1"), "ws://hub/players/u1");
        assert_eq!(hub_url("ws://hub/players/", "u1"), "ws://hub/players/u1");
    }

    #[test]
    fn test_identity_location() {
        let identity = Identity::new("u1", "alice").with_location("r1");
        assert_eq!(identity.location.as_deref(), Some("r1"));
    }
}
