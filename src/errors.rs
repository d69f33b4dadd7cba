//! Error taxonomy for provider calls and reconciliation runs.
//!
//! Provider errors are captured per repository/organisation and attached to
//! the corresponding change entry; they never abort a whole run. Run errors
//! abort the run for one user and leave persisted state untouched.

use thiserror::Error;

/// Errors returned by a remote provider client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The configured provider is unknown or has no usable access token.
    #[error("provider {0} not supported")]
    Unsupported(String),

    /// The provider rejected the access token (HTTP 401).
    #[error("{provider} rejected the access token")]
    Unauthorized { provider: String },

    /// Network-level failure (connect, timeout, malformed body).
    #[error("request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status code.
    #[error("{provider} returned HTTP {status} for {url}")]
    Api {
        provider: String,
        status: u16,
        url: String,
    },
}

impl ProviderError {
    /// True when the error indicates a rejected token. Repeated occurrences
    /// within one run abort the run (the token is likely revoked).
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Unauthorized { .. })
    }
}

/// Errors that abort a whole reconciliation run for one user.
#[derive(Debug, Error)]
pub enum RunError {
    /// The user has neither a valid email address nor a configured webhook.
    /// Detected before any provider call is made.
    #[error("no valid email or webhook configured for {user}")]
    NoNotificationTarget { user: String },

    /// The provider rejected the token repeatedly; the token is treated as
    /// revoked and the run stops to avoid burning API quota.
    #[error("provider token appears revoked after {0} consecutive authentication failures")]
    AuthRevoked(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_detection() {
        let err = ProviderError::Unauthorized {
            provider: "github".to_string(),
        };
        assert!(err.is_unauthorized());

        let err = ProviderError::Unsupported("bitbucket".to_string());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_error_messages() {
        let err = ProviderError::Api {
            provider: "gitlab".to_string(),
            status: 404,
            url: "https://gitlab.com/api/v4/projects/a%2Fb".to_string(),
        };
        assert!(err.to_string().contains("404"));

        let err = RunError::NoNotificationTarget {
            user: "github/alice".to_string(),
        };
        assert!(err.to_string().contains("github/alice"));
    }
}
