use serde::Serialize;

use crate::error::ApiError;
use crate::identity::IdentityBackend;

/// Per-invocation view of the caller's proof of identity.
///
/// Borrowed for the duration of one exchange and discarded afterwards; the
/// handler never stores it.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    subject: Option<String>,
}

impl AuthContext {
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { subject: None }
    }

    /// Subject identifier proving prior authentication. An empty string
    /// counts as no proof.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref().filter(|value| !value.is_empty())
    }
}

/// Success payload of a token exchange. Ownership of the token passes to
/// the caller immediately; nothing is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Exchange an authenticated caller's identity for a custom token.
///
/// Fails `Unauthenticated` before touching the backend when the context
/// carries no subject. The backend is called exactly once, with no retry;
/// any failure is flattened into `Internal` carrying the upstream message.
pub async fn exchange(
    ctx: &AuthContext,
    backend: &dyn IdentityBackend,
) -> Result<TokenResponse, ApiError> {
    let Some(subject) = ctx.subject() else {
        return Err(ApiError::Unauthenticated);
    };

    match backend.mint_custom_token(subject).await {
        Ok(token) => {
            tracing::info!(event = "token_minted", subject, "issued custom token");
            Ok(TokenResponse { token })
        }
        Err(err) => {
            tracing::warn!(
                event = "token_mint_failed",
                subject,
                error = %err,
                "identity backend call failed"
            );
            Err(ApiError::Internal {
                message: format!("Error generating token: {err}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::identity::{IdentityBackend, IdentityError};

    struct FakeBackend {
        calls: AtomicUsize,
        result: Result<String, String>,
    }

    impl FakeBackend {
        fn minting(token: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Ok(token.to_string()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Err(message.to_string()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityBackend for FakeBackend {
        async fn mint_custom_token(&self, _subject: &str) -> Result<String, IdentityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(token) => Ok(token.clone()),
                Err(message) => Err(IdentityError::Mint(message.clone())),
            }
        }
    }

    /// Backend that mints a fresh token on every call.
    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityBackend for CountingBackend {
        async fn mint_custom_token(&self, subject: &str) -> Result<String, IdentityError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token.{subject}.{n}"))
        }
    }

    #[tokio::test]
    async fn unauthenticated_context_never_reaches_backend() {
        let backend = FakeBackend::minting("signed.token.abc");
        let result = exchange(&AuthContext::anonymous(), &backend).await;

        assert!(matches!(result, Err(ApiError::Unauthenticated)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_subject_counts_as_unauthenticated() {
        let backend = FakeBackend::minting("signed.token.abc");
        let result = exchange(&AuthContext::authenticated(""), &backend).await;

        assert!(matches!(result, Err(ApiError::Unauthenticated)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn passes_backend_token_through_unmodified() {
        let backend = FakeBackend::minting("signed.token.abc");
        let response = exchange(&AuthContext::authenticated("user-123"), &backend)
            .await
            .expect("token");

        assert_eq!(response.token, "signed.token.abc");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn backend_failure_is_flattened_to_internal() {
        let backend = FakeBackend::failing("quota exceeded");
        let result = exchange(&AuthContext::authenticated("user-456"), &backend).await;

        match result {
            Err(ApiError::Internal { message }) => {
                assert_eq!(message, "Error generating token: quota exceeded");
            }
            other => panic!("expected internal error, got {other:?}"),
        }
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn repeated_exchanges_mint_fresh_tokens() {
        let backend = CountingBackend::default();
        let ctx = AuthContext::authenticated("user-123");

        let first = exchange(&ctx, &backend).await.expect("first token");
        let second = exchange(&ctx, &backend).await.expect("second token");

        assert_ne!(first.token, second.token);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
