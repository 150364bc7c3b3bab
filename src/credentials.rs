// src/credentials.rs

use crate::error::{ApiError, ExtractError};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Rotating pool of completion-service credentials.
///
/// The cursor is an atomic counter read modulo the pool length, so
/// concurrent callers rotate without tearing; interleaved rotation across
/// requests is accepted, the pool only promises availability.
pub struct CredentialPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    pub fn new(keys: Vec<String>) -> Self {
        let keys: Vec<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current position, already reduced modulo the pool length.
    pub fn cursor(&self) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        self.cursor.load(Ordering::Relaxed) % self.keys.len()
    }

    fn rotate(&self) {
        self.cursor.fetch_add(1, Ordering::Relaxed);
    }

    /// Run `attempt` against the current credential, rotating to the next
    /// key on EVERY failure, bounded at twice the pool size.
    ///
    /// Rate-limit (429) and auth (401) rejections are the expected rotation
    /// triggers, but any other error rotates too: a failure may always be
    /// credential-specific, and availability wins over fast-fail here.
    pub async fn execute<T, F, Fut>(&self, mut attempt: F) -> Result<T, ExtractError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if self.keys.is_empty() {
            return Err(ExtractError::NoCredentialsConfigured);
        }

        let max_attempts = self.keys.len() * 2;
        for attempt_no in 1..=max_attempts {
            let index = self.cursor();
            match attempt(self.keys[index].clone()).await {
                Ok(value) => return Ok(value),
                Err(ApiError::RateLimited) => {
                    warn!(credential = index, attempt = attempt_no, "Rate limited, rotating credential");
                }
                Err(ApiError::AuthRejected) => {
                    warn!(credential = index, attempt = attempt_no, "Credential rejected, rotating");
                }
                Err(e) => {
                    warn!(credential = index, attempt = attempt_no, error = %e, "Call failed, rotating credential");
                }
            }
            self.rotate();
        }

        Err(ExtractError::AllCredentialsExhausted {
            attempts: max_attempts,
        })
    }
}
