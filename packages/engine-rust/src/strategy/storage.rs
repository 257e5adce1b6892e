//! Local key-value storage strategy.
//!
//! Repository calls are synchronous and may block, so the strategy runs them
//! on the blocking pool. Results are mapped onto the shared result codes:
//!
//! | action   | hit                         | miss            |
//! |----------|-----------------------------|-----------------|
//! | `Get`    | 200 with the value          | 404             |
//! | `Put`    | 200 (replaced) with value   | 201 (inserted)  |
//! | `Remove` | 204                         | 404             |

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use opflow_core::{codes, Outcome, StrategyError};
use serde_json::Value;

use super::Strategy;

// ---------------------------------------------------------------------------
// KeyValueRepository
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("cannot encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistent key-value store of JSON values.
pub trait KeyValueRepository: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns a [`RepositoryError`] if the backing store fails.
    fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError>;

    /// Stores `value`, returning the value it replaced.
    ///
    /// # Errors
    ///
    /// Returns a [`RepositoryError`] if the backing store fails.
    fn put(&self, key: &str, value: Value) -> Result<Option<Value>, RepositoryError>;

    /// Removes `key`, returning the value it held.
    ///
    /// # Errors
    ///
    /// Returns a [`RepositoryError`] if the backing store fails.
    fn remove(&self, key: &str) -> Result<Option<Value>, RepositoryError>;
}

/// In-memory repository backed by [`DashMap`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    entries: DashMap<String, Value>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueRepository for MemoryRepository {
    fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    fn put(&self, key: &str, value: Value) -> Result<Option<Value>, RepositoryError> {
        Ok(self.entries.insert(key.to_string(), value))
    }

    fn remove(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.entries.remove(key).map(|(_, v)| v))
    }
}

// ---------------------------------------------------------------------------
// StorageStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StorageAction {
    Get { key: String },
    Put { key: String, value: Value },
    Remove { key: String },
}

impl StorageAction {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Get { key } | Self::Put { key, .. } | Self::Remove { key } => key,
        }
    }
}

/// Strategy applying one [`StorageAction`] to a repository.
pub struct StorageStrategy {
    repository: Arc<dyn KeyValueRepository>,
    action: StorageAction,
}

impl StorageStrategy {
    #[must_use]
    pub fn new(repository: Arc<dyn KeyValueRepository>, action: StorageAction) -> Self {
        Self { repository, action }
    }
}

fn apply(
    repository: &dyn KeyValueRepository,
    action: StorageAction,
) -> Result<Outcome<Option<Value>>, RepositoryError> {
    let outcome = match action {
        StorageAction::Get { key } => match repository.get(&key)? {
            Some(value) => Outcome::response(codes::OK, Some(value)),
            None => Outcome::response(codes::NOT_FOUND, None),
        },
        StorageAction::Put { key, value } => {
            let code = match repository.put(&key, value.clone())? {
                Some(_) => codes::OK,
                None => codes::CREATED,
            };
            Outcome::response(code, Some(value))
        }
        StorageAction::Remove { key } => match repository.remove(&key)? {
            Some(_) => Outcome::response(codes::NO_CONTENT, None),
            None => Outcome::response(codes::NOT_FOUND, None),
        },
    };
    Ok(outcome)
}

#[async_trait]
impl Strategy for StorageStrategy {
    type Output = Option<Value>;

    async fn execute(&mut self) -> Outcome<Option<Value>> {
        let repository = Arc::clone(&self.repository);
        let action = self.action.clone();
        let key = action.key().to_string();

        match tokio::task::spawn_blocking(move || apply(repository.as_ref(), action)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::warn!(%key, error = %err, "repository call failed");
                Outcome::Failure(StrategyError::Storage(err.to_string()))
            }
            Err(err) => Outcome::Failure(StrategyError::Storage(err.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "storage"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
