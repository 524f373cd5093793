use std::path::Path;

use super::types::{CancelToken, RepoError};
use crate::api::types::{Epic, Feature};

/// The relational store holding the resolved catalog.
///
/// Any implementation providing these operations is interchangeable; the
/// engine never assumes a concrete backend. Implementations MUST enforce
/// uniqueness of task identifiers so that concurrent allocations surface as
/// [`RepoError::Conflict`], which callers treat as retryable.
pub trait CatalogRepository {
    /// Cheap indexed lookup: does an epic with this key exist?
    fn epic_exists(&self, key: &str, cancel: &CancelToken) -> Result<bool, RepoError>;

    /// Cheap indexed lookup: does a feature with this key exist?
    fn feature_exists(&self, key: &str, cancel: &CancelToken) -> Result<bool, RepoError>;

    /// Largest three-digit sequence suffix among existing task identifiers
    /// for the feature, or zero when the feature has no tasks.
    fn max_task_sequence(&self, feature_key: &str, cancel: &CancelToken)
        -> Result<u32, RepoError>;

    /// Register a newly allocated task identifier. A uniqueness violation is
    /// reported as [`RepoError::Conflict`].
    fn register_task(
        &self,
        task_key: &str,
        feature_key: &str,
        file_path: &Path,
        cancel: &CancelToken,
    ) -> Result<(), RepoError>;

    /// Insert or update one epic of the resolved catalog.
    fn upsert_epic(&self, epic: &Epic, cancel: &CancelToken) -> Result<(), RepoError>;

    /// Insert or update one feature of the resolved catalog.
    fn upsert_feature(&self, feature: &Feature, cancel: &CancelToken) -> Result<(), RepoError>;
}
