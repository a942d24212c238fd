//! Inbound collaborator lookups: candidate profiles and job postings.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CandidateId, JobId, JobPosting, ProfileSnapshot};

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("candidate {0} not found")]
    CandidateNotFound(CandidateId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("collaborator backend: {0}")]
    Backend(String),
}

impl LookupError {
    /// Not-found means the referenced entity is gone; retrying will not
    /// bring it back. Backend trouble is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, LookupError::Backend(_))
    }
}

/// Read-only view into the candidate-profile collaborator.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile_snapshot(&self, candidate_id: &CandidateId)
    -> Result<ProfileSnapshot, LookupError>;
}

/// Read-only view into the job-catalog collaborator.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    async fn job(&self, job_id: &JobId) -> Result<JobPosting, LookupError>;
}
