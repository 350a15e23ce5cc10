//! Audit recorder collaborator
//!
//! Mutating operations record what changed; a failed audit write is logged
//! and never fails the operation it describes.

use async_trait::async_trait;
use opsdesk_storage::repository::{AuditRepository, NewAuditEntry};
use tracing::error;

/// Records audit entries for mutating operations
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    async fn record(&self, entry: NewAuditEntry);
}

/// Database-backed recorder
pub struct DbAuditRecorder {
    repo: AuditRepository,
}

impl DbAuditRecorder {
    /// Create a recorder over the audit repository
    pub fn new(repo: AuditRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl AuditRecorder for DbAuditRecorder {
    async fn record(&self, entry: NewAuditEntry) {
        if let Err(e) = self.repo.insert(&entry).await {
            error!(action = %entry.action, "Failed to write audit entry: {}", e);
        }
    }
}
