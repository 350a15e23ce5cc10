//! Status engine
//!
//! Owns the `TicketStatus` catalog and mediates every status read and
//! write. The repository executes the transactions; this layer validates
//! and normalises definitions, resolves defaults, and decides which slugs
//! are terminal.

use opsdesk_common::config::TicketConfig;
use opsdesk_common::text::slugify;
use opsdesk_common::{Error, Result};
use opsdesk_storage::models::TicketStatus;
use opsdesk_storage::repository::{StatusDefinition, StatusRepository};
use std::collections::HashSet;
use tracing::info;

/// An operator-supplied status definition, before normalisation.
///
/// `tech_status` may be empty, in which case the slug is derived from the
/// label. `original_slug` identifies the existing row this definition
/// updates; when the slug differs, every referencing ticket is rewritten.
#[derive(Debug, Clone)]
pub struct IncomingStatus {
    pub tech_status: String,
    pub tech_label: String,
    pub public_status: Option<String>,
    pub is_default: bool,
    pub original_slug: Option<String>,
}

/// Status engine over the catalog repository
#[derive(Clone)]
pub struct StatusEngine {
    repo: StatusRepository,
    terminal: HashSet<String>,
}

impl StatusEngine {
    /// Create an engine; the terminal set comes from configuration and is
    /// canonicalised up front.
    pub fn new(repo: StatusRepository, config: &TicketConfig) -> Self {
        let terminal = config
            .terminal_statuses
            .iter()
            .map(|s| slugify(s))
            .filter(|s| !s.is_empty())
            .collect();

        Self { repo, terminal }
    }

    /// Whether entering this status closes a ticket
    pub fn is_terminal(&self, slug: &str) -> bool {
        self.terminal.contains(slug)
    }

    /// The `closed_at` write implied by entering `new_status`, given the
    /// current value. `None` means the column stays untouched; this keeps
    /// the closed_at-iff-terminal invariant for every writer.
    pub fn closed_at_for_transition(
        &self,
        new_status: &str,
        current_closed_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Option<Option<chrono::DateTime<chrono::Utc>>> {
        if self.is_terminal(new_status) {
            if current_closed_at.is_none() {
                return Some(Some(chrono::Utc::now()));
            }
        } else if current_closed_at.is_some() {
            return Some(None);
        }
        None
    }

    /// All statuses, ordered by label
    pub async fn list(&self) -> Result<Vec<TicketStatus>> {
        self.repo.list().await
    }

    /// Seed the stock catalog if it is empty; `open` becomes the default.
    pub async fn ensure_defaults(&self) -> Result<()> {
        if self.repo.count().await? > 0 {
            return Ok(());
        }

        info!("Seeding default ticket status catalog");

        let seed: Vec<StatusDefinition> = [
            ("open", "Open", true),
            ("in_progress", "In Progress", false),
            ("pending", "Pending", false),
            ("resolved", "Resolved", false),
            ("closed", "Closed", false),
        ]
        .into_iter()
        .map(|(slug, label, is_default)| StatusDefinition {
            tech_status: slug.to_string(),
            tech_label: label.to_string(),
            public_status: label.to_string(),
            is_default,
            original_slug: None,
        })
        .collect();

        self.repo.seed(&seed).await
    }

    /// The default status row. `ensure_defaults` guarantees one exists.
    pub async fn get_default(&self) -> Result<TicketStatus> {
        self.repo
            .get_default()
            .await?
            .ok_or_else(|| Error::Internal("Status catalog has no default row".to_string()))
    }

    /// Return `slug` if it names a known status, otherwise the default
    /// slug. Used at ticket creation, where a null/empty status also falls
    /// back to the default.
    pub async fn resolve_status_or_default(&self, requested: Option<&str>) -> Result<String> {
        if let Some(raw) = requested {
            let slug = slugify(raw);
            if !slug.is_empty() && self.repo.find(&slug).await?.is_some() {
                return Ok(slug);
            }
        }
        Ok(self.get_default().await?.tech_status)
    }

    /// Canonicalise free-form input to a slug and reject unknown statuses.
    pub async fn validate_status_choice(&self, input: &str) -> Result<String> {
        let slug = slugify(input);
        if slug.is_empty() {
            return Err(Error::InvalidStatus(format!(
                "'{}' is not a valid status",
                input
            )));
        }

        match self.repo.find(&slug).await? {
            Some(status) => Ok(status.tech_status),
            None => Err(Error::InvalidStatus(format!(
                "Unknown status '{}'",
                slug
            ))),
        }
    }

    /// Atomically replace the catalog. Renames rewrite referencing tickets
    /// in the same transaction; removing a slug that tickets still use
    /// aborts the whole operation with `InUse`.
    pub async fn replace(&self, incoming: Vec<IncomingStatus>) -> Result<()> {
        let definitions = Self::normalize(incoming)?;
        self.repo.replace(&definitions).await
    }

    /// Validate and canonicalise incoming definitions.
    ///
    /// Slugs derive from the label when absent and must be unique after
    /// canonicalisation; if the incoming set does not carry exactly one
    /// default, the first definition becomes it.
    fn normalize(incoming: Vec<IncomingStatus>) -> Result<Vec<StatusDefinition>> {
        if incoming.is_empty() {
            return Err(Error::InvalidInput(
                "Status catalog cannot be empty".to_string(),
            ));
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(incoming.len());

        for def in incoming {
            let label = def.tech_label.trim().to_string();
            if label.is_empty() {
                return Err(Error::InvalidInput(
                    "Status label cannot be empty".to_string(),
                ));
            }

            let slug = if def.tech_status.trim().is_empty() {
                slugify(&label)
            } else {
                slugify(&def.tech_status)
            };
            if slug.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Cannot derive a slug from '{}'",
                    label
                )));
            }

            // Slugs are lowercase after canonicalisation, so this set
            // check is the case-insensitive uniqueness test.
            if !seen.insert(slug.clone()) {
                return Err(Error::InvalidInput(format!(
                    "Duplicate status slug '{}'",
                    slug
                )));
            }

            let public_status = def
                .public_status
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(&label)
                .to_string();

            out.push(StatusDefinition {
                tech_status: slug,
                tech_label: label,
                public_status,
                is_default: def.is_default,
                original_slug: def
                    .original_slug
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            });
        }

        let defaults = out.iter().filter(|d| d.is_default).count();
        if defaults != 1 {
            for def in out.iter_mut() {
                def.is_default = false;
            }
            out[0].is_default = true;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn incoming(slug: &str, label: &str, is_default: bool) -> IncomingStatus {
        IncomingStatus {
            tech_status: slug.to_string(),
            tech_label: label.to_string(),
            public_status: None,
            is_default,
            original_slug: None,
        }
    }

    #[test]
    fn test_normalize_derives_slug_from_label() {
        let defs = StatusEngine::normalize(vec![incoming("", "Waiting on Customer", true)]).unwrap();
        assert_eq!(defs[0].tech_status, "waiting_on_customer");
        assert_eq!(defs[0].public_status, "Waiting on Customer");
    }

    #[test]
    fn test_normalize_rejects_case_insensitive_duplicates() {
        let result = StatusEngine::normalize(vec![
            incoming("Open", "Open", true),
            incoming("OPEN", "Also Open", false),
        ]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_normalize_assigns_single_default() {
        // No default marked: the first definition becomes it.
        let defs = StatusEngine::normalize(vec![
            incoming("open", "Open", false),
            incoming("closed", "Closed", false),
        ])
        .unwrap();
        assert!(defs[0].is_default);
        assert!(!defs[1].is_default);

        // Several marked: same normalisation applies.
        let defs = StatusEngine::normalize(vec![
            incoming("open", "Open", true),
            incoming("closed", "Closed", true),
        ])
        .unwrap();
        assert_eq!(defs.iter().filter(|d| d.is_default).count(), 1);
        assert!(defs[0].is_default);
    }

    #[test]
    fn test_normalize_rejects_empty_label() {
        let result = StatusEngine::normalize(vec![incoming("open", "   ", true)]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_normalize_rejects_empty_set() {
        assert!(matches!(
            StatusEngine::normalize(vec![]),
            Err(Error::InvalidInput(_))
        ));
    }
}
