//! Tenant/permission guard
//!
//! Resolves a user's memberships into per-company permission sets (role
//! permissions merged with user-specific extra grants) and answers
//! permission checks. Super admins bypass every check. Enforcement happens
//! at three layers: route entry (these checks), company-scoped store
//! queries, and response filtering.

use opsdesk_common::types::{CompanyId, UserId};
use opsdesk_common::{Error, Result};
use opsdesk_storage::models::User;
use opsdesk_storage::repository::{MembershipGrant, UserRepository};
use std::collections::{HashMap, HashSet};

/// Permission slugs checked by the routes
pub mod perms {
    pub const PORTAL_ACCESS: &str = "portal.access";
    pub const TICKETS_MANAGE: &str = "tickets.manage";
    pub const HELPDESK_TECHNICIAN: &str = "helpdesk.technician";
    pub const AUTOMATION_MANAGE: &str = "automation.manage";
    pub const SETTINGS_MANAGE: &str = "settings.manage";
    pub const COMPANY_ADMIN: &str = "company.admin";
}

/// A user's merged permission sets, one per active membership
#[derive(Debug, Clone)]
pub struct ResolvedPermissions {
    user_id: UserId,
    super_admin: bool,
    grants: HashMap<CompanyId, HashSet<String>>,
}

impl ResolvedPermissions {
    /// Merge membership grants into per-company sets
    pub fn from_grants(user_id: UserId, super_admin: bool, grants: Vec<MembershipGrant>) -> Self {
        let mut merged: HashMap<CompanyId, HashSet<String>> = HashMap::new();

        for grant in grants {
            let set = merged.entry(grant.company_id).or_default();
            set.extend(grant.role_permissions);
            set.extend(grant.extra_permissions);
        }

        Self {
            user_id,
            super_admin,
            grants: merged,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_super_admin(&self) -> bool {
        self.super_admin
    }

    /// Check a permission. `company_id = None` refers to unscoped entities
    /// and is satisfied by holding the permission in any company.
    pub fn has(&self, company_id: Option<CompanyId>, permission: &str) -> bool {
        if self.super_admin {
            return true;
        }

        match company_id {
            Some(company) => self
                .grants
                .get(&company)
                .map(|set| set.contains(permission))
                .unwrap_or(false),
            None => self.has_any(permission),
        }
    }

    /// Whether the permission is held in at least one company
    pub fn has_any(&self, permission: &str) -> bool {
        self.super_admin || self.grants.values().any(|set| set.contains(permission))
    }

    /// Companies where the permission is held (tenant scoping for list
    /// queries). `None` means unscoped: the caller is a super admin.
    pub fn companies_with(&self, permission: &str) -> Option<Vec<CompanyId>> {
        if self.super_admin {
            return None;
        }

        Some(
            self.grants
                .iter()
                .filter(|(_, set)| set.contains(permission))
                .map(|(company, _)| *company)
                .collect(),
        )
    }

    /// Check a permission, turning a miss into `Forbidden`
    pub fn require(&self, company_id: Option<CompanyId>, permission: &str) -> Result<()> {
        if self.has(company_id, permission) {
            return Ok(());
        }
        Err(Error::Forbidden(format!(
            "Missing permission '{}'",
            permission
        )))
    }
}

/// Resolves principals into permission sets
#[derive(Clone)]
pub struct PermissionGuard {
    users: UserRepository,
}

impl PermissionGuard {
    /// Create a guard over the user repository
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }

    /// Load and merge the memberships of a user
    pub async fn resolve(&self, user: &User) -> Result<ResolvedPermissions> {
        let grants = self.users.grants_for_user(user.id).await?;
        Ok(ResolvedPermissions::from_grants(
            user.id,
            user.is_super_admin,
            grants,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn grant(company: CompanyId, role: &[&str], extra: &[&str]) -> MembershipGrant {
        MembershipGrant {
            company_id: company,
            role_slug: "tester".to_string(),
            role_permissions: role.iter().map(|s| s.to_string()).collect(),
            extra_permissions: extra.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_role_and_extra_permissions_merge() {
        let company = Uuid::new_v4();
        let resolved = ResolvedPermissions::from_grants(
            Uuid::new_v4(),
            false,
            vec![grant(company, &["portal.access"], &["tickets.manage"])],
        );

        assert!(resolved.has(Some(company), "portal.access"));
        assert!(resolved.has(Some(company), "tickets.manage"));
        assert!(!resolved.has(Some(company), "automation.manage"));
    }

    #[test]
    fn test_permissions_are_company_scoped() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let resolved = ResolvedPermissions::from_grants(
            Uuid::new_v4(),
            false,
            vec![grant(a, &["tickets.manage"], &[])],
        );

        assert!(resolved.has(Some(a), "tickets.manage"));
        assert!(!resolved.has(Some(b), "tickets.manage"));
        // Unscoped entities accept the permission from any company
        assert!(resolved.has(None, "tickets.manage"));
    }

    #[test]
    fn test_super_admin_bypasses_checks() {
        let resolved = ResolvedPermissions::from_grants(Uuid::new_v4(), true, vec![]);
        assert!(resolved.has(Some(Uuid::new_v4()), "anything.at_all"));
        assert!(resolved.companies_with("tickets.manage").is_none());
    }

    #[test]
    fn test_companies_with_filters_by_permission() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let resolved = ResolvedPermissions::from_grants(
            Uuid::new_v4(),
            false,
            vec![
                grant(a, &["portal.access", "tickets.manage"], &[]),
                grant(b, &["portal.access"], &[]),
            ],
        );

        let scoped = resolved.companies_with("tickets.manage").unwrap();
        assert_eq!(scoped, vec![a]);

        let mut portal = resolved.companies_with("portal.access").unwrap();
        portal.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(portal, expected);
    }

    #[test]
    fn test_require_maps_to_forbidden() {
        let resolved = ResolvedPermissions::from_grants(Uuid::new_v4(), false, vec![]);
        assert!(matches!(
            resolved.require(None, "tickets.manage"),
            Err(Error::Forbidden(_))
        ));
    }
}
