//! # Organization Directory
//!
//! Identity and reporting-line lookups used to turn approver specs into
//! concrete user ids. The engine only needs three queries; the real
//! implementation lives with the HR master data and is injected as an
//! `Arc<dyn OrgDirectory>`.

use crate::error::Result;
use crate::models::{TenantId, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[async_trait]
pub trait OrgDirectory: Send + Sync {
    /// Every active user in the tenant holding `role`
    async fn users_with_role(&self, tenant_id: &str, role: &str) -> Result<Vec<UserId>>;

    /// Every active user in the tenant at organizational `level`
    async fn users_at_level(&self, tenant_id: &str, level: u32) -> Result<Vec<UserId>>;

    /// Reporting chain of `user_id`, immediate manager first
    async fn manager_chain(&self, user_id: &str) -> Result<Vec<UserId>>;
}

/// A directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgUser {
    pub user_id: UserId,
    pub roles: BTreeSet<String>,
    pub level: Option<u32>,
    pub manager_id: Option<UserId>,
    pub active: bool,
}

impl OrgUser {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: BTreeSet::new(),
            level: None,
            manager_id: None,
            active: true,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn reporting_to(mut self, manager_id: impl Into<UserId>) -> Self {
        self.manager_id = Some(manager_id.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// In-memory directory populated up front
#[derive(Debug, Default)]
pub struct StaticOrgDirectory {
    users: RwLock<BTreeMap<UserId, (TenantId, OrgUser)>>,
}

impl StaticOrgDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, tenant_id: impl Into<TenantId>, user: OrgUser) {
        self.users
            .write()
            .insert(user.user_id.clone(), (tenant_id.into(), user));
    }

    pub fn with_user(self, tenant_id: impl Into<TenantId>, user: OrgUser) -> Self {
        self.add_user(tenant_id, user);
        self
    }

    pub fn set_active(&self, user_id: &str, active: bool) {
        if let Some((_, user)) = self.users.write().get_mut(user_id) {
            user.active = active;
        }
    }

    fn active_users_matching(&self, tenant_id: &str, predicate: impl Fn(&OrgUser) -> bool) -> Vec<UserId> {
        self.users
            .read()
            .values()
            .filter(|(tenant, user)| tenant == tenant_id && user.active && predicate(user))
            .map(|(_, user)| user.user_id.clone())
            .collect()
    }
}

#[async_trait]
impl OrgDirectory for StaticOrgDirectory {
    async fn users_with_role(&self, tenant_id: &str, role: &str) -> Result<Vec<UserId>> {
        Ok(self.active_users_matching(tenant_id, |user| user.roles.contains(role)))
    }

    async fn users_at_level(&self, tenant_id: &str, level: u32) -> Result<Vec<UserId>> {
        Ok(self.active_users_matching(tenant_id, |user| user.level == Some(level)))
    }

    async fn manager_chain(&self, user_id: &str) -> Result<Vec<UserId>> {
        let users = self.users.read();
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(user_id.to_string());

        let mut current = users.get(user_id).and_then(|(_, user)| user.manager_id.clone());
        while let Some(manager_id) = current {
            // Malformed reporting lines must not loop forever
            if !seen.insert(manager_id.clone()) {
                break;
            }
            current = users
                .get(&manager_id)
                .and_then(|(_, user)| user.manager_id.clone());
            chain.push(manager_id);
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticOrgDirectory {
        StaticOrgDirectory::new()
            .with_user("acme", OrgUser::new("emp").reporting_to("lead"))
            .with_user("acme", OrgUser::new("lead").with_level(2).reporting_to("head"))
            .with_user("acme", OrgUser::new("head").with_level(3).with_role("manager"))
            .with_user("acme", OrgUser::new("hr-1").with_role("hr"))
            .with_user("acme", OrgUser::new("hr-2").with_role("hr").inactive())
            .with_user("globex", OrgUser::new("hr-3").with_role("hr"))
    }

    #[tokio::test]
    async fn test_role_lookup_is_tenant_scoped_and_active_only() {
        let directory = directory();
        let hr = directory.users_with_role("acme", "hr").await.unwrap();
        assert_eq!(hr, vec!["hr-1".to_string()]);
    }

    #[tokio::test]
    async fn test_manager_chain_immediate_manager_first() {
        let directory = directory();
        let chain = directory.manager_chain("emp").await.unwrap();
        assert_eq!(chain, vec!["lead".to_string(), "head".to_string()]);
        assert!(directory.manager_chain("head").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manager_chain_stops_on_cycles() {
        let directory = StaticOrgDirectory::new()
            .with_user("acme", OrgUser::new("a").reporting_to("b"))
            .with_user("acme", OrgUser::new("b").reporting_to("a"));
        let chain = directory.manager_chain("a").await.unwrap();
        assert_eq!(chain, vec!["b".to_string()]);
    }
}
