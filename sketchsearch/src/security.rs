//! Sketch authorization.

use crate::config::SecurityConfig;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, sketch_id: i64, user: &str, permission: Permission) -> bool;
}

/// Grants everything.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _sketch_id: i64, _user: &str, _permission: Permission) -> bool {
        true
    }
}

/// Per-sketch user lists from configuration. Write access implies read.
pub struct AclAuthorizer {
    /// Sketch id -> (readers, writers)
    sketches: HashMap<i64, (Vec<String>, Vec<String>)>,
}

impl AclAuthorizer {
    pub fn new(config: &SecurityConfig) -> Self {
        let sketches = config
            .sketches
            .iter()
            .map(|acl| (acl.sketch_id, (acl.read.clone(), acl.write.clone())))
            .collect();
        Self { sketches }
    }
}

fn listed(users: &[String], user: &str) -> bool {
    users.iter().any(|u| u == "*" || u == user)
}

#[async_trait]
impl Authorizer for AclAuthorizer {
    async fn authorize(&self, sketch_id: i64, user: &str, permission: Permission) -> bool {
        let Some((readers, writers)) = self.sketches.get(&sketch_id) else {
            return false;
        };
        match permission {
            Permission::Read => listed(readers, user) || listed(writers, user),
            Permission::Write => listed(writers, user),
        }
    }
}
