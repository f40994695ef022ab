//! RBAC records as stored.
//!
//! Roles, resources and permissions are administered elsewhere; the engine
//! only reads them to resolve grants.

use uuid::Uuid;

/// Name of the role that bypasses every permission check.
pub const SUPER_ROLE: &str = "super";

/// Name of the permission that bypasses every permission check.
pub const SUPER_PERMISSION: &str = "*:*";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
}

/// Stored permission row. `kind` is one of `read`, `write`, `admin`, `*`;
/// a null `resource_id` means global.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PermissionRecord {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub resource_id: Option<Uuid>,
}

/// Everything the resolver needs about one user, read in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserGrants {
    pub roles: Vec<String>,
    /// Union of direct and role-inherited permission names.
    pub permissions: Vec<String>,
}
