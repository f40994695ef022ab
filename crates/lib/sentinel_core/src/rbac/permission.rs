//! Structured `type:resource` permissions.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Permission type. `Read < Write < Admin`; `Wildcard` covers all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionType {
    Read,
    Write,
    Admin,
    Wildcard,
}

impl PermissionType {
    /// Position in the hierarchy. `None` for the wildcard, which sits
    /// outside the ordering.
    fn rank(self) -> Option<u8> {
        match self {
            PermissionType::Read => Some(0),
            PermissionType::Write => Some(1),
            PermissionType::Admin => Some(2),
            PermissionType::Wildcard => None,
        }
    }

    /// Whether holding `self` grants `required` on the same resource.
    pub fn covers(self, required: PermissionType) -> bool {
        match (self.rank(), required.rank()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(held), Some(req)) => held >= req,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionType::Read => "read",
            PermissionType::Write => "write",
            PermissionType::Admin => "admin",
            PermissionType::Wildcard => "*",
        }
    }
}

/// The resource half of a permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    /// `*`, every resource.
    Any,
    Named(String),
}

impl ResourceRef {
    pub fn covers(&self, required: &ResourceRef) -> bool {
        match (self, required) {
            (ResourceRef::Any, _) => true,
            (ResourceRef::Named(_), ResourceRef::Any) => false,
            (ResourceRef::Named(held), ResourceRef::Named(req)) => held == req,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionParseError {
    #[error("permission must have the form type:resource")]
    MissingSeparator,
    #[error("unknown permission type '{0}'")]
    UnknownType(String),
    #[error("permission resource must not be empty")]
    EmptyResource,
}

/// A parsed permission such as `write:orders`, `*:orders` or `*:*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission {
    pub kind: PermissionType,
    pub resource: ResourceRef,
}

impl Permission {
    pub fn new(kind: PermissionType, resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self {
            kind,
            resource: if resource == "*" {
                ResourceRef::Any
            } else {
                ResourceRef::Named(resource)
            },
        }
    }

    /// `*:*`.
    pub fn is_superuser(&self) -> bool {
        self.kind == PermissionType::Wildcard && self.resource == ResourceRef::Any
    }

    /// Whether holding `self` is enough for `required`.
    pub fn satisfies(&self, required: &Permission) -> bool {
        self.resource.covers(&required.resource) && self.kind.covers(required.kind)
    }
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, resource) = s
            .trim()
            .split_once(':')
            .ok_or(PermissionParseError::MissingSeparator)?;
        let kind = match kind {
            "read" => PermissionType::Read,
            "write" => PermissionType::Write,
            "admin" => PermissionType::Admin,
            "*" => PermissionType::Wildcard,
            other => return Err(PermissionParseError::UnknownType(other.to_string())),
        };
        if resource.is_empty() {
            return Err(PermissionParseError::EmptyResource);
        }
        Ok(Permission::new(kind, resource))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            ResourceRef::Any => write!(f, "{}:*", self.kind.as_str()),
            ResourceRef::Named(name) => write!(f, "{}:{}", self.kind.as_str(), name),
        }
    }
}
