//! Role-based access control.

pub mod cache;
pub mod permission;
pub mod resolver;

pub use permission::{Permission, PermissionParseError, PermissionType, ResourceRef};
pub use resolver::PermissionResolver;
