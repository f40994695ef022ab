//! Route paths.

pub const GET_HEALTH: &str = "/health";

pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_VERIFY_EMAIL: &str = "/auth/verify-email";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const GET_AUTH_ME: &str = "/auth/me";

pub const POST_AUTH_MFA_ENROLL: &str = "/auth/mfa/enroll";
pub const POST_AUTH_MFA_CONFIRM: &str = "/auth/mfa/confirm";
pub const POST_AUTH_MFA_DISABLE: &str = "/auth/mfa/disable";

pub const AUTH_SESSIONS: &str = "/auth/sessions";
pub const DELETE_AUTH_SESSIONS_ID: &str = "/auth/sessions/{id}";

pub const GET_AUTH_PERMISSIONS_CHECK: &str = "/auth/permissions/check";

pub const ADMIN_USERS_ID_SESSIONS: &str = "/admin/users/{id}/sessions";

pub const POST_INTERNAL_INTROSPECT: &str = "/internal/introspect";
