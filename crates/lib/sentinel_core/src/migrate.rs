//! Embedded schema migrations for `PgAuthStore`.
//!
//! Creates the user, session, blacklist and RBAC tables and seeds the
//! `super` role with the `*:*` permission.

use sqlx::PgPool;

/// Run all embedded migrations against `pool`.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
