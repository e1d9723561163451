use sqlx::PgPool;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::security;
use crate::core::time::primitive_now_utc;
use crate::repositories;

/// Creates the configured admin account, or repairs its password, admin
/// flag and active flag when the account already exists.
pub(crate) async fn ensure_superuser(settings: &Settings, db: &PgPool) -> anyhow::Result<()> {
    let admin = settings.admin();
    if admin.first_superuser_password.is_empty() {
        tracing::warn!("FIRST_SUPERUSER_PASSWORD not configured; skipping superuser creation");
        return Ok(());
    }

    let username = &admin.first_superuser_username;
    let now = primitive_now_utc();

    if let Some(user) = repositories::users::find_by_username(db, username).await? {
        let password_matches =
            security::verify_password(&admin.first_superuser_password, &user.hashed_password)
                .unwrap_or(false);

        if password_matches && user.is_admin && user.is_active {
            tracing::info!(username = %username, "Default superuser already up to date");
            return Ok(());
        }

        let hashed_password = if password_matches {
            user.hashed_password
        } else {
            security::hash_password(&admin.first_superuser_password)?
        };

        sqlx::query(
            "UPDATE users
             SET hashed_password = $1, is_admin = TRUE, is_active = TRUE, updated_at = $2
             WHERE id = $3",
        )
        .bind(hashed_password)
        .bind(now)
        .bind(&user.id)
        .execute(db)
        .await?;

        tracing::info!(username = %username, "Updated default superuser");
        return Ok(());
    }

    repositories::users::create(
        db,
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username,
            hashed_password: security::hash_password(&admin.first_superuser_password)?,
            full_name: "Administrator",
            is_admin: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await?;

    tracing::info!(username = %username, "Created default superuser");
    Ok(())
}
