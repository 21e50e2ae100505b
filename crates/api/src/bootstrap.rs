//! First-run superadmin

use helpdesk_shared::{HelpdeskStore, NewTechnician, NewUser, StoreError, User, UserRole};

use crate::{
    auth::{hash_password, PasswordError},
    config::BootstrapAdmin,
};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Create the superadmin (and a technician record linked to it) when no
/// user exists yet. Returns the new account, or `None` if users already
/// exist.
pub async fn ensure_admin(
    store: &dyn HelpdeskStore,
    admin: &BootstrapAdmin,
) -> Result<Option<User>, BootstrapError> {
    if store.count_users().await? > 0 {
        return Ok(None);
    }

    let email = admin.email.trim().to_lowercase();
    let user = store
        .create_user(NewUser {
            name: admin.name.clone(),
            email: email.clone(),
            password_hash: hash_password(&admin.password)?,
            role: UserRole::Superadmin,
        })
        .await?;

    let tech = store
        .create_technician(NewTechnician {
            display_name: admin.name.clone(),
            email: Some(email),
            user_id: Some(user.id),
            active: true,
        })
        .await?;

    tracing::info!(
        user_id = %user.id,
        technician_id = %tech.id,
        "Bootstrap superadmin created"
    );

    Ok(Some(user))
}
