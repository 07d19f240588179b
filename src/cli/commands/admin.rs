use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_grant_admin(config: Config, username: &str) -> anyhow::Result<()> {
    let username = username.trim();
    if username.is_empty() {
        println!("Usage: eventdesk grant-admin <username>");
        return Ok(());
    }

    let state = SharedState::new(config).await?;

    match state.auth_service.grant_admin(username).await {
        Ok(true) => println!("✓ Granted admin role to '{username}'"),
        Ok(false) => println!("'{username}' is already an admin."),
        Err(crate::services::AuthError::UserNotFound) => {
            println!("User '{username}' not found.");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
