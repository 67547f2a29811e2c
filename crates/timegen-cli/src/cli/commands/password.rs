//! Password reset command handlers.

use anyhow::Result;

use crate::cli::{Client, require_password};

pub async fn forgot(client: &Client, email: &str) -> Result<()> {
    let token = client.auth.request_password_reset(email).await?;
    println!("Password reset requested for {}", email.trim());
    if let Some(token) = token {
        println!("Reset token: {token}");
        println!("Run `timegen password reset --token {token}` to choose a new password.");
    }
    Ok(())
}

pub async fn reset(client: &Client, token: &str, password: Option<&str>) -> Result<()> {
    let password = require_password(password)?;
    client.auth.reset_password(token, password).await?;
    println!("Password updated. Run `timegen login` to sign in.");
    Ok(())
}
