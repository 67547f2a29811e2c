//! Account command handlers.

use anyhow::Result;

use crate::cli::{Client, require_password};

pub async fn login(client: &Client, email: &str, password: Option<&str>) -> Result<()> {
    let password = require_password(password)?;
    let user = client.auth.login(email, password).await?;
    println!("Logged in as {}", user.display_name());
    Ok(())
}

pub async fn register(
    client: &Client,
    email: &str,
    name: &str,
    password: Option<&str>,
) -> Result<()> {
    let password = require_password(password)?;
    let user = client.auth.register(email, password, name).await?;
    println!("Registered and logged in as {}", user.display_name());
    Ok(())
}

pub async fn logout(client: &Client) -> Result<()> {
    client.auth.logout().await?;
    println!("Logged out");
    Ok(())
}

pub fn whoami(client: &Client) {
    match client.auth.current_user() {
        Some(user) if client.auth.is_authenticated() => {
            match user.name.as_deref().filter(|n| !n.trim().is_empty()) {
                Some(name) => println!("{name} <{}>", user.email),
                None => println!("{}", user.email),
            }
            if let Some(role) = user.role.as_deref() {
                println!("Role: {role}");
            }
        }
        _ => println!("Not logged in"),
    }
}
