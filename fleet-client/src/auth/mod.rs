use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{config::Config, errors::ExpectedError, server::ApiClient};

const TOKEN_ENV: &str = "FLEET_API_TOKEN";

const LOGIN_REQUIRED: &str = "You have to log in to continue\n\n\
Run the following command to go through the login wizard:\n\n  $ fleet login";

/// API token persisted next to the config file.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(Config::config_dir()?.join("token")))
    }

    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let token = std::fs::read_to_string(&self.path).context("Failed to read token file")?;
        let token = token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn store(&self, token: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        std::fs::write(&self.path, token.trim()).context("Failed to write token file")?;
        Ok(())
    }

    /// Remove the stored token. Missing tokens are fine.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        Ok(true)
    }
}

pub struct AuthManager;

impl AuthManager {
    /// Token from `FLEET_API_TOKEN`, else the stored one.
    pub fn get_token() -> Result<Option<String>> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                debug!("Using token from {}", TOKEN_ENV);
                return Ok(Some(token.trim().to_string()));
            }
        }
        TokenStore::default_location()?.load()
    }

    pub fn require_token() -> Result<String> {
        require_login(Self::get_token()?)
    }
}

/// Permission guard for commands that talk to the API on the user's behalf.
pub fn require_login(token: Option<String>) -> Result<String> {
    token.ok_or_else(|| ExpectedError::new(LOGIN_REQUIRED).into())
}

pub async fn login(config: &Config, token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ExpectedError::new("The token must not be empty").into());
    }

    let client = ApiClient::from_config(config, Some(token.to_string()))?;
    let Some(username) = client.whoami().await? else {
        return Err(ExpectedError::new("The token was rejected by the API").into());
    };

    TokenStore::default_location()?.store(token)?;
    info!("Stored token for {}", username);
    println!("Successfully logged in as: {}", username);
    Ok(())
}

pub async fn logout() -> Result<()> {
    if TokenStore::default_location()?.clear()? {
        println!("Logged out");
    } else {
        println!("Not logged in");
    }
    Ok(())
}

pub async fn whoami(client: &ApiClient) -> Result<()> {
    match client.whoami().await? {
        Some(username) => println!("{}", username),
        None => return Err(ExpectedError::new(LOGIN_REQUIRED).into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::is_expected;

    #[test]
    fn test_token_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("fleet").join("token"));
        assert_eq!(store.load().unwrap(), None);

        store.store("  secret-token\n").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("secret-token"));

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_blank_token_file_is_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "\n").unwrap();
        let store = TokenStore::new(path);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_require_login() {
        assert_eq!(require_login(Some("t".into())).unwrap(), "t");

        let err = require_login(None).unwrap_err();
        assert!(is_expected(&err));
        assert!(err.to_string().starts_with("You have to log in to continue"));
        assert!(err.to_string().ends_with("$ fleet login"));
    }
}
