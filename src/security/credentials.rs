//! Repository endpoint and credentials
//!
//! Passwords and tokens are held as [`SecretString`] so they never show up in
//! `Debug` output, and are masked before anything is logged.

use crate::core::config::RepositoryConfig;
use crate::core::error::PublishError;
use secrecy::{ExposeSecret, SecretString};

/// Authentication for the remote repository
#[derive(Debug, Clone)]
pub enum Credentials {
    Anonymous,
    Basic {
        user: String,
        password: SecretString,
    },
    /// Access token, optionally bound to a user name
    Token {
        user: Option<String>,
        token: SecretString,
    },
}

impl Credentials {
    pub fn user(&self) -> Option<&str> {
        match self {
            Credentials::Anonymous => None,
            Credentials::Basic { user, .. } => Some(user),
            Credentials::Token { user, .. } => user.as_deref(),
        }
    }

    /// Password or token
    pub fn secret(&self) -> Option<&SecretString> {
        match self {
            Credentials::Anonymous => None,
            Credentials::Basic { password, .. } => Some(password),
            Credentials::Token { token, .. } => Some(token),
        }
    }
}

/// Base URL plus credentials; immutable for one command
#[derive(Debug, Clone)]
pub struct RepositoryEndpoint {
    url: String,
    credentials: Credentials,
}

impl RepositoryEndpoint {
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        Self { url, credentials }
    }

    /// Build from the merged configuration
    ///
    /// An access token wins over user/password. A user without a password
    /// (or the reverse) is rejected.
    pub fn from_config(config: Option<&RepositoryConfig>) -> Result<Self, PublishError> {
        let config = config
            .ok_or_else(|| PublishError::Config("repository section is missing".to_string()))?;
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| PublishError::Config("repository.url is required".to_string()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PublishError::Config(format!(
                "repository.url must be an http(s) URL: {}",
                url
            )));
        }

        let user = config.user.clone().filter(|u| !u.is_empty());
        let password = config.password.clone().filter(|p| !p.is_empty());
        let token = config.access_token.clone().filter(|t| !t.is_empty());

        let credentials = match (token, user, password) {
            (Some(token), user, _) => Credentials::Token {
                user,
                token: SecretString::from(token),
            },
            (None, Some(user), Some(password)) => Credentials::Basic {
                user,
                password: SecretString::from(password),
            },
            (None, None, None) => Credentials::Anonymous,
            (None, _, _) => {
                return Err(PublishError::Config(
                    "repository.user and repository.password must be set together".to_string(),
                ));
            }
        };

        Ok(Self::new(url.trim(), credentials))
    }

    /// Base URL, always ending with `/`
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Registry host of the endpoint, used for container login
    pub fn host(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        rest.split('/').next().unwrap_or(rest)
    }

    /// Go proxy URL for a repository, with credentials embedded
    pub fn go_proxy_url(&self, target_repo: &str) -> String {
        let (scheme, rest) = self
            .url
            .split_once("://")
            .unwrap_or(("https", self.url.as_str()));
        let auth = match (self.credentials.user(), self.credentials.secret()) {
            (Some(user), Some(secret)) => format!("{}:{}@", user, secret.expose_secret()),
            _ => String::new(),
        };
        format!("{}://{}{}api/go/{}", scheme, auth, rest, target_repo)
    }

    /// Replace the endpoint secret in `text` with its masked form
    pub fn mask(&self, text: &str) -> String {
        match self.credentials.secret() {
            Some(secret) if !secret.expose_secret().is_empty() => {
                let secret = secret.expose_secret();
                text.replace(secret, &mask_secret(secret))
            }
            _ => text.to_string(),
        }
    }
}

/// Masks a secret for safe logging
///
/// Shows only the first 3 and last 3 characters for identification purposes.
/// Secrets shorter than 10 characters are fully masked as "****".
///
/// ```
/// use artifact_publisher::security::mask_secret;
///
/// assert_eq!(mask_secret("abcdef123456"), "abc...456");
/// assert_eq!(mask_secret("short"), "****");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 10 {
        return "****".to_string();
    }
    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 3..].iter().collect();
    format!("{}...{}", prefix, suffix)
}
