//! Container image references (`[registry/]repository[:tag][@digest]`)

use crate::core::error::PublishError;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(text: &str) -> Result<Self, PublishError> {
        let text = text.trim();
        let invalid = |reason: &str| {
            PublishError::Config(format!("Invalid image reference '{}': {}", text, reason))
        };
        if text.is_empty() {
            return Err(invalid("empty"));
        }
        if text.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let (name, digest) = match text.split_once('@') {
            Some((name, digest)) if !digest.is_empty() => (name, Some(digest.to_string())),
            Some(_) => return Err(invalid("empty digest")),
            None => (text, None),
        };

        // A tag separator only counts after the last path separator; earlier
        // colons belong to a registry port.
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(offset) => {
                let split = last_slash + offset;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    return Err(invalid("empty tag"));
                }
                (&name[..split], Some(tag.to_string()))
            }
            None => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((host, rest)) if looks_like_registry(host) => (Some(host.to_string()), rest),
            _ => (None, name),
        };
        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("empty repository path"));
        }

        Ok(Self {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Whether the reference names a specific tag or digest
    pub fn has_explicit_tag(&self) -> bool {
        self.tag.is_some() || self.digest.is_some()
    }

    /// The reference with `:latest` appended when no tag or digest is given
    pub fn normalized(&self) -> Self {
        let mut normalized = self.clone();
        if !normalized.has_explicit_tag() {
            normalized.tag = Some(DEFAULT_TAG.to_string());
        }
        normalized
    }

    /// Tag used for repository storage paths
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(DEFAULT_TAG)
    }

    /// Image path inside the registry, without the host
    pub fn repository_path(&self) -> &str {
        &self.repository
    }

    /// Host to log in to; Docker Hub when absent
    pub fn registry_host(&self) -> &str {
        self.registry.as_deref().unwrap_or("docker.io")
    }
}

fn looks_like_registry(host: &str) -> bool {
    host.contains('.') || host.contains(':') || host == "localhost"
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
