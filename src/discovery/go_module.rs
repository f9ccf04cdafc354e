//! Go module discovery - reads the module path and requirements from go.mod

use crate::core::error::PublishError;
use crate::core::traits::DependencyId;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const GO_MOD_FILE: &str = "go.mod";

/// Dependency selector meaning "every module the project requires"
pub const ALL_DEPENDENCIES: &str = "ALL";

/// A required module from go.mod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub id: DependencyId,
    pub indirect: bool,
}

/// Parsed go.mod of a module rooted at `dir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoModule {
    pub dir: PathBuf,
    pub module_path: String,
    pub requirements: Vec<Requirement>,
}

impl GoModule {
    /// Load and parse `<dir>/go.mod`; re-reads the file on every call
    pub async fn load(dir: &Path) -> Result<Self, PublishError> {
        let path = dir.join(GO_MOD_FILE);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| PublishError::io(&path, e))?;
        Self::parse(&content, dir)
    }

    pub fn parse(content: &str, dir: &Path) -> Result<Self, PublishError> {
        let path = dir.join(GO_MOD_FILE);
        let mut module_path = None;
        let mut requirements = Vec::new();
        let mut block: Option<String> = None;

        for (index, raw) in content.lines().enumerate() {
            let (code, comment) = match raw.split_once("//") {
                Some((code, comment)) => (code.trim(), comment.trim()),
                None => (raw.trim(), ""),
            };
            if code.is_empty() {
                continue;
            }

            if let Some(directive) = &block {
                if code == ")" {
                    block = None;
                } else if directive == "require" {
                    requirements.push(parse_requirement(code, comment, &path, index + 1)?);
                }
                continue;
            }

            let (directive, rest) = code
                .split_once(char::is_whitespace)
                .map(|(d, r)| (d, r.trim()))
                .unwrap_or((code, ""));

            if rest == "(" {
                block = Some(directive.to_string());
                continue;
            }

            match directive {
                "module" => module_path = Some(unquote(rest).to_string()),
                "require" => {
                    requirements.push(parse_requirement(rest, comment, &path, index + 1)?)
                }
                _ => {}
            }
        }

        if block.is_some() {
            return Err(PublishError::Parse {
                path,
                line: content.lines().count(),
                message: "unterminated directive block".to_string(),
            });
        }

        let module_path = module_path.ok_or_else(|| PublishError::Parse {
            path: path.clone(),
            line: 1,
            message: "missing module directive".to_string(),
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            module_path,
            requirements,
        })
    }

    /// All required modules, in go.mod order
    pub fn dependencies(&self) -> Vec<DependencyId> {
        self.requirements.iter().map(|r| r.id.clone()).collect()
    }

    /// Expand a comma-separated dependency selector
    ///
    /// `ALL` selects every requirement; otherwise each item must be
    /// `name:version`. Duplicates are kept as given.
    pub fn select_dependencies(&self, selector: &str) -> Result<Vec<DependencyId>, PublishError> {
        let mut selected = Vec::new();
        for item in selector.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if item.eq_ignore_ascii_case(ALL_DEPENDENCIES) {
                selected.extend(self.dependencies());
            } else {
                selected.push(item.parse()?);
            }
        }
        Ok(selected)
    }
}

fn parse_requirement(
    spec: &str,
    comment: &str,
    path: &Path,
    line: usize,
) -> Result<Requirement, PublishError> {
    let mut parts = spec.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(version), None) => Ok(Requirement {
            id: DependencyId::new(unquote(name), unquote(version)),
            indirect: comment == "indirect",
        }),
        _ => Err(PublishError::Parse {
            path: path.to_path_buf(),
            line,
            message: format!("malformed require directive: {}", spec),
        }),
    }
}

/// Escape a module path for proxy and cache layouts (`A` becomes `!a`)
pub fn escape_module_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn unquote(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '`')
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_MOD: &str = r#"module github.com/acme/hello

go 1.21

require github.com/pkg/errors v0.9.1

require (
	rsc.io/quote v1.5.2
	golang.org/x/text v0.3.0 // indirect
)

replace rsc.io/sampler => ../sampler

exclude (
	golang.org/x/net v0.0.1
)
"#;

    #[test]
    fn test_parse_go_mod() {
        let module = GoModule::parse(GO_MOD, Path::new("/src/hello")).unwrap();

        assert_eq!(module.module_path, "github.com/acme/hello");
        assert_eq!(
            module.dependencies(),
            vec![
                DependencyId::new("github.com/pkg/errors", "v0.9.1"),
                DependencyId::new("rsc.io/quote", "v1.5.2"),
                DependencyId::new("golang.org/x/text", "v0.3.0"),
            ]
        );
        assert!(module.requirements[2].indirect);
        assert!(!module.requirements[1].indirect);
    }

    #[test]
    fn test_select_all_and_explicit() {
        let module = GoModule::parse(GO_MOD, Path::new(".")).unwrap();

        assert_eq!(module.select_dependencies("ALL").unwrap().len(), 3);
        assert_eq!(module.select_dependencies("").unwrap(), vec![]);

        let explicit = module
            .select_dependencies("a.io/x:v1.0.0, a.io/x:v1.0.0")
            .unwrap();
        assert_eq!(explicit.len(), 2, "duplicates are kept");
    }

    #[test]
    fn test_missing_module_directive() {
        let err = GoModule::parse("go 1.21\n", Path::new(".")).unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn test_unterminated_require_block() {
        let err = GoModule::parse("module a\nrequire (\n\tb v1.0.0\n", Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_escape_module_path() {
        assert_eq!(
            escape_module_path("github.com/Azure/azure-sdk"),
            "github.com/!azure/azure-sdk"
        );
        assert_eq!(escape_module_path("rsc.io/quote"), "rsc.io/quote");
    }

    #[tokio::test]
    async fn test_load_reads_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        tokio::fs::write(dir.path().join(GO_MOD_FILE), GO_MOD)
            .await
            .unwrap();

        let module = GoModule::load(dir.path()).await.unwrap();

        assert_eq!(module.dir, dir.path());
        assert_eq!(module.requirements.len(), 3);
    }
}
