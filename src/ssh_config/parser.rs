//! Line-oriented OpenSSH client configuration parser

use regex::Regex;
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// One `Key value` line inside a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Lowercased keyword
    pub key: String,
    pub value: String,
    pub line: usize,
}

#[derive(Debug, Clone)]
struct HostPattern {
    negated: bool,
    regex: Regex,
}

impl HostPattern {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (negated, glob) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let translated = regex::escape(glob)
            .replace(r"\*", ".*")
            .replace(r"\?", ".");
        let regex = Regex::new(&format!("^{translated}$")).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: raw.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self { negated, regex })
    }
}

#[derive(Debug, Clone)]
struct HostBlock {
    patterns: Vec<HostPattern>,
    directives: Vec<Directive>,
}

impl HostBlock {
    fn matches(&self, alias: &str) -> bool {
        let mut matched = false;
        for pattern in &self.patterns {
            if pattern.regex.is_match(alias) {
                if pattern.negated {
                    return false;
                }
                matched = true;
            }
        }
        matched
    }
}

/// A parsed ssh_config file
#[derive(Debug, Clone)]
pub struct SshConfigFile {
    path: PathBuf,
    blocks: Vec<HostBlock>,
}

impl SshConfigFile {
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self, ConfigError> {
        let path = path.into();

        // Directives before the first Host line apply to every host
        let mut blocks = vec![HostBlock {
            patterns: vec![HostPattern::parse("*")?],
            directives: Vec::new(),
        }];

        for (index, raw_line) in content.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = split_directive(line);
            let key = key.to_lowercase();

            match key.as_str() {
                "host" => {
                    let patterns = value
                        .split_whitespace()
                        .map(|p| HostPattern::parse(unquote(p)))
                        .collect::<Result<Vec<_>, _>>()?;
                    if patterns.is_empty() {
                        return Err(ConfigError::MissingValue {
                            key,
                            file: path,
                            line: line_number,
                        });
                    }
                    blocks.push(HostBlock {
                        patterns,
                        directives: Vec::new(),
                    });
                }
                "match" => {
                    tracing::warn!(
                        "Match blocks are not supported, ignoring {}:{}",
                        path.display(),
                        line_number
                    );
                    blocks.push(HostBlock {
                        patterns: Vec::new(),
                        directives: Vec::new(),
                    });
                }
                _ => {
                    if let Some(block) = blocks.last_mut() {
                        block.directives.push(Directive {
                            key,
                            value: unquote(value).to_string(),
                            line: line_number,
                        });
                    }
                }
            }
        }

        Ok(Self { path, blocks })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directives of every block matching `alias`, in file order
    pub fn matching<'a>(&'a self, alias: &'a str) -> impl Iterator<Item = &'a Directive> + 'a {
        self.blocks
            .iter()
            .filter(move |block| block.matches(alias))
            .flat_map(|block| block.directives.iter())
    }
}

/// Split `Key value` or `Key=value`
fn split_directive(line: &str) -> (&str, &str) {
    let key_end = line
        .find(|c: char| c.is_whitespace() || c == '=')
        .unwrap_or(line.len());
    let key = &line[..key_end];

    let rest = line[key_end..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    (key, rest)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# global defaults
Compression yes

Host web-*
    HostName %h.internal
    User deploy
    Port=2222

Host db !db-legacy
    IdentityFile "~/.ssh/db key"

Match host legacy
    User nobody
"#;

    fn keys(file: &SshConfigFile, alias: &str) -> Vec<(String, String)> {
        file.matching(alias)
            .map(|d| (d.key.clone(), d.value.clone()))
            .collect()
    }

    #[test]
    fn test_directive_splitting() {
        assert_eq!(split_directive("Port 22"), ("Port", "22"));
        assert_eq!(split_directive("Port=22"), ("Port", "22"));
        assert_eq!(split_directive("Port = 22"), ("Port", "22"));
        assert_eq!(split_directive("Compression"), ("Compression", ""));
    }

    #[test]
    fn test_wildcard_block_matches() {
        let file = SshConfigFile::parse("/tmp/config", SAMPLE).unwrap();
        let found = keys(&file, "web-1");

        assert_eq!(found[0], ("compression".to_string(), "yes".to_string()));
        assert!(found.contains(&("hostname".to_string(), "%h.internal".to_string())));
        assert!(found.contains(&("port".to_string(), "2222".to_string())));
        assert!(!found.iter().any(|(k, _)| k == "identityfile"));
    }

    #[test]
    fn test_quoted_values_and_negation() {
        let file = SshConfigFile::parse("/tmp/config", SAMPLE).unwrap();
        assert!(keys(&file, "db")
            .contains(&("identityfile".to_string(), "~/.ssh/db key".to_string())));
        assert!(!keys(&file, "db-legacy").iter().any(|(k, _)| k == "identityfile"));
    }

    #[test]
    fn test_match_blocks_are_ignored() {
        let file = SshConfigFile::parse("/tmp/config", SAMPLE).unwrap();
        assert!(!keys(&file, "legacy").iter().any(|(_, v)| v == "nobody"));
    }

    #[test]
    fn test_directive_line_numbers() {
        let file = SshConfigFile::parse("/tmp/config", SAMPLE).unwrap();
        let user = file.matching("web-9").find(|d| d.key == "user").unwrap();
        assert_eq!(user.line, 7);
    }
}
