// Compute node model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::DomainError;

/// Default SSH port for worker and coordinator nodes
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Platform family of a node. Decides path separators and which template set applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
}

impl Platform {
    /// Platform of the machine running the orchestrator.
    ///
    /// Every non-Windows host uses the Linux path convention and template set.
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn separator(self) -> char {
        match self {
            Platform::Windows => '\\',
            Platform::Linux => '/',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            other => Err(DomainError::UnsupportedPlatform(other.to_string())),
        }
    }
}

/// A worker (or the coordinator) as described by the run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNode {
    pub name: String,
    pub platform: Platform,
    /// Overrides the template's tool-location command for this node
    #[serde(default)]
    pub tool_location: Option<String>,
    /// Overrides the Write step's format for this node
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl ComputeNode {
    pub fn new(name: impl Into<String>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            platform,
            tool_location: None,
            output_format: None,
            ssh_port: DEFAULT_SSH_PORT,
        }
    }

    /// Parse the compact `name:platform[:port]` form used on the command line
    pub fn parse_entry(entry: &str) -> Result<Self, DomainError> {
        let mut parts = entry.trim().split(':');
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| DomainError::InvalidArgument(format!("missing node name in '{entry}'")))?;
        let platform = parts
            .next()
            .ok_or_else(|| DomainError::InvalidArgument(format!("missing platform in '{entry}'")))?
            .parse::<Platform>()?;
        let mut node = ComputeNode::new(name, platform);
        if let Some(port) = parts.next() {
            node.ssh_port = port
                .parse()
                .map_err(|_| DomainError::InvalidArgument(format!("invalid ssh port in '{entry}'")))?;
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry_with_default_port() {
        let node = ComputeNode::parse_entry("w1:linux").unwrap();
        assert_eq!(node.name, "w1");
        assert_eq!(node.platform, Platform::Linux);
        assert_eq!(node.ssh_port, DEFAULT_SSH_PORT);
        assert!(node.tool_location.is_none());
    }

    #[test]
    fn test_parse_entry_with_port() {
        let node = ComputeNode::parse_entry("winbox:Windows:2222").unwrap();
        assert_eq!(node.platform, Platform::Windows);
        assert_eq!(node.ssh_port, 2222);
    }

    #[test]
    fn test_parse_entry_rejects_unknown_platform() {
        let err = ComputeNode::parse_entry("w1:solaris").unwrap_err();
        assert_eq!(err, DomainError::UnsupportedPlatform("solaris".to_string()));
        assert!(ComputeNode::parse_entry("w1").is_err());
    }
}
