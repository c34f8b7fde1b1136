//! Policy configuration and enforcement.

use crate::{CapabilityKind, CapabilityRequest, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Launchers a local-process tool server may be started with by default.
pub const DEFAULT_COMMANDS: &[&str] = &["node", "python", "python3", "npx", "uvx"];

/// Policy configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Capabilities that are explicitly allowed.
    #[serde(default)]
    pub allow: AllowRules,

    /// Capabilities that are explicitly denied (overrides allow).
    #[serde(default)]
    pub deny: DenyRules,
}

/// Rules for allowed capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowRules {
    /// Allowed commands (exact match, `*` allows any).
    #[serde(default = "default_exec")]
    pub exec: Vec<String>,

    /// Allowed HTTP hosts (suffix match on domain boundaries, `*` allows any).
    #[serde(default = "default_net_http")]
    pub net_http: Vec<String>,
}

impl Default for AllowRules {
    fn default() -> Self {
        Self {
            exec: default_exec(),
            net_http: default_net_http(),
        }
    }
}

fn default_exec() -> Vec<String> {
    DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect()
}

fn default_net_http() -> Vec<String> {
    vec!["*".to_string()]
}

/// Rules for denied capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenyRules {
    /// Deny all capabilities of these kinds.
    #[serde(default)]
    pub all: HashSet<CapabilityKind>,
}

/// Result of a capability check.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl Policy {
    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let policy: Self = toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Reject allow-list entries that can never match a real command or host.
    pub fn validate(&self) -> Result<()> {
        let entries = self.allow.exec.iter().chain(self.allow.net_http.iter());
        for entry in entries {
            if entry.trim().is_empty() || entry.chars().any(char::is_whitespace) {
                return Err(Error::Invalid(format!("allow-list entry {entry:?}")));
            }
        }
        Ok(())
    }

    /// A policy that allows any command and any host.
    pub fn permissive() -> Self {
        Self {
            allow: AllowRules {
                exec: vec!["*".to_string()],
                net_http: vec!["*".to_string()],
            },
            deny: DenyRules::default(),
        }
    }

    /// Check if a capability request is allowed.
    pub fn check(&self, request: &CapabilityRequest) -> Decision {
        if self.deny.all.contains(&request.kind) {
            return Decision::Deny {
                reason: format!("{:?} is denied by policy", request.kind),
            };
        }

        let allowed = match request.kind {
            CapabilityKind::Exec => check_command_allowed(&self.allow.exec, &request.scope),
            CapabilityKind::NetHttp => check_host_allowed(&self.allow.net_http, &request.scope),
        };

        if allowed {
            Decision::Allow
        } else {
            Decision::Deny {
                reason: format!(
                    "{:?} not in allowlist{}",
                    request.kind,
                    request
                        .scope
                        .as_ref()
                        .map(|s| format!(" (scope: {s})"))
                        .unwrap_or_default()
                ),
            }
        }
    }
}

fn check_command_allowed(allowlist: &[String], scope: &Option<String>) -> bool {
    let Some(cmd) = scope else {
        return false;
    };

    allowlist.iter().any(|allowed| allowed == "*" || allowed == cmd)
}

fn check_host_allowed(allowlist: &[String], scope: &Option<String>) -> bool {
    let Some(host) = scope else {
        return !allowlist.is_empty();
    };

    let host = host.to_ascii_lowercase();
    allowlist.iter().any(|allowed| {
        let allowed = allowed.to_ascii_lowercase();
        allowed == "*" || host == allowed || host.ends_with(&format!(".{allowed}"))
    })
}
