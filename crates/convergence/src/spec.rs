//! The closed set of resource types and their attribute structs
//!
//! Every resource the engine can manage is one of these tagged variants.
//! The engine itself never interprets the attributes; it hands the whole
//! declaration to the provider registered for the variant's type.

use crate::types::Action;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Resource type tag, used to key provider dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Package,
    User,
    Group,
    Directory,
    File,
    Link,
    Git,
    Service,
    Execute,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Package => "package",
            Self::User => "user",
            Self::Group => "group",
            Self::Directory => "directory",
            Self::File => "file",
            Self::Link => "link",
            Self::Git => "git",
            Self::Service => "service",
            Self::Execute => "execute",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(Self::Package),
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "directory" => Ok(Self::Directory),
            "file" => Ok(Self::File),
            "link" => Ok(Self::Link),
            "git" => Ok(Self::Git),
            "service" => Ok(Self::Service),
            "execute" => Ok(Self::Execute),
            other => Err(format!("unknown resource type `{other}`")),
        }
    }
}

/// Typed attributes for each resource type
///
/// Internally tagged so a manifest entry reads as
/// `type = "package"` followed by that type's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Package(PackageSpec),
    User(UserSpec),
    Group(GroupSpec),
    Directory(DirectorySpec),
    File(FileSpec),
    Link(LinkSpec),
    Git(GitSpec),
    Service(ServiceSpec),
    Execute(ExecuteSpec),
}

impl ResourceSpec {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Package(_) => ResourceType::Package,
            Self::User(_) => ResourceType::User,
            Self::Group(_) => ResourceType::Group,
            Self::Directory(_) => ResourceType::Directory,
            Self::File(_) => ResourceType::File,
            Self::Link(_) => ResourceType::Link,
            Self::Git(_) => ResourceType::Git,
            Self::Service(_) => ResourceType::Service,
            Self::Execute(_) => ResourceType::Execute,
        }
    }

    /// The action a declaration of this type performs when none is given
    pub fn default_action(&self) -> Action {
        match self {
            Self::Package(_) => Action::Install,
            Self::User(_) | Self::Group(_) | Self::Directory(_) | Self::File(_) | Self::Link(_) => {
                Action::Create
            }
            Self::Git(_) => Action::Checkout,
            Self::Service(_) => Action::Start,
            Self::Execute(_) => Action::Run,
        }
    }
}

/// A distro package, identified by its package name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Pin to a specific version; latest otherwise
    #[serde(default)]
    pub version: Option<String>,
}

/// A system user account, identified by username
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    #[serde(default)]
    pub home: Option<PathBuf>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Create as a system account (no aging, low uid range)
    #[serde(default)]
    pub system: bool,
    /// Create the home directory along with the account
    #[serde(default)]
    pub manage_home: bool,
}

/// A system group, identified by group name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub members: Vec<String>,
    /// Add members to the existing list instead of replacing it
    #[serde(default)]
    pub append: bool,
    #[serde(default)]
    pub system: bool,
}

/// A directory, identified by its path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySpec {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// Octal mode string, e.g. "0755"
    #[serde(default)]
    pub mode: Option<String>,
    /// Create missing parent directories too
    #[serde(default)]
    pub recursive: bool,
}

/// A file with managed content, identified by its path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Desired content; when absent only existence is managed
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// A symlink, identified by the link path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    /// What the link points to
    pub to: PathBuf,
}

/// A git checkout, identified by its destination path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSpec {
    pub repository: String,
    /// Branch, tag or commit; the remote default branch otherwise
    #[serde(default)]
    pub revision: Option<String>,
    /// Own the checkout as this user
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

/// A supervised service, identified by unit name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Also enable the unit at boot when starting it
    #[serde(default = "default_enable")]
    pub enable: bool,
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            enable: default_enable(),
        }
    }
}

fn default_enable() -> bool {
    true
}

/// A shell command, identified by a label of the operator's choosing
///
/// Never idempotent on its own; pair with guards the way the other
/// one-shot steps in a manifest are gated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSpec {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Run as this user instead of the invoking one
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_actions_per_type() {
        assert_eq!(
            ResourceSpec::Package(PackageSpec::default()).default_action(),
            Action::Install
        );
        assert_eq!(
            ResourceSpec::Directory(DirectorySpec::default()).default_action(),
            Action::Create
        );
        assert_eq!(
            ResourceSpec::Execute(ExecuteSpec {
                command: "true".into(),
                cwd: None,
                user: None,
                environment: BTreeMap::new(),
            })
            .default_action(),
            Action::Run
        );
    }

    #[test]
    fn resource_type_round_trips_through_str() {
        for rtype in [
            ResourceType::Package,
            ResourceType::User,
            ResourceType::Group,
            ResourceType::Directory,
            ResourceType::File,
            ResourceType::Link,
            ResourceType::Git,
            ResourceType::Service,
            ResourceType::Execute,
        ] {
            assert_eq!(rtype.to_string().parse::<ResourceType>(), Ok(rtype));
        }
        assert!("cron".parse::<ResourceType>().is_err());
    }
}
