//! Manifest loading - the declarative input for a run
//!
//! A manifest is an ordered list of `[[resource]]` tables plus notification
//! edges declared inline on either endpoint: `notifies` on the trigger,
//! `subscribes` on the listener. Declaration order is execution order.

use anyhow::{Context, Result, bail};
use convergence::{
    Action, Guard, GuardCheck, Notification, NotificationGraph, NotifyTiming, ResourceDeclaration,
    ResourceId, ResourceRegistry, ResourceSpec, ResourceType,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// A parsed manifest, not yet checked for duplicate or dangling references
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceEntry>,
}

/// One `[[resource]]` table
#[derive(Debug, Deserialize)]
pub struct ResourceEntry {
    pub name: String,
    /// The type's default action when omitted
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default)]
    pub only_if: Vec<GuardCheck>,
    #[serde(default)]
    pub not_if: Vec<GuardCheck>,
    #[serde(default)]
    pub notifies: Vec<EdgeEntry>,
    #[serde(default)]
    pub subscribes: Vec<EdgeEntry>,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

/// A notification edge declared on one of its endpoints
///
/// `resource` names the other endpoint as `type[name]`.
#[derive(Debug, Deserialize)]
pub struct EdgeEntry {
    pub resource: String,
    pub action: Action,
    #[serde(default = "default_timing")]
    pub timing: NotifyTiming,
}

fn default_timing() -> NotifyTiming {
    NotifyTiming::Delayed
}

impl Manifest {
    /// Load a manifest from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Lower the manifest into a resource registry and notification graph
    ///
    /// Rejects duplicate (type, name) pairs, self-notification and edges
    /// naming undeclared resources.
    pub fn lower(&self) -> Result<(ResourceRegistry, NotificationGraph)> {
        let mut registry = ResourceRegistry::new();
        for entry in &self.resources {
            registry.register(entry.declaration())?;
        }

        // Edges second, so they may reference resources declared later
        let mut graph = NotificationGraph::new();
        for entry in &self.resources {
            let own_id = ResourceId::new(entry.spec.resource_type(), entry.name.clone());
            for edge in &entry.notifies {
                let target = parse_resource_ref(&edge.resource)?;
                graph.add(
                    own_id.clone(),
                    Notification {
                        target,
                        timing: edge.timing,
                        action: edge.action,
                    },
                )?;
            }
            for edge in &entry.subscribes {
                let source = parse_resource_ref(&edge.resource)?;
                graph.add(
                    source,
                    Notification {
                        target: own_id.clone(),
                        timing: edge.timing,
                        action: edge.action,
                    },
                )?;
            }
        }
        graph.validate(&registry)?;

        Ok((registry, graph))
    }
}

impl ResourceEntry {
    fn declaration(&self) -> ResourceDeclaration {
        let mut decl = ResourceDeclaration::new(self.name.clone(), self.spec.clone());
        if let Some(action) = self.action {
            decl = decl.with_action(action);
        }
        for check in &self.only_if {
            decl = decl.with_guard(Guard::only_if(check.clone()));
        }
        for check in &self.not_if {
            decl = decl.with_guard(Guard::not_if(check.clone()));
        }
        decl.best_effort(self.best_effort)
    }
}

/// Parse a `type[name]` resource reference
pub fn parse_resource_ref(reference: &str) -> Result<ResourceId> {
    let Some((rtype, rest)) = reference.split_once('[') else {
        bail!("invalid resource reference `{reference}`; expected type[name]");
    };
    let Some(name) = rest.strip_suffix(']') else {
        bail!("invalid resource reference `{reference}`; expected type[name]");
    };
    let rtype: ResourceType = rtype
        .parse()
        .map_err(|e: String| anyhow::anyhow!("invalid resource reference `{reference}`: {e}"))?;
    if name.is_empty() {
        bail!("invalid resource reference `{reference}`; name is empty");
    }
    Ok(ResourceId::new(rtype, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Manifest {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn resource_entries_lower_in_declaration_order() {
        let manifest = parse(
            r#"
            [[resource]]
            type = "package"
            name = "nginx"

            [[resource]]
            type = "directory"
            name = "/opt/app"
            owner = "svc"
            mode = "0755"

            [[resource]]
            type = "execute"
            name = "migrate"
            command = "manage.py db upgrade"
            action = "nothing"
            "#,
        );

        let (registry, graph) = manifest.lower().unwrap();
        assert_eq!(registry.len(), 3);
        assert!(graph.is_empty());

        let names: Vec<_> = registry.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["nginx", "/opt/app", "migrate"]);

        // omitted action falls back to the type default
        let nginx = registry
            .lookup_parts(ResourceType::Package, "nginx")
            .unwrap();
        assert_eq!(nginx.action, Action::Install);

        let migrate = registry
            .lookup_parts(ResourceType::Execute, "migrate")
            .unwrap();
        assert_eq!(migrate.action, Action::Nothing);
    }

    #[test]
    fn guards_lower_with_their_kinds() {
        let manifest = parse(
            r#"
            [[resource]]
            type = "execute"
            name = "install-deps"
            command = "pip install -r requirements.txt"
            not_if = [{ command = "pip list | grep Flask" }]
            only_if = [{ file_exists = "/opt/app/requirements.txt" }]
            "#,
        );

        let (registry, _) = manifest.lower().unwrap();
        let decl = registry
            .lookup_parts(ResourceType::Execute, "install-deps")
            .unwrap();
        assert_eq!(decl.guards.len(), 2);
        assert!(matches!(
            decl.guards[0].check,
            GuardCheck::FileExists { .. }
        ));
        assert!(matches!(decl.guards[1].check, GuardCheck::Command { .. }));
    }

    #[test]
    fn notifies_and_subscribes_become_edges() {
        let manifest = parse(
            r#"
            [[resource]]
            type = "file"
            name = "/etc/nginx/conf.d/app.conf"
            content = "server {}"

            [[resource.notifies]]
            resource = "service[nginx]"
            action = "restart"
            timing = "immediately"

            [[resource]]
            type = "service"
            name = "nginx"

            [[resource]]
            type = "execute"
            name = "warm-cache"
            command = "curl -s localhost/healthz"
            action = "nothing"

            [[resource.subscribes]]
            resource = "service[nginx]"
            action = "run"
            "#,
        );

        let (registry, graph) = manifest.lower().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(graph.len(), 2);

        let from_file =
            graph.notifications_for(&ResourceId::new(ResourceType::File, "/etc/nginx/conf.d/app.conf"));
        assert_eq!(from_file.len(), 1);
        assert_eq!(from_file[0].timing, NotifyTiming::Immediately);
        assert_eq!(
            from_file[0].target,
            ResourceId::new(ResourceType::Service, "nginx")
        );

        // subscribes registers the edge on the watched resource, and the
        // omitted timing defaults to delayed
        let from_service = graph.notifications_for(&ResourceId::new(ResourceType::Service, "nginx"));
        assert_eq!(from_service.len(), 1);
        assert_eq!(from_service[0].timing, NotifyTiming::Delayed);
        assert_eq!(
            from_service[0].target,
            ResourceId::new(ResourceType::Execute, "warm-cache")
        );
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let manifest = parse(
            r#"
            [[resource]]
            type = "package"
            name = "nginx"

            [[resource]]
            type = "package"
            name = "nginx"
            "#,
        );
        let err = manifest.lower().unwrap_err();
        assert!(err.to_string().contains("duplicate resource"));
    }

    #[test]
    fn dangling_notification_target_is_rejected() {
        let manifest = parse(
            r#"
            [[resource]]
            type = "package"
            name = "nginx"

            [[resource.notifies]]
            resource = "service[nginx]"
            action = "restart"
            "#,
        );
        let err = manifest.lower().unwrap_err();
        assert!(err.to_string().contains("resource not found"));
    }

    #[test]
    fn parse_resource_ref_accepts_bracket_form() {
        let id = parse_resource_ref("service[nginx]").unwrap();
        assert_eq!(id, ResourceId::new(ResourceType::Service, "nginx"));

        // names may contain dots and slashes
        let id = parse_resource_ref("file[/etc/app/config.py]").unwrap();
        assert_eq!(id.name, "/etc/app/config.py");

        assert!(parse_resource_ref("service").is_err());
        assert!(parse_resource_ref("service[nginx").is_err());
        assert!(parse_resource_ref("mystery[nginx]").is_err());
        assert!(parse_resource_ref("service[]").is_err());
    }

    #[test]
    fn typed_attributes_parse_per_type() {
        let manifest = parse(
            r#"
            [[resource]]
            type = "user"
            name = "svc"
            system = true
            manage_home = true
            home = "/home/svc"

            [[resource]]
            type = "git"
            name = "/opt/app"
            repository = "https://example.com/app.git"
            revision = "deploy"
            user = "svc"
            "#,
        );
        let (registry, _) = manifest.lower().unwrap();

        let user = registry.lookup_parts(ResourceType::User, "svc").unwrap();
        let ResourceSpec::User(attrs) = &user.spec else {
            panic!("expected user spec");
        };
        assert!(attrs.system);
        assert!(attrs.manage_home);

        let git = registry.lookup_parts(ResourceType::Git, "/opt/app").unwrap();
        let ResourceSpec::Git(attrs) = &git.spec else {
            panic!("expected git spec");
        };
        assert_eq!(attrs.revision.as_deref(), Some("deploy"));
    }
}
