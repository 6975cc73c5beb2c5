//! Pure spec transformations for the create and update paths.

use serde::Deserialize;

use crate::spec::WorkloadSpec;

fn default_label_key() -> String {
    "traefik.frontend.rule".into()
}

/// Where the routing rule lives and how its value is spelled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    #[serde(default = "default_label_key")]
    pub label_key: String,
    /// Prepended to `<name>.<domain>`, e.g. `"Host:"` for older routers.
    pub rule_prefix: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            label_key: default_label_key(),
            rule_prefix: String::new(),
        }
    }
}

impl RoutingConfig {
    pub fn rule(&self, name: &str, domain: &str) -> String {
        format!("{}{}.{}", self.rule_prefix, name, domain)
    }

    fn apply(&self, spec: &mut WorkloadSpec, domain: Option<&str>) {
        let Some(domain) = domain.map(str::trim).filter(|d| !d.is_empty()) else {
            return;
        };
        let key = self.label_key.trim();
        if key.is_empty() {
            return;
        }
        let value = self.rule(&spec.name, domain);
        spec.labels.insert(key.to_string(), value);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Overrides<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub routing_domain: Option<&'a str>,
}

/// Seeds a new spec from `template`.
///
/// Name and image are replaced, the routing label is set when a domain is
/// given, and published ports are dropped so the copy does not fight the
/// template for them. Everything else is an owned copy of the template.
pub fn clone_spec(
    template: &WorkloadSpec,
    overrides: &Overrides<'_>,
    routing: &RoutingConfig,
) -> WorkloadSpec {
    let mut out = template.clone();
    out.name = overrides.name.to_string();
    out.set_image(overrides.image);
    if let Some(ep) = out.endpoint_spec.as_mut() {
        ep.ports.clear();
    }
    routing.apply(&mut out, overrides.routing_domain);
    out
}

/// Desired spec for an existing service: the live spec with a new image and,
/// optionally, a refreshed routing label. The name is left alone.
pub fn update_spec(
    live: &WorkloadSpec,
    image: &str,
    routing_domain: Option<&str>,
    routing: &RoutingConfig,
) -> WorkloadSpec {
    let mut out = live.clone();
    out.set_image(image);
    routing.apply(&mut out, routing_domain);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{
        ContainerSpec, EndpointSpec, Mount, NetworkAttachment, Placement, SecretReference,
        TaskTemplate,
    };
    use std::collections::BTreeMap;

    fn template() -> WorkloadSpec {
        WorkloadSpec {
            name: "svc-template".into(),
            labels: BTreeMap::from([
                ("team".to_string(), "web".to_string()),
                ("traefik.port".to_string(), "8080".to_string()),
            ]),
            task_template: TaskTemplate {
                container_spec: ContainerSpec {
                    image: "img:v1".into(),
                    mounts: vec![Mount {
                        r#type: "volume".into(),
                        source: "data".into(),
                        target: "/data".into(),
                        ..Default::default()
                    }],
                    secrets: vec![SecretReference {
                        secret_id: "abc".into(),
                        secret_name: "db".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                placement: Some(Placement {
                    constraints: vec!["node.role == worker".into()],
                    ..Default::default()
                }),
                ..Default::default()
            },
            networks: vec![NetworkAttachment {
                target: "proxy".into(),
                ..Default::default()
            }],
            endpoint_spec: Some(EndpointSpec {
                mode: Some("vip".into()),
                ports: vec![serde_json::json!({"PublishedPort": 8080, "TargetPort": 80})],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn routing() -> RoutingConfig {
        RoutingConfig {
            label_key: "routing-rule".into(),
            rule_prefix: String::new(),
        }
    }

    #[test]
    fn clone_overrides_name_image_and_routing() {
        let t = template();
        let out = clone_spec(
            &t,
            &Overrides {
                name: "svc-x",
                image: "img:v2",
                routing_domain: Some("example.org"),
            },
            &routing(),
        );
        assert_eq!(out.name, "svc-x");
        assert_eq!(out.image(), "img:v2");
        assert_eq!(out.label("routing-rule"), Some("svc-x.example.org"));
        assert_eq!(out.label("team"), Some("web"));
        assert_eq!(out.label("traefik.port"), Some("8080"));
    }

    #[test]
    fn clone_preserves_nested_collections() {
        let t = template();
        let out = clone_spec(
            &t,
            &Overrides {
                name: "svc-x",
                image: "img:v2",
                routing_domain: None,
            },
            &routing(),
        );
        let (tc, oc) = (&t.task_template.container_spec, &out.task_template.container_spec);
        assert_eq!(oc.mounts, tc.mounts);
        assert_eq!(oc.secrets, tc.secrets);
        assert_eq!(out.task_template.placement, t.task_template.placement);
        assert_eq!(out.networks, t.networks);
        assert_eq!(
            out.endpoint_spec.as_ref().unwrap().mode.as_deref(),
            Some("vip")
        );
        assert!(out.endpoint_spec.as_ref().unwrap().ports.is_empty());
        assert_eq!(t.endpoint_spec.as_ref().unwrap().ports.len(), 1);
    }

    #[test]
    fn mutating_clone_labels_leaves_template_alone() {
        let t = template();
        let before = t.labels.clone();
        let mut out = clone_spec(
            &t,
            &Overrides {
                name: "svc-x",
                image: "img:v2",
                routing_domain: Some("example.org"),
            },
            &routing(),
        );
        out.labels.insert("team".into(), "ops".into());
        out.labels.remove("traefik.port");
        out.task_template.container_spec.mounts.clear();
        assert_eq!(t.labels, before);
        assert_eq!(t.task_template.container_spec.mounts.len(), 1);
    }

    #[test]
    fn no_domain_adds_no_routing_key() {
        let t = template();
        for domain in [None, Some(""), Some("   ")] {
            let out = clone_spec(
                &t,
                &Overrides {
                    name: "svc-x",
                    image: "img:v2",
                    routing_domain: domain,
                },
                &routing(),
            );
            assert!(out.label("routing-rule").is_none());
            assert_eq!(out.labels, t.labels);
        }
    }

    #[test]
    fn routing_overwrites_only_its_own_key() {
        let mut live = template();
        live.labels
            .insert("routing-rule".into(), "old.example.org".into());
        let out = update_spec(&live, "img:v3", Some("example.net"), &routing());
        assert_eq!(out.label("routing-rule"), Some("svc-template.example.net"));
        assert_eq!(out.label("team"), Some("web"));
    }

    #[test]
    fn update_keeps_name_ports_and_live_fields() {
        let live = template();
        let out = update_spec(&live, "img:v3", None, &routing());
        assert_eq!(out.name, live.name);
        assert_eq!(out.image(), "img:v3");
        assert_eq!(out.endpoint_spec, live.endpoint_spec);
        assert_eq!(out.labels, live.labels);
        assert_eq!(live.image(), "img:v1");
    }

    #[test]
    fn rule_prefix_is_prepended() {
        let cfg = RoutingConfig {
            label_key: "traefik.frontend.rule".into(),
            rule_prefix: "Host:".into(),
        };
        assert_eq!(cfg.rule("svc", "example.org"), "Host:svc.example.org");
        assert_eq!(RoutingConfig::default().label_key, "traefik.frontend.rule");
    }
}
