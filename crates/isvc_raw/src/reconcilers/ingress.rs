//! Ingress exposing an inference service, plus the URLs its components are reachable at.
//!
//! Hostnames come from the configured domain template, a Go-template-like string such as
//! `{{ .Name }}-{{ .Namespace }}.{{ .IngressDomain }}`. The supported placeholders are
//! `.Name`, `.Namespace`, `.IngressDomain`, `.Annotations.<key>` and `.Labels.<key>`.

use crate::api::ComponentType;
use crate::config::IngressConfig;
use crate::constants;
use crate::features::ComponentFeatures;
use crate::reconcilers::object::{to_comparable, DesiredState, ObjectReconciler};
use crate::reconcilers::{component_name, component_namespace, measured, Context};
use crate::util::errors::{Error, Result};

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::info;

const KIND: &str = "Ingress";
const MAX_DNS_SUBDOMAIN_LENGTH: usize = 253;

impl DesiredState for Ingress {
    fn comparable(&self) -> Result<Value> {
        to_comparable(&self.spec)
    }
}

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{-?\s*\.(\w+)(?:\.(\w+))?\s*-?\}\}").expect("failed to compile placeholder regex")
});

static DNS_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("failed to compile DNS subdomain regex")
});

/// Render the domain template for the object `name` of the inference service `isvc_meta`
pub fn generate_domain_name(name: &str, isvc_meta: &ObjectMeta, config: &IngressConfig) -> Result<String> {
    let namespace = component_namespace(isvc_meta)?;
    let empty = BTreeMap::new();
    let annotations = isvc_meta.annotations.as_ref().unwrap_or(&empty);
    let labels = isvc_meta.labels.as_ref().unwrap_or(&empty);

    let mut unknown = Vec::new();
    let rendered = PLACEHOLDER_REGEX.replace_all(&config.domain_template, |caps: &Captures| {
        let key = caps.get(2).map(|m| m.as_str());
        match (&caps[1], key) {
            ("Name", None) => name.to_string(),
            ("Namespace", None) => namespace.to_string(),
            ("IngressDomain", None) => config.ingress_domain.clone(),
            ("Annotations", Some(key)) => annotations.get(key).cloned().unwrap_or_default(),
            ("Labels", Some(key)) => labels.get(key).cloned().unwrap_or_default(),
            _ => {
                unknown.push(caps[0].to_string());
                String::new()
            }
        }
    });
    if !unknown.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "unsupported placeholders {:?} in domain template '{}'",
            unknown, config.domain_template
        )));
    }

    let host = rendered.into_owned();
    if host.len() > MAX_DNS_SUBDOMAIN_LENGTH || !DNS_SUBDOMAIN_REGEX.is_match(&host) {
        return Err(Error::InvalidArgument(format!(
            "domain template '{}' rendered '{}', which is not a valid DNS subdomain",
            config.domain_template, host
        )));
    }
    Ok(host)
}

/// External URL of the object `name`, e.g. `http://raw-foo-predictor-default.example.com`
pub fn external_url(name: &str, isvc_meta: &ObjectMeta, config: &IngressConfig) -> Result<String> {
    Ok(format!(
        "{}://{}",
        config.url_scheme,
        generate_domain_name(name, isvc_meta, config)?
    ))
}

/// In-cluster address of a component Service
pub fn internal_address(service_name: &str, namespace: &str) -> String {
    format!("http://{}.{}.svc.cluster.local", service_name, namespace)
}

fn http_rule(host: String, service_name: String) -> IngressRule {
    IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                path: Some("/".to_string()),
                path_type: "Prefix".to_string(),
                backend: IngressBackend {
                    service: Some(IngressServiceBackend {
                        name: service_name,
                        port: Some(ServiceBackendPort {
                            number: Some(constants::COMMON_DEFAULT_HTTP_PORT),
                            ..Default::default()
                        }),
                    }),
                    ..Default::default()
                },
            }],
        }),
    }
}

/// Desired Ingress of an inference service made of `components`.
///
/// `None` when the service is cluster-local or ingress creation is disabled.
pub fn build_ingress(
    isvc_meta: &ObjectMeta,
    components: &[ComponentType],
    features: &ComponentFeatures,
    config: &IngressConfig,
) -> Result<Option<Ingress>> {
    let name = component_name(isvc_meta)?;
    if features.cluster_local || config.disable_ingress_creation {
        info!("Not exposing '{}' outside the cluster", name);
        return Ok(None);
    }

    let mut components = components.to_vec();
    components.sort();
    components.dedup();

    let entrypoint = if components.contains(&ComponentType::Transformer) {
        ComponentType::Transformer
    } else if components.contains(&ComponentType::Predictor) {
        ComponentType::Predictor
    } else {
        return Err(Error::InvalidArgument(format!(
            "inference service '{}' has no predictor",
            name
        )));
    };

    let mut rules = vec![http_rule(
        generate_domain_name(name, isvc_meta, config)?,
        entrypoint.resource_name(name),
    )];
    for component in &components {
        let service_name = component.resource_name(name);
        rules.push(http_rule(
            generate_domain_name(&service_name, isvc_meta, config)?,
            service_name,
        ));
    }

    Ok(Some(Ingress {
        metadata: ObjectMeta {
            name: isvc_meta.name.clone(),
            namespace: isvc_meta.namespace.clone(),
            labels: isvc_meta.labels.clone(),
            annotations: isvc_meta.annotations.clone(),
            owner_references: isvc_meta.owner_references.clone(),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: config.ingress_class_name.clone(),
            rules: Some(rules),
            ..Default::default()
        }),
        ..Default::default()
    }))
}

/// Reconciles the Ingress of one inference service
pub struct IngressReconciler {
    ctx: Context,
    name: String,
    inner: Option<ObjectReconciler<Ingress>>,
}

impl IngressReconciler {
    pub fn new(
        ctx: &Context,
        isvc_meta: &ObjectMeta,
        components: &[ComponentType],
        config: &IngressConfig,
    ) -> Result<Self> {
        let features = ComponentFeatures::from_meta(isvc_meta);
        let inner = match build_ingress(isvc_meta, components, &features, config)? {
            Some(ingress) => Some(ObjectReconciler::new(ctx.client.clone(), ingress)?),
            None => None,
        };
        Ok(IngressReconciler {
            ctx: ctx.clone(),
            name: component_name(isvc_meta)?.to_string(),
            inner,
        })
    }

    pub fn ingress(&self) -> Option<&Ingress> {
        self.inner.as_ref().map(ObjectReconciler::desired)
    }

    pub async fn reconcile(self) -> Result<Option<Ingress>> {
        let Some(inner) = self.inner else {
            return Ok(None);
        };
        measured(&self.ctx, KIND, &self.name, inner.reconcile())
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isvc(annotations: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some("raw-foo".to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            labels: Some(BTreeMap::from([("team".to_string(), "ml".to_string())])),
            ..Default::default()
        }
    }

    fn hosts_and_backends(ingress: &Ingress) -> Vec<(String, String)> {
        ingress
            .spec
            .as_ref()
            .unwrap()
            .rules
            .as_ref()
            .unwrap()
            .iter()
            .map(|rule| {
                let path = &rule.http.as_ref().unwrap().paths[0];
                let backend = path.backend.service.as_ref().unwrap();
                assert_eq!(path.path.as_deref(), Some("/"));
                assert_eq!(path.path_type, "Prefix");
                assert_eq!(backend.port.as_ref().unwrap().number, Some(80));
                (rule.host.clone().unwrap(), backend.name.clone())
            })
            .collect()
    }

    #[test]
    fn default_template() {
        assert_eq!(
            generate_domain_name("raw-foo-predictor", &isvc(&[]), &IngressConfig::default()).unwrap(),
            "raw-foo-predictor-default.example.com"
        );
    }

    #[test]
    fn template_reads_annotations_and_labels() {
        let config = IngressConfig {
            domain_template: "{{ .Name }}.{{ .Labels.team }}.{{ .Annotations.zone }}.{{ .IngressDomain }}".to_string(),
            ingress_domain: "svc.example.org".to_string(),
            ..Default::default()
        };
        assert_eq!(
            generate_domain_name("raw-foo", &isvc(&[("zone", "eu")]), &config).unwrap(),
            "raw-foo.ml.eu.svc.example.org"
        );
    }

    #[test]
    fn invalid_hosts_are_rejected() {
        let unsupported = IngressConfig {
            domain_template: "{{ .Name }}.{{ .Cluster }}".to_string(),
            ..Default::default()
        };
        let err = generate_domain_name("raw-foo", &isvc(&[]), &unsupported).unwrap_err();
        assert_eq!(err.metric_label(), "invalidargument");

        // missing annotation renders empty, leaving a dangling dot
        let dangling = IngressConfig {
            domain_template: "{{ .Name }}.{{ .Annotations.zone }}".to_string(),
            ..Default::default()
        };
        assert!(generate_domain_name("raw-foo", &isvc(&[]), &dangling).is_err());

        let upper = IngressConfig {
            domain_template: "{{ .Name }}.Example.com".to_string(),
            ..Default::default()
        };
        assert!(generate_domain_name("raw-foo", &isvc(&[]), &upper).is_err());
    }

    #[test]
    fn top_level_host_routes_to_the_predictor() {
        let ingress = build_ingress(
            &isvc(&[]),
            &[ComponentType::Predictor],
            &ComponentFeatures::default(),
            &IngressConfig::default(),
        )
        .unwrap()
        .unwrap();

        assert_eq!(ingress.metadata.name.as_deref(), Some("raw-foo"));
        assert_eq!(
            hosts_and_backends(&ingress),
            vec![
                ("raw-foo-default.example.com".to_string(), "raw-foo-predictor".to_string()),
                (
                    "raw-foo-predictor-default.example.com".to_string(),
                    "raw-foo-predictor".to_string()
                ),
            ]
        );
    }

    #[test]
    fn top_level_host_routes_to_the_transformer() {
        let config = IngressConfig {
            ingress_class_name: Some("nginx".to_string()),
            ..Default::default()
        };
        let ingress = build_ingress(
            &isvc(&[]),
            &[ComponentType::Transformer, ComponentType::Predictor],
            &ComponentFeatures::default(),
            &config,
        )
        .unwrap()
        .unwrap();

        let rules = hosts_and_backends(&ingress);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].1, "raw-foo-transformer");
        assert_eq!(rules[1].0, "raw-foo-predictor-default.example.com");
        assert_eq!(rules[2].0, "raw-foo-transformer-default.example.com");
        assert_eq!(
            ingress.spec.unwrap().ingress_class_name.as_deref(),
            Some("nginx")
        );
    }

    #[test]
    fn cluster_local_or_disabled_builds_nothing() {
        let cluster_local = ComponentFeatures {
            cluster_local: true,
            ..Default::default()
        };
        assert!(build_ingress(&isvc(&[]), &[ComponentType::Predictor], &cluster_local, &IngressConfig::default())
            .unwrap()
            .is_none());

        let disabled = IngressConfig {
            disable_ingress_creation: true,
            ..Default::default()
        };
        assert!(build_ingress(&isvc(&[]), &[ComponentType::Predictor], &ComponentFeatures::default(), &disabled)
            .unwrap()
            .is_none());
    }

    #[test]
    fn predictor_is_required() {
        assert!(build_ingress(
            &isvc(&[]),
            &[ComponentType::Explainer],
            &ComponentFeatures::default(),
            &IngressConfig::default()
        )
        .is_err());
    }

    #[test]
    fn urls() {
        let config = IngressConfig {
            url_scheme: "https".to_string(),
            ..Default::default()
        };
        assert_eq!(
            external_url("raw-foo", &isvc(&[]), &config).unwrap(),
            "https://raw-foo-default.example.com"
        );
        assert_eq!(
            internal_address("raw-foo-predictor", "default"),
            "http://raw-foo-predictor.default.svc.cluster.local"
        );
    }
}
