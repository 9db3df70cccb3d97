use crate::api::ComponentExtensionSpec;
use crate::config::OauthProxyConfig;
use crate::constants;
use crate::features::ComponentFeatures;
use crate::reconcilers::object::{to_comparable, DesiredState, ObjectReconciler};
use crate::reconcilers::{app_selector, component_name, component_namespace, with_app_label};
use crate::util::errors::Result;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSecurityContext, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, SecretVolumeSource, TCPSocketAction, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use kube::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

const ROLLING_UPDATE: &str = "RollingUpdate";
const DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS: i64 = 30;
const DEFAULT_SCHEDULER_NAME: &str = "default-scheduler";
const TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";

impl DesiredState for Deployment {
    const DRY_RUN_BEFORE_DIFF: bool = true;

    // replicas belong to the HPA once it scales the deployment
    const IGNORED_FIELDS: &'static [&'static str] = &["replicas"];

    fn comparable(&self) -> Result<Value> {
        to_comparable(&self.spec)
    }
}

/// Reconciles the raw Kubernetes Deployment of one component
pub struct DeploymentReconciler {
    inner: ObjectReconciler<Deployment>,
}

impl DeploymentReconciler {
    pub fn new(
        client: Client,
        component_meta: &ObjectMeta,
        component_ext: &ComponentExtensionSpec,
        pod_spec: PodSpec,
        features: &ComponentFeatures,
        proxy_config: &OauthProxyConfig,
    ) -> Result<Self> {
        let deployment = build_deployment(component_meta, component_ext, pod_spec, features, proxy_config)?;
        Ok(DeploymentReconciler {
            inner: ObjectReconciler::new(client, deployment)?,
        })
    }

    pub fn deployment(&self) -> &Deployment {
        self.inner.desired()
    }

    pub async fn reconcile(self) -> Result<Deployment> {
        self.inner.reconcile().await
    }
}

/// Desired Deployment of a component. Pure: the same inputs always give the same object.
pub fn build_deployment(
    component_meta: &ObjectMeta,
    component_ext: &ComponentExtensionSpec,
    pod_spec: PodSpec,
    features: &ComponentFeatures,
    proxy_config: &OauthProxyConfig,
) -> Result<Deployment> {
    let name = component_name(component_meta)?;
    let namespace = component_namespace(component_meta)?;

    let pod_spec = default_pod_spec(pod_spec);
    let pod_spec = if features.auth_enabled {
        inject_oauth_proxy(pod_spec, name, namespace, proxy_config)
    } else {
        pod_spec
    };

    let spec = DeploymentSpec {
        selector: LabelSelector {
            match_labels: Some(app_selector(name)),
            ..Default::default()
        },
        template: PodTemplateSpec {
            metadata: Some(pod_metadata(component_meta, name)),
            spec: Some(pod_spec),
        },
        strategy: component_ext.deployment_strategy.clone(),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: with_app_label(component_meta, name),
        spec: Some(default_deployment_spec(spec)),
        ..Default::default()
    })
}

fn pod_metadata(component_meta: &ObjectMeta, name: &str) -> ObjectMeta {
    let meta = with_app_label(component_meta, name);
    ObjectMeta {
        name: meta.name,
        namespace: meta.namespace,
        labels: meta.labels,
        annotations: meta.annotations,
        ..Default::default()
    }
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn default_string(value: &mut Option<String>, default: &str) {
    if is_unset(value) {
        *value = Some(default.to_string());
    }
}

/// Fill pod fields the API server would otherwise default, so they never show up as drift
pub fn default_pod_spec(mut pod_spec: PodSpec) -> PodSpec {
    default_string(&mut pod_spec.dns_policy, "ClusterFirst");
    default_string(&mut pod_spec.restart_policy, "Always");
    pod_spec
        .termination_grace_period_seconds
        .get_or_insert(DEFAULT_TERMINATION_GRACE_PERIOD_SECONDS);
    pod_spec.security_context.get_or_insert_with(PodSecurityContext::default);
    default_string(&mut pod_spec.scheduler_name, DEFAULT_SCHEDULER_NAME);

    pod_spec.containers = pod_spec.containers.into_iter().map(default_container).collect();
    pod_spec
}

fn default_container(mut container: Container) -> Container {
    default_string(&mut container.termination_message_path, TERMINATION_MESSAGE_PATH);
    default_string(&mut container.termination_message_policy, "File");
    default_string(&mut container.image_pull_policy, "IfNotPresent");

    let serves_traffic = container.name == constants::INFERENCE_SERVICE_CONTAINER_NAME
        || container.name == constants::TRANSFORMER_CONTAINER_NAME;
    if serves_traffic && container.readiness_probe.is_none() {
        let port = first_container_port(&container).unwrap_or(constants::INFERENCE_SERVICE_DEFAULT_HTTP_PORT);
        debug!("defaulting readiness probe of '{}' to tcp port {}", container.name, port);
        container.readiness_probe = Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            timeout_seconds: Some(1),
            period_seconds: Some(10),
            success_threshold: Some(1),
            failure_threshold: Some(3),
            ..Default::default()
        });
    }
    container
}

fn first_container_port(container: &Container) -> Option<i32> {
    container
        .ports
        .as_ref()
        .and_then(|ports| ports.first())
        .map(|port| port.container_port)
}

/// First declared port of the model-server container
pub fn model_server_port(pod_spec: &PodSpec) -> Option<i32> {
    pod_spec
        .containers
        .iter()
        .find(|c| c.name == constants::INFERENCE_SERVICE_CONTAINER_NAME)
        .and_then(first_container_port)
}

/// Append the auth proxy sidecar and the volume holding its serving certificate
pub fn inject_oauth_proxy(
    mut pod_spec: PodSpec,
    name: &str,
    namespace: &str,
    proxy_config: &OauthProxyConfig,
) -> PodSpec {
    let upstream_port = model_server_port(&pod_spec).unwrap_or(constants::INFERENCE_SERVICE_DEFAULT_HTTP_PORT);
    pod_spec
        .containers
        .push(oauth_proxy_container(upstream_port, namespace, proxy_config));
    pod_spec.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: constants::PROXY_TLS_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(name.to_string()),
            default_mode: Some(420),
            ..Default::default()
        }),
        ..Default::default()
    });
    pod_spec
}

fn oauth_proxy_container(upstream_port: i32, namespace: &str, proxy_config: &OauthProxyConfig) -> Container {
    let health_probe = |initial_delay_seconds: i32| Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/oauth/healthz".to_string()),
            port: IntOrString::Int(constants::OAUTH_PROXY_PORT),
            scheme: Some("HTTPS".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        timeout_seconds: Some(1),
        period_seconds: Some(5),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    };

    Container {
        name: constants::OAUTH_PROXY_CONTAINER_NAME.to_string(),
        image: Some(proxy_config.image.clone()),
        args: Some(vec![
            format!("--https-address=:{}", constants::OAUTH_PROXY_PORT),
            "--provider=openshift".to_string(),
            format!("--openshift-service-account={}", constants::KSERVE_SERVICE_ACCOUNT_NAME),
            format!("--upstream=http://localhost:{}", upstream_port),
            format!("--tls-cert={}/tls.crt", constants::PROXY_TLS_MOUNT_PATH),
            format!("--tls-key={}/tls.key", constants::PROXY_TLS_MOUNT_PATH),
            "--cookie-secret=SECRET".to_string(),
            format!(
                r#"--openshift-delegate-urls={{"/": {{"namespace": "{}", "resource": "services", "verb": "get"}}}}"#,
                namespace
            ),
            format!(
                r#"--openshift-sar={{"namespace": "{}", "resource": "services", "verb": "get"}}"#,
                namespace
            ),
            r#"--skip-auth-regex="(^/metrics|^/apis/v1beta1/healthz)""#.to_string(),
        ]),
        ports: Some(vec![ContainerPort {
            container_port: constants::OAUTH_PROXY_PORT,
            name: Some(constants::OAUTH_PROXY_PORT_NAME.to_string()),
            ..Default::default()
        }]),
        liveness_probe: Some(health_probe(30)),
        readiness_probe: Some(health_probe(5)),
        resources: Some(ResourceRequirements {
            limits: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(proxy_config.cpu_limit.clone())),
                ("memory".to_string(), Quantity(proxy_config.memory_limit.clone())),
            ])),
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(proxy_config.cpu_request.clone())),
                ("memory".to_string(), Quantity(proxy_config.memory_request.clone())),
            ])),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: constants::PROXY_TLS_VOLUME_NAME.to_string(),
            mount_path: constants::PROXY_TLS_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Fill deployment fields the API server would otherwise default
pub fn default_deployment_spec(mut spec: DeploymentSpec) -> DeploymentSpec {
    let strategy = spec.strategy.get_or_insert_with(DeploymentStrategy::default);
    default_string(&mut strategy.type_, ROLLING_UPDATE);
    if strategy.type_.as_deref() == Some(ROLLING_UPDATE) && strategy.rolling_update.is_none() {
        strategy.rolling_update = Some(RollingUpdateDeployment {
            max_unavailable: Some(IntOrString::String("25%".to_string())),
            max_surge: Some(IntOrString::String("25%".to_string())),
        });
    }
    spec.revision_history_limit.get_or_insert(10);
    spec.progress_deadline_seconds.get_or_insert(600);

    // always overwritten, raw deployments run under the operator's service account
    if let Some(pod_spec) = spec.template.spec.as_mut() {
        pod_spec.service_account_name = Some(constants::KSERVE_SERVICE_ACCOUNT_NAME.to_string());
    }
    spec
}
