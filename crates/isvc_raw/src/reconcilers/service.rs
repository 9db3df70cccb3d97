use crate::api::ComponentExtensionSpec;
use crate::constants;
use crate::features::ComponentFeatures;
use crate::reconcilers::object::{to_comparable, DesiredState, ObjectReconciler};
use crate::reconcilers::{app_selector, component_name, with_app_label};
use crate::util::errors::Result;

use k8s_openapi::api::core::v1::{Container, PodSpec, Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use kube::Client;
use serde_json::{json, Value};
use std::collections::BTreeMap;

const TCP: &str = "TCP";
const HEADLESS: &str = "None";

impl DesiredState for Service {
    // clusterIP, annotations and the like are platform managed
    fn comparable(&self) -> Result<Value> {
        let spec = self.spec.clone().unwrap_or_default();
        let mut ports: Vec<Value> = spec
            .ports
            .unwrap_or_default()
            .iter()
            .map(normalized_port)
            .collect::<Result<_>>()?;
        ports.sort_by_key(|port| port.to_string());
        Ok(json!({
            "ports": ports,
            "selector": spec.selector.unwrap_or_default(),
        }))
    }
}

fn normalized_port(port: &ServicePort) -> Result<Value> {
    to_comparable(&ServicePort {
        name: port.name.clone().filter(|name| !name.is_empty()),
        port: port.port,
        protocol: Some(port.protocol.clone().unwrap_or_else(|| TCP.to_string())),
        target_port: Some(port.target_port.clone().unwrap_or(IntOrString::Int(port.port))),
        app_protocol: port.app_protocol.clone(),
        node_port: None,
    })
}

/// Reconciles the headless Service fronting one component's pods
pub struct ServiceReconciler {
    inner: ObjectReconciler<Service>,
}

impl ServiceReconciler {
    pub fn new(
        client: Client,
        component_meta: &ObjectMeta,
        component_ext: &ComponentExtensionSpec,
        pod_spec: &PodSpec,
        features: &ComponentFeatures,
    ) -> Result<Self> {
        let service = build_service(component_meta, component_ext, pod_spec, features)?;
        Ok(ServiceReconciler {
            inner: ObjectReconciler::new(client, service)?,
        })
    }

    pub fn service(&self) -> &Service {
        self.inner.desired()
    }

    pub async fn reconcile(self) -> Result<Service> {
        self.inner.reconcile().await
    }
}

/// The transformer when collocated, the first container otherwise
fn primary_container(pod_spec: &PodSpec) -> Option<&Container> {
    pod_spec
        .containers
        .iter()
        .find(|c| c.name == constants::TRANSFORMER_CONTAINER_NAME)
        .or_else(|| pod_spec.containers.first())
}

fn service_ports(name: &str, container: Option<&Container>) -> Vec<ServicePort> {
    let declared = container
        .and_then(|c| c.ports.as_ref())
        .filter(|ports| !ports.is_empty());

    let Some(declared) = declared else {
        return vec![ServicePort {
            name: Some(name.to_string()),
            port: constants::COMMON_DEFAULT_HTTP_PORT,
            target_port: Some(IntOrString::Int(constants::INFERENCE_SERVICE_DEFAULT_HTTP_PORT)),
            protocol: Some(TCP.to_string()),
            ..Default::default()
        }];
    };

    declared
        .iter()
        .enumerate()
        .map(|(i, container_port)| {
            if i == 0 {
                ServicePort {
                    name: Some(
                        container_port
                            .name
                            .clone()
                            .filter(|n| !n.is_empty())
                            .unwrap_or_else(|| "http".to_string()),
                    ),
                    port: constants::COMMON_DEFAULT_HTTP_PORT,
                    target_port: Some(IntOrString::Int(container_port.container_port)),
                    protocol: container_port.protocol.clone(),
                    ..Default::default()
                }
            } else {
                ServicePort {
                    name: container_port.name.clone(),
                    port: container_port.container_port,
                    target_port: Some(IntOrString::Int(container_port.container_port)),
                    protocol: Some(container_port.protocol.clone().unwrap_or_else(|| TCP.to_string())),
                    ..Default::default()
                }
            }
        })
        .collect()
}

pub fn build_service(
    component_meta: &ObjectMeta,
    component_ext: &ComponentExtensionSpec,
    pod_spec: &PodSpec,
    features: &ComponentFeatures,
) -> Result<Service> {
    let name = component_name(component_meta)?;
    let mut ports = service_ports(name, primary_container(pod_spec));

    if component_ext.has_agent() {
        if let Some(first) = ports.first_mut() {
            first.target_port = Some(IntOrString::Int(constants::INFERENCE_SERVICE_DEFAULT_AGENT_PORT));
        }
    }

    let mut metadata = with_app_label(component_meta, name);
    if features.auth_enabled {
        metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(constants::SERVING_CERT_ANNOTATION_KEY.to_string(), name.to_string());
        ports.push(ServicePort {
            name: Some(constants::OAUTH_PROXY_PORT_NAME.to_string()),
            port: constants::OAUTH_PROXY_PORT,
            target_port: Some(IntOrString::String(constants::OAUTH_PROXY_PORT_NAME.to_string())),
            protocol: Some(TCP.to_string()),
            ..Default::default()
        });
    }

    Ok(Service {
        metadata,
        spec: Some(ServiceSpec {
            selector: Some(app_selector(name)),
            ports: Some(ports),
            cluster_ip: Some(HEADLESS.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    })
}
