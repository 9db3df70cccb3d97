use crate::util::errors::{Error, Result};

use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, PostParams},
    Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use core::fmt;
use std::fmt::{Debug, Display};
use tracing::{error, info};

/// What a reconcile pass has to do with one sub-resource
#[derive(Debug)]
pub enum CheckResult<K> {
    /// No live object, the desired one has to be created
    Create,
    /// The live object diverges from the desired one
    Update { existing: K },
    /// The live object already matches, nothing to write
    Existed { existing: K },
    /// The live state could not be determined; this sub-resource is skipped for the pass
    Unknown(Error),
}

impl<K> Display for CheckResult<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckResult::Create => write!(f, "Create"),
            CheckResult::Update { .. } => write!(f, "Update"),
            CheckResult::Existed { .. } => write!(f, "Existed"),
            CheckResult::Unknown(_) => write!(f, "Unknown"),
        }
    }
}

/// A namespaced object kind the raw reconcilers converge toward a desired value.
pub trait DesiredState:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Replace the desired object with the result of a dry-run update before diffing, so
    /// that fields defaulted by the API server do not show up as drift.
    const DRY_RUN_BEFORE_DIFF: bool = false;

    /// Top-level fields of `comparable()` owned by other controllers.
    const IGNORED_FIELDS: &'static [&'static str] = &[];

    /// The part of the object this operator owns, as JSON.
    fn comparable(&self) -> Result<Value>;
}

/// Serialize an optional spec for `DesiredState::comparable`
pub fn to_comparable<T: Serialize>(spec: &T) -> Result<Value> {
    serde_json::to_value(spec).map_err(Error::JsonSerializationError)
}

/// Structural diff turning `existing` into `desired`, restricted to the owned fields of `K`.
///
/// An empty patch means nothing this operator manages has drifted.
pub fn diff_objects<K: DesiredState>(desired: &K, existing: &K) -> Result<json_patch::Patch> {
    let mut desired = desired.comparable()?;
    let mut existing = existing.comparable()?;
    for field in K::IGNORED_FIELDS {
        if let Some(map) = desired.as_object_mut() {
            map.remove(*field);
        }
        if let Some(map) = existing.as_object_mut() {
            map.remove(*field);
        }
    }
    Ok(json_patch::diff(&existing, &desired))
}

/// Existence/diff oracle and driver for one desired object.
pub struct ObjectReconciler<K> {
    api: Api<K>,
    desired: K,
}

impl<K: DesiredState> ObjectReconciler<K> {
    pub fn new(client: Client, desired: K) -> Result<Self> {
        if desired.meta().name.is_none() {
            return Err(Error::MetadataMissing(format!("{} without a name", K::kind(&()))));
        }
        let namespace = desired.namespace().ok_or_else(|| {
            Error::MetadataMissing(format!("{} '{}' without a namespace", K::kind(&()), desired.name_any()))
        })?;
        Ok(ObjectReconciler {
            api: Api::namespaced(client, &namespace),
            desired,
        })
    }

    pub fn desired(&self) -> &K {
        &self.desired
    }

    /// Classify the live state against the desired object.
    ///
    /// May replace the desired object with its server-defaulted form (see
    /// `DesiredState::DRY_RUN_BEFORE_DIFF`).
    pub async fn check(&mut self) -> CheckResult<K> {
        let kind = K::kind(&());
        let name = self.desired.name_any();

        let existing = match self.api.get(&name).await {
            Ok(existing) => existing,
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => return CheckResult::Create,
            Err(e) => return CheckResult::Unknown(Error::KubeError(e)),
        };

        // updates are conditional on the version we compared against
        self.desired.meta_mut().resource_version = existing.resource_version();

        if K::DRY_RUN_BEFORE_DIFF {
            let dry_run = PostParams {
                dry_run: true,
                ..Default::default()
            };
            match self.api.replace(&name, &dry_run, &self.desired).await {
                Ok(defaulted) => self.desired = defaulted,
                Err(e) => {
                    error!("Failed to perform dry-run update of {} '{}': {}", kind, name, e);
                    return CheckResult::Unknown(Error::KubeError(e));
                }
            }
        }

        match diff_objects(&self.desired, &existing) {
            Ok(diff) if diff.0.is_empty() => CheckResult::Existed { existing },
            Ok(diff) => {
                info!(
                    "{} '{}' updated, diff: {}",
                    kind,
                    name,
                    serde_json::to_string(&diff).unwrap_or_default()
                );
                CheckResult::Update { existing }
            }
            Err(e) => CheckResult::Unknown(e),
        }
    }

    /// Apply whatever `check` decided and return the authoritative object.
    pub async fn reconcile(mut self) -> Result<K> {
        let kind = K::kind(&());
        let name = self.desired.name_any();
        let check_result = self.check().await;
        info!("{} '{}' reconcile, checkResult: {}", kind, name, check_result);

        match check_result {
            CheckResult::Create => {
                info!("Creating {} '{}'", kind, name);
                self.api
                    .create(&PostParams::default(), &self.desired)
                    .await
                    .map_err(Error::KubeError)
            }
            CheckResult::Update { .. } => {
                info!("Updating {} '{}'", kind, name);
                self.api
                    .replace(&name, &PostParams::default(), &self.desired)
                    .await
                    .map_err(Error::KubeError)
            }
            CheckResult::Existed { existing } => {
                info!("{} '{}' is up to date", kind, name);
                Ok(existing)
            }
            CheckResult::Unknown(e) => Err(e),
        }
    }
}
