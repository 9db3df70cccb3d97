//! Raw-deployment reconcilers of an inference-service operator.
//!
//! Each component of an inference service is served by a plain Deployment, a headless
//! Service and, unless scaling is external, a HorizontalPodAutoscaler; the service as a
//! whole is exposed through one Ingress. Every kind follows the same steps: a pure
//! builder computes the desired object, [`reconcilers::ObjectReconciler`] classifies the
//! live state into a [`reconcilers::CheckResult`] and applies it.

pub mod api;
pub mod config;
pub mod constants;
pub mod features;
pub mod reconcilers;
pub mod util;

pub use reconcilers::{ComponentResources, Context, IngressReconciler, RawKubeReconciler, State};
pub use util::errors::{Error, Result};

#[cfg(test)]
pub mod fixtures;
