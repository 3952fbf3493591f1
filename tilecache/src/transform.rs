//! Injected custom-serialization hook.
//!
//! Deployments can supply a function that turns a decoded [`FeatureSet`]
//! into an alternative byte representation. When configured, the service
//! stores its output as `custom_data` next to the canonical payload and
//! serves it in place of `data`; the offline rebuild re-runs it over every
//! stored tile.
//!
//! The hook is a plain function value wired at startup. The core never
//! resolves transforms by name.

use std::sync::Arc;

use crate::codec::FeatureSet;

/// A pure transform from decoded features to an alternative payload.
pub type CustomTransform = Arc<dyn Fn(&FeatureSet) -> Vec<u8> + Send + Sync>;
