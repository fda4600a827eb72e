//! Subcommands.

pub mod plan;
pub mod reconcile;
pub mod run;
pub mod validate;

use crate::manifest::Manifest;
use crate::output;
use anyhow::Result;
use dbaas_authz_core::access::AccessReviewer;
use dbaas_authz_core::config::Settings;
use std::sync::Arc;

/// The configured HTTP reviewer, falling back to the manifest's access reviews.
fn reviewer(settings: &Settings, manifest: &Manifest) -> Result<Arc<dyn AccessReviewer>> {
    match settings.access_review.http_reviewer()? {
        Some(reviewer) => {
            if !manifest.access_reviews.is_empty() {
                output::print_warning("access_review.endpoint is set, ignoring accessReviews in the manifest");
            }
            Ok(reviewer)
        }
        None => Ok(Arc::new(manifest.reviewer())),
    }
}
