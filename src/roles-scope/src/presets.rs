use std::collections::HashSet;

use roles_scope_types::{Permission, PermissionSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{diff::PermissionFingerprint, errors::IntegrityError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetValidation {
    /// Presets fully contained in the ground truth.
    pub presets: Vec<PermissionSet>,
    /// Ground-truth permissions no kept preset grants.
    pub uncovered: Vec<Permission>,
}

fn fingerprints<'a>(
    permissions: impl IntoIterator<Item = &'a Permission>,
) -> Result<HashSet<PermissionFingerprint>, IntegrityError> {
    permissions
        .into_iter()
        .map(PermissionFingerprint::of)
        .collect()
}

/// Presets whose every permission has an equal entry in `ground_truth`.
pub fn filter_presets(
    presets: &[PermissionSet],
    ground_truth: &[Permission],
) -> Result<Vec<PermissionSet>, IntegrityError> {
    let truth = fingerprints(ground_truth)?;
    let mut kept = Vec::new();
    for preset in presets {
        if fingerprints(&preset.permissions)?.is_subset(&truth) {
            kept.push(preset.clone());
        }
    }
    debug!(candidates = presets.len(), kept = kept.len(), "filtered presets");
    Ok(kept)
}

pub fn validate_presets(
    presets: &[PermissionSet],
    ground_truth: &[Permission],
) -> Result<PresetValidation, IntegrityError> {
    let presets = filter_presets(presets, ground_truth)?;
    let covered = fingerprints(presets.iter().flat_map(|preset| &preset.permissions))?;

    let mut uncovered = Vec::new();
    for permission in ground_truth {
        if !covered.contains(&PermissionFingerprint::of(permission)?) {
            uncovered.push(permission.clone());
        }
    }
    Ok(PresetValidation { presets, uncovered })
}
