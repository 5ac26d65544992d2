//! Pseudo-builds: advancing a project's outputs without the compiler.
//!
//! Admissible when upstream declaration outputs are known byte-identical
//! to what this project last consumed. Plain projects get their output
//! mtimes touched forward; concatenated-output projects additionally
//! get their bundle reconstructed from the sidecar descriptor, because
//! the prepended upstream content *did* change.

use anyhow::{Context, Result};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::config::{ConfigCache, ProjectConfig};
use crate::outputs::{bundle_info_path, declaration_outputs, expected_outputs};
use crate::status::BuildContext;

/// Sidecar descriptor persisted next to a prepend bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDescriptor {
    /// Byte offset of this project's own emitted content within the
    /// concatenated bundle.
    pub original_offset: u64,
    /// Total bundle length at the time the descriptor was written.
    pub total_length: u64,
}

impl BundleDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bundle descriptor {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse bundle descriptor {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string(self).context("failed to serialize bundle descriptor")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write bundle descriptor {}", path.display()))?;
        Ok(())
    }
}

/// Concatenate the current output bundles of `config`'s `prepend`
/// references in declaration order. `None` when any of them has no
/// readable bundle, which disqualifies both pseudo-builds and
/// orchestrated assembly. Plain references never contribute content.
pub fn prepended_upstream(
    config: &ProjectConfig,
    configs: &mut ConfigCache,
) -> Result<Option<Vec<u8>>> {
    let mut upstream = Vec::new();
    for reference in config.references.iter().filter(|r| r.prepend) {
        let ref_config = configs.load(&reference.target)?;
        let Some(ref_bundle) = ref_config.out_file.as_deref() else {
            debug!(
                "reference {} has no outFile; cannot concatenate",
                reference.target
            );
            return Ok(None);
        };
        match std::fs::read(ref_bundle) {
            Ok(bytes) => upstream.extend_from_slice(&bytes),
            Err(_) => {
                debug!("upstream bundle {} unreadable", ref_bundle.display());
                return Ok(None);
            }
        }
    }
    Ok(Some(upstream))
}

/// Attempt to bring `config`'s outputs up to date without compiling.
///
/// Returns `Ok(false)` — never an error — for every inconsistency that
/// should degrade to a full compile: missing bundle or sidecar,
/// descriptor length mismatch, unreadable upstream bundle, or a
/// `stripInternal` project with `prepend` references.
pub fn try_pseudo_build(
    config: &ProjectConfig,
    configs: &mut ConfigCache,
    timestamp: SystemTime,
    context: &mut BuildContext,
) -> Result<bool> {
    if config.has_prepend_reference() {
        pseudo_build_bundle(config, configs, timestamp, context)
    } else {
        touch_forward(config, timestamp, context)
    }
}

fn pseudo_build_bundle(
    config: &ProjectConfig,
    configs: &mut ConfigCache,
    timestamp: SystemTime,
    context: &mut BuildContext,
) -> Result<bool> {
    if config.strip_internal {
        // The interaction between stripInternal and prepended content
        // is not tracked by the descriptor; take the safe path.
        debug!("{}: stripInternal with prepend, deferring to full build", config.id);
        return Ok(false);
    }

    let Some(bundle_path) = config.out_file.as_deref() else {
        return Ok(false);
    };
    let descriptor_path = bundle_info_path(bundle_path);
    if !bundle_path.is_file() || !descriptor_path.is_file() {
        return Ok(false);
    }

    let descriptor = BundleDescriptor::load(&descriptor_path)?;
    let bundle = std::fs::read(bundle_path)
        .with_context(|| format!("failed to read bundle {}", bundle_path.display()))?;
    if descriptor.total_length != bundle.len() as u64
        || descriptor.original_offset > descriptor.total_length
    {
        warn!(
            "{}: bundle is {} bytes but descriptor records offset {} of {}; falling back to full build",
            config.id,
            bundle.len(),
            descriptor.original_offset,
            descriptor.total_length
        );
        return Ok(false);
    }

    let own = &bundle[descriptor.original_offset as usize..];

    let Some(upstream) = prepended_upstream(config, configs)? else {
        return Ok(false);
    };

    let mut rebuilt = upstream;
    let original_offset = rebuilt.len() as u64;
    rebuilt.extend_from_slice(own);

    std::fs::write(bundle_path, &rebuilt)
        .with_context(|| format!("failed to write bundle {}", bundle_path.display()))?;
    BundleDescriptor {
        original_offset,
        total_length: rebuilt.len() as u64,
    }
    .save(&descriptor_path)?;

    // The declaration bytes did not change; advance its mtime and let
    // downstream analyzers know the content is what they last read.
    for declaration in declaration_outputs(config)? {
        touch_recording_prior(&declaration, timestamp, context)?;
    }

    Ok(true)
}

fn touch_forward(
    config: &ProjectConfig,
    timestamp: SystemTime,
    context: &mut BuildContext,
) -> Result<bool> {
    let outputs = expected_outputs(config)?;
    // All outputs existed when the project classified pseudo-up-to-date;
    // anything missing now means the analysis is stale.
    if outputs.iter().any(|output| !output.is_file()) {
        return Ok(false);
    }

    for output in &outputs {
        touch_recording_prior(output, timestamp, context)?;
    }

    Ok(true)
}

fn touch_recording_prior(
    path: &Path,
    timestamp: SystemTime,
    context: &mut BuildContext,
) -> Result<()> {
    let prior = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("failed to stat output {}", path.display()))?;
    filetime::set_file_mtime(path, FileTime::from_system_time(timestamp))
        .with_context(|| format!("failed to touch output {}", path.display()))?;
    context.unchanged_outputs.insert(path.to_path_buf(), prior);
    Ok(())
}
