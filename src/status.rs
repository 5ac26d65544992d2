//! Up-to-date analysis.
//!
//! Classifies a project against its inputs, its expected outputs, and
//! the outputs of the projects it references. The pseudo-timestamp
//! reconciliation against [`BuildContext::unchanged_outputs`] is what
//! keeps a byte-identical upstream declaration from cascading a full
//! rebuild downstream.

use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ConfigCache, ProjectConfig};
use crate::outputs::{declaration_outputs, expected_outputs, js_outputs};
use crate::paths::ProjectId;

/// Per-walk memory shared between the orchestrator, the analyzer, and
/// the pseudo-builder. Passed explicitly down the call chain; never
/// ambient.
#[derive(Debug, Default)]
pub struct BuildContext {
    /// Output path → mtime it carried *before* a write or touch that
    /// left its bytes identical. The analyzer treats the file as if it
    /// were still at that earlier timestamp when judging downstream
    /// staleness.
    pub unchanged_outputs: FxHashMap<PathBuf, SystemTime>,
    /// Projects whose status this walk was anything but `UpToDate`.
    /// Lets a dry run classify downstream projects as
    /// `OlderThanDependency` even though nothing was written.
    pub projects_needing_build: FxHashSet<ProjectId>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Result of analyzing one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpToDateStatus {
    /// An input file is missing; the project cannot be built.
    Unbuildable { missing_input: PathBuf },
    /// Outputs are newer than every input; nothing to do.
    UpToDate { newest_input: SystemTime },
    /// Upstream outputs changed mtimes but not bytes; a touch-forward
    /// suffices.
    PseudoUpToDate { newest_input: SystemTime },
    /// An expected output does not exist.
    Missing { output: PathBuf },
    /// An input is strictly newer than the oldest output.
    OutOfDate {
        newer_input: PathBuf,
        newer_input_time: SystemTime,
        older_output: PathBuf,
        older_output_time: SystemTime,
    },
    /// A referenced project needs building, so this one will too.
    OlderThanDependency { dependency: ProjectId },
}

impl UpToDateStatus {
    /// Whether the orchestrator must do *something* for this project.
    pub fn needs_build(&self) -> bool {
        !matches!(self, UpToDateStatus::UpToDate { .. })
    }
}

/// Classify `config` relative to its inputs, outputs, and upstream
/// reference outputs.
///
/// Errors are reserved for configuration problems (unresolvable output
/// layout, unparsable referenced config); everything observable about
/// the filesystem comes back as a status.
pub fn up_to_date_status(
    config: &ProjectConfig,
    configs: &mut ConfigCache,
    context: &BuildContext,
) -> Result<UpToDateStatus> {
    // A solution aggregator has nothing to build.
    if config.input_files.is_empty() {
        return Ok(UpToDateStatus::UpToDate {
            newest_input: UNIX_EPOCH,
        });
    }

    let mut newest_input: (PathBuf, SystemTime) = (PathBuf::new(), UNIX_EPOCH);
    for input in &config.input_files {
        let Some(mtime) = mtime_of(input) else {
            return Ok(UpToDateStatus::Unbuildable {
                missing_input: input.clone(),
            });
        };
        if mtime > newest_input.1 {
            newest_input = (input.clone(), mtime);
        }
    }

    let outputs = expected_outputs(config)?;
    if outputs.is_empty() {
        return Ok(UpToDateStatus::UpToDate {
            newest_input: newest_input.1,
        });
    }

    let mut oldest_output: (PathBuf, SystemTime) = (PathBuf::new(), SystemTime::now());
    let mut have_output = false;
    for output in &outputs {
        let Some(mtime) = mtime_of(output) else {
            return Ok(UpToDateStatus::Missing {
                output: output.clone(),
            });
        };
        if !have_output || mtime < oldest_output.1 {
            oldest_output = (output.clone(), mtime);
            have_output = true;
        }
        if newest_input.1 > oldest_output.1 {
            return Ok(UpToDateStatus::OutOfDate {
                newer_input: newest_input.0,
                newer_input_time: newest_input.1,
                older_output: oldest_output.0,
                older_output_time: oldest_output.1,
            });
        }
    }
    let (oldest_output_path, oldest_output_time) = oldest_output;

    let mut used_pseudo_timestamp = false;
    let mut newest_pseudo_input = UNIX_EPOCH;

    for reference in &config.references {
        let ref_config = configs.load(&reference.target)?;
        let mut upstream = declaration_outputs(&ref_config)?;
        if config.out_file.is_some() && reference.prepend {
            // The bundle embeds this reference's JavaScript too.
            upstream.extend(js_outputs(&ref_config)?);
        }

        for file in upstream {
            let Some(mtime) = mtime_of(&file) else {
                // Upstream output not on disk; the needing-build marker
                // below decides what that means for us.
                continue;
            };

            if let Some(&prior) = context.unchanged_outputs.get(&file)
                && oldest_output_time >= prior
            {
                // Byte-identical versus what we last consumed.
                used_pseudo_timestamp = true;
                if mtime > newest_pseudo_input {
                    newest_pseudo_input = mtime;
                }
                continue;
            }

            if mtime > newest_input.1 {
                newest_input = (file.clone(), mtime);
            }
            if newest_input.1 > oldest_output_time {
                return Ok(UpToDateStatus::OutOfDate {
                    newer_input: newest_input.0,
                    newer_input_time: newest_input.1,
                    older_output: oldest_output_path,
                    older_output_time: oldest_output_time,
                });
            }
        }
    }

    if used_pseudo_timestamp {
        return Ok(UpToDateStatus::PseudoUpToDate {
            newest_input: newest_input.1.max(newest_pseudo_input),
        });
    }

    for reference in &config.references {
        if context.projects_needing_build.contains(&reference.target) {
            return Ok(UpToDateStatus::OlderThanDependency {
                dependency: reference.target.clone(),
            });
        }
    }

    Ok(UpToDateStatus::UpToDate {
        newest_input: newest_input.1,
    })
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
