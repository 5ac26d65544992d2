//! Expected output enumeration for a project.
//!
//! The analyzer and the pseudo-builder both need to know, without
//! consulting the compiler, exactly which artifact paths a project
//! would emit.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use crate::config::ProjectConfig;
use crate::files::is_declaration_file;

/// Compute the full set of artifact paths `config` would emit.
///
/// A project with no input files is a solution aggregator and emits
/// nothing. In the `outFile` mode the outputs are the bundle and, with
/// `declaration`, its `.d.ts` sibling. Otherwise each input maps under
/// `outDir` relative to the root directory; `outDir` absent in that
/// mode is a configuration error.
pub fn expected_outputs(config: &ProjectConfig) -> Result<Vec<PathBuf>> {
    if config.input_files.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(out_file) = config.out_file.as_deref() {
        let mut outputs = vec![out_file.to_path_buf()];
        if config.declaration {
            outputs.push(change_extension(out_file, "d.ts"));
        }
        return Ok(outputs);
    }

    let Some(out_dir) = config.out_dir.as_deref() else {
        bail!(
            "{}: compilerOptions.outDir is required when outFile is not set",
            config.id
        );
    };

    let root_dir = config.effective_root_dir();
    let mut outputs = Vec::new();
    for input in &config.input_files {
        if is_declaration_file(input) {
            continue;
        }
        let rel = input.strip_prefix(root_dir).unwrap_or(input.as_path());
        let target = out_dir.join(rel);
        outputs.push(change_extension(&target, "js"));
        if config.declaration {
            outputs.push(change_extension(&target, "d.ts"));
        }
    }

    Ok(outputs)
}

/// Declaration outputs only: the interface surface downstream projects
/// consume.
pub fn declaration_outputs(config: &ProjectConfig) -> Result<Vec<PathBuf>> {
    Ok(expected_outputs(config)?
        .into_iter()
        .filter(|path| is_declaration_file(path))
        .collect())
}

/// JavaScript outputs only: consumed downstream when the consumer
/// concatenates into a bundle.
pub fn js_outputs(config: &ProjectConfig) -> Result<Vec<PathBuf>> {
    Ok(expected_outputs(config)?
        .into_iter()
        .filter(|path| !is_declaration_file(path))
        .collect())
}

/// Sidecar descriptor path for a bundle: `.js` swapped for
/// `.bundle_info`.
pub fn bundle_info_path(out_file: &Path) -> PathBuf {
    change_extension(out_file, "bundle_info")
}

/// Replace the final extension of `path` with `ext`. A `.d.ts` suffix
/// counts as one extension.
fn change_extension(path: &Path, ext: &str) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let stem = if let Some(stripped) = name.strip_suffix(".d.ts") {
        stripped
    } else {
        name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
    };
    path.with_file_name(format!("{stem}.{ext}"))
}
