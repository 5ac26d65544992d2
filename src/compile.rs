//! The compiler seam.
//!
//! The orchestrator treats the compiler as an opaque service that turns
//! a project into emitted file texts plus diagnostic flags. Keeping the
//! emitted bytes in the result (instead of letting the compiler write
//! them) is what lets the orchestrator apply its emit rules uniformly:
//! identical-declaration memoization, declaration suppression, and
//! bundle assembly.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ProjectConfig;
use crate::outputs::expected_outputs;

/// One emitted file: where it belongs and what it holds.
#[derive(Debug, Clone)]
pub struct Emit {
    pub path: PathBuf,
    pub text: Vec<u8>,
}

/// Diagnostic classes the orchestrator dispatches on.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticFlags {
    /// Parse or option errors: nothing may be emitted.
    pub syntactic: bool,
    /// Declaration-emit errors: `.d.ts` writes are suppressed.
    pub declaration: bool,
    /// Type errors: reported, but outputs are still written.
    pub semantic: bool,
}

impl DiagnosticFlags {
    pub fn any_error(&self) -> bool {
        self.syntactic || self.declaration || self.semantic
    }
}

/// Everything the orchestrator needs back from one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub emits: Vec<Emit>,
    pub flags: DiagnosticFlags,
    /// For a project with `prepend` references: whether the emitted
    /// bundle already contains the upstream content, or only this
    /// project's own contribution.
    pub bundle_includes_prepends: bool,
}

impl CompileOutput {
    pub fn emit_for(&self, path: &Path) -> Option<&Emit> {
        self.emits.iter().find(|emit| emit.path == path)
    }
}

/// An opaque compilation service.
pub trait Compiler {
    fn compile(&mut self, config: &ProjectConfig) -> Result<CompileOutput>;
}

/// Invokes an external `tsc`-compatible executable, redirecting its
/// emit into a staging directory and reading the staged bytes back so
/// the orchestrator owns every write to the real output paths.
pub struct CommandCompiler {
    program: PathBuf,
}

impl CommandCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandCompiler {
            program: program.into(),
        }
    }

    fn staging_dir(&self, config: &ProjectConfig) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tag = config
            .id
            .dir()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("project");
        std::env::temp_dir().join(format!("tsbuild_stage_{}_{}_{}", std::process::id(), tag, nanos))
    }
}

impl Compiler for CommandCompiler {
    fn compile(&mut self, config: &ProjectConfig) -> Result<CompileOutput> {
        let stage = self.staging_dir(config);
        std::fs::create_dir_all(&stage)
            .with_context(|| format!("failed to create staging directory {}", stage.display()))?;

        let mut command = Command::new(&self.program);
        command.arg("-p").arg(config.id.as_path());
        if let Some(out_file) = config.out_file.as_deref() {
            let staged_bundle = stage.join(out_file.file_name().unwrap_or_default());
            command.arg("--outFile").arg(&staged_bundle);
        } else {
            command.arg("--outDir").arg(&stage);
        }

        debug!("invoking compiler: {command:?}");
        let status = command
            .status()
            .with_context(|| format!("failed to run compiler '{}'", self.program.display()))?;

        // Exit classes follow tsc: 1 means diagnostics with outputs
        // skipped, 2 means diagnostics with outputs generated.
        let mut flags = DiagnosticFlags::default();
        match status.code() {
            Some(0) => {}
            Some(1) => flags.syntactic = true,
            Some(2) => flags.semantic = true,
            other => {
                let _ = std::fs::remove_dir_all(&stage);
                bail!(
                    "compiler '{}' terminated abnormally ({:?})",
                    self.program.display(),
                    other
                );
            }
        }

        let emits = if flags.syntactic {
            Vec::new()
        } else {
            collect_staged_emits(config, &stage)?
        };

        if let Err(err) = std::fs::remove_dir_all(&stage) {
            warn!("failed to remove staging directory {}: {err}", stage.display());
        }

        Ok(CompileOutput {
            emits,
            flags,
            // A real tsc concatenates prepended references itself.
            bundle_includes_prepends: true,
        })
    }
}

/// Map staged files back to the project's real output paths.
fn collect_staged_emits(config: &ProjectConfig, stage: &Path) -> Result<Vec<Emit>> {
    let mut emits = Vec::new();

    if config.out_file.is_some() {
        for expected in expected_outputs(config)? {
            let staged = stage.join(expected.file_name().unwrap_or_default());
            if staged.is_file() {
                let text = std::fs::read(&staged)
                    .with_context(|| format!("failed to read staged emit {}", staged.display()))?;
                emits.push(Emit {
                    path: expected,
                    text,
                });
            }
        }
        return Ok(emits);
    }

    let Some(out_dir) = config.out_dir.as_deref() else {
        bail!("{}: compilerOptions.outDir is required when outFile is not set", config.id);
    };
    for entry in WalkDir::new(stage) {
        let entry = entry.context("failed to read staging directory entry")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(stage).unwrap_or(entry.path());
        let text = std::fs::read(entry.path())
            .with_context(|| format!("failed to read staged emit {}", entry.path().display()))?;
        emits.push(Emit {
            path: out_dir.join(rel),
            text,
        });
    }

    emits.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(emits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_flags_any_error() {
        let mut flags = DiagnosticFlags::default();
        assert!(!flags.any_error());
        flags.semantic = true;
        assert!(flags.any_error());
    }

    #[test]
    fn emit_lookup_by_path() {
        let output = CompileOutput {
            emits: vec![Emit {
                path: PathBuf::from("/out/a.js"),
                text: b"var a;".to_vec(),
            }],
            ..Default::default()
        };
        assert!(output.emit_for(Path::new("/out/a.js")).is_some());
        assert!(output.emit_for(Path::new("/out/b.js")).is_none());
    }
}
