//! The build orchestrator.
//!
//! Walks the layered queue from the deepest dependencies up, asks the
//! analyzer what each project needs, and dispatches: nothing, a
//! pseudo-build, or the compiler. Emit interception lives here so the
//! identical-declaration memoization and bundle assembly behave the
//! same no matter which compiler implementation is behind the seam.

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info};

use crate::compile::{CompileOutput, Compiler};
use crate::config::{ConfigCache, ProjectConfig};
use crate::files::is_declaration_file;
use crate::outputs::bundle_info_path;
use crate::pseudo::{BundleDescriptor, prepended_upstream, try_pseudo_build};
use crate::reporter::{BuildAction, Reporter};
use crate::session::Session;
use crate::status::{BuildContext, UpToDateStatus, up_to_date_status};

/// Walk the whole queue once. Returns `false` when any project failed
/// fatally; remaining projects are not attempted.
pub fn run_build(session: &mut Session) -> Result<bool> {
    let Session {
        cwd,
        configs,
        graph,
        compiler,
        options,
        reporter,
        ..
    } = session;

    let mut context = BuildContext::new();
    // Clone so the walk cannot disturb the session's queue.
    let queue = graph.queue.clone();
    info!("building {} projects", queue.project_count());

    for id in queue.build_order() {
        let config = match configs.load(id) {
            Ok(config) => config,
            Err(err) => {
                reporter.error(&format!("{err:#}"));
                return Ok(false);
            }
        };

        let status = match up_to_date_status(&config, configs, &context) {
            Ok(status) => status,
            Err(err) => {
                reporter.error(&format!("{err:#}"));
                return Ok(false);
            }
        };
        reporter.report_status(cwd, id, &status);

        if status.needs_build() {
            context.projects_needing_build.insert(id.clone());
        }

        match status {
            UpToDateStatus::Unbuildable { .. } => return Ok(false),
            UpToDateStatus::UpToDate { .. } => {
                if !options.force || config.input_files.is_empty() {
                    continue;
                }
                reporter.report_action(cwd, id, BuildAction::Compile, options.dry);
                if !options.dry
                    && !compile_project(compiler.as_mut(), reporter, &config, configs, &mut context)?
                {
                    return Ok(false);
                }
            }
            UpToDateStatus::PseudoUpToDate { .. } => {
                if options.force {
                    reporter.report_action(cwd, id, BuildAction::Compile, options.dry);
                    if !options.dry
                        && !compile_project(
                            compiler.as_mut(),
                            reporter,
                            &config,
                            configs,
                            &mut context,
                        )?
                    {
                        return Ok(false);
                    }
                    continue;
                }
                reporter.report_action(cwd, id, BuildAction::PseudoBuild, options.dry);
                if options.dry {
                    continue;
                }
                if try_pseudo_build(&config, configs, SystemTime::now(), &mut context)? {
                    continue;
                }
                debug!("{id}: pseudo-build not possible, compiling");
                if !compile_project(compiler.as_mut(), reporter, &config, configs, &mut context)? {
                    return Ok(false);
                }
            }
            UpToDateStatus::Missing { .. }
            | UpToDateStatus::OutOfDate { .. }
            | UpToDateStatus::OlderThanDependency { .. } => {
                reporter.report_action(cwd, id, BuildAction::Compile, options.dry);
                if !options.dry
                    && !compile_project(compiler.as_mut(), reporter, &config, configs, &mut context)?
                {
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

/// Run the compiler for one project and write its emits. `Ok(false)`
/// means a fatal diagnostic: the walk must stop.
fn compile_project(
    compiler: &mut dyn Compiler,
    reporter: &Reporter,
    config: &ProjectConfig,
    configs: &mut ConfigCache,
    context: &mut BuildContext,
) -> Result<bool> {
    let output = compiler.compile(config)?;

    if output.flags.syntactic {
        reporter.error(&format!("{}: compilation failed, no outputs written", config.id));
        return Ok(false);
    }

    write_emits(config, configs, &output, context)?;

    if output.flags.any_error() {
        reporter.error(&format!("{}: compiled with errors", config.id));
        return Ok(false);
    }

    Ok(true)
}

fn write_emits(
    config: &ProjectConfig,
    configs: &mut ConfigCache,
    output: &CompileOutput,
    context: &mut BuildContext,
) -> Result<()> {
    let bundle_path = if config.has_prepend_reference() {
        config.out_file.as_deref()
    } else {
        None
    };

    for emit in &output.emits {
        if Some(emit.path.as_path()) == bundle_path {
            continue;
        }
        write_one_emit(&emit.path, &emit.text, output, config, context)?;
    }

    if let Some(bundle) = bundle_path {
        let Some(emit) = output.emit_for(bundle) else {
            bail!("{}: compiler produced no bundle for {}", config.id, bundle.display());
        };
        write_bundle(
            config,
            configs,
            bundle,
            &emit.text,
            output.bundle_includes_prepends,
        )?;
    }

    Ok(())
}

fn write_one_emit(
    path: &Path,
    text: &[u8],
    output: &CompileOutput,
    config: &ProjectConfig,
    context: &mut BuildContext,
) -> Result<()> {
    if is_declaration_file(path) {
        if output.flags.declaration {
            debug!("{}: declaration diagnostics, skipping {}", config.id, path.display());
            return Ok(());
        }
        if let Ok(existing) = std::fs::read(path)
            && existing == text
            && let Ok(prior) = std::fs::metadata(path).and_then(|meta| meta.modified())
        {
            // Identical interface: remember the pre-write mtime so
            // downstream projects can skip their rebuild.
            context.unchanged_outputs.insert(path.to_path_buf(), prior);
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }
    std::fs::write(path, text)
        .with_context(|| format!("failed to write output {}", path.display()))?;
    Ok(())
}

/// Assemble and persist a prepend bundle plus its descriptor. The
/// pseudo-builder reconstructs through the same upstream concatenation,
/// which keeps the descriptor and bundle byte-compatible between full
/// and pseudo builds.
fn write_bundle(
    config: &ProjectConfig,
    configs: &mut ConfigCache,
    bundle_path: &Path,
    emitted: &[u8],
    includes_prepends: bool,
) -> Result<()> {
    let Some(upstream) = prepended_upstream(config, configs)? else {
        bail!(
            "{}: a referenced project has no bundle output to prepend",
            config.id
        );
    };

    let (bytes, original_offset) = if includes_prepends {
        if (upstream.len() as u64) > emitted.len() as u64 {
            bail!(
                "{}: emitted bundle is shorter than its prepended references",
                config.id
            );
        }
        (emitted.to_vec(), upstream.len() as u64)
    } else {
        let mut assembled = upstream;
        let offset = assembled.len() as u64;
        assembled.extend_from_slice(emitted);
        (assembled, offset)
    };

    if let Some(parent) = bundle_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }
    std::fs::write(bundle_path, &bytes)
        .with_context(|| format!("failed to write bundle {}", bundle_path.display()))?;

    BundleDescriptor {
        original_offset,
        total_length: bytes.len() as u64,
    }
    .save(&bundle_info_path(bundle_path))?;

    Ok(())
}
