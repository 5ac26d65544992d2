//! Dependency-graph visualization: DOT emission plus an external
//! `dot` invocation for SVG rendering.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;
use tracing::warn;

use crate::paths::relative_for_display;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VizMode {
    /// Projects and reference edges only.
    Flat,
    /// Annotate projects with their emit mode and input count.
    Deep,
}

/// Render the session's reference graph as DOT text.
pub fn write_dot(session: &mut Session, mode: VizMode) -> Result<String> {
    let mut dot = String::new();
    writeln!(dot, "digraph projects {{")?;
    writeln!(dot, "    rankdir=LR;")?;
    writeln!(dot, "    node [shape=box, fontname=\"monospace\"];")?;

    let ids: Vec<_> = session.graph.queue.build_order().cloned().collect();
    for id in &ids {
        let label = relative_for_display(&session.cwd, id.as_path())
            .display()
            .to_string();
        match mode {
            VizMode::Flat => {
                writeln!(dot, "    \"{}\" [label=\"{}\"];", escape(&label), escape(&label))?;
            }
            VizMode::Deep => {
                let config = session.configs.load(id)?;
                let emit = if config.out_file.is_some() {
                    "bundle"
                } else if config.input_files.is_empty() {
                    "solution"
                } else {
                    "outDir"
                };
                writeln!(
                    dot,
                    "    \"{}\" [label=\"{}\\n{} · {} inputs\"];",
                    escape(&label),
                    escape(&label),
                    emit,
                    config.input_files.len()
                )?;
            }
        }
    }

    for id in &ids {
        let config = session.configs.load(id)?;
        let from = relative_for_display(&session.cwd, id.as_path())
            .display()
            .to_string();
        for reference in &config.references {
            let to = relative_for_display(&session.cwd, reference.target.as_path())
                .display()
                .to_string();
            if reference.prepend {
                writeln!(
                    dot,
                    "    \"{}\" -> \"{}\" [style=bold, label=\"prepend\"];",
                    escape(&from),
                    escape(&to)
                )?;
            } else {
                writeln!(dot, "    \"{}\" -> \"{}\";", escape(&from), escape(&to))?;
            }
        }
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}

/// Write `project-graph.dot` and render `project-graph.svg` through
/// the external `dot` renderer. A missing renderer leaves the DOT file
/// behind with a warning.
pub fn render(session: &mut Session, mode: VizMode) -> Result<()> {
    let dot_text = write_dot(session, mode)?;
    let dot_path = session.cwd.join("project-graph.dot");
    let svg_path = session.cwd.join("project-graph.svg");

    std::fs::write(&dot_path, &dot_text)
        .with_context(|| format!("failed to write {}", dot_path.display()))?;

    let status = Command::new("dot")
        .arg("-Tsvg")
        .arg(&dot_path)
        .arg("-o")
        .arg(&svg_path)
        .status();

    match status {
        Ok(status) if status.success() => {
            println!("Wrote {}", relative_for_display(&session.cwd, &svg_path).display());
        }
        Ok(status) => {
            warn!("dot exited with {status}; DOT source left at {}", dot_path.display());
        }
        Err(err) => {
            warn!(
                "could not run 'dot' ({err}); DOT source left at {}",
                dot_path.display()
            );
        }
    }

    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
