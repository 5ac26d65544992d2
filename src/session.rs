//! The session: everything a build walk or watch loop needs, carried
//! as one owned value instead of process-wide state.

use anyhow::Result;
use std::path::PathBuf;

use crate::compile::Compiler;
use crate::config::ConfigCache;
use crate::graph::{ProjectGraph, build_graph};
use crate::paths::ProjectId;
use crate::reporter::Reporter;

/// Knobs of a build walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Rebuild projects even when they are up to date.
    pub force: bool,
    /// Plan only: report decisions, write nothing.
    pub dry: bool,
}

pub struct Session {
    pub cwd: PathBuf,
    pub roots: Vec<ProjectId>,
    pub configs: ConfigCache,
    pub graph: ProjectGraph,
    pub compiler: Box<dyn Compiler>,
    pub options: BuildOptions,
    pub reporter: Reporter,
}

impl Session {
    /// Parse every project reachable from `roots` and compute the
    /// build order.
    pub fn new(
        cwd: PathBuf,
        roots: Vec<ProjectId>,
        compiler: Box<dyn Compiler>,
        options: BuildOptions,
        reporter: Reporter,
    ) -> Result<Self> {
        let mut configs = ConfigCache::new();
        let graph = build_graph(&roots, &mut configs)?;
        Ok(Session {
            cwd,
            roots,
            configs,
            graph,
            compiler,
            options,
            reporter,
        })
    }

    /// Throw away every parsed configuration and rediscover the graph.
    /// Used when a watched configuration file changes.
    pub fn rebuild_graph(&mut self) -> Result<()> {
        self.configs.clear();
        self.graph = build_graph(&self.roots, &mut self.configs)?;
        Ok(())
    }
}
