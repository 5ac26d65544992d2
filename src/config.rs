//! Project configuration: `tsconfig.json` parsing and resolution.
//!
//! Parsing tolerates JSONC (comments, trailing commas) and `extends`
//! chains. Resolution turns the raw file into a [`ProjectConfig`] with
//! absolute input paths, canonical reference targets, and the emit
//! options the orchestrator consumes.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::files::{self, FileDiscoveryOptions};
use crate::paths::{ProjectId, canonical_project_path, resolve_config_path};

/// Raw shape of a `tsconfig.json` file, before resolution.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TsConfig {
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub compiler_options: Option<CompilerOptions>,
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub references: Option<Vec<RawReference>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    #[serde(default)]
    pub root_dir: Option<String>,
    #[serde(default)]
    pub out_dir: Option<String>,
    #[serde(default)]
    pub out_file: Option<String>,
    #[serde(default)]
    pub declaration: Option<bool>,
    #[serde(default)]
    pub strip_internal: Option<bool>,
}

/// One entry of the `references` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReference {
    pub path: String,
    #[serde(default)]
    pub prepend: Option<bool>,
}

/// Whether a watched wildcard directory covers subdirectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDepth {
    Recursive,
    Flat,
}

/// A resolved reference edge to another project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectReference {
    pub target: ProjectId,
    pub prepend: bool,
}

/// Fully resolved description of one project.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub id: ProjectId,
    /// Sorted absolute paths of the project's source files.
    pub input_files: Vec<PathBuf>,
    /// References in declaration order.
    pub references: Vec<ProjectReference>,
    pub out_dir: Option<PathBuf>,
    pub out_file: Option<PathBuf>,
    pub root_dir: Option<PathBuf>,
    pub declaration: bool,
    pub strip_internal: bool,
    /// Directories derived from `include` patterns, for watch mode.
    pub wildcard_directories: Vec<(PathBuf, WatchDepth)>,
}

impl ProjectConfig {
    /// Root against which output-relative paths are computed.
    pub fn effective_root_dir(&self) -> &Path {
        self.root_dir.as_deref().unwrap_or_else(|| self.id.dir())
    }

    pub fn has_prepend_reference(&self) -> bool {
        self.references.iter().any(|r| r.prepend)
    }
}

/// Parse JSONC source into the raw config shape.
pub fn parse_tsconfig(source: &str) -> Result<TsConfig> {
    let stripped = strip_jsonc(source);
    let normalized = remove_trailing_commas(&stripped);
    let config = serde_json::from_str(&normalized).context("failed to parse tsconfig JSON")?;
    Ok(config)
}

/// Load a `tsconfig.json`, following `extends` chains.
pub fn load_tsconfig(path: &Path) -> Result<TsConfig> {
    let mut visited = HashSet::new();
    load_tsconfig_inner(path, &mut visited)
}

fn load_tsconfig_inner(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<TsConfig> {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical.clone()) {
        bail!("tsconfig extends cycle detected at {}", canonical.display());
    }

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tsconfig: {}", path.display()))?;
    let mut config = parse_tsconfig(&source)
        .with_context(|| format!("failed to parse tsconfig: {}", path.display()))?;

    let extends = config.extends.take();
    if let Some(extends_path) = extends {
        let base_path = resolve_extends_path(path, &extends_path)?;
        let base_config = load_tsconfig_inner(&base_path, visited)?;
        config = merge_configs(base_config, config);
    }

    visited.remove(&canonical);
    Ok(config)
}

fn resolve_extends_path(current_path: &Path, extends: &str) -> Result<PathBuf> {
    let base_dir = current_path
        .parent()
        .with_context(|| format!("tsconfig has no parent directory: {}", current_path.display()))?;
    let mut candidate = PathBuf::from(extends);
    if candidate.extension().is_none() {
        candidate.set_extension("json");
    }

    if candidate.is_absolute() {
        Ok(candidate)
    } else {
        Ok(base_dir.join(candidate))
    }
}

fn merge_configs(base: TsConfig, mut child: TsConfig) -> TsConfig {
    let compiler_options = match (base.compiler_options, child.compiler_options.take()) {
        (Some(base_opts), Some(child_opts)) => Some(merge_compiler_options(base_opts, child_opts)),
        (Some(base_opts), None) => Some(base_opts),
        (None, child_opts) => child_opts,
    };

    TsConfig {
        extends: None,
        compiler_options,
        include: child.include.or(base.include),
        exclude: child.exclude.or(base.exclude),
        files: child.files.or(base.files),
        // References are not inherited through extends, matching tsc.
        references: child.references,
    }
}

fn merge_compiler_options(base: CompilerOptions, child: CompilerOptions) -> CompilerOptions {
    CompilerOptions {
        root_dir: child.root_dir.or(base.root_dir),
        out_dir: child.out_dir.or(base.out_dir),
        out_file: child.out_file.or(base.out_file),
        declaration: child.declaration.or(base.declaration),
        strip_internal: child.strip_internal.or(base.strip_internal),
    }
}

/// Load and fully resolve the project identified by `id`.
///
/// Fails on unreadable or unparsable configuration, and on
/// `outFile`/`outDir` both being set.
pub fn load_project_config(id: &ProjectId) -> Result<ProjectConfig> {
    let raw = load_tsconfig(id.as_path())?;
    resolve_project_config(id, &raw)
}

pub fn resolve_project_config(id: &ProjectId, raw: &TsConfig) -> Result<ProjectConfig> {
    let base_dir = id.dir().to_path_buf();
    let options = raw.compiler_options.clone().unwrap_or_default();

    let out_dir = non_empty(options.out_dir.as_deref())
        .map(|dir| canonical_project_path(&base_dir, Path::new(dir)));
    let out_file = non_empty(options.out_file.as_deref())
        .map(|file| canonical_project_path(&base_dir, Path::new(file)));
    let root_dir = non_empty(options.root_dir.as_deref())
        .map(|dir| canonical_project_path(&base_dir, Path::new(dir)));

    if out_dir.is_some() && out_file.is_some() {
        bail!(
            "{}: compilerOptions.outFile and compilerOptions.outDir are mutually exclusive",
            id
        );
    }

    let discovery = FileDiscoveryOptions::from_tsconfig(id.as_path(), raw, out_dir.as_deref());
    let input_files = files::discover_input_files(&discovery)
        .with_context(|| format!("failed to enumerate input files for {id}"))?;
    let wildcard_directories = files::wildcard_directories(&discovery);

    let mut references = Vec::new();
    for raw_ref in raw.references.iter().flatten() {
        let target_path = resolve_config_path(&base_dir, Path::new(&raw_ref.path));
        references.push(ProjectReference {
            target: ProjectId::from_canonical(target_path),
            prepend: raw_ref.prepend.unwrap_or(false),
        });
    }

    Ok(ProjectConfig {
        id: id.clone(),
        input_files,
        references,
        out_dir,
        out_file,
        root_dir,
        declaration: options.declaration.unwrap_or(false),
        strip_internal: options.strip_internal.unwrap_or(false),
        wildcard_directories,
    })
}

/// Lazily-parsed project configurations, keyed by canonical id.
///
/// Owned by the session; cleared wholesale when a configuration file
/// changes under watch.
#[derive(Debug, Default)]
pub struct ConfigCache {
    configs: rustc_hash::FxHashMap<ProjectId, std::sync::Arc<ProjectConfig>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration for `id`, parsing it on first use.
    pub fn load(&mut self, id: &ProjectId) -> Result<std::sync::Arc<ProjectConfig>> {
        if let Some(config) = self.configs.get(id) {
            return Ok(config.clone());
        }
        let config = std::sync::Arc::new(load_project_config(id)?);
        self.configs.insert(id.clone(), config.clone());
        Ok(config)
    }

    /// Insert an already-resolved configuration, bypassing the parser.
    pub fn seed(&mut self, config: ProjectConfig) {
        self.configs
            .insert(config.id.clone(), std::sync::Arc::new(config));
    }

    /// Drop one project's cached configuration.
    pub fn invalidate(&mut self, id: &ProjectId) {
        self.configs.remove(id);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    match value {
        Some(text) if !text.trim().is_empty() => Some(text.trim()),
        _ => None,
    }
}

fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape = false;
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(ch) = chars.next() {
        if in_line_comment {
            if ch == '\n' {
                in_line_comment = false;
                out.push(ch);
            }
            continue;
        }

        if in_block_comment {
            if ch == '*' {
                if let Some('/') = chars.peek().copied() {
                    chars.next();
                    in_block_comment = false;
                }
            } else if ch == '\n' {
                out.push(ch);
            }
            continue;
        }

        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
            out.push(ch);
            continue;
        }

        if ch == '/'
            && let Some(&next) = chars.peek()
        {
            if next == '/' {
                chars.next();
                in_line_comment = true;
                continue;
            }
            if next == '*' {
                chars.next();
                in_block_comment = true;
                continue;
            }
        }

        out.push(ch);
    }

    out
}

fn remove_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
            out.push(ch);
            continue;
        }

        if ch == ',' {
            let mut lookahead = chars.clone();
            while let Some(next) = lookahead.peek().copied() {
                if next.is_whitespace() {
                    lookahead.next();
                    continue;
                }
                break;
            }

            if let Some(next) = lookahead.peek().copied()
                && (next == '}' || next == ']')
            {
                continue;
            }
        }

        out.push(ch);
    }

    out
}
