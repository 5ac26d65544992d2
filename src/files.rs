//! File discovery: project inputs, root scanning, and glob expansion.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::{TsConfig, WatchDepth};

pub(crate) const DEFAULT_EXCLUDES: [&str; 3] =
    ["node_modules", "bower_components", "jspm_packages"];

#[derive(Debug, Clone)]
pub struct FileDiscoveryOptions {
    pub base_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub out_dir: Option<PathBuf>,
}

impl FileDiscoveryOptions {
    pub fn from_tsconfig(config_path: &Path, config: &TsConfig, out_dir: Option<&Path>) -> Self {
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let files = config
            .files
            .as_ref()
            .map(|list| list.iter().map(PathBuf::from).collect())
            .unwrap_or_default();

        FileDiscoveryOptions {
            base_dir,
            files,
            include: config.include.clone(),
            exclude: config.exclude.clone(),
            out_dir: out_dir.map(Path::to_path_buf),
        }
    }
}

/// Enumerate a project's input files: explicit `files` entries plus
/// `include`/`exclude` pattern matches, sorted and absolute.
///
/// Explicit entries are listed even when absent on disk; whether a
/// missing input is an error is the up-to-date analyzer's call, not
/// discovery's.
pub fn discover_input_files(options: &FileDiscoveryOptions) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for file in &options.files {
        files.insert(resolve_file_path(&options.base_dir, file));
    }

    let include_patterns = build_include_patterns(options);
    if !include_patterns.is_empty() {
        let include_set =
            build_globset(&include_patterns).context("failed to build include globset")?;
        let exclude_patterns = build_exclude_patterns(options);
        let exclude_set = if exclude_patterns.is_empty() {
            None
        } else {
            Some(build_globset(&exclude_patterns).context("failed to build exclude globset")?)
        };

        let walker = WalkDir::new(&options.base_dir)
            .into_iter()
            .filter_entry(|entry| allow_entry(entry, &options.base_dir, exclude_set.as_ref()));

        for entry in walker {
            let entry = entry.context("failed to read directory entry")?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !is_source_file(path) {
                continue;
            }

            let rel_path = path.strip_prefix(&options.base_dir).unwrap_or(path);
            if !include_set.is_match(rel_path) {
                continue;
            }

            if let Some(exclude) = exclude_set.as_ref()
                && exclude.is_match(rel_path)
            {
                continue;
            }

            files.insert(path.to_path_buf());
        }
    }

    Ok(files.into_iter().collect())
}

/// Directories implied by `include` patterns, for watch mode: the
/// literal prefix of each pattern, recursive when the pattern reaches
/// into subdirectories.
pub fn wildcard_directories(options: &FileDiscoveryOptions) -> Vec<(PathBuf, WatchDepth)> {
    let patterns = build_include_patterns(options);
    let mut seen = BTreeSet::new();
    let mut dirs = Vec::new();

    for pattern in &patterns {
        let (prefix, rest) = split_literal_prefix(pattern);
        let dir = if prefix.is_empty() {
            options.base_dir.clone()
        } else {
            options.base_dir.join(prefix)
        };
        let depth = if rest.contains("**") {
            WatchDepth::Recursive
        } else {
            WatchDepth::Flat
        };
        if seen.insert((dir.clone(), depth == WatchDepth::Recursive)) {
            dirs.push((dir, depth));
        }
    }

    dirs
}

/// Split a glob pattern into its literal directory prefix and the
/// remainder starting at the first metacharacter-bearing segment.
fn split_literal_prefix(pattern: &str) -> (String, &str) {
    let mut prefix = String::new();
    let mut rest = pattern;
    while let Some(slash) = rest.find('/') {
        let segment = &rest[..slash];
        if contains_glob_meta(segment) {
            break;
        }
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        rest = &rest[slash + 1..];
    }
    if contains_glob_meta(rest) || rest.is_empty() {
        (prefix, rest)
    } else {
        // Pattern with no metacharacters names a file; watch its directory.
        (prefix, "")
    }
}

/// Recursively scan `dir` for `tsconfig.json` files, skipping the
/// default excluded directories.
pub fn scan_for_configs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut configs = Vec::new();
    let walker = WalkDir::new(dir).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || entry
                .file_name()
                .to_str()
                .map(|name| !DEFAULT_EXCLUDES.contains(&name) && !name.starts_with('.'))
                .unwrap_or(true)
    });

    for entry in walker {
        let entry = entry.context("failed to read directory entry")?;
        if entry.file_type().is_file() && entry.file_name() == "tsconfig.json" {
            configs.push(entry.path().to_path_buf());
        }
    }

    configs.sort();
    Ok(configs)
}

/// Expand a positional argument that names no existing path as a glob
/// relative to `cwd`.
pub fn expand_glob_root(cwd: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let glob = Glob::new(pattern)
        .with_context(|| format!("invalid glob pattern '{pattern}'"))?
        .compile_matcher();

    let mut matches = Vec::new();
    let walker = WalkDir::new(cwd).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || entry
                .file_name()
                .to_str()
                .map(|name| !DEFAULT_EXCLUDES.contains(&name))
                .unwrap_or(true)
    });

    for entry in walker {
        let entry = entry.context("failed to read directory entry")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(cwd).unwrap_or(entry.path());
        if glob.is_match(rel) {
            matches.push(entry.path().to_path_buf());
        }
    }

    matches.sort();
    Ok(matches)
}

fn build_include_patterns(options: &FileDiscoveryOptions) -> Vec<String> {
    match options.include.as_ref() {
        Some(patterns) if patterns.is_empty() => Vec::new(),
        Some(patterns) => expand_include_patterns(&normalize_patterns(patterns)),
        None => {
            if options.files.is_empty() {
                vec!["**/*".to_string()]
            } else {
                Vec::new()
            }
        }
    }
}

/// Expand include patterns the way tsc does: a bare directory pattern
/// such as `src` matches everything beneath it.
fn expand_include_patterns(patterns: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for pattern in patterns {
        if pattern.ends_with(".ts")
            || pattern.ends_with(".tsx")
            || pattern.ends_with(".mts")
            || pattern.ends_with(".cts")
        {
            expanded.push(pattern.clone());
            continue;
        }

        if pattern.ends_with("/**/*") || pattern.ends_with("/**/*.*") {
            expanded.push(pattern.clone());
            continue;
        }

        let base = pattern.trim_end_matches('/');
        expanded.push(format!("{base}/**/*"));
    }
    expanded
}

fn build_exclude_patterns(options: &FileDiscoveryOptions) -> Vec<String> {
    let mut patterns = match options.exclude.as_ref() {
        Some(patterns) => normalize_patterns(patterns),
        None => normalize_patterns(
            &DEFAULT_EXCLUDES
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        ),
    };

    if options.exclude.is_none()
        && let Some(out_dir) = options.out_dir.as_ref()
        && let Some(out_pattern) = path_to_pattern(&options.base_dir, out_dir)
    {
        patterns.push(out_pattern);
    }

    expand_exclude_patterns(&patterns)
}

fn normalize_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .filter_map(|pattern| {
            let trimmed = pattern.trim();
            if trimmed.is_empty() {
                return None;
            }
            let normalized = trimmed.replace('\\', "/");
            let stripped = normalized.strip_prefix("./").unwrap_or(&normalized);
            Some(stripped.to_string())
        })
        .collect()
}

fn expand_exclude_patterns(patterns: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for pattern in patterns {
        expanded.push(pattern.clone());
        if !contains_glob_meta(pattern) && !pattern.ends_with("/**") {
            expanded.push(format!("{}/**", pattern.trim_end_matches('/')));
        }
    }
    expanded
}

fn contains_glob_meta(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?') || pattern.contains('[') || pattern.contains(']')
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).with_context(|| format!("invalid glob pattern '{pattern}'"))?;
        builder.add(glob);
    }

    Ok(builder.build()?)
}

fn allow_entry(entry: &DirEntry, base_dir: &Path, exclude: Option<&GlobSet>) -> bool {
    let Some(exclude) = exclude else {
        return true;
    };

    let path = entry.path();
    if path == base_dir {
        return true;
    }

    let rel_path = match path.strip_prefix(base_dir) {
        Ok(stripped) => stripped,
        Err(_) => return !exclude.is_match(path),
    };
    !exclude.is_match(rel_path)
}

fn resolve_file_path(base_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base_dir.join(file)
    }
}

pub(crate) fn is_source_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => name,
        None => return false,
    };

    if name.ends_with(".d.ts") {
        return true;
    }

    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("ts") | Some("tsx") | Some("mts") | Some("cts")
    )
}

pub(crate) fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(".d.ts"))
        .unwrap_or(false)
}

fn path_to_pattern(base_dir: &Path, path: &Path) -> Option<String> {
    let rel = if path.is_absolute() {
        path.strip_prefix(base_dir).ok()?.to_path_buf()
    } else {
        path.to_path_buf()
    };
    let value = rel.to_string_lossy().replace('\\', "/");
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(base: &Path) -> FileDiscoveryOptions {
        FileDiscoveryOptions {
            base_dir: base.to_path_buf(),
            files: Vec::new(),
            include: None,
            exclude: None,
            out_dir: None,
        }
    }

    #[test]
    fn explicit_files_survive_even_when_absent() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut opts = options(temp.path());
        opts.files = vec![PathBuf::from("src/missing.ts")];

        let found = discover_input_files(&opts).unwrap();
        assert_eq!(found, vec![temp.path().join("src/missing.ts")]);
    }

    #[test]
    fn include_patterns_match_and_excludes_apply() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src/deep")).unwrap();
        std::fs::create_dir_all(temp.path().join("node_modules/pkg")).unwrap();
        std::fs::write(temp.path().join("src/a.ts"), "").unwrap();
        std::fs::write(temp.path().join("src/deep/b.ts"), "").unwrap();
        std::fs::write(temp.path().join("src/readme.md"), "").unwrap();
        std::fs::write(temp.path().join("node_modules/pkg/c.ts"), "").unwrap();

        let mut opts = options(temp.path());
        opts.include = Some(vec!["src".to_string()]);

        let found = discover_input_files(&opts).unwrap();
        assert_eq!(
            found,
            vec![
                temp.path().join("src/a.ts"),
                temp.path().join("src/deep/b.ts"),
            ]
        );
    }

    #[test]
    fn out_dir_is_excluded_by_default() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::create_dir_all(temp.path().join("dist")).unwrap();
        std::fs::write(temp.path().join("src/a.ts"), "").unwrap();
        std::fs::write(temp.path().join("dist/a.d.ts"), "").unwrap();

        let mut opts = options(temp.path());
        opts.out_dir = Some(temp.path().join("dist"));

        let found = discover_input_files(&opts).unwrap();
        assert_eq!(found, vec![temp.path().join("src/a.ts")]);
    }

    #[test]
    fn wildcard_directories_from_includes() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut opts = options(temp.path());
        opts.include = Some(vec!["src/**/*.ts".to_string(), "tools/*.ts".to_string()]);

        let dirs = wildcard_directories(&opts);
        assert_eq!(
            dirs,
            vec![
                (temp.path().join("src"), WatchDepth::Recursive),
                (temp.path().join("tools"), WatchDepth::Flat),
            ]
        );
    }

    #[test]
    fn scan_finds_nested_configs() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("a")).unwrap();
        std::fs::create_dir_all(temp.path().join("b/node_modules/x")).unwrap();
        std::fs::write(temp.path().join("a/tsconfig.json"), "{}").unwrap();
        std::fs::write(temp.path().join("b/tsconfig.json"), "{}").unwrap();
        std::fs::write(temp.path().join("b/node_modules/x/tsconfig.json"), "{}").unwrap();

        let configs = scan_for_configs(temp.path()).unwrap();
        assert_eq!(
            configs,
            vec![
                temp.path().join("a/tsconfig.json"),
                temp.path().join("b/tsconfig.json"),
            ]
        );
    }

    #[test]
    fn glob_roots_expand_relative_to_cwd() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("pkgs/a")).unwrap();
        std::fs::create_dir_all(temp.path().join("pkgs/b")).unwrap();
        std::fs::write(temp.path().join("pkgs/a/tsconfig.json"), "{}").unwrap();
        std::fs::write(temp.path().join("pkgs/b/tsconfig.json"), "{}").unwrap();

        let matches = expand_glob_root(temp.path(), "pkgs/*/tsconfig.json").unwrap();
        assert_eq!(
            matches,
            vec![
                temp.path().join("pkgs/a/tsconfig.json"),
                temp.path().join("pkgs/b/tsconfig.json"),
            ]
        );
    }
}
