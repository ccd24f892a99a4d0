use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::GlobBuilder;
use sha2::{Digest, Sha256};

use crate::cases::schema::{validate_case_file, CaseFile, CaseValidationError, TestCase};

pub const CODE_DISCOVERY_ERROR: &str = "CASE_DISCOVERY_ERROR";
pub const CODE_IO_ERROR: &str = "CASE_IO_ERROR";
pub const CODE_PARSE_ERROR: &str = "CASE_PARSE_ERROR";
pub const CODE_MISSING_FIELD: &str = "CASE_MISSING_FIELD";
pub const CODE_INVALID_FIELD: &str = "CASE_INVALID_FIELD";
pub const CODE_UNSUPPORTED_FORMAT: &str = "CASE_UNSUPPORTED_FORMAT";

const SKIPPED_DIRS: &[&str] = &["node_modules", "target"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct CaseLoadError {
    pub path: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CaseLoadResult {
    pub cases: Vec<TestCase>,
    pub errors: Vec<CaseLoadError>,
}

pub fn load_cases(workdir: &Path, pattern: &str) -> CaseLoadResult {
    let mut out = CaseLoadResult::default();
    let files = match discover_case_files(workdir, pattern) {
        Ok(f) => f,
        Err(e) => {
            out.errors.push(CaseLoadError {
                path: pattern.to_string(),
                code: CODE_DISCOVERY_ERROR.to_string(),
                message: format!("{e:#}"),
            });
            return out;
        }
    };
    for file in files {
        match load_case_file(workdir, &file) {
            Ok(c) => out.cases.push(c),
            Err(e) => out.errors.push(e),
        }
    }
    out
}

/// Expands `pattern` relative to `workdir`. A pattern without glob
/// metacharacters names a single file or a directory to scan.
pub fn discover_case_files(workdir: &Path, pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = strip_dot_prefix(pattern);
    let mut out = Vec::new();
    if !has_glob_meta(pattern) {
        let p = resolve(workdir, pattern);
        if p.is_file() {
            out.push(p);
        } else if p.is_dir() {
            walk(&p, &mut |path| {
                if is_supported(path) {
                    out.push(path.to_path_buf());
                }
            })?;
        }
        out.sort();
        return Ok(out);
    }

    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid test pattern {pattern:?}"))?
        .compile_matcher();
    let absolute = Path::new(pattern).is_absolute();
    let base = resolve(workdir, &literal_prefix(pattern));
    if !base.is_dir() {
        return Ok(out);
    }
    walk(&base, &mut |path| {
        let candidate = if absolute {
            path.to_string_lossy().replace('\\', "/")
        } else {
            render_rel_path(path, workdir)
        };
        if matcher.is_match(&candidate) {
            out.push(path.to_path_buf());
        }
    })?;
    out.sort();
    Ok(out)
}

pub fn load_case_file(workdir: &Path, path: &Path) -> Result<TestCase, CaseLoadError> {
    let rel = render_rel_path(path, workdir);
    let err = |code: &str, message: String| CaseLoadError {
        path: rel.clone(),
        code: code.to_string(),
        message,
    };
    let raw = fs::read(path).map_err(|e| err(CODE_IO_ERROR, e.to_string()))?;
    let file_hash_hex = sha256_hex(&raw);
    let text = std::str::from_utf8(&raw)
        .map_err(|_| err(CODE_IO_ERROR, "test file is not valid UTF-8".to_string()))?;
    let parsed: CaseFile = match extension(path).as_deref() {
        Some("json") => serde_json::from_str(text)
            .map_err(|e| err(CODE_PARSE_ERROR, format!("invalid JSON in test file: {e}")))?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(text)
            .map_err(|e| err(CODE_PARSE_ERROR, format!("invalid YAML in test file: {e}")))?,
        other => {
            return Err(err(
                CODE_UNSUPPORTED_FORMAT,
                format!(
                    "unsupported test file extension {:?} (expected json, yaml or yml)",
                    other.unwrap_or_default()
                ),
            ))
        }
    };
    validate_case_file(&parsed).map_err(|e| {
        let code = match e {
            CaseValidationError::MissingField(_) => CODE_MISSING_FIELD,
            CaseValidationError::EmptyEntry { .. } => CODE_INVALID_FIELD,
        };
        err(code, e.to_string())
    })?;
    Ok(TestCase::from_file(parsed, rel, file_hash_hex))
}

fn walk(dir: &Path, visit: &mut dyn FnMut(&Path)) -> anyhow::Result<()> {
    let mut ents = fs::read_dir(dir)
        .with_context(|| format!("read_dir {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("iterate {}", dir.display()))?;
    ents.sort_by_key(|e| e.file_name().to_string_lossy().to_lowercase());
    for ent in ents {
        let path = ent.path();
        let md = fs::symlink_metadata(&path)?;
        if md.file_type().is_symlink() {
            continue;
        }
        if md.is_dir() {
            let name = ent.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk(&path, visit)?;
        } else if md.is_file() {
            visit(&path);
        }
    }
    Ok(())
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

/// `./tests/*.json` matches the same files as `tests/*.json`.
fn strip_dot_prefix(mut pattern: &str) -> &str {
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest.trim_start_matches('/');
    }
    pattern
}

fn literal_prefix(pattern: &str) -> String {
    let mut parts = Vec::new();
    for comp in pattern.split('/') {
        if has_glob_meta(comp) {
            break;
        }
        parts.push(comp);
    }
    if pattern.starts_with('/') && parts.len() <= 1 {
        return "/".to_string();
    }
    parts.join("/")
}

fn resolve(workdir: &Path, p: &str) -> PathBuf {
    let path = Path::new(p);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_supported(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("json" | "yaml" | "yml"))
}

fn render_rel_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
