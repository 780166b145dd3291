//! Collision-free output names: `<base>_<tag>_NNN.<ext>` with a timestamp fallback.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::MatteResult;

const COUNTER_CEILING: u32 = 999;

/// File stem of `input` reduced to alphanumerics, spaces, `_` and `-`; `Output` if nothing is left.
pub fn sanitize_base(input: Option<&Path>) -> String {
    let stem = input
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "Output".to_string()
    } else {
        cleaned.to_string()
    }
}

fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// First free `<dir>/<base>_<tag>_NNN.<ext>`; creates `dir`, not the file.
pub fn unique_output_path(
    dir: &Path,
    input: Option<&Path>,
    tag: &str,
    ext: &str,
) -> MatteResult<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output directory '{}'", dir.display()))?;
    let base = sanitize_base(input);
    for i in 1..=COUNTER_CEILING {
        let candidate = dir.join(format!("{base}_{tag}_{i:03}.{ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Ok(dir.join(format!("{base}_{tag}_{}.{ext}", unix_seconds())))
}

/// Create and return the first free `<dir>/<base>_Frames_NNN` directory.
pub fn unique_sequence_dir(dir: &Path, input: Option<&Path>) -> MatteResult<PathBuf> {
    let base = sanitize_base(input);
    let mut chosen = None;
    for i in 1..=COUNTER_CEILING {
        let candidate = dir.join(format!("{base}_Frames_{i:03}"));
        if !candidate.exists() {
            chosen = Some(candidate);
            break;
        }
    }
    let path = chosen.unwrap_or_else(|| dir.join(format!("{base}_Frames_{}", unix_seconds())));
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create frame directory '{}'", path.display()))?;
    Ok(path)
}

/// Silent encode that precedes the audio remux, kept distinguishable from the final artifact.
/// Same container as `final_path`.
pub fn silent_intermediate(final_path: &Path) -> PathBuf {
    let ext = final_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    sibling_with_suffix(final_path, "_temp", &ext)
}

/// The inpaint worker's MPEG-4 intermediate, whatever the final container.
pub fn worker_intermediate(final_path: &Path) -> PathBuf {
    sibling_with_suffix(final_path, "_temp", "mp4")
}

/// `<output>.log` next to an artifact.
pub fn log_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(".log");
    PathBuf::from(name)
}

fn sibling_with_suffix(path: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}.{ext}"))
}
