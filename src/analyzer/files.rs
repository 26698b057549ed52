//! Source file discovery shared by the file-based analyzers.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::ExcludeMatcher;

/// Extensions recognized as source code.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "vue", "svelte", "rs", "py", "go", "java", "kt",
    "scala", "swift", "c", "cpp", "h", "hpp", "cs",
];

/// Directories that never contain first-party source.
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "target",
    "dist",
    "build",
    "coverage",
    "out",
    "__pycache__",
];

/// Collect source files under `root`, sorted by path.
///
/// Unreadable directory entries are logged and skipped.
pub fn collect_source_files(root: &Path, excludes: &ExcludeMatcher, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        if e.depth() == 0 || !e.file_type().is_dir() {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !extensions.contains(&ext) {
            continue;
        }
        if excludes.is_excluded(&relative_path(root, path)) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    files
}

/// `path` relative to `root`, or `path` itself when it lies elsewhere.
pub fn relative_path(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collects_sorted_sources_and_skips_noise() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src/generated")).unwrap();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/b.ts"), "export const b = 1;").unwrap();
        fs::write(root.join("src/a.ts"), "export const a = 1;").unwrap();
        fs::write(root.join("src/readme.md"), "# docs").unwrap();
        fs::write(root.join("src/generated/api.ts"), "export {}").unwrap();
        fs::write(root.join("node_modules/lib/index.js"), "module.exports = {}").unwrap();
        fs::write(root.join(".git/hook.js"), "").unwrap();

        let excludes = ExcludeMatcher::new(&["**/generated/**".to_string()]).unwrap();
        let files = collect_source_files(root, &excludes, SOURCE_EXTENSIONS);
        let rel: Vec<_> = files.iter().map(|f| relative_path(root, f)).collect();

        assert_eq!(rel, vec![PathBuf::from("src/a.ts"), PathBuf::from("src/b.ts")]);
    }

    #[test]
    fn test_empty_project() {
        let temp = TempDir::new().unwrap();
        let files = collect_source_files(temp.path(), &ExcludeMatcher::default(), SOURCE_EXTENSIONS);
        assert!(files.is_empty());
    }
}
