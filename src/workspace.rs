//! Workspace project discovery and resolution.
//!
//! Projects live one level below the configured application and library
//! directories (`apps/*`, `libs/*`, `packages/*` by default). A workspace
//! without any of those directories is scanned as a single application.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::WorkspaceLayout;

/// Errors that prevent discovering the workspace at all.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("workspace root {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unknown project {name:?} (available: {available})")]
    UnknownProject { name: String, available: String },
}

/// Errors resolving a single project. Fatal to that project only.
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("project path {0} does not exist")]
    Missing(PathBuf),
    #[error("project path {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("no project manifest found in {0}")]
    MissingManifest(PathBuf),
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether a project is a deployable application or a shared library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Application,
    Library,
}

impl std::fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectKind::Application => write!(f, "application"),
            ProjectKind::Library => write!(f, "library"),
        }
    }
}

/// A project discovered in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub kind: ProjectKind,
    pub root: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, kind: ProjectKind, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            root: root.into(),
        }
    }
}

/// Recognized manifest files, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestKind {
    PackageJson,
    CargoToml,
    ProjectJson,
    PyProject,
    GoMod,
}

impl ManifestKind {
    pub const ALL: [ManifestKind; 5] = [
        ManifestKind::PackageJson,
        ManifestKind::CargoToml,
        ManifestKind::ProjectJson,
        ManifestKind::PyProject,
        ManifestKind::GoMod,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ManifestKind::PackageJson => "package.json",
            ManifestKind::CargoToml => "Cargo.toml",
            ManifestKind::ProjectJson => "project.json",
            ManifestKind::PyProject => "pyproject.toml",
            ManifestKind::GoMod => "go.mod",
        }
    }
}

/// Facts about a resolved project, gathered once before analyzers run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Canonical project root
    pub root: PathBuf,
    pub manifest: PathBuf,
    pub manifest_kind: ManifestKind,
    pub package_name: Option<String>,
    pub version: Option<String>,
}

/// Resolve a project's path and manifest.
pub fn resolve_project(project: &Project) -> Result<ProjectMetadata, ProjectError> {
    let root = match project.root.canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ProjectError::Missing(project.root.clone()))
        }
        Err(source) => {
            return Err(ProjectError::Io {
                path: project.root.clone(),
                source,
            })
        }
    };

    if !root.is_dir() {
        return Err(ProjectError::NotADirectory(root));
    }

    let (manifest_kind, manifest) = ManifestKind::ALL
        .iter()
        .map(|kind| (*kind, root.join(kind.file_name())))
        .find(|(_, path)| path.is_file())
        .ok_or_else(|| ProjectError::MissingManifest(root.clone()))?;

    let (package_name, version) = read_package_identity(manifest_kind, &manifest);

    Ok(ProjectMetadata {
        root,
        manifest,
        manifest_kind,
        package_name,
        version,
    })
}

/// Best-effort name/version lookup. A malformed manifest is not a resolution error.
fn read_package_identity(kind: ManifestKind, manifest: &Path) -> (Option<String>, Option<String>) {
    let content = match fs::read_to_string(manifest) {
        Ok(c) => c,
        Err(e) => {
            debug!("cannot read manifest {}: {}", manifest.display(), e);
            return (None, None);
        }
    };

    match kind {
        ManifestKind::PackageJson | ManifestKind::ProjectJson => {
            match serde_json::from_str::<serde_json::Value>(&content) {
                Ok(json) => (
                    json.get("name").and_then(|v| v.as_str()).map(String::from),
                    json.get("version").and_then(|v| v.as_str()).map(String::from),
                ),
                Err(e) => {
                    debug!("cannot parse {}: {}", manifest.display(), e);
                    (None, None)
                }
            }
        }
        ManifestKind::CargoToml | ManifestKind::PyProject => {
            let section = if kind == ManifestKind::CargoToml {
                "package"
            } else {
                "project"
            };
            match content.parse::<toml::Table>() {
                Ok(table) => {
                    let pkg = table.get(section);
                    (
                        pkg.and_then(|p| p.get("name"))
                            .and_then(|v| v.as_str())
                            .map(String::from),
                        pkg.and_then(|p| p.get("version"))
                            .and_then(|v| v.as_str())
                            .map(String::from),
                    )
                }
                Err(e) => {
                    debug!("cannot parse {}: {}", manifest.display(), e);
                    (None, None)
                }
            }
        }
        ManifestKind::GoMod => (
            content
                .lines()
                .find_map(|l| l.trim().strip_prefix("module "))
                .map(|m| m.trim().to_string()),
            None,
        ),
    }
}

/// Discover all projects under `root` using the configured layout.
///
/// Project order is deterministic: applications first, then libraries, each
/// sorted by directory name. A name that appears in two groups is qualified
/// with its group directory so report keys never collide.
pub fn discover_projects(root: &Path, layout: &WorkspaceLayout) -> Result<Vec<Project>, WorkspaceError> {
    if !root.is_dir() {
        return Err(WorkspaceError::NotADirectory(root.to_path_buf()));
    }

    let groups = layout
        .applications
        .iter()
        .map(|d| (d, ProjectKind::Application))
        .chain(layout.libraries.iter().map(|d| (d, ProjectKind::Library)));

    let mut projects = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (group, kind) in groups {
        let group_dir = root.join(group);
        if !group_dir.is_dir() {
            continue;
        }

        for dir in child_directories(&group_dir)? {
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = if seen.contains(&dir_name) {
                format!("{}/{}", group, dir_name)
            } else {
                dir_name
            };
            seen.insert(name.clone());
            projects.push(Project::new(name, kind, dir));
        }
    }

    if projects.is_empty() {
        let name = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .unwrap_or_else(|| "workspace".to_string());
        debug!("no project groups found, scanning {} as a single project", name);
        projects.push(Project::new(name, ProjectKind::Application, root));
    }

    Ok(projects)
}

/// Non-hidden child directories, sorted by name.
fn child_directories(dir: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
    let entries = fs::read_dir(dir).map_err(|source| WorkspaceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Narrow the project list to a single named project, if requested.
pub fn select_projects(projects: Vec<Project>, target: Option<&str>) -> Result<Vec<Project>, WorkspaceError> {
    let Some(name) = target else {
        return Ok(projects);
    };

    if let Some(project) = projects.iter().find(|p| p.name == name) {
        return Ok(vec![project.clone()]);
    }

    Err(WorkspaceError::UnknownProject {
        name: name.to_string(),
        available: projects
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
