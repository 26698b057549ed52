//! Dependency inventory from the project manifest.
//!
//! Supported manifests: `package.json`, `Cargo.toml`, `pyproject.toml`
//! (PEP 621) and `go.mod`. When `dependency.outdated_command` is configured
//! the command runs in the project directory and its JSON output (an object
//! keyed by package name, as printed by `npm outdated --json`) lists the
//! outdated packages.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::workspace::ManifestKind;

use super::{Analyzer, AnalyzerData, ScanContext, DEPENDENCY};

/// Upper bound on the external outdated check.
const OUTDATED_TIMEOUT: Duration = Duration::from_secs(120);

/// One declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyEntry {
    pub name: String,
    /// Version requirement as written, empty when none is given
    pub version: String,
    pub dev: bool,
}

impl DependencyEntry {
    fn new(name: impl Into<String>, version: impl Into<String>, dev: bool) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dev,
        }
    }

    /// Whether the requirement accepts any version.
    pub fn is_unpinned(&self) -> bool {
        matches!(self.version.trim(), "" | "*" | "latest" | "x" | "next")
    }
}

/// Payload produced by the dependency analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyData {
    pub manifest: String,
    pub dependencies: Vec<DependencyEntry>,
    pub outdated: Vec<String>,
    /// Whether an outdated check ran
    pub outdated_checked: bool,
    pub max_dependencies: usize,
}

impl DependencyData {
    pub fn direct_count(&self) -> usize {
        self.dependencies.iter().filter(|d| !d.dev).count()
    }

    pub fn dev_count(&self) -> usize {
        self.dependencies.iter().filter(|d| d.dev).count()
    }

    pub fn unpinned(&self) -> impl Iterator<Item = &DependencyEntry> {
        self.dependencies.iter().filter(|d| d.is_unpinned())
    }
}

/// Read declared dependencies from a manifest.
pub fn read_manifest(kind: ManifestKind, content: &str) -> anyhow::Result<Vec<DependencyEntry>> {
    match kind {
        ManifestKind::PackageJson => parse_package_json(content),
        ManifestKind::CargoToml => parse_cargo_toml(content),
        ManifestKind::PyProject => parse_pyproject(content),
        ManifestKind::GoMod => Ok(parse_go_mod(content)),
        ManifestKind::ProjectJson => bail!("project.json does not declare dependencies"),
    }
}

fn parse_package_json(content: &str) -> anyhow::Result<Vec<DependencyEntry>> {
    let json: serde_json::Value = serde_json::from_str(content).context("invalid package.json")?;
    let mut deps = Vec::new();

    for (section, dev) in [
        ("dependencies", false),
        ("peerDependencies", false),
        ("devDependencies", true),
    ] {
        if let Some(map) = json.get(section).and_then(|v| v.as_object()) {
            for (name, version) in map {
                deps.push(DependencyEntry::new(
                    name.clone(),
                    version.as_str().unwrap_or_default(),
                    dev,
                ));
            }
        }
    }

    Ok(deps)
}

fn parse_cargo_toml(content: &str) -> anyhow::Result<Vec<DependencyEntry>> {
    let table: toml::Table = content.parse().context("invalid Cargo.toml")?;
    let mut deps = Vec::new();

    for (section, dev) in [
        ("dependencies", false),
        ("build-dependencies", false),
        ("dev-dependencies", true),
    ] {
        let Some(entries) = table.get(section).and_then(|v| v.as_table()) else {
            continue;
        };
        for (name, entry) in entries {
            let version = match entry {
                toml::Value::String(v) => v.clone(),
                toml::Value::Table(t) => {
                    if let Some(v) = t.get("version").and_then(|v| v.as_str()) {
                        v.to_string()
                    } else if t.contains_key("path") || t.contains_key("git") || t.contains_key("workspace") {
                        // pinned by location rather than version
                        "local".to_string()
                    } else {
                        String::new()
                    }
                }
                _ => String::new(),
            };
            deps.push(DependencyEntry::new(name.clone(), version, dev));
        }
    }

    Ok(deps)
}

fn parse_pyproject(content: &str) -> anyhow::Result<Vec<DependencyEntry>> {
    let table: toml::Table = content.parse().context("invalid pyproject.toml")?;
    let requirements = table
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default();

    Ok(requirements
        .iter()
        .filter_map(|r| r.as_str())
        .map(|req| {
            let split = req
                .find(|c: char| "<>=!~;[ ".contains(c))
                .unwrap_or(req.len());
            let (name, version) = req.split_at(split);
            DependencyEntry::new(name.trim(), version.trim(), false)
        })
        .collect())
}

fn parse_go_mod(content: &str) -> Vec<DependencyEntry> {
    let mut deps = Vec::new();
    let mut in_block = false;

    for line in content.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if line == "require (" {
            in_block = true;
            continue;
        }
        if in_block && line == ")" {
            in_block = false;
            continue;
        }
        let requirement = if in_block {
            line
        } else if let Some(rest) = line.strip_prefix("require ") {
            rest.trim()
        } else {
            continue;
        };
        let mut parts = requirement.split_whitespace();
        if let (Some(name), Some(version)) = (parts.next(), parts.next()) {
            deps.push(DependencyEntry::new(name, version, false));
        }
    }

    deps
}

/// Run the configured outdated check and collect package names.
///
/// The child is killed if it outlives `timeout`.
async fn run_outdated_command(
    argv: &[String],
    dir: &Path,
    timeout: Duration,
) -> anyhow::Result<Vec<String>> {
    let (program, args) = argv
        .split_first()
        .context("outdated_command is empty")?;

    debug!("running {:?} in {}", argv, dir.display());
    let output = tokio::time::timeout(
        timeout,
        Command::new(program)
            .args(args)
            .current_dir(dir)
            .kill_on_drop(true)
            .output(),
    )
    .await
    .with_context(|| format!("{} timed out after {:?}", program, timeout))?
    .with_context(|| format!("failed to run {}", program))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
        if output.status.success() {
            return Ok(Vec::new());
        }
        bail!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    // npm exits non-zero when anything is outdated, so parseable output wins
    match serde_json::from_str::<serde_json::Value>(&stdout) {
        Ok(serde_json::Value::Object(map)) => {
            let mut names: Vec<String> = map.keys().cloned().collect();
            names.sort();
            Ok(names)
        }
        Ok(_) => bail!("{} did not print a JSON object", program),
        Err(e) if output.status.success() => bail!("{} printed invalid JSON: {}", program, e),
        Err(_) => bail!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    }
}

pub struct DependencyAnalyzer;

#[async_trait::async_trait]
impl Analyzer for DependencyAnalyzer {
    fn name(&self) -> &'static str {
        DEPENDENCY
    }

    async fn analyze(&self, ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
        let manifest = &ctx.metadata.manifest;
        let content = tokio::fs::read_to_string(manifest)
            .await
            .with_context(|| format!("cannot read {}", manifest.display()))?;
        let dependencies = read_manifest(ctx.metadata.manifest_kind, &content)?;

        let settings = &ctx.config.dependency;
        let (outdated, outdated_checked) = if settings.outdated_command.is_empty() {
            (Vec::new(), false)
        } else {
            (
                run_outdated_command(&settings.outdated_command, ctx.project_path(), OUTDATED_TIMEOUT)
                    .await?,
                true,
            )
        };

        Ok(AnalyzerData::Dependency(DependencyData {
            manifest: ctx.metadata.manifest_kind.file_name().to_string(),
            dependencies,
            outdated,
            outdated_checked,
            max_dependencies: settings.max_dependencies,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{context_for, context_with_config};
    use crate::config::ScanConfig;
    use crate::workspace::ProjectKind;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_parse_package_json() {
        let deps = read_manifest(
            ManifestKind::PackageJson,
            r#"{
                "dependencies": {"react": "^18.2.0", "lodash": "*"},
                "devDependencies": {"vitest": "latest"}
            }"#,
        )
        .unwrap();

        assert_eq!(deps.len(), 3);
        let data = DependencyData {
            dependencies: deps,
            ..Default::default()
        };
        assert_eq!(data.direct_count(), 2);
        assert_eq!(data.dev_count(), 1);
        let mut unpinned: Vec<_> = data.unpinned().map(|d| d.name.as_str()).collect();
        unpinned.sort();
        assert_eq!(unpinned, vec!["lodash", "vitest"]);
    }

    #[test]
    fn test_parse_cargo_toml() {
        let deps = read_manifest(
            ManifestKind::CargoToml,
            r#"
[package]
name = "demo"

[dependencies]
serde = { version = "1.0", features = ["derive"] }
anyhow = "1"
local = { path = "../local" }
wild = "*"

[dev-dependencies]
tempfile = "3"
"#,
        )
        .unwrap();

        assert_eq!(deps.len(), 5);
        let wild = deps.iter().find(|d| d.name == "wild").unwrap();
        assert!(wild.is_unpinned());
        let local = deps.iter().find(|d| d.name == "local").unwrap();
        assert!(!local.is_unpinned());
        assert!(deps.iter().find(|d| d.name == "tempfile").unwrap().dev);
    }

    #[test]
    fn test_parse_pyproject_and_go_mod() {
        let py = read_manifest(
            ManifestKind::PyProject,
            "[project]\nname = \"svc\"\ndependencies = [\"requests>=2.31\", \"rich\"]\n",
        )
        .unwrap();
        assert_eq!(py[0], DependencyEntry::new("requests", ">=2.31", false));
        assert!(py[1].is_unpinned());

        let go = read_manifest(
            ManifestKind::GoMod,
            "module example.org/svc\n\nrequire github.com/pkg/errors v0.9.1\n\nrequire (\n\tgolang.org/x/sync v0.6.0 // indirect\n)\n",
        )
        .unwrap();
        assert_eq!(go.len(), 2);
        assert_eq!(go[1].name, "golang.org/x/sync");
        assert_eq!(go[1].version, "v0.6.0");
    }

    #[test]
    fn test_invalid_manifest_is_error() {
        assert!(read_manifest(ManifestKind::PackageJson, "{ not json").is_err());
        assert!(read_manifest(ManifestKind::ProjectJson, "{}").is_err());
    }

    #[tokio::test]
    async fn test_analyzer_reads_manifest() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("package.json"),
            r#"{"dependencies": {"express": "4.18.2"}}"#,
        )
        .unwrap();

        let ctx = context_for(temp.path(), ProjectKind::Application);
        let result = DependencyAnalyzer.run(&ctx).await;
        assert!(result.success, "{:?}", result.errors);
        let Some(AnalyzerData::Dependency(data)) = result.data else {
            panic!("expected dependency payload");
        };
        assert_eq!(data.manifest, "package.json");
        assert_eq!(data.direct_count(), 1);
        assert!(!data.outdated_checked);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_outdated_command_output_is_consumed() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), r#"{"dependencies": {}}"#).unwrap();

        let mut config = ScanConfig::default();
        config.dependency.outdated_command = vec![
            "sh".to_string(),
            "-c".to_string(),
            r#"echo '{"react": {}, "axios": {}}'; exit 1"#.to_string(),
        ];
        let ctx = context_with_config(temp.path(), ProjectKind::Application, config);

        let result = DependencyAnalyzer.run(&ctx).await;
        assert!(result.success, "{:?}", result.errors);
        let Some(AnalyzerData::Dependency(data)) = result.data else {
            panic!("expected dependency payload");
        };
        assert_eq!(data.outdated, vec!["axios", "react"]);
        assert!(data.outdated_checked);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_hung_outdated_command_is_killed() {
        let temp = TempDir::new().unwrap();
        let pid_file = temp.path().join("tool.pid");
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("echo $$ > {}; exec sleep 30", pid_file.display()),
        ];

        let err = run_outdated_command(&argv, temp.path(), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{:#}", err);

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat = PathBuf::from("/proc").join(&pid).join("stat");
        let mut alive = true;
        for _ in 0..50 {
            // a killed child is either reaped or left as a zombie
            alive = match std::fs::read_to_string(&stat) {
                Ok(content) => !content.contains(") Z"),
                Err(_) => false,
            };
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "outdated command {} still running", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_marks_analyzer_unavailable() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("package.json"), "{}").unwrap();

        let mut config = ScanConfig::default();
        config.dependency.outdated_command =
            vec!["sh".to_string(), "-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let ctx = context_with_config(temp.path(), ProjectKind::Application, config);

        let result = DependencyAnalyzer.run(&ctx).await;
        assert!(!result.success);
        assert!(result.errors[0].contains("boom"));
    }
}
