use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Directories created by `init`, in creation order.
pub const DEFAULT_DIRS: &[&str] = &[
    "dev",
    "prod",
    "modules",
    "modules/example",
    "modules/example/backend",
    "modules/example/provider",
];

/// Template files created by `init`, keyed by path relative to the root.
pub const DEFAULT_FILES: &[(&str, &str)] = &[
    (
        "dev/provider.hcl",
        include_str!("../templates/dev/provider.hcl"),
    ),
    (
        "dev/variables.hcl",
        include_str!("../templates/dev/variables.hcl"),
    ),
    ("dev/main.hcl", include_str!("../templates/dev/main.hcl")),
    (
        "modules/example/main.yaml",
        include_str!("../templates/modules/example/main.yaml"),
    ),
    (
        "modules/example/backend/config.yaml",
        include_str!("../templates/modules/example/backend/config.yaml"),
    ),
    (
        "modules/example/provider/bigquery.yaml",
        include_str!("../templates/modules/example/provider/bigquery.yaml"),
    ),
    (
        "modules/example/variables.yaml",
        include_str!("../templates/modules/example/variables.yaml"),
    ),
];

/// What a scaffolding run did on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub directories: Vec<PathBuf>,
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Materialize the default project layout under `root`.
///
/// An empty `root` means the current directory. Existing files are left
/// untouched and reported as skipped, so running this twice is a no-op for
/// everything the first run produced. Nothing is rolled back on failure.
pub fn initialize(root: &Path) -> Result<ScaffoldReport> {
    let root = if root.as_os_str().is_empty() {
        Path::new(".")
    } else {
        root
    };

    let mut report = ScaffoldReport::default();

    for dir in DEFAULT_DIRS {
        let dir_path = root.join(dir);
        fs::create_dir_all(&dir_path).map_err(|e| Error::io(&dir_path, e))?;
        debug!(path = %dir_path.display(), "created directory");
        report.directories.push(dir_path);
    }

    for (file, content) in DEFAULT_FILES {
        let file_path = root.join(file);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        if file_path.exists() {
            info!(path = %file_path.display(), "file already exists, skipping");
            report.skipped.push(file_path);
            continue;
        }

        fs::write(&file_path, content).map_err(|e| Error::io(&file_path, e))?;
        debug!(path = %file_path.display(), "created file");
        report.created.push(file_path);
    }

    Ok(report)
}
