use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let data_dir = discover_data_dir(&project_root);
        Self::with_dirs(project_root, data_dir)
    }

    /// Directories are only computed here; logging and the index store create
    /// what they need.
    pub fn with_dirs(project_root: PathBuf, data_dir: PathBuf) -> Self {
        let log_dir = data_dir.join("logs");
        AppPaths {
            project_root,
            data_dir,
            log_dir,
        }
    }

    /// Resolves a configured path against the project root.
    pub fn resolve(&self, raw: &Path) -> PathBuf {
        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.project_root.join(raw)
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("AUTOMENTOR_ROOT") {
        return PathBuf::from(root);
    }

    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn discover_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("AUTOMENTOR_DATA_DIR") {
        return PathBuf::from(dir);
    }

    project_root.join("data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_project_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::with_dirs(tmp.path().to_path_buf(), tmp.path().join("data"));

        assert_eq!(
            paths.resolve(Path::new("data/source_docs")),
            tmp.path().join("data/source_docs")
        );
        assert_eq!(paths.resolve(Path::new("/opt/docs")), PathBuf::from("/opt/docs"));
        assert_eq!(paths.log_dir, tmp.path().join("data").join("logs"));
    }
}
