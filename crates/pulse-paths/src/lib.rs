use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("home directory not found; set the $HOME environment variable")]
    HomeNotFound,
}

/// Centralized path construction for the `~/.pulse/` directory layout.
///
/// Use `resolve()` in production code and `from_dir()` in tests.
#[derive(Debug, Clone)]
pub struct PulsePaths {
    pulse_dir: PathBuf,
}

impl PulsePaths {
    /// Resolve paths from the user's home directory (`~/.pulse`).
    pub fn resolve() -> Result<Self, PathError> {
        let home = dirs::home_dir().ok_or(PathError::HomeNotFound)?;
        Ok(Self {
            pulse_dir: home.join(".pulse"),
        })
    }

    /// Create paths from an explicit base directory. Use in tests.
    pub fn from_dir(pulse_dir: PathBuf) -> Self {
        Self { pulse_dir }
    }

    /// The base `~/.pulse` directory.
    pub fn pulse_dir(&self) -> &Path {
        &self.pulse_dir
    }

    pub fn user_config(&self) -> PathBuf {
        self.pulse_dir.join("config.toml")
    }

    /// Project-level config: `<project_root>/.pulse/config.toml`.
    pub fn project_config(project_root: &Path) -> PathBuf {
        project_root.join(".pulse").join("config.toml")
    }
}
