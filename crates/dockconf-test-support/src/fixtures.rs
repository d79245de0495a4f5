//! Sandboxed project directories for configuration tests.

use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Temporary project layout mirroring a deployed host:
///
/// ```text
/// <root>/            project directory (owned by the test user)
/// <root>/conf/       holds `.env` and `.secret.env`
/// <root>/run/secrets provisioned secret files
/// ```
///
/// Nothing but `conf/` is created up front; files appear when an engine runs in
/// root mode.
#[derive(Debug)]
pub struct ProjectSandbox {
    root: TempDir,
}

impl ProjectSandbox {
    /// Create a fresh sandbox with a `conf/` directory that is not group or
    /// other writable.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be prepared.
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("dockconf-")
            .tempdir()
            .context("failed to create sandbox root")?;
        let conf = root.path().join("conf");
        fs::create_dir(&conf).context("failed to create sandbox conf directory")?;
        fs::set_permissions(&conf, Permissions::from_mode(0o755))
            .context("failed to chmod sandbox conf directory")?;
        Ok(Self { root })
    }

    /// Project directory whose owner is the expected owner of all files.
    #[must_use]
    pub fn project_dir(&self) -> &Path {
        self.root.path()
    }

    /// Location of the plain env file.
    #[must_use]
    pub fn env_file(&self) -> PathBuf {
        self.root.path().join("conf").join(".env")
    }

    /// Location of the base64 secret file.
    #[must_use]
    pub fn secret_file(&self) -> PathBuf {
        self.root.path().join("conf").join(".secret.env")
    }

    /// Location of the provisioned secrets directory.
    #[must_use]
    pub fn secret_dir(&self) -> PathBuf {
        self.root.path().join("run").join("secrets")
    }

    /// Read a file inside the sandbox as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Replace the contents of a file inside the sandbox, keeping its mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path, contents: &str) -> Result<()> {
        fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Write a module declaration file next to the config files.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_declaration(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.root.path().join(name);
        self.write(&path, contents)?;
        Ok(path)
    }

    /// Permission bits of a path inside the sandbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    pub fn mode(&self, path: &Path) -> Result<u32> {
        let metadata =
            fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
        Ok(metadata.permissions().mode() & 0o7777)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_prepares_conf_directory_only() -> Result<()> {
        let sandbox = ProjectSandbox::new()?;
        let conf = sandbox.env_file();
        let conf_dir = conf.parent().context("env file has a parent")?;
        assert!(conf_dir.is_dir());
        assert_eq!(sandbox.mode(conf_dir)?, 0o755);
        assert!(!sandbox.env_file().exists());
        assert!(!sandbox.secret_dir().exists());
        Ok(())
    }

    #[test]
    fn sandbox_round_trips_file_contents() -> Result<()> {
        let sandbox = ProjectSandbox::new()?;
        let path = sandbox.write_declaration("module.yaml", "[]")?;
        assert_eq!(sandbox.read(&path)?, "[]");
        Ok(())
    }
}
