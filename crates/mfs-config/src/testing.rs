//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated temporary root
//! - A source directory for files to insert
//! - An output directory for retrieved files
//!
//! # Usage
//!
//! ```ignore
//! use mfs_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let src = env.create_file("notes.txt", b"hello").unwrap();
//!     // env.image_path() is unique to this test
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of the environment
    pub root: PathBuf,
    /// Files to be inserted are created here
    pub source_dir: PathBuf,
    /// Retrieved files are written here
    pub output_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();

        let source_dir = root.join("src");
        let output_dir = root.join("out");
        std::fs::create_dir_all(&source_dir)?;
        std::fs::create_dir_all(&output_dir)?;

        Ok(Self {
            _temp_dir: temp_dir,
            root,
            source_dir,
            output_dir,
            test_id,
        })
    }

    /// Backing file path for this test's image
    pub fn image_path(&self) -> PathBuf {
        self.root.join(format!("mfs-test-{}.img", self.test_id))
    }

    /// Create a source file with content
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.source_dir.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Destination path for a retrieved file
    pub fn out_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Write a config file under `<root>/.mfs/config.toml`
    pub fn write_config(&self, contents: &str) -> anyhow::Result<PathBuf> {
        let dir = self.root.join(".mfs");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("config.toml");
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
