//! Module discovery
//!
//! Scans a components root for module directories. A directory is a module
//! iff it carries `MODULE-INF/components.toml`; modules are returned in a
//! deterministic order.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::module::registry::declarations::Declarations;
use crate::module::traits::ComponentError;

/// Directory holding a module's metadata
pub const MODULE_INF: &str = "MODULE-INF";
/// Declarations marker, relative to `MODULE-INF`
pub const DECLARATIONS_FILE: &str = "components.toml";
/// Demo declarations, relative to `MODULE-INF`
pub const DEMO_DECLARATIONS_FILE: &str = "components-demo.toml";
/// Module code directory, relative to `MODULE-INF`
pub const CLASSES_DIR: &str = "classes";
/// Bundled archive directory, relative to `MODULE-INF`
pub const LIB_DIR: &str = "lib";
/// Extension of bundled archives
pub const ARCHIVE_EXTENSION: &str = "lib";

/// Discovered module information
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    /// Module name (the directory name)
    pub name: String,
    /// Module directory path
    pub directory: PathBuf,
    /// Declaration files, in load order
    pub declaration_files: Vec<PathBuf>,
    /// Own code directory, if present
    pub classes_dir: Option<PathBuf>,
    /// Bundled archives, in file-name order
    pub archives: Vec<PathBuf>,
}

impl DiscoveredModule {
    /// Library names of the bundled archives (file stems)
    pub fn archive_names(&self) -> Vec<String> {
        self.archives
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect()
    }
}

/// Module discovery scanner
#[derive(Debug, Clone)]
pub struct ModuleDiscovery {
    /// Base directory to scan for modules
    components_root: PathBuf,
    /// Sort descending instead of ascending
    reverse: bool,
    /// Load demo declarations
    demo: bool,
}

impl ModuleDiscovery {
    /// Create a new module discovery scanner
    pub fn new<P: AsRef<Path>>(components_root: P) -> Self {
        Self {
            components_root: components_root.as_ref().to_path_buf(),
            reverse: false,
            demo: false,
        }
    }

    /// Reverse the load order
    pub fn reverse_order(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Include demo declarations
    pub fn with_demo(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }

    /// Root being scanned
    pub fn components_root(&self) -> &Path {
        &self.components_root
    }

    /// Discover all modules under the components root
    ///
    /// Entries that are not valid modules are skipped with a warning; only an
    /// unreadable root is an error.
    pub fn discover_modules(&self) -> Result<Vec<DiscoveredModule>, ComponentError> {
        info!("Discovering modules in {:?}", self.components_root);

        if !self.components_root.is_dir() {
            warn!(
                "Components root {:?} does not exist, no modules loaded",
                self.components_root
            );
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.components_root).map_err(|e| {
            ComponentError::Discovery(format!(
                "Failed to read components root {:?}: {}",
                self.components_root, e
            ))
        })?;

        let mut directories = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) if entry.path().is_dir() => directories.push(entry.path()),
                Ok(entry) => debug!("Ignoring non-directory {:?}", entry.path()),
                Err(e) => warn!("Failed to read directory entry: {}", e),
            }
        }

        directories.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        if self.reverse {
            directories.reverse();
        }

        let mut modules = Vec::new();
        for directory in directories {
            match self.inspect(&directory) {
                Ok(module) => modules.push(module),
                Err(e) => warn!("Skipping {:?}: {}", directory, e),
            }
        }

        info!(
            "Discovered {} modules{}",
            modules.len(),
            if self.reverse { " (reverse order)" } else { "" }
        );
        Ok(modules)
    }

    /// Discover a specific module by name
    pub fn discover_module(&self, module_name: &str) -> Result<DiscoveredModule, ComponentError> {
        self.inspect(&self.components_root.join(module_name))
    }

    fn inspect(&self, directory: &Path) -> Result<DiscoveredModule, ComponentError> {
        let name = directory
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ComponentError::Discovery(format!("Unusable directory name: {:?}", directory))
            })?
            .to_string();

        let inf = directory.join(MODULE_INF);
        let marker = inf.join(DECLARATIONS_FILE);
        if !marker.is_file() {
            return Err(ComponentError::Discovery(format!(
                "No {}/{} in module {}",
                MODULE_INF, DECLARATIONS_FILE, name
            )));
        }

        // Malformed markers are reported here rather than during refresh
        Declarations::from_file(&marker)
            .map_err(|e| ComponentError::Discovery(format!("Module {}: {}", name, e)))?;

        let mut declaration_files = vec![marker];
        let demo = inf.join(DEMO_DECLARATIONS_FILE);
        if demo.is_file() {
            if self.demo {
                debug!("Loading demo declarations for module {}", name);
                declaration_files.push(demo);
            } else {
                info!("Demo mode disabled, skipping {:?}", demo);
            }
        }

        let classes = inf.join(CLASSES_DIR);
        let classes_dir = classes.is_dir().then_some(classes);
        let archives = Self::archives(&inf.join(LIB_DIR));

        debug!(
            "Module {}: classes={} archives={}",
            name,
            classes_dir.is_some(),
            archives.len()
        );

        Ok(DiscoveredModule {
            name,
            directory: directory.to_path_buf(),
            declaration_files,
            classes_dir,
            archives,
        })
    }

    fn archives(lib_dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(lib_dir) else {
            return Vec::new();
        };

        let mut archives: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_EXTENSION)
            })
            .collect();
        archives.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        archives
    }
}
