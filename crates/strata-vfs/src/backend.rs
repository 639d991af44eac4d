//! Backend registry and mount configuration.
//!
//! A backend is a factory producing a ready filesystem from validated
//! options. Mount configurations nest: an option value may itself be a
//! mount configuration, resolved recursively (this is how composers like
//! the overlay are assembled declaratively).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use strata_core::error::{Errno, FsError, FsResult};
use strata_core::{Cred, FileSystem};
use strata_store::{MemoryStore, StoreFs};

use crate::vfs::Vfs;

/// Maximum nesting depth of mount configurations.
const MAX_DEPTH: usize = 10;

/// Types a backend option can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// UTF-8 string
    String,
    /// Number (integer or float)
    Number,
    /// Boolean
    Boolean,
    /// Arbitrary object, including nested mount configurations
    Object,
}

impl OptionKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            OptionKind::String => value.is_string(),
            OptionKind::Number => value.is_number(),
            OptionKind::Boolean => value.is_boolean(),
            OptionKind::Object => value.is_object(),
        }
    }
}

/// Schema entry for one backend option.
pub struct OptionSpec {
    /// Expected type.
    pub kind: OptionKind,
    /// Whether the option must be present.
    pub required: bool,
    /// Human-readable description.
    pub description: Option<&'static str>,
    /// Additional validation beyond the type check.
    pub validator: Option<fn(&Value) -> FsResult<()>>,
}

impl OptionSpec {
    /// A required option of the given kind.
    pub const fn required(kind: OptionKind) -> Self {
        Self {
            kind,
            required: true,
            description: None,
            validator: None,
        }
    }

    /// An optional option of the given kind.
    pub const fn optional(kind: OptionKind) -> Self {
        Self {
            kind,
            required: false,
            description: None,
            validator: None,
        }
    }
}

/// A resolved option value handed to `Backend::create`.
pub enum OptionValue {
    /// Plain configuration value.
    Json(Value),
    /// A nested mount configuration, already resolved and readied.
    FileSystem(Arc<dyn FileSystem>),
}

impl OptionValue {
    /// The filesystem carried by this option, when it is one.
    pub fn as_fs(&self) -> Option<&Arc<dyn FileSystem>> {
        match self {
            OptionValue::FileSystem(fs) => Some(fs),
            OptionValue::Json(_) => None,
        }
    }

    /// The JSON value carried by this option, when it is one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            OptionValue::Json(value) => Some(value),
            OptionValue::FileSystem(_) => None,
        }
    }
}

/// Options after validation, keyed by option name.
pub type ResolvedOptions = BTreeMap<String, OptionValue>;

/// A filesystem factory.
pub trait Backend: Send + Sync {
    /// Backend name as used in configuration.
    fn name(&self) -> &'static str;

    /// Declared option schema.
    fn options(&self) -> BTreeMap<&'static str, OptionSpec> {
        BTreeMap::new()
    }

    /// Whether the backend can run in this environment.
    fn is_available(&self) -> bool {
        true
    }

    /// Creates a filesystem from validated options. The registry calls
    /// `ready()` on the result.
    fn create(&self, options: &ResolvedOptions) -> FsResult<Arc<dyn FileSystem>>;
}

/// An option value before resolution.
pub enum ConfigValue {
    /// Plain configuration value.
    Json(Value),
    /// A nested mount configuration.
    Mount(MountSpec),
}

/// What can be mounted: a filesystem, a bare backend, or a backend with
/// options.
pub enum MountSpec {
    /// An existing filesystem instance.
    FileSystem(Arc<dyn FileSystem>),
    /// A backend with no options.
    Backend(Arc<dyn Backend>),
    /// A backend with option values.
    Config {
        /// The backend to instantiate.
        backend: Arc<dyn Backend>,
        /// Option values, possibly nested mount configurations.
        options: BTreeMap<String, ConfigValue>,
    },
}

/// Resolves a mount specification into a ready filesystem.
pub fn resolve_mount_config(spec: MountSpec) -> FsResult<Arc<dyn FileSystem>> {
    resolve_at(spec, 0)
}

fn resolve_at(spec: MountSpec, depth: usize) -> FsResult<Arc<dyn FileSystem>> {
    if depth > MAX_DEPTH {
        return Err(FsError::with_message(
            Errno::EINVAL,
            format!("mount configuration nested deeper than {MAX_DEPTH}"),
        ));
    }
    match spec {
        MountSpec::FileSystem(fs) => {
            fs.ready()?;
            Ok(fs)
        }
        MountSpec::Backend(backend) => resolve_backend(&backend, BTreeMap::new(), depth),
        MountSpec::Config { backend, options } => resolve_backend(&backend, options, depth),
    }
}

fn resolve_backend(
    backend: &Arc<dyn Backend>,
    options: BTreeMap<String, ConfigValue>,
    depth: usize,
) -> FsResult<Arc<dyn FileSystem>> {
    let schema = backend.options();
    let mut resolved = ResolvedOptions::new();

    for (name, value) in options {
        let spec = schema.get(name.as_str()).ok_or_else(|| {
            FsError::with_message(
                Errno::EINVAL,
                format!("unknown option '{name}' for backend '{}'", backend.name()),
            )
        })?;
        match value {
            ConfigValue::Mount(nested) => {
                let fs = resolve_at(nested, depth + 1)?;
                resolved.insert(name, OptionValue::FileSystem(fs));
            }
            ConfigValue::Json(value) => {
                if !spec.kind.matches(&value) {
                    return Err(FsError::with_message(
                        Errno::EINVAL,
                        format!("option '{name}' has the wrong type"),
                    ));
                }
                if let Some(validator) = spec.validator {
                    validator(&value)?;
                }
                resolved.insert(name, OptionValue::Json(value));
            }
        }
    }

    for (name, spec) in &schema {
        if spec.required && !resolved.contains_key(*name) {
            return Err(FsError::with_message(
                Errno::EINVAL,
                format!("missing required option '{name}' for backend '{}'", backend.name()),
            ));
        }
    }

    if !backend.is_available() {
        return Err(FsError::with_message(
            Errno::EPERM,
            format!("backend '{}' is not available", backend.name()),
        ));
    }

    let fs = backend.create(&resolved)?;
    fs.ready()?;
    info!(backend = backend.name(), "created filesystem");
    Ok(fs)
}

/// The in-memory backend: a `StoreFs` over a fresh `MemoryStore`.
pub struct InMemoryBackend;

impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn create(&self, _options: &ResolvedOptions) -> FsResult<Arc<dyn FileSystem>> {
        Ok(Arc::new(StoreFs::new(MemoryStore::new())))
    }
}

/// Top-level configuration: credentials plus the mounts to install.
pub struct Configuration {
    /// Mounts to install, prefix to specification.
    pub mounts: Vec<(String, MountSpec)>,
    /// Process uid established before mounting.
    pub uid: u32,
    /// Process gid established before mounting.
    pub gid: u32,
    /// Disables async-backend mirroring process-wide.
    pub disable_async_cache: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            mounts: Vec::new(),
            uid: 0,
            gid: 0,
            disable_async_cache: false,
        }
    }
}

impl Vfs {
    /// Establishes process credentials, then resolves and installs each
    /// mount in order.
    pub fn configure(&self, configuration: Configuration) -> FsResult<()> {
        self.set_cred(Cred::new(configuration.uid, configuration.gid));
        self.set_async_cache_disabled(configuration.disable_async_cache);
        for (prefix, spec) in configuration.mounts {
            let fs = resolve_mount_config(spec)?;
            self.mount(&prefix, fs)?;
        }
        Ok(())
    }

    /// Replaces the root mount with the resolved specification.
    pub fn configure_single(&self, spec: MountSpec) -> FsResult<()> {
        let fs = resolve_mount_config(spec)?;
        let _ = self.umount("/");
        self.mount("/", fs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct PickyBackend {
        available: bool,
    }

    impl Backend for PickyBackend {
        fn name(&self) -> &'static str {
            "picky"
        }

        fn options(&self) -> BTreeMap<&'static str, OptionSpec> {
            let mut schema = BTreeMap::new();
            schema.insert("label", OptionSpec::required(OptionKind::String));
            let mut size = OptionSpec::optional(OptionKind::Number);
            size.validator = Some(|value| {
                if value.as_u64().unwrap_or(0) == 0 {
                    return Err(FsError::with_message(Errno::EINVAL, "size must be positive"));
                }
                Ok(())
            });
            schema.insert("size", size);
            schema.insert("inner", OptionSpec::optional(OptionKind::Object));
            schema
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn create(&self, options: &ResolvedOptions) -> FsResult<Arc<dyn FileSystem>> {
            if let Some(OptionValue::FileSystem(inner)) = options.get("inner") {
                return Ok(Arc::clone(inner));
            }
            Ok(Arc::new(StoreFs::new(MemoryStore::new())))
        }
    }

    fn picky(available: bool) -> Arc<dyn Backend> {
        Arc::new(PickyBackend { available })
    }

    fn label_options() -> BTreeMap<String, ConfigValue> {
        let mut options = BTreeMap::new();
        options.insert("label".to_string(), ConfigValue::Json(json!("test")));
        options
    }

    #[test]
    fn test_in_memory_backend() {
        let fs = resolve_mount_config(MountSpec::Backend(Arc::new(InMemoryBackend))).unwrap();
        assert!(fs.stat("/", &Cred::ROOT).unwrap().is_directory());
    }

    #[test]
    fn test_missing_required_option() {
        let e = resolve_mount_config(MountSpec::Backend(picky(true))).err().unwrap();
        assert!(e.is(Errno::EINVAL));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let mut options = label_options();
        options.insert("bogus".to_string(), ConfigValue::Json(json!(1)));
        let e = resolve_mount_config(MountSpec::Config {
            backend: picky(true),
            options,
        })
        .err().unwrap();
        assert!(e.is(Errno::EINVAL));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut options = BTreeMap::new();
        options.insert("label".to_string(), ConfigValue::Json(json!(42)));
        let e = resolve_mount_config(MountSpec::Config {
            backend: picky(true),
            options,
        })
        .err().unwrap();
        assert!(e.is(Errno::EINVAL));
    }

    #[test]
    fn test_validator_runs() {
        let mut options = label_options();
        options.insert("size".to_string(), ConfigValue::Json(json!(0)));
        let e = resolve_mount_config(MountSpec::Config {
            backend: picky(true),
            options,
        })
        .err().unwrap();
        assert!(e.is(Errno::EINVAL));
    }

    #[test]
    fn test_unavailable_backend_is_eperm() {
        let e = resolve_mount_config(MountSpec::Config {
            backend: picky(false),
            options: label_options(),
        })
        .err().unwrap();
        assert!(e.is(Errno::EPERM));
    }

    #[test]
    fn test_nested_mount_config_resolves() {
        let mut options = label_options();
        options.insert(
            "inner".to_string(),
            ConfigValue::Mount(MountSpec::Backend(Arc::new(InMemoryBackend))),
        );
        let fs = resolve_mount_config(MountSpec::Config {
            backend: picky(true),
            options,
        })
        .unwrap();
        assert!(fs.stat("/", &Cred::ROOT).unwrap().is_directory());
    }

    #[test]
    fn test_depth_limit() {
        // Build a chain one past the limit.
        let mut spec = MountSpec::Backend(Arc::new(InMemoryBackend));
        for _ in 0..=MAX_DEPTH {
            let mut options = label_options();
            options.insert("inner".to_string(), ConfigValue::Mount(spec));
            spec = MountSpec::Config {
                backend: picky(true),
                options,
            };
        }
        let e = resolve_mount_config(spec).err().unwrap();
        assert!(e.is(Errno::EINVAL));
    }

    #[test]
    fn test_configure_sets_cred_and_mounts() {
        let vfs = Vfs::new();
        vfs.configure(Configuration {
            mounts: vec![
                ("/".to_string(), MountSpec::Backend(Arc::new(InMemoryBackend))),
                ("/tmp".to_string(), MountSpec::Backend(Arc::new(InMemoryBackend))),
            ],
            uid: 1000,
            gid: 1000,
            disable_async_cache: false,
        })
        .unwrap();
        assert_eq!(vfs.cred().uid, 1000);
        assert!(vfs.exists("/"));
        vfs.write_file("/tmp/f", b"x").unwrap();
        assert_eq!(vfs.read_file("/tmp/f").unwrap(), b"x");
    }

    #[test]
    fn test_configure_single_replaces_root() {
        let vfs = Vfs::new();
        vfs.configure_single(MountSpec::Backend(Arc::new(InMemoryBackend)))
            .unwrap();
        vfs.write_file("/old", b"1").unwrap();

        vfs.configure_single(MountSpec::Backend(Arc::new(InMemoryBackend)))
            .unwrap();
        assert!(!vfs.exists("/old"));
    }
}
