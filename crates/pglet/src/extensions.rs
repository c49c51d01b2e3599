//! Optional engine modules and the loader that installs them.
//!
//! Extensions are declared up front as descriptors — a name plus either
//! a direct bundle or a setup procedure that yields one (with optional
//! dependency names and init/close hooks) — and installed eagerly at
//! session construction or lazily on first reference. Dependency
//! resolution is a depth-first traversal carrying the current path as
//! its cycle-detection set: only reachable nodes are ever touched, and a
//! revisited name fails with the full chain. Loads are self-serializing
//! per name, so concurrent requests for the same extension (including
//! shared dependencies) install exactly one bundle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use pglet_error::{PgletError, Result};
use pglet_types::{EngineOptions, ExtensionMemoryStats, ExtensionStatus};
use tracing::{debug, info, warn};

use crate::session::SessionInner;

/// Where an extension's byte bundle comes from.
#[derive(Clone)]
pub enum BundleSource {
    /// The bundle bytes, inline.
    Bytes(Vec<u8>),
    /// A file to read the bundle from.
    Path(PathBuf),
}

impl std::fmt::Debug for BundleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Path(p) => write!(f, "Path({})", p.display()),
        }
    }
}

/// Hook run after install (`init`) or during session close (`close`).
pub type Hook = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// What a setup procedure yields.
#[derive(Default, Clone)]
pub struct ExtensionSetup {
    /// Bundle to install; `None` for namespace-only extensions.
    pub bundle: Option<BundleSource>,
    /// Names of extensions that must be loaded first.
    pub dependencies: Vec<String>,
    /// Post-install initializer.
    pub init: Option<Hook>,
    /// Teardown, run in registration order at close.
    pub close: Option<Hook>,
}

/// Setup procedure: resolved once per session, result cached.
pub type SetupFn = Arc<dyn Fn(&EngineOptions) -> Result<ExtensionSetup> + Send + Sync>;

/// How a descriptor provides its module.
#[derive(Clone)]
pub enum ExtensionSource {
    /// A bare bundle with no setup logic.
    Bundle(BundleSource),
    /// A setup procedure yielding bundle, dependencies, and hooks.
    Setup(SetupFn),
}

/// Declaration of one optional engine module. Immutable once the
/// session is configured.
#[derive(Clone)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub source: ExtensionSource,
}

impl ExtensionDescriptor {
    /// Descriptor for an inline bundle with no setup logic.
    #[must_use]
    pub fn bundle(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: ExtensionSource::Bundle(BundleSource::Bytes(bytes)),
        }
    }

    /// Descriptor for a bundle loaded from a file.
    #[must_use]
    pub fn from_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: ExtensionSource::Bundle(BundleSource::Path(path.into())),
        }
    }

    /// Descriptor with a setup procedure.
    #[must_use]
    pub fn with_setup(
        name: impl Into<String>,
        setup: impl Fn(&EngineOptions) -> Result<ExtensionSetup> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            source: ExtensionSource::Setup(Arc::new(setup)),
        }
    }
}

impl std::fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Observer invoked (asynchronously) after each successful load.
pub type LoadObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-extension mutable record. Created lazily on first reference,
/// kept for the session lifetime.
#[derive(Default)]
struct LoadRecord {
    loaded: bool,
    setup: Option<Arc<ExtensionSetup>>,
    stats: ExtensionMemoryStats,
    close: Option<Hook>,
}

/// The configured extension set and its load state.
pub(crate) struct ExtensionRegistry {
    descriptors: HashMap<String, ExtensionDescriptor>,
    /// Registration order, for deterministic teardown.
    order: Vec<String>,
    disabled: HashSet<String>,
    states: Mutex<HashMap<String, LoadRecord>>,
    /// Per-name serialization of the load path.
    guards: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    observers: Mutex<Vec<LoadObserver>>,
}

impl ExtensionRegistry {
    pub fn new(descriptors: Vec<ExtensionDescriptor>, disabled: HashSet<String>) -> Self {
        let order: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();
        let descriptors = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self {
            descriptors,
            order,
            disabled,
            states: Mutex::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn descriptor_list(&self) -> Vec<ExtensionDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.descriptors.get(name).cloned())
            .collect()
    }

    pub fn disabled_set(&self) -> HashSet<String> {
        self.disabled.clone()
    }

    /// Names eligible for eager loading: configured and not disabled.
    pub fn eligible_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| !self.disabled.contains(*name))
            .cloned()
            .collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.states
            .lock()
            .get(name)
            .is_some_and(|record| record.loaded)
    }

    /// Mark an extension as present without installing (its bundle is
    /// already inside a restored heap).
    pub fn mark_preloaded(&self, name: &str) {
        let mut states = self.states.lock();
        states.entry(name.to_owned()).or_default().loaded = true;
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let states = self.states.lock();
        self.order
            .iter()
            .filter(|name| states.get(*name).is_some_and(|r| r.loaded))
            .cloned()
            .collect()
    }

    pub fn add_observer(&self, observer: LoadObserver) {
        self.observers.lock().push(observer);
    }

    fn guard_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.guards
                .lock()
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Resolve (and cache) the setup for `name`.
    fn resolve_setup(&self, name: &str, options: &EngineOptions) -> Result<Arc<ExtensionSetup>> {
        if let Some(setup) = self
            .states
            .lock()
            .get(name)
            .and_then(|record| record.setup.clone())
        {
            return Ok(setup);
        }
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| PgletError::ExtensionNotConfigured {
                name: name.to_owned(),
            })?;
        let setup = Arc::new(match &descriptor.source {
            ExtensionSource::Bundle(source) => ExtensionSetup {
                bundle: Some(source.clone()),
                ..ExtensionSetup::default()
            },
            ExtensionSource::Setup(setup_fn) => setup_fn(options)?,
        });
        self.states
            .lock()
            .entry(name.to_owned())
            .or_default()
            .setup = Some(Arc::clone(&setup));
        Ok(setup)
    }

    fn mark_loaded(&self, name: &str, stats: ExtensionMemoryStats, close: Option<Hook>) {
        let mut states = self.states.lock();
        let record = states.entry(name.to_owned()).or_default();
        record.loaded = true;
        record.stats = stats;
        record.close = close;
    }

    /// Status projection, excluding flag-disabled entries.
    pub fn status(&self) -> BTreeMap<String, ExtensionStatus> {
        let states = self.states.lock();
        self.order
            .iter()
            .filter(|name| !self.disabled.contains(*name))
            .map(|name| {
                (
                    name.clone(),
                    ExtensionStatus {
                        configured: true,
                        loaded: states.get(name).is_some_and(|r| r.loaded),
                    },
                )
            })
            .collect()
    }

    /// Memory stats for loaded extensions, excluding disabled entries.
    pub fn memory_stats(&self) -> BTreeMap<String, ExtensionMemoryStats> {
        let states = self.states.lock();
        self.order
            .iter()
            .filter(|name| !self.disabled.contains(*name))
            .filter_map(|name| {
                states
                    .get(name)
                    .filter(|r| r.loaded)
                    .map(|r| (name.clone(), r.stats))
            })
            .collect()
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.descriptors.contains_key(name) && !self.disabled.contains(name)
    }

    /// Run every loaded extension's close hook, in registration order.
    /// Failures are logged, never propagated — close must make progress.
    pub fn run_teardowns(&self) {
        let hooks: Vec<(String, Hook)> = {
            let states = self.states.lock();
            self.order
                .iter()
                .filter_map(|name| {
                    states
                        .get(name)
                        .filter(|r| r.loaded)
                        .and_then(|r| r.close.clone())
                        .map(|hook| (name.clone(), hook))
                })
                .collect()
        };
        for (name, hook) in hooks {
            if let Err(error) = hook() {
                warn!(extension = %name, %error, "extension teardown failed");
            }
        }
    }
}

fn fetch_bundle(name: &str, source: &BundleSource) -> Result<Vec<u8>> {
    match source {
        BundleSource::Bytes(bytes) => Ok(bytes.clone()),
        BundleSource::Path(path) => std::fs::read(path).map_err(|e| PgletError::BundleFetch {
            name: name.to_owned(),
            detail: format!("{}: {e}", path.display()),
        }),
    }
}

impl SessionInner {
    /// Depth-first load of `name`, `path` being the current resolution
    /// chain (the cycle-detection set).
    pub(crate) fn load_extension_dfs<'a>(
        &'a self,
        name: &'a str,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let registry = &self.extensions;
            if path.iter().any(|p| p == name) {
                let mut chain = path.clone();
                chain.push(name.to_owned());
                return Err(PgletError::CircularDependency { chain });
            }
            if !registry.descriptors.contains_key(name) {
                return Err(PgletError::ExtensionNotConfigured {
                    name: name.to_owned(),
                });
            }
            if registry.disabled.contains(name) {
                return Err(PgletError::ExtensionDisabled {
                    name: name.to_owned(),
                });
            }
            if registry.is_loaded(name) {
                return Ok(());
            }

            // Serialize per name; recheck under the guard, since a
            // concurrent load may have won the race.
            let guard = registry.guard_for(name);
            let _held = guard.lock().await;
            if registry.is_loaded(name) {
                return Ok(());
            }

            let setup = registry.resolve_setup(name, &self.options)?;

            path.push(name.to_owned());
            for dependency in setup.dependencies.clone() {
                if !registry.descriptors.contains_key(&dependency) {
                    return Err(PgletError::MissingDependency {
                        dependent: name.to_owned(),
                        missing: dependency,
                    });
                }
                debug!(extension = %name, dependency = %dependency, "resolving dependency");
                self.load_extension_dfs(&dependency, path).await?;
            }
            path.pop();

            let stats = if let Some(source) = &setup.bundle {
                let bundle = fetch_bundle(name, source)?;
                let mut engine = self.engine.lock().await;
                let heap_before = engine.memory_size();
                engine.install_bundle(name, &bundle)?;
                let heap_after = engine.memory_size();
                ExtensionMemoryStats {
                    bundle_bytes: bundle.len() as u64,
                    heap_delta_bytes: heap_after.saturating_sub(heap_before) as u64,
                }
            } else {
                ExtensionMemoryStats::default()
            };

            if let Some(init) = &setup.init {
                init()?;
            }
            registry.mark_loaded(name, stats, setup.close.clone());
            info!(
                extension = %name,
                bundle_bytes = stats.bundle_bytes,
                heap_delta_bytes = stats.heap_delta_bytes,
                "extension loaded"
            );

            // Observers run off the load path: they cannot block the
            // loader, and a re-entrant load of the same name lands on
            // the loaded check above.
            let observers: Vec<LoadObserver> = registry.observers.lock().clone();
            if !observers.is_empty() {
                let loaded_name = name.to_owned();
                tokio::spawn(async move {
                    for observer in observers {
                        observer(&loaded_name);
                    }
                });
            }
            Ok(())
        })
    }
}
