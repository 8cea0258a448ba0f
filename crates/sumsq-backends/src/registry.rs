//! Kernel registry used by host-side devices to "build" programs
//!
//! The CPU device has no compiler: building a program means resolving the
//! program's entry point in a registry. Kernels are stored behind `Arc` so a
//! lookup is a pointer copy, and the map is created lazily so a registry can
//! live in a `static`.
//!
//! ```text
//! use sumsq_backends::registry::KernelRegistry;
//!
//! let registry = KernelRegistry::with_builtins();
//! assert!(registry.get("x2y2n").is_some());
//! ```

use crate::kernel::{SearchKernel, SumOfSquaresKernel};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Thread-safe name → kernel map
pub struct KernelRegistry {
    kernels: OnceLock<RwLock<HashMap<String, Arc<dyn SearchKernel>>>>,
}

impl KernelRegistry {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self { kernels: OnceLock::new() }
    }

    /// Registry holding the built-in `x2y2n` kernel
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(SumOfSquaresKernel));
        registry
    }

    /// Process-wide registry with the built-in kernels
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<KernelRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::with_builtins())))
    }

    fn map(&self) -> &RwLock<HashMap<String, Arc<dyn SearchKernel>>> {
        self.kernels.get_or_init(|| RwLock::new(HashMap::new()))
    }

    /// Register a kernel under its own name, returning the kernel it replaced
    pub fn register(&self, kernel: Arc<dyn SearchKernel>) -> Option<Arc<dyn SearchKernel>> {
        let name = kernel.name().to_string();
        self.map().write().insert(name, kernel)
    }

    /// Look up a kernel by entry point name
    pub fn get(&self, entry: &str) -> Option<Arc<dyn SearchKernel>> {
        self.kernels.get()?.read().get(entry).map(Arc::clone)
    }

    /// Registered entry point names, sorted
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .kernels
            .get()
            .map(|map| map.read().keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Number of registered kernels
    pub fn len(&self) -> usize {
        self.kernels.get().map(|map| map.read().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("entries", &self.entries())
            .finish()
    }
}
