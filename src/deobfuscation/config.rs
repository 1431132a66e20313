//! Configuration for the deobfuscation engine.
//!
//! This module provides configuration types for controlling the deobfuscation
//! pipeline: pass selection, iteration limits, parallelism and error tolerance.

/// Configuration for the deobfuscation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum iterations of the whole pass pipeline (default: 10).
    pub max_iterations: usize,

    /// Upper bound on removals the dead-store pass performs in one method per run
    /// (default: 10 000).
    pub max_removals_per_method: usize,

    /// Skip methods whose analysis or transformation fails instead of aborting
    /// (default: true). Skipped methods are reported as `Warning` events.
    pub continue_on_error: bool,

    /// Analyse and transform methods in parallel (default: true).
    pub parallel: bool,

    /// Enable dead store and dead stack value elimination.
    pub enable_dead_store_elimination: bool,

    /// Member removal configuration.
    pub cleanup: CleanupConfig,
}

/// Configuration for removing unused class members.
///
/// `remove_unused_methods` defaults to `false`: methods can be reached through
/// reflection or from outside the program, which the analysis cannot see.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Remove fields that no instruction in the program accesses.
    pub remove_unused_fields: bool,

    /// Remove methods that no instruction in the program invokes.
    pub remove_unused_methods: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            remove_unused_fields: true,
            remove_unused_methods: false, // Off by default - may break reflection
        }
    }
}

impl CleanupConfig {
    /// Creates a new cleanup configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with all cleanup disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            remove_unused_fields: false,
            remove_unused_methods: false,
        }
    }

    /// Returns true if any cleanup is enabled.
    #[must_use]
    pub fn any_enabled(&self) -> bool {
        self.remove_unused_fields || self.remove_unused_methods
    }

    /// Creates a configuration for aggressive cleanup (all options enabled).
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            remove_unused_methods: true,
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_removals_per_method: 10_000,
            continue_on_error: true,
            parallel: true,
            enable_dead_store_elimination: true,
            cleanup: CleanupConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default settings.
    ///
    /// # Returns
    ///
    /// A new `EngineConfig` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a single-threaded configuration, useful for reproducible event order.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    /// Creates an "aggressive" configuration for maximum shrinking.
    ///
    /// This configuration uses:
    /// - More iterations (25 max)
    /// - Unused method removal
    ///
    /// # Returns
    ///
    /// A new `EngineConfig` optimized for thoroughness over safety.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_iterations: 25,
            cleanup: CleanupConfig::aggressive(),
            ..Self::default()
        }
    }

    /// Sets the maximum number of iterations.
    ///
    /// # Arguments
    ///
    /// * `max` - The maximum number of pipeline iterations.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Enables or disables parallel method processing.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Chooses between skipping failing methods and aborting on the first error.
    #[must_use]
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Enables or disables individual passes.
    ///
    /// # Arguments
    ///
    /// * `unused_fields` - Enable unused field removal.
    /// * `unused_methods` - Enable unused method removal.
    /// * `dead_stores` - Enable dead store elimination.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_passes(mut self, unused_fields: bool, unused_methods: bool, dead_stores: bool) -> Self {
        self.cleanup.remove_unused_fields = unused_fields;
        self.cleanup.remove_unused_methods = unused_methods;
        self.enable_dead_store_elimination = dead_stores;
        self
    }

    /// Returns true if every pass is enabled.
    #[must_use]
    pub fn all_passes_enabled(&self) -> bool {
        self.cleanup.remove_unused_fields
            && self.cleanup.remove_unused_methods
            && self.enable_dead_store_elimination
    }
}
