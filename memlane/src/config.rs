//! Configuration types for memlane.

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of in-flight pooled requests.
    /// Default: 256
    pub max_requests: usize,
    /// Validate caller parameters at the public entry points.
    /// Default: true
    pub check_params: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_requests: 256,
            check_params: true,
        }
    }
}

impl WorkerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of pooled requests.
    pub fn with_max_requests(mut self, max_requests: usize) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Enable or disable parameter validation.
    pub fn with_check_params(mut self, check_params: bool) -> Self {
        self.check_params = check_params;
        self
    }
}

/// Endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Index of the lane used for RMA operations.
    /// Default: 0
    pub rma_lane: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { rma_lane: 0 }
    }
}

impl EndpointConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the RMA lane index.
    pub fn with_rma_lane(mut self, rma_lane: usize) -> Self {
        self.rma_lane = rma_lane;
        self
    }
}
