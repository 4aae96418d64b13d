//! Buffer pool configuration.

use strata_common::constants::{DEFAULT_POOL_SIZE, PAGE_SIZE};

/// Configuration for a buffer pool instance.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of page frames in this instance.
    pub pool_size: usize,
    /// Total number of instances in the parallel pool this instance
    /// belongs to (1 for a standalone pool).
    pub num_instances: usize,
    /// Index of this instance within the parallel pool.
    ///
    /// The instance allocates page identifiers `instance_index`,
    /// `instance_index + num_instances`, … so that every page it owns
    /// satisfies `page_id % num_instances == instance_index`.
    pub instance_index: usize,
}

impl BufferPoolConfig {
    /// Creates a standalone-instance configuration with the given
    /// number of frames.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            num_instances: 1,
            instance_index: 0,
        }
    }

    /// Places the instance at `instance_index` of a `num_instances`
    /// parallel pool.
    pub fn with_stripe(mut self, num_instances: usize, instance_index: usize) -> Self {
        self.num_instances = num_instances;
        self.instance_index = instance_index;
        self
    }

    /// Returns the memory used by this instance's frames.
    pub fn memory_usage(&self) -> usize {
        self.pool_size * PAGE_SIZE
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.pool_size == 0 {
            return Err("pool_size must be > 0");
        }
        if self.num_instances == 0 {
            return Err("num_instances must be > 0");
        }
        if self.instance_index >= self.num_instances {
            return Err("instance_index must be < num_instances");
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
