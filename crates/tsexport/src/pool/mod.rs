pub mod factory;
pub mod object_pool;

pub use factory::{BatchWriterFactory, PooledObjectFactory};
pub use object_pool::{ObjectPool, PoolConfig, PoolStats, Pooled};

/// The collector's pool of batch writers.
pub type WriterPool = ObjectPool<BatchWriterFactory>;

/// A writer borrowed from a [`WriterPool`].
pub type PooledWriter = Pooled<BatchWriterFactory>;
