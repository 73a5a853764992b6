pub mod pool;

#[cfg(test)]
pub mod test_support;

pub use pool::{create_pool, run_migrations};
