pub mod backpressure;
pub mod deferred_cleanup;
pub mod forgotten_worker;
pub mod unbounded_cache;
pub mod unbounded_spawn;
