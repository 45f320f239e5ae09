pub mod in_memory_event_bus;
pub mod in_memory_repository;
pub mod postgres_repository;
pub mod redis_event_bus;

pub use in_memory_event_bus::InMemoryEventBus;
pub use in_memory_repository::InMemoryStore;
pub use postgres_repository::{MIGRATOR, PostgresStore};
pub use redis_event_bus::RedisEventBus;
