pub mod app_config;
pub mod database;
pub mod events;
pub mod finance_repo;
pub mod fx;
pub mod memory;
pub mod redis_repo;
pub mod reservation_repo;

pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisClient;
