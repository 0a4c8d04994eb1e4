pub mod spots;
pub mod sqlite;
pub mod users;

pub use sqlite::{create_pool, init_schema};
