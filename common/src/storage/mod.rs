pub mod schema;
pub mod search;
pub mod types;
