pub mod chat;
pub mod config;
pub mod embedding;
pub mod retry;
