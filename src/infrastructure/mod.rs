pub mod config;
pub mod credential_store;
pub mod error;
pub mod planning_client;
pub mod planning_mapper;
