pub mod cache;
pub mod client;
pub mod endpoints;
pub mod events;
pub mod mappers;
pub mod models;
pub mod queries;
pub mod subscription;
