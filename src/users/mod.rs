pub mod dto;
pub mod handlers;
pub mod repo;
pub mod service;

pub use handlers::routes;
