mod dto;
pub mod handlers;
pub mod password;

pub use handlers::{guest_routes, routes};
