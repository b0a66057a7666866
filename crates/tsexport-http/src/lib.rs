pub mod http;

pub use http::remote_write;
pub use http::server::{create_router, serve, start_server};
