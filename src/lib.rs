pub mod config;
pub mod deliver;
pub mod diagnostics;
pub mod document;
pub mod dsn;
pub mod env;
pub mod init;
pub mod layer;
pub mod noop_sink;
pub mod record;
pub mod render;
pub mod scheduler;
pub mod sink;

#[cfg(feature = "http")]
pub mod http_store;
