pub mod api;
pub mod auth;
pub mod board;
pub mod config;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod server;
pub mod store;

#[cfg(test)]
mod test_support;
