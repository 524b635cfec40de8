pub mod codec;
pub mod connection;
pub mod constants;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod fake;
