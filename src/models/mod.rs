pub mod audit;
pub mod connection;
pub mod endpoint;
