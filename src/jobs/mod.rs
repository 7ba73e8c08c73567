pub mod retention;
pub mod sweep;
