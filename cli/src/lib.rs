//! Paged job browser: the lazily loaded job table and its daemon client.

pub mod browse;
pub mod client;
pub mod output;
pub mod table;
