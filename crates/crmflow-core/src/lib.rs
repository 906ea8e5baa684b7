pub mod aggregates;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod records;
pub mod result;
pub mod scoring;
pub mod transform;
