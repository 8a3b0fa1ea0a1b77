pub mod config;
pub mod data;
pub mod meeting;
pub mod plan;
