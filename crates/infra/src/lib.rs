//! Persistence layer: SQLite pool setup, row models and per-table repositories.

pub mod db;
pub mod models;
pub mod pagination;
pub mod repos;
