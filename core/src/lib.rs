//! Daily protein/fat/carb ledger: input normalization and the SQLite store.

pub mod db;
pub mod error;
pub mod models;
pub mod service;
