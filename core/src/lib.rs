pub mod aggregate;
pub mod db;
pub mod entries;
pub mod error;
pub mod labels;
pub mod models;
pub mod progress;
pub mod refresh;
pub mod service;
pub mod trend;
pub mod units;
