//! Disk-usage snapshots: a threshold-driven scanner that writes a sparse
//! forest of per-directory listings, and a browser that reads them back.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod error;
pub mod logging;
pub mod measure;
pub mod navigator;
pub mod paths;
pub mod reveal;
pub mod scanner;
pub mod size_unit;
pub mod snapshot;
