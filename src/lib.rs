// src/lib.rs

pub mod anomaly_detection;
pub mod api;
pub mod blockchain;
pub mod config;
pub mod core;
pub mod monitoring;
pub mod service;
pub mod storage;
