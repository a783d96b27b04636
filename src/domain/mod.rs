//! Core domain types and backtest engine.

pub mod ohlcv;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod indicator;
pub mod indicator_helpers;
pub mod graph;
pub mod graph_parser;
pub mod graph_eval;
pub mod backtest;
pub mod batch;
pub mod grid;
pub mod metrics;
pub mod strategy;
pub mod config_validation;
pub mod error;
