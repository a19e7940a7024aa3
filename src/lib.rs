//! Timetable ingestion: fetch an upstream timetable site, normalize it and
//! reconcile it against a relational store with as few writes as possible.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod edit;
pub mod logging;
pub mod services;
pub mod sync;
pub mod timetable;
pub mod upstream;
pub mod utils;
