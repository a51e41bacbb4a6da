pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod nitrc;
pub mod output;
pub mod postprocess;
pub mod subjects;
