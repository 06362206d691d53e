//! `ryusync` keeps Ryujinx and yuzu save data consistent.
//!
//! This crate provides the core library for reading and extending Ryujinx's
//! save-data archive, reconciling the two emulators' save trees, and
//! registering update/DLC packages with Ryujinx.

pub mod archive;
pub mod config;
pub mod content;
pub mod error;
pub mod export;
pub mod model;
pub mod sync;
