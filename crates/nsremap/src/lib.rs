pub mod access;
pub mod annotations;
pub mod classfile;
pub mod config;
pub mod descriptor;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod namespace;
pub mod pipeline;
pub mod remap_path;
