pub mod config;
pub mod decode;
pub mod fetch;
pub mod harness;
pub mod manifest;
pub mod merge;
pub mod pipeline;
pub mod table;
