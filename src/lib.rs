// chatmimic - chat-log persona fine-tuning
// Library exports

pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod providers;
pub mod server;
pub mod training;
