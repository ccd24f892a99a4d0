pub mod agent;
pub mod cases;
pub mod cli_args;
pub mod cli_dispatch;
pub mod config;
pub mod conversation;
pub mod mcp;
pub mod providers;
pub mod report;
pub mod runner;
pub mod steps;
pub mod tools;
pub mod types;
