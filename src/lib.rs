pub mod accounts;
pub mod app;
pub mod browser;
pub mod clock;
pub mod config;
pub mod dom;
pub mod download;
pub mod duration;
pub mod error;
pub mod export;
pub mod history;
pub mod models;
pub mod recon;
pub mod selectors;
pub mod settle;
