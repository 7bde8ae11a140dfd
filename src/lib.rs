pub mod acceptance;
pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod flows;
pub mod lifecycle;
pub mod msp;
pub mod order;
pub mod request;
pub mod service;
pub mod store;
pub mod types;
pub mod users;
pub mod utils;
