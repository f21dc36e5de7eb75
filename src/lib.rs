pub mod config;
pub mod controller;
pub mod dto;
pub mod error;
pub mod instance;
pub mod media;
pub mod patch;
pub mod routes;
