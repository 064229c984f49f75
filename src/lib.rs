//! Delivery service for AI-generated articles: schedules and pushes articles
//! from the content backend to one or more WordPress sites.

pub mod articles;
pub mod categorize;
pub mod config;
pub mod db;
pub mod http;
pub mod model;
pub mod publisher;
pub mod send;
pub mod sweep;
pub mod wordpress;
