pub mod access;
pub mod announce;
pub mod fallback;
pub mod health;
pub mod metrics;
pub mod scrape;
