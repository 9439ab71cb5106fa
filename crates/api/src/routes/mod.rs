pub mod auth;
pub mod files;
pub mod ops;
pub mod refresh;
