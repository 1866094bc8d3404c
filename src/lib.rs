pub mod api;
pub mod backend;
pub mod config;
pub mod events;
pub mod expiry;
pub mod link;
pub mod registry;
pub mod service;
pub mod shortcode;
pub mod store;
pub mod validator;
