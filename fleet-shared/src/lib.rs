pub mod application;
pub mod device;
pub mod query;
pub mod response;
pub mod service;
