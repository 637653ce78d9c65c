//! Utilities shared by the connection driver.

pub mod client_proxy;
