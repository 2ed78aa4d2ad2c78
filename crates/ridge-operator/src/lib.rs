//! Ridge operator - wiring for the domain and certificate controllers

#![deny(missing_docs)]

pub mod config;
pub mod controller_runner;
pub mod crds;
