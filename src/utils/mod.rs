//! Utility functions and helpers.

pub mod aws;
