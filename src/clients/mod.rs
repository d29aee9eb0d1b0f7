//! Thin HTTP clients for the hosted services behind traits, so the core
//! logic can run against in-memory fakes.

pub mod ai;
pub mod assets;
pub mod kv;

#[cfg(test)]
pub mod fakes;
