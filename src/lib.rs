//! seekbridge serves media held in a chunk-addressed remote store over HTTP,
//! translating byte-range requests into a sequence of bounded fetches.

pub mod core;
pub mod delivery;
pub mod descriptor;
pub mod observability;
pub mod source;
pub mod stream;
