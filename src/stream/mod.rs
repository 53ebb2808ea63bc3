//! The streaming bridge core: HTTP range interpretation, location resolution
//! and the chunked fetch loop that feeds a response body.

pub mod fetch;
pub mod location;
pub mod range;
pub mod session;
