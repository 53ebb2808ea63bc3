pub mod handlers;
pub mod links;
pub mod middleware;
pub mod router;
