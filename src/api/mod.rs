// API module
//
// Thin HTTP layer translating requests into ledger calls

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;
