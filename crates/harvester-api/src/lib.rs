pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use router::metrics_router;
pub use state::AppState;
