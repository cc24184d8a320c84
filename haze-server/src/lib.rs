pub mod config;
pub mod error;
pub mod generate;
pub mod routes;
pub mod schema;
pub mod state;

pub use config::ServiceConfig;
pub use routes::router;
pub use state::AppState;
