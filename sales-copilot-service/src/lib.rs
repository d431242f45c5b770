pub mod service;

pub use service::{AppState, build_router};
