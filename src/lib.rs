pub mod config;
pub mod controller;
pub mod error;
pub mod flight;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;

pub use controller::QuizDraftController;
pub use service::{HttpQuizService, QuizService};

pub fn build_state(config: &config::ServerConfig) -> state::AppState {
    state::AppState::new(config.local_state_path.clone())
}
