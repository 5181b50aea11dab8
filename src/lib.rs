//! Library crate for quiz-arena-back, exposing modules for binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Wire types for the WebSocket, REST and SSE surfaces.
pub mod dto;
/// Error types and reason codes.
pub mod error;
/// HTTP routers.
pub mod routes;
/// Operations behind the routes.
pub mod services;
/// In-memory game state.
pub mod state;
