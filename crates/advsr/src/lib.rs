//! Advisor Chat Backend Library
//!
//! Core components for the streaming advisor chat service: conversation
//! persistence and lifecycle, the completion relay, the subscriber hub,
//! and the HTTP/WebSocket surface.

pub mod api;
pub mod auth;
pub mod chat;
pub mod db;
pub mod observability;
pub mod user;
pub mod ws;
