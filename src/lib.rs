// Base layout model and merge
pub mod layout;

// Key-value persistence backends
pub mod storage;

// Overlay store, mutations and change notifications
pub mod overlay;

// Context broker settings and entity helpers
pub mod broker;

// Machine status derived from broker telemetry
pub mod telemetry;

// Configuration loading
pub mod config;

// HTTP and WebSocket APIs
pub mod api;
