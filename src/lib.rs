//! Reconcile home automation `update.*` entities with the containers and triggers known to
//! What's Up Docker (WUD), and trigger container updates through WUD.
pub mod config;
pub mod dashboard;
pub mod gate;
pub mod matcher;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod release_notes;
pub mod wud;
