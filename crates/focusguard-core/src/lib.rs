//! Core building blocks of FocusGuard: the managed artifact set, the
//! credential gate, the OS collaborators (service registry, immutable flag,
//! automation bridge) and the lifecycle controller that arms and disarms the
//! supervisor.

pub mod artifact;
pub mod automation;
pub mod credential;
pub mod fsutil;
pub mod immutability;
pub mod lifecycle;
pub mod paths;
pub mod registration;
pub mod settings;
pub mod snapshot;
