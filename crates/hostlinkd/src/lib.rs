//! Reference host for the hostlink bridge.
//!
//! Owns a simulated [`Scene`] on its main thread, serves scene and timeline
//! commands through a [`hostlink::BridgeServer`], and drains bridge work once
//! per tick until a termination signal arrives.

mod cache;
mod errors;
pub mod handlers;
mod launch;
pub mod scene;
mod shutdown;

pub use cache::{DEFAULT_TTL, TtlCache};
pub use errors::LaunchError;
pub use launch::{ConfigLoader, StaticConfigLoader, SystemConfigLoader, run_host, run_host_with};
pub use scene::{ObjectKind, Scene, SceneError, SceneObject};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");
