//! RePLAY Environment Abstraction Layer
//!
//! This crate provides the seams that let the playback engine run against
//! either the real world or a deterministic simulation:
//! - Time (`now()`, `system_time()`) through [`ReplayContext`]
//! - Log retrieval (`fetch()`) through [`LogTransport`]
//!
//! The engine never reads a wall clock or touches the filesystem directly,
//! so every playback bug can be replayed on a virtual clock.
//!
//! # Example
//!
//! ```ignore
//! use replay_env::{ReplayContext, LogTransport, LogLocation};
//!
//! async fn on_load<T: LogTransport>(transport: &T) -> Result<(), EnvError> {
//!     let envelope = transport.fetch(&LogLocation::file("run.json")).await?;
//!     registry.load(slot, load_from_envelope(&envelope)?);
//!     Ok(())
//! }
//!
//! fn on_frame<Ctx: ReplayContext>(ctx: &Ctx) {
//!     registry.tick_all(ctx.now(), &mut controls);
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;

pub use context::ReplayContext;
pub use transport::LogTransport;
pub use types::{LogEnvelope, LogLocation, GITHUB_RAW_PREFIX};
pub use error::EnvError;
pub use tokio_impl::{FsTransport, TokioContext};
