//! # Tessera Rendering
//!
//! The GPU-facing half of the instance-data plane:
//! - A per-frame atlas sweep of every mesh store into one aligned byte buffer
//! - An N-slot upload ring where each slot is fenced before reuse
//! - A growth policy that resizes the atlas and ring together
//!
//! ## Frame Flow
//!
//! ```text
//! ┌──────────────┐  sweep   ┌────────────┐  upload  ┌──────────────────┐
//! │ MeshRegistry │ ───────► │ FrameAtlas │ ───────► │ MultiBufferRing  │
//! │ (per-mesh    │          │ (aligned   │          │ slot k mod N,    │
//! │  stores)     │          │  segments) │          │ fence-guarded    │
//! └──────────────┘          └────────────┘          └──────────────────┘
//!                                                            │ bind_range
//!                                                            ▼
//!                                                     shader binding points
//! ```
//!
//! ## Rules
//!
//! 1. **The CPU never writes a slot the GPU may still read**: the slot's fence
//!    is waited on first
//! 2. **No mesh is silently lost**: overflow is reported and drives growth
//! 3. **Backends are swappable**: everything goes through [`GpuBackend`]

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod atlas;
pub mod backend;
pub mod config;
pub mod error;
pub mod growth;
pub mod pipeline;
pub mod ring;

pub use atlas::{AtlasSegment, FrameAtlas, SweepReport};
pub use backend::{
    BackendEvent, BufferDesc, BufferRange, FenceStatus, GpuBackend, GpuTimeline, HeadlessBackend,
    HeadlessBuffer, HeadlessFence, WgpuBackend, WgpuBuffer, WgpuFence, DEFAULT_HEADLESS_ALIGNMENT,
};
pub use config::{FenceWaitConfig, GrowthConfig, TesseraConfig};
pub use error::{BackendError, ConfigError, RenderError, RenderResult};
pub use growth::GrowthPolicy;
pub use pipeline::{FrameStats, InstanceRenderer, RendererStats};
pub use ring::{MultiBufferRing, SlotState};
