// SPDX-License-Identifier: CEPL-1.0
//! Vulkan handle ownership for tether.
//!
//! Every native object is wrapped in an [`Owned`] (exclusive) or
//! [`Shared`] (reference counted) handle that stores a link to the
//! parent it was created from. Rust drops a struct before its fields, so
//! a child's destroy call always runs while its parent is still alive:
//!
//! ```text
//! Instance (shared)
//! ├── Messenger
//! ├── Surface (shared)
//! └── Device (shared)
//!     ├── CommandPool ── CommandBuffer
//!     ├── Swapchain (also links Surface) ── ImageView
//!     ├── RenderPass ── Framebuffer
//!     ├── PipelineLayout / Pipeline / ShaderModule
//!     └── Semaphore / Fence
//! ```
//!
//! The driver is reached through the [`native`] seam traits, implemented
//! for `ash` in [`ash_backend`] and by an in-memory mock under test.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod ash_backend;
pub mod bootstrap;
pub mod collab;
pub mod diagnostics;
pub mod frame;
pub mod handle;
pub mod kinds;
pub mod native;
pub mod result;
pub mod selector;
pub mod swapchain;

#[cfg(test)]
pub(crate) mod mock;

pub use ash::vk;
pub use ash_backend::{AshDevice, AshInstance, AshLoader};
pub use bootstrap::{Bootstrap, Connection, Settings, Stage};
pub use collab::{PipelineFactory, WindowSystem};
pub use handle::{Destroy, Liveness, Owned, ParentRef, Root, Shared};
pub use result::{check, Error, Result, VkResultExt};
pub use selector::{Criteria, PhysicalDevice};
pub use swapchain::{Swapchain, SwapchainConfig};
