// SPDX-License-Identifier: CEPL-1.0
//! Interfaces to the collaborators that sit outside the handle layer.
use std::ffi::CStr;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    kinds::Device,
    native::InstanceApi,
    result::{Result, VkResultExt},
};

/// The window the surface is created for.
///
/// Bootstrap calls each method once.
pub trait WindowSystem {
    /// Instance extensions needed to present to this window.
    fn required_extensions(&self) -> Result<Vec<&'static CStr>>;

    /// Handles the surface is created from. The window must outlive the
    /// surface.
    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)>;
}

/// Surface extensions for `display`, as reported by `ash-window`.
pub fn surface_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let names = ash_window::enumerate_required_extensions(display)
        .or_fail("enumerate_required_extensions")?;
    // SAFETY: ash-window returns pointers to its own NUL-terminated statics.
    Ok(names
        .iter()
        .map(|&name| unsafe { CStr::from_ptr(name) })
        .collect())
}

/// Builds the opaque pipeline state the frame code owns.
///
/// Whatever the factory returns is handed to an owning handle straight
/// away, so an implementation must not destroy it itself.
pub trait PipelineFactory<I: InstanceApi> {
    fn create_layout(&self, device: &Device<I>) -> Result<vk::PipelineLayout>;

    fn create_pipeline(
        &self,
        device: &Device<I>,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline>;
}
