// SPDX-License-Identifier: CEPL-1.0
//! Handle kinds for every object the layer owns, with the aliases the rest
//! of the crate uses.
//!
//! Instance, surface and device are [`Shared`]; everything hanging off a
//! device is [`Owned`] by exactly one subsystem.
use std::marker::PhantomData;

use ash::vk;

use crate::{
    handle::{Destroy, Owned, Root, Shared},
    native::{DeviceApi, InstanceApi},
};

pub struct InstanceKind<I>(PhantomData<fn() -> I>);

impl<I: InstanceApi> Destroy for InstanceKind<I> {
    type Raw = I;
    type Parent = Root;
    const NAME: &'static str = "instance";

    unsafe fn destroy(_: &Root, instance: &I) {
        tracing::debug!("destroying instance {:?}", instance.handle());
        // SAFETY: forwarded from the caller; children hold clones of the
        // instance so none remain.
        unsafe { instance.destroy_instance() }
    }
}

pub type Instance<I> = Shared<InstanceKind<I>>;

pub struct MessengerKind<I>(PhantomData<fn() -> I>);

impl<I: InstanceApi> Destroy for MessengerKind<I> {
    type Raw = vk::DebugUtilsMessengerEXT;
    type Parent = Instance<I>;
    const NAME: &'static str = "debug messenger";

    unsafe fn destroy(instance: &Instance<I>, messenger: &vk::DebugUtilsMessengerEXT) {
        if let Some(instance) = instance.raw() {
            // SAFETY: forwarded from the caller.
            unsafe { instance.destroy_debug_messenger(*messenger) }
        }
    }
}

pub type Messenger<I> = Owned<MessengerKind<I>>;

pub struct SurfaceKind<I>(PhantomData<fn() -> I>);

impl<I: InstanceApi> Destroy for SurfaceKind<I> {
    type Raw = vk::SurfaceKHR;
    type Parent = Instance<I>;
    const NAME: &'static str = "surface";

    unsafe fn destroy(instance: &Instance<I>, surface: &vk::SurfaceKHR) {
        if let Some(instance) = instance.raw() {
            // SAFETY: forwarded from the caller; swapchains link the surface.
            unsafe { instance.destroy_surface(*surface) }
        }
    }
}

pub type Surface<I> = Shared<SurfaceKind<I>>;

pub struct DeviceKind<I>(PhantomData<fn() -> I>);

impl<I: InstanceApi> Destroy for DeviceKind<I> {
    type Raw = I::Device;
    type Parent = Instance<I>;
    const NAME: &'static str = "device";

    unsafe fn destroy(_: &Instance<I>, device: &I::Device) {
        tracing::debug!("destroying device {:?}", device.handle());
        // SAFETY: forwarded from the caller.
        unsafe { device.destroy_device() }
    }
}

pub type Device<I> = Shared<DeviceKind<I>>;

macro_rules! device_child {
    ($(#[$meta:meta])* $kind:ident, $alias:ident, $raw:ty, $name:literal, $destroy:ident) => {
        $(#[$meta])*
        pub struct $kind<I>(PhantomData<fn() -> I>);

        impl<I: InstanceApi> Destroy for $kind<I> {
            type Raw = $raw;
            type Parent = Device<I>;
            const NAME: &'static str = $name;

            unsafe fn destroy(device: &Device<I>, raw: &$raw) {
                if let Some(device) = device.raw() {
                    // SAFETY: forwarded from the caller.
                    unsafe { device.$destroy(*raw) }
                }
            }
        }

        pub type $alias<I> = Owned<$kind<I>>;
    };
}

device_child!(CommandPoolKind, CommandPool, vk::CommandPool, "command pool", destroy_command_pool);
device_child!(SemaphoreKind, Semaphore, vk::Semaphore, "semaphore", destroy_semaphore);
device_child!(FenceKind, Fence, vk::Fence, "fence", destroy_fence);
device_child!(RenderPassKind, RenderPass, vk::RenderPass, "render pass", destroy_render_pass);
device_child!(
    /// Framebuffers are declared before the views and render pass they use
    /// wherever they are stored together.
    FramebufferKind,
    Framebuffer,
    vk::Framebuffer,
    "framebuffer",
    destroy_framebuffer
);
device_child!(ImageViewKind, ImageView, vk::ImageView, "image view", destroy_image_view);
device_child!(ShaderModuleKind, ShaderModule, vk::ShaderModule, "shader module", destroy_shader_module);
device_child!(
    PipelineLayoutKind,
    PipelineLayout,
    vk::PipelineLayout,
    "pipeline layout",
    destroy_pipeline_layout
);
device_child!(PipelineKind, Pipeline, vk::Pipeline, "pipeline", destroy_pipeline);

/// Swapchains depend on both the device and the surface they present to.
pub struct SwapchainKind<I>(PhantomData<fn() -> I>);

impl<I: InstanceApi> Destroy for SwapchainKind<I> {
    type Raw = vk::SwapchainKHR;
    type Parent = (Device<I>, Surface<I>);
    const NAME: &'static str = "swapchain";

    unsafe fn destroy((device, _surface): &(Device<I>, Surface<I>), swapchain: &vk::SwapchainKHR) {
        if let Some(device) = device.raw() {
            // SAFETY: forwarded from the caller.
            unsafe { device.destroy_swapchain(*swapchain) }
        }
    }
}

pub type SwapchainHandle<I> = Owned<SwapchainKind<I>>;

/// Command buffers are freed back into their pool, which in turn links the
/// device, so both parents are alive when the buffer goes.
pub struct CommandBufferKind<I>(PhantomData<fn() -> I>);

impl<I: InstanceApi> Destroy for CommandBufferKind<I> {
    type Raw = vk::CommandBuffer;
    type Parent = CommandPool<I>;
    const NAME: &'static str = "command buffer";

    unsafe fn destroy(pool: &CommandPool<I>, buffer: &vk::CommandBuffer) {
        if let (Some(pool_raw), Some(device)) = (pool.raw(), pool.parent().raw()) {
            // SAFETY: forwarded from the caller; the buffer was allocated
            // from this pool.
            unsafe { device.free_command_buffers(*pool_raw, std::slice::from_ref(buffer)) }
        }
    }
}

/// A command buffer borrowing its pool for `'a`.
pub type CommandBuffer<'a, I> = Owned<CommandBufferKind<I>, &'a CommandPool<I>>;
