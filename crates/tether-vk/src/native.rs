// SPDX-License-Identifier: CEPL-1.0
//! The driver seam.
//!
//! The handle layer never calls `ash` directly; it goes through these
//! traits so the same bootstrap and ownership code runs against the real
//! driver ([`crate::ash_backend`]) or an in-memory mock. Create infos are
//! the driver's own structures and are passed through untouched.
//!
//! Every method taking a raw handle is `unsafe`: the caller guarantees the
//! handle was derived from `self` and is still alive.
use std::{ffi::CStr, fmt};

use ash::{prelude::VkResult, vk};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// What to put into `vkCreateInstance`.
#[derive(Clone, Copy)]
pub struct InstanceDesc<'a> {
    pub app_name: &'a CStr,
    pub api_version: u32,
    pub flags: vk::InstanceCreateFlags,
    pub extensions: &'a [&'a CStr],
    pub layers: &'a [&'a CStr],
    /// Chained onto the create info so instance creation itself is reported.
    pub debug: Option<vk::DebugUtilsMessengerCreateInfoEXT<'static>>,
}

impl fmt::Debug for InstanceDesc<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceDesc")
            .field("app_name", &self.app_name)
            .field("api_version", &self.api_version)
            .field("flags", &self.flags)
            .field("extensions", &self.extensions)
            .field("layers", &self.layers)
            .field("debug", &self.debug.is_some())
            .finish()
    }
}

/// Entry point: the only way to obtain an instance.
pub trait Loader {
    type Instance: InstanceApi;

    /// # Safety
    /// Any callback in `desc.debug` must be sound to call from any thread
    /// for the lifetime of the instance.
    unsafe fn create_instance(&self, desc: &InstanceDesc<'_>) -> VkResult<Self::Instance>;
}

/// Instance-level dispatch.
pub trait InstanceApi: fmt::Debug + Send + Sync + 'static {
    type Device: DeviceApi;

    fn handle(&self) -> vk::Instance;

    /// # Safety
    /// Every object created from this instance must already be destroyed.
    unsafe fn destroy_instance(&self);

    unsafe fn create_debug_messenger(
        &self,
        info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT>;
    unsafe fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT);

    /// # Safety
    /// The window behind `window` must outlive the returned surface.
    unsafe fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR>;
    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR);

    unsafe fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>>;
    unsafe fn physical_device_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties;
    unsafe fn physical_device_features(&self, physical: vk::PhysicalDevice)
        -> vk::PhysicalDeviceFeatures;
    unsafe fn queue_family_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;
    unsafe fn device_extension_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>>;

    unsafe fn surface_support(
        &self,
        physical: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;
    unsafe fn surface_formats(
        &self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    unsafe fn surface_present_modes(
        &self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;
    unsafe fn surface_capabilities(
        &self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;

    unsafe fn create_device(
        &self,
        physical: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<Self::Device>;
}

/// Device-level dispatch, limited to what the ownership layer creates and
/// destroys. Command recording and submission go straight to the driver.
pub trait DeviceApi: fmt::Debug + Send + Sync + 'static {
    fn handle(&self) -> vk::Device;

    /// # Safety
    /// Every object created from this device must already be destroyed.
    unsafe fn destroy_device(&self);
    unsafe fn wait_idle(&self) -> VkResult<()>;
    unsafe fn get_queue(&self, family: u32, index: u32) -> vk::Queue;

    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool>;
    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool);
    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    unsafe fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo<'_>) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence>;
    unsafe fn destroy_fence(&self, fence: vk::Fence);

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer>;
    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);
    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule>;
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);
    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout>;
    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline>;
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR>;
    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
}
