// SPDX-License-Identifier: CEPL-1.0
//! The seam traits implemented on `ash`.
use std::fmt;

use ash::{
    ext::debug_utils,
    khr,
    prelude::VkResult,
    vk,
    Entry,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    native::{DeviceApi, InstanceApi, InstanceDesc, Loader},
    result::Result,
};

pub struct AshLoader {
    entry: Entry,
}

impl AshLoader {
    /// Load the system Vulkan library.
    ///
    /// # Safety
    /// Whatever library is found is trusted to be a conforming loader.
    pub unsafe fn load() -> Result<Self> {
        // SAFETY: forwarded from the caller.
        let entry = unsafe { Entry::load()? };
        Ok(Self { entry })
    }
}

impl fmt::Debug for AshLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AshLoader").finish_non_exhaustive()
    }
}

impl Loader for AshLoader {
    type Instance = AshInstance;

    unsafe fn create_instance(&self, desc: &InstanceDesc<'_>) -> VkResult<AshInstance> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(desc.app_name)
            .application_version(0)
            .engine_name(c"tether")
            .engine_version(0)
            .api_version(desc.api_version);

        let extensions: Vec<_> = desc.extensions.iter().map(|e| e.as_ptr()).collect();
        let layers: Vec<_> = desc.layers.iter().map(|l| l.as_ptr()).collect();
        let mut debug = desc.debug;

        let mut info = vk::InstanceCreateInfo::default()
            .flags(desc.flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        if let Some(debug) = debug.as_mut() {
            info = info.push_next(debug);
        }

        // SAFETY: every pointer in `info` borrows locals that outlive the call.
        let instance = unsafe { self.entry.create_instance(&info, None)? };
        Ok(AshInstance {
            surface: khr::surface::Instance::new(&self.entry, &instance),
            debug_utils: debug_utils::Instance::new(&self.entry, &instance),
            entry: self.entry.clone(),
            instance,
        })
    }
}

/// An `ash::Instance` plus the extension loaders the layer uses.
pub struct AshInstance {
    entry: Entry,
    instance: ash::Instance,
    surface: khr::surface::Instance,
    debug_utils: debug_utils::Instance,
}

impl AshInstance {
    pub fn ash(&self) -> &ash::Instance {
        &self.instance
    }
}

impl fmt::Debug for AshInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AshInstance").field(&self.instance.handle()).finish()
    }
}

impl InstanceApi for AshInstance {
    type Device = AshDevice;

    fn handle(&self) -> vk::Instance {
        self.instance.handle()
    }

    unsafe fn destroy_instance(&self) {
        unsafe { self.instance.destroy_instance(None) }
    }

    unsafe fn create_debug_messenger(
        &self,
        info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        unsafe { self.debug_utils.create_debug_utils_messenger(info, None) }
    }

    unsafe fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT) {
        unsafe { self.debug_utils.destroy_debug_utils_messenger(messenger, None) }
    }

    unsafe fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        unsafe { ash_window::create_surface(&self.entry, &self.instance, display, window, None) }
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface.destroy_surface(surface, None) }
    }

    unsafe fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }
    }

    unsafe fn physical_device_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(physical) }
    }

    unsafe fn physical_device_features(
        &self,
        physical: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.get_physical_device_features(physical) }
    }

    unsafe fn queue_family_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        unsafe { self.instance.get_physical_device_queue_family_properties(physical) }
    }

    unsafe fn device_extension_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        unsafe { self.instance.enumerate_device_extension_properties(physical) }
    }

    unsafe fn surface_support(
        &self,
        physical: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        unsafe {
            self.surface
                .get_physical_device_surface_support(physical, queue_family, surface)
        }
    }

    unsafe fn surface_formats(
        &self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.surface.get_physical_device_surface_formats(physical, surface) }
    }

    unsafe fn surface_present_modes(
        &self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface
                .get_physical_device_surface_present_modes(physical, surface)
        }
    }

    unsafe fn surface_capabilities(
        &self,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface
                .get_physical_device_surface_capabilities(physical, surface)
        }
    }

    unsafe fn create_device(
        &self,
        physical: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<AshDevice> {
        let device = unsafe { self.instance.create_device(physical, info, None)? };
        Ok(AshDevice {
            swapchain: khr::swapchain::Device::new(&self.instance, &device),
            device,
        })
    }
}

/// An `ash::Device` plus the swapchain loader.
pub struct AshDevice {
    device: ash::Device,
    swapchain: khr::swapchain::Device,
}

impl AshDevice {
    /// Raw dispatch for command recording and submission.
    pub fn ash(&self) -> &ash::Device {
        &self.device
    }

    pub fn swapchain_loader(&self) -> &khr::swapchain::Device {
        &self.swapchain
    }
}

impl fmt::Debug for AshDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AshDevice").field(&self.device.handle()).finish()
    }
}

impl DeviceApi for AshDevice {
    fn handle(&self) -> vk::Device {
        self.device.handle()
    }

    unsafe fn destroy_device(&self) {
        unsafe { self.device.destroy_device(None) }
    }

    unsafe fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    unsafe fn get_queue(&self, family: u32, index: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(family, index) }
    }

    unsafe fn create_command_pool(
        &self,
        info: &vk::CommandPoolCreateInfo<'_>,
    ) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, None) }
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { self.device.allocate_command_buffers(info) }
    }

    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    unsafe fn create_semaphore(&self, info: &vk::SemaphoreCreateInfo<'_>) -> VkResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(info, None) }
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    unsafe fn create_fence(&self, info: &vk::FenceCreateInfo<'_>) -> VkResult<vk::Fence> {
        unsafe { self.device.create_fence(info, None) }
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    unsafe fn create_framebuffer(
        &self,
        info: &vk::FramebufferCreateInfo<'_>,
    ) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> VkResult<vk::ShaderModule> {
        unsafe { self.device.create_shader_module(info, None) }
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(info, None) }
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let created = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(info),
                None,
            )
        };
        match created {
            Ok(pipelines) => pipelines.first().copied().ok_or(vk::Result::ERROR_UNKNOWN),
            Err((pipelines, code)) => {
                // Partial success still hands back handles that must go.
                for pipeline in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    unsafe { self.device.destroy_pipeline(pipeline, None) }
                }
                Err(code)
            }
        }
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    unsafe fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain.create_swapchain(info, None) }
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain.destroy_swapchain(swapchain, None) }
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain.get_swapchain_images(swapchain) }
    }
}
