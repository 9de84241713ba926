// SPDX-License-Identifier: CEPL-1.0
//! In-memory driver for tests.
//!
//! Every create hands out a fresh handle value and records an [`Event`];
//! every destroy records one too, so tests can assert ordering and leaks.
//! Failures are injected per object kind.
use std::{
    collections::HashMap,
    ffi::{CStr, CString},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use ash::{
    khr,
    prelude::VkResult,
    vk::{self, Handle},
};
use raw_window_handle::{
    RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle,
};

use crate::{
    collab::WindowSystem,
    kinds::{Device, Instance, Surface},
    native::{DeviceApi, InstanceApi, InstanceDesc, Loader},
    result::{Result, VkResultExt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Create(&'static str, u64),
    Destroy(&'static str, u64),
}

/// One fake physical device.
#[derive(Debug, Clone)]
pub struct MockGpu {
    pub name: &'static str,
    pub device_type: vk::PhysicalDeviceType,
    pub extensions: Vec<&'static CStr>,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Flags and whether the family can present.
    pub queue_families: Vec<(vk::QueueFlags, bool)>,
}

impl MockGpu {
    /// A discrete GPU that passes every default predicate.
    pub fn discrete(name: &'static str) -> Self {
        Self {
            name,
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            extensions: vec![khr::swapchain::NAME],
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            queue_families: vec![(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                true,
            )],
        }
    }

    pub fn with_type(mut self, device_type: vk::PhysicalDeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_extension(mut self, name: &'static CStr) -> Self {
        self.extensions.push(name);
        self
    }

    pub fn without_swapchain(mut self) -> Self {
        self.extensions.retain(|e| *e != khr::swapchain::NAME);
        self
    }

    pub fn without_formats(mut self) -> Self {
        self.formats.clear();
        self
    }

    pub fn without_present_modes(mut self) -> Self {
        self.present_modes.clear();
        self
    }

    pub fn with_queue_families(mut self, families: Vec<(vk::QueueFlags, bool)>) -> Self {
        self.queue_families = families;
        self
    }
}

#[derive(Debug)]
struct State {
    gpus: Vec<MockGpu>,
    next: AtomicU64,
    events: Mutex<Vec<Event>>,
    failures: Mutex<HashMap<&'static str, vk::Result>>,
    queried: Mutex<Vec<usize>>,
    instance_extensions: Mutex<Vec<CString>>,
    instance_layers: Mutex<Vec<CString>>,
    instance_flags: Mutex<vk::InstanceCreateFlags>,
    instance_debug_chained: Mutex<bool>,
    device_extensions: Mutex<Vec<CString>>,
    capabilities: Mutex<vk::SurfaceCapabilitiesKHR>,
}

impl State {
    fn failure(&self, what: &'static str) -> VkResult<()> {
        match self.failures.lock().unwrap().get(what) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }

    fn create(&self, kind: &'static str) -> VkResult<u64> {
        self.failure(kind)?;
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event::Create(kind, id));
        Ok(id)
    }

    fn destroy(&self, kind: &'static str, id: u64) {
        self.events.lock().unwrap().push(Event::Destroy(kind, id));
    }

    fn gpu(&self, physical: vk::PhysicalDevice) -> &MockGpu {
        &self.gpus[(physical.as_raw() - MockDriver::PHYSICAL_BASE) as usize]
    }
}

fn names(list: &[&CStr]) -> Vec<CString> {
    list.iter().map(|n| (*n).to_owned()).collect()
}

/// The mock loader; also the handle tests keep to inspect what happened.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<State>,
}

impl MockDriver {
    const PHYSICAL_BASE: u64 = 1000;

    pub fn new(gpus: Vec<MockGpu>) -> Self {
        Self {
            state: Arc::new(State {
                gpus,
                next: AtomicU64::new(1),
                events: Mutex::default(),
                failures: Mutex::default(),
                queried: Mutex::default(),
                instance_extensions: Mutex::default(),
                instance_layers: Mutex::default(),
                instance_flags: Mutex::default(),
                instance_debug_chained: Mutex::new(false),
                device_extensions: Mutex::default(),
                capabilities: Mutex::new(vk::SurfaceCapabilitiesKHR {
                    min_image_count: 2,
                    max_image_count: 3,
                    current_extent: vk::Extent2D {
                        width: 800,
                        height: 600,
                    },
                    min_image_extent: vk::Extent2D {
                        width: 1,
                        height: 1,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    max_image_array_layers: 1,
                    current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                    ..Default::default()
                }),
            }),
        }
    }

    /// Handle value the mock gives to the physical device at `index`.
    pub fn physical(index: usize) -> vk::PhysicalDevice {
        vk::PhysicalDevice::from_raw(Self::PHYSICAL_BASE + index as u64)
    }

    /// Make every later create (or query) named `what` fail with `code`.
    pub fn fail(&self, what: &'static str, code: vk::Result) {
        self.state.failures.lock().unwrap().insert(what, code);
    }

    pub fn set_capabilities(&self, caps: vk::SurfaceCapabilitiesKHR) {
        *self.state.capabilities.lock().unwrap() = caps;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.events.lock().unwrap().clone()
    }

    /// Ids of `kind` objects created so far.
    pub fn created(&self, kind: &str) -> Vec<u64> {
        self.filter(|e| matches!(e, Event::Create(k, _) if *k == kind))
    }

    pub fn destroyed(&self, kind: &str) -> Vec<u64> {
        self.filter(|e| matches!(e, Event::Destroy(k, _) if *k == kind))
    }

    fn filter(&self, keep: impl Fn(&Event) -> bool) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter(|e| keep(e))
            .map(|e| match e {
                Event::Create(_, id) | Event::Destroy(_, id) => id,
            })
            .collect()
    }

    /// Objects created and not yet destroyed.
    pub fn live(&self) -> Vec<Event> {
        let events = self.events();
        events
            .iter()
            .copied()
            .filter(|e| match e {
                Event::Create(kind, id) => !events.contains(&Event::Destroy(*kind, *id)),
                Event::Destroy(..) => false,
            })
            .collect()
    }

    /// Position of `event` in the log.
    pub fn position(&self, event: Event) -> usize {
        self.events()
            .iter()
            .position(|e| *e == event)
            .unwrap_or_else(|| panic!("{event:?} not recorded"))
    }

    /// Indices of physical devices whose data was queried, in order.
    pub fn queried(&self) -> Vec<usize> {
        self.state.queried.lock().unwrap().clone()
    }

    pub fn instance_extensions(&self) -> Vec<CString> {
        self.state.instance_extensions.lock().unwrap().clone()
    }

    pub fn instance_layers(&self) -> Vec<CString> {
        self.state.instance_layers.lock().unwrap().clone()
    }

    pub fn instance_flags(&self) -> vk::InstanceCreateFlags {
        *self.state.instance_flags.lock().unwrap()
    }

    pub fn debug_chained(&self) -> bool {
        *self.state.instance_debug_chained.lock().unwrap()
    }

    pub fn device_extensions(&self) -> Vec<CString> {
        self.state.device_extensions.lock().unwrap().clone()
    }

    /// A live instance with no extensions.
    pub fn instance(&self) -> Instance<MockInstance> {
        let desc = InstanceDesc {
            app_name: c"test",
            api_version: vk::API_VERSION_1_0,
            flags: vk::InstanceCreateFlags::empty(),
            extensions: &[],
            layers: &[],
            debug: None,
        };
        Instance::acquire(|| unsafe { self.create_instance(&desc) }.or_fail("vkCreateInstance"))
            .unwrap()
    }

    pub fn surface(&self, instance: &Instance<MockInstance>) -> Surface<MockInstance> {
        let (display, window) = MockWindow.raw_handles().unwrap();
        Surface::with_parent(instance.clone(), |instance: &Instance<MockInstance>| {
            let api = instance.try_raw()?;
            unsafe { api.create_surface(display, window) }.or_fail("vkCreateSurface")
        })
        .unwrap()
    }
}

impl MockDriver {
    /// A live device on the first physical device.
    pub fn device(&self, instance: &Instance<MockInstance>) -> Device<MockInstance> {
        Device::with_parent(instance.clone(), |instance: &Instance<MockInstance>| {
            let info = vk::DeviceCreateInfo::default();
            unsafe { instance.try_raw()?.create_device(Self::physical(0), &info) }
                .or_fail("vkCreateDevice")
        })
        .unwrap()
    }
}

impl Loader for MockDriver {
    type Instance = MockInstance;

    unsafe fn create_instance(&self, desc: &InstanceDesc<'_>) -> VkResult<MockInstance> {
        let id = self.state.create("instance")?;
        *self.state.instance_extensions.lock().unwrap() = names(desc.extensions);
        *self.state.instance_layers.lock().unwrap() = names(desc.layers);
        *self.state.instance_flags.lock().unwrap() = desc.flags;
        *self.state.instance_debug_chained.lock().unwrap() = desc.debug.is_some();
        Ok(MockInstance {
            state: Arc::clone(&self.state),
            id,
        })
    }
}

#[derive(Debug)]
pub struct MockInstance {
    state: Arc<State>,
    id: u64,
}

impl InstanceApi for MockInstance {
    type Device = MockDevice;

    fn handle(&self) -> vk::Instance {
        vk::Instance::from_raw(self.id)
    }

    unsafe fn destroy_instance(&self) {
        self.state.destroy("instance", self.id);
    }

    unsafe fn create_debug_messenger(
        &self,
        _: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        self.state
            .create("debug messenger")
            .map(vk::DebugUtilsMessengerEXT::from_raw)
    }

    unsafe fn destroy_debug_messenger(&self, messenger: vk::DebugUtilsMessengerEXT) {
        self.state.destroy("debug messenger", messenger.as_raw());
    }

    unsafe fn create_surface(
        &self,
        _: RawDisplayHandle,
        _: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        self.state.create("surface").map(vk::SurfaceKHR::from_raw)
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        self.state.destroy("surface", surface.as_raw());
    }

    unsafe fn enumerate_physical_devices(&self) -> VkResult<Vec<vk::PhysicalDevice>> {
        self.state.failure("enumerate")?;
        Ok((0..self.state.gpus.len()).map(MockDriver::physical).collect())
    }

    unsafe fn physical_device_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        let index = (physical.as_raw() - MockDriver::PHYSICAL_BASE) as usize;
        self.state.queried.lock().unwrap().push(index);
        let gpu = self.state.gpu(physical);
        vk::PhysicalDeviceProperties::default()
            .device_type(gpu.device_type)
            .device_name(&CString::new(gpu.name).unwrap())
            .unwrap()
    }

    unsafe fn physical_device_features(&self, _: vk::PhysicalDevice) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
    }

    unsafe fn queue_family_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        self.state
            .gpu(physical)
            .queue_families
            .iter()
            .map(|(flags, _)| vk::QueueFamilyProperties {
                queue_flags: *flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    unsafe fn device_extension_properties(
        &self,
        physical: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::ExtensionProperties>> {
        self.state.failure("extensions")?;
        Ok(self
            .state
            .gpu(physical)
            .extensions
            .iter()
            .map(|name| vk::ExtensionProperties::default().extension_name(name).unwrap())
            .collect())
    }

    unsafe fn surface_support(
        &self,
        physical: vk::PhysicalDevice,
        queue_family: u32,
        _: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        Ok(self.state.gpu(physical).queue_families[queue_family as usize].1)
    }

    unsafe fn surface_formats(
        &self,
        physical: vk::PhysicalDevice,
        _: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        self.state.failure("surface formats")?;
        Ok(self.state.gpu(physical).formats.clone())
    }

    unsafe fn surface_present_modes(
        &self,
        physical: vk::PhysicalDevice,
        _: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state.gpu(physical).present_modes.clone())
    }

    unsafe fn surface_capabilities(
        &self,
        _: vk::PhysicalDevice,
        _: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(*self.state.capabilities.lock().unwrap())
    }

    unsafe fn create_device(
        &self,
        _: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> VkResult<MockDevice> {
        let id = self.state.create("device")?;
        let extensions = (0..info.enabled_extension_count as usize)
            .map(|i| unsafe { CStr::from_ptr(*info.pp_enabled_extension_names.add(i)) }.to_owned())
            .collect();
        *self.state.device_extensions.lock().unwrap() = extensions;
        Ok(MockDevice {
            state: Arc::clone(&self.state),
            id,
        })
    }
}

#[derive(Debug)]
pub struct MockDevice {
    state: Arc<State>,
    id: u64,
}

macro_rules! mock_child {
    ($create:ident, $destroy:ident, $info:ty, $raw:ty, $kind:literal) => {
        unsafe fn $create(&self, _: &$info) -> VkResult<$raw> {
            self.state.create($kind).map(<$raw>::from_raw)
        }

        unsafe fn $destroy(&self, raw: $raw) {
            self.state.destroy($kind, raw.as_raw());
        }
    };
}

impl DeviceApi for MockDevice {
    fn handle(&self) -> vk::Device {
        vk::Device::from_raw(self.id)
    }

    unsafe fn destroy_device(&self) {
        self.state.destroy("device", self.id);
    }

    unsafe fn wait_idle(&self) -> VkResult<()> {
        self.state.failure("wait idle")
    }

    unsafe fn get_queue(&self, family: u32, index: u32) -> vk::Queue {
        vk::Queue::from_raw(0x9000 + u64::from(family) * 16 + u64::from(index))
    }

    mock_child!(
        create_command_pool,
        destroy_command_pool,
        vk::CommandPoolCreateInfo<'_>,
        vk::CommandPool,
        "command pool"
    );

    unsafe fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        (0..info.command_buffer_count)
            .map(|_| {
                self.state
                    .create("command buffer")
                    .map(vk::CommandBuffer::from_raw)
            })
            .collect()
    }

    unsafe fn free_command_buffers(&self, _: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        for buffer in buffers {
            self.state.destroy("command buffer", buffer.as_raw());
        }
    }

    mock_child!(
        create_semaphore,
        destroy_semaphore,
        vk::SemaphoreCreateInfo<'_>,
        vk::Semaphore,
        "semaphore"
    );
    mock_child!(create_fence, destroy_fence, vk::FenceCreateInfo<'_>, vk::Fence, "fence");
    mock_child!(
        create_render_pass,
        destroy_render_pass,
        vk::RenderPassCreateInfo<'_>,
        vk::RenderPass,
        "render pass"
    );
    mock_child!(
        create_framebuffer,
        destroy_framebuffer,
        vk::FramebufferCreateInfo<'_>,
        vk::Framebuffer,
        "framebuffer"
    );
    mock_child!(
        create_image_view,
        destroy_image_view,
        vk::ImageViewCreateInfo<'_>,
        vk::ImageView,
        "image view"
    );
    mock_child!(
        create_shader_module,
        destroy_shader_module,
        vk::ShaderModuleCreateInfo<'_>,
        vk::ShaderModule,
        "shader module"
    );
    mock_child!(
        create_pipeline_layout,
        destroy_pipeline_layout,
        vk::PipelineLayoutCreateInfo<'_>,
        vk::PipelineLayout,
        "pipeline layout"
    );
    mock_child!(
        create_graphics_pipeline,
        destroy_pipeline,
        vk::GraphicsPipelineCreateInfo<'_>,
        vk::Pipeline,
        "pipeline"
    );
    mock_child!(
        create_swapchain,
        destroy_swapchain,
        vk::SwapchainCreateInfoKHR<'_>,
        vk::SwapchainKHR,
        "swapchain"
    );

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok((0..3)
            .map(|i| vk::Image::from_raw(swapchain.as_raw() * 100 + i))
            .collect())
    }
}

/// Window collaborator handing out Xlib handles that the mock never reads.
#[derive(Debug, Clone, Copy)]
pub struct MockWindow;

impl WindowSystem for MockWindow {
    fn required_extensions(&self) -> Result<Vec<&'static CStr>> {
        Ok(vec![khr::surface::NAME, khr::xlib_surface::NAME])
    }

    fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        Ok((
            RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
            RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
        ))
    }
}
