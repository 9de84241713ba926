// SPDX-License-Identifier: CEPL-1.0
//! Instance to queue, in one pass.
//!
//! Each step wraps its result in an owning handle as soon as it exists, so
//! an early return drops whatever was already built in reverse order and
//! nothing leaks. There is no partially bootstrapped state.
use std::{
    ffi::{CStr, CString},
    fmt,
};

use ash::{khr, vk};

use crate::{
    ash_backend::{AshInstance, AshLoader},
    collab::WindowSystem,
    diagnostics::{self, Diagnostics, Severity},
    kinds::{Device, Instance, Messenger, Surface},
    native::{DeviceApi, InstanceApi, InstanceDesc, Loader},
    result::{Error, Result, VkResultExt},
    selector::{self, Criteria, PhysicalDevice},
};

/// Where a bootstrap failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Instance,
    Messenger,
    Surface,
    Selection,
    Device,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Instance => "instance",
            Stage::Messenger => "debug messenger",
            Stage::Surface => "surface",
            Stage::Selection => "device selection",
            Stage::Device => "device",
        })
    }
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|err| err.at(stage))
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub api_version: u32,
    /// Validation level, `None` for no validation.
    pub validation: Option<Severity>,
    pub criteria: Criteria,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "application".to_owned(),
            api_version: vk::API_VERSION_1_0,
            validation: cfg!(debug_assertions).then_some(Severity::default()),
            criteria: Criteria::default(),
        }
    }
}

/// A device queue. Queues are not destroyed; this keeps the device alive
/// instead.
#[derive(Debug)]
pub struct Queue<I: InstanceApi> {
    raw: vk::Queue,
    family: u32,
    _device: Device<I>,
}

impl<I: InstanceApi> Queue<I> {
    pub fn raw(&self) -> vk::Queue {
        self.raw
    }

    pub fn family(&self) -> u32 {
        self.family
    }
}

/// Instance, optional messenger and surface: everything up to device
/// selection.
///
/// Enough to enumerate and judge devices without committing to one.
#[derive(Debug)]
pub struct Connection<I: InstanceApi> {
    surface: Surface<I>,
    messenger: Option<Messenger<I>>,
    instance: Instance<I>,
}

impl Connection<AshInstance> {
    /// Connect through the system Vulkan library.
    ///
    /// # Safety
    /// The window behind `window` must outlive the returned value.
    pub unsafe fn open(window: &dyn WindowSystem, settings: &Settings) -> Result<Self> {
        // SAFETY: the system loader is trusted.
        let loader = unsafe { AshLoader::load() }.at(Stage::Instance)?;
        let diagnostics = diagnostics::for_level(settings.validation);
        // SAFETY: forwarded from the caller.
        unsafe { Self::open_with(&loader, window, settings, diagnostics.as_ref()) }
    }
}

impl<I: InstanceApi> Connection<I> {
    /// # Safety
    /// The window behind `window` must outlive the returned value.
    pub unsafe fn open_with<L: Loader<Instance = I>>(
        loader: &L,
        window: &dyn WindowSystem,
        settings: &Settings,
        diagnostics: &dyn Diagnostics,
    ) -> Result<Self> {
        let app_name = CString::new(settings.app_name.as_str())
            .map_err(|_| Error::InvalidAppName)
            .at(Stage::Instance)?;
        let extensions = instance_extensions(window, diagnostics).at(Stage::Instance)?;
        let layers = diagnostics.layers();
        let desc = InstanceDesc {
            app_name: &app_name,
            api_version: settings.api_version,
            flags: instance_flags(),
            extensions: &extensions,
            layers: &layers,
            debug: diagnostics.messenger_info(),
        };
        tracing::debug!("creating instance: {desc:?}");
        let instance: Instance<I> = Instance::acquire(|| {
            // SAFETY: the messenger callback, if any, is a plain function.
            unsafe { loader.create_instance(&desc) }.or_fail("vkCreateInstance")
        })
        .at(Stage::Instance)?;

        let messenger = match diagnostics.messenger_info() {
            Some(info) => Some(
                Messenger::with_parent(instance.clone(), |instance: &Instance<I>| {
                    let api = instance.try_raw()?;
                    // SAFETY: the instance was created with debug utils enabled.
                    unsafe { api.create_debug_messenger(&info) }
                        .or_fail("vkCreateDebugUtilsMessengerEXT")
                })
                .at(Stage::Messenger)?,
            ),
            None => None,
        };

        let (display, window) = window.raw_handles().at(Stage::Surface)?;
        let surface: Surface<I> = Surface::with_parent(instance.clone(), |instance: &Instance<I>| {
            let api = instance.try_raw()?;
            // SAFETY: the caller keeps the window alive.
            unsafe { api.create_surface(display, window) }.or_fail("vkCreateSurfaceKHR")
        })
        .at(Stage::Surface)?;

        Ok(Self {
            surface,
            messenger,
            instance,
        })
    }

    /// Every physical device with its data, whether or not it would be
    /// selected.
    pub fn devices(&self) -> Result<Vec<PhysicalDevice>> {
        selector::enumerate(&self.instance, &self.surface)
    }

    pub fn instance(&self) -> &Instance<I> {
        &self.instance
    }

    pub fn messenger(&self) -> Option<&Messenger<I>> {
        self.messenger.as_ref()
    }

    pub fn surface(&self) -> &Surface<I> {
        &self.surface
    }
}

/// Everything bootstrap creates.
///
/// Field order is drop order; every handle also pins its parents, so the
/// order only matters for log readability.
#[derive(Debug)]
pub struct Bootstrap<I: InstanceApi> {
    queue: Queue<I>,
    device: Device<I>,
    physical: PhysicalDevice,
    connection: Connection<I>,
}

impl Bootstrap<AshInstance> {
    /// Bootstrap on the system Vulkan library.
    ///
    /// # Safety
    /// The window behind `window` must outlive the returned value.
    pub unsafe fn run(window: &dyn WindowSystem, settings: &Settings) -> Result<Self> {
        // SAFETY: the system loader is trusted.
        let loader = unsafe { AshLoader::load() }.at(Stage::Instance)?;
        let diagnostics = diagnostics::for_level(settings.validation);
        // SAFETY: forwarded from the caller.
        unsafe { Self::run_with(&loader, window, settings, diagnostics.as_ref()) }
    }
}

impl<I: InstanceApi> Bootstrap<I> {
    /// Bootstrap through `loader`.
    ///
    /// # Safety
    /// The window behind `window` must outlive the returned value.
    pub unsafe fn run_with<L: Loader<Instance = I>>(
        loader: &L,
        window: &dyn WindowSystem,
        settings: &Settings,
        diagnostics: &dyn Diagnostics,
    ) -> Result<Self> {
        // SAFETY: forwarded from the caller.
        let connection = unsafe { Connection::open_with(loader, window, settings, diagnostics) }?;
        let instance = connection.instance();
        let surface = connection.surface();

        let physical = selector::select(instance, surface, &settings.criteria).at(Stage::Selection)?;
        let family = selector::graphics_present_family(instance, &physical, surface).at(Stage::Device)?;

        let device_extensions = device_extensions(&physical, &settings.criteria);
        let device: Device<I> = create_device(instance, &physical, family, &device_extensions).at(Stage::Device)?;

        let raw_queue = {
            let api = device.try_raw().at(Stage::Device)?;
            // SAFETY: one queue of `family` was requested at device creation.
            unsafe { api.get_queue(family, 0) }
        };
        tracing::info!(
            "Vulkan ready on {} (queue family {family})",
            physical.name()
        );

        Ok(Self {
            queue: Queue {
                raw: raw_queue,
                family,
                _device: device.clone(),
            },
            device,
            physical,
            connection,
        })
    }

    pub fn instance(&self) -> &Instance<I> {
        self.connection.instance()
    }

    pub fn messenger(&self) -> Option<&Messenger<I>> {
        self.connection.messenger()
    }

    pub fn surface(&self) -> &Surface<I> {
        self.connection.surface()
    }

    pub fn physical(&self) -> &PhysicalDevice {
        &self.physical
    }

    pub fn device(&self) -> &Device<I> {
        &self.device
    }

    pub fn queue(&self) -> &Queue<I> {
        &self.queue
    }
}

fn create_device<I: InstanceApi>(
    instance: &Instance<I>,
    physical: &PhysicalDevice,
    family: u32,
    extensions: &[&CStr],
) -> Result<Device<I>> {
    let priorities = [1.0_f32];
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(family)
        .queue_priorities(&priorities);
    let names: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();
    let features = vk::PhysicalDeviceFeatures::default();
    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(std::slice::from_ref(&queue_info))
        .enabled_extension_names(&names)
        .enabled_features(&features);

    Device::with_parent(instance.clone(), |instance: &Instance<I>| {
        let api = instance.try_raw()?;
        // SAFETY: `physical` was enumerated from this instance.
        unsafe { api.create_device(physical.handle(), &info) }.or_fail("vkCreateDevice")
    })
}

/// Platform entries, then the window's, then diagnostics', without
/// duplicates.
pub fn instance_extensions(
    window: &dyn WindowSystem,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<&'static CStr>> {
    let mut names = platform_extensions();
    for name in window
        .required_extensions()?
        .into_iter()
        .chain(diagnostics.extensions())
    {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

fn platform_extensions() -> Vec<&'static CStr> {
    if cfg!(target_os = "macos") {
        vec![khr::portability_enumeration::NAME]
    } else {
        Vec::new()
    }
}

fn instance_flags() -> vk::InstanceCreateFlags {
    if cfg!(target_os = "macos") {
        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    } else {
        vk::InstanceCreateFlags::empty()
    }
}

/// Required extensions plus `VK_KHR_portability_subset` wherever the
/// device advertises it, which the loader then requires.
fn device_extensions(physical: &PhysicalDevice, criteria: &Criteria) -> Vec<&'static CStr> {
    let mut names = criteria.required_extensions.clone();
    if physical.supports_extension(khr::portability_subset::NAME) {
        names.push(khr::portability_subset::NAME);
    }
    names
}
