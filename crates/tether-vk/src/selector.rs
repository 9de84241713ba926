// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection.
//!
//! Devices are checked in enumeration order against an ordered list of
//! predicates and the first that passes all of them wins. There is no
//! scoring. A device's data is only queried when the device is reached, so
//! nothing after the winner is touched.
use std::{
    borrow::Cow,
    ffi::{CStr, CString},
    fmt,
};

use ash::{khr, vk};

use crate::{
    kinds::{Instance, Surface},
    native::InstanceApi,
    result::{Error, Result, VkResultExt},
};

/// What a device must offer to be picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub required_extensions: Vec<&'static CStr>,
    /// Accepted device types. Order carries no preference.
    pub device_types: Vec<vk::PhysicalDeviceType>,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            required_extensions: vec![khr::swapchain::NAME],
            device_types: vec![
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::INTEGRATED_GPU,
            ],
        }
    }
}

/// The first predicate a device failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingExtension(String),
    NoSurfaceFormats,
    NoPresentModes,
    DeviceType(vk::PhysicalDeviceType),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingExtension(name) => write!(f, "missing extension {name}"),
            Rejection::NoSurfaceFormats => f.write_str("no surface formats"),
            Rejection::NoPresentModes => f.write_str("no present modes"),
            Rejection::DeviceType(ty) => write!(f, "device type {} not accepted", device_type_name(*ty)),
        }
    }
}

/// Snapshot of one physical device as seen against one surface.
///
/// Physical devices are never destroyed by the application, so this holds
/// the bare handle.
#[derive(Clone)]
pub struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    queue_families: Vec<vk::QueueFamilyProperties>,
    extensions: Vec<CString>,
    surface_formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
}

impl PhysicalDevice {
    /// # Safety
    /// `handle` must come from `instance` and `surface` must be a live
    /// surface of `instance`.
    pub unsafe fn query<I: InstanceApi>(
        instance: &I,
        handle: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        // SAFETY: forwarded from the caller.
        unsafe {
            let properties = instance.physical_device_properties(handle);
            let features = instance.physical_device_features(handle);
            let queue_families = instance.queue_family_properties(handle);
            let extensions = instance
                .device_extension_properties(handle)
                .or_fail("vkEnumerateDeviceExtensionProperties")?
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
            let surface_formats = instance
                .surface_formats(handle, surface)
                .or_fail("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
            let present_modes = instance
                .surface_present_modes(handle, surface)
                .or_fail("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
            Ok(Self {
                handle,
                properties,
                features,
                queue_families,
                extensions,
                surface_formats,
                present_modes,
            })
        }
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn name(&self) -> Cow<'_, str> {
        self.properties
            .device_name_as_c_str()
            .map_or(Cow::Borrowed("<unnamed>"), CStr::to_string_lossy)
    }

    pub fn device_type(&self) -> vk::PhysicalDeviceType {
        self.properties.device_type
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_families
    }

    pub fn surface_formats(&self) -> &[vk::SurfaceFormatKHR] {
        &self.surface_formats
    }

    pub fn present_modes(&self) -> &[vk::PresentModeKHR] {
        &self.present_modes
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|ext| ext.as_c_str() == name)
    }

    /// `Ok` when every predicate holds, else the first one that failed.
    /// Predicates run in order: extensions, formats, present modes, type.
    pub fn verdict(&self, criteria: &Criteria) -> Result<(), Rejection> {
        if let Some(missing) = criteria
            .required_extensions
            .iter()
            .find(|name| !self.supports_extension(name))
        {
            return Err(Rejection::MissingExtension(missing.to_string_lossy().into_owned()));
        }
        if self.surface_formats.is_empty() {
            return Err(Rejection::NoSurfaceFormats);
        }
        if self.present_modes.is_empty() {
            return Err(Rejection::NoPresentModes);
        }
        if !criteria.device_types.contains(&self.device_type()) {
            return Err(Rejection::DeviceType(self.device_type()));
        }
        Ok(())
    }
}

impl fmt::Debug for PhysicalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalDevice")
            .field("handle", &self.handle)
            .field("name", &self.name())
            .field("type", &device_type_name(self.device_type()))
            .field("queue_families", &self.queue_families.len())
            .field("formats", &self.surface_formats.len())
            .field("present_modes", &self.present_modes.len())
            .finish_non_exhaustive()
    }
}

/// First device in enumeration order that satisfies `criteria`.
pub fn select<I: InstanceApi>(
    instance: &Instance<I>,
    surface: &Surface<I>,
    criteria: &Criteria,
) -> Result<PhysicalDevice> {
    let api = instance.try_raw()?;
    let surface = *surface.try_raw()?;
    // SAFETY: both handles are live for the duration of the borrow.
    let handles = unsafe { api.enumerate_physical_devices() }.or_fail("vkEnumeratePhysicalDevices")?;
    tracing::debug!("{} physical device(s) enumerated", handles.len());

    for handle in handles {
        // SAFETY: `handle` was just enumerated from `api`.
        let device = unsafe { PhysicalDevice::query(api, handle, surface)? };
        match device.verdict(criteria) {
            Ok(()) => {
                tracing::info!(
                    "selected {} ({})",
                    device.name(),
                    device_type_name(device.device_type())
                );
                return Ok(device);
            }
            Err(why) => tracing::debug!("skipping {}: {why}", device.name()),
        }
    }
    Err(Error::NoSuitableDevice)
}

/// Every device with its data, for listing.
pub fn enumerate<I: InstanceApi>(
    instance: &Instance<I>,
    surface: &Surface<I>,
) -> Result<Vec<PhysicalDevice>> {
    let api = instance.try_raw()?;
    let surface = *surface.try_raw()?;
    // SAFETY: both handles are live for the duration of the borrow.
    unsafe {
        api.enumerate_physical_devices()
            .or_fail("vkEnumeratePhysicalDevices")?
            .into_iter()
            .map(|handle| PhysicalDevice::query(api, handle, surface))
            .collect()
    }
}

/// First queue family that has GRAPHICS and can present to `surface`.
pub fn graphics_present_family<I: InstanceApi>(
    instance: &Instance<I>,
    device: &PhysicalDevice,
    surface: &Surface<I>,
) -> Result<u32> {
    let api = instance.try_raw()?;
    let surface = *surface.try_raw()?;
    for (index, family) in (0u32..).zip(device.queue_families()) {
        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        // SAFETY: the device came from this instance and the surface is live.
        let presents = unsafe { api.surface_support(device.handle(), index, surface) }
            .or_fail("vkGetPhysicalDeviceSurfaceSupportKHR")?;
        if presents {
            tracing::debug!(
                "queue family {index} ({}) on {}",
                describe_queue_flags(family.queue_flags),
                device.name()
            );
            return Ok(index);
        }
    }
    Err(Error::NoQueueFamily)
}

pub fn device_type_name(ty: vk::PhysicalDeviceType) -> &'static str {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => "discrete gpu",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated gpu",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual gpu",
        vk::PhysicalDeviceType::CPU => "cpu",
        _ => "other",
    }
}

pub fn describe_queue_flags(flags: vk::QueueFlags) -> String {
    const NAMES: [(vk::QueueFlags, &str); 5] = [
        (vk::QueueFlags::GRAPHICS, "graphics"),
        (vk::QueueFlags::COMPUTE, "compute"),
        (vk::QueueFlags::TRANSFER, "transfer"),
        (vk::QueueFlags::SPARSE_BINDING, "sparse binding"),
        (vk::QueueFlags::PROTECTED, "protected"),
    ];
    let names: Vec<_> = NAMES
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "none".to_owned()
    } else {
        names.join(" | ")
    }
}
