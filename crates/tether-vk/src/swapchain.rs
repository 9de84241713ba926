// SPDX-License-Identifier: CEPL-1.0
//! Swapchain plus the image views over its images.
use ash::vk;

use crate::{
    frame,
    kinds::{Device, ImageView, Surface, SwapchainHandle},
    native::{DeviceApi, InstanceApi},
    result::{Error, Result, VkResultExt},
    selector::PhysicalDevice,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Used when the surface leaves the extent to the application.
    pub hint: vk::Extent2D,
    pub vsync: bool,
}

/// Views are declared before the swapchain so they go first.
#[derive(Debug)]
pub struct Swapchain<I: InstanceApi> {
    views: Vec<ImageView<I>>,
    images: Vec<vk::Image>,
    handle: SwapchainHandle<I>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl<I: InstanceApi> Swapchain<I> {
    pub fn new(
        device: &Device<I>,
        surface: &Surface<I>,
        physical: &PhysicalDevice,
        config: SwapchainConfig,
    ) -> Result<Self> {
        let instance = surface.parent().ok_or(Error::Empty { what: "surface" })?;
        let surface_raw = *surface.try_raw()?;
        // SAFETY: the physical device and surface both belong to `instance`.
        let caps = unsafe {
            instance
                .try_raw()?
                .surface_capabilities(physical.handle(), surface_raw)
        }
        .or_fail("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

        let format = choose_surface_format(physical.surface_formats())?;
        let present_mode = choose_present_mode(physical.present_modes(), config.vsync);
        let extent = extent_from_caps(&caps, config.hint);

        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface_raw)
            .min_image_count(image_count(&caps))
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let handle: SwapchainHandle<I> = SwapchainHandle::with_parent(
            (device.clone(), surface.clone()),
            |(device, _): &(Device<I>, Surface<I>)| {
                // SAFETY: the surface in `info` is pinned by the parent link.
                unsafe { device.try_raw()?.create_swapchain(&info) }.or_fail("vkCreateSwapchainKHR")
            },
        )?;

        // SAFETY: the swapchain was just created on this device.
        let images = unsafe { device.try_raw()?.swapchain_images(handle.handle()) }
            .or_fail("vkGetSwapchainImagesKHR")?;
        let views = images
            .iter()
            .map(|&image| frame::image_view(device, image, format.format))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "swapchain ready ({}x{}, {:?}, {:?}, {} images)",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            images.len()
        );
        Ok(Self {
            views,
            images,
            handle,
            format,
            extent,
            present_mode,
        })
    }

    /// Wait for the device, release the current swapchain and views, then
    /// build a new set. On failure `self` is left empty.
    pub fn recreate(
        &mut self,
        device: &Device<I>,
        surface: &Surface<I>,
        physical: &PhysicalDevice,
        config: SwapchainConfig,
    ) -> Result<()> {
        // SAFETY: the device is live for the borrow.
        unsafe { device.try_raw()?.wait_idle() }.or_fail("vkDeviceWaitIdle")?;
        self.views.clear();
        self.images.clear();
        self.handle.release();
        *self = Self::new(device, surface, physical, config)?;
        Ok(())
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle.handle()
    }

    pub fn views(&self) -> &[ImageView<I>] {
        &self.views
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }
}

/// B8G8R8A8_UNORM in sRGB non-linear if offered, else the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .ok_or(Error::Native {
            what: "vkGetPhysicalDeviceSurfaceFormatsKHR",
            code: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        })
}

/// FIFO is always available; MAILBOX is taken when vsync is off.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, hint: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: hint
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: hint
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no cap).
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}
