// SPDX-License-Identifier: CEPL-1.0
//! Per-frame and per-pass objects built on a device.
//!
//! Each constructor returns an owning handle linked to its parent, so a
//! renderer only has to declare them in a sensible field order.
use ash::{prelude::VkResult, vk};

use crate::{
    collab::PipelineFactory,
    handle::{Destroy, Owned},
    kinds::{
        CommandBuffer, CommandPool, Device, Fence, Framebuffer, ImageView, Pipeline, PipelineLayout,
        RenderPass, Semaphore, ShaderModule,
    },
    native::{DeviceApi, InstanceApi},
    result::{Error, Result, VkResultExt},
};

fn device_child<K, I>(
    device: &Device<I>,
    what: &'static str,
    create: impl FnOnce(&I::Device) -> VkResult<K::Raw>,
) -> Result<Owned<K>>
where
    I: InstanceApi,
    K: Destroy<Parent = Device<I>>,
{
    Owned::with_parent(device.clone(), |device: &Device<I>| {
        create(device.try_raw()?).or_fail(what)
    })
}

/// A pool whose buffers can be reset one by one.
pub fn command_pool<I: InstanceApi>(device: &Device<I>, family: u32) -> Result<CommandPool<I>> {
    let info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(family);
    device_child(device, "vkCreateCommandPool", |api| unsafe {
        api.create_command_pool(&info)
    })
}

/// One primary command buffer borrowing `pool`.
pub fn command_buffer<I: InstanceApi>(pool: &CommandPool<I>) -> Result<CommandBuffer<'_, I>> {
    Owned::with_parent(pool, |pool: &CommandPool<I>| {
        let api = pool.parent().try_raw()?;
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool.try_raw()?)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: the pool belongs to this device and is live.
        let buffers = unsafe { api.allocate_command_buffers(&info) }
            .or_fail("vkAllocateCommandBuffers")?;
        buffers.into_iter().next().ok_or(Error::Native {
            what: "vkAllocateCommandBuffers",
            code: vk::Result::ERROR_UNKNOWN,
        })
    })
}

/// `count` buffers, each its own handle so each can be released alone.
pub fn command_buffers<I: InstanceApi>(
    pool: &CommandPool<I>,
    count: usize,
) -> Result<Vec<CommandBuffer<'_, I>>> {
    (0..count).map(|_| command_buffer(pool)).collect()
}

pub fn semaphore<I: InstanceApi>(device: &Device<I>) -> Result<Semaphore<I>> {
    let info = vk::SemaphoreCreateInfo::default();
    device_child(device, "vkCreateSemaphore", |api| unsafe { api.create_semaphore(&info) })
}

pub fn fence<I: InstanceApi>(device: &Device<I>, signaled: bool) -> Result<Fence<I>> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let info = vk::FenceCreateInfo::default().flags(flags);
    device_child(device, "vkCreateFence", |api| unsafe { api.create_fence(&info) })
}

/// Single colour attachment, cleared on load and handed to presentation.
pub fn render_pass<I: InstanceApi>(device: &Device<I>, format: vk::Format) -> Result<RenderPass<I>> {
    let attachment = vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);
    let color_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref));
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    let info = vk::RenderPassCreateInfo::default()
        .attachments(std::slice::from_ref(&attachment))
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));
    device_child(device, "vkCreateRenderPass", |api| unsafe { api.create_render_pass(&info) })
}

pub fn image_view<I: InstanceApi>(
    device: &Device<I>,
    image: vk::Image,
    format: vk::Format,
) -> Result<ImageView<I>> {
    let range = vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .level_count(1)
        .layer_count(1);
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(range);
    device_child(device, "vkCreateImageView", |api| unsafe { api.create_image_view(&info) })
}

/// Framebuffer over one view. The render pass and view must outlive it;
/// store it in a field declared before both.
pub fn framebuffer<I: InstanceApi>(
    device: &Device<I>,
    render_pass: &RenderPass<I>,
    view: &ImageView<I>,
    extent: vk::Extent2D,
) -> Result<Framebuffer<I>> {
    let attachments = [*view.try_raw()?];
    let info = vk::FramebufferCreateInfo::default()
        .render_pass(*render_pass.try_raw()?)
        .attachments(&attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);
    device_child(device, "vkCreateFramebuffer", |api| unsafe { api.create_framebuffer(&info) })
}

/// Shader module from SPIR-V words.
pub fn shader_module<I: InstanceApi>(device: &Device<I>, code: &[u32]) -> Result<ShaderModule<I>> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    device_child(device, "vkCreateShaderModule", |api| unsafe {
        api.create_shader_module(&info)
    })
}

/// A pipeline from a [`PipelineFactory`] together with its layout.
#[derive(Debug)]
pub struct GraphicsPipeline<I: InstanceApi> {
    pipeline: Pipeline<I>,
    layout: PipelineLayout<I>,
}

impl<I: InstanceApi> GraphicsPipeline<I> {
    pub fn new(
        device: &Device<I>,
        render_pass: &RenderPass<I>,
        factory: &dyn PipelineFactory<I>,
    ) -> Result<Self> {
        let pass = *render_pass.try_raw()?;
        let layout: PipelineLayout<I> = Owned::with_parent(device.clone(), |device: &Device<I>| {
            factory.create_layout(device)
        })?;
        let pipeline: Pipeline<I> = Owned::with_parent(device.clone(), |device: &Device<I>| {
            factory.create_pipeline(device, pass, layout.handle())
        })?;
        Ok(Self { pipeline, layout })
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}
