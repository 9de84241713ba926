// SPDX-License-Identifier: CEPL-1.0
//! Clear-and-triangle renderer on top of the bootstrap handles.
use std::{io::Cursor, time::Instant};

use anyhow::{Context, Result};
use ash::util::read_spv;
use tether_vk::{
    frame::{self, GraphicsPipeline},
    kinds::{CommandBuffer, CommandPool, Device, Fence, Framebuffer, RenderPass, Semaphore},
    native::DeviceApi,
    vk, AshInstance, Bootstrap, Error, PipelineFactory, Swapchain, SwapchainConfig, VkResultExt,
};
use tracing::{debug, info};

use crate::config::RenderCfg;

const FRAMES_IN_FLIGHT: usize = 2;

static VERT_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
static FRAG_SPV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

/// The triangle pipeline: no vertex input, dynamic viewport and scissor.
pub struct TrianglePipeline {
    vert: Vec<u32>,
    frag: Vec<u32>,
}

impl TrianglePipeline {
    pub fn load() -> Result<Self> {
        Ok(Self {
            vert: read_spv(&mut Cursor::new(VERT_SPV)).context("read tri.vert.spv")?,
            frag: read_spv(&mut Cursor::new(FRAG_SPV)).context("read tri.frag.spv")?,
        })
    }
}

impl PipelineFactory<AshInstance> for TrianglePipeline {
    fn create_layout(&self, device: &Device<AshInstance>) -> tether_vk::Result<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default();
        // SAFETY: empty layout on a live device.
        unsafe { device.try_raw()?.create_pipeline_layout(&info) }.or_fail("vkCreatePipelineLayout")
    }

    fn create_pipeline(
        &self,
        device: &Device<AshInstance>,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
    ) -> tether_vk::Result<vk::Pipeline> {
        // Modules are only needed until the pipeline exists.
        let vert = frame::shader_module(device, &self.vert)?;
        let frag = frame::shader_module(device, &self.frag)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert.handle())
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag.handle())
                .name(c"main"),
        ];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let raster = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&raster)
            .multisample_state(&multisample)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);
        // SAFETY: every handle in `info` is live until this returns.
        unsafe { device.try_raw()?.create_graphics_pipeline(&info) }
            .or_fail("vkCreateGraphicsPipelines")
    }
}

struct FrameSync<'a> {
    cmd: CommandBuffer<'a, AshInstance>,
    image_available: Semaphore<AshInstance>,
    in_flight: Fence<AshInstance>,
}

/// Per-frame objects go first, then everything tied to swapchain images,
/// then the swapchain.
pub struct Renderer<'a> {
    frames: Vec<FrameSync<'a>>,
    render_finished: Vec<Semaphore<AshInstance>>,
    framebuffers: Vec<Framebuffer<AshInstance>>,
    pipeline: GraphicsPipeline<AshInstance>,
    render_pass: RenderPass<AshInstance>,
    swapchain: Swapchain<AshInstance>,
    factory: TrianglePipeline,
    gpu: &'a Bootstrap<AshInstance>,

    clear_color: [f32; 4],
    vsync: bool,
    current: usize,
    stale: bool,
    frames_drawn: u32,
    last_fps_instant: Instant,
}

impl<'a> Renderer<'a> {
    pub fn new(
        gpu: &'a Bootstrap<AshInstance>,
        pool: &'a CommandPool<AshInstance>,
        cfg: &RenderCfg,
        size: (u32, u32),
    ) -> Result<Self> {
        let device = gpu.device();
        let config = SwapchainConfig {
            hint: vk::Extent2D {
                width: size.0,
                height: size.1,
            },
            vsync: cfg.vsync,
        };
        let swapchain = Swapchain::new(device, gpu.surface(), gpu.physical(), config)
            .context("create swapchain")?;
        let factory = TrianglePipeline::load()?;
        let render_pass = frame::render_pass(device, swapchain.format().format)?;
        let pipeline =
            GraphicsPipeline::new(device, &render_pass, &factory).context("create pipeline")?;
        let framebuffers = framebuffers(device, &render_pass, &swapchain)?;
        let render_finished = semaphores(device, swapchain.images().len())?;

        let frames = frame::command_buffers(pool, FRAMES_IN_FLIGHT)?
            .into_iter()
            .map(|cmd| {
                Ok(FrameSync {
                    cmd,
                    image_available: frame::semaphore(device)?,
                    in_flight: frame::fence(device, true)?,
                })
            })
            .collect::<tether_vk::Result<Vec<_>>>()?;

        Ok(Self {
            frames,
            render_finished,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            factory,
            gpu,
            clear_color: cfg.clear_color,
            vsync: cfg.vsync,
            current: 0,
            stale: false,
            frames_drawn: 0,
            last_fps_instant: Instant::now(),
        })
    }

    /// Marks the swapchain for rebuild before the next frame.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    /// Draws one frame, rebuilding the swapchain first if it went stale.
    pub fn frame(&mut self, size: (u32, u32)) -> Result<()> {
        if self.stale {
            self.rebuild(size)?;
        }
        self.draw()?;

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames_drawn);
            self.frames_drawn = 0;
            self.last_fps_instant = now;
        }
        Ok(())
    }

    pub fn wait_idle(&self) -> Result<()> {
        // SAFETY: the device is live while the renderer borrows it.
        unsafe { self.gpu.device().try_raw()?.wait_idle() }.or_fail("vkDeviceWaitIdle")?;
        Ok(())
    }

    fn rebuild(&mut self, size: (u32, u32)) -> Result<()> {
        let gpu = self.gpu;
        let device = gpu.device();
        self.wait_idle()?;
        self.framebuffers.clear();
        self.render_finished.clear();

        let old_format = self.swapchain.format().format;
        let config = SwapchainConfig {
            hint: vk::Extent2D {
                width: size.0,
                height: size.1,
            },
            vsync: self.vsync,
        };
        self.swapchain
            .recreate(device, gpu.surface(), gpu.physical(), config)
            .context("recreate swapchain")?;

        if self.swapchain.format().format != old_format {
            debug!("surface format changed, rebuilding render pass");
            let render_pass = frame::render_pass(device, self.swapchain.format().format)?;
            self.pipeline = GraphicsPipeline::new(device, &render_pass, &self.factory)?;
            self.render_pass = render_pass;
        }
        self.framebuffers = framebuffers(device, &self.render_pass, &self.swapchain)?;
        self.render_finished = semaphores(device, self.swapchain.images().len())?;
        self.stale = false;
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        let gpu = self.gpu;
        let device = gpu.device().try_raw()?;
        let ash = device.ash();
        let queue = gpu.queue().raw();
        let frame = &self.frames[self.current];
        let fence = frame.in_flight.handle();

        // SAFETY: every handle used below belongs to this device and stays
        // alive for the call; the fence guards reuse of the command buffer.
        unsafe {
            ash.wait_for_fences(&[fence], true, u64::MAX)
                .or_fail("vkWaitForFences")?;

            let acquired = device.swapchain_loader().acquire_next_image(
                self.swapchain.handle(),
                u64::MAX,
                frame.image_available.handle(),
                vk::Fence::null(),
            );
            let index = match acquired {
                Ok((index, suboptimal)) => {
                    self.stale |= suboptimal;
                    index
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    self.stale = true;
                    return Ok(());
                }
                Err(code) => {
                    return Err(Error::Native {
                        what: "vkAcquireNextImageKHR",
                        code,
                    }
                    .into())
                }
            };
            ash.reset_fences(&[fence]).or_fail("vkResetFences")?;

            let cmd = frame.cmd.handle();
            self.record(ash, cmd, index as usize)?;

            let wait = [frame.image_available.handle()];
            let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal = [self.render_finished[index as usize].handle()];
            let cmds = [cmd];
            let submit = vk::SubmitInfo::default()
                .wait_semaphores(&wait)
                .wait_dst_stage_mask(&stages)
                .command_buffers(&cmds)
                .signal_semaphores(&signal);
            ash.queue_submit(queue, std::slice::from_ref(&submit), fence)
                .or_fail("vkQueueSubmit")?;

            let swapchains = [self.swapchain.handle()];
            let indices = [index];
            let present = vk::PresentInfoKHR::default()
                .wait_semaphores(&signal)
                .swapchains(&swapchains)
                .image_indices(&indices);
            match device.swapchain_loader().queue_present(queue, &present) {
                Ok(suboptimal) => self.stale |= suboptimal,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.stale = true,
                Err(code) => {
                    return Err(Error::Native {
                        what: "vkQueuePresentKHR",
                        code,
                    }
                    .into())
                }
            }
        }

        self.current = (self.current + 1) % self.frames.len();
        self.frames_drawn = self.frames_drawn.saturating_add(1);
        Ok(())
    }

    unsafe fn record(&self, ash: &ash::Device, cmd: vk::CommandBuffer, image: usize) -> Result<()> {
        let extent = self.swapchain.extent();
        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rp_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers[image].handle())
            .render_area(area)
            .clear_values(&clear);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        // SAFETY: the caller waited on this buffer's fence.
        unsafe {
            ash.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .or_fail("vkResetCommandBuffer")?;
            ash.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())
                .or_fail("vkBeginCommandBuffer")?;
            ash.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            ash.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline());
            ash.cmd_set_viewport(cmd, 0, &[viewport]);
            ash.cmd_set_scissor(cmd, 0, &[area]);
            ash.cmd_draw(cmd, 3, 1, 0, 0);
            ash.cmd_end_render_pass(cmd);
            ash.end_command_buffer(cmd).or_fail("vkEndCommandBuffer")?;
        }
        Ok(())
    }
}

fn framebuffers(
    device: &Device<AshInstance>,
    render_pass: &RenderPass<AshInstance>,
    swapchain: &Swapchain<AshInstance>,
) -> tether_vk::Result<Vec<Framebuffer<AshInstance>>> {
    swapchain
        .views()
        .iter()
        .map(|view| frame::framebuffer(device, render_pass, view, swapchain.extent()))
        .collect()
}

fn semaphores(
    device: &Device<AshInstance>,
    count: usize,
) -> tether_vk::Result<Vec<Semaphore<AshInstance>>> {
    (0..count).map(|_| frame::semaphore(device)).collect()
}
