use ash::vk;
use lumen_gfx::commands::barrier::{GfxBarrierMask, GfxImageBarrier};
use lumen_gfx::commands::command::{GfxClearValue, GfxCommand};
use lumen_gfx::descriptors::descriptor::{GfxDescriptorBinding, GfxDescriptorSetLayoutDesc, GfxUpdateFrequency};
use lumen_gfx::pipelines::graphics_pipeline::{GfxAttachmentDesc, GfxGraphicsPipelineDesc};
use lumen_gfx::pipelines::shader::GfxShaderStage;
use lumen_gfx::{GfxError, GfxResult};
use lumen_render_interface::handle::Handle;
use lumen_render_interface::per_frame::PerFrame;
use lumen_render_interface::render_context::RenderContext;
use lumen_render_interface::resources::framebuffer::GfxFramebuffer;
use lumen_render_interface::resources::image::GfxImage;
use lumen_render_interface::resources::pipeline::GfxGraphicsPipeline;

use crate::error::RenderGraphResult;
use crate::render_pass::RenderPass;
use crate::render_pipeline::pass_inputs::PassInputs;
use crate::render_pipeline::{not_initialized, resolve};

/// 把 lighting 的结果画到 presentation image 上
///
/// framebuffer 按 presentation image 索引，数量由 presentation engine 决定
pub struct OverlayPass {
    vert: Vec<u32>,
    frag: Vec<u32>,
    sampler: vk::Sampler,

    pipeline: Option<Handle<GfxGraphicsPipeline>>,
    framebuffers: Option<PerFrame<GfxFramebuffer>>,

    inputs: PassInputs,
}

// new & init
impl OverlayPass {
    pub fn new(vert: Vec<u32>, frag: Vec<u32>, sampler: vk::Sampler) -> Self {
        Self {
            vert,
            frag,
            sampler,
            pipeline: None,
            framebuffers: None,
            inputs: PassInputs::new("overlay", 1),
        }
    }

    fn create_framebuffers(&mut self, ctx: &mut RenderContext) -> GfxResult<()> {
        let pipeline = self.pipeline.ok_or(GfxError::InvalidDesc("overlay pipeline is not created".to_string()))?;
        let render_pass = resolve(ctx.graphics_pipeline(pipeline), pipeline)?.render_pass();
        let present_images = ctx.present_images().cloned().ok_or(GfxError::NoSwapchain)?;
        let present_format = ctx.frame_settings().present_format;

        let framebuffers = ctx.create_per_frame_framebuffers(render_pass, &[(present_format, &present_images)], "overlay")?;
        self.framebuffers = Some(framebuffers);
        Ok(())
    }

    fn destroy_framebuffers(&mut self, ctx: &mut RenderContext) -> GfxResult<()> {
        match self.framebuffers.take() {
            Some(framebuffers) => ctx.destroy_per_frame_framebuffers(framebuffers),
            None => Ok(()),
        }
    }
}

// tools
impl OverlayPass {
    #[inline]
    pub fn set_input(&mut self, images: &PerFrame<GfxImage>) {
        self.inputs.set_source(0, images);
    }
}

impl RenderPass for OverlayPass {
    fn name(&self) -> &str {
        "overlay"
    }

    fn init(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        if ctx.present_images().is_none() {
            return Err(GfxError::NoSwapchain.into());
        }
        let desc = GfxGraphicsPipelineDesc::new("overlay")
            .stage(GfxShaderStage::new(vk::ShaderStageFlags::VERTEX, self.vert.clone()))
            .stage(GfxShaderStage::new(vk::ShaderStageFlags::FRAGMENT, self.frag.clone()))
            .color_attachment(GfxAttachmentDesc::present(ctx.frame_settings().present_format))
            .cull_mode(vk::CullModeFlags::NONE)
            .set_layouts(vec![
                GfxDescriptorSetLayoutDesc::new(vec![]),
                GfxDescriptorSetLayoutDesc::new(vec![GfxDescriptorBinding::new(
                    0,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                )]),
            ]);

        self.pipeline = Some(ctx.create_graphics_pipeline(&desc)?);
        self.create_framebuffers(ctx)?;
        Ok(())
    }

    fn draw(&mut self, ctx: &mut RenderContext, cmd: vk::CommandBuffer) -> RenderGraphResult<()> {
        let (Some(pipeline), Some(framebuffers)) = (self.pipeline, self.framebuffers.as_ref()) else {
            return Err(not_initialized(self.name()));
        };
        let input_layout = resolve(ctx.graphics_pipeline(pipeline), pipeline)?
            .set_layout(GfxUpdateFrequency::PerFrame)
            .ok_or(GfxError::InvalidDesc("overlay pipeline has no per-frame set layout".to_string()))?;
        self.inputs.prepare(ctx, input_layout, self.sampler)?;

        let hdr = self.inputs.source(0).ok_or(GfxError::InvalidDesc("overlay input is not bound".to_string()))?;
        let hdr = ctx.cur_frame_image(hdr)?;
        let barrier = GfxImageBarrier::new()
            .image(hdr.vk_image())
            .layout_transfer(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .mask(GfxBarrierMask::COLOR_WRITE_TO_SAMPLE)
            .image_aspect_flag(vk::ImageAspectFlags::COLOR);

        let pipeline = resolve(ctx.graphics_pipeline(pipeline), pipeline)?;
        let framebuffer = ctx.cur_frame_framebuffer(framebuffers)?;
        let set = self
            .inputs
            .cur_frame_set(ctx.frame_counter())
            .ok_or(GfxError::InvalidDesc("overlay inputs are not prepared".to_string()))?;
        let commands = [
            GfxCommand::ImageBarrier(barrier),
            GfxCommand::BeginRenderPass {
                render_pass: pipeline.render_pass(),
                framebuffer: framebuffer.vk_framebuffer(),
                extent: framebuffer.extent(),
                clear_values: vec![GfxClearValue::BLACK],
            },
            GfxCommand::BindPipeline {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                pipeline: pipeline.pipeline(),
            },
            GfxCommand::SetViewportScissor {
                extent: framebuffer.extent(),
            },
            GfxCommand::BindDescriptorSets {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                layout: pipeline.layout(),
                first_set: GfxUpdateFrequency::PerFrame.set_index(),
                sets: vec![set],
            },
            GfxCommand::draw_fullscreen(),
            GfxCommand::EndRenderPass,
        ];

        commands.into_iter().for_each(|command| ctx.record(cmd, command));
        Ok(())
    }

    /// presentation image 在 resize 时总是换成新的一组
    fn resize(&mut self, ctx: &mut RenderContext, _extent: vk::Extent2D) -> RenderGraphResult<()> {
        if self.pipeline.is_none() {
            return Err(not_initialized(self.name()));
        }
        self.destroy_framebuffers(ctx)?;
        self.create_framebuffers(ctx)?;
        Ok(())
    }

    fn destroy(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        self.inputs.destroy(ctx)?;
        self.destroy_framebuffers(ctx)?;
        if let Some(pipeline) = self.pipeline.take() {
            ctx.destroy_graphics_pipeline(pipeline)?;
        }
        Ok(())
    }
}
