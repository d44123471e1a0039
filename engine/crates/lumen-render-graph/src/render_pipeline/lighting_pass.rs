use ash::vk;
use lumen_gfx::commands::barrier::{GfxBarrierMask, GfxImageBarrier};
use lumen_gfx::commands::command::{GfxClearValue, GfxCommand};
use lumen_gfx::descriptors::descriptor::{GfxDescriptorBinding, GfxDescriptorSetLayoutDesc, GfxUpdateFrequency};
use lumen_gfx::pipelines::graphics_pipeline::{GfxAttachmentDesc, GfxGraphicsPipelineDesc};
use lumen_gfx::pipelines::shader::GfxShaderStage;
use lumen_gfx::resources::image::GfxImageDesc;
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

/// 采样 gbuffer，把光照结果写入 per-frame 的 HDR image
///
/// gbuffer 换了一组 image 时只重建采样它们的 descriptor set；
/// 自己的 HDR image 和 framebuffer 只在 extent 变化时重建。
pub struct LightingPass {
    vert: Vec<u32>,
    frag: Vec<u32>,
    sampler: vk::Sampler,

    pipeline: Option<Handle<GfxGraphicsPipeline>>,
    hdr_format: vk::Format,
    hdr: Option<PerFrame<GfxImage>>,
    framebuffers: Option<PerFrame<GfxFramebuffer>>,
    extent: vk::Extent2D,

    inputs: PassInputs,
}

// new & init
impl LightingPass {
    pub const HDR: &'static str = "hdr";

    pub const ALBEDO_BINDING: usize = 0;
    pub const NORMAL_BINDING: usize = 1;

    pub fn new(vert: Vec<u32>, frag: Vec<u32>, sampler: vk::Sampler) -> Self {
        Self {
            vert,
            frag,
            sampler,
            pipeline: None,
            hdr_format: vk::Format::UNDEFINED,
            hdr: None,
            framebuffers: None,
            extent: vk::Extent2D::default(),
            inputs: PassInputs::new("lighting", 2),
        }
    }

    fn input_layout_desc() -> GfxDescriptorSetLayoutDesc {
        GfxDescriptorSetLayoutDesc::new(
            [Self::ALBEDO_BINDING, Self::NORMAL_BINDING]
                .into_iter()
                .map(|binding| {
                    GfxDescriptorBinding::new(
                        binding as u32,
                        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        vk::ShaderStageFlags::FRAGMENT,
                    )
                })
                .collect(),
        )
    }

    fn create_targets(&mut self, ctx: &mut RenderContext, extent: vk::Extent2D) -> GfxResult<()> {
        let pipeline = self.pipeline.ok_or(GfxError::InvalidDesc("lighting pipeline is not created".to_string()))?;
        let render_pass = resolve(ctx.graphics_pipeline(pipeline), pipeline)?.render_pass();

        let hdr = ctx.create_per_frame_images(&GfxImageDesc::new_color_target(extent, self.hdr_format, "lighting-hdr"))?;
        let framebuffers = ctx.create_per_frame_framebuffers(render_pass, &[(self.hdr_format, &hdr)], "lighting")?;
        self.hdr = Some(hdr);
        self.framebuffers = Some(framebuffers);
        self.extent = extent;
        Ok(())
    }

    fn destroy_targets(&mut self, ctx: &mut RenderContext) -> GfxResult<()> {
        if let Some(framebuffers) = self.framebuffers.take() {
            ctx.destroy_per_frame_framebuffers(framebuffers)?;
        }
        if let Some(hdr) = self.hdr.take() {
            ctx.destroy_per_frame_images(hdr)?;
        }
        Ok(())
    }
}

// getters
impl LightingPass {
    #[inline]
    pub fn inputs(&self) -> &PassInputs {
        &self.inputs
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

// tools
impl LightingPass {
    /// 依赖回调每帧调用，句柄不变时什么也不做
    #[inline]
    pub fn set_input(&mut self, binding: usize, images: &PerFrame<GfxImage>) {
        self.inputs.set_source(binding, images);
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        "lighting"
    }

    fn init(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        self.hdr_format = ctx.frame_settings().hdr_format;
        let desc = GfxGraphicsPipelineDesc::new("lighting")
            .stage(GfxShaderStage::new(vk::ShaderStageFlags::VERTEX, self.vert.clone()))
            .stage(GfxShaderStage::new(vk::ShaderStageFlags::FRAGMENT, self.frag.clone()))
            .color_attachment(GfxAttachmentDesc::color(self.hdr_format))
            .cull_mode(vk::CullModeFlags::NONE)
            // global set 为空，输入放在 per-frame set
            .set_layouts(vec![GfxDescriptorSetLayoutDesc::new(vec![]), Self::input_layout_desc()]);

        self.pipeline = Some(ctx.create_graphics_pipeline(&desc)?);
        let extent = ctx.draw_area_extent();
        self.create_targets(ctx, extent)?;
        Ok(())
    }

    fn draw(&mut self, ctx: &mut RenderContext, cmd: vk::CommandBuffer) -> RenderGraphResult<()> {
        let (Some(pipeline), Some(framebuffers)) = (self.pipeline, self.framebuffers.as_ref()) else {
            return Err(not_initialized(self.name()));
        };
        let input_layout = resolve(ctx.graphics_pipeline(pipeline), pipeline)?
            .set_layout(GfxUpdateFrequency::PerFrame)
            .ok_or(GfxError::InvalidDesc("lighting pipeline has no per-frame set layout".to_string()))?;
        self.inputs.prepare(ctx, input_layout, self.sampler)?;

        let mut commands = Vec::new();
        // gbuffer 的写入必须在采样之前完成
        for binding in [Self::ALBEDO_BINDING, Self::NORMAL_BINDING] {
            let source = self
                .inputs
                .source(binding)
                .ok_or(GfxError::InvalidDesc(format!("lighting input {binding} is not bound")))?;
            let image = ctx.cur_frame_image(source)?;
            commands.push(GfxCommand::ImageBarrier(
                GfxImageBarrier::new()
                    .image(image.vk_image())
                    .layout_transfer(
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    )
                    .mask(GfxBarrierMask::COLOR_WRITE_TO_SAMPLE)
                    .image_aspect_flag(image.aspect()),
            ));
        }

        let pipeline = resolve(ctx.graphics_pipeline(pipeline), pipeline)?;
        let framebuffer = ctx.cur_frame_framebuffer(framebuffers)?;
        let set = self
            .inputs
            .cur_frame_set(ctx.frame_counter())
            .ok_or(GfxError::InvalidDesc("lighting inputs are not prepared".to_string()))?;
        commands.extend([
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
        ]);

        commands.into_iter().for_each(|command| ctx.record(cmd, command));
        Ok(())
    }

    fn resize(&mut self, ctx: &mut RenderContext, extent: vk::Extent2D) -> RenderGraphResult<()> {
        if self.pipeline.is_none() {
            return Err(not_initialized(self.name()));
        }
        if extent == self.extent && self.hdr.as_ref().is_some_and(|hdr| hdr.is_alive(ctx.image_pool())) {
            log::debug!("lighting targets already {}x{}", extent.width, extent.height);
            return Ok(());
        }
        self.destroy_targets(ctx)?;
        self.create_targets(ctx, extent)?;
        Ok(())
    }

    fn output(&self, name: &str) -> Option<PerFrame<GfxImage>> {
        match name {
            Self::HDR => self.hdr.clone(),
            _ => None,
        }
    }

    fn destroy(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        self.inputs.destroy(ctx)?;
        self.destroy_targets(ctx)?;
        if let Some(pipeline) = self.pipeline.take() {
            ctx.destroy_graphics_pipeline(pipeline)?;
        }
        Ok(())
    }
}
