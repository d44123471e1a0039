use ash::vk;
use itertools::Itertools;
use lumen_gfx::GfxResult;
use lumen_gfx::commands::command::{GfxClearValue, GfxCommand};
use lumen_gfx::pipelines::graphics_pipeline::{GfxAttachmentDesc, GfxGraphicsPipelineDesc};
use lumen_gfx::pipelines::shader::GfxShaderStage;
use lumen_gfx::resources::image::GfxImageDesc;
use lumen_render_interface::handle::Handle;
use lumen_render_interface::per_frame::PerFrame;
use lumen_render_interface::render_context::RenderContext;
use lumen_render_interface::resources::framebuffer::GfxFramebuffer;
use lumen_render_interface::resources::image::GfxImage;
use lumen_render_interface::resources::pipeline::GfxGraphicsPipeline;

use crate::error::RenderGraphResult;
use crate::render_pass::RenderPass;
use crate::render_pipeline::{DrawItem, not_initialized, resolve};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GBufferVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}
impl GBufferVertex {
    pub fn binding_desc() -> Vec<vk::VertexInputBindingDescription> {
        vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }]
    }

    pub fn attribute_desc() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Self, normal) as u32,
            },
        ]
    }
}

/// gbuffer 使用的 format，init 时从 frame settings 中确定
#[derive(Clone, Copy, Debug)]
struct GBufferFormats {
    albedo: vk::Format,
    normal: vk::Format,
    depth: vk::Format,
}

/// 随窗口大小变化的部分
struct GBufferTargets {
    albedo: PerFrame<GfxImage>,
    normal: PerFrame<GfxImage>,
    depth: PerFrame<GfxImage>,
    framebuffers: PerFrame<GfxFramebuffer>,
}

/// 把 [`DrawItem`] 绘制到 albedo、normal、depth 三张 per-frame image 中
pub struct GBufferPass {
    vert: Vec<u32>,
    frag: Vec<u32>,

    pipeline: Option<Handle<GfxGraphicsPipeline>>,
    formats: Option<GBufferFormats>,
    targets: Option<GBufferTargets>,

    draw_items: Vec<DrawItem>,
}

// new & init
impl GBufferPass {
    pub const ALBEDO: &'static str = "albedo";
    pub const NORMAL: &'static str = "normal";
    pub const DEPTH: &'static str = "depth";

    pub fn new(vert: Vec<u32>, frag: Vec<u32>) -> Self {
        Self {
            vert,
            frag,
            pipeline: None,
            formats: None,
            targets: None,
            draw_items: Vec::new(),
        }
    }

    fn create_targets(
        ctx: &mut RenderContext,
        pipeline: Handle<GfxGraphicsPipeline>,
        formats: GBufferFormats,
        extent: vk::Extent2D,
    ) -> GfxResult<GBufferTargets> {
        let render_pass = resolve(ctx.graphics_pipeline(pipeline), pipeline)?.render_pass();

        let albedo = ctx.create_per_frame_images(&GfxImageDesc::new_color_target(extent, formats.albedo, "gbuffer-albedo"))?;
        let normal = ctx.create_per_frame_images(&GfxImageDesc::new_color_target(extent, formats.normal, "gbuffer-normal"))?;
        let depth = ctx.create_per_frame_images(&GfxImageDesc::new_depth_target(extent, formats.depth, "gbuffer-depth"))?;
        let framebuffers = ctx.create_per_frame_framebuffers(
            render_pass,
            &[(formats.albedo, &albedo), (formats.normal, &normal), (formats.depth, &depth)],
            "gbuffer",
        )?;

        Ok(GBufferTargets {
            albedo,
            normal,
            depth,
            framebuffers,
        })
    }

    fn destroy_targets(&mut self, ctx: &mut RenderContext) -> GfxResult<()> {
        let Some(targets) = self.targets.take() else {
            return Ok(());
        };
        // framebuffer 引用了 image 的 view，先销毁
        ctx.destroy_per_frame_framebuffers(targets.framebuffers)?;
        ctx.destroy_per_frame_images(targets.albedo)?;
        ctx.destroy_per_frame_images(targets.normal)?;
        ctx.destroy_per_frame_images(targets.depth)
    }
}

// getters
impl GBufferPass {
    #[inline]
    pub fn draw_items(&self) -> &[DrawItem] {
        &self.draw_items
    }
}

// tools
impl GBufferPass {
    /// 替换下一帧开始要绘制的内容
    pub fn set_draw_items(&mut self, items: Vec<DrawItem>) {
        self.draw_items = items;
    }
}

impl RenderPass for GBufferPass {
    fn name(&self) -> &str {
        "gbuffer"
    }

    fn init(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        let settings = *ctx.frame_settings();
        let formats = GBufferFormats {
            albedo: settings.color_format,
            normal: settings.hdr_format,
            depth: settings.depth_format,
        };

        let mut desc = GfxGraphicsPipelineDesc::new("gbuffer")
            .stage(GfxShaderStage::new(vk::ShaderStageFlags::VERTEX, self.vert.clone()))
            .stage(GfxShaderStage::new(vk::ShaderStageFlags::FRAGMENT, self.frag.clone()))
            .color_attachment(GfxAttachmentDesc::color(formats.albedo))
            .color_attachment(GfxAttachmentDesc::color(formats.normal))
            .depth_attachment(GfxAttachmentDesc::depth(formats.depth))
            .vertex_input(GBufferVertex::binding_desc(), GBufferVertex::attribute_desc());
        desc.depth_test = true;
        desc.depth_write = true;

        let pipeline = ctx.create_graphics_pipeline(&desc)?;
        let extent = ctx.draw_area_extent();
        self.targets = Some(Self::create_targets(ctx, pipeline, formats, extent)?);
        self.pipeline = Some(pipeline);
        self.formats = Some(formats);
        Ok(())
    }

    fn draw(&mut self, ctx: &mut RenderContext, cmd: vk::CommandBuffer) -> RenderGraphResult<()> {
        let (Some(pipeline), Some(targets)) = (self.pipeline, self.targets.as_ref()) else {
            return Err(not_initialized(self.name()));
        };
        let pipeline = resolve(ctx.graphics_pipeline(pipeline), pipeline)?;
        let framebuffer = ctx.cur_frame_framebuffer(&targets.framebuffers)?;

        let mut commands = vec![
            GfxCommand::BeginRenderPass {
                render_pass: pipeline.render_pass(),
                framebuffer: framebuffer.vk_framebuffer(),
                extent: framebuffer.extent(),
                clear_values: vec![GfxClearValue::BLACK, GfxClearValue::BLACK, GfxClearValue::DEPTH_ONE],
            },
            GfxCommand::BindPipeline {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                pipeline: pipeline.pipeline(),
            },
            GfxCommand::SetViewportScissor {
                extent: framebuffer.extent(),
            },
        ];
        for item in &self.draw_items {
            let vertex_buffer = resolve(ctx.buffer(item.vertex_buffer), item.vertex_buffer)?;
            let index_buffer = resolve(ctx.buffer(item.index_buffer), item.index_buffer)?;
            commands.extend([
                GfxCommand::BindVertexBuffer {
                    buffer: vertex_buffer.vk_buffer(),
                    offset: 0,
                },
                GfxCommand::BindIndexBuffer {
                    buffer: index_buffer.vk_buffer(),
                    offset: 0,
                    index_type: vk::IndexType::UINT32,
                },
                GfxCommand::DrawIndexed {
                    index_count: item.index_count,
                    instance_count: 1,
                    first_index: 0,
                    vertex_offset: 0,
                    first_instance: 0,
                },
            ]);
        }
        commands.push(GfxCommand::EndRenderPass);

        commands.into_iter().for_each(|command| ctx.record(cmd, command));
        Ok(())
    }

    fn resize(&mut self, ctx: &mut RenderContext, extent: vk::Extent2D) -> RenderGraphResult<()> {
        let (Some(pipeline), Some(formats)) = (self.pipeline, self.formats) else {
            return Err(not_initialized(self.name()));
        };
        self.destroy_targets(ctx)?;
        self.targets = Some(Self::create_targets(ctx, pipeline, formats, extent)?);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<PerFrame<GfxImage>> {
        let targets = self.targets.as_ref()?;
        match name {
            Self::ALBEDO => Some(targets.albedo.clone()),
            Self::NORMAL => Some(targets.normal.clone()),
            Self::DEPTH => Some(targets.depth.clone()),
            _ => None,
        }
    }

    fn destroy(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        self.destroy_targets(ctx)?;
        if let Some(pipeline) = self.pipeline.take() {
            ctx.destroy_graphics_pipeline(pipeline)?;
        }
        self.formats = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::headless::headless_backend::HeadlessBackend;
    use lumen_gfx::resources::buffer::GfxBufferDesc;
    use lumen_render_interface::render_context::{RenderContextSettings, ResourceCounts};

    #[test]
    fn vertex_layout_matches_the_struct() {
        let attributes = GBufferVertex::attribute_desc();
        assert_eq!(GBufferVertex::binding_desc()[0].stride, 24);
        assert_eq!(attributes.iter().map(|a| a.offset).collect_vec(), vec![0, 12]);
    }

    #[test]
    fn draw_records_one_indexed_draw_per_item() {
        let mut ctx = RenderContext::new(Box::new(HeadlessBackend::new()), RenderContextSettings::default()).unwrap();
        let mut pass = GBufferPass::new(vec![0x0723_0203], vec![0x0723_0203]);
        pass.init(&mut ctx).unwrap();

        let vertices = [GBufferVertex::default(); 3];
        let vertex_buffer = ctx
            .create_buffer(&GfxBufferDesc::new(
                size_of_val(&vertices) as u64,
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                "triangle-vertex",
            ))
            .unwrap();
        ctx.upload_slice_to_gpu(vertex_buffer, &vertices).unwrap();
        let index_buffer = ctx
            .create_buffer(&GfxBufferDesc::new(
                12,
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                "triangle-index",
            ))
            .unwrap();
        ctx.upload_slice_to_gpu(index_buffer, &[0u32, 1, 2]).unwrap();

        let item = DrawItem {
            vertex_buffer,
            index_buffer,
            index_count: 3,
        };
        pass.set_draw_items(vec![item, item]);

        let cmd = ctx.gfx_mut().begin_commands(0).unwrap();
        pass.draw(&mut ctx, cmd).unwrap();
        ctx.gfx_mut().submit_frame(0, cmd, None).unwrap();

        let headless = ctx.gfx().as_any().downcast_ref::<HeadlessBackend>().unwrap();
        assert_eq!(headless.stats().draws, 2);
        assert_eq!(headless.stats().validation_errors, 0);
        let albedo = pass.output(GBufferPass::ALBEDO).unwrap();
        assert_eq!(ctx.cur_frame_image(&albedo).unwrap().extent(), ctx.draw_area_extent());

        ctx.destroy_buffer(vertex_buffer).unwrap();
        ctx.destroy_buffer(index_buffer).unwrap();
        pass.destroy(&mut ctx).unwrap();
        assert_eq!(ctx.live_resource_counts(), ResourceCounts::default());
        ctx.destroy();
    }
}
