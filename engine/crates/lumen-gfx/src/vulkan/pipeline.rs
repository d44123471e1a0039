use std::ffi::CString;

use ash::vk;
use itertools::Itertools;

use crate::descriptors::descriptor::GfxDescriptorSetLayoutDesc;
use crate::error::{GfxError, GfxResult};
use crate::pipelines::compute_pipeline::GfxComputePipelineDesc;
use crate::pipelines::graphics_pipeline::{GfxGraphicsPipelineDesc, GfxPipelineObjects};
use crate::pipelines::shader::GfxShaderStage;

/// 创建 pipeline 相关的原生对象
///
/// 中途失败时，已经创建的对象会被销毁
pub struct VulkanPipelineFactory<'a> {
    device: &'a ash::Device,
}

impl<'a> VulkanPipelineFactory<'a> {
    #[inline]
    pub fn new(device: &'a ash::Device) -> Self {
        Self { device }
    }

    pub fn create_set_layout(&self, desc: &GfxDescriptorSetLayoutDesc) -> GfxResult<vk::DescriptorSetLayout> {
        let bindings = desc
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.ty)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect_vec();
        let ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        Ok(unsafe { self.device.create_descriptor_set_layout(&ci, None)? })
    }

    fn create_set_layouts(&self, descs: &[GfxDescriptorSetLayoutDesc]) -> GfxResult<Vec<vk::DescriptorSetLayout>> {
        let mut layouts = Vec::with_capacity(descs.len());
        for desc in descs {
            match self.create_set_layout(desc) {
                Ok(layout) => layouts.push(layout),
                Err(e) => {
                    self.destroy_set_layouts(&layouts);
                    return Err(e);
                }
            }
        }
        Ok(layouts)
    }

    fn destroy_set_layouts(&self, layouts: &[vk::DescriptorSetLayout]) {
        for layout in layouts {
            unsafe { self.device.destroy_descriptor_set_layout(*layout, None) };
        }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> GfxResult<vk::PipelineLayout> {
        let ci = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts).push_constant_ranges(push_constants);
        Ok(unsafe { self.device.create_pipeline_layout(&ci, None)? })
    }

    fn create_shader_module(&self, stage: &GfxShaderStage) -> GfxResult<vk::ShaderModule> {
        let ci = vk::ShaderModuleCreateInfo::default().code(&stage.spirv);
        Ok(unsafe { self.device.create_shader_module(&ci, None)? })
    }

    /// attachment 的顺序：先 color，再 depth
    fn create_render_pass(&self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<vk::RenderPass> {
        let attachments = desc
            .color_attachments
            .iter()
            .chain(desc.depth_attachment.iter())
            .map(|a| {
                vk::AttachmentDescription::default()
                    .format(a.format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(a.load_op)
                    .store_op(a.store_op)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(a.initial_layout)
                    .final_layout(a.final_layout)
            })
            .collect_vec();

        let color_refs = (0..desc.color_attachments.len() as u32)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect_vec();
        let depth_ref = vk::AttachmentReference {
            attachment: desc.color_attachments.len() as u32,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if desc.depth_attachment.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        // 上一个 pass 的写入完成之后才能开始当前 pass 的写入
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let ci = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));
        Ok(unsafe { self.device.create_render_pass(&ci, None)? })
    }

    pub fn create_graphics_pipeline(&self, desc: &GfxGraphicsPipelineDesc) -> GfxResult<GfxPipelineObjects> {
        if desc.stages.is_empty() {
            return Err(GfxError::InvalidDesc(format!("pipeline '{}' has no shader stage", desc.name)));
        }

        let render_pass = self.create_render_pass(desc)?;
        let set_layouts = match self.create_set_layouts(&desc.set_layouts) {
            Ok(layouts) => layouts,
            Err(e) => {
                unsafe { self.device.destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };
        let mut objects = GfxPipelineObjects {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            render_pass,
            set_layouts,
        };

        match self.create_graphics_pipeline_inner(desc, &mut objects) {
            Ok(()) => Ok(objects),
            Err(e) => {
                log::error!("failed to create graphics pipeline '{}': {}", desc.name, e);
                self.destroy_pipeline(&objects);
                Err(e)
            }
        }
    }

    fn create_graphics_pipeline_inner(
        &self,
        desc: &GfxGraphicsPipelineDesc,
        objects: &mut GfxPipelineObjects,
    ) -> GfxResult<()> {
        objects.layout = self.create_pipeline_layout(&objects.set_layouts, &desc.push_constants)?;

        let entry_points: Vec<CString> = desc
            .stages
            .iter()
            .map(|s| CString::new(s.entry_point.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|_| GfxError::InvalidDesc("shader entry point contains NUL".to_string()))?;
        let mut modules = Vec::with_capacity(desc.stages.len());
        for stage in &desc.stages {
            match self.create_shader_module(stage) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    self.destroy_shader_modules(&modules);
                    return Err(e);
                }
            }
        }
        let stages = desc
            .stages
            .iter()
            .zip(modules.iter())
            .zip(entry_points.iter())
            .map(|((stage, module), entry)| {
                vk::PipelineShaderStageCreateInfo::default().stage(stage.stage).module(*module).name(entry)
            })
            .collect_vec();

        // 顶点和 index
        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);
        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        let rasterize_info = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .depth_bias_enable(false);
        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // 混合设置：需要为每个 color attachment 分别指定
        let blend_states = desc
            .color_attachments
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(desc.blend_enable)
                    .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                    .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                    .color_blend_op(vk::BlendOp::ADD)
                    .src_alpha_blend_factor(vk::BlendFactor::ONE)
                    .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                    .alpha_blend_op(vk::BlendOp::ADD)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect_vec();
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .blend_constants([0.0, 0.0, 0.0, 0.0])
            .attachments(&blend_states);
        let depth_stencil_info = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterize_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&depth_stencil_info)
            .dynamic_state(&dynamic_state_info)
            .layout(objects.layout)
            .render_pass(objects.render_pass)
            .subpass(0);

        let result = unsafe {
            self.device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };
        self.destroy_shader_modules(&modules);

        objects.pipeline = result.map_err(|(_, e)| e)?[0];
        Ok(())
    }

    pub fn create_compute_pipeline(&self, desc: &GfxComputePipelineDesc) -> GfxResult<GfxPipelineObjects> {
        let set_layouts = self.create_set_layouts(&desc.set_layouts)?;
        let mut objects = GfxPipelineObjects {
            pipeline: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            render_pass: vk::RenderPass::null(),
            set_layouts,
        };

        let result = (|| -> GfxResult<()> {
            objects.layout = self.create_pipeline_layout(&objects.set_layouts, &desc.push_constants)?;
            let entry = CString::new(desc.stage.entry_point.as_str())
                .map_err(|_| GfxError::InvalidDesc("shader entry point contains NUL".to_string()))?;
            let module = self.create_shader_module(&desc.stage)?;
            let stage = vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(module)
                .name(&entry);
            let ci = vk::ComputePipelineCreateInfo::default().stage(stage).layout(objects.layout);
            let result = unsafe {
                self.device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&ci), None)
            };
            self.destroy_shader_modules(&[module]);
            objects.pipeline = result.map_err(|(_, e)| e)?[0];
            Ok(())
        })();

        match result {
            Ok(()) => Ok(objects),
            Err(e) => {
                log::error!("failed to create compute pipeline '{}': {}", desc.name, e);
                self.destroy_pipeline(&objects);
                Err(e)
            }
        }
    }

    fn destroy_shader_modules(&self, modules: &[vk::ShaderModule]) {
        for module in modules {
            unsafe { self.device.destroy_shader_module(*module, None) };
        }
    }

    /// null 对象会被跳过
    pub fn destroy_pipeline(&self, objects: &GfxPipelineObjects) {
        unsafe {
            if objects.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(objects.pipeline, None);
            }
            if objects.layout != vk::PipelineLayout::null() {
                self.device.destroy_pipeline_layout(objects.layout, None);
            }
            if objects.render_pass != vk::RenderPass::null() {
                self.device.destroy_render_pass(objects.render_pass, None);
            }
        }
        self.destroy_set_layouts(&objects.set_layouts);
    }
}
