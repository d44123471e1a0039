//! deferred 管线：gbuffer -> lighting -> overlay
//!
//! shader 由调用者以 SPIR-V 的形式提供，这里只负责资源、依赖和命令的组织。

use ash::vk;
use lumen_gfx::{GfxError, GfxResult};
use lumen_render_interface::handle::Handle;
use lumen_render_interface::pool::GfxResource;
use lumen_render_interface::resources::buffer::GfxBuffer;

use crate::error::{RenderGraphError, RenderGraphResult};
use crate::render_graph::{PassId, RenderGraph};
use crate::render_pass::PassState;
use crate::render_pipeline::gbuffer_pass::GBufferPass;
use crate::render_pipeline::lighting_pass::LightingPass;
use crate::render_pipeline::overlay_pass::OverlayPass;

pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod overlay_pass;
pub mod pass_inputs;

/// gbuffer 中的一次 indexed draw
///
/// 顶点格式固定为 position + normal，参考 [`gbuffer_pass::GBufferVertex`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawItem {
    pub vertex_buffer: Handle<GfxBuffer>,
    pub index_buffer: Handle<GfxBuffer>,
    pub index_count: u32,
}

/// deferred 管线需要的 shader
#[derive(Clone, Debug, Default)]
pub struct DeferredShaders {
    pub gbuffer_vert: Vec<u32>,
    pub gbuffer_frag: Vec<u32>,
    /// lighting 和 overlay 共用的全屏三角形
    pub fullscreen_vert: Vec<u32>,
    pub lighting_frag: Vec<u32>,
    pub overlay_frag: Vec<u32>,
}

#[derive(Clone, Copy, Debug)]
pub struct DeferredPasses {
    pub gbuffer: PassId,
    pub lighting: PassId,
    pub overlay: PassId,
}

/// 注册三个 pass 以及它们之间的依赖
///
/// `sampler` 由调用者创建和销毁，所有输入的采样都使用它
pub fn add_deferred_passes(
    graph: &mut RenderGraph,
    shaders: &DeferredShaders,
    sampler: vk::Sampler,
) -> RenderGraphResult<DeferredPasses> {
    let gbuffer = graph.add_pass(GBufferPass::new(shaders.gbuffer_vert.clone(), shaders.gbuffer_frag.clone()));
    let lighting = graph.add_pass(LightingPass::new(
        shaders.fullscreen_vert.clone(),
        shaders.lighting_frag.clone(),
        sampler,
    ));
    let overlay = graph.add_pass(OverlayPass::new(
        shaders.fullscreen_vert.clone(),
        shaders.overlay_frag.clone(),
        sampler,
    ));

    graph.add_dependency(lighting, gbuffer, GBufferPass::ALBEDO, |pass: &mut LightingPass, _, _, images| {
        pass.set_input(LightingPass::ALBEDO_BINDING, images);
        Ok(())
    })?;
    graph.add_dependency(lighting, gbuffer, GBufferPass::NORMAL, |pass: &mut LightingPass, _, _, images| {
        pass.set_input(LightingPass::NORMAL_BINDING, images);
        Ok(())
    })?;
    graph.add_dependency(overlay, lighting, LightingPass::HDR, |pass: &mut OverlayPass, _, _, images| {
        pass.set_input(images);
        Ok(())
    })?;

    Ok(DeferredPasses {
        gbuffer,
        lighting,
        overlay,
    })
}

/// 通过句柄取到的资源必须存在
pub(crate) fn resolve<T: GfxResource>(resource: Option<&T>, handle: Handle<T>) -> GfxResult<&T> {
    resource.ok_or_else(|| GfxError::StaleHandle {
        kind: T::KIND,
        handle: handle.to_string(),
    })
}

/// 在 init 之前访问 pass 的资源
pub(crate) fn not_initialized(pass: &str) -> RenderGraphError {
    RenderGraphError::PassNotReady {
        pass: pass.to_string(),
        state: PassState::Uninitialized,
    }
}
