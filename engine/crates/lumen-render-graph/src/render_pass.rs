use std::any::Any;

use ash::vk;
use lumen_render_interface::per_frame::PerFrame;
use lumen_render_interface::render_context::RenderContext;
use lumen_render_interface::resources::image::GfxImage;

use crate::error::RenderGraphResult;

/// pass 的生命周期
///
/// `Uninitialized -> Ready -> (resize) Rebuilding -> Ready`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Uninitialized,
    Ready,
    Rebuilding,
}

/// 用于从 `dyn RenderPass` 还原具体的 pass 类型
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// 一个渲染单元：拥有自己的 pipeline 以及输出的 per-frame 资源
///
/// pipeline 和 pipeline layout 与窗口大小无关，`resize` 只重建引用了外部状态的 per-frame image 和 framebuffer。
pub trait RenderPass: AsAny {
    fn name(&self) -> &str;

    /// 创建 pipeline 以及初始大小的 per-frame 资源
    fn init(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()>;

    /// 录制当前帧的命令，依赖回调已经在这之前执行完毕
    fn draw(&mut self, ctx: &mut RenderContext, cmd: vk::CommandBuffer) -> RenderGraphResult<()>;

    fn resize(&mut self, ctx: &mut RenderContext, extent: vk::Extent2D) -> RenderGraphResult<()>;

    /// 供下游 pass 使用的 per-frame 输出
    fn output(&self, _name: &str) -> Option<PerFrame<GfxImage>> {
        None
    }

    fn destroy(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()>;
}
