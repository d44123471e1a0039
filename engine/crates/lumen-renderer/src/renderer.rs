use ash::vk;
use lumen_crate_tools::init_log::init_log;
use lumen_gfx::backend::{GfxAcquire, GfxBackend};
use lumen_render_graph::error::RenderGraphResult;
use lumen_render_graph::render_graph::{PassId, RenderGraph};
use lumen_render_graph::render_pass::RenderPass;
use lumen_render_interface::per_frame::PerFrame;
use lumen_render_interface::render_context::RenderContext;
use lumen_render_interface::resources::image::GfxImage;

use crate::config::RendererConfig;
use crate::error::{RendererError, RendererResult};
use crate::presentation::PresentationWindow;

pub fn panic_handler(info: &std::panic::PanicHookInfo) {
    log::error!("{}", info);
}

/// 一次 `render_frame` 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// 命令已经提交，有 presentation 时也已经 present
    Rendered,
    /// acquire 时 presentation image 已经失效，这一帧没有录制任何命令，已经完成 resize
    Skipped,
    /// 帧已经提交，之后因为 present 的结果完成了 resize
    Resized,
}

/// 帧循环的调度者
///
/// 持有 [`RenderContext`] 和 [`RenderGraph`]，pass 通过参数拿到 context，不存在全局状态。
pub struct Renderer {
    config: RendererConfig,
    render_context: RenderContext,
    render_graph: RenderGraph,

    initialized: bool,
    /// 窗口系统最近一次报告的尺寸，重建 presentation image 时使用
    window_extent: vk::Extent2D,
}

// new & init
impl Renderer {
    pub fn new(gfx: Box<dyn GfxBackend>, config: RendererConfig) -> RendererResult<Self> {
        config.validate()?;
        let render_context = RenderContext::new(gfx, config.render_context_settings())?;
        let window_extent = render_context.draw_area_extent();

        log::info!(
            "renderer created: backend '{}', {} frames in flight, draw area {}x{}",
            render_context.gfx().name(),
            render_context.num_frames_in_flight(),
            window_extent.width,
            window_extent.height
        );
        Ok(Self {
            config,
            render_context,
            render_graph: RenderGraph::new(),
            initialized: false,
            window_extent,
        })
    }

    /// 安装 panic hook 并初始化日志
    pub fn init_env() {
        std::panic::set_hook(Box::new(panic_handler));

        init_log();
    }

    /// `init` 之后再添加的 pass 需要再调用一次 `init`
    pub fn add_pass(&mut self, pass: impl RenderPass) -> PassId {
        self.render_graph.add_pass(pass)
    }

    pub fn add_dependency<P: RenderPass>(
        &mut self,
        consumer: PassId,
        producer: PassId,
        output: impl Into<String>,
        callback: impl FnMut(&mut P, &mut RenderContext, vk::CommandBuffer, &PerFrame<GfxImage>) -> RenderGraphResult<()>
        + 'static,
    ) -> RendererResult<()> {
        self.render_graph.add_dependency(consumer, producer, output, callback)?;
        Ok(())
    }

    /// 初始化所有还没有初始化的 pass
    pub fn init(&mut self) -> RendererResult<()> {
        self.render_graph.init(&mut self.render_context)?;
        self.initialized = true;
        Ok(())
    }
}

// getters
impl Renderer {
    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn context(&self) -> &RenderContext {
        &self.render_context
    }

    #[inline]
    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.render_context
    }

    #[inline]
    pub fn graph(&self) -> &RenderGraph {
        &self.render_graph
    }

    #[inline]
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.render_graph
    }

    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        self.window_extent
    }
}

// update
impl Renderer {
    /// 渲染一帧
    ///
    /// wait slot -> acquire -> begin -> execute graph -> submit -> present -> next frame
    pub fn render_frame(&mut self) -> RendererResult<FrameOutcome> {
        if !self.initialized {
            return Err(RendererError::NotInitialized);
        }

        let ctx = &mut self.render_context;
        let slot = ctx.frame_counter().frame_slot();
        ctx.gfx_mut().wait_frame_slot(slot)?;

        let mut need_resize = false;
        let present_image = if ctx.present_images().is_some() {
            match ctx.gfx_mut().acquire_present_image(slot)? {
                GfxAcquire::Image { index, suboptimal } => {
                    need_resize |= suboptimal;
                    Some(index)
                }
                GfxAcquire::OutOfDate => {
                    log::warn!("{} presentation is out of date when acquiring, skip", ctx.frame_counter().frame_name());
                    self.resize(self.window_extent)?;
                    return Ok(FrameOutcome::Skipped);
                }
            }
        } else {
            None
        };
        ctx.frame_counter_mut().set_present_image_index(present_image);

        let cmd = ctx.gfx_mut().begin_commands(slot)?;
        self.render_graph.execute(ctx, cmd)?;
        ctx.gfx_mut().submit_frame(slot, cmd, present_image)?;

        if let Some(index) = present_image {
            let present = ctx.gfx_mut().present(slot, index)?;
            if present.need_recreate() {
                log::warn!("{} present returned {:?}", ctx.frame_counter().frame_name(), present);
                need_resize = true;
            }
        }
        ctx.frame_counter_mut().next_frame();

        if need_resize {
            self.resize(self.window_extent)?;
            return Ok(FrameOutcome::Resized);
        }
        Ok(FrameOutcome::Rendered)
    }

    /// 重建 presentation image 以及所有 pass 的尺寸相关资源
    ///
    /// 尺寸为 0（例如窗口最小化）时什么也不做
    pub fn resize(&mut self, extent: vk::Extent2D) -> RendererResult<()> {
        if extent.width == 0 || extent.height == 0 {
            log::warn!("ignore resize to {}x{}", extent.width, extent.height);
            return Ok(());
        }
        self.window_extent = extent;

        let ctx = &mut self.render_context;
        ctx.gfx_mut().wait_idle()?;
        if ctx.present_images().is_some() {
            // 旧的 view 必须在 presentation image 重建之前销毁
            ctx.release_present_images()?;
            let info = ctx.gfx_mut().recreate_swapchain(extent)?;
            ctx.wrap_present_images(&info)?;
        } else {
            ctx.set_draw_area_extent(extent);
        }
        ctx.frame_counter_mut().reset();

        let draw_area = ctx.draw_area_extent();
        if self.initialized {
            self.render_graph.resize(ctx, draw_area)?;
        }
        log::info!("renderer resized to {}x{}", draw_area.width, draw_area.height);
        Ok(())
    }

    /// 一直渲染直到窗口要求退出，返回提交的帧数
    pub fn run(&mut self, window: &mut dyn PresentationWindow) -> RendererResult<u64> {
        let mut frames = 0;
        while !window.should_exit() {
            window.poll_events();

            let extent = window.draw_area_extent();
            if extent.width == 0 || extent.height == 0 {
                continue;
            }
            if extent != self.window_extent {
                self.resize(extent)?;
            }

            match self.render_frame()? {
                FrameOutcome::Rendered | FrameOutcome::Resized => frames += 1,
                FrameOutcome::Skipped => {}
            }
        }
        log::info!("frame loop finished after {} frames", frames);
        Ok(frames)
    }
}

// destroy
impl Renderer {
    /// 销毁所有 pass 和资源，把 backend 交还给调用者
    pub fn destroy(self) -> RendererResult<Box<dyn GfxBackend>> {
        let Self {
            mut render_context,
            mut render_graph,
            ..
        } = self;

        if let Err(err) = render_context.gfx_mut().wait_idle() {
            log::error!("wait idle before destroying renderer: {err}");
        }
        let graph_result = render_graph.destroy(&mut render_context);
        let gfx = render_context.destroy();
        graph_result?;

        log::info!("renderer destroyed");
        Ok(gfx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_gfx::headless::headless_backend::HeadlessBackend;
    use lumen_render_graph::error::RenderGraphError;

    fn offscreen_renderer() -> Renderer {
        lumen_crate_tools::init_log::init_test_log();
        Renderer::new(Box::new(HeadlessBackend::new()), RendererConfig::default()).unwrap()
    }

    fn headless(renderer: &Renderer) -> &HeadlessBackend {
        renderer.context().gfx().as_any().downcast_ref::<HeadlessBackend>().unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RendererConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        let err = Renderer::new(Box::new(HeadlessBackend::new()), config).err().unwrap();
        assert!(matches!(err, RendererError::InvalidConfig(_)));
    }

    #[test]
    fn render_before_init_fails() {
        let mut renderer = offscreen_renderer();
        assert!(matches!(renderer.render_frame(), Err(RendererError::NotInitialized)));
        renderer.destroy().unwrap();
    }

    #[test]
    fn offscreen_frames_advance_the_counter() {
        let mut renderer = offscreen_renderer();
        renderer.init().unwrap();
        for _ in 0..5 {
            assert_eq!(renderer.render_frame().unwrap(), FrameOutcome::Rendered);
        }
        assert_eq!(renderer.context().frame_counter().frame_id(), 5);
        assert_eq!(renderer.context().frame_counter().frame_slot(), 5 % 3);
        assert_eq!(headless(&renderer).stats().frames_submitted, 5);
        assert_eq!(headless(&renderer).stats().frames_presented, 0);
        renderer.destroy().unwrap();
    }

    #[test]
    fn empty_extent_is_ignored() {
        let mut renderer = offscreen_renderer();
        renderer.init().unwrap();
        renderer.render_frame().unwrap();

        renderer
            .resize(vk::Extent2D {
                width: 0,
                height: 600,
            })
            .unwrap();
        assert_eq!(renderer.context().draw_area_extent(), renderer.config().extent());
        assert_eq!(renderer.context().frame_counter().frame_id(), 1);

        renderer
            .resize(vk::Extent2D {
                width: 320,
                height: 200,
            })
            .unwrap();
        assert_eq!(renderer.context().draw_area_extent().width, 320);
        assert_eq!(renderer.context().frame_counter().frame_id(), 0);
        renderer.destroy().unwrap();
    }

    #[test]
    fn dependency_errors_are_wrapped() {
        struct Nothing;
        impl RenderPass for Nothing {
            fn name(&self) -> &str {
                "nothing"
            }
            fn init(&mut self, _: &mut RenderContext) -> RenderGraphResult<()> {
                Ok(())
            }
            fn draw(&mut self, _: &mut RenderContext, _: vk::CommandBuffer) -> RenderGraphResult<()> {
                Ok(())
            }
            fn resize(&mut self, _: &mut RenderContext, _: vk::Extent2D) -> RenderGraphResult<()> {
                Ok(())
            }
            fn destroy(&mut self, _: &mut RenderContext) -> RenderGraphResult<()> {
                Ok(())
            }
        }

        let mut renderer = offscreen_renderer();
        let a = renderer.add_pass(Nothing);
        let err = renderer.add_dependency(a, a, "color", |_: &mut Nothing, _, _, _| Ok(())).unwrap_err();
        assert!(matches!(err, RendererError::Graph(RenderGraphError::SelfDependency(_))));
        renderer.init().unwrap();
        assert_eq!(renderer.render_frame().unwrap(), FrameOutcome::Rendered);
        renderer.destroy().unwrap();
    }
}
