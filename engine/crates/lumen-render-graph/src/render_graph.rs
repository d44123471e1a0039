use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ash::vk;
use lumen_render_interface::per_frame::PerFrame;
use lumen_render_interface::render_context::RenderContext;
use lumen_render_interface::resources::image::GfxImage;
use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use slotmap::{SlotMap, new_key_type};

use crate::error::{RenderGraphError, RenderGraphResult};
use crate::render_pass::{PassState, RenderPass};

new_key_type! {
    pub struct PassId;
}

type DependencyCallback = Box<
    dyn FnMut(&mut dyn RenderPass, &mut RenderContext, vk::CommandBuffer, &PerFrame<GfxImage>) -> RenderGraphResult<()>,
>;

/// consumer 对 producer 某个输出的依赖
struct Dependency {
    producer: PassId,
    output: String,
    callback: DependencyCallback,
}

struct PassNode {
    pass: Box<dyn RenderPass>,
    state: PassState,
    node: NodeIndex,
    /// 按注册顺序执行
    dependencies: Vec<Dependency>,
}

/// render pass 的依赖图
///
/// 边 `producer -> consumer` 在注册时检查，不允许自环和环。
/// 执行顺序是拓扑序，没有依赖关系的 pass 之间保持注册顺序。
pub struct RenderGraph {
    passes: SlotMap<PassId, PassNode>,
    /// 节点的权重是 pass id，节点序号就是注册顺序
    graph: DiGraph<PassId, String>,
    order: Vec<PassId>,
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: SlotMap::with_key(),
            graph: DiGraph::new(),
            order: Vec::new(),
        }
    }

    pub fn add_pass(&mut self, pass: impl RenderPass) -> PassId {
        let name = pass.name().to_string();
        let id = self.passes.insert(PassNode {
            pass: Box::new(pass),
            state: PassState::Uninitialized,
            node: NodeIndex::end(),
            dependencies: Vec::new(),
        });
        let node = self.graph.add_node(id);
        self.passes[id].node = node;
        self.order = self.topological_order();

        log::info!("add render pass '{}'", name);
        id
    }

    /// `consumer` 依赖 `producer` 名为 `output` 的输出
    ///
    /// 每一帧在 `consumer` 绘制之前，`callback` 会拿到 `producer` 的这个输出，
    /// 以及本帧正在录制的 command buffer，可以在其中录制同步命令。
    /// 这条边会产生环时拒绝注册。
    pub fn add_dependency<P: RenderPass>(
        &mut self,
        consumer: PassId,
        producer: PassId,
        output: impl Into<String>,
        mut callback: impl FnMut(&mut P, &mut RenderContext, vk::CommandBuffer, &PerFrame<GfxImage>) -> RenderGraphResult<()>
        + 'static,
    ) -> RenderGraphResult<()> {
        let consumer_node = self.passes.get(consumer).ok_or(RenderGraphError::UnknownPass(consumer))?;
        let producer_node = self.passes.get(producer).ok_or(RenderGraphError::UnknownPass(producer))?;
        let consumer_name = consumer_node.pass.name().to_string();

        let consumer_pass: &dyn RenderPass = consumer_node.pass.as_ref();
        if !consumer_pass.as_any().is::<P>() {
            return Err(RenderGraphError::PassTypeMismatch {
                pass: consumer_name,
                expected: std::any::type_name::<P>(),
            });
        }
        if consumer == producer {
            return Err(RenderGraphError::SelfDependency(consumer_name));
        }
        if has_path_connecting(&self.graph, consumer_node.node, producer_node.node, None) {
            return Err(RenderGraphError::Cycle {
                consumer: consumer_name,
                producer: producer_node.pass.name().to_string(),
            });
        }

        let output = output.into();
        self.graph.update_edge(producer_node.node, consumer_node.node, output.clone());
        let expected = std::any::type_name::<P>();
        let callback: DependencyCallback = Box::new(move |pass, ctx, cmd, images| {
            let name = pass.name().to_string();
            let pass = pass
                .as_any_mut()
                .downcast_mut::<P>()
                .ok_or(RenderGraphError::PassTypeMismatch { pass: name, expected })?;
            callback(pass, ctx, cmd, images)
        });
        self.passes[consumer].dependencies.push(Dependency {
            producer,
            output,
            callback,
        });
        self.order = self.topological_order();
        Ok(())
    }

    /// 按执行顺序初始化所有还没有初始化的 pass
    pub fn init(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        for id in self.order.clone() {
            let node = &mut self.passes[id];
            if node.state != PassState::Uninitialized {
                continue;
            }
            node.pass.init(ctx)?;
            node.state = PassState::Ready;
            log::info!("render pass '{}' ready", node.pass.name());
        }
        Ok(())
    }
}

// getters
impl RenderGraph {
    #[inline]
    pub fn execution_order(&self) -> &[PassId] {
        &self.order
    }

    #[inline]
    pub fn state(&self, id: PassId) -> Option<PassState> {
        self.passes.get(id).map(|node| node.state)
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// 直接依赖的 pass
    pub fn producers_of(&self, id: PassId) -> Vec<PassId> {
        let Some(node) = self.passes.get(id) else {
            return Vec::new();
        };
        self.graph.neighbors_directed(node.node, Direction::Incoming).map(|n| self.graph[n]).collect()
    }

    pub fn pass<P: RenderPass>(&self, id: PassId) -> Option<&P> {
        let pass: &dyn RenderPass = self.passes.get(id)?.pass.as_ref();
        pass.as_any().downcast_ref::<P>()
    }

    pub fn pass_mut<P: RenderPass>(&mut self, id: PassId) -> Option<&mut P> {
        let pass: &mut dyn RenderPass = self.passes.get_mut(id)?.pass.as_mut();
        pass.as_any_mut().downcast_mut::<P>()
    }
}

// tools
impl RenderGraph {
    /// 按执行顺序录制所有 pass
    ///
    /// 每个 pass 绘制之前先执行它的依赖回调。上游输出缺失或者当前帧的数据已经被销毁时直接报错，
    /// 不会继续录制引用了无效 attachment 的命令。
    pub fn execute(&mut self, ctx: &mut RenderContext, cmd: vk::CommandBuffer) -> RenderGraphResult<()> {
        for index in 0..self.order.len() {
            let id = self.order[index];
            if self.passes[id].state != PassState::Ready {
                let node = &self.passes[id];
                return Err(RenderGraphError::PassNotReady {
                    pass: node.pass.name().to_string(),
                    state: node.state,
                });
            }

            for dep_index in 0..self.passes[id].dependencies.len() {
                let images = self.resolve_dependency(ctx, id, dep_index)?;
                let node = &mut self.passes[id];
                (node.dependencies[dep_index].callback)(node.pass.as_mut(), ctx, cmd, &images)?;
            }

            self.passes[id].pass.draw(ctx, cmd)?;
        }
        Ok(())
    }

    /// 按执行顺序 resize 所有 pass
    pub fn resize(&mut self, ctx: &mut RenderContext, extent: vk::Extent2D) -> RenderGraphResult<()> {
        for id in self.order.clone() {
            let node = &mut self.passes[id];
            if node.state == PassState::Uninitialized {
                continue;
            }
            node.state = PassState::Rebuilding;
            node.pass.resize(ctx, extent)?;
            node.state = PassState::Ready;
        }
        log::info!("render graph resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// 按执行顺序的逆序销毁所有 pass，之后 graph 为空
    ///
    /// 某个 pass 失败时继续销毁其余的，返回第一个错误
    pub fn destroy(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
        let mut result = Ok(());
        for id in self.order.iter().rev() {
            let node = &mut self.passes[*id];
            if node.state == PassState::Uninitialized {
                continue;
            }
            if let Err(err) = node.pass.destroy(ctx) {
                log::error!("destroy render pass '{}': {}", node.pass.name(), err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
            node.state = PassState::Uninitialized;
        }

        self.passes.clear();
        self.graph.clear();
        self.order.clear();
        result
    }

    /// 取出上游的输出，并检查当前帧的数据仍然存活
    fn resolve_dependency(
        &self,
        ctx: &RenderContext,
        consumer: PassId,
        dep_index: usize,
    ) -> RenderGraphResult<PerFrame<GfxImage>> {
        let dependency = &self.passes[consumer].dependencies[dep_index];
        let torn_down = || RenderGraphError::DependencyTornDown {
            consumer: self.passes[consumer].pass.name().to_string(),
            producer: self.passes.get(dependency.producer).map_or("?", |p| p.pass.name()).to_string(),
            output: dependency.output.clone(),
        };

        let producer = self.passes.get(dependency.producer).ok_or_else(torn_down)?;
        let images = producer.pass.output(&dependency.output).ok_or_else(torn_down)?;
        if ctx.cur_frame_image(&images).is_err() {
            log::error!("{} {}", ctx.frame_counter().frame_name(), torn_down());
            return Err(torn_down());
        }
        Ok(images)
    }

    /// Kahn 算法，入度为 0 的节点中总是先取注册最早的
    fn topological_order(&self) -> Vec<PassId> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> =
            self.graph.node_indices().filter(|n| in_degree[n.index()] == 0).map(|n| Reverse(n.index())).collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(index)) = ready.pop() {
            let node = NodeIndex::new(index);
            order.push(self.graph[node]);
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }
        debug_assert_eq!(order.len(), self.graph.node_count(), "render graph contains a cycle");
        order
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        let alive = self.passes.values().filter(|node| node.state != PassState::Uninitialized).count();
        debug_assert!(alive == 0, "render graph dropped with {alive} initialized passes, call destroy first");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use lumen_gfx::GfxError;
    use lumen_gfx::backend::GfxBackend;
    use lumen_gfx::commands::barrier::{GfxBarrierMask, GfxImageBarrier};
    use lumen_gfx::commands::command::GfxCommand;
    use lumen_gfx::headless::headless_backend::HeadlessBackend;
    use lumen_gfx::resources::image::GfxImageDesc;
    use lumen_render_interface::render_context::RenderContextSettings;

    type Log = Rc<RefCell<Vec<String>>>;

    /// 输出一组 per-frame image，记录每次调用
    struct ImagePass {
        name: String,
        images: Option<PerFrame<GfxImage>>,
        log: Log,
        seen_upstream: usize,
    }

    impl ImagePass {
        fn new(name: &str, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                images: None,
                log: log.clone(),
                seen_upstream: 0,
            }
        }

        fn create_images(&mut self, ctx: &mut RenderContext, extent: vk::Extent2D) -> RenderGraphResult<()> {
            let desc = GfxImageDesc::new_color_target(extent, vk::Format::R8G8B8A8_UNORM, self.name.clone());
            self.images = Some(ctx.create_per_frame_images(&desc)?);
            Ok(())
        }

        fn destroy_images(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
            if let Some(images) = self.images.take() {
                ctx.destroy_per_frame_images(images)?;
            }
            Ok(())
        }
    }

    impl RenderPass for ImagePass {
        fn name(&self) -> &str {
            &self.name
        }

        fn init(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
            self.log.borrow_mut().push(format!("init {}", self.name));
            self.create_images(ctx, ctx.draw_area_extent())
        }

        fn draw(&mut self, _ctx: &mut RenderContext, _cmd: vk::CommandBuffer) -> RenderGraphResult<()> {
            self.log.borrow_mut().push(format!("draw {}", self.name));
            Ok(())
        }

        fn resize(&mut self, ctx: &mut RenderContext, extent: vk::Extent2D) -> RenderGraphResult<()> {
            self.log.borrow_mut().push(format!("resize {}", self.name));
            self.destroy_images(ctx)?;
            self.create_images(ctx, extent)
        }

        fn output(&self, name: &str) -> Option<PerFrame<GfxImage>> {
            (name == "color").then(|| self.images.clone()).flatten()
        }

        fn destroy(&mut self, ctx: &mut RenderContext) -> RenderGraphResult<()> {
            self.log.borrow_mut().push(format!("destroy {}", self.name));
            self.destroy_images(ctx)
        }
    }

    fn context() -> RenderContext {
        lumen_crate_tools::init_log::init_test_log();
        RenderContext::new(Box::new(HeadlessBackend::new()), RenderContextSettings::default()).unwrap()
    }

    fn record_upstream(
        pass: &mut ImagePass,
        _ctx: &mut RenderContext,
        _cmd: vk::CommandBuffer,
        _images: &PerFrame<GfxImage>,
    ) -> RenderGraphResult<()> {
        pass.seen_upstream += 1;
        Ok(())
    }

    #[test]
    fn test_order_follows_dependencies_then_registration() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let overlay = graph.add_pass(ImagePass::new("overlay", &log));
        let gbuffer = graph.add_pass(ImagePass::new("gbuffer", &log));
        let lighting = graph.add_pass(ImagePass::new("lighting", &log));
        let debug = graph.add_pass(ImagePass::new("debug", &log));
        assert_eq!(graph.execution_order(), &[overlay, gbuffer, lighting, debug]);

        graph.add_dependency(lighting, gbuffer, "color", record_upstream).unwrap();
        graph.add_dependency(overlay, lighting, "color", record_upstream).unwrap();

        assert_eq!(graph.execution_order(), &[gbuffer, lighting, overlay, debug]);
        assert_eq!(graph.producers_of(overlay), vec![lighting]);
    }

    #[test]
    fn test_cycles_and_self_edges_are_rejected() {
        let log = Log::default();
        let mut graph = RenderGraph::new();
        let a = graph.add_pass(ImagePass::new("a", &log));
        let b = graph.add_pass(ImagePass::new("b", &log));
        let c = graph.add_pass(ImagePass::new("c", &log));
        graph.add_dependency(b, a, "color", record_upstream).unwrap();
        graph.add_dependency(c, b, "color", record_upstream).unwrap();

        assert!(matches!(graph.add_dependency(a, c, "color", record_upstream), Err(RenderGraphError::Cycle { .. })));
        assert!(matches!(
            graph.add_dependency(a, a, "color", record_upstream),
            Err(RenderGraphError::SelfDependency(_))
        ));
        assert!(matches!(
            graph.add_dependency(a, PassId::default(), "color", record_upstream),
            Err(RenderGraphError::UnknownPass(_))
        ));
        assert_eq!(graph.execution_order(), &[a, b, c]);
    }

    #[test]
    fn test_callback_type_must_match_the_consumer() {
        struct Other;
        impl RenderPass for Other {
            fn name(&self) -> &str {
                "other"
            }
            fn init(&mut self, _ctx: &mut RenderContext) -> RenderGraphResult<()> {
                Ok(())
            }
            fn draw(&mut self, _ctx: &mut RenderContext, _cmd: vk::CommandBuffer) -> RenderGraphResult<()> {
                Ok(())
            }
            fn resize(&mut self, _ctx: &mut RenderContext, _extent: vk::Extent2D) -> RenderGraphResult<()> {
                Ok(())
            }
            fn destroy(&mut self, _ctx: &mut RenderContext) -> RenderGraphResult<()> {
                Ok(())
            }
        }

        let log = Log::default();
        let mut graph = RenderGraph::new();
        let producer = graph.add_pass(ImagePass::new("producer", &log));
        let other = graph.add_pass(Other);

        let err = graph.add_dependency(other, producer, "color", record_upstream).unwrap_err();
        assert!(matches!(err, RenderGraphError::PassTypeMismatch { .. }));
        assert!(graph.pass::<Other>(other).is_some());
        assert!(graph.pass::<ImagePass>(other).is_none());
    }

    #[test]
    fn test_dependency_sees_live_upstream_for_100_frames() {
        let log = Log::default();
        let mut ctx = context();
        let mut graph = RenderGraph::new();
        let consumer = graph.add_pass(ImagePass::new("consumer", &log));
        let producer = graph.add_pass(ImagePass::new("producer", &log));
        graph
            .add_dependency(consumer, producer, "color", |pass: &mut ImagePass, ctx, _, images| {
                let handle = images.cur_frame_handle(ctx.frame_counter());
                assert!(!handle.is_null());
                assert!(ctx.image(handle).is_some());
                pass.seen_upstream += 1;
                Ok(())
            })
            .unwrap();
        graph.init(&mut ctx).unwrap();

        for _ in 0..100 {
            graph.execute(&mut ctx, vk::CommandBuffer::null()).unwrap();
            ctx.frame_counter_mut().next_frame();
        }

        assert_eq!(graph.pass::<ImagePass>(consumer).unwrap().seen_upstream, 100);
        let draws = log.borrow().iter().filter(|l| l.starts_with("draw")).count();
        assert_eq!(draws, 200);
        assert_eq!(log.borrow()[2..4], ["draw producer".to_string(), "draw consumer".to_string()]);

        graph.destroy(&mut ctx).unwrap();
        assert_eq!(ctx.live_resource_counts().images, 0);
        ctx.destroy();
    }

    #[test]
    fn test_torn_down_upstream_is_fatal() {
        let log = Log::default();
        let mut ctx = context();
        let mut graph = RenderGraph::new();
        let producer = graph.add_pass(ImagePass::new("producer", &log));
        let consumer = graph.add_pass(ImagePass::new("consumer", &log));
        graph.add_dependency(consumer, producer, "color", record_upstream).unwrap();
        graph.init(&mut ctx).unwrap();

        // 绕过 graph 直接销毁上游的 image
        let stale = graph.pass::<ImagePass>(producer).unwrap().images.clone().unwrap();
        ctx.destroy_per_frame_images(stale).unwrap();

        let err = graph.execute(&mut ctx, vk::CommandBuffer::null()).unwrap_err();
        assert!(matches!(err, RenderGraphError::DependencyTornDown { ref output, .. } if output == "color"));
        assert_eq!(graph.pass::<ImagePass>(consumer).unwrap().seen_upstream, 0);

        graph.pass_mut::<ImagePass>(producer).unwrap().images = None;
        graph.destroy(&mut ctx).unwrap();
        ctx.destroy();
    }

    #[test]
    fn test_uninitialized_pass_cannot_draw() {
        let log = Log::default();
        let mut ctx = context();
        let mut graph = RenderGraph::new();
        let pass = graph.add_pass(ImagePass::new("late", &log));

        let err = graph.execute(&mut ctx, vk::CommandBuffer::null()).unwrap_err();
        assert!(matches!(err, RenderGraphError::PassNotReady { state: PassState::Uninitialized, .. }));

        graph.init(&mut ctx).unwrap();
        assert_eq!(graph.state(pass), Some(PassState::Ready));
        graph.destroy(&mut ctx).unwrap();
        assert_eq!(graph.pass_count(), 0);
        ctx.destroy();
    }

    #[test]
    fn test_resize_rebuilds_in_order_and_returns_to_ready() {
        let log = Log::default();
        let mut ctx = context();
        let mut graph = RenderGraph::new();
        let consumer = graph.add_pass(ImagePass::new("consumer", &log));
        let producer = graph.add_pass(ImagePass::new("producer", &log));
        graph.add_dependency(consumer, producer, "color", record_upstream).unwrap();
        graph.init(&mut ctx).unwrap();
        let before = ctx.live_resource_counts();

        graph.resize(&mut ctx, vk::Extent2D { width: 1024, height: 768 }).unwrap();

        assert_eq!(graph.state(consumer), Some(PassState::Ready));
        assert_eq!(ctx.live_resource_counts(), before);
        let entries = log.borrow().clone();
        assert_eq!(entries[entries.len() - 2..], ["resize producer".to_string(), "resize consumer".to_string()]);
        let images = graph.pass::<ImagePass>(consumer).unwrap().output("color").unwrap();
        assert_eq!(ctx.cur_frame_image(&images).unwrap().extent(), vk::Extent2D { width: 1024, height: 768 });

        graph.destroy(&mut ctx).unwrap();
        let gfx = ctx.destroy();
        let headless = gfx.as_any().downcast_ref::<HeadlessBackend>().unwrap();
        assert_eq!(headless.live_objects().images, 0);
        assert_eq!(headless.stats().validation_errors, 0);
    }

    #[test]
    fn test_dependency_records_into_the_frame_commands() {
        let log = Log::default();
        let mut ctx = context();
        let mut graph = RenderGraph::new();
        let producer = graph.add_pass(ImagePass::new("producer", &log));
        let consumer = graph.add_pass(ImagePass::new("consumer", &log));
        graph
            .add_dependency(consumer, producer, "color", |_: &mut ImagePass, ctx, cmd, images| {
                let image = ctx.cur_frame_image(images)?;
                let barrier = GfxImageBarrier::new()
                    .image(image.vk_image())
                    .layout_transfer(
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    )
                    .mask(GfxBarrierMask::COLOR_WRITE_TO_SAMPLE)
                    .image_aspect_flag(image.aspect());
                ctx.record(cmd, GfxCommand::ImageBarrier(barrier));
                Ok(())
            })
            .unwrap();
        graph.init(&mut ctx).unwrap();

        let cmd = ctx.gfx_mut().begin_commands(0).unwrap();
        graph.execute(&mut ctx, cmd).unwrap();
        ctx.gfx_mut().submit_frame(0, cmd, None).unwrap();

        let headless = ctx.gfx().as_any().downcast_ref::<HeadlessBackend>().unwrap();
        let barriers =
            headless.last_frame_commands().iter().filter(|command| matches!(command, GfxCommand::ImageBarrier(_))).count();
        assert_eq!(barriers, 1);
        assert_eq!(headless.stats().validation_errors, 0);

        ctx.gfx_mut().wait_idle().unwrap();
        graph.destroy(&mut ctx).unwrap();
        ctx.destroy();
    }

    /// resize 总是失败
    struct BrokenResizePass;

    impl RenderPass for BrokenResizePass {
        fn name(&self) -> &str {
            "broken-resize"
        }

        fn init(&mut self, _ctx: &mut RenderContext) -> RenderGraphResult<()> {
            Ok(())
        }

        fn draw(&mut self, _ctx: &mut RenderContext, _cmd: vk::CommandBuffer) -> RenderGraphResult<()> {
            Ok(())
        }

        fn resize(&mut self, _ctx: &mut RenderContext, _extent: vk::Extent2D) -> RenderGraphResult<()> {
            Err(GfxError::InvalidDesc("cannot rebuild".to_string()).into())
        }

        fn destroy(&mut self, _ctx: &mut RenderContext) -> RenderGraphResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_resize_stays_rebuilding() {
        let log = Log::default();
        let mut ctx = context();
        let mut graph = RenderGraph::new();
        let steady = graph.add_pass(ImagePass::new("steady", &log));
        let broken = graph.add_pass(BrokenResizePass);
        graph.init(&mut ctx).unwrap();

        let err = graph.resize(&mut ctx, vk::Extent2D { width: 640, height: 480 }).unwrap_err();
        assert!(matches!(err, RenderGraphError::Gfx(GfxError::InvalidDesc(_))));
        assert_eq!(graph.state(steady), Some(PassState::Ready));
        assert_eq!(graph.state(broken), Some(PassState::Rebuilding));

        // 重建失败的 pass 不会再被绘制
        let err = graph.execute(&mut ctx, vk::CommandBuffer::null()).unwrap_err();
        assert!(matches!(err, RenderGraphError::PassNotReady { state: PassState::Rebuilding, .. }));

        graph.destroy(&mut ctx).unwrap();
        assert_eq!(ctx.live_resource_counts().images, 0);
        ctx.destroy();
    }
}
