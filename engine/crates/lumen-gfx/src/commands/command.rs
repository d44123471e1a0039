use ash::vk;

use crate::commands::barrier::GfxImageBarrier;

/// attachment 的 clear 值
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GfxClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}
impl GfxClearValue {
    pub const BLACK: Self = Self::Color([0.0, 0.0, 0.0, 1.0]);
    pub const DEPTH_ONE: Self = Self::DepthStencil { depth: 1.0, stencil: 0 };

    #[inline]
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// 录制到 command buffer 中的一条命令
///
/// 集合是封闭的，backend 通过 match 分发
#[derive(Clone, Debug)]
pub enum GfxCommand {
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    /// 整张 image 的 copy，image 需要处于 TRANSFER_DST_OPTIMAL
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        extent: vk::Extent2D,
        aspect: vk::ImageAspectFlags,
    },
    ImageBarrier(GfxImageBarrier),
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: Vec<GfxClearValue>,
    },
    EndRenderPass,
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    BindVertexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    /// viewport 和 scissor 覆盖整个 extent
    SetViewportScissor {
        extent: vk::Extent2D,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
}
impl GfxCommand {
    /// 整个 buffer 的 copy
    #[inline]
    pub fn copy_whole_buffer(src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> Self {
        Self::CopyBuffer {
            src,
            dst,
            regions: vec![vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            }],
        }
    }

    /// 全屏三角形
    #[inline]
    pub fn draw_fullscreen() -> Self {
        Self::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        }
    }

    #[inline]
    pub fn is_action(&self) -> bool {
        matches!(self, Self::Draw { .. } | Self::DrawIndexed { .. } | Self::Dispatch { .. })
    }
}
