use ash::vk;
use thiserror::Error;

/// GFX 层的错误类型
#[derive(Error, Debug)]
pub enum GfxError {
    /// 原生 API 调用失败
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// 加载 Vulkan 动态库失败
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// 资源池已满，且索引无法继续增长
    #[error("{kind} pool exhausted (capacity {capacity})")]
    PoolExhausted { kind: &'static str, capacity: usize },

    /// 句柄的 generation 不匹配，或者 slot 从未分配过
    #[error("stale or unknown {kind} handle {handle}")]
    StaleHandle { kind: &'static str, handle: String },

    /// image view 的 format 不被允许，或者 view 缓存已满
    #[error("image view format {format:?} rejected for image '{image}': {reason}")]
    ViewFormatRejected {
        image: String,
        format: vk::Format,
        reason: &'static str,
    },

    /// 创建 framebuffer 时没有任何 attachment
    #[error("framebuffer '{0}' requires at least one attachment")]
    EmptyFramebuffer(String),

    /// 当前 backend 没有 presentation 目标
    #[error("no presentation surface is attached to this backend")]
    NoSwapchain,

    /// desc 中的参数不合法
    #[error("invalid descriptor: {0}")]
    InvalidDesc(String),

    /// 对不可映射的内存做了 host 读写
    #[error("allocation is not host visible")]
    NotHostVisible,

    /// 读写越界
    #[error("host access out of range: offset {offset} + len {len} > size {size}")]
    OutOfRange {
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
        size: vk::DeviceSize,
    },
}

impl GfxError {
    /// descriptor pool 耗尽，可以通过新建 pool 的方式在本地恢复
    #[inline]
    pub fn is_descriptor_pool_exhausted(&self) -> bool {
        matches!(self, Self::Vulkan(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL))
    }
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 检查非关键的原生调用：失败时带上调用位置打印错误，然后继续执行
///
/// 返回 `Option`，成功时为 `Some`。
#[macro_export]
macro_rules! vk_check {
    ($call:expr, $what:expr) => {
        match $call {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("[{}:{}] {} failed: {:?}", file!(), line!(), $what, err);
                None
            }
        }
    };
}
