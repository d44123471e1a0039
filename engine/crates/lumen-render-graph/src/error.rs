use lumen_gfx::GfxError;
use thiserror::Error;

use crate::render_graph::PassId;
use crate::render_pass::PassState;

#[derive(Error, Debug)]
pub enum RenderGraphError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error("render pass {0:?} is not registered")]
    UnknownPass(PassId),

    #[error("render pass '{0}' cannot depend on itself")]
    SelfDependency(String),

    /// 加入这条边之后依赖图会出现环
    #[error("dependency '{consumer}' -> '{producer}' would create a cycle")]
    Cycle { consumer: String, producer: String },

    #[error("render pass '{pass}' is not a {expected}")]
    PassTypeMismatch { pass: String, expected: &'static str },

    #[error("render pass '{pass}' is {state:?}, expected Ready")]
    PassNotReady { pass: String, state: PassState },

    /// 上游 pass 的输出不存在，或者当前帧的数据已经被销毁
    #[error("'{consumer}' depends on '{producer}.{output}', which has been torn down")]
    DependencyTornDown {
        consumer: String,
        producer: String,
        output: String,
    },
}

pub type RenderGraphResult<T> = Result<T, RenderGraphError>;
