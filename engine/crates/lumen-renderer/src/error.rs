use lumen_gfx::GfxError;
use lumen_render_graph::error::RenderGraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error(transparent)]
    Graph(#[from] RenderGraphError),

    #[error("failed to parse renderer config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to read renderer config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid renderer config: {0}")]
    InvalidConfig(String),

    /// 在 `init` 之前渲染，或者 `destroy` 之后继续使用
    #[error("renderer is not initialized")]
    NotInitialized,
}

pub type RendererResult<T> = Result<T, RendererError>;
