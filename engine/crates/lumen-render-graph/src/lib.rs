//! render pass 的组织方式
//!
//! 每个 pass 可以声明对其他 pass 输出的依赖，依赖在注册时组成一个 DAG：
//! 注册时拒绝环，执行顺序是拓扑序（同一层按注册顺序）。
//! 每帧在 pass 绘制之前调用它的依赖回调，让它拿到上游 pass 当前帧的输出。

pub mod error;
pub mod render_graph;
pub mod render_pass;
pub mod render_pipeline;
