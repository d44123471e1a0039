use std::collections::VecDeque;

use ash::vk;

/// 窗口系统提供给帧循环的信息
///
/// 窗口本身以及 surface 的创建不属于这里，窗口系统只需要回答尺寸和是否退出
pub trait PresentationWindow {
    /// 当前的绘制区域，最小化时可以为 0
    fn draw_area_extent(&self) -> vk::Extent2D;

    fn should_exit(&self) -> bool;

    /// 每帧开始时调用一次
    fn poll_events(&mut self);
}

/// 没有真实窗口时使用：固定渲染若干帧，可以预先安排尺寸变化
#[derive(Debug)]
pub struct HeadlessWindow {
    extent: vk::Extent2D,
    remaining_frames: u64,
    /// `(第几次 poll, 新的尺寸)`
    resize_schedule: VecDeque<(u64, vk::Extent2D)>,
    polls: u64,
}

// new & init
impl HeadlessWindow {
    pub fn new(extent: vk::Extent2D, frames: u64) -> Self {
        Self {
            extent,
            remaining_frames: frames,
            resize_schedule: VecDeque::new(),
            polls: 0,
        }
    }

    /// 第 `poll` 次 poll 时窗口变为 `extent`，需要按顺序添加
    pub fn resize_at(mut self, poll: u64, extent: vk::Extent2D) -> Self {
        debug_assert!(self.resize_schedule.back().is_none_or(|(last, _)| *last <= poll));
        self.resize_schedule.push_back((poll, extent));
        self
    }
}

// getters
impl HeadlessWindow {
    #[inline]
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

impl PresentationWindow for HeadlessWindow {
    fn draw_area_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn should_exit(&self) -> bool {
        self.remaining_frames == 0
    }

    fn poll_events(&mut self) {
        while let Some((poll, extent)) = self.resize_schedule.front().copied() {
            if poll > self.polls {
                break;
            }
            self.extent = extent;
            self.resize_schedule.pop_front();
        }
        self.polls += 1;
        self.remaining_frames = self.remaining_frames.saturating_sub(1);
    }
}
