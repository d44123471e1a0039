/// 帧计数器
///
/// `frame_id` 一直累加，resize 之后重置为 0，让 per-frame 的索引和新的 presentation image 集合重新对齐。
pub struct FrameCounter {
    /// 当前的帧序号
    frame_id: u64,
    frames_in_flight: usize,
    /// 本帧 acquire 到的 presentation image
    present_image_index: Option<u32>,
}

// new & init
impl FrameCounter {
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames in flight must be positive");
        Self {
            frame_id: 0,
            frames_in_flight,
            present_image_index: None,
        }
    }
}

// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
        self.present_image_index = None;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.frame_id = 0;
        self.present_image_index = None;
    }

    #[inline]
    pub fn set_present_image_index(&mut self, index: Option<u32>) {
        self.present_image_index = index;
    }
}

// getters
impl FrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// `frame_id % frames_in_flight`
    #[inline]
    pub fn frame_slot(&self) -> usize {
        (self.frame_id % self.frames_in_flight as u64) as usize
    }

    #[inline]
    pub fn present_image_index(&self) -> Option<u32> {
        self.present_image_index
    }

    /// A, B, C ...，超过 Z 的 slot 用 `?`
    #[inline]
    pub fn frame_label(&self) -> char {
        u8::try_from(self.frame_slot()).ok().filter(|slot| *slot < 26).map_or('?', |slot| (b'A' + slot) as char)
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_cycles_and_reset_realigns() {
        let mut counter = FrameCounter::new(3);
        let slots: Vec<_> = (0..5)
            .map(|_| {
                let slot = counter.frame_slot();
                counter.next_frame();
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1]);
        assert_eq!(counter.frame_name(), "[F5C]");

        counter.set_present_image_index(Some(1));
        counter.reset();
        assert_eq!(counter.frame_id(), 0);
        assert_eq!(counter.frame_slot(), 0);
        assert_eq!(counter.present_image_index(), None);
    }

    #[test]
    fn next_frame_forgets_the_present_image() {
        let mut counter = FrameCounter::new(2);
        counter.set_present_image_index(Some(0));
        counter.next_frame();
        assert_eq!(counter.present_image_index(), None);
    }

    #[test]
    fn large_slots_fall_back_to_a_placeholder_label() {
        let mut counter = FrameCounter::new(300);
        for _ in 0..25 {
            counter.next_frame();
        }
        assert_eq!(counter.frame_label(), 'Z');
        counter.next_frame();
        assert_eq!(counter.frame_label(), '?');

        for _ in 26..200 {
            counter.next_frame();
        }
        assert_eq!(counter.frame_slot(), 200);
        assert_eq!(counter.frame_name(), "[F200?]");
    }
}
