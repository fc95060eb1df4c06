use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    AcquireRequested,
    FrameInFlight,
    Presented,
    NeedsRebuild,
}

/// Bookkeeping for frame slots and swapchain images, without any GPU objects.
///
/// A slot is "busy" from submission until its fence has been waited on. A
/// swapchain image remembers which slot last rendered to it, because there may be
/// more images than slots and an image must not be reused while that slot's
/// submission is still running.
#[derive(Debug, Clone)]
pub struct FramePacer {
    state: FrameState,
    frame_index: usize,
    slot_busy: [bool; MAX_FRAMES_IN_FLIGHT],
    images_in_flight: Vec<Option<usize>>,
    current_image: Option<u32>,
}

impl FramePacer {
    pub fn new(image_count: usize) -> Self {
        Self {
            state: FrameState::Idle,
            frame_index: 0,
            slot_busy: [false; MAX_FRAMES_IN_FLIGHT],
            images_in_flight: vec![None; image_count],
            current_image: None,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn current_image(&self) -> Option<u32> {
        self.current_image
    }

    pub fn in_flight_count(&self) -> usize {
        self.slot_busy.iter().filter(|busy| **busy).count()
    }

    /// Starts a frame. Returns the slot whose fence the caller waits on before
    /// touching that slot's command buffer.
    pub fn begin_acquire(&mut self) -> usize {
        assert!(
            matches!(self.state, FrameState::Idle | FrameState::Presented),
            "Frame acquired while in state {:?}",
            self.state,
        );
        self.state = FrameState::AcquireRequested;
        self.slot_busy[self.frame_index] = false;
        self.frame_index
    }

    /// Records that `image_index` was acquired for the current slot. Returns the
    /// other slot still rendering into that image, if any; the caller waits on its
    /// fence first.
    pub fn acquired(&mut self, image_index: u32) -> Option<usize> {
        assert_eq!(self.state, FrameState::AcquireRequested);
        let image = image_index as usize;
        assert!(
            image < self.images_in_flight.len(),
            "Image index {} out of range for {} swapchain images",
            image_index,
            self.images_in_flight.len(),
        );

        let blocking = self.images_in_flight[image]
            .filter(|slot| *slot != self.frame_index && self.slot_busy[*slot]);
        if let Some(slot) = blocking {
            self.slot_busy[slot] = false;
        }

        self.images_in_flight[image] = Some(self.frame_index);
        self.current_image = Some(image_index);
        self.state = FrameState::FrameInFlight;
        blocking
    }

    pub fn submitted(&mut self) {
        assert_eq!(self.state, FrameState::FrameInFlight);
        self.slot_busy[self.frame_index] = true;
        debug_assert!(self.in_flight_count() <= MAX_FRAMES_IN_FLIGHT);
    }

    /// Advances to the next slot
    pub fn presented(&mut self) {
        assert_eq!(self.state, FrameState::FrameInFlight);
        self.current_image = None;
        self.frame_index = (self.frame_index + 1) % MAX_FRAMES_IN_FLIGHT;
        self.state = FrameState::Presented;
    }

    pub fn needs_rebuild(&mut self) {
        self.state = FrameState::NeedsRebuild;
    }

    /// After the device went idle and the swapchain was recreated: nothing is in
    /// flight and the image table matches the new image count.
    pub fn rebuilt(&mut self, image_count: usize) {
        self.slot_busy = [false; MAX_FRAMES_IN_FLIGHT];
        self.images_in_flight = vec![None; image_count];
        self.current_image = None;
        self.state = FrameState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(pacer: &mut FramePacer, image_index: u32) -> Option<usize> {
        pacer.begin_acquire();
        let blocking = pacer.acquired(image_index);
        pacer.submitted();
        pacer.presented();
        blocking
    }

    #[test]
    fn test_slots_cycle_modulo_frames_in_flight() {
        let mut pacer = FramePacer::new(3);
        let mut seen = Vec::new();
        for image in [0, 1, 2, 0] {
            seen.push(pacer.frame_index());
            run_frame(&mut pacer, image);
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
        assert_eq!(pacer.state(), FrameState::Presented);
    }

    #[test]
    fn test_never_more_than_two_frames_in_flight() {
        let mut pacer = FramePacer::new(4);
        for i in 0..32u32 {
            run_frame(&mut pacer, i % 4);
            assert!(pacer.in_flight_count() <= MAX_FRAMES_IN_FLIGHT);
        }
        assert_eq!(pacer.in_flight_count(), MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_reused_image_waits_on_other_slot() {
        let mut pacer = FramePacer::new(3);
        // Slot 0 renders image 2, then slot 1 gets image 2 back while slot 0 is busy
        assert_eq!(run_frame(&mut pacer, 2), None);
        pacer.begin_acquire();
        assert_eq!(pacer.acquired(2), Some(0));
        pacer.submitted();
        pacer.presented();
        assert_eq!(pacer.in_flight_count(), 1);
    }

    #[test]
    fn test_same_slot_image_does_not_wait_twice() {
        let mut pacer = FramePacer::new(2);
        run_frame(&mut pacer, 0);
        run_frame(&mut pacer, 1);
        // Back on slot 0, whose own fence was just waited in begin_acquire
        pacer.begin_acquire();
        assert_eq!(pacer.acquired(0), None);
    }

    #[test]
    fn test_rebuild_clears_image_table() {
        let mut pacer = FramePacer::new(2);
        run_frame(&mut pacer, 1);
        pacer.begin_acquire();
        pacer.needs_rebuild();
        assert_eq!(pacer.state(), FrameState::NeedsRebuild);

        pacer.rebuilt(3);
        assert_eq!(pacer.state(), FrameState::Idle);
        assert_eq!(pacer.in_flight_count(), 0);
        pacer.begin_acquire();
        assert_eq!(pacer.acquired(2), None);
    }

    #[test]
    #[should_panic(expected = "Frame acquired while in state FrameInFlight")]
    fn test_double_acquire_panics() {
        let mut pacer = FramePacer::new(2);
        pacer.begin_acquire();
        pacer.acquired(0);
        pacer.begin_acquire();
    }
}
