use crate::frame::TcTransferFrame;
use crate::types::{FrameType, SequenceNumber};
use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// One record of the sent queue: a frame passed to the lower layer together
/// with its retransmission mark.
#[derive(Debug, Clone)]
pub(crate) struct SentEntry {
    pub frame: TcTransferFrame,
    pub to_be_retransmitted: bool,
}

/// The FOP-1 sent queue.
///
/// Holds every AD and BC frame handed to the lower layer but not yet fully
/// processed, in transmission order. AD sequence numbers are contiguous
/// modulo 256 starting at NN(R); at most one BC entry exists at any time.
#[derive(Debug, Default)]
pub(crate) struct SentQueue {
    entries: VecDeque<SentEntry>,
}

impl SentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of AD entries currently outstanding (bounded by the sliding
    /// window).
    pub fn ad_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.frame.frame_type == FrameType::Ad)
            .count()
    }

    pub fn has_bc(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.frame.frame_type == FrameType::Bc)
    }

    /// Appends a freshly transmitted frame (not marked for retransmission).
    pub fn push(&mut self, frame: TcTransferFrame) {
        debug_assert!(
            frame.frame_type != FrameType::Bc || !self.has_bc(),
            "at most one BC entry may be queued"
        );
        self.entries.push_back(SentEntry {
            frame,
            to_be_retransmitted: false,
        });
    }

    /// N(S) of the oldest outstanding AD frame, if any.
    pub fn head_sequence(&self) -> Option<SequenceNumber> {
        self.entries
            .iter()
            .find(|e| e.frame.frame_type == FrameType::Ad)
            .map(|e| e.frame.sequence_number)
    }

    /// Removes the acknowledged prefix: AD entries are popped from the head
    /// until the head carries N(S) = `n_r`. Returns the popped frames in
    /// transmission order.
    ///
    /// The caller guarantees `n_r` lies inside the window (or equals V(S)),
    /// so the loop terminates on the first unacknowledged entry.
    pub fn remove_acknowledged(&mut self, n_r: SequenceNumber) -> Vec<TcTransferFrame> {
        let mut removed = Vec::new();
        while let Some(entry) = self.entries.front() {
            if entry.frame.frame_type != FrameType::Ad || entry.frame.sequence_number == n_r {
                break;
            }
            if let Some(acknowledged) = self.entries.pop_front() {
                removed.push(acknowledged.frame);
            }
        }
        removed
    }

    /// Marks every entry for retransmission. Returns how many were marked.
    pub fn mark_all_for_retransmission(&mut self) -> usize {
        let mut marked = 0;
        for entry in self.entries.iter_mut() {
            if !entry.to_be_retransmitted {
                entry.to_be_retransmitted = true;
                marked += 1;
            }
        }
        marked
    }

    /// Takes a copy of the first AD entry marked for retransmission, clearing
    /// its mark. Retransmissions go out one at a time, oldest first.
    pub fn next_ad_retransmission(&mut self) -> Option<TcTransferFrame> {
        self.entries
            .iter_mut()
            .find(|e| e.frame.frame_type == FrameType::Ad && e.to_be_retransmitted)
            .map(|e| {
                e.to_be_retransmitted = false;
                e.frame.clone()
            })
    }

    /// Takes a copy of the BC entry if it is marked for retransmission,
    /// clearing its mark.
    pub fn next_bc_retransmission(&mut self) -> Option<TcTransferFrame> {
        self.entries
            .iter_mut()
            .find(|e| e.frame.frame_type == FrameType::Bc && e.to_be_retransmitted)
            .map(|e| {
                e.to_be_retransmitted = false;
                e.frame.clone()
            })
    }

    /// Removes and returns the BC entry, if present.
    pub fn take_bc(&mut self) -> Option<TcTransferFrame> {
        let index = self
            .entries
            .iter()
            .position(|e| e.frame.frame_type == FrameType::Bc)?;
        self.entries.remove(index).map(|e| e.frame)
    }

    /// Empties the queue, returning every frame in transmission order.
    pub fn drain_all(&mut self) -> Vec<TcTransferFrame> {
        self.entries.drain(..).map(|e| e.frame).collect()
    }
}

/// The FOP-1 wait queue: a single slot holding the AD frame whose acceptance
/// has not yet been confirmed back to the higher procedures.
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    slot: Option<TcTransferFrame>,
}

impl WaitQueue {
    pub fn is_occupied(&self) -> bool {
        self.slot.is_some()
    }

    /// Places a frame in the slot. The caller checks occupancy first (an
    /// occupied wait queue classifies the request as E20).
    pub fn place(&mut self, frame: TcTransferFrame) {
        debug_assert!(self.slot.is_none(), "wait queue holds at most one frame");
        self.slot = Some(frame);
    }

    pub fn take(&mut self) -> Option<TcTransferFrame> {
        self.slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VcId;
    use alloc::vec;
    use core::convert::TryFrom;

    fn ad(n_s: u8) -> TcTransferFrame {
        TcTransferFrame::new_ad(VcId::try_from(0).unwrap(), n_s, vec![n_s])
    }

    fn bc() -> TcTransferFrame {
        TcTransferFrame::new_bc(VcId::try_from(0).unwrap(), vec![0x00])
    }

    #[test]
    fn test_acknowledged_prefix_removal() {
        let mut queue = SentQueue::new();
        for n_s in 3..7u8 {
            queue.push(ad(n_s));
        }

        let removed = queue.remove_acknowledged(5);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].sequence_number, 3);
        assert_eq!(removed[1].sequence_number, 4);
        assert_eq!(queue.head_sequence(), Some(5));
        assert_eq!(queue.ad_count(), 2);
    }

    #[test]
    fn test_acknowledged_removal_across_wraparound() {
        let mut queue = SentQueue::new();
        queue.push(ad(254));
        queue.push(ad(255));
        queue.push(ad(0));

        let removed = queue.remove_acknowledged(0);
        assert_eq!(removed.len(), 2);
        assert_eq!(queue.head_sequence(), Some(0));
    }

    #[test]
    fn test_retransmission_sweep_and_pick() {
        let mut queue = SentQueue::new();
        queue.push(ad(0));
        queue.push(ad(1));
        assert_eq!(queue.mark_all_for_retransmission(), 2);

        let first = queue.next_ad_retransmission().unwrap();
        assert_eq!(first.sequence_number, 0);
        // Picking clears the mark, so the next pick yields the next frame.
        let second = queue.next_ad_retransmission().unwrap();
        assert_eq!(second.sequence_number, 1);
        assert!(queue.next_ad_retransmission().is_none());
        // The frames themselves stay queued until acknowledged.
        assert_eq!(queue.ad_count(), 2);
    }

    #[test]
    fn test_single_bc_entry_lifecycle() {
        let mut queue = SentQueue::new();
        queue.push(bc());
        assert!(queue.has_bc());
        assert!(queue.next_bc_retransmission().is_none());

        queue.mark_all_for_retransmission();
        assert!(queue.next_bc_retransmission().is_some());
        assert!(queue.next_bc_retransmission().is_none());

        assert!(queue.take_bc().is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wait_queue_single_slot() {
        let mut wait = WaitQueue::default();
        assert!(!wait.is_occupied());
        wait.place(ad(9));
        assert!(wait.is_occupied());
        assert_eq!(wait.take().unwrap().sequence_number, 9);
        assert!(!wait.is_occupied());
    }
}
