use crossbeam_channel::{Sender, TrySendError};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Average interleaved frames to mono, converting each sample first. A
/// trailing partial frame is averaged over the channels it has.
pub(super) fn downmix_into<T, F>(out: &mut Vec<f32>, data: &[T], channels: usize, convert: F)
where
    T: Copy,
    F: Fn(T) -> f32,
{
    let channels = channels.max(1);
    let mut frames = data.chunks_exact(channels);
    out.extend(
        frames
            .by_ref()
            .map(|frame| frame.iter().map(|s| convert(*s)).sum::<f32>() / channels as f32),
    );
    let rest = frames.remainder();
    if !rest.is_empty() {
        out.push(rest.iter().map(|s| convert(*s)).sum::<f32>() / rest.len() as f32);
    }
}

/// Cuts device callback data into fixed-size mono blocks for the capture
/// worker. Runs on the audio callback thread, so it never blocks.
pub(super) struct BlockDispatcher {
    block_len: usize,
    pending: Vec<f32>,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
    closed: bool,
}

impl BlockDispatcher {
    pub(super) fn new(block_len: usize, sender: Sender<Vec<f32>>, dropped: Arc<AtomicUsize>) -> Self {
        let block_len = block_len.max(1);
        Self {
            block_len,
            pending: Vec::with_capacity(block_len * 2),
            sender,
            dropped,
            closed: false,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: Fn(T) -> f32,
    {
        if self.closed {
            return;
        }
        downmix_into(&mut self.pending, data, channels, convert);
        while self.pending.len() >= self.block_len {
            let rest = self.pending.split_off(self.block_len);
            let block = std::mem::replace(&mut self.pending, rest);
            match self.sender.try_send(block) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.closed = true;
                    self.pending.clear();
                    return;
                }
            }
        }
    }
}
