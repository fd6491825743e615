//! Configuration passed to [`Initiator`](crate::Initiator).

/// Configuration passed to [`Initiator`](crate::Initiator).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitiatorConfig {
    /// Upper bound on frames outstanding to any one device.
    ///
    /// A target advertises how many commands it can buffer in its config response. The device's
    /// frame pool holds that many frames, clamped to `1..=max_frames`.
    ///
    /// Defaults to 16.
    pub max_frames: u16,

    /// Maximum number of requests queued or in flight per device. Submitting beyond this fails
    /// with [`Error::NoMemory`](crate::error::Error::NoMemory).
    ///
    /// Defaults to 128.
    pub max_requests: usize,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            max_frames: 16,
            max_requests: 128,
        }
    }
}

impl InitiatorConfig {
    /// Frame pool size for a target advertising `buffer_count` outstanding commands.
    pub(crate) fn frames_for(&self, buffer_count: u16) -> u16 {
        buffer_count.clamp(1, self.max_frames.max(1))
    }
}
