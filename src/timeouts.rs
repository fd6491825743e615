use core::time::Duration;

/// Timing parameters for the initiator.
///
/// Retransmission is driven by an estimate of each target's round trip time. A frame is resent
/// when it has gone unanswered for twice the current estimate, and the estimate doubles each time
/// that happens so a slow or lossy target is not flooded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeouts {
    /// How often outstanding frames are checked for retransmission.
    ///
    /// Defaults to 100ms.
    pub tick: Duration,

    /// Lower bound of the round trip time estimate.
    ///
    /// Defaults to 200ms.
    pub rtt_min: Duration,

    /// Upper bound of the round trip time estimate. The estimate is reset to this value when a
    /// device is (re)identified.
    ///
    /// Defaults to 2s.
    pub rtt_max: Duration,

    /// A device is marked down when any one frame has waited this long, summed over all of its
    /// retransmissions, without a response.
    ///
    /// Defaults to 20s.
    pub dead: Duration,

    /// Interval between broadcast discovery queries.
    ///
    /// Defaults to 60s.
    pub discovery: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            rtt_min: Duration::from_millis(200),
            rtt_max: Duration::from_secs(2),
            dead: Duration::from_secs(20),
            discovery: Duration::from_secs(60),
        }
    }
}

/// Microseconds in a duration, saturating at `u64::MAX`.
pub(crate) fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
