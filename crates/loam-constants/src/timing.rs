//! Fixed delays and channel bounds for the connection reactor.

/// Delay before re-arming a lost configuration subscription (1 s).
///
/// A fixed delay, not exponential backoff: the configuration source is
/// process-local and its failures are expected to be transient, so the
/// only goal is to avoid a tight resubscribe loop.
pub const RESUBSCRIBE_DELAY_MS: u64 = 1_000;

/// Buffer size for the configuration-change broadcast channel.
///
/// Bounded so a stalled subscriber lags (and re-arms) instead of
/// growing an unbounded queue. Configuration writes are rare; 256
/// events of headroom is generous.
pub const CONFIG_BROADCAST_BUFFER_SIZE: usize = 256;
