/// Counters describing ring activity since creation.
///
/// Submission and wait failures are not reported to callers; these counters are where they
/// show up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RingStats {
    /// Successful submissions.
    pub submissions: u64,
    pub submit_failures: u64,
    /// Waits that observed retirement.
    pub waits: u64,
    /// Transient wait failures that were retried.
    pub wait_retries: u64,
    /// Non-transient wait failures, treated as "assume complete".
    pub wait_failures: u64,
    /// Flushes that reset the command region.
    pub flushes: u64,
    /// Flushes forced by an emit that would have overrun the command region.
    pub overflow_flushes: u64,
    /// Packets closed with `end`.
    pub packets: u64,
    /// Payload dwords of the last closed packet, excluding framing.
    pub last_packet_dwords: usize,
    /// Payload dwords emitted over the ring's lifetime.
    pub dwords_emitted: u64,
}
