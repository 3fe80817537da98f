use g2d_protocol::packet::{END_TRAILER_DWORDS, INTER_PACKET_HEADER_DWORDS, LINK_HEADER_DWORDS};
use g2d_protocol::preamble::{CONTEXT_BUFFER_BYTES, STATE_SIZE};

use crate::alloc::MemType;
use crate::error::RingError;

/// Ring buffer geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Size of the command stream buffer (preamble plus command region), in bytes.
    pub cmdstream_bytes: usize,
    /// Sizes of the three context buffers referenced by the preamble, in bytes.
    pub context_buffer_bytes: [usize; 3],
    /// Emit a `trace!` event for every dword written to the ring.
    pub log_dwords: bool,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            cmdstream_bytes: 0x5000,
            context_buffer_bytes: CONTEXT_BUFFER_BYTES.map(|b| b as usize),
            log_dwords: false,
        }
    }
}

impl RingConfig {
    /// Smallest command stream that can hold the preamble and one empty packet.
    pub const MIN_CMDSTREAM_DWORDS: usize =
        STATE_SIZE + INTER_PACKET_HEADER_DWORDS + LINK_HEADER_DWORDS + 2 * END_TRAILER_DWORDS;

    pub fn cmdstream_words(&self) -> usize {
        self.cmdstream_bytes / 4
    }

    pub fn validate(&self) -> Result<(), RingError> {
        if self.cmdstream_bytes % 4 != 0 {
            return Err(RingError::InvalidConfig(
                "command stream size must be a multiple of 4 bytes",
            ));
        }
        if self.cmdstream_words() < Self::MIN_CMDSTREAM_DWORDS {
            return Err(RingError::InvalidConfig(
                "command stream cannot hold the preamble and one packet",
            ));
        }
        if self.context_buffer_bytes.iter().any(|&b| b == 0) {
            return Err(RingError::InvalidConfig("context buffers must be non-empty"));
        }
        Ok(())
    }
}

/// Policy for [`crate::CachingAllocator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Memory type used for pixmap storage.
    pub default_memtype: MemType,
    /// Keep one freed buffer of `default_memtype` around for a same-size reallocation.
    pub cache_default_memtype: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            default_memtype: MemType::Ebi,
            cache_default_memtype: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cmdstream_words(), 0x1400);
        assert_eq!(config.context_buffer_bytes, [0x1000, 0x9000, 0x81000]);
    }

    #[test]
    fn rejects_unaligned_and_undersized_streams() {
        let unaligned = RingConfig {
            cmdstream_bytes: 0x5002,
            ..RingConfig::default()
        };
        assert!(matches!(unaligned.validate(), Err(RingError::InvalidConfig(_))));

        let tiny = RingConfig {
            cmdstream_bytes: STATE_SIZE * 4,
            ..RingConfig::default()
        };
        assert!(matches!(tiny.validate(), Err(RingError::InvalidConfig(_))));

        let smallest = RingConfig {
            cmdstream_bytes: RingConfig::MIN_CMDSTREAM_DWORDS * 4,
            ..RingConfig::default()
        };
        smallest.validate().unwrap();
    }
}
