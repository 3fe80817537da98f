//! Register-write view of a command stream.
//!
//! Used by tests and trace tooling to check what a packet programs without matching on raw
//! dword offsets.

use thiserror::Error;

use crate::regs::{Reg, REG_VALUE_MASK};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Dword index of the value in the decoded stream.
    pub at: usize,
    pub reg: u8,
    pub value: u32,
    /// `true` for values carried by a multi-register write, which are full 32 bits.
    pub raw: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("multi-register write 0x{header:08x} at dword {at} needs {count} values, {available} left")]
    Truncated {
        at: usize,
        header: u32,
        count: usize,
        available: usize,
    },
    #[error("byte length {0} is not a multiple of 4")]
    UnalignedLength(usize),
}

/// Expands `words` into individual register writes, in stream order.
pub fn register_writes(words: &[u32]) -> Result<Vec<RegisterWrite>, DecodeError> {
    let mut out = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        if (word >> 24) as u8 == Reg::Vgv3WriteRaw.num() {
            let count = ((word >> 8) & 0xff) as usize;
            let first = (word & 0xff) as u8;
            let available = words.len() - i - 1;
            if count > available {
                return Err(DecodeError::Truncated {
                    at: i,
                    header: word,
                    count,
                    available,
                });
            }
            for n in 0..count {
                out.push(RegisterWrite {
                    at: i + 1 + n,
                    reg: first.wrapping_add(n as u8),
                    value: words[i + 1 + n],
                    raw: true,
                });
            }
            i += 1 + count;
        } else {
            out.push(RegisterWrite {
                at: i,
                reg: (word >> 24) as u8,
                value: word & REG_VALUE_MASK,
                raw: false,
            });
            i += 1;
        }
    }
    Ok(out)
}

/// Last value written to `reg`, if any.
pub fn last_value(writes: &[RegisterWrite], reg: Reg) -> Option<u32> {
    writes
        .iter()
        .rev()
        .find(|w| w.reg == reg.num())
        .map(|w| w.value)
}

/// Reads a little-endian dword stream, e.g. from a captured buffer dump.
pub fn words_from_le_bytes(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::UnalignedLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le(bytemuck::pod_read_unaligned::<u32>(chunk)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::{reg, regm};
    use pretty_assertions::assert_eq;

    #[test]
    fn expands_multi_register_writes() {
        let words = [
            regm(Reg::G2dXy, 2),
            0x0001_0002,
            0x0003_0004,
            reg(Reg::G2dIdle) | 3,
        ];
        let writes = register_writes(&words).unwrap();
        assert_eq!(
            writes,
            vec![
                RegisterWrite { at: 1, reg: 0xf0, value: 0x0001_0002, raw: true },
                RegisterWrite { at: 2, reg: 0xf1, value: 0x0003_0004, raw: true },
                RegisterWrite { at: 3, reg: 0xfe, value: 3, raw: false },
            ]
        );
        assert_eq!(last_value(&writes, Reg::G2dWidthHeight), Some(0x0003_0004));
        assert_eq!(last_value(&writes, Reg::G2dColor), None);
    }

    #[test]
    fn truncated_multi_write_is_reported() {
        let err = register_writes(&[regm(Reg::G2dColor, 3), 1]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                at: 0,
                header: regm(Reg::G2dColor, 3),
                count: 3,
                available: 1,
            }
        );
    }

    #[test]
    fn le_bytes() {
        assert_eq!(
            words_from_le_bytes(&[0x75, 0x02, 0x00, 0x7c, 0x03, 0x00, 0x00, 0xfe]).unwrap(),
            vec![0x7c00_0275, 0xfe00_0003]
        );
        assert_eq!(
            words_from_le_bytes(&[1, 2, 3]),
            Err(DecodeError::UnalignedLength(3))
        );
    }
}
