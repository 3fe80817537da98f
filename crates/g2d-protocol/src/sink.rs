use crate::GpuAddr;

/// Destination for encoded command dwords.
///
/// The ring implements this for an open packet; tests and the decoder use a plain `Vec<u32>`.
pub trait PacketSink {
    fn emit(&mut self, word: u32);

    /// Emits a device address. Sinks that track relocations can override this; the word on the
    /// wire is always the 32-bit address.
    fn emit_reloc(&mut self, addr: GpuAddr) {
        self.emit(addr.get());
    }

    fn emit_all(&mut self, words: &[u32]) {
        for &word in words {
            self.emit(word);
        }
    }
}

impl PacketSink for Vec<u32> {
    fn emit(&mut self, word: u32) {
        self.push(word);
    }
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn emit(&mut self, word: u32) {
        (**self).emit(word);
    }

    fn emit_reloc(&mut self, addr: GpuAddr) {
        (**self).emit_reloc(addr);
    }
}
