//! Packing of `(phase, particle id)` pairs into a single 64-bit word.

use thiserror::Error;

/// Width of a packed neighbor entry in bits.
pub const WORD_BITS: u32 = u64::BITS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseCodecError {
    #[error("Phase field width {0} must be within 1..=63 bits")]
    InvalidWidth(u32),
    #[error("Phase {phase} does not fit in {bits} bits")]
    PhaseOverflow { phase: usize, bits: u32 },
    #[error("Particle id {id} does not fit in {bits} bits")]
    IdOverflow { id: usize, bits: u32 },
}

/// Encodes a phase index in the high `sh_byte` bits and a particle id in the
/// remaining low bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhaseCodec {
    sh_byte: u32,
}

impl PhaseCodec {
    pub fn new(sh_byte: u32) -> Result<Self, PhaseCodecError> {
        if sh_byte == 0 || sh_byte >= WORD_BITS {
            return Err(PhaseCodecError::InvalidWidth(sh_byte));
        }
        Ok(Self { sh_byte })
    }

    /// Codec with the phase field just wide enough for `n_phases`.
    pub fn for_phases(n_phases: usize) -> Result<Self, PhaseCodecError> {
        let bits = usize::BITS - n_phases.saturating_sub(1).leading_zeros();
        Self::new(bits.max(1))
    }

    pub fn sh_byte(&self) -> u32 {
        self.sh_byte
    }

    #[inline]
    fn id_bits(&self) -> u32 {
        WORD_BITS - self.sh_byte
    }

    #[inline]
    fn id_mask(&self) -> u64 {
        (1u64 << self.id_bits()) - 1
    }

    /// Number of distinct phases representable.
    pub fn max_phases(&self) -> u64 {
        1u64 << self.sh_byte
    }

    /// Number of distinct particle ids representable per phase.
    pub fn max_ids(&self) -> u64 {
        1u64 << self.id_bits()
    }

    pub fn check(&self, phase: usize, id: usize) -> Result<(), PhaseCodecError> {
        if phase as u64 >= self.max_phases() {
            return Err(PhaseCodecError::PhaseOverflow {
                phase,
                bits: self.sh_byte,
            });
        }
        if id as u64 >= self.max_ids() {
            return Err(PhaseCodecError::IdOverflow {
                id,
                bits: self.id_bits(),
            });
        }
        Ok(())
    }

    /// Packs without range checks; out-of-range input is truncated.
    #[inline]
    pub fn encode(&self, phase: usize, id: usize) -> u64 {
        debug_assert!(self.check(phase, id).is_ok());
        ((phase as u64) << self.id_bits()) | (id as u64 & self.id_mask())
    }

    pub fn try_encode(&self, phase: usize, id: usize) -> Result<u64, PhaseCodecError> {
        self.check(phase, id)?;
        Ok(self.encode(phase, id))
    }

    #[inline]
    pub fn decode(&self, packed: u64) -> (usize, usize) {
        (self.phase(packed), self.id(packed))
    }

    #[inline]
    pub fn phase(&self, packed: u64) -> usize {
        (packed >> self.id_bits()) as usize
    }

    #[inline]
    pub fn id(&self, packed: u64) -> usize {
        (packed & self.id_mask()) as usize
    }
}
