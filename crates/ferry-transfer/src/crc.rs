//! Parameterised bit-by-bit CRC engine.
//!
//! ```text
//! for each byte:   [reflect in?] -> 8 rounds MSB-first, poly XOR on high-bit carry
//! after all bytes: [reflect out?] -> XOR final -> mask to `order` bits
//! ```
//!
//! No lookup table. The register is seeded with the init value in its
//! direct form, so the standard catalogue parameters reproduce their
//! published check values.

use thiserror::Error;

/// CRC model parameters (Williams/Rocksoft style).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcParams {
    /// Register width in bits, 1..=32.
    pub order: u32,
    pub poly: u32,
    /// Initial register value in direct form.
    pub init: u32,
    pub reflect_in: bool,
    pub reflect_out: bool,
    pub xor_out: u32,
}

impl CrcParams {
    /// CRC-32 (ISO-HDLC): the parameter set used on the wire.
    pub const CRC32: CrcParams = CrcParams {
        order: 32,
        poly: 0x04C1_1DB7,
        init: 0xFFFF_FFFF,
        reflect_in: true,
        reflect_out: true,
        xor_out: 0xFFFF_FFFF,
    };

    /// CRC-32/JAMCRC: CRC-32 without the final inversion.
    pub const JAMCRC: CrcParams = CrcParams {
        xor_out: 0,
        ..CrcParams::CRC32
    };

    /// CRC-32/BZIP2: unreflected CRC-32.
    pub const BZIP2: CrcParams = CrcParams {
        reflect_in: false,
        reflect_out: false,
        ..CrcParams::CRC32
    };
}

impl Default for CrcParams {
    fn default() -> Self {
        Self::CRC32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrcError {
    #[error("CRC order {0} outside 1..=32")]
    InvalidOrder(u32),

    #[error("{field} 0x{value:08x} does not fit in {order} bits")]
    ValueTooWide {
        field: &'static str,
        value: u32,
        order: u32,
    },
}

/// Immutable CRC engine. Build once, share by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc32 {
    params: CrcParams,
    mask: u32,
    high_bit: u32,
}

impl Crc32 {
    pub fn new(params: CrcParams) -> Result<Self, CrcError> {
        if params.order == 0 || params.order > 32 {
            return Err(CrcError::InvalidOrder(params.order));
        }
        // ((1 << (order - 1)) - 1) << 1 | 1 avoids the 1 << 32 overflow.
        let mask = (((1u32 << (params.order - 1)) - 1) << 1) | 1;
        let high_bit = 1u32 << (params.order - 1);

        for (field, value) in [
            ("poly", params.poly),
            ("init", params.init),
            ("xor_out", params.xor_out),
        ] {
            if value & !mask != 0 {
                return Err(CrcError::ValueTooWide {
                    field,
                    value,
                    order: params.order,
                });
            }
        }

        Ok(Self {
            params,
            mask,
            high_bit,
        })
    }

    /// The standard wire CRC-32.
    pub fn standard() -> Self {
        Self {
            params: CrcParams::CRC32,
            mask: u32::MAX,
            high_bit: 1 << 31,
        }
    }

    pub fn params(&self) -> &CrcParams {
        &self.params
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn high_bit(&self) -> u32 {
        self.high_bit
    }

    /// Compute the checksum of `data`.
    pub fn checksum(&self, data: &[u8]) -> u32 {
        let p = &self.params;
        let mut crc = p.init;

        for &byte in data {
            let c = if p.reflect_in {
                reflect(byte as u32, 8)
            } else {
                byte as u32
            };

            let mut j = 0x80u32;
            while j != 0 {
                let mut bit = crc & self.high_bit;
                crc <<= 1;
                if c & j != 0 {
                    bit ^= self.high_bit;
                }
                if bit != 0 {
                    crc ^= p.poly;
                }
                j >>= 1;
            }
        }

        if p.reflect_out {
            crc = reflect(crc, p.order);
        }
        (crc ^ p.xor_out) & self.mask
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::standard()
    }
}

/// Reverse the low `bits` bits of `value`. Higher bits are dropped.
pub fn reflect(value: u32, bits: u32) -> u32 {
    debug_assert!((1..=32).contains(&bits));
    value.reverse_bits() >> (32 - bits)
}
