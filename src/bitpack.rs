//! Packing decoded bits into bytes.

use std::fmt;
use std::io::Write;

use tracing::{debug, warn};

use crate::decoder::SymbolSink;
use crate::error::Result;
use crate::symbol::InputSymbol;
use crate::utils::plural;

/// Bits per output byte.
pub const WORD_BITS: usize = 8;

/// Which end of the byte the first decoded bit lands in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BitOrder {
    /// First bit is the least significant.
    #[default]
    Lsb0,
    /// First bit is the most significant.
    Msb0,
}

impl BitOrder {
    #[inline]
    fn shift(self, n: usize) -> usize {
        match self {
            BitOrder::Lsb0 => n,
            BitOrder::Msb0 => WORD_BITS - 1 - n,
        }
    }
}

/// Pack up to [`WORD_BITS`] bits, first bit placed according to `order`.
pub fn pack_byte(bits: &[bool], order: BitOrder) -> u8 {
    bits.iter()
        .take(WORD_BITS)
        .enumerate()
        .fold(0u8, |byte, (n, &bit)| {
            if bit {
                byte | (1 << order.shift(n))
            } else {
                byte
            }
        })
}

/// Inverse of [`pack_byte`] over a whole buffer.
pub fn unpack_bits(bytes: &[u8], order: BitOrder) -> Vec<bool> {
    bytes
        .iter()
        .flat_map(|&byte| (0..WORD_BITS).map(move |n| byte & (1 << order.shift(n)) != 0))
        .collect()
}

/// Bits discarded at [`BitPacker::finish`] because they did not fill a byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrailingBits {
    pub bits: Vec<bool>,
}

impl fmt::Display for TrailingBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: String = self.bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
        write!(f, "{} ({rendered}) remaining on output", plural(self.bits.len(), "bit"))
    }
}

/// Sink turning a stream of decoded bits into bytes.
///
/// Meta symbols are dropped with a diagnostic. A partial byte at the end is
/// reported by [`finish`](Self::finish), which runs on drop if it was never
/// called.
pub struct BitPacker<'a, W: Write + ?Sized> {
    out: &'a mut W,
    order: BitOrder,
    buf: Vec<bool>,
    bytes_written: usize,
    finished: bool,
}

impl<'a, W: Write + ?Sized> BitPacker<'a, W> {
    pub fn new(out: &'a mut W, order: BitOrder) -> Self {
        Self {
            out,
            order,
            buf: Vec::with_capacity(WORD_BITS),
            bytes_written: 0,
            finished: false,
        }
    }

    pub fn order(&self) -> BitOrder {
        self.order
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Bits waiting for the rest of their byte.
    pub fn pending(&self) -> &[bool] {
        &self.buf
    }

    /// Discard any partial byte and flush the writer.
    pub fn finish(&mut self) -> Result<Option<TrailingBits>> {
        self.finished = true;
        let trailing = if self.buf.is_empty() {
            None
        } else {
            let trailing = TrailingBits {
                bits: std::mem::take(&mut self.buf),
            };
            warn!("{trailing}");
            Some(trailing)
        };
        self.out.flush()?;
        Ok(trailing)
    }

    fn emit_byte(&mut self) -> Result<()> {
        let byte = pack_byte(&self.buf, self.order);
        debug!("decoded byte {byte:#04x}");
        self.out.write_all(&[byte])?;
        self.bytes_written += 1;
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write + ?Sized> SymbolSink for BitPacker<'_, W> {
    fn write_symbol(&mut self, sym: InputSymbol) -> Result<()> {
        match sym {
            InputSymbol::Bit(bit) => {
                self.buf.push(bit);
                if self.buf.len() == WORD_BITS {
                    self.emit_byte()?;
                }
            }
            InputSymbol::Control(idx) => {
                warn!("ignoring control symbol #{idx} in decoder");
            }
            InputSymbol::StartOfFile => debug!("ignoring start-of-file symbol in decoder"),
            InputSymbol::EndOfFile => debug!("ignoring end-of-file symbol in decoder"),
            InputSymbol::Other(c) => {
                warn!("ignoring unknown symbol '{c}' (\\x{:02x}) in decoder", c as u32);
            }
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> Drop for BitPacker<'_, W> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.finish() {
                warn!(error = %err, "bit packer failed while finishing on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::parse_inputs;

    const ALTERNATING: [bool; 8] = [true, false, true, false, true, false, true, false];

    fn feed(packer: &mut BitPacker<'_, Vec<u8>>, s: &str) {
        for sym in parse_inputs(s) {
            packer.write_symbol(sym).unwrap();
        }
    }

    #[test]
    fn bit_order_determines_byte_value() {
        assert_eq!(pack_byte(&ALTERNATING, BitOrder::Lsb0), 0x55);
        assert_eq!(pack_byte(&ALTERNATING, BitOrder::Msb0), 0xAA);
    }

    #[test]
    fn packer_emits_full_bytes_only() {
        let mut bytes = Vec::new();
        {
            let mut packer = BitPacker::new(&mut bytes, BitOrder::Msb0);
            feed(&mut packer, "10101010110");
            assert_eq!(packer.bytes_written(), 1);
            assert_eq!(packer.pending(), &[true, true, false]);
            let trailing = packer.finish().unwrap().unwrap();
            assert_eq!(trailing.bits, vec![true, true, false]);
            assert_eq!(trailing.to_string(), "3 bits (110) remaining on output");
        }
        assert_eq!(bytes, vec![0xAA]);
    }

    #[test]
    fn meta_and_unknown_symbols_are_skipped() {
        let mut bytes = Vec::new();
        {
            let mut packer = BitPacker::new(&mut bytes, BitOrder::Lsb0);
            feed(&mut packer, "^1010x1010$");
            packer.write_symbol(InputSymbol::Control(1)).unwrap();
            assert_eq!(packer.finish().unwrap(), None);
        }
        assert_eq!(bytes, vec![0x55]);
    }

    #[test]
    fn unpack_inverts_pack() {
        for order in [BitOrder::Lsb0, BitOrder::Msb0] {
            let bits = unpack_bits(&[0x3c, 0x01], order);
            assert_eq!(bits.len(), 16);
            assert_eq!(pack_byte(&bits[..8], order), 0x3c);
            assert_eq!(pack_byte(&bits[8..], order), 0x01);
        }
    }

    #[test]
    fn drop_finishes_once() {
        let mut bytes = Vec::new();
        {
            let mut packer = BitPacker::new(&mut bytes, BitOrder::Lsb0);
            feed(&mut packer, "111");
        }
        assert!(bytes.is_empty());
    }
}
