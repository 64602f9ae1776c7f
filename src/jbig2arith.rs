//! The context-adaptive MQ arithmetic coder of ITU-T T.88 Annex E, plus the
//! integer (Annex A.2) and symbol id (Annex A.3) procedures built on it.
//!
//! Probability state lives outside the coder in [`ContextTable`]s so a caller
//! decides which regions share statistics. The coder itself only owns the
//! A/C/CT registers and the output buffer.

use lazy_static::lazy_static;

use crate::jbig2buf::CodedBuffer;
use crate::{Jbig2Error, Result};

#[cfg(feature = "trace_arith")]
use tracing::trace;

#[cfg(not(feature = "trace_arith"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// Number of contexts of a 16-bit generic template.
pub const JBIG2_MAX_CTX: usize = 65536;

/// Contexts per integer procedure (9-bit `PREV`).
pub const INT_CTX_SIZE: usize = 512;

/// One probability-estimation state (ISO/IEC 14492 Table E.1)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct State {
    /// Qe value (16 bit)
    pub qe: u16,
    /// next state if the coded symbol was the **MPS**
    pub nmps: u8,
    /// next state if the coded symbol was the **LPS**
    pub nlps: u8,
    /// if 1, toggle the current MPS after coding an LPS
    pub switch: bool,
}

#[rustfmt::skip]
macro_rules! s { ( $qe:expr , $nmps:expr , $nlps:expr , $sw:expr ) =>
    { State { qe: $qe, nmps: $nmps, nlps: $nlps, switch: $sw != 0 } } }

/// Table E.1, indices 0 to 46.
#[rustfmt::skip]
pub const BASE: [State; 47] = [
    s!(0x5601,  1,  1, 1), s!(0x3401,  2,  6, 0), s!(0x1801,  3,  9, 0),
    s!(0x0AC1,  4, 12, 0), s!(0x0521,  5, 29, 0), s!(0x0221, 38, 33, 0),
    s!(0x5601,  7,  6, 1), s!(0x5401,  8, 14, 0), s!(0x4801,  9, 14, 0),
    s!(0x3801, 10, 14, 0), s!(0x3001, 11, 17, 0), s!(0x2401, 12, 18, 0),
    s!(0x1C01, 13, 20, 0), s!(0x1601, 29, 21, 0), s!(0x5601, 15, 14, 1),
    s!(0x5401, 16, 14, 0), s!(0x5101, 17, 15, 0), s!(0x4801, 18, 16, 0),
    s!(0x3801, 19, 17, 0), s!(0x3401, 20, 18, 0), s!(0x3001, 21, 19, 0),
    s!(0x2801, 22, 19, 0), s!(0x2401, 23, 20, 0), s!(0x2201, 24, 21, 0),
    s!(0x1C01, 25, 22, 0), s!(0x1801, 26, 23, 0), s!(0x1601, 27, 24, 0),
    s!(0x1401, 28, 25, 0), s!(0x1201, 29, 26, 0), s!(0x1101, 30, 27, 0),
    s!(0x0AC1, 31, 28, 0), s!(0x09C1, 32, 29, 0), s!(0x08A1, 33, 30, 0),
    s!(0x0521, 34, 31, 0), s!(0x0441, 35, 32, 0), s!(0x02A1, 36, 33, 0),
    s!(0x0221, 37, 34, 0), s!(0x0141, 38, 35, 0), s!(0x0111, 39, 36, 0),
    s!(0x0085, 40, 37, 0), s!(0x0049, 41, 38, 0), s!(0x0025, 42, 39, 0),
    s!(0x0015, 43, 40, 0), s!(0x0009, 44, 41, 0), s!(0x0005, 45, 42, 0),
    s!(0x0001, 45, 43, 0),
    s!(0x5601, 46, 46, 0), // reserved, used by no context
];

lazy_static! {
    /// Table E.1 unfolded with the MPS sense: index `i` is state `i` with
    /// MPS = 0, index `i + 47` the same state with MPS = 1. An LPS in a
    /// switching state crosses to the other half.
    pub static ref FULL: [State; 94] = {
        let mut t = [BASE[0]; 94];
        for (i, s) in BASE.iter().enumerate() {
            t[i] = State {
                nlps: if s.switch { s.nlps + 47 } else { s.nlps },
                ..*s
            };
            t[i + 47] = State {
                nmps: s.nmps + 47,
                nlps: if s.switch { s.nlps } else { s.nlps + 47 },
                ..*s
            };
        }
        t
    };
}

// ==============================================
// Context tables
// ==============================================

/// Adaptive probability state for a set of contexts. Each slot holds an
/// index into [`FULL`], so it carries both the table state and the MPS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextTable {
    states: Vec<u8>,
}

impl ContextTable {
    /// A table of `size` contexts, all in state 0 with MPS 0.
    pub fn new(size: usize) -> Self {
        Self {
            states: vec![0; size],
        }
    }

    /// The `1 << code_len` contexts of an IAID procedure.
    pub fn for_iaid(code_len: u32) -> Self {
        Self::new(1usize << code_len)
    }

    /// Number of contexts.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True if the table has no contexts.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Puts every context back to state 0, MPS 0.
    pub fn reset(&mut self) {
        self.states.fill(0);
    }

    /// Table E.1 state index of context `cx` (0..=46).
    pub fn state(&self, cx: usize) -> u8 {
        self.states[cx] % 47
    }

    /// Current more probable symbol of context `cx`.
    pub fn mps(&self, cx: usize) -> bool {
        self.states[cx] >= 47
    }
}

// ==============================================
// Integer procedures (Annex A.2)
// ==============================================

/// Integer arithmetic coding procedures, corresponding to the IAx names of
/// T.88 Annex A.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum IntProc {
    Iaai = 0,
    Iadh,
    Iads,
    Iadt,
    Iadw,
    Iaex,
    Iafs,
    Iait,
    Iardh,
    Iardw,
    Iardx,
    Iardy,
    Iari,
}

impl IntProc {
    /// Number of distinct procedures.
    pub const COUNT: usize = 13;
}

/// One context table per integer procedure.
#[derive(Clone, Debug)]
pub struct IntegerContexts {
    tables: Vec<ContextTable>,
}

impl Default for IntegerContexts {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegerContexts {
    /// Fresh 512-slot tables for all procedures.
    pub fn new() -> Self {
        Self {
            tables: vec![ContextTable::new(INT_CTX_SIZE); IntProc::COUNT],
        }
    }

    /// Resets every procedure's table.
    pub fn reset(&mut self) {
        self.tables.iter_mut().for_each(ContextTable::reset);
    }

    /// The table of procedure `proc`.
    pub fn table(&self, proc: IntProc) -> &ContextTable {
        &self.tables[proc as usize]
    }

    /// Mutable table of procedure `proc`.
    pub fn table_mut(&mut self, proc: IntProc) -> &mut ContextTable {
        &mut self.tables[proc as usize]
    }
}

/// Largest magnitude an integer procedure can code.
pub const INT_MAX_MAGNITUDE: i32 = 2_000_000_000;

/// One row of Table A.1 seen from the encoder: the sign and prefix bits
/// (`data`, sent LSB first, `bits` of them) followed by `v - delta` in
/// `intbits` bits, MSB first.
struct IntEncRange {
    bot: i32,
    top: i32,
    data: u8,
    bits: u8,
    delta: u32,
    intbits: u8,
}

#[rustfmt::skip]
const INT_ENC_RANGE: [IntEncRange; 13] = [
    IntEncRange { bot: 0, top: 3, data: 0, bits: 2, delta: 0, intbits: 2 },
    IntEncRange { bot: -1, top: -1, data: 9, bits: 4, delta: 0, intbits: 0 },
    IntEncRange { bot: -3, top: -2, data: 5, bits: 3, delta: 2, intbits: 1 },
    IntEncRange { bot: 4, top: 19, data: 2, bits: 3, delta: 4, intbits: 4 },
    IntEncRange { bot: -19, top: -4, data: 3, bits: 3, delta: 4, intbits: 4 },
    IntEncRange { bot: 20, top: 83, data: 6, bits: 4, delta: 20, intbits: 6 },
    IntEncRange { bot: -83, top: -20, data: 7, bits: 4, delta: 20, intbits: 6 },
    IntEncRange { bot: 84, top: 339, data: 14, bits: 5, delta: 84, intbits: 8 },
    IntEncRange { bot: -339, top: -84, data: 15, bits: 5, delta: 84, intbits: 8 },
    IntEncRange { bot: 340, top: 4435, data: 30, bits: 6, delta: 340, intbits: 12 },
    IntEncRange { bot: -4435, top: -340, data: 31, bits: 6, delta: 340, intbits: 12 },
    IntEncRange { bot: 4436, top: INT_MAX_MAGNITUDE, data: 62, bits: 6, delta: 4436, intbits: 32 },
    IntEncRange { bot: -INT_MAX_MAGNITUDE, top: -4436, data: 63, bits: 6, delta: 4436, intbits: 32 },
];

/// `PREV` after coding `bit` (A.2, step 3): 8 bits of history, then the
/// 9th bit sticks at 1.
#[inline]
fn next_prev(prev: usize, bit: bool) -> usize {
    let shifted = (prev << 1) | bit as usize;
    if prev < 256 {
        shifted
    } else {
        (shifted & 0x1FF) | 0x100
    }
}

// ==============================================
// Encoder
// ==============================================

/// Context-adaptive arithmetic encoder for JBIG2.
#[derive(Debug, Clone)]
pub struct Jbig2ArithCoder {
    a: u32,
    c: u32,
    ct: u32,
    buf: CodedBuffer,
}

impl Default for Jbig2ArithCoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Jbig2ArithCoder {
    /// INITENC.
    pub fn new() -> Self {
        Self {
            a: 0x8000,
            c: 0,
            ct: 12,
            buf: CodedBuffer::with_capacity(1024),
        }
    }

    /// INITENC on an existing coder; discards any output.
    pub fn reset(&mut self) {
        self.a = 0x8000;
        self.c = 0;
        self.ct = 12;
        self.buf.clear();
    }

    /// Returns a reference to the output buffer as a byte slice. Complete
    /// only after [`flush`](Self::flush).
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    /// Consumes the coder, returning everything emitted so far.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.into_vec()
    }

    /// Flushes and returns the finished stream.
    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        self.into_vec()
    }

    /// RENORME
    fn renorm(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.ct == 0 {
                self.byte_out();
            }
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEOUT. A pending 0xFF is followed by only 7 bits so that a carry can
    /// never ripple into it.
    fn byte_out(&mut self) {
        if self.buf.pending() == 0xFF {
            self.emit_7();
        } else if self.c < 0x0800_0000 {
            self.emit_8();
        } else if self.buf.carry() == 0xFF {
            self.c &= 0x07FF_FFFF;
            self.emit_7();
        } else {
            self.emit_8();
        }
    }

    #[inline]
    fn emit_8(&mut self) {
        self.buf.shift_in((self.c >> 19) as u8);
        self.c &= 0x7FFFF;
        self.ct = 8;
    }

    #[inline]
    fn emit_7(&mut self) {
        self.buf.shift_in((self.c >> 20) as u8);
        self.c &= 0xFFFFF;
        self.ct = 7;
    }

    /// Codes one binary decision `bit` in context `cx` of `table`.
    ///
    /// Panics if `cx` is outside the table.
    pub fn encode_bit(&mut self, table: &mut ContextTable, cx: usize, bit: bool) {
        let index = table.states[cx];
        let state = &FULL[index as usize];
        let qe = u32::from(state.qe);
        let mps = index >= 47;
        trace!("cx={} state={} bit={} a={:04x} c={:08x}", cx, index, bit, self.a, self.c);

        self.a -= qe;
        if bit == mps {
            // CODEMPS
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    self.a = qe;
                } else {
                    self.c += qe;
                }
                table.states[cx] = state.nmps;
                self.renorm();
            } else {
                self.c += qe;
            }
        } else {
            // CODELPS
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            table.states[cx] = state.nlps;
            self.renorm();
        }
    }

    /// FLUSH: sets the final bits, pushes out what is left of C and appends
    /// the `0xFF 0xAC` marker.
    pub fn flush(&mut self) {
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }
        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();
        self.buf.finish_with_marker();
        trace!("flushed {} bytes", self.buf.len());
    }

    /// Codes `value` with integer procedure `proc` (Annex A.2).
    pub fn encode_integer(
        &mut self,
        contexts: &mut IntegerContexts,
        proc: IntProc,
        value: i32,
    ) -> Result<()> {
        let range = INT_ENC_RANGE
            .iter()
            .find(|r| r.bot <= value && value <= r.top)
            .ok_or(Jbig2Error::IntegerOutOfRange {
                value: i64::from(value),
            })?;

        let table = contexts.table_mut(proc);
        let mut prev = 1usize;
        for i in 0..range.bits {
            let bit = (range.data >> i) & 1 != 0;
            self.encode_bit(table, prev, bit);
            prev = next_prev(prev, bit);
        }

        let magnitude = value.unsigned_abs() - range.delta;
        for i in (0..range.intbits).rev() {
            let bit = (magnitude >> i) & 1 != 0;
            self.encode_bit(table, prev, bit);
            prev = next_prev(prev, bit);
        }
        Ok(())
    }

    /// Codes the out-of-band value with procedure `proc`.
    pub fn encode_oob(&mut self, contexts: &mut IntegerContexts, proc: IntProc) {
        let table = contexts.table_mut(proc);
        let mut prev = 1usize;
        for bit in [true, false, false, false] {
            self.encode_bit(table, prev, bit);
            prev = next_prev(prev, bit);
        }
    }

    /// Codes symbol id `id` in `code_len` bits with the IAID procedure
    /// (Annex A.3). `table` must hold `1 << code_len` contexts.
    pub fn encode_iaid(&mut self, table: &mut ContextTable, code_len: u32, id: u32) {
        debug_assert!(
            u64::from(id) < 1u64 << code_len,
            "symbol id {} needs more than {} bits",
            id,
            code_len
        );
        let mut prev = 1usize;
        for i in (0..code_len).rev() {
            let bit = (id >> i) & 1 != 0;
            self.encode_bit(table, prev, bit);
            prev = (prev << 1) | bit as usize;
        }
    }
}
