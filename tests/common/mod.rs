//! Common utility functions for integration tests: bitmap builders and a
//! small reference JBIG2 decoder covering exactly what the encoder writes
//! (arithmetic coding, generic regions, symbol dictionaries without
//! refinement, text regions without refinement).
#![allow(dead_code)]

use byteorder::{BigEndian, ReadBytesExt};
use jbig2enc_core::jbig2sym::BitImage;
use std::collections::HashMap;
use std::io::{Cursor, Read};

pub const JB2_MAGIC: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

// ---------------------------------------------------------------------------
// Bitmap helpers
// ---------------------------------------------------------------------------

/// Helper that converts a compact bitmap written as rows of `0`/`1` chars.
pub fn img_from_strings(rows: &[&str]) -> BitImage {
    let h = rows.len();
    let w = rows[0].len();
    let mut img = BitImage::new(w as u32, h as u32).unwrap();
    for (y, row) in rows.iter().enumerate() {
        for (x, ch) in row.chars().enumerate() {
            if ch == '1' {
                img.set(x as u32, y as u32, true);
            }
        }
    }
    img
}

/// Deterministic pseudo-random bitmap; `density` is the black fraction in
/// 1/256ths.
pub fn random_bitimage(width: u32, height: u32, seed: u64, density: u8) -> BitImage {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    BitImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        ((state >> 24) as u8) < density
    })
    .unwrap()
}

/// Draws `glyph` onto `page` at (x, y).
pub fn stamp(page: &mut BitImage, glyph: &BitImage, x: u32, y: u32) {
    for gy in 0..glyph.height as u32 {
        for gx in 0..glyph.width as u32 {
            if glyph.get(gx, gy) {
                page.set(x + gx, y + gy, true);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded bitmaps
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    pub width: usize,
    pub height: usize,
    pixels: Vec<bool>,
}

impl Bitmap {
    pub fn new(width: usize, height: usize, fill: bool) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return false;
        }
        self.pixels[y as usize * self.width + x as usize]
    }

    pub fn set(&mut self, x: usize, y: usize, v: bool) {
        self.pixels[y * self.width + x] = v;
    }

    pub fn count_ones(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    /// ORs `other` onto self with its top-left corner at (x, y), clipping.
    pub fn or_at(&mut self, other: &Bitmap, x: i64, y: i64) {
        for sy in 0..other.height {
            for sx in 0..other.width {
                if !other.get(sx as i32, sy as i32) {
                    continue;
                }
                let (px, py) = (x + sx as i64, y + sy as i64);
                if px >= 0 && py >= 0 && (px as usize) < self.width && (py as usize) < self.height {
                    self.set(px as usize, py as usize, true);
                }
            }
        }
    }

    pub fn from_bitimage(img: &BitImage) -> Self {
        let mut out = Self::new(img.width, img.height, false);
        for y in 0..img.height {
            for x in 0..img.width {
                out.set(x, y, img.get(x as u32, y as u32));
            }
        }
        out
    }

    pub fn matches(&self, img: &BitImage) -> bool {
        *self == Self::from_bitimage(img)
    }
}

// ---------------------------------------------------------------------------
// MQ decoder (T.88 E.3)
// ---------------------------------------------------------------------------

/// Table E.1: (Qe, NMPS, NLPS, SWITCH).
#[rustfmt::skip]
const QE_TABLE: [(u32, usize, usize, bool); 47] = [
    (0x5601, 1, 1, true), (0x3401, 2, 6, false), (0x1801, 3, 9, false),
    (0x0AC1, 4, 12, false), (0x0521, 5, 29, false), (0x0221, 38, 33, false),
    (0x5601, 7, 6, true), (0x5401, 8, 14, false), (0x4801, 9, 14, false),
    (0x3801, 10, 14, false), (0x3001, 11, 17, false), (0x2401, 12, 18, false),
    (0x1C01, 13, 20, false), (0x1601, 29, 21, false), (0x5601, 15, 14, true),
    (0x5401, 16, 14, false), (0x5101, 17, 15, false), (0x4801, 18, 16, false),
    (0x3801, 19, 17, false), (0x3401, 20, 18, false), (0x3001, 21, 19, false),
    (0x2801, 22, 19, false), (0x2401, 23, 20, false), (0x2201, 24, 21, false),
    (0x1C01, 25, 22, false), (0x1801, 26, 23, false), (0x1601, 27, 24, false),
    (0x1401, 28, 25, false), (0x1201, 29, 26, false), (0x1101, 30, 27, false),
    (0x0AC1, 31, 28, false), (0x09C1, 32, 29, false), (0x08A1, 33, 30, false),
    (0x0521, 34, 31, false), (0x0441, 35, 32, false), (0x02A1, 36, 33, false),
    (0x0221, 37, 34, false), (0x0141, 38, 35, false), (0x0111, 39, 36, false),
    (0x0085, 40, 37, false), (0x0049, 41, 38, false), (0x0025, 42, 39, false),
    (0x0015, 43, 40, false), (0x0009, 44, 41, false), (0x0005, 45, 42, false),
    (0x0001, 45, 43, false), (0x5601, 46, 46, false),
];

#[derive(Clone, Copy, Debug, Default)]
pub struct Cx {
    index: usize,
    mps: bool,
}

pub fn contexts(size: usize) -> Vec<Cx> {
    vec![Cx::default(); size]
}

pub struct MqDecoder<'a> {
    data: &'a [u8],
    bp: usize,
    a: u32,
    c: u32,
    ct: u32,
}

impl<'a> MqDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut d = Self {
            data,
            bp: 0,
            a: 0,
            c: 0,
            ct: 0,
        };
        d.c = u32::from(d.at(0)) << 16;
        d.byte_in();
        d.c <<= 7;
        d.ct -= 7;
        d.a = 0x8000;
        d
    }

    fn at(&self, i: usize) -> u8 {
        self.data.get(i).copied().unwrap_or(0xFF)
    }

    fn byte_in(&mut self) {
        if self.at(self.bp) == 0xFF {
            if self.at(self.bp + 1) > 0x8F {
                self.c = self.c.wrapping_add(0xFF00);
                self.ct = 8;
            } else {
                self.bp += 1;
                self.c = self.c.wrapping_add(u32::from(self.at(self.bp)) << 9);
                self.ct = 7;
            }
        } else {
            self.bp += 1;
            self.c = self.c.wrapping_add(u32::from(self.at(self.bp)) << 8);
            self.ct = 8;
        }
    }

    fn renorm(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    pub fn decode(&mut self, cx: &mut Cx) -> bool {
        let (qe, nmps, nlps, switch) = QE_TABLE[cx.index];
        self.a -= qe;
        let d;
        if (self.c >> 16) < qe {
            if self.a < qe {
                d = cx.mps;
                cx.index = nmps;
            } else {
                d = !cx.mps;
                if switch {
                    cx.mps = !cx.mps;
                }
                cx.index = nlps;
            }
            self.a = qe;
            self.renorm();
        } else {
            self.c -= qe << 16;
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    d = !cx.mps;
                    if switch {
                        cx.mps = !cx.mps;
                    }
                    cx.index = nlps;
                } else {
                    d = cx.mps;
                    cx.index = nmps;
                }
                self.renorm();
            } else {
                d = cx.mps;
            }
        }
        d
    }

    /// Integer procedure (A.2); `None` is OOB.
    pub fn decode_int(&mut self, cxs: &mut [Cx]) -> Option<i64> {
        let mut prev = 1usize;
        let mut bit = |dec: &mut Self| {
            let b = dec.decode(&mut cxs[prev]);
            prev = if prev < 256 {
                (prev << 1) | b as usize
            } else {
                (((prev << 1) | b as usize) & 0x1FF) | 0x100
            };
            b
        };
        let s = bit(self);
        let (n, offset) = if !bit(self) {
            (2, 0)
        } else if !bit(self) {
            (4, 4)
        } else if !bit(self) {
            (6, 20)
        } else if !bit(self) {
            (8, 84)
        } else if !bit(self) {
            (12, 340)
        } else {
            (32, 4436)
        };
        let mut v = 0i64;
        for _ in 0..n {
            v = (v << 1) | bit(self) as i64;
        }
        v += offset;
        match (s, v) {
            (true, 0) => None,
            (true, v) => Some(-v),
            (false, v) => Some(v),
        }
    }

    /// IAID procedure (A.3).
    pub fn decode_iaid(&mut self, cxs: &mut [Cx], code_len: u32) -> u32 {
        let mut prev = 1usize;
        for _ in 0..code_len {
            let b = self.decode(&mut cxs[prev]);
            prev = (prev << 1) | b as usize;
        }
        (prev - (1 << code_len)) as u32
    }
}

// ---------------------------------------------------------------------------
// Generic region decoding (6.2)
// ---------------------------------------------------------------------------

pub fn generic_context_size(template: u8) -> usize {
    match template {
        0 => 1 << 16,
        1 => 1 << 13,
        _ => 1 << 10,
    }
}

/// Template pixels from context bit 0 upwards.
fn template_offsets(template: u8, at: &[(i8, i8)]) -> Vec<(i32, i32)> {
    let a = |i: usize| (i32::from(at[i].0), i32::from(at[i].1));
    match template {
        0 => vec![
            (-1, 0), (-2, 0), (-3, 0), (-4, 0), a(0),
            (2, -1), (1, -1), (0, -1), (-1, -1), (-2, -1),
            a(1), a(2), (1, -2), (0, -2), (-1, -2), a(3),
        ],
        1 => vec![
            (-1, 0), (-2, 0), (-3, 0), a(0),
            (2, -1), (1, -1), (0, -1), (-1, -1), (-2, -1),
            (2, -2), (1, -2), (0, -2), (-1, -2),
        ],
        2 => vec![
            (-1, 0), (-2, 0), a(0),
            (1, -1), (0, -1), (-1, -1), (-2, -1),
            (1, -2), (0, -2), (-1, -2),
        ],
        _ => vec![
            (-1, 0), (-2, 0), (-3, 0), (-4, 0), a(0),
            (1, -1), (0, -1), (-1, -1), (-2, -1), (-3, -1),
        ],
    }
}

fn sltp_context(template: u8) -> usize {
    [0x9B25, 0x0795, 0x00E5, 0x0195][template as usize]
}

pub fn decode_generic(
    dec: &mut MqDecoder,
    stats: &mut [Cx],
    width: usize,
    height: usize,
    template: u8,
    at: &[(i8, i8)],
    tpgdon: bool,
) -> Bitmap {
    let offsets = template_offsets(template, at);
    let mut out = Bitmap::new(width, height, false);
    let mut ltp = false;
    for y in 0..height {
        if tpgdon {
            ltp ^= dec.decode(&mut stats[sltp_context(template)]);
            if ltp {
                for x in 0..width {
                    let above = out.get(x as i32, y as i32 - 1);
                    out.set(x, y, above);
                }
                continue;
            }
        }
        for x in 0..width {
            let mut cx = 0usize;
            for (bit, &(dx, dy)) in offsets.iter().enumerate() {
                if out.get(x as i32 + dx, y as i32 + dy) {
                    cx |= 1 << bit;
                }
            }
            let v = dec.decode(&mut stats[cx]);
            out.set(x, y, v);
        }
    }
    out
}

fn read_at_pixels(r: &mut Cursor<&[u8]>, template: u8) -> Vec<(i8, i8)> {
    let n = if template == 0 { 4 } else { 1 };
    (0..n)
        .map(|_| (r.read_i8().unwrap(), r.read_i8().unwrap()))
        .collect()
}

// ---------------------------------------------------------------------------
// Segments (7.2)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct FileHeaderInfo {
    pub sequential: bool,
    pub n_pages: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ParsedSegment {
    pub number: u32,
    pub seg_type: u8,
    pub page: u32,
    pub referred: Vec<u32>,
    /// Bytes used by each referred-to segment number
    pub referred_width: usize,
    pub data: Vec<u8>,
}

/// Splits a stream into its file header (if any) and segments.
pub fn parse_segments(bytes: &[u8]) -> (Option<FileHeaderInfo>, Vec<ParsedSegment>) {
    let mut r = Cursor::new(bytes);
    let mut header = None;
    if bytes.starts_with(&JB2_MAGIC) {
        r.set_position(8);
        let flags = r.read_u8().unwrap();
        let n_pages = if flags & 0x02 == 0 {
            Some(r.read_u32::<BigEndian>().unwrap())
        } else {
            None
        };
        header = Some(FileHeaderInfo {
            sequential: flags & 0x01 != 0,
            n_pages,
        });
    }

    let mut segments = Vec::new();
    while (r.position() as usize) < bytes.len() {
        let number = r.read_u32::<BigEndian>().unwrap();
        let flags = r.read_u8().unwrap();
        let seg_type = flags & 0x3F;
        let wide_page = flags & 0x40 != 0;

        let first = r.read_u8().unwrap();
        let count = if first >> 5 == 7 {
            let rest = [r.read_u8().unwrap(), r.read_u8().unwrap(), r.read_u8().unwrap()];
            let long = u32::from_be_bytes([first, rest[0], rest[1], rest[2]]) & 0x1FFF_FFFF;
            let mut retention = vec![0u8; (long as usize + 8) / 8];
            r.read_exact(&mut retention).unwrap();
            long as usize
        } else {
            (first >> 5) as usize
        };

        let referred_width = if number <= 256 {
            1
        } else if number <= 65536 {
            2
        } else {
            4
        };
        let referred = (0..count)
            .map(|_| match referred_width {
                1 => u32::from(r.read_u8().unwrap()),
                2 => u32::from(r.read_u16::<BigEndian>().unwrap()),
                _ => r.read_u32::<BigEndian>().unwrap(),
            })
            .collect();

        let page = if wide_page {
            r.read_u32::<BigEndian>().unwrap()
        } else {
            u32::from(r.read_u8().unwrap())
        };
        let len = r.read_u32::<BigEndian>().unwrap() as usize;
        let mut data = vec![0u8; len];
        r.read_exact(&mut data).unwrap();
        segments.push(ParsedSegment {
            number,
            seg_type,
            page,
            referred,
            referred_width,
            data,
        });
    }
    (header, segments)
}

// ---------------------------------------------------------------------------
// Region payloads
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct RegionInfo {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    pub comb_op: u8,
}

fn read_region_info(r: &mut Cursor<&[u8]>) -> RegionInfo {
    RegionInfo {
        width: r.read_u32::<BigEndian>().unwrap(),
        height: r.read_u32::<BigEndian>().unwrap(),
        x: r.read_u32::<BigEndian>().unwrap(),
        y: r.read_u32::<BigEndian>().unwrap(),
        comb_op: r.read_u8().unwrap() & 0x07,
    }
}

#[derive(Clone, Debug)]
pub struct PageInfoData {
    pub width: u32,
    pub height: u32,
    pub xres: u32,
    pub yres: u32,
    pub flags: u8,
    pub striping: u16,
}

pub fn parse_page_info(data: &[u8]) -> PageInfoData {
    assert_eq!(data.len(), 19, "page information is 19 bytes");
    let mut r = Cursor::new(data);
    PageInfoData {
        width: r.read_u32::<BigEndian>().unwrap(),
        height: r.read_u32::<BigEndian>().unwrap(),
        xres: r.read_u32::<BigEndian>().unwrap(),
        yres: r.read_u32::<BigEndian>().unwrap(),
        flags: r.read_u8().unwrap(),
        striping: r.read_u16::<BigEndian>().unwrap(),
    }
}

/// Decodes an immediate generic region segment payload.
pub fn decode_generic_segment(data: &[u8]) -> (RegionInfo, Bitmap) {
    let mut r = Cursor::new(data);
    let info = read_region_info(&mut r);
    let flags = r.read_u8().unwrap();
    assert_eq!(flags & 0x01, 0, "MMR is never written");
    let template = (flags >> 1) & 0x03;
    let tpgdon = flags & 0x08 != 0;
    let at = read_at_pixels(&mut r, template);
    let coded = &data[r.position() as usize..];
    let mut dec = MqDecoder::new(coded);
    let mut stats = contexts(generic_context_size(template));
    let bitmap = decode_generic(
        &mut dec,
        &mut stats,
        info.width as usize,
        info.height as usize,
        template,
        &at,
        tpgdon,
    );
    (info, bitmap)
}

/// Decodes a symbol dictionary payload, returning the exported symbols.
pub fn decode_symbol_dictionary(data: &[u8], input_symbols: &[Bitmap]) -> Vec<Bitmap> {
    let mut r = Cursor::new(data);
    let flags = r.read_u16::<BigEndian>().unwrap();
    assert_eq!(flags & 0x03, 0, "Huffman and refinement are never written");
    let template = ((flags >> 10) & 0x03) as u8;
    let at = read_at_pixels(&mut r, template);
    let num_exported = r.read_u32::<BigEndian>().unwrap() as usize;
    let num_new = r.read_u32::<BigEndian>().unwrap() as usize;

    let coded = &data[r.position() as usize..];
    let mut dec = MqDecoder::new(coded);
    let mut iadh = contexts(512);
    let mut iadw = contexts(512);
    let mut iaex = contexts(512);
    let mut gb = contexts(generic_context_size(template));

    let mut new_symbols = Vec::with_capacity(num_new);
    let mut height = 0i64;
    while new_symbols.len() < num_new {
        height += dec.decode_int(&mut iadh).expect("IADH is never OOB");
        let mut width = 0i64;
        while let Some(dw) = dec.decode_int(&mut iadw) {
            width += dw;
            assert!(new_symbols.len() < num_new, "more symbols than declared");
            let symbol = decode_generic(
                &mut dec,
                &mut gb,
                width as usize,
                height as usize,
                template,
                &at,
                false,
            );
            new_symbols.push(symbol);
        }
    }

    let all: Vec<Bitmap> = input_symbols.iter().cloned().chain(new_symbols).collect();
    let mut exported = Vec::new();
    let mut export = false;
    let mut i = 0;
    while i < all.len() {
        let run = dec.decode_int(&mut iaex).expect("IAEX is never OOB") as usize;
        for symbol in all.iter().skip(i).take(run) {
            if export {
                exported.push(symbol.clone());
            }
        }
        i += run;
        export = !export;
    }
    assert_eq!(exported.len(), num_exported);
    exported
}

#[derive(Clone, Debug)]
pub struct TextRegion {
    pub info: RegionInfo,
    pub log_strips: u8,
    pub bitmap: Bitmap,
    /// (symbol ID, S, T) of each instance in coding order
    pub instances: Vec<(u32, i64, i64)>,
}

/// Decodes a text region payload against the symbols `symbols`.
pub fn decode_text_region(data: &[u8], symbols: &[Bitmap]) -> TextRegion {
    let mut r = Cursor::new(data);
    let info = read_region_info(&mut r);
    let flags = r.read_u16::<BigEndian>().unwrap();
    assert_eq!(flags & 0x03, 0, "Huffman and refinement are never written");
    let log_strips = ((flags >> 2) & 0x03) as u8;
    let ref_corner = (flags >> 4) & 0x03;
    let transposed = flags & 0x40 != 0;
    let comb_op = (flags >> 7) & 0x03;
    let default_pixel = flags & 0x200 != 0;
    let raw_offset = ((flags >> 10) & 0x1F) as i64;
    let ds_offset = if raw_offset & 0x10 != 0 {
        raw_offset - 32
    } else {
        raw_offset
    };
    assert_eq!(ref_corner, 1, "symbols are placed by their top-left corner");
    assert!(!transposed);
    assert_eq!(comb_op, 0);
    let num_instances = r.read_u32::<BigEndian>().unwrap() as usize;

    let strips = 1i64 << log_strips;
    let mut code_len = 0u32;
    while (1usize << code_len) < symbols.len() {
        code_len += 1;
    }

    let coded = &data[r.position() as usize..];
    let mut dec = MqDecoder::new(coded);
    let mut iadt = contexts(512);
    let mut iafs = contexts(512);
    let mut iads = contexts(512);
    let mut iait = contexts(512);
    let mut iaid = contexts(1 << code_len);

    let mut bitmap = Bitmap::new(info.width as usize, info.height as usize, default_pixel);
    let mut instances = Vec::with_capacity(num_instances);

    let mut strip_t = -dec.decode_int(&mut iadt).expect("initial STRIPT") * strips;
    let mut first_s = 0i64;
    while instances.len() < num_instances {
        strip_t += dec.decode_int(&mut iadt).expect("DT") * strips;
        let mut cur_s = 0i64;
        let mut first = true;
        loop {
            if first {
                first_s += dec.decode_int(&mut iafs).expect("DFS");
                cur_s = first_s;
                first = false;
            } else {
                match dec.decode_int(&mut iads) {
                    Some(ds) => cur_s += ds + ds_offset,
                    None => break,
                }
            }
            let cur_t = if strips > 1 {
                dec.decode_int(&mut iait).expect("IT")
            } else {
                0
            };
            let t = strip_t + cur_t;
            let id = dec.decode_iaid(&mut iaid, code_len);
            let symbol = &symbols[id as usize];
            bitmap.or_at(symbol, cur_s, t);
            instances.push((id, cur_s, t));
            cur_s += symbol.width as i64 - 1;
            if instances.len() == num_instances {
                // The strip still ends with OOB.
                assert!(dec.decode_int(&mut iads).is_none(), "strip not terminated");
                break;
            }
        }
    }

    TextRegion {
        info,
        log_strips,
        bitmap,
        instances,
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct DecodedPage {
    pub number: u32,
    pub info: PageInfoData,
    pub bitmap: Bitmap,
    pub text_regions: Vec<TextRegion>,
    pub ended: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Document {
    pub header: Option<FileHeaderInfo>,
    pub segments: Vec<ParsedSegment>,
    pub pages: Vec<DecodedPage>,
    /// Exported symbols of every dictionary, by segment number
    pub dictionaries: HashMap<u32, Vec<Bitmap>>,
    pub end_of_file: bool,
}

impl Document {
    pub fn page(&self, number: u32) -> &DecodedPage {
        self.pages
            .iter()
            .find(|p| p.number == number)
            .unwrap_or_else(|| panic!("no page {}", number))
    }
}

/// Decodes one or more streams in order, as if concatenated (a PDF globals
/// stream followed by a page stream, say).
pub fn decode_streams(streams: &[&[u8]]) -> Document {
    let mut doc = Document::default();
    for (i, stream) in streams.iter().enumerate() {
        let (header, segments) = parse_segments(stream);
        if i == 0 {
            doc.header = header;
        } else {
            assert!(header.is_none(), "only the first stream may carry a header");
        }
        for seg in segments {
            apply_segment(&mut doc, &seg);
            doc.segments.push(seg);
        }
    }
    doc
}

pub fn decode_stream(bytes: &[u8]) -> Document {
    decode_streams(&[bytes])
}

fn page_mut<'d>(doc: &'d mut Document, number: u32) -> &'d mut DecodedPage {
    doc.pages
        .iter_mut()
        .rev()
        .find(|p| p.number == number)
        .unwrap_or_else(|| panic!("segment for page {} before its page information", number))
}

fn apply_segment(doc: &mut Document, seg: &ParsedSegment) {
    assert!(!doc.end_of_file, "segment after end of file");
    match seg.seg_type {
        0 => {
            let inputs: Vec<Bitmap> = seg
                .referred
                .iter()
                .flat_map(|n| doc.dictionaries.get(n).cloned().unwrap_or_default())
                .collect();
            let symbols = decode_symbol_dictionary(&seg.data, &inputs);
            doc.dictionaries.insert(seg.number, symbols);
        }
        6 | 7 => {
            let symbols: Vec<Bitmap> = seg
                .referred
                .iter()
                .flat_map(|n| {
                    doc.dictionaries
                        .get(n)
                        .cloned()
                        .unwrap_or_else(|| panic!("text region refers to unknown dictionary {}", n))
                })
                .collect();
            let region = decode_text_region(&seg.data, &symbols);
            let page = page_mut(doc, seg.page);
            page.bitmap
                .or_at(&region.bitmap, region.info.x as i64, region.info.y as i64);
            page.text_regions.push(region);
        }
        38 | 39 => {
            let (info, bitmap) = decode_generic_segment(&seg.data);
            let page = page_mut(doc, seg.page);
            page.bitmap.or_at(&bitmap, info.x as i64, info.y as i64);
        }
        48 => {
            let info = parse_page_info(&seg.data);
            let default_pixel = info.flags & 0x04 != 0;
            doc.pages.push(DecodedPage {
                number: seg.page,
                bitmap: Bitmap::new(info.width as usize, info.height as usize, default_pixel),
                info,
                text_regions: Vec::new(),
                ended: false,
            });
        }
        49 => {
            assert!(seg.data.is_empty());
            page_mut(doc, seg.page).ended = true;
        }
        51 => {
            assert!(seg.data.is_empty());
            doc.end_of_file = true;
        }
        other => panic!("unexpected segment type {}", other),
    }
}
