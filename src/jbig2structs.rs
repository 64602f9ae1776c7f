//! JBIG2 segment structures (T.88 section 7) and encoder configuration.
//!
//! Every wire structure serialises itself through `write_into` with
//! big-endian `byteorder` writers; nothing here decides segment numbers or
//! ordering, that is the container's job.
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

use crate::{Jbig2Error, Result};

/// JBIG2 file header magic (D.4.1).
pub const JB2_MAGIC: &[u8; 8] = b"\x97JB2\r\n\x1A\n";

/// REFCORNER value for instances anchored at their top-left pixel.
pub const REF_CORNER_TOPLEFT: u8 = 1;

/// Default classification threshold of the symbol classifier.
pub const JBIG2_THRESHOLD_DEF: f32 = 0.92;

/// JBIG2 segment types produced (or reserved) by this encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentType {
    #[default]
    SymbolDictionary = 0,
    ImmediateTextRegion = 6,
    ImmediateLosslessTextRegion = 7,
    ImmediateGenericRegion = 38,
    ImmediateLosslessGenericRegion = 39,
    PageInformation = 48,
    EndOfPage = 49,
    EndOfFile = 51,
}

impl SegmentType {
    /// True for the two immediate text region types.
    pub fn is_text_region(self) -> bool {
        matches!(
            self,
            SegmentType::ImmediateTextRegion | SegmentType::ImmediateLosslessTextRegion
        )
    }
}

impl TryFrom<u8> for SegmentType {
    type Error = io::Error;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(SegmentType::SymbolDictionary),
            6 => Ok(SegmentType::ImmediateTextRegion),
            7 => Ok(SegmentType::ImmediateLosslessTextRegion),
            38 => Ok(SegmentType::ImmediateGenericRegion),
            39 => Ok(SegmentType::ImmediateLosslessGenericRegion),
            48 => Ok(SegmentType::PageInformation),
            49 => Ok(SegmentType::EndOfPage),
            51 => Ok(SegmentType::EndOfFile),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid segment type: {}", value),
            )),
        }
    }
}

/// Number of AT pixels template `template` uses.
pub fn at_pixel_count(template: u8) -> usize {
    if template == 0 {
        4
    } else {
        1
    }
}

/// The AT pixels actually used with `template`: `at` where given, the
/// nominal positions for the rest.
pub fn resolve_at_pixels(template: u8, at: &[(i8, i8)]) -> [(i8, i8); 4] {
    let defaults = default_at_pixels(template);
    let mut out = [(0i8, 0i8); 4];
    for (i, slot) in out.iter_mut().enumerate().take(at_pixel_count(template)) {
        *slot = at.get(i).or(defaults.get(i)).copied().unwrap_or((0, 0));
    }
    out
}

fn write_at_pixels<W: Write>(w: &mut W, template: u8, at: &[(i8, i8)]) -> io::Result<()> {
    let resolved = resolve_at_pixels(template, at);
    for &(dx, dy) in resolved.iter().take(at_pixel_count(template)) {
        w.write_i8(dx)?;
        w.write_i8(dy)?;
    }
    Ok(())
}

fn len_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("segment data of {} bytes exceeds 4 GiB", len),
        )
    })
}

// -----------------------------------------------------------------------------
// File header (magic + flags + number of pages)
// -----------------------------------------------------------------------------

/// The JBIG2 file header (D.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Sequential organisation (the only one written here).
    pub sequential: bool,
    /// Number of pages, `None` when unknown.
    pub n_pages: Option<u32>,
}

impl FileHeader {
    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(JB2_MAGIC)?;
        let mut flags = 0u8;
        if self.sequential {
            flags |= 0x01;
        }
        if self.n_pages.is_none() {
            flags |= 0x02;
        }
        w.write_u8(flags)?;
        if let Some(n) = self.n_pages {
            w.write_u32::<BigEndian>(n)?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Page information segment payload (§7.4.8)
// -----------------------------------------------------------------------------

/// The page information segment payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub width: u32,
    pub height: u32,
    /// Horizontal resolution, pixels per metre.
    pub xres: u32,
    /// Vertical resolution, pixels per metre.
    pub yres: u32,
    /// Bit 0: page is eventually lossless
    pub is_lossless: bool,
    /// Bit 2: default pixel value
    pub default_pixel: bool,
    /// Bits 3-4: default combination operator
    pub default_operator: u8,
    /// Page striping information, 0 = not striped
    pub striping: u16,
}

impl PageInfo {
    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.width)?;
        w.write_u32::<BigEndian>(self.height)?;
        w.write_u32::<BigEndian>(self.xres)?;
        w.write_u32::<BigEndian>(self.yres)?;

        let mut b = 0u8;
        if self.is_lossless {
            b |= 0x01;
        }
        if self.default_pixel {
            b |= 0x04;
        }
        b |= (self.default_operator & 0x03) << 3;
        w.write_u8(b)?;
        w.write_u16::<BigEndian>(self.striping)
    }
}

// -----------------------------------------------------------------------------
// Region segment information field (§7.4.1)
// -----------------------------------------------------------------------------

/// Region segment information: placement of a region on the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionInfo {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
    /// External combination operator (0 = OR)
    pub comb_operator: u8,
}

impl RegionInfo {
    /// Serialised size in bytes.
    pub const SIZE: usize = 17;

    /// A region covering a whole `width` x `height` page.
    pub fn full_page(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.width)?;
        w.write_u32::<BigEndian>(self.height)?;
        w.write_u32::<BigEndian>(self.x)?;
        w.write_u32::<BigEndian>(self.y)?;
        w.write_u8(self.comb_operator & 0x07)
    }
}

// -----------------------------------------------------------------------------
// Generic region parameters (§7.4.6)
// -----------------------------------------------------------------------------

/// Header of an immediate generic region segment (arithmetic coding only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericRegionParams {
    pub region: RegionInfo,
    pub template: u8,
    pub tpgdon: bool,
    pub at: Vec<(i8, i8)>,
}

impl GenericRegionParams {
    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.region.write_into(w)?;
        // Bit 0 (MMR) stays clear.
        let mut flags = (self.template & 0x03) << 1;
        if self.tpgdon {
            flags |= 0x08;
        }
        w.write_u8(flags)?;
        write_at_pixels(w, self.template, &self.at)
    }
}

// -----------------------------------------------------------------------------
// Symbol dictionary parameters (§7.4.2)
// -----------------------------------------------------------------------------

/// Header of a symbol dictionary segment (SDHUFF = 0, SDREFAGG = 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDictParams {
    pub sd_template: u8,
    pub at: Vec<(i8, i8)>,
    /// SDNUMEXSYMS
    pub exsyms: u32,
    /// SDNUMNEWSYMS
    pub newsyms: u32,
}

impl SymbolDictParams {
    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let flags = u16::from(self.sd_template & 0x03) << 10;
        w.write_u16::<BigEndian>(flags)?;
        write_at_pixels(w, self.sd_template, &self.at)?;
        w.write_u32::<BigEndian>(self.exsyms)?;
        w.write_u32::<BigEndian>(self.newsyms)
    }
}

// -----------------------------------------------------------------------------
// Text region parameters (§7.4.3)
// -----------------------------------------------------------------------------

/// Header of an immediate text region segment (SBHUFF = 0, SBREFINE = 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRegionParams {
    pub region: RegionInfo,
    /// LOGSBSTRIPS (0-3)
    pub log_strips: u8,
    /// REFCORNER (0-3)
    pub ref_corner: u8,
    pub transposed: bool,
    /// SBCOMBOP (0-3)
    pub comb_op: u8,
    pub default_pixel: bool,
    /// SBDSOFFSET, signed 5-bit
    pub ds_offset: i8,
    /// SBNUMINSTANCES
    pub num_instances: u32,
}

impl TextRegionParams {
    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.region.write_into(w)?;

        let mut flags: u16 = 0;
        flags |= u16::from(self.log_strips & 0x03) << 2;
        flags |= u16::from(self.ref_corner & 0x03) << 4;
        if self.transposed {
            flags |= 1 << 6;
        }
        flags |= u16::from(self.comb_op & 0x03) << 7;
        if self.default_pixel {
            flags |= 1 << 9;
        }
        flags |= (u16::from(self.ds_offset as u8) & 0x1F) << 10;
        w.write_u16::<BigEndian>(flags)?;

        w.write_u32::<BigEndian>(self.num_instances)
    }
}

// -----------------------------------------------------------------------------
// Segment header + payload writer (§7.2)
// -----------------------------------------------------------------------------

/// Size of each referred-to segment number in the header of segment
/// `segment_number` (7.2.5).
pub fn referred_number_size(segment_number: u32) -> usize {
    if segment_number <= 256 {
        1
    } else if segment_number <= 65536 {
        2
    } else {
        4
    }
}

/// A JBIG2 segment: header fields plus data.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub number: u32,
    pub seg_type: SegmentType,
    pub deferred_non_retain: bool,
    pub referred_to: Vec<u32>,
    /// Page association, 0 for segments shared by all pages
    pub page: u32,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn write_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.number)?;

        let wide_page = self.page > 0xFF;
        let flags = (self.seg_type as u8 & 0x3F)
            | (u8::from(wide_page) << 6)
            | (u8::from(self.deferred_non_retain) << 7);
        w.write_u8(flags)?;

        // Retention bits stay clear; this encoder never relies on them.
        let count = self.referred_to.len();
        if count <= 4 {
            w.write_u8((count as u8) << 5)?;
        } else {
            let count32 = len_u32(count)?;
            if count32 >= 1 << 29 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} referred-to segments exceed the header limit", count),
                ));
            }
            w.write_u32::<BigEndian>((7 << 29) | count32)?;
            let retention_bytes = (count + 1 + 7) / 8;
            w.write_all(&vec![0u8; retention_bytes])?;
        }

        match referred_number_size(self.number) {
            1 => {
                for &r in &self.referred_to {
                    w.write_u8(r as u8)?;
                }
            }
            2 => {
                for &r in &self.referred_to {
                    w.write_u16::<BigEndian>(r as u16)?;
                }
            }
            _ => {
                for &r in &self.referred_to {
                    w.write_u32::<BigEndian>(r)?;
                }
            }
        }

        if wide_page {
            w.write_u32::<BigEndian>(self.page)?;
        } else {
            w.write_u8(self.page as u8)?;
        }

        w.write_u32::<BigEndian>(len_u32(self.payload.len())?)?;
        w.write_all(&self.payload)
    }
}

// -----------------------------------------------------------------------------
// Encoder configuration
// -----------------------------------------------------------------------------

/// Nominal AT pixel positions of generic template `template`.
pub fn default_at_pixels(template: u8) -> Vec<(i8, i8)> {
    match template {
        0 => vec![(3, -1), (-3, -1), (2, -2), (-2, -2)],
        1 => vec![(3, -1)],
        _ => vec![(2, -1)],
    }
}

/// Checks a template number and its AT pixels.
pub fn validate_template(template: u8, at_pixels: &[(i8, i8)]) -> Result<()> {
    if template > 3 {
        return Err(Jbig2Error::InvalidConfig(format!(
            "template {} is not one of 0-3",
            template
        )));
    }
    let allowed = at_pixel_count(template);
    if at_pixels.len() > allowed {
        return Err(Jbig2Error::InvalidConfig(format!(
            "template {} takes at most {} AT pixels, got {}",
            template,
            allowed,
            at_pixels.len()
        )));
    }
    for &(dx, dy) in at_pixels {
        if !(dy < 0 || (dy == 0 && dx < 0)) {
            return Err(Jbig2Error::InvalidConfig(format!(
                "AT pixel ({}, {}) is not a previously coded pixel",
                dx, dy
            )));
        }
    }
    Ok(())
}

/// Coding parameters of a generic region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericRegionConfig {
    /// Template ID (0-3)
    pub template: u8,
    /// Typical prediction generic decoding
    pub tpgdon: bool,
    /// Adaptive template pixels (dx, dy)
    pub at_pixels: Vec<(i8, i8)>,
}

impl Default for GenericRegionConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

impl GenericRegionConfig {
    /// Template `template` with its nominal AT pixels and TPGDON off.
    pub fn new(template: u8) -> Self {
        Self {
            template,
            tpgdon: false,
            at_pixels: default_at_pixels(template),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_template(self.template, &self.at_pixels)
    }

    /// The segment header describing a region coded with this config.
    pub fn params(&self, region: RegionInfo) -> GenericRegionParams {
        GenericRegionParams {
            region,
            template: self.template,
            tpgdon: self.tpgdon,
            at: self.at_pixels.clone(),
        }
    }
}

/// Symbol classifier knobs.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    /// Minimum match score (0.0-1.0) for a component to join a class
    pub threshold: f32,
    /// Largest width or height difference still compared
    pub max_size_delta: u32,
    /// Only bit-identical components share a class
    pub exact_match: bool,
    /// Rebuild exemplars by majority vote over same-size members
    pub refine_exemplars: bool,
    /// Upper bound on the number of classes
    pub max_symbols: Option<usize>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: JBIG2_THRESHOLD_DEF,
            max_size_delta: 2,
            exact_match: false,
            refine_exemplars: false,
            max_symbols: None,
        }
    }
}

impl ClassifierConfig {
    /// Bit-exact classification.
    pub fn exact() -> Self {
        Self {
            threshold: 1.0,
            exact_match: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Jbig2Error::InvalidConfig(format!(
                "threshold {} is outside 0.0..=1.0",
                self.threshold
            )));
        }
        if self.max_symbols == Some(0) {
            return Err(Jbig2Error::InvalidConfig(
                "max_symbols must allow at least one symbol".into(),
            ));
        }
        if self.exact_match && self.refine_exemplars {
            return Err(Jbig2Error::InvalidConfig(
                "exemplar refinement cannot be combined with exact matching".into(),
            ));
        }
        Ok(())
    }
}

/// Coding parameters of a symbol dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolDictConfig {
    /// SDTEMPLATE (0-3)
    pub template: u8,
    /// SDAT pixels
    pub at_pixels: Vec<(i8, i8)>,
}

impl Default for SymbolDictConfig {
    fn default() -> Self {
        Self {
            template: 0,
            at_pixels: default_at_pixels(0),
        }
    }
}

impl SymbolDictConfig {
    pub fn validate(&self) -> Result<()> {
        validate_template(self.template, &self.at_pixels)
    }
}

/// Layout of a text region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextRegionConfig {
    /// Region width in pixels
    pub width: u32,
    /// Region height in pixels
    pub height: u32,
    /// LOGSBSTRIPS: strips are `1 << log_strips` pixels tall
    pub log_strips: u8,
    /// SBDEFPIXEL
    pub default_pixel: bool,
    /// SBCOMBOP
    pub comb_op: u8,
}

impl TextRegionConfig {
    /// Full-page region using strips of height one.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            log_strips: 0,
            default_pixel: false,
            comb_op: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_strips > 3 {
            return Err(Jbig2Error::InvalidConfig(format!(
                "log_strips {} is outside 0-3",
                self.log_strips
            )));
        }
        if self.comb_op > 3 {
            return Err(Jbig2Error::InvalidConfig(format!(
                "text region combination operator {} is outside 0-3",
                self.comb_op
            )));
        }
        Ok(())
    }
}

/// Top-level configuration of [`Jbig2Encoder`](crate::jbig2enc::Jbig2Encoder).
#[derive(Clone, Debug, PartialEq)]
pub struct Jbig2Config {
    /// Code pages as symbol dictionary + text region instead of generic regions
    pub symbol_mode: bool,
    /// Generic region coding (generic mode, and fallback)
    pub generic: GenericRegionConfig,
    pub classifier: ClassifierConfig,
    pub symbol_dict: SymbolDictConfig,
    /// LOGSBSTRIPS for text regions
    pub log_strips: u8,
    /// Resolution written to the page information segments
    pub dpi: u32,
    /// Standalone file (header + end of file) rather than PDF fragments
    pub want_full_headers: bool,
    /// First segment number
    pub base_segment_number: u32,
}

impl Default for Jbig2Config {
    fn default() -> Self {
        Self {
            symbol_mode: true,
            generic: GenericRegionConfig::default(),
            classifier: ClassifierConfig::default(),
            symbol_dict: SymbolDictConfig::default(),
            log_strips: 0,
            dpi: 300,
            want_full_headers: true,
            base_segment_number: 0,
        }
    }
}

impl Jbig2Config {
    /// Symbol coding that reproduces every page exactly.
    pub fn lossless() -> Self {
        Self {
            classifier: ClassifierConfig::exact(),
            ..Self::default()
        }
    }

    /// Generic region coding only, no symbol dictionaries.
    pub fn generic_only() -> Self {
        Self {
            symbol_mode: false,
            ..Self::default()
        }
    }

    /// True if the configured pipeline decodes to the exact input.
    pub fn is_lossless(&self) -> bool {
        !self.symbol_mode || self.classifier.exact_match
    }

    pub fn validate(&self) -> Result<()> {
        self.generic.validate()?;
        self.classifier.validate()?;
        self.symbol_dict.validate()?;
        if self.log_strips > 3 {
            return Err(Jbig2Error::InvalidConfig(format!(
                "log_strips {} is outside 0-3",
                self.log_strips
            )));
        }
        if self.dpi == 0 {
            return Err(Jbig2Error::InvalidConfig("dpi must be positive".into()));
        }
        Ok(())
    }
}
