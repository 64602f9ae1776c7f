//! Sequential JBIG2 segment stream writer.
//!
//! [`SegmentWriter`] numbers segments, attaches them to the open page and
//! checks that every referred-to segment has been written before it. The
//! sink only ever sees whole segments, in the order they were added.

use log::debug;
use rustc_hash::FxHashMap;
use std::io::Write;

use crate::jbig2shared::dpi_to_ppm;
use crate::jbig2structs::{FileHeader, PageInfo, Segment, SegmentType};
use crate::{Jbig2Error, Result};

/// How a segment stream is framed and numbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Number of the first segment written.
    pub base_segment_number: u32,
    /// Standalone file: file header first, end-of-file segment last.
    pub with_file_header: bool,
    /// Page count declared in the file header, `None` for unknown.
    pub page_count: Option<u32>,
    /// Page number given to the first page.
    pub first_page: u32,
    /// Close pages with an end-of-page segment.
    pub end_of_page_segments: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            base_segment_number: 0,
            with_file_header: true,
            page_count: None,
            first_page: 1,
            end_of_page_segments: true,
        }
    }
}

impl ContainerConfig {
    /// Headerless stream without end-of-page segments, as embedded in
    /// PDF, starting at segment `base_segment_number`.
    pub fn embedded(base_segment_number: u32) -> Self {
        Self {
            base_segment_number,
            with_file_header: false,
            end_of_page_segments: false,
            ..Self::default()
        }
    }
}

/// Writes JBIG2 segments to `sink` in sequential organisation.
#[derive(Debug)]
pub struct SegmentWriter<W: Write> {
    sink: W,
    config: ContainerConfig,
    next_number: u32,
    next_page: u32,
    open_page: Option<u32>,
    header_written: bool,
    /// Every segment that may be referred to, by number
    known: FxHashMap<u32, SegmentType>,
}

impl<W: Write> SegmentWriter<W> {
    pub fn new(sink: W, config: ContainerConfig) -> Self {
        Self {
            sink,
            next_number: config.base_segment_number,
            next_page: config.first_page,
            config,
            open_page: None,
            header_written: false,
            known: FxHashMap::default(),
        }
    }

    /// Number the next segment will get.
    pub fn next_segment_number(&self) -> u32 {
        self.next_number
    }

    /// Page number of the open page.
    pub fn current_page(&self) -> Option<u32> {
        self.open_page
    }

    /// Records a segment written to another stream (for instance a PDF
    /// globals stream) so later segments may refer to it.
    pub fn declare_external(&mut self, number: u32, seg_type: SegmentType) {
        self.known.insert(number, seg_type);
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.config.with_file_header && !self.header_written {
            FileHeader {
                sequential: true,
                n_pages: self.config.page_count,
            }
            .write_into(&mut self.sink)?;
            debug!("wrote file header (pages: {:?})", self.config.page_count);
        }
        self.header_written = true;
        Ok(())
    }

    fn check_references(&self, seg_type: SegmentType, referred: &[u32]) -> Result<()> {
        for &number in referred {
            if !self.known.contains_key(&number) {
                return Err(Jbig2Error::UnknownSegment { number });
            }
        }
        if seg_type.is_text_region()
            && !referred
                .iter()
                .any(|n| self.known.get(n) == Some(&SegmentType::SymbolDictionary))
        {
            return Err(Jbig2Error::MissingDictionaryReference);
        }
        Ok(())
    }

    fn write_segment(
        &mut self,
        seg_type: SegmentType,
        payload: Vec<u8>,
        referred: &[u32],
        page: u32,
    ) -> Result<u32> {
        self.check_references(seg_type, referred)?;
        self.ensure_header()?;

        let segment = Segment {
            number: self.next_number,
            seg_type,
            deferred_non_retain: false,
            referred_to: referred.to_vec(),
            page,
            payload,
        };
        segment.write_into(&mut self.sink)?;
        debug!(
            "segment {}: {:?}, page {}, refers to {:?}, {} bytes",
            segment.number,
            seg_type,
            page,
            referred,
            segment.payload.len()
        );

        self.known.insert(segment.number, seg_type);
        self.next_number += 1;
        Ok(segment.number)
    }

    /// Opens a new page and writes its page information segment.
    pub fn begin_page_with(&mut self, info: &PageInfo) -> Result<u32> {
        if let Some(open) = self.open_page {
            return Err(Jbig2Error::PageState(format!(
                "page {} is still open",
                open
            )));
        }
        let page = self.next_page;
        let mut payload = Vec::with_capacity(19);
        info.write_into(&mut payload)?;
        let number = self.write_segment(SegmentType::PageInformation, payload, &[], page)?;
        self.open_page = Some(page);
        self.next_page += 1;
        Ok(number)
    }

    /// Opens a `width` x `height` page at `dpi` in both directions.
    pub fn begin_page(&mut self, width: u32, height: u32, dpi: u32) -> Result<u32> {
        let ppm = dpi_to_ppm(dpi);
        self.begin_page_with(&PageInfo {
            width,
            height,
            xres: ppm,
            yres: ppm,
            ..PageInfo::default()
        })
    }

    /// Writes a segment associated with the open page.
    pub fn add_segment(
        &mut self,
        seg_type: SegmentType,
        payload: Vec<u8>,
        referred: &[u32],
    ) -> Result<u32> {
        let page = self.open_page.ok_or_else(|| {
            Jbig2Error::PageState(format!("no open page for {:?} segment", seg_type))
        })?;
        self.write_segment(seg_type, payload, referred, page)
    }

    /// Writes a segment associated with no page (page 0), such as a
    /// dictionary shared by all pages.
    pub fn add_global_segment(
        &mut self,
        seg_type: SegmentType,
        payload: Vec<u8>,
        referred: &[u32],
    ) -> Result<u32> {
        self.write_segment(seg_type, payload, referred, 0)
    }

    /// Closes the open page, writing an end-of-page segment unless the
    /// stream is configured without them. Returns that segment's number.
    pub fn end_page(&mut self) -> Result<Option<u32>> {
        let page = self
            .open_page
            .ok_or_else(|| Jbig2Error::PageState("end_page without an open page".into()))?;
        let number = if self.config.end_of_page_segments {
            Some(self.write_segment(SegmentType::EndOfPage, Vec::new(), &[], page)?)
        } else {
            None
        };
        self.open_page = None;
        Ok(number)
    }

    /// Writes the end-of-file segment (standalone streams only), flushes
    /// and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        if let Some(open) = self.open_page {
            return Err(Jbig2Error::PageState(format!(
                "page {} was never ended",
                open
            )));
        }
        self.ensure_header()?;
        if self.config.with_file_header {
            self.write_segment(SegmentType::EndOfFile, Vec::new(), &[], 0)?;
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}
