//! Document encoder: turns a sequence of page bitmaps into a JBIG2 stream.
//!
//! Generic mode codes each page as one immediate generic region. Symbol
//! mode runs a classifier over the connected components of every page as
//! pages are added, and at flush time writes one dictionary with the
//! symbols shared between pages plus a local dictionary and a text region
//! per page.

use log::{debug, info, warn};
use ndarray::Array2;
use std::io::Write;

use crate::jbig2classify::{Placement, SymbolClassifier, SymbolDictionary};
use crate::jbig2container::{ContainerConfig, SegmentWriter};
use crate::jbig2dict::{encode_symbol_dictionary, encode_text_region, EncodedDictionary};
use crate::jbig2generic::encode_generic_payload;
use crate::jbig2lutz::find_connected_components;
use crate::jbig2shared::{dpi_to_ppm, usize_to_u32};
use crate::jbig2structs::{Jbig2Config, PageInfo, RegionInfo, SegmentType, TextRegionConfig};
use crate::jbig2sym::{array_to_bitimage, BitImage};
use crate::{Jbig2Error, Result};

#[cfg(feature = "trace_encoder")]
use tracing::trace;

#[cfg(not(feature = "trace_encoder"))]
#[macro_use]
mod trace_stubs {
    macro_rules! trace {
        ($($arg:tt)*) => {
            std::convert::identity(format_args!($($arg)*))
        };
    }
}

/// Smallest component, in black pixels, that becomes a symbol instance.
const MIN_COMPONENT_SIZE: usize = 1;

/// Output of the PDF flavour of [`Jbig2Encoder::flush_pdf`]: the stream
/// for the `JBIG2Globals` object and one stream per page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jbig2EncodeResult {
    /// Shared symbol dictionary, if any symbols are shared
    pub global_data: Option<Vec<u8>>,
    /// One embedded stream per page, in page order
    pub pages: Vec<Vec<u8>>,
}

impl Jbig2EncodeResult {
    /// Stream of the first page, empty if there are no pages.
    pub fn page_data(&self) -> &[u8] {
        self.pages.first().map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone)]
struct PageData {
    image: BitImage,
    placements: Vec<Placement>,
}

/// Which dictionary each symbol class is written to.
#[derive(Debug)]
struct DictionaryPlan {
    /// Class IDs of the shared dictionary, in input order
    global_classes: Vec<usize>,
    global: Option<EncodedDictionary>,
    /// Class IDs coded in each page's own dictionary
    local_classes: Vec<Vec<usize>>,
}

/// Accumulates pages and writes them out on [`flush`](Self::flush).
#[derive(Debug, Clone)]
pub struct Jbig2Encoder {
    config: Jbig2Config,
    classifier: Option<SymbolClassifier>,
    pages: Vec<PageData>,
}

impl Jbig2Encoder {
    /// Creates an encoder after validating `config`.
    pub fn new(config: &Jbig2Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            classifier: Self::new_classifier(config)?,
            pages: Vec::new(),
        })
    }

    fn new_classifier(config: &Jbig2Config) -> Result<Option<SymbolClassifier>> {
        if config.symbol_mode {
            Ok(Some(SymbolClassifier::new(config.classifier.clone())?))
        } else {
            Ok(None)
        }
    }

    pub fn config(&self) -> &Jbig2Config {
        &self.config
    }

    /// Number of pages added since the last flush.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// True while pages are coded with symbols. Turns false for the rest of
    /// the document once the classifier runs out of room.
    pub fn uses_symbols(&self) -> bool {
        self.classifier.is_some()
    }

    /// Symbol classes found so far, in symbol mode.
    pub fn dictionary(&self) -> Option<&SymbolDictionary> {
        self.classifier.as_ref().map(SymbolClassifier::dictionary)
    }

    /// Symbol placements of page `page` (0-based).
    pub fn placements(&self, page: usize) -> Option<&[Placement]> {
        self.pages.get(page).map(|p| p.placements.as_slice())
    }

    /// Adds a page. In symbol mode its components are classified right away.
    pub fn add_page(&mut self, image: &BitImage) -> Result<()> {
        let page = self.pages.len();
        let mut placements = Vec::new();

        if let Some(classifier) = self.classifier.as_mut() {
            let components = find_connected_components(image, MIN_COMPONENT_SIZE)?;
            match classifier.classify_all(&components, page) {
                Ok(found) => placements = found,
                Err(Jbig2Error::DictionaryFull { limit }) => {
                    warn!(
                        "symbol limit {} reached on page {}; coding the document with generic regions",
                        limit, page
                    );
                    self.classifier = None;
                    for p in &mut self.pages {
                        p.placements.clear();
                    }
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "added page {}: {}x{}, {} placements",
            page,
            image.width,
            image.height,
            placements.len()
        );
        self.pages.push(PageData {
            image: image.clone(),
            placements,
        });
        Ok(())
    }

    /// Adds a page given as one byte per pixel, non-zero meaning black.
    pub fn add_page_array(&mut self, image: &Array2<u8>) -> Result<()> {
        let bitimage = array_to_bitimage(image)?;
        self.add_page(&bitimage)
    }

    fn reset(&mut self) -> Result<()> {
        self.pages.clear();
        self.classifier = Self::new_classifier(&self.config)?;
        Ok(())
    }

    /// Writes every added page as one stream and starts over.
    ///
    /// The stream has a file header and an end-of-file segment when
    /// `want_full_headers` is set.
    pub fn flush(&mut self) -> Result<Vec<u8>> {
        info!(
            "encoding {} pages ({} mode)",
            self.pages.len(),
            if self.uses_symbols() { "symbol" } else { "generic" }
        );
        let mut writer = SegmentWriter::new(
            Vec::new(),
            ContainerConfig {
                base_segment_number: self.config.base_segment_number,
                with_file_header: self.config.want_full_headers,
                page_count: Some(usize_to_u32(self.pages.len())),
                ..ContainerConfig::default()
            },
        );

        match self.dictionary() {
            Some(dict) => {
                let plan = self.plan_dictionaries(dict)?;
                let global_number = match plan.global.as_ref() {
                    Some(global) => Some(writer.add_global_segment(
                        SegmentType::SymbolDictionary,
                        global.payload.clone(),
                        &[],
                    )?),
                    None => None,
                };
                for page in 0..self.pages.len() {
                    self.write_symbol_page(&mut writer, page, dict, &plan, global_number)?;
                }
            }
            None => {
                for page in 0..self.pages.len() {
                    self.write_generic_page(&mut writer, page)?;
                }
            }
        }

        let out = writer.finish()?;
        info!("wrote {} bytes", out.len());
        self.reset()?;
        Ok(out)
    }

    /// Writes every added page for PDF embedding and starts over.
    ///
    /// The shared dictionary goes to its own stream. Each page stream is
    /// headerless, numbers its page 1 and continues the segment numbering
    /// of the streams before it, so references to the shared dictionary
    /// stay unambiguous.
    pub fn flush_pdf(&mut self) -> Result<Jbig2EncodeResult> {
        info!("encoding {} pages as PDF streams", self.pages.len());
        let mut result = Jbig2EncodeResult::default();
        let mut next_number = self.config.base_segment_number;

        match self.dictionary() {
            Some(dict) => {
                let plan = self.plan_dictionaries(dict)?;
                let mut global_number = None;
                if let Some(global) = plan.global.as_ref() {
                    let mut writer =
                        SegmentWriter::new(Vec::new(), ContainerConfig::embedded(next_number));
                    global_number = Some(writer.add_global_segment(
                        SegmentType::SymbolDictionary,
                        global.payload.clone(),
                        &[],
                    )?);
                    next_number = writer.next_segment_number();
                    result.global_data = Some(writer.finish()?);
                }
                for page in 0..self.pages.len() {
                    let mut writer =
                        SegmentWriter::new(Vec::new(), ContainerConfig::embedded(next_number));
                    if let Some(number) = global_number {
                        writer.declare_external(number, SegmentType::SymbolDictionary);
                    }
                    self.write_symbol_page(&mut writer, page, dict, &plan, global_number)?;
                    next_number = writer.next_segment_number();
                    result.pages.push(writer.finish()?);
                }
            }
            None => {
                for page in 0..self.pages.len() {
                    let mut writer =
                        SegmentWriter::new(Vec::new(), ContainerConfig::embedded(next_number));
                    self.write_generic_page(&mut writer, page)?;
                    next_number = writer.next_segment_number();
                    result.pages.push(writer.finish()?);
                }
            }
        }

        self.reset()?;
        Ok(result)
    }

    /// Classes used on more than one page are shared. With a single page
    /// everything is shared, so the page needs no dictionary of its own.
    fn plan_dictionaries(&self, dict: &SymbolDictionary) -> Result<DictionaryPlan> {
        let single_page = self.pages.len() == 1;
        let mut global_classes = Vec::new();
        let mut local_classes = vec![Vec::new(); self.pages.len()];
        for class in dict.classes() {
            if single_page || class.pages.len() > 1 {
                global_classes.push(class.id);
            } else if let Some(&page) = class.pages.iter().next() {
                local_classes[page].push(class.id);
            }
        }

        let global = if global_classes.is_empty() {
            None
        } else {
            Some(encode_symbol_dictionary(
                &exemplars_of(dict, &global_classes),
                &self.config.symbol_dict,
            )?)
        };
        debug!(
            "{} shared symbols, {} page-local symbols",
            global_classes.len(),
            local_classes.iter().map(Vec::len).sum::<usize>()
        );
        Ok(DictionaryPlan {
            global_classes,
            global,
            local_classes,
        })
    }

    fn page_info(&self, image: &BitImage, lossless: bool) -> PageInfo {
        let ppm = dpi_to_ppm(self.config.dpi);
        PageInfo {
            width: usize_to_u32(image.width),
            height: usize_to_u32(image.height),
            xres: ppm,
            yres: ppm,
            is_lossless: lossless,
            ..PageInfo::default()
        }
    }

    fn write_generic_region<W: Write>(
        &self,
        writer: &mut SegmentWriter<W>,
        image: &BitImage,
    ) -> Result<()> {
        let generic = &self.config.generic;
        let region = RegionInfo::full_page(usize_to_u32(image.width), usize_to_u32(image.height));
        let mut payload = Vec::new();
        generic.params(region).write_into(&mut payload)?;
        payload.extend(encode_generic_payload(image, generic)?);
        let number = writer.add_segment(SegmentType::ImmediateGenericRegion, payload, &[])?;
        trace!("generic region segment {}", number);
        Ok(())
    }

    fn write_generic_page<W: Write>(&self, writer: &mut SegmentWriter<W>, page: usize) -> Result<()> {
        let image = &self.pages[page].image;
        writer.begin_page_with(&self.page_info(image, true))?;
        self.write_generic_region(writer, image)?;
        writer.end_page()?;
        Ok(())
    }

    fn write_symbol_page<W: Write>(
        &self,
        writer: &mut SegmentWriter<W>,
        page: usize,
        dict: &SymbolDictionary,
        plan: &DictionaryPlan,
        global_number: Option<u32>,
    ) -> Result<()> {
        let data = &self.pages[page];
        let lossless = self.config.classifier.exact_match;
        writer.begin_page_with(&self.page_info(&data.image, lossless))?;

        let mut referred = Vec::with_capacity(2);
        let mut symbol_ids = vec![u32::MAX; dict.len()];
        let mut symbol_sizes = Vec::new();

        if let (Some(number), Some(global)) = (global_number, plan.global.as_ref()) {
            referred.push(number);
            assign_ids(
                dict,
                &plan.global_classes,
                &global.order,
                &mut symbol_ids,
                &mut symbol_sizes,
            );
        }

        let local_classes = &plan.local_classes[page];
        if !local_classes.is_empty() {
            let EncodedDictionary { payload, order, .. } = encode_symbol_dictionary(
                &exemplars_of(dict, local_classes),
                &self.config.symbol_dict,
            )?;
            referred.push(writer.add_segment(SegmentType::SymbolDictionary, payload, &[])?);
            assign_ids(dict, local_classes, &order, &mut symbol_ids, &mut symbol_sizes);
        }

        if referred.is_empty() {
            // Blank page of a document without any symbols.
            self.write_generic_region(writer, &data.image)?;
        } else {
            let region = TextRegionConfig {
                log_strips: self.config.log_strips,
                ..TextRegionConfig::new(usize_to_u32(data.image.width), usize_to_u32(data.image.height))
            };
            let payload =
                encode_text_region(&data.placements, &symbol_ids, &symbol_sizes, &region)?;
            let number = writer.add_segment(SegmentType::ImmediateTextRegion, payload, &referred)?;
            trace!(
                "page {}: text region segment {} with {} instances, refers to {:?}",
                page,
                number,
                data.placements.len(),
                referred
            );
        }

        writer.end_page()?;
        Ok(())
    }
}

fn exemplars_of<'d>(dict: &'d SymbolDictionary, classes: &[usize]) -> Vec<&'d BitImage> {
    classes
        .iter()
        .filter_map(|&id| dict.get(id))
        .map(|c| &c.exemplar)
        .collect()
}

/// Gives the classes of one dictionary consecutive IDs after those already
/// assigned. `order[k]` is the position in `classes` exported as ID `k`.
fn assign_ids(
    dict: &SymbolDictionary,
    classes: &[usize],
    order: &[usize],
    symbol_ids: &mut [u32],
    symbol_sizes: &mut Vec<(u32, u32)>,
) {
    for &input in order {
        let class_id = classes[input];
        if let Some(class) = dict.get(class_id) {
            symbol_ids[class_id] = usize_to_u32(symbol_sizes.len());
            symbol_sizes.push((
                usize_to_u32(class.exemplar.width),
                usize_to_u32(class.exemplar.height),
            ));
        }
    }
}

/// Encodes `images` as one standalone (or headerless, per `config`) stream.
pub fn encode_document(images: &[Array2<u8>], config: &Jbig2Config) -> Result<Vec<u8>> {
    let mut encoder = Jbig2Encoder::new(config)?;
    for image in images {
        encoder.add_page_array(image)?;
    }
    encoder.flush()
}
