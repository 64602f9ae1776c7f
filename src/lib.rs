//! JBIG2 Encoder in Rust
//!
//! This crate encodes bi-level images as JBIG2 (ITU-T T.88) streams. Pages
//! are coded either as generic regions (lossless) or as symbol dictionaries
//! plus text regions, and written either as standalone files or as
//! headerless fragments for PDF embedding with a separate globals stream.

// Re-export commonly used types
pub use ndarray::Array2;

use thiserror::Error;

/// Errors that can occur during JBIG2 encoding
#[derive(Error, Debug)]
pub enum Jbig2Error {
    /// Bitmap dimensions or contents cannot be coded
    #[error("Invalid bitmap: {0}")]
    InvalidBitmap(String),

    /// Input buffer size mismatch
    #[error("Input buffer size mismatch: expected {expected}, got {actual} for {width}x{height} image")]
    BufferSizeMismatch {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
    },

    /// Packed binary data detected when unpacked expected
    #[error("Input appears to be packed binary data (1 bit per pixel), but the encoder expects unpacked data (1 byte per pixel)")]
    PackedDataDetected,

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An integer does not fit the arithmetic integer coder
    #[error("Integer {value} is outside the codable range")]
    IntegerOutOfRange { value: i64 },

    /// A text region placement names a symbol no referred dictionary has
    #[error("Symbol {id} is not among the {size} available symbols")]
    UnknownSymbol { id: u32, size: u32 },

    /// A symbol dictionary must contain at least one symbol
    #[error("Symbol dictionary is empty")]
    EmptyDictionary,

    /// The classifier reached its class limit
    #[error("Symbol dictionary is full ({limit} symbols)")]
    DictionaryFull { limit: usize },

    /// A text region refers to no symbol dictionary
    #[error("Text region does not refer to a symbol dictionary")]
    MissingDictionaryReference,

    /// A segment refers to one that has not been written
    #[error("Segment {number} is referred to before it was written")]
    UnknownSegment { number: u32 },

    /// Pages were opened, closed or written to out of order
    #[error("Page state error: {0}")]
    PageState(String),

    /// Malformed PBM input
    #[error("PBM error: {0}")]
    Pbm(String),

    /// Array shape error during conversion
    #[error("Array shape error")]
    ArrayShape(#[from] ndarray::ShapeError),

    /// Writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Jbig2Error>;

// Module declarations
pub mod jbig2arith;
pub mod jbig2buf;
pub mod jbig2classify;
pub mod jbig2comparator;
pub mod jbig2container;
pub mod jbig2dict;
pub mod jbig2enc;
pub mod jbig2generic;
pub mod jbig2lutz;
pub mod jbig2shared;
pub mod jbig2structs;
pub mod jbig2sym;

// Re-export the main encode functions and config
pub use crate::jbig2arith::Jbig2ArithCoder;
pub use jbig2enc::{encode_document, Jbig2EncodeResult, Jbig2Encoder};
pub use jbig2structs::Jbig2Config;
pub use jbig2sym::BitImage;

use log::info;

fn check_unpacked_input(input: &[u8], width: u32, height: u32) -> Result<()> {
    let expected = width as usize * height as usize;
    if input.len() == expected {
        return Ok(());
    }
    // Packed data has one bit per pixel, rows padded to whole bytes.
    let packed_size = (width as usize).div_ceil(8) * height as usize;
    if input.len() == packed_size {
        return Err(Jbig2Error::PackedDataDetected);
    }
    Err(Jbig2Error::BufferSizeMismatch {
        expected,
        actual: input.len(),
        width,
        height,
    })
}

/// Encodes one image given as one byte per pixel (non-zero is black).
///
/// In PDF mode the result holds a globals stream and one page stream; in
/// standalone mode its single page stream is a complete JBIG2 file.
pub fn encode_single_image(
    input: &[u8],
    width: u32,
    height: u32,
    pdf_mode: bool,
) -> Result<Jbig2EncodeResult> {
    encode_single_image_with(input, width, height, pdf_mode, &Jbig2Config::default())
}

/// Encodes a single image with generic region coding only, so the result
/// never carries a globals stream.
pub fn encode_single_image_lossless(
    input: &[u8],
    width: u32,
    height: u32,
    pdf_mode: bool,
) -> Result<Jbig2EncodeResult> {
    encode_single_image_with(input, width, height, pdf_mode, &Jbig2Config::generic_only())
}

fn encode_single_image_with(
    input: &[u8],
    width: u32,
    height: u32,
    pdf_mode: bool,
    config: &Jbig2Config,
) -> Result<Jbig2EncodeResult> {
    check_unpacked_input(input, width, height)?;
    let array = Array2::from_shape_vec((height as usize, width as usize), input.to_vec())?;
    let (global_data, pages) = encode_rois(std::slice::from_ref(&array), config, pdf_mode)?;
    Ok(Jbig2EncodeResult { global_data, pages })
}

/// Encodes a list of binary ROIs (0/255 or 0/1 values) as pages of one
/// document.
///
/// Returns the globals stream (PDF mode with shared symbols only) and the
/// page streams: one per ROI in PDF mode, a single complete file otherwise.
pub fn encode_rois(
    rois: &[Array2<u8>],
    config: &Jbig2Config,
    pdf_mode: bool,
) -> Result<(Option<Vec<u8>>, Vec<Vec<u8>>)> {
    if rois.is_empty() {
        return Ok((None, Vec::new()));
    }

    info!("Processing {} ROIs in PDF mode: {}", rois.len(), pdf_mode);

    let mut encoder = Jbig2Encoder::new(config)?;
    for roi in rois {
        encoder.add_page_array(roi)?;
    }

    if pdf_mode {
        let result = encoder.flush_pdf()?;
        Ok((result.global_data, result.pages))
    } else {
        Ok((None, vec![encoder.flush()?]))
    }
}

/// Get the version string for the crate
pub fn get_version() -> String {
    format!("jbig2enc-core {}", env!("CARGO_PKG_VERSION"))
}

/// Get the build information string: timestamp, profile and any tracing
/// features compiled in.
pub fn get_build_info() -> String {
    let build_ts = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown");
    let build_type = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };
    match option_env!("JBIG2_TRACE_FEATURES").unwrap_or("") {
        "" => format!("{} (built with {})", build_ts, build_type),
        traces => format!("{} (built with {}, tracing: {})", build_ts, build_type, traces),
    }
}
