//! Symbol dictionary (T.88 6.5) and text region (T.88 6.4) payloads, both
//! arithmetic coded with SDHUFF = SBHUFF = 0 and no refinement.

use log::debug;

use crate::jbig2arith::{ContextTable, IntProc, IntegerContexts, Jbig2ArithCoder};
use crate::jbig2classify::Placement;
use crate::jbig2generic::{context_size, encode_generic_region};
use crate::jbig2shared::{log2up, usize_to_u32};
use crate::jbig2structs::{
    RegionInfo, SymbolDictConfig, SymbolDictParams, TextRegionConfig, TextRegionParams,
    REF_CORNER_TOPLEFT,
};
use crate::jbig2sym::{sort_symbols_for_dictionary, BitImage};
use crate::{Jbig2Error, Result};

/// A coded symbol dictionary segment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDictionary {
    /// Segment data: header followed by the arithmetic coded symbols.
    pub payload: Vec<u8>,
    /// `order[k]` is the input index of the symbol exported as ID `k`.
    pub order: Vec<usize>,
    /// `code_of[i]` is the exported ID of input symbol `i`.
    pub code_of: Vec<u32>,
}

impl EncodedDictionary {
    /// Number of exported symbols.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if no symbol is exported.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Codes `symbols` as a symbol dictionary that exports all of them.
///
/// Symbols are coded in height classes of ascending height, ascending width
/// inside a class; the coded position of a symbol is its exported ID.
pub fn encode_symbol_dictionary(
    symbols: &[&BitImage],
    config: &SymbolDictConfig,
) -> Result<EncodedDictionary> {
    if symbols.is_empty() {
        return Err(Jbig2Error::EmptyDictionary);
    }
    config.validate()?;

    let count = usize_to_u32(symbols.len());
    let mut payload = Vec::new();
    SymbolDictParams {
        sd_template: config.template,
        at: config.at_pixels.clone(),
        exsyms: count,
        newsyms: count,
    }
    .write_into(&mut payload)?;

    let mut coder = Jbig2ArithCoder::new();
    let mut int_ctx = IntegerContexts::new();
    let mut gb_stats = ContextTable::new(context_size(config.template));
    let mut order = Vec::with_capacity(symbols.len());

    let mut prev_height = 0i32;
    for class in sort_symbols_for_dictionary(symbols) {
        let height = symbols[class[0]].height as i32;
        coder.encode_integer(&mut int_ctx, IntProc::Iadh, height - prev_height)?;
        prev_height = height;

        let mut prev_width = 0i32;
        for index in class {
            let symbol = symbols[index];
            let width = symbol.width as i32;
            coder.encode_integer(&mut int_ctx, IntProc::Iadw, width - prev_width)?;
            prev_width = width;
            encode_generic_region(
                &mut coder,
                &mut gb_stats,
                symbol,
                config.template,
                &config.at_pixels,
                false,
            )?;
            order.push(index);
        }
        coder.encode_oob(&mut int_ctx, IntProc::Iadw);
    }

    // Export flags: a run of 0 symbols not exported, then all of them.
    coder.encode_integer(&mut int_ctx, IntProc::Iaex, 0)?;
    coder.encode_integer(&mut int_ctx, IntProc::Iaex, count as i32)?;
    coder.flush();
    payload.extend_from_slice(coder.as_bytes());

    let mut code_of = vec![0u32; symbols.len()];
    for (code, &index) in order.iter().enumerate() {
        code_of[index] = usize_to_u32(code);
    }

    debug!(
        "symbol dictionary: {} symbols, {} bytes",
        symbols.len(),
        payload.len()
    );
    Ok(EncodedDictionary {
        payload,
        order,
        code_of,
    })
}

/// Codes a text region placing dictionary symbols on the page.
///
/// `symbol_ids[class]` maps a placement's class to its ID among the
/// symbols available to the region (the concatenated exports of the
/// referred dictionaries), and `symbol_sizes[id]` gives that symbol's
/// `(width, height)`.
pub fn encode_text_region(
    placements: &[Placement],
    symbol_ids: &[u32],
    symbol_sizes: &[(u32, u32)],
    config: &TextRegionConfig,
) -> Result<Vec<u8>> {
    config.validate()?;
    let num_symbols = usize_to_u32(symbol_sizes.len());

    // Every ID is checked before any coding starts.
    let mut instances = Vec::with_capacity(placements.len());
    for p in placements {
        let id = symbol_ids
            .get(p.class_id)
            .copied()
            .filter(|&id| id < num_symbols)
            .ok_or(Jbig2Error::UnknownSymbol {
                id: usize_to_u32(p.class_id),
                size: num_symbols,
            })?;
        instances.push((p.x, p.y, id));
    }

    let log_strips = config.log_strips;
    let strips = 1u32 << log_strips;
    let strip_of = |y: u32| (y >> log_strips) << log_strips;
    instances.sort_by_key(|&(x, y, _)| (strip_of(y), x));

    let mut payload = Vec::new();
    TextRegionParams {
        region: RegionInfo {
            comb_operator: config.comb_op,
            ..RegionInfo::full_page(config.width, config.height)
        },
        log_strips,
        ref_corner: REF_CORNER_TOPLEFT,
        transposed: false,
        comb_op: config.comb_op,
        default_pixel: config.default_pixel,
        ds_offset: 0,
        num_instances: usize_to_u32(instances.len()),
    }
    .write_into(&mut payload)?;

    let code_len = log2up(num_symbols);
    let mut coder = Jbig2ArithCoder::new();
    let mut int_ctx = IntegerContexts::new();
    let mut iaid_ctx = ContextTable::for_iaid(code_len);

    coder.encode_integer(&mut int_ctx, IntProc::Iadt, 0)?;

    let mut strip_t = 0i64;
    let mut first_s = 0i64;
    let mut i = 0;
    while i < instances.len() {
        let this_strip = i64::from(strip_of(instances[i].1));
        let dt = delta((this_strip - strip_t) / i64::from(strips))?;
        coder.encode_integer(&mut int_ctx, IntProc::Iadt, dt)?;
        strip_t = this_strip;

        let mut cur_s = 0i64;
        let mut first = true;
        while i < instances.len() && i64::from(strip_of(instances[i].1)) == this_strip {
            let (x, y, id) = instances[i];
            let x = i64::from(x);
            if first {
                coder.encode_integer(&mut int_ctx, IntProc::Iafs, delta(x - first_s)?)?;
                first_s = x;
                first = false;
            } else {
                coder.encode_integer(&mut int_ctx, IntProc::Iads, delta(x - cur_s)?)?;
            }
            if strips > 1 {
                let t = delta(i64::from(y) - this_strip)?;
                coder.encode_integer(&mut int_ctx, IntProc::Iait, t)?;
            }
            coder.encode_iaid(&mut iaid_ctx, code_len, id);

            let width = i64::from(symbol_sizes[id as usize].0);
            cur_s = x + width - 1;
            i += 1;
        }
        coder.encode_oob(&mut int_ctx, IntProc::Iads);
    }

    coder.flush();
    payload.extend_from_slice(coder.as_bytes());
    debug!(
        "text region: {} instances over {} symbols, {} bytes",
        instances.len(),
        num_symbols,
        payload.len()
    );
    Ok(payload)
}

fn delta(v: i64) -> Result<i32> {
    i32::try_from(v).map_err(|_| Jbig2Error::IntegerOutOfRange { value: v })
}
