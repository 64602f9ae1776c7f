//! Greedy symbol classification: each connected component either joins the
//! first existing class it matches or starts a new one.
//!
//! The scan over classes is a plain linear pass in ascending class ID, and
//! the first class whose score reaches the threshold wins even if a later
//! class would score higher. Adding classes never changes where earlier
//! components went.

use log::debug;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::jbig2comparator::{Comparator, GlyphStats};
use crate::jbig2structs::ClassifierConfig;
use crate::jbig2sym::{compute_glyph_hash, BitImage, ConnectedComponent};
use crate::{Jbig2Error, Result};

/// One component instance on a page: which class it belongs to and where
/// the top-left pixel of the class exemplar goes so that it covers the
/// component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub class_id: usize,
    pub x: u32,
    pub y: u32,
}

/// Per-pixel vote counts over the same-size members of a class.
#[derive(Debug, Clone)]
struct VoteAccumulator {
    width: usize,
    height: usize,
    votes: Vec<u32>,
    members: u32,
}

impl VoteAccumulator {
    fn new(seed: &BitImage) -> Self {
        let mut acc = Self {
            width: seed.width,
            height: seed.height,
            votes: vec![0; seed.width * seed.height],
            members: 0,
        };
        acc.add(seed);
        acc
    }

    fn accepts(&self, image: &BitImage) -> bool {
        image.width == self.width && image.height == self.height
    }

    fn add(&mut self, image: &BitImage) {
        for y in 0..self.height {
            for x in 0..self.width {
                if image.get_usize(x, y) {
                    self.votes[y * self.width + x] += 1;
                }
            }
        }
        self.members += 1;
    }

    /// Pixels set by more than half of the members.
    fn majority(&self) -> Result<BitImage> {
        let width = self.width;
        BitImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            self.votes[y * width + x] * 2 > self.members
        })
    }
}

/// A class of visually equivalent components.
#[derive(Debug, Clone)]
pub struct SymbolClass {
    /// 0-based ID, in allocation order
    pub id: usize,
    /// The bitmap written to the dictionary
    pub exemplar: BitImage,
    /// Number of placements assigned to the class
    pub usage: usize,
    /// Pages with at least one placement of the class
    pub pages: BTreeSet<usize>,
    stats: GlyphStats,
    votes: Option<VoteAccumulator>,
}

/// All classes found so far.
#[derive(Debug, Clone, Default)]
pub struct SymbolDictionary {
    classes: Vec<SymbolClass>,
}

impl SymbolDictionary {
    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True before the first class is allocated.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class `id`, if allocated.
    pub fn get(&self, id: usize) -> Option<&SymbolClass> {
        self.classes.get(id)
    }

    /// All classes in ID order.
    pub fn classes(&self) -> &[SymbolClass] {
        &self.classes
    }

    /// Exemplars in class ID order.
    pub fn exemplars(&self) -> Vec<&BitImage> {
        self.classes.iter().map(|c| &c.exemplar).collect()
    }
}

/// Single-pass classifier shared by every page of a document.
#[derive(Debug, Clone)]
pub struct SymbolClassifier {
    config: ClassifierConfig,
    comparator: Comparator,
    dictionary: SymbolDictionary,
    /// Exact mode only: glyph hash to class IDs
    buckets: FxHashMap<u64, Vec<usize>>,
}

impl SymbolClassifier {
    /// Creates an empty classifier after validating `config`.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            comparator: Comparator,
            dictionary: SymbolDictionary::default(),
            buckets: FxHashMap::default(),
        })
    }

    /// Settings the classifier was created with.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classes found so far.
    pub fn dictionary(&self) -> &SymbolDictionary {
        &self.dictionary
    }

    /// Consumes the classifier, keeping its classes.
    pub fn into_dictionary(self) -> SymbolDictionary {
        self.dictionary
    }

    fn find_exact(&self, image: &BitImage, hash: u64) -> Option<usize> {
        self.buckets
            .get(&hash)?
            .iter()
            .copied()
            .find(|&id| self.dictionary.classes[id].exemplar == *image)
    }

    /// First class scoring at least the threshold, with the shift that
    /// lines `image` up with its exemplar.
    fn find_similar(&self, image: &BitImage, stats: &GlyphStats) -> Option<(usize, (i32, i32))> {
        let delta = self.config.max_size_delta as usize;
        let class = self
            .dictionary
            .classes
            .iter()
            .filter(|c| {
                c.exemplar.width.abs_diff(image.width) <= delta
                    && c.exemplar.height.abs_diff(image.height) <= delta
            })
            .find(|c| {
                self.comparator
                    .score_with_stats(&c.exemplar, &c.stats, image, stats)
                    >= self.config.threshold
            })?;

        // The centroid shift is refined to the nearby shift with the fewest
        // mismatching pixels.
        let centroid = Comparator::centroid_shift(&class.stats, stats);
        let shift = self
            .comparator
            .distance_around(&class.exemplar, image, centroid, u32::MAX)
            .map_or(centroid, |(_, dx, dy)| (dx, dy));
        Some((class.id, shift))
    }

    /// Assigns `component`, found on page `page`, to a class.
    ///
    /// Fails with [`Jbig2Error::DictionaryFull`] if a new class is needed
    /// and the configured limit is reached; the classifier is left as it was.
    pub fn classify(&mut self, component: &ConnectedComponent, page: usize) -> Result<Placement> {
        let image = &component.image;
        let stats = GlyphStats::of(image);
        let hash = compute_glyph_hash(image);

        let found = if self.config.exact_match {
            self.find_exact(image, hash).map(|id| (id, (0, 0)))
        } else {
            self.find_similar(image, &stats)
        };

        let (class_id, (dx, dy)) = match found {
            Some((id, shift)) => {
                let class = &mut self.dictionary.classes[id];
                class.usage += 1;
                class.pages.insert(page);
                if let Some(acc) = class.votes.as_mut() {
                    if acc.accepts(image) {
                        acc.add(image);
                        class.exemplar = acc.majority()?;
                        class.stats = GlyphStats::of(&class.exemplar);
                    }
                }
                (id, shift)
            }
            None => {
                if let Some(limit) = self.config.max_symbols {
                    if self.dictionary.len() >= limit {
                        return Err(Jbig2Error::DictionaryFull { limit });
                    }
                }
                let id = self.dictionary.len();
                let votes = self
                    .config
                    .refine_exemplars
                    .then(|| VoteAccumulator::new(image));
                self.dictionary.classes.push(SymbolClass {
                    id,
                    exemplar: image.clone(),
                    usage: 1,
                    pages: BTreeSet::from([page]),
                    stats,
                    votes,
                });
                if self.config.exact_match {
                    self.buckets.entry(hash).or_default().push(id);
                }
                (id, (0, 0))
            }
        };

        // Exemplar pixel (x, y) covers component pixel (x + dx, y + dy).
        Ok(Placement {
            class_id,
            x: component.x.saturating_add_signed(dx),
            y: component.y.saturating_add_signed(dy),
        })
    }

    /// Classifies every component of page `page` in order.
    pub fn classify_all(
        &mut self,
        components: &[ConnectedComponent],
        page: usize,
    ) -> Result<Vec<Placement>> {
        let placements = components
            .iter()
            .map(|c| self.classify(c, page))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "page {}: {} components, {} classes so far",
            page,
            placements.len(),
            self.dictionary.len()
        );
        Ok(placements)
    }
}
