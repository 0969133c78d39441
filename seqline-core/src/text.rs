//! Text measurement contract and the built-in estimator.
//!
//! The layout engine never measures text itself; it talks to a
//! [`TextMeasure`] collaborator. Measurement must be deterministic for
//! identical inputs, and implementations backed by a real text surface can
//! use [`TextMeasure::expect_measure`] to lay out many strings in one batch
//! before any query is answered.

use std::collections::HashMap;

/// Measured extent of a text block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Font settings a measurement (and a text primitive) depends on
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FontStyle {
    pub family: String,
    pub size: f64,
    pub weight: u16,
    /// Line height as a multiple of the font size
    pub line_height: f64,
}

impl FontStyle {
    pub fn new(family: impl Into<String>, size: f64) -> Self {
        FontStyle {
            family: family.into(),
            size,
            weight: 400,
            line_height: 1.3,
        }
    }

    pub fn bold(family: impl Into<String>, size: f64) -> Self {
        FontStyle {
            family: family.into(),
            size,
            weight: 700,
            line_height: 1.3,
        }
    }

    /// Stable key identifying every attribute a measurement depends on
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.family, self.size, self.weight, self.line_height
        )
    }
}

/// Text-sizing collaborator used by the layout engine
pub trait TextMeasure {
    /// Pre-declare a string that will be measured soon, so batched
    /// implementations can size many strings in one pass
    fn expect_measure(&mut self, _font: &FontStyle, _text: &str) {}

    fn measure(&mut self, font: &FontStyle, text: &str) -> Size;

    fn measure_height(&mut self, font: &FontStyle, text: &str) -> f64 {
        self.measure(font, text).height
    }
}

/// Deterministic width estimator based on weighted character classes.
///
/// Uppercase and wide punctuation count 0.7em, most ASCII counts 0.5em,
/// anything else (CJK etc.) a full em.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharMetrics;

fn char_weight(c: char) -> f64 {
    if c.is_ascii() {
        if c.is_uppercase() || matches!(c, 'm' | 'w' | '@') {
            0.7
        } else if matches!(c, 'i' | 'j' | 'l' | '.' | ',' | '\'' | '|' | '!') {
            0.3
        } else {
            0.5
        }
    } else {
        1.0
    }
}

impl TextMeasure for CharMetrics {
    fn measure(&mut self, font: &FontStyle, text: &str) -> Size {
        if text.is_empty() {
            return Size {
                width: 0.0,
                height: 0.0,
            };
        }
        let mut width = 0.0_f64;
        let mut lines = 0usize;
        for line in text.split('\n') {
            lines += 1;
            let w: f64 = line.chars().map(char_weight).sum();
            width = width.max(w * font.size);
        }
        Size {
            width,
            height: lines as f64 * font.size * font.line_height,
        }
    }
}

/// Caches measurements keyed by `(font, text)`.
///
/// The cache must be invalidated when the rendering surface changes (a
/// font finishing loading, for example), never merely because diagram
/// content changed.
#[derive(Debug)]
pub struct MeasureCache<M> {
    inner: M,
    cache: HashMap<(String, String), Size>,
}

impl<M: TextMeasure> MeasureCache<M> {
    pub fn new(inner: M) -> Self {
        MeasureCache {
            inner,
            cache: HashMap::new(),
        }
    }

    /// Drop every cached measurement
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl<M: TextMeasure> TextMeasure for MeasureCache<M> {
    fn expect_measure(&mut self, font: &FontStyle, text: &str) {
        let key = (font.cache_key(), text.to_string());
        if !self.cache.contains_key(&key) {
            self.inner.expect_measure(font, text);
            let size = self.inner.measure(font, text);
            self.cache.insert(key, size);
        }
    }

    fn measure(&mut self, font: &FontStyle, text: &str) -> Size {
        let key = (font.cache_key(), text.to_string());
        if let Some(size) = self.cache.get(&key) {
            return *size;
        }
        let size = self.inner.measure(font, text);
        self.cache.insert(key, size);
        size
    }
}
