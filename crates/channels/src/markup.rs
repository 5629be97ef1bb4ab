//! Markup codec: model output with `**bold**`, `*italic*`, `` `code` ``, fenced code blocks
//! and `#N` custom-emoji tags becomes plain text plus style spans.
//!
//! Offsets and lengths are UTF-16 code units, the platform's native entity addressing.
//! Code contents are copied verbatim. Emphasis never contains another span: an emoji or a
//! code span inside bold splits the bold into disjoint pieces around it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpanKind {
    Bold,
    Italic,
    Code,
    CodeBlock { language: Option<String> },
    CustomEmoji { document_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattingSpan {
    #[serde(flatten)]
    pub kind: SpanKind,
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FormattedText {
    pub text: String,
    pub spans: Vec<FormattingSpan>,
}

impl FormattedText {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            spans: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiAsset {
    pub document_id: i64,
    /// Fallback glyph placed in the text under the custom emoji span.
    pub glyph: String,
}

/// Tag number → custom emoji asset.
#[derive(Debug, Clone, Default)]
pub struct EmojiMap {
    tags: HashMap<u32, EmojiAsset>,
}

impl EmojiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from a catalog in display order; tags are 1-based positions.
    pub fn from_catalog<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        let mut map = Self::new();
        for (idx, (document_id, glyph)) in entries.into_iter().enumerate() {
            map.insert(idx as u32 + 1, document_id, &glyph);
        }
        map
    }

    pub fn insert(&mut self, tag: u32, document_id: i64, glyph: &str) {
        self.tags.insert(tag, EmojiAsset {
            document_id,
            glyph: glyph.to_string(),
        });
    }

    pub fn get(&self, tag: u32) -> Option<&EmojiAsset> {
        self.tags.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

pub fn render(input: &str, emoji: &EmojiMap) -> FormattedText {
    Renderer::new(input, emoji).run()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Emphasis {
    Bold,
    Italic,
}

impl Emphasis {
    fn marker_len(self) -> usize {
        match self {
            Emphasis::Bold => 2,
            Emphasis::Italic => 1,
        }
    }

    fn kind(self) -> SpanKind {
        match self {
            Emphasis::Bold => SpanKind::Bold,
            Emphasis::Italic => SpanKind::Italic,
        }
    }
}

struct OpenEmphasis {
    style: Emphasis,
    /// UTF-16 offset where the current piece started.
    start: usize,
    /// Char index of the closing marker in the source.
    close_at: usize,
}

struct Renderer<'a> {
    src: Vec<char>,
    emoji: &'a EmojiMap,
    out: String,
    pos: usize,
    spans: Vec<FormattingSpan>,
    open: Option<OpenEmphasis>,
}

impl<'a> Renderer<'a> {
    fn new(input: &str, emoji: &'a EmojiMap) -> Self {
        Self {
            src: input.chars().collect(),
            emoji,
            out: String::with_capacity(input.len()),
            pos: 0,
            spans: Vec::new(),
            open: None,
        }
    }

    fn run(mut self) -> FormattedText {
        let mut i = 0;
        while i < self.src.len() {
            if let Some(open) = &self.open {
                if i == open.close_at {
                    let skip = open.style.marker_len();
                    self.close_emphasis();
                    i += skip;
                    continue;
                }
            }
            i = match self.src[i] {
                '`' => self.code(i),
                '*' => self.emphasis(i),
                '#' => self.emoji_tag(i),
                c => {
                    self.push_char(c);
                    i + 1
                }
            };
        }
        self.spans.sort_by_key(|s| s.offset);
        FormattedText {
            text: self.out,
            spans: self.spans,
        }
    }

    fn push_char(&mut self, c: char) {
        self.out.push(c);
        self.pos += c.len_utf16();
    }

    fn push_span(&mut self, kind: SpanKind, offset: usize) {
        let length = self.pos - offset;
        if length > 0 {
            self.spans.push(FormattingSpan { kind, offset, length });
        }
    }

    fn starts_with(&self, i: usize, pat: &str) -> bool {
        let mut idx = i;
        for c in pat.chars() {
            if self.src.get(idx) != Some(&c) {
                return false;
            }
            idx += 1;
        }
        true
    }

    /// Searches `[from, limit)` for `pat`; `limit` is the open emphasis close, if any.
    fn find(&self, from: usize, pat: &str) -> Option<usize> {
        let limit = self.open.as_ref().map(|o| o.close_at).unwrap_or(self.src.len());
        let width = pat.chars().count();
        (from..limit).find(|&j| j + width <= limit && self.starts_with(j, pat))
    }

    /// Ends the current emphasis piece before an embedded span.
    fn suspend_emphasis(&mut self) {
        if let Some(open) = &self.open {
            let (kind, start) = (open.style.kind(), open.start);
            self.push_span(kind, start);
        }
    }

    fn resume_emphasis(&mut self) {
        let pos = self.pos;
        if let Some(open) = self.open.as_mut() {
            open.start = pos;
        }
    }

    fn close_emphasis(&mut self) {
        if let Some(open) = self.open.take() {
            self.push_span(open.style.kind(), open.start);
        }
    }

    fn code(&mut self, i: usize) -> usize {
        if self.starts_with(i, "```") {
            let Some(end) = self.find(i + 3, "```") else {
                return i + 3;
            };
            let mut j = i + 3;
            let lang_start = j;
            while j < end && (self.src[j].is_alphanumeric() || self.src[j] == '_') {
                j += 1;
            }
            let language: String = self.src[lang_start..j].iter().collect();
            if j < end && self.src[j] == '\n' {
                j += 1;
            }
            let kind = SpanKind::CodeBlock {
                language: (!language.is_empty()).then_some(language),
            };
            self.verbatim(j, end, kind);
            return end + 3;
        }

        match self.find(i + 1, "`") {
            Some(end) if end > i + 1 => {
                self.verbatim(i + 1, end, SpanKind::Code);
                end + 1
            }
            _ => i + 1,
        }
    }

    fn verbatim(&mut self, from: usize, to: usize, kind: SpanKind) {
        self.suspend_emphasis();
        let offset = self.pos;
        for idx in from..to {
            let c = self.src[idx];
            self.push_char(c);
        }
        self.push_span(kind, offset);
        self.resume_emphasis();
    }

    fn emphasis(&mut self, i: usize) -> usize {
        if self.src.get(i + 1) == Some(&'*') {
            let close = (i + 2..self.src.len()).find(|&j| self.src[j] == '*');
            match close {
                Some(k) if k > i + 2 && self.src.get(k + 1) == Some(&'*') && self.open.is_none() => {
                    self.open = Some(OpenEmphasis {
                        style: Emphasis::Bold,
                        start: self.pos,
                        close_at: k,
                    });
                }
                _ => {}
            }
            // Unmatched `**` is dropped.
            return i + 2;
        }

        let after_star = i > 0 && self.src[i - 1] == '*';
        let close = (i + 1..self.src.len()).find(|&j| self.src[j] == '*');
        match close {
            Some(k)
                if !after_star
                    && k > i + 1
                    && self.src.get(k + 1) != Some(&'*')
                    && self.open.is_none() =>
            {
                self.open = Some(OpenEmphasis {
                    style: Emphasis::Italic,
                    start: self.pos,
                    close_at: k,
                });
            }
            _ => self.push_literal_star(),
        }
        i + 1
    }

    /// A stray `*` is kept unless it would form `**` with the previous output char.
    fn push_literal_star(&mut self) {
        if !self.out.ends_with('*') {
            self.push_char('*');
        }
    }

    fn emoji_tag(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        while j < self.src.len() && self.src[j].is_ascii_digit() {
            j += 1;
        }
        if j == i + 1 {
            // Markup or a dropped tag right after a lone `#` may be followed by a digit in the
            // output, so the `#` goes too.
            if !matches!(self.src.get(i + 1), Some('*' | '`' | '#')) {
                self.push_char('#');
            }
            return i + 1;
        }

        let digits: String = self.src[i + 1..j].iter().collect();
        let asset = digits.parse::<u32>().ok().and_then(|tag| self.emoji.get(tag)).cloned();
        if let Some(asset) = asset {
            self.suspend_emphasis();
            let offset = self.pos;
            for c in asset.glyph.chars() {
                self.push_char(c);
            }
            self.push_span(SpanKind::CustomEmoji { document_id: asset.document_id }, offset);
            self.resume_emphasis();
        }
        // Unknown tags are dropped.
        j
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star_map() -> EmojiMap {
        let mut map = EmojiMap::new();
        map.insert(1, 5001, "★");
        map.insert(2, 5002, "😀");
        map
    }

    fn span(kind: SpanKind, offset: usize, length: usize) -> FormattingSpan {
        FormattingSpan { kind, offset, length }
    }

    #[test]
    fn test_plain_text_unchanged() {
        for text in ["hello, world", "привет 😀 как дела?", "2*3 = 6", "price: 5 # each", ""] {
            let out = render(text, &EmojiMap::new());
            assert_eq!(out.text, text);
            assert!(out.spans.is_empty(), "unexpected spans for {text:?}");
        }
    }

    #[test]
    fn test_emoji_then_bold_offsets() {
        let out = render("#1 hi **there**", &star_map());
        assert_eq!(out.text, "★ hi there");
        assert_eq!(out.spans, vec![
            span(SpanKind::CustomEmoji { document_id: 5001 }, 0, 1),
            span(SpanKind::Bold, 5, 5),
        ]);
    }

    #[test]
    fn test_surrogate_pairs_count_twice() {
        let out = render("😀 **x**", &EmojiMap::new());
        assert_eq!(out.text, "😀 x");
        assert_eq!(out.spans, vec![span(SpanKind::Bold, 3, 1)]);

        let out = render("#2!", &star_map());
        assert_eq!(out.spans, vec![span(SpanKind::CustomEmoji { document_id: 5002 }, 0, 2)]);
    }

    #[test]
    fn test_code_block_with_language() {
        let out = render("see ```rust\nfn main() {}\n``` ok", &EmojiMap::new());
        assert_eq!(out.text, "see fn main() {}\n ok");
        assert_eq!(out.spans, vec![span(
            SpanKind::CodeBlock { language: Some("rust".to_string()) },
            4,
            13,
        )]);
    }

    #[test]
    fn test_inline_code_is_verbatim() {
        let out = render("run `**x** #1` now", &star_map());
        assert_eq!(out.text, "run **x** #1 now");
        assert_eq!(out.spans, vec![span(SpanKind::Code, 4, 8)]);
    }

    #[test]
    fn test_emoji_inside_bold_splits_bold() {
        let out = render("**a #1 b**", &star_map());
        assert_eq!(out.text, "a ★ b");
        assert_eq!(out.spans, vec![
            span(SpanKind::Bold, 0, 2),
            span(SpanKind::CustomEmoji { document_id: 5001 }, 2, 1),
            span(SpanKind::Bold, 3, 2),
        ]);
    }

    #[test]
    fn test_code_inside_bold_splits_bold() {
        let out = render("**x `y` z**", &EmojiMap::new());
        assert_eq!(out.text, "x y z");
        assert_eq!(out.spans, vec![
            span(SpanKind::Bold, 0, 2),
            span(SpanKind::Code, 2, 1),
            span(SpanKind::Bold, 3, 2),
        ]);
    }

    #[test]
    fn test_italic_and_lone_star() {
        let out = render("*soft* and *", &EmojiMap::new());
        assert_eq!(out.text, "soft and *");
        assert_eq!(out.spans, vec![span(SpanKind::Italic, 0, 4)]);
    }

    #[test]
    fn test_stray_markup_is_removed() {
        let out = render("a ** b ` c #99 d", &EmojiMap::new());
        assert_eq!(out.text, "a  b  c  d");
        assert!(out.spans.is_empty());
    }

    #[test]
    fn test_output_has_no_residual_tags() {
        let inputs = [
            "**bold** and **broken",
            "`open code and #12 tag",
            "```never closed",
            "#1#2#3 **#1** `ok`",
            "mixed *it* **b** #404",
        ];
        for input in inputs {
            let out = render(input, &star_map());
            assert!(!out.text.contains("**"), "{input:?} -> {:?}", out.text);
            assert!(!out.text.contains('`'), "{input:?} -> {:?}", out.text);
            let chars: Vec<char> = out.text.chars().collect();
            for w in chars.windows(2) {
                assert!(!(w[0] == '#' && w[1].is_ascii_digit()), "{input:?} -> {:?}", out.text);
            }
        }
    }

    #[test]
    fn test_code_span_cannot_cross_bold_close() {
        let out = render("**a `b** c`", &EmojiMap::new());
        assert_eq!(out.text, "a b c");
        assert_eq!(out.spans, vec![span(SpanKind::Bold, 0, 3)]);
    }

    #[test]
    fn test_lone_hash_before_markup_is_dropped() {
        assert_eq!(render("#**1**", &star_map()).text, "1");
        assert_eq!(render("#`1`", &star_map()).text, "1");
        assert_eq!(render("##7 1", &star_map()).text, " 1");
        assert_eq!(render("issue # 4", &star_map()).text, "issue # 4");
    }

    #[test]
    fn test_stray_stars_never_pair_up() {
        let out = render("*#9***", &EmojiMap::new());
        assert_eq!(out.text, "*");
    }

    /// Every combination of up to four fragments renders without `**`, backticks or `#<digit>`
    /// outside code spans.
    #[test]
    fn test_mixed_fragments_leave_no_tag_syntax() {
        let fragments = ["#", "**", "*", "`", "1", "a", " ", "#1", "#7"];
        let mut map = EmojiMap::new();
        map.insert(1, 5001, "★");

        let mut inputs = Vec::new();
        let mut layer = vec![String::new()];
        for _ in 0..4 {
            layer = layer
                .iter()
                .flat_map(|prefix| fragments.iter().map(move |f| format!("{prefix}{f}")))
                .collect();
            inputs.extend(layer.iter().cloned());
        }

        for input in &inputs {
            let out = render(input, &map);
            // Every output char is one UTF-16 unit here, so span offsets index chars.
            let mut chars: Vec<char> = out.text.chars().collect();
            for s in &out.spans {
                if matches!(s.kind, SpanKind::Code | SpanKind::CodeBlock { .. }) {
                    for c in &mut chars[s.offset..s.offset + s.length] {
                        *c = ' ';
                    }
                }
            }
            for w in chars.windows(2) {
                assert!(!(w[0] == '#' && w[1].is_ascii_digit()), "{input:?} -> {:?}", out.text);
                assert!(!(w[0] == '*' && w[1] == '*'), "{input:?} -> {:?}", out.text);
            }
            assert!(!chars.contains(&'`'), "{input:?} -> {:?}", out.text);
        }
    }

    #[test]
    fn test_emoji_map_from_catalog_is_one_based() {
        let map = EmojiMap::from_catalog(vec![(10, "a".to_string()), (20, "b".to_string())]);
        assert_eq!(map.get(1).map(|a| a.document_id), Some(10));
        assert_eq!(map.get(2).map(|a| a.document_id), Some(20));
        assert!(map.get(0).is_none());
    }
}
