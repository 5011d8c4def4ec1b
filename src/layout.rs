use crate::types::Pt;

/// Recipient names are truncated to this many characters before layout.
pub const MAX_NAME_CHARS: usize = 33;
/// Maximum characters per wrapped line in the name box.
pub const MAX_CHARS_PER_LINE: usize = 16;

/// Greedy word wrap over space-delimited words. A word is appended to the
/// current line when `len(current) + len(word) + 1` still fits; otherwise the
/// current line is flushed as-is (even when empty, so a single oversized word
/// yields a leading empty line) and the word starts the next line. Words are
/// never split.
pub fn wrap_words(text: &str, max_chars_per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split(' ') {
        let word_len = word.chars().count();
        if current_len + word_len + 1 <= max_chars_per_line {
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// A laid-out multi-line name block. Font size and line spacing come from a
/// fixed legibility step function over the trimmed name length; three or more
/// wrapped lines tighten the spacing regardless of the size bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub font_size: Pt,
    pub line_spacing: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub x: Pt,
    pub y: Pt,
    pub text: String,
}

impl TextBlock {
    pub fn compute(name: &str) -> TextBlock {
        let truncated: String = name.chars().take(MAX_NAME_CHARS).collect();
        let trimmed = truncated.trim();
        let length = trimmed.chars().count();

        let (font_size, spacing) = if length <= 8 {
            (50, 58)
        } else if (9..=16).contains(&length) {
            (38, 48)
        } else if (17..=24).contains(&length) {
            (40, 48)
        } else {
            (30, 48)
        };

        let lines = wrap_words(trimmed, MAX_CHARS_PER_LINE);
        let spacing = if lines.len() >= 3 { 40 } else { spacing };

        TextBlock {
            lines,
            font_size: Pt::from_i32(font_size),
            line_spacing: Pt::from_i32(spacing),
        }
    }

    /// Centers each line horizontally around `anchor_x` using the fixed-pitch
    /// approximation `anchor_x - m_advance * len / 2`, and the whole block
    /// vertically around `anchor_y`.
    pub fn placed_lines(&self, anchor_x: Pt, anchor_y: Pt, m_advance: Pt) -> Vec<PlacedLine> {
        let line_count = self.lines.len() as i32;
        let start_y = anchor_y + (self.line_spacing * (line_count - 1)) / 2;

        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let length = line.chars().count() as i32;
                PlacedLine {
                    x: anchor_x - (m_advance * length) / 2,
                    y: start_y - self.line_spacing * (i as i32),
                    text: line.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(name: &str) -> (i64, i64) {
        let block = TextBlock::compute(name);
        (
            block.font_size.to_milli_i64() / 1000,
            block.line_spacing.to_milli_i64() / 1000,
        )
    }

    #[test]
    fn font_size_buckets_match_thresholds() {
        assert_eq!(sizes("Ada"), (50, 58));
        assert_eq!(sizes("Adabella"), (50, 58)); // 8 chars, inclusive bound
        assert_eq!(sizes("Adalberto"), (38, 48)); // 9 chars
        assert_eq!(sizes("Ada Lovelace"), (38, 48)); // 12 chars
        assert_eq!(sizes("Sixteen chars ab"), (38, 48)); // 16 chars
        assert_eq!(sizes("Seventeen chars a"), (40, 48)); // 17 chars
        assert_eq!(sizes("Twentyfour characters ab"), (40, 48)); // 24 chars
        assert_eq!(sizes("Twentyfive characters abc"), (30, 48)); // 25 chars
    }

    #[test]
    fn names_longer_than_cap_are_truncated_before_bucketing() {
        let long = "A".repeat(60);
        let block = TextBlock::compute(&long);
        assert_eq!(block.font_size.to_milli_i64() / 1000, 30);
        let total: usize = block.lines.iter().map(|l| l.chars().count()).sum();
        assert_eq!(total, MAX_NAME_CHARS);
    }

    #[test]
    fn three_or_more_lines_force_spacing_40() {
        // 14 + 14 + 3 characters wraps to three lines in a 16-char box.
        let name = "Abcdefghijklmn Abcdefghijklmn Abc";
        let block = TextBlock::compute(name);
        assert_eq!(block.lines.len(), 3);
        assert_eq!(block.line_spacing.to_milli_i64() / 1000, 40);
    }

    #[test]
    fn wrap_keeps_words_whole_and_within_width() {
        let lines = wrap_words("Maria de los Angeles Ruiz", MAX_CHARS_PER_LINE);
        for line in &lines {
            assert!(line.chars().count() <= MAX_CHARS_PER_LINE, "line {:?}", line);
        }
        let rejoined = lines.join(" ");
        assert_eq!(rejoined.trim(), "Maria de los Angeles Ruiz");
    }

    #[test]
    fn wrap_never_splits_an_oversized_word() {
        let word = "Wolfeschlegelstein"; // 18 chars, wider than the box
        let lines = wrap_words(word, MAX_CHARS_PER_LINE);
        assert!(lines.contains(&word.to_string()));
    }

    #[test]
    fn short_name_stays_on_one_line() {
        assert_eq!(wrap_words("Ada Lovelace", MAX_CHARS_PER_LINE), vec!["Ada Lovelace"]);
    }

    #[test]
    fn empty_name_produces_no_lines() {
        assert!(wrap_words("", MAX_CHARS_PER_LINE).is_empty());
        assert!(TextBlock::compute("   ").lines.is_empty());
    }

    #[test]
    fn placed_lines_center_around_the_anchors() {
        let block = TextBlock {
            lines: vec!["MMMM".to_string(), "MM".to_string()],
            font_size: Pt::from_i32(38),
            line_spacing: Pt::from_i32(48),
        };
        let placed = block.placed_lines(Pt::from_i32(390), Pt::from_i32(329), Pt::from_i32(30));

        // start_y = 329 + (2 - 1) * 48 / 2 = 353
        assert_eq!(placed[0].y.to_milli_i64(), 353_000);
        assert_eq!(placed[1].y.to_milli_i64(), 305_000);
        // x = 390 - 30 * len / 2
        assert_eq!(placed[0].x.to_milli_i64(), 330_000);
        assert_eq!(placed[1].x.to_milli_i64(), 360_000);
    }
}
