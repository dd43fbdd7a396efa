//! Display-width accounting for list rows and the detail view.
//!
//! Anything outside Latin-1 is treated as a wide glyph occupying two cells.

pub fn is_wide(ch: char) -> bool {
    ch > '\u{ff}'
}

pub fn char_cells(ch: char) -> usize {
    if is_wide(ch) {
        2
    } else {
        1
    }
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_cells).sum()
}

/// Longest prefix of `text` that fits in `max_cells`.
///
/// Each wide character in the kept prefix costs one extra unit of the budget,
/// so the result never spans more than `max_cells` cells.
pub fn truncate(text: &str, max_cells: usize) -> &str {
    let mut used = 0usize;
    for (idx, ch) in text.char_indices() {
        let cells = char_cells(ch);
        if used + cells > max_cells {
            return &text[..idx];
        }
        used += cells;
    }
    text
}

/// Greedy character wrap. A line ends before the character that would push
/// it past `max_cells`; explicit newlines always break. A budget smaller than
/// a wide glyph still places that glyph alone on its line.
pub fn wrap(text: &str, max_cells: usize) -> Vec<String> {
    let max_cells = max_cells.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut line = String::new();
        let mut used = 0usize;
        for ch in paragraph.chars() {
            let cells = char_cells(ch);
            if used + cells > max_cells && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                used = 0;
            }
            line.push(ch);
            used += cells;
        }
        lines.push(line);
    }
    lines
}
