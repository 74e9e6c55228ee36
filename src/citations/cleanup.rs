//! Text cleanup applied after markers are inserted.
//!
//! Each step is a pure string transformation and the chain as a whole is a
//! fixed point on its own output. Marker numbers are never rewritten, only
//! de-duplicated within adjacent runs.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::MarkerStyle;

/// Characters that never start a new paragraph after a sentence end.
/// `[` keeps a citation marker on the sentence it belongs to.
const NO_BREAK_BEFORE: &str = r#"\s,;:，；：.!?。！？\[\]\)」』）"'”’"#;

struct Cleaner {
    glyphs: Regex,
    leading_commas: Regex,
    trailing_commas: Regex,
    marker_run: Regex,
    digits: Regex,
    heading: Regex,
    sentence_end: Regex,
    spaces: Regex,
    line_edges: Regex,
    blank_lines: Regex,
}

impl Cleaner {
    fn new(style: MarkerStyle) -> Self {
        let marker = style.pattern();
        let build = |pattern: &str| Regex::new(pattern).expect("static cleanup pattern");
        Self {
            glyphs: build(r"[ \t]*(?:【[^】]*】|†[^†\n]*†)"),
            leading_commas: build(r"(?m)^[ \t]*,[ \t,]*"),
            trailing_commas: build(r"(?m)[ \t]*,[ \t,]*$"),
            marker_run: build(&format!("(?:{}){{2,}}", marker)),
            digits: build(r"\d+"),
            heading: build(
                r"(?m)(?:^|[ \t,]*[ \t])(\d{1,2})\.[ \t]+([\p{L}\p{N}][^\n:：.!?。*\[\]]{0,79}?)[ \t]*[:：][ \t]*",
            ),
            sentence_end: build(&format!(
                r"([.!?](?:{m})*[ \t]+|[。！？](?:{m})*[ \t]*)(\*\*\d|\d+\.|[^{nb}])",
                m = marker,
                nb = NO_BREAK_BEFORE
            )),
            spaces: build(r"[ \t]+"),
            line_edges: build(r"[ \t]*\n[ \t]*"),
            blank_lines: build(r"\n{3,}"),
        }
    }

    fn get(style: MarkerStyle) -> &'static Cleaner {
        static BRACKET: OnceLock<Cleaner> = OnceLock::new();
        static FOOTNOTE: OnceLock<Cleaner> = OnceLock::new();
        match style {
            MarkerStyle::Bracket => BRACKET.get_or_init(|| Cleaner::new(style)),
            MarkerStyle::Footnote => FOOTNOTE.get_or_init(|| Cleaner::new(style)),
        }
    }

    /// Step 1: drop the model's own citation glyphs.
    fn strip_glyphs(&self, text: &str) -> String {
        self.glyphs.replace_all(text, "").into_owned()
    }

    /// Step 2: drop commas left alone at the start or end of a line.
    fn strip_stray_commas(&self, text: &str) -> String {
        let text = self.leading_commas.replace_all(text, "");
        self.trailing_commas.replace_all(&text, "").into_owned()
    }

    /// Step 3: `[2][2]` → `[2]`, `[1][2][1]` → `[1][2]`.
    fn collapse_marker_runs(&self, text: &str, style: MarkerStyle) -> String {
        self.marker_run
            .replace_all(text, |caps: &Captures| {
                let mut seen = HashSet::new();
                self.digits
                    .find_iter(&caps[0])
                    .filter_map(|m| m.as_str().parse::<usize>().ok())
                    .filter(|index| seen.insert(*index))
                    .map(|index| style.marker(index))
                    .collect::<String>()
            })
            .into_owned()
    }

    /// Step 4: `1. Title:` becomes its own bolded paragraph.
    ///
    /// The title window is measured on collapsed spacing. A heading glued to
    /// the previous one only gains its leading space once that one is
    /// rewritten, so the pass repeats until nothing matches.
    fn isolate_headings(&self, text: &str) -> String {
        let mut text = self.spaces.replace_all(text, " ").into_owned();
        loop {
            let next = match self.heading.replace_all(&text, "\n\n**$1. $2:** ") {
                Cow::Borrowed(_) => break,
                Cow::Owned(next) => next,
            };
            text = next;
        }
        text
    }

    /// Step 5: paragraph break after a sentence end unless a heading or
    /// list marker follows.
    fn break_sentences(&self, text: &str) -> String {
        self.sentence_end
            .replace_all(text, |caps: &Captures| {
                let whole = &caps[0];
                let next = &caps[2];
                let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                if next.starts_with("**")
                    || next.starts_with(|c: char| c.is_ascii_digit())
                    || ends_with_list_number(&text[..start])
                {
                    whole.to_string()
                } else {
                    format!("{}\n\n{}", caps[1].trim_end(), next)
                }
            })
            .into_owned()
    }

    /// Step 6: whitespace normalization.
    fn normalize_whitespace(&self, text: &str) -> String {
        let text = self.spaces.replace_all(text, " ");
        let text = self.line_edges.replace_all(&text, "\n");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        text.trim().to_string()
    }
}

/// True when `before` ends with a one- or two-digit list number such as the
/// `2` in `see 2.` or `**2.`.
fn ends_with_list_number(before: &str) -> bool {
    let digits = before
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 || digits > 2 {
        return false;
    }
    match before[..before.len() - digits].chars().next_back() {
        None => true,
        Some(c) => c.is_whitespace() || c == '*',
    }
}

/// Run every cleanup step in order.
pub fn clean(text: &str, style: MarkerStyle) -> String {
    let cleaner = Cleaner::get(style);
    let text = text.replace("\r\n", "\n");
    let text = cleaner.strip_glyphs(&text);
    let text = cleaner.strip_stray_commas(&text);
    let text = cleaner.collapse_marker_runs(&text, style);
    let text = cleaner.isolate_headings(&text);
    let text = cleaner.break_sentences(&text);
    cleaner.normalize_whitespace(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bracket(text: &str) -> String {
        clean(text, MarkerStyle::Bracket)
    }

    #[test]
    fn test_strips_glyphs_and_duplicate_markers() {
        assert_eq!(bracket("Foo【x†y】 bar[1][1] baz"), "Foo bar[1] baz");
    }

    #[test]
    fn test_strips_dagger_glyphs() {
        assert_eq!(bracket("Value †source† here"), "Value here");
        assert_eq!(bracket("Value【4:0†policy.pdf】[2] here"), "Value[2] here");
    }

    #[test]
    fn test_collapses_marker_runs_in_first_seen_order() {
        assert_eq!(bracket("a[2][2] b"), "a[2] b");
        assert_eq!(bracket("a[1][2][1] b"), "a[1][2] b");
        assert_eq!(bracket("a[3][1][3][1][2] b"), "a[3][1][2] b");
    }

    #[test]
    fn test_separated_markers_are_kept() {
        assert_eq!(bracket("a[1] and b[1]"), "a[1] and b[1]");
    }

    #[test]
    fn test_removes_stray_commas() {
        assert_eq!(bracket("first line ,\n, second line"), "first line\nsecond line");
        assert_eq!(bracket("alone\n,\nnext"), "alone\n\nnext");
    }

    #[test]
    fn test_isolates_numbered_headings() {
        assert_eq!(
            bracket("Steps: 1. Apply: fill the form 2. Approve: manager signs"),
            "Steps:\n\n**1. Apply:** fill the form\n\n**2. Approve:** manager signs"
        );
    }

    #[test]
    fn test_heading_at_start() {
        assert_eq!(bracket("1. Overview: the plan"), "**1. Overview:** the plan");
    }

    #[test]
    fn test_breaks_after_sentences() {
        assert_eq!(
            bracket("First point[1]. Second point! Third?"),
            "First point[1].\n\nSecond point!\n\nThird?"
        );
    }

    #[test]
    fn test_breaks_after_cjk_sentences() {
        assert_eq!(bracket("第一句。第二句[1]。第三句"), "第一句。\n\n第二句[1]。\n\n第三句");
    }

    #[test]
    fn test_no_break_inside_numbered_list() {
        assert_eq!(bracket("Options 1. red 2. blue"), "Options 1. red 2. blue");
        assert_eq!(bracket("Done. 2. Next"), "Done. 2. Next");
    }

    #[test]
    fn test_no_break_before_closing_quote() {
        assert_eq!(bracket("他說「好。」然後"), "他說「好。」然後");
    }

    #[test]
    fn test_normalizes_whitespace() {
        assert_eq!(
            bracket("  lots   of\t\tspace \n\n\n\n next  "),
            "lots of space\n\nnext"
        );
    }

    #[test]
    fn test_footnote_style_runs() {
        assert_eq!(clean("a[^2][^2][^1] b", MarkerStyle::Footnote), "a[^2][^1] b");
        // Bracket markers are plain text under the footnote style.
        assert_eq!(clean("a[2][2] b", MarkerStyle::Footnote), "a[2][2] b");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let samples = [
            "Foo【x†y】 bar[1][1] baz",
            "Leave is 20 days【4:0†source】[1]. Requests go to HR【4:1†s】[2][1] ,\n, next.",
            "Intro , 1. Setup: install it. 2. Run: start it[1][1].   Done!",
            "第一句【1:0†a】[1]。第二句。」 3. 標題：內容",
            "  , leading comma\n\n\n\n\ntrailing ,  ",
            "Wait... what? e.g. this. 10. Item: x",
            "**1. Bold:** already\nplain 1. list item.",
            "規定如下。【4:0†source】[1]請假需事先申請。",
            "」。[1](",
        ];
        for sample in samples {
            let once = bracket(sample);
            let twice = bracket(&once);
            assert_eq!(once, twice, "not a fixed point for {:?}", sample);
        }
    }

    #[test]
    fn test_marker_stays_with_cjk_sentence() {
        let once = bracket("規定如下。【4:0†source】[1]請假需事先申請。");
        assert_eq!(once, "規定如下。[1]\n\n請假需事先申請。");
        assert_eq!(bracket(&once), once);
        assert_eq!(bracket("。[1]X"), "。[1]\n\nX");
        assert_eq!(bracket("。[1]\n\nX"), "。[1]\n\nX");
    }

    #[test]
    fn test_no_break_before_marker() {
        assert_eq!(bracket("Done. [1] more"), "Done. [1] more");
        assert_eq!(
            clean("結論。[^2]下一段", MarkerStyle::Footnote),
            "結論。[^2]\n\n下一段"
        );
    }

    #[test]
    fn test_heading_window_ignores_extra_spacing() {
        let text = format!("Intro 1. a{}b: rest", " ".repeat(90));
        assert_eq!(bracket(&text), "Intro\n\n**1. a b:** rest");
    }

    #[test]
    fn test_adjacent_headings() {
        assert_eq!(bracket("12. T:12. x: y"), "**12. T:**\n\n**12. x:** y");
    }

    #[test]
    fn test_heading_title_starts_with_word() {
        assert_eq!(bracket("Note 3. \"quoted\": text"), "Note 3. \"quoted\": text");
        assert_eq!(bracket("Note 3. , x: text"), "Note 3. , x: text");
    }

    /// Seeded xorshift64.
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }

        fn below(&mut self, n: usize) -> usize {
            (self.next() % n as u64) as usize
        }
    }

    #[test]
    fn test_clean_is_idempotent_on_generated_text() {
        let wide = " ".repeat(90);
        let atoms = [
            "。", "！", "[1]", "[2]", "1. ", "12. ", "T", "標題", "x y", ":", "：", ". ", "! ",
            "\n", "\n\n\n", " ", "    ", wide.as_str(), "【4:0†source】", "†y†", ",", "」",
            "(", "**",
        ];
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        for _ in 0..5000 {
            let len = 1 + rng.below(16);
            let text: String = (0..len).map(|_| atoms[rng.below(atoms.len())]).collect();
            let once = bracket(&text);
            let twice = bracket(&once);
            assert_eq!(once, twice, "not a fixed point for {:?}", text);
        }
    }

    #[test]
    fn test_marker_numbers_preserved() {
        let out = bracket("A[7][3][7]. B[12]");
        assert_eq!(out, "A[7][3].\n\nB[12]");
    }
}
