/// Position of a word in the source. `line` is zero-based (it indexes the
/// line table), `col` is the one-based character column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

impl Span {
    /// One-based line number for diagnostics.
    pub fn display_line(&self) -> usize {
        self.line + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spanned<'a> {
    pub word: &'a str,
    pub span: Span,
}

/// Splits source text into whitespace-delimited words, one line at a time.
///
/// Comments are dropped: a line-comment delimiter word discards the rest of
/// its line and `( ... )` is skipped up to the first word ending in `)` on the
/// same line. Lines are still reported through [`Lexer::line_count`] so the
/// line table can account for comment-only lines.
pub struct Lexer<'a> {
    lines: std::str::Lines<'a>,
    line_comments: Vec<char>,
    current: Option<(usize, &'a str)>,
    pos: usize,
    next_line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_comments(source, &['\\', '#'])
    }

    pub fn with_comments(source: &'a str, line_comments: &[char]) -> Self {
        Lexer {
            lines: source.lines(),
            line_comments: line_comments.to_vec(),
            current: None,
            pos: 0,
            next_line: 0,
        }
    }

    /// Number of lines started so far.
    pub fn line_count(&self) -> usize {
        self.next_line
    }

    /// Pull the next word of the current line, or `None` at end of line.
    fn next_in_line(&mut self) -> Option<Spanned<'a>> {
        let (line, text) = self.current?;

        loop {
            let Some((start, len)) = next_word(text, self.pos) else {
                self.pos = text.len();
                return None;
            };
            let word = &text[start..start + len];
            self.pos = start + len;

            if self.is_line_comment(word) {
                self.pos = text.len();
                return None;
            }

            if word == "(" {
                self.skip_paren_comment(text);
                continue;
            }

            let col = text[..start].chars().count() + 1;
            return Some(Spanned {
                word,
                span: Span { line, col },
            });
        }
    }

    fn is_line_comment(&self, word: &str) -> bool {
        let mut chars = word.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => self.line_comments.contains(&c),
            _ => false,
        }
    }

    fn skip_paren_comment(&mut self, text: &str) {
        while let Some((start, len)) = next_word(text, self.pos) {
            self.pos = start + len;
            if text[start..self.pos].ends_with(')') {
                return;
            }
        }
        self.pos = text.len();
    }
}

/// Byte offset and length of the first word at or after `pos`.
fn next_word(text: &str, pos: usize) -> Option<(usize, usize)> {
    let rest = &text[pos..];
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let start = pos + (rest.len() - trimmed.len());
    let len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    Some((start, len))
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Spanned<'a>;

    fn next(&mut self) -> Option<Spanned<'a>> {
        loop {
            if let Some(word) = self.next_in_line() {
                return Some(word);
            }

            let text = self.lines.next()?;
            self.current = Some((self.next_line, text.trim_end_matches('\r')));
            self.pos = 0;
            self.next_line += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(source: &str) -> Vec<&str> {
        Lexer::new(source).map(|s| s.word).collect()
    }

    fn spans(source: &str) -> Vec<(usize, usize, &str)> {
        Lexer::new(source)
            .map(|s| (s.span.line, s.span.col, s.word))
            .collect()
    }

    #[test]
    fn test_split_on_whitespace() {
        assert_eq!(words("n 1 0\nbegin rot dup"), vec!["n", "1", "0", "begin", "rot", "dup"]);
    }

    #[test]
    fn test_line_and_column() {
        assert_eq!(
            spans("1 2\n\n  dup"),
            vec![(0, 1, "1"), (0, 3, "2"), (2, 3, "dup")]
        );
    }

    #[test]
    fn test_tabs_and_crlf() {
        assert_eq!(words("1\t2\r\n+\r\n"), vec!["1", "2", "+"]);
    }

    #[test]
    fn test_empty_lines_yield_nothing() {
        assert!(words("").is_empty());
        assert!(words("\n   \n\t\n").is_empty());
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(words("1 2 \\ add them\n+"), vec!["1", "2", "+"]);
        assert_eq!(words("# whole line\ndup"), vec!["dup"]);
    }

    #[test]
    fn test_comment_delimiter_must_be_whole_word() {
        assert_eq!(words("'#' \\x"), vec!["'#'", "\\x"]);
    }

    #[test]
    fn test_paren_comment() {
        assert_eq!(words("dup ( w -- w w ) swap"), vec!["dup", "swap"]);
        assert_eq!(words("( w1 w2 -- w2 w1) swap"), vec!["swap"]);
        assert_eq!(words("( never closed\n2"), vec!["2"]);
    }

    #[test]
    fn test_custom_comment_delimiters() {
        let lexer = Lexer::with_comments("1 ; 2 \\ 3", &[';']);
        let words: Vec<_> = lexer.map(|s| s.word).collect();
        assert_eq!(words, vec!["1"]);
    }

    #[test]
    fn test_line_count_includes_comment_lines() {
        let mut lexer = Lexer::new("\\ header\n1\n\\ trailer\n");
        while lexer.next().is_some() {}
        assert_eq!(lexer.line_count(), 3);
    }
}
