use crate::token::Position;

/// Returned by [`Reader::peek`] for any offset past the end of the source.
pub const SENTINEL: char = '\0';

/// Cursor over newline-normalized source text.
///
/// The source is guaranteed to end with `'\n'`, so a final unterminated line
/// is still scannable, and line starts are computed once up front.
pub struct Reader {
    chars: Vec<char>,
    line_starts: Vec<usize>,
    current: usize,
    eof: bool,
}

impl Reader {
    pub fn new(source: &str) -> Self {
        let mut chars = Vec::with_capacity(source.len() + 1);
        let mut iter = source.chars().peekable();
        while let Some(c) = iter.next() {
            if c == '\r' {
                iter.next_if_eq(&'\n');
                chars.push('\n');
            } else {
                chars.push(c);
            }
        }
        if chars.last() != Some(&'\n') {
            chars.push('\n');
        }

        let mut line_starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(i + 1);
            }
        }
        // The last newline already pushed `len`; bump it past the end so every
        // in-range index lands on a real line.
        if let Some(last) = line_starts.last_mut() {
            *last = chars.len() + 1;
        }

        Self {
            chars,
            line_starts,
            current: 0,
            eof: false,
        }
    }

    pub fn peek(&self, lookahead: usize) -> char {
        self.chars
            .get(self.current + lookahead)
            .copied()
            .unwrap_or(SENTINEL)
    }

    pub fn at(&self) -> char {
        self.peek(0)
    }

    pub fn advance(&mut self, n: usize) {
        self.current = (self.current + n).min(self.chars.len());
        if self.current >= self.chars.len() {
            self.eof = true;
        }
    }

    pub fn index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_eof(&self) -> bool {
        self.eof || self.current >= self.chars.len()
    }

    /// True when only blanks separate the cursor from the start of its line.
    pub fn is_line_start(&self) -> bool {
        let mut i = self.current;
        while i > 0 {
            match self.chars.get(i - 1) {
                Some('\n') => return true,
                Some(' ') | Some('\t') => i -= 1,
                _ => return false,
            }
        }
        true
    }

    pub fn position(&self) -> Position {
        self.position_info(self.current)
    }

    pub fn position_info(&self, index: usize) -> Position {
        let index = index.min(self.chars.len());
        let line = self
            .line_starts
            .partition_point(|&start| start <= index)
            .saturating_sub(1);
        let start = self.line_starts.get(line).copied().unwrap_or(0);
        Position {
            line: line + 1,
            column: index - start + 1,
            index,
        }
    }
}
