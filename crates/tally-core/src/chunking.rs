//! Splitting statement text into bounded-size chunks
//!
//! Long documents are split on line boundaries, preferring to start a new
//! chunk right before a page marker line (`--- Page N ---`). Anything still
//! too large afterwards is hard-split into fixed-size slices.
//!
//! Chunks borrow from the input. When a split happens before a page marker
//! the newline that ended the previous line is consumed; every other split
//! consumes nothing. `Chunk::offset` records where each chunk starts, so the
//! original text can always be reassembled.

/// Prefix of a (trimmed) line that marks the start of a page
pub const PAGE_MARKER_PREFIX: &str = "--- Page ";

/// Default maximum chunk size for extraction (bytes)
pub const DEFAULT_CHUNK_SIZE: usize = 12_000;

/// A contiguous slice of the input text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub text: &'a str,
    /// Byte offset of `text` within the original input
    pub offset: usize,
}

impl<'a> Chunk<'a> {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits text into chunks of at most `max_chunk_size` bytes
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    max_chunk_size: usize,
}

impl TextChunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Lazily chunk `text`. Calling again restarts from the beginning.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            max: self.max_chunk_size,
            pos: 0,
            done: false,
            oversized: None,
        }
    }

    /// Collect all chunks
    pub fn split<'a>(&self, text: &'a str) -> Vec<Chunk<'a>> {
        self.chunks(text).collect()
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Iterator returned by [`TextChunker::chunks`]
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    max: usize,
    /// Start of the next page-aware chunk
    pos: usize,
    done: bool,
    /// Remainder of a page-aware chunk that is being hard-split
    oversized: Option<Chunk<'a>>,
}

impl<'a> Chunks<'a> {
    /// Find the next page-aware chunk starting at `self.pos`
    fn next_page_chunk(&mut self) -> Option<Chunk<'a>> {
        if self.done {
            return None;
        }

        let text = self.text;
        if text.len() <= self.max {
            self.done = true;
            return Some(Chunk { text, offset: 0 });
        }

        let start = self.pos;
        let mut line_start = match text[start..].find('\n') {
            Some(i) => start + i + 1,
            None => text.len() + 1,
        };

        while line_start <= text.len() {
            let line_end = text[line_start..]
                .find('\n')
                .map(|i| line_start + i)
                .unwrap_or(text.len());
            let line = &text[line_start..line_end];

            // Chunk so far (without the consumed newline) must be non-empty
            if line_end - start > self.max && line_start - 1 > start && is_page_marker(line) {
                self.pos = line_start;
                return Some(Chunk {
                    text: &text[start..line_start - 1],
                    offset: start,
                });
            }

            line_start = line_end + 1;
        }

        self.done = true;
        Some(Chunk {
            text: &text[start..],
            offset: start,
        })
    }

    /// Take the next hard-split slice from an oversized chunk
    fn next_slice(&mut self, chunk: Chunk<'a>) -> Chunk<'a> {
        let end = slice_end(chunk.text, self.max);
        let head = Chunk {
            text: &chunk.text[..end],
            offset: chunk.offset,
        };
        if end < chunk.text.len() {
            self.oversized = Some(Chunk {
                text: &chunk.text[end..],
                offset: chunk.offset + end,
            });
        }
        head
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(rest) = self.oversized.take() {
            return Some(self.next_slice(rest));
        }

        let chunk = self.next_page_chunk()?;
        if chunk.len() <= self.max {
            Some(chunk)
        } else {
            Some(self.next_slice(chunk))
        }
    }
}

/// Whether a line starts a new page
pub fn is_page_marker(line: &str) -> bool {
    line.trim().starts_with(PAGE_MARKER_PREFIX)
}

/// Largest char boundary in `s` at or below `index`
pub fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// End of a slice of at most `max` bytes, always making progress
fn slice_end(s: &str, max: usize) -> usize {
    let end = floor_char_boundary(s, max);
    if end > 0 {
        return end;
    }
    // A single character wider than `max`
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}
