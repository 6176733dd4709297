use crate::error::{RagError, Result};

/// Represents a text chunk with its position in the source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Position of this chunk in the chunk sequence
    pub index: usize,
    /// Number of chunks produced for the document
    pub total_chunks: usize,
    /// Starting character (not byte) offset in the original text
    pub start_position: usize,
}

/// Splits text into overlapping fixed-size character windows
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a new chunker; requires `0 <= overlap < chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(RagError::InvalidChunking {
                chunk_size,
                overlap,
            });
        }
        Ok(Chunker {
            chunk_size,
            overlap,
        })
    }

    /// Split text into chunks.
    ///
    /// Window ends advance by a full `chunk_size` from the previous end, while every
    /// window after the first starts `overlap` characters before that end. Chunk `i > 0`
    /// therefore covers `[i*size - overlap, (i+1)*size)` and holds `size + overlap`
    /// characters, except for a shorter final chunk.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        // Byte offset of every character, plus the end of the string
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;

        if char_count <= self.chunk_size {
            return vec![TextChunk {
                text: text.to_string(),
                index: 0,
                total_chunks: 1,
                start_position: 0,
            }];
        }

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = start + self.chunk_size;
            let window_start = if start > 0 { start - self.overlap } else { start };
            windows.push((window_start, end.min(char_count)));
            start = end;
        }

        let total_chunks = windows.len();
        windows
            .into_iter()
            .enumerate()
            .map(|(index, (from, to))| TextChunk {
                text: text[boundaries[from]..boundaries[to]].to_string(),
                index,
                total_chunks,
                start_position: from,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let text = "a".repeat(50);
        let chunks = Chunker::new(1000, 200).unwrap().split(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].total_chunks, 1);
    }

    #[test]
    fn test_text_exactly_chunk_size_is_single_chunk() {
        let text = "x".repeat(10);
        let chunks = Chunker::new(10, 3).unwrap().split(&text);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_empty_text_is_single_empty_chunk() {
        let chunks = Chunker::new(10, 3).unwrap().split("");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn test_boundary_arithmetic() {
        // 25 chars, size 10, overlap 3:
        //   chunk 0: [0, 10)
        //   chunk 1: [7, 20)  start pulled back by 3, end advanced by 10
        //   chunk 2: [17, 25) final chunk truncated at the end of text
        let text = "abcdefghijklmnopqrstuvwxy";
        let chunks = Chunker::new(10, 3).unwrap().split(text);

        let spans: Vec<(usize, &str)> = chunks
            .iter()
            .map(|c| (c.start_position, c.text.as_str()))
            .collect();
        assert_eq!(
            spans,
            vec![
                (0, "abcdefghij"),
                (7, "hijklmnopqrst"),
                (17, "rstuvwxy"),
            ]
        );
        assert!(chunks.iter().all(|c| c.total_chunks == 3));
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_final_chunk_may_be_only_overlap() {
        // 20 chars, size 10: second window starts at 10, pulled back to 7
        let text = "0123456789ABCDEFGHIJ";
        let chunks = Chunker::new(10, 3).unwrap().split(text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "789ABCDEFGHIJ");
    }

    #[test]
    fn test_zero_overlap_partitions_text() {
        let chunks = Chunker::new(4, 0).unwrap().split("aaaabbbbcc");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa", "bbbb", "cc"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "ééééé"; // 5 chars, 10 bytes
        assert_eq!(Chunker::new(5, 1).unwrap().split(text).len(), 1);

        let chunks = Chunker::new(2, 1).unwrap().split(text);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["éé", "ééé", "éé"]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(10, 11).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }

    proptest! {
        #[test]
        fn prop_chunks_reconstruct_text_with_exact_overlap(
            text in "\\PC{0,400}",
            chunk_size in 1usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % chunk_size;
            let chunks = Chunker::new(chunk_size, overlap).unwrap().split(&text);
            let chars: Vec<char> = text.chars().collect();

            let mut rebuilt = String::new();
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.total_chunks, chunks.len());

                let chunk_chars: Vec<char> = chunk.text.chars().collect();
                if i == 0 {
                    rebuilt.push_str(&chunk.text);
                } else {
                    // Adjacent chunks share exactly `overlap` characters
                    let previous: Vec<char> = chunks[i - 1].text.chars().collect();
                    prop_assert!(chunk_chars.len() >= overlap);
                    prop_assert_eq!(
                        &chunk_chars[..overlap],
                        &previous[previous.len() - overlap..]
                    );
                    rebuilt.extend(chunk_chars[overlap..].iter());
                    // Every chunk but the last spans size + overlap characters
                    if i + 1 < chunks.len() {
                        prop_assert_eq!(chunk_chars.len(), chunk_size + overlap);
                    }
                }

                let expected: String = chars[chunk.start_position..]
                    .iter()
                    .take(chunk_chars.len())
                    .collect();
                prop_assert_eq!(&chunk.text, &expected);
            }

            prop_assert_eq!(rebuilt, text);
        }
    }
}
