//! Splits an oversized reply into ordered, transport-sized segments.
//!
//! Pure function of its inputs: the same text and limit always produce the
//! same segments, so a crashed delivery loop can restart from scratch.

/// Split `text` into segments of at most `limit` characters, preferring to
/// break at the newline closest before the limit. A single line longer than
/// the limit is hard-cut at exactly `limit` characters. Segments are trimmed
/// and empty segments are dropped.
pub fn chunk_reply(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() || limit == 0 {
        return vec![];
    }

    // Byte offset of every char boundary, plus the end of the text, so the
    // character-based walk below can slice without splitting a code point.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = bounds.len() - 1;

    let newline_at = |char_idx: usize| text[bounds[char_idx]..].starts_with('\n');

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_chars {
        let mut end = (start + limit).min(total_chars);
        let mut skip_boundary = false;

        if end < total_chars {
            if newline_at(end) {
                skip_boundary = true;
            } else {
                // Walk back to the nearest newline after `start`; if there is
                // none, force a hard cut at exactly `limit` characters.
                let mut back = end;
                while back > start && !newline_at(back) {
                    back -= 1;
                }
                if back == start {
                    end = start + limit;
                } else {
                    end = back;
                    skip_boundary = true;
                }
            }
        }

        let segment = text[bounds[start]..bounds[end]].trim();
        if !segment.is_empty() {
            chunks.push(segment.to_string());
        }

        start = if skip_boundary { end + 1 } else { end };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_reply("", 1500).is_empty());
    }

    #[test]
    fn test_short_text_is_a_single_trimmed_chunk() {
        let chunks = chunk_reply("  hola mundo \n", 1500);
        assert_eq!(chunks, vec!["hola mundo".to_string()]);
    }

    #[test]
    fn test_prefers_newline_before_the_limit() {
        // 1490 'a', newline, then 1609 'b': 3100 chars total.
        let text = format!("{}\n{}", "a".repeat(1490), "b".repeat(1609));
        assert_eq!(text.chars().count(), 3100);

        let chunks = chunk_reply(&text, 1500);
        assert_eq!(chunks.len(), 3);
        // First chunk stops at the newline, not at a hard 1500-char cut.
        assert_eq!(chunks[0].chars().count(), 1490);
        assert!(chunks[0].chars().all(|c| c == 'a'));
        // The unbroken remainder is hard-cut at exactly the limit.
        assert_eq!(chunks[1].chars().count(), 1500);
        assert_eq!(chunks[2].chars().count(), 109);
    }

    #[test]
    fn test_unbroken_line_is_hard_cut_at_exactly_the_limit() {
        let text = "x".repeat(350);
        let chunks = chunk_reply(&text, 100);
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks[..3] {
            assert_eq!(chunk.chars().count(), 100);
        }
        assert_eq!(chunks[3].chars().count(), 50);
    }

    #[test]
    fn test_every_chunk_respects_the_limit() {
        let text = "línea corta\n".repeat(400);
        for chunk in chunk_reply(&text, 120) {
            assert!(chunk.chars().count() <= 120);
        }
    }

    #[test]
    fn test_concatenation_reconstructs_text_modulo_boundary_whitespace() {
        let text = "Hola, aquí va el presupuesto:\nPartida 1: 100€\nPartida 2: 250€\n\nSaludos";
        let chunks = chunk_reply(text, 30);

        let rebuilt: String = chunks.concat();
        let expected: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let recovered: String = rebuilt.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(expected, recovered);
    }

    #[test]
    fn test_multibyte_text_never_splits_a_character() {
        let text = "ñá€ü".repeat(200);
        let chunks = chunk_reply(&text, 33);
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(chunk.chars().count() <= 33);
        }
    }

    #[test]
    fn test_restartable_same_input_same_output() {
        let text = format!("{}\n{}", "uno dos tres ".repeat(50), "y".repeat(900));
        assert_eq!(chunk_reply(&text, 200), chunk_reply(&text, 200));
    }
}
