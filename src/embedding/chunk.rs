//! Long-input chunking for the embedding provider.
//!
//! Inputs over the configured limit are split at the most natural
//! boundary available: paragraph breaks first, then sentence ends, then
//! whitespace. A hard character split is the last resort for unbroken
//! runs. Chunk vectors are averaged component-wise into one vector.

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Returns the whole text as a single chunk when it already fits.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for piece in split_pieces(text, max_chars) {
        let piece_len = piece.chars().count();
        if current_len + piece_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(&piece);
        current_len += piece_len;
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Breaks text into pieces no longer than `max_chars`, preferring
/// paragraph, then sentence, then word boundaries.
fn split_pieces(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();

    for paragraph in split_keeping(text, "\n\n") {
        if paragraph.chars().count() <= max_chars {
            pieces.push(paragraph);
            continue;
        }
        for sentence in split_sentences(&paragraph) {
            if sentence.chars().count() <= max_chars {
                pieces.push(sentence);
                continue;
            }
            for word_run in split_words(&sentence, max_chars) {
                pieces.push(word_run);
            }
        }
    }

    pieces
}

/// Splits on a separator, keeping the separator attached to the
/// preceding piece so no characters are lost.
fn split_keeping(text: &str, sep: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        out.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Splits at sentence-ending punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes: Vec<(usize, char)> = text.char_indices().collect();

    for window in bytes.windows(2) {
        let (idx, ch) = window[0];
        let (_, next) = window[1];
        if matches!(ch, '.' | '!' | '?') && next.is_whitespace() {
            let end = idx + ch.len_utf8();
            out.push(text[start..end].to_string());
            start = end;
        }
    }
    if start < text.len() {
        out.push(text[start..].to_string());
    }
    out
}

/// Greedily packs whitespace-separated words up to `max_chars`,
/// hard-splitting any single word longer than the limit.
fn split_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_inclusive(char::is_whitespace) {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for run in chars.chunks(max_chars) {
                out.push(run.iter().collect());
            }
            continue;
        }
        if current_len + word_len > max_chars {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Averages chunk vectors component-wise.
///
/// All vectors must share a dimension; the caller validated that against
/// the provider response.
pub fn average_vectors(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let mut sum = vec![0.0f32; first.len()];
    for vector in vectors {
        for (acc, component) in sum.iter_mut().zip(vector.iter()) {
            *acc += component;
        }
    }

    let count = vectors.len() as f32;
    for component in &mut sum {
        *component /= count;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("hello world", 100);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = chunk_text(&text, 50);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].trim_end().chars().all(|c| c == 'a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn test_sentence_boundaries_used_inside_long_paragraph() {
        let text = format!("{}. {}.", "a".repeat(30), "b".repeat(30));
        let chunks = chunk_text(&text, 40);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains('a'));
        assert!(!chunks[0].contains('b'));
    }

    #[test]
    fn test_word_boundaries_as_last_structured_resort() {
        let words = vec!["word"; 30].join(" ");
        let chunks = chunk_text(&words, 25);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 25);
            // No word is cut in half.
            for word in chunk.split_whitespace() {
                assert_eq!(word, "word");
            }
        }
    }

    #[test]
    fn test_unbroken_run_hard_split() {
        let text = "x".repeat(95);
        let chunks = chunk_text(&text, 30);
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 95);
    }

    #[test]
    fn test_no_content_lost() {
        let text = format!(
            "First paragraph here.\n\nSecond one is rather longer. {}",
            "tail ".repeat(20)
        );
        let chunks = chunk_text(&text, 40);
        let rejoined: String = chunks.concat();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_average_vectors_component_wise() {
        let avg = average_vectors(&[vec![1.0, 0.0, 3.0], vec![3.0, 2.0, 1.0]]);
        assert_eq!(avg, vec![2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_average_of_single_vector_is_identity() {
        let avg = average_vectors(&[vec![0.5, 0.25]]);
        assert_eq!(avg, vec![0.5, 0.25]);
    }

    #[test]
    fn test_average_of_empty_is_empty() {
        assert!(average_vectors(&[]).is_empty());
    }
}
