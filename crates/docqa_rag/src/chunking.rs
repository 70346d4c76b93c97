use docqa_core::domain::Chunk;

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Sentences are packed greedily; when the next sentence does not fit, the
/// current buffer is emitted and the next one starts with the trailing
/// `overlap` characters of the emitted chunk. A sentence longer than
/// `chunk_size` is emitted whole as its own chunk. Callers must ensure
/// `overlap < chunk_size`.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;
    // Whether `buf` holds a sentence that has not been emitted yet. A buffer
    // holding only the overlap seed is never emitted on its own.
    let mut fresh = false;

    for sentence in split_sentences(text) {
        let s_len = char_len(sentence);
        let joined_len = if buf.is_empty() {
            s_len
        } else {
            buf_len + 1 + s_len
        };
        if joined_len <= chunk_size {
            if !buf.is_empty() {
                buf.push(' ');
            }
            buf.push_str(sentence);
            buf_len = joined_len;
            fresh = true;
            continue;
        }

        let seed = if fresh {
            let seed = tail_chars(&buf, overlap).to_string();
            out.push(std::mem::take(&mut buf));
            seed
        } else {
            std::mem::take(&mut buf)
        };

        let seed_len = char_len(&seed);
        if !seed.is_empty() && seed_len + 1 + s_len <= chunk_size {
            buf = format!("{seed} {sentence}");
            buf_len = seed_len + 1 + s_len;
            fresh = true;
        } else if s_len <= chunk_size {
            buf = sentence.to_string();
            buf_len = s_len;
            fresh = true;
        } else {
            out.push(sentence.to_string());
            buf = tail_chars(sentence, overlap).to_string();
            buf_len = char_len(&buf);
            fresh = false;
        }
    }

    if fresh {
        out.push(buf);
    }
    out
}

/// Chunk a document and tag every piece with its source label and position.
pub fn chunk_document(text: &str, source: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    split(text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, t)| Chunk::new(t, source, i.min(u32::MAX as usize) as u32))
        .collect()
}

/// Break text at `.`, `!` or `?` followed by whitespace. Returned sentences
/// keep their terminator, are trimmed, and are never empty.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((i, ch)) = iter.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let next_is_space = iter.peek().map(|(_, n)| n.is_whitespace()).unwrap_or(false);
        if next_is_space {
            let end = i + ch.len_utf8();
            push_trimmed(&mut out, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut out, &text[start..]);
    out
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let t = s.trim();
    if !t.is_empty() {
        out.push(t);
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, with leading whitespace removed.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let len = char_len(s);
    if len <= n {
        return s.trim_start();
    }
    let start = s
        .char_indices()
        .nth(len - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    s[start..].trim_start()
}
