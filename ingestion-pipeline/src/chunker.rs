use common::error::AppError;

/// Splits `text` into chunks of at most `max_tokens` whitespace-delimited words.
///
/// Words are a rough stand-in for model tokens. Chunks are filled greedily; a
/// word that does not fit starts the next chunk, so a single over-long word is
/// never split and may form a chunk by itself. Words inside a chunk are joined
/// with single spaces.
pub fn chunk_text_by_tokens(text: &str, max_tokens: usize) -> Result<Vec<String>, AppError> {
    if max_tokens == 0 {
        return Err(AppError::Validation(
            "chunk max tokens must be greater than zero".into(),
        ));
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        if current.len() >= max_tokens {
            chunks.push(current.join(" "));
            current.clear();
        }
        current.push(word);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    Ok(chunks)
}
