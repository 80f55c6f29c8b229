use arboard::Clipboard;
use tracing::debug;

/// Reads text from the system clipboard as a single line.
///
/// Terminals without a clipboard (SSH sessions, CI) report an error
/// instead of failing the caller.
pub fn paste_text() -> Result<String, String> {
    let mut clipboard = Clipboard::new().map_err(|e| e.to_string())?;
    let text = clipboard.get_text().map_err(|e| e.to_string())?;
    debug!(len = text.len(), "pasted from clipboard");
    Ok(single_line(&text))
}

/// Collapses pasted text to one line, as form fields hold no newlines.
pub fn single_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        assert_eq!(single_line("600141 - ACME\r\n"), "600141 - ACME");
        assert_eq!(single_line("Av. Norte 100\n\n  Depto 3 "), "Av. Norte 100 Depto 3");
        assert_eq!(single_line(""), "");
    }
}
