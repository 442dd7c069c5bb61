use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Deserialize a JSON document piped on stdin.
///
/// Returns `None` when stdin is an interactive terminal or the pipe is
/// empty, so callers can fall back to other sources.
pub fn read_stdin<T: DeserializeOwned>() -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    parse_piped(&buffer)
}

fn parse_piped<T: DeserializeOwned>(buffer: &str) -> Result<Option<T>, Box<dyn std::error::Error>> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: T = serde_json::from_str(trimmed)
        .map_err(|e| format!("Failed to parse JSON from stdin: {}", e))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_pipe_is_none() {
        assert!(parse_piped::<serde_json::Value>("  \n").unwrap().is_none());
    }

    #[test]
    fn test_bad_json_reports_source() {
        let err = parse_piped::<serde_json::Value>("{nope").unwrap_err();
        assert!(err.to_string().contains("stdin"));
    }
}
