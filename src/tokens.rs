//! Shell-aware classification of the recorded submission command line.
//!
//! Classification is purely syntactic; resolution decides what a token
//! actually points at. The original position of every token is kept so the
//! assembler can restore ordering after paths and values are processed
//! separately.

use anyhow::{Context, Result};

/// The reproduction-control flag is never reconstructed: it is stripped
/// here and re-added by the caller when provenance is requested again.
pub const PROVENANCE_FLAG: &str = "--provenance";
const PROVENANCE_SHORT_PREFIX: &str = "-p";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Flag,
    PathLike,
    Value,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    pub index: usize,
    pub kind: TokenKind,
}

/// Split one recorded command line into classified tokens.
///
/// Quoted segments survive as single tokens. Tokens carrying the
/// reproduction-control flag are dropped entirely; every other token keeps
/// its original index, so dropped tokens leave gaps that the assembler's
/// index-ordered merge tolerates.
pub fn classify_command(line: &str) -> Result<Vec<Token>> {
    let words = shell_words::split(line).context("split recorded command line")?;
    let mut tokens = Vec::with_capacity(words.len());
    for (index, value) in words.into_iter().enumerate() {
        if value.starts_with(PROVENANCE_FLAG) || value.starts_with(PROVENANCE_SHORT_PREFIX) {
            continue;
        }
        let kind = if value.starts_with('-') {
            TokenKind::Flag
        } else if value.contains(['/', '\\']) {
            TokenKind::PathLike
        } else {
            TokenKind::Value
        };
        tokens.push(Token { value, index, kind });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<(String, TokenKind)> {
        classify_command(line)
            .expect("classify")
            .into_iter()
            .map(|t| (t.value, t.kind))
            .collect()
    }

    #[test]
    fn classifies_flags_paths_and_values() {
        let tokens = kinds("runcompss --lang=python /data/in.txt out");
        assert_eq!(
            tokens,
            vec![
                ("runcompss".to_string(), TokenKind::Value),
                ("--lang=python".to_string(), TokenKind::Flag),
                ("/data/in.txt".to_string(), TokenKind::PathLike),
                ("out".to_string(), TokenKind::Value),
            ]
        );
    }

    #[test]
    fn drops_provenance_tokens_but_keeps_indexes() {
        let tokens = classify_command("runcompss --provenance main.py").expect("classify");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].index, 0);
        assert_eq!(tokens[1].index, 2);
        assert_eq!(tokens[1].value, "main.py");
    }

    #[test]
    fn drops_short_provenance_prefix() {
        let tokens = kinds("runcompss -p main.py");
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|(v, _)| v != "-p"));
    }

    #[test]
    fn quoted_segments_stay_single_tokens() {
        let tokens = kinds(r#"runcompss "my file.txt" '/data/in dir/'"#);
        assert_eq!(tokens[1].0, "my file.txt");
        assert_eq!(tokens[2], ("/data/in dir/".to_string(), TokenKind::PathLike));
    }

    #[test]
    fn backslash_separated_tokens_are_path_like() {
        // Single quotes keep the backslash from being eaten as an escape.
        let tokens = kinds(r"runcompss 'data\in.txt'");
        assert_eq!(tokens[1].1, TokenKind::PathLike);
    }
}
