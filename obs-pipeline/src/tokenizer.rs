//! SHDR tokenizer (spec §4.2).

use obs_types::PipelineError;

const MULTILINE_SENTINEL: &str = "--multiline--";

/// One line's worth of tokens, ready for the timestamp extractor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenizedLine {
    /// `* key : value`, routed to the protocol-command handler (spec §4.11) instead of the
    /// rest of the pipeline.
    Command { key: String, value: String },
    /// A data line: the timestamp candidate token (may be empty) plus the flat list of
    /// remaining pipe-delimited tokens, to be consumed in variable-width groups by the token
    /// mapper (spec §4.4).
    Data { timestamp_token: String, tokens: Vec<String> },
}

struct MultilineState {
    terminator: String,
    timestamp_token: String,
    /// Tokens preceding the one currently being extended.
    leading_tokens: Vec<String>,
    /// Raw lines accumulated so far for the token under the sentinel.
    buffer: Vec<String>,
}

/// Splits `|`-delimited SHDR lines into tokens, folding multi-line payloads back into a single
/// token before handing the line onward.
///
/// One `Tokenizer` is owned per source strand: the multi-line state is inherently sequential
/// (spec §5 — "no per-source locking" is only true because nothing here is shared).
#[derive(Default)]
pub struct Tokenizer {
    multiline: Option<MultilineState>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one `\n`-terminated line (without the trailing newline) to the tokenizer.
    ///
    /// Returns `Ok(None)` while a multi-line payload is still being accumulated, `Ok(Some(_))`
    /// once a complete line is ready, and `Err` for a malformed (non-multiline) data line
    /// (spec §4.2: "a line with fewer than two tokens is forwarded to a diagnostic channel and
    /// dropped").
    pub fn feed(&mut self, line: &str) -> Result<Option<TokenizedLine>, PipelineError> {
        if let Some(state) = self.multiline.as_mut() {
            if line == state.terminator {
                let state = self.multiline.take().unwrap();
                let mut tokens = state.leading_tokens;
                tokens.push(state.buffer.join("\n"));
                return Ok(Some(TokenizedLine::Data {
                    timestamp_token: state.timestamp_token,
                    tokens,
                }));
            }
            state.buffer.push(line.to_owned());
            return Ok(None);
        }

        if let Some(rest) = line.strip_prefix('*') {
            let (key, value) = rest.split_once(':').unwrap_or((rest, ""));
            return Ok(Some(TokenizedLine::Command {
                key: key.trim().to_owned(),
                value: value.trim().to_owned(),
            }));
        }

        let mut tokens: Vec<String> = line.split('|').map(str::to_owned).collect();
        if tokens.len() < 2 {
            return Err(PipelineError::MalformedLine {
                source: String::new(),
                reason: format!("expected a timestamp and at least one field, got {} token(s)", tokens.len()),
            });
        }
        let timestamp_token = tokens.remove(0);

        let multiline_term = tokens.last().and_then(|t| extract_multiline_terminator(t));
        if let Some(term) = multiline_term {
            tokens.pop();
            self.multiline = Some(MultilineState {
                terminator: term,
                timestamp_token,
                leading_tokens: tokens,
                buffer: Vec::new(),
            });
            return Ok(None);
        }

        Ok(Some(TokenizedLine::Data { timestamp_token, tokens }))
    }
}

fn extract_multiline_terminator(token: &str) -> Option<String> {
    token.strip_prefix(MULTILINE_SENTINEL).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_a_simple_data_line() {
        let mut t = Tokenizer::new();
        let line = "2021-01-22T12:33:45.123Z|Xpos|100.0";
        match t.feed(line).unwrap().unwrap() {
            TokenizedLine::Data { timestamp_token, tokens } => {
                assert_eq!(timestamp_token, "2021-01-22T12:33:45.123Z");
                assert_eq!(tokens, vec!["Xpos".to_string(), "100.0".to_string()]);
            }
            _ => panic!("expected data line"),
        }
    }

    #[test]
    fn empty_timestamp_is_preserved() {
        let mut t = Tokenizer::new();
        match t.feed("|Xpos|100.0").unwrap().unwrap() {
            TokenizedLine::Data { timestamp_token, .. } => assert_eq!(timestamp_token, ""),
            _ => panic!("expected data line"),
        }
    }

    #[test]
    fn rejects_line_with_fewer_than_two_tokens() {
        let mut t = Tokenizer::new();
        assert!(t.feed("justonetoken").is_err());
    }

    #[test]
    fn parses_protocol_commands() {
        let mut t = Tokenizer::new();
        match t.feed("* relativeTime : true").unwrap().unwrap() {
            TokenizedLine::Command { key, value } => {
                assert_eq!(key, "relativeTime");
                assert_eq!(value, "true");
            }
            _ => panic!("expected command"),
        }
    }

    #[test]
    fn folds_multiline_payload_into_the_opening_token() {
        let mut t = Tokenizer::new();
        assert!(t.feed("2021-01-22T12:33:45Z|file|--multiline--END").unwrap().is_none());
        assert!(t.feed("line one").unwrap().is_none());
        assert!(t.feed("line two").unwrap().is_none());
        match t.feed("END").unwrap().unwrap() {
            TokenizedLine::Data { timestamp_token, tokens } => {
                assert_eq!(timestamp_token, "2021-01-22T12:33:45Z");
                assert_eq!(tokens, vec!["file".to_string(), "line one\nline two".to_string()]);
            }
            _ => panic!("expected data line"),
        }
    }
}
