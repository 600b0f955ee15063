//! Turns raw process output into a [`CommandResult`].

use crate::executor::{CommandError, CommandResult, RawOutput};

/// Attach the decoded stdout when `decode` is set.
///
/// Strict: a decode failure (including empty output) is an error and raw text
/// is never handed back in place of the decoded value. Output cut at the
/// capture cap is never decoded, even if the kept prefix parses.
///
/// # Errors
///
/// Returns a `decode-failed` [`CommandError`] carrying a bounded snippet of
/// the offending output.
pub fn interpret(raw: RawOutput, decode: bool) -> Result<CommandResult, CommandError> {
    let decoded = if decode {
        if raw.stdout_truncated {
            tracing::warn!(bytes = raw.stdout.len(), "stdout exceeded capture cap, not decoding");
            return Err(CommandError::output_truncated(&raw.stdout));
        }
        match serde_json::from_str::<serde_json::Value>(&raw.stdout) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(bytes = raw.stdout.len(), "stdout is not valid JSON: {e}");
                return Err(CommandError::decode_failed(&e, &raw.stdout));
            }
        }
    } else {
        None
    };

    Ok(CommandResult {
        exit_code: raw.exit_code,
        stdout: raw.stdout,
        stderr: raw.stderr,
        elapsed: raw.elapsed,
        decoded,
        stdout_truncated: raw.stdout_truncated,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::executor::ErrorReason;

    fn raw(stdout: &str) -> RawOutput {
        RawOutput {
            exit_code: 0,
            stdout: stdout.to_owned(),
            stderr: String::new(),
            elapsed: Duration::from_millis(3),
            stdout_truncated: false,
        }
    }

    #[test]
    fn empty_list_decodes() {
        let result = interpret(raw("[]"), true).unwrap();
        assert_eq!(result.decoded, Some(serde_json::json!([])));
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn object_decodes_with_surrounding_whitespace() {
        let result = interpret(raw("\n {\"items\": []}\n"), true).unwrap();
        assert_eq!(result.decoded.unwrap()["items"], serde_json::json!([]));
    }

    #[test]
    fn raw_mode_never_decodes() {
        let result = interpret(raw("[]"), false).unwrap();
        assert!(result.decoded.is_none());
        assert_eq!(result.stdout, "[]");
    }

    #[test]
    fn malformed_output_is_decode_failed() {
        let err = interpret(raw("NAME   READY\npod-a  1/1"), true).unwrap_err();
        assert_eq!(err.reason, ErrorReason::DecodeFailed);
        assert!(err.message.contains("NAME   READY"));
    }

    #[test]
    fn empty_output_is_decode_failed() {
        let err = interpret(raw(""), true).unwrap_err();
        assert_eq!(err.reason, ErrorReason::DecodeFailed);
    }

    #[test]
    fn truncated_document_is_decode_failed() {
        let mut out = raw("{\"items\": [1, 2");
        out.stdout_truncated = true;
        let err = interpret(out, true).unwrap_err();
        assert_eq!(err.reason, ErrorReason::DecodeFailed);
    }

    #[test]
    fn truncated_output_is_not_decoded_even_if_valid() {
        let mut out = raw("1234567890");
        out.stdout_truncated = true;
        let err = interpret(out, true).unwrap_err();
        assert_eq!(err.reason, ErrorReason::DecodeFailed);
        assert!(err.message.contains("capture cap"));
        assert!(err.message.contains("1234567890"));
    }

    #[test]
    fn truncated_output_is_kept_in_raw_mode() {
        let mut out = raw("1234567890");
        out.stdout_truncated = true;
        let result = interpret(out, false).unwrap();
        assert!(result.stdout_truncated);
        assert_eq!(result.stdout, "1234567890");
    }

    #[test]
    fn json_looking_text_is_not_substituted_on_failure() {
        let err = interpret(raw("[1, 2,"), true).unwrap_err();
        assert_eq!(err.reason, ErrorReason::DecodeFailed);
        assert_eq!(err.exit_code, Some(0));
    }
}
