pub mod dispatcher;

use cloak_core::config::{ERROR_CONTENT_KEY, ERROR_SENTINEL};

/// Rewrite provider-error content before it reaches a client. Raw error
/// strings can leak provider internals; clients render the fixed key
/// through their own translations instead.
pub fn sanitize_stream_content(content: &str) -> &str {
    if content.contains(ERROR_SENTINEL) {
        ERROR_CONTENT_KEY
    } else {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_sentinel_is_rewritten() {
        assert_eq!(
            sanitize_stream_content("[ERROR: provider 503]"),
            ERROR_CONTENT_KEY
        );
        assert_eq!(
            sanitize_stream_content("prefix [ERROR mid-stream"),
            ERROR_CONTENT_KEY
        );
    }

    #[test]
    fn clean_content_passes_through() {
        assert_eq!(sanitize_stream_content("Hi there"), "Hi there");
        assert_eq!(sanitize_stream_content(""), "");
    }
}
