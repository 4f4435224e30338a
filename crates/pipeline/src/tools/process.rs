//! Helpers shared by the subprocess-backed adapters.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum stderr captured per child (64 KiB).
const MAX_STDERR_BYTES: u64 = 64 * 1024;

/// Characters of stderr kept in error messages.
const STDERR_TAIL_CHARS: usize = 2_000;

/// Read a child's stderr to completion, capped at [`MAX_STDERR_BYTES`].
pub(crate) async fn read_stderr<R: AsyncRead + Unpin>(handle: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_STDERR_BYTES).read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Last [`STDERR_TAIL_CHARS`] characters of `stderr`, trimmed.
pub(crate) fn tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_end_of_long_output() {
        let long = format!("{}END", "x".repeat(5_000));
        let kept = tail(&long);
        assert_eq!(kept.chars().count(), STDERR_TAIL_CHARS);
        assert!(kept.ends_with("END"));
    }

    #[test]
    fn tail_trims_short_output() {
        assert_eq!(tail("  oops\n"), "oops");
    }
}
