//! Bounded log tailing for the `logs` command.

use std::path::Path;

use crate::Result;

/// Read the last `limit` characters of the file at `path`.
pub async fn read_tail(path: &Path, limit: usize) -> Result<String> {
    let contents = tokio::fs::read_to_string(path).await?;
    Ok(tail_chars(&contents, limit))
}

/// The cut lands on a char boundary so the reply stays valid UTF-8.
fn tail_chars(s: &str, limit: usize) -> String {
    let count = s.chars().count();
    if count <= limit {
        return s.to_string();
    }
    s.chars().skip(count - limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_returned_whole() {
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("", 10), "");
    }

    #[test]
    fn long_input_keeps_the_tail() {
        assert_eq!(tail_chars("0123456789", 4), "6789");
    }

    #[test]
    fn multibyte_input_cuts_on_char_boundaries() {
        assert_eq!(tail_chars("ααββγγ", 3), "βγγ");
    }

    #[tokio::test]
    async fn missing_file_surfaces_an_error() {
        let err = read_tail(Path::new("/nonexistent/srvmon.log"), 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("i/o error"));
    }
}
