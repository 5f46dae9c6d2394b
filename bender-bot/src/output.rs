//! Sending replies back to IRC.

use std::time::Duration;

use bender_sdk::client::ClientHandle;

use crate::plugins::Reply;

/// Longest text sent in one line; longer replies are wrapped.
const MAX_LINE_LEN: usize = 400;

/// Pause between lines of a multi-line answer, to stay clear of flood limits.
const LINE_DELAY: Duration = Duration::from_millis(200);

/// Send `replies` to `target` in order.
pub async fn send_replies(handle: &ClientHandle, target: &str, replies: &[Reply]) -> anyhow::Result<()> {
    let mut first = true;
    for reply in replies {
        for line in wrap_lines(&reply.text, MAX_LINE_LEN) {
            if !first {
                tokio::time::sleep(LINE_DELAY).await;
            }
            first = false;
            if reply.action {
                handle.action(target, &line).await?;
            } else {
                handle.privmsg(target, &line).await?;
            }
        }
    }
    Ok(())
}

/// Wrap text into lines of at most `max_len` bytes, breaking on word
/// boundaries. A single word longer than `max_len` is split on a char
/// boundary.
fn wrap_lines(text: &str, max_len: usize) -> Vec<String> {
    let mut result = Vec::new();
    for line in text.lines() {
        if line.len() <= max_len {
            if !line.is_empty() {
                result.push(line.to_string());
            }
            continue;
        }
        let mut current = String::new();
        for word in line.split_whitespace() {
            if !current.is_empty() && current.len() + word.len() + 1 > max_len {
                result.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            while current.len() > max_len {
                let mut cut = max_len;
                while !current.is_char_boundary(cut) {
                    cut -= 1;
                }
                let rest = current.split_off(cut);
                result.push(std::mem::replace(&mut current, rest));
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bender_sdk::client::Command;

    #[test]
    fn short_lines_pass_through() {
        assert_eq!(wrap_lines("hello\nworld", 400), vec!["hello", "world"]);
        assert!(wrap_lines("", 400).is_empty());
    }

    #[test]
    fn long_lines_wrap_on_words() {
        let lines = wrap_lines("aaa bbb ccc ddd", 7);
        assert_eq!(lines, vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn long_words_are_split() {
        let lines = wrap_lines("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
        for line in wrap_lines("æøåæøåæøå", 5) {
            assert!(line.len() <= 5);
        }
    }

    #[tokio::test]
    async fn replies_become_commands() {
        let (handle, mut rx) = ClientHandle::detached(8);
        let replies = vec![Reply::say("hi there"), Reply::act("waves")];
        send_replies(&handle, "#bender", &replies).await.unwrap();

        match rx.recv().await.unwrap() {
            Command::Privmsg { target, text } => {
                assert_eq!(target, "#bender");
                assert_eq!(text, "hi there");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), Command::Action { text, .. } if text == "waves"));
    }
}
