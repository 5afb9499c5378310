//! Structured user input

const LINE_ENDINGS: &[char] = &['\r', '\n'];

/// Input token that sends the payload point-to-point via the relay
pub const DIRECT_TOKEN: &str = "/U/";

/// Input token that sends the payload to the multicast group
pub const MULTICAST_TOKEN: &str = "/M/";

/// One action requested by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send text over the chat stream
    Chat(String),
    /// Send the payload through the datagram relay
    SendDirect,
    /// Send the payload to the multicast group
    SendMulticast,
}

impl Command {
    /// Interpret one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(LINE_ENDINGS);
        if line.trim().is_empty() {
            return None;
        }

        Some(match line.trim() {
            DIRECT_TOKEN => Command::SendDirect,
            MULTICAST_TOKEN => Command::SendMulticast,
            _ => Command::Chat(line.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_lines() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("\n"), None);
        assert_eq!(Command::parse("   \r\n"), None);
    }

    #[test]
    fn test_tokens() {
        assert_eq!(Command::parse("/U/\n"), Some(Command::SendDirect));
        assert_eq!(Command::parse("/M/"), Some(Command::SendMulticast));
    }

    #[test]
    fn test_chat_text() {
        assert_eq!(
            Command::parse("hello world\n"),
            Some(Command::Chat("hello world".into()))
        );
        // Tokens only count on their own
        assert_eq!(
            Command::parse("try /U/ now"),
            Some(Command::Chat("try /U/ now".into()))
        );
    }
}
