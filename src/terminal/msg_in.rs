//! Inbound message handling for a terminal

use super::Terminal;
use crate::msg::{
    Message, MessageKey, MessageMouseScroll, MessageTokenizedCommand, MsgError, ACTION_RELEASE,
    KEY_ENTER,
};

/// Work a message leaves for the terminal stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEffect {
    /// A tokenized command ready for execution
    Command(MessageTokenizedCommand),
}

impl Terminal {
    /// Decode `bytes` and apply it
    ///
    /// Unknown tags are logged and discarded. A known tag with a bad payload
    /// is returned as [`MsgError::MalformedPayload`] and leaves the state alone.
    pub fn unpack_message(&mut self, bytes: &[u8]) -> Result<Option<TerminalEffect>, MsgError> {
        match Message::decode(bytes) {
            Ok(message) => Ok(self.apply(message)),
            Err(MsgError::UnknownMessageType(tag)) => {
                tracing::warn!(
                    terminal = %self.id(),
                    "Discarding message with unknown type {}",
                    tag
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply an already decoded message
    pub fn apply(&mut self, message: Message) -> Option<TerminalEffect> {
        tracing::debug!(terminal = %self.id(), "Applying {}", message.message_type().name());

        match message {
            Message::Clear(_) => self.state.clear(),
            Message::CommandPrompt(m) => self.state.update_command_prompt(m.text),
            Message::MoveTerminal(m) => self.state.move_by(m.x, m.y),
            Message::PutChar(m) => self.put_character(m.ch),
            Message::SetCharAt(m) => self.state.set_character_at(m.x as usize, m.y as usize, m.ch),
            Message::TokenizedCommand(m) => return Some(TerminalEffect::Command(m)),
            Message::Key(m) => self.on_key(m),
            Message::MouseScroll(m) => self.on_mouse_scroll(m),
            other @ (Message::MousePos(_) | Message::MouseButton(_) | Message::Character(_)) => {
                tracing::warn!(
                    terminal = %self.id(),
                    "Unhandled message type {}",
                    other.message_type().name()
                );
            }
        }

        None
    }

    fn put_character(&mut self, ch: char) {
        if ch == '\n' {
            self.state.new_line();
        } else {
            self.state.insert_char(ch);
        }
    }

    fn on_key(&mut self, m: MessageKey) {
        // Only Enter does anything for now
        if m.key == KEY_ENTER && m.action != ACTION_RELEASE {
            self.state.new_line();
        }
    }

    fn on_mouse_scroll(&mut self, m: MessageMouseScroll) {
        // x is sideways scrolling, which most mice can't do
        if m.holding_control {
            self.state.rescale(m.y);
        } else {
            self.state.scroll(m.y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{
        MessageClear, MessageCommandPrompt, MessageMoveTerminal, MessagePutChar, MessageSetCharAt,
        TerminalId, ACTION_PRESS,
    };
    use crate::terminal::{Rect, TerminalDefaults};

    fn terminal() -> Terminal {
        Terminal::new(TerminalId(1), &TerminalDefaults::default())
    }

    fn send(term: &mut Terminal, message: impl Into<Message>) -> Option<TerminalEffect> {
        term.unpack_message(&message.into().encode()).unwrap()
    }

    #[test]
    fn test_put_char_advances_flow_position() {
        let mut term = terminal();
        send(&mut term, MessagePutChar { ch: 'h' });
        send(&mut term, MessagePutChar { ch: 'i' });
        assert_eq!(term.state().bodies, vec!["hi"]);
        assert_eq!(term.state().cursor.x, 2);
    }

    #[test]
    fn test_clear_resets_flow_position() {
        let mut term = terminal();
        send(&mut term, MessagePutChar { ch: 'a' });
        send(&mut term, MessagePutChar { ch: '\n' });
        send(&mut term, MessagePutChar { ch: 'b' });
        send(&mut term, MessageClear);
        assert_eq!(term.state().bodies, vec![""]);
        assert_eq!(term.state().cursor.y, 0);
        assert_eq!(term.state().cursor.x, 0);
    }

    #[test]
    fn test_command_prompt_replaced() {
        let mut term = terminal();
        send(&mut term, MessageCommandPrompt { text: "one".into() });
        send(&mut term, MessageCommandPrompt { text: "$ ".into() });
        assert_eq!(term.state().prompt, "$ ");
    }

    #[test]
    fn test_move_terminal_translates_bounds() {
        let mut term = terminal();
        let before = term.state().bounds;
        send(&mut term, MessageMoveTerminal { x: 0.25, y: -0.5 });
        let after = term.state().bounds;
        assert!((after.left - (before.left + 0.25)).abs() < 1e-6);
        assert!((after.bottom - (before.bottom - 0.5)).abs() < 1e-6);
        assert!((after.width() - before.width()).abs() < 1e-6);
    }

    #[test]
    fn test_set_char_at_leaves_cursor() {
        let mut term = terminal();
        send(&mut term, MessageSetCharAt { x: 3, y: 1, ch: '#' });
        assert_eq!(term.state().bodies, vec!["", "   #"]);
        assert_eq!(term.state().cursor.x, 0);
        assert_eq!(term.state().cursor.y, 0);
    }

    #[test]
    fn test_set_char_at_far_coordinates_is_ignored() {
        let mut term = terminal();
        send(&mut term, MessagePutChar { ch: 'a' });
        let before = term.state().clone();

        let effect = send(
            &mut term,
            MessageSetCharAt {
                x: 0,
                y: u32::MAX,
                ch: 'x',
            },
        );
        assert!(effect.is_none());
        send(
            &mut term,
            MessageSetCharAt {
                x: u32::MAX,
                y: u32::MAX,
                ch: 'x',
            },
        );
        assert_eq!(term.state(), &before);
    }

    #[test]
    fn test_enter_starts_new_line_on_press_only() {
        let mut term = terminal();
        let mut key = MessageKey {
            key: KEY_ENTER,
            scan: 28,
            action: ACTION_PRESS,
            modifier: 0,
        };
        send(&mut term, key);
        key.action = ACTION_RELEASE;
        send(&mut term, key);
        assert_eq!(term.state().cursor.y, 1);
        assert_eq!(term.state().bodies.len(), 2);
    }

    #[test]
    fn test_other_keys_are_ignored() {
        let mut term = terminal();
        let before = term.state().clone();
        let effect = send(
            &mut term,
            MessageKey {
                key: b'a',
                scan: 30,
                action: ACTION_PRESS,
                modifier: 0,
            },
        );
        assert!(effect.is_none());
        assert_eq!(term.state(), &before);
    }

    #[test]
    fn test_tokenized_command_becomes_effect() {
        let mut term = terminal();
        let cmd = MessageTokenizedCommand {
            command: "echo".into(),
            args: vec!["hi".into()],
        };
        let effect = send(&mut term, cmd.clone());
        assert_eq!(effect, Some(TerminalEffect::Command(cmd)));
    }

    #[test]
    fn test_control_scroll_rescales() {
        let mut term = terminal();
        let width = term.state().bounds.width();
        let char_w = term.state().char_size.x;
        send(
            &mut term,
            MessageMouseScroll {
                x: 0.0,
                y: 5.0,
                holding_control: true,
            },
        );
        assert!((term.state().bounds.width() - width * 1.1).abs() < 1e-5);
        assert!((term.state().char_size.x - char_w * 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_rescale_below_minimum_is_rejected() {
        let mut term = Terminal::new(
            TerminalId(1),
            &TerminalDefaults {
                bounds: Rect::new(0.0, 0.0, 1.0, 0.21),
                columns: 10,
                rows: 2,
                ..TerminalDefaults::default()
            },
        );
        let before = term.state().clone();
        send(
            &mut term,
            MessageMouseScroll {
                x: 0.0,
                y: -1.0,
                holding_control: true,
            },
        );
        assert_eq!(term.state().bounds, before.bounds);
        assert_eq!(term.state().char_size, before.char_size);
    }

    #[test]
    fn test_plain_scroll_stays_within_offscreen_range() {
        let mut term = terminal();
        for _ in 0..30 {
            send(&mut term, MessagePutChar { ch: '\n' });
        }
        let limit = term.state().offscreen_length();
        assert!(limit > 0.0);

        let scroll = |y| MessageMouseScroll {
            x: 0.0,
            y,
            holding_control: false,
        };
        send(&mut term, scroll(1000.0));
        assert_eq!(term.state().scroll_offset, -limit);
        send(&mut term, scroll(-1000.0));
        assert_eq!(term.state().scroll_offset, 0.0);
    }

    #[test]
    fn test_unknown_type_changes_nothing() {
        let mut term = terminal();
        let before = term.state().clone();
        let effect = term.unpack_message(&[0xff, 0x7f, 1, 2, 3]).unwrap();
        assert!(effect.is_none());
        assert_eq!(term.state(), &before);
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let mut term = terminal();
        let before = term.state().clone();
        let result = term.unpack_message(&[9, 0, b'A']);
        assert!(matches!(result, Err(MsgError::MalformedPayload { .. })));
        assert_eq!(term.state(), &before);
    }
}
