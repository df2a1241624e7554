//! Message catalogue: type tags, payload shapes and the `Message` sum type

use super::wire::{WireReader, WireWriter};
use super::{get_message_type, MsgError, TAG_LEN};

/// Key code for Enter in [`MessageKey::key`]
pub const KEY_ENTER: u8 = 13;
pub const KEY_BACKSPACE: u8 = 8;
pub const KEY_ESCAPE: u8 = 27;

/// Values of the `action` field of key and mouse button messages
pub const ACTION_RELEASE: u8 = 0;
pub const ACTION_PRESS: u8 = 1;
pub const ACTION_REPEAT: u8 = 2;

/// Dispatch tag carried in the first two bytes of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    MousePos = 1,
    MouseScroll = 2,
    MouseButton = 3,
    Character = 4,
    Key = 5,
    Clear = 6,
    CommandPrompt = 7,
    MoveTerminal = 8,
    PutChar = 9,
    SetCharAt = 10,
    TokenizedCommand = 11,
}

impl MessageType {
    pub const ALL: [MessageType; 11] = [
        MessageType::MousePos,
        MessageType::MouseScroll,
        MessageType::MouseButton,
        MessageType::Character,
        MessageType::Key,
        MessageType::Clear,
        MessageType::CommandPrompt,
        MessageType::MoveTerminal,
        MessageType::PutChar,
        MessageType::SetCharAt,
        MessageType::TokenizedCommand,
    ];

    pub fn from_tag(tag: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::MousePos => "MousePos",
            MessageType::MouseScroll => "MouseScroll",
            MessageType::MouseButton => "MouseButton",
            MessageType::Character => "Character",
            MessageType::Key => "Key",
            MessageType::Clear => "Clear",
            MessageType::CommandPrompt => "CommandPrompt",
            MessageType::MoveTerminal => "MoveTerminal",
            MessageType::PutChar => "PutChar",
            MessageType::SetCharAt => "SetCharAt",
            MessageType::TokenizedCommand => "TokenizedCommand",
        }
    }
}

/// A payload with a fixed wire shape bound to one dispatch tag
pub trait WirePayload: Sized {
    const TYPE: MessageType;

    fn write_payload(&self, out: &mut WireWriter);

    fn read_payload(reader: &mut WireReader<'_>) -> Result<Self, MsgError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageMousePos {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageMouseScroll {
    pub x: f64,
    pub y: f64,
    pub holding_control: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMouseButton {
    pub button: u8,
    pub action: u8,
    pub modifier: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCharacter {
    pub rune: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageKey {
    pub key: u8,
    pub scan: u32,
    pub action: u8,
    pub modifier: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageClear;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageCommandPrompt {
    pub text: String,
}

/// Translation of a terminal's bounds, in GL units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageMoveTerminal {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagePutChar {
    pub ch: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSetCharAt {
    pub x: u32,
    pub y: u32,
    pub ch: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageTokenizedCommand {
    pub command: String,
    pub args: Vec<String>,
}

impl MessageTokenizedCommand {
    /// The command line as it is written to a shell
    ///
    /// Words that are not plain barewords are single-quoted, so a shell sees
    /// exactly `command` and `args` again.
    pub fn to_line(&self) -> String {
        let mut line = shell_quote(&self.command);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        line.push('\n');
        line
    }
}

fn shell_quote(word: &str) -> String {
    let bare = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=+,@%".contains(c));
    if bare {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "'\\''"))
}

impl WirePayload for MessageMousePos {
    const TYPE: MessageType = MessageType::MousePos;

    fn write_payload(&self, out: &mut WireWriter) {
        out.f64(self.x);
        out.f64(self.y);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self {
            x: r.f64()?,
            y: r.f64()?,
        })
    }
}

impl WirePayload for MessageMouseScroll {
    const TYPE: MessageType = MessageType::MouseScroll;

    fn write_payload(&self, out: &mut WireWriter) {
        out.f64(self.x);
        out.f64(self.y);
        out.bool(self.holding_control);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self {
            x: r.f64()?,
            y: r.f64()?,
            holding_control: r.bool()?,
        })
    }
}

impl WirePayload for MessageMouseButton {
    const TYPE: MessageType = MessageType::MouseButton;

    fn write_payload(&self, out: &mut WireWriter) {
        out.u8(self.button);
        out.u8(self.action);
        out.u8(self.modifier);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self {
            button: r.u8()?,
            action: r.u8()?,
            modifier: r.u8()?,
        })
    }
}

impl WirePayload for MessageCharacter {
    const TYPE: MessageType = MessageType::Character;

    fn write_payload(&self, out: &mut WireWriter) {
        out.char(self.rune);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self { rune: r.char()? })
    }
}

impl WirePayload for MessageKey {
    const TYPE: MessageType = MessageType::Key;

    fn write_payload(&self, out: &mut WireWriter) {
        out.u8(self.key);
        out.u32(self.scan);
        out.u8(self.action);
        out.u8(self.modifier);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self {
            key: r.u8()?,
            scan: r.u32()?,
            action: r.u8()?,
            modifier: r.u8()?,
        })
    }
}

impl WirePayload for MessageClear {
    const TYPE: MessageType = MessageType::Clear;

    fn write_payload(&self, _out: &mut WireWriter) {}

    fn read_payload(_r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self)
    }
}

impl WirePayload for MessageCommandPrompt {
    const TYPE: MessageType = MessageType::CommandPrompt;

    fn write_payload(&self, out: &mut WireWriter) {
        out.string(&self.text);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self { text: r.string()? })
    }
}

impl WirePayload for MessageMoveTerminal {
    const TYPE: MessageType = MessageType::MoveTerminal;

    fn write_payload(&self, out: &mut WireWriter) {
        out.f32(self.x);
        out.f32(self.y);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self {
            x: r.f32()?,
            y: r.f32()?,
        })
    }
}

impl WirePayload for MessagePutChar {
    const TYPE: MessageType = MessageType::PutChar;

    fn write_payload(&self, out: &mut WireWriter) {
        out.char(self.ch);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self { ch: r.char()? })
    }
}

impl WirePayload for MessageSetCharAt {
    const TYPE: MessageType = MessageType::SetCharAt;

    fn write_payload(&self, out: &mut WireWriter) {
        out.u32(self.x);
        out.u32(self.y);
        out.char(self.ch);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self {
            x: r.u32()?,
            y: r.u32()?,
            ch: r.char()?,
        })
    }
}

impl WirePayload for MessageTokenizedCommand {
    const TYPE: MessageType = MessageType::TokenizedCommand;

    fn write_payload(&self, out: &mut WireWriter) {
        out.string(&self.command);
        out.strings(&self.args);
    }

    fn read_payload(r: &mut WireReader<'_>) -> Result<Self, MsgError> {
        Ok(Self {
            command: r.string()?,
            args: r.strings()?,
        })
    }
}

/// Any message of the catalogue, decoded
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    MousePos(MessageMousePos),
    MouseScroll(MessageMouseScroll),
    MouseButton(MessageMouseButton),
    Character(MessageCharacter),
    Key(MessageKey),
    Clear(MessageClear),
    CommandPrompt(MessageCommandPrompt),
    MoveTerminal(MessageMoveTerminal),
    PutChar(MessagePutChar),
    SetCharAt(MessageSetCharAt),
    TokenizedCommand(MessageTokenizedCommand),
}

macro_rules! impl_from_payload {
    ($($variant:ident($payload:ty)),* $(,)?) => {
        $(
            impl From<$payload> for Message {
                fn from(payload: $payload) -> Self {
                    Message::$variant(payload)
                }
            }
        )*
    };
}

impl_from_payload!(
    MousePos(MessageMousePos),
    MouseScroll(MessageMouseScroll),
    MouseButton(MessageMouseButton),
    Character(MessageCharacter),
    Key(MessageKey),
    Clear(MessageClear),
    CommandPrompt(MessageCommandPrompt),
    MoveTerminal(MessageMoveTerminal),
    PutChar(MessagePutChar),
    SetCharAt(MessageSetCharAt),
    TokenizedCommand(MessageTokenizedCommand),
);

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::MousePos(_) => MessageType::MousePos,
            Message::MouseScroll(_) => MessageType::MouseScroll,
            Message::MouseButton(_) => MessageType::MouseButton,
            Message::Character(_) => MessageType::Character,
            Message::Key(_) => MessageType::Key,
            Message::Clear(_) => MessageType::Clear,
            Message::CommandPrompt(_) => MessageType::CommandPrompt,
            Message::MoveTerminal(_) => MessageType::MoveTerminal,
            Message::PutChar(_) => MessageType::PutChar,
            Message::SetCharAt(_) => MessageType::SetCharAt,
            Message::TokenizedCommand(_) => MessageType::TokenizedCommand,
        }
    }

    /// Tag followed by payload
    pub fn encode(&self) -> Vec<u8> {
        let mut out = WireWriter::new();
        out.u16(self.message_type().tag());
        match self {
            Message::MousePos(m) => m.write_payload(&mut out),
            Message::MouseScroll(m) => m.write_payload(&mut out),
            Message::MouseButton(m) => m.write_payload(&mut out),
            Message::Character(m) => m.write_payload(&mut out),
            Message::Key(m) => m.write_payload(&mut out),
            Message::Clear(m) => m.write_payload(&mut out),
            Message::CommandPrompt(m) => m.write_payload(&mut out),
            Message::MoveTerminal(m) => m.write_payload(&mut out),
            Message::PutChar(m) => m.write_payload(&mut out),
            Message::SetCharAt(m) => m.write_payload(&mut out),
            Message::TokenizedCommand(m) => m.write_payload(&mut out),
        }
        out.into_vec()
    }

    /// Identify the tag and decode the typed payload
    ///
    /// Buffers shorter than a tag report [`MsgError::UnknownMessageType`] with the
    /// sentinel tag; known tags with a short or undecodable payload report
    /// [`MsgError::MalformedPayload`].
    pub fn decode(bytes: &[u8]) -> Result<Self, MsgError> {
        let tag = get_message_type(bytes);
        let kind = MessageType::from_tag(tag).ok_or(MsgError::UnknownMessageType(tag))?;
        let body = &bytes[TAG_LEN..];

        Ok(match kind {
            MessageType::MousePos => Message::MousePos(read_body(body)?),
            MessageType::MouseScroll => Message::MouseScroll(read_body(body)?),
            MessageType::MouseButton => Message::MouseButton(read_body(body)?),
            MessageType::Character => Message::Character(read_body(body)?),
            MessageType::Key => Message::Key(read_body(body)?),
            MessageType::Clear => Message::Clear(read_body(body)?),
            MessageType::CommandPrompt => Message::CommandPrompt(read_body(body)?),
            MessageType::MoveTerminal => Message::MoveTerminal(read_body(body)?),
            MessageType::PutChar => Message::PutChar(read_body(body)?),
            MessageType::SetCharAt => Message::SetCharAt(read_body(body)?),
            MessageType::TokenizedCommand => Message::TokenizedCommand(read_body(body)?),
        })
    }
}

fn read_body<T: WirePayload>(body: &[u8]) -> Result<T, MsgError> {
    let mut reader = WireReader::new(body, T::TYPE.name());
    T::read_payload(&mut reader)
}
