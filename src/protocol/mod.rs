//! Wire protocol: frame envelope, inner message, compression, and the
//! method-to-command registry.
//!
//! Bytes on the wire travel as [`Frame`]s (magic + version + flags +
//! length-prefixed body). A frame body, once decompressed, decodes into a
//! [`Message`] (command + request id + payload). Command numbering is owned
//! by the process-wide mapper in [`mapper`].

pub mod commands;
mod compress;
mod frame;
mod mapper;
mod message;

pub use compress::{decode_frame_body, encode_frame_body, validate_flags};
pub use frame::{
    decode_frame, Frame, FLAG_COMPRESSED, FLAG_ENCRYPTED, FLAG_ONE_WAY, FRAME_HEADER_LEN,
    FRAME_MAGIC, FRAME_VERSION, MAX_FRAME_BODY,
};
pub use mapper::{
    map_method_to_command, register_full_method_command, register_method_command,
    set_strict_command_mapping, CommandMap,
};
pub use message::{Message, MESSAGE_HEADER_LEN};
