pub mod codec;
pub mod command;
pub mod handshake;
pub mod packet;

pub use codec::FrameCodec;
pub use command::{next_request_id, Command, Document};
pub use handshake::{decode_handshake, handshake_commands, BuildInfoReply, HelloReply};
pub use packet::Frame;
