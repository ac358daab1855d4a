pub mod admission;
pub mod blob;
pub mod channels;
pub mod codec;
pub mod datagram;
pub mod framing;
pub mod output_router;
pub mod protocol;
pub mod server;
pub mod udp;

pub use blob::{content_hash, HashedBlob};
pub use codec::{CodecError, Decode, Encode, PacketReader, PacketWriter};
pub use datagram::{ClientDatagram, NotifyKind, ServerDatagram};
pub use framing::{Frame, FrameDecoder, FrameError};
pub use protocol::{ChatChannel, ClientPacket, ServerPacket, VesselAction};
