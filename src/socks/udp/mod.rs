//! UDP ASSOCIATE support
//!
//! Header parsing, the datagram framing used on the control connection,
//! and the relay that pumps datagrams between the two.

mod associate;
mod header;
mod session;
mod tunnel;

pub use associate::{handle_associate, run_udp_relay};
pub use header::{encode_udp_datagram, parse_udp_datagram, UdpDatagram};
pub use session::UdpSession;
pub use tunnel::UdpAssociateCodec;
