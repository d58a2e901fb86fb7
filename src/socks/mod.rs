//! SOCKS5 protocol for Fwdsocks
//!
//! Wire codec, the per-connection handshake state machine, destination name
//! resolution and the bidirectional relay that carries a tunnel once it is
//! established. Only the no-authentication method and the CONNECT command
//! are served; BIND and UDP ASSOCIATE are answered with "command not supported".

pub mod codec;
mod consts;
pub mod relay;
mod resolver;
mod session;
mod types;

pub use consts::*;
pub use relay::{relay, RelayStats};
pub use resolver::{HostsResolver, Resolver, StaticResolver, SystemResolver};
pub use session::{select_method, Session, SessionReport, SessionState};
pub use types::{
    AddrType, Command, ConnectionReply, ConnectionRequest, Method, NegotiationRequest, TargetAddr,
};
