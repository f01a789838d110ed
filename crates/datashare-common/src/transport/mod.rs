//! DataShare transport layer
//!
//! The protocol core only needs the [`RemoteObject`] / [`RequestHandler`]
//! seams. This module also ships the TCP binding of those seams:
//!
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [frame body]`
//! - **Request body**: `[u32 command] + [parcel]`
//! - **Reply body**: `[i32 status] + [parcel]`
//! - **Max Frame Size**: 16 MiB, checked before the body is allocated
//!
//! # Components
//!
//! - **[`FrameCodec`]**: encode/decode frame bodies
//! - **[`TcpTransport`]** / **[`TcpTransportAsync`]**: length-prefixed IO
//! - **[`TcpRemote`]**: a [`RemoteObject`] with peer-death detection
//! - **[`TcpServer`]**: async server dispatching to a [`RequestHandler`]
//!
//! # Example
//!
//! ```no_run
//! use datashare_common::protocol::{DataShareCommand, Parcel, INTERFACE_TOKEN};
//! use datashare_common::transport::{RemoteObject, TcpRemote};
//!
//! let remote = TcpRemote::connect("127.0.0.1:7600").unwrap();
//! let mut data = Parcel::with_interface_token(INTERFACE_TOKEN).unwrap();
//! data.write("datashare:///com.example/people").unwrap();
//! let reply = remote.send_request(DataShareCommand::GetType.code(), &data).unwrap();
//! ```

pub mod codec;
pub mod remote;
pub mod tcp;
pub mod tcp_server;

pub use codec::{FrameCodec, ReplyFrame, RequestFrame, MAX_FRAME_SIZE};
pub use remote::{DeathRecipient, RemoteObject, RequestHandler};
pub use tcp::{TcpRemote, TcpTransport, TcpTransportAsync};
pub use tcp_server::TcpServer;
