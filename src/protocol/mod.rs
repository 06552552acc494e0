//! Wire protocol shared by coordinator, node clients and the poller
//!
//! Every exchange is one TCP connection carrying one request frame and at
//! most one reply frame:
//!
//! - **Frame**: `[8 uppercase hex digits] + [JSON body]`, see [`frame`]
//! - **Request**: `{"group_name", "client_name", "request", "hostname", "role", "message"}`
//! - **Success reply**: `{"group", "count", "clients": {name: last_request}}`
//! - **Not ready**: the connection is closed with zero bytes written

pub mod frame;
pub mod message;

pub use frame::{decode, encode, read_body, read_frame, write_frame, DEFAULT_MAX_FRAME_LEN, HEADER_LEN};
pub use message::{read_reply, GroupSnapshot, Reply, Request, RequestKind};
