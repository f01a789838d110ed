//! DataShare Common Types and Transport
//!
//! This crate provides the protocol core shared by DataShare clients and
//! providers: the typed wire codec, the command table, the transport seams
//! with their TCP binding, and the subscription registry.
//!
//! # Overview
//!
//! DataShare lets independent processes read, write and subscribe to data
//! exposed by a provider process, addressed by URI. Everything that crosses
//! a process boundary is written into a [`Parcel`](protocol::Parcel):
//!
//! - **Protocol Layer**: values, predicates, buckets, templates, results
//! - **Transport Layer**: [`RemoteObject`](transport::RemoteObject) /
//!   [`RequestHandler`](transport::RequestHandler) and a length-prefixed TCP
//!   binding
//! - **Registry**: observer interest keyed by URI, template or subscriber
//!
//! # Example
//!
//! ```
//! use datashare_common::protocol::{Parcel, Predicates, ValuesBucket, Uri};
//!
//! let uri = Uri::parse("datashare:///com.example/people").unwrap();
//! let predicates = Predicates::new().equal_to("name", "Rose");
//! let bucket = ValuesBucket::new().with("age", 31i64);
//!
//! let mut parcel = Parcel::new();
//! datashare_common::marshal!(parcel, uri, predicates, bucket).unwrap();
//!
//! let mut reader = parcel.reader();
//! assert_eq!(reader.read::<Uri>().unwrap().as_str(), "datashare:///com.example/people");
//! ```

pub mod protocol;
pub mod registry;
pub mod transport;

pub use protocol::*;
pub use registry::SubscriptionRegistry;
