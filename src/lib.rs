#![recursion_limit = "128"]
#![allow(dead_code)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
extern crate bytes;
#[macro_use]
extern crate nom;
extern crate crc;

extern crate futures;
extern crate tokio_core;
extern crate tokio_timer;

#[cfg(test)]
extern crate pretty_env_logger;

#[macro_use]
pub mod errors;
#[macro_use]
mod codec;
mod protocol;
mod network;
mod consumer;

pub use errors::{Error, ErrorKind};
pub use codec::{decode_array, decode_bytes, decode_string, encode_array, encode_bytes, encode_string};
pub use protocol::{
    ApiKeys, KafkaCode, Message, MessageSet, OffsetCommitRequest, OffsetCommitResponse,
    OffsetFetchRequest, OffsetFetchResponse, OffsetRequest, OffsetResponse, EARLIEST_OFFSET,
    LATEST_OFFSET,
};
pub use network::{Connection, KafkaRequest, KafkaResponse, StaticBoxFuture};
pub use consumer::{CommittedOffset, Generation, OffsetManager, OffsetManagerConfig, OffsetStorage};
