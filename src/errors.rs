//! Crate-wide error type.
//!
//! Generated with `error_chain!`, the same macro and the same two
//! `foreign_links` the teacher's client carries: a malformed wire read is
//! never a panic, and a broker protocol error is always a named `KafkaCode`,
//! never a bare numeric code threaded through `unwrap()`.

use nom;

use protocol::{ApiKey, KafkaCode, PartitionId};

error_chain! {
    foreign_links {
        IoError(::std::io::Error);
        ParseError(nom::ErrorKind);
    }

    errors {
        /// A declared STRING/BYTES/ARRAY length ran past the end of the
        /// buffer, or a record failed CRC verification in strict mode.
        Malformed(reason: &'static str) {
            description("malformed wire data")
            display("malformed wire data: {}", reason)
        }

        /// The broker answered with a named protocol error code.
        KafkaError(code: KafkaCode) {
            description("kafka broker error")
            display("kafka broker error: {:?}", code)
        }

        /// A response arrived that doesn't match the API the caller sent.
        UnexpectedResponse(api_key: ApiKey) {
            description("unexpected response")
            display("unexpected response for api key {}", api_key)
        }

        /// `offset_commit`/`offset_fetch` addressed a partition outside
        /// `[0, partitions)` for the topic this manager owns.
        UnknownPartition(partition: PartitionId) {
            description("unknown partition")
            display("partition {} is out of range for this topic", partition)
        }
    }
}
