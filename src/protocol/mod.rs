//! Kafka wire-protocol types: the numeric API/error catalogs, the request
//! envelope, and the per-API payloads this crate speaks (`Offset`,
//! `OffsetCommit`, `OffsetFetch`, and the `Message`/`MessageSet` framing
//! they carry).

use std::mem;

use bytes::{ByteOrder, BytesMut};

use errors::Result;

mod header;
mod message;
mod offset;
mod offset_commit;
mod offset_fetch;

pub use self::header::{parse_response_header, RequestHeader, ResponseHeader};
pub use self::message::{Message, MessageSet};
pub use self::offset::{
    OffsetRequest, OffsetRequestPartition, OffsetRequestTopic, OffsetResponse,
    OffsetResponsePartition, OffsetResponseTopic, API_KEY_OFFSETS, EARLIEST_OFFSET,
    LATEST_OFFSET,
};
pub use self::offset_commit::{
    OffsetCommitRequest, OffsetCommitRequestPartition, OffsetCommitRequestTopic,
    OffsetCommitResponse, OffsetCommitResponsePartition, OffsetCommitResponseTopic,
    API_KEY_OFFSET_COMMIT,
};
pub use self::offset_fetch::{
    OffsetFetchRequest, OffsetFetchRequestTopic, OffsetFetchResponse,
    OffsetFetchResponsePartition, OffsetFetchResponseTopic, API_KEY_OFFSET_FETCH,
};

/// The numeric API key of a request, as the wire protocol defines it.
pub type ApiKey = i16;
/// A per-API protocol version.
pub type ApiVersion = i16;
/// Caller-chosen id a broker echoes back so responses can be matched to
/// the request that produced them.
pub type CorrelationId = i32;
/// The numeric error code a broker returns; see `KafkaCode`.
pub type ErrorCode = i16;
/// A topic-partition index, `0..partition_count`.
pub type PartitionId = i32;
/// The next record index to consume in a partition.
pub type Offset = i64;
/// The broker-assigned consumer group epoch.
pub type GenerationId = i32;

/// The API keys this crate speaks. Kept numbered the same as the full
/// Kafka protocol catalog (not every key named here has a request type in
/// this crate — `GroupCoordinator`/`JoinGroup`/etc. are the external
/// Manager/Supervisor's concern) so a `KafkaCode` or `UnexpectedResponse`
/// error naming one of them is unambiguous.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Fetch = 1,
    Offsets = 2,
    Metadata = 3,
    LeaderAndIsr = 4,
    StopReplica = 5,
    UpdateMetadata = 6,
    ControlledShutdown = 7,
    OffsetCommit = 8,
    OffsetFetch = 9,
    GroupCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    DescribeGroups = 15,
    ListGroups = 16,
    SaslHandshake = 17,
    ApiVersions = 18,
    CreateTopics = 19,
    DeleteTopics = 20,
}

/// Various errors reported by a remote Kafka server.
///
/// We use numeric codes to indicate what problem occurred on the server.
/// These can be translated by the client into exceptions or whatever the
/// appropriate error handling mechanism in the client language is.
///
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i16)]
pub enum KafkaCode {
    /// The server experienced an unexpected error when processing the request
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The broker returns this error code for an offset fetch request
    /// if it is still loading offsets (after a leader change for that
    /// offsets topic partition), or in response to group membership
    /// requests (such as heartbeats) when group metadata is being
    /// loaded by the coordinator.
    GroupLoadInProgress = 14,
    /// The broker returns this error code for group coordinator
    /// requests, offset commits, and most group management requests
    /// if the offsets topic has not yet been created, or if the group
    /// coordinator is not active.
    GroupCoordinatorNotAvailable = 15,
    /// The broker returns this error code if it receives an offset
    /// fetch or commit request for a group that it is not a
    /// coordinator for.
    NotCoordinatorForGroup = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    /// Returned from group membership requests (such as heartbeats) when
    /// the generation id provided in the request is not the current
    /// generation.
    IllegalGeneration = 22,
    /// Returned in join group when the member provides a protocol type or
    /// set of protocols which is not compatible with the current group.
    InconsistentGroupProtocol = 23,
    /// Returned in join group when the groupId is empty or null.
    InvalidGroupId = 24,
    /// Returned from group requests (offset commits/fetches, heartbeats,
    /// etc) when the memberId is not in the current generation.
    UnknownMemberId = 25,
    /// Return in join group when the requested session timeout is outside
    /// of the allowed range on the broker
    InvalidSessionTimeout = 26,
    /// Returned in heartbeat requests when the coordinator has begun
    /// rebalancing the group. This indicates to the client that it
    /// should rejoin the group.
    RebalanceInProgress = 27,
    /// This error indicates that an offset commit was rejected because of
    /// oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// Returned by the broker when the client is not authorized to access
    /// a particular groupId.
    GroupAuthorizationFailed = 30,
    /// Returned by the broker when the client is not authorized to use an
    /// inter-broker or administrative API.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    /// Topic with this name already exists.
    TopicAlreadyExists = 36,
    /// Number of partitions is invalid.
    InvalidPartitions = 37,
    /// Replication-factor is invalid.
    InvalidReplicationFactor = 38,
    /// Replica assignment is invalid.
    InvalidReplicaAssignment = 39,
    /// Configuration is invalid.
    InvalidConfig = 40,
    /// This is not the correct controller for this cluster.
    NotController = 41,
    /// This most likely occurs because of a request being malformed by the client library
    /// or the message was sent to an incompatible broker. See the broker logs for more details.
    InvalidRequest = 42,
    /// The message format version on the broker does not support the request.
    UnsupportedForMessageFormat = 43,
    /// Request parameters do not satisfy the configured policy.
    PolicyViolation = 44,
}

impl From<ErrorCode> for KafkaCode {
    fn from(code: ErrorCode) -> Self {
        if code >= -1 && code <= 44 {
            // Safe: the discriminants above are a contiguous i16 range
            // with no gaps, so any value in range has a matching variant.
            unsafe { mem::transmute(code) }
        } else {
            KafkaCode::Unknown
        }
    }
}

/// Small capability interface each per-API request type implements, per
/// the design note in spec.md §9: no shared dispatch trait object, just
/// the four attributes a request carries plus its own encoder.
pub trait Request {
    fn api_key(&self) -> ApiKey;
    fn api_version(&self) -> ApiVersion;
    fn has_response(&self) -> bool {
        true
    }
    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_code_from_error_code() {
        assert_eq!(KafkaCode::from(0), KafkaCode::None);
        assert_eq!(KafkaCode::from(3), KafkaCode::UnknownTopicOrPartition);
        assert_eq!(KafkaCode::from(22), KafkaCode::IllegalGeneration);
        assert_eq!(KafkaCode::from(-1), KafkaCode::Unknown);
        assert_eq!(KafkaCode::from(999), KafkaCode::Unknown);
    }
}
