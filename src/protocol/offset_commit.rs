//! The `OffsetCommit` API (`api_key = 8`): v0 for `zookeeper`-backed offset
//! storage, v1 for `kafka`-backed storage. v1 adds the `group_generation_id`
//! / `consumer_id` fencing tokens and a per-partition `timestamp`, which
//! this crate always encodes as `-1` ("broker-assigned") since callers
//! never set it themselves.

use bytes::{BufMut, ByteOrder, BytesMut};

use codec::{decode_array, decode_required_string, WriteExt};
use errors::{ErrorKind, Result};
use protocol::{ApiKey, ApiVersion, ErrorCode, GenerationId, Offset, PartitionId, Request};

pub const API_KEY_OFFSET_COMMIT: ApiKey = 8;

/// Callers never set a commit timestamp; the broker assigns one.
const BROKER_ASSIGNED_TIMESTAMP: i64 = -1;

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitRequestPartition {
    pub partition: PartitionId,
    pub offset: Offset,
    pub metadata: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitRequestTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetCommitRequestPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitRequest {
    pub api_version: ApiVersion,
    pub group_id: String,
    pub group_generation_id: Option<GenerationId>,
    pub consumer_id: Option<String>,
    pub topics: Vec<OffsetCommitRequestTopic>,
}

impl OffsetCommitRequest {
    /// v0, for `OffsetStorage::ZooKeeper`: no fencing tokens on the wire.
    pub fn zookeeper(group_id: &str, topics: Vec<OffsetCommitRequestTopic>) -> Self {
        OffsetCommitRequest {
            api_version: 0,
            group_id: group_id.to_owned(),
            group_generation_id: None,
            consumer_id: None,
            topics,
        }
    }

    /// v1, for `OffsetStorage::Kafka`: carries the fencing tokens the
    /// coordinator uses to reject commits from a stale generation.
    pub fn kafka(
        group_id: &str,
        group_generation_id: GenerationId,
        consumer_id: &str,
        topics: Vec<OffsetCommitRequestTopic>,
    ) -> Self {
        OffsetCommitRequest {
            api_version: 1,
            group_id: group_id.to_owned(),
            group_generation_id: Some(group_generation_id),
            consumer_id: Some(consumer_id.to_owned()),
            topics,
        }
    }
}

impl Request for OffsetCommitRequest {
    fn api_key(&self) -> ApiKey {
        API_KEY_OFFSET_COMMIT
    }

    fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_str::<T>(Some(self.group_id.as_str()));

        if self.api_version > 0 {
            dst.put_i32::<T>(self.group_generation_id.unwrap_or(-1));
            dst.put_str::<T>(self.consumer_id.as_ref().map(|s| s.as_str()));
        }

        let api_version = self.api_version;

        dst.put_array::<T, _, _>(&self.topics, |dst, topic| {
            dst.put_str::<T>(Some(topic.topic_name.as_str()));
            dst.put_array::<T, _, _>(&topic.partitions, |dst, p| {
                dst.put_i32::<T>(p.partition);
                dst.put_i64::<T>(p.offset);
                if api_version > 0 {
                    dst.put_i64::<T>(BROKER_ASSIGNED_TIMESTAMP);
                }
                dst.put_str::<T>(p.metadata.as_ref().map(|s| s.as_str()));
                Ok(())
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitResponsePartition {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitResponseTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetCommitResponsePartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitResponse {
    pub topics: Vec<OffsetCommitResponseTopic>,
}

impl OffsetCommitResponse {
    /// Same response shape for v0 and v1.
    pub fn decode<T: ByteOrder>(src: &[u8]) -> Result<OffsetCommitResponse> {
        let (topics, rest) = decode_array::<T, _, _>(src, |src| {
            let (topic_name, src) = decode_required_string::<T>(src)?;
            let (partitions, src) = decode_array::<T, _, _>(src, |src| {
                if src.len() < 6 {
                    bail!(ErrorKind::Malformed("truncated OffsetCommitResponsePartition"));
                }
                let partition = T::read_i32(src);
                let error_code = T::read_i16(&src[4..]);
                Ok((
                    OffsetCommitResponsePartition {
                        partition,
                        error_code,
                    },
                    &src[6..],
                ))
            })?;
            Ok((
                OffsetCommitResponseTopic {
                    topic_name,
                    partitions,
                },
                src,
            ))
        })?;

        if !rest.is_empty() {
            bail!(ErrorKind::Malformed("trailing bytes after OffsetCommitResponse"));
        }

        Ok(OffsetCommitResponse { topics })
    }

    /// The error code for `partition`, if this response mentions it.
    pub fn error_code(&self, topic_name: &str, partition: PartitionId) -> Option<ErrorCode> {
        self.topics
            .iter()
            .find(|t| t.topic_name == topic_name)
            .and_then(|t| t.partitions.iter().find(|p| p.partition == partition))
            .map(|p| p.error_code)
    }
}
