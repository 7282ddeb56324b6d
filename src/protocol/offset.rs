//! The `Offset` API (`api_key = 2`, v0): ask a broker for the log offsets
//! bounding a partition at a given point in time. Used by the offset
//! manager purely for the earliest-offset fallback in `offset_fetch`.

use bytes::{BufMut, ByteOrder, BytesMut};

use codec::{decode_array, decode_required_string, WriteExt};
use errors::{ErrorKind, Result};
use protocol::{ApiKey, ApiVersion, ErrorCode, Offset, PartitionId, Request};

/// Sentinel `time` meaning "the partition's low water mark".
pub const EARLIEST_OFFSET: i64 = -2;
/// Sentinel `time` meaning "the partition's high water mark".
pub const LATEST_OFFSET: i64 = -1;

pub const API_KEY_OFFSETS: ApiKey = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetRequestPartition {
    pub partition: PartitionId,
    pub time: i64,
    pub max_offsets: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetRequestTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetRequestPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetRequest {
    pub replica_id: i32,
    pub topics: Vec<OffsetRequestTopic>,
}

impl OffsetRequest {
    /// A single-partition request for `time` (typically `EARLIEST_OFFSET`),
    /// the shape the offset manager issues against the leader connection.
    pub fn single(topic: &str, partition: PartitionId, time: i64, max_offsets: i32) -> Self {
        OffsetRequest {
            replica_id: -1,
            topics: vec![OffsetRequestTopic {
                topic_name: topic.to_owned(),
                partitions: vec![OffsetRequestPartition {
                    partition,
                    time,
                    max_offsets,
                }],
            }],
        }
    }
}

impl Request for OffsetRequest {
    fn api_key(&self) -> ApiKey {
        API_KEY_OFFSETS
    }

    fn api_version(&self) -> ApiVersion {
        0
    }

    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32::<T>(self.replica_id);
        dst.put_array::<T, _, _>(&self.topics, |dst, topic| {
            dst.put_str::<T>(Some(topic.topic_name.as_str()));
            dst.put_array::<T, _, _>(&topic.partitions, |dst, p| {
                dst.put_i32::<T>(p.partition);
                dst.put_i64::<T>(p.time);
                dst.put_i32::<T>(p.max_offsets);
                Ok(())
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetResponsePartition {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub offsets: Vec<Offset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetResponseTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetResponsePartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetResponse {
    pub topics: Vec<OffsetResponseTopic>,
}

impl OffsetResponse {
    pub fn decode<T: ByteOrder>(src: &[u8]) -> Result<OffsetResponse> {
        let (topics, rest) = decode_array::<T, _, _>(src, |src| {
            let (topic_name, src) = decode_required_string::<T>(src)?;
            let (partitions, src) = decode_array::<T, _, _>(src, |src| {
                if src.len() < 8 {
                    bail!(ErrorKind::Malformed("truncated OffsetResponsePartition"));
                }
                let partition = T::read_i32(src);
                let error_code = T::read_i16(&src[4..]);
                let (offsets, src) = decode_array::<T, i64, _>(&src[6..], |src| {
                    if src.len() < 8 {
                        bail!(ErrorKind::Malformed("truncated offset"));
                    }
                    Ok((T::read_i64(src), &src[8..]))
                })?;
                Ok((
                    OffsetResponsePartition {
                        partition,
                        error_code,
                        offsets,
                    },
                    src,
                ))
            })?;
            Ok((
                OffsetResponseTopic {
                    topic_name,
                    partitions,
                },
                src,
            ))
        })?;

        if !rest.is_empty() {
            bail!(ErrorKind::Malformed("trailing bytes after OffsetResponse"));
        }

        Ok(OffsetResponse { topics })
    }

    /// The single partition result the offset manager cares about, if
    /// the response mentions it.
    pub fn partition(&self, topic_name: &str, partition: PartitionId) -> Option<&OffsetResponsePartition> {
        self.topics
            .iter()
            .find(|t| t.topic_name == topic_name)
            .and_then(|t| t.partitions.iter().find(|p| p.partition == partition))
    }
}

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use super::*;

    #[test]
    fn test_encode_offset_request() {
        let req = OffsetRequest::single("topic", 0, EARLIEST_OFFSET, 1);

        let mut buf = BytesMut::with_capacity(64);
        req.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(req.api_key(), 2);
        assert_eq!(req.api_version(), 0);
        assert_eq!(&buf[0..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_decode_offset_response() {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_array::<BigEndian, _, _>(
            &[OffsetResponseTopic {
                topic_name: "topic".to_owned(),
                partitions: vec![OffsetResponsePartition {
                    partition: 0,
                    error_code: 0,
                    offsets: vec![42],
                }],
            }],
            |dst, topic| {
                dst.put_str::<BigEndian>(Some(topic.topic_name.as_str()));
                dst.put_array::<BigEndian, _, _>(&topic.partitions, |dst, p| {
                    dst.put_i32::<BigEndian>(p.partition);
                    dst.put_i16::<BigEndian>(p.error_code);
                    dst.put_array::<BigEndian, _, _>(&p.offsets, |dst, offset| {
                        dst.put_i64::<BigEndian>(*offset);
                        Ok(())
                    })
                })
            },
        )
        .unwrap();

        let decoded = OffsetResponse::decode::<BigEndian>(&buf[..]).unwrap();
        assert_eq!(decoded.topics.len(), 1);
        assert_eq!(decoded.topics[0].partitions[0].offsets, vec![42]);
    }
}
