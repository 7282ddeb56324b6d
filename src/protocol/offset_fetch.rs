//! The `OffsetFetch` API (`api_key = 9`): v0 reads from ZooKeeper-backed
//! offset storage, v1 from Kafka-backed storage. An offset of `-1` with
//! `error_code == KafkaCode::None` means "no offset has been committed
//! for this partition yet" and is not itself an error.

use bytes::{BufMut, ByteOrder, BytesMut};

use codec::{decode_array, decode_required_string, decode_string, WriteExt};
use errors::{ErrorKind, Result};
use protocol::{ApiKey, ApiVersion, ErrorCode, Offset, PartitionId, Request};

pub const API_KEY_OFFSET_FETCH: ApiKey = 9;

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchRequestTopic {
    pub topic_name: String,
    pub partitions: Vec<PartitionId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchRequest {
    pub api_version: ApiVersion,
    pub group_id: String,
    pub topics: Vec<OffsetFetchRequestTopic>,
}

impl OffsetFetchRequest {
    pub fn new(api_version: ApiVersion, group_id: &str, topics: Vec<OffsetFetchRequestTopic>) -> Self {
        OffsetFetchRequest {
            api_version,
            group_id: group_id.to_owned(),
            topics,
        }
    }

    /// A single-partition fetch, the shape the offset manager issues.
    pub fn single(api_version: ApiVersion, group_id: &str, topic: &str, partition: PartitionId) -> Self {
        OffsetFetchRequest::new(
            api_version,
            group_id,
            vec![OffsetFetchRequestTopic {
                topic_name: topic.to_owned(),
                partitions: vec![partition],
            }],
        )
    }
}

impl Request for OffsetFetchRequest {
    fn api_key(&self) -> ApiKey {
        API_KEY_OFFSET_FETCH
    }

    fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_str::<T>(Some(self.group_id.as_str()));
        dst.put_array::<T, _, _>(&self.topics, |dst, topic| {
            dst.put_str::<T>(Some(topic.topic_name.as_str()));
            dst.put_array::<T, _, _>(&topic.partitions, |dst, p| {
                dst.put_i32::<T>(*p);
                Ok(())
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchResponsePartition {
    pub partition: PartitionId,
    pub offset: Offset,
    pub metadata: Option<String>,
    pub error_code: ErrorCode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchResponseTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetFetchResponsePartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchResponse {
    pub topics: Vec<OffsetFetchResponseTopic>,
}

impl OffsetFetchResponse {
    /// Same response shape for v0 and v1.
    pub fn decode<T: ByteOrder>(src: &[u8]) -> Result<OffsetFetchResponse> {
        let (topics, rest) = decode_array::<T, _, _>(src, |src| {
            let (topic_name, src) = decode_required_string::<T>(src)?;
            let (partitions, src) = decode_array::<T, _, _>(src, |src| {
                if src.len() < 12 {
                    bail!(ErrorKind::Malformed("truncated OffsetFetchResponsePartition"));
                }
                let partition = T::read_i32(src);
                let offset = T::read_i64(&src[4..]);
                let (metadata, src) = decode_string::<T>(&src[12..])?;
                if src.len() < 2 {
                    bail!(ErrorKind::Malformed("truncated OffsetFetchResponsePartition error_code"));
                }
                let error_code = T::read_i16(src);
                Ok((
                    OffsetFetchResponsePartition {
                        partition,
                        offset,
                        metadata,
                        error_code,
                    },
                    &src[2..],
                ))
            })?;
            Ok((
                OffsetFetchResponseTopic {
                    topic_name,
                    partitions,
                },
                src,
            ))
        })?;

        if !rest.is_empty() {
            bail!(ErrorKind::Malformed("trailing bytes after OffsetFetchResponse"));
        }

        Ok(OffsetFetchResponse { topics })
    }

    /// The single partition result the offset manager cares about, if
    /// the response mentions it.
    pub fn partition(
        &self,
        topic_name: &str,
        partition: PartitionId,
    ) -> Option<&OffsetFetchResponsePartition> {
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
    fn test_encode_offset_fetch_request() {
        let req = OffsetFetchRequest::single(1, "group", "topic", 0);

        let mut buf = BytesMut::with_capacity(64);
        req.encode::<BigEndian>(&mut buf).unwrap();

        assert_eq!(req.api_key(), 9);
        assert_eq!(&buf[0..7], &[0, 5, b'g', b'r', b'o', b'u', b'p']);
    }

    fn encode_response(buf: &mut BytesMut, partitions: &[OffsetFetchResponsePartition]) {
        buf.put_array::<BigEndian, _, _>(
            &[OffsetFetchResponseTopic {
                topic_name: "topic".to_owned(),
                partitions: partitions.to_vec(),
            }],
            |dst, topic| {
                dst.put_str::<BigEndian>(Some(topic.topic_name.as_str()));
                dst.put_array::<BigEndian, _, _>(&topic.partitions, |dst, p| {
                    dst.put_i32::<BigEndian>(p.partition);
                    dst.put_i64::<BigEndian>(p.offset);
                    dst.put_str::<BigEndian>(p.metadata.as_ref().map(|s| s.as_str()));
                    dst.put_i16::<BigEndian>(p.error_code);
                    Ok(())
                })
            },
        )
        .unwrap();
    }

    #[test]
    fn test_decode_offset_fetch_response_no_committed_offset() {
        let mut buf = BytesMut::with_capacity(64);
        encode_response(
            &mut buf,
            &[OffsetFetchResponsePartition {
                partition: 0,
                offset: -1,
                metadata: None,
                error_code: 0,
            }],
        );

        let decoded = OffsetFetchResponse::decode::<BigEndian>(&buf[..]).unwrap();
        let p = decoded.partition("topic", 0).unwrap();
        assert_eq!(p.offset, -1);
        assert_eq!(p.error_code, 0);
    }

    #[test]
    fn test_decode_offset_fetch_response_with_offset() {
        let mut buf = BytesMut::with_capacity(64);
        encode_response(
            &mut buf,
            &[OffsetFetchResponsePartition {
                partition: 0,
                offset: 42,
                metadata: Some("meta".to_owned()),
                error_code: 0,
            }],
        );

        let decoded = OffsetFetchResponse::decode::<BigEndian>(&buf[..]).unwrap();
        let p = decoded.partition("topic", 0).unwrap();
        assert_eq!(p.offset, 42);
        assert_eq!(p.metadata, Some("meta".to_owned()));
    }
}
