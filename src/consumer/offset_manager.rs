//! A per-`(group, topic)` actor that batches and commits partition
//! offsets to the group coordinator, and fetches previously committed
//! offsets with an earliest-offset fallback.
//!
//! Modeled the way the client's own `ConsumerCoordinator` models group
//! membership: a cloneable `Rc<Inner>` handle running on a single-threaded
//! reactor, not a channel-backed mailbox actor. External callers never see
//! more than one logical thread of execution touching `pending`,
//! `generation`, or the timer — the `Rc`/`RefCell`/`Cell` state is only
//! ever touched from the reactor that drives it.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::time::Duration;

use futures::future;
use futures::Future;
use tokio_core::reactor::Handle;
use tokio_timer::Timer;

use errors::{Error, ErrorKind, Result};
use network::{Connection, KafkaRequest, KafkaResponse, StaticBoxFuture};
use protocol::{
    GenerationId, KafkaCode, Offset, OffsetCommitRequest, OffsetCommitRequestPartition,
    OffsetCommitRequestTopic, OffsetFetchRequest, OffsetRequest, PartitionId, EARLIEST_OFFSET,
};

/// Which broker-side store offsets are committed to; selects the
/// `OffsetCommit`/`OffsetFetch` API version this manager speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetStorage {
    Kafka,
    ZooKeeper,
}

impl Default for OffsetStorage {
    fn default() -> Self {
        OffsetStorage::Kafka
    }
}

#[derive(Clone, Debug)]
pub struct OffsetManagerConfig {
    pub interval_ms: u64,
    pub max_buffers: usize,
    pub auto_commit: bool,
    pub storage: OffsetStorage,
}

impl Default for OffsetManagerConfig {
    fn default() -> Self {
        OffsetManagerConfig {
            interval_ms: 500,
            max_buffers: 50,
            auto_commit: true,
            storage: OffsetStorage::Kafka,
        }
    }
}

/// The fencing tokens the coordinator uses to reject commits from a
/// stale group membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Generation {
    pub member_id: String,
    pub generation_id: GenerationId,
}

/// The result of a successful `offset_fetch`: the committed offset (or
/// the log's earliest offset, via the fallback) and its metadata.
pub type CommittedOffset = (Offset, String);

struct State {
    generation: Option<Generation>,
    pending: HashMap<PartitionId, (Offset, String)>,
}

struct Inner {
    coordinator: Box<Connection>,
    handle: Handle,
    timer: Timer,
    group: String,
    topic: String,
    partitions: PartitionId,
    config: OffsetManagerConfig,
    timer_epoch: Cell<u64>,
    timer_armed: Cell<bool>,
    state: RefCell<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.coordinator.close();
    }
}

pub struct OffsetManager {
    inner: Rc<Inner>,
}

impl OffsetManager {
    pub fn new(
        coordinator: Box<Connection>,
        handle: Handle,
        timer: Timer,
        group: String,
        topic: String,
        partitions: PartitionId,
        config: OffsetManagerConfig,
    ) -> Self {
        OffsetManager {
            inner: Rc::new(Inner {
                coordinator,
                handle,
                timer,
                group,
                topic,
                partitions,
                config,
                timer_epoch: Cell::new(0),
                timer_armed: Cell::new(false),
                state: RefCell::new(State {
                    generation: None,
                    pending: HashMap::new(),
                }),
            }),
        }
    }

    /// Replace the fencing tokens used by every subsequent commit.
    pub fn update_generation(&self, member_id: String, generation_id: GenerationId) {
        self.inner.state.borrow_mut().generation = Some(Generation {
            member_id,
            generation_id,
        });
    }

    /// Commit `offset` for `partition`.
    ///
    /// In `auto_commit = false` mode this issues a synchronous commit RPC
    /// and resolves with its outcome. In `auto_commit = true` mode it
    /// buffers the value and resolves immediately; the buffer flushes on
    /// its own timer, or right away if it has grown past `max_buffers`.
    pub fn offset_commit(&self, partition: PartitionId, offset: Offset, metadata: String) -> StaticBoxFuture<()> {
        if partition < 0 || partition >= self.inner.partitions {
            return StaticBoxFuture::err(ErrorKind::UnknownPartition(partition).into());
        }

        if !self.inner.config.auto_commit {
            return commit_sync(self.inner.clone(), partition, offset, metadata);
        }

        let pending_len = {
            let mut state = self.inner.state.borrow_mut();
            state.pending.insert(partition, (offset, metadata));
            state.pending.len()
        };

        if pending_len >= self.inner.config.max_buffers {
            flush_now(self.inner.clone());
        } else if !self.inner.timer_armed.get() {
            arm_timer(self.inner.clone());
        }

        StaticBoxFuture::ok(())
    }

    /// Fetch the committed offset for `partition`, falling back to the
    /// partition's earliest offset (via `leader`) when none has been
    /// committed yet. `leader` is borrowed only for the duration of that
    /// one fallback RPC.
    pub fn offset_fetch(&self, partition: PartitionId, leader: Rc<Connection>) -> StaticBoxFuture<CommittedOffset> {
        if partition < 0 || partition >= self.inner.partitions {
            return StaticBoxFuture::err(ErrorKind::UnknownPartition(partition).into());
        }

        let inner = self.inner.clone();
        let topic = inner.topic.clone();
        let api_version = match inner.config.storage {
            OffsetStorage::Kafka => 1,
            OffsetStorage::ZooKeeper => 0,
        };
        let request = OffsetFetchRequest::single(api_version, &inner.group, &topic, partition);

        StaticBoxFuture::new(inner.coordinator.request(KafkaRequest::OffsetFetch(request)).then(
            move |result| -> Box<Future<Item = CommittedOffset, Error = Error>> {
                match result {
                    Ok(KafkaResponse::OffsetFetch(resp)) => match resp.partition(&topic, partition) {
                        Some(p) => {
                            let code = KafkaCode::from(p.error_code);

                            if code == KafkaCode::None && p.offset != -1 {
                                Box::new(future::ok((p.offset, p.metadata.clone().unwrap_or_default())))
                            } else if code == KafkaCode::None || code == KafkaCode::UnknownTopicOrPartition {
                                Box::new(earliest_offset(leader, topic.clone(), partition))
                            } else {
                                Box::new(future::err(ErrorKind::KafkaError(code).into()))
                            }
                        }
                        None => Box::new(future::err(
                            ErrorKind::Malformed("offset fetch response missing partition").into(),
                        )),
                    },
                    Ok(res) => Box::new(future::err(ErrorKind::UnexpectedResponse(res.api_key()).into())),
                    Err(err) => Box::new(future::err(err)),
                }
            },
        ))
    }

    /// Terminate the actor: cancel any armed timer and close the
    /// coordinator connection. Idempotent, like `Connection::close`.
    pub fn stop(&self) {
        cancel_timer(&self.inner);
        self.inner.coordinator.close();
    }
}

fn earliest_offset(
    leader: Rc<Connection>,
    topic: String,
    partition: PartitionId,
) -> Box<Future<Item = CommittedOffset, Error = Error>> {
    let request = OffsetRequest::single(&topic, partition, EARLIEST_OFFSET, 1);

    Box::new(
        leader
            .request(KafkaRequest::Offset(request))
            .then(move |result| match result {
                Ok(KafkaResponse::Offset(resp)) => match resp.partition(&topic, partition) {
                    Some(p) => {
                        let code = KafkaCode::from(p.error_code);
                        if code == KafkaCode::None {
                            Ok((p.offsets.first().cloned().unwrap_or(0), String::new()))
                        } else {
                            Err(ErrorKind::KafkaError(code).into())
                        }
                    }
                    None => Err(ErrorKind::Malformed("offset response missing partition").into()),
                },
                Ok(res) => Err(ErrorKind::UnexpectedResponse(res.api_key()).into()),
                Err(err) => Err(err),
            }),
    )
}

fn build_commit_request(inner: &Inner, pending: &HashMap<PartitionId, (Offset, String)>) -> OffsetCommitRequest {
    let partitions = pending
        .iter()
        .map(|(&partition, &(offset, ref metadata))| OffsetCommitRequestPartition {
            partition,
            offset,
            metadata: if metadata.is_empty() {
                None
            } else {
                Some(metadata.clone())
            },
        })
        .collect();

    let topics = vec![OffsetCommitRequestTopic {
        topic_name: inner.topic.clone(),
        partitions,
    }];

    match inner.config.storage {
        OffsetStorage::ZooKeeper => OffsetCommitRequest::zookeeper(&inner.group, topics),
        OffsetStorage::Kafka => {
            let state = inner.state.borrow();
            let (generation_id, consumer_id) = match state.generation {
                Some(ref g) => (g.generation_id, g.member_id.clone()),
                None => (-1, String::new()),
            };
            OffsetCommitRequest::kafka(&inner.group, generation_id, &consumer_id, topics)
        }
    }
}

/// Synchronous single-partition commit for the `auto_commit = false`
/// path: the broker's per-partition error, if any, is surfaced directly
/// to the caller rather than logged-and-swallowed.
fn commit_sync(inner: Rc<Inner>, partition: PartitionId, offset: Offset, metadata: String) -> StaticBoxFuture<()> {
    let mut pending = HashMap::new();
    pending.insert(partition, (offset, metadata));

    let request = build_commit_request(&inner, &pending);
    let topic = inner.topic.clone();

    StaticBoxFuture::new(inner.coordinator.request(KafkaRequest::OffsetCommit(request)).then(
        move |result| match result {
            Ok(KafkaResponse::OffsetCommit(resp)) => match resp.error_code(&topic, partition) {
                Some(code) if KafkaCode::from(code) == KafkaCode::None => Ok(()),
                Some(code) => Err(ErrorKind::KafkaError(KafkaCode::from(code)).into()),
                None => Err(ErrorKind::Malformed("offset commit response missing partition").into()),
            },
            Ok(res) => Err(ErrorKind::UnexpectedResponse(res.api_key()).into()),
            Err(err) => Err(err),
        },
    ))
}

/// Buffered-flush commit: per-partition broker errors are classified and
/// logged but never retried — the next scheduled flush carries the
/// latest values and subsumes this attempt. See the design note on
/// per-partition commit errors for why this doesn't tear the actor down.
fn commit_many(inner: Rc<Inner>, pending: HashMap<PartitionId, (Offset, String)>) -> Box<Future<Item = (), Error = ()>> {
    let request = build_commit_request(&inner, &pending);
    let group = inner.group.clone();
    let topic = inner.topic.clone();

    Box::new(
        inner
            .coordinator
            .request(KafkaRequest::OffsetCommit(request))
            .then(move |result| {
                match result {
                    Ok(KafkaResponse::OffsetCommit(resp)) => {
                        for response_topic in &resp.topics {
                            for p in &response_topic.partitions {
                                let code = KafkaCode::from(p.error_code);
                                if code == KafkaCode::None {
                                    continue;
                                }

                                match code {
                                    KafkaCode::IllegalGeneration
                                    | KafkaCode::UnknownMemberId
                                    | KafkaCode::RebalanceInProgress => warn!(
                                        "commit of group `{}` topic `{}` partition {} failed with {:?}; \
                                         group membership may be stale",
                                        group, topic, p.partition, code
                                    ),
                                    _ => warn!(
                                        "commit of group `{}` topic `{}` partition {} failed with {:?}",
                                        group, topic, p.partition, code
                                    ),
                                }
                            }
                        }
                    }
                    Ok(res) => warn!("unexpected response to buffered offset commit: {:?}", res.api_key()),
                    Err(err) => warn!(
                        "transport failure committing offsets for group `{}` topic `{}`: {}",
                        group, topic, err
                    ),
                }

                Ok(())
            }),
    )
}

fn cancel_timer(inner: &Inner) {
    inner.timer_epoch.set(inner.timer_epoch.get().wrapping_add(1));
    inner.timer_armed.set(false);
}

fn arm_timer(inner: Rc<Inner>) {
    inner.timer_armed.set(true);

    let epoch = inner.timer_epoch.get();
    let sleep = inner.timer.sleep(Duration::from_millis(inner.config.interval_ms));

    let inner2 = inner.clone();
    inner.handle.spawn(sleep.then(move |_| {
        if inner2.timer_epoch.get() == epoch {
            fire_timer(inner2)
        } else {
            Box::new(future::ok(()))
        }
    }));
}

/// The timer fired: if `pending` is empty, just clear the timer handle.
/// Otherwise swap `pending` out *before* issuing the RPC, so writes that
/// arrive while the RPC is in flight start accumulating for the next
/// cycle rather than racing the one in flight.
fn fire_timer(inner: Rc<Inner>) -> Box<Future<Item = (), Error = ()>> {
    inner.timer_armed.set(false);

    let pending = {
        let mut state = inner.state.borrow_mut();
        if state.pending.is_empty() {
            return Box::new(future::ok(()));
        }
        mem::replace(&mut state.pending, HashMap::new())
    };

    commit_many(inner, pending)
}

/// `pending` overflowed `max_buffers`: cancel any armed timer and flush
/// immediately instead of waiting out the interval.
fn flush_now(inner: Rc<Inner>) {
    cancel_timer(&inner);

    let pending = {
        let mut state = inner.state.borrow_mut();
        mem::replace(&mut state.pending, HashMap::new())
    };

    if pending.is_empty() {
        return;
    }

    inner.handle.spawn(commit_many(inner.clone(), pending));
}

#[cfg(test)]
mod tests {
    use std::cell::Cell as StdCell;
    use std::collections::VecDeque;

    use tokio_core::reactor::Core;

    use protocol::{
        OffsetCommitResponse, OffsetCommitResponsePartition, OffsetCommitResponseTopic,
        OffsetFetchResponse, OffsetFetchResponsePartition, OffsetFetchResponseTopic, OffsetResponse,
        OffsetResponsePartition, OffsetResponseTopic,
    };

    use super::*;

    struct MockConnection {
        responses: RefCell<VecDeque<Result<KafkaResponse>>>,
        requests: Rc<RefCell<Vec<KafkaRequest>>>,
        closed: Rc<StdCell<bool>>,
    }

    impl MockConnection {
        fn new(responses: Vec<Result<KafkaResponse>>) -> (Self, Rc<RefCell<Vec<KafkaRequest>>>, Rc<StdCell<bool>>) {
            let requests = Rc::new(RefCell::new(Vec::new()));
            let closed = Rc::new(StdCell::new(false));

            (
                MockConnection {
                    responses: RefCell::new(responses.into_iter().collect()),
                    requests: requests.clone(),
                    closed: closed.clone(),
                },
                requests,
                closed,
            )
        }
    }

    impl Connection for MockConnection {
        fn request(&self, req: KafkaRequest) -> StaticBoxFuture<KafkaResponse> {
            self.requests.borrow_mut().push(req);

            match self.responses.borrow_mut().pop_front() {
                Some(Ok(resp)) => StaticBoxFuture::ok(resp),
                Some(Err(err)) => StaticBoxFuture::err(err),
                None => StaticBoxFuture::err(ErrorKind::Malformed("mock connection ran out of responses").into()),
            }
        }

        fn close(&self) {
            self.closed.set(true);
        }
    }

    fn manager(
        responses: Vec<Result<KafkaResponse>>,
        config: OffsetManagerConfig,
    ) -> (OffsetManager, Core, Rc<RefCell<Vec<KafkaRequest>>>, Rc<StdCell<bool>>) {
        let core = Core::new().unwrap();
        let (conn, requests, closed) = MockConnection::new(responses);

        let manager = OffsetManager::new(
            Box::new(conn),
            core.handle(),
            Timer::default(),
            "group".to_owned(),
            "topic".to_owned(),
            4,
            config,
        );

        (manager, core, requests, closed)
    }

    fn commit_ok(partition: PartitionId) -> Result<KafkaResponse> {
        Ok(KafkaResponse::OffsetCommit(OffsetCommitResponse {
            topics: vec![OffsetCommitResponseTopic {
                topic_name: "topic".to_owned(),
                partitions: vec![OffsetCommitResponsePartition {
                    partition,
                    error_code: 0,
                }],
            }],
        }))
    }

    #[test]
    fn test_offset_commit_rejects_unknown_partition() {
        let (manager, _core, _requests, _closed) = manager(vec![], OffsetManagerConfig::default());

        let err = manager.offset_commit(99, 1, String::new()).wait().unwrap_err();
        match *err.kind() {
            ErrorKind::UnknownPartition(partition) => assert_eq!(partition, 99),
            ref other => panic!("unexpected error kind: {:?}", other),
        }
    }

    #[test]
    fn test_offset_commit_sync_mode_surfaces_broker_error() {
        let response = Ok(KafkaResponse::OffsetCommit(OffsetCommitResponse {
            topics: vec![OffsetCommitResponseTopic {
                topic_name: "topic".to_owned(),
                partitions: vec![OffsetCommitResponsePartition {
                    partition: 0,
                    error_code: 22, // IllegalGeneration
                }],
            }],
        }));

        let mut config = OffsetManagerConfig::default();
        config.auto_commit = false;

        let (manager, _core, requests, _closed) = manager(vec![response], config);

        let err = manager.offset_commit(0, 10, String::new()).wait().unwrap_err();
        match *err.kind() {
            ErrorKind::KafkaError(code) => assert_eq!(code, KafkaCode::IllegalGeneration),
            ref other => panic!("unexpected error kind: {:?}", other),
        }
        assert_eq!(requests.borrow().len(), 1);
    }

    #[test]
    fn test_offset_commit_auto_mode_last_write_wins() {
        let (manager, _core, requests, _closed) = manager(vec![], OffsetManagerConfig::default());

        manager.offset_commit(0, 10, String::new()).wait().unwrap();
        manager.offset_commit(0, 20, String::new()).wait().unwrap();

        assert!(requests.borrow().is_empty(), "auto-commit must not flush before the timer fires");
        assert_eq!(manager.inner.state.borrow().pending.get(&0), Some(&(20, String::new())));
        assert!(manager.inner.timer_armed.get());
    }

    #[test]
    fn test_offset_commit_overflow_triggers_immediate_flush() {
        let mut config = OffsetManagerConfig::default();
        config.max_buffers = 2;

        let (manager, mut core, requests, _closed) = manager(vec![commit_ok(0), commit_ok(1)], config);

        manager.offset_commit(0, 10, String::new()).wait().unwrap();
        manager.offset_commit(1, 20, String::new()).wait().unwrap();

        core.turn(Some(Duration::from_millis(0)));

        assert_eq!(requests.borrow().len(), 1);
        assert!(manager.inner.state.borrow().pending.is_empty());
        assert!(!manager.inner.timer_armed.get());
    }

    #[test]
    fn test_offset_fetch_returns_committed_offset() {
        let response = Ok(KafkaResponse::OffsetFetch(OffsetFetchResponse {
            topics: vec![OffsetFetchResponseTopic {
                topic_name: "topic".to_owned(),
                partitions: vec![OffsetFetchResponsePartition {
                    partition: 0,
                    offset: 42,
                    metadata: Some("meta".to_owned()),
                    error_code: 0,
                }],
            }],
        }));

        let (manager, _core, leader_requests, _closed) = manager(vec![response], OffsetManagerConfig::default());
        let leader = Rc::new(MockConnection::new(vec![]).0) as Rc<Connection>;

        let (offset, metadata) = manager.offset_fetch(0, leader).wait().unwrap();
        assert_eq!(offset, 42);
        assert_eq!(metadata, "meta");
        let _ = leader_requests;
    }

    #[test]
    fn test_offset_fetch_falls_back_to_earliest_offset() {
        let fetch_response = Ok(KafkaResponse::OffsetFetch(OffsetFetchResponse {
            topics: vec![OffsetFetchResponseTopic {
                topic_name: "topic".to_owned(),
                partitions: vec![OffsetFetchResponsePartition {
                    partition: 0,
                    offset: -1,
                    metadata: None,
                    error_code: 0,
                }],
            }],
        }));

        let (manager, _core, _requests, _closed) = manager(vec![fetch_response], OffsetManagerConfig::default());

        let offset_response = Ok(KafkaResponse::Offset(OffsetResponse {
            topics: vec![OffsetResponseTopic {
                topic_name: "topic".to_owned(),
                partitions: vec![OffsetResponsePartition {
                    partition: 0,
                    error_code: 0,
                    offsets: vec![],
                }],
            }],
        }));
        let (leader_conn, leader_requests, _) = MockConnection::new(vec![offset_response]);
        let leader = Rc::new(leader_conn) as Rc<Connection>;

        let (offset, metadata) = manager.offset_fetch(0, leader).wait().unwrap();
        assert_eq!(offset, 0);
        assert_eq!(metadata, "");
        assert_eq!(leader_requests.borrow().len(), 1);
    }

    #[test]
    fn test_stop_closes_coordinator_connection() {
        let (manager, _core, _requests, closed) = manager(vec![], OffsetManagerConfig::default());

        manager.stop();

        assert!(closed.get());
    }

    #[test]
    fn test_update_generation_is_used_by_next_commit() {
        let mut config = OffsetManagerConfig::default();
        config.auto_commit = false;

        let (manager, _core, requests, _closed) = manager(vec![commit_ok(0)], config);

        manager.update_generation("member-1".to_owned(), 7);
        manager.offset_commit(0, 10, String::new()).wait().unwrap();

        match requests.borrow()[0] {
            KafkaRequest::OffsetCommit(ref req) => {
                assert_eq!(req.group_generation_id, Some(7));
                assert_eq!(req.consumer_id.as_ref().map(|s| s.as_str()), Some("member-1"));
            }
            ref other => panic!("unexpected request: {:?}", other),
        }
    }
}
