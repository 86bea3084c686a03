//! Data group replica
//!
//! A [`DataMember`] is one node's view of one replica group: it votes in
//! and runs elections, replicates and applies the group log, hands slot
//! snapshots to joining owners, and serves reads for the series its group
//! owns. Exactly one member of a healthy group is leader at a time; the
//! others follow or campaign.
//!
//! Elections rank candidates by their meta log tail first and their data
//! log tail second, both compared as `(term, index)` pairs. A vote request
//! that loses on the meta comparison is answered with
//! [`RESPONSE_META_LOG_STALE`] so the elector can tell the two apart.

use crate::applier::DataLogApplier;
use crate::client::DataClient;
use crate::puller::SlotPuller;
use crate::query::QueryRouter;
use crate::rpc::{
    AppendEntryRequest, ElectionRequest, GroupByRequest, HeartbeatRequest, HeartbeatResponse,
    PullSnapshotRequest, PullSnapshotResponse, SingleSeriesQueryRequest,
};
use crate::snapshot_applier::SnapshotApplier;
use dashmap::DashSet;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use seriesio_common::response::{
    READER_NOT_HOSTED, RESPONSE_AGREE, RESPONSE_LOG_MISMATCH, RESPONSE_META_LOG_STALE,
    RESPONSE_REJECT, STATUS_EXECUTION_ERROR, STATUS_NO_LEADER, STATUS_SUCCESS,
};
use seriesio_common::{
    storage_group_of, ClusterConfig, Error, Node, Result, Slot, TimeValuePair, TimeseriesSchema,
    TsValue,
};
use seriesio_partition::{NodeRemovalResult, PartitionGroup, SlotPartitionTable};
use seriesio_replication::{
    codec, EntryBody, FileSnapshot, LogView, MemoryLogStore, PartitionedSnapshot,
};
use seriesio_storage::{PhysicalPlan, SchemaStore, StorageEngine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Role of a member within its group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeCharacter {
    /// Campaigning for leadership
    Elector,
    /// Accepting entries from a known leader
    Follower,
    /// Appending and replicating entries
    Leader,
}

struct RoleState {
    character: NodeCharacter,
    term: i64,
    voted_for: Option<Node>,
    leader: Option<Node>,
    /// Wall-clock millis of the last leader contact; `i64::MIN` forces an
    /// election on the next driver tick
    last_heartbeat_recv_time: i64,
    all_nodes: PartitionGroup,
}

/// One node's replica of one data group.
pub struct DataMember {
    this_node: Node,
    /// Header of the group this member replicates
    header: Node,
    state: Mutex<RoleState>,
    log: Arc<MemoryLogStore>,
    meta_log: Arc<dyn LogView>,
    applier: Arc<DataLogApplier>,
    snapshot_applier: Arc<SnapshotApplier>,
    storage: Arc<dyn StorageEngine>,
    schema: Arc<dyn SchemaStore>,
    table: Arc<RwLock<SlotPartitionTable>>,
    client: Arc<dyn DataClient>,
    router: QueryRouter,
    puller: SlotPuller,
    /// Slots whose data is present locally; pull requests for other slots
    /// are answered with absence
    held_slots: Arc<DashSet<Slot>>,
    config: ClusterConfig,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Lexicographic log freshness: `candidate` is stale when its
/// `(term, index)` tail is strictly behind `local`.
fn log_is_stale(candidate: (i64, i64), local: (i64, i64)) -> bool {
    candidate < local
}

impl DataMember {
    #[must_use]
    pub fn new(
        this_node: Node,
        group: PartitionGroup,
        meta_log: Arc<dyn LogView>,
        storage: Arc<dyn StorageEngine>,
        schema: Arc<dyn SchemaStore>,
        table: Arc<RwLock<SlotPartitionTable>>,
        client: Arc<dyn DataClient>,
        config: ClusterConfig,
    ) -> Self {
        let header = group.header().clone();
        let log = Arc::new(MemoryLogStore::new());
        let applier = Arc::new(DataLogApplier::new(
            storage.clone(),
            schema.clone(),
            table.clone(),
        ));
        let snapshot_applier = Arc::new(SnapshotApplier::new(storage.clone(), schema.clone()));
        let held_slots: Arc<DashSet<Slot>> = Arc::new(
            table
                .read()
                .slots_of(&header)
                .iter()
                .copied()
                .collect(),
        );
        let puller = SlotPuller::new(
            client.clone(),
            snapshot_applier.clone(),
            held_slots.clone(),
            config.clone(),
        );
        let router = QueryRouter::new(storage.clone());
        Self {
            this_node,
            header,
            state: Mutex::new(RoleState {
                character: NodeCharacter::Elector,
                term: 0,
                voted_for: None,
                leader: None,
                last_heartbeat_recv_time: now_ms(),
                all_nodes: group,
            }),
            log,
            meta_log,
            applier,
            snapshot_applier,
            storage,
            schema,
            table,
            client,
            router,
            puller,
            held_slots,
            config,
        }
    }

    #[must_use]
    pub fn character(&self) -> NodeCharacter {
        self.state.lock().character
    }

    #[must_use]
    pub fn term(&self) -> i64 {
        self.state.lock().term
    }

    #[must_use]
    pub fn leader(&self) -> Option<Node> {
        self.state.lock().leader.clone()
    }

    #[must_use]
    pub fn log(&self) -> &Arc<MemoryLogStore> {
        &self.log
    }

    #[must_use]
    pub fn holds_slot(&self, slot: Slot) -> bool {
        self.held_slots.contains(&slot)
    }

    /// Commit watermark of this member's data log, served to followers
    /// probing their leader.
    #[must_use]
    pub fn commit_index(&self) -> i64 {
        self.log.commit_index()
    }

    fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.config.connection_timeout_ms)
    }

    fn step_down(&self, term: i64) {
        let mut state = self.state.lock();
        state.term = state.term.max(term);
        state.character = NodeCharacter::Follower;
    }

    // ---- inbound consensus RPCs ----

    /// Answer a vote request. A stale term is answered with the local term
    /// and an equal term is settled by the single-vote rule alone. A
    /// fresher term is adopted before the meta and data log freshness
    /// checks run, so even a refused elector drags this member forward.
    pub fn process_election_request(&self, request: &ElectionRequest) -> i64 {
        let mut state = self.state.lock();
        if request.term < state.term {
            debug!(
                elector = %request.elector,
                term = request.term,
                local = state.term,
                "rejecting stale-term election"
            );
            return state.term;
        }
        if request.term == state.term {
            if state
                .voted_for
                .as_ref()
                .is_some_and(|v| *v != request.elector)
            {
                return RESPONSE_REJECT;
            }
            return Self::grant(&mut state, request);
        }
        // the fresher term sticks even when the vote is refused below
        state.term = request.term;
        state.voted_for = None;
        if state.character == NodeCharacter::Leader {
            state.character = NodeCharacter::Follower;
        }
        let meta_local = (self.meta_log.last_log_term(), self.meta_log.last_log_index());
        if log_is_stale(
            (request.last_log_term, request.last_log_index),
            meta_local,
        ) {
            return RESPONSE_META_LOG_STALE;
        }
        let data_local = (self.log.last_log_term(), self.log.last_log_index());
        if log_is_stale(
            (request.data_log_last_term, request.data_log_last_index),
            data_local,
        ) {
            return RESPONSE_LOG_MISMATCH;
        }
        Self::grant(&mut state, request)
    }

    fn grant(state: &mut RoleState, request: &ElectionRequest) -> i64 {
        state.voted_for = Some(request.elector.clone());
        state.character = NodeCharacter::Follower;
        state.leader = None;
        state.last_heartbeat_recv_time = now_ms();
        info!(elector = %request.elector, term = request.term, "vote granted");
        RESPONSE_AGREE
    }

    /// Accept one replicated entry from the leader.
    pub fn process_append_entry(&self, request: &AppendEntryRequest) -> i64 {
        {
            let mut state = self.state.lock();
            if request.term < state.term {
                return state.term;
            }
            state.term = request.term;
            state.character = NodeCharacter::Follower;
            state.leader = Some(request.leader.clone());
            state.last_heartbeat_recv_time = now_ms();
        }
        let entry = match codec::decode(&request.entry) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "undecodable entry from leader");
                return RESPONSE_REJECT;
            }
        };
        if !self.log.try_append(entry) {
            return RESPONSE_LOG_MISMATCH;
        }
        self.log.commit_to(request.leader_commit);
        if let Err(e) = self
            .log
            .apply_up_to(request.leader_commit, self.applier.as_ref())
        {
            // the apply watermark halts at the failed entry and the next
            // commit advance retries it
            warn!(error = %e, "apply failed behind append");
        }
        RESPONSE_AGREE
    }

    /// Accept a leader heartbeat, adopting its commit watermark.
    pub fn process_heartbeat(&self, request: &HeartbeatRequest) -> HeartbeatResponse {
        let term = {
            let mut state = self.state.lock();
            if request.term >= state.term {
                state.term = request.term;
                state.character = NodeCharacter::Follower;
                state.leader = Some(request.leader.clone());
                state.last_heartbeat_recv_time = now_ms();
            }
            state.term
        };
        if term == request.term {
            self.log.commit_to(request.commit_index);
            if let Err(e) = self
                .log
                .apply_up_to(request.commit_index, self.applier.as_ref())
            {
                warn!(error = %e, "apply failed behind heartbeat");
            }
        }
        HeartbeatResponse {
            term,
            follower: self.this_node.clone(),
        }
    }

    // ---- election and heartbeat driving ----

    /// Campaign once. Returns whether this member won the round.
    pub async fn run_election_round(&self) -> bool {
        let (request, peers) = {
            let mut state = self.state.lock();
            state.character = NodeCharacter::Elector;
            state.leader = None;
            state.term += 1;
            state.voted_for = Some(self.this_node.clone());
            let request = ElectionRequest {
                term: state.term,
                elector: self.this_node.clone(),
                last_log_index: self.meta_log.last_log_index(),
                last_log_term: self.meta_log.last_log_term(),
                data_log_last_index: self.log.last_log_index(),
                data_log_last_term: self.log.last_log_term(),
            };
            (request, state.all_nodes.clone())
        };
        let term = request.term;
        debug!(term, group = %peers, "starting election");

        let mut accepted = 1usize;
        for node in peers.iter().filter(|n| **n != self.this_node) {
            let reply = tokio::time::timeout(
                self.connection_timeout(),
                self.client.start_election(node, request.clone()),
            )
            .await;
            match reply {
                Ok(Ok(RESPONSE_AGREE)) => accepted += 1,
                Ok(Ok(code)) if code >= 0 => {
                    debug!(responder = %node, newer_term = code, "dropping out of election");
                    self.step_down(code);
                    return false;
                }
                Ok(Ok(RESPONSE_META_LOG_STALE)) => {
                    info!(responder = %node, "meta log is stale, dropping out of election");
                    self.step_down(term);
                    return false;
                }
                Ok(Ok(RESPONSE_LOG_MISMATCH)) => {
                    info!(responder = %node, "data log is stale, dropping out of election");
                    self.step_down(term);
                    return false;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!(responder = %node, error = %e, "election request failed"),
                Err(_) => debug!(responder = %node, "election request timed out"),
            }
        }

        if accepted * 2 > peers.len() {
            let mut state = self.state.lock();
            // the term may have moved on while votes were in flight
            if state.term != term {
                return false;
            }
            state.character = NodeCharacter::Leader;
            state.leader = Some(self.this_node.clone());
            info!(term, "became leader of group headed by {}", self.header);
            true
        } else {
            debug!(term, accepted, "election round lost");
            false
        }
    }

    /// Leader side: one heartbeat fan-out. Steps down on a fresher term.
    pub async fn heartbeat_round(&self) {
        let (term, peers) = {
            let state = self.state.lock();
            if state.character != NodeCharacter::Leader {
                return;
            }
            (state.term, state.all_nodes.clone())
        };
        let request = HeartbeatRequest {
            term,
            leader: self.this_node.clone(),
            commit_index: self.log.commit_index(),
        };
        for node in peers.iter().filter(|n| **n != self.this_node) {
            let reply = tokio::time::timeout(
                self.connection_timeout(),
                self.client.send_heartbeat(node, request.clone()),
            )
            .await;
            match reply {
                Ok(Ok(response)) if response.term > term => {
                    info!(follower = %node, term = response.term, "stepping down for fresher term");
                    let mut state = self.state.lock();
                    state.term = state.term.max(response.term);
                    state.character = NodeCharacter::Follower;
                    state.leader = None;
                    return;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!(follower = %node, error = %e, "heartbeat failed"),
                Err(_) => debug!(follower = %node, "heartbeat timed out"),
            }
        }
    }

    /// Background driver: heartbeats while leading, election timeouts
    /// otherwise. Stops when `shutdown` flips.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let member = Arc::clone(self);
        tokio::spawn(async move { member.run(shutdown).await })
    }

    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let character = self.character();
            let wait = if character == NodeCharacter::Leader {
                self.config.heartbeat_interval_ms
            } else {
                rand::thread_rng().gen_range(
                    self.config.election_timeout_min_ms..self.config.election_timeout_max_ms,
                )
            };
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("member of group headed by {} stopped", self.header);
                    return;
                }
                () = tokio::time::sleep(Duration::from_millis(wait)) => {}
            }
            if self.character() == NodeCharacter::Leader {
                self.heartbeat_round().await;
                continue;
            }
            let (last_heartbeat, has_leader) = {
                let state = self.state.lock();
                (state.last_heartbeat_recv_time, state.leader.is_some())
            };
            let silent_for = now_ms().saturating_sub(last_heartbeat);
            if !has_leader || silent_for > self.config.election_timeout_max_ms as i64 {
                self.run_election_round().await;
            }
        }
    }

    // ---- write path ----

    /// Execute a non-query plan: appended and replicated when leading,
    /// forwarded when following, refused without a leader.
    pub async fn execute_non_query(&self, plan: PhysicalPlan) -> i32 {
        let (character, leader) = {
            let state = self.state.lock();
            (state.character, state.leader.clone())
        };
        match character {
            NodeCharacter::Leader => {
                match self.propose(EntryBody::PhysicalPlan(plan.encode())).await {
                    Ok(()) => STATUS_SUCCESS,
                    Err(e) => {
                        warn!(error = %e, "plan execution failed");
                        STATUS_EXECUTION_ERROR
                    }
                }
            }
            _ => match leader {
                Some(leader) if leader != self.this_node => {
                    let forwarded = tokio::time::timeout(
                        self.connection_timeout(),
                        self.client.execute_non_query(&leader, plan),
                    )
                    .await;
                    match forwarded {
                        Ok(Ok(status)) => status,
                        Ok(Err(e)) => {
                            warn!(leader = %leader, error = %e, "forward to leader failed");
                            STATUS_EXECUTION_ERROR
                        }
                        Err(_) => STATUS_EXECUTION_ERROR,
                    }
                }
                _ => STATUS_NO_LEADER,
            },
        }
    }

    /// Seal one storage group partition group-wide.
    pub async fn close_partition(
        &self,
        storage_group: &str,
        partition_id: i64,
        is_seq: bool,
    ) -> i32 {
        if self.character() != NodeCharacter::Leader {
            return STATUS_NO_LEADER;
        }
        let body = EntryBody::CloseFile {
            storage_group: storage_group.to_string(),
            partition_id,
            is_seq,
        };
        match self.propose(body).await {
            Ok(()) => STATUS_SUCCESS,
            Err(e) => {
                warn!(error = %e, "close partition failed");
                STATUS_EXECUTION_ERROR
            }
        }
    }

    /// Leader side: append one entry, replicate it to a quorum, then
    /// commit and apply it locally.
    async fn propose(&self, body: EntryBody) -> Result<()> {
        let (term, peers) = {
            let state = self.state.lock();
            (state.term, state.all_nodes.clone())
        };
        let entry = self.log.append_new(term, body);
        let request = AppendEntryRequest {
            term,
            leader: self.this_node.clone(),
            leader_commit: self.log.commit_index(),
            entry: codec::encode(&entry).to_vec(),
        };
        let mut accepted = 1usize;
        for node in peers.iter().filter(|n| **n != self.this_node) {
            let reply = tokio::time::timeout(
                self.connection_timeout(),
                self.client.append_entry(node, request.clone()),
            )
            .await;
            match reply {
                Ok(Ok(RESPONSE_AGREE)) => accepted += 1,
                Ok(Ok(code)) => debug!(follower = %node, code, "append refused"),
                Ok(Err(e)) => debug!(follower = %node, error = %e, "append failed"),
                Err(_) => debug!(follower = %node, "append timed out"),
            }
        }
        if accepted * 2 > peers.len() {
            self.log.commit_to(entry.curr_index);
            self.log
                .apply_up_to(entry.curr_index, self.applier.as_ref())
        } else {
            Err(Error::internal(format!(
                "entry {entry} accepted by {accepted} of {} members",
                peers.len()
            )))
        }
    }

    // ---- membership ----

    /// React to a node joining the ring. Returns whether this member must
    /// leave the group because the new node displaces it: the new node
    /// falls inside the group's ring range, every member's view shrinks by
    /// its last node, and only the displaced last member answers `true`.
    pub fn add_node(&self, node: Node) -> bool {
        let mut state = self.state.lock();
        let group = &mut state.all_nodes;
        if group.contains(&node) {
            return false;
        }
        let mut insert_at = None;
        for i in 0..group.len().saturating_sub(1) {
            let prev = &group[i];
            let next = &group[i + 1];
            // circular order: node lands between prev and next on the ring
            let fits = (prev < &node && &node < next)
                || (prev < &node && next < prev)
                || (&node < next && next < prev);
            if fits {
                insert_at = Some(i + 1);
                break;
            }
        }
        let Some(at) = insert_at else {
            return false;
        };
        let displaced = group.last() == &self.this_node;
        group.insert(at, node.clone());
        group.pop();
        info!(
            node = %node,
            group = %group,
            displaced,
            "group membership grew"
        );
        displaced
    }

    /// React to a node leaving the ring, after the partition table has
    /// been updated. If the departed node led this group the member starts
    /// campaigning immediately; slots reassigned to this group are pulled
    /// from the dissolved group's surviving members.
    pub async fn handle_node_removal(
        &self,
        removed: &Node,
        removal: &NodeRemovalResult,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            if let Some(group) = self.table.read().header_group(&self.header) {
                state.all_nodes = group;
            } else {
                state.all_nodes.remove(removed);
            }
            if state.leader.as_ref() == Some(removed) {
                info!(removed = %removed, "group leader removed, campaigning");
                state.leader = None;
                state.character = NodeCharacter::Elector;
                state.last_heartbeat_recv_time = i64::MIN;
            }
        }
        let Some(slots) = removal.new_slot_owners.get(&self.header) else {
            return Ok(());
        };
        if slots.is_empty() {
            return Ok(());
        }
        let mut holders = removal.removed_group.clone();
        holders.remove(removed);
        if holders.is_empty() {
            return Err(Error::snapshot(
                "no surviving holder for reassigned slots",
            ));
        }
        self.puller.pull(slots.clone(), &holders).await
    }

    // ---- snapshot transfer ----

    /// Build a partitioned snapshot of everything this member holds,
    /// stamped with the applied log watermark.
    #[must_use]
    pub fn take_local_snapshot(&self) -> PartitionedSnapshot {
        let per_slot = self.slot_snapshots(None);
        self.log.take_snapshot(per_slot)
    }

    /// Push a full snapshot to one lagging follower.
    pub async fn send_snapshot_to(&self, target: &Node) -> Result<()> {
        let snapshot = self.take_local_snapshot();
        info!(target = %target, slots = snapshot.slot_count(), "sending snapshot");
        tokio::time::timeout(
            self.connection_timeout(),
            self.client.send_snapshot(target, snapshot.serialize()),
        )
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Install a snapshot received from the leader: apply every slot, then
    /// advance the log tail to the snapshot watermark.
    pub fn receive_snapshot(&self, bytes: &[u8]) -> Result<()> {
        let snapshot = PartitionedSnapshot::deserialize(bytes)?;
        for (slot, file_snapshot) in snapshot.iter() {
            self.snapshot_applier.apply(file_snapshot, slot)?;
            self.held_slots.insert(slot);
        }
        info!(
            last_log_index = snapshot.last_log_index,
            last_log_term = snapshot.last_log_term,
            "snapshot received"
        );
        self.log.install_snapshot(snapshot);
        Ok(())
    }

    /// Serve a slot pull when leading; forward it to the leader otherwise.
    /// Served maps only contain slots this member actually holds, so a
    /// requester can tell "not here yet" from "empty".
    pub async fn serve_pull_snapshot(
        &self,
        request: PullSnapshotRequest,
    ) -> Result<PullSnapshotResponse> {
        let (character, leader) = {
            let state = self.state.lock();
            (state.character, state.leader.clone())
        };
        if character == NodeCharacter::Leader {
            let mut per_slot = self.slot_snapshots(Some(&request.required_slots));
            let snapshot_bytes = request
                .required_slots
                .iter()
                .filter(|slot| self.held_slots.contains(slot))
                .map(|slot| {
                    let snapshot = per_slot.remove(slot).unwrap_or_default();
                    (*slot, snapshot.serialize())
                })
                .collect();
            return Ok(PullSnapshotResponse { snapshot_bytes });
        }
        match leader {
            Some(leader) if leader != self.this_node => {
                debug!(leader = %leader, "forwarding pull snapshot to leader");
                tokio::time::timeout(
                    self.connection_timeout(),
                    self.client.pull_snapshot(&leader, request),
                )
                .await
                .map_err(|_| Error::Timeout)?
            }
            _ => Err(Error::NoLeader),
        }
    }

    /// Group local schemas and sealed files by slot. `wanted` restricts
    /// the output; `None` collects every populated slot.
    fn slot_snapshots(&self, wanted: Option<&[Slot]>) -> HashMap<Slot, FileSnapshot> {
        let mut per_slot: HashMap<Slot, FileSnapshot> = HashMap::new();
        let keep = |slot: Slot| wanted.is_none_or(|w| w.contains(&slot));
        let mut storage_groups: Vec<String> = Vec::new();
        for schema in self.schema.schemas_under("root") {
            let sg = schema.storage_group();
            let slot = SlotPartitionTable::slot_of(&sg, 0);
            if keep(slot) {
                per_slot.entry(slot).or_default().add_schema(schema);
            }
            if !storage_groups.contains(&sg) {
                storage_groups.push(sg);
            }
        }
        for sg in &storage_groups {
            let resources = self
                .storage
                .sequence_resources(sg)
                .unwrap_or_default()
                .into_iter()
                .chain(
                    self.storage
                        .unsequence_resources(sg)
                        .unwrap_or_default(),
                );
            for resource in resources {
                let slot = SlotPartitionTable::slot_of(sg, partition_of(&resource.path));
                if keep(slot) {
                    per_slot
                        .entry(slot)
                        .or_default()
                        .add_file(resource, self.this_node.clone());
                }
            }
        }
        per_slot
    }

    // ---- read path ----

    /// Wait until this member has caught up with the leader's commit
    /// watermark. Trivially true when leading; false without a leader or
    /// when the wait budget runs out.
    pub async fn sync_leader(&self) -> bool {
        let leader = { self.state.lock().leader.clone() };
        let Some(leader) = leader else {
            return false;
        };
        if leader == self.this_node {
            return true;
        }
        let poll = async {
            loop {
                match self.client.request_commit_index(&leader).await {
                    Ok(leader_commit) if leader_commit <= self.log.commit_index() => return,
                    Ok(_) | Err(_) => {}
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(
            Duration::from_millis(self.config.sync_leader_max_wait_ms),
            poll,
        )
        .await
        .is_ok()
    }

    /// Open a reader for one series. [`READER_NOT_HOSTED`] when the series'
    /// slot is owned by another group.
    pub async fn query_single_series(&self, request: &SingleSeriesQueryRequest) -> Result<i64> {
        let slot = SlotPartitionTable::slot_of(&storage_group_of(&request.path), 0);
        if self.table.read().owner_of(slot) != &self.header {
            return Ok(READER_NOT_HOSTED);
        }
        if !self.sync_leader().await {
            warn!(path = %request.path, "serving read without leader sync");
        }
        self.router.open_reader(request)
    }

    /// Open a random-access reader for one series. [`READER_NOT_HOSTED`]
    /// when the series' slot is owned by another group.
    pub async fn query_single_series_by_timestamp(
        &self,
        request: &SingleSeriesQueryRequest,
    ) -> Result<i64> {
        let slot = SlotPartitionTable::slot_of(&storage_group_of(&request.path), 0);
        if self.table.read().owner_of(slot) != &self.header {
            return Ok(READER_NOT_HOSTED);
        }
        if !self.sync_leader().await {
            warn!(path = %request.path, "serving read without leader sync");
        }
        self.router.open_reader_by_timestamp(request)
    }

    pub fn fetch_by_timestamp(
        &self,
        reader_id: i64,
        timestamps: &[i64],
    ) -> Result<Vec<Option<TsValue>>> {
        self.router.fetch_by_timestamp(reader_id, timestamps)
    }

    /// Schemas under the prefixes, served to a node rebuilding a slot. A
    /// member that cannot catch up with the leader's commit watermark in
    /// time forwards the request instead of serving a stale enumeration.
    pub async fn pull_timeseries_schema(
        &self,
        prefixes: &[String],
    ) -> Result<Vec<TimeseriesSchema>> {
        if !self.sync_leader().await {
            let leader = { self.state.lock().leader.clone() };
            let Some(leader) = leader.filter(|l| *l != self.this_node) else {
                return Err(Error::NoLeader);
            };
            debug!(leader = %leader, "forwarding schema pull to leader");
            return tokio::time::timeout(
                self.connection_timeout(),
                self.client.pull_timeseries_schema(&leader, prefixes.to_vec()),
            )
            .await
            .map_err(|_| Error::Timeout)?;
        }
        let mut schemas = Vec::new();
        for prefix in prefixes {
            for schema in self.schema.schemas_under(prefix) {
                if !schemas.contains(&schema) {
                    schemas.push(schema);
                }
            }
        }
        Ok(schemas)
    }

    /// Register a group-by executor for one series. [`READER_NOT_HOSTED`]
    /// when the series' slot is owned by another group.
    pub async fn get_group_by_executor(&self, request: &GroupByRequest) -> Result<i64> {
        let slot = SlotPartitionTable::slot_of(&storage_group_of(&request.path), 0);
        if self.table.read().owner_of(slot) != &self.header {
            return Ok(READER_NOT_HOSTED);
        }
        if !self.sync_leader().await {
            warn!(path = %request.path, "serving aggregation without leader sync");
        }
        self.router.open_group_by(request)
    }

    pub fn fetch(&self, reader_id: i64, fetch_size: usize) -> Result<Vec<TimeValuePair>> {
        self.router.fetch(reader_id, fetch_size)
    }

    pub fn calculate_group_by(
        &self,
        executor_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<crate::rpc::AggregateResult>> {
        self.router.calculate_group_by(executor_id, start, end)
    }

    pub fn end_query(&self, requester: &Node, query_id: i64) {
        self.router.end_query(requester, query_id);
    }

    /// All series paths under a prefix known to this member.
    #[must_use]
    pub fn get_all_paths(&self, prefix: &str) -> Vec<String> {
        self.schema.paths_under(prefix)
    }
}

/// Partition id encoded in a sealed file name (`{partition}-{version}-0.tsf`).
fn partition_of(file_name: &str) -> i64 {
    file_name
        .split('-')
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::AggregationType;
    use async_trait::async_trait;
    use seriesio_storage::{Filter, InsertPlan, MemSchemaStore, MemStorageEngine};
    use std::sync::atomic::{AtomicI64, Ordering};

    fn node(id: i32) -> Node {
        Node::new("127.0.0.1", 9003 + id as u16, id, 40010 + id as u16)
    }

    /// Configurable in-process peer double.
    struct StubClient {
        election_reply: AtomicI64,
        append_reply: AtomicI64,
        heartbeat_term: AtomicI64,
        commit_reply: AtomicI64,
        execute_reply: std::sync::atomic::AtomicI32,
        forwarded_plans: Mutex<Vec<PhysicalPlan>>,
        pull_served: Mutex<HashMap<Slot, Vec<u8>>>,
        serve_empty_snapshots: bool,
        snapshots_sent: Mutex<Vec<(Node, Vec<u8>)>>,
        schema_pulls: Mutex<Vec<Vec<String>>>,
    }

    impl Default for StubClient {
        fn default() -> Self {
            Self {
                election_reply: AtomicI64::new(RESPONSE_AGREE),
                append_reply: AtomicI64::new(RESPONSE_AGREE),
                heartbeat_term: AtomicI64::new(0),
                commit_reply: AtomicI64::new(-1),
                execute_reply: std::sync::atomic::AtomicI32::new(STATUS_SUCCESS),
                forwarded_plans: Mutex::new(Vec::new()),
                pull_served: Mutex::new(HashMap::new()),
                serve_empty_snapshots: false,
                snapshots_sent: Mutex::new(Vec::new()),
                schema_pulls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DataClient for StubClient {
        async fn start_election(&self, _target: &Node, _request: ElectionRequest) -> Result<i64> {
            Ok(self.election_reply.load(Ordering::SeqCst))
        }

        async fn append_entry(&self, _target: &Node, _request: AppendEntryRequest) -> Result<i64> {
            Ok(self.append_reply.load(Ordering::SeqCst))
        }

        async fn send_heartbeat(
            &self,
            target: &Node,
            request: HeartbeatRequest,
        ) -> Result<HeartbeatResponse> {
            let term = self.heartbeat_term.load(Ordering::SeqCst).max(request.term);
            Ok(HeartbeatResponse {
                term,
                follower: target.clone(),
            })
        }

        async fn send_snapshot(&self, target: &Node, snapshot: Vec<u8>) -> Result<()> {
            self.snapshots_sent.lock().push((target.clone(), snapshot));
            Ok(())
        }

        async fn pull_snapshot(
            &self,
            _target: &Node,
            request: PullSnapshotRequest,
        ) -> Result<PullSnapshotResponse> {
            if self.serve_empty_snapshots {
                let snapshot_bytes = request
                    .required_slots
                    .iter()
                    .map(|s| (*s, FileSnapshot::new().serialize()))
                    .collect();
                return Ok(PullSnapshotResponse { snapshot_bytes });
            }
            let served = self.pull_served.lock();
            let snapshot_bytes = request
                .required_slots
                .iter()
                .filter_map(|s| served.get(s).map(|b| (*s, b.clone())))
                .collect();
            Ok(PullSnapshotResponse { snapshot_bytes })
        }

        async fn pull_timeseries_schema(
            &self,
            _target: &Node,
            prefixes: Vec<String>,
        ) -> Result<Vec<TimeseriesSchema>> {
            self.schema_pulls.lock().push(prefixes);
            Ok(vec![TimeseriesSchema::new(
                "root.sg0.d0.s0",
                seriesio_common::TsDataType::Double,
            )])
        }

        async fn request_commit_index(&self, _target: &Node) -> Result<i64> {
            Ok(self.commit_reply.load(Ordering::SeqCst))
        }

        async fn execute_non_query(&self, _target: &Node, plan: PhysicalPlan) -> Result<i32> {
            self.forwarded_plans.lock().push(plan);
            Ok(self.execute_reply.load(Ordering::SeqCst))
        }
    }

    struct TestBed {
        member: DataMember,
        storage: Arc<MemStorageEngine>,
        schema: Arc<MemSchemaStore>,
        meta_log: Arc<MemoryLogStore>,
        table: Arc<RwLock<SlotPartitionTable>>,
    }

    fn make_member(this_id: i32, ring_ids: &[i32], client: Arc<StubClient>) -> TestBed {
        let ring: Vec<Node> = ring_ids.iter().map(|&id| node(id)).collect();
        let replication = ring.len().min(3);
        let table = Arc::new(RwLock::new(SlotPartitionTable::new(ring, replication)));
        let group = table
            .read()
            .header_group(&node(ring_ids[0]))
            .expect("header is on the ring");
        let storage = Arc::new(MemStorageEngine::new());
        let schema = Arc::new(MemSchemaStore::new());
        let meta_log = Arc::new(MemoryLogStore::new());
        let config = ClusterConfig {
            connection_timeout_ms: 100,
            sync_leader_max_wait_ms: 50,
            pull_snapshot_retry_ms: 1,
            ..ClusterConfig::default()
        };
        let member = DataMember::new(
            node(this_id),
            group,
            meta_log.clone(),
            storage.clone(),
            schema.clone(),
            table.clone(),
            client,
            config,
        );
        TestBed {
            member,
            storage,
            schema,
            meta_log,
            table,
        }
    }

    fn plan_entry(index: i64, term: i64, plan: &PhysicalPlan) -> Vec<u8> {
        let entry = seriesio_replication::LogEntry::new(
            index - 1,
            if index == 0 { -1 } else { term },
            index,
            term,
            EntryBody::PhysicalPlan(plan.encode()),
        );
        codec::encode(&entry).to_vec()
    }

    fn insert_plan(time: i64, value: f64) -> PhysicalPlan {
        PhysicalPlan::Insert(InsertPlan {
            device: "root.sg0.d0".to_string(),
            time,
            measurements: vec!["s0".to_string()],
            values: vec![TsValue::Double(value)],
        })
    }

    async fn fill_leader(bed: &TestBed, points: i64) {
        assert!(bed.member.run_election_round().await);
        let sg = PhysicalPlan::SetStorageGroup("root.sg0".to_string());
        assert_eq!(bed.member.execute_non_query(sg).await, STATUS_SUCCESS);
        let create = PhysicalPlan::CreateTimeseries(TimeseriesSchema::new(
            "root.sg0.d0.s0",
            seriesio_common::TsDataType::Double,
        ));
        assert_eq!(bed.member.execute_non_query(create).await, STATUS_SUCCESS);
        for t in 0..points {
            let status = bed.member.execute_non_query(insert_plan(t, t as f64)).await;
            assert_eq!(status, STATUS_SUCCESS);
        }
    }

    // -- elections --

    #[tokio::test]
    async fn test_election_reply_ladder() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        // local data log tail (term 10, index 10)
        for _ in 0..11 {
            bed.member.log.append_new(10, EntryBody::EmptyContent);
        }
        // local meta log tail (term 5, index 5)
        for _ in 0..6 {
            bed.meta_log.append_new(5, EntryBody::EmptyContent);
        }
        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 10,
            leader: node(10),
            commit_index: -1,
        });
        assert_eq!(bed.member.term(), 10);

        let request = |term, meta: (i64, i64), data: (i64, i64), elector: Node| ElectionRequest {
            term,
            elector,
            last_log_index: meta.1,
            last_log_term: meta.0,
            data_log_last_index: data.1,
            data_log_last_term: data.0,
        };

        // stale term: answered with the local term
        let reply =
            bed.member
                .process_election_request(&request(1, (5, 5), (10, 10), node(20)));
        assert_eq!(reply, 10);
        assert_eq!(bed.member.term(), 10);

        // meta log behind: reported before the data log comparison, and
        // the fresher term sticks despite the refusal
        let reply =
            bed.member
                .process_election_request(&request(11, (4, 100), (10, 10), node(20)));
        assert_eq!(reply, RESPONSE_META_LOG_STALE);
        assert_eq!(bed.member.term(), 11);

        // meta log fine, data log behind
        let reply =
            bed.member
                .process_election_request(&request(12, (5, 5), (9, 20), node(20)));
        assert_eq!(reply, RESPONSE_LOG_MISMATCH);
        assert_eq!(bed.member.term(), 12);

        // fresh enough on both logs
        let reply =
            bed.member
                .process_election_request(&request(13, (5, 5), (10, 10), node(20)));
        assert_eq!(reply, RESPONSE_AGREE);
        assert_eq!(bed.member.term(), 13);

        // same term, different elector: the vote is spent
        let reply =
            bed.member
                .process_election_request(&request(13, (5, 5), (10, 10), node(10)));
        assert_eq!(reply, RESPONSE_REJECT);

        // same term, same elector: re-granted
        let reply =
            bed.member
                .process_election_request(&request(13, (5, 5), (10, 10), node(20)));
        assert_eq!(reply, RESPONSE_AGREE);
    }

    #[tokio::test]
    async fn test_equal_term_vote_skips_freshness_checks() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        // local meta log tail (term 5, index 5)
        for _ in 0..6 {
            bed.meta_log.append_new(5, EntryBody::EmptyContent);
        }
        // an unspent vote at the same term is granted even to an elector
        // whose meta log is behind ours
        let reply = bed.member.process_election_request(&ElectionRequest {
            term: 0,
            elector: node(10),
            last_log_index: -1,
            last_log_term: -1,
            data_log_last_index: -1,
            data_log_last_term: -1,
        });
        assert_eq!(reply, RESPONSE_AGREE);
        assert_eq!(bed.member.term(), 0);
    }

    #[tokio::test]
    async fn test_winning_election() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        assert!(bed.member.run_election_round().await);
        assert_eq!(bed.member.character(), NodeCharacter::Leader);
        assert_eq!(bed.member.leader(), Some(node(0)));
        assert_eq!(bed.member.term(), 1);
    }

    #[tokio::test]
    async fn test_election_dropped_for_stale_log() {
        let client = Arc::new(StubClient::default());
        client
            .election_reply
            .store(RESPONSE_LOG_MISMATCH, Ordering::SeqCst);
        let bed = make_member(0, &[0, 10, 20], client);
        assert!(!bed.member.run_election_round().await);
        assert_eq!(bed.member.character(), NodeCharacter::Follower);
    }

    #[tokio::test]
    async fn test_election_adopts_fresher_term() {
        let client = Arc::new(StubClient::default());
        client.election_reply.store(42, Ordering::SeqCst);
        let bed = make_member(0, &[0, 10, 20], client);
        assert!(!bed.member.run_election_round().await);
        assert_eq!(bed.member.term(), 42);
    }

    #[tokio::test]
    async fn test_leader_steps_down_on_fresher_heartbeat_term() {
        let client = Arc::new(StubClient::default());
        let bed = make_member(0, &[0, 10, 20], client.clone());
        assert!(bed.member.run_election_round().await);
        client.heartbeat_term.store(7, Ordering::SeqCst);
        bed.member.heartbeat_round().await;
        assert_eq!(bed.member.character(), NodeCharacter::Follower);
        assert_eq!(bed.member.term(), 7);
    }

    // -- replication --

    #[tokio::test]
    async fn test_follower_appends_and_applies_on_commit() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        let sg = PhysicalPlan::SetStorageGroup("root.sg0".to_string());
        let reply = bed.member.process_append_entry(&AppendEntryRequest {
            term: 1,
            leader: node(10),
            leader_commit: -1,
            entry: plan_entry(0, 1, &sg),
        });
        assert_eq!(reply, RESPONSE_AGREE);
        assert_eq!(bed.member.leader(), Some(node(10)));

        let insert = insert_plan(3, 1.5);
        let reply = bed.member.process_append_entry(&AppendEntryRequest {
            term: 1,
            leader: node(10),
            leader_commit: 0,
            entry: plan_entry(1, 1, &insert),
        });
        assert_eq!(reply, RESPONSE_AGREE);
        // entry 0 is committed and applied, entry 1 not yet
        assert!(bed.storage.query("root.sg0.d0.s0", None).unwrap().is_empty());

        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 1,
            leader: node(10),
            commit_index: 1,
        });
        assert_eq!(bed.storage.query("root.sg0.d0.s0", None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_with_gap_is_refused() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        let plan = PhysicalPlan::SetStorageGroup("root.sg0".to_string());
        let reply = bed.member.process_append_entry(&AppendEntryRequest {
            term: 1,
            leader: node(10),
            leader_commit: -1,
            entry: plan_entry(5, 1, &plan),
        });
        assert_eq!(reply, RESPONSE_LOG_MISMATCH);
    }

    // -- write path --

    #[tokio::test]
    async fn test_leader_executes_non_query() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        fill_leader(&bed, 10).await;
        let points = bed.storage.query("root.sg0.d0.s0", None).unwrap();
        assert_eq!(points.len(), 10);
        assert_eq!(bed.member.log.commit_index(), 11);
    }

    #[tokio::test]
    async fn test_follower_forwards_non_query() {
        let client = Arc::new(StubClient::default());
        let bed = make_member(0, &[0, 10, 20], client.clone());
        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 1,
            leader: node(10),
            commit_index: -1,
        });
        let status = bed.member.execute_non_query(insert_plan(0, 0.0)).await;
        assert_eq!(status, STATUS_SUCCESS);
        assert_eq!(client.forwarded_plans.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_no_leader_refuses_non_query() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        let status = bed.member.execute_non_query(insert_plan(0, 0.0)).await;
        assert_eq!(status, STATUS_NO_LEADER);
    }

    #[tokio::test]
    async fn test_quorum_failure_reports_execution_error() {
        let client = Arc::new(StubClient::default());
        let bed = make_member(0, &[0, 10, 20], client.clone());
        assert!(bed.member.run_election_round().await);
        client
            .append_reply
            .store(RESPONSE_LOG_MISMATCH, Ordering::SeqCst);
        let status = bed
            .member
            .execute_non_query(PhysicalPlan::SetStorageGroup("root.sg0".to_string()))
            .await;
        assert_eq!(status, STATUS_EXECUTION_ERROR);
    }

    #[tokio::test]
    async fn test_close_partition_seals_through_log() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        fill_leader(&bed, 5).await;
        let status = bed.member.close_partition("root.sg0", 0, true).await;
        assert_eq!(status, STATUS_SUCCESS);
        assert_eq!(bed.storage.sequence_resources("root.sg0").unwrap().len(), 1);
    }

    // -- membership --

    #[tokio::test]
    async fn test_add_node_displaces_only_last_member() {
        let client = Arc::new(StubClient::default());
        let beds: Vec<TestBed> = [0, 50, 90]
            .iter()
            .map(|&id| make_member(id, &[0, 50, 90], client.clone()))
            .collect();
        // 66 lands between 50 and 90, displacing the last member
        assert!(!beds[0].member.add_node(node(66)));
        assert!(!beds[1].member.add_node(node(66)));
        assert!(beds[2].member.add_node(node(66)));
        let group = beds[0].member.state.lock().all_nodes.clone();
        assert_eq!(group.nodes(), &[node(0), node(50), node(66)]);
    }

    #[tokio::test]
    async fn test_add_node_outside_group_range() {
        let bed = make_member(0, &[0, 50, 90], Arc::new(StubClient::default()));
        assert!(!bed.member.add_node(node(95)));
        let group = bed.member.state.lock().all_nodes.clone();
        assert_eq!(group.nodes(), &[node(0), node(50), node(90)]);
    }

    #[tokio::test]
    async fn test_add_existing_node_is_ignored() {
        let bed = make_member(0, &[0, 50, 90], Arc::new(StubClient::default()));
        assert!(!bed.member.add_node(node(50)));
    }

    #[tokio::test]
    async fn test_leader_removal_triggers_campaign_and_slot_pull() {
        let ring: Vec<i32> = (0..10).map(|i| i * 10).collect();
        let client = Arc::new(StubClient {
            serve_empty_snapshots: true,
            ..StubClient::default()
        });
        let bed = make_member(0, &ring, client);
        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 1,
            leader: node(10),
            commit_index: -1,
        });
        assert_eq!(bed.member.leader(), Some(node(10)));

        let removal = bed.table.write().remove_node(&node(10)).unwrap();
        bed.member
            .handle_node_removal(&node(10), &removal)
            .await
            .unwrap();

        assert_eq!(bed.member.character(), NodeCharacter::Elector);
        assert_eq!(bed.member.leader(), None);
        assert_eq!(
            bed.member.state.lock().last_heartbeat_recv_time,
            i64::MIN
        );
        for slot in &removal.new_slot_owners[&node(0)] {
            assert!(bed.member.holds_slot(*slot));
        }
    }

    #[tokio::test]
    async fn test_follower_removal_keeps_leader() {
        let ring: Vec<i32> = (0..10).map(|i| i * 10).collect();
        let client = Arc::new(StubClient {
            serve_empty_snapshots: true,
            ..StubClient::default()
        });
        let bed = make_member(0, &ring, client);
        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 1,
            leader: node(10),
            commit_index: -1,
        });
        let removal = bed.table.write().remove_node(&node(20)).unwrap();
        bed.member
            .handle_node_removal(&node(20), &removal)
            .await
            .unwrap();
        assert_eq!(bed.member.leader(), Some(node(10)));
        assert_eq!(bed.member.character(), NodeCharacter::Follower);
    }

    // -- snapshot transfer --

    #[tokio::test]
    async fn test_snapshot_round_trip_sets_watermark() {
        let client = Arc::new(StubClient::default());
        let source = make_member(0, &[0], client.clone());
        fill_leader(&source, 10).await;
        assert_eq!(source.member.close_partition("root.sg0", 0, true).await, STATUS_SUCCESS);
        source.member.send_snapshot_to(&node(10)).await.unwrap();

        let sent = client.snapshots_sent.lock();
        let (target, bytes) = &sent[0];
        assert_eq!(target, &node(10));

        let receiver = make_member(10, &[10], Arc::new(StubClient::default()));
        receiver.member.receive_snapshot(bytes).unwrap();
        // the log tail moved to the snapshot watermark
        let applied = source.member.log.applied_index();
        assert_eq!(receiver.member.log.last_log_index(), applied);
        assert_eq!(receiver.member.log.commit_index(), applied);
        assert_eq!(
            receiver
                .storage
                .sequence_resources("root.sg0")
                .unwrap()
                .len(),
            1
        );
        assert!(receiver.schema.get("root.sg0.d0.s0").is_some());
    }

    #[tokio::test]
    async fn test_leader_serves_pull_for_held_slots_only() {
        let bed = make_member(0, &[0], Arc::new(StubClient::default()));
        fill_leader(&bed, 10).await;
        assert_eq!(bed.member.close_partition("root.sg0", 0, true).await, STATUS_SUCCESS);

        let populated = SlotPartitionTable::slot_of("root.sg0", 0);
        let response = bed
            .member
            .serve_pull_snapshot(PullSnapshotRequest {
                required_slots: vec![populated, populated + 1],
            })
            .await
            .unwrap();
        let snapshot =
            FileSnapshot::deserialize(&response.snapshot_bytes[&populated]).unwrap();
        assert_eq!(snapshot.files().len(), 1);
        assert!(!snapshot.schemas().is_empty());
        // the neighboring slot is held but empty: present with no content
        let empty =
            FileSnapshot::deserialize(&response.snapshot_bytes[&(populated + 1)]).unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_unheld_slot_is_absent_from_pull_response() {
        let bed = make_member(0, &[0, 10], Arc::new(StubClient::default()));
        assert!(bed.member.run_election_round().await);
        let foreign = *bed.table.read().slots_of(&node(10)).first().unwrap();
        let response = bed
            .member
            .serve_pull_snapshot(PullSnapshotRequest {
                required_slots: vec![foreign],
            })
            .await
            .unwrap();
        assert!(!response.snapshot_bytes.contains_key(&foreign));
    }

    #[tokio::test]
    async fn test_follower_forwards_pull_to_leader() {
        let client = Arc::new(StubClient::default());
        client
            .pull_served
            .lock()
            .insert(5, FileSnapshot::new().serialize());
        let bed = make_member(0, &[0, 10, 20], client);
        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 1,
            leader: node(10),
            commit_index: -1,
        });
        let response = bed
            .member
            .serve_pull_snapshot(PullSnapshotRequest {
                required_slots: vec![5],
            })
            .await
            .unwrap();
        assert!(response.snapshot_bytes.contains_key(&5));
    }

    #[tokio::test]
    async fn test_pull_without_leader_is_refused() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        let result = bed
            .member
            .serve_pull_snapshot(PullSnapshotRequest {
                required_slots: vec![5],
            })
            .await;
        assert!(matches!(result, Err(Error::NoLeader)));
    }

    // -- read path --

    #[tokio::test]
    async fn test_query_single_series_and_fetch() {
        let bed = make_member(0, &[0], Arc::new(StubClient::default()));
        fill_leader(&bed, 10).await;
        let reader = bed
            .member
            .query_single_series(&SingleSeriesQueryRequest {
                path: "root.sg0.d0.s0".to_string(),
                requester: node(10),
                query_id: 1,
                time_filter: Some(Filter::time_gt_eq(5)),
                value_filter: Some(Filter::value_lt_eq(8.0)),
            })
            .await
            .unwrap();
        assert!(reader > 0);
        let points = bed.member.fetch(reader, 100).unwrap();
        let times: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![5, 6, 7, 8]);
        bed.member.end_query(&node(10), 1);
        assert!(bed.member.fetch(reader, 100).is_err());
    }

    #[tokio::test]
    async fn test_query_by_timestamp_over_member() {
        let bed = make_member(0, &[0], Arc::new(StubClient::default()));
        fill_leader(&bed, 10).await;
        let reader = bed
            .member
            .query_single_series_by_timestamp(&SingleSeriesQueryRequest {
                path: "root.sg0.d0.s0".to_string(),
                requester: node(10),
                query_id: 3,
                time_filter: None,
                value_filter: Some(Filter::value_lt_eq(4.0)),
            })
            .await
            .unwrap();
        assert!(reader > 0);
        let values = bed.member.fetch_by_timestamp(reader, &[2, 7]).unwrap();
        assert_eq!(values, vec![Some(TsValue::Double(2.0)), None]);
        bed.member.end_query(&node(10), 3);
        assert!(bed.member.fetch_by_timestamp(reader, &[2]).is_err());
    }

    #[tokio::test]
    async fn test_pull_timeseries_schema_deduplicates() {
        let bed = make_member(0, &[0], Arc::new(StubClient::default()));
        fill_leader(&bed, 1).await;
        let schemas = bed
            .member
            .pull_timeseries_schema(&["root.sg0".to_string(), "root".to_string()])
            .await
            .unwrap();
        let paths: Vec<&str> = schemas.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["root.sg0.d0.s0"]);
    }

    #[tokio::test]
    async fn test_schema_pull_forwards_when_sync_times_out() {
        let client = Arc::new(StubClient::default());
        // leader commit watermark stays out of reach
        client.commit_reply.store(100, Ordering::SeqCst);
        let bed = make_member(0, &[0, 10, 20], client.clone());
        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 1,
            leader: node(10),
            commit_index: -1,
        });
        let schemas = bed
            .member
            .pull_timeseries_schema(&["root".to_string()])
            .await
            .unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(client.schema_pulls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_schema_pull_without_leader_is_refused() {
        let bed = make_member(0, &[0, 10, 20], Arc::new(StubClient::default()));
        let result = bed.member.pull_timeseries_schema(&["root".to_string()]).await;
        assert!(matches!(result, Err(Error::NoLeader)));
    }

    #[tokio::test]
    async fn test_query_for_foreign_slot_is_not_hosted() {
        let bed = make_member(0, &[0, 10], Arc::new(StubClient::default()));
        assert!(bed.member.run_election_round().await);
        // find a storage group whose slot lives on the other group
        let foreign_sg = (0..)
            .map(|i| format!("root.sg{i}"))
            .find(|sg| {
                bed.table
                    .read()
                    .owner_of(SlotPartitionTable::slot_of(sg, 0))
                    == &node(10)
            })
            .unwrap();
        let reader = bed
            .member
            .query_single_series(&SingleSeriesQueryRequest {
                path: format!("{foreign_sg}.d0.s0"),
                requester: node(10),
                query_id: 1,
                time_filter: None,
                value_filter: None,
            })
            .await
            .unwrap();
        assert_eq!(reader, READER_NOT_HOSTED);
    }

    #[tokio::test]
    async fn test_group_by_over_member() {
        let bed = make_member(0, &[0], Arc::new(StubClient::default()));
        fill_leader(&bed, 20).await;
        let executor = bed
            .member
            .get_group_by_executor(&GroupByRequest {
                path: "root.sg0.d0.s0".to_string(),
                requester: node(10),
                query_id: 2,
                aggregations: vec![AggregationType::Sum, AggregationType::Count],
                time_filter: None,
            })
            .await
            .unwrap();
        let results = bed.member.calculate_group_by(executor, 0, 10).unwrap();
        assert_eq!(results[0].value, Some(45.0));
        assert_eq!(results[1].value, Some(10.0));
        bed.member.end_query(&node(10), 2);
    }

    #[tokio::test]
    async fn test_get_all_paths() {
        let bed = make_member(0, &[0], Arc::new(StubClient::default()));
        fill_leader(&bed, 1).await;
        assert_eq!(
            bed.member.get_all_paths("root.sg0"),
            vec!["root.sg0.d0.s0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sync_leader_succeeds_when_caught_up() {
        let client = Arc::new(StubClient::default());
        client.commit_reply.store(-1, Ordering::SeqCst);
        let bed = make_member(0, &[0, 10, 20], client.clone());
        bed.member.process_heartbeat(&HeartbeatRequest {
            term: 1,
            leader: node(10),
            commit_index: -1,
        });
        assert!(bed.member.sync_leader().await);
        // a commit watermark beyond ours times the wait out
        client.commit_reply.store(100, Ordering::SeqCst);
        assert!(!bed.member.sync_leader().await);
    }
}
