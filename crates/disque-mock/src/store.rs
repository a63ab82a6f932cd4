//! In-memory job storage shared by every node of a mock cluster

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;

const NODE_ID_LEN: usize = 40;

/// Generates a random 40 character hex node id.
pub fn random_node_id() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..NODE_ID_LEN)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

/// Generates a job id in Disque's `D-<node prefix>-<random>-<ttl>` form.
fn job_id(node_id: &str) -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("D-{}-{}-05a1", node_id.get(..8).unwrap_or(node_id), random)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Active,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
        }
    }
}

/// A job as the store keeps it.
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub id: String,
    pub queue: String,
    pub body: Bytes,
    /// Index of the node currently holding the job
    pub node: usize,
    pub state: JobState,
    pub nacks: i64,
    pub deliveries: i64,
}

impl StoredJob {
    pub fn additional_deliveries(&self) -> i64 {
        (self.deliveries - 1).max(0)
    }
}

/// Identity and bookkeeping of one mock node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: String,
    pub address: String,
    /// Every secret received with `AUTH`, in order
    pub auth_attempts: Vec<String>,
}

impl NodeInfo {
    pub fn new(id: String, address: String) -> Self {
        Self {
            id,
            address,
            auth_attempts: Vec::new(),
        }
    }
}

/// Jobs and queues of a whole mock cluster.
///
/// Each node has its own queues. A node whose queue is empty pulls jobs
/// queued on other nodes, the way Disque federates consumption.
#[derive(Debug)]
pub struct JobStore {
    nodes: Vec<NodeInfo>,
    jobs: HashMap<String, StoredJob>,
    queues: Vec<HashMap<String, VecDeque<String>>>,
}

impl JobStore {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        let queues = nodes.iter().map(|_| HashMap::new()).collect();
        Self {
            nodes,
            jobs: HashMap::new(),
            queues,
        }
    }

    pub fn nodes(&self) -> &[NodeInfo] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &NodeInfo {
        &self.nodes[index]
    }

    pub fn record_auth(&mut self, node: usize, secret: &str) {
        self.nodes[node].auth_attempts.push(secret.to_string());
    }

    /// Queues a new job on `node`.
    ///
    /// # Errors
    ///
    /// Returns the error text to reply with when `maxlen` is exceeded.
    pub fn add(&mut self, node: usize, queue: &str, body: Bytes, maxlen: Option<usize>) -> Result<String, String> {
        let queued = self.qlen(node, queue);
        if maxlen.is_some_and(|max| queued >= max) {
            return Err("MAXLEN Queue is already longer than the specified MAXLEN count".to_string());
        }

        let id = job_id(&self.nodes[node].id);
        self.jobs.insert(
            id.clone(),
            StoredJob {
                id: id.clone(),
                queue: queue.to_string(),
                body,
                node,
                state: JobState::Queued,
                nacks: 0,
                deliveries: 0,
            },
        );
        self.queues[node]
            .entry(queue.to_string())
            .or_default()
            .push_back(id.clone());
        Ok(id)
    }

    /// Delivers up to `count` jobs from `queues` to `node`.
    ///
    /// Local queues are drained first; other nodes are asked, in order, only
    /// when the local queue is empty. Delivered jobs move to `node`.
    pub fn take(&mut self, node: usize, queues: &[String], count: usize) -> Vec<StoredJob> {
        let mut delivered = Vec::new();
        for queue in queues {
            while delivered.len() < count {
                let Some(id) = self.pop_any(node, queue) else {
                    break;
                };
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.node = node;
                    job.state = JobState::Active;
                    job.deliveries += 1;
                    delivered.push(job.clone());
                }
            }
        }
        delivered
    }

    fn pop_any(&mut self, node: usize, queue: &str) -> Option<String> {
        let order = std::iter::once(node).chain((0..self.nodes.len()).filter(|&n| n != node));
        for candidate in order {
            if let Some(id) = self.queues[candidate].get_mut(queue).and_then(VecDeque::pop_front) {
                return Some(id);
            }
        }
        None
    }

    /// Removes jobs, returning how many existed.
    pub fn ack(&mut self, ids: &[String]) -> i64 {
        let mut removed = 0;
        for id in ids {
            if let Some(job) = self.jobs.remove(id) {
                if let Some(queue) = self.queues[job.node].get_mut(&job.queue) {
                    queue.retain(|queued| queued != id);
                }
                removed += 1;
            }
        }
        removed
    }

    /// Puts active jobs back at the end of their queues.
    pub fn nack(&mut self, ids: &[String]) -> i64 {
        let mut requeued = 0;
        for id in ids {
            let Some(job) = self.jobs.get_mut(id) else {
                continue;
            };
            if job.state == JobState::Active {
                job.state = JobState::Queued;
                job.nacks += 1;
                self.queues[job.node]
                    .entry(job.queue.clone())
                    .or_default()
                    .push_back(id.clone());
            }
            requeued += 1;
        }
        requeued
    }

    pub fn qlen(&self, node: usize, queue: &str) -> usize {
        self.queues[node].get(queue).map_or(0, VecDeque::len)
    }

    pub fn get(&self, id: &str) -> Option<&StoredJob> {
        self.jobs.get(id)
    }

    /// Number of jobs held by `node`.
    pub fn registered(&self, node: usize) -> usize {
        self.jobs.values().filter(|job| job.node == node).count()
    }

    /// Drops every job held by `node`.
    pub fn flush(&mut self, node: usize) {
        self.jobs.retain(|_, job| job.node != node);
        self.queues[node].clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(nodes: usize) -> JobStore {
        let infos = (0..nodes)
            .map(|i| NodeInfo::new(random_node_id(), format!("127.0.0.1:{}", 7711 + i)))
            .collect();
        JobStore::new(infos)
    }

    fn queues(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_node_id_format() {
        let id = random_node_id();
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_job_id_carries_node_prefix() {
        let mut store = store(2);
        let id = store.add(1, "q", Bytes::from_static(b"x"), None).unwrap();
        let prefix = &store.node(1).id[..8];
        assert!(id.starts_with(&format!("D-{}-", prefix)));
    }

    #[test]
    fn test_maxlen() {
        let mut store = store(1);
        store.add(0, "q", Bytes::from_static(b"1"), None).unwrap();
        store.add(0, "q", Bytes::from_static(b"2"), None).unwrap();
        assert!(store.add(0, "q", Bytes::from_static(b"3"), Some(1)).is_err());
        assert_eq!(store.qlen(0, "q"), 2);
    }

    #[test]
    fn test_take_prefers_local_then_federates() {
        let mut store = store(2);
        let remote = store.add(1, "q", Bytes::from_static(b"remote"), None).unwrap();
        let local = store.add(0, "q", Bytes::from_static(b"local"), None).unwrap();

        let first = store.take(0, &queues(&["q"]), 1);
        assert_eq!(first[0].id, local);

        let second = store.take(0, &queues(&["q"]), 1);
        assert_eq!(second[0].id, remote);
        assert_eq!(store.get(&remote).unwrap().node, 0);

        assert!(store.take(0, &queues(&["q"]), 1).is_empty());
    }

    #[test]
    fn test_take_respects_count_across_queues() {
        let mut store = store(1);
        for body in ["a", "b", "c"] {
            store.add(0, "q1", Bytes::from(body), None).unwrap();
        }
        store.add(0, "q2", Bytes::from_static(b"d"), None).unwrap();

        let jobs = store.take(0, &queues(&["q2", "q1"]), 3);
        let bodies: Vec<_> = jobs.iter().map(|j| j.body.clone()).collect();
        assert_eq!(bodies, vec!["d", "a", "b"]);
    }

    #[test]
    fn test_ack_and_nack() {
        let mut store = store(1);
        let a = store.add(0, "q", Bytes::from_static(b"a"), None).unwrap();
        let b = store.add(0, "q", Bytes::from_static(b"b"), None).unwrap();

        store.take(0, &queues(&["q"]), 1);
        assert_eq!(store.nack(&[a.clone()]), 1);
        assert_eq!(store.get(&a).unwrap().nacks, 1);
        assert_eq!(store.qlen(0, "q"), 2);

        assert_eq!(store.ack(&[a.clone(), b.clone(), "D-unknown".to_string()]), 2);
        assert!(store.get(&a).is_none());
        assert_eq!(store.qlen(0, "q"), 0);
    }

    #[test]
    fn test_flush_only_touches_one_node() {
        let mut store = store(2);
        store.add(0, "q", Bytes::from_static(b"a"), None).unwrap();
        store.add(1, "q", Bytes::from_static(b"b"), None).unwrap();

        store.flush(0);
        assert_eq!(store.registered(0), 0);
        assert_eq!(store.registered(1), 1);
    }
}
