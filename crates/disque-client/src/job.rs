//! Jobs and the options of the commands that produce and consume them

use bytes::Bytes;
use serde::{Serialize, Serializer};

use disque_common::protocol::error::{DisqueError, Result};
use disque_common::protocol::{Command, Reply, ToArg};

use crate::topology::PREFIX_LEN;

/// Returns the producer-node prefix carried by a job id.
///
/// Disque ids look like `D-dcb833cf-8YL1NT17e9+wsA/09NqxscQI-05a1`, where the
/// eight characters after `D-` are the start of the producing node's id. Ids
/// without the `D-` marker are taken to start with the prefix directly.
/// Returns `None` for ids shorter than a prefix.
pub fn job_prefix(id: &str) -> Option<&str> {
    let rest = id.strip_prefix("D-").unwrap_or(id);
    rest.get(..PREFIX_LEN)
}

/// A job delivered by `GETJOB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub queue: String,
    pub id: String,
    #[serde(serialize_with = "lossy_utf8")]
    pub body: Bytes,
    /// Number of `NACK`s, only with `WITHCOUNTERS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nacks: Option<i64>,
    /// Deliveries beyond the first, only with `WITHCOUNTERS`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_deliveries: Option<i64>,
}

impl Job {
    /// Body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Producer-node prefix of this job's id.
    pub fn prefix(&self) -> Option<&str> {
        job_prefix(&self.id)
    }

    /// Parses the reply to `GETJOB`.
    ///
    /// A null array (the server-side timeout expired) yields no jobs.
    pub fn parse_list(reply: Reply) -> Result<Vec<Job>> {
        match reply {
            Reply::Array(None) => Ok(Vec::new()),
            Reply::Array(Some(items)) => items.into_iter().map(Job::try_from).collect(),
            other => Err(DisqueError::InvalidResponse(format!(
                "expected array reply to GETJOB, got {}",
                other.kind()
            ))),
        }
    }
}

impl TryFrom<Reply> for Job {
    type Error = DisqueError;

    /// Parses `[queue, id, body]`, optionally followed by counter pairs such
    /// as `nacks 0 additional-deliveries 1`.
    fn try_from(reply: Reply) -> Result<Self> {
        let fields = reply
            .into_array()
            .ok_or_else(|| DisqueError::InvalidResponse("job entry is not an array".to_string()))?;
        if fields.len() < 3 {
            return Err(DisqueError::InvalidResponse(format!(
                "job entry has {} fields, expected at least 3",
                fields.len()
            )));
        }

        let mut fields = fields.into_iter();
        let queue = fields.next().map(Reply::into_string).transpose()?.unwrap_or_default();
        let id = fields.next().map(Reply::into_string).transpose()?.unwrap_or_default();
        let body = match fields.next() {
            Some(Reply::Bulk(Some(data))) => data,
            Some(Reply::Status(text)) => Bytes::from(text),
            Some(other) => {
                return Err(DisqueError::InvalidResponse(format!(
                    "job body is {}, expected bulk",
                    other.kind()
                )))
            }
            None => Bytes::new(),
        };

        let mut job = Job {
            queue,
            id,
            body,
            nacks: None,
            additional_deliveries: None,
        };

        while let (Some(key), Some(value)) = (fields.next(), fields.next()) {
            match key.as_str() {
                Some("nacks") => job.nacks = value.as_integer(),
                Some("additional-deliveries") => job.additional_deliveries = value.as_integer(),
                _ => {}
            }
        }

        Ok(job)
    }
}

fn lossy_utf8<S: Serializer>(body: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

/// Options for `ADDJOB`.
///
/// Durations are whole seconds, as the server expects them.
///
/// # Example
///
/// ```rust
/// use disque_client::AddJobOptions;
///
/// let options = AddJobOptions::new().maxlen(1).retry(30).replicate(2);
/// let cmd = options.command("q1", "payload", 0);
/// assert_eq!(cmd.name(), "ADDJOB");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddJobOptions {
    /// Number of nodes the job is replicated to
    pub replicate: Option<u32>,
    /// Seconds before the job is queued
    pub delay: Option<u64>,
    /// Seconds before an unacknowledged job is queued again
    pub retry: Option<u64>,
    /// Seconds the job may live
    pub ttl: Option<u64>,
    /// Refuse the job if the queue already holds this many
    pub maxlen: Option<u64>,
    /// Reply before replication completes
    pub asynchronous: bool,
}

impl AddJobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replicate(mut self, count: u32) -> Self {
        self.replicate = Some(count);
        self
    }

    pub fn delay(mut self, secs: u64) -> Self {
        self.delay = Some(secs);
        self
    }

    pub fn retry(mut self, secs: u64) -> Self {
        self.retry = Some(secs);
        self
    }

    pub fn ttl(mut self, secs: u64) -> Self {
        self.ttl = Some(secs);
        self
    }

    pub fn maxlen(mut self, count: u64) -> Self {
        self.maxlen = Some(count);
        self
    }

    pub fn asynchronous(mut self, yes: bool) -> Self {
        self.asynchronous = yes;
        self
    }

    /// Builds `ADDJOB queue body timeout_ms [options]`.
    ///
    /// `timeout_ms` bounds how long the server waits for replication.
    pub fn command(&self, queue: &str, body: impl ToArg, timeout_ms: u64) -> Command {
        let mut cmd = Command::new("ADDJOB").arg(queue).arg(body).arg(timeout_ms);
        if let Some(n) = self.replicate {
            cmd = cmd.arg("REPLICATE").arg(n);
        }
        if let Some(secs) = self.delay {
            cmd = cmd.arg("DELAY").arg(secs);
        }
        if let Some(secs) = self.retry {
            cmd = cmd.arg("RETRY").arg(secs);
        }
        if let Some(secs) = self.ttl {
            cmd = cmd.arg("TTL").arg(secs);
        }
        if let Some(n) = self.maxlen {
            cmd = cmd.arg("MAXLEN").arg(n);
        }
        if self.asynchronous {
            cmd = cmd.arg("ASYNC");
        }
        cmd
    }
}

/// Options for `GETJOB`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetJobOptions {
    /// Maximum number of jobs returned
    pub count: Option<u32>,
    /// Milliseconds to block waiting for jobs; 0 blocks forever
    pub timeout: Option<u64>,
    /// Return immediately when no job is available
    pub nohang: bool,
    /// Include `nacks` and `additional-deliveries` with each job
    pub with_counters: bool,
}

impl GetJobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn timeout(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }

    pub fn nohang(mut self, yes: bool) -> Self {
        self.nohang = yes;
        self
    }

    pub fn with_counters(mut self, yes: bool) -> Self {
        self.with_counters = yes;
        self
    }

    /// Builds `GETJOB [options] FROM queue...`.
    pub fn command<S: AsRef<str>>(&self, queues: &[S]) -> Command {
        let mut cmd = Command::new("GETJOB");
        if self.nohang {
            cmd = cmd.arg("NOHANG");
        }
        if let Some(ms) = self.timeout {
            cmd = cmd.arg("TIMEOUT").arg(ms);
        }
        if let Some(n) = self.count {
            cmd = cmd.arg("COUNT").arg(n);
        }
        if self.with_counters {
            cmd = cmd.arg("WITHCOUNTERS");
        }
        cmd.arg("FROM").args_from(queues.iter().map(|q| q.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<&str> {
        (0..cmd.args().len()).filter_map(|i| cmd.arg_str(i)).collect()
    }

    #[test]
    fn test_job_prefix() {
        assert_eq!(job_prefix("D-dcb833cf-8YL1NT17e9+wsA/09NqxscQI-05a1"), Some("dcb833cf"));
        assert_eq!(job_prefix("0123456789"), Some("01234567"));
        assert_eq!(job_prefix("D-abc"), None);
        assert_eq!(job_prefix(""), None);
    }

    #[test]
    fn test_addjob_command() {
        let cmd = AddJobOptions::new()
            .replicate(2)
            .delay(5)
            .retry(30)
            .ttl(3600)
            .maxlen(1)
            .asynchronous(true)
            .command("q1", "body", 250);
        assert_eq!(
            args(&cmd),
            vec![
                "q1", "body", "250", "REPLICATE", "2", "DELAY", "5", "RETRY", "30", "TTL", "3600",
                "MAXLEN", "1", "ASYNC"
            ]
        );

        let plain = AddJobOptions::default().command("q1", "body", 0);
        assert_eq!(args(&plain), vec!["q1", "body", "0"]);
    }

    #[test]
    fn test_getjob_command() {
        let cmd = GetJobOptions::new()
            .nohang(true)
            .timeout(100)
            .count(3)
            .with_counters(true)
            .command(&["q1", "q2"]);
        assert_eq!(
            args(&cmd),
            vec!["NOHANG", "TIMEOUT", "100", "COUNT", "3", "WITHCOUNTERS", "FROM", "q1", "q2"]
        );
        assert_eq!(args(&GetJobOptions::default().command(&["q"])), vec!["FROM", "q"]);
    }

    #[test]
    fn test_parse_jobs() {
        let reply = Reply::array(vec![
            Reply::array(vec![Reply::bulk_str("q1"), Reply::bulk_str("D-aaaaaaaa-1"), Reply::bulk_str("hello")]),
            Reply::array(vec![
                Reply::bulk_str("q2"),
                Reply::bulk_str("D-bbbbbbbb-2"),
                Reply::bulk_str("world"),
                Reply::bulk_str("nacks"),
                Reply::Integer(2),
                Reply::bulk_str("additional-deliveries"),
                Reply::Integer(1),
            ]),
        ]);

        let jobs = Job::parse_list(reply).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].queue, "q1");
        assert_eq!(jobs[0].body_str(), Some("hello"));
        assert_eq!(jobs[0].prefix(), Some("aaaaaaaa"));
        assert_eq!(jobs[0].nacks, None);
        assert_eq!(jobs[1].nacks, Some(2));
        assert_eq!(jobs[1].additional_deliveries, Some(1));
    }

    #[test]
    fn test_parse_jobs_empty_and_invalid() {
        assert!(Job::parse_list(Reply::Array(None)).unwrap().is_empty());
        assert!(Job::parse_list(Reply::array(vec![])).unwrap().is_empty());
        assert!(Job::parse_list(Reply::Integer(1)).is_err());
        assert!(Job::parse_list(Reply::array(vec![Reply::array(vec![Reply::bulk_str("q")])])).is_err());
    }

    #[test]
    fn test_job_serializes_body_as_text() {
        let job = Job {
            queue: "q".to_string(),
            id: "D-aaaaaaaa-1".to_string(),
            body: Bytes::from_static(b"payload"),
            nacks: None,
            additional_deliveries: None,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["body"], "payload");
        assert!(value.get("nacks").is_none());
    }
}
