use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use disque_common::auth::AuthConfig;
use disque_common::protocol::{Command, Reply};
use disque_common::transport::{Flow, Session};

use crate::store::{JobStore, StoredJob};

/// One node of a mock cluster.
///
/// Answers the subset of Disque commands the client uses, operating on the
/// [`JobStore`] it shares with the other nodes of its cluster.
///
/// # Commands
///
/// `HELLO`, `PING`, `AUTH`, `QUIT`, `INFO`, `ADDJOB`, `GETJOB`, `ACKJOB`,
/// `FASTACK`, `NACK`, `QLEN`, `SHOW` and `DEBUG FLUSHALL`. Anything else gets
/// `ERR unknown command`.
///
/// `GETJOB` never blocks: with no job available it answers at once, as if
/// its timeout had expired.
pub struct MockNode {
    index: usize,
    store: Arc<Mutex<JobStore>>,
    auth: AuthConfig,
    describe_cluster: bool,
}

/// Early return value for a command that cannot be executed.
type Refusal = Reply;

impl MockNode {
    pub fn new(index: usize, store: Arc<Mutex<JobStore>>, auth: AuthConfig, describe_cluster: bool) -> Self {
        Self {
            index,
            store,
            auth,
            describe_cluster,
        }
    }

    /// Produces the reply to one command.
    pub async fn handle(&self, command: Command, session: Arc<Session>) -> (Reply, Flow) {
        let name = command.name().to_ascii_uppercase();
        debug!(node = self.index, session = session.id(), command = %name, "Handling command");

        if self.auth.requires_auth() && !session.is_authenticated() && name != "AUTH" && name != "QUIT" {
            return (Reply::error("NOAUTH Authentication required."), Flow::Continue);
        }

        let reply = match name.as_str() {
            "QUIT" => return (Reply::status("OK"), Flow::Close),
            "AUTH" => self.auth(&command, &session).await,
            "PING" => match command.args().first() {
                Some(arg) => Reply::bulk(arg.clone()),
                None => Reply::status("PONG"),
            },
            "HELLO" => self.hello().await,
            "INFO" => self.info().await,
            "ADDJOB" => self.addjob(&command).await.unwrap_or_else(|refusal| refusal),
            "GETJOB" => self.getjob(&command).await.unwrap_or_else(|refusal| refusal),
            "ACKJOB" | "FASTACK" => {
                let ids = string_args(&command, 0);
                Reply::Integer(self.store.lock().await.ack(&ids))
            }
            "NACK" => {
                let ids = string_args(&command, 0);
                Reply::Integer(self.store.lock().await.nack(&ids))
            }
            "QLEN" => match command.arg_str(0) {
                Some(queue) => Reply::Integer(self.store.lock().await.qlen(self.index, queue) as i64),
                None => wrong_arity("qlen"),
            },
            "SHOW" => match command.arg_str(0) {
                Some(id) => self.store.lock().await.get(id).map_or(Reply::Bulk(None), show_reply),
                None => wrong_arity("show"),
            },
            "DEBUG" if command.arg_str(0).is_some_and(|sub| sub.eq_ignore_ascii_case("FLUSHALL")) => {
                self.store.lock().await.flush(self.index);
                Reply::status("OK")
            }
            _ => Reply::error(format!("ERR unknown command '{}'", command.name())),
        };

        (reply, Flow::Continue)
    }

    async fn auth(&self, command: &Command, session: &Session) -> Reply {
        let Some(secret) = command.arg_str(0) else {
            return wrong_arity("auth");
        };
        self.store.lock().await.record_auth(self.index, secret);

        if self.auth.validate(secret) {
            session.set_authenticated(true);
            Reply::status("OK")
        } else {
            Reply::error("ERR invalid password")
        }
    }

    async fn hello(&self) -> Reply {
        if !self.describe_cluster {
            return Reply::status("OK");
        }

        let store = self.store.lock().await;
        let mut items = vec![Reply::Integer(1), Reply::bulk_str(&store.node(self.index).id)];
        for node in store.nodes() {
            let (host, port) = node.address.rsplit_once(':').unwrap_or((node.address.as_str(), "0"));
            items.push(Reply::array(vec![
                Reply::bulk_str(&node.id),
                Reply::bulk_str(host),
                Reply::bulk_str(port),
                Reply::bulk_str("1"),
            ]));
        }
        Reply::array(items)
    }

    async fn info(&self) -> Reply {
        let store = self.store.lock().await;
        let node = store.node(self.index);
        let port = node.address.rsplit_once(':').map_or("0", |(_, port)| port);
        let text = format!(
            "# Server\r\ndisque_version:mock\r\ntcp_port:{}\r\nrun_id:{}\r\nloading:0\r\n\r\n# Jobs\r\nregistered_jobs:{}\r\n",
            port,
            node.id,
            store.registered(self.index)
        );
        Reply::bulk(text)
    }

    async fn addjob(&self, command: &Command) -> Result<Reply, Refusal> {
        let args = command.args();
        if args.len() < 3 {
            return Err(wrong_arity("addjob"));
        }
        let queue = arg_string(command, 0)?;
        let body = args[1].clone();
        number(command, 2, "Invalid Timeout")?;

        let mut maxlen = None;
        let mut pos = 3;
        while let Some(option) = command.arg_str(pos) {
            match option.to_ascii_uppercase().as_str() {
                "REPLICATE" | "DELAY" | "RETRY" | "TTL" => {
                    number(command, pos + 1, "syntax error")?;
                    pos += 2;
                }
                "MAXLEN" => {
                    maxlen = Some(number(command, pos + 1, "syntax error")? as usize);
                    pos += 2;
                }
                "ASYNC" => pos += 1,
                _ => return Err(Reply::error("ERR syntax error")),
            }
        }

        let id = self
            .store
            .lock()
            .await
            .add(self.index, &queue, body, maxlen)
            .map_err(Reply::error)?;
        Ok(Reply::bulk(id))
    }

    async fn getjob(&self, command: &Command) -> Result<Reply, Refusal> {
        let mut count = 1;
        let mut with_counters = false;
        let mut pos = 0;
        loop {
            let Some(option) = command.arg_str(pos) else {
                return Err(Reply::error("ERR syntax error"));
            };
            match option.to_ascii_uppercase().as_str() {
                "FROM" => break,
                "NOHANG" => pos += 1,
                "WITHCOUNTERS" => {
                    with_counters = true;
                    pos += 1;
                }
                "TIMEOUT" => {
                    number(command, pos + 1, "syntax error")?;
                    pos += 2;
                }
                "COUNT" => {
                    count = number(command, pos + 1, "syntax error")? as usize;
                    pos += 2;
                }
                _ => return Err(Reply::error("ERR syntax error")),
            }
        }

        let queues = string_args(command, pos + 1);
        if queues.is_empty() {
            return Err(Reply::error("ERR syntax error"));
        }

        let jobs = self.store.lock().await.take(self.index, &queues, count);
        if jobs.is_empty() {
            return Ok(Reply::Array(None));
        }
        Ok(Reply::array(jobs.iter().map(|job| job_reply(job, with_counters)).collect()))
    }
}

fn job_reply(job: &StoredJob, with_counters: bool) -> Reply {
    let mut fields = vec![
        Reply::bulk_str(&job.queue),
        Reply::bulk_str(&job.id),
        Reply::bulk(job.body.clone()),
    ];
    if with_counters {
        fields.extend([
            Reply::bulk_str("nacks"),
            Reply::Integer(job.nacks),
            Reply::bulk_str("additional-deliveries"),
            Reply::Integer(job.additional_deliveries()),
        ]);
    }
    Reply::array(fields)
}

fn show_reply(job: &StoredJob) -> Reply {
    Reply::array(vec![
        Reply::bulk_str("id"),
        Reply::bulk_str(&job.id),
        Reply::bulk_str("queue"),
        Reply::bulk_str(&job.queue),
        Reply::bulk_str("state"),
        Reply::bulk_str(job.state.as_str()),
        Reply::bulk_str("nacks"),
        Reply::Integer(job.nacks),
        Reply::bulk_str("additional-deliveries"),
        Reply::Integer(job.additional_deliveries()),
        Reply::bulk_str("body"),
        Reply::bulk(job.body.clone()),
    ])
}

fn wrong_arity(command: &str) -> Reply {
    Reply::error(format!("ERR wrong number of arguments for '{}' command", command))
}

fn arg_string(command: &Command, index: usize) -> Result<String, Refusal> {
    command
        .arg_str(index)
        .map(str::to_string)
        .ok_or_else(|| Reply::error("ERR syntax error"))
}

fn number(command: &Command, index: usize, message: &str) -> Result<u64, Refusal> {
    command
        .arg_str(index)
        .and_then(|arg| arg.parse().ok())
        .ok_or_else(|| Reply::error(format!("ERR {}", message)))
}

fn string_args(command: &Command, from: usize) -> Vec<String> {
    (from..command.args().len())
        .filter_map(|i| command.arg_str(i).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{random_node_id, NodeInfo};
    use bytes::Bytes;

    fn body(text: &'static str) -> Bytes {
        Bytes::from_static(text.as_bytes())
    }

    fn node(nodes: usize, auth: AuthConfig) -> MockNode {
        let infos = (0..nodes)
            .map(|i| NodeInfo::new(random_node_id(), format!("127.0.0.1:{}", 7711 + i)))
            .collect();
        MockNode::new(0, Arc::new(Mutex::new(JobStore::new(infos))), auth, true)
    }

    fn session() -> Arc<Session> {
        Arc::new(Session::new("127.0.0.1:5000".parse().unwrap()))
    }

    async fn run(node: &MockNode, session: &Arc<Session>, command: Command) -> Reply {
        node.handle(command, session.clone()).await.0
    }

    #[tokio::test]
    async fn test_ping_and_quit() {
        let node = node(1, AuthConfig::disabled());
        let s = session();
        assert_eq!(run(&node, &s, Command::new("ping")).await, Reply::status("PONG"));
        assert_eq!(run(&node, &s, Command::new("PING").arg("hi")).await, Reply::bulk(body("hi")));

        let (reply, flow) = node.handle(Command::new("QUIT"), s).await;
        assert_eq!(reply, Reply::status("OK"));
        assert_eq!(flow, Flow::Close);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let node = node(1, AuthConfig::disabled());
        let reply = run(&node, &session(), Command::new("FOOBAR")).await;
        assert!(matches!(reply, Reply::Error(text) if text.starts_with("ERR unknown command")));
    }

    #[tokio::test]
    async fn test_hello_lists_every_node() {
        let node = node(3, AuthConfig::disabled());
        let reply = run(&node, &session(), Command::new("HELLO")).await;
        let items = reply.as_array().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0], Reply::Integer(1));
        assert_eq!(items[3].as_array().unwrap()[2].as_str(), Some("7712"));
    }

    #[tokio::test]
    async fn test_auth_required() {
        let node = node(1, AuthConfig::with_secret("foobar"));
        let s = session();

        let reply = run(&node, &s, Command::new("PING")).await;
        assert!(matches!(reply, Reply::Error(text) if text.starts_with("NOAUTH")));

        let reply = run(&node, &s, Command::new("AUTH").arg("wrong")).await;
        assert!(reply.is_error());
        let reply = run(&node, &s, Command::new("AUTH").arg("foobar")).await;
        assert_eq!(reply, Reply::status("OK"));
        assert_eq!(run(&node, &s, Command::new("PING")).await, Reply::status("PONG"));

        assert_eq!(node.store.lock().await.node(0).auth_attempts, vec!["wrong", "foobar"]);
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let node = node(1, AuthConfig::disabled());
        let s = session();

        let id = run(&node, &s, Command::new("ADDJOB").arg("q").arg("j1").arg(0u64)).await;
        let id = id.as_str().unwrap().to_string();

        let info = run(&node, &s, Command::new("INFO")).await;
        assert!(info.as_str().unwrap().contains("registered_jobs:1\r\n"));
        assert_eq!(run(&node, &s, Command::new("QLEN").arg("q")).await, Reply::Integer(1));

        let jobs = run(&node, &s, Command::new("GETJOB").arg("WITHCOUNTERS").arg("FROM").arg("q")).await;
        let job = jobs.as_array().unwrap()[0].as_array().unwrap().to_vec();
        assert_eq!(job[1].as_str(), Some(id.as_str()));
        assert_eq!(job[2].as_str(), Some("j1"));
        assert_eq!(job.len(), 7);

        assert!(!run(&node, &s, Command::new("SHOW").arg(&id)).await.is_nil());
        assert_eq!(run(&node, &s, Command::new("ACKJOB").arg(&id)).await, Reply::Integer(1));
        assert!(run(&node, &s, Command::new("SHOW").arg(&id)).await.is_nil());

        let empty = run(&node, &s, Command::new("GETJOB").arg("NOHANG").arg("FROM").arg("q")).await;
        assert!(empty.is_nil());
    }

    #[tokio::test]
    async fn test_addjob_maxlen() {
        let node = node(1, AuthConfig::disabled());
        let s = session();
        for body in ["j1", "j2"] {
            run(&node, &s, Command::new("ADDJOB").arg("q").arg(body).arg(0u64)).await;
        }
        let reply = run(
            &node,
            &s,
            Command::new("ADDJOB").arg("q").arg("j3").arg(0u64).arg("MAXLEN").arg(1u64),
        )
        .await;
        assert!(matches!(reply, Reply::Error(text) if text.starts_with("MAXLEN")));
    }

    #[tokio::test]
    async fn test_malformed_arguments() {
        let node = node(1, AuthConfig::disabled());
        let s = session();
        assert!(run(&node, &s, Command::new("ADDJOB").arg("q")).await.is_error());
        assert!(run(&node, &s, Command::new("ADDJOB").arg("q").arg("j").arg("soon")).await.is_error());
        assert!(run(&node, &s, Command::new("GETJOB").arg("q")).await.is_error());
        assert!(run(&node, &s, Command::new("GETJOB").arg("FROM")).await.is_error());
    }

    #[tokio::test]
    async fn test_debug_flushall() {
        let node = node(1, AuthConfig::disabled());
        let s = session();
        run(&node, &s, Command::new("ADDJOB").arg("q").arg("j").arg(0u64)).await;
        let reply = run(&node, &s, Command::new("DEBUG").arg("flushall")).await;
        assert_eq!(reply, Reply::status("OK"));
        assert_eq!(run(&node, &s, Command::new("QLEN").arg("q")).await, Reply::Integer(0));
    }
}
