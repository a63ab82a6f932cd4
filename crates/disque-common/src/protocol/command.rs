use bytes::Bytes;

use super::error::{DisqueError, Result};
use super::reply::Reply;

/// A command name plus its ordered arguments.
///
/// Arguments are binary-safe; everything that implements `Into<Bytes>` or is a
/// number can be pushed with [`arg`](Self::arg).
///
/// # Example
///
/// ```
/// use disque_common::protocol::Command;
///
/// let cmd = Command::new("ADDJOB").arg("q1").arg("payload").arg(0u64);
/// assert_eq!(cmd.name(), "ADDJOB");
/// assert_eq!(cmd.args().len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl ToArg) -> Self {
        self.args.push(arg.to_arg());
        self
    }

    /// Appends every argument of an iterator, in order.
    pub fn args_from<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: ToArg,
    {
        self.args.extend(args.into_iter().map(|a| a.to_arg()));
        self
    }

    pub fn push(&mut self, arg: impl ToArg) {
        self.args.push(arg.to_arg());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Returns argument `index` as UTF-8 text, if present and valid.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(|a| std::str::from_utf8(a).ok())
    }

    /// Case-insensitive comparison of the command name.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl TryFrom<Reply> for Command {
    type Error = DisqueError;

    /// Builds a command from a RESP array of bulk strings, the form in which
    /// clients send commands to a server.
    fn try_from(reply: Reply) -> Result<Self> {
        let items = reply
            .into_array()
            .ok_or_else(|| DisqueError::Protocol("command must be a non-null array".to_string()))?;
        let mut parts = items.into_iter().map(|item| match item {
            Reply::Bulk(Some(b)) => Ok(b),
            Reply::Status(s) => Ok(Bytes::from(s)),
            other => Err(DisqueError::Protocol(format!(
                "command arguments must be bulk strings, got {}",
                other.kind()
            ))),
        });
        let name = parts
            .next()
            .ok_or_else(|| DisqueError::Protocol("empty command".to_string()))??;
        let name = std::str::from_utf8(&name)?.to_string();
        let args = parts.collect::<Result<Vec<_>>>()?;
        Ok(Command { name, args })
    }
}

/// Conversion of a value into one wire argument.
pub trait ToArg {
    fn to_arg(&self) -> Bytes;
}

impl ToArg for &str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for &String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for &[u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

macro_rules! int_to_arg {
    ($($t:ty),*) => {
        $(
            impl ToArg for $t {
                fn to_arg(&self) -> Bytes {
                    Bytes::from(self.to_string())
                }
            }
        )*
    };
}

int_to_arg!(u32, u64, usize, i32, i64);
