use std::fmt;

use crate::error::{Error, Result};

/// A `[user@]host:dir` destination. `dir` is the remote directory the
/// archive is copied into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub dir: String,
}

impl RemoteTarget {
    /// Join a remote root and a per-part relative destination under `host`.
    pub fn new(host: &str, root: &str, rel: &str) -> Result<Self> {
        let raw = format!("{host}:{root}{rel}");
        let host = host.trim();
        if host.is_empty() {
            return Err(Error::InvalidTarget { raw, reason: "missing host" });
        }
        let dir = join_remote(root.trim(), rel.trim());
        if dir.is_empty() {
            return Err(Error::InvalidTarget { raw, reason: "missing path" });
        }
        Ok(Self { host: host.to_string(), dir })
    }

    /// Parse `[user@]host:path` or `[user@][v6addr]:path`.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidTarget { raw: raw.to_string(), reason };
        let (host, dir) = if let Some(open) = raw.find('[') {
            let close = raw.find(']').ok_or_else(|| invalid("unterminated IPv6 address"))?;
            if close < open {
                return Err(invalid("unterminated IPv6 address"));
            }
            let rest = raw[close + 1..].strip_prefix(':').ok_or_else(|| invalid("missing ':'"))?;
            (&raw[..=close], rest)
        } else {
            raw.split_once(':').ok_or_else(|| invalid("missing ':'"))?
        };
        if host.is_empty() || host.ends_with('@') {
            return Err(invalid("missing host"));
        }
        if dir.is_empty() {
            return Err(invalid("missing path"));
        }
        Ok(Self { host: host.to_string(), dir: dir.to_string() })
    }

    /// Remote path of `file_name` inside this target's directory.
    pub fn file_path(&self, file_name: &str) -> String {
        join_remote(&self.dir, file_name)
    }

    /// Host as ssh takes it: an IPv6 literal loses its brackets.
    pub fn ssh_host(&self) -> String {
        self.host.replace(['[', ']'], "")
    }

    /// `host:dir/`, the form rsync treats as "copy into this directory".
    pub fn rsync_dest(&self) -> String {
        if self.dir.ends_with('/') {
            format!("{}:{}", self.host, self.dir)
        } else {
            format!("{}:{}/", self.host, self.dir)
        }
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.dir)
    }
}

fn join_remote(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => base.to_string(),
        (false, false) if base.ends_with('/') => format!("{base}{name}"),
        (false, false) => format!("{base}/{name}"),
    }
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
