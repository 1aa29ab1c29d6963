use std::fmt;
use std::str::FromStr;

use crate::error::ResqError;

/// Name of the machine this process runs on.
pub fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// A worker's fleet-wide identity: `<hostname>:<pid>:<queue1,queue2,...>`.
///
/// The formatted string is both the human-visible name and the suffix of
/// the worker's store keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
    hostname: String,
    pid: u32,
    queues: Vec<String>,
}

impl WorkerId {
    pub fn new(hostname: impl Into<String>, pid: u32, queues: Vec<String>) -> Self {
        Self {
            hostname: hostname.into(),
            pid,
            queues,
        }
    }

    /// Identity of the calling process.
    pub fn current(queues: Vec<String>) -> Self {
        Self::new(local_hostname(), std::process::id(), queues)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.hostname, self.pid, self.queues.join(","))
    }
}

impl FromStr for WorkerId {
    type Err = ResqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(hostname), Some(pid), Some(queues)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ResqError::InvalidWorkerId(s.to_string()));
        };

        let pid = pid
            .parse::<u32>()
            .map_err(|_| ResqError::InvalidWorkerId(s.to_string()))?;
        let queues = queues
            .split(',')
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self::new(hostname, pid, queues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_canonical_string() {
        let id = WorkerId::new("web-1", 4242, vec!["high".into(), "low".into()]);
        assert_eq!(id.to_string(), "web-1:4242:high,low");
    }

    #[test]
    fn parses_canonical_string() {
        let id: WorkerId = "web-1:4242:high,low".parse().unwrap();
        assert_eq!(id.hostname(), "web-1");
        assert_eq!(id.pid(), 4242);
        assert_eq!(id.queues(), ["high".to_string(), "low".to_string()]);
        assert_eq!(id.to_string(), "web-1:4242:high,low");
    }

    #[test]
    fn wildcard_queue() {
        let id: WorkerId = "h:1:*".parse().unwrap();
        assert_eq!(id.queues(), ["*".to_string()]);
    }

    #[test]
    fn rejects_malformed() {
        assert!("no-colons".parse::<WorkerId>().is_err());
        assert!("host:notapid:q".parse::<WorkerId>().is_err());
        assert!("host:12".parse::<WorkerId>().is_err());
    }

    #[test]
    fn current_uses_own_pid() {
        let id = WorkerId::current(vec!["q".into()]);
        assert_eq!(id.pid(), std::process::id());
        assert_eq!(id.hostname(), local_hostname());
    }
}
