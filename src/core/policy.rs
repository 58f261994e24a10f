// src/core/policy.rs

//! Block predicates evaluated against the argv of every simple command
//! before anything is spawned.

use crate::models::PolicySection;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A pure predicate over an argv. Returning `true` vetoes the command.
pub type BlockFunc = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Blocks any command whose name is one of `names`.
///
/// Only the last path component of `argv[0]` is compared, so `/usr/bin/curl`
/// is caught by a `curl` entry.
pub fn command_blocker<I, S>(names: I) -> BlockFunc
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let banned: HashSet<String> = names.into_iter().map(Into::into).collect();
    Arc::new(move |argv: &[String]| {
        argv.first()
            .is_some_and(|cmd| banned.contains(cmd) || banned.contains(command_name(cmd)))
    })
}

/// Blocks any argv that starts with one of the banned sequences.
///
/// `[["npm", "install", "-g"]]` blocks `npm install -g foo` but still allows
/// a plain `npm install`.
pub fn argument_blocker<I, S>(banned: I) -> BlockFunc
where
    I: IntoIterator<Item = Vec<S>>,
    S: Into<String>,
{
    let sequences: Vec<Vec<String>> = banned
        .into_iter()
        .map(|seq| seq.into_iter().map(Into::into).collect::<Vec<String>>())
        .filter(|seq| !seq.is_empty())
        .collect();
    Arc::new(move |argv: &[String]| {
        sequences.iter().any(|seq| {
            argv.len() >= seq.len()
                && seq.iter().zip(argv).enumerate().all(|(i, (banned, arg))| {
                    banned == arg || (i == 0 && banned == command_name(arg))
                })
        })
    })
}

fn command_name(cmd: &str) -> &str {
    Path::new(cmd)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(cmd)
}

/// Commands an agent should never run unattended: network fetchers,
/// privilege escalation, interactive browsers and system package managers.
pub fn default_banned_commands() -> Vec<&'static str> {
    vec![
        // Network & downloads
        "aria2c", "axel", "curl", "curlie", "http", "httpie", "wget", "xh", "nc", "telnet",
        "scp", "ssh", "ftp", "sftp", "rsync",
        // Browsers
        "chrome", "firefox", "links", "lynx", "safari", "w3m",
        // Privilege escalation
        "doas", "su", "sudo", "pkexec",
        // System package managers
        "apk", "apt", "apt-cache", "apt-get", "dnf", "dpkg", "emerge", "pacman", "rpm",
        "yum", "zypper", "snap", "flatpak", "port",
        // System modification
        "crontab", "mkfs", "mount", "umount", "shutdown", "reboot", "halt", "poweroff",
        "systemctl", "service", "chown", "iptables", "ufw", "firewall-cmd", "useradd",
        "userdel", "usermod", "passwd",
    ]
}

/// Global installs and other argument combinations that reach outside the
/// project.
pub fn default_banned_arguments() -> Vec<Vec<&'static str>> {
    vec![
        vec!["npm", "install", "-g"],
        vec!["npm", "install", "--global"],
        vec!["npm", "i", "-g"],
        vec!["npm", "i", "--global"],
        vec!["pnpm", "add", "-g"],
        vec!["pnpm", "add", "--global"],
        vec!["yarn", "global", "add"],
        vec!["pip", "install", "--user"],
        vec!["pip3", "install", "--user"],
        vec!["cargo", "install"],
        vec!["gem", "install"],
        vec!["go", "install"],
        vec!["brew", "install"],
        vec!["brew", "uninstall"],
        vec!["brew", "upgrade"],
        vec!["git", "config", "--global"],
        vec!["go", "test", "-exec"],
    ]
}

/// An ordered list of block predicates; the first match vetoes.
#[derive(Clone, Default)]
pub struct BlockPolicy {
    funcs: Vec<BlockFunc>,
}

impl fmt::Debug for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockPolicy")
            .field("predicates", &self.funcs.len())
            .finish()
    }
}

impl BlockPolicy {
    /// An empty policy: every command is allowed.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// A policy made of `funcs`, checked in order.
    pub fn new(funcs: Vec<BlockFunc>) -> Self {
        Self { funcs }
    }

    /// The built-in deny lists.
    pub fn recommended() -> Self {
        Self::new(vec![
            command_blocker(default_banned_commands()),
            argument_blocker(default_banned_arguments()),
        ])
    }

    /// Builds the policy described by the `[policy]` section of the config.
    pub fn from_config(section: &PolicySection) -> Self {
        let mut policy = if section.use_recommended {
            Self::recommended()
        } else {
            Self::allow_all()
        };
        if !section.banned_commands.is_empty() {
            policy.push(command_blocker(section.banned_commands.clone()));
        }
        if !section.banned_arguments.is_empty() {
            policy.push(argument_blocker(section.banned_arguments.clone()));
        }
        policy
    }

    /// Appends one more predicate.
    pub fn push(&mut self, func: BlockFunc) {
        self.funcs.push(func);
    }

    /// True if nothing is blocked.
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Number of predicates.
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// The predicates, in check order.
    pub fn funcs(&self) -> &[BlockFunc] {
        &self.funcs
    }

    /// Consumes the policy into its predicates.
    pub fn into_funcs(self) -> Vec<BlockFunc> {
        self.funcs
    }

    /// Returns the index of the first predicate that blocks `argv`.
    pub fn check(&self, argv: &[String]) -> Option<usize> {
        self.funcs.iter().position(|block| block(argv))
    }

    /// True if any predicate blocks `argv`.
    pub fn is_blocked(&self, argv: &[String]) -> bool {
        self.check(argv).is_some()
    }
}

impl From<Vec<BlockFunc>> for BlockPolicy {
    fn from(funcs: Vec<BlockFunc>) -> Self {
        Self::new(funcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_command_blocker_matches_name_and_path() {
        let block = command_blocker(["curl", "wget"]);
        assert!(block(&argv(&["curl", "https://example.com"])));
        assert!(block(&argv(&["/usr/bin/wget", "-q"])));
        assert!(!block(&argv(&["git", "curl"])));
        assert!(!block(&[]));
    }

    #[test]
    fn test_argument_blocker_matches_prefix_only() {
        let block = argument_blocker(vec![
            vec!["npm", "install", "-g"],
            vec!["npm", "install", "--global"],
        ]);
        assert!(block(&argv(&["npm", "install", "-g", "typescript"])));
        assert!(block(&argv(&["npm", "install", "--global"])));
        assert!(!block(&argv(&["npm", "install"])));
        assert!(!block(&argv(&["npm", "install", "lodash", "-g"])));
        assert!(!block(&argv(&["npm"])));
    }

    #[test]
    fn test_empty_sequences_never_match() {
        let block = argument_blocker(vec![Vec::<String>::new()]);
        assert!(!block(&argv(&["anything"])));
    }

    #[test]
    fn test_policy_reports_first_match_in_order() {
        let policy = BlockPolicy::new(vec![
            command_blocker(["rm"]),
            argument_blocker(vec![vec!["rm", "-rf"]]),
        ]);
        assert_eq!(policy.check(&argv(&["rm", "-rf", "/"])), Some(0));
        assert_eq!(policy.check(&argv(&["ls"])), None);
    }

    #[test]
    fn test_allow_all_blocks_nothing() {
        let policy = BlockPolicy::allow_all();
        assert!(policy.is_empty());
        assert!(!policy.is_blocked(&argv(&["sudo", "reboot"])));
    }

    #[test]
    fn test_recommended_policy() {
        let policy = BlockPolicy::recommended();
        assert!(policy.is_blocked(&argv(&["sudo", "ls"])));
        assert!(policy.is_blocked(&argv(&["npm", "install", "-g", "x"])));
        assert!(!policy.is_blocked(&argv(&["npm", "install"])));
        assert!(!policy.is_blocked(&argv(&["ls", "-la"])));
    }

    #[test]
    fn test_policy_from_config() {
        let section = PolicySection {
            use_recommended: false,
            banned_commands: vec!["make".into()],
            banned_arguments: vec![vec!["git".into(), "push".into()]],
        };
        let policy = BlockPolicy::from_config(&section);
        assert_eq!(policy.len(), 2);
        assert!(policy.is_blocked(&argv(&["make", "all"])));
        assert!(policy.is_blocked(&argv(&["git", "push", "origin"])));
        assert!(!policy.is_blocked(&argv(&["git", "pull"])));
        assert!(!policy.is_blocked(&argv(&["curl", "x"])));
    }
}
