//! OS firewall backends for network containment.
//!
//! One [`FirewallBackend`] is chosen at startup (from configuration, or from
//! the host OS when the selector is `auto`) and shared for the life of the
//! process. Linux uses a dedicated iptables chain with comment-tagged DROP
//! rules, macOS loads per-id pf anchors, Windows adds named
//! `netsh advfirewall` rules, and the no-op backend records intents in
//! memory for tests and containment-disabled deployments.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};

use warden_types::NetworkKillResult;

/// Hard ceiling on any single firewall command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// The iptables chain all Linux containment rules live in.
const CHAIN: &str = "WARDEN_BLOCK";

/// Parent anchor for all pf rules on macOS.
const ANCHOR_ROOT: &str = "warden";

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Result of one backend operation, before it is stamped into a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallOutcome {
    /// How the operation ended.
    pub result: NetworkKillResult,
    /// Number of rules added or removed.
    pub rules_applied: u32,
    /// Backend error text when the operation did not fully succeed.
    pub error: Option<String>,
}

impl FirewallOutcome {
    /// Every rule landed.
    #[must_use]
    pub const fn success(rules_applied: u32) -> Self {
        Self {
            result: NetworkKillResult::Success,
            rules_applied,
            error: None,
        }
    }

    /// Some rules landed, some did not.
    #[must_use]
    pub fn partial(rules_applied: u32, error: String) -> Self {
        Self {
            result: NetworkKillResult::Partial,
            rules_applied,
            error: Some(error),
        }
    }

    /// Nothing was applied.
    #[must_use]
    pub fn failed(error: String) -> Self {
        Self {
            result: NetworkKillResult::Failed,
            rules_applied: 0,
            error: Some(error),
        }
    }

    /// The host refused the operation for lack of privileges.
    #[must_use]
    pub fn denied(error: String) -> Self {
        Self {
            result: NetworkKillResult::PermissionDenied,
            rules_applied: 0,
            error: Some(error),
        }
    }

    /// The host has no tooling for this backend.
    #[must_use]
    pub fn unsupported(error: String) -> Self {
        Self {
            result: NetworkKillResult::NotSupported,
            rules_applied: 0,
            error: Some(error),
        }
    }
}

/// One OS-level packet-blocking strategy.
///
/// Backends are idempotent: blocking an id twice leaves one logical block
/// and the second call succeeds without duplicating rules.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Short platform label used in reports (`"linux"`, `"noop"`, ...).
    fn platform(&self) -> &'static str;

    /// Blocks all traffic for the given containment id.
    async fn block_all(&self, id: &str) -> FirewallOutcome;

    /// Blocks traffic to and from one address.
    async fn block_ip(&self, ip: &str) -> FirewallOutcome;

    /// Removes every rule previously installed for the id.
    async fn restore(&self, id: &str) -> FirewallOutcome;

    /// Returns true when rules for the id are currently installed.
    async fn is_blocked(&self, id: &str) -> bool;

    /// Lists the rules this layer currently enforces.
    async fn list_rules(&self) -> Vec<String>;
}

/// Builds the backend named by `selector`, resolving `auto` from the host OS.
///
/// Unknown selectors fall back to the no-op backend with a warning so a typo
/// in configuration cannot leave the daemon unable to start.
#[must_use]
pub fn backend_for(selector: &str) -> Box<dyn FirewallBackend> {
    let name = if selector.eq_ignore_ascii_case("auto") {
        std::env::consts::OS
    } else {
        selector
    };
    match name {
        "linux" => Box::new(LinuxFirewall::new()),
        "macos" => Box::new(MacOsFirewall::new()),
        "windows" => Box::new(WindowsFirewall::new()),
        "noop" => Box::new(NoopFirewall::new()),
        other => {
            warn!(backend = other, "no firewall backend for this platform, using noop");
            Box::new(NoopFirewall::new())
        }
    }
}

// ---------------------------------------------------------------------------
// Command plumbing
// ---------------------------------------------------------------------------

struct CmdOutput {
    ok: bool,
    stdout: String,
    stderr: String,
}

enum RunError {
    Missing(String),
    TimedOut(String),
    Io(String),
}

fn render(program: &str, args: &[&str]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

async fn run_command(program: &str, args: &[&str]) -> Result<CmdOutput, RunError> {
    let mut command = Command::new(program);
    command.args(args);
    match timeout(COMMAND_TIMEOUT, command.output()).await {
        Err(_) => Err(RunError::TimedOut(render(program, args))),
        Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
            Err(RunError::Missing(program.to_owned()))
        }
        Ok(Err(err)) => Err(RunError::Io(format!("{}: {err}", render(program, args)))),
        Ok(Ok(output)) => Ok(CmdOutput {
            ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
    }
}

/// Runs a command that reads its rule set from stdin.
async fn run_with_input(program: &str, args: &[&str], input: &str) -> Result<CmdOutput, RunError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(RunError::Missing(program.to_owned()));
        }
        Err(err) => return Err(RunError::Io(format!("{}: {err}", render(program, args)))),
    };
    if let Some(mut stdin) = child.stdin.take()
        && let Err(err) = stdin.write_all(input.as_bytes()).await
    {
        child.start_kill().ok();
        return Err(RunError::Io(format!("{}: {err}", render(program, args))));
    }
    match timeout(COMMAND_TIMEOUT, child.wait_with_output()).await {
        Err(_) => Err(RunError::TimedOut(render(program, args))),
        Ok(Err(err)) => Err(RunError::Io(format!("{}: {err}", render(program, args)))),
        Ok(Ok(output)) => Ok(CmdOutput {
            ok: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
    }
}

fn permission_refused(detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    lowered.contains("permission denied") || lowered.contains("operation not permitted")
}

fn run_failure(err: &RunError) -> FirewallOutcome {
    match err {
        RunError::Missing(program) => {
            FirewallOutcome::unsupported(format!("{program}: command not found"))
        }
        RunError::TimedOut(command) => FirewallOutcome::failed(format!("{command}: timed out")),
        RunError::Io(message) => FirewallOutcome::failed(message.clone()),
    }
}

/// Maps a non-zero exit into the denied or failed outcome.
fn refusal(output: &CmdOutput) -> FirewallOutcome {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim().to_owned()
    } else {
        output.stderr.trim().to_owned()
    };
    if permission_refused(&detail) {
        FirewallOutcome::denied(detail)
    } else {
        FirewallOutcome::failed(detail)
    }
}

// ---------------------------------------------------------------------------
// Linux (iptables)
// ---------------------------------------------------------------------------

/// iptables backend using comment-tagged DROP rules in [`CHAIN`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxFirewall;

impl LinuxFirewall {
    /// Creates the iptables backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn containment_tag(id: &str) -> String {
    format!("WARDEN:{id}")
}

fn ip_tag(ip: &str) -> String {
    format!("WARDEN:IP:{ip}")
}

/// The tag as iptables renders it in listings. Matching the delimiters too
/// keeps `agent-1` from matching rules tagged for `agent-10`.
fn comment_marker(tag: &str) -> String {
    format!("/* {tag} */")
}

/// Line numbers of the rules carrying `tag`, highest first so earlier
/// deletions do not shift the numbers still to be deleted.
fn rule_numbers_for_tag(listing: &str, tag: &str) -> Vec<u32> {
    let marker = comment_marker(tag);
    let mut numbers: Vec<u32> = listing
        .lines()
        .filter(|line| line.contains(&marker))
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|first| first.parse::<u32>().ok())
        .collect();
    numbers.sort_unstable();
    numbers.reverse();
    numbers
}

/// Creates [`CHAIN`] and hooks it into OUTPUT if it does not exist yet.
async fn ensure_chain() -> Result<(), FirewallOutcome> {
    match run_command("iptables", &["-L", CHAIN, "-n"]).await {
        Ok(output) if output.ok => return Ok(()),
        Ok(_) => {}
        Err(err) => return Err(run_failure(&err)),
    }
    match run_command("iptables", &["-N", CHAIN]).await {
        Ok(output) if output.ok => {}
        Ok(output) => return Err(refusal(&output)),
        Err(err) => return Err(run_failure(&err)),
    }
    match run_command("iptables", &["-A", "OUTPUT", "-j", CHAIN]).await {
        Ok(output) if output.ok => Ok(()),
        Ok(output) => Err(refusal(&output)),
        Err(err) => Err(run_failure(&err)),
    }
}

#[async_trait]
impl FirewallBackend for LinuxFirewall {
    fn platform(&self) -> &'static str {
        "linux"
    }

    async fn block_all(&self, id: &str) -> FirewallOutcome {
        if self.is_blocked(id).await {
            debug!(id, "traffic already blocked");
            return FirewallOutcome::success(0);
        }
        if let Err(outcome) = ensure_chain().await {
            return outcome;
        }
        let tag = containment_tag(id);
        let args = ["-A", CHAIN, "-j", "DROP", "-m", "comment", "--comment", tag.as_str()];
        match run_command("iptables", &args).await {
            Ok(output) if output.ok => FirewallOutcome::success(1),
            Ok(output) => refusal(&output),
            Err(err) => run_failure(&err),
        }
    }

    async fn block_ip(&self, ip: &str) -> FirewallOutcome {
        if let Err(outcome) = ensure_chain().await {
            return outcome;
        }
        let tag = ip_tag(ip);
        let mut applied = 0_u32;
        let mut failures = Vec::new();
        for (flag, address) in [("-d", ip), ("-s", ip)] {
            let args = [
                "-A", CHAIN, flag, address, "-j", "DROP", "-m", "comment", "--comment",
                tag.as_str(),
            ];
            match run_command("iptables", &args).await {
                Ok(output) if output.ok => applied = applied.saturating_add(1),
                Ok(output) => failures.push(refusal(&output)),
                Err(err) => failures.push(run_failure(&err)),
            }
        }
        match (applied, failures.into_iter().next()) {
            (_, None) => FirewallOutcome::success(applied),
            (0, Some(first)) => first,
            (_, Some(first)) => {
                FirewallOutcome::partial(applied, first.error.unwrap_or_default())
            }
        }
    }

    async fn restore(&self, id: &str) -> FirewallOutcome {
        let listing = match run_command("iptables", &["-L", CHAIN, "-n", "--line-numbers"]).await {
            Ok(output) if output.ok => output.stdout,
            Ok(output) => return refusal(&output),
            Err(err) => return run_failure(&err),
        };
        let numbers = rule_numbers_for_tag(&listing, &containment_tag(id));
        if numbers.is_empty() {
            return FirewallOutcome::success(0);
        }
        let mut removed = 0_u32;
        let mut failures = Vec::new();
        for number in numbers {
            let line = number.to_string();
            match run_command("iptables", &["-D", CHAIN, line.as_str()]).await {
                Ok(output) if output.ok => removed = removed.saturating_add(1),
                Ok(output) => failures.push(refusal(&output)),
                Err(err) => failures.push(run_failure(&err)),
            }
        }
        match (removed, failures.into_iter().next()) {
            (_, None) => FirewallOutcome::success(removed),
            (0, Some(first)) => first,
            (_, Some(first)) => {
                FirewallOutcome::partial(removed, first.error.unwrap_or_default())
            }
        }
    }

    async fn is_blocked(&self, id: &str) -> bool {
        match run_command("iptables", &["-L", CHAIN, "-n"]).await {
            Ok(output) if output.ok => {
                output.stdout.contains(&comment_marker(&containment_tag(id)))
            }
            _ => false,
        }
    }

    async fn list_rules(&self) -> Vec<String> {
        match run_command("iptables", &["-L", CHAIN, "-n", "-v"]).await {
            Ok(output) if output.ok => output
                .stdout
                .lines()
                .filter(|line| line.contains("WARDEN:"))
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// macOS (pf)
// ---------------------------------------------------------------------------

/// pf backend loading one anchor per contained id under [`ANCHOR_ROOT`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MacOsFirewall;

impl MacOsFirewall {
    /// Creates the pf backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn anchor_for(id: &str) -> String {
    format!("{ANCHOR_ROOT}/{id}")
}

/// Enables pf. `-E` is reference counted, so a non-zero exit usually just
/// means it was already on.
async fn ensure_pf_enabled() {
    if let Ok(output) = run_command("pfctl", &["-E"]).await
        && !output.ok
    {
        debug!(stderr = %output.stderr.trim(), "pfctl -E returned non-zero");
    }
}

async fn anchor_rules(anchor: &str) -> Vec<String> {
    match run_command("pfctl", &["-a", anchor, "-sr"]).await {
        Ok(output) if output.ok => output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl FirewallBackend for MacOsFirewall {
    fn platform(&self) -> &'static str {
        "macos"
    }

    async fn block_all(&self, id: &str) -> FirewallOutcome {
        if self.is_blocked(id).await {
            debug!(id, "traffic already blocked");
            return FirewallOutcome::success(0);
        }
        ensure_pf_enabled().await;
        let anchor = anchor_for(id);
        match run_with_input("pfctl", &["-a", &anchor, "-f", "-"], "block drop all\n").await {
            Ok(output) if output.ok => FirewallOutcome::success(1),
            Ok(output) => refusal(&output),
            Err(err) => run_failure(&err),
        }
    }

    async fn block_ip(&self, ip: &str) -> FirewallOutcome {
        ensure_pf_enabled().await;
        let anchor = anchor_for(&format!("ip-{ip}"));
        let rules = format!("block drop from any to {ip}\nblock drop from {ip} to any\n");
        match run_with_input("pfctl", &["-a", &anchor, "-f", "-"], &rules).await {
            Ok(output) if output.ok => FirewallOutcome::success(2),
            Ok(output) => refusal(&output),
            Err(err) => run_failure(&err),
        }
    }

    async fn restore(&self, id: &str) -> FirewallOutcome {
        let anchor = anchor_for(id);
        let rules = anchor_rules(&anchor).await;
        if rules.is_empty() {
            return FirewallOutcome::success(0);
        }
        match run_command("pfctl", &["-a", &anchor, "-F", "rules"]).await {
            Ok(output) if output.ok => {
                FirewallOutcome::success(u32::try_from(rules.len()).unwrap_or(u32::MAX))
            }
            Ok(output) => refusal(&output),
            Err(err) => run_failure(&err),
        }
    }

    async fn is_blocked(&self, id: &str) -> bool {
        !anchor_rules(&anchor_for(id)).await.is_empty()
    }

    async fn list_rules(&self) -> Vec<String> {
        match run_command("pfctl", &["-sA"]).await {
            Ok(output) if output.ok => output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|line| line.contains(ANCHOR_ROOT))
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Windows (netsh advfirewall)
// ---------------------------------------------------------------------------

/// Windows Advanced Firewall backend using named block rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsFirewall;

impl WindowsFirewall {
    /// Creates the netsh backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn windows_rule_name(id: &str, direction: &str) -> String {
    format!("WARDEN_{id}_{direction}")
}

#[async_trait]
impl FirewallBackend for WindowsFirewall {
    fn platform(&self) -> &'static str {
        "windows"
    }

    async fn block_all(&self, id: &str) -> FirewallOutcome {
        if self.is_blocked(id).await {
            debug!(id, "traffic already blocked");
            return FirewallOutcome::success(0);
        }
        let mut applied = 0_u32;
        let mut failures = Vec::new();
        for direction in ["OUT", "IN"] {
            let name = format!("name={}", windows_rule_name(id, direction));
            let dir = format!("dir={}", direction.to_lowercase());
            let args = [
                "advfirewall", "firewall", "add", "rule", name.as_str(), dir.as_str(),
                "action=block", "enable=yes",
            ];
            match run_command("netsh", &args).await {
                Ok(output) if output.ok => applied = applied.saturating_add(1),
                Ok(output) => failures.push(refusal(&output)),
                Err(err) => failures.push(run_failure(&err)),
            }
        }
        match (applied, failures.into_iter().next()) {
            (_, None) => FirewallOutcome::success(applied),
            (0, Some(first)) => first,
            (_, Some(first)) => {
                FirewallOutcome::partial(applied, first.error.unwrap_or_default())
            }
        }
    }

    async fn block_ip(&self, ip: &str) -> FirewallOutcome {
        let name = format!("name=WARDEN_IP_{ip}");
        let remote = format!("remoteip={ip}");
        let args = [
            "advfirewall", "firewall", "add", "rule", name.as_str(), "dir=out",
            "action=block", remote.as_str(), "enable=yes",
        ];
        match run_command("netsh", &args).await {
            Ok(output) if output.ok => FirewallOutcome::success(1),
            Ok(output) => refusal(&output),
            Err(err) => run_failure(&err),
        }
    }

    async fn restore(&self, id: &str) -> FirewallOutcome {
        let mut removed = 0_u32;
        for name in [
            windows_rule_name(id, "OUT"),
            windows_rule_name(id, "IN"),
            format!("WARDEN_{id}"),
        ] {
            let name_arg = format!("name={name}");
            let args = ["advfirewall", "firewall", "delete", "rule", name_arg.as_str()];
            if let Ok(output) = run_command("netsh", &args).await
                && output.ok
            {
                removed = removed.saturating_add(1);
            }
        }
        FirewallOutcome::success(removed)
    }

    async fn is_blocked(&self, id: &str) -> bool {
        let name_arg = format!("name={}", windows_rule_name(id, "OUT"));
        let args = ["advfirewall", "firewall", "show", "rule", name_arg.as_str()];
        match run_command("netsh", &args).await {
            Ok(output) if output.ok => output.stdout.contains("Rule Name"),
            _ => false,
        }
    }

    async fn list_rules(&self) -> Vec<String> {
        let args = ["advfirewall", "firewall", "show", "rule", "name=all"];
        match run_command("netsh", &args).await {
            Ok(output) if output.ok => output
                .stdout
                .lines()
                .filter(|line| line.contains("WARDEN_"))
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Noop
// ---------------------------------------------------------------------------

/// In-memory backend that records containment intents without touching the
/// host. Used when containment is disabled and by the test suites.
#[derive(Debug, Default)]
pub struct NoopFirewall {
    blocked: Mutex<BTreeSet<String>>,
}

impl NoopFirewall {
    /// Creates an empty no-op backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, apply: impl FnOnce(&mut BTreeSet<String>) -> T) -> T {
        match self.blocked.lock() {
            Ok(mut set) => apply(&mut set),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl FirewallBackend for NoopFirewall {
    fn platform(&self) -> &'static str {
        "noop"
    }

    async fn block_all(&self, id: &str) -> FirewallOutcome {
        let newly = self.with(|set| set.insert(id.to_owned()));
        if newly {
            debug!(id, "recorded block intent");
            FirewallOutcome::success(1)
        } else {
            FirewallOutcome::success(0)
        }
    }

    async fn block_ip(&self, ip: &str) -> FirewallOutcome {
        let newly = self.with(|set| set.insert(format!("ip:{ip}")));
        if newly {
            FirewallOutcome::success(1)
        } else {
            FirewallOutcome::success(0)
        }
    }

    async fn restore(&self, id: &str) -> FirewallOutcome {
        let removed = self.with(|set| set.remove(id));
        if removed {
            FirewallOutcome::success(1)
        } else {
            FirewallOutcome::success(0)
        }
    }

    async fn is_blocked(&self, id: &str) -> bool {
        self.with(|set| set.contains(id))
    }

    async fn list_rules(&self) -> Vec<String> {
        self.with(|set| set.iter().map(|id| format!("drop {id}")).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Chain WARDEN_BLOCK (1 references)
num  target  prot opt source     destination
1    DROP    all  --  0.0.0.0/0  0.0.0.0/0  /* WARDEN:other */
2    DROP    all  --  0.0.0.0/0  0.0.0.0/0  /* WARDEN:agent-1 */
5    DROP    all  --  0.0.0.0/0  0.0.0.0/0  /* WARDEN:agent-1 */
9    DROP    all  --  0.0.0.0/0  0.0.0.0/0  /* WARDEN:agent-10 */
";

    #[test]
    fn rule_numbers_come_back_highest_first() {
        let numbers = rule_numbers_for_tag(LISTING, &containment_tag("agent-1"));
        assert_eq!(numbers, vec![5, 2]);
    }

    #[test]
    fn comment_markers_do_not_match_longer_ids() {
        let numbers = rule_numbers_for_tag(LISTING, &containment_tag("agent"));
        assert!(numbers.is_empty());
    }

    #[test]
    fn ip_tags_are_distinct_from_agent_tags() {
        assert_eq!(ip_tag("10.0.0.1"), "WARDEN:IP:10.0.0.1");
        assert_eq!(containment_tag("10.0.0.1"), "WARDEN:10.0.0.1");
    }

    #[test]
    fn unknown_selectors_fall_back_to_noop() {
        assert_eq!(backend_for("bsd").platform(), "noop");
        assert_eq!(backend_for("noop").platform(), "noop");
    }

    #[test]
    fn auto_resolves_to_the_host_platform() {
        let backend = backend_for("auto");
        assert!(!backend.platform().is_empty());
    }

    #[tokio::test]
    async fn noop_backend_tracks_blocks_in_memory() {
        let backend = NoopFirewall::new();

        let outcome = backend.block_all("agent-1").await;
        assert_eq!(outcome.result, NetworkKillResult::Success);
        assert_eq!(outcome.rules_applied, 1);
        assert!(backend.is_blocked("agent-1").await);
        assert_eq!(backend.list_rules().await, vec!["drop agent-1".to_owned()]);
    }

    #[tokio::test]
    async fn repeat_blocks_leave_one_logical_block() {
        let backend = NoopFirewall::new();

        backend.block_all("agent-1").await;
        let second = backend.block_all("agent-1").await;

        assert_eq!(second.result, NetworkKillResult::Success);
        assert_eq!(second.rules_applied, 0);
        assert_eq!(backend.list_rules().await.len(), 1);
    }

    #[tokio::test]
    async fn restore_clears_the_block_and_stays_idempotent() {
        let backend = NoopFirewall::new();
        backend.block_all("agent-1").await;

        let restored = backend.restore("agent-1").await;
        assert_eq!(restored.result, NetworkKillResult::Success);
        assert_eq!(restored.rules_applied, 1);
        assert!(!backend.is_blocked("agent-1").await);

        let again = backend.restore("agent-1").await;
        assert_eq!(again.result, NetworkKillResult::Success);
        assert_eq!(again.rules_applied, 0);
    }
}
