//! End-to-end block lifecycle against a scratch directory.
//!
//! Drives the public `CommandProcessor` with the real pf controller, hosts
//! enforcer and token authority. Only `pfctl` and DNS are scripted.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use skycontrol::auth::{status, AuthCommand, TokenAuthority};
use skycontrol::cmd_abstraction::{CommandExecutor, CommandOutput};
use skycontrol::dns::HostResolver;
use skycontrol::fs_abstraction::{FileSystem, RealFileSystem};
use skycontrol::settings::BlockSettings;
use skycontrol::{CheckupOutcome, CommandProcessor, DaemonConfig, DaemonError};

const HOSTS: &str = "127.0.0.1\tlocalhost\n::1\tlocalhost\n";
const PF_CONF: &str = "scrub-anchor \"com.apple/*\"\nanchor \"com.apple/*\"\n";

/// Records pfctl invocations; `-E` answers with an enable token.
#[derive(Default)]
struct ScriptedPfctl {
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedPfctl {
    fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandExecutor for ScriptedPfctl {
    fn execute(&self, _cmd: &str, args: &[String]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        let stderr = if args.first().map(String::as_str) == Some("-E") {
            "No ALTQ support in kernel\npf enabled\nToken : 17293822569102704640\n"
        } else {
            ""
        };
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: true,
            code: Some(0),
        })
    }
}

struct FixedResolver;

impl HostResolver for FixedResolver {
    fn resolve(&self, _host: &str) -> Vec<String> {
        vec!["198.51.100.7".to_string()]
    }
}

struct Setup {
    _root: TempDir,
    config: DaemonConfig,
    pfctl: Arc<ScriptedPfctl>,
    authority: Arc<TokenAuthority>,
    processor: CommandProcessor,
}

impl Setup {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let mut config = DaemonConfig::rooted_at(root.path());
        config.paths.settings_file = Some(root.path().join("state/settings.json"));
        std::fs::create_dir_all(root.path().join("etc")).unwrap();
        std::fs::write(&config.paths.hosts_file, HOSTS).unwrap();
        std::fs::write(&config.paths.pf_conf, PF_CONF).unwrap();

        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let authority = Arc::new(TokenAuthority::from_config(&config, Arc::clone(&fs)));
        authority.ensure_key().unwrap();

        let pfctl = Arc::new(ScriptedPfctl::default());
        let processor = CommandProcessor::new(
            config.clone(),
            authority.clone(),
            pfctl.clone(),
            fs,
            Arc::new(FixedResolver),
        );

        Self {
            _root: root,
            config,
            pfctl,
            authority,
            processor,
        }
    }

    fn token(&self, command: AuthCommand) -> Option<String> {
        Some(self.authority.issue(command, Utc::now()).unwrap())
    }

    fn read(&self, path: &Path) -> String {
        std::fs::read_to_string(path).unwrap_or_default()
    }

    fn anchor(&self) -> String {
        self.read(&self.config.paths.anchor_dir.join(&self.config.firewall.anchor_name))
    }

    fn start(&mut self, entries: &[&str]) -> Result<(), DaemonError> {
        let now = Utc::now();
        let token = self.token(AuthCommand::StartBlock);
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        self.processor.start_block(
            token,
            &entries,
            false,
            now + Duration::hours(1),
            &BlockSettings {
                evaluate_common_subdomains: false,
                ..BlockSettings::default()
            },
            now,
        )
    }
}

fn auth_status(result: Result<(), DaemonError>) -> i32 {
    match result {
        Err(DaemonError::AuthorizationFailed { status }) => status,
        other => panic!("expected authorization failure, got {:?}", other),
    }
}

#[test]
fn test_full_block_lifecycle() {
    let mut s = Setup::new();

    s.start(&["Example.com", "10.1.0.0/16", "mail.example.com:587"])
        .unwrap();

    let hosts = s.read(&s.config.paths.hosts_file);
    assert!(hosts.starts_with(HOSTS));
    assert!(hosts.contains("0.0.0.0\texample.com\n::\texample.com\n"));
    assert!(!hosts.contains("mail.example.com"));

    let pf_conf = s.read(&s.config.paths.pf_conf);
    assert!(pf_conf.contains("anchor \"com.skynet\"\n"));
    assert!(pf_conf.contains("load anchor \"com.skynet\" from"));

    let anchor = s.anchor();
    assert!(anchor.contains("block return out proto tcp from any to 10.1.0.0/16\n"));
    assert!(anchor.contains("block return out proto udp from any to 198.51.100.7\n"));
    assert!(anchor.contains("block return out proto tcp from any to 198.51.100.7 port 587\n"));
    assert_eq!(s.read(&s.config.paths.pf_token), "17293822569102704640");

    let report = s.processor.status(Utc::now()).unwrap();
    assert!(report.running);
    assert_eq!(
        report.blocklist,
        vec!["example.com", "10.1.0.0/16", "mail.example.com:587"]
    );

    // A second start while running is refused
    assert!(matches!(s.start(&["other.org"]), Err(DaemonError::BlockAlreadyRunning)));

    // Grow the list
    let token = s.token(AuthCommand::UpdateBlocklist);
    s.processor
        .update_blocklist(token, &["other.org".to_string()], Utc::now())
        .unwrap();
    assert!(s.read(&s.config.paths.hosts_file).contains("0.0.0.0\tother.org\n"));
    assert!(s
        .pfctl
        .calls()
        .iter()
        .any(|c| c.first().map(String::as_str) == Some("-f") && c.contains(&"states".to_string())));

    // Extend by ten minutes
    let end = s.processor.status(Utc::now()).unwrap().end_date;
    let token = s.token(AuthCommand::UpdateBlockEndDate);
    s.processor
        .update_block_end_date(token, end + Duration::minutes(10), Utc::now())
        .unwrap();
    assert_eq!(
        s.processor.status(Utc::now()).unwrap().end_date,
        end + Duration::minutes(10)
    );

    // A token for one right does not grant another
    let wrong = s.token(AuthCommand::StartBlock);
    assert_eq!(
        auth_status(s.processor.clear_block(wrong, None, Utc::now())),
        status::WRONG_RIGHT
    );

    // Emergency unlock
    let token = s.token(AuthCommand::ClearBlock);
    s.processor
        .clear_block(token, Some("integration test"), Utc::now())
        .unwrap();

    assert_eq!(s.read(&s.config.paths.hosts_file), HOSTS);
    assert_eq!(s.read(&s.config.paths.pf_conf), PF_CONF);
    assert_eq!(s.anchor(), "");
    let last = s.pfctl.calls().last().cloned().unwrap();
    assert_eq!(last[0], "-X");
    assert_eq!(last[1], "17293822569102704640");

    assert!(!s.processor.status(Utc::now()).unwrap().running);
    let log = s.read(&s.config.paths.unlock_log);
    assert!(log.contains("| cleared | integration test"));

    let token = s.token(AuthCommand::UpdateBlocklist);
    assert!(matches!(
        s.processor
            .update_blocklist(token, &["x.org".to_string()], Utc::now()),
        Err(DaemonError::BlockNotRunning)
    ));
}

#[test]
fn test_checkup_reapplies_then_expires() {
    let mut s = Setup::new();
    s.start(&["example.com"]).unwrap();

    let now = Utc::now();
    assert_eq!(s.processor.checkup(now).unwrap(), CheckupOutcome::Running);

    // Tamper with both mechanisms
    std::fs::write(&s.config.paths.hosts_file, HOSTS).unwrap();
    std::fs::write(&s.config.paths.pf_conf, PF_CONF).unwrap();

    assert_eq!(s.processor.checkup(now).unwrap(), CheckupOutcome::Reapplied);
    let report = s.processor.status(now).unwrap();
    assert!(report.tampering_detected);
    assert!(s.read(&s.config.paths.hosts_file).contains("0.0.0.0\texample.com\n"));
    assert!(s.read(&s.config.paths.pf_conf).contains("com.skynet"));

    let later = now + Duration::hours(2);
    assert_eq!(s.processor.checkup(later).unwrap(), CheckupOutcome::Expired);
    assert_eq!(s.read(&s.config.paths.hosts_file), HOSTS);
    assert_eq!(s.read(&s.config.paths.pf_conf), PF_CONF);
    assert_eq!(s.processor.checkup(later).unwrap(), CheckupOutcome::Idle);

    // Expiry is not an emergency unlock
    assert!(!s.config.paths.unlock_history.exists());
}

#[test]
fn test_requests_without_token_are_refused() {
    let mut s = Setup::new();
    let now = Utc::now();
    let result = s.processor.start_block(
        None,
        &["example.com".to_string()],
        false,
        now + Duration::hours(1),
        &BlockSettings::default(),
        now,
    );
    assert_eq!(auth_status(result), status::MISSING);
    assert!(s.pfctl.calls().is_empty());
    assert_eq!(s.read(&s.config.paths.hosts_file), HOSTS);
}

#[test]
fn test_orphaned_anchor_cleaned_by_clear() {
    let mut s = Setup::new();
    std::fs::write(
        &s.config.paths.pf_conf,
        format!("{}anchor \"com.skynet\"\n", PF_CONF),
    )
    .unwrap();

    let token = s.token(AuthCommand::ClearBlock);
    s.processor.clear_block(token, None, Utc::now()).unwrap();
    assert_eq!(s.read(&s.config.paths.pf_conf), PF_CONF);
    assert!(!s.config.paths.unlock_history.exists());
}
