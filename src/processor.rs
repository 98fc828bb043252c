//! The daemon's command state machine.
//!
//! Every mutating command follows load, validate, enforce, persist. The
//! processor itself is not synchronized; the daemon holds it behind one
//! mutex so at most one command mutates state at a time.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{AuthCommand, Authorizer};
use crate::block_manager::{BlockManager, BlockOptions};
use crate::blocklist::normalize_list;
use crate::cmd_abstraction::CommandExecutor;
use crate::config::DaemonConfig;
use crate::dns::HostResolver;
use crate::enforcer::{PacketFilter, PfController};
use crate::error::{DaemonError, DaemonResult};
use crate::fs_abstraction::FileSystem;
use crate::hosts::HostFileBlockerSet;
use crate::protocol::{Caller, Reply, Request, StatusReport};
use crate::settings::{machine_serial, settings_path, BlockSettings, BlockState, Settings, SettingsStore};
use crate::unlock::{EmergencyUnlockPolicy, EmergencyUnlockRecord, EmergencyUnlockStore, UnlockLogger};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the packet filter for one command. The flag is allowlist mode.
pub type FilterFactory = Box<dyn Fn(bool) -> Box<dyn PacketFilter> + Send>;

/// What a periodic checkup found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckupOutcome {
    Idle,
    Running,
    Expired,
    Reapplied,
    CleanedOrphans,
}

pub struct CommandProcessor {
    config: DaemonConfig,
    store: SettingsStore,
    authorizer: Arc<dyn Authorizer>,
    fs: Arc<dyn FileSystem>,
    resolver: Arc<dyn HostResolver>,
    filters: FilterFactory,
    unlocks: EmergencyUnlockStore,
    unlock_log: UnlockLogger,
    policy: EmergencyUnlockPolicy,
}

impl CommandProcessor {
    pub fn new(
        config: DaemonConfig,
        authorizer: Arc<dyn Authorizer>,
        executor: Arc<dyn CommandExecutor>,
        fs: Arc<dyn FileSystem>,
        resolver: Arc<dyn HostResolver>,
    ) -> Self {
        let settings_file = match &config.paths.settings_file {
            Some(path) => path.clone(),
            None => {
                let serial = machine_serial(executor.as_ref(), fs.as_ref());
                settings_path(&config.paths.state_dir, &serial)
            }
        };
        info!("Settings file: {}", settings_file.display());

        let filters: FilterFactory = {
            let config = config.clone();
            let executor = Arc::clone(&executor);
            let fs = Arc::clone(&fs);
            Box::new(move |allowlist: bool| -> Box<dyn PacketFilter> {
                Box::new(PfController::from_config(
                    &config,
                    allowlist,
                    Arc::clone(&executor),
                    Arc::clone(&fs),
                ))
            })
        };

        Self {
            store: SettingsStore::new(settings_file, Arc::clone(&fs)),
            unlocks: EmergencyUnlockStore::new(&config.paths.unlock_history, Arc::clone(&fs)),
            unlock_log: UnlockLogger::new(&config.paths.unlock_log, Arc::clone(&fs)),
            policy: EmergencyUnlockPolicy::from(&config.policy),
            config,
            authorizer,
            fs,
            resolver,
            filters,
        }
    }

    /// Replace the packet-filter backend.
    pub fn with_filter_factory(mut self, filters: FilterFactory) -> Self {
        self.filters = filters;
        self
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    fn block_manager(&self, allowlist: bool, flags: &BlockSettings) -> BlockManager {
        let hosts = HostFileBlockerSet::detect(
            &self.config.paths.hosts_file,
            &self.config.paths.alternate_hosts,
            Arc::clone(&self.fs),
        );
        BlockManager::new(
            (self.filters)(allowlist),
            hosts,
            Arc::clone(&self.resolver),
            BlockOptions::new(allowlist, flags),
        )
    }

    fn manager_for(&self, settings: &Settings) -> BlockManager {
        self.block_manager(settings.active_block_as_allowlist, &BlockSettings::from(settings))
    }

    fn load(&self) -> DaemonResult<Settings> {
        Ok(self.store.load()?)
    }

    fn save(&self, settings: &Settings, now: DateTime<Utc>) -> DaemonResult<Settings> {
        Ok(self.store.save(settings, now)?)
    }

    /// Dispatch one request from `caller`.
    pub fn handle(&mut self, request: Request, caller: &Caller) -> Reply {
        info!("{} requested by {}", request.name(), caller);
        let now = Utc::now();

        let result = match request {
            Request::StartBlock {
                blocklist,
                is_allowlist,
                end_date,
                settings,
                token,
            } => self
                .start_block(token, &blocklist, is_allowlist, end_date, &settings, now)
                .map(|_| Reply::Ok),
            Request::UpdateBlocklist { blocklist, token } => self
                .update_blocklist(token, &blocklist, now)
                .map(|_| Reply::Ok),
            Request::UpdateBlockEndDate { end_date, token } => self
                .update_block_end_date(token, end_date, now)
                .map(|_| Reply::Ok),
            Request::ClearBlock { reason, token } => self
                .clear_block(token, reason.as_deref(), now)
                .map(|_| Reply::Ok),
            Request::GetVersion => Ok(Reply::Version(self.get_version())),
            Request::GetStatus => self.status(now).map(Reply::Status),
        };

        result.unwrap_or_else(|e| {
            error!("Command failed: {}", e);
            Reply::Error(e.to_reply())
        })
    }

    pub fn get_version(&self) -> String {
        VERSION.to_string()
    }

    pub fn status(&self, now: DateTime<Utc>) -> DaemonResult<StatusReport> {
        let settings = self.load()?;
        Ok(StatusReport {
            running: BlockState::is_running(&settings, now),
            is_allowlist: settings.active_block_as_allowlist,
            end_date: settings.block_end_date,
            blocklist: settings.active_blocklist,
            tampering_detected: settings.tampering_detected,
            version: self.get_version(),
        })
    }

    pub fn start_block(
        &mut self,
        token: Option<String>,
        blocklist: &[String],
        is_allowlist: bool,
        end_date: DateTime<Utc>,
        flags: &BlockSettings,
        now: DateTime<Utc>,
    ) -> DaemonResult<()> {
        self.authorizer.verify(token, AuthCommand::StartBlock)?;

        let mut settings = self.load()?;
        if BlockState::is_running(&settings, now) {
            return Err(DaemonError::BlockAlreadyRunning);
        }

        let entries = normalize_list(blocklist);
        if (entries.is_empty() && !is_allowlist) || BlockState::is_expired(end_date, now) {
            return Err(DaemonError::EmptyBlocklist);
        }

        if settings.block_is_running {
            info!("Previous block expired without being cleared, clearing it first");
            if !self.manager_for(&settings).clear_block() {
                warn!("Expired block was not fully removed");
            }
            settings.reset_block();
        }

        settings.apply_block_settings(flags);
        settings.active_blocklist = entries;
        settings.active_block_as_allowlist = is_allowlist;
        settings.block_end_date = end_date;
        settings.tampering_detected = false;

        let mut manager = self.block_manager(is_allowlist, flags);
        if let Err(e) = enforce_new_block(&mut manager, &settings.active_blocklist) {
            error!("Failed to start block: {:#}", e);
            if !manager.clear_block() {
                warn!("Cleanup after failed start was incomplete");
            }
            return Err(DaemonError::Enforcement(format!("{:#}", e)));
        }

        settings.block_is_running = true;
        if let Err(e) = self.save(&settings, now) {
            warn!("Block started but settings could not be saved, rolling back");
            manager.clear_block();
            return Err(e);
        }

        info!(
            "Block started: {} entries, {}, until {}",
            settings.active_blocklist.len(),
            if is_allowlist { "allowlist" } else { "blocklist" },
            end_date.to_rfc3339()
        );
        Ok(())
    }

    pub fn update_blocklist(
        &mut self,
        token: Option<String>,
        additions: &[String],
        now: DateTime<Utc>,
    ) -> DaemonResult<()> {
        self.authorizer.verify(token, AuthCommand::UpdateBlocklist)?;

        let mut settings = self.load()?;
        if !BlockState::is_running(&settings, now) {
            return Err(DaemonError::BlockNotRunning);
        }
        if settings.active_block_as_allowlist {
            return Err(DaemonError::UpdateNotAllowedForAllowlist);
        }

        let new_entries: Vec<String> = normalize_list(additions)
            .into_iter()
            .filter(|e| !settings.active_blocklist.contains(e))
            .collect();
        if new_entries.is_empty() {
            info!("Blocklist update contained no new entries");
            return Ok(());
        }

        let mut manager = self.manager_for(&settings);
        let appended = manager
            .enter_append_mode()
            .and_then(|_| manager.add_block_entries(&new_entries))
            .and_then(|_| manager.finish_appending());
        if let Err(e) = appended {
            error!("Failed to extend blocklist: {:#}", e);
            return Err(DaemonError::Enforcement(format!("{:#}", e)));
        }

        settings.active_blocklist.extend(new_entries.iter().cloned());
        self.save(&settings, now)?;
        info!("Added {} entries to the running block", new_entries.len());
        Ok(())
    }

    pub fn update_block_end_date(
        &mut self,
        token: Option<String>,
        new_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DaemonResult<()> {
        self.authorizer.verify(token, AuthCommand::UpdateBlockEndDate)?;

        let mut settings = self.load()?;
        if !BlockState::is_running(&settings, now) {
            return Err(DaemonError::BlockNotRunning);
        }
        if new_end < settings.block_end_date {
            return Err(DaemonError::EndDateEarlierThanCurrent);
        }
        let max = Duration::hours(i64::from(self.config.policy.max_extension_hours));
        if new_end - settings.block_end_date > max {
            return Err(DaemonError::EndDateTooFarInFuture);
        }

        settings.block_end_date = new_end;
        self.save(&settings, now)?;
        info!("Block end date moved to {}", new_end.to_rfc3339());
        Ok(())
    }

    pub fn clear_block(
        &mut self,
        token: Option<String>,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DaemonResult<()> {
        self.authorizer.verify(token, AuthCommand::ClearBlock)?;

        let mut settings = self.load()?;

        if !BlockState::is_running(&settings, now) {
            let mut manager = self.manager_for(&settings);
            if !settings.block_is_running && !manager.block_is_active() {
                return Err(DaemonError::BlockNotRunning);
            }
            if settings.block_is_running {
                info!("Clearing expired block");
            } else {
                warn!("Found orphaned block enforcement, cleaning up");
            }
            let clean = manager.clear_block();
            settings.reset_block();
            self.save(&settings, now)?;
            return verified(clean);
        }

        let history = self.unlocks.load();
        if !self.policy.can_unlock_local(&history, now) {
            warn!("Emergency unlock rejected by rate limit");
            if let Err(e) = self.unlock_log.log(reason, false, now) {
                warn!("Failed to write unlock log: {:#}", e);
            }
            return Err(DaemonError::UnlockRateLimited);
        }

        let clean = self.manager_for(&settings).clear_block();
        settings.reset_block();
        self.save(&settings, now)?;

        self.unlocks
            .append(EmergencyUnlockRecord {
                date: now,
                reason: reason.map(str::to_string),
            })
            .context("Failed to record emergency unlock")?;
        if let Err(e) = self.unlock_log.log(reason, true, now) {
            warn!("Failed to write unlock log: {:#}", e);
        }

        info!("Block cleared by emergency unlock");
        verified(clean)
    }

    /// Periodic reconciliation between the stored state and what is
    /// actually enforced.
    pub fn checkup(&mut self, now: DateTime<Utc>) -> DaemonResult<CheckupOutcome> {
        let mut settings = self.load()?;
        let mut manager = self.manager_for(&settings);

        if !settings.block_is_running {
            if manager.block_is_active() {
                warn!("Block enforcement present while idle, cleaning up");
                let clean = manager.clear_block();
                settings.reset_block();
                self.save(&settings, now)?;
                verified(clean)?;
                return Ok(CheckupOutcome::CleanedOrphans);
            }
            return Ok(CheckupOutcome::Idle);
        }

        if BlockState::is_expired(settings.block_end_date, now) {
            info!("Block expired at {}", settings.block_end_date.to_rfc3339());
            let clean = manager.clear_block();
            settings.reset_block();
            self.save(&settings, now)?;
            verified(clean)?;
            return Ok(CheckupOutcome::Expired);
        }

        if manager.block_is_active() {
            return Ok(CheckupOutcome::Running);
        }

        warn!("Block enforcement missing while block is running, re-applying");
        settings.tampering_detected = true;
        if let Err(e) = enforce_new_block(&mut manager, &settings.active_blocklist) {
            error!("Failed to re-apply block: {:#}", e);
            self.save(&settings, now)?;
            return Err(DaemonError::Enforcement(format!("{:#}", e)));
        }
        self.save(&settings, now)?;
        Ok(CheckupOutcome::Reapplied)
    }
}

fn enforce_new_block(manager: &mut BlockManager, entries: &[String]) -> anyhow::Result<()> {
    manager.prepare()?;
    manager.add_block_entries(entries)?;
    manager.finalize()
}

fn verified(clean: bool) -> DaemonResult<()> {
    if clean {
        Ok(())
    } else {
        Err(DaemonError::Enforcement(
            "Block was cleared but enforcement could not be verified as removed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MockAuthorizer;
    use crate::cmd_abstraction::MockCommandExecutor;
    use crate::dns::MockHostResolver;
    use crate::enforcer::mock::MockPacketFilter;
    use crate::fs_abstraction::RealFileSystem;
    use crate::hosts::BLOCK_HEADER;
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        config: DaemonConfig,
        pf: MockPacketFilter,
        processor: CommandProcessor,
    }

    fn allow_all() -> MockAuthorizer {
        let mut auth = MockAuthorizer::new();
        auth.expect_verify().returning(|_, _| Ok(()));
        auth
    }

    fn harness_with(auth: MockAuthorizer) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = DaemonConfig::rooted_at(dir.path());
        config.paths.settings_file = Some(dir.path().join("state/settings.json"));
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(&config.paths.hosts_file, "127.0.0.1\tlocalhost\n").unwrap();

        let mut resolver = MockHostResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| vec!["192.0.2.10".to_string()]);

        let pf = MockPacketFilter::new();
        let shared = pf.clone();
        let processor = CommandProcessor::new(
            config.clone(),
            Arc::new(auth),
            Arc::new(MockCommandExecutor::new()),
            Arc::new(RealFileSystem),
            Arc::new(resolver),
        )
        .with_filter_factory(Box::new(move |_: bool| -> Box<dyn PacketFilter> {
            Box::new(shared.clone())
        }));

        Harness {
            _dir: dir,
            config,
            pf,
            processor,
        }
    }

    fn harness() -> Harness {
        harness_with(allow_all())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn start(h: &mut Harness, items: &[&str]) -> DaemonResult<()> {
        h.processor.start_block(
            Some("t".into()),
            &list(items),
            false,
            now() + Duration::hours(1),
            &BlockSettings {
                evaluate_common_subdomains: false,
                ..BlockSettings::default()
            },
            now(),
        )
    }

    #[test]
    fn test_start_then_second_start_rejected() {
        let mut h = harness();
        start(&mut h, &["Example.com", "https://news.site/path"]).unwrap();

        let settings = h.processor.store().load().unwrap();
        assert!(settings.block_is_running);
        assert_eq!(settings.active_blocklist, list(&["example.com", "news.site"]));
        assert_eq!(settings.settings_version_number, 1);
        assert_eq!(h.pf.state.lock().unwrap().starts, 1);

        let hosts = std::fs::read_to_string(&h.config.paths.hosts_file).unwrap();
        assert!(hosts.contains(BLOCK_HEADER));

        assert!(matches!(start(&mut h, &["other.com"]), Err(DaemonError::BlockAlreadyRunning)));
    }

    #[test]
    fn test_start_rejects_empty_list_and_past_end() {
        let mut h = harness();
        assert!(matches!(start(&mut h, &[]), Err(DaemonError::EmptyBlocklist)));
        assert!(matches!(start(&mut h, &["!!!"]), Err(DaemonError::EmptyBlocklist)));

        let past = h.processor.start_block(
            None,
            &list(&["a.com"]),
            false,
            now() - Duration::minutes(1),
            &BlockSettings::default(),
            now(),
        );
        assert!(matches!(past, Err(DaemonError::EmptyBlocklist)));
        assert_eq!(h.pf.state.lock().unwrap().starts, 0);
    }

    #[test]
    fn test_empty_allowlist_is_accepted() {
        let mut h = harness();
        h.processor
            .start_block(
                None,
                &[],
                true,
                now() + Duration::hours(1),
                &BlockSettings::default(),
                now(),
            )
            .unwrap();
        let status = h.processor.status(now()).unwrap();
        assert!(status.running);
        assert!(status.is_allowlist);
    }

    #[test]
    fn test_authorization_checked_before_state() {
        let mut auth = MockAuthorizer::new();
        auth.expect_verify()
            .returning(|_, _| Err(DaemonError::AuthorizationFailed { status: -60002 }));
        let mut h = harness_with(auth);

        let err = start(&mut h, &["a.com"]).unwrap_err();
        assert_eq!(err.code(), 401);
        assert!(!h.processor.store().path().exists());
    }

    #[test]
    fn test_authorization_uses_command_right() {
        let mut auth = MockAuthorizer::new();
        auth.expect_verify()
            .withf(|_, cmd| *cmd == AuthCommand::UpdateBlockEndDate)
            .times(1)
            .returning(|_, _| Ok(()));
        let mut h = harness_with(auth);
        let result = h
            .processor
            .update_block_end_date(None, now(), now());
        assert!(matches!(result, Err(DaemonError::BlockNotRunning)));
    }

    #[test]
    fn test_failed_start_leaves_idle() {
        let mut h = harness();
        h.pf.state.lock().unwrap().start_exit = 1;

        let err = start(&mut h, &["a.com"]).unwrap_err();
        assert!(matches!(err, DaemonError::Enforcement(_)));

        let settings = h.processor.store().load().unwrap();
        assert!(!settings.block_is_running);
        let hosts = std::fs::read_to_string(&h.config.paths.hosts_file).unwrap();
        assert!(!hosts.contains(BLOCK_HEADER));
    }

    #[test]
    fn test_update_blocklist_is_additive() {
        let mut h = harness();
        start(&mut h, &["a.com"]).unwrap();

        h.processor
            .update_blocklist(None, &list(&["a.com", "b.com"]), now())
            .unwrap();

        let settings = h.processor.store().load().unwrap();
        assert_eq!(settings.active_blocklist, list(&["a.com", "b.com"]));
        let state = h.pf.state.lock().unwrap();
        assert_eq!(state.appended.len(), 1);
        assert_eq!(state.refreshes, 1);
        drop(state);

        let hosts = std::fs::read_to_string(&h.config.paths.hosts_file).unwrap();
        assert!(hosts.contains("0.0.0.0\tb.com\n"));
    }

    #[test]
    fn test_update_blocklist_rules() {
        let mut h = harness();
        assert!(matches!(
            h.processor.update_blocklist(None, &list(&["b.com"]), now()),
            Err(DaemonError::BlockNotRunning)
        ));

        h.processor
            .start_block(
                None,
                &list(&["a.com"]),
                true,
                now() + Duration::hours(1),
                &BlockSettings::default(),
                now(),
            )
            .unwrap();
        assert!(matches!(
            h.processor.update_blocklist(None, &list(&["b.com"]), now()),
            Err(DaemonError::UpdateNotAllowedForAllowlist)
        ));
    }

    #[test]
    fn test_end_date_rules() {
        let mut h = harness();
        start(&mut h, &["a.com"]).unwrap();
        let end = now() + Duration::hours(1);

        assert!(matches!(
            h.processor.update_block_end_date(None, end - Duration::minutes(1), now()),
            Err(DaemonError::EndDateEarlierThanCurrent)
        ));
        assert!(matches!(
            h.processor
                .update_block_end_date(None, end + Duration::hours(24) + Duration::seconds(1), now()),
            Err(DaemonError::EndDateTooFarInFuture)
        ));

        h.processor.update_block_end_date(None, end, now()).unwrap();
        let ten_more = end + Duration::minutes(10);
        h.processor.update_block_end_date(None, ten_more, now()).unwrap();
        assert_eq!(h.processor.store().load().unwrap().block_end_date, ten_more);

        h.processor
            .update_block_end_date(None, ten_more + Duration::hours(24), now())
            .unwrap();
    }

    #[test]
    fn test_clear_and_rate_limit() {
        let mut h = harness();
        start(&mut h, &["a.com"]).unwrap();
        h.processor.clear_block(None, Some("done"), now()).unwrap();

        let settings = h.processor.store().load().unwrap();
        assert!(!settings.block_is_running);
        assert!(settings.active_blocklist.is_empty());
        assert_eq!(settings.block_end_date, crate::settings::far_past());

        assert!(matches!(
            h.processor.update_blocklist(None, &list(&["b.com"]), now()),
            Err(DaemonError::BlockNotRunning)
        ));

        let later = now() + Duration::minutes(5);
        h.processor
            .start_block(
                None,
                &list(&["a.com"]),
                false,
                later + Duration::hours(1),
                &BlockSettings::default(),
                later,
            )
            .unwrap();
        assert!(matches!(
            h.processor.clear_block(None, None, later),
            Err(DaemonError::UnlockRateLimited)
        ));
        assert!(h.processor.status(later).unwrap().running);

        let history: Vec<EmergencyUnlockRecord> = serde_json::from_str(
            &std::fs::read_to_string(&h.config.paths.unlock_history).unwrap(),
        )
        .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason.as_deref(), Some("done"));

        let log = std::fs::read_to_string(&h.config.paths.unlock_log).unwrap();
        assert!(log.lines().next().unwrap().ends_with("| cleared | done"));
        assert!(log.lines().nth(1).unwrap().contains("| attempted |"));
    }

    #[test]
    fn test_clear_when_idle() {
        let mut h = harness();
        assert!(matches!(
            h.processor.clear_block(None, None, now()),
            Err(DaemonError::BlockNotRunning)
        ));

        h.pf.state.lock().unwrap().active = true;
        h.processor.clear_block(None, None, now()).unwrap();
        assert_eq!(h.pf.state.lock().unwrap().stops, 1);
        // Orphan cleanup is not an emergency unlock
        assert!(!h.config.paths.unlock_history.exists());
    }

    #[test]
    fn test_checkup_outcomes() {
        let mut h = harness();
        assert_eq!(h.processor.checkup(now()).unwrap(), CheckupOutcome::Idle);

        start(&mut h, &["a.com"]).unwrap();
        assert_eq!(h.processor.checkup(now()).unwrap(), CheckupOutcome::Running);

        // Someone disabled pf and scrubbed the hosts file
        h.pf.state.lock().unwrap().active = false;
        std::fs::write(&h.config.paths.hosts_file, "127.0.0.1\tlocalhost\n").unwrap();
        assert_eq!(h.processor.checkup(now()).unwrap(), CheckupOutcome::Reapplied);
        let settings = h.processor.store().load().unwrap();
        assert!(settings.tampering_detected);
        assert!(settings.block_is_running);
        assert_eq!(h.pf.state.lock().unwrap().starts, 2);

        let after = now() + Duration::hours(2);
        assert_eq!(h.processor.checkup(after).unwrap(), CheckupOutcome::Expired);
        assert!(!h.processor.status(after).unwrap().running);

        h.pf.state.lock().unwrap().active = true;
        assert_eq!(h.processor.checkup(after).unwrap(), CheckupOutcome::CleanedOrphans);
    }

    #[test]
    fn test_handle_maps_errors_to_replies() {
        let mut h = harness();
        let caller = Caller {
            uid: 501,
            gid: 20,
            pid: Some(42),
        };
        match h.processor.handle(Request::GetVersion, &caller) {
            Reply::Version(v) => assert_eq!(v, VERSION),
            other => panic!("unexpected {:?}", other),
        }
        match h.processor.handle(
            Request::UpdateBlocklist {
                blocklist: list(&["a.com"]),
                token: None,
            },
            &caller,
        ) {
            Reply::Error(e) => assert_eq!(e.code, 304),
            other => panic!("unexpected {:?}", other),
        }
    }
}
