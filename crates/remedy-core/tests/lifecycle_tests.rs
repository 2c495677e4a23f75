//! Rule lifecycle against a sandboxed host: report, fix, undo

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use remedy_core::rules::{
    Compliance, Finding, FixContext, KeyValueRule, ReportContext, Rule, RuleHandle, RuleInfo,
    RuleState,
};
use remedy_core::{ChangeLog, ConfigurationItem, Error, EventKind, ItemValue, StaticEnvironment};
use remedy_host::exec::argv;
use remedy_host::{CommandRunner, FileMeta, io};
use remedy_kv::{Dialect, EditorSpec, KeyValueEditor, KvData, Separator};
use remedy_test_utils::{FakeDefaults, FaultyRunner, ScriptedRunner, TestHost};

fn linux() -> StaticEnvironment {
    StaticEnvironment::new("linux", "Ubuntu", "22.04")
}

fn mode_of(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

/// Hardens sshd in four independent steps so undo order is observable.
struct SshHardening {
    info: RuleInfo,
    items: Vec<ConfigurationItem>,
    config: PathBuf,
    banner: PathBuf,
}

impl SshHardening {
    fn new(host: &TestHost) -> Self {
        let info = RuleInfo::new(12, "SshHardening");
        let items = vec![ConfigurationItem::new(info.enable_key(), ItemValue::Bool(true), "")];
        Self {
            info,
            items,
            config: host.etc("sshd_config"),
            banner: host.etc("issue.net"),
        }
    }

    fn editor(&self, runner: Arc<dyn CommandRunner>) -> KeyValueEditor {
        let spec = EditorSpec::new(
            Dialect::Conf,
            &self.config,
            KvData::flat([("PermitRootLogin", "no"), ("Banner", "/etc/issue.net")]),
        )
        .with_separator(Separator::Space);
        KeyValueEditor::new(spec, runner).unwrap()
    }
}

impl Rule for SshHardening {
    fn info(&self) -> &RuleInfo {
        &self.info
    }

    fn items(&self) -> &[ConfigurationItem] {
        &self.items
    }

    fn items_mut(&mut self) -> &mut [ConfigurationItem] {
        &mut self.items
    }

    fn report(&mut self, ctx: &ReportContext<'_>) -> remedy_core::Result<Finding> {
        let validation = self.editor(Arc::clone(&ctx.runner)).validate()?;
        let compliance = Compliance::from(validation);
        if compliance != Compliance::Compliant {
            return Ok(Finding {
                compliance,
                detail: vec!["sshd_config is not hardened".into()],
            });
        }
        if !self.banner.exists() {
            return Ok(Finding::non_compliant("no login banner"));
        }
        if mode_of(&self.config) != 0o600 {
            return Ok(Finding::non_compliant("sshd_config is world readable"));
        }
        Ok(Finding::compliant())
    }

    fn fix(&mut self, ctx: &mut FixContext<'_>) -> remedy_core::Result<bool> {
        let mut ok = ctx.create_file(&self.banner, "Authorized use only\n")?;

        let meta = FileMeta::read(&self.config)?.with_mode(0o600);
        ok &= ctx.set_permissions(&self.config, meta)?;

        let mut editor = self.editor(Arc::clone(&ctx.runner));
        editor.validate()?;
        ok &= editor.update()?;
        ok &= ctx.commit_editor(&mut editor)?;

        let reload = argv(&["systemctl", "reload", "sshd"]);
        ok &= ctx.run_command(reload.clone(), Some(reload))?;
        Ok(ok)
    }
}

struct Sandbox {
    host: TestHost,
    runner: Arc<ScriptedRunner>,
    changelog: ChangeLog,
}

impl Sandbox {
    fn new() -> Self {
        let host = TestHost::new();
        let changelog = ChangeLog::open(&host.changelog_path(), &host.backup_dir()).unwrap();
        Self {
            runner: Arc::new(ScriptedRunner::new().ok(&["systemctl"], "")),
            host,
            changelog,
        }
    }

    fn runner(&self) -> Arc<dyn CommandRunner> {
        self.runner.clone()
    }
}

const SSHD: &str = "# sshd\nPort 22\nPermitRootLogin yes\n";

#[test]
fn fix_then_undo_restores_bytes_and_permissions() {
    let mut sb = Sandbox::new();
    let config = sb.host.write_etc("sshd_config", SSHD);
    std::fs::set_permissions(&config, std::fs::Permissions::from_mode(0o644)).unwrap();

    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));
    let env = linux();

    assert_eq!(
        handle.report(&env, sb.runner()).unwrap(),
        &Compliance::NonCompliant
    );
    assert!(handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap());
    assert_eq!(handle.state(), RuleState::Fixed);

    assert_eq!(
        sb.host.read(&config),
        "# sshd\nPort 22\nPermitRootLogin no\nBanner /etc/issue.net\n"
    );
    assert_eq!(mode_of(&config), 0o600);
    assert_eq!(handle.report(&env, sb.runner()).unwrap(), &Compliance::Compliant);

    let kinds: Vec<&str> = sb
        .changelog
        .find_events_for_rule(12)
        .iter()
        .map(|e| e.kind.name())
        .collect();
    assert_eq!(kinds, ["creation", "permission", "conf", "command"]);

    assert!(handle.undo(sb.runner(), &mut sb.changelog).unwrap());
    assert_eq!(handle.state(), RuleState::Undone);
    assert_eq!(sb.host.read(&config), SSHD);
    assert_eq!(mode_of(&config), 0o644);
    assert!(!sb.host.etc("issue.net").exists());
    assert!(sb.changelog.find_events_for_rule(12).is_empty());

    let reloads = sb
        .runner
        .calls()
        .iter()
        .filter(|c| c.first().map(String::as_str) == Some("systemctl"))
        .count();
    assert_eq!(reloads, 2);
}

#[test]
fn change_log_survives_reopen_and_drives_undo() {
    let mut sb = Sandbox::new();
    let config = sb.host.write_etc("sshd_config", SSHD);
    let env = linux();

    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));
    handle.report(&env, sb.runner()).unwrap();
    handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap();

    // A later invocation only has the persisted log to go on
    let mut reopened = ChangeLog::open(&sb.host.changelog_path(), &sb.host.backup_dir()).unwrap();
    assert_eq!(reopened.find_events_for_rule(12).len(), 4);

    let mut fresh = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));
    assert!(fresh.undo(sb.runner(), &mut reopened).unwrap());
    assert_eq!(sb.host.read(&config), SSHD);
}

#[test]
fn second_fix_discards_stale_events() {
    let mut sb = Sandbox::new();
    sb.host.write_etc("sshd_config", SSHD);
    let env = linux();
    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));

    handle.report(&env, sb.runner()).unwrap();
    handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap();
    let first: Vec<_> = sb.changelog.find_events_for_rule(12).iter().map(|e| e.id).collect();

    // Drift back, then fix again
    let config = sb.host.write_etc("sshd_config", SSHD);
    std::fs::set_permissions(&config, std::fs::Permissions::from_mode(0o644)).unwrap();
    std::fs::remove_file(sb.host.etc("issue.net")).unwrap();
    handle.report(&env, sb.runner()).unwrap();
    handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap();

    // The old cycle is gone and the new one numbers from zero again
    let second: Vec<_> = sb.changelog.find_events_for_rule(12).iter().map(|e| e.id).collect();
    assert_eq!(second, first);
    assert_eq!(sb.changelog.events().len(), 4);

    assert!(handle.undo(sb.runner(), &mut sb.changelog).unwrap());
    assert_eq!(sb.host.read(&config), SSHD);
}

#[test]
fn fix_requires_a_non_compliant_report() {
    let mut sb = Sandbox::new();
    sb.host.write_etc("sshd_config", SSHD);
    let env = linux();
    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));

    let err = handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap_err();
    assert!(matches!(err, Error::Lifecycle { action: "fix", .. }));
    assert!(sb.changelog.events().is_empty());
}

#[test]
fn fix_requires_the_enabling_item() {
    let mut sb = Sandbox::new();
    let config = sb.host.write_etc("sshd_config", SSHD);
    let env = linux();
    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));
    handle.items_mut()[0].set_value(ItemValue::Bool(false)).unwrap();

    handle.report(&env, sb.runner()).unwrap();
    assert!(!handle.is_enabled());
    assert!(matches!(
        handle.fix(&env, sb.runner(), &mut sb.changelog),
        Err(Error::Lifecycle { .. })
    ));
    assert_eq!(sb.host.read(&config), SSHD);
}

#[test]
fn undone_rule_accepts_no_further_report_or_fix() {
    let mut sb = Sandbox::new();
    sb.host.write_etc("sshd_config", SSHD);
    let env = linux();
    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));

    handle.report(&env, sb.runner()).unwrap();
    assert_eq!(handle.state(), RuleState::Reported);
    handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap();
    // Confirming a fix keeps the rule fixed
    handle.report(&env, sb.runner()).unwrap();
    assert_eq!(handle.state(), RuleState::Fixed);

    assert!(handle.undo(sb.runner(), &mut sb.changelog).unwrap());
    assert!(matches!(
        handle.report(&env, sb.runner()),
        Err(Error::Lifecycle { action: "report", .. })
    ));
    assert!(matches!(
        handle.fix(&env, sb.runner(), &mut sb.changelog),
        Err(Error::Lifecycle { action: "fix", .. })
    ));
    assert!(sb.changelog.events().is_empty());
    assert_eq!(handle.state(), RuleState::Undone);
}

fn screensaver_rule() -> KeyValueRule {
    let mut info = RuleInfo::new(21, "ScreenSaverLock");
    info.mandatory = true;
    let data = KvData::flat([("a", "1"), ("b", "2"), ("c", "3")]);
    KeyValueRule::new(info, EditorSpec::new(Dialect::Defaults, "dom", data))
}

#[test]
fn interrupted_defaults_fix_logs_what_already_ran() {
    let mut sb = Sandbox::new();
    let fake = Arc::new(FakeDefaults::new());
    let faulty: Arc<dyn CommandRunner> = Arc::new(
        FaultyRunner::new(fake.clone()).interrupt_on(&["defaults", "write", "dom", "b"]),
    );
    let env = linux();
    let mut handle = RuleHandle::new(Box::new(screensaver_rule()));

    handle.report(&env, faulty.clone()).unwrap();
    let err = handle.fix(&env, faulty, &mut sb.changelog).unwrap_err();
    assert!(err.is_interrupt());
    assert_eq!(fake.get("dom", "a").as_deref(), Some("1"));

    let events = sb.changelog.find_events_for_rule(21);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0].kind,
        EventKind::Command { run, undo } if run.len() == 1 && undo == &vec![argv(&["defaults", "delete", "dom", "a"])]
    ));

    // The next invocation can still reverse the key that was written
    let mut fresh = RuleHandle::new(Box::new(screensaver_rule()));
    assert!(fresh.undo(fake.clone(), &mut sb.changelog).unwrap());
    assert_eq!(fake.get("dom", "a"), None);
}

#[test]
fn defaults_timeout_fails_the_fix_but_logs_every_change() {
    let mut sb = Sandbox::new();
    let fake = Arc::new(FakeDefaults::new());
    let faulty: Arc<dyn CommandRunner> = Arc::new(
        FaultyRunner::new(fake.clone()).timeout_on(&["defaults", "write", "dom", "b"]),
    );
    let env = linux();
    let mut handle = RuleHandle::new(Box::new(screensaver_rule()));

    handle.report(&env, faulty.clone()).unwrap();
    assert!(!handle.fix(&env, faulty, &mut sb.changelog).unwrap());
    assert_eq!(fake.get("dom", "c").as_deref(), Some("3"));

    let events = sb.changelog.find_events_for_rule(21);
    assert_eq!(events.len(), 1);
    let EventKind::Command { run, undo } = &events[0].kind else {
        panic!("expected a command event, got {:?}", events[0].kind);
    };
    assert_eq!(run.len(), 2);
    assert_eq!(undo.len(), 2);
}

#[test]
fn unchanged_commit_leaves_no_gap_in_ids() {
    let mut sb = Sandbox::new();
    let path = sb.host.write_etc("sysctl.conf", "kernel.randomize_va_space = 2\n");
    let spec = EditorSpec::new(
        Dialect::Conf,
        &path,
        KvData::flat([("kernel.randomize_va_space", "2")]),
    )
    .with_separator(Separator::OpenEquals);
    let mut editor = KeyValueEditor::new(spec, sb.runner()).unwrap();
    editor.validate().unwrap();
    editor.update().unwrap();

    let env = linux();
    let issue = sb.host.etc("issue.net");
    let mut ctx = FixContext::new(6, &env, sb.runner(), &mut sb.changelog);
    assert!(ctx.commit_editor(&mut editor).unwrap());
    ctx.record(EventKind::Creation { path: issue }).unwrap();

    let ids: Vec<String> = sb
        .changelog
        .find_events_for_rule(6)
        .iter()
        .map(|e| e.id.to_string())
        .collect();
    assert_eq!(ids, ["0006-0000"]);
}

#[test]
fn undo_without_events_is_a_no_op() {
    let mut sb = Sandbox::new();
    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));
    assert!(handle.undo(sb.runner(), &mut sb.changelog).unwrap());
    assert!(sb.runner.calls().is_empty());
}

#[test]
fn unparsable_target_reports_invalid() {
    let sb = Sandbox::new();
    let path = sb.host.write_etc("audit.conf", "orphan = 1\n[main]\nk = v\n");
    let spec = EditorSpec::new(Dialect::TagConf, &path, KvData::tag("main", [("k", "v")]))
        .with_separator(Separator::OpenEquals);
    let mut handle = RuleHandle::new(Box::new(KeyValueRule::new(RuleInfo::new(3, "Audit"), spec)));

    let compliance = handle.report(&linux(), sb.runner()).unwrap().clone();
    assert!(matches!(compliance, Compliance::Invalid(_)));
    assert!(handle.detail()[0].contains("line 1"));
}

#[test]
fn unreadable_target_reports_non_compliant() {
    let sb = Sandbox::new();
    // A directory where a file is expected
    let path = sb.host.etc("limits.d");
    std::fs::create_dir_all(&path).unwrap();
    let spec = EditorSpec::new(Dialect::Conf, &path, KvData::flat([("nofile", "1024")]));
    let mut handle = RuleHandle::new(Box::new(KeyValueRule::new(RuleInfo::new(4, "Limits"), spec)));

    assert_eq!(
        handle.report(&linux(), sb.runner()).unwrap(),
        &Compliance::NonCompliant
    );
    assert!(handle.detail()[0].contains("Cannot access"));
}

#[test]
fn key_value_rule_fix_creates_missing_file_and_undo_removes_it() {
    let mut sb = Sandbox::new();
    let path = sb.host.etc("sysctl.d/99-aslr.conf");
    let mut info = RuleInfo::new(7, "AslrEnabled");
    info.mandatory = true;
    let spec = EditorSpec::new(
        Dialect::Conf,
        &path,
        KvData::flat([("kernel.randomize_va_space", "2")]),
    )
    .with_separator(Separator::OpenEquals);
    let mut handle = RuleHandle::new(Box::new(KeyValueRule::new(info, spec)));
    let env = linux();

    handle.report(&env, sb.runner()).unwrap();
    assert!(handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap());
    assert_eq!(sb.host.read(&path), "kernel.randomize_va_space = 2\n");

    let events = sb.changelog.find_events_for_rule(7);
    assert!(matches!(&events[0].kind, EventKind::Conf { backup: None, .. }));

    assert!(handle.undo(sb.runner(), &mut sb.changelog).unwrap());
    assert!(io::read_text_optional(&path).unwrap().is_none());
}

#[test]
fn failed_command_is_reported_not_raised() {
    let mut sb = Sandbox::new();
    sb.host.write_etc("sshd_config", SSHD);
    sb.runner = Arc::new(ScriptedRunner::new());
    let env = linux();
    let mut handle = RuleHandle::new(Box::new(SshHardening::new(&sb.host)));

    handle.report(&env, sb.runner()).unwrap();
    assert!(!handle.fix(&env, sb.runner(), &mut sb.changelog).unwrap());
    assert!(handle.detail().iter().any(|d| d.contains("exit code 127")));

    // The mutations that did succeed are still undoable
    assert_eq!(sb.changelog.find_events_for_rule(12).len(), 3);
}
