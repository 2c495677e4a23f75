//! End-to-end editor scenarios against real files and a fake `defaults`

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use remedy_host::{CommandRunner, FileMeta};
use remedy_kv::{
    Dialect, EditorSpec, Intent, KeyValueEditor, KvData, KvValue, Separator, Validation,
};
use remedy_test_utils::{FakeDefaults, FaultyRunner, ScriptedRunner, TestHost};

fn no_tools() -> Arc<dyn CommandRunner> {
    Arc::new(ScriptedRunner::new())
}

fn converge(editor: &mut KeyValueEditor) {
    assert_eq!(editor.validate().unwrap(), Validation::NonCompliant);
    assert!(editor.update().unwrap());
    assert!(editor.commit().unwrap());
    assert_eq!(editor.validate().unwrap(), Validation::Compliant);
}

#[test]
fn sysctl_key_is_added_and_then_compliant() {
    let host = TestHost::new();
    let path = host.write_etc("sysctl.conf", "# kernel tuning\nnet.ipv4.ip_forward = 0\n");
    let spec = EditorSpec::new(
        Dialect::Conf,
        &path,
        KvData::flat([("kernel.randomize_va_space", "2")]),
    )
    .with_separator(Separator::OpenEquals);
    let mut editor = KeyValueEditor::new(spec, no_tools()).unwrap();

    assert_eq!(editor.validate().unwrap(), Validation::NonCompliant);
    assert_eq!(
        editor.fixables(),
        Some(&KvData::flat([("kernel.randomize_va_space", "2")]))
    );
    assert!(editor.update().unwrap());
    assert!(editor.commit().unwrap());

    assert_eq!(
        host.read(&path),
        "# kernel tuning\nnet.ipv4.ip_forward = 0\nkernel.randomize_va_space = 2\n"
    );
    assert_eq!(editor.validate().unwrap(), Validation::Compliant);
}

#[test]
fn duplicate_scalar_key_is_non_compliant_and_collapsed() {
    let host = TestHost::new();
    let path = host.write_etc("login.defs", "foo=1\nbar=2\nfoo=1\n");
    let spec = EditorSpec::new(Dialect::Conf, &path, KvData::flat([("foo", "1")]))
        .with_separator(Separator::ClosedEquals);
    let mut editor = KeyValueEditor::new(spec, no_tools()).unwrap();

    assert_eq!(editor.validate().unwrap(), Validation::NonCompliant);
    assert_eq!(editor.duplicates(), ["foo".to_string()]);
    assert_eq!(editor.duplicate_count(), 1);

    editor.update().unwrap();
    editor.commit().unwrap();
    assert_eq!(host.read(&path), "foo=1\nbar=2\n");
    assert_eq!(editor.validate().unwrap(), Validation::Compliant);
}

#[test]
fn unparseable_file_is_invalid_not_an_error() {
    let host = TestHost::new();
    let path = host.write_etc("sysctl.conf", "vm.swappiness = 10\njunk without equals\n");
    let spec = EditorSpec::new(Dialect::Conf, &path, KvData::flat([("vm.swappiness", "10")]))
        .with_separator(Separator::OpenEquals);
    let mut editor = KeyValueEditor::new(spec, no_tools()).unwrap();

    let validation = editor.validate().unwrap();
    assert!(validation.is_invalid(), "{validation:?}");
    assert!(editor.update().is_err());
}

#[test]
fn present_then_notpresent_round_trip() {
    let host = TestHost::new();
    let original = "Port 22\n";
    let path = host.write_etc("sshd_config", original);
    let data = KvData::flat([("PermitEmptyPasswords", "no")]);

    let mut add =
        KeyValueEditor::new(EditorSpec::new(Dialect::Conf, &path, data.clone()), no_tools())
            .unwrap();
    converge(&mut add);
    assert_eq!(host.read(&path), "Port 22\nPermitEmptyPasswords no\n");

    let mut strip = KeyValueEditor::new(
        EditorSpec::new(Dialect::Conf, &path, data).with_intent(Intent::NotPresent),
        no_tools(),
    )
    .unwrap();
    converge(&mut strip);
    assert_eq!(host.read(&path), original);
}

#[test]
fn list_values_are_merged_as_sets() {
    let host = TestHost::new();
    let path = host.write_etc("sshd_config", "AllowUsers alice carol\n");
    let data = KvData::Flat(
        [("AllowUsers".to_string(), KvValue::from(vec!["carol", "bob"]))]
            .into_iter()
            .collect(),
    );
    let mut editor =
        KeyValueEditor::new(EditorSpec::new(Dialect::Conf, &path, data), no_tools()).unwrap();
    converge(&mut editor);
    assert_eq!(host.read(&path), "AllowUsers alice carol bob\n");
}

#[test]
fn missing_file_is_created_on_commit() {
    let host = TestHost::new();
    let path = host.etc("audit/plugins.conf");
    let spec = EditorSpec::new(Dialect::TagConf, &path, KvData::tag("stanzaA", [("k", "v")]))
        .with_separator(Separator::OpenEquals);
    let mut editor = KeyValueEditor::new(spec, no_tools()).unwrap();

    assert_eq!(editor.validate().unwrap(), Validation::NonCompliant);
    assert!(!editor.target_existed());
    assert_eq!(editor.fixables(), Some(&KvData::tag("stanzaA", [("k", "v")])));
    editor.update().unwrap();
    editor.commit().unwrap();

    assert_eq!(host.read(&path), "[stanzaA]\nk = v\n");
    assert_eq!(editor.validate().unwrap(), Validation::Compliant);
}

#[test]
fn notpresent_on_missing_file_writes_nothing() {
    let host = TestHost::new();
    let path = host.etc("absent.conf");
    let spec = EditorSpec::new(Dialect::Conf, &path, KvData::flat([("x", "1")]))
        .with_intent(Intent::NotPresent);
    let mut editor = KeyValueEditor::new(spec, no_tools()).unwrap();

    assert_eq!(editor.validate().unwrap(), Validation::Compliant);
    editor.update().unwrap();
    editor.commit().unwrap();
    assert!(!path.exists());
}

#[test]
fn commit_keeps_existing_mode_unless_overridden() {
    let host = TestHost::new();
    let path = host.write_etc("limits.conf", "a 1\n");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();

    let spec = EditorSpec::new(Dialect::Conf, &path, KvData::flat([("a", "2")]));
    let mut editor = KeyValueEditor::new(spec.clone(), no_tools()).unwrap();
    converge(&mut editor);
    assert_eq!(FileMeta::read(&path).unwrap().mode, 0o600);

    let mut editor = KeyValueEditor::new(
        EditorSpec {
            data: KvData::flat([("a", "3")]),
            ..spec
        },
        no_tools(),
    )
    .unwrap();
    let current = FileMeta::read(&path).unwrap();
    editor.set_meta(current.with_mode(0o644));
    converge(&mut editor);
    assert_eq!(FileMeta::read(&path).unwrap().mode, 0o644);
}

#[test]
fn preview_shows_pending_change() {
    let host = TestHost::new();
    let path = host.write_etc("sshd_config", "PermitRootLogin yes\n");
    let spec = EditorSpec::new(Dialect::Conf, &path, KvData::flat([("PermitRootLogin", "no")]));
    let mut editor = KeyValueEditor::new(spec, no_tools()).unwrap();

    editor.validate().unwrap();
    editor.update().unwrap();
    let diff = editor.preview().unwrap();
    assert!(diff.contains("-PermitRootLogin yes"));
    assert!(diff.contains("+PermitRootLogin no"));
    assert_eq!(host.read(&path), "PermitRootLogin yes\n");
}

#[test]
fn defaults_domain_converges_and_undoes() {
    let fake = Arc::new(FakeDefaults::new().with(
        "com.apple.screensaver",
        "askForPassword",
        "boolean",
        "0",
    ));
    let runner: Arc<dyn CommandRunner> = fake.clone();
    let data = KvData::flat([("askForPassword", "true"), ("askForPasswordDelay", "5")]);
    let spec = EditorSpec::new(Dialect::Defaults, "com.apple.screensaver", data);
    let mut editor = KeyValueEditor::new(spec, runner.clone()).unwrap();

    assert_eq!(editor.validate().unwrap(), Validation::NonCompliant);
    assert!(editor.update().unwrap());
    assert!(editor.commit().unwrap());
    assert_eq!(fake.get("com.apple.screensaver", "askForPassword").as_deref(), Some("1"));
    assert_eq!(
        fake.get("com.apple.screensaver", "askForPasswordDelay").as_deref(),
        Some("5")
    );

    let undo = editor.undo_commands();
    assert_eq!(undo.len(), 2);
    for cmd in &undo {
        assert!(runner.execute(cmd).unwrap().success(), "{cmd:?}");
    }
    assert_eq!(fake.get("com.apple.screensaver", "askForPassword").as_deref(), Some("0"));
    assert_eq!(fake.get("com.apple.screensaver", "askForPasswordDelay"), None);

    assert_eq!(editor.validate().unwrap(), Validation::NonCompliant);
}

#[test]
fn defaults_tool_failure_surfaces_as_external_tool_error() {
    let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::new());
    let spec = EditorSpec::new(Dialect::Defaults, "com.apple.loginwindow", KvData::flat([("k", "1")]));
    let mut editor = KeyValueEditor::new(spec, runner).unwrap();
    assert!(matches!(
        editor.validate(),
        Err(remedy_kv::Error::ExternalTool { code: 127, .. })
    ));
}

#[test]
fn defaults_timeout_fails_one_key_and_keeps_going() {
    let fake = Arc::new(FakeDefaults::new());
    let runner: Arc<dyn CommandRunner> = Arc::new(
        FaultyRunner::new(fake.clone()).timeout_on(&["defaults", "write", "dom", "b"]),
    );
    let data = KvData::flat([("a", "1"), ("b", "2"), ("c", "3")]);
    let mut editor =
        KeyValueEditor::new(EditorSpec::new(Dialect::Defaults, "dom", data), runner).unwrap();

    assert_eq!(editor.validate().unwrap(), Validation::NonCompliant);
    assert!(!editor.update().unwrap());
    assert_eq!(fake.get("dom", "a").as_deref(), Some("1"));
    assert_eq!(fake.get("dom", "b"), None);
    assert_eq!(fake.get("dom", "c").as_deref(), Some("3"));

    let applied = editor.applied_commands();
    assert_eq!(applied.len(), 2);
    assert_eq!(
        editor.undo_commands(),
        vec![
            vec!["defaults", "delete", "dom", "c"],
            vec!["defaults", "delete", "dom", "a"],
        ]
    );
}

#[test]
fn defaults_interrupt_stops_but_keeps_undo_for_done_keys() {
    let fake = Arc::new(FakeDefaults::new());
    let runner: Arc<dyn CommandRunner> = Arc::new(
        FaultyRunner::new(fake.clone()).interrupt_on(&["defaults", "write", "dom", "b"]),
    );
    let data = KvData::flat([("a", "1"), ("b", "2"), ("c", "3")]);
    let mut editor =
        KeyValueEditor::new(EditorSpec::new(Dialect::Defaults, "dom", data), runner).unwrap();

    editor.validate().unwrap();
    let err = editor.update().unwrap_err();
    assert!(err.is_interrupt());
    assert_eq!(fake.get("dom", "c"), None);
    assert_eq!(editor.undo_commands(), vec![vec!["defaults", "delete", "dom", "a"]]);
}
