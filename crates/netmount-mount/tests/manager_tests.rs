//! Remote mount manager scenarios against the fake command runner and mount table.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use netmount_core::{
    CredentialCodec, KdfParams, MountPathResolver, MountStatus, NewShare, PASSWORD_SENTINEL,
    SharePatch, ShareType,
};
use netmount_mount::mount_table::MountProber;
use netmount_mount::testing::{FakeMountTable, FakeRunner};
use netmount_mount::{
    Error, FeatureFlags, InMemoryRepository, ManagerParts, MountLocks, NetworkSettingsFlags,
    RemoteMountManager, ShareRepository, StaticFlags,
};
use secrecy::SecretString;
use tempfile::TempDir;

struct Harness {
    manager: RemoteMountManager,
    runner: Arc<FakeRunner>,
    table: FakeMountTable,
    repo: Arc<InMemoryRepository>,
    base: TempDir,
    locks: TempDir,
}

impl Harness {
    fn mount_point(&self, server: &str, share: &str) -> PathBuf {
        MountPathResolver::new(self.base.path()).resolve(server, share)
    }
}

fn codec() -> CredentialCodec {
    CredentialCodec::with_params(SecretString::from("test-secret"), KdfParams::insecure_fast())
}

fn harness_with(flags: Arc<dyn FeatureFlags>, codec: Option<CredentialCodec>) -> Harness {
    let base = tempfile::tempdir().unwrap();
    let locks = tempfile::tempdir().unwrap();
    let table = FakeMountTable::new();
    let runner = Arc::new(FakeRunner::new().with_mount_table(table.clone()));
    let repo = Arc::new(InMemoryRepository::new());

    let manager = RemoteMountManager::new(ManagerParts {
        repository: repo.clone(),
        prober: Arc::new(table.clone()),
        flags,
        runner: runner.clone(),
        codec,
        resolver: MountPathResolver::new(base.path()),
        locks: MountLocks::new(locks.path()).with_timeout(Duration::from_secs(2)),
        command_timeout: Duration::from_secs(5),
    });

    Harness {
        manager,
        runner,
        table,
        repo,
        base,
        locks,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(StaticFlags(true)), Some(codec()))
}

fn smb(name: &str, share: &str) -> NewShare {
    NewShare {
        name: Some(name.to_string()),
        share_type: Some("smb".to_string()),
        server: Some("192.168.1.5".to_string()),
        share: Some(share.to_string()),
        ..NewShare::default()
    }
}

fn nfs(name: &str, export: &str) -> NewShare {
    NewShare {
        name: Some(name.to_string()),
        share_type: Some("nfs".to_string()),
        server: Some("nas".to_string()),
        share: Some(export.to_string()),
        ..NewShare::default()
    }
}

#[test]
fn test_end_to_end_smb_lifecycle() {
    let h = harness();
    let created = h
        .manager
        .create(NewShare {
            username: Some("alice".to_string()),
            password: Some("pw".to_string()),
            ..smb("media", "movies")
        })
        .unwrap();

    assert_eq!(created.password, PASSWORD_SENTINEL);
    assert_eq!(created.status, MountStatus::Unmounted);
    let mount_point = h.mount_point("192.168.1.5", "movies");
    assert_eq!(created.mount_point, mount_point);

    // Only ciphertext is persisted
    let stored = h.repo.load().unwrap();
    let token = stored[0].password.clone().unwrap();
    assert_ne!(token, "pw");
    assert_eq!(token.split(':').count(), 3);

    let listed = h.manager.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].password, PASSWORD_SENTINEL);

    let mounted = h.manager.mount(&created.id).unwrap();
    assert_eq!(mounted.status, MountStatus::Mounted);
    assert!(mount_point.is_dir());
    let mount_call = &h.runner.calls_to("mount")[0];
    assert_eq!(mount_call[3], "//192.168.1.5/movies");
    assert_eq!(mount_call[6], "username=alice,password=pw,vers=3.0");

    let moved = SharePatch {
        server: Some("192.168.1.6".to_string()),
        ..SharePatch::default()
    };
    assert!(matches!(
        h.manager.update(&created.id, &moved),
        Err(Error::Conflict(_))
    ));

    let renamed = SharePatch {
        name: Some("films".to_string()),
        ..SharePatch::default()
    };
    assert_eq!(h.manager.update(&created.id, &renamed).unwrap().name, "films");

    assert!(matches!(h.manager.delete(&created.id), Err(Error::Conflict(_))));

    let unmounted = h.manager.unmount(&created.id).unwrap();
    assert_eq!(unmounted.status, MountStatus::Unmounted);
    assert!(!mount_point.exists());
    assert!(!mount_point.parent().unwrap().exists());
    assert!(h.base.path().exists());

    // The same identity change is accepted once unmounted
    let moved = h.manager.update(&created.id, &moved).unwrap();
    assert_eq!(moved.server, "192.168.1.6");
    assert_eq!(moved.mount_point, h.mount_point("192.168.1.6", "movies"));

    h.manager.delete(&created.id).unwrap();
    assert!(matches!(h.manager.get(&created.id), Err(Error::NotFound(_))));
    assert!(h.manager.list().unwrap().is_empty());
}

#[test]
fn test_feature_flag_gates_create_and_mount() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("network.json");
    let h = harness_with(
        Arc::new(NetworkSettingsFlags::new(&settings)),
        Some(codec()),
    );

    assert!(matches!(
        h.manager.create(smb("media", "movies")),
        Err(Error::FeatureDisabled)
    ));

    std::fs::write(&settings, r#"{"services":{"remote_mounting":{"enabled":true}}}"#).unwrap();
    let created = h.manager.create(smb("media", "movies")).unwrap();

    // Re-read on every call: switching off takes effect immediately
    std::fs::write(&settings, r#"{"services":{"remote_mounting":{"enabled":false}}}"#).unwrap();
    assert!(matches!(h.manager.mount(&created.id), Err(Error::FeatureDisabled)));
    assert!(matches!(h.manager.mount_auto(), Err(Error::FeatureDisabled)));
    assert!(h.runner.calls_to("mount").is_empty());

    // Reads, updates and unmounts stay available
    assert_eq!(h.manager.list().unwrap().len(), 1);
    let patch = SharePatch {
        auto_mount: Some(true),
        ..SharePatch::default()
    };
    assert!(h.manager.update(&created.id, &patch).unwrap().auto_mount);
    assert_eq!(h.manager.get(&created.id).unwrap().name, "media");

    let mount_point = h.mount_point("192.168.1.5", "movies");
    h.table.insert(mount_point.clone());
    let unmounted = h.manager.unmount(&created.id).unwrap();
    assert_eq!(unmounted.status, MountStatus::Unmounted);
    assert_eq!(h.runner.calls_to("umount").len(), 1);

    h.manager.delete(&created.id).unwrap();
    assert!(h.manager.list().unwrap().is_empty());
}

#[test]
fn test_duplicate_name_and_mount_point_conflict() {
    let h = harness();
    h.manager.create(smb("media", "movies")).unwrap();

    assert!(matches!(
        h.manager.create(smb("media", "music")),
        Err(Error::Conflict(_))
    ));

    // "my movies" and "my_movies" sanitise to the same directory
    h.manager.create(smb("a", "my movies")).unwrap();
    let err = h.manager.create(smb("b", "my_movies")).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert!(err.to_string().contains("mount point"));

    assert_eq!(h.manager.list().unwrap().len(), 2);
}

#[test]
fn test_update_rename_checks_uniqueness_excluding_self() {
    let h = harness();
    let a = h.manager.create(smb("a", "one")).unwrap();
    h.manager.create(smb("b", "two")).unwrap();

    let to_b = SharePatch {
        name: Some("b".to_string()),
        ..SharePatch::default()
    };
    assert!(matches!(h.manager.update(&a.id, &to_b), Err(Error::Conflict(_))));

    let same = SharePatch {
        name: Some(" a ".to_string()),
        ..SharePatch::default()
    };
    assert_eq!(h.manager.update(&a.id, &same).unwrap().name, "a");

    assert!(matches!(
        h.manager.update("missing", &same),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_update_validation_errors_are_not_persisted() {
    let h = harness();
    let share = h.manager.create(smb("media", "movies")).unwrap();

    let bad = SharePatch {
        uid: Some(Some(-1)),
        name: Some("renamed".to_string()),
        ..SharePatch::default()
    };
    let err = h.manager.update(&share.id, &bad).unwrap_err();
    assert!(matches!(err, Error::Validation(ref v) if v.field == "uid"));
    assert_eq!(h.manager.get(&share.id).unwrap().name, "media");
}

#[test]
fn test_password_patch_semantics() {
    let h = harness();
    let share = h
        .manager
        .create(NewShare {
            username: Some("alice".to_string()),
            password: Some("first".to_string()),
            ..smb("media", "movies")
        })
        .unwrap();
    let original = h.repo.load().unwrap()[0].password.clone();

    let echo = SharePatch {
        password: Some(PASSWORD_SENTINEL.to_string()),
        ..SharePatch::default()
    };
    h.manager.update(&share.id, &echo).unwrap();
    assert_eq!(h.repo.load().unwrap()[0].password, original);

    let changed = SharePatch {
        password: Some("second".to_string()),
        ..SharePatch::default()
    };
    h.manager.update(&share.id, &changed).unwrap();
    h.manager.mount(&share.id).unwrap();
    assert!(h.runner.calls_to("mount")[0][6].contains("password=second"));
    h.manager.unmount(&share.id).unwrap();

    let cleared = SharePatch {
        password: Some(String::new()),
        ..SharePatch::default()
    };
    h.manager.update(&share.id, &cleared).unwrap();
    assert_eq!(h.repo.load().unwrap()[0].password, None);
    h.manager.mount(&share.id).unwrap();
    assert_eq!(h.runner.calls_to("mount")[1][6], "guest,vers=3.0");
}

#[test]
fn test_switching_to_nfs_drops_smb_settings() {
    let h = harness();
    let share = h
        .manager
        .create(NewShare {
            domain: Some("WORK".to_string()),
            ..smb("media", "movies")
        })
        .unwrap();

    let patch = SharePatch {
        share_type: Some("nfs".to_string()),
        share: Some("/export/movies".to_string()),
        ..SharePatch::default()
    };
    let updated = h.manager.update(&share.id, &patch).unwrap();
    assert_eq!(updated.share_type, ShareType::Nfs);
    assert_eq!(updated.version, None);
    assert_eq!(updated.domain, None);
}

#[test]
fn test_mount_state_guards() {
    let h = harness();
    let share = h.manager.create(nfs("backups", "/export/backups")).unwrap();

    assert!(matches!(h.manager.unmount(&share.id), Err(Error::Conflict(_))));
    h.manager.mount(&share.id).unwrap();
    assert!(matches!(h.manager.mount(&share.id), Err(Error::Conflict(_))));
    assert_eq!(h.runner.calls_to("mount").len(), 1);

    assert!(matches!(h.manager.mount("nope"), Err(Error::NotFound(_))));
    assert!(matches!(h.manager.unmount("nope"), Err(Error::NotFound(_))));
    assert!(matches!(h.manager.delete("nope"), Err(Error::NotFound(_))));
}

#[test]
fn test_failed_mount_reports_tool_error_and_cleans_up() {
    let h = harness();
    let share = h.manager.create(smb("media", "movies")).unwrap();
    h.runner.respond_once(
        "mount",
        FakeRunner::failed(32, "mount error(13): Permission denied"),
    );

    let err = h.manager.mount(&share.id).unwrap_err();
    assert!(matches!(err, Error::Mount(_)));
    assert!(err.to_string().contains("Permission denied"));
    assert!(!h.mount_point("192.168.1.5", "movies").exists());
    assert_eq!(h.manager.get(&share.id).unwrap().status, MountStatus::Unmounted);
}

#[test]
fn test_auto_mount_failure_keeps_record() {
    let h = harness();
    h.runner.respond_once("mount", FakeRunner::failed(32, "host is down"));

    let created = h
        .manager
        .create(NewShare {
            auto_mount: true,
            ..nfs("backups", "/export/backups")
        })
        .unwrap();
    assert_eq!(created.status, MountStatus::Unmounted);
    assert_eq!(h.manager.list().unwrap().len(), 1);

    let created = h
        .manager
        .create(NewShare {
            auto_mount: true,
            ..nfs("media", "/export/media")
        })
        .unwrap();
    assert_eq!(created.status, MountStatus::Mounted);
}

#[test]
fn test_unmount_all_continues_past_failures() {
    let h = harness();
    let ids: Vec<String> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| {
            h.manager
                .create(nfs(name, &format!("/export/{name}")))
                .unwrap()
                .id
        })
        .collect();
    for id in &ids[..3] {
        h.manager.mount(id).unwrap();
    }

    h.runner.respond_once("umount", FakeRunner::failed(32, "target is busy"));
    let report = h.manager.unmount_all().unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("target is busy"));
    assert_eq!(h.table.targets().len(), 1);

    let report = h.manager.unmount_all().unwrap();
    assert_eq!((report.attempted, report.succeeded), (1, 1));
    assert!(report.is_complete());
}

#[test]
fn test_mount_auto_mounts_only_flagged_unmounted() {
    let h = harness();
    let flagged = h
        .manager
        .create(nfs("a", "/export/a"))
        .unwrap();
    let patch = SharePatch {
        auto_mount: Some(true),
        ..SharePatch::default()
    };
    h.manager.update(&flagged.id, &patch).unwrap();
    let other = h.manager.create(nfs("b", "/export/b")).unwrap();
    h.manager.update(&other.id, &patch).unwrap();
    h.manager.mount(&other.id).unwrap();
    h.manager.create(nfs("c", "/export/c")).unwrap();

    let report = h.manager.mount_auto().unwrap();
    assert_eq!((report.attempted, report.succeeded), (1, 1));
    assert_eq!(h.manager.get(&flagged.id).unwrap().status, MountStatus::Mounted);
}

#[test]
fn test_tampered_credential_is_reported() {
    let h = harness();
    let share = h
        .manager
        .create(NewShare {
            username: Some("alice".to_string()),
            password: Some("pw".to_string()),
            ..smb("media", "movies")
        })
        .unwrap();

    h.repo
        .update(&mut |shares| {
            shares[0].password = Some("00:00:00".to_string());
            true
        })
        .unwrap();

    assert!(matches!(h.manager.mount(&share.id), Err(Error::Credential(_))));
    assert!(h.runner.calls_to("mount").is_empty());
}

#[test]
fn test_missing_secret_only_matters_for_credentials() {
    let h = harness_with(Arc::new(StaticFlags(true)), None);
    let guest = h.manager.create(smb("guest", "public")).unwrap();
    h.manager.mount(&guest.id).unwrap();

    let err = h
        .manager
        .create(NewShare {
            username: Some("alice".to_string()),
            password: Some("pw".to_string()),
            ..smb("private", "private")
        })
        .unwrap_err();
    assert!(matches!(err, Error::MissingSecret));
}

#[test]
fn test_status_is_live() {
    let h = harness();
    let share = h.manager.create(nfs("media", "/export/media")).unwrap();
    let mount_point = h.mount_point("nas", "/export/media");

    // Mounted behind the manager's back
    h.table.insert(mount_point.clone());
    assert_eq!(h.manager.get(&share.id).unwrap().status, MountStatus::Mounted);

    h.table.set_unreadable(true);
    assert_eq!(h.manager.list().unwrap()[0].status, MountStatus::Unmounted);
    assert!(!h.table.is_mounted(Path::new(&mount_point)));
}

#[test]
fn test_connection_tests() {
    let h = harness();
    let input = NewShare {
        username: Some("alice".to_string()),
        password: Some("pw".to_string()),
        ..smb("", "movies")
    };
    assert!(h.manager.connection_test(&input).unwrap().success);
    assert_eq!(
        h.runner.calls_to("smbclient")[0],
        ["smbclient", "//192.168.1.5/movies", "-U", "alice%pw", "-c", "ls"]
    );

    let missing_share = NewShare {
        share: None,
        ..input.clone()
    };
    assert!(matches!(
        h.manager.connection_test(&missing_share),
        Err(Error::Validation(_))
    ));

    let saved = h.manager.create(NewShare { name: Some("media".to_string()), ..input }).unwrap();
    h.manager.test_saved_connection(&saved.id).unwrap();
    assert_eq!(h.runner.calls_to("smbclient")[1][3], "alice%pw");
    assert_eq!(h.repo.load().unwrap().len(), 1);
}

#[test]
fn test_list_server_shares() {
    let h = harness();
    h.runner.respond("showmount", FakeRunner::ok("/export/a *\n/export/b 10.0.0.0/8\n"));
    let shares = h
        .manager
        .list_server_shares("nas", "nfs", &Default::default())
        .unwrap();
    assert_eq!(shares, ["/export/a", "/export/b"]);

    assert!(matches!(
        h.manager.list_server_shares("nas;reboot", "nfs", &Default::default()),
        Err(Error::Validation(_))
    ));
    let calls = h.runner.calls().len();
    assert!(matches!(
        h.manager.list_server_shares("-oProxyCommand=x", "smb", &Default::default()),
        Err(Error::Validation(_))
    ));
    assert_eq!(h.runner.calls().len(), calls);

    h.runner.respond("showmount", FakeRunner::ok(""));
    assert!(matches!(
        h.manager.list_server_shares("nas", "nfs", &Default::default()),
        Err(Error::Discovery(_))
    ));
}

#[test]
fn test_option_injection_in_username_is_rejected() {
    let h = harness();
    let err = h
        .manager
        .create(NewShare {
            username: Some("alice,uid=0,file_mode=0777".to_string()),
            auto_mount: true,
            ..smb("media", "movies")
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(ref e) if e.field == "username"));
    assert!(h.runner.calls().is_empty());
    assert!(h.repo.load().unwrap().is_empty());

    let share = h.manager.create(smb("media", "movies")).unwrap();
    let patch = SharePatch {
        domain: Some(Some("WORK,sec=none".to_string())),
        ..SharePatch::default()
    };
    assert!(matches!(
        h.manager.update(&share.id, &patch),
        Err(Error::Validation(_))
    ));
    assert_eq!(h.repo.load().unwrap()[0].domain, None);
}

#[test]
fn test_delete_and_update_wait_for_busy_mount_point() {
    let h = harness();
    let share = h.manager.create(smb("media", "movies")).unwrap();
    let mount_point = h.mount_point("192.168.1.5", "movies");

    // Another process is in the middle of mounting this share
    let guard = MountLocks::new(h.locks.path())
        .acquire(&mount_point)
        .unwrap();

    assert!(matches!(h.manager.delete(&share.id), Err(Error::Lock(_))));
    let moved = SharePatch {
        server: Some("192.168.1.6".to_string()),
        ..SharePatch::default()
    };
    assert!(matches!(h.manager.update(&share.id, &moved), Err(Error::Lock(_))));
    assert_eq!(h.repo.load().unwrap()[0].server, "192.168.1.5");

    drop(guard);
    assert_eq!(
        h.manager.update(&share.id, &moved).unwrap().server,
        "192.168.1.6"
    );
    h.manager.delete(&share.id).unwrap();
    assert!(h.repo.load().unwrap().is_empty());
}

#[test]
fn test_mount_rereads_record_after_waiting_for_lock() {
    let h = harness();
    let share = h.manager.create(smb("media", "movies")).unwrap();
    let old_point = h.mount_point("192.168.1.5", "movies");
    let guard = MountLocks::new(h.locks.path()).acquire(&old_point).unwrap();

    let outcome = std::thread::scope(|scope| {
        let mount = scope.spawn(|| h.manager.mount(&share.id));
        // Let the mount find the record and block on the lock
        std::thread::sleep(Duration::from_millis(300));

        // The record is retargeted behind its back
        h.repo
            .update(&mut |shares| {
                shares[0].server = "192.168.1.6".to_string();
                true
            })
            .unwrap();
        drop(guard);
        mount.join().unwrap()
    });

    let err = outcome.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    assert!(err.to_string().contains("changed by another operation"));
    assert!(h.runner.calls_to("mount").is_empty());
    assert!(!h.table.is_mounted(&old_point));

    // A fresh attempt mounts the current target
    let mounted = h.manager.mount(&share.id).unwrap();
    assert_eq!(mounted.status, MountStatus::Mounted);
    assert_eq!(h.runner.calls_to("mount")[0][3], "//192.168.1.6/movies");
}
