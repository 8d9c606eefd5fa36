mod common;

use std::path::Path;
use std::sync::Arc;

use common::{gzip, md5_hex, MapOrigin};
use deb_mirror_core::error::{MirrorError, OriginError, StoreError};
use deb_mirror_core::origin::{Compression, IndexKind};
use deb_mirror_core::store::{FsStore, MockObjectStore, ObjectInfo, PutOptions};
use deb_mirror_core::synchronise::{
    synchronise, ArchiveStatus, FailedItem, FailureStage, OriginConfig, RunStatus,
    SynchroniseConfig, SynchroniseReport, TargetConfig,
};
use deb_mirror_core::ByteStream;
use tempfile::tempdir;

const PACKAGES: &str = "dists/trusty/main/binary-i386/Packages";

fn config(index: IndexKind, compression: Compression, concurrency: usize) -> SynchroniseConfig {
    SynchroniseConfig {
        origin: OriginConfig {
            base_url: "http://origin.test".to_string(),
            release: "trusty".to_string(),
            component: "main".to_string(),
            arch: "i386".to_string(),
            index,
            compression,
            boundary: None,
        },
        target: TargetConfig {
            base_path: "/mirror".to_string(),
            concurrency,
            dry_run: false,
        },
    }
}

fn packages_config() -> SynchroniseConfig {
    config(IndexKind::Packages, Compression::None, 1)
}

fn stanza(name: &str, filename: &str, body: &[u8]) -> String {
    format!(
        "Package: {name}\nFilename: {filename}\nMD5sum: {}\nSize: {}\n",
        md5_hex(body),
        body.len()
    )
}

fn seed(root: &Path, path: &str, body: &[u8]) {
    let local = root.join(path.trim_start_matches('/'));
    std::fs::create_dir_all(local.parent().unwrap()).unwrap();
    std::fs::write(local, body).unwrap();
}

fn read(root: &Path, path: &str) -> Option<Vec<u8>> {
    std::fs::read(root.join(path.trim_start_matches('/'))).ok()
}

#[tokio::test]
async fn test_only_missing_package_is_transferred() {
    let index = "\
Package: foo
Filename: pool/foo_1.deb
MD5sum: abc123
Size: 10
Package: bar
Filename: pool/bar_1.deb
MD5sum: def456
Size: 20
";
    let origin = MapOrigin::new(vec![
        (PACKAGES, index.as_bytes().to_vec()),
        ("pool/foo_1.deb", vec![b'f'; 10]),
        ("pool/bar_1.deb", vec![b'b'; 20]),
    ]);

    let mut store = MockObjectStore::new();
    store
        .expect_info()
        .withf(|path: &str| path == "/mirror/pool/foo_1.deb")
        .times(1)
        .returning(|_| {
            Ok(Some(ObjectInfo {
                size: 10,
                md5: "abc123".to_string(),
            }))
        });
    store
        .expect_info()
        .withf(|path: &str| path == "/mirror/pool/bar_1.deb")
        .times(1)
        .returning(|_| Ok(None));
    store
        .expect_put()
        .withf(|path: &str, _body: &ByteStream, options: &PutOptions| {
            path == "/mirror/pool/bar_1.deb" && options.size == Some(20) && options.mkdirs
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    store
        .expect_put()
        .withf(|path: &str, _body: &ByteStream, _options: &PutOptions| {
            path == "/mirror/dists/trusty/main/binary-i386/Packages"
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let report = synchronise(&packages_config(), Arc::clone(&origin), Arc::new(store))
        .await
        .unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.up_to_date, 1);
    assert_eq!(report.missing, 1);
    assert_eq!(report.enqueued, 1);
    assert_eq!(report.transferred, 1);
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(report.status().code(), 0);
    assert_eq!(
        report.archive,
        ArchiveStatus::Written {
            path: "/mirror/dists/trusty/main/binary-i386/Packages".to_string()
        }
    );
    assert!(!origin.fetched().contains(&"pool/foo_1.deb".to_string()));
    assert!(origin.fetched().contains(&"pool/bar_1.deb".to_string()));
}

#[tokio::test]
async fn test_gzip_index_into_fs_store_is_idempotent() {
    let foo = b"foo contents".to_vec();
    let bar = b"bar contents, second revision".to_vec();
    let baz = b"baz".to_vec();
    let text = format!(
        "{}{}{}",
        stanza("foo", "pool/main/f/foo.deb", &foo),
        stanza("bar", "pool/main/b/bar.deb", &bar),
        stanza("baz", "pool/main/b/baz.deb", &baz),
    );
    let compressed = gzip(text.as_bytes()).await;
    let origin = MapOrigin::new(vec![
        ("dists/trusty/main/binary-i386/Packages.gz", compressed.clone()),
        ("pool/main/f/foo.deb", foo.clone()),
        ("pool/main/b/bar.deb", bar.clone()),
        ("pool/main/b/baz.deb", baz.clone()),
    ]);
    let dir = tempdir().unwrap();
    seed(dir.path(), "/mirror/pool/main/f/foo.deb", &foo);
    seed(dir.path(), "/mirror/pool/main/b/bar.deb", b"bar contents, first revision");
    let store = Arc::new(FsStore::new(dir.path()));
    let config = config(IndexKind::Packages, Compression::Gzip, 3);

    let report = synchronise(&config, Arc::clone(&origin), Arc::clone(&store))
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::Success, "{report:#?}");
    assert_eq!(report.up_to_date, 1);
    assert_eq!(report.mismatched, 1);
    assert_eq!(report.missing, 1);
    assert_eq!(report.transferred, 2);
    assert_eq!(read(dir.path(), "/mirror/pool/main/b/bar.deb"), Some(bar));
    assert_eq!(read(dir.path(), "/mirror/pool/main/b/baz.deb"), Some(baz));
    assert_eq!(
        read(dir.path(), "/mirror/dists/trusty/main/binary-i386/Packages.gz"),
        Some(compressed)
    );

    let again = synchronise(&config, origin, store).await.unwrap();
    assert_eq!(again.up_to_date, 3);
    assert_eq!(again.enqueued, 0);
    assert_eq!(again.transferred, 0);
    assert_eq!(again.status(), RunStatus::Success);
}

#[tokio::test]
async fn test_sources_index_mirrors_every_manifest_file() {
    let dsc = b"Format: 3.0 (quilt)\n".to_vec();
    let orig = vec![7u8; 300];
    let index = format!(
        "Package: hello\nDirectory: pool/main/h/hello\nFiles:\n {} {} hello_2.10-2.dsc\n {} {} hello_2.10.orig.tar.gz\n\nPackage: empty\nDirectory: pool/main/e/empty\nFiles:\n\n",
        md5_hex(&dsc),
        dsc.len(),
        md5_hex(&orig),
        orig.len(),
    );
    let origin = MapOrigin::new(vec![
        ("dists/trusty/main/source/Sources", index.into_bytes()),
        ("pool/main/h/hello/hello_2.10-2.dsc", dsc.clone()),
        ("pool/main/h/hello/hello_2.10.orig.tar.gz", orig.clone()),
    ]);
    let dir = tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()));
    let mut config = config(IndexKind::Sources, Compression::None, 2);
    config.origin.arch = String::new();

    let report = synchronise(&config, origin, store).await.unwrap();

    assert_eq!(report.status(), RunStatus::Success, "{report:#?}");
    assert_eq!(report.records, 1);
    assert_eq!(report.records_dropped, 1);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.transferred, 2);
    assert_eq!(
        read(dir.path(), "/mirror/pool/main/h/hello/hello_2.10-2.dsc"),
        Some(dsc)
    );
    assert_eq!(
        read(dir.path(), "/mirror/pool/main/h/hello/hello_2.10.orig.tar.gz"),
        Some(orig)
    );
    assert!(read(dir.path(), "/mirror/dists/trusty/main/source/Sources").is_some());
}

#[tokio::test]
async fn test_parse_error_stops_records_but_finishes_started_work() {
    let a = b"first".to_vec();
    let c = b"never reached".to_vec();
    let index = format!(
        "{}Package: b\n<<garbage>>\n{}",
        stanza("a", "pool/a.deb", &a),
        stanza("c", "pool/c.deb", &c),
    );
    let origin = MapOrigin::new(vec![
        (PACKAGES, index.clone().into_bytes()),
        ("pool/a.deb", a.clone()),
        ("pool/c.deb", c),
    ]);
    let dir = tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()));

    let report = synchronise(&packages_config(), Arc::clone(&origin), store)
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::ParseFailed);
    assert_eq!(report.status().code(), 4);
    assert!(report.parse_error.as_deref().unwrap().contains("<<garbage>>"));
    assert_eq!(report.records, 1);
    assert_eq!(report.transferred, 1);
    assert_eq!(read(dir.path(), "/mirror/pool/a.deb"), Some(a));
    assert!(!origin.fetched().contains(&"pool/c.deb".to_string()));
    assert_eq!(
        read(dir.path(), "/mirror/dists/trusty/main/binary-i386/Packages"),
        Some(index.into_bytes())
    );
}

#[tokio::test]
async fn test_failed_check_does_not_block_other_candidates() {
    let foo = b"foo".to_vec();
    let bar = b"bar".to_vec();
    let index = format!(
        "{}{}",
        stanza("foo", "pool/foo.deb", &foo),
        stanza("bar", "pool/bar.deb", &bar)
    );
    let origin = MapOrigin::new(vec![
        (PACKAGES, index.into_bytes()),
        ("pool/foo.deb", foo),
        ("pool/bar.deb", bar),
    ]);

    let mut store = MockObjectStore::new();
    store
        .expect_info()
        .withf(|path: &str| path == "/mirror/pool/foo.deb")
        .returning(|path| {
            Err(StoreError::Status {
                path: path.to_string(),
                status: 500,
            })
        });
    store
        .expect_info()
        .withf(|path: &str| path == "/mirror/pool/bar.deb")
        .returning(|_| Ok(None));
    // The artifact and the archived index; foo must never be written.
    store
        .expect_put()
        .withf(|path: &str, _body: &ByteStream, _options: &PutOptions| {
            path != "/mirror/pool/foo.deb"
        })
        .times(2)
        .returning(|_, _, _| Ok(()));

    let report = synchronise(&packages_config(), origin, Arc::new(store))
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::CheckFailed);
    assert_eq!(report.status().code(), 2);
    assert_eq!(report.transferred, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "/mirror/pool/foo.deb");
    assert_eq!(report.failures[0].stage, FailureStage::Check);
}

#[tokio::test]
async fn test_failed_transfer_is_reported() {
    let foo = b"foo".to_vec();
    let gone = b"this file is missing at the origin".to_vec();
    let index = format!(
        "{}{}",
        stanza("gone", "pool/gone.deb", &gone),
        stanza("foo", "pool/foo.deb", &foo)
    );
    let origin = MapOrigin::new(vec![
        (PACKAGES, index.into_bytes()),
        ("pool/foo.deb", foo.clone()),
    ]);
    let dir = tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()));

    let report = synchronise(&packages_config(), origin, store).await.unwrap();

    assert_eq!(report.status(), RunStatus::TransferFailed);
    assert_eq!(report.status().code(), 3);
    assert_eq!(report.transferred, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::Transfer);
    assert_eq!(read(dir.path(), "/mirror/pool/foo.deb"), Some(foo));
    assert_eq!(read(dir.path(), "/mirror/pool/gone.deb"), None);
}

#[tokio::test]
async fn test_duplicate_and_colliding_destinations() {
    let first = b"first".to_vec();
    let other = b"other".to_vec();
    let index = format!(
        "{}{}{}",
        stanza("a", "pool/shared.deb", &first),
        stanza("a-again", "pool/shared.deb", &first),
        stanza("a-other", "pool/shared.deb", &other),
    );
    let origin = MapOrigin::new(vec![
        (PACKAGES, index.into_bytes()),
        ("pool/shared.deb", first.clone()),
    ]);
    let dir = tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()));

    let report = synchronise(&packages_config(), Arc::clone(&origin), store)
        .await
        .unwrap();

    assert_eq!(report.candidates, 3);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.collisions, 1);
    assert_eq!(report.transferred, 1);
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(read(dir.path(), "/mirror/pool/shared.deb"), Some(first));
    let fetches = origin
        .fetched()
        .iter()
        .filter(|p| p.as_str() == "pool/shared.deb")
        .count();
    assert_eq!(fetches, 1);
}

#[tokio::test]
async fn test_dry_run_checks_but_writes_nothing() {
    let foo = b"foo".to_vec();
    let index = stanza("foo", "pool/foo.deb", &foo);
    let origin = MapOrigin::new(vec![(PACKAGES, index.into_bytes()), ("pool/foo.deb", foo)]);
    let dir = tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()));
    let mut config = packages_config();
    config.target.dry_run = true;

    let report = synchronise(&config, Arc::clone(&origin), store).await.unwrap();

    assert_eq!(report.missing, 1);
    assert_eq!(report.enqueued, 0);
    assert_eq!(report.transferred, 0);
    assert_eq!(report.archive, ArchiveStatus::Skipped);
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(origin.fetched(), vec![PACKAGES.to_string()]);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unresolvable_record_is_a_parse_failure_but_others_continue() {
    let ok = b"ok".to_vec();
    let index = format!(
        "Package: broken\nFilename: pool/broken.deb\nMD5sum: aa\nSize: lots\n{}",
        stanza("ok", "pool/ok.deb", &ok)
    );
    let origin = MapOrigin::new(vec![(PACKAGES, index.into_bytes()), ("pool/ok.deb", ok)]);
    let dir = tempdir().unwrap();
    let store = Arc::new(FsStore::new(dir.path()));

    let report = synchronise(&packages_config(), origin, store).await.unwrap();

    assert_eq!(report.transferred, 1);
    assert_eq!(report.failures[0].stage, FailureStage::Resolve);
    assert_eq!(report.status(), RunStatus::ParseFailed);
}

#[tokio::test]
async fn test_run_cannot_start() {
    let origin = MapOrigin::new(vec![]);
    let store = Arc::new(MockObjectStore::new());

    let err = synchronise(&packages_config(), Arc::clone(&origin), Arc::clone(&store))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MirrorError::IndexFetch {
            source: OriginError::Status { status: 404, .. },
            ..
        }
    ));

    let mut invalid = packages_config();
    invalid.target.concurrency = 0;
    let err = synchronise(&invalid, origin, store).await.unwrap_err();
    assert!(matches!(err, MirrorError::Config(_)));
}

#[test]
fn test_status_precedence() {
    fn failing(stages: &[FailureStage]) -> SynchroniseReport {
        SynchroniseReport {
            failures: stages
                .iter()
                .map(|stage| FailedItem {
                    path: "/x".to_string(),
                    stage: *stage,
                    message: "boom".to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    let cases = vec![
        (failing(&[]), RunStatus::Success),
        (failing(&[FailureStage::Archive]), RunStatus::TransferFailed),
        (
            failing(&[FailureStage::Transfer, FailureStage::Check]),
            RunStatus::CheckFailed,
        ),
        (
            failing(&[FailureStage::Transfer, FailureStage::Check, FailureStage::Resolve]),
            RunStatus::ParseFailed,
        ),
        (
            SynchroniseReport {
                parse_error: Some("malformed".to_string()),
                ..failing(&[FailureStage::Check])
            },
            RunStatus::ParseFailed,
        ),
    ];

    for (report, expected) in cases {
        assert_eq!(report.status(), expected, "{:?}", report.failures);
    }
}
