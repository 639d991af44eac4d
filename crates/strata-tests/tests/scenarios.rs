//! End-to-end scenarios over composed stacks and the mount router.

use std::sync::Arc;

use strata_core::{Cred, Errno, FileSystem};
use strata_tests::{init_tracing, memfs, DeadRemoteFs};
use strata_vfs::{AsyncBridge, OverlayFs, ReadonlyFs, Vfs};

fn vfs_with_root() -> Vfs {
    let vfs = Vfs::new();
    vfs.mount("/", memfs()).unwrap();
    vfs
}

#[test]
fn scenario_write_then_read_single_mount() {
    init_tracing();
    let vfs = vfs_with_root();

    vfs.write_file("/a.txt", b"hello").unwrap();
    assert_eq!(vfs.read_file("/a.txt").unwrap(), b"hello");
    assert_eq!(vfs.stat("/a.txt").unwrap().size, 5);
}

#[test]
fn scenario_two_mounts() {
    init_tracing();
    let vfs = vfs_with_root();
    vfs.mount("/tmp", memfs()).unwrap();

    vfs.write_file("/tmp/x", b"1").unwrap();
    vfs.write_file("/y", b"2").unwrap();

    let root = vfs.readdir("/").unwrap();
    assert!(root.contains(&"tmp".to_string()));
    assert!(root.contains(&"y".to_string()));
    assert_eq!(vfs.readdir("/tmp").unwrap(), vec!["x"]);
}

#[test]
fn scenario_overlay_hides_and_persists() {
    init_tracing();
    let writable = memfs();
    let readable = memfs();
    {
        let mut f = readable
            .create_file("/ro.txt", strata_core::OpenFlag::WRITE, 0o644, &Cred::ROOT)
            .unwrap();
        f.write(b"X", None).unwrap();
        f.close().unwrap();
    }

    let overlay = OverlayFs::new(Arc::clone(&writable), Arc::clone(&readable));
    overlay.ready().unwrap();
    overlay.unlink("/ro.txt", &Cred::ROOT).unwrap();
    assert!(overlay.readdir("/", &Cred::ROOT).unwrap().is_empty());

    // Reopening over the same writable layer keeps the file hidden.
    let reopened = OverlayFs::new(writable, readable);
    reopened.ready().unwrap();
    assert!(!reopened.exists("/ro.txt", &Cred::ROOT));
    assert!(reopened.readdir("/", &Cred::ROOT).unwrap().is_empty());
}

#[test]
fn scenario_readonly_rejects_and_preserves() {
    init_tracing();
    let inner = memfs();
    {
        let mut f = inner
            .create_file("/r", strata_core::OpenFlag::WRITE, 0o644, &Cred::ROOT)
            .unwrap();
        f.write(b"keep", None).unwrap();
        f.close().unwrap();
    }

    let vfs = Vfs::new();
    vfs.mount("/", Arc::new(ReadonlyFs::new(Arc::clone(&inner))))
        .unwrap();

    let e = vfs.write_file("/r", b"z").unwrap_err();
    assert!(e.is(Errno::EROFS));
    assert_eq!(vfs.read_file("/r").unwrap(), b"keep");
}

#[tokio::test]
async fn scenario_dead_remote_write_fails_with_rpc_error() {
    init_tracing();
    let bridge = AsyncBridge::new(Arc::new(DeadRemoteFs)).await.unwrap();

    // The asynchronous path forwards straight to the backend.
    use strata_core::AsyncFileSystem;
    let e = AsyncFileSystem::create_file(
        &bridge,
        "/test",
        strata_core::OpenFlag::WRITE,
        0o644,
        &Cred::ROOT,
    )
    .await
    .err()
    .unwrap();
    assert!(e.is(Errno::EIO));
    assert!(e.message.contains("RPC Failed"));
}

#[tokio::test]
async fn scenario_dead_remote_latches_queue_failure() {
    init_tracing();
    let bridge = AsyncBridge::new(Arc::new(DeadRemoteFs)).await.unwrap();

    // The sync mutation lands in the mirror and queues against the
    // backend, where it fails.
    let mut f = bridge
        .create_file("/test", strata_core::OpenFlag::WRITE, 0o644, &Cred::ROOT)
        .unwrap();
    f.write(b"x", None).unwrap();
    f.close().unwrap();
    bridge.queue_done().await;

    // The next call surfaces the latched failure exactly once...
    let e = bridge.stat("/test", &Cred::ROOT).unwrap_err();
    assert!(e.is(Errno::EIO));
    assert!(e.message.contains("RPC Failed"));

    // ...after which the mirror still serves the write it observed.
    assert_eq!(bridge.stat("/test", &Cred::ROOT).unwrap().size, 1);
    assert!(FileSystem::ready(&bridge).is_ok());
}

#[test]
fn scenario_rename_directory_then_stat() {
    init_tracing();
    let vfs = vfs_with_root();

    vfs.mkdir("/a", 0o755).unwrap();
    vfs.mkdir("/a/b", 0o755).unwrap();
    vfs.rename("/a", "/c").unwrap();

    assert!(vfs.stat("/c/b").unwrap().is_directory());
    assert!(vfs.stat("/a").unwrap_err().is(Errno::ENOENT));
}
