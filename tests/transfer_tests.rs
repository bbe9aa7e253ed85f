use rustle_connect::template::HandlebarsRenderer;
use rustle_connect::transfer::TransferError;
use rustle_connect::{
    ConnectSettings, Connection, FileTransfer, LocalConnection, LocalHost, TransferOutcome,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

fn settings() -> ConnectSettings {
    ConnectSettings::without_ssh_config()
}

fn local() -> LocalConnection {
    LocalConnection::new(LocalHost::new(), &settings())
}

fn path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().to_string()
}

#[tokio::test]
async fn test_round_trip_preserves_bytes() {
    let dir = TempDir::new().unwrap();
    let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.path().join("src.bin"), &content).unwrap();

    let transfer = FileTransfer::new(&settings());
    let conn = local();

    let outcome = transfer
        .put(&path(&dir, "src.bin"), &conn, &path(&dir, "remote/copy.bin"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TransferOutcome::Transferred {
            bytes: content.len() as u64
        }
    );

    let outcome = transfer
        .get(&conn, &path(&dir, "remote/copy.bin"), &path(&dir, "back/copy.bin"))
        .await
        .unwrap();
    assert!(outcome.changed());

    let mut read_back = Vec::new();
    conn.file_read(&path(&dir, "back/copy.bin"))
        .await
        .unwrap()
        .read_to_end(&mut read_back)
        .await
        .unwrap();
    assert_eq!(read_back, content);
}

#[tokio::test]
async fn test_unchanged_transfer_is_skipped() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("src.txt"), "same content").unwrap();

    let transfer = FileTransfer::new(&settings());
    let conn = local();
    let dst = path(&dir, "dst.txt");

    let first = transfer.put(&path(&dir, "src.txt"), &conn, &dst).await.unwrap();
    assert!(first.changed());
    let before = std::fs::metadata(&dst).unwrap().modified().unwrap();

    let second = transfer.put(&path(&dir, "src.txt"), &conn, &dst).await.unwrap();
    assert_eq!(second, TransferOutcome::Unchanged);
    let after = std::fs::metadata(&dst).unwrap().modified().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_short_write_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let transfer = FileTransfer::new(&settings());
    let conn = local();
    let dst = path(&dir, "out/partial.txt");

    let mut source: &[u8] = b"only ten b";
    let result = transfer.write_atomic(&conn, &dst, &mut source, 4096).await;

    match result {
        Err(TransferError::SizeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 4096);
            assert_eq!(actual, 10);
        }
        other => panic!("expected size mismatch, got {other:?}"),
    }

    assert!(!dir.path().join("out/partial.txt").exists());
    // Temp artifacts are gone too
    let leftovers = std::fs::read_dir(dir.path().join("out")).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_missing_source() {
    let dir = TempDir::new().unwrap();
    let transfer = FileTransfer::new(&settings());

    assert!(matches!(
        transfer
            .put(&path(&dir, "missing"), &local(), &path(&dir, "dst"))
            .await,
        Err(TransferError::SourceNotFound { .. })
    ));
}

#[tokio::test]
async fn test_directory_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    let transfer = FileTransfer::new(&settings());

    assert!(matches!(
        transfer
            .put(&dir.path().to_string_lossy(), &local(), &path(&dir, "dst"))
            .await,
        Err(TransferError::SourceIsDirectory { .. })
    ));
}

#[tokio::test]
async fn test_put_template_is_idempotent() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("app.conf.hbs"), "listen {{port}}\n").unwrap();
    let renderer = HandlebarsRenderer::new(dir.path());

    let transfer = FileTransfer::new(&settings());
    let conn = local();
    let dst = path(&dir, "etc/app.conf");
    let context = json!({"port": 8080});

    let first = transfer
        .put_template(&renderer, "app.conf.hbs", &context, &conn, &dst)
        .await
        .unwrap();
    assert!(first.changed());
    assert_eq!(std::fs::read_to_string(&dst).unwrap(), "listen 8080\n");

    let second = transfer
        .put_template(&renderer, "app.conf.hbs", &context, &conn, &dst)
        .await
        .unwrap();
    assert_eq!(second, TransferOutcome::Unchanged);
}

#[tokio::test]
async fn test_template_errors_name_the_template() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.hbs"), "{{missing}}").unwrap();
    let renderer = HandlebarsRenderer::new(dir.path());
    let transfer = FileTransfer::new(&settings());

    let err = transfer
        .put_template(&renderer, "broken.hbs", &json!({}), &local(), &path(&dir, "out"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("broken.hbs"));
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_scratch_dir_is_used_for_temp_files() {
    let dir = TempDir::new().unwrap();
    let scratch = path(&dir, "scratch");
    let transfer = FileTransfer::new(&settings().with_scratch_dir(scratch.clone()));

    let outcome = transfer
        .put_content(b"hello", &local(), &path(&dir, "final.txt"))
        .await
        .unwrap();
    assert_eq!(outcome, TransferOutcome::Transferred { bytes: 5 });
    assert_eq!(std::fs::read_to_string(dir.path().join("final.txt")).unwrap(), "hello");
    assert!(std::path::Path::new(&scratch).is_dir());
}
