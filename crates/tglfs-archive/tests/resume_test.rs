//! Integration test: interrupted stores resume without gaps or duplicates

mod common;

use std::sync::Arc;

use common::*;
use tempfile::TempDir;

use tglfs_core::config::DownloadStrategy;
use tglfs_core::TglfsError;

#[tokio::test]
async fn interrupted_store_resumes_from_first_gap() {
    let tmp = TempDir::new().unwrap();
    let mailbox = memory_mailbox();
    let config = test_config(CHUNK, DownloadStrategy::PerChunk);
    let original = make_data(CHUNK as usize * 5);
    let src = write_test_file(tmp.path(), "big.iso", &original);
    let pw = password("x");

    // Channel dies after two sends
    let flaky = Arc::new(FlakyChannel::new(mailbox.clone(), "send", 2));
    let interrupted = archive_over(flaky, &tmp, config.clone());
    let err = interrupted.store(&src, Some(&pw), None).await.unwrap_err();
    match &err {
        TglfsError::Channel { operation, detail } => {
            assert_eq!(*operation, "send");
            assert!(detail.contains("chunk 3/5"), "failing index reported: {detail}");
        }
        other => panic!("expected channel error, got {other}"),
    }
    assert!(err.is_resumable());
    assert!(scratch_is_empty(&tmp), "staged chunk removed on failure");

    let archive = archive_over(mailbox, &tmp, config);
    let listed = archive.lookup("big.iso", None).await.unwrap();
    let partial = listed.files.values().next().expect("partial file listed");
    assert_eq!(partial.missing_indices(), vec![3, 4, 5]);

    let resumed = archive.store(&src, Some(&pw), None).await.unwrap();
    assert_eq!(resumed.uploaded, 3);
    assert_eq!(resumed.resumed_from, Some(3));
    assert!(resumed.record.is_complete());
    assert_eq!(resumed.record.duplicates, 0);

    // Storing again is a no-op
    let again = archive.store(&src, Some(&pw), None).await.unwrap();
    assert_eq!(again.uploaded, 0);
    assert_eq!(again.resumed_from, None);

    let record = archive
        .lookup(resumed.record.fingerprint.as_str(), None)
        .await
        .unwrap()
        .get(&resumed.record.fingerprint)
        .cloned()
        .unwrap();
    assert_eq!(record.present.len(), 5);
    assert_eq!(record.duplicates, 0);
    record.verify_complete().unwrap();

    let dst = tmp.path().join("big.out");
    archive
        .retrieve(&record.fingerprint, &dst, Some(&pw), None)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dst).unwrap(), original);
}

#[tokio::test]
async fn resume_fills_interior_gaps() {
    use futures::TryStreamExt;
    use tglfs_archive::caption;
    use tglfs_channel::Channel;

    let tmp = TempDir::new().unwrap();
    let mailbox = memory_mailbox();
    let archive = archive_over(
        mailbox.clone(),
        &tmp,
        test_config(CHUNK, DownloadStrategy::SingleSweep),
    );
    let src = write_test_file(tmp.path(), "holes.bin", &make_data(CHUNK as usize * 4));
    let fp = archive.store(&src, None, None).await.unwrap().record.fingerprint;

    // Lose chunk 2 only; chunks 3 and 4 remain
    let query = caption::chunk_query(&fp, 2, 4, "holes.bin");
    let hits: Vec<_> = mailbox.search("me", &query).await.unwrap().try_collect().await.unwrap();
    mailbox.delete(&hits[0].handle).await.unwrap();

    let resumed = archive.store(&src, None, None).await.unwrap();
    assert_eq!(resumed.uploaded, 1);
    assert_eq!(resumed.resumed_from, Some(2));
    assert!(resumed.record.is_complete());
}

#[tokio::test]
async fn changed_chunk_size_is_inconsistent() {
    let tmp = TempDir::new().unwrap();
    let mailbox = memory_mailbox();
    let src = write_test_file(tmp.path(), "resized.bin", &make_data(4000));

    let before = archive_over(
        mailbox.clone(),
        &tmp,
        test_config(CHUNK, DownloadStrategy::PerChunk),
    );
    before.store(&src, None, None).await.unwrap();

    let after = archive_over(
        mailbox,
        &tmp,
        test_config(CHUNK / 2, DownloadStrategy::PerChunk),
    );
    let err = after.store(&src, None, None).await.unwrap_err();
    assert!(matches!(err, TglfsError::Consistency { .. }), "got {err}");
}

#[tokio::test]
async fn divergent_chunk_counts_block_retrieve() {
    use tglfs_archive::caption;
    use tglfs_channel::Channel;

    let tmp = TempDir::new().unwrap();
    let mailbox = memory_mailbox();
    let archive = archive_over(
        mailbox.clone(),
        &tmp,
        test_config(CHUNK, DownloadStrategy::PerChunk),
    );
    let src = write_test_file(tmp.path(), "mixed.bin", &make_data(2000));
    let fp = archive.store(&src, None, None).await.unwrap().record.fingerprint;

    // A stray chunk claiming a different count
    let stray = caption::encode(&fp, 1, 9, "mixed.bin").unwrap();
    let attachment = write_test_file(tmp.path(), "stray", b"junk");
    mailbox.send("me", &stray, &attachment).await.unwrap();

    let listed = archive.lookup("mixed.bin", None).await.unwrap();
    let record = listed.get(&fp).unwrap();
    assert!(!record.divergent_counts.is_empty());
    assert!(matches!(record.verify_complete(), Err(TglfsError::Consistency { .. })));

    let dst = tmp.path().join("mixed.out");
    let err = archive.retrieve(&fp, &dst, None, None).await.unwrap_err();
    assert!(matches!(err, TglfsError::Consistency { .. }), "got {err}");
    assert!(!dst.exists());
}
