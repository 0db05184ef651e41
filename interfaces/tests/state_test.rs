use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use interfaces::{TrainingLog, TrainingRow};

fn row(id: &str, hours_old: f64) -> TrainingRow {
    let mut features = BTreeMap::new();
    features.insert("hours_old".to_string(), hours_old);
    features.insert("sec_8k".to_string(), 1.0);
    TrainingRow {
        id: id.to_string(),
        features,
        label: None,
    }
}

#[tokio::test]
async fn test_append_ignores_known_ids() -> Result<()> {
    let log = TrainingLog::in_memory().await?;

    assert_eq!(log.append_rows(&[row("a", 1.0), row("b", 2.0)]).await?, 2);
    assert_eq!(log.append_rows(&[row("b", 9.0), row("c", 3.0)]).await?, 1);
    assert_eq!(log.append_rows(&[]).await?, 0);

    let rows = log.rows().await?;
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    // the first write for an id wins
    assert_eq!(rows[1].features["hours_old"], 2.0);
    assert!(rows.iter().all(|r| r.label.is_none()));
    Ok(())
}

#[tokio::test]
async fn test_labels_survive_reappend() -> Result<()> {
    let log = TrainingLog::in_memory().await?;
    assert_eq!(log.label_positives(&HashSet::new()).await?, 0.0);

    log.append_rows(&[row("a", 1.0), row("b", 2.0), row("c", 3.0), row("d", 4.0)])
        .await?;
    let positives: HashSet<String> = ["a", "c", "unknown"].iter().map(|s| s.to_string()).collect();
    let rate = log.label_positives(&positives).await?;
    assert!((rate - 0.5).abs() < 1e-9);

    log.append_rows(&[row("a", 7.0)]).await?;
    let labels: Vec<Option<bool>> = log.rows().await?.into_iter().map(|r| r.label).collect();
    assert_eq!(labels, vec![Some(true), Some(false), Some(true), Some(false)]);
    Ok(())
}

#[tokio::test]
async fn test_open_persists_to_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("training_events.db");

    let log = TrainingLog::open(&path).await?;
    log.append_rows(&[row("a", 1.0)]).await?;
    log.close().await;

    let reopened = TrainingLog::open(&path).await?;
    assert_eq!(reopened.rows().await?.len(), 1);
    reopened.close().await;
    Ok(())
}
