//! Integration tests for the vss facade

use std::sync::Arc;
use tempfile::TempDir;
use vss::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_store(dir: &TempDir) -> Arc<VssStore> {
    init_tracing();
    let config = StoreConfig::new(dir.path().join("vectors.db"))
        .with_synchronous(SynchronousMode::Full)
        .with_engine(VssConfig::default().with_nprobe(2));
    Arc::new(VssStore::open(config).unwrap())
}

fn seed(store: &VssStore) {
    store
        .execute(|conn| {
            conn.execute_batch(
                "CREATE TABLE articles (id INTEGER PRIMARY KEY, category TEXT NOT NULL);",
            )?;
            create_vss_table(conn, "vss_articles", &[VssColumn::new("embedding", 2)])
        })
        .unwrap();

    store
        .transaction(|tx| {
            let rows = [
                (1000, "[0, 1]", "tech"),
                (1001, "[0, -1]", "sports"),
                (1002, "[1, 0]", "tech"),
                (1003, "[-1, 0]", "sports"),
            ];
            for (id, vector, category) in rows {
                tx.execute(
                    "INSERT INTO articles(id, category) VALUES (?1, ?2)",
                    rusqlite::params![id, category],
                )?;
                tx.execute(
                    "INSERT INTO vss_articles(rowid, embedding) VALUES (?1, ?2)",
                    rusqlite::params![id, vector],
                )?;
            }
            Ok(())
        })
        .unwrap();
}

#[tokio::test]
async fn test_knn_and_range() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    seed(&store);

    let search = VssSearch::new(store.clone(), "vss_articles", "embedding").unwrap();

    let hits = search.knn(&Vector::new(vec![0.9, 0.0]), 5).await.unwrap();
    assert_eq!(hits.len(), 4);
    assert_eq!(hits[0].rowid, 1002);
    assert!((hits[0].distance - 0.01).abs() < 1e-5);
    assert_eq!(hits[3].rowid, 1003);

    let mut hits = search
        .range(&Vector::new(vec![0.5, 0.5]), 1.0)
        .await
        .unwrap();
    hits.sort_by_key(|hit| hit.rowid);
    let ids: Vec<i64> = hits.iter().map(|hit| hit.rowid).collect();
    assert_eq!(ids, vec![1000, 1002]);

    let err = search.knn(&Vector::new(vec![1.0]), 5).await.unwrap_err();
    assert!(err.to_string().contains("1 != 2"), "{err}");
}

#[tokio::test]
async fn test_knn_filtered() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    seed(&store);

    let search = VssSearch::new(store.clone(), "vss_articles", "embedding")
        .unwrap()
        .content_table("articles")
        .unwrap();

    let hits = search
        .knn_filtered(
            &Vector::new(vec![0.9, 0.0]),
            4,
            "t.category = ?",
            vec!["sports".to_string()],
        )
        .await
        .unwrap();
    let ids: Vec<i64> = hits.iter().map(|hit| hit.rowid).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[1], 1003);
    assert!(ids.contains(&1001));
}

#[tokio::test]
async fn test_reopen_keeps_index() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir);
        seed(&store);
    }

    let store = open_store(&dir);
    let search = VssSearch::new(store.clone(), "vss_articles", "embedding").unwrap();
    let hits = search.knn(&Vector::new(vec![-0.9, 0.0]), 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].rowid, 1003);
}

#[tokio::test]
async fn test_async_transaction() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    seed(&store);

    store
        .transaction_async(|tx| {
            tx.execute("DELETE FROM vss_articles WHERE rowid = 1002", [])?;
            Ok(())
        })
        .await
        .unwrap();

    let remaining: i64 = store
        .query_async(|conn| {
            Ok(conn.query_row("SELECT count(*) FROM vss_articles", [], |row| row.get(0))?)
        })
        .await
        .unwrap();
    assert_eq!(remaining, 3);

    let search = VssSearch::new(store.clone(), "vss_articles", "embedding").unwrap();
    let hits = search.knn(&Vector::new(vec![1.0, 0.0]), 1).await.unwrap();
    assert_ne!(hits[0].rowid, 1002);
}

#[tokio::test]
async fn test_ivf_column_from_migration() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store
        .execute(|conn| {
            create_vss_table(
                conn,
                "vss_points",
                &[VssColumn::new("p", 2).factory("IVF2,Flat,IDMap2")?],
            )
        })
        .unwrap();

    let points = [[0.0f32, 0.0], [0.0, 1.0], [10.0, 10.0], [10.0, 11.0]];
    store
        .transaction(|tx| {
            for point in &points {
                tx.execute(
                    "INSERT INTO vss_points(operation, p) VALUES ('training', ?1)",
                    [Vector::new(point.to_vec())],
                )?;
            }
            Ok(())
        })
        .unwrap();
    store
        .transaction(|tx| {
            for (i, point) in points.iter().enumerate() {
                tx.execute(
                    "INSERT INTO vss_points(rowid, p) VALUES (?1, ?2)",
                    rusqlite::params![i as i64 + 1, Vector::new(point.to_vec())],
                )?;
            }
            Ok(())
        })
        .unwrap();

    let search = VssSearch::new(store.clone(), "vss_points", "p").unwrap();
    let hits = search.knn(&Vector::new(vec![10.0, 10.5]), 2).await.unwrap();
    let mut ids: Vec<i64> = hits.iter().map(|hit| hit.rowid).collect();
    ids.sort();
    assert_eq!(ids, vec![3, 4]);
}
