//! Build, persist, reload, and query a shard end to end.

mod common;

use common::sample_records;
use repodex::index::codec::INDEX_ARTIFACT;
use repodex::shard::persistence;
use repodex::{Record, StoreError};

#[tokio::test]
async fn test_build_then_load_preserves_id_bijection() {
    let root = common::temp_root();
    let service = common::test_service(root.path());

    let summary = service
        .build("alpha", sample_records::alpha_history())
        .await
        .expect("build should succeed");
    assert_eq!(summary.documents, 3);

    // The shard directory carries all three mandatory artifacts plus the
    // provenance manifest.
    let dir = persistence::shard_dir(root.path(), "alpha");
    assert!(dir.join(INDEX_ARTIFACT).is_file());
    assert!(dir.join(persistence::MAPPING_ARTIFACT).is_file());
    assert!(dir.join(persistence::DOCSTORE_ARTIFACT).is_file());
    assert!(dir.join(persistence::MANIFEST_ARTIFACT).is_file());

    let shard = persistence::load(root.path(), "alpha", Some("test-hash"))
        .expect("persisted shard should load");
    assert_eq!(shard.count(), 3);

    let mut ids: Vec<&str> = shard.mapping().iter().map(String::as_str).collect();
    ids.sort_unstable();
    assert_eq!(ids, ["a1", "a2", "a3"]);
}

#[tokio::test]
async fn test_single_document_matches_itself_at_distance_zero() {
    let root = common::temp_root();
    let service = common::test_service(root.path());

    service
        .build("solo", vec![Record::new("only", "the one and only document")])
        .await
        .expect("build should succeed");

    let outcome = service
        .search("the one and only document", Some(1), Some("solo"))
        .await
        .expect("search should succeed");

    let hits = &outcome.projects[0].hits;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].external_id, "only");
    assert_eq!(hits[0].distance, 0.0);
}

#[tokio::test]
async fn test_rebuild_with_identical_batch_is_idempotent() {
    let root = common::temp_root();
    let service = common::test_service(root.path());

    service
        .build("alpha", sample_records::alpha_history())
        .await
        .expect("first build should succeed");
    let first = service
        .search("startup crash", Some(3), Some("alpha"))
        .await
        .expect("search should succeed");

    service
        .build("alpha", sample_records::alpha_history())
        .await
        .expect("rebuild should succeed");
    let second = service
        .search("startup crash", Some(3), Some("alpha"))
        .await
        .expect("search should succeed");

    let ranked = |outcome: &repodex::SearchOutcome| -> Vec<(String, f32)> {
        outcome.projects[0]
            .hits
            .iter()
            .map(|hit| (hit.external_id.clone(), hit.distance))
            .collect()
    };
    assert_eq!(ranked(&first), ranked(&second));
}

#[tokio::test]
async fn test_clustered_rebuild_is_stable_under_fixed_seed() {
    let root = common::temp_root();
    let service = common::clustered_test_service(root.path());
    let records = sample_records::numbered("doc", 12);

    let summary = service
        .build("big", records.clone())
        .await
        .expect("first build should succeed");
    assert!(
        summary.variant.starts_with("clustered"),
        "12 records above threshold 8 should cluster, got {}",
        summary.variant
    );
    let first = service
        .search("document number 7", Some(4), Some("big"))
        .await
        .expect("search should succeed");

    service
        .build("big", records)
        .await
        .expect("rebuild should succeed");
    let second = service
        .search("document number 7", Some(4), Some("big"))
        .await
        .expect("search should succeed");

    let ranked = |outcome: &repodex::SearchOutcome| -> Vec<(String, f32)> {
        outcome.projects[0]
            .hits
            .iter()
            .map(|hit| (hit.external_id.clone(), hit.distance))
            .collect()
    };
    assert_eq!(ranked(&first), ranked(&second));
}

#[tokio::test]
async fn test_k_beyond_corpus_returns_all_ranked() {
    let root = common::temp_root();
    let service = common::test_service(root.path());

    service
        .build("alpha", sample_records::alpha_history())
        .await
        .expect("build should succeed");

    let outcome = service
        .search("startup", Some(50), Some("alpha"))
        .await
        .expect("search should succeed");

    let hits = &outcome.projects[0].hits;
    assert_eq!(hits.len(), 3);
    for pair in hits.windows(2) {
        assert!(
            pair[0].distance <= pair[1].distance,
            "results must be ranked ascending by distance"
        );
    }
}

#[tokio::test]
async fn test_startup_crash_query_ranks_related_documents() {
    let root = common::temp_root();
    let service = common::test_service(root.path());

    service
        .build("alpha", sample_records::alpha_history())
        .await
        .expect("build should succeed");

    let outcome = service
        .search("startup crash", Some(2), Some("alpha"))
        .await
        .expect("search should succeed");

    let hits = &outcome.projects[0].hits;
    assert_eq!(hits.len(), 2);
    let mut ids: Vec<&str> = hits.iter().map(|hit| hit.external_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(
        ids,
        ["a1", "a3"],
        "both crash documents rank ahead of the dark mode one"
    );
}

#[tokio::test]
async fn test_persisted_shard_serves_a_fresh_service() {
    let root = common::temp_root();
    {
        let service = common::test_service(root.path());
        service
            .build("beta", sample_records::beta_history())
            .await
            .expect("build should succeed");
    }

    // A new service over the same root finds the shard on disk.
    let service = common::test_service(root.path());
    assert_eq!(service.list_projects(), ["beta"]);

    let outcome = service
        .search("auth token", Some(1), Some("beta"))
        .await
        .expect("search should load the persisted shard");
    assert_eq!(outcome.projects[0].hits[0].external_id, "b1");
}

#[tokio::test]
async fn test_get_document_round_trips_content_and_metadata() {
    let root = common::temp_root();
    let service = common::test_service(root.path());

    service
        .build("alpha", sample_records::alpha_history())
        .await
        .expect("build should succeed");

    let doc = service
        .get_document("alpha", "a2")
        .await
        .expect("document should exist");
    assert_eq!(doc.content, "add dark mode");
    assert_eq!(
        doc.metadata.get("kind").map(String::as_str),
        Some("pull_request")
    );

    let err = service
        .get_document("alpha", "a9")
        .await
        .expect_err("unknown id should fail");
    assert!(matches!(err, StoreError::DocumentNotFound { .. }));
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let root = common::temp_root();
    let service = common::test_service(root.path());

    let err = service
        .build("empty", Vec::new())
        .await
        .expect_err("empty batch must not build");
    assert!(matches!(err, StoreError::NoDocuments { .. }));
}
