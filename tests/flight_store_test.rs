mod common;

use common::*;

use chrono::{Duration, Utc};
use farehound::deals_repo::DealsRepository;
use farehound::flights_repo::FlightsRepository;

#[tokio::test]
async fn upserting_the_same_leg_twice_is_idempotent() {
    let test_db = TestDatabase::new().unwrap();
    let pool = test_db.pool();
    let repo = FlightsRepository::new(pool.clone());

    let first = insert_leg(&pool, leg("PSA", "BCN", at(2025, 7, 4, 18, 0), 30.0))
        .await
        .unwrap();
    let second = insert_leg(&pool, leg("PSA", "BCN", at(2025, 7, 4, 18, 0), 27.5))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    assert_eq!(repo.count().await.unwrap(), 1);
    let stored = repo.get_by_id(&first.id).await.unwrap().unwrap();
    assert_eq!(stored.price, 27.5);
}

#[tokio::test]
async fn stored_leg_reads_back_with_rounded_price() {
    let test_db = TestDatabase::new().unwrap();
    let pool = test_db.pool();
    let repo = FlightsRepository::new(pool.clone());

    let record = insert_leg(&pool, leg("PSA", "BCN", at(2025, 7, 4, 18, 30), 29.999))
        .await
        .unwrap();
    let stored = repo.get_by_id(&record.id).await.unwrap().unwrap();

    assert_eq!(stored, record);
    assert_eq!(stored.price, 30.0);
    assert_eq!(stored.origin, "PSA");
    assert_eq!(stored.destination, "BCN");
    assert_eq!(stored.departure_time, at(2025, 7, 4, 18, 30));
    assert_eq!(stored.party_size, 1);
}

#[tokio::test]
async fn delete_stale_only_removes_old_rows() {
    let test_db = TestDatabase::new().unwrap();
    let pool = test_db.pool();
    let repo = FlightsRepository::new(pool.clone());

    let now = Utc::now().naive_utc();
    let fresh = leg("PSA", "BCN", at(2025, 7, 4, 18, 0), 30.0).into_record(now);
    let stale = leg("PSA", "GRO", at(2025, 7, 5, 9, 0), 20.0)
        .into_record(now - Duration::hours(48));
    repo.upsert_legs(vec![fresh.clone(), stale]).await.unwrap();

    let deleted = repo.delete_stale(now - Duration::hours(24)).await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(repo.count().await.unwrap(), 1);
    assert!(repo.get_by_id(&fresh.id).await.unwrap().is_some());
}

#[tokio::test]
async fn orphaned_deals_are_reconciled() {
    let test_db = TestDatabase::new().unwrap();
    let pool = test_db.pool();

    insert_leg(&pool, leg("PSA", "BCN", at(2025, 7, 4, 18, 0), 30.0))
        .await
        .unwrap();
    let inbound = insert_leg(&pool, leg("BCN", "PSA", at(2025, 7, 6, 16, 0), 30.0))
        .await
        .unwrap();
    let profile = create_profile(&pool, weekend_profile("orphans")).await.unwrap();

    matcher(&pool, 100.0).run(&profile, &[]).await.unwrap();
    let deals_repo = DealsRepository::new(pool.clone());
    assert_eq!(deals_repo.list_for_profile(profile.id).await.unwrap().len(), 1);

    // Simulate the pruner racing ahead of the matcher: the leg disappears,
    // the deal row briefly points at nothing.
    FlightsRepository::new(pool.clone())
        .delete_by_id(&inbound.id)
        .await
        .unwrap();

    // The joined view skips the orphan defensively even before reconciliation.
    assert!(deals_repo.list_views(profile.id).await.unwrap().is_empty());

    let pruned = deals_repo.prune_orphans().await.unwrap();
    assert_eq!(pruned, 1);
    assert!(deals_repo.list_for_profile(profile.id).await.unwrap().is_empty());
}
