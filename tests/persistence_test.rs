mod common;

use anyhow::Result;
use common::{Trio, db_path, parse_date, test_service};
use splitledger::application::{AppError, LedgerService};
use splitledger::domain::{BillDraft, IntegrityError, Share};
use splitledger::storage::{BillStore, Repository};

#[tokio::test]
async fn test_ledger_survives_reconnect() -> Result<()> {
    let (service, temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    let bill = service
        .create_bill(
            t.group,
            BillDraft::split_evenly(t.a, 1000, &[t.c, t.b, t.a])?
                .with_timestamp(parse_date("2024-03-01"))
                .with_description("Groceries"),
        )
        .await?;
    let before = service.get_balances(t.group).await?;
    drop(service);

    let service = LedgerService::connect(&db_path(&temp)).await?;
    let group = service.find_group("Trip").await?;
    assert_eq!(group.id, t.group);
    assert_eq!(service.get_balances(t.group).await?, before);

    let loaded = service.get_bill(bill.id).await?;
    assert_eq!(loaded.shares, bill.shares);
    assert_eq!(loaded.shares[0], Share::new(t.c, 334));
    assert_eq!(loaded.timestamp, parse_date("2024-03-01"));
    assert_eq!(loaded.description.as_deref(), Some("Groceries"));
    assert_eq!(service.list_members(t.group).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_bills_listed_oldest_first() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    for date in ["2024-05-03", "2024-05-01", "2024-05-02"] {
        service
            .create_bill(
                t.group,
                BillDraft::new(t.a, 100, vec![Share::new(t.b, 100)])
                    .with_timestamp(parse_date(date)),
            )
            .await?;
    }

    let dates: Vec<String> = service
        .list_bills(t.group)
        .await?
        .iter()
        .map(|b| b.timestamp.format("%Y-%m-%d").to_string())
        .collect();
    assert_eq!(dates, vec!["2024-05-01", "2024-05-02", "2024-05-03"]);
    Ok(())
}

#[tokio::test]
async fn test_external_change_needs_notification() -> Result<()> {
    let (service, temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    let first = service.snapshot(t.group).await?;
    assert!(first.settlements.is_empty());

    // Another process writes to the same database
    let other = LedgerService::connect(&db_path(&temp)).await?;
    other
        .create_bill(t.group, BillDraft::new(t.a, 500, vec![Share::new(t.b, 500)]))
        .await?;

    // Still the cached view until notified
    let cached = service.snapshot(t.group).await?;
    assert_eq!(cached.revision, first.revision);
    assert!(cached.settlements.is_empty());

    service.on_bill_changed(t.group).await?;
    let fresh = service.snapshot(t.group).await?;
    assert!(fresh.revision > first.revision);
    assert_eq!(fresh.settlements.len(), 1);
    assert_eq!(t.balance_of(&service, t.a).await?, 500);
    Ok(())
}

#[tokio::test]
async fn test_corrupted_bill_is_reported() -> Result<()> {
    let (service, temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;

    // Written straight to the store, bypassing validation
    let repo = Repository::connect(&format!("sqlite:{}", db_path(&temp))).await?;
    let bad = BillDraft::new(t.a, 100, vec![Share::new(t.b, 90)]).into_bill(t.group);
    repo.save_bill(&bad).await?;
    service.on_bill_changed(t.group).await?;

    let err = service.get_balances(t.group).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Integrity(IntegrityError::ConservationViolated { sum: 10, .. })
    ));
    assert!(!err.is_client_error());

    let report = service.check_integrity(t.group).await?;
    assert_eq!(report.bill_count, 1);
    assert_eq!(report.balance_sum, 10);
    assert!(!report.is_balanced());
    assert!(!report.is_healthy());

    // Repairing the bill clears the error
    service
        .update_bill(bad.id, BillDraft::new(t.a, 100, vec![Share::new(t.b, 100)]))
        .await?;
    assert_eq!(t.balance_of(&service, t.b).await?, -100);
    assert!(service.check_integrity(t.group).await?.is_healthy());
    Ok(())
}

#[tokio::test]
async fn test_unknown_ids() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let missing = uuid::Uuid::new_v4();

    assert!(matches!(
        service.get_balances(missing).await,
        Err(AppError::GroupNotFound(_))
    ));
    assert!(matches!(
        service.get_bill(missing).await,
        Err(AppError::BillNotFound(_))
    ));
    assert!(matches!(
        service.find_group("Nowhere").await,
        Err(AppError::GroupNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_revision_is_local_to_a_service_instance() -> Result<()> {
    let (service, temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    assert_eq!(service.revision(t.group).await?, 3);

    let other = LedgerService::connect(&db_path(&temp)).await?;
    assert_eq!(other.revision(t.group).await?, 0);
    assert_eq!(
        other.get_balances(t.group).await?,
        service.get_balances(t.group).await?
    );
    Ok(())
}
