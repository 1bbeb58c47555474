mod common;

use anyhow::Result;
use common::{Trio, test_service};
use splitledger::application::{AppError, LedgerService};
use splitledger::domain::{BillDraft, Settlement, Share, ValidationError};

/// A pays 300 split evenly, then 250 owed by B (50) and C (200).
async fn record_trip(service: &LedgerService, t: &Trio) -> Result<()> {
    service
        .create_bill(t.group, BillDraft::split_evenly(t.a, 300, &[t.a, t.b, t.c])?)
        .await?;
    service
        .create_bill(
            t.group,
            BillDraft::new(t.a, 250, vec![Share::new(t.b, 50), Share::new(t.c, 200)]),
        )
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_three_member_scenario() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    record_trip(&service, &t).await?;

    assert_eq!(t.balance_of(&service, t.a).await?, 450);
    assert_eq!(t.balance_of(&service, t.b).await?, -150);
    assert_eq!(t.balance_of(&service, t.c).await?, -300);

    let sum: i64 = service.get_balances(t.group).await?.iter().map(|b| b.amount).sum();
    assert_eq!(sum, 0);

    let settlements = service.get_settlements(t.group).await?;
    assert_eq!(
        settlements,
        vec![
            Settlement {
                from_member_id: t.c,
                to_member_id: t.a,
                amount: 300
            },
            Settlement {
                from_member_id: t.b,
                to_member_id: t.a,
                amount: 150
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_share_sum_must_match_total() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Dinner").await?;

    let short = BillDraft::new(t.a, 900, vec![Share::new(t.b, 450), Share::new(t.c, 449)]);
    let err = service.create_bill(t.group, short).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Validation(ValidationError::ShareSumMismatch {
            total: 900,
            share_sum: 899
        })
    ));
    assert!(service.list_bills(t.group).await?.is_empty());
    assert_eq!(service.revision(t.group).await?, 3);

    let exact = BillDraft::new(t.a, 900, vec![Share::new(t.b, 450), Share::new(t.c, 450)]);
    service.create_bill(t.group, exact).await?;
    assert_eq!(service.list_bills(t.group).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_bill_for_non_member_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Flat").await?;
    let other = Trio::create(&service, "Other").await?;

    let draft = BillDraft::new(t.a, 100, vec![Share::new(other.b, 100)]);
    let err = service.create_bill(t.group, draft).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Validation(ValidationError::UnknownMember(id)) if id == other.b
    ));
    Ok(())
}

fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let first = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, first);
            result.push(tail);
        }
    }
    result
}

#[tokio::test]
async fn test_balances_do_not_depend_on_bill_order() -> Result<()> {
    let orders = permutations(&[0, 1, 2, 3]);
    assert_eq!(orders.len(), 24);

    let mut outcomes = Vec::new();
    for order in orders {
        let service = LedgerService::in_memory();
        let t = Trio::create(&service, "Trip").await?;
        let drafts = [
            BillDraft::split_evenly(t.a, 1000, &[t.a, t.b, t.c])?,
            BillDraft::new(t.b, 450, vec![Share::new(t.c, 450)]),
            BillDraft::split_weighted(t.c, 700, &[(t.a, 1), (t.b, 2), (t.c, 4)])?,
            BillDraft::new(t.a, 125, vec![Share::new(t.b, 100), Share::new(t.a, 25)]),
        ];
        for i in order {
            service.create_bill(t.group, drafts[i].clone()).await?;
        }

        let mut balances = Vec::new();
        for m in [t.a, t.b, t.c] {
            balances.push(t.balance_of(&service, m).await?);
        }
        let settled: Vec<i64> = service
            .get_settlements(t.group)
            .await?
            .iter()
            .map(|s| s.amount)
            .collect();
        outcomes.push((balances, settled));
    }

    assert_eq!(outcomes[0].0, vec![666, -183, -483]);
    assert!(outcomes.iter().all(|o| *o == outcomes[0]));
    Ok(())
}

#[tokio::test]
async fn test_update_and_delete_bill() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    let bill = service
        .create_bill(t.group, BillDraft::split_evenly(t.a, 300, &[t.b, t.c])?)
        .await?;
    assert_eq!(t.balance_of(&service, t.a).await?, 300);

    let updated = service
        .update_bill(bill.id, BillDraft::new(t.b, 300, vec![Share::new(t.c, 300)]))
        .await?;
    assert_eq!(updated.id, bill.id);
    assert_eq!(updated.recorded_at, bill.recorded_at);
    assert_eq!(service.get_bill(bill.id).await?.recorded_at, bill.recorded_at);
    assert_eq!(t.balance_of(&service, t.a).await?, 0);
    assert_eq!(t.balance_of(&service, t.b).await?, 300);
    assert_eq!(service.get_bill(bill.id).await?.payer, t.b);

    // An invalid replacement keeps the old bill
    let bad = BillDraft::new(t.b, 300, vec![Share::new(t.c, 299)]);
    assert!(service.update_bill(bill.id, bad).await.is_err());
    assert_eq!(t.balance_of(&service, t.b).await?, 300);

    service.delete_bill(bill.id).await?;
    assert!(service.get_balances(t.group).await?.iter().all(|b| b.amount == 0));
    assert!(matches!(
        service.delete_bill(bill.id).await,
        Err(AppError::BillNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_payments_settle_the_group() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    record_trip(&service, &t).await?;

    for s in service.get_settlements(t.group).await? {
        service
            .record_payment(t.group, s.from_member_id, s.to_member_id, s.amount)
            .await?;
    }

    assert!(service.get_balances(t.group).await?.iter().all(|b| b.amount == 0));
    assert!(service.get_settlements(t.group).await?.is_empty());
    assert_eq!(service.list_bills(t.group).await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_member_removal_rules() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;
    let d = service.add_member(t.group, "D".into()).await?;
    service
        .create_bill(t.group, BillDraft::new(t.a, 100, vec![Share::new(t.b, 100)]))
        .await?;

    // Outstanding balance
    assert!(matches!(
        service.remove_member(t.group, t.b).await,
        Err(AppError::Validation(ValidationError::MemberHasBalance { balance: -100, .. }))
    ));

    // Settled, but still referenced by bills
    service.record_payment(t.group, t.b, t.a, 100).await?;
    assert!(matches!(
        service.remove_member(t.group, t.b).await,
        Err(AppError::Validation(ValidationError::MemberReferenced { bills: 2, .. }))
    ));

    // Never involved: removable
    service.remove_member(t.group, d.id).await?;
    assert_eq!(service.list_members(t.group).await?.len(), 3);
    assert!(matches!(
        service.find_member(t.group, "D").await,
        Err(AppError::MemberNotFound(_))
    ));

    // A removed member can't take part in new bills
    let draft = BillDraft::new(t.a, 100, vec![Share::new(d.id, 100)]);
    assert!(matches!(
        service.create_bill(t.group, draft).await,
        Err(AppError::Validation(ValidationError::UnknownMember(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_names_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let t = Trio::create(&service, "Trip").await?;

    assert!(matches!(
        service.create_group("Trip".into(), "EUR".into()).await,
        Err(AppError::GroupAlreadyExists(_))
    ));
    assert!(matches!(
        service.add_member(t.group, "A".into()).await,
        Err(AppError::MemberAlreadyExists(_))
    ));
    Ok(())
}
