//! SQLite repository integration tests.

#[cfg(test)]
mod tests {
    use billing_types::{
        Amount, BillingRepository, CashDetails, ClickDetails, Currency, DetailsFieldFilter,
        DomainError, FindParams, Gateway, OctoDetails, PaymeDetails, RepoError, SortOrder, Status,
        StripeDetails, TenantId, Transaction, TransactionDetails, TransactionId,
    };
    use serde_json::json;

    use crate::SqliteRepo;

    async fn setup_repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:").await.unwrap()
    }

    fn click_tx(tenant: TenantId, merchant_trans_id: &str, quantity: i64) -> Transaction {
        Transaction::new(
            tenant,
            Amount::new(quantity, Currency::UZS).unwrap(),
            Gateway::Click,
            ClickDetails::new(merchant_trans_id).into(),
        )
        .unwrap()
    }

    fn payme_tx(tenant: TenantId, order_id: &str, time: i64) -> Transaction {
        Transaction::new(
            tenant,
            Amount::new(5_000, Currency::UZS).unwrap(),
            Gateway::Payme,
            PaymeDetails::new(order_id)
                .with_account_entry("order_id", json!(order_id))
                .with_time(time)
                .into(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get_by_id() {
        let repo = setup_repo().await;
        let tx = click_tx(TenantId::new(), "INV-1", 10_000);

        repo.save(&tx).await.unwrap();
        let fetched = repo.get_by_id(tx.id()).await.unwrap().unwrap();

        assert_eq!(fetched.id(), tx.id());
        assert_eq!(fetched.tenant_id(), tx.tenant_id());
        assert_eq!(fetched.amount(), tx.amount());
        assert_eq!(fetched.status(), Status::Pending);
        assert_eq!(fetched.details(), tx.details());
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let repo = setup_repo().await;
        let result = repo.get_by_id(TransactionId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_details_decoded_by_gateway() {
        let repo = setup_repo().await;
        let tx = Transaction::new(
            TenantId::new(),
            Amount::new(700, Currency::USD).unwrap(),
            Gateway::Cash,
            CashDetails::default()
                .with_entry("receipt", json!("R-9"))
                .into(),
        )
        .unwrap();
        repo.save(&tx).await.unwrap();

        let fetched = repo.get_by_id(tx.id()).await.unwrap().unwrap();
        match fetched.details() {
            TransactionDetails::Cash(cash) => assert_eq!(cash.get("receipt"), Some(&json!("R-9"))),
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_persists_status_and_details() {
        let repo = setup_repo().await;
        let mut tx = click_tx(TenantId::new(), "INV-2", 10_000);
        repo.save(&tx).await.unwrap();

        let details = tx
            .details()
            .as_click()
            .unwrap()
            .clone()
            .with_payment_id(42)
            .with_merchant_prepare_id(1_700_000_000);
        tx.set_details(details.into()).unwrap();
        tx.transition(Status::Completed).unwrap();
        repo.save(&tx).await.unwrap();

        let fetched = repo.get_by_id(tx.id()).await.unwrap().unwrap();
        assert_eq!(fetched.status(), Status::Completed);
        let click = fetched.details().as_click().unwrap();
        assert_eq!(click.payment_id, Some(42));
        assert_eq!(click.merchant_prepare_id, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_save_rejects_backward_transition() {
        let repo = setup_repo().await;
        let mut tx = click_tx(TenantId::new(), "INV-3", 100);
        let stale = tx.clone();
        repo.save(&tx).await.unwrap();

        tx.transition(Status::Completed).unwrap();
        repo.save(&tx).await.unwrap();

        // A stale copy still says Pending; writing it would move the row back.
        let result = repo.save(&stale).await;
        assert!(matches!(
            result,
            Err(RepoError::Domain(DomainError::InvalidTransition {
                from: Status::Completed,
                to: Status::Pending
            }))
        ));

        let fetched = repo.get_by_id(tx.id()).await.unwrap().unwrap();
        assert_eq!(fetched.status(), Status::Completed);
    }

    #[tokio::test]
    async fn test_replayed_save_is_noop() {
        let repo = setup_repo().await;
        let mut tx = click_tx(TenantId::new(), "INV-4", 100);
        tx.transition(Status::Completed).unwrap();
        repo.save(&tx).await.unwrap();
        repo.save(&tx).await.unwrap();

        let count = repo.count(&FindParams::default()).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_stale_copies_cannot_both_refund() {
        let repo = setup_repo().await;
        let mut tx = Transaction::new(
            TenantId::new(),
            Amount::new(10_000, Currency::USD).unwrap(),
            Gateway::Cash,
            CashDetails::default().into(),
        )
        .unwrap();
        tx.transition(Status::Completed).unwrap();
        repo.save(&tx).await.unwrap();

        let mut first = repo.get_by_id(tx.id()).await.unwrap().unwrap();
        let mut second = repo.get_by_id(tx.id()).await.unwrap().unwrap();
        let part = Amount::new(6_000, Currency::USD).unwrap();
        first.apply_refund(part).unwrap();
        second.apply_refund(part).unwrap();

        let saved = repo.save(&first).await.unwrap();
        assert_eq!(saved.version(), first.version() + 1);
        assert!(matches!(repo.save(&second).await, Err(RepoError::Conflict(_))));

        let fetched = repo.get_by_id(tx.id()).await.unwrap().unwrap();
        assert_eq!(fetched.status(), Status::PartiallyRefunded);
        assert_eq!(fetched.refunded(), part);
        assert_eq!(fetched.version(), saved.version());
    }

    #[tokio::test]
    async fn test_saved_value_can_be_saved_again() {
        let repo = setup_repo().await;
        let tx = click_tx(TenantId::new(), "INV-6", 100);
        let mut saved = repo.save(&tx).await.unwrap();
        for _ in 0..3 {
            saved.touch();
            saved = repo.save(&saved).await.unwrap();
        }
        assert_eq!(saved.version(), 3);
    }

    #[tokio::test]
    async fn test_deleted_row_is_not_recreated_by_stale_save() {
        let repo = setup_repo().await;
        let tx = click_tx(TenantId::new(), "INV-7", 100);
        let saved = repo.save(&tx).await.unwrap();
        let saved = repo.save(&saved).await.unwrap();
        repo.delete(tx.id()).await.unwrap();

        assert!(matches!(repo.save(&saved).await, Err(RepoError::NotFound)));
        assert!(repo.get_by_id(tx.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_click_merchant_trans_id_is_rejected() {
        let repo = setup_repo().await;
        repo.save(&click_tx(TenantId::new(), "INV-8", 100)).await.unwrap();

        let result = repo.save(&click_tx(TenantId::new(), "INV-8", 100)).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));
        assert_eq!(repo.count(&FindParams::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_stripe_invoice_is_rejected() {
        let repo = setup_repo().await;
        let stripe_tx = |invoice: Option<&str>| {
            let mut details = StripeDetails::new("ref");
            if let Some(id) = invoice {
                details = details.with_invoice(id, None);
            }
            Transaction::new(
                TenantId::new(),
                Amount::new(4_900, Currency::USD).unwrap(),
                Gateway::Stripe,
                details.into(),
            )
            .unwrap()
        };

        repo.save(&stripe_tx(Some("in_1"))).await.unwrap();
        let result = repo.save(&stripe_tx(Some("in_1"))).await;
        assert!(matches!(result, Err(RepoError::Conflict(_))));

        // Transactions without an invoice yet are not constrained.
        repo.save(&stripe_tx(None)).await.unwrap();
        repo.save(&stripe_tx(None)).await.unwrap();
        assert_eq!(repo.count(&FindParams::default()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_boolean_fields_compare_as_true_and_false() {
        let repo = setup_repo().await;
        let tx = Transaction::new(
            TenantId::new(),
            Amount::new(1_000, Currency::UZS).unwrap(),
            Gateway::Octo,
            OctoDetails::new("S-1").with_flags(true, false).into(),
        )
        .unwrap();
        repo.save(&tx).await.unwrap();

        for (field, value, expected) in [
            ("auto_capture", "true", 1),
            ("test", "false", 1),
            ("auto_capture", "1", 0),
            ("test", "0", 0),
        ] {
            let found = repo
                .get_by_details_fields(Gateway::Octo, &[DetailsFieldFilter::equal([field], value)])
                .await
                .unwrap();
            assert_eq!(found.len(), expected, "{field} = {value}");
        }
    }

    #[tokio::test]
    async fn test_lookup_by_details_field() {
        let repo = setup_repo().await;
        let tenant = TenantId::new();
        let wanted = click_tx(tenant, "INV-10", 100);
        repo.save(&wanted).await.unwrap();
        repo.save(&click_tx(tenant, "INV-11", 100)).await.unwrap();

        let found = repo
            .get_by_details_fields(
                Gateway::Click,
                &[DetailsFieldFilter::equal(["merchant_trans_id"], "INV-10")],
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), wanted.id());
    }

    #[tokio::test]
    async fn test_lookup_is_scoped_to_gateway() {
        let repo = setup_repo().await;
        repo.save(&click_tx(TenantId::new(), "SHARED", 100))
            .await
            .unwrap();

        let found = repo
            .get_by_details_fields(
                Gateway::Payme,
                &[DetailsFieldFilter::equal(["merchant_trans_id"], "SHARED")],
            )
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_nested_path_and_between() {
        let repo = setup_repo().await;
        let tenant = TenantId::new();
        repo.save(&payme_tx(tenant, "7", 1_000)).await.unwrap();
        repo.save(&payme_tx(tenant, "8", 5_000)).await.unwrap();

        let by_account = repo
            .get_by_details_fields(
                Gateway::Payme,
                &[DetailsFieldFilter::equal(["account", "order_id"], "8")],
            )
            .await
            .unwrap();
        assert_eq!(by_account.len(), 1);

        let in_range = repo
            .get_by_details_fields(
                Gateway::Payme,
                &[DetailsFieldFilter::between(["time"], 0, 2_000)],
            )
            .await
            .unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].details().as_payme().unwrap().time, 1_000);
    }

    #[tokio::test]
    async fn test_lookup_rejects_unsafe_path() {
        let repo = setup_repo().await;
        let result = repo
            .get_by_details_fields(
                Gateway::Click,
                &[DetailsFieldFilter::equal(["x') OR 1=1 --"], "x")],
            )
            .await;
        assert!(matches!(result, Err(RepoError::Domain(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = setup_repo().await;
        let tx = click_tx(TenantId::new(), "INV-5", 100);
        repo.save(&tx).await.unwrap();

        assert!(repo.delete(tx.id()).await.unwrap());
        assert!(!repo.delete(tx.id()).await.unwrap());
        assert!(repo.get_by_id(tx.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_and_paginate() {
        let repo = setup_repo().await;
        let tenant = TenantId::new();
        for i in 0..5 {
            repo.save(&click_tx(tenant, &format!("P-{i}"), 100))
                .await
                .unwrap();
        }
        repo.save(&click_tx(TenantId::new(), "OTHER", 100))
            .await
            .unwrap();

        let params = FindParams {
            tenant_id: Some(tenant),
            limit: 2,
            offset: 0,
            sort: SortOrder::Asc,
            ..Default::default()
        };
        assert_eq!(repo.count(&params).await.unwrap(), 5);

        let first = repo.get_paginated(&params).await.unwrap();
        let second = repo
            .get_paginated(&FindParams {
                offset: 2,
                ..params.clone()
            })
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_ne!(first[0].id(), second[0].id());

        let pending_click = FindParams {
            gateway: Some(Gateway::Click),
            status: Some(Status::Completed),
            ..Default::default()
        };
        assert_eq!(repo.count(&pending_click).await.unwrap(), 0);
    }
}
