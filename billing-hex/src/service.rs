//! Billing Application Service
//!
//! Orchestrates provider calls, persistence, event publication and outward
//! callbacks. Every write goes through the repository's `save`, and events
//! are published only after that write has returned.

use std::sync::Arc;

use tokio::sync::RwLock;

use billing_types::{
    Amount, AppError, BillingEvent, BillingRepository, CallbackError, CancelCommand,
    CreateTransactionCommand, DetailsFieldFilter, EventPublisher, FindParams, Gateway,
    LookupError, Operation, ProviderError, RefundCommand, Status, TenantId, Transaction,
    TransactionCallback, TransactionId, UpdateLocalCommand,
};

use crate::outbound::{Provider, ProviderRegistry};

/// Upper bound on a listing page.
pub const MAX_PAGE_SIZE: i64 = 200;

/// Application service for billing operations.
///
/// Generic over `R: BillingRepository`; gateways are resolved at runtime
/// through the [`ProviderRegistry`].
pub struct BillingService<R: BillingRepository> {
    repo: R,
    providers: ProviderRegistry,
    publisher: Arc<dyn EventPublisher>,
    callbacks: RwLock<Vec<Arc<dyn TransactionCallback>>>,
}

impl<R: BillingRepository> BillingService<R> {
    pub fn new(repo: R, providers: ProviderRegistry, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            repo,
            providers,
            publisher,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a transaction, opening it at the gateway first when the
    /// gateway has a remote counterpart.
    #[tracing::instrument(skip(self, cmd), fields(tenant_id = %cmd.tenant_id, gateway = %cmd.gateway))]
    pub async fn create(&self, cmd: CreateTransactionCommand) -> Result<Transaction, AppError> {
        let amount = Amount::new(cmd.quantity, cmd.currency)?;
        if amount.is_zero() {
            return Err(AppError::BadRequest("Amount must be positive".into()));
        }

        let tx = Transaction::new(cmd.tenant_id, amount, cmd.gateway, cmd.details)?;
        if let Some(existing) = self.existing_click(&tx).await? {
            return Ok(existing);
        }

        let tx = match self.providers.resolve(cmd.gateway)? {
            Provider::Remote(provider) => {
                let created = provider
                    .create(tx.clone())
                    .await
                    .map_err(|e| AppError::provider(Operation::Create, e))?;
                ensure_same_identity(&tx, &created)
                    .map_err(|e| AppError::provider(Operation::Create, e))?;
                created
            }
            // Cash needs no confirmation from anyone.
            Provider::Local if cmd.gateway == Gateway::Cash => {
                let mut tx = tx;
                tx.transition(Status::Completed)?;
                tx
            }
            Provider::Local => tx,
        };

        let saved = self
            .repo
            .save(&tx)
            .await
            .map_err(|e| AppError::repo(Operation::Create, e))?;

        tracing::info!(transaction_id = %saved.id(), status = %saved.status(), "transaction created");
        self.publish(BillingEvent::Created {
            transaction: saved.clone(),
        });
        Ok(saved)
    }

    /// Click correlates payments by `merchant_trans_id` alone. A repeated
    /// create for the same tenant and amount gets the stored transaction
    /// back; any other reuse of the id is refused.
    async fn existing_click(&self, tx: &Transaction) -> Result<Option<Transaction>, AppError> {
        let Some(click) = tx.details().as_click() else {
            return Ok(None);
        };
        let filters = [DetailsFieldFilter::equal(
            ["merchant_trans_id"],
            click.merchant_trans_id.as_str(),
        )];
        let found = self
            .repo
            .get_by_details_fields(Gateway::Click, &filters)
            .await
            .map_err(|e| AppError::repo(Operation::Create, e))?;
        let Some(existing) = found.into_iter().next() else {
            return Ok(None);
        };
        if existing.tenant_id() == tx.tenant_id() && existing.amount() == tx.amount() {
            tracing::info!(transaction_id = %existing.id(), "click transaction already exists");
            return Ok(Some(existing));
        }
        Err(AppError::Conflict(format!(
            "merchant_trans_id {} is already in use",
            click.merchant_trans_id
        )))
    }

    /// Refunds part or all of the outstanding amount.
    ///
    /// The amount is validated against the stored transaction before the
    /// gateway is contacted.
    #[tracing::instrument(skip(self, cmd), fields(tenant_id = %cmd.tenant_id, transaction_id = %cmd.transaction_id, quantity = cmd.quantity))]
    pub async fn refund(&self, cmd: RefundCommand) -> Result<Transaction, AppError> {
        let original = self.get(cmd.tenant_id, cmd.transaction_id).await?;
        let amount = Amount::new(cmd.quantity, original.amount().currency())?;
        original.check_refund(amount)?;

        let mut tx = match self.providers.resolve(original.gateway())? {
            Provider::Remote(provider) => {
                let refunded = provider
                    .refund(original.clone(), amount)
                    .await
                    .map_err(|e| AppError::provider(Operation::Refund, e))?;
                ensure_same_identity(&original, &refunded)
                    .map_err(|e| AppError::provider(Operation::Refund, e))?;
                refunded
            }
            Provider::Local => original.clone(),
        };
        tx.apply_refund(amount)?;

        let saved = self
            .repo
            .save(&tx)
            .await
            .map_err(|e| AppError::repo(Operation::Refund, e))?;

        tracing::info!(status = %saved.status(), outstanding = saved.outstanding().quantity(), "refund applied");
        self.publish(BillingEvent::Updated {
            transaction: saved.clone(),
        });
        self.publish(BillingEvent::Refunded {
            original,
            transaction: saved.clone(),
            amount,
        });
        Ok(saved)
    }

    /// Cancels a pending transaction. Cancelling twice returns the stored
    /// transaction unchanged.
    #[tracing::instrument(skip(self, cmd), fields(tenant_id = %cmd.tenant_id, transaction_id = %cmd.transaction_id))]
    pub async fn cancel(&self, cmd: CancelCommand) -> Result<Transaction, AppError> {
        let tx = self.get(cmd.tenant_id, cmd.transaction_id).await?;
        if tx.status() == Status::Canceled {
            return Ok(tx);
        }
        tx.status().transition(Status::Canceled)?;

        let mut tx = match self.providers.resolve(tx.gateway())? {
            Provider::Remote(provider) => {
                let cancelled = provider
                    .cancel(tx.clone())
                    .await
                    .map_err(|e| AppError::provider(Operation::Cancel, e))?;
                ensure_same_identity(&tx, &cancelled)
                    .map_err(|e| AppError::provider(Operation::Cancel, e))?;
                cancelled
            }
            Provider::Local => tx,
        };
        tx.transition(Status::Canceled)?;

        let saved = self
            .repo
            .save(&tx)
            .await
            .map_err(|e| AppError::repo(Operation::Cancel, e))?;
        self.publish(BillingEvent::Updated {
            transaction: saved.clone(),
        });
        Ok(saved)
    }

    /// Applies a status and/or details change to a cash or integrator
    /// transaction.
    #[tracing::instrument(skip(self, cmd), fields(tenant_id = %cmd.tenant_id, transaction_id = %cmd.transaction_id))]
    pub async fn update_local(&self, cmd: UpdateLocalCommand) -> Result<Transaction, AppError> {
        let mut tx = self.get(cmd.tenant_id, cmd.transaction_id).await?;
        if tx.gateway().is_remote() {
            return Err(AppError::BadRequest(format!(
                "{} transactions are updated by the gateway, not locally",
                tx.gateway()
            )));
        }

        if let Some(details) = cmd.details {
            tx.set_details(details)?;
        }
        if let Some(status) = cmd.status {
            tx.transition(status)?;
        }

        let saved = self
            .repo
            .save(&tx)
            .await
            .map_err(|e| AppError::repo(Operation::Update, e))?;
        self.publish(BillingEvent::Updated {
            transaction: saved.clone(),
        });
        Ok(saved)
    }

    /// The single write path used by webhook processing.
    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id(), status = %tx.status()))]
    pub async fn save(&self, mut tx: Transaction) -> Result<Transaction, AppError> {
        tx.touch();
        let saved = self
            .repo
            .save(&tx)
            .await
            .map_err(|e| AppError::repo(Operation::Save, e))?;
        self.publish(BillingEvent::Updated {
            transaction: saved.clone(),
        });
        Ok(saved)
    }

    /// Persists a transaction the gateway itself originated, such as a
    /// subscription renewal invoice. No provider is called.
    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id(), gateway = %tx.gateway()))]
    pub async fn record(&self, tx: Transaction) -> Result<Transaction, AppError> {
        let saved = self
            .repo
            .save(&tx)
            .await
            .map_err(|e| AppError::repo(Operation::Create, e))?;
        self.publish(BillingEvent::Created {
            transaction: saved.clone(),
        });
        Ok(saved)
    }

    /// Removes a transaction. Administrative only.
    #[tracing::instrument(skip(self), fields(tenant_id = %tenant_id, transaction_id = %id))]
    pub async fn delete(&self, tenant_id: TenantId, id: TransactionId) -> Result<(), AppError> {
        let tx = self.get(tenant_id, id).await?;
        let deleted = self
            .repo
            .delete(id)
            .await
            .map_err(|e| AppError::repo(Operation::Delete, e))?;
        if !deleted {
            return Err(AppError::NotFound(format!("Transaction {id}")));
        }
        tracing::warn!("transaction deleted");
        self.publish(BillingEvent::Deleted { transaction: tx });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets a transaction owned by `tenant_id`.
    pub async fn get(&self, tenant_id: TenantId, id: TransactionId) -> Result<Transaction, AppError> {
        self.repo
            .get_by_id(id)
            .await
            .map_err(|e| AppError::repo(Operation::Get, e))?
            .filter(|tx| tx.tenant_id() == tenant_id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {id}")))
    }

    /// Returns one page of transactions and the total matching count.
    pub async fn list(&self, params: FindParams) -> Result<(Vec<Transaction>, i64), AppError> {
        if params.limit <= 0 || params.offset < 0 {
            return Err(AppError::BadRequest(
                "limit must be positive and offset non-negative".into(),
            ));
        }
        let params = FindParams {
            limit: params.limit.min(MAX_PAGE_SIZE),
            ..params
        };

        let total = self
            .repo
            .count(&params)
            .await
            .map_err(|e| AppError::repo(Operation::List, e))?;
        let items = self
            .repo
            .get_paginated(&params)
            .await
            .map_err(|e| AppError::repo(Operation::List, e))?;
        Ok((items, total))
    }

    /// All transactions of `gateway` matching `filters`, oldest first.
    pub async fn find_by_details(
        &self,
        gateway: Gateway,
        filters: &[DetailsFieldFilter],
    ) -> Result<Vec<Transaction>, AppError> {
        self.repo
            .get_by_details_fields(gateway, filters)
            .await
            .map_err(|e| AppError::repo(Operation::Lookup, e))
    }

    /// Exactly-one lookup by correlation fields.
    pub async fn find_one_by_details(
        &self,
        gateway: Gateway,
        filters: &[DetailsFieldFilter],
    ) -> Result<Transaction, LookupError> {
        let mut found = self.repo.get_by_details_fields(gateway, filters).await?;
        match found.len() {
            0 => Err(LookupError::NotFound),
            1 => Ok(found.remove(0)),
            n => {
                tracing::warn!(%gateway, matches = n, "ambiguous details lookup");
                Err(LookupError::Ambiguous(n))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Outward callbacks
    // ─────────────────────────────────────────────────────────────────────────────

    pub async fn register_callback(&self, callback: Arc<dyn TransactionCallback>) {
        self.callbacks.write().await.push(callback);
    }

    /// Delivers `tx` to every registered callback in registration order,
    /// stopping at the first failure.
    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id(), status = %tx.status()))]
    pub async fn invoke_callback(&self, tx: &Transaction) -> Result<(), CallbackError> {
        let callbacks = self.callbacks.read().await.clone();
        for callback in callbacks {
            callback.call(tx).await?;
        }
        Ok(())
    }

    fn publish(&self, event: BillingEvent) {
        tracing::debug!(event = event.name(), transaction_id = %event.transaction().id(), "publishing event");
        self.publisher.publish(event);
    }
}

/// Providers must not change write-once fields.
fn ensure_same_identity(before: &Transaction, after: &Transaction) -> Result<(), ProviderError> {
    if before.id() != after.id()
        || before.tenant_id() != after.tenant_id()
        || before.gateway() != after.gateway()
        || before.amount() != after.amount()
    {
        return Err(ProviderError::InvalidResponse(
            "provider changed transaction identity".into(),
        ));
    }
    Ok(())
}
