use common::{Filter, ListQuery, Page, Percentage};
use domain::{DiscountRule, default_rules};
use persistence::Repository;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::{CreateDiscountRule, DeactivateDiscountRule};
use crate::{ApplicationError, Result, saved};

/// The discount-rule catalogue owned by the Carts module.
#[derive(Clone)]
pub struct DiscountRuleService {
    rules: Repository<DiscountRule>,
}

impl DiscountRuleService {
    pub fn new(rules: Repository<DiscountRule>) -> Self {
        Self { rules }
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn create_rule(
        &self,
        cmd: CreateDiscountRule,
        cancel: &CancellationToken,
    ) -> Result<DiscountRule> {
        cmd.validate()?;
        let rule = DiscountRule::new(
            cmd.min_quantity,
            cmd.max_quantity,
            Percentage::new(cmd.discount)?,
        )?;

        let mut uow = self.rules.begin();
        uow.add(rule);
        saved(uow.commit(cancel).await?)
    }

    /// Takes a rule out of future discount applications. Carts keep the
    /// discounts already assigned until their items change again.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn deactivate_rule(
        &self,
        cmd: DeactivateDiscountRule,
        cancel: &CancellationToken,
    ) -> Result<DiscountRule> {
        let mut rule = self
            .rules
            .get(cmd.rule_id, cancel)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Discount rule", cmd.rule_id))?;
        if !rule.is_active() {
            return Ok(rule);
        }

        rule.deactivate();
        let mut uow = self.rules.begin();
        uow.update(rule);
        saved(uow.commit(cancel).await?)
    }

    pub async fn list_rules(
        &self,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<Page<DiscountRule>> {
        Ok(self.rules.list(query, cancel).await?)
    }

    /// Every active rule, read fresh for each discount application.
    pub async fn active_rules(&self, cancel: &CancellationToken) -> Result<Vec<DiscountRule>> {
        Ok(self
            .rules
            .find_all(ListQuery::new().filter(Filter::eq("active", true)), cancel)
            .await?)
    }

    /// Stores the default tiers when the catalogue is empty. Returns how many
    /// rules were inserted.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn seed_defaults(&self, cancel: &CancellationToken) -> Result<usize> {
        let existing = self.rules.list(&ListQuery::new().size(1), cancel).await?;
        if existing.total_count > 0 {
            return Ok(0);
        }

        let mut uow = self.rules.begin();
        for rule in default_rules() {
            uow.add(rule);
        }
        let receipt = uow.commit(cancel).await?;
        tracing::info!(rules = receipt.changes, "default discount rules seeded");
        Ok(receipt.changes)
    }
}
