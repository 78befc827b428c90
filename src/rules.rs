//! Global rule set synchronizer.
//!
//! Import is a full replace. Which representation gets replaced is decided by
//! [`StorageGateway::rule_storage`], never by the document.

use tracing::{debug, info};

use crate::{
    errors::BookingsHelperError,
    gateway::{GLOBAL_RULES_OPTION, RuleStorage, StorageGateway, in_transaction},
    model::GlobalRule,
};

pub const NO_RULES: &str = "There are no rules to export.";

pub struct RuleSynchronizer<'a, G: StorageGateway + ?Sized> {
    gateway: &'a G,
    atomic: bool,
}

impl<'a, G: StorageGateway + ?Sized> RuleSynchronizer<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            atomic: true,
        }
    }

    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn export_rules(&self) -> Result<Vec<GlobalRule>, BookingsHelperError> {
        let rules = match self.gateway.rule_storage()? {
            RuleStorage::Table => self.gateway.fetch_rules()?,
            RuleStorage::OptionBlob => self.option_rules()?,
        };
        if rules.is_empty() {
            return Err(BookingsHelperError::no_rules(NO_RULES));
        }
        Ok(rules)
    }

    /// Replaces every stored rule with `rules` and returns how many were written.
    pub fn import_rules(&self, rules: &[GlobalRule]) -> Result<usize, BookingsHelperError> {
        let storage = self.gateway.rule_storage()?;
        let written = if self.atomic {
            in_transaction(self.gateway, || self.replace(storage, rules))?
        } else {
            self.replace(storage, rules)?
        };
        info!(rules = written, storage = storage.as_str(), "imported global availability rules");
        Ok(written)
    }

    fn replace(
        &self,
        storage: RuleStorage,
        rules: &[GlobalRule],
    ) -> Result<usize, BookingsHelperError> {
        match storage {
            RuleStorage::Table => {
                self.gateway.truncate_rules()?;
                for rule in rules {
                    let mut row = rule.clone();
                    row.gcal_event_id.get_or_insert_with(String::new);
                    row.rrule.get_or_insert_with(String::new);
                    let id = self.gateway.insert_rule(&row)?;
                    debug!(rule = id, title = %row.title, "inserted rule");
                }
            }
            RuleStorage::OptionBlob => {
                let blob: Vec<GlobalRule> = rules
                    .iter()
                    .map(|rule| GlobalRule {
                        id: None,
                        ..rule.clone()
                    })
                    .collect();
                let encoded = serde_json::to_string(&blob)
                    .map_err(|e| BookingsHelperError::invalid_input(e.to_string()))?;
                self.gateway.replace_option(GLOBAL_RULES_OPTION, &encoded)?;
            }
        }
        Ok(rules.len())
    }

    fn option_rules(&self) -> Result<Vec<GlobalRule>, BookingsHelperError> {
        match self.gateway.get_option(GLOBAL_RULES_OPTION)? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => crate::codec::decode_rules(raw.as_bytes()),
        }
    }
}
