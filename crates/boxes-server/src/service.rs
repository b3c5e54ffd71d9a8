//! Box operations: policy, then the write, then the aggregate rules.
//!
//! Rules run against the committed state. A violation is returned as an
//! error but the write stays in place.

use boxes_core::policy;
use boxes_core::{
    Actor, BoxFilter, BoxId, BoxPatch, BoxRecord, NewBox, Owner, Rule, RuleChecker, RuleLimits,
    Scope,
};
use boxes_store::BoxRepo;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ApiError;

pub struct BoxService {
    repo: BoxRepo,
    checker: RuleChecker,
}

impl BoxService {
    pub fn new(repo: BoxRepo, limits: RuleLimits) -> Self {
        Self {
            repo,
            checker: RuleChecker::new(limits),
        }
    }

    /// `body` is the raw request payload; it is only parsed once the actor
    /// is known to be allowed to add.
    pub fn add(&self, actor: &Actor, body: &[u8], now: DateTime<Utc>) -> Result<BoxRecord, ApiError> {
        policy::authorize_add(actor).inspect_err(|_| denied(actor, "add"))?;
        let new = NewBox::from_json(&parse_body(body)?)?;
        let owner = Owner {
            id: actor.id,
            username: actor.username.clone(),
        };
        let record = self.repo.insert(&owner, &new, now)?;
        info!(box_id = %record.id, owner = %actor.username, "box added");

        self.enforce(Rule::AFTER_ADD, actor, now)?;
        Ok(record)
    }

    pub fn update(
        &self,
        actor: &Actor,
        id: BoxId,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<BoxRecord, ApiError> {
        policy::authorize_update(actor).inspect_err(|_| denied(actor, "update"))?;
        self.repo.get(id)?;
        let patch = BoxPatch::from_json(&parse_body(body)?)?;
        let record = self.repo.update(id, &patch, now)?;
        info!(box_id = %id, by = %actor.username, "box updated");

        self.enforce(Rule::AFTER_UPDATE, actor, now)?;
        Ok(record)
    }

    pub fn delete(&self, actor: &Actor, id: BoxId, now: DateTime<Utc>) -> Result<(), ApiError> {
        let record = self.repo.get(id)?;
        policy::authorize_delete(actor, &record).inspect_err(|_| denied(actor, "delete"))?;
        self.repo.delete(id)?;
        info!(box_id = %id, owner = %actor.username, "box deleted");

        self.enforce(Rule::AFTER_DELETE, actor, now)
    }

    pub fn list(&self, actor: &Actor, filter: &BoxFilter) -> Result<Vec<BoxRecord>, ApiError> {
        policy::authorize_list(actor)?;
        Ok(self.repo.list(Scope::All, filter)?)
    }

    pub fn list_own(&self, actor: &Actor, filter: &BoxFilter) -> Result<Vec<BoxRecord>, ApiError> {
        policy::authorize_list_own(actor).inspect_err(|_| denied(actor, "list_own"))?;
        Ok(self.repo.list(Scope::Owner(actor.id), filter)?)
    }

    fn enforce(&self, rules: &[Rule], actor: &Actor, now: DateTime<Utc>) -> Result<(), ApiError> {
        match self.checker.check(&self.repo, rules, actor.id, now)? {
            None => Ok(()),
            Some(violation) => {
                warn!(
                    code = violation.code(),
                    violation = ?violation,
                    actor = %actor.username,
                    "aggregate rule violated after commit"
                );
                Err(violation.into())
            }
        }
    }
}

/// An empty body reads as `{}` so partial updates may omit it.
fn parse_body(raw: &[u8]) -> Result<Value, ApiError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(raw).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

fn denied(actor: &Actor, operation: &'static str) {
    warn!(actor = %actor.username, operation, "permission denied");
}
