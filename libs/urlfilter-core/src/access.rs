//! Row-level access rules.
//!
//! A permission names a rule; the rule turns the caller's identity into
//! forced filters that are compiled as their own conjunct, ahead of (and
//! separate from) whatever the request asks for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::{FilterExpression, Operator};

/// Permission record of the caller for the requested resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub rule_name: String,
}

impl Permission {
    pub fn new(name: impl Into<String>, rule_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rule_name: rule_name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
}

/// Security state of the current request, passed explicitly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityContext {
    pub principal: Option<Principal>,
}

impl SecurityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRule {
    /// No restriction.
    All,
    /// Only rows owned by the caller (`user.id = principal.id`).
    User,
}

impl AccessRule {
    pub fn rule_name(&self) -> &'static str {
        match self {
            AccessRule::All => "all",
            AccessRule::User => "user",
        }
    }

    /// Forced filters keyed `<path>_<operator>`.
    pub fn exec(
        &self,
        _permission: &Permission,
        security: &SecurityContext,
    ) -> Result<BTreeMap<String, String>> {
        match self {
            AccessRule::All => Ok(BTreeMap::new()),
            AccessRule::User => {
                let principal = security
                    .principal
                    .as_ref()
                    .ok_or_else(|| Error::MissingPrincipal(self.rule_name().to_string()))?;
                Ok(BTreeMap::from([(
                    "user.id_=".to_string(),
                    principal.id.to_string(),
                )]))
            }
        }
    }
}

/// A forced filter produced by an [`AccessRule`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessFilter {
    pub field_path: String,
    pub operator: String,
    pub value: String,
}

impl AccessFilter {
    /// Splits a rule key at its last `_`; a key without one compares for
    /// equality.
    pub fn from_entry(key: &str, value: impl Into<String>) -> Self {
        let (field_path, operator) = key.rsplit_once('_').unwrap_or((key, "="));
        Self {
            field_path: field_path.to_string(),
            operator: operator.to_string(),
            value: value.into(),
        }
    }

    pub fn to_expression(&self) -> FilterExpression {
        FilterExpression::new(
            &self.field_path,
            Operator::parse(&self.operator),
            self.value.clone(),
        )
    }
}

/// Rules available to permissions, keyed by rule name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessRules {
    rules: BTreeMap<String, AccessRule>,
}

impl Default for AccessRules {
    fn default() -> Self {
        Self::empty()
            .with(AccessRule::All)
            .with(AccessRule::User)
    }
}

impl AccessRules {
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn with(mut self, rule: AccessRule) -> Self {
        self.rules.insert(rule.rule_name().to_string(), rule);
        self
    }

    pub fn get(&self, name: &str) -> Option<AccessRule> {
        self.rules.get(name).copied()
    }

    pub fn resolve(
        &self,
        permission: &Permission,
        security: &SecurityContext,
    ) -> Result<Vec<AccessFilter>> {
        let rule = self
            .get(&permission.rule_name)
            .ok_or_else(|| Error::UnknownAccessRule(permission.rule_name.clone()))?;
        let filters: Vec<AccessFilter> = rule
            .exec(permission, security)?
            .iter()
            .map(|(key, value)| AccessFilter::from_entry(key, value.as_str()))
            .collect();
        debug!(
            permission = %permission.name,
            rule = rule.rule_name(),
            filters = filters.len(),
            "resolved access rule"
        );
        Ok(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SecurityContext {
        SecurityContext::authenticated(Principal {
            id: 7,
            username: "alice".into(),
        })
    }

    #[test]
    fn all_rule_is_empty_for_any_permission() {
        for p in [Permission::new("orders:read", "all"), Permission::new("x", "user")] {
            assert!(AccessRule::All.exec(&p, &alice()).unwrap().is_empty());
            assert!(AccessRule::All
                .exec(&p, &SecurityContext::anonymous())
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn user_rule_forces_owner_id() {
        let p = Permission::new("orders:read", "user");
        let map = AccessRule::User.exec(&p, &alice()).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("user.id_=").map(String::as_str), Some("7"));
    }

    #[test]
    fn user_rule_without_principal_fails_closed() {
        let p = Permission::new("orders:read", "user");
        let err = AccessRule::User
            .exec(&p, &SecurityContext::anonymous())
            .unwrap_err();
        assert_eq!(err, Error::MissingPrincipal("user".into()));
    }

    #[test]
    fn resolve_splits_key_into_path_and_operator() {
        let filters = AccessRules::default()
            .resolve(&Permission::new("orders:read", "user"), &alice())
            .unwrap();
        assert_eq!(
            filters,
            vec![AccessFilter {
                field_path: "user.id".into(),
                operator: "=".into(),
                value: "7".into(),
            }]
        );
        let expr = filters[0].to_expression();
        assert_eq!(expr.field_path, vec!["user", "id"]);
        assert_eq!(expr.operator, Operator::Eq);
        assert_eq!(expr.raw_value, "7");
    }

    #[test]
    fn unknown_rule_is_reported() {
        let err = AccessRules::default()
            .resolve(&Permission::new("orders:read", "team"), &alice())
            .unwrap_err();
        assert_eq!(err, Error::UnknownAccessRule("team".into()));
    }

    #[test]
    fn registry_only_knows_registered_rules() {
        let rules = AccessRules::empty().with(AccessRule::All);
        assert_eq!(rules.get("all"), Some(AccessRule::All));
        assert!(rules
            .resolve(&Permission::new("p", "user"), &alice())
            .is_err());
    }

    #[test]
    fn underscored_paths_split_at_last_underscore() {
        let f = AccessFilter::from_entry("owner.team_id_in", "1,2");
        assert_eq!(f.field_path, "owner.team_id");
        assert_eq!(f.to_expression().operator, Operator::In);
    }
}
