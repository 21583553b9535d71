//! Environment construction for workflow scripts
//!
//! Arguments reach the script two ways: the whole map as compact JSON in
//! `WORKFLOW_ARGS_JSON`, and one `WORKFLOW_ARG_<KEY>` variable per
//! top-level key.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RunbookError};
use crate::value::{ArgMap, ArgValue};
use crate::workflow::Workflow;

/// Variable holding the compact JSON of all arguments
pub const ARGS_JSON_VAR: &str = "WORKFLOW_ARGS_JSON";

/// Prefix of per-argument variables
pub const ARG_VAR_PREFIX: &str = "WORKFLOW_ARG_";

/// Portable environment variable name
static ENV_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("valid regex"));

/// What to do with argument keys that are not valid variable names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Fail the invocation
    #[default]
    Reject,
    /// Replace offending characters with `_`
    Sanitize,
    /// Upper-case only, pass everything else through
    Passthrough,
}

impl FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(KeyPolicy::Reject),
            "sanitize" => Ok(KeyPolicy::Sanitize),
            "passthrough" => Ok(KeyPolicy::Passthrough),
            other => Err(format!(
                "unknown key policy '{}' (expected reject, sanitize or passthrough)",
                other
            )),
        }
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPolicy::Reject => write!(f, "reject"),
            KeyPolicy::Sanitize => write!(f, "sanitize"),
            KeyPolicy::Passthrough => write!(f, "passthrough"),
        }
    }
}

/// Variables added to the inherited environment for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    vars: BTreeMap<String, String>,
}

impl ResolvedEnvironment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variable names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }
}

/// Builds a `ResolvedEnvironment` from decision arguments
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentBuilder {
    policy: KeyPolicy,
}

impl EnvironmentBuilder {
    pub fn new(policy: KeyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    pub fn build(&self, workflow: &Workflow, args: &ArgMap) -> Result<ResolvedEnvironment> {
        let mut vars = BTreeMap::new();
        let mut sources: BTreeMap<String, &str> = BTreeMap::new();

        for (key, value) in args {
            let name = self.variable_name(workflow, key)?;
            match sources.entry(name.clone()) {
                Entry::Occupied(first) => {
                    return Err(RunbookError::ArgumentKeyCollision {
                        workflow: workflow.name.clone(),
                        variable: name,
                        keys: vec![first.get().to_string(), key.clone()],
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(key);
                }
            }
            vars.insert(name, value.to_env_string());
        }

        let all = ArgValue::Object(args.clone()).to_compact_json();
        vars.insert(ARGS_JSON_VAR.to_string(), all);

        debug!(
            workflow = %workflow.name,
            count = vars.len(),
            policy = %self.policy,
            "environment built"
        );
        Ok(ResolvedEnvironment { vars })
    }

    fn variable_name(&self, workflow: &Workflow, key: &str) -> Result<String> {
        let upper = key.to_uppercase();
        let suffix = match self.policy {
            KeyPolicy::Passthrough => upper,
            KeyPolicy::Reject => {
                if !ENV_NAME_PATTERN.is_match(&upper) {
                    return Err(RunbookError::InvalidArgumentKey {
                        workflow: workflow.name.clone(),
                        key: key.to_string(),
                    });
                }
                upper
            }
            KeyPolicy::Sanitize => sanitize(&upper),
        };
        Ok(format!("{}{}", ARG_VAR_PREFIX, suffix))
    }
}

/// Map every character outside `[A-Z0-9_]` to `_`; a leading digit gets a
/// `_` prefix so the suffix alone matches the key pattern
fn sanitize(upper: &str) -> String {
    let cleaned: String = upper
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.chars().next() {
        None => "_".to_string(),
        Some(c) if c.is_ascii_digit() => format!("_{}", cleaned),
        Some(_) => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: serde_json::Value) -> ArgMap {
        match ArgValue::from(value) {
            ArgValue::Object(map) => map,
            other => panic!("expected object, got {}", other.type_name()),
        }
    }

    fn wf() -> Workflow {
        Workflow::new("greet", "", "", "/tmp/greet.sh")
    }

    #[test]
    fn mixed_arguments() {
        let env = EnvironmentBuilder::default()
            .build(
                &wf(),
                &args(json!({"name": "Bob", "count": 3, "ok": true, "tags": ["a", "b"]})),
            )
            .unwrap();

        assert_eq!(
            env.get(ARGS_JSON_VAR),
            Some(r#"{"count":3,"name":"Bob","ok":true,"tags":["a","b"]}"#)
        );
        assert_eq!(env.get("WORKFLOW_ARG_NAME"), Some("Bob"));
        assert_eq!(env.get("WORKFLOW_ARG_COUNT"), Some("3"));
        assert_eq!(env.get("WORKFLOW_ARG_OK"), Some("true"));
        assert_eq!(env.get("WORKFLOW_ARG_TAGS"), Some(r#"["a","b"]"#));
        assert_eq!(env.len(), 5);
    }

    #[test]
    fn empty_arguments_still_set_json_blob() {
        let env = EnvironmentBuilder::default().build(&wf(), &ArgMap::new()).unwrap();
        assert_eq!(env.names(), vec![ARGS_JSON_VAR.to_string()]);
        assert_eq!(env.get(ARGS_JSON_VAR), Some("{}"));
    }

    #[test]
    fn nested_objects_and_null() {
        let env = EnvironmentBuilder::default()
            .build(&wf(), &args(json!({"opts": {"b": 1, "a": [true]}, "none": null})))
            .unwrap();
        assert_eq!(env.get("WORKFLOW_ARG_OPTS"), Some(r#"{"a":[true],"b":1}"#));
        assert_eq!(env.get("WORKFLOW_ARG_NONE"), Some("null"));
    }

    #[test]
    fn reject_policy_refuses_bad_keys() {
        let builder = EnvironmentBuilder::new(KeyPolicy::Reject);
        for key in ["my-key", "a b", "1st", "x=y", "ключ"] {
            let err = builder.build(&wf(), &args(json!({ key: 1 }))).unwrap_err();
            assert!(
                matches!(err, RunbookError::InvalidArgumentKey { .. }),
                "{key:?} gave {err}"
            );
        }
        assert!(builder.build(&wf(), &args(json!({"snake_case_2": 1}))).is_ok());
    }

    #[test]
    fn sanitize_policy_rewrites_bad_keys() {
        let env = EnvironmentBuilder::new(KeyPolicy::Sanitize)
            .build(&wf(), &args(json!({"my-key": "v", "1st": "w"})))
            .unwrap();
        assert_eq!(env.get("WORKFLOW_ARG_MY_KEY"), Some("v"));
        assert_eq!(env.get("WORKFLOW_ARG__1ST"), Some("w"));
        assert_eq!(env.get("WORKFLOW_ARG_1ST"), None);
    }

    #[test]
    fn passthrough_policy_keeps_keys_verbatim() {
        let env = EnvironmentBuilder::new(KeyPolicy::Passthrough)
            .build(&wf(), &args(json!({"my-key": "v"})))
            .unwrap();
        assert_eq!(env.get("WORKFLOW_ARG_MY-KEY"), Some("v"));
    }

    #[test]
    fn case_collisions_are_errors() {
        let err = EnvironmentBuilder::default()
            .build(&wf(), &args(json!({"name": "a", "NAME": "b"})))
            .unwrap_err();
        match err {
            RunbookError::ArgumentKeyCollision { variable, keys, .. } => {
                assert_eq!(variable, "WORKFLOW_ARG_NAME");
                assert_eq!(keys, vec!["NAME".to_string(), "name".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sanitize_collisions_are_errors() {
        let err = EnvironmentBuilder::new(KeyPolicy::Sanitize)
            .build(&wf(), &args(json!({"a-b": 1, "a_b": 2})))
            .unwrap_err();
        assert!(matches!(err, RunbookError::ArgumentKeyCollision { .. }));
    }

    #[test]
    fn key_policy_parsing() {
        assert_eq!("Sanitize".parse::<KeyPolicy>().unwrap(), KeyPolicy::Sanitize);
        assert!("lenient".parse::<KeyPolicy>().is_err());
        assert_eq!(KeyPolicy::default().to_string(), "reject");
    }
}
