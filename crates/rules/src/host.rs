//! The live ruleset host: resolved definitions plus engine runtime.
//!
//! A [`Host`] is immutable with respect to its ruleset set. Registry changes
//! build a new host (see [`crate::bridge`]); session state lives in the
//! [`StateStore`](crate::store::StateStore) handed from one host to the next.
//!
//! While [`Host::run`] is starting a host, its session writes are staged and
//! only reach the store once every seed and hook has succeeded.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::schema::{RulesetDefinition, StartupSpec, Trigger};
use crate::store::{SessionKey, SessionRecord, SharedStateStore};
use crate::value::EngineValue;

/// Session used when a message carries no `sid`.
pub const DEFAULT_SID: &str = "0";

/// Callback run against every freshly built host before it goes live.
pub type StartHook = Arc<dyn Fn(&Host) -> Result<()> + Send + Sync>;

pub struct Host {
    definitions: BTreeMap<String, RulesetDefinition>,
    store: SharedStateStore,
    staging: Mutex<Option<Staging>>,
    active: AtomicBool,
}

/// Writes made during startup: the records as the host sees them, and the
/// operations to replay against the store on success.
#[derive(Default)]
struct Staging {
    records: HashMap<SessionKey, SessionRecord>,
    journal: Vec<(String, String, SessionOp)>,
}

#[derive(Debug, Clone)]
enum SessionOp {
    Patch(Map<String, Value>),
    Apply { message: Value, kind: Trigger },
}

impl SessionOp {
    /// Returns the names of the rules that fired.
    fn apply(&self, ruleset: &RulesetDefinition, record: &mut SessionRecord) -> Vec<String> {
        match self {
            SessionOp::Patch(patch) => {
                for (key, value) in patch {
                    if key != "sid" {
                        record.state.insert(key.clone(), value.clone());
                    }
                }
                Vec::new()
            }
            SessionOp::Apply { message, kind } => {
                if *kind == Trigger::Fact {
                    // Asserting an identical fact twice is a no-op.
                    if record.facts.contains(message) {
                        return Vec::new();
                    }
                    record.facts.push(message.clone());
                } else {
                    record.events += 1;
                }
                fire(ruleset, *kind, message, &mut record.state)
            }
        }
    }
}

impl Host {
    pub fn new(definitions: BTreeMap<String, RulesetDefinition>, store: SharedStateStore) -> Self {
        Self {
            definitions,
            store,
            staging: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Apply every ruleset's startup seed, run `hooks`, then mark the host active.
    ///
    /// On error nothing the seeds or hooks wrote reaches the store.
    pub fn run(&self, hooks: &[StartHook]) -> Result<()> {
        *self.staging() = Some(Staging::default());
        let started = self.start(hooks);
        let staging = self.staging().take();
        started?;

        if let Some(staging) = staging {
            self.commit(staging);
        }
        self.active.store(true, Ordering::Release);
        info!(rulesets = self.definitions.len(), hooks = hooks.len(), "host running");
        Ok(())
    }

    fn start(&self, hooks: &[StartHook]) -> Result<()> {
        for definition in self.definitions.values() {
            if let Some(startup) = &definition.startup {
                self.seed(&definition.name, startup).map_err(|e| {
                    EngineError::Startup(format!("ruleset '{}': {}", definition.name, e))
                })?;
            }
        }
        for hook in hooks {
            hook(self)?;
        }
        Ok(())
    }

    fn seed(&self, name: &str, startup: &StartupSpec) -> Result<()> {
        if !startup.state.is_empty() {
            self.patch_state(name, Value::Object(startup.state.clone()))?;
        }
        for fact in &startup.facts {
            self.assert_fact(name, fact.clone())?;
        }
        for event in &startup.events {
            self.post(name, event.clone())?;
        }
        Ok(())
    }

    /// Replay staged operations against the store's current records.
    fn commit(&self, staging: Staging) {
        let writes = staging.journal.len();
        self.store.transaction(|sessions| {
            for (name, sid, op) in staging.journal {
                if let Some(ruleset) = self.definitions.get(&name) {
                    sessions.update(&name, &sid, |record| op.apply(ruleset, record));
                }
            }
        });
        debug!(writes, "startup writes committed");
    }

    /// Retire this host. Requests already holding it still complete.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn list_rulesets(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    pub fn get_ruleset(&self, name: &str) -> Option<&RulesetDefinition> {
        self.definitions.get(name)
    }

    pub fn get_state(&self, name: &str, sid: Option<&str>) -> Result<EngineValue> {
        self.ruleset(name)?;
        let record = self.read_session(name, sid.unwrap_or(DEFAULT_SID));
        Ok(Value::Object(record.state).into())
    }

    /// Merge the body's fields into the state of the session named by its `sid`.
    pub fn patch_state(&self, name: &str, message: Value) -> Result<EngineValue> {
        let ruleset = self.ruleset(name)?;
        let Value::Object(patch) = message else {
            return Err(EngineError::InvalidMessage(format!(
                "state patch must be a JSON object, got {}",
                type_name(&message)
            )));
        };
        let sid = sid_of(&patch)?;
        let (_, state) = self.update_session(ruleset, &sid, SessionOp::Patch(patch));
        debug!(ruleset = %name, sid = %sid, "state patched");
        Ok(Value::Object(state).into())
    }

    pub fn post(&self, name: &str, message: Value) -> Result<EngineValue> {
        self.dispatch(name, message, Trigger::Event)
    }

    pub fn assert_fact(&self, name: &str, message: Value) -> Result<EngineValue> {
        self.dispatch(name, message, Trigger::Fact)
    }

    fn ruleset(&self, name: &str) -> Result<&RulesetDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| EngineError::UnknownRuleset(name.to_string()))
    }

    /// A JSON array is a batch: every element is checked before any is applied.
    fn dispatch(&self, name: &str, message: Value, kind: Trigger) -> Result<EngineValue> {
        let ruleset = self.ruleset(name)?;
        validate_message(&message)?;
        match message {
            Value::Array(items) => {
                let results = items
                    .into_iter()
                    .map(|item| self.apply(ruleset, item, kind))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(results).into())
            }
            other => Ok(self.apply(ruleset, other, kind)?.into()),
        }
    }

    fn apply(&self, ruleset: &RulesetDefinition, message: Value, kind: Trigger) -> Result<Value> {
        let sid = message_sid(&message)?;
        let op = SessionOp::Apply {
            message: message.clone(),
            kind,
        };
        let (fired, _) = self.update_session(ruleset, &sid, op);

        debug!(ruleset = %ruleset.name, sid = %sid, fired = fired.len(), "message applied");

        let label = if kind == Trigger::Fact { "fact" } else { "event" };
        let mut result = Map::new();
        result.insert("sid".to_string(), Value::String(sid));
        result.insert(
            "fired".to_string(),
            Value::Array(fired.into_iter().map(Value::String).collect()),
        );
        result.insert(label.to_string(), message);
        Ok(Value::Object(result))
    }

    fn staging(&self) -> MutexGuard<'_, Option<Staging>> {
        self.staging.lock().expect("staging lock poisoned")
    }

    fn read_session(&self, ruleset: &str, sid: &str) -> SessionRecord {
        if let Some(staging) = self.staging().as_ref() {
            let key = (ruleset.to_string(), sid.to_string());
            if let Some(record) = staging.records.get(&key) {
                return record.clone();
            }
        }
        self.store
            .load(ruleset, sid)
            .unwrap_or_else(|| SessionRecord::new(sid))
    }

    /// Apply `op` to one session; returns the fired rules and the resulting state.
    fn update_session(
        &self,
        ruleset: &RulesetDefinition,
        sid: &str,
        op: SessionOp,
    ) -> (Vec<String>, Map<String, Value>) {
        let mut guard = self.staging();
        if let Some(staging) = guard.as_mut() {
            let key = (ruleset.name.clone(), sid.to_string());
            let record = staging.records.entry(key).or_insert_with(|| {
                self.store
                    .load(&ruleset.name, sid)
                    .unwrap_or_else(|| SessionRecord::new(sid))
            });
            let fired = op.apply(ruleset, record);
            let state = record.state.clone();
            staging.journal.push((ruleset.name.clone(), sid.to_string(), op));
            return (fired, state);
        }
        drop(guard);

        self.store.update(&ruleset.name, sid, |record| {
            let fired = op.apply(ruleset, record);
            (fired, record.state.clone())
        })
    }
}

/// Check that `message` can be applied as a whole: an object, or a non-empty
/// array of objects, each with a string or number `sid` (if any).
pub fn validate_message(message: &Value) -> Result<()> {
    match message {
        Value::Array(items) if items.is_empty() => {
            Err(EngineError::InvalidMessage("empty batch".to_string()))
        }
        Value::Array(items) => items.iter().try_for_each(|item| message_sid(item).map(|_| ())),
        other => message_sid(other).map(|_| ()),
    }
}

/// Apply every matching rule's action to `state`; returns the fired rule names.
fn fire(
    ruleset: &RulesetDefinition,
    kind: Trigger,
    message: &Value,
    state: &mut Map<String, Value>,
) -> Vec<String> {
    let mut fired = Vec::new();
    for rule in &ruleset.rules {
        if !rule.listens_to(kind) || !rule.matches(message) {
            continue;
        }
        for (key, value) in &rule.then.set {
            if key != "sid" {
                state.insert(key.clone(), value.clone());
            }
        }
        fired.push(rule.name.clone());
    }
    fired
}

/// Session id of a single message object.
pub(crate) fn message_sid(message: &Value) -> Result<String> {
    let Some(fields) = message.as_object() else {
        return Err(EngineError::InvalidMessage(format!(
            "expected a JSON object, got {}",
            type_name(message)
        )));
    };
    sid_of(fields)
}

fn sid_of(fields: &Map<String, Value>) -> Result<String> {
    match fields.get("sid") {
        None | Some(Value::Null) => Ok(DEFAULT_SID.to_string()),
        Some(Value::String(sid)) => Ok(sid.clone()),
        Some(Value::Number(sid)) => Ok(sid.to_string()),
        Some(other) => Err(EngineError::InvalidMessage(format!(
            "sid must be a string or number, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{ActionSpec, RuleSpec};
    use crate::store::StateStore;

    fn counter_ruleset(name: &str) -> RulesetDefinition {
        let mut when = Map::new();
        when.insert("k".into(), json!(1));
        let mut set = Map::new();
        set.insert("seen_k".into(), json!(true));
        RulesetDefinition {
            name: name.to_string(),
            description: None,
            rules: vec![
                RuleSpec {
                    name: "on_k".into(),
                    on: Trigger::Any,
                    when,
                    then: ActionSpec { set, deferred: false },
                },
                RuleSpec {
                    name: "facts_only".into(),
                    on: Trigger::Fact,
                    when: Map::new(),
                    then: ActionSpec::default(),
                },
            ],
            startup: None,
        }
    }

    fn host_with(definitions: Vec<RulesetDefinition>, cache: usize) -> Host {
        host_on(definitions, StateStore::shared(cache))
    }

    fn host_on(definitions: Vec<RulesetDefinition>, store: SharedStateStore) -> Host {
        let map = definitions.into_iter().map(|d| (d.name.clone(), d)).collect();
        Host::new(map, store)
    }

    fn json_of(value: EngineValue) -> Value {
        value.to_json().unwrap()
    }

    #[test]
    fn post_fires_matching_rules_in_default_session() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        let result = json_of(host.post("t1", json!({"k": 1})).unwrap());
        assert_eq!(result, json!({"sid": "0", "fired": ["on_k"], "event": {"k": 1}}));

        let state = json_of(host.get_state("t1", None).unwrap());
        assert_eq!(state, json!({"sid": "0", "seen_k": true}));
    }

    #[test]
    fn sessions_are_isolated() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        host.post("t1", json!({"sid": "a", "k": 1})).unwrap();
        host.post("t1", json!({"sid": "b", "k": 2})).unwrap();

        assert_eq!(json_of(host.get_state("t1", Some("a")).unwrap())["seen_k"], json!(true));
        assert_eq!(json_of(host.get_state("t1", Some("b")).unwrap()), json!({"sid": "b"}));
    }

    #[test]
    fn numeric_sid_is_stringified() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        let result = json_of(host.post("t1", json!({"sid": 7})).unwrap());
        assert_eq!(result["sid"], json!("7"));
        assert!(host.post("t1", json!({"sid": {"nested": true}})).is_err());
    }

    #[test]
    fn facts_are_deduplicated_and_trigger_fact_rules() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        let first = json_of(host.assert_fact("t1", json!({"color": "red"})).unwrap());
        assert_eq!(first["fired"], json!(["facts_only"]));

        let second = json_of(host.assert_fact("t1", json!({"color": "red"})).unwrap());
        assert_eq!(second["fired"], json!([]));
        assert_eq!(second["fact"], json!({"color": "red"}));
    }

    #[test]
    fn batches_apply_each_message() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        let result = json_of(host.post("t1", json!([{"k": 1}, {"k": 2, "sid": "x"}])).unwrap());
        assert_eq!(result[0]["fired"], json!(["on_k"]));
        assert_eq!(result[1]["sid"], json!("x"));

        assert!(matches!(
            host.post("t1", json!([])),
            Err(EngineError::InvalidMessage(_))
        ));
        assert!(matches!(
            host.post("t1", json!("text")),
            Err(EngineError::InvalidMessage(_))
        ));
    }

    #[test]
    fn rejected_batch_applies_nothing() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        assert!(matches!(
            host.post("t1", json!([{"k": 1}, 5])),
            Err(EngineError::InvalidMessage(_))
        ));
        assert!(host.assert_fact("t1", json!([{"k": 1}, {"sid": [1]}])).is_err());

        let state = json_of(host.get_state("t1", None).unwrap());
        assert_eq!(state, json!({"sid": "0"}));

        // The rejected fact was not recorded, so asserting it now fires.
        let result = json_of(host.assert_fact("t1", json!({"k": 1})).unwrap());
        assert_eq!(result["fired"], json!(["on_k", "facts_only"]));
    }

    #[test]
    fn validate_message_accepts_objects_and_batches() {
        assert!(validate_message(&json!({"sid": 3})).is_ok());
        assert!(validate_message(&json!([{"a": 1}, {"sid": "x"}])).is_ok());
        assert!(validate_message(&json!([])).is_err());
        assert!(validate_message(&json!([{"a": 1}, "b"])).is_err());
        assert!(validate_message(&json!({"sid": true})).is_err());
    }

    #[test]
    fn patch_state_merges_fields_but_keeps_sid() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        let state = json_of(host.patch_state("t1", json!({"sid": "s", "mode": "hot"})).unwrap());
        assert_eq!(state, json!({"sid": "s", "mode": "hot"}));

        let state = json_of(host.patch_state("t1", json!({"sid": "s", "level": 2})).unwrap());
        assert_eq!(state, json!({"sid": "s", "mode": "hot", "level": 2}));
        assert!(host.patch_state("t1", json!([1])).is_err());
    }

    #[test]
    fn unknown_ruleset_is_reported() {
        let host = host_with(vec![], 8);
        assert_eq!(
            host.post("nope", json!({})).unwrap_err(),
            EngineError::UnknownRuleset("nope".into())
        );
        assert!(host.get_state("nope", None).is_err());
    }

    #[test]
    fn evicted_sessions_reload_from_the_store() {
        let host = host_with(vec![counter_ruleset("t1")], 1);
        host.post("t1", json!({"sid": "a", "k": 1})).unwrap();
        host.post("t1", json!({"sid": "b"})).unwrap();

        let state = json_of(host.get_state("t1", Some("a")).unwrap());
        assert_eq!(state["seen_k"], json!(true));
    }

    #[test]
    fn hosts_sharing_a_store_see_each_others_writes() {
        let store = StateStore::shared(8);
        let old = host_on(vec![counter_ruleset("t1")], Arc::clone(&store));
        let new = host_on(vec![counter_ruleset("t1")], Arc::clone(&store));

        new.patch_state("t1", json!({"a": 1})).unwrap();
        old.patch_state("t1", json!({"b": 2})).unwrap();
        new.patch_state("t1", json!({"c": 3})).unwrap();

        let state = json_of(new.get_state("t1", None).unwrap());
        assert_eq!(state, json!({"sid": "0", "a": 1, "b": 2, "c": 3}));
        assert_eq!(json_of(old.get_state("t1", None).unwrap()), state);
    }

    #[test]
    fn run_applies_startup_seed_and_hooks() {
        let mut ruleset = counter_ruleset("t1");
        let mut state = Map::new();
        state.insert("mode".into(), json!("warm"));
        ruleset.startup = Some(StartupSpec {
            state,
            facts: vec![json!({"boot": true})],
            events: vec![json!({"k": 1})],
        });
        let host = host_with(vec![ruleset], 8);
        assert!(!host.is_active());

        let hook: StartHook = Arc::new(|host: &Host| {
            host.patch_state("t1", json!({"hooked": true})).map(|_| ())
        });
        host.run(&[hook]).unwrap();
        assert!(host.is_active());

        let state = json_of(host.get_state("t1", None).unwrap());
        assert_eq!(
            state,
            json!({"sid": "0", "mode": "warm", "seen_k": true, "hooked": true})
        );

        host.deactivate();
        assert!(!host.is_active());
    }

    #[test]
    fn failing_hook_keeps_host_inactive() {
        let host = host_with(vec![counter_ruleset("t1")], 8);
        let hook: StartHook = Arc::new(|_: &Host| Err(EngineError::Startup("boom".into())));
        assert!(host.run(&[hook]).is_err());
        assert!(!host.is_active());
    }

    #[test]
    fn failed_startup_writes_nothing_to_the_store() {
        let store = StateStore::shared(8);
        let mut ruleset = counter_ruleset("t1");
        let mut state = Map::new();
        state.insert("mode".into(), json!("evil"));
        ruleset.startup = Some(StartupSpec {
            state,
            ..StartupSpec::default()
        });
        let host = host_on(vec![ruleset], Arc::clone(&store));

        let hook: StartHook = Arc::new(|host: &Host| {
            let state = host.get_state("t1", None)?.to_json().unwrap_or_default();
            assert_eq!(state["mode"], json!("evil"));
            Err(EngineError::Startup("boom".into()))
        });
        assert!(host.run(&[hook]).is_err());
        assert!(store.load("t1", DEFAULT_SID).is_none());
        assert_eq!(json_of(host.get_state("t1", None).unwrap()), json!({"sid": "0"}));
    }

    #[test]
    fn startup_writes_replay_over_concurrent_changes() {
        let store = StateStore::shared(8);
        let live = host_on(vec![counter_ruleset("t1")], Arc::clone(&store));

        let mut ruleset = counter_ruleset("t1");
        let mut state = Map::new();
        state.insert("seeded".into(), json!(true));
        ruleset.startup = Some(StartupSpec {
            state,
            ..StartupSpec::default()
        });
        let next = host_on(vec![ruleset], Arc::clone(&store));

        // A write from the live host lands while the next one is starting.
        let live = Arc::new(live);
        let writer = Arc::clone(&live);
        let hook: StartHook = Arc::new(move |_: &Host| {
            writer.patch_state("t1", json!({"live": 1})).map(|_| ())
        });
        next.run(&[hook]).unwrap();

        let state = json_of(next.get_state("t1", None).unwrap());
        assert_eq!(state, json!({"sid": "0", "live": 1, "seeded": true}));
    }
}
