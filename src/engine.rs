//! Message routing engine
//!
//! One inbound message selects the first rule whose criteria it matches,
//! finds or starts that rule's context for the message's key, and invokes
//! the current step. When the step's exit criteria accept the response, the
//! response re-enters routing as a new message. The caller receives the
//! response of the last step actually invoked.

mod locks;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use locks::KeyLocks;
pub use traits::ContextRepository;

use crate::context::{Context, Rule, StepOutcome};
use crate::index::extract_key;
use crate::query;
use crate::remote::{InvocationError, LoggingInvoker, StepInvoker};
use crate::store::{ContextStore, StoreError};
use serde_json::{json, Value};
use std::time::Instant;
use thiserror::Error;

/// Default bound on step invocations triggered by one inbound message
pub const DEFAULT_MAX_HOPS: usize = 32;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Cannot find rule for message")]
    RuleNotFound,
    #[error("Step {endpoint} of rule {rule_name} failed: {source}")]
    StepInvocation {
        rule_name: String,
        endpoint: String,
        #[source]
        source: InvocationError,
    },
    #[error("Context #{id} of rule {rule_name} has no current step")]
    InactiveContext { rule_name: String, id: String },
    #[error("Message chain exceeded {hops} step invocations")]
    HopLimitExceeded { hops: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stable classification of engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RuleNotFound,
    DuplicateContext,
    UntrackedContext,
    IdAllocationExhausted,
    StepInvocationFailure,
    StepTimeout,
    HopLimitExceeded,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RuleNotFound => "rule_not_found",
            ErrorKind::DuplicateContext => "duplicate_context",
            ErrorKind::UntrackedContext => "untracked_context",
            ErrorKind::IdAllocationExhausted => "id_allocation_exhausted",
            ErrorKind::StepInvocationFailure => "step_invocation_failure",
            ErrorKind::StepTimeout => "step_timeout",
            ErrorKind::HopLimitExceeded => "hop_limit_exceeded",
            ErrorKind::Internal => "internal",
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::RuleNotFound => ErrorKind::RuleNotFound,
            EngineError::StepInvocation { source, .. } if source.kind.is_timeout() => {
                ErrorKind::StepTimeout
            }
            EngineError::StepInvocation { .. } => ErrorKind::StepInvocationFailure,
            EngineError::HopLimitExceeded { .. } => ErrorKind::HopLimitExceeded,
            EngineError::Store(StoreError::DuplicateContext { .. }) => ErrorKind::DuplicateContext,
            EngineError::Store(StoreError::UntrackedContext { .. }) => ErrorKind::UntrackedContext,
            EngineError::Store(StoreError::IdAllocationExhausted { .. }) => {
                ErrorKind::IdAllocationExhausted
            }
            EngineError::InactiveContext { .. } | EngineError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Error document returned to callers
    pub fn to_document(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind().as_str(),
                "message": self.to_string(),
            }
        })
    }
}

/// Engine wired to the file store and HTTP steps
pub type ProductionEngine = Engine<ContextStore, LoggingInvoker>;

pub struct Engine<R, I>
where
    R: ContextRepository,
    I: StepInvoker,
{
    rules: Vec<Rule>,
    repository: R,
    invoker: I,
    locks: KeyLocks,
    max_hops: usize,
}

impl<R, I> Engine<R, I>
where
    R: ContextRepository,
    I: StepInvoker,
{
    pub fn new(rules: Vec<Rule>, repository: R, invoker: I) -> Self {
        Self {
            rules,
            repository,
            invoker,
            locks: KeyLocks::new(),
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule, in load order, whose criteria accept `message`
    pub fn select_rule(&self, message: &Value) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|rule| query::matches(message, rule.criteria.as_ref()))
    }

    /// Route `message` through the rule set and return the last step's response
    pub async fn apply_message(&self, message: Value) -> Result<Value, EngineError> {
        let mut message = message;
        let mut rule = self.select_rule(&message).ok_or(EngineError::RuleNotFound)?;

        for hop in 1..=self.max_hops {
            let (response, outcome) = self.run_step(rule, &message).await?;
            if outcome != StepOutcome::Advanced {
                return Ok(response);
            }

            match self.select_rule(&response) {
                Some(next) => {
                    tracing::debug!(hop, from = %rule.name, to = %next.name, "Response re-entering routing");
                    rule = next;
                    message = response;
                }
                None => {
                    tracing::debug!(hop, rule = %rule.name, "No rule for step response, chain ends");
                    return Ok(response);
                }
            }
        }

        tracing::warn!(hops = self.max_hops, "Message chain hit the hop limit");
        Err(EngineError::HopLimitExceeded {
            hops: self.max_hops,
        })
    }

    /// One find-invoke-save cycle under the key lock
    async fn run_step(&self, rule: &Rule, message: &Value) -> Result<(Value, StepOutcome), EngineError> {
        let key = extract_key(message, &rule.index_fields);
        let _guard = self.locks.acquire(&rule.name, &key).await;

        let mut context = match self.repository.find_active(&rule.name, &key).await? {
            Some(context) => context,
            None => {
                tracing::debug!(rule = %rule.name, key = %key.canonical(), "Starting context");
                Context::start(rule, key)
            }
        };

        let resumed = !context.is_new();
        let step_index = context.current_index().unwrap_or_default();
        let endpoint = context
            .begin_invocation()
            .ok_or_else(|| EngineError::InactiveContext {
                rule_name: rule.name.clone(),
                id: context.label().to_string(),
            })?;

        let started = Instant::now();
        match self.invoker.invoke(&endpoint, message).await {
            Ok(response) => {
                let outcome = context.record_response(response.clone());
                let context = self.repository.save(context).await?;
                tracing::info!(
                    rule = %rule.name,
                    context_id = %context.label(),
                    step = step_index,
                    resumed,
                    ?outcome,
                    duration_ms = %started.elapsed().as_millis(),
                    "Step evaluated"
                );
                Ok((response, outcome))
            }
            Err(source) => {
                // The attempt still counts
                let context = self.repository.save(context).await?;
                tracing::warn!(
                    rule = %rule.name,
                    context_id = %context.label(),
                    step = step_index,
                    endpoint = %endpoint,
                    error = %source,
                    "Step invocation failed"
                );
                Err(EngineError::StepInvocation {
                    rule_name: rule.name.clone(),
                    endpoint,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockInvoker;
    use super::*;
    use crate::context::fixtures::{query, signup_rule};
    use crate::context::{Step, StepStatus};
    use crate::remote::InvocationErrorKind;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Barrier;

    const A: &str = "http://steps/a";
    const B: &str = "http://steps/b";

    struct Harness {
        _dir: TempDir,
        store: ContextStore,
        invoker: Arc<MockInvoker>,
        engine: Engine<ContextStore, Arc<MockInvoker>>,
    }

    fn harness(rules: Vec<Rule>, invoker: MockInvoker) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = ContextStore::open(dir.path()).unwrap();
        let invoker = Arc::new(invoker);
        let engine = Engine::new(rules, store.clone(), invoker.clone());
        Harness {
            _dir: dir,
            store,
            invoker,
            engine,
        }
    }

    fn signup(email: &str) -> Value {
        json!({"type": "signup", "email": email})
    }

    fn active(h: &Harness, email: &str) -> Option<Context> {
        h.store
            .find_active("signup-R", &extract_key(&signup(email), &["email"]))
    }

    #[tokio::test]
    async fn test_signup_conversation_end_to_end() {
        let h = harness(vec![signup_rule(A, B)], MockInvoker::new());

        h.invoker.queue(A, json!({"status": "ok"}));
        let response = h.engine.apply_message(signup("x@y")).await.unwrap();
        assert_eq!(response, json!({"status": "ok"}));
        assert_eq!(h.invoker.calls_to(A), vec![signup("x@y")]);

        let ctx = active(&h, "x@y").unwrap();
        assert_eq!(ctx.current_index(), Some(1));
        assert_eq!(ctx.steps[0].status, StepStatus::Passed);
        assert_eq!(ctx.steps[0].invocation_count, 1);

        h.invoker.queue(B, json!({"status": "pending"}));
        let second = json!({"type": "signup", "email": "x@y", "v": 2});
        let response = h.engine.apply_message(second.clone()).await.unwrap();
        assert_eq!(response, json!({"status": "pending"}));
        assert_eq!(h.invoker.calls_to(B), vec![second]);
        assert_eq!(active(&h, "x@y").unwrap().current_index(), Some(1));

        h.invoker.queue(B, json!({"status": "done"}));
        let response = h.engine.apply_message(signup("x@y")).await.unwrap();
        assert_eq!(response, json!({"status": "done"}));
        assert_eq!(h.invoker.calls_to(B).len(), 2);

        assert!(active(&h, "x@y").is_none());
        let id = ctx.id.unwrap();
        let finished = h.store.get("signup-R", &id).unwrap();
        assert!(finished.steps.iter().all(|s| s.status == StepStatus::Passed));
        assert_eq!(finished.steps[1].invocation_count, 2);
        assert_eq!(finished.steps[1].last_response, Some(json!({"status": "done"})));
    }

    #[tokio::test]
    async fn test_message_after_completion_starts_new_context() {
        let h = harness(vec![signup_rule(A, B)], MockInvoker::new());
        h.invoker.queue(A, json!({"status": "ok"}));
        h.invoker.queue(B, json!({"status": "done"}));
        h.engine.apply_message(signup("x@y")).await.unwrap();
        h.engine.apply_message(signup("x@y")).await.unwrap();
        assert!(active(&h, "x@y").is_none());

        h.invoker.queue(A, json!({"status": "waiting"}));
        let response = h.engine.apply_message(signup("x@y")).await.unwrap();
        assert_eq!(response, json!({"status": "waiting"}));
        assert_eq!(h.store.context_count(), 2);

        let fresh = active(&h, "x@y").unwrap();
        assert_eq!(fresh.current_index(), Some(0));
        assert_eq!(fresh.steps[0].invocation_count, 1);
    }

    #[tokio::test]
    async fn test_unmatched_message_is_rule_not_found() {
        let h = harness(vec![signup_rule(A, B)], MockInvoker::new());
        let err = h
            .engine
            .apply_message(json!({"type": "login", "email": "x@y"}))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::RuleNotFound));
        assert_eq!(err.kind(), ErrorKind::RuleNotFound);
        assert_eq!(h.invoker.call_count(), 0);
        assert_eq!(h.store.context_count(), 0);
    }

    #[tokio::test]
    async fn test_rule_without_criteria_matches_everything() {
        let mut catch_all = signup_rule(A, B);
        catch_all.criteria = None;
        catch_all.index_fields.clear();
        let h = harness(vec![catch_all], MockInvoker::new());

        h.invoker.queue(A, json!({"status": "later"}));
        let response = h.engine.apply_message(json!(42)).await.unwrap();
        assert_eq!(response, json!({"status": "later"}));
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let mut general = signup_rule(B, B);
        general.name = "general".to_string();
        general.criteria = None;
        let h = harness(vec![signup_rule(A, B), general], MockInvoker::new());

        h.invoker.queue(A, json!({"status": "hold"}));
        h.engine.apply_message(signup("x@y")).await.unwrap();
        assert_eq!(h.invoker.calls_to(A).len(), 1);
        assert!(h.invoker.calls_to(B).is_empty());
    }

    #[tokio::test]
    async fn test_failed_step_is_persisted_and_retried() {
        let h = harness(vec![signup_rule(A, B)], MockInvoker::new());
        h.invoker
            .queue_error(A, InvocationError::status(500, "boom"));

        let err = h.engine.apply_message(signup("x@y")).await.unwrap_err();
        assert!(matches!(err, EngineError::StepInvocation { .. }));
        assert_eq!(err.kind(), ErrorKind::StepInvocationFailure);

        let ctx = active(&h, "x@y").unwrap();
        assert_eq!(ctx.current_index(), Some(0));
        assert_eq!(ctx.steps[0].invocation_count, 1);
        assert_eq!(ctx.steps[0].last_response, None);

        h.invoker.queue(A, json!({"status": "ok"}));
        h.engine.apply_message(signup("x@y")).await.unwrap();
        let ctx = active(&h, "x@y").unwrap();
        assert_eq!(ctx.steps[0].invocation_count, 2);
        assert_eq!(ctx.current_index(), Some(1));
        assert_eq!(h.store.context_count(), 1);
    }

    #[tokio::test]
    async fn test_numerically_equal_keys_resume_one_context() {
        let h = harness(vec![signup_rule(A, B)], MockInvoker::new());
        h.invoker.queue(A, json!({"status": "pending"}));
        h.invoker.queue(A, json!({"status": "pending"}));

        let first = json!({"type": "signup", "email": 1});
        h.engine.apply_message(first.clone()).await.unwrap();
        h.engine
            .apply_message(json!({"type": "signup", "email": 1.0}))
            .await
            .unwrap();

        assert_eq!(h.store.context_count(), 1);
        let ctx = h
            .store
            .find_active("signup-R", &extract_key(&first, &["email"]))
            .unwrap();
        assert_eq!(ctx.current_index(), Some(0));
        assert_eq!(ctx.steps[0].invocation_count, 2);
    }

    #[tokio::test]
    async fn test_timeout_has_its_own_kind() {
        let h = harness(vec![signup_rule(A, B)], MockInvoker::new());
        h.invoker.queue_error(A, InvocationError::timeout("too slow"));

        let err = h.engine.apply_message(signup("x@y")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StepTimeout);
        let EngineError::StepInvocation { source, endpoint, .. } = err else {
            panic!("expected a step invocation error");
        };
        assert_eq!(source.kind, InvocationErrorKind::Timeout);
        assert_eq!(endpoint, A);
    }

    #[tokio::test]
    async fn test_response_matching_another_rule_chains() {
        let shipping = Rule {
            name: "orders-ship".to_string(),
            criteria: query(json!({"type": "shipment"})),
            index_fields: vec!["order".to_string()],
            steps: vec![Step {
                endpoint: "http://steps/ship".to_string(),
                exit_criteria: query(json!({"status": "never"})),
            }],
        };
        let h = harness(vec![signup_rule(A, B), shipping], MockInvoker::new());

        let handoff = json!({"status": "ok", "type": "shipment", "order": 7});
        h.invoker.queue(A, handoff.clone());
        h.invoker.queue("http://steps/ship", json!({"status": "queued"}));

        let response = h.engine.apply_message(signup("x@y")).await.unwrap();
        assert_eq!(response, json!({"status": "queued"}));
        assert_eq!(h.invoker.calls_to("http://steps/ship"), vec![handoff.clone()]);

        let key = extract_key(&handoff, &["order"]);
        let shipped = h.store.find_active("orders-ship", &key).unwrap();
        assert_eq!(shipped.steps[0].invocation_count, 1);
        assert_eq!(h.store.context_count(), 2);
    }

    #[tokio::test]
    async fn test_self_feeding_chain_hits_hop_limit() {
        let step = Step {
            endpoint: A.to_string(),
            exit_criteria: None,
        };
        let echo = Rule {
            name: "loop-echo".to_string(),
            criteria: query(json!({"type": "echo"})),
            index_fields: vec!["n".to_string()],
            steps: vec![step.clone(), step],
        };
        let h = harness(vec![echo], MockInvoker::new());
        let engine = h.engine.with_max_hops(3);
        for n in 1..=3 {
            h.invoker.queue(A, json!({"type": "echo", "n": n}));
        }

        let err = engine
            .apply_message(json!({"type": "echo", "n": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::HopLimitExceeded { hops: 3 }));
        assert_eq!(h.invoker.call_count(), 3);
        // Each hop advanced a fresh context keyed by its own `n`
        assert_eq!(h.store.context_count(), 3);
        assert_eq!(h.store.active_count(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_messages_for_one_key_share_a_context() {
        let invoker = MockInvoker::new().with_delay(Duration::from_millis(50));
        let h = harness(vec![signup_rule(A, B)], invoker);
        h.invoker.queue(A, json!({"status": "pending"}));
        h.invoker.queue(A, json!({"status": "pending"}));

        let (first, second) = tokio::join!(
            h.engine.apply_message(signup("x@y")),
            h.engine.apply_message(signup("x@y")),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(h.store.context_count(), 1);
        let ctx = active(&h, "x@y").unwrap();
        assert_eq!(ctx.steps[0].invocation_count, 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_are_processed_in_parallel() {
        // Both invocations must be in flight at once to pass the barrier
        let invoker = MockInvoker::new().with_barrier(Arc::new(Barrier::new(2)));
        let h = harness(vec![signup_rule(A, B)], invoker);
        h.invoker.queue(A, json!({"status": "pending"}));
        h.invoker.queue(A, json!({"status": "pending"}));

        let both = async {
            tokio::join!(
                h.engine.apply_message(signup("a@y")),
                h.engine.apply_message(signup("b@y")),
            )
        };
        let (first, second) = tokio::time::timeout(Duration::from_secs(5), both)
            .await
            .expect("distinct keys blocked each other");
        first.unwrap();
        second.unwrap();
        assert_eq!(h.store.active_count(), 2);
    }

    #[test]
    fn test_error_document_shape() {
        let err = EngineError::Store(StoreError::DuplicateContext {
            rule_name: "signup-R".to_string(),
            key: "[]".to_string(),
        });
        let doc = err.to_document();
        assert_eq!(doc["error"]["kind"], "duplicate_context");
        assert!(doc["error"]["message"].as_str().unwrap().contains("signup-R"));

        assert_eq!(
            EngineError::HopLimitExceeded { hops: 2 }.to_document()["error"]["kind"],
            "hop_limit_exceeded"
        );
    }
}
